//! Shared value types used across the viewer core

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// A stream resolution in logical pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn aspect_ratio(&self) -> f64 {
        self.width as f64 / self.height as f64
    }

    /// Parse the `<W>x<H>` wire form used by the control protocol.
    pub fn parse(s: &str) -> crate::Result<Self> {
        let (w, h) = s
            .split_once('x')
            .ok_or_else(|| Error::MalformedMessage(format!("bad resolution {s:?}")))?;
        let width = w
            .parse()
            .map_err(|_| Error::MalformedMessage(format!("bad width {w:?}")))?;
        let height = h
            .parse()
            .map_err(|_| Error::MalformedMessage(format!("bad height {h:?}")))?;
        Ok(Self { width, height })
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Lifecycle of the single viewer session
///
/// Terminal only on explicit cleanup; `Disconnected`/`Reconnecting` loop
/// back to `Connecting` through a transport reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Offering,
    Answered,
    Connected,
    Disconnected,
    Reconnecting,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Offering => "offering",
            Self::Answered => "answered",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Reconnecting => "reconnecting",
        }
    }
}

/// Streaming mode persisted at `<prefix>_stream_mode`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamMode {
    Webrtc,
    Websockets,
}

impl StreamMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Webrtc => "webrtc",
            Self::Websockets => "websockets",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "webrtc" => Some(Self::Webrtc),
            "websockets" => Some(Self::Websockets),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_wire_roundtrip() {
        let res = Resolution::new(1920, 1080);
        assert_eq!(res.to_string(), "1920x1080");
        assert_eq!(Resolution::parse("1920x1080").unwrap(), res);
    }

    #[test]
    fn test_resolution_parse_rejects_garbage() {
        assert!(Resolution::parse("1920").is_err());
        assert!(Resolution::parse("x1080").is_err());
        assert!(Resolution::parse("ax b").is_err());
    }

    #[test]
    fn test_stream_mode_strings() {
        assert_eq!(StreamMode::Webrtc.as_str(), "webrtc");
        assert_eq!(
            StreamMode::from_str_opt("websockets"),
            Some(StreamMode::Websockets)
        );
        assert_eq!(StreamMode::from_str_opt("quic"), None);
    }
}
