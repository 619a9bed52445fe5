//! Signaling wire frames
//!
//! Text lines for registration and errors, JSON for SDP and ICE:
//!
//! ```text
//! → HELLO 4237 eyJyZXMiOiIxOTIwe…        registration + resolution advisory
//! ← HELLO                                 registered
//! ← {"sdp": {"type": "offer", "sdp": …}}
//! → {"sdp": {"type": "answer", "sdp": …}}
//! ⇄ {"ice": {"candidate": …, "sdpMLineIndex": 0, "sdpMid": "0"}}
//! ← ERROR peer … not found
//! ```

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::Result;

/// Registration metadata sent with `HELLO`
///
/// `res` is the current surface resolution (`<W>x<H>`), `scale` the device
/// pixel ratio; the server uses them to size the initial stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HelloMeta {
    pub res: String,
    pub scale: f64,
}

impl HelloMeta {
    /// Build the `HELLO <id> <base64 meta>` registration line.
    pub fn registration_line(&self, peer_id: u32) -> Result<String> {
        let json = serde_json::to_string(self)?;
        Ok(format!("HELLO {peer_id} {}", BASE64.encode(json.as_bytes())))
    }
}

/// An SDP or ICE frame, both directions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SignalFrame {
    Sdp { sdp: SdpPayload },
    Ice { ice: IceCandidatePayload },
}

/// Session description body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SdpPayload {
    #[serde(rename = "type")]
    pub kind: String,
    pub sdp: String,
}

/// ICE candidate body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IceCandidatePayload {
    pub candidate: String,
    #[serde(
        rename = "sdpMLineIndex",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub sdp_mline_index: Option<u16>,
    #[serde(rename = "sdpMid", default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
}

impl SignalFrame {
    pub fn answer(sdp: impl Into<String>) -> Self {
        Self::Sdp {
            sdp: SdpPayload {
                kind: "answer".to_string(),
                sdp: sdp.into(),
            },
        }
    }

    pub fn ice(candidate: IceCandidatePayload) -> Self {
        Self::Ice { ice: candidate }
    }

    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// A frame received from the signaling server
#[derive(Debug, Clone, PartialEq)]
pub enum IncomingFrame {
    /// Registration acknowledged
    Registered,
    /// Server-reported error line, payload verbatim
    ServerError(String),
    /// SDP or ICE
    Signal(SignalFrame),
}

impl IncomingFrame {
    /// Decode one text frame.
    pub fn decode(text: &str) -> Result<Self> {
        let trimmed = text.trim();
        if trimmed == "HELLO" {
            return Ok(Self::Registered);
        }
        if let Some(detail) = trimmed.strip_prefix("ERROR") {
            return Ok(Self::ServerError(detail.trim().to_string()));
        }
        let frame: SignalFrame = serde_json::from_str(trimmed)
            .map_err(|e| Error::Signaling(format!("unhandled signaling message {trimmed:?}: {e}")))?;
        Ok(Self::Signal(frame))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registration_line_roundtrip() {
        let meta = HelloMeta {
            res: "1920x1080".into(),
            scale: 2.0,
        };
        let line = meta.registration_line(4237).unwrap();
        let mut parts = line.split(' ');
        assert_eq!(parts.next(), Some("HELLO"));
        assert_eq!(parts.next(), Some("4237"));
        let decoded = BASE64.decode(parts.next().unwrap()).unwrap();
        let parsed: HelloMeta = serde_json::from_slice(&decoded).unwrap();
        assert_eq!(parsed, meta);
    }

    #[test]
    fn test_decode_hello_ack_and_error() {
        assert_eq!(IncomingFrame::decode("HELLO").unwrap(), IncomingFrame::Registered);
        assert_eq!(
            IncomingFrame::decode("ERROR peer '1' not found").unwrap(),
            IncomingFrame::ServerError("peer '1' not found".into())
        );
    }

    #[test]
    fn test_sdp_frame_roundtrip() {
        let frame = SignalFrame::answer("v=0\r\n");
        let wire = frame.encode().unwrap();
        assert!(wire.contains(r#""type":"answer""#));
        match IncomingFrame::decode(&wire).unwrap() {
            IncomingFrame::Signal(parsed) => assert_eq!(parsed, frame),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_ice_frame_field_names() {
        let wire = r#"{"ice":{"candidate":"candidate:1 1 udp 2 10.0.0.1 5000 typ host","sdpMLineIndex":0,"sdpMid":"0"}}"#;
        match IncomingFrame::decode(wire).unwrap() {
            IncomingFrame::Signal(SignalFrame::Ice { ice }) => {
                assert_eq!(ice.sdp_mline_index, Some(0));
                assert_eq!(ice.sdp_mid.as_deref(), Some("0"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(IncomingFrame::decode("SESSION_OK abc").is_err());
        assert!(IncomingFrame::decode("{\"other\":1}").is_err());
    }
}
