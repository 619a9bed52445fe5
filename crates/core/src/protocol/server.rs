//! Server → viewer events on the primary data channel
//!
//! The server wraps everything it pushes in a `{"type": t, "data": d}`
//! envelope. Unknown types and malformed payloads are decode errors; the
//! transport logs and drops them without tearing the channel down.

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::settings::SettingsPayload;
use crate::types::Resolution;
use crate::Result;

/// A decoded server push event
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    /// `system`: an out-of-band action or setting acknowledgement
    System(SystemAction),
    /// `server_settings`: broadcast of the server's settings map
    ServerSettings(SettingsPayload),
    /// `cursor`: remote cursor image / hotspot update
    Cursor(CursorPayload),
    /// `ping`: server clock sample; the viewer answers with a latency op
    Ping { start_time: f64 },
    /// `latency_measurement`: round trip measured by the server
    LatencyMeasurement { latency_ms: f64 },
    /// `gpu_stats`: encoder GPU load snapshot
    GpuStats(GpuStats),
    /// `system_stats`: host CPU/memory snapshot
    SystemStats(SystemStats),
    /// `clipboard-msg` / `clipboard-msg-end`: base64 clipboard text,
    /// chunked; `last` marks the final chunk of a write
    ClipboardChunk { content: String, last: bool },
}

/// Parsed payload of a `system` event
///
/// Acknowledgements reuse the compact `name,value` form of the control
/// channel; anything unrecognised is preserved verbatim so the session can
/// still log it.
#[derive(Debug, Clone, PartialEq)]
pub enum SystemAction {
    /// Full client reload requested (stream mode switch, server restart)
    Reload,
    /// Framerate applied server-side: `videoFramerate,<fps>`
    Framerate(u32),
    /// Video bitrate applied: `video_bitrate,<kbps>`
    VideoBitrate(u32),
    /// Audio bitrate applied: `audio_bitrate,<bps>`
    AudioBitrate(u32),
    /// Active encoder element: `encoder,<name>`
    Encoder(String),
    /// Server-side auto-resize toggle: `resize,<bool>`
    ResizeEnabled(bool),
    /// Remote stream resolution: `resolution,<W>x<H>`
    RemoteResolution(Resolution),
    /// Unrecognised action, kept for logging
    Other(String),
}

impl SystemAction {
    fn parse(action: &str) -> Self {
        if action == "reload" {
            return Self::Reload;
        }
        let Some((name, value)) = action.split_once(',') else {
            return Self::Other(action.to_string());
        };
        match name {
            "videoFramerate" => value
                .parse()
                .map(Self::Framerate)
                .unwrap_or_else(|_| Self::Other(action.to_string())),
            "video_bitrate" => value
                .parse()
                .map(Self::VideoBitrate)
                .unwrap_or_else(|_| Self::Other(action.to_string())),
            "audio_bitrate" => value
                .parse()
                .map(Self::AudioBitrate)
                .unwrap_or_else(|_| Self::Other(action.to_string())),
            "encoder" => Self::Encoder(value.to_string()),
            "resize" => Self::ResizeEnabled(value == "true"),
            "resolution" => Resolution::parse(value)
                .map(Self::RemoteResolution)
                .unwrap_or_else(|_| Self::Other(action.to_string())),
            _ => Self::Other(action.to_string()),
        }
    }
}

/// Remote cursor update
///
/// `curdata` is a base64 PNG; a missing image with an `override` name asks
/// the viewer to fall back to a named CSS-style cursor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CursorPayload {
    #[serde(default)]
    pub handle: Option<i64>,
    #[serde(default)]
    pub curdata: Option<String>,
    #[serde(default)]
    pub hotspot: Option<Hotspot>,
    #[serde(default, rename = "override")]
    pub override_name: Option<String>,
}

/// Cursor hotspot in image coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Hotspot {
    pub x: i32,
    pub y: i32,
}

/// GPU load snapshot pushed by the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct GpuStats {
    #[serde(default)]
    pub load: f64,
    #[serde(default)]
    pub memory_total: f64,
    #[serde(default)]
    pub memory_used: f64,
}

/// Host CPU/memory snapshot pushed by the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SystemStats {
    #[serde(default)]
    pub cpu_percent: f64,
    #[serde(default)]
    pub mem_total: u64,
    #[serde(default)]
    pub mem_used: u64,
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: serde_json::Value,
}

impl ServerEvent {
    /// Decode a text frame received on the primary channel.
    pub fn decode(text: &str) -> Result<Self> {
        let envelope: Envelope = serde_json::from_str(text)
            .map_err(|e| Error::MalformedEvent(format!("not an event envelope: {e}")))?;
        let data = envelope.data;
        match envelope.kind.as_str() {
            "system" => {
                let action = data
                    .get("action")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| Error::MalformedEvent("system event without action".into()))?;
                Ok(Self::System(SystemAction::parse(action)))
            }
            "server_settings" => {
                let payload: SettingsPayload = serde_json::from_value(data)
                    .map_err(|e| Error::MalformedEvent(format!("bad settings map: {e}")))?;
                Ok(Self::ServerSettings(payload))
            }
            "cursor" => {
                let payload: CursorPayload = serde_json::from_value(data)
                    .map_err(|e| Error::MalformedEvent(format!("bad cursor payload: {e}")))?;
                Ok(Self::Cursor(payload))
            }
            "ping" => {
                let start_time = data
                    .get("start_time")
                    .and_then(|v| v.as_f64())
                    .ok_or_else(|| Error::MalformedEvent("ping without start_time".into()))?;
                Ok(Self::Ping { start_time })
            }
            "latency_measurement" => {
                let latency_ms = data
                    .get("latency_ms")
                    .and_then(|v| v.as_f64())
                    .ok_or_else(|| Error::MalformedEvent("latency without latency_ms".into()))?;
                Ok(Self::LatencyMeasurement { latency_ms })
            }
            "gpu_stats" => {
                let stats: GpuStats = serde_json::from_value(data)
                    .map_err(|e| Error::MalformedEvent(format!("bad gpu stats: {e}")))?;
                Ok(Self::GpuStats(stats))
            }
            "system_stats" => {
                let stats: SystemStats = serde_json::from_value(data)
                    .map_err(|e| Error::MalformedEvent(format!("bad system stats: {e}")))?;
                Ok(Self::SystemStats(stats))
            }
            "clipboard-msg" | "clipboard-msg-end" => {
                let content = data
                    .get("content")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| Error::MalformedEvent("clipboard chunk without content".into()))?
                    .to_string();
                Ok(Self::ClipboardChunk {
                    content,
                    last: envelope.kind == "clipboard-msg-end",
                })
            }
            other => Err(Error::MalformedEvent(format!("unknown event type {other:?}"))),
        }
    }
}

/// Reassembles chunked base64 clipboard text into complete writes.
///
/// The server splits long clipboard payloads into `clipboard-msg` parts
/// followed by one `clipboard-msg-end`; chunks arrive in order on the
/// reliable channel.
#[derive(Debug, Default)]
pub struct ClipboardAssembler {
    pending: String,
}

impl ClipboardAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk; returns the decoded clipboard text when the chunk
    /// completes a write.
    pub fn push(&mut self, content: &str, last: bool) -> Option<Result<String>> {
        self.pending.push_str(content);
        if !last {
            return None;
        }
        let whole = std::mem::take(&mut self.pending);
        let decoded = base64::Engine::decode(
            &base64::engine::general_purpose::STANDARD,
            whole.as_bytes(),
        )
        .map_err(|_| Error::MalformedEvent("clipboard payload is not base64".into()))
        .and_then(|bytes| {
            String::from_utf8(bytes)
                .map_err(|_| Error::MalformedEvent("clipboard payload is not UTF-8".into()))
        });
        Some(decoded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
    use serde_json::json;

    fn decode(value: serde_json::Value) -> ServerEvent {
        ServerEvent::decode(&value.to_string()).unwrap()
    }

    #[test]
    fn test_system_reload() {
        let ev = decode(json!({"type": "system", "data": {"action": "reload"}}));
        assert_eq!(ev, ServerEvent::System(SystemAction::Reload));
    }

    #[test]
    fn test_system_acks() {
        let ev = decode(json!({"type": "system", "data": {"action": "videoFramerate,60"}}));
        assert_eq!(ev, ServerEvent::System(SystemAction::Framerate(60)));

        let ev = decode(json!({"type": "system", "data": {"action": "resolution,2560x1440"}}));
        assert_eq!(
            ev,
            ServerEvent::System(SystemAction::RemoteResolution(Resolution::new(2560, 1440)))
        );

        let ev = decode(json!({"type": "system", "data": {"action": "resize,true"}}));
        assert_eq!(ev, ServerEvent::System(SystemAction::ResizeEnabled(true)));
    }

    #[test]
    fn test_unknown_action_preserved() {
        let ev = decode(json!({"type": "system", "data": {"action": "defrag,now"}}));
        assert_eq!(
            ev,
            ServerEvent::System(SystemAction::Other("defrag,now".into()))
        );
    }

    #[test]
    fn test_ping_and_latency() {
        let ev = decode(json!({"type": "ping", "data": {"start_time": 12.5}}));
        assert_eq!(ev, ServerEvent::Ping { start_time: 12.5 });

        let ev = decode(json!({"type": "latency_measurement", "data": {"latency_ms": 31.0}}));
        assert_eq!(ev, ServerEvent::LatencyMeasurement { latency_ms: 31.0 });
    }

    #[test]
    fn test_stats_events() {
        let ev = decode(json!({
            "type": "gpu_stats",
            "data": {"load": 0.42, "memory_total": 8192.0, "memory_used": 1024.0}
        }));
        match ev {
            ServerEvent::GpuStats(stats) => assert_eq!(stats.load, 0.42),
            other => panic!("unexpected {other:?}"),
        }

        let ev = decode(json!({
            "type": "system_stats",
            "data": {"cpu_percent": 12.0, "mem_total": 16384, "mem_used": 8192}
        }));
        match ev {
            ServerEvent::SystemStats(stats) => assert_eq!(stats.mem_used, 8192),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_unknown_type_is_error() {
        assert!(ServerEvent::decode(r#"{"type":"mystery","data":{}}"#).is_err());
        assert!(ServerEvent::decode("not json at all").is_err());
    }

    #[test]
    fn test_clipboard_reassembly() {
        let text = "clipboard text that spans chunks";
        let b64 = BASE64.encode(text.as_bytes());
        let (head, tail) = b64.split_at(b64.len() / 2);

        let mut assembler = ClipboardAssembler::new();
        assert!(assembler.push(head, false).is_none());
        let out = assembler.push(tail, true).unwrap().unwrap();
        assert_eq!(out, text);

        // Assembler resets after a completed write
        let b64 = BASE64.encode(b"second");
        let out = assembler.push(&b64, true).unwrap().unwrap();
        assert_eq!(out, "second");
    }
}
