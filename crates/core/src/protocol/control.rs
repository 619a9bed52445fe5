//! Viewer → server control ops
//!
//! Compact ASCII encoding sent over the primary data channel. Runtime
//! controls use comma-separated arguments; the file-transfer markers keep
//! the colon-separated form of the upload protocol. Encode and parse are
//! exact inverses so the codec can be exercised round-trip.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

use crate::error::Error;
use crate::types::Resolution;
use crate::Result;

/// A control message sent from the viewer to the server
#[derive(Debug, Clone, PartialEq)]
pub enum ControlMessage {
    /// `r,<W>x<H>`: set stream resolution in logical pixels
    StreamResolution(Resolution),
    /// `vb,<kbps>`: video bitrate
    VideoBitrate(u32),
    /// `ab,<bps>`: audio bitrate
    AudioBitrate(u32),
    /// `_arg_fps,<fps>`: target framerate
    TargetFramerate(u32),
    /// `s,<dpi>`: scaling DPI
    ScalingDpi(u32),
    /// `cw,<base64 text>`: clipboard write; holds the decoded text
    ClipboardWrite(String),
    /// `cmd,<command line>`: server-side shell command
    Command(String),
    /// `kr`: keyboard reset, release all held keys
    KeyboardReset,
    /// `_f,<fps>`: viewer-measured frames per second
    ClientFps(u32),
    /// `_l,<ms>`: viewer-measured latency
    ClientLatency(u32),
    /// `_stats_video,<json>`: per-interval stats dump
    VideoStats(serde_json::Value),
    /// `SETTINGS,<json>`: bulk settings delta snapshot
    Settings(serde_json::Value),
    /// `FILE_UPLOAD_START:<path>:<size>`: begin a file transfer
    FileUploadStart { path: String, size: u64 },
    /// `FILE_UPLOAD_END:<path>`: file transferred completely
    FileUploadEnd { path: String },
    /// `FILE_UPLOAD_ERROR:<path>:<reason>`: abort a file transfer
    FileUploadError { path: String, reason: String },
}

impl ControlMessage {
    /// Encode to the wire string.
    ///
    /// Clipboard text is base64-encoded here so callers never place raw
    /// text on the wire.
    pub fn encode(&self) -> String {
        match self {
            Self::StreamResolution(res) => format!("r,{res}"),
            Self::VideoBitrate(kbps) => format!("vb,{kbps}"),
            Self::AudioBitrate(bps) => format!("ab,{bps}"),
            Self::TargetFramerate(fps) => format!("_arg_fps,{fps}"),
            Self::ScalingDpi(dpi) => format!("s,{dpi}"),
            Self::ClipboardWrite(text) => format!("cw,{}", BASE64.encode(text.as_bytes())),
            Self::Command(cmd) => format!("cmd,{cmd}"),
            Self::KeyboardReset => "kr".to_string(),
            Self::ClientFps(fps) => format!("_f,{fps}"),
            Self::ClientLatency(ms) => format!("_l,{ms}"),
            Self::VideoStats(json) => format!("_stats_video,{json}"),
            Self::Settings(json) => format!("SETTINGS,{json}"),
            Self::FileUploadStart { path, size } => format!("FILE_UPLOAD_START:{path}:{size}"),
            Self::FileUploadEnd { path } => format!("FILE_UPLOAD_END:{path}"),
            Self::FileUploadError { path, reason } => {
                format!("FILE_UPLOAD_ERROR:{path}:{reason}")
            }
        }
    }

    /// Parse a wire string back into a message.
    ///
    /// The file-transfer markers are matched on their prefix first because
    /// their payload is colon- rather than comma-separated.
    pub fn parse(line: &str) -> Result<Self> {
        if let Some(rest) = line.strip_prefix("FILE_UPLOAD_START:") {
            // Size is the last segment; the path must not contain colons
            // (the upload pipeline sanitises them away).
            let (path, size) = rest
                .rsplit_once(':')
                .ok_or_else(|| malformed("FILE_UPLOAD_START without size"))?;
            let size = size
                .parse()
                .map_err(|_| malformed("FILE_UPLOAD_START size not an integer"))?;
            return Ok(Self::FileUploadStart {
                path: path.to_string(),
                size,
            });
        }
        if let Some(path) = line.strip_prefix("FILE_UPLOAD_END:") {
            return Ok(Self::FileUploadEnd {
                path: path.to_string(),
            });
        }
        if let Some(rest) = line.strip_prefix("FILE_UPLOAD_ERROR:") {
            let (path, reason) = rest
                .split_once(':')
                .ok_or_else(|| malformed("FILE_UPLOAD_ERROR without reason"))?;
            return Ok(Self::FileUploadError {
                path: path.to_string(),
                reason: reason.to_string(),
            });
        }

        let (op, arg) = match line.split_once(',') {
            Some((op, arg)) => (op, Some(arg)),
            None => (line, None),
        };
        match (op, arg) {
            ("r", Some(arg)) => Ok(Self::StreamResolution(Resolution::parse(arg)?)),
            ("vb", Some(arg)) => Ok(Self::VideoBitrate(parse_int(arg)?)),
            ("ab", Some(arg)) => Ok(Self::AudioBitrate(parse_int(arg)?)),
            ("_arg_fps", Some(arg)) => Ok(Self::TargetFramerate(parse_int(arg)?)),
            ("s", Some(arg)) => Ok(Self::ScalingDpi(parse_int(arg)?)),
            ("cw", Some(arg)) => {
                let bytes = BASE64
                    .decode(arg)
                    .map_err(|_| malformed("cw payload is not base64"))?;
                let text = String::from_utf8(bytes)
                    .map_err(|_| malformed("cw payload is not UTF-8 text"))?;
                Ok(Self::ClipboardWrite(text))
            }
            ("cmd", Some(arg)) => Ok(Self::Command(arg.to_string())),
            ("kr", None) => Ok(Self::KeyboardReset),
            ("_f", Some(arg)) => Ok(Self::ClientFps(parse_int(arg)?)),
            ("_l", Some(arg)) => Ok(Self::ClientLatency(parse_int(arg)?)),
            ("_stats_video", Some(arg)) => Ok(Self::VideoStats(serde_json::from_str(arg)?)),
            ("SETTINGS", Some(arg)) => Ok(Self::Settings(serde_json::from_str(arg)?)),
            _ => Err(Error::UnknownOp(op.to_string())),
        }
    }
}

fn parse_int(arg: &str) -> Result<u32> {
    arg.parse()
        .map_err(|_| malformed(&format!("expected integer, got {arg:?}")))
}

fn malformed(reason: &str) -> Error {
    Error::MalformedMessage(reason.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn roundtrip(msg: ControlMessage) {
        let wire = msg.encode();
        let parsed = ControlMessage::parse(&wire).unwrap();
        assert_eq!(parsed, msg, "round-trip failed for {wire:?}");
    }

    #[test]
    fn test_roundtrip_every_op() {
        roundtrip(ControlMessage::StreamResolution(Resolution::new(1920, 1080)));
        roundtrip(ControlMessage::VideoBitrate(4000));
        roundtrip(ControlMessage::AudioBitrate(128000));
        roundtrip(ControlMessage::TargetFramerate(60));
        roundtrip(ControlMessage::ScalingDpi(96));
        roundtrip(ControlMessage::ClipboardWrite("hello, clipboard".into()));
        roundtrip(ControlMessage::Command("xdotool key F11".into()));
        roundtrip(ControlMessage::KeyboardReset);
        roundtrip(ControlMessage::ClientFps(59));
        roundtrip(ControlMessage::ClientLatency(12));
        roundtrip(ControlMessage::VideoStats(json!({"fps": 60.0})));
        roundtrip(ControlMessage::Settings(json!({"video_bitrate": 4000})));
        roundtrip(ControlMessage::FileUploadStart {
            path: "dir/a.txt".into(),
            size: 200,
        });
        roundtrip(ControlMessage::FileUploadEnd {
            path: "dir/a.txt".into(),
        });
        roundtrip(ControlMessage::FileUploadError {
            path: "dir/a.txt".into(),
            reason: "read failed".into(),
        });
    }

    #[test]
    fn test_clipboard_is_base64_on_the_wire() {
        let wire = ControlMessage::ClipboardWrite("secret text".into()).encode();
        let payload = wire.strip_prefix("cw,").unwrap();
        assert!(!payload.contains("secret"));
        assert_eq!(
            BASE64.decode(payload).unwrap(),
            b"secret text".to_vec()
        );
    }

    #[test]
    fn test_command_keeps_embedded_commas() {
        let msg = ControlMessage::Command("echo a,b,c".into());
        assert_eq!(ControlMessage::parse(&msg.encode()).unwrap(), msg);
    }

    #[test]
    fn test_upload_error_reason_keeps_colons() {
        let wire = "FILE_UPLOAD_ERROR:a.txt:io: permission denied";
        match ControlMessage::parse(wire).unwrap() {
            ControlMessage::FileUploadError { path, reason } => {
                assert_eq!(path, "a.txt");
                assert_eq!(reason, "io: permission denied");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_unknown_op_rejected() {
        assert!(matches!(
            ControlMessage::parse("zz,1"),
            Err(Error::UnknownOp(_))
        ));
    }

    #[test]
    fn test_malformed_args_rejected() {
        assert!(ControlMessage::parse("r,1920").is_err());
        assert!(ControlMessage::parse("vb,fast").is_err());
        assert!(ControlMessage::parse("cw,###not-base64###").is_err());
    }
}
