//! Typed dashboard ports
//!
//! The browser build bridges the dashboard over same-origin
//! `postMessage`; here the same contract is a pair of typed channels. The
//! JSON shapes mirror the message names the dashboard already speaks, so
//! [`DashboardCommand::from_json`] accepts the wire form directly. Window
//! focus/resize notifications from the shell ride the same inbound port.

use serde::{Deserialize, Serialize};

use deskstream_core::geometry::SurfaceStyle;
use deskstream_core::protocol::{GpuStats, SystemStats};
use deskstream_core::settings::SettingsPayload;

use crate::stats::StreamStats;

/// Placeholder file name used when an upload warning has no target file
pub const NO_FILE: &str = "_N/A_";

/// Commands the dashboard (or shell) sends into the core
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DashboardCommand {
    /// Stream-mode switch; persists the mode and reloads the session
    #[serde(rename = "mode")]
    Mode { mode: String },

    /// Toggle local aspect-preserving scaling of the pinned surface
    #[serde(rename = "setScaleLocally")]
    SetScaleLocally { value: bool },

    /// Leave manual resolution mode and track the window again
    #[serde(rename = "resetResolutionToWindow")]
    ResetResolutionToWindow,

    /// Pin the stream to a fixed resolution
    #[serde(rename = "setManualResolution")]
    SetManualResolution { width: u32, height: u32 },

    /// Persisted and acknowledged, but intentionally not acted upon: the
    /// HiDPI/CSS-scaling path is an open gap in the protocol
    #[serde(rename = "setUseCssScaling")]
    SetUseCssScaling { value: bool },

    /// Clipboard text typed or pasted in the dashboard
    #[serde(rename = "clipboardUpdateFromUI")]
    ClipboardUpdateFromUi { text: String },

    /// Nested map of runtime setting mutations
    #[serde(rename = "settings")]
    Settings { settings: serde_json::Value },

    /// Raw server command line
    #[serde(rename = "command")]
    Command { value: String },

    /// Start an upload of the given local paths (the shell's stand-in for
    /// the hidden file input)
    #[serde(rename = "requestFileUpload")]
    RequestFileUpload { paths: Vec<std::path::PathBuf> },

    /// Window geometry changed
    #[serde(rename = "windowResized")]
    WindowResized {
        width: f64,
        height: f64,
        #[serde(rename = "devicePixelRatio")]
        device_pixel_ratio: f64,
    },

    /// Window gained focus
    #[serde(rename = "windowFocused")]
    WindowFocused,

    /// Window lost focus
    #[serde(rename = "windowBlurred")]
    WindowBlurred,
}

impl DashboardCommand {
    /// Decode the wire form. Unknown types are an error the session warns
    /// about and drops.
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    pub fn viewport(width: f64, height: f64, device_pixel_ratio: f64) -> Self {
        Self::WindowResized {
            width,
            height,
            device_pixel_ratio,
        }
    }
}

/// Decode an incoming dashboard message, warning about and dropping
/// anything with an unknown type.
pub fn decode_command(text: &str) -> Option<DashboardCommand> {
    match DashboardCommand::from_json(text) {
        Ok(command) => Some(command),
        Err(e) => {
            tracing::warn!("dropping unknown dashboard message: {e}");
            None
        }
    }
}

/// Updates the core posts back to the dashboard
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum DashboardUpdate {
    /// Clipboard text pushed by the server
    #[serde(rename = "clipboardContentUpdate")]
    ClipboardContentUpdate { text: String },

    /// File upload progress/warning/error
    #[serde(rename = "fileUpload")]
    FileUpload(FileUploadUpdate),

    /// Server settings broadcast, forwarded verbatim
    #[serde(rename = "serverSettings")]
    ServerSettings { payload: SettingsPayload },

    /// Derived interval stats
    #[serde(rename = "stats")]
    Stats(StreamStats),

    /// Encoder GPU snapshot
    #[serde(rename = "gpuStats")]
    GpuStats(GpuStats),

    /// Host CPU/memory snapshot
    #[serde(rename = "systemStats")]
    SystemStats(SystemStats),

    /// New surface placement computed by the geometry controller
    #[serde(rename = "surfaceStyle")]
    SurfaceStyle(SurfaceStyle),

    /// A user gesture is required to start playback
    #[serde(rename = "playStreamRequired")]
    PlayStreamRequired,

    /// Human-readable session status line
    #[serde(rename = "status")]
    Status { message: String },
}

/// Body of a `fileUpload` update
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileUploadUpdate {
    pub status: UploadStatus,
    #[serde(rename = "fileName")]
    pub file_name: String,
    #[serde(rename = "fileSize", skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
    /// Percent complete, 0–100
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl FileUploadUpdate {
    pub fn start(file_name: impl Into<String>, file_size: u64) -> Self {
        Self {
            status: UploadStatus::Start,
            file_name: file_name.into(),
            file_size: Some(file_size),
            progress: Some(0),
            message: None,
        }
    }

    pub fn progress(file_name: impl Into<String>, file_size: u64, percent: u8) -> Self {
        Self {
            status: UploadStatus::Progress,
            file_name: file_name.into(),
            file_size: Some(file_size),
            progress: Some(percent.min(100)),
            message: None,
        }
    }

    pub fn end(file_name: impl Into<String>, file_size: u64) -> Self {
        Self {
            status: UploadStatus::End,
            file_name: file_name.into(),
            file_size: Some(file_size),
            progress: Some(100),
            message: None,
        }
    }

    pub fn error(file_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status: UploadStatus::Error,
            file_name: file_name.into(),
            file_size: None,
            progress: None,
            message: Some(message.into()),
        }
    }

    /// The contention warning: another batch owns the aux channel.
    pub fn busy_warning() -> Self {
        Self {
            status: UploadStatus::Warning,
            file_name: NO_FILE.to_string(),
            file_size: None,
            progress: None,
            message: Some("Please let the ongoing upload complete".to_string()),
        }
    }
}

/// Upload progress phases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Start,
    Progress,
    End,
    Error,
    Warning,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_wire_shapes() {
        let cmd = DashboardCommand::from_json(
            r#"{"type":"setManualResolution","width":1920,"height":1080}"#,
        )
        .unwrap();
        assert_eq!(
            cmd,
            DashboardCommand::SetManualResolution {
                width: 1920,
                height: 1080
            }
        );

        let cmd = DashboardCommand::from_json(r#"{"type":"setScaleLocally","value":true}"#).unwrap();
        assert_eq!(cmd, DashboardCommand::SetScaleLocally { value: true });

        let cmd =
            DashboardCommand::from_json(r#"{"type":"clipboardUpdateFromUI","text":"hi"}"#).unwrap();
        assert_eq!(cmd, DashboardCommand::ClipboardUpdateFromUi { text: "hi".into() });
    }

    #[test]
    fn test_unknown_command_type_rejected() {
        assert!(DashboardCommand::from_json(r#"{"type":"launchMissiles"}"#).is_err());
    }

    #[test]
    fn test_file_upload_update_serialization() {
        let update = DashboardUpdate::FileUpload(FileUploadUpdate::busy_warning());
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json["type"], "fileUpload");
        assert_eq!(json["status"], "warning");
        assert_eq!(json["fileName"], NO_FILE);
    }

    #[test]
    fn test_progress_capped_at_hundred() {
        let update = FileUploadUpdate::progress("a.txt", 10, 250);
        assert_eq!(update.progress, Some(100));
    }
}
