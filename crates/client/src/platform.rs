//! Seams to the embedding shell
//!
//! The core never touches a clipboard or a rendering surface directly; the
//! shell injects implementations of these ports at session construction.
//! The null implementations keep headless runs and tests honest.

use async_trait::async_trait;
use bytes::Bytes;
use deskstream_core::geometry::SurfaceStyle;

/// Which media receiver a payload belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Video,
    Audio,
}

impl MediaKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Audio => "audio",
        }
    }
}

/// Rendering surface port
///
/// `try_autoplay` mirrors browser autoplay policy: a shell may refuse to
/// start playback without a user gesture, in which case the transport
/// raises `PlayStreamRequired` instead of erroring.
pub trait MediaSurface: Send + Sync {
    /// Attempt to start playback; `false` means a user gesture is needed.
    fn try_autoplay(&self) -> bool;

    /// Deliver a media payload popped from the playout buffer.
    fn deliver(&self, kind: MediaKind, payload: Bytes);

    /// Apply a computed surface style.
    fn apply_style(&self, style: SurfaceStyle);

    /// Show a remote cursor update. Shells without cursor rendering can
    /// leave the default no-op.
    fn update_cursor(&self, _cursor: &crate::transport::CursorFrame) {}
}

/// Surface that renders nowhere; autoplay behaviour is configurable so
/// tests can exercise the blocked path.
#[derive(Debug)]
pub struct NullSurface {
    pub allow_autoplay: bool,
}

impl Default for NullSurface {
    fn default() -> Self {
        Self {
            allow_autoplay: true,
        }
    }
}

impl MediaSurface for NullSurface {
    fn try_autoplay(&self) -> bool {
        self.allow_autoplay
    }

    fn deliver(&self, _kind: MediaKind, _payload: Bytes) {}

    fn apply_style(&self, _style: SurfaceStyle) {}
}

/// Host clipboard port
///
/// Reads return `None` when permission is denied; the session logs and
/// keeps clipboard bridging disabled, nothing else.
#[async_trait]
pub trait ClipboardPort: Send + Sync {
    /// Whether the surrounding context is allowed to touch the clipboard
    /// at all (the secure-context check in the browser build).
    fn is_secure_context(&self) -> bool;

    async fn read_text(&self) -> Option<String>;

    /// Returns whether the write was accepted.
    async fn write_text(&self, text: &str) -> bool;
}

/// Clipboard that never grants access
#[derive(Debug, Default)]
pub struct NullClipboard;

#[async_trait]
impl ClipboardPort for NullClipboard {
    fn is_secure_context(&self) -> bool {
        false
    }

    async fn read_text(&self) -> Option<String> {
        None
    }

    async fn write_text(&self, _text: &str) -> bool {
        false
    }
}
