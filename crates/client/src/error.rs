//! Error types for the viewer client

/// Result type alias using the client Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in signaling, transport and session operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid configuration parameter
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Signaling session error
    #[error("Signaling error: {0}")]
    Signaling(String),

    /// WebSocket transport error
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// WebRTC peer connection error
    #[error("Peer connection error: {0}")]
    PeerConnection(String),

    /// Data channel error
    #[error("Data channel error: {0}")]
    DataChannel(String),

    /// A file upload batch is already holding the aux channel
    #[error("An upload is already in progress")]
    UploadBusy,

    /// File upload failure scoped to one file
    #[error("Upload of {path} failed: {reason}")]
    Upload { path: String, reason: String },

    /// TURN configuration endpoint failure
    #[error("TURN config fetch failed: {0}")]
    TurnFetch(String),

    /// Codec / settings / geometry error from the core crate
    #[error(transparent)]
    Core(#[from] deskstream_core::Error),

    /// WebRTC library error
    #[error("WebRTC error: {0}")]
    WebRtc(#[from] webrtc::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Whether the session should retry after this error rather than give
    /// up.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Signaling(_) | Error::WebSocket(_) | Error::TurnFetch(_) | Error::Io(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::UploadBusy;
        assert_eq!(err.to_string(), "An upload is already in progress");
    }

    #[test]
    fn test_retryable_classification() {
        assert!(Error::WebSocket("reset".into()).is_retryable());
        assert!(!Error::InvalidConfig("bad".into()).is_retryable());
        assert!(!Error::UploadBusy.is_retryable());
    }
}
