//! Error types for the deskstream core

/// Result type alias using the core Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in codec, settings and geometry operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Control message did not match any known op
    #[error("Unknown control op: {0}")]
    UnknownOp(String),

    /// Control message had a recognised op but malformed arguments
    #[error("Malformed control message: {0}")]
    MalformedMessage(String),

    /// Server event envelope could not be decoded
    #[error("Malformed server event: {0}")]
    MalformedEvent(String),

    /// Aux-channel frame exceeded the chunk payload limit
    #[error("Frame payload of {len} bytes exceeds limit of {max}")]
    FrameTooLarge { len: usize, max: usize },

    /// Aux-channel frame had an unknown prefix byte or was empty
    #[error("Invalid aux frame: {0}")]
    InvalidFrame(String),

    /// Setting value failed validation against its schema entry
    #[error("Invalid setting {name}: {reason}")]
    InvalidSetting { name: String, reason: String },

    /// Preference store I/O error
    #[error("Preference store error: {0}")]
    Store(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::UnknownOp("zz".to_string());
        assert_eq!(err.to_string(), "Unknown control op: zz");

        let err = Error::FrameTooLarge {
            len: 65536,
            max: 65535,
        };
        assert!(err.to_string().contains("65536"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err = Error::from(io_err);
        assert!(matches!(err, Error::Io(_)));
    }
}
