//! Error types for study memos.
//!
//! Uses thiserror for ergonomic error definitions. Remote failures carry
//! enough detail to be logged; the orchestrator decides whether they are
//! fatal (almost never) or a reason to fall back to the next tier.

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    // Remote catalog errors
    #[error("Orthanc API error {status}: {message}")]
    Remote { status: u16, message: String },

    #[error("Orthanc request failed: {0}")]
    Transport(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Study not found: {0}")]
    StudyNotFound(String),

    #[error("Study has no instances: {0}")]
    EmptyStudy(String),

    // Local tier errors
    #[error("Local backup error: {0}")]
    Storage(#[from] memo_storage::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

// Convenience conversions
impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidPayload(format!("JSON parsing error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = Error::Remote {
            status: 500,
            message: "boom".to_string(),
        };
        assert_eq!(err.to_string(), "Orthanc API error 500: boom");

        let err = Error::from(memo_storage::Error::Internal("disk full".to_string()));
        assert!(matches!(err, Error::Storage(_)));
        assert_eq!(err.to_string(), "Local backup error: Internal error: disk full");
    }

    #[test]
    fn test_json_error_is_invalid_payload() {
        let err = Error::from(serde_json::from_str::<serde_json::Value>("{").unwrap_err());
        assert!(matches!(err, Error::InvalidPayload(_)));
    }
}
