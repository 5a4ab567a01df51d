//! Error types and process exit codes for the runtime.

use arc_core::ArcError;

/// Process exit codes used by the `arc` binary.
pub mod exit_codes {
    pub const FAILURE: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const PROTOCOL: i32 = 3;
    pub const TRANSPORT: i32 = 4;
    pub const STALLED: i32 = 5;
}

/// All errors that can occur in the runtime.
#[derive(thiserror::Error, Debug)]
pub enum RuntimeError {
    #[error(transparent)]
    Core(#[from] ArcError),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Timed out after {0} ms")]
    Timeout(u64),

    #[error("No element with id '{0}' on the page")]
    MissingElement(String),

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Queue actor stopped")]
    QueueClosed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RuntimeError {
    pub fn exit_code(&self) -> i32 {
        use exit_codes::*;
        match self {
            RuntimeError::Core(ArcError::Protocol { .. }) => PROTOCOL,
            RuntimeError::Core(_) | RuntimeError::Json(_) => FAILURE,
            RuntimeError::Transport(_) | RuntimeError::Timeout(_) => TRANSPORT,
            RuntimeError::QueueClosed => STALLED,
            RuntimeError::Config(_) | RuntimeError::Unsupported(_) => USAGE,
            RuntimeError::MissingElement(_) | RuntimeError::Io(_) => FAILURE,
        }
    }

    /// Whether this error is a response frame that broke the wire contract.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, RuntimeError::Core(ArcError::Protocol { .. }))
    }
}

impl From<reqwest::Error> for RuntimeError {
    fn from(e: reqwest::Error) -> Self {
        RuntimeError::Transport(e.to_string())
    }
}

impl From<url::ParseError> for RuntimeError {
    fn from(e: url::ParseError) -> Self {
        RuntimeError::Config(format!("Invalid URL: {e}"))
    }
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        let protocol = RuntimeError::from(ArcError::Protocol {
            raw: "oops".into(),
        });
        assert!(protocol.is_protocol_violation());
        assert_eq!(protocol.exit_code(), exit_codes::PROTOCOL);
        assert_eq!(
            protocol.to_string(),
            "Protocol violation: <No 'A' or 'D'> oops"
        );
        assert_eq!(
            RuntimeError::Transport("refused".into()).exit_code(),
            exit_codes::TRANSPORT
        );
        assert!(!RuntimeError::Timeout(5).is_protocol_violation());
    }
}
