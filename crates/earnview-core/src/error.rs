//! Error types for Earnview Core

use thiserror::Error;

/// Result type alias for controller operations
pub type Result<T> = std::result::Result<T, Error>;

/// Controller error types
#[derive(Error, Debug)]
pub enum Error {
    // Session errors
    #[error("No active playback session")]
    NoActiveSession,

    #[error("Watch target not reached: {watched}s of {target}s")]
    TargetNotReached { watched: u32, target: u32 },

    #[error("Queue is empty")]
    EmptyQueue,

    #[error("No deferred claim to resubmit")]
    NoPendingClaim,

    // Embed errors
    #[error("Embed surface error: {0}")]
    Surface(String),

    #[error("Malformed embed message: {0}")]
    MalformedMessage(String),

    #[error("Video source could not be resolved: {0}")]
    UnresolvableSource(String),

    // Remote errors
    #[error("Network error: {0}")]
    Network(String),

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Connection timeout")]
    ConnectionTimeout,

    #[error("Rejected by server: {message}")]
    Rejected {
        code: Option<String>,
        message: String,
    },

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a server rejection without an error code
    pub fn rejected(message: impl Into<String>) -> Self {
        Error::Rejected {
            code: None,
            message: message.into(),
        }
    }

    /// Returns true for connectivity-class failures.
    ///
    /// These leave the user unable to retry successfully until the device is
    /// back online, so they surface as a persistent offline indicator rather
    /// than a one-shot error.
    pub fn is_network(&self) -> bool {
        match self {
            Error::Network(_) | Error::ConnectionTimeout => true,
            Error::Transport(e) => !e.is_decode() && !e.is_status() && !e.is_builder(),
            _ => false,
        }
    }

    /// Returns true if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        self.is_network() || matches!(self, Error::Surface(_) | Error::MalformedMessage(_))
    }

    /// Returns the error code for event logs
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::NoActiveSession => "NO_SESSION",
            Error::TargetNotReached { .. } => "TARGET_NOT_REACHED",
            Error::EmptyQueue => "EMPTY_QUEUE",
            Error::NoPendingClaim => "NO_PENDING_CLAIM",
            Error::Surface(_) => "SURFACE",
            Error::MalformedMessage(_) => "MALFORMED_MESSAGE",
            Error::UnresolvableSource(_) => "UNRESOLVABLE_SOURCE",
            Error::Network(_) => "NETWORK",
            Error::Transport(_) => "TRANSPORT",
            Error::ConnectionTimeout => "TIMEOUT",
            Error::Rejected { .. } => "REJECTED",
            Error::InvalidConfig(_) => "INVALID_CONFIG",
            Error::Json(_) => "JSON",
            Error::Io(_) => "IO",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_classification() {
        assert!(Error::Network("offline".into()).is_network());
        assert!(Error::ConnectionTimeout.is_network());
        assert!(!Error::rejected("already completed").is_network());
        assert!(!Error::NoActiveSession.is_network());
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(Error::rejected("nope").error_code(), "REJECTED");
        assert_eq!(
            Error::TargetNotReached { watched: 3, target: 30 }.error_code(),
            "TARGET_NOT_REACHED"
        );
        assert!(Error::Surface("gone".into()).is_recoverable());
        assert!(!Error::InvalidConfig("x".into()).is_recoverable());
    }
}
