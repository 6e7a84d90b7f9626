//! Error types for the station map crates.

use thiserror::Error;

use crate::station::StationId;

/// Result type alias using StationError.
pub type StationResult<T> = Result<T, StationError>;

/// How an error is presented to the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad credentials or an expired session. Never retried.
    Auth,
    /// A rejected payload. Shown inline next to the form that caused it.
    Validation,
    /// Connectivity, timeout or server trouble. Shown as a dismissible notice.
    Network,
}

/// Primary error type for station operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StationError {
    // === Authentication Errors ===
    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Sign-in failed: {0}")]
    LoginFailed(String),

    #[error("Session expired")]
    SessionExpired,

    #[error("Not signed in")]
    NotAuthenticated,

    // === Payload Errors ===
    #[error("Invalid value for '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error("Rejected by station service: {0}")]
    Rejected(String),

    #[error("Station not found: {0}")]
    NotFound(StationId),

    // === Transport Errors ===
    #[error("Request timed out")]
    Timeout,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Station service error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("Unexpected response from station service: {0}")]
    Decode(String),
}

impl StationError {
    /// Shorthand for a field-level validation failure.
    pub fn invalid_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        StationError::InvalidField {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Classify this error for presentation.
    pub fn kind(&self) -> ErrorKind {
        match self {
            StationError::InvalidCredentials
            | StationError::LoginFailed(_)
            | StationError::SessionExpired
            | StationError::NotAuthenticated => ErrorKind::Auth,

            StationError::InvalidField { .. }
            | StationError::Rejected(_)
            | StationError::NotFound(_) => ErrorKind::Validation,

            StationError::Timeout
            | StationError::Network(_)
            | StationError::Server { .. }
            | StationError::Decode(_) => ErrorKind::Network,
        }
    }

    /// Reads are idempotent, so only transport-level failures are worth repeating.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Network
    }

    /// Text shown to the operator.
    pub fn user_message(&self) -> String {
        match self.kind() {
            ErrorKind::Auth => match self {
                StationError::InvalidCredentials => {
                    "Invalid username or password. Please try again.".to_string()
                }
                _ => "Your session has ended. Please sign in again.".to_string(),
            },
            ErrorKind::Validation => self.to_string(),
            ErrorKind::Network => format!("{}. Please try again.", self),
        }
    }
}

impl From<serde_json::Error> for StationError {
    fn from(err: serde_json::Error) -> Self {
        StationError::Decode(err.to_string())
    }
}
