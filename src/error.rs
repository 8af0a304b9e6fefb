#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

use thiserror::Error;

/// Error code constants for type-safe error handling
pub mod code {
    pub const NOTFOUND: &str = "NOTFOUND";
    pub const INVALID: &str = "INVALID";
    pub const CONFLICT: &str = "CONFLICT";
    pub const UNAUTHORIZED: &str = "UNAUTHORIZED";
    pub const FORBIDDEN: &str = "FORBIDDEN";
    pub const DEPENDENCY: &str = "DEPENDENCY";
    pub const ABORTED: &str = "ABORTED";
    pub const INTERNAL: &str = "INTERNAL";
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("SQLx error: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Model service returned status {status}: {message}")]
    ModelStatus { status: u16, message: String },

    #[error("Model service error: {0}")]
    ModelError(String),

    #[error("Identity verifier error: {0}")]
    IdentityError(String),

    #[error("Turn aborted: {0}")]
    TurnAborted(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SessionError {
    /// Returns the protocol error code for this error
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::ConfigError(_) | Self::Validation(_) | Self::SerializationError(_) => {
                code::INVALID
            }
            Self::NotFound(_) => code::NOTFOUND,
            Self::Conflict(_) => code::CONFLICT,
            Self::Unauthorized(_) => code::UNAUTHORIZED,
            Self::Forbidden(_) => code::FORBIDDEN,
            Self::ModelStatus { status: 401 | 403, .. } => code::UNAUTHORIZED,
            Self::ModelStatus { .. }
            | Self::ModelError(_)
            | Self::IdentityError(_)
            | Self::IoError(_) => code::DEPENDENCY,
            Self::TurnAborted(_) => code::ABORTED,
            Self::DatabaseError(_) | Self::SqlxError(_) | Self::Internal(_) => code::INTERNAL,
        }
    }

    /// Returns the exit code for this error
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::ConfigError(_) => 2,
            Self::DatabaseError(_) | Self::SqlxError(_) => 3,
            Self::Validation(_) | Self::SerializationError(_) => 4,
            Self::NotFound(_) => 5,
            Self::Conflict(_) => 6,
            Self::Unauthorized(_) | Self::Forbidden(_) => 7,
            Self::ModelStatus { .. } | Self::ModelError(_) | Self::IdentityError(_) => 8,
            Self::IoError(_) => 9,
            Self::TurnAborted(_) => 10,
            Self::Internal(_) => 11,
        }
    }

    /// True when the model service rejected the call with a 403.
    #[must_use]
    pub const fn is_model_forbidden(&self) -> bool {
        matches!(self, Self::ModelStatus { status: 403, .. })
    }
}

/// Protocol error codes as documented for HTTP and WebSocket clients
pub const ERROR_CODES: &[(&str, &str, &str)] = &[
    (
        code::NOTFOUND,
        "Resource was not found",
        "List resources and verify identifier",
    ),
    (
        code::INVALID,
        "Invalid request payload",
        "Validate JSON syntax and ensure all required fields are present",
    ),
    (
        code::CONFLICT,
        "Conflicting state transition",
        "Fetch the session state and retry against the current values",
    ),
    (
        code::UNAUTHORIZED,
        "Credential missing or rejected",
        "Send a valid bearer token in the Authorization header",
    ),
    (
        code::FORBIDDEN,
        "Credential does not own this session",
        "Use the session that belongs to the verified principal",
    ),
    (
        code::DEPENDENCY,
        "External service failure",
        "Check model and identity endpoints and retry",
    ),
    (
        code::ABORTED,
        "Turn was aborted before it settled",
        "Resubmit the message to start a new turn",
    ),
    (
        code::INTERNAL,
        "Unexpected internal failure",
        "Inspect logs and retry",
    ),
];

/// Get error code details (description and fix) for a given error code
#[must_use]
pub fn get_error_info(error_code: &str) -> Option<(&'static str, &'static str)> {
    ERROR_CODES
        .iter()
        .find(|(code, _, _)| *code == error_code)
        .map(|(_, desc, fix)| (*desc, *fix))
}

pub type Result<T> = std::result::Result<T, SessionError>;
