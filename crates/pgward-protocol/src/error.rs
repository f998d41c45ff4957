//! Gateway error taxonomy
//!
//! Every failure the gateway can surface falls into one of these kinds.
//! Errors propagate unmodified from where they originate (handlers, the
//! safety gate, the session registry) up to the dispatcher, which logs the
//! category and hands the error to the transport layer. Nothing is retried
//! automatically.

use thiserror::Error;

/// Result alias used throughout the gateway crates.
pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

#[derive(Debug, Error)]
pub enum GatewayError {
    /// A write/DDL action arrived without transactional or autocommit intent.
    #[error(
        "write operation rejected: no active transaction and autocommit not requested. \
         Either begin a transaction with transaction.begin and pass its session_id, \
         or set autocommit=true to run this single statement outside a transaction"
    )]
    SafetyCheckFailed,

    /// `begin` attempted while the registry is at capacity.
    #[error("session limit reached ({limit} concurrent transactions); commit or roll back an existing session first")]
    SessionLimitExceeded { limit: usize },

    /// The referenced session is not in the registry (never existed, already
    /// closed, or reaped by the TTL).
    #[error("unknown session '{0}': it may have been committed, rolled back, or expired")]
    UnknownSession(String),

    /// A session-bound action was called without a session id.
    #[error("action '{0}' requires a session_id")]
    MissingSessionId(&'static str),

    /// An identifier argument failed sanitization.
    #[error("invalid identifier {name:?}: {reason}")]
    InvalidIdentifier { name: String, reason: &'static str },

    /// Parameter validation failed at the dispatch boundary.
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    /// An error originating from PostgreSQL, surfaced near-verbatim.
    #[error("database error{}: {message}", .code.as_deref().map(|c| format!(" [{c}]")).unwrap_or_default())]
    Database {
        /// SQLSTATE code when the server provided one.
        code: Option<String>,
        message: String,
    },

    /// A tool, action, or target not covered in this version.
    #[error("not implemented: {0}")]
    NotImplemented(String),

    /// Unexpected internal failures (teardown races, bugs). Opaque to callers.
    #[error("internal gateway error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Stable category tag for structured log records.
    pub fn category(&self) -> &'static str {
        match self {
            Self::SafetyCheckFailed => "safety_check_failed",
            Self::SessionLimitExceeded { .. } => "session_limit_exceeded",
            Self::UnknownSession(_) => "unknown_session",
            Self::MissingSessionId(_) => "missing_session_id",
            Self::InvalidIdentifier { .. } => "invalid_identifier",
            Self::InvalidParameters(_) => "invalid_parameters",
            Self::Database { .. } => "database",
            Self::NotImplemented(_) => "not_implemented",
            Self::Internal(_) => "internal",
        }
    }

    /// Whether the caller can act on this error without operator help.
    pub fn is_caller_actionable(&self) -> bool {
        !matches!(self, Self::Internal(_))
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::InvalidParameters(err.to_string())
    }
}
