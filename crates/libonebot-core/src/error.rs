//! Unified error types for the LibOneBot core.
//!
//! [`BuildError`] covers misconfiguration caught while assembling a
//! dispatcher, [`TransportError`] covers transport bind/send failures, and
//! [`ActionError`] is the retcode-carrying domain error an action handler
//! raises to fail a request with a specific protocol code.

use serde_json::Value;
use thiserror::Error;

use crate::retcode;

// =============================================================================
// Build Errors
// =============================================================================

/// Errors raised while assembling a dispatcher, before any traffic is served.
#[derive(Debug, Error)]
pub enum BuildError {
    /// No bot was registered.
    #[error("at least one bot is required")]
    NoBots,

    /// No transport was attached.
    #[error("at least one transport is required")]
    NoTransports,

    /// An action was registered under an empty name.
    #[error("action name must not be empty")]
    EmptyActionName,
}

// =============================================================================
// Transport Errors
// =============================================================================

/// Errors that can occur in transport operations.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// Invalid configuration, caught at construction.
    #[error("invalid transport configuration: {0}")]
    InvalidConfig(String),

    /// The transport already holds a dispatcher handle.
    #[error("transport is already bound to a dispatcher")]
    AlreadyBound,

    /// The transport was used before a dispatcher handle was assigned.
    #[error("transport is not bound to a dispatcher")]
    NotBound,

    /// Binding the listen address failed.
    #[error("failed to bind {addr}: {reason}")]
    Bind {
        /// The host:port that could not be bound.
        addr: String,
        /// Reason for failure.
        reason: String,
    },

    /// Delivery to a peer or remote endpoint failed.
    #[error("failed to send: {0}")]
    SendFailed(String),

    /// Payload encoding or decoding failed.
    #[error("codec error: {0}")]
    Codec(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

// =============================================================================
// Action Errors
// =============================================================================

/// A protocol-coded failure raised by an action handler.
///
/// Handlers return `anyhow::Result<Value>`; an `ActionError` inside the
/// `anyhow::Error` passes its retcode, message and data through to the
/// response unchanged, while any other error is collapsed to retcode 20002.
#[derive(Debug, Clone, Error)]
#[error("action failed with retcode {retcode}: {message}")]
pub struct ActionError {
    /// Protocol retcode, see [`crate::retcode`].
    pub retcode: i64,
    /// Human-readable description, may be empty.
    pub message: String,
    /// Structured error payload, `Null` when absent.
    pub data: Value,
}

impl ActionError {
    /// Creates an error with an arbitrary retcode.
    pub fn new(retcode: i64, message: impl Into<String>) -> Self {
        Self {
            retcode,
            message: message.into(),
            data: Value::Null,
        }
    }

    /// Attaches a structured error payload.
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    /// Retcode 10001, the request itself is malformed.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(retcode::BAD_REQUEST, message)
    }

    /// Retcode 10002, the action name is not registered.
    pub fn unsupported_action(message: impl Into<String>) -> Self {
        Self::new(retcode::UNSUPPORTED_ACTION, message)
    }

    /// Retcode 10003, a parameter is missing or mistyped.
    pub fn bad_param(message: impl Into<String>) -> Self {
        Self::new(retcode::BAD_PARAM, message)
    }

    /// Retcode 10004, a parameter is not declared by the action.
    pub fn unsupported_param(message: impl Into<String>) -> Self {
        Self::new(retcode::UNSUPPORTED_PARAM, message)
    }

    /// Retcode 10005, a message segment type is not supported.
    pub fn unsupported_segment(message: impl Into<String>) -> Self {
        Self::new(retcode::UNSUPPORTED_SEGMENT, message)
    }

    /// Retcode 10006, a message segment carries malformed data.
    pub fn bad_segment_data(message: impl Into<String>) -> Self {
        Self::new(retcode::BAD_SEGMENT_DATA, message)
    }

    /// Retcode 10007, a message segment carries unsupported data.
    pub fn unsupported_segment_data(message: impl Into<String>) -> Self {
        Self::new(retcode::UNSUPPORTED_SEGMENT_DATA, message)
    }

    /// Retcode 10101, a multi-bot implementation needs a bot selector.
    pub fn who_am_i(message: impl Into<String>) -> Self {
        Self::new(retcode::WHO_AM_I, message)
    }

    /// Retcode 10102, the bot selector matches no registered bot.
    pub fn unknown_self(message: impl Into<String>) -> Self {
        Self::new(retcode::UNKNOWN_SELF, message)
    }

    /// Retcode 20001, the handler is unusable.
    pub fn bad_handler(message: impl Into<String>) -> Self {
        Self::new(retcode::BAD_HANDLER, message)
    }

    /// Retcode 20002, the handler failed without a protocol code.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(retcode::INTERNAL_HANDLER_ERROR, message)
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Result type for dispatcher assembly.
pub type BuildResult<T> = Result<T, BuildError>;
