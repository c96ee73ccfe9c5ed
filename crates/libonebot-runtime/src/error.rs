//! Runtime error types.

use libonebot_core::error::{BuildError, TransportError};
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while loading configuration or running an
/// implementation.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// An explicitly requested configuration file does not exist.
    #[error("configuration file not found: {0}")]
    FileNotFound(PathBuf),

    /// Configuration could not be parsed or extracted.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Assembling the implementation failed.
    #[error(transparent)]
    Build(#[from] BuildError),

    /// A transport could not be constructed or started.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
