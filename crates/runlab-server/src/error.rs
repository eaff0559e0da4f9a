//! Error types for the runlab server.

use thiserror::Error;

/// Result type alias for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;

/// Errors that can occur in the runlab server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Missing required field
    #[error("Missing required field: {0}")]
    MissingField(String),

    /// Execution engine failure; carries the workspace-file errors the
    /// temp endpoint maps to 400/404 as well as 500-level infrastructure
    /// failures
    #[error("Engine error: {0}")]
    Engine(#[from] runlab_core::EngineError),

    /// Server configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal server error
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Create a new missing field error.
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField(field.into())
    }

    /// Create a new configuration error.
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

/// Convert ServerError to HTTP status code
impl ServerError {
    pub fn status_code(&self) -> u16 {
        match self {
            ServerError::MissingField(_) => 400,
            ServerError::Engine(runlab_core::EngineError::InvalidFilename(_)) => 400,
            ServerError::Engine(runlab_core::EngineError::FileNotFound(_)) => 404,
            ServerError::Engine(_) | ServerError::Config(_) | ServerError::Internal(_) => 500,
        }
    }
}
