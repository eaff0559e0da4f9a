//! Error types for the execution engine.
//!
//! Engine errors cover infrastructure failures only: a missing interpreter,
//! an unusable workspace, a spawn that never started. Failures raised by the
//! snippet itself are never represented here; they travel back to the caller
//! as captured stderr text inside a normal `ExecutionResult`.

use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Error, Debug)]
pub enum EngineError {
    /// The configured interpreter could not be resolved on this host.
    #[error("Interpreter not found: {0}")]
    Interpreter(String),

    /// The workspace directory could not be created or accessed.
    #[error("Workspace error: {0}")]
    Workspace(String),

    /// The child process could not be spawned.
    #[error("Failed to spawn snippet process: {0}")]
    Spawn(String),

    /// A stream of the child process could not be captured.
    #[error("Stream capture error: {0}")]
    Capture(String),

    /// A requested workspace file does not exist.
    #[error("File not found in workspace: {0}")]
    FileNotFound(String),

    /// A requested filename escapes the workspace directory.
    #[error("Invalid workspace filename: {0}")]
    InvalidFilename(String),

    /// I/O error outside the snippet's own execution.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Create a new workspace error.
    pub fn workspace(msg: impl Into<String>) -> Self {
        Self::Workspace(msg.into())
    }

    /// Create a new capture error.
    pub fn capture(msg: impl Into<String>) -> Self {
        Self::Capture(msg.into())
    }
}
