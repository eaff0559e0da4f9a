//! Execution-and-capture engine for user-submitted Python snippets.
//!
//! Each request runs one snippet in its own child interpreter: the child's
//! stdout/stderr pipes play the role of redirected output channels, an
//! embedded harness intercepts matplotlib's show() to serialize figures,
//! and a shared scratch workspace holds the resulting images between the
//! execution and their delivery. Executions are serialized end-to-end;
//! the per-process model also makes the execution deadline enforceable by
//! killing the child outright.

pub mod assemble;
pub mod capture;
pub mod engine;
pub mod errors;
pub mod plot;
pub mod workspace;

pub use assemble::{ExecuteRequest, ExecuteResponse, FigurePayload};
pub use capture::StreamCapture;
pub use engine::{EngineConfig, ExecutionEngine, ExecutionResult, SnippetExecutor};
pub use errors::EngineError;
pub use plot::CapturedFigure;
pub use workspace::WorkspaceManager;
