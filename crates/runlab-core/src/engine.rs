//! Execution engine: runs one snippet per child interpreter process.
//!
//! Failures raised by the snippet never propagate outward as errors; they
//! are converted into result data so the caller can display the snippet's
//! own traceback. `Err` is reserved for infrastructure failures such as a
//! missing interpreter or a spawn that never started.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::capture::StreamCapture;
use crate::errors::{EngineError, Result};
use crate::plot::{self, CapturedFigure};
use crate::workspace::WorkspaceManager;

// Bound on draining the output pipes after the snippet's process group is
// gone; covers a process that escaped the group and still holds a write end.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

// Unix-specific process control so the deadline can reclaim everything the
// snippet spawned, not just the harness leader.
#[cfg(unix)]
mod unix_process {
    use libc::{c_int, pid_t};

    /// Send a signal to a process group (negative PID targets the group).
    ///
    /// Safety: kill() is a simple syscall with no memory safety concerns.
    pub fn kill_process_group(pgid: u32, signal: c_int) {
        let rc = unsafe { libc::kill(-(pgid as pid_t), signal) };
        if rc != 0 {
            // ESRCH here just means the group already exited.
            log::debug!(
                "kill of process group {} returned: {}",
                pgid,
                std::io::Error::last_os_error()
            );
        }
    }

    /// SIGKILL signal number
    pub const SIGKILL: c_int = libc::SIGKILL;
}

/// Outcome of one snippet execution. Produced exactly once per request;
/// even on snippet failure the fields already captured are delivered.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub stdout_text: String,
    pub stderr_text: String,
    pub figures: Vec<CapturedFigure>,
}

#[async_trait]
pub trait SnippetExecutor: Send + Sync {
    async fn run(&self, code: &str) -> Result<ExecutionResult>;
}

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Interpreter name or path, resolved through PATH at construction.
    pub python_bin: String,
    /// Wall-clock deadline for one execution.
    pub timeout: Duration,
    /// Scratch directory shared by all executions.
    pub workspace_dir: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            python_bin: "python3".to_string(),
            timeout: Duration::from_secs(30),
            workspace_dir: std::env::temp_dir().join("runlab"),
        }
    }
}

#[derive(Debug)]
pub struct ExecutionEngine {
    workspace: WorkspaceManager,
    python_path: PathBuf,
    timeout: Duration,
    // Serializes executions end-to-end: the shared workspace holds at most
    // one execution's figures between two runs.
    exec_lock: Mutex<()>,
}

impl ExecutionEngine {
    pub fn new(config: EngineConfig) -> Result<Self> {
        let python_path = which::which(&config.python_bin).map_err(|e| {
            EngineError::Interpreter(format!("could not resolve '{}': {}", config.python_bin, e))
        })?;
        let workspace = WorkspaceManager::new(config.workspace_dir)?;
        log::info!(
            "execution engine ready: interpreter {}, workspace {}, deadline {:?}",
            python_path.display(),
            workspace.root().display(),
            config.timeout
        );
        Ok(Self {
            workspace,
            python_path,
            timeout: config.timeout,
            exec_lock: Mutex::new(()),
        })
    }

    /// The workspace this engine writes figures into.
    pub fn workspace(&self) -> &WorkspaceManager {
        &self.workspace
    }
}

#[async_trait]
impl SnippetExecutor for ExecutionEngine {
    async fn run(&self, code: &str) -> Result<ExecutionResult> {
        // Held across the whole run, cleanup included, so a second request
        // cannot purge figures the first is still producing or serving.
        let _guard = self.exec_lock.lock().await;

        self.workspace.prepare();

        let scratch = tempfile::Builder::new()
            .prefix("runlab-exec-")
            .tempdir()
            .map_err(|e| EngineError::workspace(format!("could not create scratch dir: {}", e)))?;
        let harness_path = scratch.path().join("harness.py");
        let snippet_path = scratch.path().join(format!("snippet_{}.py", Uuid::new_v4()));
        tokio::fs::write(&harness_path, plot::PY_HARNESS).await?;
        tokio::fs::write(&snippet_path, code).await?;

        let mut command = Command::new(&self.python_path);
        command
            .arg(&harness_path)
            .arg(self.workspace.root())
            .arg(&snippet_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own process group, so grandchildren the snippet spawns can be
        // reclaimed together with the harness.
        #[cfg(unix)]
        command.process_group(0);
        let mut child = command
            .spawn()
            .map_err(|e| EngineError::Spawn(e.to_string()))?;
        // PGID equals the leader PID; id() is gone once the child is reaped.
        #[cfg(unix)]
        let pgid = child.id();

        let capture = StreamCapture::attach(&mut child)?;

        let mut timed_out = false;
        tokio::select! {
            status = child.wait() => {
                match status {
                    Ok(status) if !status.success() => {
                        log::debug!("snippet process exited with {}", status);
                    }
                    Ok(_) => {}
                    Err(e) => return Err(EngineError::Io(e)),
                }
            }
            _ = tokio::time::sleep(self.timeout) => {
                log::warn!("snippet exceeded {:?} deadline, killing process group", self.timeout);
                let _ = child.start_kill();
                let _ = child.wait().await;
                timed_out = true;
            }
        }

        // The execution scope ends here: reclaim anything still running in
        // the snippet's process group so it cannot keep the output pipes
        // open or write into the workspace after the next prepare().
        #[cfg(unix)]
        if let Some(pgid) = pgid {
            unix_process::kill_process_group(pgid, unix_process::SIGKILL);
        }

        let (stdout_text, mut stderr_text) = capture.finish_within(DRAIN_GRACE).await;
        if timed_out {
            if !stderr_text.is_empty() && !stderr_text.ends_with('\n') {
                stderr_text.push('\n');
            }
            stderr_text.push_str(&format!(
                "Execution timed out after {} seconds\n",
                self.timeout.as_secs()
            ));
        }

        // Final sweep: figures the snippet saved before finishing (or before
        // the deadline) are still collected.
        let figures = plot::collect_figures(self.workspace.root());

        Ok(ExecutionResult {
            stdout_text,
            stderr_text,
            figures,
        })
    }
}
