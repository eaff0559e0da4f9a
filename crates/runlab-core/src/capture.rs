//! Scoped capture of a child process's output streams.
//!
//! Each execution gets its own child process, so its stdout/stderr are
//! private pipes rather than rebound process-wide channels; acquiring the
//! capture takes ownership of both pipes and drains them into accumulating
//! buffers on background tasks. Restoration is structural: the pipes close
//! with the process group on every exit path, including a kill. The buffers
//! are shared with the drain tasks so that `finish_within` can hand back
//! whatever was captured even when a leaked grandchild keeps a pipe open
//! past the execution deadline.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Child;
use tokio::task::JoinHandle;

use crate::errors::{EngineError, Result};

/// Accumulates a child's stdout and stderr until the pipes close.
#[derive(Debug)]
pub struct StreamCapture {
    stdout_buf: Arc<Mutex<Vec<u8>>>,
    stderr_buf: Arc<Mutex<Vec<u8>>>,
    stdout_task: JoinHandle<()>,
    stderr_task: JoinHandle<()>,
}

impl StreamCapture {
    /// Take ownership of the child's piped streams and start draining them.
    ///
    /// Fails if the child was not spawned with both streams piped. Must be
    /// attached at most once per child.
    pub fn attach(child: &mut Child) -> Result<Self> {
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::capture("child stdout was not piped"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| EngineError::capture("child stderr was not piped"))?;

        let stdout_buf = Arc::new(Mutex::new(Vec::new()));
        let stderr_buf = Arc::new(Mutex::new(Vec::new()));
        Ok(Self {
            stdout_task: tokio::spawn(drain(stdout, stdout_buf.clone())),
            stderr_task: tokio::spawn(drain(stderr, stderr_buf.clone())),
            stdout_buf,
            stderr_buf,
        })
    }

    /// Wait for both pipes to close and return (stdout, stderr) text.
    pub async fn finish(mut self) -> (String, String) {
        let _ = (&mut self.stdout_task).await;
        let _ = (&mut self.stderr_task).await;
        self.take_buffers()
    }

    /// Like `finish`, but gives up after `grace` and returns whatever was
    /// captured so far.
    ///
    /// The pipes normally close with the last process holding them; the
    /// grace bound covers a process that escaped the execution's process
    /// group and still holds a write end open.
    pub async fn finish_within(mut self, grace: Duration) -> (String, String) {
        let drained = tokio::time::timeout(grace, async {
            let _ = (&mut self.stdout_task).await;
            let _ = (&mut self.stderr_task).await;
        })
        .await;
        if drained.is_err() {
            log::warn!("child streams still open after {:?}, abandoning drain", grace);
            self.stdout_task.abort();
            self.stderr_task.abort();
        }
        self.take_buffers()
    }

    fn take_buffers(&self) -> (String, String) {
        (take_text(&self.stdout_buf), take_text(&self.stderr_buf))
    }
}

fn take_text(buf: &Mutex<Vec<u8>>) -> String {
    let bytes = match buf.lock() {
        Ok(mut guard) => std::mem::take(&mut *guard),
        Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
    };
    String::from_utf8_lossy(&bytes).into_owned()
}

async fn drain<R: AsyncRead + Unpin>(mut stream: R, buf: Arc<Mutex<Vec<u8>>>) {
    let mut chunk = [0u8; 8192];
    loop {
        match stream.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                if let Ok(mut guard) = buf.lock() {
                    guard.extend_from_slice(&chunk[..n]);
                }
            }
            Err(e) => {
                log::warn!("error draining child stream: {}", e);
                break;
            }
        }
    }
}
