//! Script execution seam.
//!
//! [`ProcessRunner`] runs one compiled script with a time limit and returns
//! whatever it wrote. [`ShellProcessRunner`] is the production
//! implementation; the trigger runner and tail loop only see the trait, so
//! tests substitute a recording fake.
//!
//! The child is started as the leader of a new process group. On timeout the
//! whole group receives `SIGKILL`, which also reaps background jobs that
//! would otherwise keep the output pipes open.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::error::SniffError;

const READ_CHUNK: usize = 8 * 1024;

/// How a script run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    /// Exited on its own; `code` is `None` when terminated by a signal
    Exited {
        /// Exit status code
        code: Option<i32>,
    },
    /// Killed after exceeding the time limit
    TimedOut,
}

/// Output of one script run.
///
/// After a normal exit both streams are `Some`, possibly empty. After a
/// timeout a stream that produced nothing before the kill is `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Captured standard output
    pub stdout: Option<Bytes>,
    /// Captured standard error
    pub stderr: Option<Bytes>,
    /// Termination status
    pub status: ProcessStatus,
}

/// Runs a script with a time limit.
pub trait ProcessRunner: Send + Sync + 'static {
    /// Runs `script` and waits at most `timeout` for it.
    ///
    /// # Errors
    /// [`SniffError::Launch`] when the process cannot be started. A timeout
    /// is not an error; it is reported through [`ProcessStatus::TimedOut`].
    fn run(
        &self,
        script: &Path,
        timeout: Duration,
    ) -> impl Future<Output = Result<ProcessOutput, SniffError>> + Send;
}

/// Runs scripts through an interpreter (`/bin/sh <script>` by default).
#[derive(Debug, Clone)]
pub struct ShellProcessRunner {
    shell: PathBuf,
    kill_grace: Duration,
}

impl Default for ShellProcessRunner {
    fn default() -> Self {
        Self::new("/bin/sh", Duration::from_millis(500))
    }
}

impl ShellProcessRunner {
    /// `kill_grace` bounds how long the pipes are drained after a kill.
    pub fn new(shell: impl Into<PathBuf>, kill_grace: Duration) -> Self {
        Self {
            shell: shell.into(),
            kill_grace,
        }
    }

    /// Interpreter path.
    pub fn shell(&self) -> &Path {
        &self.shell
    }
}

impl ProcessRunner for ShellProcessRunner {
    async fn run(&self, script: &Path, timeout: Duration) -> Result<ProcessOutput, SniffError> {
        let mut command = Command::new(&self.shell);
        command
            .arg(script)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command.spawn().map_err(|e| SniffError::Launch {
            script: script.display().to_string(),
            reason: e.to_string(),
        })?;
        let pid = child.id();

        let stdout_buf = Arc::new(Mutex::new(Vec::new()));
        let stderr_buf = Arc::new(Mutex::new(Vec::new()));
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(spawn_reader(stdout, Arc::clone(&stdout_buf)));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(spawn_reader(stderr, Arc::clone(&stderr_buf)));
        }

        let deadline = Instant::now() + timeout;

        // the run counts as finished only once the pipes are closed as well
        let finished = async {
            let status = child.wait().await;
            for reader in &mut readers {
                let _ = reader.await;
            }
            status
        };

        let waited = tokio::time::timeout_at(deadline, finished).await;
        let status = match waited {
            Ok(Ok(status)) => ProcessStatus::Exited {
                code: status.code(),
            },
            Ok(Err(e)) => {
                tracing::warn!(script = %script.display(), error = %e, "failed to wait for script");
                ProcessStatus::Exited { code: None }
            }
            Err(_) => {
                kill_process_group(pid);
                if let Err(e) = child.start_kill() {
                    tracing::debug!(script = %script.display(), error = %e, "child already gone");
                }
                let _ = child.wait().await;
                drain_readers(&mut readers, self.kill_grace).await;
                ProcessStatus::TimedOut
            }
        };

        let timed_out = status == ProcessStatus::TimedOut;
        Ok(ProcessOutput {
            stdout: take_buffer(&stdout_buf, timed_out),
            stderr: take_buffer(&stderr_buf, timed_out),
            status,
        })
    }
}

fn spawn_reader<S>(mut stream: S, sink: Arc<Mutex<Vec<u8>>>) -> JoinHandle<()>
where
    S: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut chunk = vec![0u8; READ_CHUNK];
        loop {
            match stream.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => sink
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .extend_from_slice(&chunk[..n]),
            }
        }
    })
}

/// Waits up to `grace` for the readers to reach EOF, then aborts them.
async fn drain_readers(readers: &mut [JoinHandle<()>], grace: Duration) {
    let deadline = Instant::now() + grace;
    for reader in readers.iter_mut() {
        if reader.is_finished() {
            continue;
        }
        if tokio::time::timeout_at(deadline, &mut *reader).await.is_err() {
            reader.abort();
        }
    }
}

fn take_buffer(buf: &Mutex<Vec<u8>>, timed_out: bool) -> Option<Bytes> {
    let data = std::mem::take(&mut *buf.lock().unwrap_or_else(PoisonError::into_inner));
    if timed_out && data.is_empty() {
        None
    } else {
        Some(Bytes::from(data))
    }
}

#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    let Some(pgid) = pid.and_then(|pid| libc::pid_t::try_from(pid).ok()) else {
        return;
    };
    // SAFETY: killpg(2) only sends a signal; pgid is the group this child
    // leads because it was spawned with process_group(0).
    let result = unsafe { libc::killpg(pgid, libc::SIGKILL) };
    if result != 0 {
        let err = std::io::Error::last_os_error();
        tracing::debug!(pgid, error = %err, "killpg failed");
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}
