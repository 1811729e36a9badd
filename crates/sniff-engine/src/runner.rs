//! Trigger runner -- runs a compiled script and persists its output.
//!
//! Output goes to `{output_dir}/{script_basename}.{epoch}.stdout` and
//! `.stderr`, opened in append mode so same-second re-triggers of one script
//! accumulate in one file. Nothing here returns an error to the caller: every
//! failure is logged and folded into the [`InvocationResult`].

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use logsniff_core::metrics as m;

use crate::clock::Clock;
use crate::error::SniffError;
use crate::process::{ProcessRunner, ProcessStatus};

/// Captured stream kind, also the capture file suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    /// Standard output
    Stdout,
    /// Standard error
    Stderr,
}

impl Stream {
    /// File suffix
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        }
    }
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How an invocation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvocationOutcome {
    /// Script exited before its timeout
    Completed {
        /// Exit code, `None` when killed by a signal
        exit_code: Option<i32>,
    },
    /// Script was killed at the time limit
    TimedOut {
        /// Configured time limit
        timeout: Duration,
    },
    /// Script could not be started
    LaunchFailed {
        /// OS error string
        reason: String,
    },
    /// Capture directory was not writable; nothing ran
    OutputDirUnwritable {
        /// Capture directory
        dir: PathBuf,
    },
}

impl InvocationOutcome {
    /// Metric label value
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed { .. } => "completed",
            Self::TimedOut { .. } => "timed_out",
            Self::LaunchFailed { .. } => "launch_failed",
            Self::OutputDirUnwritable { .. } => "output_dir_unwritable",
        }
    }
}

/// Result of one trigger.
#[derive(Debug, Clone)]
pub struct InvocationResult {
    /// Correlates the log records of one trigger
    pub invocation_id: Uuid,
    /// Script file name
    pub script_name: String,
    /// Unix epoch seconds at invocation start, part of the capture file names
    pub timestamp: u64,
    /// Captured stdout; `None` when nothing was captured
    pub stdout: Option<Bytes>,
    /// Captured stderr; `None` when nothing was captured
    pub stderr: Option<Bytes>,
    /// Outcome
    pub outcome: InvocationOutcome,
}

impl InvocationResult {
    /// Whether the script hit its time limit.
    pub fn timed_out(&self) -> bool {
        matches!(self.outcome, InvocationOutcome::TimedOut { .. })
    }

    /// Whether the script ran to completion with exit code 0.
    pub fn succeeded(&self) -> bool {
        matches!(
            self.outcome,
            InvocationOutcome::Completed { exit_code: Some(0) }
        )
    }
}

/// `{output_dir}/{script_name}.{epoch}.{stream}`
pub fn capture_path(output_dir: &Path, script_name: &str, epoch: u64, stream: Stream) -> PathBuf {
    output_dir.join(format!("{script_name}.{epoch}.{stream}"))
}

/// Trigger runner
pub struct TriggerRunner<R: ProcessRunner, C: Clock> {
    runner: Arc<R>,
    clock: Arc<C>,
}

impl<R: ProcessRunner, C: Clock> Clone for TriggerRunner<R, C> {
    fn clone(&self) -> Self {
        Self {
            runner: Arc::clone(&self.runner),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<R: ProcessRunner, C: Clock> TriggerRunner<R, C> {
    /// Creates a trigger runner.
    pub fn new(runner: Arc<R>, clock: Arc<C>) -> Self {
        Self { runner, clock }
    }

    /// Runs `script`, waits up to `timeout` and writes the captures into
    /// `output_dir`.
    pub async fn invoke(
        &self,
        script: &Path,
        output_dir: &Path,
        timeout: Duration,
    ) -> InvocationResult {
        let invocation_id = Uuid::new_v4();
        let script_name = script
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| script.display().to_string());
        let timestamp = self.clock.now_epoch_secs();

        let mut result = InvocationResult {
            invocation_id,
            script_name,
            timestamp,
            stdout: None,
            stderr: None,
            outcome: InvocationOutcome::OutputDirUnwritable {
                dir: output_dir.to_path_buf(),
            },
        };

        if !output_dir_writable(output_dir) {
            tracing::error!(
                %invocation_id,
                script = %result.script_name,
                dir = %output_dir.display(),
                "{}",
                SniffError::OutputDirUnwritable(output_dir.display().to_string())
            );
            record_outcome(&result.outcome);
            return result;
        }

        tracing::debug!(
            %invocation_id,
            script = %script.display(),
            timeout_secs = timeout.as_secs(),
            "running script"
        );

        let output = match self.runner.run(script, timeout).await {
            Ok(output) => output,
            Err(e) => {
                tracing::error!(%invocation_id, script = %result.script_name, error = %e, "failed to run script");
                let reason = match e {
                    SniffError::Launch { reason, .. } => reason,
                    other => other.to_string(),
                };
                result.outcome = InvocationOutcome::LaunchFailed { reason };
                record_outcome(&result.outcome);
                return result;
            }
        };

        result.stdout = output.stdout;
        result.stderr = output.stderr;

        match output.status {
            ProcessStatus::Exited { code } => {
                tracing::info!(
                    %invocation_id,
                    script = %result.script_name,
                    exit_code = ?code,
                    "script finished"
                );
                result.outcome = InvocationOutcome::Completed { exit_code: code };
            }
            ProcessStatus::TimedOut => {
                tracing::warn!(
                    %invocation_id,
                    script = %result.script_name,
                    timeout_secs = timeout.as_secs_f64(),
                    "timeout triggered while script running"
                );
                result.outcome = InvocationOutcome::TimedOut { timeout };
            }
        }

        for (stream, data) in [
            (Stream::Stdout, result.stdout.as_ref()),
            (Stream::Stderr, result.stderr.as_ref()),
        ] {
            self.persist(&result, output_dir, stream, data).await;
        }

        record_outcome(&result.outcome);
        result
    }

    async fn persist(
        &self,
        result: &InvocationResult,
        output_dir: &Path,
        stream: Stream,
        data: Option<&Bytes>,
    ) {
        let Some(data) = data else {
            tracing::info!(
                invocation_id = %result.invocation_id,
                script = %result.script_name,
                "no {stream} captured"
            );
            return;
        };

        let path = capture_path(output_dir, &result.script_name, result.timestamp, stream);
        match append_capture(&path, data).await {
            Ok(()) => tracing::info!(
                invocation_id = %result.invocation_id,
                script = %result.script_name,
                path = %path.display(),
                "script {stream} saved"
            ),
            Err(e) => {
                tracing::error!(
                    invocation_id = %result.invocation_id,
                    script = %result.script_name,
                    error = %e,
                    "failed to write {stream} capture"
                );
                metrics::counter!(m::CAPTURE_WRITE_FAILURES_TOTAL).increment(1);
            }
        }
    }
}

async fn append_capture(path: &Path, data: &[u8]) -> Result<(), SniffError> {
    let to_capture_err = |e: std::io::Error| SniffError::Capture {
        path: path.display().to_string(),
        reason: e.to_string(),
    };

    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(to_capture_err)?;
    file.write_all(data).await.map_err(to_capture_err)?;
    file.flush().await.map_err(to_capture_err)?;
    Ok(())
}

fn record_outcome(outcome: &InvocationOutcome) {
    metrics::counter!(m::INVOCATIONS_TOTAL, m::LABEL_RESULT => outcome.as_str()).increment(1);
}

/// Whether `dir` is an existing directory this process may write into.
#[cfg(unix)]
pub fn output_dir_writable(dir: &Path) -> bool {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    if !dir.is_dir() {
        return false;
    }
    let Ok(c_path) = CString::new(dir.as_os_str().as_bytes()) else {
        return false;
    };
    // SAFETY: access(2) only reads the NUL-terminated path, which outlives the call.
    unsafe { libc::access(c_path.as_ptr(), libc::W_OK) == 0 }
}

/// Whether `dir` is an existing directory this process may write into.
#[cfg(not(unix))]
pub fn output_dir_writable(dir: &Path) -> bool {
    std::fs::metadata(dir).is_ok_and(|m| m.is_dir() && !m.permissions().readonly())
}
