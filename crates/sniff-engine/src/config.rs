//! Engine settings
//!
//! [`EngineConfig`] is derived from the core [`LogSniffConfig`] and handed to
//! each component at construction time; nothing in the engine reads global
//! state.
//!
//! ```ignore
//! use logsniff_core::config::LogSniffConfig;
//! use logsniff_engine::config::EngineConfig;
//!
//! let config = EngineConfig::from_core(&LogSniffConfig::default());
//! ```

use std::path::PathBuf;
use std::time::Duration;

use logsniff_core::config::LogSniffConfig;

/// Reopen back-off policy for the tail loop.
///
/// The n-th consecutive failure waits `initial * multiplier^n`, capped at
/// `max`. With `multiplier = 1.0` every retry waits `initial`.
#[derive(Debug, Clone, PartialEq)]
pub struct ReopenBackoff {
    /// Delay before the first retry
    pub initial: Duration,
    /// Delay ceiling
    pub max: Duration,
    /// Growth factor per consecutive failure
    pub multiplier: f64,
}

impl ReopenBackoff {
    /// Delay to apply after `attempt` consecutive failures (0-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let factor = self.multiplier.max(1.0).powi(exponent);
        #[allow(clippy::cast_precision_loss)]
        let scaled_nanos = self.initial.as_nanos() as f64 * factor;
        #[allow(clippy::cast_precision_loss)]
        let max_nanos = self.max.as_nanos() as f64;
        if !scaled_nanos.is_finite() || scaled_nanos >= max_nanos {
            return self.max;
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let nanos = scaled_nanos as u64;
        Duration::from_nanos(nanos)
    }
}

impl Default for ReopenBackoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(1),
            multiplier: 1.0,
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Directory for compiled scripts
    pub script_dir: PathBuf,
    /// Directory for stdout/stderr captures
    pub output_dir: PathBuf,
    /// Interpreter used to launch scripts
    pub shell: PathBuf,
    /// Pipe drain window after killing a timed-out script
    pub kill_grace: Duration,
    /// Idle poll interval
    pub poll_interval: Duration,
    /// Reopen back-off
    pub backoff: ReopenBackoff,
    /// Longest line handed to the matcher (bytes)
    pub max_line_length: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from_core(&LogSniffConfig::default())
    }
}

impl EngineConfig {
    /// Builds the engine config from the daemon configuration.
    pub fn from_core(core: &LogSniffConfig) -> Self {
        Self {
            script_dir: PathBuf::from(&core.paths.script_dir),
            output_dir: PathBuf::from(&core.paths.output_dir),
            shell: PathBuf::from(&core.runner.shell),
            kill_grace: Duration::from_millis(core.runner.kill_grace_ms),
            poll_interval: Duration::from_millis(core.tail.poll_interval_ms),
            backoff: ReopenBackoff {
                initial: Duration::from_millis(core.tail.reopen_backoff_ms),
                max: Duration::from_millis(core.tail.max_reopen_backoff_ms),
                multiplier: core.tail.backoff_multiplier,
            },
            max_line_length: core.tail.max_line_length,
        }
    }
}

/// Builder for [`EngineConfig`], mostly used by tests and embedders.
#[derive(Default)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    /// Starts from the defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the script directory.
    pub fn script_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.script_dir = dir.into();
        self
    }

    /// Sets the capture directory.
    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    /// Sets the interpreter.
    pub fn shell(mut self, shell: impl Into<PathBuf>) -> Self {
        self.config.shell = shell.into();
        self
    }

    /// Sets the pipe drain window after a kill.
    pub fn kill_grace(mut self, grace: Duration) -> Self {
        self.config.kill_grace = grace;
        self
    }

    /// Sets the idle poll interval.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    /// Sets the reopen back-off.
    pub fn backoff(mut self, backoff: ReopenBackoff) -> Self {
        self.config.backoff = backoff;
        self
    }

    /// Sets the maximum line length.
    pub fn max_line_length(mut self, len: usize) -> Self {
        self.config.max_line_length = len;
        self
    }

    /// Returns the config.
    pub fn build(self) -> EngineConfig {
        self.config
    }
}
