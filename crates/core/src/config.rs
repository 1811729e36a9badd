//! Configuration -- `log-sniff.toml` parsing and runtime settings
//!
//! [`LogSniffConfig`] is the top-level structure; every component reads only
//! its own section and receives it at construction time.
//!
//! # Precedence
//! 1. CLI arguments (highest)
//! 2. Environment variables (`LOGSNIFF_TAIL_POLL_INTERVAL_MS=10` style)
//! 3. Config file (`log-sniff.toml`)
//! 4. Defaults (`Default` impls)
//!
//! # Example
//! ```no_run
//! # async fn example() -> Result<(), logsniff_core::error::LogSniffError> {
//! use logsniff_core::config::LogSniffConfig;
//!
//! // file + env overrides
//! let config = LogSniffConfig::load("/etc/log-sniff/log-sniff.toml").await?;
//!
//! // straight from a TOML string
//! let config = LogSniffConfig::parse("[general]\nlog_level = \"debug\"")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, LogSniffError};

/// log-sniff configuration root.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogSniffConfig {
    /// General settings
    #[serde(default)]
    pub general: GeneralConfig,
    /// Filesystem locations
    #[serde(default)]
    pub paths: PathsConfig,
    /// Tail-match loop tuning
    #[serde(default)]
    pub tail: TailConfig,
    /// Script execution
    #[serde(default)]
    pub runner: RunnerConfig,
    /// Prometheus endpoint
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl LogSniffConfig {
    /// Loads a TOML file, applies environment overrides and validates.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, LogSniffError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Loads a TOML file without environment overrides.
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, LogSniffError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                LogSniffError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                LogSniffError::Io(e)
            }
        })?;
        Self::parse(&content)
    }

    /// Parses a TOML string. Missing sections and fields fall back to defaults.
    pub fn parse(toml_str: &str) -> Result<Self, LogSniffError> {
        toml::from_str(toml_str).map_err(|e| {
            LogSniffError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// Overrides values from `LOGSNIFF_{SECTION}_{FIELD}` environment variables.
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "LOGSNIFF_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "LOGSNIFF_GENERAL_LOG_FORMAT");
        override_string(&mut self.general.pid_file, "LOGSNIFF_GENERAL_PID_FILE");

        // Paths
        override_string(&mut self.paths.definitions, "LOGSNIFF_PATHS_DEFINITIONS");
        override_string(&mut self.paths.script_dir, "LOGSNIFF_PATHS_SCRIPT_DIR");
        override_string(&mut self.paths.output_dir, "LOGSNIFF_PATHS_OUTPUT_DIR");

        // Tail
        override_u64(
            &mut self.tail.poll_interval_ms,
            "LOGSNIFF_TAIL_POLL_INTERVAL_MS",
        );
        override_u64(
            &mut self.tail.reopen_backoff_ms,
            "LOGSNIFF_TAIL_REOPEN_BACKOFF_MS",
        );
        override_u64(
            &mut self.tail.max_reopen_backoff_ms,
            "LOGSNIFF_TAIL_MAX_REOPEN_BACKOFF_MS",
        );
        override_f64(
            &mut self.tail.backoff_multiplier,
            "LOGSNIFF_TAIL_BACKOFF_MULTIPLIER",
        );
        override_usize(
            &mut self.tail.max_line_length,
            "LOGSNIFF_TAIL_MAX_LINE_LENGTH",
        );

        // Runner
        override_string(&mut self.runner.shell, "LOGSNIFF_RUNNER_SHELL");
        override_u64(&mut self.runner.kill_grace_ms, "LOGSNIFF_RUNNER_KILL_GRACE_MS");

        // Metrics
        override_bool(&mut self.metrics.enabled, "LOGSNIFF_METRICS_ENABLED");
        override_string(
            &mut self.metrics.listen_addr,
            "LOGSNIFF_METRICS_LISTEN_ADDR",
        );
        override_u16(&mut self.metrics.port, "LOGSNIFF_METRICS_PORT");
    }

    /// Validates every section.
    pub fn validate(&self) -> Result<(), LogSniffError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        for (field, value) in [
            ("paths.definitions", &self.paths.definitions),
            ("paths.script_dir", &self.paths.script_dir),
            ("paths.output_dir", &self.paths.output_dir),
            ("runner.shell", &self.runner.shell),
        ] {
            if value.is_empty() {
                return Err(invalid(field, "must not be empty".to_owned()));
            }
            if !Path::new(value).is_absolute() {
                return Err(invalid(field, format!("'{value}' must be an absolute path")));
            }
        }

        if self.tail.poll_interval_ms == 0 {
            return Err(invalid(
                "tail.poll_interval_ms",
                "must be greater than 0".to_owned(),
            ));
        }

        if self.tail.reopen_backoff_ms == 0 {
            return Err(invalid(
                "tail.reopen_backoff_ms",
                "must be greater than 0".to_owned(),
            ));
        }

        if self.tail.max_reopen_backoff_ms < self.tail.reopen_backoff_ms {
            return Err(invalid(
                "tail.max_reopen_backoff_ms",
                "must not be smaller than tail.reopen_backoff_ms".to_owned(),
            ));
        }

        if !self.tail.backoff_multiplier.is_finite() || self.tail.backoff_multiplier < 1.0 {
            return Err(invalid(
                "tail.backoff_multiplier",
                "must be a finite number >= 1.0".to_owned(),
            ));
        }

        if self.tail.max_line_length == 0 {
            return Err(invalid(
                "tail.max_line_length",
                "must be greater than 0".to_owned(),
            ));
        }

        if self.metrics.enabled && self.metrics.port == 0 {
            return Err(invalid(
                "metrics.port",
                "must be non-zero when metrics are enabled".to_owned(),
            ));
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: String) -> LogSniffError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason,
    }
    .into()
}

/// General settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log format (json, pretty)
    pub log_format: String,
    /// PID/lock file path; empty disables it
    pub pid_file: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
            pid_file: "/var/run/log-sniff.pid".to_owned(),
        }
    }
}

/// Filesystem locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Sniff definition file, or a directory of `.yml`/`.yaml` files
    pub definitions: String,
    /// Where compiled scripts are written
    pub script_dir: String,
    /// Where stdout/stderr captures are appended
    pub output_dir: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            definitions: "/etc/log-sniff".to_owned(),
            script_dir: "/var/lib/log-sniff/shell".to_owned(),
            output_dir: "/var/log/log-sniff/scripts".to_owned(),
        }
    }
}

/// Tail-match loop tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TailConfig {
    /// Idle poll interval (milliseconds)
    pub poll_interval_ms: u64,
    /// First reopen delay after the log becomes unavailable (milliseconds)
    pub reopen_backoff_ms: u64,
    /// Ceiling for the reopen delay (milliseconds)
    pub max_reopen_backoff_ms: u64,
    /// Growth factor applied to the delay after each failed reopen
    pub backoff_multiplier: f64,
    /// Lines longer than this are truncated before matching (bytes)
    pub max_line_length: usize,
}

impl Default for TailConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 5,
            reopen_backoff_ms: 1000,
            max_reopen_backoff_ms: 1000,
            backoff_multiplier: 1.0,
            max_line_length: 64 * 1024, // 64KB
        }
    }
}

/// Script execution
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Interpreter used to launch compiled scripts
    pub shell: String,
    /// How long to keep draining pipes after a timed-out child is killed (milliseconds)
    pub kill_grace_ms: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            shell: "/bin/sh".to_owned(),
            kill_grace_ms: 500,
        }
    }
}

/// Prometheus endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Whether the exporter is installed
    pub enabled: bool,
    /// Listen address
    pub listen_addr: String,
    /// Listen port
    pub port: u16,
    /// Scrape path
    pub endpoint: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1".to_owned(),
            port: 9187,
            endpoint: "/metrics".to_owned(),
        }
    }
}

// --- environment override helpers ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_usize(target: &mut usize, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<usize>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse usize from env var, ignoring"
            ),
        }
    }
}

fn override_u16(target: &mut u16, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u16>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u16 from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}

fn override_f64(target: &mut f64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<f64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse f64 from env var, ignoring"
            ),
        }
    }
}
