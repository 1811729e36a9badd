//! CLI argument definitions for logsniff-daemon.
//!
//! Flags given here are the last layer of configuration: they win over the
//! config file and `LOGSNIFF_*` environment variables.

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Parser;

use logsniff_core::config::LogSniffConfig;

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/log-sniff/log-sniff.toml";

/// log-sniff daemon.
///
/// Compiles sniff definitions into shell scripts, follows the watched log
/// files and runs the script of every rule whose pattern matches a new line.
#[derive(Parser, Debug)]
#[command(name = "logsniff-daemon")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Path to log-sniff.toml. Built-in defaults are used when the file is
    /// missing.
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    #[arg(long)]
    pub log_format: Option<String>,

    /// Override the sniff definition file or directory.
    #[arg(short, long)]
    pub definitions: Option<PathBuf>,

    /// Check configuration and definitions, then exit. Nothing is written.
    #[arg(long, conflicts_with = "compile_only")]
    pub validate: bool,

    /// Write the scripts, then exit without tailing.
    #[arg(long)]
    pub compile_only: bool,

    /// Override PID file path. An empty string disables the PID file.
    #[arg(long)]
    pub pid_file: Option<String>,
}

impl DaemonCli {
    /// Builds the effective configuration: defaults, file, environment,
    /// then the flags on this command line.
    ///
    /// # Errors
    /// - the config file exists but cannot be parsed
    /// - the merged configuration fails validation
    pub async fn load_config(&self) -> Result<LogSniffConfig> {
        let mut config = if config_file_present(&self.config) {
            LogSniffConfig::from_file(&self.config)
                .await
                .map_err(|e| anyhow::anyhow!("failed to load config: {}", e))?
        } else {
            LogSniffConfig::default()
        };
        config.apply_env_overrides();
        self.apply_overrides(&mut config);

        config
            .validate()
            .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;
        Ok(config)
    }

    /// Copies the flags that were given onto `config`.
    pub fn apply_overrides(&self, config: &mut LogSniffConfig) {
        if let Some(level) = &self.log_level {
            config.general.log_level.clone_from(level);
        }
        if let Some(format) = &self.log_format {
            config.general.log_format.clone_from(format);
        }
        if let Some(pid_file) = &self.pid_file {
            config.general.pid_file.clone_from(pid_file);
        }
        if let Some(definitions) = &self.definitions {
            config.paths.definitions = definitions.display().to_string();
        }
    }
}

fn config_file_present(path: &Path) -> bool {
    path.try_exists().unwrap_or(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        DaemonCli::command().debug_assert();
    }

    #[test]
    fn defaults_without_flags() {
        let cli = DaemonCli::parse_from(["logsniff-daemon"]);
        assert_eq!(cli.config, PathBuf::from(DEFAULT_CONFIG_PATH));
        assert!(!cli.validate);
        assert!(!cli.compile_only);
        assert!(cli.definitions.is_none());
    }

    #[test]
    fn validate_and_compile_only_conflict() {
        let result =
            DaemonCli::try_parse_from(["logsniff-daemon", "--validate", "--compile-only"]);
        assert!(result.is_err());
    }

    #[test]
    fn overrides_replace_config_values() {
        let cli = DaemonCli::parse_from([
            "logsniff-daemon",
            "--log-level",
            "debug",
            "--log-format",
            "pretty",
            "--definitions",
            "/srv/sniffs",
            "--pid-file",
            "",
        ]);
        let mut config = LogSniffConfig::default();
        cli.apply_overrides(&mut config);

        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.general.log_format, "pretty");
        assert_eq!(config.paths.definitions, "/srv/sniffs");
        assert!(config.general.pid_file.is_empty());
    }

    #[tokio::test]
    async fn missing_config_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cli = DaemonCli::parse_from([
            "logsniff-daemon",
            "--config",
            dir.path().join("absent.toml").to_str().unwrap(),
        ]);

        let config = cli.load_config().await.unwrap();
        assert_eq!(config.paths.definitions, "/etc/log-sniff");
    }

    #[tokio::test]
    async fn invalid_override_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        let cli = DaemonCli::parse_from([
            "logsniff-daemon",
            "--config",
            dir.path().join("absent.toml").to_str().unwrap(),
            "--log-format",
            "xml",
        ]);

        assert!(cli.load_config().await.is_err());
    }
}
