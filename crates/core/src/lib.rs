//! Shared building blocks for the log-sniff workspace.
//!
//! - [`config`]: `log-sniff.toml` parsing, environment overrides and validation
//! - [`error`]: top-level error taxonomy
//! - [`metrics`]: metric names and descriptions

pub mod config;
pub mod error;
pub mod metrics;

pub use config::{
    GeneralConfig, LogSniffConfig, MetricsConfig, PathsConfig, RunnerConfig, TailConfig,
};
pub use error::{ConfigError, EngineError, LogSniffError};
