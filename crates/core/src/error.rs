//! Error types shared across the workspace.

/// Top-level log-sniff error.
#[derive(Debug, thiserror::Error)]
pub enum LogSniffError {
    /// Configuration problem
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// Sniff engine failure surfaced to the daemon
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    /// I/O error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file does not exist
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// TOML could not be parsed
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// A value is out of range or malformed
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Engine errors as seen from outside the engine crate.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Definitions could not be loaded
    #[error("definition load failed: {0}")]
    DefinitionLoad(String),

    /// Engine could not be assembled
    #[error("engine init failed: {0}")]
    InitFailed(String),
}
