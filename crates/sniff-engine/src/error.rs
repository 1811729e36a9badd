//! Engine error type
//!
//! [`SniffError`] covers every failure inside the engine. None of them stop
//! the tail-match loop: callers log the error and move on to the next rule,
//! stream or reopen attempt. `From<SniffError> for LogSniffError` lets the
//! daemon propagate load-time failures with `?`.

use logsniff_core::error::{EngineError, LogSniffError};

/// Sniff engine domain error
#[derive(Debug, thiserror::Error)]
pub enum SniffError {
    /// Definition file could not be read or parsed
    #[error("definition load error: {path}: {reason}")]
    DefinitionLoad {
        /// Definition file or directory
        path: String,
        /// Failure reason
        reason: String,
    },

    /// Definition or rule failed validation
    #[error("definition validation error: '{name}': {reason}")]
    Validation {
        /// Group or rule name
        name: String,
        /// Failure reason
        reason: String,
    },

    /// A rule could not be turned into a script
    #[error("compile error: rule '{rule}': {reason}")]
    Compile {
        /// Rule name
        rule: String,
        /// Failure reason
        reason: String,
    },

    /// The script process could not be started
    #[error("launch error: {script}: {reason}")]
    Launch {
        /// Script path
        script: String,
        /// OS error string
        reason: String,
    },

    /// A stdout/stderr capture file could not be written
    #[error("capture error: {path}: {reason}")]
    Capture {
        /// Capture file path
        path: String,
        /// Failure reason
        reason: String,
    },

    /// Capture directory is missing or not writable
    #[error("output directory not writable: {0}")]
    OutputDirUnwritable(String),

    /// I/O error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Trigger regex failed to compile
    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),
}

impl From<SniffError> for LogSniffError {
    fn from(err: SniffError) -> Self {
        match err {
            SniffError::DefinitionLoad { .. } => {
                LogSniffError::Engine(EngineError::DefinitionLoad(err.to_string()))
            }
            other => LogSniffError::Engine(EngineError::InitFailed(other.to_string())),
        }
    }
}
