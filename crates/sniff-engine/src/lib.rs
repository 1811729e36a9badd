//! log-sniff engine: compile sniff definitions into scripts, follow a log
//! file and run the matching scripts.
//!
//! # Modules
//!
//! - [`definition`]: YAML sniff definitions and their loader
//! - [`compiler`]: definition -> on-disk scripts + dispatch table
//! - [`dispatch`]: compiled rules ([`SniffSet`]) and line matching
//! - [`process`]: subprocess seam ([`ProcessRunner`]) with timeout enforcement
//! - [`runner`]: trigger invocation and stdout/stderr capture files
//! - [`tail`]: the tail-match loop and its rotation-aware follower
//! - [`clock`]: wall clock and sleep seam
//! - [`config`]: engine settings derived from the core config
//! - [`error`]: domain error type
//!
//! # Flow
//!
//! ```text
//! DefinitionLoader -> ScriptCompiler -> SniffSet -> TailMatchLoop -> TriggerRunner
//!                                                       ^                 |
//!                                                       +-- next line ----+
//! ```

pub mod clock;
pub mod compiler;
pub mod config;
pub mod definition;
pub mod dispatch;
pub mod error;
pub mod process;
pub mod runner;
pub mod tail;

pub use clock::{Clock, SystemClock};
pub use compiler::{CompileReport, ScriptCompiler};
pub use config::{EngineConfig, EngineConfigBuilder, ReopenBackoff};
pub use definition::{DefinitionLoader, SniffDefinition, SniffRuleDefinition};
pub use dispatch::{CompiledRule, SniffSet};
pub use error::SniffError;
pub use process::{ProcessOutput, ProcessRunner, ProcessStatus, ShellProcessRunner};
pub use runner::{InvocationOutcome, InvocationResult, TriggerRunner};
pub use tail::{TailMatchLoop, TailStats};
