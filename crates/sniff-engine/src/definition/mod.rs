//! Sniff definitions -- the declarative input of the engine.
//!
//! - [`types`]: [`SniffDefinition`] / [`SniffRuleDefinition`]
//! - [`loader`]: [`DefinitionLoader`] for files and directories

pub mod loader;
pub mod types;

pub use loader::DefinitionLoader;
pub use types::{SniffDefinition, SniffRuleDefinition};
