//! log-sniff daemon library.
//!
//! The binary (`main.rs`) is a thin wrapper; everything it wires together is
//! exposed here for integration tests.

pub mod cli;
pub mod logging;
pub mod metrics_server;
pub mod orchestrator;
pub mod pid_file;
