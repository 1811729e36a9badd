//! Daemon orchestration -- definitions in, one tail-match loop per group.
//!
//! # Startup
//!
//! 1. Load and validate configuration (done by the caller)
//! 2. Load sniff definitions; a load failure leaves zero groups
//! 3. Write the PID file
//! 4. Install the metrics recorder when enabled
//! 5. Compile every group into scripts and a dispatch table
//! 6. Spawn one tail-match loop task per group with at least one rule
//!
//! # Shutdown
//!
//! On SIGTERM/SIGINT the shared cancellation token fires. Each loop stops at
//! its next line boundary or sleep; a script that is already running is
//! waited for. The PID file is removed last.

use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use logsniff_core::config::LogSniffConfig;
use logsniff_core::metrics as m;
use logsniff_engine::compiler;
use logsniff_engine::{
    DefinitionLoader, EngineConfig, ScriptCompiler, ShellProcessRunner, SniffDefinition,
    SniffSet, SystemClock, TailMatchLoop, TailStats, TriggerRunner,
};

use crate::metrics_server;
use crate::pid_file::PidFile;

/// Per-group result of a validation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationSummary {
    /// Groups loaded
    pub groups: usize,
    /// Rules that would compile
    pub valid_rules: usize,
    /// Disabled rules
    pub disabled_rules: usize,
    /// Rules that would be rejected, as `group.rule: reason`
    pub errors: Vec<String>,
}

/// The main daemon orchestrator.
pub struct Orchestrator {
    config: LogSniffConfig,
    engine_config: EngineConfig,
    definitions: Vec<SniffDefinition>,
    clock: Arc<SystemClock>,
    shutdown: CancellationToken,
}

impl Orchestrator {
    /// Builds from an already merged configuration and loads the sniff
    /// definitions it points at.
    ///
    /// A definitions path that cannot be loaded is logged and leaves the
    /// daemon with no groups; it is not an error.
    pub async fn build_from_config(config: LogSniffConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;

        let definitions = DefinitionLoader::load_or_empty(&config.paths.definitions).await;
        tracing::info!(
            path = %config.paths.definitions,
            groups = definitions.len(),
            "sniff definitions loaded"
        );

        Ok(Self {
            engine_config: EngineConfig::from_core(&config),
            config,
            definitions,
            clock: Arc::new(SystemClock),
            shutdown: CancellationToken::new(),
        })
    }

    /// Checks every definition without writing anything.
    pub fn validate(&self) -> ValidationSummary {
        let mut summary = ValidationSummary {
            groups: self.definitions.len(),
            ..ValidationSummary::default()
        };

        for definition in &self.definitions {
            let report = compiler::check(definition);
            summary.valid_rules += report.compiled.len();
            summary.disabled_rules += report.skipped_disabled.len();
            summary.errors.extend(
                report
                    .failed
                    .into_iter()
                    .map(|(rule, reason)| format!("{}.{rule}: {reason}", definition.group_name)),
            );
        }

        summary
    }

    /// Compiles every group into the script directory.
    pub async fn compile(&self) -> Vec<SniffSet> {
        let compiler = ScriptCompiler::new(&self.engine_config.script_dir, Arc::clone(&self.clock));
        let mut sets = Vec::with_capacity(self.definitions.len());

        for definition in &self.definitions {
            let (set, report) = compiler.compile(definition).await;
            tracing::info!(
                group = %definition.group_name,
                compiled = report.compiled.len(),
                disabled = report.skipped_disabled.len(),
                failed = report.failed.len(),
                "sniff group compiled"
            );
            sets.push(set);
        }

        sets
    }

    /// Runs until SIGTERM or SIGINT.
    ///
    /// # Errors
    /// - the PID file is held by another instance
    /// - the metrics listener cannot be installed
    /// - signal handlers cannot be installed
    pub async fn run(&mut self) -> Result<Vec<TailStats>> {
        let token = self.shutdown.clone();
        self.run_until(async move {
            match wait_for_shutdown_signal().await {
                Ok(signal) => tracing::info!(signal, "shutdown signal received"),
                Err(e) => {
                    tracing::error!(error = %e, "signal handling unavailable, waiting for cancellation");
                    token.cancelled().await;
                }
            }
        })
        .await
    }

    /// Runs until `shutdown` resolves or [`shutdown_token`](Self::shutdown_token)
    /// is cancelled, then returns each loop's counters.
    pub async fn run_until(&mut self, shutdown: impl Future<Output = ()>) -> Result<Vec<TailStats>> {
        let _pid_file = match self.config.general.pid_file.as_str() {
            "" => None,
            path => Some(PidFile::create(path)?),
        };

        if self.config.metrics.enabled {
            metrics_server::install_metrics_recorder(&self.config.metrics)?;
        }

        let sets = self.compile().await;
        let tasks = self.spawn_loops(sets);
        #[allow(clippy::cast_precision_loss)]
        metrics::gauge!(m::DAEMON_ACTIVE_GROUPS).set(tasks.len() as f64);

        if tasks.is_empty() {
            tracing::warn!("no sniff group to follow, idling until shutdown");
        } else {
            tracing::info!(groups = tasks.len(), "logsniff-daemon running");
        }

        tokio::select! {
            () = shutdown => {}
            () = self.shutdown.cancelled() => {}
        }

        tracing::info!("stopping tail-match loops");
        self.shutdown.cancel();

        let mut stats = Vec::with_capacity(tasks.len());
        for (group, task) in tasks {
            match task.await {
                Ok(group_stats) => stats.push(group_stats),
                Err(e) => tracing::error!(group = %group, error = %e, "tail-match loop task failed"),
            }
        }
        metrics::gauge!(m::DAEMON_ACTIVE_GROUPS).set(0.0);

        tracing::info!("logsniff-daemon shut down");
        Ok(stats)
    }

    fn spawn_loops(&self, sets: Vec<SniffSet>) -> Vec<(String, JoinHandle<TailStats>)> {
        let runner = Arc::new(ShellProcessRunner::new(
            &self.engine_config.shell,
            self.engine_config.kill_grace,
        ));

        sets.into_iter()
            .filter(|set| {
                if set.is_empty() {
                    tracing::warn!(group = %set.group_name, "no rule compiled, group not followed");
                }
                !set.is_empty()
            })
            .map(|set| {
                let group = set.group_name.clone();
                let trigger = TriggerRunner::new(Arc::clone(&runner), Arc::clone(&self.clock));
                let mut tail =
                    TailMatchLoop::new(set, trigger, Arc::clone(&self.clock), &self.engine_config);
                let cancel = self.shutdown.child_token();
                let handle = tokio::spawn(async move { tail.run(cancel).await });
                (group, handle)
            })
            .collect()
    }

    /// Token that stops [`run_until`](Self::run_until) when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Loaded definitions.
    pub fn definitions(&self) -> &[SniffDefinition] {
        &self.definitions
    }

    /// Effective configuration.
    pub fn config(&self) -> &LogSniffConfig {
        &self.config
    }
}

/// Waits for SIGTERM or SIGINT and returns the signal name.
///
/// # Errors
/// Signal handlers cannot be installed.
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("failed to install SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("failed to install SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}
