//! Tail-match loop -- follow one log file and trigger matching rules.
//!
//! # State machine
//!
//! ```text
//!            open ok                      vanished / replaced /
//!  Closed ----------------> Open -------- truncated / read error ---+
//!    ^  |                    |  ^                                   |
//!    |  | open failed        |  | next line or poll interval        |
//!    |  +-- back-off --+     +--+                                   |
//!    +-----------------+----------------- back-off -----------------+
//! ```
//!
//! Every open, including a reopen after rotation, starts at end of file, so
//! content already in the file is never matched. Lines are processed one at a
//! time and each matching rule's script runs to completion (or timeout)
//! before the next line is read.

pub mod follower;

use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use logsniff_core::metrics as m;

use crate::clock::Clock;
use crate::config::{EngineConfig, ReopenBackoff};
use crate::dispatch::SniffSet;
use crate::process::ProcessRunner;
use crate::runner::TriggerRunner;

pub use follower::{FileCheck, LogFollower};

/// Counters of one tail-match loop.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TailStats {
    /// Complete lines read
    pub lines_read: u64,
    /// Rule matches (one line may match several rules)
    pub matches: u64,
    /// Scripts that hit their time limit
    pub timeouts: u64,
    /// Successful opens of the watched file
    pub opens: u64,
    /// Opens after the first one
    pub reopens: u64,
    /// Rotations detected while open
    pub rotations: u64,
    /// Failed open attempts
    pub open_failures: u64,
}

enum TailState {
    Closed { attempt: u32 },
    Open(LogFollower),
}

/// Tail-match loop for one sniff group.
pub struct TailMatchLoop<R: ProcessRunner, C: Clock> {
    sniff_set: SniffSet,
    trigger: TriggerRunner<R, C>,
    clock: Arc<C>,
    output_dir: std::path::PathBuf,
    poll_interval: Duration,
    backoff: ReopenBackoff,
    max_line_length: usize,
    stats: TailStats,
}

impl<R: ProcessRunner, C: Clock> TailMatchLoop<R, C> {
    /// Creates a loop over `sniff_set`, writing captures to
    /// `config.output_dir`.
    pub fn new(
        sniff_set: SniffSet,
        trigger: TriggerRunner<R, C>,
        clock: Arc<C>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            sniff_set,
            trigger,
            clock,
            output_dir: config.output_dir.clone(),
            poll_interval: config.poll_interval,
            backoff: config.backoff.clone(),
            max_line_length: config.max_line_length,
            stats: TailStats::default(),
        }
    }

    /// Group this loop serves.
    pub fn group_name(&self) -> &str {
        &self.sniff_set.group_name
    }

    /// Counters so far.
    pub fn stats(&self) -> &TailStats {
        &self.stats
    }

    /// Runs until `cancel` fires. Errors never end the loop.
    ///
    /// Cancellation is observed between lines and while sleeping; a script
    /// that is already running is waited for.
    pub async fn run(&mut self, cancel: CancellationToken) -> TailStats {
        tracing::info!(
            group = %self.sniff_set.group_name,
            path = %self.sniff_set.watched_log_path.display(),
            rules = self.sniff_set.len(),
            "tail-match loop started"
        );

        let mut state = TailState::Closed { attempt: 0 };

        while !cancel.is_cancelled() {
            let next = match state {
                TailState::Closed { attempt } => self.try_open(attempt, &cancel).await,
                TailState::Open(follower) => self.poll_open(follower, &cancel).await,
            };
            match next {
                Some(next) => state = next,
                None => break,
            }
        }

        tracing::info!(
            group = %self.sniff_set.group_name,
            lines_read = self.stats.lines_read,
            matches = self.stats.matches,
            "tail-match loop stopped"
        );
        self.stats.clone()
    }

    async fn try_open(&mut self, attempt: u32, cancel: &CancellationToken) -> Option<TailState> {
        let group = self.sniff_set.group_name.clone();
        let path = &self.sniff_set.watched_log_path;

        match LogFollower::open(path, self.max_line_length).await {
            Ok(follower) => {
                tracing::info!(group = %group, path = %path.display(), position = follower.position(), "log file opened");
                if self.stats.opens > 0 {
                    self.stats.reopens += 1;
                    metrics::counter!(m::LOG_REOPENS_TOTAL, m::LABEL_GROUP => group).increment(1);
                }
                self.stats.opens += 1;
                Some(TailState::Open(follower))
            }
            Err(e) => {
                if e.kind() == io::ErrorKind::NotFound {
                    tracing::info!(group = %group, path = %path.display(), "log file not found, retrying");
                } else {
                    tracing::warn!(group = %group, path = %path.display(), error = %e, "failed to open log file, retrying");
                }
                self.stats.open_failures += 1;
                metrics::counter!(m::LOG_OPEN_FAILURES_TOTAL, m::LABEL_GROUP => group).increment(1);

                let delay = self.backoff.delay(attempt);
                self.pause(delay, cancel).await.then_some(TailState::Closed {
                    attempt: attempt.saturating_add(1),
                })
            }
        }
    }

    async fn poll_open(
        &mut self,
        mut follower: LogFollower,
        cancel: &CancellationToken,
    ) -> Option<TailState> {
        match follower.next_line().await {
            Ok(Some(line)) => self.handle_line(&line).await,
            Ok(None) => {
                if !self.pause(self.poll_interval, cancel).await {
                    return None;
                }
            }
            Err(e) => {
                tracing::warn!(
                    group = %self.sniff_set.group_name,
                    path = %follower.path().display(),
                    error = %e,
                    "failed to read log file, reopening"
                );
                drop(follower);
                return self.close(cancel).await;
            }
        }

        match follower.check().await {
            Ok(FileCheck::Present) => Some(TailState::Open(follower)),
            Ok(check) => {
                tracing::info!(
                    group = %self.sniff_set.group_name,
                    path = %follower.path().display(),
                    state = ?check,
                    "log file rotated, reopening"
                );
                self.stats.rotations += 1;
                drop(follower);
                self.close(cancel).await
            }
            Err(e) => {
                tracing::warn!(
                    group = %self.sniff_set.group_name,
                    path = %follower.path().display(),
                    error = %e,
                    "failed to stat log file, reopening"
                );
                drop(follower);
                self.close(cancel).await
            }
        }
    }

    /// Drops the open file and waits the first back-off step.
    async fn close(&self, cancel: &CancellationToken) -> Option<TailState> {
        let delay = self.backoff.delay(0);
        self.pause(delay, cancel)
            .await
            .then_some(TailState::Closed { attempt: 1 })
    }

    async fn handle_line(&mut self, line: &str) {
        self.stats.lines_read += 1;
        metrics::counter!(m::LINES_READ_TOTAL, m::LABEL_GROUP => self.sniff_set.group_name.clone())
            .increment(1);

        if line.is_empty() {
            return;
        }

        for rule in self.sniff_set.matching_rules(line) {
            self.stats.matches += 1;
            metrics::counter!(
                m::RULE_MATCHES_TOTAL,
                m::LABEL_GROUP => self.sniff_set.group_name.clone(),
                m::LABEL_RULE => rule.name.clone()
            )
            .increment(1);
            tracing::info!(
                group = %self.sniff_set.group_name,
                rule = %rule.name,
                script = %rule.script_path.display(),
                "sniff matched"
            );

            let result = self
                .trigger
                .invoke(&rule.script_path, &self.output_dir, rule.timeout)
                .await;
            if result.timed_out() {
                self.stats.timeouts += 1;
            }
        }
    }

    /// Sleeps `duration`; `false` when cancelled first.
    async fn pause(&self, duration: Duration, cancel: &CancellationToken) -> bool {
        tokio::select! {
            () = cancel.cancelled() => false,
            () = self.clock.sleep(duration) => true,
        }
    }
}
