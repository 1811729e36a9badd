//! Metric names and descriptions
//!
//! Every counter and gauge emitted by the workspace is named here so the
//! engine and the daemon agree on spelling.
//!
//! # Naming
//!
//! - prefix: `logsniff_`
//! - suffix: `_total` for counters, none for gauges
//!
//! ```ignore
//! metrics::counter!(logsniff_core::metrics::LINES_READ_TOTAL).increment(1);
//! ```

// ─── label keys ─────────────────────────────────────────────────────

/// Sniff group label key
pub const LABEL_GROUP: &str = "group";

/// Sniff rule label key
pub const LABEL_RULE: &str = "rule";

/// Invocation result label key (completed, timed_out, launch_failed, output_dir_unwritable)
pub const LABEL_RESULT: &str = "result";

// ─── tail-match loop ────────────────────────────────────────────────

/// Lines read from watched logs (counter, label: group)
pub const LINES_READ_TOTAL: &str = "logsniff_lines_read_total";

/// Rule matches (counter, labels: group, rule)
pub const RULE_MATCHES_TOTAL: &str = "logsniff_rule_matches_total";

/// Watched log opened again after being closed for any reason (counter, label: group)
pub const LOG_REOPENS_TOTAL: &str = "logsniff_log_reopens_total";

/// Failed open attempts on a watched log (counter, label: group)
pub const LOG_OPEN_FAILURES_TOTAL: &str = "logsniff_log_open_failures_total";

// ─── trigger runner ─────────────────────────────────────────────────

/// Script invocations (counter, label: result)
pub const INVOCATIONS_TOTAL: &str = "logsniff_invocations_total";

/// Capture file write failures (counter)
pub const CAPTURE_WRITE_FAILURES_TOTAL: &str = "logsniff_capture_write_failures_total";

// ─── script compiler ────────────────────────────────────────────────

/// Rules compiled into the dispatch table (gauge, label: group)
pub const COMPILED_RULES: &str = "logsniff_compiled_rules";

/// Rules that failed to compile (counter, label: group)
pub const COMPILE_FAILURES_TOTAL: &str = "logsniff_compile_failures_total";

// ─── daemon ─────────────────────────────────────────────────────────

/// Running tail-match loops (gauge)
pub const DAEMON_ACTIVE_GROUPS: &str = "logsniff_daemon_active_groups";

/// Registers HELP text for every metric.
///
/// Call once after the global recorder is installed.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge};

    describe_counter!(LINES_READ_TOTAL, "Lines read from watched log files");
    describe_counter!(
        RULE_MATCHES_TOTAL,
        "Log lines matched by a sniff rule trigger regex"
    );
    describe_counter!(
        LOG_REOPENS_TOTAL,
        "Watched log opened again after rotation, truncation, deletion or an I/O error"
    );
    describe_counter!(
        LOG_OPEN_FAILURES_TOTAL,
        "Failed attempts to open a watched log file"
    );
    describe_counter!(INVOCATIONS_TOTAL, "Triggered script invocations by result");
    describe_counter!(
        CAPTURE_WRITE_FAILURES_TOTAL,
        "Failures writing script stdout/stderr capture files"
    );
    describe_gauge!(COMPILED_RULES, "Sniff rules compiled into the dispatch table");
    describe_counter!(COMPILE_FAILURES_TOTAL, "Sniff rules that failed to compile");
    describe_gauge!(DAEMON_ACTIVE_GROUPS, "Tail-match loops currently running");
}
