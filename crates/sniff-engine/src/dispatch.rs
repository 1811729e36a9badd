//! Dispatch table -- compiled rules and line matching.

use std::path::{Path, PathBuf};
use std::time::Duration;

use regex::Regex;

/// A rule ready to fire: compiled regex plus the script it triggers.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    /// Rule name
    pub name: String,
    /// Compiled script on disk
    pub script_path: PathBuf,
    /// Trigger pattern, searched anywhere in the line
    pub trigger_regex: Regex,
    /// Script time limit
    pub timeout: Duration,
}

impl CompiledRule {
    /// Whether the trigger pattern occurs anywhere in `line`.
    pub fn is_match(&self, line: &str) -> bool {
        self.trigger_regex.is_match(line)
    }
}

/// The compiled rules of one sniff group and the log they watch.
///
/// Built once by the compiler and read-only afterwards.
#[derive(Debug, Clone)]
pub struct SniffSet {
    /// Group name
    pub group_name: String,
    /// Followed log file
    pub watched_log_path: PathBuf,
    /// Rules in definition order
    pub rules: Vec<CompiledRule>,
}

impl SniffSet {
    /// Creates an empty set for `group_name`.
    pub fn new(group_name: impl Into<String>, watched_log_path: impl Into<PathBuf>) -> Self {
        Self {
            group_name: group_name.into(),
            watched_log_path: watched_log_path.into(),
            rules: Vec::new(),
        }
    }

    /// Every rule whose pattern occurs in `line`, in rule order.
    ///
    /// All matching rules are returned, not only the first one: a line that
    /// matches two patterns triggers both scripts.
    pub fn matching_rules<'a>(&'a self, line: &'a str) -> impl Iterator<Item = &'a CompiledRule> {
        self.rules.iter().filter(move |rule| rule.is_match(line))
    }

    /// Looks up a rule by name.
    pub fn rule(&self, name: &str) -> Option<&CompiledRule> {
        self.rules.iter().find(|rule| rule.name == name)
    }

    /// Watched log path.
    pub fn log_path(&self) -> &Path {
        &self.watched_log_path
    }

    /// Number of compiled rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether no rule compiled.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
