//! Sniff definition data types
//!
//! Structures deserialized from a YAML definition file.

use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::SniffError;

const MAX_NAME_LEN: usize = 128;

/// A sniff group -- one YAML definition file.
///
/// # YAML schema
/// ```yaml
/// name: web
/// log: /var/log/nginx/error.log
/// sniff:
///   - sniff_name: disk_full
///     enabled: true
///     regexp: "No space left on device"
///     timeout: 30
///     commands: |
///       df -h
///       du -sh /var/log/* | sort -h | tail -5
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SniffDefinition {
    /// Group name, used as the script file prefix
    #[serde(rename = "name")]
    pub group_name: String,
    /// Log file followed by this group
    #[serde(rename = "log")]
    pub watched_log_path: PathBuf,
    /// Rules in evaluation order
    #[serde(rename = "sniff", default)]
    pub rules: Vec<SniffRuleDefinition>,
}

impl SniffDefinition {
    /// Checks the group-level fields. Rule problems are reported per rule at
    /// compile time so one bad rule does not discard the whole group.
    pub fn validate(&self) -> Result<(), SniffError> {
        validate_name(&self.group_name)?;

        if self.watched_log_path.as_os_str().is_empty() {
            return Err(SniffError::Validation {
                name: self.group_name.clone(),
                reason: "log path must not be empty".to_owned(),
            });
        }

        Ok(())
    }

    /// Number of rules with `enabled: true`.
    pub fn enabled_count(&self) -> usize {
        self.rules.iter().filter(|r| r.enabled).count()
    }
}

/// A single sniff rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SniffRuleDefinition {
    /// Rule name, unique within the group
    #[serde(rename = "sniff_name")]
    pub name: String,
    /// Disabled rules are skipped by the compiler
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Regex searched for anywhere in each log line
    #[serde(rename = "regexp")]
    pub trigger_regex: String,
    /// Script time limit in seconds
    #[serde(rename = "timeout")]
    pub timeout_seconds: u64,
    /// Shell commands written verbatim into the script
    #[serde(rename = "commands")]
    pub script_body: String,
}

fn default_enabled() -> bool {
    true
}

impl SniffRuleDefinition {
    /// Validates the rule.
    pub fn validate(&self) -> Result<(), SniffError> {
        validate_name(&self.name)?;

        if self.timeout_seconds == 0 {
            return Err(SniffError::Validation {
                name: self.name.clone(),
                reason: "timeout must be greater than 0".to_owned(),
            });
        }

        if self.trigger_regex.is_empty() {
            return Err(SniffError::Validation {
                name: self.name.clone(),
                reason: "regexp must not be empty".to_owned(),
            });
        }

        Ok(())
    }
}

/// Group and rule names become file name components.
fn validate_name(name: &str) -> Result<(), SniffError> {
    let reason = if name.is_empty() {
        Some("name must not be empty".to_owned())
    } else if name.len() > MAX_NAME_LEN {
        Some(format!("name must not exceed {MAX_NAME_LEN} characters"))
    } else if name.contains('/') || name.contains('\0') {
        Some("name must not contain '/' or NUL".to_owned())
    } else if Path::new(name)
        .components()
        .any(|c| matches!(c, Component::ParentDir | Component::CurDir))
    {
        Some("name must not be '.' or '..'".to_owned())
    } else {
        None
    };

    match reason {
        Some(reason) => Err(SniffError::Validation {
            name: if name.is_empty() {
                "(empty)".to_owned()
            } else {
                name.to_owned()
            },
            reason,
        }),
        None => Ok(()),
    }
}
