//! Script compiler -- turns a sniff definition into runnable scripts.
//!
//! Each enabled rule becomes `{script_dir}/{group}.{rule}.sh`:
//!
//! ```text
//! #!/bin/sh
//! # log-sniff created script @ epoch: 1718000000
//! <rule commands, verbatim>
//! ```
//!
//! A rule that cannot be compiled (invalid name, bad regex, write failure) is
//! reported and left out of the resulting [`SniffSet`]; the remaining rules
//! are still compiled. Existing files are overwritten.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use regex::Regex;

use logsniff_core::metrics as m;

use crate::clock::Clock;
use crate::definition::{SniffDefinition, SniffRuleDefinition};
use crate::dispatch::{CompiledRule, SniffSet};
use crate::error::SniffError;

/// Interpreter directive written as the first script line.
pub const SCRIPT_SHEBANG: &str = "#!/bin/sh";

#[cfg(unix)]
const SCRIPT_MODE: u32 = 0o755;

/// Outcome of compiling one definition, alongside the [`SniffSet`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CompileReport {
    /// Rules written and added to the dispatch table
    pub compiled: Vec<String>,
    /// Rules skipped because `enabled: false`
    pub skipped_disabled: Vec<String>,
    /// Rules that failed, with the reason
    pub failed: Vec<(String, String)>,
}

impl CompileReport {
    /// Whether every enabled rule compiled.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Script compiler
pub struct ScriptCompiler<C: Clock> {
    /// Output directory for scripts
    script_dir: PathBuf,
    /// Banner timestamp source
    clock: Arc<C>,
}

impl<C: Clock> ScriptCompiler<C> {
    /// Creates a compiler writing into `script_dir`.
    pub fn new(script_dir: impl Into<PathBuf>, clock: Arc<C>) -> Self {
        Self {
            script_dir: script_dir.into(),
            clock,
        }
    }

    /// Script directory.
    pub fn script_dir(&self) -> &Path {
        &self.script_dir
    }

    /// Deterministic script path for a rule.
    pub fn script_path(&self, group_name: &str, rule_name: &str) -> PathBuf {
        self.script_dir.join(format!("{group_name}.{rule_name}.sh"))
    }

    /// Compiles every enabled rule of `definition`.
    pub async fn compile(&self, definition: &SniffDefinition) -> (SniffSet, CompileReport) {
        let group = definition.group_name.as_str();
        let mut sniff_set = SniffSet::new(group, &definition.watched_log_path);
        let mut report = CompileReport::default();

        if let Err(e) = tokio::fs::create_dir_all(&self.script_dir).await {
            // individual writes will fail and be reported below
            tracing::warn!(
                dir = %self.script_dir.display(),
                error = %e,
                "failed to create script directory"
            );
        }

        let epoch = self.clock.now_epoch_secs();
        let mut seen = HashSet::new();

        for rule in &definition.rules {
            if !rule.enabled {
                tracing::info!(group, rule = %rule.name, "sniff is not enabled, skipped");
                report.skipped_disabled.push(rule.name.clone());
                continue;
            }

            if !seen.insert(rule.name.as_str()) {
                let reason = "duplicate sniff name".to_owned();
                tracing::warn!(group, rule = %rule.name, "{reason}, skipping");
                report.failed.push((rule.name.clone(), reason));
                continue;
            }

            match self.compile_rule(group, rule, epoch).await {
                Ok(compiled) => {
                    tracing::info!(
                        group,
                        rule = %rule.name,
                        script = %compiled.script_path.display(),
                        "script created"
                    );
                    report.compiled.push(rule.name.clone());
                    sniff_set.rules.push(compiled);
                }
                Err(e) => {
                    tracing::error!(group, rule = %rule.name, error = %e, "failed to compile sniff");
                    metrics::counter!(m::COMPILE_FAILURES_TOTAL, m::LABEL_GROUP => group.to_owned())
                        .increment(1);
                    report.failed.push((rule.name.clone(), e.to_string()));
                }
            }
        }

        #[allow(clippy::cast_precision_loss)]
        metrics::gauge!(m::COMPILED_RULES, m::LABEL_GROUP => group.to_owned())
            .set(sniff_set.len() as f64);

        (sniff_set, report)
    }

    async fn compile_rule(
        &self,
        group: &str,
        rule: &SniffRuleDefinition,
        epoch: u64,
    ) -> Result<CompiledRule, SniffError> {
        let trigger_regex = prepare_rule(rule)?;

        let script_path = self.script_path(group, &rule.name);
        write_script(&script_path, &render_script(epoch, &rule.script_body))
            .await
            .map_err(|e| SniffError::Compile {
                rule: rule.name.clone(),
                reason: format!("failed to create the script {}: {e}", script_path.display()),
            })?;

        Ok(CompiledRule {
            name: rule.name.clone(),
            script_path,
            trigger_regex,
            timeout: Duration::from_secs(rule.timeout_seconds),
        })
    }
}

/// Dry run of [`ScriptCompiler::compile`]: same checks, nothing written.
pub fn check(definition: &SniffDefinition) -> CompileReport {
    let mut report = CompileReport::default();
    let mut seen = HashSet::new();

    for rule in &definition.rules {
        if !rule.enabled {
            report.skipped_disabled.push(rule.name.clone());
        } else if !seen.insert(rule.name.as_str()) {
            report
                .failed
                .push((rule.name.clone(), "duplicate sniff name".to_owned()));
        } else {
            match prepare_rule(rule) {
                Ok(_) => report.compiled.push(rule.name.clone()),
                Err(e) => report.failed.push((rule.name.clone(), e.to_string())),
            }
        }
    }

    report
}

fn prepare_rule(rule: &SniffRuleDefinition) -> Result<Regex, SniffError> {
    rule.validate()?;
    Regex::new(&rule.trigger_regex).map_err(|e| SniffError::Compile {
        rule: rule.name.clone(),
        reason: format!("invalid regexp: {e}"),
    })
}

/// Full script text: shebang, banner, then the body untouched.
pub fn render_script(epoch: u64, body: &str) -> String {
    format!("{SCRIPT_SHEBANG}\n# log-sniff created script @ epoch: {epoch}\n{body}")
}

async fn write_script(path: &Path, contents: &str) -> std::io::Result<()> {
    tokio::fs::write(path, contents).await?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(SCRIPT_MODE)).await?;
    }

    Ok(())
}
