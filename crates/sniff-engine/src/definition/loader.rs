//! Definition loader -- reads YAML sniff definitions from disk.
//!
//! A definitions path may be a single file or a directory of `.yml`/`.yaml`
//! files. Inside a directory, a file that fails to load is logged and skipped,
//! and a repeated group name keeps the first occurrence.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::SniffError;

use super::types::SniffDefinition;

const MAX_DEFINITION_FILE_SIZE: u64 = 1024 * 1024; // 1MB
const MAX_DEFINITION_FILES: usize = 1_000;

/// Definition loader
pub struct DefinitionLoader;

impl DefinitionLoader {
    /// Loads a definition file or every definition in a directory.
    ///
    /// # Errors
    /// - the path does not exist or cannot be read
    /// - a single file fails to parse or validate
    pub async fn load(path: impl AsRef<Path>) -> Result<Vec<SniffDefinition>, SniffError> {
        let path = path.as_ref();
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| SniffError::DefinitionLoad {
                path: path.display().to_string(),
                reason: format!("failed to read metadata: {e}"),
            })?;

        if metadata.is_dir() {
            Self::load_directory(path).await
        } else {
            Ok(vec![Self::load_file(path).await?])
        }
    }

    /// Like [`load`](Self::load) but never fails: the error is logged and an
    /// empty set is returned, leaving the daemon idle instead of exiting.
    pub async fn load_or_empty(path: impl AsRef<Path>) -> Vec<SniffDefinition> {
        let path = path.as_ref();
        match Self::load(path).await {
            Ok(definitions) => definitions,
            Err(e) => {
                tracing::error!(
                    path = %path.display(),
                    error = %e,
                    "failed to load sniff definitions, continuing with an empty rule set"
                );
                Vec::new()
            }
        }
    }

    /// Loads every `.yml`/`.yaml` file in `dir`, in file name order.
    pub async fn load_directory(
        dir: impl AsRef<Path>,
    ) -> Result<Vec<SniffDefinition>, SniffError> {
        let dir = dir.as_ref();

        let mut entries =
            tokio::fs::read_dir(dir)
                .await
                .map_err(|e| SniffError::DefinitionLoad {
                    path: dir.display().to_string(),
                    reason: format!("failed to read directory: {e}"),
                })?;

        let mut paths: Vec<PathBuf> = Vec::new();
        while let Some(entry) =
            entries
                .next_entry()
                .await
                .map_err(|e| SniffError::DefinitionLoad {
                    path: dir.display().to_string(),
                    reason: format!("failed to read directory entry: {e}"),
                })?
        {
            let path = entry.path();
            let is_yaml = path
                .extension()
                .is_some_and(|ext| ext == "yml" || ext == "yaml");
            if is_yaml {
                paths.push(path);
            }
        }

        if paths.len() > MAX_DEFINITION_FILES {
            return Err(SniffError::DefinitionLoad {
                path: dir.display().to_string(),
                reason: format!("too many definition files: max {MAX_DEFINITION_FILES}"),
            });
        }
        paths.sort();

        let mut definitions = Vec::new();
        let mut seen_groups = HashSet::new();

        for path in paths {
            match Self::load_file(&path).await {
                Ok(definition) => {
                    if !seen_groups.insert(definition.group_name.clone()) {
                        tracing::warn!(
                            group = %definition.group_name,
                            path = %path.display(),
                            "duplicate sniff group name, skipping"
                        );
                        continue;
                    }
                    definitions.push(definition);
                }
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "failed to load sniff definition, skipping"
                    );
                }
            }
        }

        tracing::info!(
            dir = %dir.display(),
            count = definitions.len(),
            "loaded sniff definitions"
        );

        Ok(definitions)
    }

    /// Loads a single YAML definition file.
    pub async fn load_file(path: impl AsRef<Path>) -> Result<SniffDefinition, SniffError> {
        let path = path.as_ref();

        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| SniffError::DefinitionLoad {
                path: path.display().to_string(),
                reason: format!("failed to read file metadata: {e}"),
            })?;

        if metadata.len() > MAX_DEFINITION_FILE_SIZE {
            return Err(SniffError::DefinitionLoad {
                path: path.display().to_string(),
                reason: format!(
                    "file too large: {} bytes (max: {MAX_DEFINITION_FILE_SIZE})",
                    metadata.len()
                ),
            });
        }

        let content =
            tokio::fs::read_to_string(path)
                .await
                .map_err(|e| SniffError::DefinitionLoad {
                    path: path.display().to_string(),
                    reason: format!("failed to read file: {e}"),
                })?;

        Self::parse_yaml(&content, &path.display().to_string())
    }

    /// Parses and validates a YAML definition.
    pub fn parse_yaml(yaml_str: &str, source: &str) -> Result<SniffDefinition, SniffError> {
        let definition: SniffDefinition =
            serde_yaml::from_str(yaml_str).map_err(|e| SniffError::DefinitionLoad {
                path: source.to_owned(),
                reason: format!("YAML parse error: {e}"),
            })?;

        definition.validate()?;

        Ok(definition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WEB_YAML: &str = r#"
name: web
log: /tmp/t.log
sniff:
  - sniff_name: err
    enabled: true
    commands: "echo hi"
    regexp: "ERROR"
    timeout: 5
"#;

    #[test]
    fn parse_valid_yaml() {
        let def = DefinitionLoader::parse_yaml(WEB_YAML, "web.yaml").unwrap();
        assert_eq!(def.group_name, "web");
        assert_eq!(def.rules[0].name, "err");
        assert_eq!(def.rules[0].timeout_seconds, 5);
    }

    #[test]
    fn parse_invalid_yaml_returns_error() {
        let result = DefinitionLoader::parse_yaml("not: [valid: yaml: {{{", "bad.yaml");
        assert!(matches!(result, Err(SniffError::DefinitionLoad { .. })));
    }

    #[test]
    fn parse_yaml_missing_log_fails() {
        let result = DefinitionLoader::parse_yaml("name: web\nsniff: []\n", "nolog.yaml");
        assert!(result.is_err());
    }

    #[test]
    fn parse_yaml_with_path_group_name_fails() {
        let yaml = "name: ../web\nlog: /tmp/t.log\n";
        assert!(matches!(
            DefinitionLoader::parse_yaml(yaml, "evil.yaml"),
            Err(SniffError::Validation { .. })
        ));
    }

    #[tokio::test]
    async fn load_nonexistent_path_returns_error() {
        assert!(DefinitionLoader::load("/nonexistent/log-sniff").await.is_err());
    }

    #[tokio::test]
    async fn load_or_empty_swallows_errors() {
        let defs = DefinitionLoader::load_or_empty("/nonexistent/log-sniff").await;
        assert!(defs.is_empty());
    }

    #[tokio::test]
    async fn load_single_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("web.yaml");
        std::fs::write(&path, WEB_YAML).unwrap();

        let defs = DefinitionLoader::load(&path).await.unwrap();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].group_name, "web");
    }

    #[tokio::test]
    async fn load_directory_skips_bad_and_duplicate_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a_web.yaml"), WEB_YAML).unwrap();
        std::fs::write(dir.path().join("b_web_again.yml"), WEB_YAML).unwrap();
        std::fs::write(dir.path().join("c_broken.yaml"), "name: [").unwrap();
        std::fs::write(
            dir.path().join("d_db.yaml"),
            "name: db\nlog: /var/log/db.log\nsniff: []\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let defs = DefinitionLoader::load(dir.path()).await.unwrap();
        let names: Vec<_> = defs.iter().map(|d| d.group_name.as_str()).collect();
        assert_eq!(names, vec!["web", "db"]);
    }
}
