//! Orchestrator integration tests.
//!
//! Full flow: config -> definitions -> compile -> tail loops -> shutdown.
#![cfg(unix)]

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use logsniff_core::config::LogSniffConfig;
use logsniff_daemon::orchestrator::Orchestrator;
use tempfile::TempDir;

struct Layout {
    root: TempDir,
}

impl Layout {
    fn new() -> Self {
        let root = TempDir::new().expect("should create temp dir");
        std::fs::create_dir_all(root.path().join("defs")).unwrap();
        std::fs::create_dir_all(root.path().join("out")).unwrap();
        Self { root }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.root.path().join(name)
    }

    fn config(&self, pid_file: &str) -> LogSniffConfig {
        let toml_str = format!(
            r#"
[general]
log_level = "info"
pid_file = "{pid_file}"

[paths]
definitions = "{defs}"
script_dir = "{shell}"
output_dir = "{out}"

[tail]
poll_interval_ms = 5
reopen_backoff_ms = 50
max_reopen_backoff_ms = 50
"#,
            defs = self.path("defs").display(),
            shell = self.path("shell").display(),
            out = self.path("out").display(),
        );
        LogSniffConfig::parse(&toml_str).expect("failed to parse test config")
    }

    fn write_definition(&self, file: &str, group: &str, log: &Path, rules: &str) {
        let yaml = format!("name: {group}\nlog: {}\nsniff:\n{rules}", log.display());
        std::fs::write(self.path("defs").join(file), yaml).unwrap();
    }
}

const ERR_RULE: &str = r#"  - sniff_name: err
    enabled: true
    commands: "echo hi"
    regexp: "ERROR"
    timeout: 5
"#;

fn append(path: &Path, data: &str) {
    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)
        .unwrap();
    file.write_all(data.as_bytes()).unwrap();
}

fn capture_count(dir: &Path, prefix: &str, suffix: &str) -> usize {
    std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            name.starts_with(prefix) && name.ends_with(suffix)
        })
        .count()
}

async fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..500 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

#[tokio::test]
async fn test_build_loads_definition_directory() {
    let layout = Layout::new();
    layout.write_definition("web.yaml", "web", &layout.path("web.log"), ERR_RULE);
    layout.write_definition("db.yaml", "db", &layout.path("db.log"), ERR_RULE);

    let orchestrator = Orchestrator::build_from_config(layout.config(""))
        .await
        .expect("should build");

    let mut groups: Vec<_> = orchestrator
        .definitions()
        .iter()
        .map(|d| d.group_name.clone())
        .collect();
    groups.sort();
    assert_eq!(groups, vec!["db", "web"]);
}

#[tokio::test]
async fn test_missing_definitions_leave_zero_groups() {
    let layout = Layout::new();
    let mut config = layout.config("");
    config.paths.definitions = layout.path("absent").display().to_string();

    let orchestrator = Orchestrator::build_from_config(config)
        .await
        .expect("missing definitions must not be fatal");
    assert!(orchestrator.definitions().is_empty());
}

#[tokio::test]
async fn test_invalid_config_is_fatal() {
    let layout = Layout::new();
    let mut config = layout.config("");
    config.tail.poll_interval_ms = 0;

    assert!(Orchestrator::build_from_config(config).await.is_err());
}

#[tokio::test]
async fn test_validate_reports_bad_rules() {
    let layout = Layout::new();
    let rules = format!(
        "{ERR_RULE}  - sniff_name: broken\n    regexp: \"[\"\n    timeout: 5\n    commands: \"true\"\n"
    );
    layout.write_definition("web.yaml", "web", &layout.path("web.log"), &rules);

    let orchestrator = Orchestrator::build_from_config(layout.config(""))
        .await
        .unwrap();
    let summary = orchestrator.validate();

    assert_eq!(summary.groups, 1);
    assert_eq!(summary.valid_rules, 1);
    assert_eq!(summary.errors.len(), 1);
    assert!(summary.errors[0].starts_with("web.broken:"));
    assert!(!layout.path("shell").exists(), "validate must not write scripts");
}

#[tokio::test]
async fn test_compile_writes_scripts() {
    let layout = Layout::new();
    layout.write_definition("web.yaml", "web", &layout.path("web.log"), ERR_RULE);

    let orchestrator = Orchestrator::build_from_config(layout.config(""))
        .await
        .unwrap();
    let sets = orchestrator.compile().await;

    assert_eq!(sets.len(), 1);
    assert_eq!(sets[0].len(), 1);
    assert!(layout.path("shell").join("web.err.sh").exists());
}

#[tokio::test]
async fn test_run_until_follows_each_group_and_shuts_down() {
    let layout = Layout::new();
    let web_log = layout.path("web.log");
    let db_log = layout.path("db.log");
    append(&web_log, "");
    append(&db_log, "");
    layout.write_definition("web.yaml", "web", &web_log, ERR_RULE);
    layout.write_definition("db.yaml", "db", &db_log, ERR_RULE);

    let pid_path = layout.path("run/log-sniff.pid");
    let mut orchestrator =
        Orchestrator::build_from_config(layout.config(&pid_path.display().to_string()))
            .await
            .unwrap();
    let token = orchestrator.shutdown_token();

    let out = layout.path("out");
    let driver = async {
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(pid_path.exists(), "PID file should exist while running");

        append(&web_log, "web ERROR 1\n");
        append(&db_log, "db ERROR 1\n");
        assert!(
            wait_for(|| {
                capture_count(&out, "web.err.sh.", ".stderr") == 1
                    && capture_count(&out, "db.err.sh.", ".stderr") == 1
            })
            .await
        );
        token.cancel();
    };

    let (result, ()) = tokio::join!(
        orchestrator.run_until(std::future::pending::<()>()),
        driver
    );
    let stats = result.expect("run should succeed");

    assert_eq!(stats.len(), 2);
    assert!(stats.iter().all(|s| s.matches == 1));
    assert!(!pid_path.exists(), "PID file should be removed on shutdown");
}

#[tokio::test]
async fn test_run_refuses_held_pid_file() {
    let layout = Layout::new();
    let pid_path = layout.path("log-sniff.pid");
    std::fs::write(&pid_path, "12345\n").unwrap();

    let mut orchestrator =
        Orchestrator::build_from_config(layout.config(&pid_path.display().to_string()))
            .await
            .unwrap();

    let result = orchestrator.run_until(async {}).await;
    assert!(result.is_err());
    assert_eq!(std::fs::read_to_string(&pid_path).unwrap(), "12345\n");
}

#[tokio::test]
async fn test_run_with_no_groups_idles_until_shutdown() {
    let layout = Layout::new();
    let mut orchestrator = Orchestrator::build_from_config(layout.config(""))
        .await
        .unwrap();

    let stats = tokio::time::timeout(
        Duration::from_secs(2),
        orchestrator.run_until(tokio::time::sleep(Duration::from_millis(50))),
    )
    .await
    .expect("should stop on shutdown")
    .unwrap();
    assert!(stats.is_empty());
}
