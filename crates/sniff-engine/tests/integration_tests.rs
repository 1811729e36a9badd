//! Integration tests -- definition to capture file, end to end.
//!
//! These run real `/bin/sh` scripts against a temp log file, so they are
//! unix-only.
#![cfg(unix)]

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use logsniff_engine::{
    DefinitionLoader, EngineConfig, EngineConfigBuilder, ProcessOutput, ProcessRunner,
    ProcessStatus, ReopenBackoff, ScriptCompiler, ShellProcessRunner, SniffError, SystemClock,
    TailMatchLoop, TriggerRunner,
};

const WEB_YAML: &str = r#"
name: web
log: LOG_PATH
sniff:
  - sniff_name: err
    enabled: true
    commands: "echo hi"
    regexp: "ERROR"
    timeout: 5
  - sniff_name: disk
    enabled: true
    commands: "echo disk"
    regexp: "disk (full|failure)"
    timeout: 5
  - sniff_name: warn
    enabled: false
    commands: "echo warn"
    regexp: "WARN"
    timeout: 5
"#;

/// Records script paths instead of running them.
#[derive(Default)]
struct RecordingRunner {
    calls: Mutex<Vec<PathBuf>>,
}

impl RecordingRunner {
    fn calls(&self) -> Vec<PathBuf> {
        self.calls.lock().unwrap().clone()
    }
}

impl ProcessRunner for RecordingRunner {
    async fn run(&self, script: &Path, _timeout: Duration) -> Result<ProcessOutput, SniffError> {
        self.calls.lock().unwrap().push(script.to_path_buf());
        Ok(ProcessOutput {
            stdout: Some(Bytes::new()),
            stderr: Some(Bytes::new()),
            status: ProcessStatus::Exited { code: Some(0) },
        })
    }
}

struct Fixture {
    _root: tempfile::TempDir,
    log: PathBuf,
    script_dir: PathBuf,
    output_dir: PathBuf,
    config: EngineConfig,
}

fn fixture() -> Fixture {
    let root = tempfile::tempdir().unwrap();
    let log = root.path().join("t.log");
    let script_dir = root.path().join("shell");
    let output_dir = root.path().join("out");
    std::fs::create_dir_all(&output_dir).unwrap();
    std::fs::write(&log, b"backlog ERROR that must not fire\n").unwrap();

    let config = EngineConfigBuilder::new()
        .script_dir(&script_dir)
        .output_dir(&output_dir)
        .poll_interval(Duration::from_millis(5))
        .backoff(ReopenBackoff {
            initial: Duration::from_millis(50),
            max: Duration::from_millis(50),
            multiplier: 1.0,
        })
        .build();

    Fixture {
        _root: root,
        log,
        script_dir,
        output_dir,
        config,
    }
}

fn append(path: &Path, data: &str) {
    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)
        .unwrap();
    file.write_all(data.as_bytes()).unwrap();
}

/// Polls `condition` every 10ms for up to 5s.
async fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..500 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

fn captures(dir: &Path, suffix: &str) -> Vec<PathBuf> {
    let mut found: Vec<PathBuf> = std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.to_string_lossy().ends_with(suffix))
        .collect();
    found.sort();
    found
}

/// `web`/`err`/`echo hi`: the script is compiled and its stdout captured.
#[tokio::test]
async fn test_web_err_echo_hi_scenario() {
    let fx = fixture();
    let yaml = WEB_YAML.replace("LOG_PATH", &fx.log.display().to_string());
    let definition = DefinitionLoader::parse_yaml(&yaml, "web.yaml").unwrap();

    let clock = Arc::new(SystemClock);
    let compiler = ScriptCompiler::new(&fx.script_dir, Arc::clone(&clock));
    let (sniff_set, report) = compiler.compile(&definition).await;
    assert!(report.is_clean());
    assert_eq!(report.skipped_disabled, vec!["warn".to_owned()]);
    assert!(fx.script_dir.join("web.err.sh").exists());
    assert!(!fx.script_dir.join("web.warn.sh").exists());

    let trigger = TriggerRunner::new(Arc::new(ShellProcessRunner::default()), Arc::clone(&clock));
    let mut tail = TailMatchLoop::new(sniff_set, trigger, clock, &fx.config);
    let cancel = CancellationToken::new();
    let handle = {
        let cancel = cancel.clone();
        tokio::spawn(async move { tail.run(cancel).await })
    };

    tokio::time::sleep(Duration::from_millis(200)).await;
    append(&fx.log, "2024-06-01 ERROR upstream timed out\n");

    let out = fx.output_dir.clone();
    assert!(wait_for(|| !captures(&out, ".stderr").is_empty()).await);
    cancel.cancel();
    let stats = handle.await.unwrap();

    let stdout = captures(&fx.output_dir, ".stdout");
    assert_eq!(stdout.len(), 1);
    assert!(
        stdout[0]
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("web.err.sh.")
    );
    assert_eq!(std::fs::read(&stdout[0]).unwrap(), b"hi\n");
    assert_eq!(stats.matches, 1);
}

/// Every matching rule fires, in rule order, once per matching line.
#[tokio::test]
async fn test_lines_trigger_sum_of_matches_in_order() {
    let fx = fixture();
    let yaml = WEB_YAML.replace("LOG_PATH", &fx.log.display().to_string());
    let definition = DefinitionLoader::parse_yaml(&yaml, "web.yaml").unwrap();

    let clock = Arc::new(SystemClock);
    let (sniff_set, _) = ScriptCompiler::new(&fx.script_dir, Arc::clone(&clock))
        .compile(&definition)
        .await;

    let runner = Arc::new(RecordingRunner::default());
    let trigger = TriggerRunner::new(Arc::clone(&runner), Arc::clone(&clock));
    let mut tail = TailMatchLoop::new(sniff_set, trigger, clock, &fx.config);
    let cancel = CancellationToken::new();
    let handle = {
        let cancel = cancel.clone();
        tokio::spawn(async move { tail.run(cancel).await })
    };

    tokio::time::sleep(Duration::from_millis(200)).await;
    append(
        &fx.log,
        "ERROR one\nall fine\nERROR and disk full\nWARN ignored\ndisk failure\n",
    );

    assert!(wait_for(|| runner.calls().len() >= 4).await);
    cancel.cancel();
    let stats = handle.await.unwrap();

    let err = fx.script_dir.join("web.err.sh");
    let disk = fx.script_dir.join("web.disk.sh");
    assert_eq!(runner.calls(), vec![err.clone(), err, disk.clone(), disk]);
    assert_eq!(stats.lines_read, 5);
    assert_eq!(stats.matches, 4);
}

/// Deleting and recreating the log resumes with lines appended after the
/// reopen; content already in the recreated file is skipped.
#[tokio::test]
async fn test_delete_and_recreate_resumes_on_new_file() {
    let fx = fixture();
    let yaml = WEB_YAML.replace("LOG_PATH", &fx.log.display().to_string());
    let definition = DefinitionLoader::parse_yaml(&yaml, "web.yaml").unwrap();

    let clock = Arc::new(SystemClock);
    let (sniff_set, _) = ScriptCompiler::new(&fx.script_dir, Arc::clone(&clock))
        .compile(&definition)
        .await;

    let runner = Arc::new(RecordingRunner::default());
    let trigger = TriggerRunner::new(Arc::clone(&runner), Arc::clone(&clock));
    let mut tail = TailMatchLoop::new(sniff_set, trigger, clock, &fx.config);
    let cancel = CancellationToken::new();
    let handle = {
        let cancel = cancel.clone();
        tokio::spawn(async move { tail.run(cancel).await })
    };

    tokio::time::sleep(Duration::from_millis(200)).await;
    append(&fx.log, "ERROR before rotation\n");
    assert!(wait_for(|| runner.calls().len() == 1).await);

    std::fs::remove_file(&fx.log).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    let staged = fx.log.with_extension("tmp");
    std::fs::write(&staged, "ERROR written before the reopen\n").unwrap();
    std::fs::rename(&staged, &fx.log).unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(runner.calls().len(), 1, "recreated content must not fire");

    append(&fx.log, "disk full after rotation\n");
    assert!(wait_for(|| runner.calls().len() == 2).await);
    tokio::time::sleep(Duration::from_millis(150)).await;
    cancel.cancel();
    let stats = handle.await.unwrap();

    assert_eq!(
        runner.calls(),
        vec![
            fx.script_dir.join("web.err.sh"),
            fx.script_dir.join("web.disk.sh")
        ]
    );
    assert_eq!(stats.rotations, 1);
    assert!(stats.reopens >= 1);
}

/// A timed-out script is killed near its limit and partial output persists.
#[tokio::test]
async fn test_timeout_persists_partial_output() {
    let fx = fixture();
    let yaml = format!(
        "name: slow\nlog: {}\nsniff:\n  - sniff_name: hang\n    regexp: HANG\n    timeout: 1\n    commands: |\n      echo started\n      sleep 30\n",
        fx.log.display()
    );
    let definition = DefinitionLoader::parse_yaml(&yaml, "slow.yaml").unwrap();

    let clock = Arc::new(SystemClock);
    let (sniff_set, _) = ScriptCompiler::new(&fx.script_dir, Arc::clone(&clock))
        .compile(&definition)
        .await;
    let rule = sniff_set.rule("hang").unwrap().clone();

    let trigger = TriggerRunner::new(
        Arc::new(ShellProcessRunner::new("/bin/sh", Duration::from_millis(200))),
        clock,
    );
    let started = std::time::Instant::now();
    let result = trigger
        .invoke(&rule.script_path, &fx.output_dir, rule.timeout)
        .await;

    assert!(result.timed_out());
    assert!(started.elapsed() < Duration::from_secs(4));
    let stdout = captures(&fx.output_dir, ".stdout");
    assert_eq!(stdout.len(), 1);
    assert_eq!(std::fs::read(&stdout[0]).unwrap(), b"started\n");
    assert!(captures(&fx.output_dir, ".stderr").is_empty());
}

/// Recompiling an unchanged definition keeps the script bodies identical.
#[tokio::test]
async fn test_recompile_is_stable() {
    let fx = fixture();
    let yaml = WEB_YAML.replace("LOG_PATH", &fx.log.display().to_string());
    let definition = DefinitionLoader::parse_yaml(&yaml, "web.yaml").unwrap();
    let compiler = ScriptCompiler::new(&fx.script_dir, Arc::new(SystemClock));

    let body = |path: &Path| {
        let text = std::fs::read_to_string(path).unwrap();
        text.splitn(3, '\n').nth(2).unwrap().to_owned()
    };

    compiler.compile(&definition).await;
    let first = body(&fx.script_dir.join("web.err.sh"));
    compiler.compile(&definition).await;
    let second = body(&fx.script_dir.join("web.err.sh"));

    assert_eq!(first, second);
    assert_eq!(first, "echo hi");
}

/// The shipped demo definition loads and compiles cleanly.
#[tokio::test]
async fn test_demo_definition_compiles() {
    let yaml = include_str!("../../../demos/definitions/web.yaml");
    let definition = DefinitionLoader::parse_yaml(yaml, "web.yaml").unwrap();
    assert_eq!(definition.group_name, "web");

    let fx = fixture();
    let (sniff_set, report) = ScriptCompiler::new(&fx.script_dir, Arc::new(SystemClock))
        .compile(&definition)
        .await;

    assert!(report.is_clean());
    assert_eq!(report.skipped_disabled, vec!["worker_crash".to_owned()]);
    assert_eq!(sniff_set.len(), 2);
    assert!(
        sniff_set
            .matching_rules("open() failed (28: No space left on device)")
            .any(|rule| rule.name == "disk_full")
    );
}
