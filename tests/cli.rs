use std::fs::{create_dir_all, write};
use std::sync::{Arc, Mutex};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::{tempdir, NamedTempFile};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{layer::Context, Layer, Registry};

fn config_file(yaml: &str) -> NamedTempFile {
    let config = NamedTempFile::new().expect("Creating temp config file failed");
    write(config.path(), yaml).expect("Writing temp config failed");
    config
}

#[test]
fn help_lists_both_subcommands() {
    let mut cmd = Command::cargo_bin("camsnap").expect("Binary exists");
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("capture").and(predicate::str::contains("sync")));
}

#[test]
fn missing_config_file_exits_non_zero() {
    let mut cmd = Command::cargo_bin("camsnap").expect("Binary exists");
    cmd.args(["sync", "--config", "/nonexistent/camsnap.yaml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read config file"));
}

#[test]
fn sync_with_missing_local_root_exits_non_zero() {
    let dir = tempdir().unwrap();
    let credentials = dir.path().join("gcs.json");
    write(&credentials, r#"{"type":"access_token","access_token":"t"}"#).unwrap();
    let config = config_file(&format!(
        "sync:\n  local_root: {}\n  bucket: camera-snapshots\n  credentials: {}\n",
        dir.path().join("not-there").display(),
        credentials.display()
    ));

    let mut cmd = Command::cargo_bin("camsnap").expect("Binary exists");
    cmd.args(["sync", "--config"])
        .arg(config.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("Local images directory not found"));
}

#[test]
fn sync_with_missing_credential_file_exits_non_zero() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("2025-11-26");
    create_dir_all(&root).unwrap();
    let config = config_file(&format!(
        "sync:\n  local_root: {}\n  bucket: camera-snapshots\n  credentials: {}\n",
        root.display(),
        dir.path().join("gcs.json").display()
    ));

    let mut cmd = Command::cargo_bin("camsnap").expect("Binary exists");
    cmd.args(["sync", "--config"])
        .arg(config.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("Storage credential file not found"));
}

#[test]
fn capture_with_missing_inventory_exits_non_zero() {
    let dir = tempdir().unwrap();
    let config = config_file(&format!(
        "capture:\n  inventory: {}\n  output_root: {}\n",
        dir.path().join("cameras.xlsx").display(),
        dir.path().join("snapshots").display()
    ));

    let mut cmd = Command::cargo_bin("camsnap").expect("Binary exists");
    cmd.args(["capture", "--config"])
        .arg(config.path())
        .env("CAMERA_PASSWORD_ANALYTICS", "a")
        .env("CAMERA_PASSWORD_DEFAULT", "d")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load inventory"));
    assert!(!dir.path().join("snapshots").exists());
}

#[test]
fn capture_without_capture_section_exits_non_zero() {
    let config = config_file("sync:\n  local_root: x\n  bucket: b\n  credentials: c.json\n");

    let mut cmd = Command::cargo_bin("camsnap").expect("Binary exists");
    cmd.args(["capture", "--config"])
        .arg(config.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("no 'capture' section"));
}

/// Collects the debug rendering of every emitted event.
struct EventCollector {
    events: Arc<Mutex<Vec<String>>>,
}

impl<S> Layer<S> for EventCollector
where
    S: tracing::Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        self.events.lock().unwrap().push(format!("{:?}", event));
    }
}

#[tokio::test]
async fn emits_trace_initialised_event() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let collector = EventCollector {
        events: events.clone(),
    };
    let subscriber = Registry::default().with(collector);
    let _guard = tracing::subscriber::set_default(subscriber);

    use camsnap::cli::{run, CaptureArgs, Cli, Commands};

    let cli = Cli {
        command: Commands::Capture {
            config: std::path::PathBuf::from("dummy.yaml"),
            overrides: CaptureArgs::default(),
        },
    };

    let result = run(cli).await;
    assert!(result.is_err(), "dummy config must not load");

    let event_msgs = events.lock().unwrap();
    assert!(
        event_msgs.iter().any(|msg| msg.contains("trace_initialised")),
        "Expected a 'trace_initialised' trace event, got: {:?}",
        event_msgs
    );
}
