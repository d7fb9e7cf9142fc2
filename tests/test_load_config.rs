use std::env;
use std::fs::write;
use std::path::PathBuf;
use std::time::Duration;

use camsnap::load_config::{
    load_config, CaptureOverrides, ENV_CAMERA_USERNAME, ENV_PASSWORD_ANALYTICS,
    ENV_PASSWORD_DEFAULT,
};
use chrono::NaiveDate;
use serial_test::serial;
use tempfile::NamedTempFile;

fn config_file(yaml: &str) -> NamedTempFile {
    let file = NamedTempFile::new().expect("temp file");
    write(file.path(), yaml).unwrap();
    file
}

fn set_camera_env() {
    env::remove_var(ENV_CAMERA_USERNAME);
    env::set_var(ENV_PASSWORD_ANALYTICS, "analytics-secret");
    env::set_var(ENV_PASSWORD_DEFAULT, "default-secret");
}

fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 11, 26).unwrap()
}

#[tokio::test]
#[serial]
async fn capture_section_with_defaults_and_env_secrets() {
    let file = config_file(
        r#"
capture:
  inventory: ./cameras.xlsx
  output_root: ./snapshots
"#,
    );
    set_camera_env();

    let config = load_config(file.path()).expect("Config should load");
    assert!(config.sync.is_none());

    let section = config.capture_section().unwrap();
    assert_eq!(section.inventory, PathBuf::from("./cameras.xlsx"));
    assert_eq!(section.ffmpeg, PathBuf::from("ffmpeg"));

    let capture = section.into_capture_config(day()).unwrap();
    assert_eq!(capture.run_dir(), PathBuf::from("./snapshots/2025-11-26"));
    assert_eq!(capture.max_workers, 30);
    assert_eq!(capture.timeout, Duration::from_secs(7));
    assert_eq!(capture.rtsp.port, 554);
    assert_eq!(capture.rtsp.path, "stream1");
    assert_eq!(capture.credentials.analytics.username, "admin");
    assert_eq!(capture.credentials.analytics.password, "analytics-secret");
    assert_eq!(capture.credentials.default.password, "default-secret");
}

#[tokio::test]
#[serial]
async fn capture_section_full_with_overrides() {
    let file = config_file(
        r#"
capture:
  inventory: ./cameras.xlsx
  output_root: ./snapshots
  location: guntur
  max_workers: 12
  timeout_secs: 4.5
  rtsp:
    port: 8554
    path: live/main
  columns:
    address: ["IP ADDRESS"]
    camera_type: ["CAM TYPE"]
"#,
    );
    set_camera_env();
    env::set_var(ENV_CAMERA_USERNAME, "operator");

    let config = load_config(file.path()).unwrap();
    let overrides = CaptureOverrides {
        output_root: Some(PathBuf::from("/mnt/snaps")),
        max_workers: Some(50),
        ..Default::default()
    };
    let section = config.capture_section().unwrap().clone().apply(&overrides);
    assert_eq!(section.columns.address, vec!["IP ADDRESS".to_string()]);
    assert_eq!(section.columns.location_name, vec!["LOCATION NAME".to_string()]);

    let capture = section.into_capture_config(day()).unwrap();
    assert_eq!(capture.run_dir(), PathBuf::from("/mnt/snaps/2025-11-26_guntur"));
    assert_eq!(capture.max_workers, 50);
    assert_eq!(capture.timeout, Duration::from_millis(4500));
    assert_eq!(capture.rtsp.port, 8554);
    assert_eq!(capture.credentials.default.username, "operator");

    env::remove_var(ENV_CAMERA_USERNAME);
}

#[tokio::test]
#[serial]
async fn missing_camera_password_is_an_error() {
    let file = config_file("capture:\n  inventory: a.csv\n  output_root: out\n");
    set_camera_env();
    env::remove_var(ENV_PASSWORD_DEFAULT);

    let config = load_config(file.path()).unwrap();
    let err = config
        .capture_section()
        .unwrap()
        .into_capture_config(day())
        .unwrap_err();
    assert!(err.to_string().contains(ENV_PASSWORD_DEFAULT), "got: {err}");
}

#[tokio::test]
#[serial]
async fn non_positive_timeout_is_rejected() {
    let file = config_file("capture:\n  inventory: a.csv\n  output_root: out\n  timeout_secs: 0\n");
    set_camera_env();

    let config = load_config(file.path()).unwrap();
    let err = config
        .capture_section()
        .unwrap()
        .into_capture_config(day())
        .unwrap_err();
    assert!(err.to_string().contains("timeout_secs"));
}

#[tokio::test]
#[serial]
async fn sync_section_maps_to_sync_config() {
    let file = config_file(
        r#"
sync:
  local_root: ./snapshots/2025-11-26
  bucket: camera-snapshots
  credentials: ./gcs.json
  concurrency: 0
"#,
    );

    let config = load_config(file.path()).unwrap();
    assert!(config.capture_section().is_err());

    let section = config.sync_section().unwrap();
    assert!(section.endpoint.is_none());
    let sync = section.into_sync_config();
    assert_eq!(sync.local_root, PathBuf::from("./snapshots/2025-11-26"));
    assert_eq!(sync.bucket, "camera-snapshots");
    assert_eq!(sync.credentials_path, PathBuf::from("./gcs.json"));
    assert_eq!(sync.concurrency, 1, "zero concurrency is clamped to one");
}

#[tokio::test]
#[serial]
async fn invalid_yaml_reports_parse_error() {
    let file = config_file("not-yaml: [:::");
    let err = load_config(file.path()).unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("parse") || msg.contains("YAML"), "Parse error expected, got: {msg}");
}

#[tokio::test]
#[serial]
async fn missing_file_reports_read_error() {
    let err = load_config("/nonexistent/camsnap.yaml").unwrap_err();
    assert!(err.to_string().contains("Failed to read config file"));
}

#[tokio::test]
#[serial]
async fn oversized_timeout_is_a_config_error() {
    let file = config_file("capture:\n  inventory: a.csv\n  output_root: out\n  timeout_secs: 1.0e+20\n");
    set_camera_env();

    let config = load_config(file.path()).unwrap();
    let err = config
        .capture_section()
        .unwrap()
        .into_capture_config(day())
        .unwrap_err();
    assert!(err.to_string().contains("out of range"), "got: {err}");

    let overrides = CaptureOverrides {
        timeout_secs: Some(1e20),
        ..Default::default()
    };
    let file = config_file("capture:\n  inventory: a.csv\n  output_root: out\n");
    let section = load_config(file.path())
        .unwrap()
        .capture_section()
        .unwrap()
        .clone()
        .apply(&overrides);
    let err = section.into_capture_config(day()).unwrap_err();
    assert!(err.to_string().contains("timeout_secs"), "got: {err}");
}
