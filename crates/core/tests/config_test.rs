use nodepool_core::config::*;
use std::env;
use std::fs;
use tempfile::NamedTempFile;

#[test]
fn test_config_from_toml() {
    let toml_content = r#"
[scheduler]
schedule_interval_seconds = 2
max_retries = 5
dispatch_ack_timeout_seconds = 45

[heartbeat]
interval_seconds = 5
missed_before_suspect = 2
timeout_seconds = 30
dead_node_grace_seconds = 60

[lifecycle]
stop_ack_timeout_seconds = 15
watchdog_interval_seconds = 1
task_retention_seconds = 3600

[api]
bind_address = "127.0.0.1:9090"
cors_origins = ["http://localhost:3000"]
long_poll_seconds = 10

[credit]
enabled = false

[observability]
log_level = "debug"
metrics_enabled = false
"#;

    let config = AppConfig::from_toml(toml_content).unwrap();

    assert_eq!(config.scheduler.max_retries, 5);
    assert_eq!(config.heartbeat.suspect_after().as_secs(), 10);
    assert_eq!(config.lifecycle.task_retention().map(|d| d.as_secs()), Some(3600));
    assert_eq!(config.api.bind_address, "127.0.0.1:9090");
    assert_eq!(config.api.long_poll().as_secs(), 10);
    assert!(!config.credit.enabled);
    assert_eq!(config.observability.log_level, "debug");
}

#[test]
fn test_config_validation_heartbeat() {
    let mut config = AppConfig::default();

    config.heartbeat.interval_seconds = 0;
    assert!(config.validate().is_err());

    // 超时必须晚于可疑阈值
    config.heartbeat.interval_seconds = 30;
    config.heartbeat.missed_before_suspect = 3;
    config.heartbeat.timeout_seconds = 90;
    assert!(config.validate().is_err());

    config.heartbeat.timeout_seconds = 91;
    assert!(config.validate().is_ok());
}

#[test]
fn test_config_validation_lifecycle_and_scheduler() {
    let mut config = AppConfig::default();
    config.lifecycle.stop_ack_timeout_seconds = 0;
    assert!(config.validate().is_err());

    let mut config = AppConfig::default();
    config.scheduler.dispatch_ack_timeout_seconds = 0;
    assert!(config.validate().is_err());
}

#[test]
fn test_config_validation_api_and_observability() {
    let mut config = AppConfig::default();
    config.api.max_archive_size_mb = 0;
    assert!(config.validate().is_err());

    let mut config = AppConfig::default();
    config.observability.log_level = "verbose".to_string();
    assert!(config.validate().is_err());

    let mut config = AppConfig::default();
    config.observability.metrics_endpoint = "metrics".to_string();
    assert!(config.validate().is_err());
}

#[test]
fn test_config_environment_override() {
    let temp_file = NamedTempFile::with_suffix(".toml").unwrap();
    fs::write(
        temp_file.path(),
        "[lifecycle]\nstop_ack_timeout_seconds = 20\n",
    )
    .unwrap();

    env::set_var("NODEPOOL_LIFECYCLE__WATCHDOG_INTERVAL_SECONDS", "7");
    let config = AppConfig::load(temp_file.path().to_str()).unwrap();
    env::remove_var("NODEPOOL_LIFECYCLE__WATCHDOG_INTERVAL_SECONDS");

    assert_eq!(config.lifecycle.stop_ack_timeout_seconds, 20);
    assert_eq!(config.lifecycle.watchdog_interval_seconds, 7);
}

#[test]
fn test_bundled_config_file_loads() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../../config/nodepool.toml");
    let config = AppConfig::load(Some(path)).unwrap();
    assert_eq!(config.storage.backend, StorageBackend::Filesystem);
    assert_eq!(config.heartbeat.timeout_seconds, 90);
}
