//! Tests for configuration validation

use prometheus_job_runner::config::{CleanupConfig, MemoryConfig, RunnerConfig};

#[test]
fn test_memory_config_validation() {
    let valid = MemoryConfig {
        capacity_mb: 1000,
        max_job_memory_mb: 800,
        default_job_memory_mb: 100,
    };
    assert!(valid.validate().is_ok());
}

#[test]
fn test_memory_ceiling_above_capacity() {
    let invalid = MemoryConfig {
        capacity_mb: 1000,
        max_job_memory_mb: 2000,
        default_job_memory_mb: 100,
    };
    assert!(invalid.validate().is_err());
}

#[test]
fn test_default_above_ceiling() {
    let invalid = MemoryConfig {
        capacity_mb: 1000,
        max_job_memory_mb: 500,
        default_job_memory_mb: 600,
    };
    assert!(invalid.validate().is_err());
}

#[test]
fn test_zero_capacity() {
    let invalid = MemoryConfig {
        capacity_mb: 0,
        max_job_memory_mb: 0,
        default_job_memory_mb: 0,
    };
    assert!(invalid.validate().is_err());
}

#[test]
fn test_runner_config_shared_roots() {
    let mut cfg = RunnerConfig::default();
    cfg.archive_root = cfg.jobs_root.clone();
    assert!(cfg.validate().is_err());
}

#[test]
fn test_runner_config_zero_poll_interval() {
    let cfg = RunnerConfig {
        poll_interval_ms: 0,
        ..RunnerConfig::default()
    };
    assert!(cfg.validate().is_err());
}

#[test]
fn test_runner_config_from_json() {
    let json = r#"{
        "memory": { "capacity_mb": 4096, "max_job_memory_mb": 2048, "default_job_memory_mb": 512 },
        "jobs_root": "/var/runner/jobs",
        "archive_root": "/var/runner/archives",
        "attachments_root": "/var/runner/attachments",
        "poll_interval_ms": 250,
        "kill_grace_secs": 2
    }"#;

    let cfg = RunnerConfig::from_json_str(json).unwrap();
    assert_eq!(cfg.memory.capacity_mb, 4096);
    assert_eq!(cfg.poll_interval_ms, 250);
    assert_eq!(cfg.default_timeout_secs, None);
    assert_eq!(cfg.cleanup, CleanupConfig::default());
}

#[test]
fn test_runner_config_from_json_invalid() {
    let json = r#"{
        "memory": { "capacity_mb": 100, "max_job_memory_mb": 200, "default_job_memory_mb": 50 },
        "jobs_root": "/a",
        "archive_root": "/b",
        "attachments_root": "/c",
        "poll_interval_ms": 250,
        "kill_grace_secs": 2
    }"#;
    let err = RunnerConfig::from_json_str(json).unwrap_err();
    assert!(err.contains("max_job_memory_mb"));

    assert!(RunnerConfig::from_json_str("{").unwrap_err().starts_with("parse error"));
}

#[test]
fn test_cleanup_defaults_keep_failed_workspaces() {
    let cleanup = CleanupConfig::default();
    assert!(cleanup.delete_dependencies);
    assert!(cleanup.archive_enabled);
    assert!(!cleanup.delete_failed_workspaces);
}

#[test]
fn test_roots_must_not_nest() {
    let base = RunnerConfig::default();

    let mut same = base.clone();
    same.archive_root = same.attachments_root.clone();
    assert!(same.validate().unwrap_err().contains("archive_root and attachments_root"));

    let mut nested = base.clone();
    nested.archive_root = nested.jobs_root.join("archives");
    assert!(nested.validate().unwrap_err().contains("jobs_root and archive_root"));

    let mut parent = base;
    parent.jobs_root = parent.attachments_root.parent().unwrap().to_path_buf();
    assert!(parent.validate().is_err());
}

#[test]
fn test_runner_config_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("runner.json");
    std::fs::write(
        &path,
        r#"{
        "memory": { "capacity_mb": 2048, "max_job_memory_mb": 1024, "default_job_memory_mb": 256 },
        "jobs_root": "/srv/jobs",
        "archive_root": "/srv/archives",
        "attachments_root": "/srv/attachments",
        "poll_interval_ms": 100,
        "kill_grace_secs": 1
    }"#,
    )
    .unwrap();
    let cfg = RunnerConfig::from_file(&path).unwrap();
    assert_eq!(cfg.memory.capacity_mb, 2048);

    let missing = RunnerConfig::from_file(dir.path().join("absent.json")).unwrap_err();
    assert!(missing.to_string().contains("failed to read runner config"));

    std::fs::write(&path, "{").unwrap();
    let invalid = RunnerConfig::from_file(&path).unwrap_err();
    assert!(invalid.to_string().contains("invalid runner config"));
    assert!(format!("{invalid:#}").contains("parse error"));
}
