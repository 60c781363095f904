//! Tests for config functionality.

use crate::config::Config;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn test_default_config() {
    let config = Config::default();

    assert_eq!(config.refresh_interval_ms, 5_000);
    assert_eq!(config.stale_factor, 3);
    assert_eq!(config.mutex_attempts, 100);
    assert_eq!(config.mutex_retry_delay_ms, 100);
    assert_eq!(config.directory_ttl_secs, 60);
    assert_eq!(config.discovery_timeout_ms, 5_000);
    assert_eq!(config.beacon.group, Ipv4Addr::new(239, 255, 77, 77));
    assert_eq!(config.beacon.rollcall_jitter_ms, 2_000);
    assert!(!config.beacon.verify_checksums);
    assert!(config.beacon.advertise_ip.is_none());
    assert!(config.lock_dir.ends_with("rackshare"));
}

#[test]
fn test_parse_empty_yaml_uses_defaults() {
    let config = Config::from_yaml("").unwrap();
    assert_eq!(config.refresh_interval_ms, 5_000);
    assert_eq!(config.command_port, 10773);
}

#[test]
fn test_parse_partial_yaml() {
    let yaml = r#"
refresh_interval_ms: 250
lock_dir: /var/lock/rackshare
beacon:
  group: 127.0.0.1
  verify_checksums: true
  advertise_ip: 10.0.0.7
"#;
    let config = Config::from_yaml(yaml).unwrap();

    assert_eq!(config.refresh_interval_ms, 250);
    assert_eq!(config.lock_dir.to_str(), Some("/var/lock/rackshare"));
    assert_eq!(config.beacon.group, Ipv4Addr::LOCALHOST);
    assert!(config.beacon.verify_checksums);
    assert_eq!(
        config.beacon.advertise_ip,
        Some(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7)))
    );

    // Unspecified values keep their defaults
    assert_eq!(config.stale_factor, 3);
    assert_eq!(config.beacon.rollcall_port, 10771);
}

#[test]
fn test_unknown_fields_are_ignored() {
    let yaml = r#"
refresh_interval_ms: 1000
some_future_setting: 42
"#;
    let config = Config::from_yaml(yaml).unwrap();
    assert_eq!(config.refresh_interval_ms, 1000);
}

#[test]
fn test_validate_rejects_zero_refresh_interval() {
    let err = Config::from_yaml("refresh_interval_ms: 0").unwrap_err();
    assert!(err.to_string().contains("refresh_interval_ms"));
}

#[test]
fn test_validate_rejects_zero_stale_factor() {
    let err = Config::from_yaml("stale_factor: 0").unwrap_err();
    assert!(err.to_string().contains("stale_factor"));
}

#[test]
fn test_validate_rejects_overflowing_stale_bound() {
    let yaml = "refresh_interval_ms: 18446744073709551615\nstale_factor: 4000000000\n";
    let err = Config::from_yaml(yaml).unwrap_err();
    assert!(err.to_string().contains("overflows"));
}

#[test]
fn test_validate_rejects_bad_checksum_len() {
    let yaml = r#"
beacon:
  checksum_len: 40
"#;
    let err = Config::from_yaml(yaml).unwrap_err();
    assert!(err.to_string().contains("checksum_len"));
}

#[test]
fn test_invalid_yaml_is_user_error() {
    let err = Config::from_yaml("refresh_interval_ms: [not, a, number]").unwrap_err();
    assert!(err.to_string().contains("failed to parse config YAML"));
}

#[test]
fn test_roundtrip_yaml() {
    let config = Config::default();
    let yaml = config.to_yaml().unwrap();
    let parsed = Config::from_yaml(&yaml).unwrap();
    assert_eq!(parsed.refresh_interval_ms, config.refresh_interval_ms);
    assert_eq!(parsed.beacon.group, config.beacon.group);
}

#[test]
fn test_load_from_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("rackshare.yaml");
    std::fs::write(&path, "mutex_attempts: 7\n").unwrap();

    let config = Config::load(&path).unwrap();
    assert_eq!(config.mutex_attempts, 7);
}

#[test]
fn test_resolve_explicit_missing_file_is_error() {
    let temp_dir = TempDir::new().unwrap();
    let missing = temp_dir.path().join("nope.yaml");
    assert!(Config::resolve(Some(&missing)).is_err());
}

#[test]
fn test_settings_conversion() {
    let yaml = r#"
refresh_interval_ms: 200
stale_factor: 4
mutex_retry_delay_ms: 5
discovery_timeout_ms: 300
"#;
    let config = Config::from_yaml(yaml).unwrap();

    let arbiter = config.arbiter_settings();
    assert_eq!(arbiter.refresh_interval, Duration::from_millis(200));
    assert_eq!(arbiter.stale_after(), Duration::from_millis(800));

    let store = config.store_settings();
    assert_eq!(store.retry_delay, Duration::from_millis(5));
    assert_eq!(store.attempts, 100);

    let directory = config.directory_settings();
    assert_eq!(directory.discovery_timeout, Duration::from_millis(300));
    assert_eq!(directory.ttl, Duration::from_secs(60));
}
