//! Configuration tests
//!
//! Loading from files, environment overrides and validation.

use std::io::Write;

use serial_test::serial;

use port_mirror::config::{validate_config, Config, ConfigValidator, MirrorConfig};
use port_mirror::MirrorError;

fn write_config(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".json")
        .tempfile()
        .unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

const SAMPLE: &str = r#"{
    "log_level": "debug",
    "log_file": "stderr",
    "mirrors": [
        {
            "local": "127.0.0.1:9000",
            "target": "example.com:80",
            "proxy": "http://user:pw@proxy:3128, direct",
            "alive_timeout": 120,
            "read_timeout": -1
        },
        { "local": "tcp://127.0.0.1:9001", "target": "[::1]:22" }
    ]
}"#;

/// Test configuration from file
#[test]
#[serial]
fn test_file_config() {
    let file = write_config(SAMPLE);
    let config = Config::from_file(file.path()).unwrap();

    assert_eq!(config.log_level, "debug");
    assert_eq!(config.log_file, "stderr");
    assert_eq!(config.mirrors.len(), 2);

    let first = &config.mirrors[0];
    assert_eq!(first.proxy, "http://user:pw@proxy:3128, direct");
    assert_eq!(first.alive_timeout, 120);
    assert_eq!(first.read_timeout, 5);
    assert_eq!(first.write_timeout, 30);

    let second = &config.mirrors[1];
    assert!(second.proxy.is_empty());
    assert_eq!(second.alive_timeout, 60);

    assert!(validate_config(&config).is_ok());
    assert!(config.check_warnings().is_empty());
}

/// Test environment variables override the file
#[test]
#[serial]
fn test_env_override() {
    let file = write_config(SAMPLE);

    std::env::set_var("PORT_MIRROR_LOG_LEVEL", "trace");
    let result = Config::from_file(file.path());
    std::env::remove_var("PORT_MIRROR_LOG_LEVEL");

    let config = result.unwrap();
    assert_eq!(config.log_level, "trace");
    assert_eq!(config.mirrors.len(), 2);
}

#[test]
#[serial]
fn test_missing_sections_use_defaults() {
    let file = write_config("{}");
    let config = Config::from_file(file.path()).unwrap();

    assert_eq!(config.log_level, "info");
    assert_eq!(config.log_file, "stdout");

    let err = validate_config(&config).unwrap_err();
    assert!(err.to_string().contains("no mirror configuration"));
}

#[test]
#[serial]
fn test_invalid_file() {
    let file = write_config("{ \"mirrors\": [ ");
    assert!(matches!(
        Config::from_file(file.path()),
        Err(MirrorError::Config(_))
    ));
}

#[test]
fn test_validation_names_bad_mirror() {
    let mut config = Config::default();
    config.mirrors.push(MirrorConfig::new("127.0.0.1:9000", "example.com:80"));
    config.mirrors.push(MirrorConfig::new("127.0.0.1:9001", "example.com"));

    let err = validate_config(&config).unwrap_err().to_string();
    assert!(err.contains("mirror #1"));
    assert!(err.contains("example.com"));
}

#[test]
#[serial]
fn test_config_round_trips_through_json() {
    let mut config = Config::default();
    config.mirrors.push(
        MirrorConfig::new("127.0.0.1:9000", "example.com:80").with_proxy("socks5h://proxy"),
    );

    let reloaded = Config::from_json(&config.to_json_pretty()).unwrap();
    assert_eq!(reloaded, config);
}
