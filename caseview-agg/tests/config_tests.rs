//! Configuration priority tests
//!
//! CLI > environment > TOML > compiled defaults. Tests touching environment
//! variables run serially.

use caseview_agg::config::{
    ConfigOverrides, ServiceConfig, ENV_API_BASE_URL, ENV_API_TOKEN, ENV_ID_SCAN_MODE,
    ENV_MAX_IN_FLIGHT, ENV_PORT,
};
use caseview_common::config::{load_toml_config, TomlConfig};
use caseview_common::IdScanMode;
use serial_test::serial;
use std::io::Write;
use std::time::Duration;

fn clear_env() {
    for key in [ENV_API_BASE_URL, ENV_API_TOKEN, ENV_ID_SCAN_MODE, ENV_MAX_IN_FLIGHT, ENV_PORT] {
        std::env::remove_var(key);
    }
}

fn toml_with_port(port: u16) -> TomlConfig {
    TomlConfig {
        port: Some(port),
        api_base_url: Some("https://toml.example.org/api".to_string()),
        ..TomlConfig::default()
    }
}

#[test]
#[serial]
fn test_defaults_when_nothing_is_set() {
    clear_env();
    let config = ServiceConfig::resolve(ConfigOverrides::default(), &TomlConfig::default()).unwrap();

    assert_eq!(config.api_base_url, "http://127.0.0.1:5000/api");
    assert_eq!(config.port, 5790);
    assert_eq!(config.max_in_flight, 8);
    assert_eq!(config.request_timeout, Duration::from_secs(30));
    assert_eq!(config.id_scan_mode, IdScanMode::Keyed);
    assert_eq!(config.log_level, "info");
    assert!(config.api_token.is_none());
}

#[test]
#[serial]
fn test_toml_overrides_defaults() {
    clear_env();
    let config = ServiceConfig::resolve(ConfigOverrides::default(), &toml_with_port(6100)).unwrap();

    assert_eq!(config.port, 6100);
    assert_eq!(config.api_base_url, "https://toml.example.org/api");
}

#[test]
#[serial]
fn test_env_overrides_toml() {
    clear_env();
    std::env::set_var(ENV_PORT, "6200");
    std::env::set_var(ENV_ID_SCAN_MODE, "anywhere");
    std::env::set_var(ENV_API_TOKEN, "env-token");

    let config = ServiceConfig::resolve(ConfigOverrides::default(), &toml_with_port(6100)).unwrap();
    clear_env();

    assert_eq!(config.port, 6200);
    assert_eq!(config.id_scan_mode, IdScanMode::Anywhere);
    assert_eq!(config.api_token.as_deref(), Some("env-token"));
    assert_eq!(config.api_base_url, "https://toml.example.org/api");
}

#[test]
#[serial]
fn test_cli_overrides_env() {
    clear_env();
    std::env::set_var(ENV_PORT, "6200");
    std::env::set_var(ENV_API_BASE_URL, "https://env.example.org/api");

    let cli = ConfigOverrides {
        port: Some(6300),
        ..ConfigOverrides::default()
    };
    let config = ServiceConfig::resolve(cli, &toml_with_port(6100)).unwrap();
    clear_env();

    assert_eq!(config.port, 6300);
    assert_eq!(config.api_base_url, "https://env.example.org/api");
}

#[test]
#[serial]
fn test_unparseable_env_value_is_error() {
    clear_env();
    std::env::set_var(ENV_MAX_IN_FLIGHT, "lots");

    let result = ServiceConfig::resolve(ConfigOverrides::default(), &TomlConfig::default());
    clear_env();

    assert!(result.is_err());
}

#[test]
#[serial]
fn test_zero_concurrency_rejected() {
    clear_env();
    let cli = ConfigOverrides {
        max_in_flight: Some(0),
        ..ConfigOverrides::default()
    };
    assert!(ServiceConfig::resolve(cli, &TomlConfig::default()).is_err());
}

#[test]
#[serial]
fn test_resolved_from_toml_file() {
    clear_env();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
api_base_url = "https://reports.example.org/api"
bind_address = "0.0.0.0"
port = 7000
rate_limit_per_second = 0

[logging]
level = "debug"
"#
    )
    .unwrap();

    let toml = load_toml_config(file.path()).unwrap();
    let config = ServiceConfig::resolve(ConfigOverrides::default(), &toml).unwrap();

    assert_eq!(config.socket_addr().unwrap().to_string(), "0.0.0.0:7000");
    assert_eq!(config.log_level, "debug");
    let http = config.http_source_config();
    assert_eq!(http.base_url, "https://reports.example.org/api");
    assert_eq!(http.rate_limit_per_second, 0);
}
