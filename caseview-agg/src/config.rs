//! Service configuration resolution
//!
//! # Settings Sources Priority
//!
//! 1. Command-line arguments
//! 2. Environment variables (`CASEVIEW_*`)
//! 3. TOML configuration file
//! 4. Built-in defaults ([`CompiledDefaults`])

use crate::client::HttpSourceConfig;
use caseview_common::config::{CompiledDefaults, TomlConfig};
use caseview_common::{Error, IdScanMode, Result};
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

pub const ENV_API_BASE_URL: &str = "CASEVIEW_API_BASE_URL";
pub const ENV_API_TOKEN: &str = "CASEVIEW_API_TOKEN";
pub const ENV_BIND_ADDRESS: &str = "CASEVIEW_BIND_ADDRESS";
pub const ENV_PORT: &str = "CASEVIEW_PORT";
pub const ENV_REQUEST_TIMEOUT_SECS: &str = "CASEVIEW_REQUEST_TIMEOUT_SECS";
pub const ENV_MAX_IN_FLIGHT: &str = "CASEVIEW_MAX_IN_FLIGHT";
pub const ENV_RATE_LIMIT: &str = "CASEVIEW_RATE_LIMIT_PER_SECOND";
pub const ENV_ID_SCAN_MODE: &str = "CASEVIEW_ID_SCAN_MODE";
pub const ENV_LOG_LEVEL: &str = "CASEVIEW_LOG_LEVEL";

/// Values given on the command line
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub api_base_url: Option<String>,
    pub api_token: Option<String>,
    pub bind_address: Option<String>,
    pub port: Option<u16>,
    pub request_timeout_secs: Option<u64>,
    pub max_in_flight: Option<usize>,
    pub rate_limit_per_second: Option<u32>,
    pub id_scan_mode: Option<IdScanMode>,
    pub log_level: Option<String>,
}

/// Fully resolved service configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    pub api_base_url: String,
    pub api_token: Option<String>,
    pub bind_address: String,
    pub port: u16,
    pub request_timeout: Duration,
    pub max_in_flight: usize,
    pub rate_limit_per_second: u32,
    pub id_scan_mode: IdScanMode,
    pub log_level: String,
}

impl ServiceConfig {
    /// Resolve every setting from CLI, environment, TOML and defaults
    ///
    /// # Errors
    /// Returns `Error::Config` if an environment variable is set but does not
    /// parse, or a resolved value is out of range.
    pub fn resolve(cli: ConfigOverrides, toml: &TomlConfig) -> Result<Self> {
        let defaults = CompiledDefaults::default();

        let max_in_flight = cli
            .max_in_flight
            .or(env_parse(ENV_MAX_IN_FLIGHT)?)
            .or(toml.max_in_flight)
            .unwrap_or(defaults.max_in_flight);
        if max_in_flight == 0 {
            return Err(Error::Config("max_in_flight must be at least 1".to_string()));
        }

        let request_timeout_secs = cli
            .request_timeout_secs
            .or(env_parse(ENV_REQUEST_TIMEOUT_SECS)?)
            .or(toml.request_timeout_secs)
            .unwrap_or(defaults.request_timeout_secs);
        if request_timeout_secs == 0 {
            return Err(Error::Config("request_timeout_secs must be at least 1".to_string()));
        }

        Ok(Self {
            api_base_url: cli
                .api_base_url
                .or(env_string(ENV_API_BASE_URL))
                .or(toml.api_base_url.clone())
                .unwrap_or(defaults.api_base_url),
            api_token: cli
                .api_token
                .or(env_string(ENV_API_TOKEN))
                .or(toml.api_token.clone()),
            bind_address: cli
                .bind_address
                .or(env_string(ENV_BIND_ADDRESS))
                .or(toml.bind_address.clone())
                .unwrap_or(defaults.bind_address),
            port: cli
                .port
                .or(env_parse(ENV_PORT)?)
                .or(toml.port)
                .unwrap_or(defaults.port),
            request_timeout: Duration::from_secs(request_timeout_secs),
            max_in_flight,
            rate_limit_per_second: cli
                .rate_limit_per_second
                .or(env_parse(ENV_RATE_LIMIT)?)
                .or(toml.rate_limit_per_second)
                .unwrap_or(defaults.rate_limit_per_second),
            id_scan_mode: cli
                .id_scan_mode
                .or(env_string(ENV_ID_SCAN_MODE)
                    .map(|s| parse_scan_mode(&s))
                    .transpose()?)
                .or(toml.id_scan_mode)
                .unwrap_or_default(),
            log_level: cli
                .log_level
                .or(env_string(ENV_LOG_LEVEL))
                .or(toml.logging.level.clone())
                .unwrap_or(defaults.log_level),
        })
    }

    /// Address the HTTP server listens on
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.bind_address, self.port)
            .parse()
            .map_err(|e| {
                Error::Config(format!(
                    "Invalid bind address {}:{}: {}",
                    self.bind_address, self.port, e
                ))
            })
    }

    /// Upstream client settings
    pub fn http_source_config(&self) -> HttpSourceConfig {
        HttpSourceConfig {
            base_url: self.api_base_url.clone(),
            api_token: self.api_token.clone(),
            timeout: self.request_timeout,
            rate_limit_per_second: self.rate_limit_per_second,
        }
    }
}

/// Parse `keyed` / `anywhere`
pub fn parse_scan_mode(value: &str) -> Result<IdScanMode> {
    match value.trim().to_ascii_lowercase().as_str() {
        "keyed" => Ok(IdScanMode::Keyed),
        "anywhere" => Ok(IdScanMode::Anywhere),
        other => Err(Error::Config(format!(
            "Unknown id scan mode '{}' (expected keyed or anywhere)",
            other
        ))),
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env_string(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| Error::Config(format!("Invalid value for {}: '{}' ({})", key, raw, e))),
        None => Ok(None),
    }
}
