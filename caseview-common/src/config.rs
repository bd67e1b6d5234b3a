//! Configuration loading
//!
//! Bootstrap configuration is read from a TOML file. Every field is optional:
//! a missing file or a missing key falls back to [`CompiledDefaults`], so the
//! service always starts. Resolution against CLI flags and environment
//! variables happens in the service crate.

use crate::ids::IdScanMode;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Configuration file name
pub const CONFIG_FILE_NAME: &str = "caseview.toml";

/// Bootstrap configuration loaded from TOML file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Base URL of the upstream reporting API (e.g. `https://reports.example.org/api`)
    #[serde(default)]
    pub api_base_url: Option<String>,

    /// Bearer token attached to upstream requests
    #[serde(default)]
    pub api_token: Option<String>,

    /// Address the HTTP server binds to
    #[serde(default)]
    pub bind_address: Option<String>,

    /// HTTP server port
    #[serde(default)]
    pub port: Option<u16>,

    /// Upstream request timeout in seconds
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,

    /// Maximum concurrent upstream requests per fan-out
    #[serde(default)]
    pub max_in_flight: Option<usize>,

    /// Upstream requests per second (0 disables rate limiting)
    #[serde(default)]
    pub rate_limit_per_second: Option<u32>,

    /// Last-resort identifier extraction mode
    #[serde(default)]
    pub id_scan_mode: Option<IdScanMode>,

    /// Logging configuration (optional)
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level or filter directive (trace, debug, info, warn, error)
    #[serde(default)]
    pub level: Option<String>,
}

/// Built-in defaults used when no other source provides a value
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub api_base_url: String,
    pub bind_address: String,
    pub port: u16,
    pub request_timeout_secs: u64,
    pub max_in_flight: usize,
    pub rate_limit_per_second: u32,
    pub log_level: String,
}

impl Default for CompiledDefaults {
    fn default() -> Self {
        Self {
            api_base_url: "http://127.0.0.1:5000/api".to_string(),
            bind_address: "127.0.0.1".to_string(),
            port: 5790,
            request_timeout_secs: 30,
            max_in_flight: 8,
            rate_limit_per_second: 20,
            log_level: "info".to_string(),
        }
    }
}

/// Default configuration file path for the platform
///
/// `~/.config/caseview/caseview.toml` on Linux, the platform equivalent elsewhere.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("caseview").join(CONFIG_FILE_NAME))
}

/// Read and parse a TOML configuration file
///
/// # Errors
/// Returns `Error::Config` if the file cannot be read or parsed.
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Failed to read config file {}: {}", path.display(), e)))?;

    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse TOML {}: {}", path.display(), e)))
}

/// Load configuration, degrading to defaults when the file is missing
///
/// A missing file logs a warning and yields an empty config. A file that
/// exists but does not parse is still an error.
pub fn load_or_default(path: Option<&Path>) -> Result<TomlConfig> {
    let Some(path) = path else {
        warn!("No configuration file location available, using defaults");
        return Ok(TomlConfig::default());
    };

    if !path.exists() {
        warn!(path = %path.display(), "Configuration file not found, using defaults");
        return Ok(TomlConfig::default());
    }

    let config = load_toml_config(path)?;
    info!(path = %path.display(), "Loaded TOML configuration");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_full_config() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
api_base_url = "https://reports.example.org/api"
api_token = "secret"
port = 6000
max_in_flight = 4
id_scan_mode = "anywhere"

[logging]
level = "debug"
"#
        )
        .unwrap();

        let config = load_toml_config(file.path()).unwrap();
        assert_eq!(config.api_base_url.as_deref(), Some("https://reports.example.org/api"));
        assert_eq!(config.api_token.as_deref(), Some("secret"));
        assert_eq!(config.port, Some(6000));
        assert_eq!(config.max_in_flight, Some(4));
        assert_eq!(config.id_scan_mode, Some(IdScanMode::Anywhere));
        assert_eq!(config.logging.level.as_deref(), Some("debug"));
        assert!(config.bind_address.is_none());
    }

    #[test]
    fn test_empty_config_is_valid() {
        let file = NamedTempFile::new().unwrap();
        let config = load_toml_config(file.path()).unwrap();
        assert_eq!(config, TomlConfig::default());
    }

    #[test]
    fn test_missing_file_degrades_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_or_default(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(config, TomlConfig::default());

        let config = load_or_default(None).unwrap();
        assert_eq!(config, TomlConfig::default());
    }

    #[test]
    fn test_malformed_file_is_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "port = \"not a number\"").unwrap();
        let err = load_or_default(Some(file.path())).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_default_config_path_file_name() {
        if let Some(path) = default_config_path() {
            assert!(path.ends_with("caseview/caseview.toml"));
        }
    }
}
