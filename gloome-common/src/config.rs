//! Configuration loading and resolution
//!
//! Bootstrap settings come from a TOML file. The service URL follows the
//! usual priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable `GLOOME_SERVICE_URL`
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! The config file itself is located by `--config`, then `GLOOME_CONFIG`,
//! then the platform config directory. A missing file is not an error.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

pub const CONFIG_ENV_VAR: &str = "GLOOME_CONFIG";
pub const SERVICE_URL_ENV_VAR: &str = "GLOOME_SERVICE_URL";

pub const DEFAULT_SERVICE_URL: &str = "http://127.0.0.1:5000";
pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:5780";
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;
/// Three days of polling at the default interval
pub const DEFAULT_MAX_POLL_ATTEMPTS: u32 = 3 * 24 * 60 * 60 / DEFAULT_POLL_INTERVAL_SECS as u32;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Base URL of the remote analysis service
    #[serde(default = "default_service_url")]
    pub service_url: String,

    /// Listen address of the local HTTP glue (`serve`)
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    #[serde(default)]
    pub polling: PollingConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Replaces the built-in form dependency table when present
    #[serde(default)]
    pub form: Option<FormDependencyConfig>,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            service_url: default_service_url(),
            bind_address: default_bind_address(),
            polling: PollingConfig::default(),
            logging: LoggingConfig::default(),
            form: None,
        }
    }
}

/// Job polling settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_poll_interval")]
    pub interval_secs: u64,

    /// Status checks before the job is declared timed out
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Per-request timeout for calls to the service
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            max_attempts: DEFAULT_MAX_POLL_ATTEMPTS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

/// Static field/toggle dependency table
///
/// `dependencies` maps a gated field to its ordered gating toggles.
/// `exclusive_groups` lists toggle sets of which at most one may be on.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FormDependencyConfig {
    #[serde(default)]
    pub dependencies: BTreeMap<String, Vec<String>>,

    #[serde(default)]
    pub exclusive_groups: Vec<Vec<String>>,
}

impl FormDependencyConfig {
    /// The GLOOME analysis form
    pub fn gloome_default() -> Self {
        let deps = |ids: &[&str]| ids.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        let mut dependencies = BTreeMap::new();
        dependencies.insert("pi_1".to_string(), deps(&["is_optimize_pi", "is_optimize_pi_average"]));
        dependencies.insert("alpha".to_string(), deps(&["is_optimize_alpha"]));
        dependencies.insert("coefficient_bl".to_string(), deps(&["is_optimize_bl"]));
        dependencies.insert("e_mail".to_string(), deps(&["is_do_not_use_e_mail"]));

        Self {
            dependencies,
            exclusive_groups: vec![deps(&["is_optimize_pi", "is_optimize_pi_average"])],
        }
    }
}

fn default_service_url() -> String {
    DEFAULT_SERVICE_URL.to_string()
}

fn default_bind_address() -> String {
    DEFAULT_BIND_ADDRESS.to_string()
}

fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_POLL_ATTEMPTS
}

fn default_request_timeout() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_log_level() -> String {
    "info".to_string()
}

impl TomlConfig {
    /// Parse a config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    /// Locate and load the config file, falling back to defaults when none exists
    ///
    /// A file that exists but does not parse is an error.
    pub fn load_or_default(cli_path: Option<&Path>) -> Result<Self> {
        match resolve_config_path(cli_path) {
            Some(path) if path.exists() => {
                info!("Loading configuration from {}", path.display());
                Self::load(&path)
            }
            Some(path) => {
                warn!("Config file {} not found, using defaults", path.display());
                Ok(Self::default())
            }
            None => Ok(Self::default()),
        }
    }
}

/// Config file location: CLI, then `GLOOME_CONFIG`, then platform locations
pub fn resolve_config_path(cli_path: Option<&Path>) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_path {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: platform config directories, first one that exists
    default_config_locations().into_iter().find(|p| p.exists())
}

fn default_config_locations() -> Vec<PathBuf> {
    let mut locations = Vec::new();
    if let Some(dir) = dirs::config_dir() {
        locations.push(dir.join("gloome").join("config.toml"));
    }
    if cfg!(target_os = "linux") {
        locations.push(PathBuf::from("/etc/gloome/config.toml"));
    }
    locations
}

/// Service URL: CLI, then `GLOOME_SERVICE_URL`, then TOML (which carries the default)
pub fn resolve_service_url(cli_arg: Option<&str>, config: &TomlConfig) -> String {
    let url = cli_arg
        .map(str::to_string)
        .or_else(|| {
            std::env::var(SERVICE_URL_ENV_VAR)
                .ok()
                .filter(|v| !v.trim().is_empty())
        })
        .unwrap_or_else(|| config.service_url.clone());
    url.trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_max_attempts_covers_three_days() {
        assert_eq!(DEFAULT_MAX_POLL_ATTEMPTS, 25_920);
        let polling = PollingConfig::default();
        assert_eq!(polling.interval(), Duration::from_secs(10));
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: TomlConfig = toml::from_str(
            r#"
            service_url = "https://gloome.example.org"

            [polling]
            interval_secs = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.service_url, "https://gloome.example.org");
        assert_eq!(config.polling.interval_secs, 5);
        assert_eq!(config.polling.max_attempts, DEFAULT_MAX_POLL_ATTEMPTS);
        assert_eq!(config.logging.level, "info");
        assert!(config.form.is_none());
    }

    #[test]
    fn test_gloome_default_table() {
        let table = FormDependencyConfig::gloome_default();
        assert_eq!(table.dependencies["pi_1"], vec!["is_optimize_pi", "is_optimize_pi_average"]);
        assert_eq!(table.exclusive_groups.len(), 1);
    }
}
