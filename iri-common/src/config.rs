//! Configuration loading and config file resolution
//!
//! Config file resolution follows this priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. Platform config directory (`<config_dir>/iri-profile/config.toml`)
//! 4. Compiled defaults (fallback)
//!
//! A missing config file is never fatal: a warning is logged and compiled
//! defaults are used. A config file that exists but cannot be parsed is a
//! [`Error::Config`].

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "IRI_PROFILE_CONFIG";

/// Directory name under the platform config directory
const APP_DIR: &str = "iri-profile";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct TomlConfig {
    /// Remote service and automation endpoint
    #[serde(default)]
    pub service: ServiceConfig,

    /// Retrieval defaults (model version, altitude grid, retries)
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Remote model service settings
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ServiceConfig {
    /// Instant-run form URL of the remote model
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// W3C WebDriver endpoint (chromedriver or compatible)
    #[serde(default = "default_webdriver_url")]
    pub webdriver_url: String,

    /// Browser command-line arguments passed to the automation session
    #[serde(default = "default_browser_args")]
    pub browser_args: Vec<String>,
}

/// Retrieval defaults
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct RetrievalConfig {
    #[serde(default = "default_model_version")]
    pub model_version: String,

    /// Base per-attempt timeout in seconds (doubled for each attempt)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default)]
    pub min_alt_km: f64,

    #[serde(default = "default_max_alt_km")]
    pub max_alt_km: f64,

    #[serde(default = "default_step_alt_km")]
    pub step_alt_km: f64,

    /// Scratch destination reused across a series run
    #[serde(default = "default_scratch_file")]
    pub scratch_file: PathBuf,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_base_url() -> String {
    "https://kauai.ccmc.gsfc.nasa.gov/instantrun/iri/".to_string()
}

fn default_webdriver_url() -> String {
    "http://localhost:9515".to_string()
}

fn default_browser_args() -> Vec<String> {
    [
        "--headless=new",
        "--no-sandbox",
        "--disable-gpu",
        "--window-size=1920,1080",
        "user-agent=Mozilla/5.0",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_model_version() -> String {
    "IRI 2020".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_max_alt_km() -> f64 {
    2000.0
}

fn default_step_alt_km() -> f64 {
    50.0
}

fn default_scratch_file() -> PathBuf {
    PathBuf::from(".temporal_iri_profile_output.txt")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            webdriver_url: default_webdriver_url(),
            browser_args: default_browser_args(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            model_version: default_model_version(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            min_alt_km: 0.0,
            max_alt_km: default_max_alt_km(),
            step_alt_km: default_step_alt_km(),
            scratch_file: default_scratch_file(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Locate the config file following the priority order in the module docs.
///
/// Returns `None` when no candidate exists, in which case compiled defaults apply.
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: platform config directory
    let user_config = dirs::config_dir().map(|d| d.join(APP_DIR).join("config.toml"))?;
    if user_config.exists() {
        Some(user_config)
    } else {
        None
    }
}

/// Load configuration, falling back to compiled defaults when no file is available.
pub fn load_config(cli_arg: Option<&Path>) -> Result<TomlConfig> {
    let Some(path) = resolve_config_path(cli_arg) else {
        info!("No config file found, using compiled defaults");
        return Ok(TomlConfig::default());
    };

    match std::fs::read_to_string(&path) {
        Ok(content) => {
            let config = parse_config(&content)
                .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
            info!("Loaded config from {}", path.display());
            Ok(config)
        }
        Err(e) => {
            warn!(
                "Config file {} unreadable ({}), using compiled defaults",
                path.display(),
                e
            );
            Ok(TomlConfig::default())
        }
    }
}

/// Parse TOML text into a [`TomlConfig`]
pub fn parse_config(content: &str) -> Result<TomlConfig> {
    toml::from_str(content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
}
