//! Configuration system for flowsift
//!
//! Provides:
//! - Config file discovery (CLI flag, env var, standard path)
//! - TOML parsing with serde
//! - Environment variable overrides
//! - Validation

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Complete flowsift configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowsiftConfig {
    /// Logging settings
    pub log: LogSettings,

    /// Classification rules
    pub filter: FilterSettings,

    /// Payload handling
    pub payload: PayloadSettings,

    /// Output stream settings
    pub output: OutputSettings,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

/// Classification rules
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSettings {
    /// Host whose WebSocket sessions are projected
    pub gateway_host: String,

    /// Host whose HTTP exchanges are projected
    pub api_host: String,

    /// Request paths starting with any of these are dropped
    pub excluded_path_prefixes: Vec<String>,

    /// Only responses with exactly this content type are kept
    pub content_type: String,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            gateway_host: "gateway.discord.gg".to_string(),
            api_host: "discord.com".to_string(),
            excluded_path_prefixes: vec![
                "/assets/".to_string(),
                "/cdn-cgi/".to_string(),
                "/login".to_string(),
                "/api/v9/science".to_string(),
            ],
            content_type: "application/json".to_string(),
        }
    }
}

/// What to do when a payload that should be JSON isn't
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MalformedPolicy {
    /// Stop the run with an error
    #[default]
    Abort,
    /// Drop the offending event and keep going
    Skip,
}

impl FromStr for MalformedPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "abort" => Ok(MalformedPolicy::Abort),
            "skip" => Ok(MalformedPolicy::Skip),
            other => Err(ConfigError::ValidationError(format!(
                "Invalid malformed payload policy: {}. Must be one of: [\"abort\", \"skip\"]",
                other
            ))),
        }
    }
}

/// Payload handling settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PayloadSettings {
    pub on_malformed: MalformedPolicy,
}

/// Output stream settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    /// Flush after each line
    pub flush_each: bool,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self { flush_each: true }
    }
}

/// Configuration loader
pub struct ConfigLoader {
    /// Path to config file (if specified via CLI)
    cli_path: Option<PathBuf>,
}

impl ConfigLoader {
    /// Create a new config loader
    pub fn new() -> Self {
        Self { cli_path: None }
    }

    /// Set the config path from CLI argument
    pub fn with_cli_path(mut self, path: Option<PathBuf>) -> Self {
        self.cli_path = path;
        self
    }

    /// Load configuration with the following precedence:
    /// 1. CLI --config flag
    /// 2. FLOWSIFT_CONFIG environment variable
    /// 3. ~/.config/flowsift/config.toml
    /// 4. Default values
    pub fn load(&self) -> ConfigResult<FlowsiftConfig> {
        let mut config = match self.find_config_file() {
            Some(path) => {
                info!("Loading configuration from: {}", path.display());
                Self::load_from_file(&path)?
            }
            None => {
                debug!("No config file found, using defaults");
                FlowsiftConfig::default()
            }
        };

        Self::apply_env_overrides(&mut config)?;
        Self::validate(&config)?;

        Ok(config)
    }

    /// Find the config file to use
    fn find_config_file(&self) -> Option<PathBuf> {
        if let Some(path) = &self.cli_path {
            if path.exists() {
                return Some(path.clone());
            }
            warn!("CLI config path does not exist: {}", path.display());
        }

        if let Ok(env_path) = std::env::var("FLOWSIFT_CONFIG") {
            let path = PathBuf::from(&env_path);
            if path.exists() {
                return Some(path);
            }
            warn!("FLOWSIFT_CONFIG path does not exist: {}", env_path);
        }

        Self::default_config_path().filter(|path| path.exists())
    }

    /// Load configuration from a TOML file
    pub fn load_from_file(path: &Path) -> ConfigResult<FlowsiftConfig> {
        let content = std::fs::read_to_string(path)?;
        let config: FlowsiftConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(config: &mut FlowsiftConfig) -> ConfigResult<()> {
        if let Ok(val) = std::env::var("FLOWSIFT_LOG_LEVEL") {
            config.log.level = val;
        }
        if let Ok(val) = std::env::var("FLOWSIFT_ON_MALFORMED") {
            config.payload.on_malformed = val.parse()?;
        }
        Ok(())
    }

    /// Validate configuration
    pub fn validate(config: &FlowsiftConfig) -> ConfigResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&config.log.level.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid log level: {}. Must be one of: {:?}",
                config.log.level, valid_levels
            )));
        }

        if config.filter.gateway_host.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "filter.gateway_host cannot be empty".to_string(),
            ));
        }
        if config.filter.api_host.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "filter.api_host cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Get the default config file path for the current platform
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("flowsift").join("config.toml"))
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Helper module for platform-specific directories
mod dirs {
    use std::path::PathBuf;

    /// Get the user's config directory
    pub fn config_dir() -> Option<PathBuf> {
        #[cfg(target_os = "windows")]
        {
            std::env::var("APPDATA").ok().map(PathBuf::from)
        }

        #[cfg(not(target_os = "windows"))]
        {
            std::env::var("XDG_CONFIG_HOME")
                .ok()
                .map(PathBuf::from)
                .or_else(|| {
                    std::env::var("HOME")
                        .ok()
                        .map(|h| PathBuf::from(h).join(".config"))
                })
        }
    }
}
