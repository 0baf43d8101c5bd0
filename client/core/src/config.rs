//! TOML Configuration File Support
//!
//! Client configuration lives at `~/.config/ai-insights/client.toml`.
//!
//! # Configuration Priority
//!
//! Values are loaded with the following priority (highest first):
//! 1. CLI arguments (applied by the caller through [`ConfigOverrides`])
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! [api]
//! base_url = "http://localhost:8000"
//! timeout_secs = 120
//! connect_timeout_secs = 10
//!
//! [chat]
//! default_model = "gpt-3.5-turbo"
//! cancel_marker = " [cancelled]"
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::session::DEFAULT_CANCEL_MARKER;

/// API base URL when nothing else is configured
pub const DEFAULT_API_URL: &str = "http://localhost:8000";

/// Model requested when the caller does not pick one
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

/// Environment variable overriding the API base URL
pub const ENV_API_URL: &str = "AI_INSIGHTS_API_URL";
/// Environment variable overriding the default model
pub const ENV_MODEL: &str = "AI_INSIGHTS_MODEL";
/// Environment variable overriding the request timeout (seconds)
pub const ENV_TIMEOUT_SECS: &str = "AI_INSIGHTS_TIMEOUT_SECS";

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Tracks where a configuration value came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// API section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiToml {
    /// Base URL of the AI Insights backend
    pub base_url: Option<String>,

    /// Whole-request timeout in seconds (streams included)
    pub timeout_secs: Option<u64>,

    /// Connection timeout in seconds
    pub connect_timeout_secs: Option<u64>,
}

/// Chat section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatToml {
    /// Model requested for chat
    pub default_model: Option<String>,

    /// Text appended to a cancelled answer
    pub cancel_marker: Option<String>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientToml {
    /// API configuration section
    pub api: ApiToml,

    /// Chat configuration section
    pub chat: ChatToml,
}

// =============================================================================
// Main Configuration Struct
// =============================================================================

/// Resolved client configuration
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Base URL of the backend, without trailing slash
    pub base_url: String,

    /// Whole-request timeout
    pub timeout: Duration,

    /// Connection timeout
    pub connect_timeout: Duration,

    /// Model requested for chat
    pub default_model: String,

    /// Text appended to a cancelled answer
    pub cancel_marker: String,

    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,

    /// Where `base_url` came from
    base_url_source: ConfigSource,

    /// Primary source of this configuration
    source: ConfigSource,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.to_string(),
            timeout: Duration::from_secs(120),
            connect_timeout: Duration::from_secs(10),
            default_model: DEFAULT_MODEL.to_string(),
            cancel_marker: DEFAULT_CANCEL_MARKER.to_string(),
            config_file_path: None,
            base_url_source: ConfigSource::Default,
            source: ConfigSource::Default,
        }
    }
}

impl ClientConfig {
    /// Create a new configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration pointing at a specific backend, everything else default
    #[must_use]
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let mut config = Self::default();
        config.set_base_url(base_url.into(), ConfigSource::Cli);
        config
    }

    /// Get the primary source of this configuration
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Where the base URL came from
    #[must_use]
    pub fn base_url_source(&self) -> ConfigSource {
        self.base_url_source
    }

    fn set_base_url(&mut self, url: String, source: ConfigSource) {
        self.base_url = url.trim_end_matches('/').to_string();
        self.base_url_source = source;
    }

    /// Check that the resolved values are usable
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] describing the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(ConfigError::ValidationError(format!(
                "base_url must be an http(s) URL, got '{}' (from {})",
                self.base_url, self.base_url_source
            )));
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.connect_timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "connect_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.default_model.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "default_model must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/ai-insights/client.toml` or
/// `~/.config/ai-insights/client.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("ai-insights").join("client.toml"))
}

/// Load configuration from the default path, then the environment
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed, or if the
/// resulting configuration is invalid. A missing config file is not an error.
pub fn load_config() -> Result<ClientConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path, then the environment
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed,
/// or if the resulting configuration is invalid.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<ClientConfig, ConfigError> {
    load_config_with_env(path, |name| std::env::var(name).ok())
}

/// Load configuration using `lookup` in place of the process environment
///
/// # Errors
///
/// Same as [`load_config_from_path`].
pub fn load_config_with_env<F>(
    path: Option<PathBuf>,
    lookup: F,
) -> Result<ClientConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = ClientConfig::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: ClientToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, &toml_config);
            config.config_file_path = Some(config_path.clone());
            config.source = ConfigSource::File;

            tracing::info!(
                path = %config_path.display(),
                "Loaded configuration from file"
            );
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    apply_env_config(&mut config, lookup);

    config.validate()?;
    Ok(config)
}

/// Apply TOML configuration values to the config struct
fn apply_toml_config(config: &mut ClientConfig, toml: &ClientToml) {
    if let Some(ref url) = toml.api.base_url {
        config.set_base_url(url.clone(), ConfigSource::File);
    }
    if let Some(secs) = toml.api.timeout_secs {
        config.timeout = Duration::from_secs(secs);
    }
    if let Some(secs) = toml.api.connect_timeout_secs {
        config.connect_timeout = Duration::from_secs(secs);
    }

    if let Some(ref model) = toml.chat.default_model {
        config.default_model = model.clone();
    }
    if let Some(ref marker) = toml.chat.cancel_marker {
        config.cancel_marker = marker.clone();
    }
}

/// Apply environment variable overrides to the config
fn apply_env_config<F>(config: &mut ClientConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(url) = lookup(ENV_API_URL).filter(|u| !u.trim().is_empty()) {
        config.set_base_url(url, ConfigSource::Env);
        config.source = ConfigSource::Env;
    }
    if let Some(model) = lookup(ENV_MODEL).filter(|m| !m.trim().is_empty()) {
        config.default_model = model;
        config.source = ConfigSource::Env;
    }
    if let Some(timeout) = lookup(ENV_TIMEOUT_SECS) {
        match timeout.parse::<u64>() {
            Ok(secs) => {
                config.timeout = Duration::from_secs(secs);
                config.source = ConfigSource::Env;
            }
            Err(_) => {
                tracing::warn!(
                    var = ENV_TIMEOUT_SECS,
                    value = %timeout,
                    "Ignoring non-numeric timeout"
                );
            }
        }
    }
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Builder for applying CLI overrides to configuration
///
/// Use this after [`load_config`] to apply command-line argument overrides.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// API base URL override
    pub base_url: Option<String>,

    /// Default model override
    pub default_model: Option<String>,
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set API base URL override
    #[must_use]
    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = Some(url);
        self
    }

    /// Set default model override
    #[must_use]
    pub fn with_default_model(mut self, model: String) -> Self {
        self.default_model = Some(model);
        self
    }

    /// Apply overrides to a configuration
    pub fn apply(&self, config: &mut ClientConfig) {
        if self.base_url.is_some() || self.default_model.is_some() {
            config.source = ConfigSource::Cli;
        }

        if let Some(ref url) = self.base_url {
            config.set_base_url(url.clone(), ConfigSource::Cli);
        }

        if let Some(ref model) = self.default_model {
            config.default_model = model.clone();
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
