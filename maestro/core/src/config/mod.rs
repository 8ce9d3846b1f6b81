//! TOML Configuration File Support
//!
//! Centralized configuration loading for the maestro daemon, from a TOML
//! file at `~/.config/maestro/maestro.toml`.
//!
//! # Configuration Priority
//!
//! Configuration values are loaded with the following priority (highest first):
//! 1. CLI arguments (applied by the caller with [`ConfigOverrides`])
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! [server]
//! bind_address = "127.0.0.1:8000"
//! max_connections = 64
//! max_message_size = 65536
//!
//! [limits]
//! max_prompt_chars = 512
//! max_tokens_ceiling = 100000
//!
//! [timeouts]
//! first_event_secs = 60
//! idle_gap_secs = 60
//! hard_limit_secs = 300
//!
//! [defaults]
//! model = "google/gemini-3-flash-preview"
//! provider = "openrouter"
//! max_tokens = 100000
//! temperature = 0.9
//!
//! [backends]
//! ollama_url = "http://localhost:11434"
//! openrouter_url = "https://openrouter.ai/api/v1"
//! openrouter_api_key = "sk-or-..."
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backend::{DEFAULT_OLLAMA_URL, DEFAULT_OPENROUTER_URL};
use crate::conductor::ConductorConfig;

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

/// Server section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerToml {
    /// Address to listen on
    pub bind_address: Option<String>,

    /// Maximum simultaneous connections
    pub max_connections: Option<usize>,

    /// Maximum inbound message size in bytes
    pub max_message_size: Option<usize>,
}

/// Limits section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsToml {
    /// Maximum prompt length in characters
    pub max_prompt_chars: Option<usize>,

    /// Upper bound for a request's token budget
    pub max_tokens_ceiling: Option<u32>,
}

/// Timeouts section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutsToml {
    /// Seconds allowed until the first fragment
    pub first_event_secs: Option<u64>,

    /// Seconds allowed between fragments
    pub idle_gap_secs: Option<u64>,

    /// Seconds allowed for a whole execution
    pub hard_limit_secs: Option<u64>,
}

/// Defaults section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultsToml {
    /// Model for requests that do not name one
    pub model: Option<String>,

    /// Provider for requests that do not name one
    pub provider: Option<String>,

    /// Token budget for requests that do not give one
    pub max_tokens: Option<u64>,

    /// Sampling temperature
    pub temperature: Option<f32>,
}

/// Backends section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendsToml {
    /// Ollama base URL
    pub ollama_url: Option<String>,

    /// OpenRouter (or compatible) API base URL
    pub openrouter_url: Option<String>,

    /// OpenRouter API key
    pub openrouter_api_key: Option<String>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MaestroToml {
    /// Server configuration section
    pub server: ServerToml,

    /// Input limits section
    pub limits: LimitsToml,

    /// Execution deadlines section
    pub timeouts: TimeoutsToml,

    /// Compose defaults section
    pub defaults: DefaultsToml,

    /// Generation backends section
    pub backends: BackendsToml,
}

// =============================================================================
// Main Configuration Struct
// =============================================================================

/// Listener settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerSettings {
    /// Address to listen on
    pub bind_address: String,
    /// Maximum simultaneous connections
    pub max_connections: usize,
    /// Maximum inbound message size in bytes
    pub max_message_size: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8000".to_string(),
            max_connections: 64,
            max_message_size: 64 * 1024, // 64KB
        }
    }
}

/// Where the generation backends live
#[derive(Clone, PartialEq, Eq)]
pub struct BackendSettings {
    /// Ollama base URL
    pub ollama_url: String,
    /// OpenRouter (or compatible) API base URL
    pub openrouter_url: String,
    /// OpenRouter API key
    pub openrouter_api_key: Option<String>,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            ollama_url: DEFAULT_OLLAMA_URL.to_string(),
            openrouter_url: DEFAULT_OPENROUTER_URL.to_string(),
            openrouter_api_key: None,
        }
    }
}

impl std::fmt::Debug for BackendSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendSettings")
            .field("ollama_url", &self.ollama_url)
            .field("openrouter_url", &self.openrouter_url)
            .field(
                "openrouter_api_key",
                &self.openrouter_api_key.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

/// Centralized configuration for the daemon
///
/// Use [`load_config`] to load configuration with proper priority handling.
#[derive(Clone, Debug, Default)]
pub struct MaestroConfig {
    /// Listener settings
    pub server: ServerSettings,

    /// Per-connection conductor settings
    pub conductor: ConductorConfig,

    /// Backend locations and credentials
    pub backends: BackendSettings,

    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,

    /// Source of configuration values
    source: ConfigSource,
}

impl Default for ConfigSource {
    fn default() -> Self {
        Self::Default
    }
}

impl MaestroConfig {
    /// Create a new configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the primary source of this configuration
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Check values that would make the daemon unusable
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] naming the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::ValidationError(msg.to_string()));

        if self.server.bind_address.trim().is_empty() {
            return invalid("server.bind_address must not be empty");
        }
        if self.server.max_connections == 0 {
            return invalid("server.max_connections must be greater than 0");
        }
        if self.server.max_message_size == 0 {
            return invalid("server.max_message_size must be greater than 0");
        }
        if self.conductor.limits.max_prompt_chars == 0 {
            return invalid("limits.max_prompt_chars must be greater than 0");
        }
        if self.conductor.limits.max_tokens_ceiling == 0 {
            return invalid("limits.max_tokens_ceiling must be greater than 0");
        }

        let timeouts = &self.conductor.timeouts;
        if timeouts.first_event.is_zero() || timeouts.idle_gap.is_zero() || timeouts.hard_limit.is_zero() {
            return invalid("timeouts must be greater than 0");
        }

        if !(0.0..=2.0).contains(&self.conductor.temperature) {
            return invalid("defaults.temperature must be between 0 and 2");
        }
        if self.conductor.default_model.trim().is_empty() {
            return invalid("defaults.model must not be empty");
        }

        Ok(())
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/maestro/maestro.toml` or
/// `~/.config/maestro/maestro.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("maestro").join("maestro.toml"))
}

/// Load configuration from the default path and the process environment
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed, or if
/// the merged configuration is invalid. A missing config file is not an
/// error (defaults are used).
pub fn load_config() -> Result<MaestroConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path and the process environment
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<MaestroConfig, ConfigError> {
    load_config_with(path, |key| std::env::var(key).ok())
}

/// Load configuration using `lookup` in place of the process environment
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed,
/// or if the merged configuration is invalid.
pub fn load_config_with(
    path: Option<PathBuf>,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<MaestroConfig, ConfigError> {
    // Start with defaults
    let mut config = MaestroConfig::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: MaestroToml = toml::from_str(&toml_content)?;
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

    // Environment overrides file values
    apply_env_config_from(&mut config, lookup);

    config.validate()?;
    Ok(config)
}

/// Apply TOML configuration values to the config struct
fn apply_toml_config(config: &mut MaestroConfig, toml: &MaestroToml) {
    // Server settings
    if let Some(ref bind) = toml.server.bind_address {
        config.server.bind_address.clone_from(bind);
    }
    if let Some(max) = toml.server.max_connections {
        config.server.max_connections = max;
    }
    if let Some(size) = toml.server.max_message_size {
        config.server.max_message_size = size;
    }

    // Limits
    if let Some(chars) = toml.limits.max_prompt_chars {
        config.conductor.limits.max_prompt_chars = chars;
    }
    if let Some(ceiling) = toml.limits.max_tokens_ceiling {
        config.conductor.limits.max_tokens_ceiling = ceiling;
    }

    // Timeouts
    if let Some(secs) = toml.timeouts.first_event_secs {
        config.conductor.timeouts.first_event = Duration::from_secs(secs);
    }
    if let Some(secs) = toml.timeouts.idle_gap_secs {
        config.conductor.timeouts.idle_gap = Duration::from_secs(secs);
    }
    if let Some(secs) = toml.timeouts.hard_limit_secs {
        config.conductor.timeouts.hard_limit = Duration::from_secs(secs);
    }

    // Compose defaults
    if let Some(ref model) = toml.defaults.model {
        config.conductor.default_model.clone_from(model);
    }
    if let Some(ref provider) = toml.defaults.provider {
        config.conductor.default_provider.clone_from(provider);
    }
    if let Some(tokens) = toml.defaults.max_tokens {
        config.conductor.default_max_tokens = tokens;
    }
    if let Some(temperature) = toml.defaults.temperature {
        config.conductor.temperature = temperature;
    }

    // Backends
    if let Some(ref url) = toml.backends.ollama_url {
        config.backends.ollama_url.clone_from(url);
    }
    if let Some(ref url) = toml.backends.openrouter_url {
        config.backends.openrouter_url.clone_from(url);
    }
    if toml.backends.openrouter_api_key.is_some() {
        config
            .backends
            .openrouter_api_key
            .clone_from(&toml.backends.openrouter_api_key);
    }
}

/// Apply environment overrides read through `lookup`
pub fn apply_env_config_from(config: &mut MaestroConfig, lookup: impl Fn(&str) -> Option<String>) {
    let mut touched = false;
    let mut parsed = |key: &str| -> Option<String> {
        let value = lookup(key)?;
        touched = true;
        Some(value)
    };

    // Server settings
    if let Some(bind) = parsed("MAESTRO_BIND") {
        config.server.bind_address = bind;
    }
    if let Some(n) = parsed("MAESTRO_MAX_CONNECTIONS").and_then(|v| v.parse().ok()) {
        config.server.max_connections = n;
    }
    if let Some(n) = parsed("MAESTRO_MAX_MESSAGE_SIZE").and_then(|v| v.parse().ok()) {
        config.server.max_message_size = n;
    }

    // Limits
    if let Some(n) = parsed("MAESTRO_MAX_PROMPT_CHARS").and_then(|v| v.parse().ok()) {
        config.conductor.limits.max_prompt_chars = n;
    }

    // Timeouts (seconds)
    if let Some(secs) = parsed("MAESTRO_FIRST_EVENT_TIMEOUT").and_then(|v| v.parse().ok()) {
        config.conductor.timeouts.first_event = Duration::from_secs(secs);
    }
    if let Some(secs) = parsed("MAESTRO_IDLE_TIMEOUT").and_then(|v| v.parse().ok()) {
        config.conductor.timeouts.idle_gap = Duration::from_secs(secs);
    }
    if let Some(secs) = parsed("MAESTRO_HARD_TIMEOUT").and_then(|v| v.parse().ok()) {
        config.conductor.timeouts.hard_limit = Duration::from_secs(secs);
    }

    // Compose defaults
    if let Some(model) = parsed("MAESTRO_DEFAULT_MODEL") {
        config.conductor.default_model = model;
    }
    if let Some(provider) = parsed("MAESTRO_DEFAULT_PROVIDER") {
        config.conductor.default_provider = provider;
    }
    if let Some(n) = parsed("MAESTRO_MAX_TOKENS").and_then(|v| v.parse().ok()) {
        config.conductor.default_max_tokens = n;
    }

    // Backends
    if let Some(url) = parsed("OLLAMA_URL") {
        config.backends.ollama_url = url;
    }
    if let Some(url) = parsed("MAESTRO_OPENROUTER_URL") {
        config.backends.openrouter_url = url;
    }
    if let Some(key) = parsed("OPENROUTER_API_KEY").filter(|k| !k.is_empty()) {
        config.backends.openrouter_api_key = Some(key);
    }

    if touched {
        config.source = ConfigSource::Env;
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
    /// Bind address override
    pub bind_address: Option<String>,

    /// Maximum connections override
    pub max_connections: Option<usize>,

    /// Default model override
    pub default_model: Option<String>,

    /// Default provider override
    pub default_provider: Option<String>,
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set bind address override
    #[must_use]
    pub fn with_bind_address(mut self, bind: String) -> Self {
        self.bind_address = Some(bind);
        self
    }

    /// Set maximum connections override
    #[must_use]
    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = Some(max);
        self
    }

    /// Set default model override
    #[must_use]
    pub fn with_default_model(mut self, model: String) -> Self {
        self.default_model = Some(model);
        self
    }

    /// Set default provider override
    #[must_use]
    pub fn with_default_provider(mut self, provider: String) -> Self {
        self.default_provider = Some(provider);
        self
    }

    /// Apply overrides to a configuration
    pub fn apply(&self, config: &mut MaestroConfig) {
        if self.bind_address.is_some()
            || self.max_connections.is_some()
            || self.default_model.is_some()
            || self.default_provider.is_some()
        {
            config.source = ConfigSource::Cli;
        }

        if let Some(ref bind) = self.bind_address {
            config.server.bind_address.clone_from(bind);
        }
        if let Some(max) = self.max_connections {
            config.server.max_connections = max;
        }
        if let Some(ref model) = self.default_model {
            config.conductor.default_model.clone_from(model);
        }
        if let Some(ref provider) = self.default_provider {
            config.conductor.default_provider.clone_from(provider);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
