//! Configuration loading, validation, and management for RelayClaw.
//!
//! Loads configuration from `~/.relayclaw/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.relayclaw/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Completion API key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Completion model
    #[serde(default = "default_model")]
    pub model: String,

    /// Sampling temperature — fixed low for deterministic tool use
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Output-size budget per sampling call
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,

    /// Override the built-in system prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt_override: Option<String>,

    /// Loop controller settings
    #[serde(default)]
    pub agent: AgentConfig,

    /// Output channel settings
    #[serde(default)]
    pub channel: ChannelConfig,

    /// Gateway HTTP server settings
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Tool provider configurations, in priority order (first wins on
    /// duplicate tool names)
    #[serde(default)]
    pub providers: Vec<ToolProviderConfig>,
}

fn default_model() -> String {
    "gemini-2.5-flash-lite".into()
}
fn default_temperature() -> f32 {
    0.4
}
fn default_max_output_tokens() -> u32 {
    8192
}

fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_output_tokens", &self.max_output_tokens)
            .field("agent", &self.agent)
            .field("channel", &self.channel)
            .field("gateway", &self.gateway)
            .field("providers", &self.providers)
            .finish()
    }
}

/// Loop controller settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Hard bound on sampling calls per user turn
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Timeout for one sampling call
    #[serde(default = "default_sampling_timeout")]
    pub sampling_timeout_secs: u64,

    /// Timeout for one tool invocation
    #[serde(default = "default_tool_timeout")]
    pub tool_timeout_secs: u64,

    /// Timeout for provider startup + handshake
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_max_iterations() -> u32 {
    5
}
fn default_sampling_timeout() -> u64 {
    90
}
fn default_tool_timeout() -> u64 {
    60
}
fn default_connect_timeout() -> u64 {
    30
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            sampling_timeout_secs: default_sampling_timeout(),
            tool_timeout_secs: default_tool_timeout(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

/// Output channel settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Maximum characters per outbound message (WhatsApp-friendly default)
    #[serde(default = "default_max_message_length")]
    pub max_message_length: usize,

    /// How many messages of history to retain per user
    #[serde(default = "default_history_window")]
    pub history_window: usize,
}

fn default_max_message_length() -> usize {
    1500
}
fn default_history_window() -> usize {
    20
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            max_message_length: default_max_message_length(),
            history_window: default_history_window(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,
}

fn default_port() -> u16 {
    5000
}
fn default_host() -> String {
    "127.0.0.1".into()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
        }
    }
}

/// Launch parameters for one subprocess tool provider.
#[derive(Clone, Serialize, Deserialize)]
pub struct ToolProviderConfig {
    /// Unique provider identifier (e.g., "github", "deploy")
    pub id: String,

    /// Launch command (e.g., "npx")
    pub command: String,

    /// Command arguments
    #[serde(default)]
    pub args: Vec<String>,

    /// Static environment passed to the subprocess
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Environment variable name the per-user credential is injected as
    /// (e.g., "GITHUB_PERSONAL_ACCESS_TOKEN")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_env: Option<String>,

    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

impl std::fmt::Debug for ToolProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // env may carry credentials — show keys only
        f.debug_struct("ToolProviderConfig")
            .field("id", &self.id)
            .field("command", &self.command)
            .field("args", &self.args)
            .field("env_keys", &self.env.keys().collect::<Vec<_>>())
            .field("credential_env", &self.credential_env)
            .field("enabled", &self.enabled)
            .finish()
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.relayclaw/config.toml).
    ///
    /// Also checks environment variables:
    /// - `GEMINI_API_KEY` — completion API key
    /// - `RELAYCLAW_MODEL` — model override
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;

        if config.api_key.is_none() {
            config.api_key = std::env::var("GEMINI_API_KEY").ok();
        }

        if let Ok(model) = std::env::var("RELAYCLAW_MODEL") {
            config.model = model;
        }

        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".relayclaw")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.temperature < 0.0 || self.temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.agent.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_iterations must be at least 1".into(),
            ));
        }

        if self.channel.max_message_length < 16 {
            return Err(ConfigError::ValidationError(
                "channel.max_message_length must be at least 16".into(),
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for p in &self.providers {
            if !seen.insert(p.id.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate provider id: {}",
                    p.id
                )));
            }
            if p.command.is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "provider {} has an empty launch command",
                    p.id
                )));
            }
        }

        Ok(())
    }

    /// Enabled providers in declared (priority) order.
    pub fn enabled_providers(&self) -> impl Iterator<Item = &ToolProviderConfig> {
        self.providers.iter().filter(|p| p.enabled)
    }

    /// Check if a completion API key is available.
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_model(),
            temperature: default_temperature(),
            max_output_tokens: default_max_output_tokens(),
            system_prompt_override: None,
            agent: AgentConfig::default(),
            channel: ChannelConfig::default(),
            gateway: GatewayConfig::default(),
            providers: vec![],
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
