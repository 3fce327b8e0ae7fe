//! Configuration loading, validation, and management for MiniLuma.
//!
//! Loads configuration from `~/.miniluma/config.toml` with environment
//! variable overrides. Validates all settings at startup.
//!
//! API keys are resolved per provider: `{PROVIDER}_API_KEY` (for example
//! `OPENAI_API_KEY` or `SILICON_FLOW_API_KEY`) wins over the file.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.miniluma/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Provider used when a request does not name one
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Per-provider settings, keyed by provider name
    #[serde(default = "default_providers")]
    pub providers: BTreeMap<String, ProviderConfig>,

    /// Reactor and session behavior
    #[serde(default)]
    pub agent: AgentConfig,

    /// Built-in tool settings
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Memory store settings
    #[serde(default)]
    pub memory: MemoryConfig,

    /// HTTP API settings
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Generated file storage
    #[serde(default)]
    pub files: FilesConfig,

    /// Log output settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_provider() -> String {
    "openai".into()
}

fn default_providers() -> BTreeMap<String, ProviderConfig> {
    let mut providers = BTreeMap::new();
    providers.insert(
        "openai".into(),
        ProviderConfig::new("gpt-4", 0.7, None),
    );
    providers.insert(
        "deepseek".into(),
        ProviderConfig::new("deepseek-chat", 0.0, Some("https://api.deepseek.com/v1")),
    );
    providers.insert(
        "silicon_flow".into(),
        ProviderConfig::new("sf-plus", 0.7, Some("https://api.siliconflow.cn/v1")),
    );
    providers.insert(
        "anthropic".into(),
        ProviderConfig::new("claude-3-5-sonnet-latest", 0.7, Some("https://api.anthropic.com/v1")),
    );
    providers
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("default_provider", &self.default_provider)
            .field("providers", &self.providers)
            .field("agent", &self.agent)
            .field("tools", &self.tools)
            .field("memory", &self.memory)
            .field("gateway", &self.gateway)
            .field("files", &self.files)
            .field("logging", &self.logging)
            .finish()
    }
}

/// Settings for a single LLM provider.
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL of the API; `None` uses the vendor default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_model() -> String {
    "gpt-4".into()
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_temperature() -> f32 {
    0.7
}

impl ProviderConfig {
    pub fn new(model: &str, temperature: f32, base_url: Option<&str>) -> Self {
        Self {
            api_key: None,
            base_url: base_url.map(String::from),
            model: model.into(),
            max_tokens: default_max_tokens(),
            temperature,
        }
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_agent_name")]
    pub name: String,

    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Upper bound on reason-act-observe iterations per turn
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Number of recalled memories injected into the prompt
    #[serde(default = "default_memory_limit")]
    pub memory_limit: usize,

    /// Conversation messages kept as context for the model
    #[serde(default = "default_max_history")]
    pub max_history: usize,

    /// Token cap for each reasoning call
    #[serde(default = "default_reasoning_max_tokens")]
    pub reasoning_max_tokens: u32,

    /// Save fenced code blocks from responses into the results directory
    #[serde(default = "default_true")]
    pub auto_save_files: bool,

    #[serde(default = "default_auto_save_interval")]
    pub auto_save_interval_secs: u64,
}

fn default_agent_name() -> String {
    "MiniLuma".into()
}
fn default_system_prompt() -> String {
    "You are a helpful assistant that helps users solve problems.".into()
}
fn default_max_iterations() -> usize {
    10
}
fn default_memory_limit() -> usize {
    10
}
fn default_max_history() -> usize {
    10
}
fn default_reasoning_max_tokens() -> u32 {
    1024
}
fn default_auto_save_interval() -> u64 {
    300
}
fn default_true() -> bool {
    true
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            system_prompt: default_system_prompt(),
            max_iterations: default_max_iterations(),
            memory_limit: default_memory_limit(),
            max_history: default_max_history(),
            reasoning_max_tokens: default_reasoning_max_tokens(),
            auto_save_files: true,
            auto_save_interval_secs: default_auto_save_interval(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Names of tools to register; empty means all built-ins
    #[serde(default)]
    pub enabled: Vec<String>,

    /// Root that relative file paths resolve against
    #[serde(default = "default_workspace_dir")]
    pub workspace_dir: String,

    /// Extra directories file tools may touch (the workspace is always allowed)
    #[serde(default)]
    pub allowed_roots: Vec<String>,

    #[serde(default = "default_forbidden_paths")]
    pub forbidden_paths: Vec<String>,

    #[serde(default = "default_python_command")]
    pub python_command: String,

    #[serde(default = "default_execution_timeout")]
    pub execution_timeout_secs: u64,

    /// JSON search endpoint; `None` uses offline results
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_endpoint: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_api_key: Option<String>,

    #[serde(default = "default_fetch_max_bytes")]
    pub fetch_max_bytes: usize,
}

fn default_workspace_dir() -> String {
    ".".into()
}
fn default_forbidden_paths() -> Vec<String> {
    vec![
        "/etc".into(),
        "/proc".into(),
        "/sys".into(),
        "~/.ssh".into(),
        "~/.gnupg".into(),
        "~/.aws".into(),
    ]
}
fn default_python_command() -> String {
    "python3".into()
}
fn default_execution_timeout() -> u64 {
    30
}
fn default_fetch_max_bytes() -> usize {
    100_000
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            enabled: Vec::new(),
            workspace_dir: default_workspace_dir(),
            allowed_roots: Vec::new(),
            forbidden_paths: default_forbidden_paths(),
            python_command: default_python_command(),
            execution_timeout_secs: default_execution_timeout(),
            search_endpoint: None,
            search_api_key: None,
            fetch_max_bytes: default_fetch_max_bytes(),
        }
    }
}

impl std::fmt::Debug for ToolsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolsConfig")
            .field("enabled", &self.enabled)
            .field("workspace_dir", &self.workspace_dir)
            .field("allowed_roots", &self.allowed_roots)
            .field("forbidden_paths", &self.forbidden_paths)
            .field("python_command", &self.python_command)
            .field("execution_timeout_secs", &self.execution_timeout_secs)
            .field("search_endpoint", &self.search_endpoint)
            .field("search_api_key", &redact(&self.search_api_key))
            .field("fetch_max_bytes", &self.fetch_max_bytes)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// "sqlite" or "in_memory"
    #[serde(default = "default_memory_backend")]
    pub backend: String,

    /// SQLite database path; `None` uses `~/.miniluma/memory.db`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Cap on entries kept by the in-memory backend and the action log
    #[serde(default = "default_max_items")]
    pub max_items: usize,
}

fn default_memory_backend() -> String {
    "sqlite".into()
}
fn default_max_items() -> usize {
    100
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            backend: default_memory_backend(),
            path: None,
            max_items: default_max_items(),
        }
    }
}

impl MemoryConfig {
    /// Resolved database path.
    pub fn db_path(&self) -> PathBuf {
        self.path
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| AppConfig::config_dir().join("memory.db"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Allow cross-origin requests from any origin
    #[serde(default = "default_true")]
    pub cors_allow_any: bool,
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    8000
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_allow_any: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilesConfig {
    /// Where generated files and saved conversations are archived
    #[serde(default = "default_results_dir")]
    pub results_dir: String,
}

fn default_results_dir() -> String {
    "results".into()
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            results_dir: default_results_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON log lines instead of human-readable output
    #[serde(default)]
    pub json: bool,

    /// Directory for per-conversation transcripts
    #[serde(default = "default_conversation_log_dir")]
    pub conversation_log_dir: String,
}

fn default_log_level() -> String {
    "info".into()
}
fn default_conversation_log_dir() -> String {
    "logs".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            conversation_log_dir: default_conversation_log_dir(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.miniluma/config.toml),
    /// then apply environment overrides and validate.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        Self::load_from(&config_path)
    }

    /// Load configuration from a specific file path.
    ///
    /// A missing file yields defaults. Environment overrides are applied
    /// before validation.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
            Self::from_toml_str(&content).map_err(|reason| ConfigError::ParseError {
                path: path.to_path_buf(),
                reason,
            })?
        } else {
            tracing::info!("No config file found at {}, using defaults", path.display());
            Self::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document. Built-in providers missing from the file are
    /// filled in with their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self, String> {
        let mut config: Self = toml::from_str(content).map_err(|e| e.to_string())?;
        for (name, provider) in default_providers() {
            config.providers.entry(name).or_insert(provider);
        }
        Ok(config)
    }

    /// Apply overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary lookup (the environment in production).
    ///
    /// - `{PROVIDER}_API_KEY` sets that provider's key
    /// - `MINILUMA_PROVIDER` sets the default provider
    /// - `MINILUMA_PORT` sets the gateway port
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        for (name, provider) in self.providers.iter_mut() {
            let var = format!("{}_API_KEY", name.to_uppercase().replace('-', "_"));
            if let Some(key) = lookup(&var).filter(|k| !k.trim().is_empty()) {
                provider.api_key = Some(key);
            }
        }

        if let Some(provider) = lookup("MINILUMA_PROVIDER").filter(|p| !p.is_empty()) {
            self.default_provider = provider;
        }

        if let Some(port) = lookup("MINILUMA_PORT") {
            match port.parse::<u16>() {
                Ok(p) => self.gateway.port = p,
                Err(_) => tracing::warn!(value = %port, "Ignoring invalid MINILUMA_PORT"),
            }
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".miniluma")
    }

    /// Settings for a named provider.
    pub fn provider(&self, name: &str) -> Option<&ProviderConfig> {
        self.providers.get(name)
    }

    /// Settings for the default provider.
    pub fn default_provider_config(&self) -> Option<&ProviderConfig> {
        self.provider(&self.default_provider)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.providers.contains_key(&self.default_provider) {
            return Err(ConfigError::ValidationError(format!(
                "default_provider '{}' has no [providers.{}] section",
                self.default_provider, self.default_provider
            )));
        }

        for (name, provider) in &self.providers {
            if !(0.0..=2.0).contains(&provider.temperature) {
                return Err(ConfigError::ValidationError(format!(
                    "providers.{name}.temperature must be between 0.0 and 2.0"
                )));
            }
        }

        if self.agent.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_iterations must be at least 1".into(),
            ));
        }

        if self.agent.auto_save_interval_secs < 10 {
            return Err(ConfigError::ValidationError(
                "agent.auto_save_interval_secs must be at least 10".into(),
            ));
        }

        if self.gateway.port == 0 {
            return Err(ConfigError::ValidationError(
                "gateway.port must be nonzero".into(),
            ));
        }

        Ok(())
    }

    /// Generate a default config TOML string (for `config --init`).
    pub fn default_toml() -> String {
        let body = toml::to_string_pretty(&Self::default()).unwrap_or_default();
        format!(
            "# MiniLuma configuration\n\
             #\n\
             # API keys may also be supplied as environment variables named\n\
             # after the provider, e.g. OPENAI_API_KEY or DEEPSEEK_API_KEY.\n\
             # A provider without a key falls back to the offline mock.\n\n{body}"
        )
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_provider: default_provider(),
            providers: default_providers(),
            agent: AgentConfig::default(),
            tools: ToolsConfig::default(),
            memory: MemoryConfig::default(),
            gateway: GatewayConfig::default(),
            files: FilesConfig::default(),
            logging: LoggingConfig::default(),
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
