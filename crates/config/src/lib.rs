//! Configuration loading, validation, and management for Ichika.
//!
//! Loads configuration from `~/.ichika/config.toml` (or an explicit path)
//! with environment variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.ichika/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the default provider (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Default model backend ("gemini", "openai", "deepseek", "openrouter", "ollama")
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Default model
    #[serde(default = "default_model")]
    pub default_model: String,

    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Max tokens per model response (unset = provider default)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_max_tokens: Option<u32>,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    #[serde(default)]
    pub persona: PersonaConfig,

    #[serde(default)]
    pub agent: AgentConfig,

    #[serde(default)]
    pub memory: MemoryConfig,

    #[serde(default)]
    pub gateway: GatewayConfig,

    #[serde(default)]
    pub traq: TraqConfig,

    #[serde(default)]
    pub wiki: WikiConfig,

    #[serde(default)]
    pub web_search: WebSearchConfig,

    #[serde(default)]
    pub cli: CliConfig,
}

fn default_provider() -> String {
    "gemini".into()
}
fn default_model() -> String {
    "gemini-2.0-flash".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_true() -> bool {
    true
}

/// Redact a secret string for Debug output.
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
            .field("default_provider", &self.default_provider)
            .field("default_model", &self.default_model)
            .field("default_temperature", &self.default_temperature)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("providers", &self.providers)
            .field("persona", &self.persona)
            .field("agent", &self.agent)
            .field("memory", &self.memory)
            .field("gateway", &self.gateway)
            .field("traq", &self.traq)
            .field("wiki", &self.wiki)
            .field("web_search", &self.web_search)
            .field("cli", &self.cli)
            .finish()
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .finish()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersonaConfig {
    /// Display name (defaults to 一華)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Replace the system prompt entirely
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt_override: Option<String>,

    /// Load the system prompt from a markdown file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt_file: Option<String>,
}

/// Bounds of the reason-act-observe loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Maximum tool invocations per user message
    #[serde(default = "default_max_tool_calls")]
    pub max_tool_calls: u32,

    #[serde(default = "default_model_timeout")]
    pub model_timeout_secs: u64,

    #[serde(default = "default_tool_timeout")]
    pub tool_timeout_secs: u64,

    /// Upper bound for one whole user turn, model and tools included
    #[serde(default = "default_turn_timeout")]
    pub turn_timeout_secs: u64,
}

fn default_max_tool_calls() -> u32 {
    5
}
fn default_model_timeout() -> u64 {
    60
}
fn default_tool_timeout() -> u64 {
    20
}
fn default_turn_timeout() -> u64 {
    120
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_tool_calls: default_max_tool_calls(),
            model_timeout_secs: default_model_timeout(),
            tool_timeout_secs: default_tool_timeout(),
            turn_timeout_secs: default_turn_timeout(),
        }
    }
}

/// Bounds of the in-memory session store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default = "default_max_turns")]
    pub max_turns_per_session: usize,

    /// Idle sessions older than this are evicted
    #[serde(default = "default_session_ttl")]
    pub session_ttl_secs: u64,

    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
}

fn default_max_turns() -> usize {
    100
}
fn default_session_ttl() -> u64 {
    24 * 60 * 60
}
fn default_max_sessions() -> usize {
    1000
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_turns_per_session: default_max_turns(),
            session_ttl_secs: default_session_ttl(),
            max_sessions: default_max_sessions(),
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
    8080
}
fn default_host() -> String {
    "0.0.0.0".into()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
        }
    }
}

/// How inbound messages are grouped into sessions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionScope {
    /// One conversation per author, across channels
    #[default]
    User,
    /// One conversation per channel, shared by everyone in it
    Channel,
    /// One conversation per author within each channel
    UserChannel,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct TraqConfig {
    /// REST API base (`.../api/v3`)
    #[serde(default = "default_traq_api_url")]
    pub api_url: String,

    /// Web UI base used for message permalinks
    #[serde(default = "default_traq_web_url")]
    pub web_url: String,

    /// Bearer token the bot uses for the REST API (`BOT_ACCESS_TOKEN`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_access_token: Option<String>,

    /// Shared secret expected in the webhook token header (`BOT_VERIFICATION_TOKEN`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_token: Option<String>,

    /// Bot account name; `@<bot_name>` is stripped from the start of questions
    #[serde(default = "default_bot_name")]
    pub bot_name: String,

    #[serde(default)]
    pub session_scope: SessionScope,

    /// Maximum hits rendered by the message search tool
    #[serde(default = "default_search_limit")]
    pub search_limit: u32,

    /// Offset used when rendering message timestamps
    #[serde(default = "default_utc_offset")]
    pub display_utc_offset_hours: i32,
}

fn default_traq_api_url() -> String {
    "https://q.trap.jp/api/v3".into()
}
fn default_traq_web_url() -> String {
    "https://q.trap.jp".into()
}
fn default_bot_name() -> String {
    "BOT_itika".into()
}
/// Upper bound on message search hits shown to the model.
pub const MAX_SEARCH_LIMIT: u32 = 20;

fn default_search_limit() -> u32 {
    MAX_SEARCH_LIMIT
}
fn default_utc_offset() -> i32 {
    9
}

impl Default for TraqConfig {
    fn default() -> Self {
        Self {
            api_url: default_traq_api_url(),
            web_url: default_traq_web_url(),
            bot_access_token: None,
            verification_token: None,
            bot_name: default_bot_name(),
            session_scope: SessionScope::default(),
            search_limit: default_search_limit(),
            display_utc_offset_hours: default_utc_offset(),
        }
    }
}

impl std::fmt::Debug for TraqConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraqConfig")
            .field("api_url", &self.api_url)
            .field("web_url", &self.web_url)
            .field("bot_access_token", &redact(&self.bot_access_token))
            .field("verification_token", &redact(&self.verification_token))
            .field("bot_name", &self.bot_name)
            .field("session_scope", &self.session_scope)
            .field("search_limit", &self.search_limit)
            .field("display_utc_offset_hours", &self.display_utc_offset_hours)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct WikiConfig {
    #[serde(default = "default_wiki_url")]
    pub api_url: String,

    /// `WIKI_TOKEN`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,

    /// Account the search runs as
    #[serde(default = "default_wiki_user")]
    pub user: String,

    /// Maximum pages rendered per search
    #[serde(default = "default_wiki_limit")]
    pub limit: u32,

    /// Page bodies are cut to this many characters
    #[serde(default = "default_wiki_body_chars")]
    pub max_body_chars: usize,
}

fn default_wiki_url() -> String {
    "https://wiki.trap.jp".into()
}
fn default_wiki_user() -> String {
    "trasta".into()
}
fn default_wiki_limit() -> u32 {
    5
}
fn default_wiki_body_chars() -> usize {
    2000
}

impl Default for WikiConfig {
    fn default() -> Self {
        Self {
            api_url: default_wiki_url(),
            access_token: None,
            user: default_wiki_user(),
            limit: default_wiki_limit(),
            max_body_chars: default_wiki_body_chars(),
        }
    }
}

impl std::fmt::Debug for WikiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WikiConfig")
            .field("api_url", &self.api_url)
            .field("access_token", &redact(&self.access_token))
            .field("user", &self.user)
            .field("limit", &self.limit)
            .field("max_body_chars", &self.max_body_chars)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSearchConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// DuckDuckGo Instant Answer endpoint
    #[serde(default = "default_web_search_url")]
    pub api_url: String,
}

fn default_web_search_url() -> String {
    "https://api.duckduckgo.com".into()
}

impl Default for WebSearchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_url: default_web_search_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CliConfig {
    /// Session id used by `ichika chat` (`DEBUG_USER_ID`)
    #[serde(default = "default_debug_user")]
    pub debug_user_id: String,
}

fn default_debug_user() -> String {
    "cli_user".into()
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            debug_user_id: default_debug_user(),
        }
    }
}

impl AppConfig {
    /// Load configuration from `path`, or from `~/.ichika/config.toml`.
    ///
    /// Environment variables override file values:
    /// - `ICHIKA_API_KEY` (then `GEMINI_API_KEY`, `OPENAI_API_KEY`) when no key is configured
    /// - `ICHIKA_PROVIDER`, `ICHIKA_MODEL`
    /// - `BOT_ACCESS_TOKEN`, `BOT_VERIFICATION_TOKEN`, `WIKI_TOKEN`, `DEBUG_USER_ID`
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config_path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| Self::config_dir().join("config.toml"));
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|name| std::env::var(name).ok());
        config.validate()?;
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

    /// Apply environment overrides through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.api_key.is_none() {
            self.api_key = lookup("ICHIKA_API_KEY")
                .or_else(|| lookup("GEMINI_API_KEY"))
                .or_else(|| lookup("OPENAI_API_KEY"));
        }
        if let Some(provider) = lookup("ICHIKA_PROVIDER") {
            self.default_provider = provider;
        }
        if let Some(model) = lookup("ICHIKA_MODEL") {
            self.default_model = model;
        }
        if let Some(token) = lookup("BOT_ACCESS_TOKEN") {
            self.traq.bot_access_token = Some(token);
        }
        if let Some(token) = lookup("BOT_VERIFICATION_TOKEN") {
            self.traq.verification_token = Some(token);
        }
        if let Some(token) = lookup("WIKI_TOKEN") {
            self.wiki.access_token = Some(token);
        }
        if let Some(id) = lookup("DEBUG_USER_ID") {
            self.cli.debug_user_id = id;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".ichika")
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.default_temperature) {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }
        if self.agent.max_tool_calls == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_tool_calls must be at least 1".into(),
            ));
        }
        if self.agent.model_timeout_secs == 0
            || self.agent.tool_timeout_secs == 0
            || self.agent.turn_timeout_secs == 0
        {
            return Err(ConfigError::ValidationError(
                "agent timeouts must be > 0".into(),
            ));
        }
        if self.memory.max_turns_per_session == 0 || self.memory.max_sessions == 0 {
            return Err(ConfigError::ValidationError(
                "memory bounds must be > 0".into(),
            ));
        }
        if !(1..=MAX_SEARCH_LIMIT).contains(&self.traq.search_limit) {
            return Err(ConfigError::ValidationError(format!(
                "traq.search_limit must be between 1 and {MAX_SEARCH_LIMIT}"
            )));
        }
        if !(-12..=14).contains(&self.traq.display_utc_offset_hours) {
            return Err(ConfigError::ValidationError(
                "traq.display_utc_offset_hours must be between -12 and 14".into(),
            ));
        }
        if !(1..=10).contains(&self.wiki.limit) {
            return Err(ConfigError::ValidationError(
                "wiki.limit must be between 1 and 10".into(),
            ));
        }
        if self.traq.bot_name.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "traq.bot_name must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// Secrets the webhook server cannot run without.
    pub fn require_server_secrets(&self) -> Result<(), ConfigError> {
        if self.traq.bot_access_token.as_deref().is_none_or(str::is_empty) {
            return Err(ConfigError::MissingSecret("BOT_ACCESS_TOKEN".into()));
        }
        if self.traq.verification_token.as_deref().is_none_or(str::is_empty) {
            return Err(ConfigError::MissingSecret("BOT_VERIFICATION_TOKEN".into()));
        }
        Ok(())
    }

    /// Check if a model API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
            || self
                .providers
                .get(&self.default_provider)
                .is_some_and(|p| p.api_key.is_some())
    }

    /// Generate a default config TOML string (for `config init`).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_provider: default_provider(),
            default_model: default_model(),
            default_temperature: default_temperature(),
            default_max_tokens: None,
            providers: HashMap::new(),
            persona: PersonaConfig::default(),
            agent: AgentConfig::default(),
            memory: MemoryConfig::default(),
            gateway: GatewayConfig::default(),
            traq: TraqConfig::default(),
            wiki: WikiConfig::default(),
            web_search: WebSearchConfig::default(),
            cli: CliConfig::default(),
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

    #[error("Missing secret: set {0}")]
    MissingSecret(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert_eq!(config.default_provider, "gemini");
        assert_eq!(config.gateway.port, 8080);
        assert_eq!(config.agent.max_tool_calls, 5);
        assert_eq!(config.traq.search_limit, 20);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.default_provider, config.default_provider);
        assert_eq!(parsed.traq.bot_name, config.traq.bot_name);
    }

    #[test]
    fn invalid_bounds_rejected() {
        let mut config = AppConfig {
            default_temperature: 5.0,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());

        config.default_temperature = 0.7;
        config.agent.max_tool_calls = 0;
        assert!(config.validate().is_err());

        config.agent.max_tool_calls = 3;
        config.traq.search_limit = 21;
        assert!(config.validate().is_err());

        config.traq.search_limit = 20;
        assert!(config.validate().is_ok());
        config.wiki.limit = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.default_provider, "gemini");
    }

    #[test]
    fn file_values_are_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
default_provider = "deepseek"
default_model = "deepseek-chat"

[agent]
max_tool_calls = 3

[traq]
bot_name = "BOT_test"
session_scope = "user_channel"

[providers.deepseek]
api_key = "sk-test"
"#,
        )
        .unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.default_provider, "deepseek");
        assert_eq!(config.agent.max_tool_calls, 3);
        assert_eq!(config.agent.tool_timeout_secs, 20);
        assert_eq!(config.traq.session_scope, SessionScope::UserChannel);
        assert!(config.has_api_key());
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "default_provider = [").unwrap();
        assert!(matches!(
            AppConfig::load_from(&path),
            Err(ConfigError::ParseError { .. })
        ));
    }

    #[test]
    fn env_overrides_apply() {
        let env: HashMap<&str, &str> = [
            ("GEMINI_API_KEY", "g-key"),
            ("BOT_ACCESS_TOKEN", "access"),
            ("BOT_VERIFICATION_TOKEN", "verify"),
            ("WIKI_TOKEN", "wiki"),
            ("DEBUG_USER_ID", "tester"),
            ("ICHIKA_MODEL", "gemini-2.5-flash"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config.apply_env(|name| env.get(name).map(|v| v.to_string()));

        assert_eq!(config.api_key.as_deref(), Some("g-key"));
        assert_eq!(config.default_model, "gemini-2.5-flash");
        assert_eq!(config.traq.bot_access_token.as_deref(), Some("access"));
        assert_eq!(config.wiki.access_token.as_deref(), Some("wiki"));
        assert_eq!(config.cli.debug_user_id, "tester");
        assert!(config.require_server_secrets().is_ok());
    }

    #[test]
    fn server_requires_tokens() {
        let config = AppConfig::default();
        assert!(matches!(
            config.require_server_secrets(),
            Err(ConfigError::MissingSecret(name)) if name == "BOT_ACCESS_TOKEN"
        ));
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let mut config = AppConfig::default();
        config.traq.verification_token = Some("super-secret".into());
        config.api_key = Some("sk-secret".into());
        let debug = format!("{config:?}");
        assert!(!debug.contains("super-secret"));
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("gemini"));
        assert!(toml_str.contains("BOT_itika"));
    }
}
