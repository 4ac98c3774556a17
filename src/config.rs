//! Configuration loading with env-var overrides.
//!
//! Reads `config/default.toml` relative to the current working directory
//! (or the path given with `-f`), then applies `PERSONA_CHAT_LOG_LEVEL` and
//! `LLM_API_KEY` env overrides.

use std::{
    env, fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;

use crate::error::AppError;

pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// PTY (console) channel configuration.
#[derive(Debug, Clone)]
pub struct PtyConfig {
    pub enabled: bool,
}

/// Comms subsystem configuration.
#[derive(Debug, Clone)]
pub struct CommsConfig {
    pub pty: PtyConfig,
}

/// OpenAI / OpenAI-compatible provider configuration.
/// Populated from `[llm.openai]` in the TOML.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// Server root; `/v1/chat/completions` is appended per request.
    pub base_url: String,
    /// Default model, used when a call does not name one.
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Per-request timeout in milliseconds.
    pub timeout_ms: u64,
}

/// LLM subsystem configuration.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Which provider is active (`"dummy"` or `"openai"`).
    /// Maps to `default` in `[llm]`.
    pub provider: String,
    pub openai: OpenAiConfig,
}

/// Chat agent configuration (`[chat]`).
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// System prompt used when no personality is active.
    pub system_prompt: String,
    /// Deliver replies as several timed messages instead of one.
    pub split_output: bool,
    /// Separator used to split replies in staged output.
    pub delimiter: String,
    /// Simulated typing delay per character, in milliseconds.
    pub char_interval_ms: u64,
    /// Max non-system messages kept per session. `None` keeps everything.
    pub history_cap: Option<usize>,
    /// Personality name -> system prompt, in config-file order.
    pub personalities: Vec<(String, String)>,
}

/// Fully-resolved configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub bot_name: String,
    pub log_level: String,
    pub comms: CommsConfig,
    pub llm: LlmConfig,
    /// From `LLM_API_KEY`, falling back to `[llm.openai] api_key`.
    /// Required for the `openai` provider; `None` only with `dummy`.
    pub llm_api_key: Option<String>,
    pub chat: ChatConfig,
}

impl Config {
    /// Returns `true` if the PTY channel should be loaded.
    pub fn comms_pty_should_load(&self) -> bool {
        self.comms.pty.enabled
    }
}

/// Raw TOML shape — `serde` target before resolution.
#[derive(Deserialize, Default)]
struct RawConfig {
    #[serde(default)]
    supervisor: RawSupervisor,
    #[serde(default)]
    comms: RawComms,
    #[serde(default)]
    llm: RawLlm,
    #[serde(default)]
    chat: RawChat,
}

#[derive(Deserialize)]
struct RawSupervisor {
    #[serde(default = "default_bot_name")]
    bot_name: String,
    #[serde(default = "default_log_level")]
    log_level: String,
}

impl Default for RawSupervisor {
    fn default() -> Self {
        Self { bot_name: default_bot_name(), log_level: default_log_level() }
    }
}

#[derive(Deserialize, Default)]
struct RawComms {
    #[serde(default)]
    pty: RawPty,
}

#[derive(Deserialize)]
struct RawPty {
    #[serde(default = "default_true")]
    enabled: bool,
}

impl Default for RawPty {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Deserialize)]
struct RawLlm {
    /// Maps to `default = "..."` in `[llm]`.
    #[serde(rename = "default", default = "default_llm_provider")]
    provider: String,
    #[serde(default)]
    openai: RawOpenAiConfig,
}

impl Default for RawLlm {
    fn default() -> Self {
        Self { provider: default_llm_provider(), openai: RawOpenAiConfig::default() }
    }
}

#[derive(Deserialize)]
struct RawOpenAiConfig {
    #[serde(default = "default_base_url")]
    base_url: String,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    api_key: Option<String>,
    #[serde(default = "default_temperature")]
    temperature: f32,
    #[serde(default = "default_max_tokens")]
    max_tokens: u32,
    #[serde(default = "default_timeout_ms")]
    timeout_ms: u64,
}

impl Default for RawOpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: None,
            api_key: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

#[derive(Deserialize)]
struct RawChat {
    #[serde(default = "default_system_prompt")]
    system_prompt: String,
    #[serde(default = "default_true")]
    split_output: bool,
    #[serde(default = "default_delimiter")]
    delimiter: String,
    #[serde(default = "default_char_interval_ms")]
    char_interval_ms: u64,
    #[serde(default)]
    history_cap: Option<usize>,
    /// Kept as a raw table so entry order survives (`preserve_order`).
    #[serde(default)]
    personalities: Option<toml::Table>,
}

impl Default for RawChat {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
            split_output: true,
            delimiter: default_delimiter(),
            char_interval_ms: default_char_interval_ms(),
            history_cap: None,
            personalities: None,
        }
    }
}

fn default_bot_name() -> String { "persona-chat".to_string() }
fn default_log_level() -> String { "info".to_string() }
fn default_llm_provider() -> String { "openai".to_string() }
fn default_base_url() -> String { "https://api.openai.com".to_string() }
fn default_temperature() -> f32 { 0.7 }
fn default_max_tokens() -> u32 { 2048 }
fn default_timeout_ms() -> u64 { 10_000 }
fn default_system_prompt() -> String { "you are a helpful assistant".to_string() }
fn default_delimiter() -> String { "\n".to_string() }
fn default_char_interval_ms() -> u64 { 200 }

fn default_personalities() -> Vec<(String, String)> {
    vec![("AI助手".to_string(), "you are a helpful assistant".to_string())]
}

fn default_true() -> bool {
    true
}

/// Load config from `path` (or `config/default.toml`), then apply env-var overrides.
pub fn load(path: Option<&str>) -> Result<Config, AppError> {
    let path = expand_home(path.unwrap_or(DEFAULT_CONFIG_PATH));
    let log_level_override = env::var("PERSONA_CHAT_LOG_LEVEL").ok();
    let api_key_override = env::var("LLM_API_KEY").ok().filter(|k| !k.is_empty());
    load_from(&path, log_level_override.as_deref(), api_key_override.as_deref())
}

/// Internal loader — accepts an explicit path and optional overrides.
/// Tests pass overrides directly instead of mutating env vars.
pub fn load_from(
    path: &Path,
    log_level_override: Option<&str>,
    api_key_override: Option<&str>,
) -> Result<Config, AppError> {
    let raw = fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("cannot read {}: {e}", path.display())))?;
    parse(&raw, log_level_override, api_key_override)
        .map_err(|e| match e {
            AppError::Config(msg) => AppError::Config(format!("{}: {msg}", path.display())),
            other => other,
        })
}

/// Resolve a TOML document into a [`Config`].
pub fn parse(
    raw: &str,
    log_level_override: Option<&str>,
    api_key_override: Option<&str>,
) -> Result<Config, AppError> {
    let parsed: RawConfig =
        toml::from_str(raw).map_err(|e| AppError::Config(format!("parse error: {e}")))?;

    let provider = parsed.llm.provider;
    let oai = parsed.llm.openai;
    let needs_remote = matches!(provider.as_str(), "openai" | "openai-compatible");

    let model = match oai.model.filter(|m| !m.trim().is_empty()) {
        Some(m) => m,
        None if needs_remote => {
            return Err(AppError::Config("[llm.openai] model is required".into()));
        }
        None => "dummy".to_string(),
    };

    let llm_api_key = api_key_override
        .map(str::to_string)
        .or(oai.api_key)
        .filter(|k| !k.is_empty());
    if needs_remote && llm_api_key.is_none() {
        return Err(AppError::Config(
            "API key missing: set LLM_API_KEY or [llm.openai] api_key".into(),
        ));
    }

    if oai.timeout_ms == 0 {
        return Err(AppError::Config("[llm.openai] timeout_ms must be > 0".into()));
    }

    let personalities = match parsed.chat.personalities {
        None => default_personalities(),
        Some(table) => table
            .into_iter()
            .map(|(name, value)| match value {
                toml::Value::String(prompt) => Ok((name, prompt)),
                other => Err(AppError::Config(format!(
                    "personality '{name}' must be a string, got {}",
                    other.type_str()
                ))),
            })
            .collect::<Result<Vec<_>, _>>()?,
    };

    Ok(Config {
        bot_name: parsed.supervisor.bot_name,
        log_level: log_level_override
            .unwrap_or(&parsed.supervisor.log_level)
            .to_string(),
        comms: CommsConfig {
            pty: PtyConfig { enabled: parsed.comms.pty.enabled },
        },
        llm: LlmConfig {
            provider,
            openai: OpenAiConfig {
                base_url: oai.base_url.trim_end_matches('/').to_string(),
                model,
                temperature: oai.temperature,
                max_tokens: oai.max_tokens,
                timeout_ms: oai.timeout_ms,
            },
        },
        llm_api_key,
        chat: ChatConfig {
            system_prompt: parsed.chat.system_prompt,
            split_output: parsed.chat.split_output,
            delimiter: parsed.chat.delimiter,
            char_interval_ms: parsed.chat.char_interval_ms,
            history_cap: parsed.chat.history_cap,
            personalities,
        },
    })
}

/// Expand a leading `~` to the user's home directory.
/// Absolute or relative paths without `~` are returned unchanged.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

// ── test helpers ──────────────────────────────────────────────────────────────

impl ChatConfig {
    /// Defaults from an empty `[chat]` section.
    pub fn with_defaults() -> Self {
        Self {
            system_prompt: default_system_prompt(),
            split_output: true,
            delimiter: default_delimiter(),
            char_interval_ms: default_char_interval_ms(),
            history_cap: None,
            personalities: default_personalities(),
        }
    }
}

/// Safe `Config` for unit tests — dummy LLM, no API keys, no external calls.
#[cfg(test)]
impl Config {
    pub fn test_default() -> Self {
        Self {
            bot_name: "test".into(),
            log_level: "info".into(),
            comms: CommsConfig { pty: PtyConfig { enabled: true } },
            llm: LlmConfig {
                provider: "dummy".into(),
                openai: OpenAiConfig {
                    base_url: "http://localhost:0".into(),
                    model: "test-model".into(),
                    temperature: 0.0,
                    max_tokens: 16,
                    timeout_ms: 1_000,
                },
            },
            llm_api_key: None,
            chat: ChatConfig::with_defaults(),
        }
    }
}
