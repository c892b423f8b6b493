//! Service configuration read from the environment.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::context::DEFAULT_SYSTEM_PROMPT;
use crate::inference::OpenAiProvider;
use crate::tools::ToolRegistry;
use crate::OrchestratorConfig;

pub const API_KEY_VAR: &str = "OPENROUTER_API_KEY";
pub const MAX_ITERATIONS_VAR: &str = "TOOLCHAT_MAX_ITERATIONS";

/// Everything needed to stand up the chat service.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub api_key: String,
    /// Provider base; `/v1/chat/completions` is appended.
    pub base_url: String,
    /// Sent as `HTTP-Referer`.
    pub app_url: String,
    pub app_title: String,
    pub model: String,
    pub max_tokens: u32,
    pub max_iterations: usize,
    /// Per model call and per tool call. Zero disables the limit.
    pub timeout: Duration,
    pub bind: SocketAddr,
    pub news_api_url: String,
    pub system_prompt: Option<String>,
}

impl ChatConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Unset and blank values take the default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let api_key = get(API_KEY_VAR).ok_or(ConfigError::Missing(API_KEY_VAR))?;

        // Zero iterations would fail every turn before the model is called.
        let max_iterations = parse(&get, MAX_ITERATIONS_VAR, 8)?;
        if max_iterations == 0 {
            return Err(ConfigError::Invalid {
                key: MAX_ITERATIONS_VAR,
                value: "0".into(),
            });
        }

        Ok(Self {
            api_key,
            base_url: get("OPENROUTER_BASE_URL")
                .unwrap_or_else(|| "https://openrouter.ai/api".into()),
            app_url: get("APP_URL").unwrap_or_else(|| "http://localhost:3000".into()),
            app_title: "Tool Chat".into(),
            model: get("TOOLCHAT_MODEL").unwrap_or_else(|| "anthropic/claude-3.5-sonnet".into()),
            max_tokens: parse(&get, "TOOLCHAT_MAX_TOKENS", 1024)?,
            max_iterations,
            timeout: Duration::from_secs(parse(&get, "TOOLCHAT_TIMEOUT_SECS", 60)?),
            bind: parse(
                &get,
                "TOOLCHAT_BIND",
                SocketAddr::from(([127, 0, 0, 1], 3000)),
            )?,
            news_api_url: get("NEWS_API_URL").unwrap_or_else(|| "https://hn.algolia.com".into()),
            system_prompt: Some(DEFAULT_SYSTEM_PROMPT.into()),
        })
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            max_iterations: self.max_iterations,
            iteration_timeout: (!self.timeout.is_zero()).then_some(self.timeout),
            system_prompt: self.system_prompt.clone(),
        }
    }

    pub fn provider(&self) -> OpenAiProvider {
        OpenAiProvider::new(&self.base_url)
            .with_api_key(&self.api_key)
            .with_referer(&self.app_url)
            .with_title(&self.app_title)
    }

    pub fn tools(&self) -> ToolRegistry {
        ToolRegistry::builtin(&self.news_api_url)
    }
}

fn parse<T: FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
        None => Ok(default),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),

    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}
