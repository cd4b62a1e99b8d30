//! Environment configuration.

use std::env;
use std::time::Duration;

use assistant_api::config::DEFAULT_TIMEOUT;
use assistant_api::{normalize_base_url, AssistantApiConfig};

/// Filter used when `CODDLE_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "warn";

/// Which backend implementation the chat front end talks to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BackendKind {
    #[default]
    Http,
    /// In-memory backend for offline runs.
    Mock,
}

impl BackendKind {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "http" => Some(Self::Http),
            "mock" => Some(Self::Mock),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub api_url: Option<String>,
    pub assistant_id: Option<String>,
    pub parent_id: Option<String>,
    pub child_id: Option<String>,
    pub api_token: Option<String>,
    pub timeout: Duration,
    pub backend: BackendKind,
    pub log_filter: String,
}

impl EnvConfig {
    pub fn from_env() -> Self {
        Self {
            api_url: env_string_opt("CODDLE_API_URL"),
            assistant_id: env_string_opt("CODDLE_ASSISTANT_ID"),
            parent_id: env_string_opt("CODDLE_PARENT_ID"),
            child_id: env_string_opt("CODDLE_CHILD_ID"),
            api_token: env_string_opt("CODDLE_API_TOKEN"),
            timeout: env_string_opt("CODDLE_API_TIMEOUT_SECS")
                .and_then(|value| value.trim().parse::<u64>().ok())
                .filter(|secs| *secs > 0)
                .map_or(DEFAULT_TIMEOUT, Duration::from_secs),
            backend: env_string_opt("CODDLE_BACKEND")
                .and_then(|value| BackendKind::parse(&value))
                .unwrap_or_default(),
            log_filter: env_string_opt("CODDLE_LOG")
                .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string()),
        }
    }

    /// Transport configuration with every override from the environment applied.
    pub fn api_config(&self) -> AssistantApiConfig {
        let mut config = AssistantApiConfig::default().with_timeout(self.timeout);
        if let Some(url) = &self.api_url {
            config = config.with_base_url(normalize_base_url(url));
        }
        if let Some(assistant_id) = &self.assistant_id {
            config = config.with_assistant_id(assistant_id.as_str());
        }
        if let Some(parent_id) = &self.parent_id {
            config.parent_id = parent_id.clone();
        }
        if let Some(child_id) = &self.child_id {
            config.child_id = child_id.clone();
        }
        if let Some(token) = &self.api_token {
            config = config.with_access_token(token.as_str());
        }
        config
    }
}

fn env_string_opt(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        if value.trim().is_empty() {
            None
        } else {
            Some(value)
        }
    })
}
