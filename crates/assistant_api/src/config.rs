use std::collections::BTreeMap;
use std::time::Duration;

use crate::url::DEFAULT_BASE_URL;

/// Assistant the backend runs against when none is configured.
pub const DEFAULT_ASSISTANT_ID: &str = "asst_7vAxgRy81ppKGzs2hjBvnHvT";
pub const DEFAULT_PARENT_ID: &str = "parent123";
pub const DEFAULT_CHILD_ID: &str = "child123";
/// Per-request timeout applied unless overridden.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Transport configuration for assistant API requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssistantApiConfig {
    /// Base URL that endpoint paths are appended to.
    pub base_url: String,
    /// Assistant identifier sent when creating runs.
    pub assistant_id: String,
    /// Parent profile attached to threads and messages.
    pub parent_id: String,
    /// Child profile attached to threads and messages.
    pub child_id: String,
    /// Optional bearer token passed to `Authorization`.
    pub access_token: Option<String>,
    /// Optional `User-Agent` override.
    pub user_agent: Option<String>,
    /// Additional headers merged into request headers.
    pub extra_headers: BTreeMap<String, String>,
    /// Optional request timeout.
    pub timeout: Option<Duration>,
}

impl Default for AssistantApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            assistant_id: DEFAULT_ASSISTANT_ID.to_string(),
            parent_id: DEFAULT_PARENT_ID.to_string(),
            child_id: DEFAULT_CHILD_ID.to_string(),
            access_token: None,
            user_agent: None,
            extra_headers: BTreeMap::new(),
            timeout: Some(DEFAULT_TIMEOUT),
        }
    }
}

impl AssistantApiConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_assistant_id(mut self, assistant_id: impl Into<String>) -> Self {
        self.assistant_id = assistant_id.into();
        self
    }

    pub fn with_profile(mut self, parent_id: impl Into<String>, child_id: impl Into<String>) -> Self {
        self.parent_id = parent_id.into();
        self.child_id = child_id.into();
        self
    }

    pub fn with_access_token(mut self, access_token: impl Into<String>) -> Self {
        self.access_token = Some(access_token.into());
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn without_timeout(mut self) -> Self {
        self.timeout = None;
        self
    }

    pub fn insert_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.insert(key.into(), value.into());
        self
    }
}
