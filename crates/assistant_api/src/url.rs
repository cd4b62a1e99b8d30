use reqwest::{Method, Url};

use crate::error::ApiError;

/// Default base URL for assistant API requests.
pub const DEFAULT_BASE_URL: &str = "https://assistant-apis-272735216503.us-central1.run.app/api";

/// Normalize a configured base URL.
///
/// Blank input falls back to [`DEFAULT_BASE_URL`]; trailing slashes are
/// trimmed so endpoint segments append cleanly.
pub fn normalize_base_url(input: &str) -> String {
    let base = if input.trim().is_empty() {
        DEFAULT_BASE_URL
    } else {
        input.trim()
    };

    base.trim_end_matches('/').to_string()
}

/// Every endpoint the client talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint<'a> {
    Status,
    Assistants,
    CreateThread,
    CreateMessage,
    CreateRun,
    ThreadRuns { thread_id: &'a str },
    Run { thread_id: &'a str, run_id: &'a str },
    ThreadMessages { thread_id: &'a str },
}

impl<'a> Endpoint<'a> {
    pub fn method(&self) -> Method {
        match self {
            Self::CreateThread | Self::CreateMessage | Self::CreateRun => Method::POST,
            _ => Method::GET,
        }
    }

    /// Path segments relative to the base URL, unescaped.
    pub fn segments(&self) -> Vec<&'a str> {
        match *self {
            Self::Status => vec!["status"],
            Self::Assistants => vec!["assistants"],
            Self::CreateThread => vec!["threads", "create"],
            Self::CreateMessage => vec!["messages", "create"],
            Self::CreateRun => vec!["runs", "create"],
            Self::ThreadRuns { thread_id } => vec!["runs", "thread", thread_id],
            Self::Run { thread_id, run_id } => vec!["runs", "thread", thread_id, "run", run_id],
            Self::ThreadMessages { thread_id } => vec!["messages", "thread", thread_id],
        }
    }

    /// Resolve against `base`, percent-encoding identifiers as path segments.
    pub fn url(&self, base: &str) -> Result<Url, ApiError> {
        let normalized = normalize_base_url(base);
        let mut url =
            Url::parse(&normalized).map_err(|_| ApiError::InvalidBaseUrl(normalized.clone()))?;
        url.path_segments_mut()
            .map_err(|_| ApiError::InvalidBaseUrl(normalized.clone()))?
            .pop_if_empty()
            .extend(self.segments());
        Ok(url)
    }
}
