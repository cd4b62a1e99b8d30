//! Transport-only client for the Coddle assistant API.
//!
//! This crate owns request building, response decoding and error
//! classification for the thread/run/message endpoints. It performs no
//! retries of its own: every failure propagates to the caller as an
//! [`ApiError`], with HTTP 429 kept distinguishable so polling loops can back
//! off instead of surfacing it.
//!
//! Message content arrives in several shapes; [`extract_content`] folds all
//! of them into one display string without ever failing.

pub mod backend;
pub mod client;
pub mod config;
pub mod content;
pub mod error;
pub mod headers;
pub mod models;
pub mod payload;
pub mod retry;
pub mod url;

pub use backend::AssistantBackend;
pub use client::AssistantApiClient;
pub use config::AssistantApiConfig;
pub use content::extract_content;
pub use error::ApiError;
pub use models::{
    Assistant, ContentBlock, Message, MessageContent, MessageRole, Run, RunStatus, TextField,
    Thread,
};
pub use reqwest::StatusCode;
pub use retry::RateLimitBackoff;
pub use url::{normalize_base_url, Endpoint};
