use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::backend::{require_id, AssistantBackend};
use crate::config::AssistantApiConfig;
use crate::error::{classify_run_creation_error, parse_error_message, ApiError};
use crate::headers::build_headers;
use crate::models::{Assistant, Message, Run, Thread};
use crate::payload::{decode_data, CreateMessageRequest, CreateRunRequest, CreateThreadRequest};
use crate::url::Endpoint;

#[derive(Debug, Clone)]
pub struct AssistantApiClient {
    http: Client,
    config: AssistantApiConfig,
}

impl AssistantApiClient {
    pub fn new(config: AssistantApiConfig) -> Result<Self, ApiError> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().map_err(ApiError::network)?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &AssistantApiConfig {
        &self.config
    }

    pub fn build_headers(&self) -> Result<HeaderMap, ApiError> {
        let headers = build_headers(&self.config)?;
        let mut out = HeaderMap::new();
        for (key, value) in headers {
            out.insert(
                HeaderName::from_bytes(key.as_bytes())
                    .map_err(|_| ApiError::InvalidRequest(format!("invalid header key: {key}")))?,
                HeaderValue::from_str(&value).map_err(|_| {
                    ApiError::InvalidRequest(format!("invalid header value for {key}"))
                })?,
            );
        }
        Ok(out)
    }

    /// Request for `endpoint` with headers applied and no body.
    pub fn build_request(&self, endpoint: Endpoint<'_>) -> Result<RequestBuilder, ApiError> {
        let url = endpoint.url(&self.config.base_url)?;
        let headers = self.build_headers()?;
        Ok(self.http.request(endpoint.method(), url).headers(headers))
    }

    async fn get_data<T: DeserializeOwned>(&self, endpoint: Endpoint<'_>) -> Result<T, ApiError> {
        let request = self.build_request(endpoint)?;
        self.execute(endpoint, request).await
    }

    async fn post_data<B, T>(&self, endpoint: Endpoint<'_>, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = self.build_request(endpoint)?.json(body);
        self.execute(endpoint, request).await
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        endpoint: Endpoint<'_>,
        request: RequestBuilder,
    ) -> Result<T, ApiError> {
        debug!(?endpoint, "assistant api request");
        let response = request.send().await.map_err(|error| {
            warn!(?endpoint, %error, "no response from assistant api");
            ApiError::network(error)
        })?;

        let status = response.status();
        let body = response.text().await.map_err(ApiError::network)?;
        if !status.is_success() {
            let message = parse_error_message(status, &body);
            warn!(?endpoint, %status, %message, "assistant api request failed");
            return Err(ApiError::status(status, message));
        }

        decode_data(&body)
    }

    /// Lightweight liveness probe. Never fails: any error reads as `false`.
    pub async fn check_api_connection(&self) -> bool {
        let request = match self.build_request(Endpoint::Status) {
            Ok(request) => request,
            Err(error) => {
                warn!(%error, "api status check could not be built");
                return false;
            }
        };

        match request.send().await {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                warn!(status = %response.status(), "api status check failed");
                false
            }
            Err(error) => {
                warn!(%error, "api status check failed");
                false
            }
        }
    }

    pub async fn list_assistants(&self) -> Result<Vec<Assistant>, ApiError> {
        self.get_data(Endpoint::Assistants).await
    }
}

impl AssistantBackend for AssistantApiClient {
    async fn create_thread(&self, parent_id: &str, child_id: &str) -> Result<Thread, ApiError> {
        let body = CreateThreadRequest::new(parent_id, child_id);
        let thread: Thread = self.post_data(Endpoint::CreateThread, &body).await?;
        debug!(thread_id = %thread.id, "thread created");
        Ok(thread)
    }

    async fn send_thread_message(&self, thread_id: &str, content: &str) -> Result<Message, ApiError> {
        require_id("thread id", thread_id)?;
        if content.trim().is_empty() {
            return Err(ApiError::InvalidRequest(
                "message content must not be empty".to_string(),
            ));
        }

        let body = CreateMessageRequest::user(
            thread_id,
            content,
            &self.config.parent_id,
            &self.config.child_id,
        );
        let message: Message = self.post_data(Endpoint::CreateMessage, &body).await?;
        debug!(thread_id, message_id = %message.id, "message sent");
        Ok(message)
    }

    async fn create_run(&self, thread_id: &str) -> Result<Run, ApiError> {
        require_id("thread id", thread_id)?;
        let assistant_id = self.config.assistant_id.as_str();
        let body = CreateRunRequest {
            thread_id: thread_id.to_string(),
            assistant_id: assistant_id.to_string(),
        };

        let run: Run = self
            .post_data(Endpoint::CreateRun, &body)
            .await
            .map_err(|error| classify_run_creation_error(error, assistant_id, thread_id))?;
        debug!(thread_id, run_id = %run.id, status = %run.status, "run created");
        Ok(run)
    }

    async fn list_runs(&self, thread_id: &str) -> Result<Vec<Run>, ApiError> {
        require_id("thread id", thread_id)?;
        self.get_data(Endpoint::ThreadRuns { thread_id }).await
    }

    async fn get_run_status(&self, thread_id: &str, run_id: &str) -> Result<Run, ApiError> {
        require_id("thread id", thread_id)?;
        require_id("run id", run_id)?;
        self.get_data(Endpoint::Run { thread_id, run_id }).await
    }

    async fn get_thread_messages(&self, thread_id: &str) -> Result<Vec<Message>, ApiError> {
        require_id("thread id", thread_id)?;
        self.get_data(Endpoint::ThreadMessages { thread_id }).await
    }
}
