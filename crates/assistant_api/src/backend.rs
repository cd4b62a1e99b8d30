use std::future::Future;

use crate::error::ApiError;
use crate::models::{Message, Run, Thread};

/// Thread/run/message operations the polling layers are written against.
///
/// Every operation is one round trip with no retry; failures propagate
/// unchanged so callers can tell rate limits from everything else.
pub trait AssistantBackend: Send + Sync + 'static {
    fn create_thread(
        &self,
        parent_id: &str,
        child_id: &str,
    ) -> impl Future<Output = Result<Thread, ApiError>> + Send;

    /// Posts a user message into `thread_id`.
    fn send_thread_message(
        &self,
        thread_id: &str,
        content: &str,
    ) -> impl Future<Output = Result<Message, ApiError>> + Send;

    /// Starts assistant processing for the thread's unprocessed messages.
    fn create_run(&self, thread_id: &str) -> impl Future<Output = Result<Run, ApiError>> + Send;

    fn list_runs(&self, thread_id: &str) -> impl Future<Output = Result<Vec<Run>, ApiError>> + Send;

    fn get_run_status(
        &self,
        thread_id: &str,
        run_id: &str,
    ) -> impl Future<Output = Result<Run, ApiError>> + Send;

    /// All messages in the thread, in whatever order the store returns them.
    fn get_thread_messages(
        &self,
        thread_id: &str,
    ) -> impl Future<Output = Result<Vec<Message>, ApiError>> + Send;
}

/// Reject blank identifiers before they turn into malformed paths.
pub fn require_id(kind: &str, value: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        Err(ApiError::InvalidRequest(format!("{kind} must not be empty")))
    } else {
        Ok(())
    }
}
