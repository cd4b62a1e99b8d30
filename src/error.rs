use assistant_api::{ApiError, RunStatus};
use thiserror::Error;

/// Failures surfaced by the stream controller and the send-and-wait flow.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("run {run_id} ended as {status} before any content arrived")]
    RunFailed { run_id: String, status: RunStatus },
}

impl StreamError {
    /// Text that is safe to show in the chat transcript.
    pub fn user_message(&self) -> String {
        match self {
            Self::Api(error) => error.user_message(),
            Self::RunFailed { .. } => {
                "The assistant couldn't finish a response. Please try again.".to_string()
            }
        }
    }

    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            Self::Api(error) => Some(error),
            Self::RunFailed { .. } => None,
        }
    }
}
