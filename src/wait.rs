//! Send-and-wait flow for callers that want the whole reply at once.

use std::time::Duration;

use assistant_api::{extract_content, ApiError, AssistantBackend, Message, Run, RunStatus};
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::error::StreamError;

/// Shown when polling ends without any assistant message in the thread.
pub const NO_RESPONSE_REPLY: &str =
    "I didn't receive a response. Please try again with a different question.";
/// Shown when the latest assistant message has no displayable text.
pub const EMPTY_RESPONSE_REPLY: &str = "I received your message but couldn't generate a response. This could be due to processing limitations or content policy restrictions.";

#[derive(Debug, Clone, PartialEq)]
pub struct WaitPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
    pub error_retry_delay: Duration,
    pub max_consecutive_errors: u32,
    /// Single last-resort sleep when status polling itself failed.
    pub fallback_delay: Duration,
    pub message_fetch_retries: u32,
    pub message_retry_delay: Duration,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            initial_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(8),
            error_retry_delay: Duration::from_secs(2),
            max_consecutive_errors: 3,
            fallback_delay: Duration::from_secs(12),
            message_fetch_retries: 2,
            message_retry_delay: Duration::from_secs(2),
        }
    }
}

impl WaitPolicy {
    /// Delay before status check `attempt + 1`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        assistant_api::retry::exponential_delay(
            attempt,
            self.initial_delay,
            self.multiplier,
            self.max_delay,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunWait {
    Completed(Run),
    /// Attempts ran out while the run was still active.
    Unresolved {
        run_id: String,
        last_status: Option<RunStatus>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatReply {
    pub content: String,
    pub time_to_first_response: Duration,
}

/// Polls `run_id` until it completes, fails, or the attempt budget is spent.
pub async fn wait_for_run_completion<B>(
    backend: &B,
    thread_id: &str,
    run_id: &str,
    policy: &WaitPolicy,
) -> Result<RunWait, StreamError>
where
    B: AssistantBackend,
{
    let mut consecutive_errors = 0;
    let mut last_status = None;

    for attempt in 0..policy.max_attempts {
        match backend.get_run_status(thread_id, run_id).await {
            Ok(run) if run.status == RunStatus::Completed => {
                debug!(thread_id, run_id, attempt, "run completed");
                return Ok(RunWait::Completed(run));
            }
            Ok(run) if run.status.is_terminal() => {
                warn!(thread_id, run_id, status = %run.status, "run ended without completing");
                return Err(StreamError::RunFailed {
                    run_id: run.id,
                    status: run.status,
                });
            }
            Ok(run) => {
                consecutive_errors = 0;
                let delay = policy.delay_for(attempt);
                debug!(thread_id, run_id, status = %run.status, delay_ms = delay.as_millis() as u64, "run still active");
                last_status = Some(run.status);
                sleep(delay).await;
            }
            Err(error) => {
                consecutive_errors += 1;
                warn!(
                    thread_id,
                    run_id,
                    attempt = attempt + 1,
                    max_attempts = policy.max_attempts,
                    %error,
                    "run status poll failed"
                );
                if consecutive_errors >= policy.max_consecutive_errors {
                    return Err(error.into());
                }
                sleep(policy.error_retry_delay).await;
            }
        }
    }

    info!(thread_id, run_id, "polling attempts exhausted");
    Ok(RunWait::Unresolved {
        run_id: run_id.to_string(),
        last_status,
    })
}

/// Fetches thread messages, retrying an empty list or a failure up to
/// `policy.message_fetch_retries` times.
pub async fn fetch_messages_with_retry<B>(
    backend: &B,
    thread_id: &str,
    policy: &WaitPolicy,
) -> Result<Vec<Message>, ApiError>
where
    B: AssistantBackend,
{
    let mut retries_left = policy.message_fetch_retries;
    loop {
        match backend.get_thread_messages(thread_id).await {
            Ok(messages) if !messages.is_empty() || retries_left == 0 => return Ok(messages),
            Ok(_) => debug!(thread_id, retries_left, "no messages yet, retrying"),
            Err(error) if retries_left == 0 => return Err(error),
            Err(error) => warn!(thread_id, retries_left, %error, "message fetch failed, retrying"),
        }
        retries_left -= 1;
        sleep(policy.message_retry_delay).await;
    }
}

/// Sends `content`, starts a run and returns the newest assistant reply.
///
/// Send and run-creation failures propagate. Anything after that degrades to
/// a displayable reply: a failed wait costs one `fallback_delay` sleep, and a
/// thread without a usable assistant message yields a canned apology.
pub async fn send_and_wait<B>(
    backend: &B,
    thread_id: &str,
    content: &str,
    policy: &WaitPolicy,
) -> Result<ChatReply, ApiError>
where
    B: AssistantBackend,
{
    let started = Instant::now();

    let sent = backend.send_thread_message(thread_id, content).await?;
    debug!(thread_id, message_id = %sent.id, "message sent");
    let run = backend.create_run(thread_id).await?;
    debug!(thread_id, run_id = %run.id, "run created");

    match wait_for_run_completion(backend, thread_id, &run.id, policy).await {
        Ok(RunWait::Completed(_)) => {}
        Ok(RunWait::Unresolved { last_status, .. }) => {
            info!(thread_id, run_id = %run.id, ?last_status, "reading messages from an unresolved run");
        }
        Err(error) => {
            warn!(thread_id, run_id = %run.id, %error, "waiting for run failed, falling back to a fixed delay");
            sleep(policy.fallback_delay).await;
        }
    }

    let messages = fetch_messages_with_retry(backend, thread_id, policy).await?;
    let time_to_first_response = started.elapsed();
    info!(thread_id, elapsed_ms = time_to_first_response.as_millis() as u64, "reply ready");

    let content = match latest_assistant_message(&messages) {
        None => {
            warn!(thread_id, "no assistant response found in the thread");
            NO_RESPONSE_REPLY.to_string()
        }
        Some(message) => {
            let text = extract_content(message);
            if text.trim().is_empty() {
                warn!(thread_id, message_id = %message.id, "assistant response was empty");
                EMPTY_RESPONSE_REPLY.to_string()
            } else {
                text
            }
        }
    };

    Ok(ChatReply {
        content,
        time_to_first_response,
    })
}

/// Newest assistant message regardless of the order the store returned.
pub fn latest_assistant_message(messages: &[Message]) -> Option<&Message> {
    messages
        .iter()
        .filter(|message| message.is_assistant())
        .max_by_key(|message| message.created_at)
}
