use std::io::{self, Write};
use std::sync::Arc;

use assistant_api::{ApiError, AssistantApiConfig, AssistantBackend, Run, RunStatus};
use coddle_assistant::{
    send_and_wait, stream_run, ContentChunk, StreamConfig, StreamError, StreamEvent,
    StreamObserver, WaitPolicy,
};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::cli::ChatMode;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Stream(#[from] StreamError),

    #[error("failed to write chat output: {0}")]
    Io(#[from] io::Error),
}

impl ChatError {
    pub fn user_message(&self) -> String {
        match self {
            Self::Api(error) => error.user_message(),
            Self::Stream(error) => error.user_message(),
            Self::Io(error) => format!("Could not write the reply: {error}"),
        }
    }
}

/// One question/answer exchange on a fresh thread.
pub struct ChatSession<B> {
    backend: Arc<B>,
    parent_id: String,
    child_id: String,
    stream_config: StreamConfig,
    wait_policy: WaitPolicy,
}

impl<B: AssistantBackend> ChatSession<B> {
    pub fn new(backend: Arc<B>, config: &AssistantApiConfig) -> Self {
        Self {
            backend,
            parent_id: config.parent_id.clone(),
            child_id: config.child_id.clone(),
            stream_config: StreamConfig::default(),
            wait_policy: WaitPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_stream_config(mut self, stream_config: StreamConfig) -> Self {
        self.stream_config = stream_config;
        self
    }

    #[must_use]
    pub fn with_wait_policy(mut self, wait_policy: WaitPolicy) -> Self {
        self.wait_policy = wait_policy;
        self
    }

    /// Creates a thread, asks `message` and writes the answer to `out`.
    pub async fn ask<W: Write>(
        &self,
        mode: ChatMode,
        message: &str,
        out: &mut W,
    ) -> Result<(), ChatError> {
        let thread = self
            .backend
            .create_thread(&self.parent_id, &self.child_id)
            .await?;
        debug!(thread_id = %thread.id, ?mode, "chat thread ready");

        match mode {
            ChatMode::Wait => {
                let reply =
                    send_and_wait(&*self.backend, &thread.id, message, &self.wait_policy).await?;
                info!(elapsed_ms = reply.time_to_first_response.as_millis() as u64, "reply received");
                writeln!(out, "{}", reply.content)?;
                out.flush()?;
                Ok(())
            }
            ChatMode::Stream => {
                self.backend.send_thread_message(&thread.id, message).await?;
                let mut handle = stream_run(
                    Arc::clone(&self.backend),
                    thread.id,
                    self.stream_config.clone(),
                );

                let mut printer = TranscriptPrinter::new(out);
                let mut failure = None;
                while let Some(event) = handle.next_event().await {
                    event.dispatch(&mut printer);
                    if let StreamEvent::Error(error) = event {
                        failure = Some(error);
                    }
                }
                printer.finish(failure)
            }
        }
    }
}

/// Writes streamed content as it arrives.
struct TranscriptPrinter<'a, W> {
    out: &'a mut W,
    io_error: Option<io::Error>,
    completed: bool,
}

impl<'a, W: Write> TranscriptPrinter<'a, W> {
    fn new(out: &'a mut W) -> Self {
        Self {
            out,
            io_error: None,
            completed: false,
        }
    }

    fn write_line(&mut self, text: &str) {
        if self.io_error.is_some() {
            return;
        }
        if let Err(error) = writeln!(self.out, "{text}").and_then(|()| self.out.flush()) {
            self.io_error = Some(error);
        }
    }

    /// A stream that completed succeeds even if a poll along the way failed.
    fn finish(self, failure: Option<StreamError>) -> Result<(), ChatError> {
        if let Some(error) = self.io_error {
            return Err(error.into());
        }
        match failure {
            Some(error) if !self.completed => Err(error.into()),
            _ => Ok(()),
        }
    }
}

impl<W: Write> StreamObserver for TranscriptPrinter<'_, W> {
    fn on_run_created(&mut self, run_id: &str, reused: bool) {
        debug!(run_id, reused, "run attached");
    }

    fn on_status_update(&mut self, status: &RunStatus) {
        debug!(%status, "run status");
    }

    fn on_message_created(&mut self, chunk: &ContentChunk) {
        if let Some(elapsed) = chunk.time_to_first_response {
            info!(elapsed_ms = elapsed.as_millis() as u64, "first response");
        }
        self.write_line(&chunk.content);
    }

    fn on_run_completed(&mut self, run: &Run) {
        self.completed = true;
        debug!(run_id = %run.id, status = %run.status, "run finished");
    }

    fn on_error(&mut self, error: &StreamError) {
        warn!(%error, "stream error");
    }
}
