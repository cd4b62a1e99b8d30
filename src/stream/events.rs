use std::time::Duration;

use assistant_api::{Run, RunStatus};

use crate::error::StreamError;

/// One piece of assistant content surfaced before or at run completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentChunk {
    pub content: String,
    /// Set on the first emission of the session only.
    pub is_first: bool,
    /// Elapsed time from stream start; present only when `is_first` is set.
    pub time_to_first_response: Option<Duration>,
}

/// Typed lifecycle events produced by one streaming session.
#[derive(Debug)]
pub enum StreamEvent {
    /// `reused` is true when an already active run was adopted.
    RunCreated { run_id: String, reused: bool },
    StatusChanged { status: RunStatus },
    Chunk(ContentChunk),
    Completed { run: Run },
    Error(StreamError),
    /// Always the last event of a session that ended on its own.
    Done,
}

impl StreamEvent {
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }

    /// Route the event to the matching observer callback.
    pub fn dispatch<O: StreamObserver + ?Sized>(&self, observer: &mut O) {
        match self {
            Self::RunCreated { run_id, reused } => observer.on_run_created(run_id, *reused),
            Self::StatusChanged { status } => observer.on_status_update(status),
            Self::Chunk(chunk) => observer.on_message_created(chunk),
            Self::Completed { run } => observer.on_run_completed(run),
            Self::Error(error) => observer.on_error(error),
            Self::Done => observer.on_done(),
        }
    }
}

/// Callback-style consumer of stream events. Every method defaults to a no-op.
pub trait StreamObserver {
    fn on_run_created(&mut self, _run_id: &str, _reused: bool) {}

    fn on_status_update(&mut self, _status: &RunStatus) {}

    fn on_message_created(&mut self, _chunk: &ContentChunk) {}

    fn on_run_completed(&mut self, _run: &Run) {}

    fn on_error(&mut self, _error: &StreamError) {}

    fn on_done(&mut self) {}
}
