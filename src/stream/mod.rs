//! Polling stream over a thread's assistant run.
//!
//! The backend has no push channel, so [`stream_run`] spawns a ticker task
//! that drives a [`RunPoller`] every [`StreamConfig::tick_interval`]. The
//! poller's adaptive backoff decides whether a tick actually reaches the
//! network. Consumers read typed [`StreamEvent`]s from the returned
//! [`StreamHandle`] or hand it a [`StreamObserver`].

mod events;
mod poller;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use assistant_api::AssistantBackend;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use crate::clock::{Clock, SystemClock};

pub use events::{ContentChunk, StreamEvent, StreamObserver};
pub use poller::{
    PollOutcome, PollPhase, RunPoller, StreamConfig, DEFAULT_TICK_INTERVAL, THINKING_PLACEHOLDER,
};

/// Starts streaming the run for `thread_id` on the current tokio runtime.
pub fn stream_run<B>(backend: Arc<B>, thread_id: impl Into<String>, config: StreamConfig) -> StreamHandle
where
    B: AssistantBackend,
{
    stream_run_with_clock(backend, thread_id, config, SystemClock::new())
}

pub fn stream_run_with_clock<B, C>(
    backend: Arc<B>,
    thread_id: impl Into<String>,
    config: StreamConfig,
    clock: C,
) -> StreamHandle
where
    B: AssistantBackend,
    C: Clock,
{
    let (poller, events) = RunPoller::new(backend, thread_id, config, clock);
    let active = poller.active_flag();
    tokio::spawn(drive_poller(poller));
    StreamHandle {
        events,
        active,
        cancelled: false,
    }
}

async fn drive_poller<B, C>(poller: RunPoller<B, C>)
where
    B: AssistantBackend,
    C: Clock,
{
    let period = poller.config().tick_interval.max(Duration::from_millis(1));
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    // The first tick completes immediately.
    while poller.is_active() {
        ticker.tick().await;
        if !poller.is_active() {
            break;
        }
        poller.poll().await;
    }
    tracing::debug!(thread_id = poller.thread_id(), phase = ?poller.phase(), "stream driver stopped");
}

/// Consumer side of a running stream. Dropping it cancels the stream.
#[derive(Debug)]
pub struct StreamHandle {
    events: mpsc::UnboundedReceiver<StreamEvent>,
    active: Arc<AtomicBool>,
    cancelled: bool,
}

impl StreamHandle {
    /// Next event, or `None` once the stream has ended or was cancelled.
    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        if self.cancelled {
            return None;
        }
        self.events.recv().await
    }

    /// Feeds every remaining event to `observer` until the stream ends.
    pub async fn drive<O: StreamObserver + ?Sized>(&mut self, observer: &mut O) {
        while let Some(event) = self.next_event().await {
            event.dispatch(observer);
        }
    }

    /// Stops polling; buffered and in-flight events are discarded.
    pub fn cancel(&mut self) {
        self.cancelled = true;
        self.active.store(false, Ordering::SeqCst);
        self.events.close();
    }

    /// False once the stream finished on its own or was cancelled.
    pub fn is_active(&self) -> bool {
        !self.cancelled && self.active.load(Ordering::SeqCst)
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.active.store(false, Ordering::SeqCst);
    }
}
