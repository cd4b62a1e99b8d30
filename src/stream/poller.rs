use std::cmp::Reverse;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use assistant_api::retry::{INITIAL_POLL_BACKOFF, MAX_POLL_BACKOFF};
use assistant_api::{
    extract_content, ApiError, AssistantBackend, RateLimitBackoff, Run, RunStatus,
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::events::{ContentChunk, StreamEvent};
use crate::clock::Clock;
use crate::error::StreamError;

/// Default nominal period between poll cycles.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(2);
/// Interim assistant message that is never surfaced as content.
pub const THINKING_PLACEHOLDER: &str = "Thinking...";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    pub tick_interval: Duration,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub thinking_placeholder: String,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            tick_interval: DEFAULT_TICK_INTERVAL,
            initial_backoff: INITIAL_POLL_BACKOFF,
            max_backoff: MAX_POLL_BACKOFF,
            thinking_placeholder: THINKING_PLACEHOLDER.to_string(),
        }
    }
}

impl StreamConfig {
    #[must_use]
    pub fn with_tick_interval(mut self, tick_interval: Duration) -> Self {
        self.tick_interval = tick_interval;
        self
    }

    #[must_use]
    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max;
        self
    }
}

/// Where the controller is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollPhase {
    DiscoveringRun,
    PollingStatus,
    Completed,
    /// Ended in a non-success status after content had already arrived.
    FailedWithContent,
    FailedNoContent,
    Cancelled,
}

impl PollPhase {
    pub fn is_finished(self) -> bool {
        !matches!(self, Self::DiscoveringRun | Self::PollingStatus)
    }
}

/// What a single `poll()` call did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Cancelled or already finished; nothing was requested.
    Inactive,
    /// Less than the current backoff has passed since the last cycle.
    Throttled,
    /// Another cycle is still discovering the run.
    DiscoveryInFlight,
    RunDiscovered { run_id: String, reused: bool },
    /// A 429 was absorbed; the cycle was skipped.
    RateLimited { backoff: Duration },
    Polled { status: RunStatus, chunks: usize },
    /// The run status could not be fetched; an error event was emitted.
    StatusError,
    Finished(PollPhase),
}

#[derive(Debug)]
struct PollState {
    phase: PollPhase,
    run_id: Option<String>,
    backoff: RateLimitBackoff,
    last_poll: Option<Duration>,
    last_status: Option<RunStatus>,
    /// `created_at` of the last emitted assistant message.
    watermark: Option<i64>,
    /// Ids of emitted messages, or their content when the id is blank.
    delivered: HashSet<String>,
    last_content: Option<String>,
    chunks_emitted: usize,
    started_at: Duration,
    status_checks: u64,
}

/// Releases the discovery latch even if the cycle's future is dropped.
struct DiscoveryLatch<'a>(&'a AtomicBool);

impl<'a> DiscoveryLatch<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for DiscoveryLatch<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Polling state machine for one thread's run.
///
/// Each [`poll`](Self::poll) call performs at most one cycle: a rate gate,
/// then either run discovery or a status check followed by a scan for new
/// assistant messages. Events go to the channel returned by
/// [`new`](Self::new) and stop the moment the poller is cancelled or
/// finishes, even if a request that was already in flight resolves later.
pub struct RunPoller<B, C> {
    backend: Arc<B>,
    clock: C,
    thread_id: String,
    config: StreamConfig,
    events: mpsc::UnboundedSender<StreamEvent>,
    active: Arc<AtomicBool>,
    discovering: AtomicBool,
    state: Mutex<PollState>,
}

impl<B, C> RunPoller<B, C>
where
    B: AssistantBackend,
    C: Clock,
{
    pub fn new(
        backend: Arc<B>,
        thread_id: impl Into<String>,
        config: StreamConfig,
        clock: C,
    ) -> (Self, mpsc::UnboundedReceiver<StreamEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let state = PollState {
            phase: PollPhase::DiscoveringRun,
            run_id: None,
            backoff: RateLimitBackoff::new(config.initial_backoff, config.max_backoff),
            last_poll: None,
            last_status: None,
            watermark: None,
            delivered: HashSet::new(),
            last_content: None,
            chunks_emitted: 0,
            started_at: clock.now(),
            status_checks: 0,
        };
        let poller = Self {
            backend,
            clock,
            thread_id: thread_id.into(),
            config,
            events,
            active: Arc::new(AtomicBool::new(true)),
            discovering: AtomicBool::new(false),
            state: Mutex::new(state),
        };
        (poller, receiver)
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Flag shared with stream handles; storing `false` cancels the poller.
    pub fn active_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.active)
    }

    pub fn phase(&self) -> PollPhase {
        let state = lock_unpoisoned(&self.state);
        if !self.is_active() && !state.phase.is_finished() {
            return PollPhase::Cancelled;
        }
        state.phase
    }

    pub fn current_backoff(&self) -> Duration {
        lock_unpoisoned(&self.state).backoff.current()
    }

    pub fn run_id(&self) -> Option<String> {
        lock_unpoisoned(&self.state).run_id.clone()
    }

    /// Successful status fetches so far.
    pub fn status_checks(&self) -> u64 {
        lock_unpoisoned(&self.state).status_checks
    }

    /// Stops the poller; no further events are emitted.
    pub fn cancel(&self) {
        self.active.store(false, Ordering::SeqCst);
        let mut state = lock_unpoisoned(&self.state);
        if !state.phase.is_finished() {
            state.phase = PollPhase::Cancelled;
            debug!(thread_id = %self.thread_id, "stream cancelled");
        }
    }

    /// Runs one poll cycle.
    pub async fn poll(&self) -> PollOutcome {
        if !self.is_active() {
            return PollOutcome::Inactive;
        }

        let run_id = {
            let mut state = lock_unpoisoned(&self.state);
            let now = self.clock.now();
            if let Some(last) = state.last_poll {
                if now.saturating_sub(last) < state.backoff.current() {
                    return PollOutcome::Throttled;
                }
            }
            state.last_poll = Some(now);
            state.run_id.clone()
        };

        match run_id {
            None => self.discover_run().await,
            Some(run_id) => self.check_run(&run_id).await,
        }
    }

    async fn discover_run(&self) -> PollOutcome {
        let Some(_latch) = DiscoveryLatch::acquire(&self.discovering) else {
            return PollOutcome::DiscoveryInFlight;
        };

        match self.find_or_create_run().await {
            Ok((run_id, reused)) => {
                if !self.is_active() {
                    return PollOutcome::Inactive;
                }
                {
                    let mut state = lock_unpoisoned(&self.state);
                    state.run_id = Some(run_id.clone());
                    state.phase = PollPhase::PollingStatus;
                }
                info!(thread_id = %self.thread_id, %run_id, reused, "stream attached to run");
                self.emit(StreamEvent::RunCreated {
                    run_id: run_id.clone(),
                    reused,
                });
                PollOutcome::RunDiscovered { run_id, reused }
            }
            Err(error) if error.is_rate_limited() => self.back_off(),
            Err(error) => {
                warn!(thread_id = %self.thread_id, %error, "run discovery failed");
                self.finish(
                    PollPhase::FailedNoContent,
                    [StreamEvent::Error(error.into()), StreamEvent::Done],
                )
            }
        }
    }

    /// Adopts a queued or in-progress run when there is one.
    async fn find_or_create_run(&self) -> Result<(String, bool), ApiError> {
        let runs = self.backend.list_runs(&self.thread_id).await?;
        if let Some(run) = runs.into_iter().find(|run| run.status.is_active()) {
            return Ok((run.id, true));
        }
        let run = self.backend.create_run(&self.thread_id).await?;
        Ok((run.id, false))
    }

    async fn check_run(&self, run_id: &str) -> PollOutcome {
        let run = match self.backend.get_run_status(&self.thread_id, run_id).await {
            Ok(run) => run,
            Err(error) if error.is_rate_limited() => return self.back_off(),
            Err(error) => {
                warn!(thread_id = %self.thread_id, run_id, %error, "run status check failed");
                self.emit(StreamEvent::Error(error.into()));
                return PollOutcome::StatusError;
            }
        };
        if !self.is_active() {
            return PollOutcome::Inactive;
        }

        let changed = {
            let mut state = lock_unpoisoned(&self.state);
            state.status_checks += 1;
            if state.last_status.as_ref() == Some(&run.status) {
                false
            } else {
                state.last_status = Some(run.status.clone());
                true
            }
        };
        if changed {
            debug!(thread_id = %self.thread_id, run_id, status = %run.status, "run status changed");
            self.emit(StreamEvent::StatusChanged {
                status: run.status.clone(),
            });
        }

        let mut chunks = self.check_for_new_messages().await;
        if run.status.is_terminal() {
            if run.status == RunStatus::Completed {
                chunks += self.check_for_new_messages().await;
            }
            debug!(thread_id = %self.thread_id, run_id, chunks, "final poll cycle");
            return self.finish_run(run);
        }

        PollOutcome::Polled {
            status: run.status,
            chunks,
        }
    }

    /// Emits new assistant content in creation order and returns how many
    /// chunks went out. Fetch failures are logged and skipped.
    async fn check_for_new_messages(&self) -> usize {
        let messages = match self.backend.get_thread_messages(&self.thread_id).await {
            Ok(messages) => messages,
            Err(error) => {
                if error.is_rate_limited() {
                    self.escalate_backoff();
                } else {
                    warn!(thread_id = %self.thread_id, %error, "message check failed");
                }
                return 0;
            }
        };
        if !self.is_active() {
            return 0;
        }

        // The store lists newest first, so ties on `created_at` fall back to
        // reverse arrival order.
        let mut assistant: Vec<_> = messages
            .into_iter()
            .enumerate()
            .filter(|(_, message)| message.is_assistant())
            .collect();
        assistant.sort_by_key(|(index, message)| (message.created_at, Reverse(*index)));

        let chunks = {
            let mut state = lock_unpoisoned(&self.state);
            let now = self.clock.now();
            let mut chunks = Vec::new();
            for (_, message) in assistant {
                if state
                    .watermark
                    .is_some_and(|watermark| message.created_at < watermark)
                {
                    continue;
                }
                if !message.id.is_empty() && state.delivered.contains(&message.id) {
                    continue;
                }
                let content = extract_content(&message);
                if content.trim() == self.config.thinking_placeholder {
                    continue;
                }
                if content.is_empty() || state.last_content.as_deref() == Some(content.as_str()) {
                    continue;
                }
                let key = if message.id.is_empty() {
                    content.clone()
                } else {
                    message.id.clone()
                };
                if !state.delivered.insert(key) {
                    continue;
                }

                let is_first = state.chunks_emitted == 0;
                let time_to_first_response =
                    is_first.then(|| now.saturating_sub(state.started_at));
                if let Some(elapsed) = time_to_first_response {
                    info!(thread_id = %self.thread_id, elapsed_ms = elapsed.as_millis() as u64, "first response received");
                }
                state.chunks_emitted += 1;
                state.watermark = Some(message.created_at);
                state.last_content = Some(content.clone());
                chunks.push(ContentChunk {
                    content,
                    is_first,
                    time_to_first_response,
                });
            }
            chunks
        };

        let count = chunks.len();
        for chunk in chunks {
            self.emit(StreamEvent::Chunk(chunk));
        }
        count
    }

    fn finish_run(&self, run: Run) -> PollOutcome {
        let received_content = lock_unpoisoned(&self.state).chunks_emitted > 0;
        if run.status == RunStatus::Completed || received_content {
            let phase = if run.status == RunStatus::Completed {
                PollPhase::Completed
            } else {
                PollPhase::FailedWithContent
            };
            return self.finish(phase, [StreamEvent::Completed { run }, StreamEvent::Done]);
        }

        warn!(thread_id = %self.thread_id, run_id = %run.id, status = %run.status, "run ended without content");
        let error = StreamError::RunFailed {
            run_id: run.id,
            status: run.status,
        };
        self.finish(
            PollPhase::FailedNoContent,
            [StreamEvent::Error(error), StreamEvent::Done],
        )
    }

    fn finish<const N: usize>(&self, phase: PollPhase, events: [StreamEvent; N]) -> PollOutcome {
        for event in events {
            self.emit(event);
        }
        if !self.is_active() {
            return PollOutcome::Inactive;
        }

        lock_unpoisoned(&self.state).phase = phase;
        self.active.store(false, Ordering::SeqCst);
        PollOutcome::Finished(phase)
    }

    fn back_off(&self) -> PollOutcome {
        PollOutcome::RateLimited {
            backoff: self.escalate_backoff(),
        }
    }

    fn escalate_backoff(&self) -> Duration {
        let backoff = lock_unpoisoned(&self.state).backoff.escalate();
        debug!(thread_id = %self.thread_id, backoff_ms = backoff.as_millis() as u64, "rate limited, backing off");
        backoff
    }

    fn emit(&self, event: StreamEvent) -> bool {
        if !self.is_active() {
            return false;
        }
        // A dropped receiver only means nobody is listening any more.
        self.events.send(event).is_ok()
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
