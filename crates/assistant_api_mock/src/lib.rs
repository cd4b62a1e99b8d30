//! Deterministic in-memory implementation of the `assistant_api` backend
//! contract.
//!
//! This crate contains no transport logic and is intended for local runs of
//! the chat binary and for scripting stream/wait scenarios in tests.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use assistant_api::backend::require_id;
use assistant_api::{
    ApiError, AssistantBackend, Message, MessageContent, MessageRole, Run, RunStatus, StatusCode,
    Thread,
};
use serde_json::json;
use tracing::debug;

/// Unix milliseconds the mock's own timestamps count up from, one second per
/// message it creates.
pub const MOCK_EPOCH: i64 = 1_700_000_000_000;

/// Backend operations a failure or call count can be attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    CreateThread,
    SendMessage,
    CreateRun,
    ListRuns,
    GetRunStatus,
    GetThreadMessages,
}

#[derive(Debug)]
struct MockRun {
    run: Run,
    /// Statuses still to be reported; the last one sticks.
    pending: VecDeque<RunStatus>,
    replied: bool,
}

impl MockRun {
    fn new(thread_id: &str, run_id: String, mut script: VecDeque<RunStatus>) -> Self {
        if script.is_empty() {
            script.push_back(RunStatus::Queued);
        }
        let status = script.front().cloned().unwrap_or(RunStatus::Queued);
        Self {
            run: Run {
                id: run_id,
                thread_id: Some(thread_id.to_string()),
                status,
            },
            pending: script,
            replied: false,
        }
    }

    fn advance(&mut self) -> &Run {
        if self.pending.len() > 1 {
            self.pending.pop_front();
        }
        if let Some(status) = self.pending.front() {
            self.run.status = status.clone();
        }
        &self.run
    }
}

#[derive(Debug, Default)]
struct MockThread {
    messages: Vec<Message>,
    runs: Vec<MockRun>,
}

#[derive(Debug, Default)]
struct MockState {
    next_thread: u64,
    next_run: u64,
    next_message: u64,
    clock: i64,
    threads: BTreeMap<String, MockThread>,
    scripts: VecDeque<Vec<RunStatus>>,
    failures: HashMap<Operation, VecDeque<ApiError>>,
    calls: HashMap<Operation, usize>,
}

impl MockState {
    fn begin(&mut self, operation: Operation) -> Result<(), ApiError> {
        *self.calls.entry(operation).or_default() += 1;
        match self
            .failures
            .get_mut(&operation)
            .and_then(VecDeque::pop_front)
        {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn thread_mut(&mut self, thread_id: &str) -> Result<&mut MockThread, ApiError> {
        self.threads
            .get_mut(thread_id)
            .ok_or_else(|| missing_thread(thread_id))
    }

    fn next_message_id(&mut self) -> String {
        self.next_message += 1;
        format!("msg_{}", self.next_message)
    }

    fn tick(&mut self) -> i64 {
        self.clock += 1;
        MOCK_EPOCH + self.clock * 1000
    }
}

/// Scriptable backend double shared by tests and the chat binary's offline
/// mode.
#[derive(Debug, Default)]
pub struct MockAssistantBackend {
    state: Mutex<MockState>,
    list_runs_delay: Duration,
    auto_reply: Option<String>,
}

impl MockAssistantBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every `list_runs` response, outside of any lock.
    #[must_use]
    pub fn with_list_runs_delay(mut self, delay: Duration) -> Self {
        self.list_runs_delay = delay;
        self
    }

    /// Every run walks queued → in_progress → completed and leaves `text` as
    /// the assistant's answer once it completes.
    #[must_use]
    pub fn with_auto_reply(mut self, text: impl Into<String>) -> Self {
        self.auto_reply = Some(text.into());
        self
    }

    /// Registers a thread directly, bypassing `create_thread`.
    pub fn insert_thread(&self, thread_id: &str) {
        lock_unpoisoned(&self.state)
            .threads
            .entry(thread_id.to_string())
            .or_default();
    }

    /// Status sequence for the next run `create_run` starts.
    pub fn script_next_run(&self, statuses: Vec<RunStatus>) {
        lock_unpoisoned(&self.state).scripts.push_back(statuses);
    }

    /// Adds a run that already exists when the caller starts polling.
    pub fn insert_run(&self, thread_id: &str, run_id: &str, statuses: Vec<RunStatus>) {
        let mut state = lock_unpoisoned(&self.state);
        let thread = state.threads.entry(thread_id.to_string()).or_default();
        thread
            .runs
            .push(MockRun::new(thread_id, run_id.to_string(), statuses.into()));
    }

    /// Pins a run to `status` from now on. Returns `false` for unknown runs.
    pub fn set_run_status(&self, thread_id: &str, run_id: &str, status: RunStatus) -> bool {
        let mut state = lock_unpoisoned(&self.state);
        let Some(run) = state
            .threads
            .get_mut(thread_id)
            .and_then(|thread| thread.runs.iter_mut().find(|run| run.run.id == run_id))
        else {
            return false;
        };
        run.pending = VecDeque::from([status.clone()]);
        run.run.status = status;
        true
    }

    pub fn push_message(&self, thread_id: &str, message: Message) {
        lock_unpoisoned(&self.state)
            .threads
            .entry(thread_id.to_string())
            .or_default()
            .messages
            .push(message);
    }

    /// Appends an assistant text message and returns its generated id.
    pub fn push_assistant_text(&self, thread_id: &str, text: &str, created_at: i64) -> String {
        let mut state = lock_unpoisoned(&self.state);
        let id = state.next_message_id();
        state
            .threads
            .entry(thread_id.to_string())
            .or_default()
            .messages
            .push(Message::assistant_text(id.clone(), text, created_at));
        id
    }

    /// The next call of `operation` fails with `error`. Queued failures are
    /// consumed in order.
    pub fn fail_next(&self, operation: Operation, error: ApiError) {
        lock_unpoisoned(&self.state)
            .failures
            .entry(operation)
            .or_default()
            .push_back(error);
    }

    /// Calls of `operation` so far, including failed ones.
    pub fn call_count(&self, operation: Operation) -> usize {
        lock_unpoisoned(&self.state)
            .calls
            .get(&operation)
            .copied()
            .unwrap_or_default()
    }

    pub fn run_count(&self, thread_id: &str) -> usize {
        lock_unpoisoned(&self.state)
            .threads
            .get(thread_id)
            .map_or(0, |thread| thread.runs.len())
    }

    fn default_script(&self) -> Vec<RunStatus> {
        if self.auto_reply.is_some() {
            vec![RunStatus::Queued, RunStatus::InProgress, RunStatus::Completed]
        } else {
            vec![RunStatus::Queued]
        }
    }

    fn record_status(&self, thread_id: &str, run_id: &str) -> Result<Run, ApiError> {
        let mut state = lock_unpoisoned(&self.state);
        state.begin(Operation::GetRunStatus)?;
        let thread = state.thread_mut(thread_id)?;
        let run = thread
            .runs
            .iter_mut()
            .find(|run| run.run.id == run_id)
            .ok_or_else(|| {
                ApiError::status(StatusCode::NOT_FOUND, format!("Run {run_id} not found"))
            })?;
        let snapshot = run.advance().clone();

        let reply_due = snapshot.status == RunStatus::Completed && !run.replied;
        if reply_due {
            run.replied = true;
        }
        if let (true, Some(text)) = (reply_due, self.auto_reply.as_deref()) {
            let created_at = state.tick();
            let id = state.next_message_id();
            state
                .thread_mut(thread_id)?
                .messages
                .push(Message::assistant_text(id, text, created_at));
        }
        Ok(snapshot)
    }
}

impl AssistantBackend for MockAssistantBackend {
    async fn create_thread(&self, parent_id: &str, child_id: &str) -> Result<Thread, ApiError> {
        let mut state = lock_unpoisoned(&self.state);
        state.begin(Operation::CreateThread)?;
        state.next_thread += 1;
        let id = format!("thread_{}", state.next_thread);
        state.threads.insert(id.clone(), MockThread::default());
        debug!(thread_id = %id, "mock thread created");
        Ok(Thread {
            id,
            metadata: Some(json!({"parentId": parent_id, "childId": child_id})),
        })
    }

    async fn send_thread_message(&self, thread_id: &str, content: &str) -> Result<Message, ApiError> {
        require_id("thread id", thread_id)?;
        if content.trim().is_empty() {
            return Err(ApiError::InvalidRequest(
                "message content must not be empty".to_string(),
            ));
        }

        let mut state = lock_unpoisoned(&self.state);
        state.begin(Operation::SendMessage)?;
        state.thread_mut(thread_id)?;
        let created_at = state.tick();
        let id = state.next_message_id();
        let message = Message::new(
            id,
            MessageRole::User,
            MessageContent::text_block(content),
            created_at,
        );
        state.thread_mut(thread_id)?.messages.push(message.clone());
        Ok(message)
    }

    async fn create_run(&self, thread_id: &str) -> Result<Run, ApiError> {
        require_id("thread id", thread_id)?;
        let default_script = self.default_script();

        let mut state = lock_unpoisoned(&self.state);
        state.begin(Operation::CreateRun)?;
        if !state.threads.contains_key(thread_id) {
            return Err(ApiError::ThreadNotFound {
                thread_id: thread_id.to_string(),
            });
        }
        let script = state.scripts.pop_front().unwrap_or(default_script);
        state.next_run += 1;
        let run_id = format!("run_{}", state.next_run);

        let thread = state.thread_mut(thread_id)?;
        let run = MockRun::new(thread_id, run_id, script.into());
        let snapshot = run.run.clone();
        thread.runs.push(run);
        debug!(thread_id, run_id = %snapshot.id, "mock run created");
        Ok(snapshot)
    }

    async fn list_runs(&self, thread_id: &str) -> Result<Vec<Run>, ApiError> {
        require_id("thread id", thread_id)?;
        if !self.list_runs_delay.is_zero() {
            tokio::time::sleep(self.list_runs_delay).await;
        }

        let mut state = lock_unpoisoned(&self.state);
        state.begin(Operation::ListRuns)?;
        let thread = state.thread_mut(thread_id)?;
        Ok(thread.runs.iter().map(|run| run.run.clone()).collect())
    }

    async fn get_run_status(&self, thread_id: &str, run_id: &str) -> Result<Run, ApiError> {
        require_id("thread id", thread_id)?;
        require_id("run id", run_id)?;
        self.record_status(thread_id, run_id)
    }

    async fn get_thread_messages(&self, thread_id: &str) -> Result<Vec<Message>, ApiError> {
        require_id("thread id", thread_id)?;
        let mut state = lock_unpoisoned(&self.state);
        state.begin(Operation::GetThreadMessages)?;
        let thread = state.thread_mut(thread_id)?;
        // Newest first, like the hosted store.
        Ok(thread.messages.iter().rev().cloned().collect())
    }
}

fn missing_thread(thread_id: &str) -> ApiError {
    ApiError::status(
        StatusCode::NOT_FOUND,
        format!("No thread found with id '{thread_id}'."),
    )
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
