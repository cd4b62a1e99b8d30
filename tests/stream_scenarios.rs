use std::sync::Arc;
use std::time::Duration;

use assistant_api::{ApiError, AssistantBackend, Message, RunStatus, StatusCode};
use assistant_api_mock::{MockAssistantBackend, Operation};
use coddle_assistant::{
    ContentChunk, ManualClock, PollOutcome, PollPhase, RunPoller, StreamConfig, StreamError,
    StreamEvent,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use tokio::sync::mpsc::UnboundedReceiver;

type Poller = RunPoller<MockAssistantBackend, ManualClock>;

async fn thread_with_greeting(backend: &MockAssistantBackend) -> String {
    let thread = backend.create_thread("parent123", "child123").await.expect("thread");
    backend
        .send_thread_message(&thread.id, "Hello")
        .await
        .expect("send");
    thread.id
}

fn poller_for(
    backend: &Arc<MockAssistantBackend>,
    thread_id: &str,
    config: StreamConfig,
    clock: &ManualClock,
) -> (Poller, UnboundedReceiver<StreamEvent>) {
    RunPoller::new(Arc::clone(backend), thread_id, config, clock.clone())
}

fn drain(events: &mut UnboundedReceiver<StreamEvent>) -> Vec<StreamEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

fn chunks(events: &[StreamEvent]) -> Vec<ContentChunk> {
    events
        .iter()
        .filter_map(|event| match event {
            StreamEvent::Chunk(chunk) => Some(chunk.clone()),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn hello_scenario_emits_one_chunk_then_completes() {
    let backend = Arc::new(MockAssistantBackend::new());
    let thread_id = thread_with_greeting(&backend).await;
    backend.script_next_run(vec![
        RunStatus::Queued,
        RunStatus::InProgress,
        RunStatus::InProgress,
        RunStatus::Completed,
    ]);
    let clock = ManualClock::new();
    let (poller, mut events) = poller_for(&backend, &thread_id, StreamConfig::default(), &clock);

    assert_eq!(
        poller.poll().await,
        PollOutcome::RunDiscovered {
            run_id: "run_1".to_string(),
            reused: false,
        }
    );
    assert!(matches!(
        drain(&mut events).as_slice(),
        [StreamEvent::RunCreated { run_id, reused: false }] if run_id == "run_1"
    ));

    clock.advance(Duration::from_secs(1));
    assert_eq!(
        poller.poll().await,
        PollOutcome::Polled {
            status: RunStatus::InProgress,
            chunks: 0,
        }
    );
    assert!(matches!(
        drain(&mut events).as_slice(),
        [StreamEvent::StatusChanged { status: RunStatus::InProgress }]
    ));

    backend.push_assistant_text(&thread_id, "Hi there", 1_800_000_000_000);
    clock.advance(Duration::from_secs(1));
    assert_eq!(
        poller.poll().await,
        PollOutcome::Polled {
            status: RunStatus::InProgress,
            chunks: 1,
        }
    );
    assert_eq!(
        chunks(&drain(&mut events)),
        vec![ContentChunk {
            content: "Hi there".to_string(),
            is_first: true,
            time_to_first_response: Some(Duration::from_secs(2)),
        }]
    );

    clock.advance(Duration::from_secs(1));
    assert_eq!(
        poller.poll().await,
        PollOutcome::Finished(PollPhase::Completed)
    );
    let tail = drain(&mut events);
    assert!(chunks(&tail).is_empty(), "no duplicate chunk: {tail:?}");
    assert!(matches!(
        tail.as_slice(),
        [
            StreamEvent::StatusChanged { status: RunStatus::Completed },
            StreamEvent::Completed { run },
            StreamEvent::Done,
        ] if run.id == "run_1"
    ));

    assert_eq!(poller.phase(), PollPhase::Completed);
    assert!(!poller.is_active());
    clock.advance(Duration::from_secs(5));
    assert_eq!(poller.poll().await, PollOutcome::Inactive);
    assert!(drain(&mut events).is_empty());
}

#[tokio::test]
async fn rate_gate_skips_cycles_inside_the_backoff_window() {
    let backend = Arc::new(MockAssistantBackend::new());
    let thread_id = thread_with_greeting(&backend).await;
    let clock = ManualClock::new();
    let (poller, _events) = poller_for(&backend, &thread_id, StreamConfig::default(), &clock);

    assert!(matches!(poller.poll().await, PollOutcome::RunDiscovered { .. }));
    assert_eq!(poller.poll().await, PollOutcome::Throttled);
    clock.advance(Duration::from_millis(999));
    assert_eq!(poller.poll().await, PollOutcome::Throttled);
    clock.advance(Duration::from_millis(1));
    assert!(matches!(poller.poll().await, PollOutcome::Polled { .. }));
    assert_eq!(backend.call_count(Operation::GetRunStatus), 1);
}

#[tokio::test]
async fn repeated_polls_do_not_re_emit_unchanged_content() {
    let backend = Arc::new(MockAssistantBackend::new());
    let thread_id = thread_with_greeting(&backend).await;
    backend.script_next_run(vec![RunStatus::InProgress]);
    let clock = ManualClock::new();
    let (poller, mut events) = poller_for(&backend, &thread_id, StreamConfig::default(), &clock);

    poller.poll().await;
    backend.push_assistant_text(&thread_id, "Try a warm bath.", 1_800_000_000_000);
    for _ in 0..4 {
        clock.advance(Duration::from_secs(1));
        poller.poll().await;
    }

    let emitted = drain(&mut events);
    assert_eq!(chunks(&emitted).len(), 1);
    let status_changes = emitted
        .iter()
        .filter(|event| matches!(event, StreamEvent::StatusChanged { .. }))
        .count();
    assert_eq!(status_changes, 1);
}

#[tokio::test]
async fn messages_emit_in_timestamp_order_with_timing_on_first_only() {
    let backend = Arc::new(MockAssistantBackend::new());
    let thread_id = thread_with_greeting(&backend).await;
    backend.script_next_run(vec![RunStatus::InProgress]);
    let clock = ManualClock::new();
    let (poller, mut events) = poller_for(&backend, &thread_id, StreamConfig::default(), &clock);
    poller.poll().await;

    backend.push_assistant_text(&thread_id, "third", 1_800_000_030_000);
    backend.push_assistant_text(&thread_id, "first", 1_800_000_010_000);
    backend.push_assistant_text(&thread_id, "second", 1_800_000_020_000);
    clock.advance(Duration::from_secs(3));
    poller.poll().await;

    backend.push_assistant_text(&thread_id, "fourth", 1_800_000_040_000);
    clock.advance(Duration::from_secs(1));
    poller.poll().await;

    let emitted = chunks(&drain(&mut events));
    let contents: Vec<_> = emitted.iter().map(|chunk| chunk.content.as_str()).collect();
    assert_eq!(contents, vec!["first", "second", "third", "fourth"]);
    assert_eq!(emitted[0].time_to_first_response, Some(Duration::from_secs(3)));
    assert!(emitted[0].is_first);
    assert!(emitted[1..]
        .iter()
        .all(|chunk| !chunk.is_first && chunk.time_to_first_response.is_none()));
}

fn assistant_message(id: &str, text: &str, created_at: serde_json::Value) -> Message {
    serde_json::from_value(json!({
        "id": id,
        "role": "assistant",
        "content": [{"type": "text", "text": {"value": text}}],
        "created_at": created_at,
    }))
    .expect("assistant message")
}

async fn emitted_contents(
    backend: &Arc<MockAssistantBackend>,
    thread_id: &str,
    polls: usize,
) -> Vec<String> {
    let clock = ManualClock::new();
    let (poller, mut events) = poller_for(backend, thread_id, StreamConfig::default(), &clock);
    poller.poll().await;
    for _ in 0..polls {
        clock.advance(Duration::from_secs(2));
        poller.poll().await;
    }
    chunks(&drain(&mut events))
        .into_iter()
        .map(|chunk| chunk.content)
        .collect()
}

#[tokio::test]
async fn messages_within_one_second_keep_their_order() {
    let backend = Arc::new(MockAssistantBackend::new());
    let thread_id = thread_with_greeting(&backend).await;
    backend.script_next_run(vec![RunStatus::InProgress]);
    backend.push_message(
        &thread_id,
        assistant_message("msg_a", "first part", json!(1_700_000_000.2)),
    );
    backend.push_message(
        &thread_id,
        assistant_message("msg_b", "second part", json!(1_700_000_000.7)),
    );
    backend.push_message(
        &thread_id,
        assistant_message("msg_c", "third part", json!("2023-11-14T22:13:21.100Z")),
    );
    backend.push_message(
        &thread_id,
        assistant_message("msg_d", "fourth part", json!("2023-11-14T22:13:21.900Z")),
    );

    assert_eq!(
        emitted_contents(&backend, &thread_id, 2).await,
        vec!["first part", "second part", "third part", "fourth part"]
    );
}

#[tokio::test]
async fn identical_timestamps_fall_back_to_arrival_order() {
    let backend = Arc::new(MockAssistantBackend::new());
    let thread_id = thread_with_greeting(&backend).await;
    backend.script_next_run(vec![RunStatus::InProgress]);
    backend.push_assistant_text(&thread_id, "earlier", 1_800_000_000_000);
    backend.push_assistant_text(&thread_id, "later", 1_800_000_000_000);

    assert_eq!(
        emitted_contents(&backend, &thread_id, 3).await,
        vec!["earlier", "later"]
    );
}

#[tokio::test]
async fn messages_without_timestamps_are_emitted_once() {
    let backend = Arc::new(MockAssistantBackend::new());
    let thread_id = thread_with_greeting(&backend).await;
    backend.script_next_run(vec![RunStatus::InProgress]);
    backend.push_message(&thread_id, assistant_message("msg_a", "one", json!(null)));
    backend.push_message(&thread_id, assistant_message("msg_b", "two", json!(null)));

    assert_eq!(
        emitted_contents(&backend, &thread_id, 3).await,
        vec!["one", "two"]
    );
}

#[tokio::test]
async fn anonymous_messages_are_emitted_once() {
    let backend = Arc::new(MockAssistantBackend::new());
    let thread_id = thread_with_greeting(&backend).await;
    backend.script_next_run(vec![RunStatus::InProgress]);
    backend.push_message(&thread_id, assistant_message("", "one", json!(null)));
    backend.push_message(&thread_id, assistant_message("", "two", json!(null)));

    let emitted = emitted_contents(&backend, &thread_id, 3).await;
    assert_eq!(emitted.len(), 2);
    assert!(emitted.contains(&"one".to_string()));
    assert!(emitted.contains(&"two".to_string()));
}

#[tokio::test]
async fn thinking_placeholder_is_never_surfaced() {
    let backend = Arc::new(MockAssistantBackend::new());
    let thread_id = thread_with_greeting(&backend).await;
    backend.script_next_run(vec![RunStatus::InProgress]);
    let clock = ManualClock::new();
    let (poller, mut events) = poller_for(&backend, &thread_id, StreamConfig::default(), &clock);
    poller.poll().await;

    backend.push_assistant_text(&thread_id, "Thinking...", 1_800_000_000_000);
    clock.advance(Duration::from_secs(1));
    assert!(matches!(
        poller.poll().await,
        PollOutcome::Polled { chunks: 0, .. }
    ));

    backend.push_assistant_text(&thread_id, "Most toddlers nap once a day.", 1_800_000_001_000);
    clock.advance(Duration::from_secs(1));
    poller.poll().await;

    let emitted = chunks(&drain(&mut events));
    assert_eq!(emitted.len(), 1);
    assert_eq!(emitted[0].content, "Most toddlers nap once a day.");
    assert!(emitted[0].is_first);
    assert_eq!(emitted[0].time_to_first_response, Some(Duration::from_secs(2)));
}

#[tokio::test]
async fn rate_limits_grow_backoff_to_cap_without_error_events() {
    let backend = Arc::new(MockAssistantBackend::new());
    let thread_id = thread_with_greeting(&backend).await;
    for _ in 0..4 {
        backend.fail_next(Operation::ListRuns, ApiError::rate_limited());
    }
    let clock = ManualClock::new();
    let (poller, mut events) = poller_for(&backend, &thread_id, StreamConfig::default(), &clock);

    let mut backoffs = Vec::new();
    for _ in 0..4 {
        match poller.poll().await {
            PollOutcome::RateLimited { backoff } => backoffs.push(backoff),
            other => panic!("expected a rate-limited cycle, got {other:?}"),
        }
        clock.advance(poller.current_backoff());
    }
    assert_eq!(
        backoffs,
        [2, 4, 5, 5].map(Duration::from_secs).to_vec()
    );
    assert!(drain(&mut events).is_empty());
    assert_eq!(poller.phase(), PollPhase::DiscoveringRun);

    assert!(matches!(poller.poll().await, PollOutcome::RunDiscovered { .. }));
    clock.advance(poller.current_backoff());

    backend.fail_next(Operation::GetRunStatus, ApiError::rate_limited());
    assert!(matches!(poller.poll().await, PollOutcome::RateLimited { .. }));
    assert_eq!(poller.current_backoff(), Duration::from_secs(5));
    assert!(matches!(
        drain(&mut events).as_slice(),
        [StreamEvent::RunCreated { .. }]
    ));
}

#[tokio::test]
async fn failed_run_after_content_soft_completes() {
    let backend = Arc::new(MockAssistantBackend::new());
    let thread_id = thread_with_greeting(&backend).await;
    backend.script_next_run(vec![
        RunStatus::Queued,
        RunStatus::InProgress,
        RunStatus::Failed,
    ]);
    let clock = ManualClock::new();
    let (poller, mut events) = poller_for(&backend, &thread_id, StreamConfig::default(), &clock);
    poller.poll().await;

    backend.push_assistant_text(&thread_id, "Partial answer", 1_800_000_000_000);
    clock.advance(Duration::from_secs(1));
    poller.poll().await;
    clock.advance(Duration::from_secs(1));
    assert_eq!(
        poller.poll().await,
        PollOutcome::Finished(PollPhase::FailedWithContent)
    );

    let emitted = drain(&mut events);
    assert!(!emitted
        .iter()
        .any(|event| matches!(event, StreamEvent::Error(_))));
    assert!(matches!(
        &emitted[emitted.len() - 2..],
        [StreamEvent::Completed { run }, StreamEvent::Done] if run.status == RunStatus::Failed
    ));
}

#[tokio::test]
async fn failed_run_without_content_reports_error() {
    let backend = Arc::new(MockAssistantBackend::new());
    let thread_id = thread_with_greeting(&backend).await;
    backend.script_next_run(vec![RunStatus::Queued, RunStatus::Failed]);
    let clock = ManualClock::new();
    let (poller, mut events) = poller_for(&backend, &thread_id, StreamConfig::default(), &clock);
    poller.poll().await;

    clock.advance(Duration::from_secs(1));
    assert_eq!(
        poller.poll().await,
        PollOutcome::Finished(PollPhase::FailedNoContent)
    );

    let emitted = drain(&mut events);
    assert!(!emitted
        .iter()
        .any(|event| matches!(event, StreamEvent::Completed { .. })));
    assert!(matches!(
        &emitted[emitted.len() - 2..],
        [
            StreamEvent::Error(StreamError::RunFailed { run_id, status: RunStatus::Failed }),
            StreamEvent::Done,
        ] if run_id == "run_1"
    ));
}

#[tokio::test]
async fn discovery_failure_ends_the_stream() {
    let backend = Arc::new(MockAssistantBackend::new());
    let thread_id = thread_with_greeting(&backend).await;
    backend.fail_next(
        Operation::CreateRun,
        ApiError::AssistantNotFound {
            assistant_id: "asst_missing".to_string(),
        },
    );
    let clock = ManualClock::new();
    let (poller, mut events) = poller_for(&backend, &thread_id, StreamConfig::default(), &clock);

    assert_eq!(
        poller.poll().await,
        PollOutcome::Finished(PollPhase::FailedNoContent)
    );
    assert!(matches!(
        drain(&mut events).as_slice(),
        [
            StreamEvent::Error(StreamError::Api(ApiError::AssistantNotFound { .. })),
            StreamEvent::Done,
        ]
    ));
    clock.advance(Duration::from_secs(10));
    assert_eq!(poller.poll().await, PollOutcome::Inactive);
}

#[tokio::test]
async fn status_errors_are_reported_but_polling_continues() {
    let backend = Arc::new(MockAssistantBackend::new());
    let thread_id = thread_with_greeting(&backend).await;
    backend.script_next_run(vec![RunStatus::InProgress]);
    let clock = ManualClock::new();
    let (poller, mut events) = poller_for(&backend, &thread_id, StreamConfig::default(), &clock);
    poller.poll().await;
    drain(&mut events);

    backend.fail_next(
        Operation::GetRunStatus,
        ApiError::status(StatusCode::INTERNAL_SERVER_ERROR, "database unavailable"),
    );
    clock.advance(Duration::from_secs(1));
    assert_eq!(poller.poll().await, PollOutcome::StatusError);
    assert!(matches!(
        drain(&mut events).as_slice(),
        [StreamEvent::Error(StreamError::Api(ApiError::Status { .. }))]
    ));
    assert!(poller.is_active());

    clock.advance(Duration::from_secs(1));
    assert!(matches!(poller.poll().await, PollOutcome::Polled { .. }));
}

#[tokio::test]
async fn message_fetch_failures_are_skipped_silently() {
    let backend = Arc::new(MockAssistantBackend::new());
    let thread_id = thread_with_greeting(&backend).await;
    backend.script_next_run(vec![RunStatus::InProgress]);
    backend.push_assistant_text(&thread_id, "Hi there", 1_800_000_000_000);
    let clock = ManualClock::new();
    let (poller, mut events) = poller_for(&backend, &thread_id, StreamConfig::default(), &clock);
    poller.poll().await;
    drain(&mut events);

    backend.fail_next(
        Operation::GetThreadMessages,
        ApiError::status(StatusCode::BAD_GATEWAY, "upstream"),
    );
    clock.advance(Duration::from_secs(1));
    assert_eq!(
        poller.poll().await,
        PollOutcome::Polled {
            status: RunStatus::InProgress,
            chunks: 0,
        }
    );

    clock.advance(Duration::from_secs(1));
    poller.poll().await;
    let emitted = drain(&mut events);
    assert!(!emitted
        .iter()
        .any(|event| matches!(event, StreamEvent::Error(_))));
    assert_eq!(chunks(&emitted).len(), 1);
}

#[tokio::test]
async fn active_run_is_adopted_instead_of_created() {
    let backend = Arc::new(MockAssistantBackend::new());
    let thread_id = thread_with_greeting(&backend).await;
    backend.insert_run(&thread_id, "run_existing", vec![RunStatus::InProgress]);
    let clock = ManualClock::new();
    let (poller, mut events) = poller_for(&backend, &thread_id, StreamConfig::default(), &clock);

    assert_eq!(
        poller.poll().await,
        PollOutcome::RunDiscovered {
            run_id: "run_existing".to_string(),
            reused: true,
        }
    );
    assert_eq!(backend.call_count(Operation::CreateRun), 0);
    assert_eq!(poller.run_id().as_deref(), Some("run_existing"));
    assert!(matches!(
        drain(&mut events).as_slice(),
        [StreamEvent::RunCreated { reused: true, .. }]
    ));
}

#[tokio::test]
async fn cancel_stops_all_further_events() {
    let backend = Arc::new(MockAssistantBackend::new());
    let thread_id = thread_with_greeting(&backend).await;
    backend.script_next_run(vec![RunStatus::InProgress]);
    backend.push_assistant_text(&thread_id, "Hi there", 1_800_000_000_000);
    let clock = ManualClock::new();
    let (poller, mut events) = poller_for(&backend, &thread_id, StreamConfig::default(), &clock);
    poller.poll().await;
    drain(&mut events);

    poller.cancel();
    clock.advance(Duration::from_secs(1));
    assert_eq!(poller.poll().await, PollOutcome::Inactive);
    assert!(drain(&mut events).is_empty());
    assert_eq!(poller.phase(), PollPhase::Cancelled);
    assert_eq!(backend.call_count(Operation::GetRunStatus), 0);
}

#[tokio::test(start_paused = true)]
async fn cancel_during_in_flight_discovery_drops_its_result() {
    let backend = Arc::new(
        MockAssistantBackend::new().with_list_runs_delay(Duration::from_secs(1)),
    );
    let thread_id = thread_with_greeting(&backend).await;
    let clock = ManualClock::new();
    let (poller, mut events) = poller_for(&backend, &thread_id, StreamConfig::default(), &clock);

    let (outcome, ()) = tokio::join!(poller.poll(), async {
        tokio::time::sleep(Duration::from_millis(500)).await;
        poller.cancel();
    });

    assert_eq!(outcome, PollOutcome::Inactive);
    assert!(drain(&mut events).is_empty());
    assert_eq!(poller.phase(), PollPhase::Cancelled);
}

#[tokio::test(start_paused = true)]
async fn overlapping_polls_start_only_one_discovery() {
    let backend = Arc::new(
        MockAssistantBackend::new().with_list_runs_delay(Duration::from_secs(1)),
    );
    let thread_id = thread_with_greeting(&backend).await;
    let clock = ManualClock::new();
    let config = StreamConfig::default().with_backoff(Duration::ZERO, Duration::from_secs(5));
    let (poller, mut events) = poller_for(&backend, &thread_id, config, &clock);

    let (first, second) = tokio::join!(poller.poll(), poller.poll());

    assert!(matches!(first, PollOutcome::RunDiscovered { .. }));
    assert_eq!(second, PollOutcome::DiscoveryInFlight);
    assert_eq!(backend.call_count(Operation::ListRuns), 1);
    assert_eq!(backend.call_count(Operation::CreateRun), 1);
    assert_eq!(backend.run_count(&thread_id), 1);
    assert_eq!(drain(&mut events).len(), 1);
}
