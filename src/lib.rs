//! Streaming and send-and-wait chat flows over the Coddle assistant API.
//!
//! The hosted assistant exposes plain REST endpoints for threads, runs and
//! messages with no push channel. This crate turns those endpoints into
//! either an incremental event stream ([`stream::stream_run`]) or a single
//! displayable reply ([`wait::send_and_wait`]), both written against the
//! [`assistant_api::AssistantBackend`] trait so they run unchanged over HTTP
//! or against the in-memory mock.

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;
pub mod stream;
pub mod wait;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{BackendKind, EnvConfig};
pub use error::StreamError;
pub use logging::init_logging;
pub use stream::{
    stream_run, stream_run_with_clock, ContentChunk, PollOutcome, PollPhase, RunPoller,
    StreamConfig, StreamEvent, StreamHandle, StreamObserver,
};
pub use wait::{send_and_wait, ChatReply, RunWait, WaitPolicy};
