//! Command-line front end for the Coddle assistant.

pub mod chat;
pub mod cli;

pub use chat::{ChatError, ChatSession};
pub use cli::{parse_args, ChatMode, CliCommand, USAGE};

/// Answer the mock backend gives in offline mode.
pub const OFFLINE_REPLY: &str =
    "This is an offline reply from the mock assistant. Set CODDLE_BACKEND=http to reach the hosted assistant.";
