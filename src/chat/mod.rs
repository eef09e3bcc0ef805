//! Interactive chat over a streaming channel.
//!
//! This module provides the session that ties a [`Channel`](crate::Channel)
//! to a [`MessageList`](crate::MessageList), plus the pieces the terminal
//! front end needs:
//!
//! - [`config`]: CLI argument parsing and configuration
//! - [`session`]: submission, frame handling, transcripts, and stats
//! - [`commands`]: slash command parsing

mod commands;
mod config;
mod session;

pub use commands::{ChatCommand, help_text, parse_command};
pub use config::{ChatArgs, ChatConfig};
pub use session::{ChatSession, SessionStats, SubmitOutcome, UNAVAILABLE_MESSAGE};
