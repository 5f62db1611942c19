//! Chat application module for conversations with the memory-backed service.
//!
//! # Architecture
//!
//! - [`session`]: conversation state and the send state machine
//! - [`app`]: sign-in/sign-out glue between the auth provider and the session
//! - [`config`]: CLI argument parsing and configuration
//! - [`commands`]: slash command parsing

mod app;
mod commands;
mod config;
mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use crate::render::{PlainTextRenderer, Renderer, TranscriptView};
pub use app::ChatApp;
pub use commands::{ChatCommand, help_text, parse_command};
pub use config::{ChatArgs, ChatConfig};
pub use session::{
    ChatBackend, ChatSession, IgnoreReason, SendOutcome, SessionSnapshot, SessionState,
};
