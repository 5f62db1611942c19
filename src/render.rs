//! Output rendering for the chat application.
//!
//! This module provides a trait-based rendering abstraction so the same
//! front-end logic can write styled or plain output. [`TranscriptView`]
//! turns session snapshots into incremental renderer calls.

use std::io::{self, Stdout, Write};

use crate::chat::SessionSnapshot;
use crate::types::{ChatMessage, Memory, Role};

/// ANSI escape code for dim text (used for informational lines).
const ANSI_DIM: &str = "\x1b[2m";

/// ANSI escape code for bold text (used for speaker labels).
const ANSI_BOLD: &str = "\x1b[1m";

/// ANSI escape code to reset all styling.
const ANSI_RESET: &str = "\x1b[0m";

/// ANSI escape code for cyan text (used for the assistant label).
const ANSI_CYAN: &str = "\x1b[36m";

/// ANSI escape code for green text (used for the user label).
const ANSI_GREEN: &str = "\x1b[32m";

/// ANSI escape code for red text (used for errors).
const ANSI_RED: &str = "\x1b[31m";

/// ANSI escape code for yellow text (used for memories).
const ANSI_YELLOW: &str = "\x1b[33m";

/// Trait for rendering chat output.
pub trait Renderer: Send {
    /// Print one conversation message.
    fn print_message(&mut self, message: &ChatMessage);

    /// Print a remembered fact.
    fn print_memory(&mut self, memory: &Memory);

    /// Print an error message.
    fn print_error(&mut self, error: &str);

    /// Print an informational message.
    fn print_info(&mut self, info: &str);
}

/// Plain text renderer with optional ANSI styling.
pub struct PlainTextRenderer {
    stdout: Stdout,
    use_color: bool,
}

impl PlainTextRenderer {
    /// Creates a new renderer with ANSI colors enabled.
    pub fn new() -> Self {
        Self::with_color(true)
    }

    /// Creates a new renderer with the given color setting.
    pub fn with_color(use_color: bool) -> Self {
        Self {
            stdout: io::stdout(),
            use_color,
        }
    }

    fn styled(&self, style: &str, text: &str) -> String {
        if self.use_color {
            format!("{style}{text}{ANSI_RESET}")
        } else {
            text.to_string()
        }
    }
}

impl Default for PlainTextRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for PlainTextRenderer {
    fn print_message(&mut self, message: &ChatMessage) {
        let label = match message.role {
            Role::User => self.styled(&format!("{ANSI_BOLD}{ANSI_GREEN}"), "You:"),
            Role::Assistant => self.styled(&format!("{ANSI_BOLD}{ANSI_CYAN}"), "Assistant:"),
        };
        let _ = writeln!(self.stdout, "{label} {}", message.content);
        let _ = self.stdout.flush();
    }

    fn print_memory(&mut self, memory: &Memory) {
        let when = memory
            .created_at
            .map(|t| format!(" ({})", t.date()))
            .unwrap_or_default();
        let line = self.styled(ANSI_YELLOW, &format!("  - {}{when}", memory.memory));
        let _ = writeln!(self.stdout, "{line}");
    }

    fn print_error(&mut self, error: &str) {
        let line = self.styled(ANSI_RED, &format!("Error: {error}"));
        let _ = writeln!(self.stdout, "{line}");
        let _ = self.stdout.flush();
    }

    fn print_info(&mut self, info: &str) {
        let line = self.styled(ANSI_DIM, info);
        let _ = writeln!(self.stdout, "{line}");
        let _ = self.stdout.flush();
    }
}

/// Tracks how much of a conversation has been drawn.
///
/// Feed it every snapshot the session publishes; it renders only the
/// messages not drawn yet and starts over when the session id changes.
#[derive(Debug, Default)]
pub struct TranscriptView {
    session_id: Option<String>,
    rendered: usize,
    error_shown: bool,
    echoed: Option<String>,
}

impl TranscriptView {
    /// Creates a view that has drawn nothing yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Notes that the terminal already shows `text` as typed by the user.
    ///
    /// The next user message with exactly this content is not drawn again.
    pub fn echoed(&mut self, text: impl Into<String>) {
        self.echoed = Some(text.into());
    }

    /// Renders whatever changed since the previous snapshot.
    pub fn refresh(&mut self, snapshot: &SessionSnapshot, renderer: &mut dyn Renderer) {
        if snapshot.session_id != self.session_id {
            self.session_id = snapshot.session_id.clone();
            self.rendered = 0;
            self.error_shown = false;
            self.echoed = None;
        }
        for message in snapshot.messages.iter().skip(self.rendered) {
            let echoed = self.echoed.as_deref() == Some(message.content.as_str());
            if message.role == Role::User && echoed {
                self.echoed = None;
                continue;
            }
            renderer.print_message(message);
        }
        self.rendered = snapshot.messages.len();

        match (&snapshot.error, self.error_shown) {
            (Some(err), false) => {
                renderer.print_error(&format!("Failed to get response. {err}"));
                self.error_shown = true;
            }
            (None, true) => self.error_shown = false,
            _ => {}
        }
    }
}
