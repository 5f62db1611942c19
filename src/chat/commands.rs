//! Slash command parsing for the chat application.
//!
//! This module handles parsing of special commands that start with `/`,
//! allowing users to control the session without sending messages to the
//! chat service.

/// A parsed chat command.
///
/// These commands control the session and are not sent as chat messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    /// Display help information.
    Help,

    /// Exit the chat application.
    Quit,

    /// Sign out and discard the conversation.
    Logout,

    /// Show the signed-in user and the current session id.
    WhoAmI,

    /// List the server-side sessions of the signed-in user.
    Sessions,

    /// Load the persisted history of the current session.
    History,

    /// Search memories, optionally with a result limit.
    Memories {
        /// The search query.
        query: String,
        /// Maximum number of results, if given.
        limit: Option<u32>,
    },

    /// Delete every memory of the signed-in user.
    Forget,

    /// Check service health.
    Health,

    /// Hide the error banner.
    Dismiss,

    /// Display session statistics.
    Stats,

    /// Report a parsing error back to the caller.
    Invalid(String),
}

/// Parses user input for slash commands.
///
/// Returns `Some(ChatCommand)` if the input is a command, or `None` if it
/// should be treated as a regular message.
///
/// # Examples
///
/// ```
/// # use memchat::chat::{ChatCommand, parse_command};
/// assert_eq!(parse_command("/quit"), Some(ChatCommand::Quit));
/// assert!(parse_command("/memories green tea").is_some());
/// assert!(parse_command("Hello there").is_none());
/// ```
pub fn parse_command(input: &str) -> Option<ChatCommand> {
    let input = input.trim();

    let rest = input.strip_prefix('/')?;
    let mut parts = rest.splitn(2, ' ');
    let command = parts.next()?.to_lowercase();
    let argument = parts.next().map(|s| s.trim()).filter(|s| !s.is_empty());

    let result = match command.as_str() {
        "help" | "?" => ChatCommand::Help,
        "quit" | "exit" | "q" => ChatCommand::Quit,
        "logout" | "signout" => ChatCommand::Logout,
        "whoami" => ChatCommand::WhoAmI,
        "sessions" => ChatCommand::Sessions,
        "history" => ChatCommand::History,
        "memories" | "recall" => parse_memories(argument),
        "forget" => ChatCommand::Forget,
        "health" => ChatCommand::Health,
        "dismiss" => ChatCommand::Dismiss,
        "stats" | "status" => ChatCommand::Stats,
        _ => ChatCommand::Invalid(format!("Unknown command: /{}", command)),
    };

    Some(result)
}

/// `/memories [--limit N] <query>`
fn parse_memories(argument: Option<&str>) -> ChatCommand {
    let Some(arg) = argument else {
        return ChatCommand::Invalid("/memories requires a search query".to_string());
    };

    let Some(rest) = arg.strip_prefix("--limit") else {
        return ChatCommand::Memories {
            query: arg.to_string(),
            limit: None,
        };
    };
    let mut parts = rest.trim_start().splitn(2, ' ');
    let limit = match parts.next().map(str::parse::<u32>) {
        Some(Ok(limit)) if limit > 0 => limit,
        _ => {
            return ChatCommand::Invalid(
                "/memories --limit expects a positive integer".to_string(),
            );
        }
    };
    match parts.next().map(str::trim).filter(|s| !s.is_empty()) {
        Some(query) => ChatCommand::Memories {
            query: query.to_string(),
            limit: Some(limit),
        },
        None => ChatCommand::Invalid("/memories requires a search query".to_string()),
    }
}

/// Returns help text for all available commands.
pub fn help_text() -> &'static str {
    r#"Available commands:
  /help, /?                  Show this help message
  /quit, /exit, /q           Exit the chat
  /logout                    Sign out and discard the conversation
  /whoami                    Show the signed-in user and session id
  /sessions                  List your stored sessions
  /history                   Load the stored history of this session
  /memories [--limit N] <q>  Search what the assistant remembers about you
  /forget                    Delete everything the assistant remembers about you
  /health                    Check the chat service
  /dismiss                   Hide the last error
  /stats                     Show session statistics

Anything else is sent as a message."#
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_not_a_command() {
        assert_eq!(parse_command("hello"), None);
        assert_eq!(parse_command("  what is 1/2?"), None);
    }

    #[test]
    fn simple_commands() {
        assert_eq!(parse_command("/help"), Some(ChatCommand::Help));
        assert_eq!(parse_command("/?"), Some(ChatCommand::Help));
        assert_eq!(parse_command("/EXIT"), Some(ChatCommand::Quit));
        assert_eq!(parse_command(" /logout "), Some(ChatCommand::Logout));
        assert_eq!(parse_command("/forget"), Some(ChatCommand::Forget));
        assert_eq!(parse_command("/health"), Some(ChatCommand::Health));
        assert_eq!(parse_command("/status"), Some(ChatCommand::Stats));
    }

    #[test]
    fn memories_command() {
        assert_eq!(
            parse_command("/memories green tea"),
            Some(ChatCommand::Memories {
                query: "green tea".to_string(),
                limit: None
            })
        );
        assert_eq!(
            parse_command("/memories --limit 5 green tea"),
            Some(ChatCommand::Memories {
                query: "green tea".to_string(),
                limit: Some(5)
            })
        );
        assert!(matches!(
            parse_command("/memories"),
            Some(ChatCommand::Invalid(_))
        ));
        assert!(matches!(
            parse_command("/memories --limit zero tea"),
            Some(ChatCommand::Invalid(_))
        ));
        assert!(matches!(
            parse_command("/memories --limit 3"),
            Some(ChatCommand::Invalid(_))
        ));
    }

    #[test]
    fn unknown_command() {
        assert_eq!(
            parse_command("/model gpt"),
            Some(ChatCommand::Invalid("Unknown command: /model".to_string()))
        );
    }
}
