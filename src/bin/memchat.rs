//! Terminal front end for the memory-backed chat service.
//!
//! # Usage
//!
//! ```bash
//! # Uses MEMCHAT_API_URL, MEMCHAT_API_TOKEN, MEMCHAT_AUTH_URL, MEMCHAT_AUTH_KEY
//! memchat
//!
//! # Point at a different service
//! memchat --api-url http://localhost:8000 --auth-url https://project.supabase.co
//!
//! # Verbose request logging on stderr
//! RUST_LOG=memchat=debug memchat
//! ```
//!
//! Signed out, the prompt offers `login`, `signup` and `quit`. Signed in,
//! anything typed is sent as a message; `/help` lists the commands.

use std::sync::Arc;

use arrrg::CommandLine;
use dialoguer::Password;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing_subscriber::EnvFilter;

use memchat::chat::{
    ChatApp, ChatArgs, ChatCommand, ChatConfig, ChatSession, PlainTextRenderer, Renderer,
    SendOutcome, TranscriptView, help_text, parse_command,
};
use memchat::{MemChat, SignUpOutcome, SupabaseAuth};

type App = ChatApp<SupabaseAuth, MemChat>;

enum Flow {
    Continue,
    Quit,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let (args, _) = ChatArgs::from_command_line_relaxed("memchat [OPTIONS]");
    let config = ChatConfig::from(args);

    let auth = Arc::new(config.auth_provider()?);
    let client = config.client(auth.clone())?;
    let app = ChatApp::new(auth, ChatSession::new(client));
    let mut renderer = PlainTextRenderer::with_color(config.use_color);
    let mut rl = DefaultEditor::new()?;

    println!("Memory Chat");
    if let Some(user) = app.startup().await {
        renderer.print_info(&format!("Welcome back, {}.", user.display_name()));
    }

    let mut updates = app.session().subscribe();
    let mut view = TranscriptView::new();
    loop {
        let flow = if app.session().snapshot().is_authenticated() {
            chat_turn(&app, &mut rl, &mut renderer, &mut view).await
        } else {
            auth_turn(&app, &mut rl, &mut renderer).await
        };
        if updates.has_changed().unwrap_or(false) {
            let snapshot = updates.borrow_and_update().clone();
            view.refresh(&snapshot, &mut renderer);
        }
        if let Flow::Quit = flow {
            break;
        }
    }

    println!("Goodbye!");
    Ok(())
}

/// Reads one line and trims it.
fn read_line(rl: &mut DefaultEditor, prompt: &str) -> Option<String> {
    match rl.readline(prompt) {
        Ok(line) => Some(line.trim().to_string()),
        Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => None,
        Err(err) => {
            eprintln!("Input error: {err}");
            None
        }
    }
}

/// Reads a password without echo, kept exactly as typed.
fn read_password(confirm: bool) -> Option<String> {
    let mut prompt = Password::new().with_prompt("Password");
    if confirm {
        prompt = prompt.with_confirmation("Confirm password", "Passwords do not match.");
    }
    match prompt.interact() {
        Ok(password) => Some(password),
        Err(err) => {
            eprintln!("Input error: {err}");
            None
        }
    }
}

async fn auth_turn(app: &App, rl: &mut DefaultEditor, renderer: &mut dyn Renderer) -> Flow {
    let Some(choice) = read_line(rl, "[login/signup/quit] > ") else {
        return Flow::Quit;
    };
    match choice.to_lowercase().as_str() {
        "" => Flow::Continue,
        "quit" | "exit" | "q" => Flow::Quit,
        "login" | "l" => {
            let (Some(email), Some(password)) = (read_line(rl, "Email: "), read_password(false))
            else {
                return Flow::Continue;
            };
            match app.sign_in(&email, &password).await {
                Ok(user) => renderer.print_info(&format!(
                    "Signed in as {}. Type /help for commands.",
                    user.email
                )),
                Err(err) => renderer.print_error(&err.to_string()),
            }
            Flow::Continue
        }
        "signup" | "s" => {
            let (Some(full_name), Some(email), Some(password)) = (
                read_line(rl, "Full name: "),
                read_line(rl, "Email: "),
                read_password(true),
            ) else {
                return Flow::Continue;
            };
            match app.sign_up(&email, &password, &full_name).await {
                Ok(SignUpOutcome::ConfirmationRequired(_)) => renderer.print_info(
                    "Sign up successful! Please check your email to confirm your account.",
                ),
                Ok(SignUpOutcome::Confirmed(_)) => {
                    renderer.print_info("Sign up successful! You can log in now.")
                }
                Err(err) => renderer.print_error(&err.to_string()),
            }
            Flow::Continue
        }
        other => {
            renderer.print_error(&format!("unknown choice: {other}"));
            Flow::Continue
        }
    }
}

async fn chat_turn(
    app: &App,
    rl: &mut DefaultEditor,
    renderer: &mut dyn Renderer,
    view: &mut TranscriptView,
) -> Flow {
    let session = app.session();
    let Some(line) = read_line(rl, "You: ") else {
        return Flow::Quit;
    };
    if line.is_empty() {
        return Flow::Continue;
    }
    let _ = rl.add_history_entry(line.as_str());

    let Some(command) = parse_command(&line) else {
        session.set_input(line.as_str());
        match session.submit().await {
            Ok(SendOutcome::Ignored(reason)) => {
                renderer.print_info(&format!("Message not sent: {reason}."));
            }
            // The prompt already shows the line; the view prints the reply
            // or the failure banner.
            _ => view.echoed(line),
        }
        return Flow::Continue;
    };

    match command {
        ChatCommand::Quit => return Flow::Quit,
        ChatCommand::Help => {
            for line in help_text().lines() {
                println!("    {}", line);
            }
        }
        ChatCommand::Logout => match app.sign_out().await {
            Ok(()) => renderer.print_info("Signed out."),
            Err(err) => renderer.print_error(&err.to_string()),
        },
        ChatCommand::WhoAmI => {
            let snapshot = session.snapshot();
            if let (Some(user), Some(session_id)) = (&snapshot.user, &snapshot.session_id) {
                renderer.print_info(&format!(
                    "{} <{}> (user {}, session {})",
                    user.display_name(),
                    user.email,
                    user.id,
                    session_id
                ));
            }
        }
        ChatCommand::Sessions => match session.sessions().await {
            Ok(sessions) if sessions.is_empty() => renderer.print_info("No stored sessions."),
            Ok(sessions) => {
                for id in sessions {
                    renderer.print_info(&format!("  {id}"));
                }
            }
            Err(err) => renderer.print_error(&err.to_string()),
        },
        ChatCommand::History => match session.load_history().await {
            Ok(0) => renderer.print_info("No stored history loaded."),
            Ok(n) => renderer.print_info(&format!("Loaded {n} stored messages.")),
            Err(err) => renderer.print_error(&err.to_string()),
        },
        ChatCommand::Memories { query, limit } => {
            match session.search_memories(&query, limit).await {
                Ok(memories) if memories.is_empty() => renderer.print_info("Nothing remembered."),
                Ok(memories) => {
                    for memory in &memories {
                        renderer.print_memory(memory);
                    }
                }
                Err(err) => renderer.print_error(&err.to_string()),
            }
        }
        ChatCommand::Forget => {
            let confirm = read_line(rl, "Delete all memories? This cannot be undone [y/N] ");
            if matches!(confirm.as_deref(), Some("y") | Some("Y") | Some("yes")) {
                match session.clear_memories().await {
                    Ok(true) => renderer.print_info("All memories cleared."),
                    Ok(false) => renderer.print_error("The service did not clear the memories."),
                    Err(err) => renderer.print_error(&err.to_string()),
                }
            }
        }
        ChatCommand::Health => match session.health().await {
            Ok(status) => renderer.print_info(&format!("Service status: {}", status.status)),
            Err(err) => renderer.print_error(&err.to_string()),
        },
        ChatCommand::Dismiss => session.dismiss_error(),
        ChatCommand::Stats => {
            let snapshot = session.snapshot();
            println!("    Session Statistics:");
            println!(
                "      Session: {}",
                snapshot.session_id.as_deref().unwrap_or("(none)")
            );
            println!("      Messages: {}", snapshot.messages.len());
            println!("      State: {:?}", snapshot.state());
            println!("      Service: {}", session.backend().base_url());
        }
        ChatCommand::Invalid(message) => renderer.print_error(&message),
    }
    Flow::Continue
}
