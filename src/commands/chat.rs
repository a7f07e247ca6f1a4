//! Interactive chat command handler
//!
//! Instantiates the store, the Gemini client, and the session engine, then
//! runs a readline-based loop that submits user input and waits for the
//! engine's terminal notification. Ctrl+C while a generation is in flight
//! cancels it and returns control to the prompt.

use crate::commands::open_storage;
use crate::config::Config;
use crate::error::Result;
use crate::providers::{create_client, Role};
use crate::session::{SessionEngine, SessionEvent};

use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Start interactive chat mode
///
/// # Arguments
///
/// * `config` - Global configuration (consumed)
/// * `session` - Optional conversation id to resume; a fresh conversation
///   is created otherwise
pub async fn run_chat(config: Config, session: Option<String>) -> Result<()> {
    tracing::info!("Starting interactive chat");

    let storage = Arc::new(open_storage(&config)?);
    let client = create_client(&config.gemini)?;
    let engine = SessionEngine::new(storage, client);
    let mut events = engine.subscribe();

    let conversation_id = match session {
        Some(id) => {
            // Resuming: replay the stored history to the terminal.
            let messages = engine.list_messages(&id)?;
            for message in &messages {
                print_message(message.role, &message.content);
            }
            id
        }
        None => engine.create_session(None)?.id,
    };

    println!(
        "{}",
        format!(
            "Chatting with {} (conversation {}). Type /help for commands.",
            engine.current_model(),
            &conversation_id[..8.min(conversation_id.len())]
        )
        .dimmed()
    );

    let mut rl = DefaultEditor::new()?;
    let mut current_id = conversation_id;

    loop {
        match rl.readline(&"you> ".cyan().to_string()) {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                rl.add_history_entry(trimmed)?;

                if let Some(command) = trimmed.strip_prefix('/') {
                    match handle_special_command(&engine, &mut current_id, command) {
                        Ok(LoopAction::Continue) => continue,
                        Ok(LoopAction::Exit) => break,
                        Ok(LoopAction::AwaitReply) => {}
                        Err(e) => {
                            println!("{}", format!("Error: {}", e).red());
                            continue;
                        }
                    }
                } else if let Err(e) = engine.send_message(&current_id, trimmed) {
                    println!("{}", format!("Error: {}", e).red());
                    continue;
                }

                await_reply(&engine, &mut events, &current_id).await;
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => {
                println!("{}", format!("Input error: {}", e).red());
                break;
            }
        }
    }

    println!("{}", "Bye.".dimmed());
    Ok(())
}

/// What the REPL should do after a special command
enum LoopAction {
    Continue,
    Exit,
    AwaitReply,
}

/// Handle a `/command` line
fn handle_special_command(
    engine: &SessionEngine,
    current_id: &mut String,
    command: &str,
) -> Result<LoopAction> {
    let (name, arg) = match command.split_once(' ') {
        Some((name, arg)) => (name, arg.trim()),
        None => (command, ""),
    };

    match name {
        "help" => {
            println!("  /new            start a fresh conversation");
            println!("  /sessions       list stored conversations");
            println!("  /switch <id>    switch to another conversation");
            println!("  /title <text>   rename the current conversation");
            println!("  /retry          retry the last failed send");
            println!("  /model <name>   switch the Gemini model");
            println!("  /quit           exit");
            Ok(LoopAction::Continue)
        }
        "new" => {
            let conversation = engine.create_session(None)?;
            println!(
                "{}",
                format!("Started conversation {}", &conversation.id[..8]).dimmed()
            );
            *current_id = conversation.id;
            Ok(LoopAction::Continue)
        }
        "sessions" => {
            for summary in engine.list_sessions()? {
                println!(
                    "  {}  {}  ({} messages)",
                    summary.id[..8].cyan(),
                    summary.title,
                    summary.message_count
                );
            }
            Ok(LoopAction::Continue)
        }
        "switch" if !arg.is_empty() => {
            // Validate the id before switching; replay its history.
            let messages = engine.list_messages(arg)?;
            for message in &messages {
                print_message(message.role, &message.content);
            }
            *current_id = arg.to_string();
            Ok(LoopAction::Continue)
        }
        "title" if !arg.is_empty() => {
            engine.rename_session(current_id, arg)?;
            println!("{}", "Renamed.".dimmed());
            Ok(LoopAction::Continue)
        }
        "retry" => {
            if let Err(e) = engine.retry_last(current_id) {
                println!("{}", format!("Error: {}", e).red());
                return Ok(LoopAction::Continue);
            }
            Ok(LoopAction::AwaitReply)
        }
        "model" if !arg.is_empty() => {
            engine.set_model(arg);
            println!("{}", format!("Model set to {}", arg).dimmed());
            Ok(LoopAction::Continue)
        }
        "quit" | "exit" => Ok(LoopAction::Exit),
        _ => {
            println!("{}", format!("Unknown command: /{}", command).yellow());
            Ok(LoopAction::Continue)
        }
    }
}

/// Wait for the terminal notification of the in-flight generation
///
/// Ctrl+C cancels the generation and returns to the prompt; events for
/// other conversations are skipped.
async fn await_reply(
    engine: &SessionEngine,
    events: &mut broadcast::Receiver<SessionEvent>,
    conversation_id: &str,
) {
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) if event.conversation_id() != conversation_id => continue,
                Ok(SessionEvent::Started { .. }) => continue,
                Ok(SessionEvent::Succeeded { text, .. }) => {
                    print_message(Role::Assistant, &text);
                    return;
                }
                Ok(SessionEvent::Failed { error, .. }) => {
                    println!("{}", format!("Error: {} (use /retry)", error).red());
                    return;
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return,
            },
            _ = tokio::signal::ctrl_c() => {
                if engine.cancel(conversation_id) {
                    println!("{}", "Cancelled.".yellow());
                }
                return;
            }
        }
    }
}

/// Print one conversation turn
fn print_message(role: Role, content: &str) {
    match role {
        Role::User => println!("{} {}", "you>".cyan(), content),
        Role::Assistant => println!("{} {}", "gemini>".green(), content),
    }
}
