use crate::cli::SessionCommand;
use crate::commands::open_storage;
use crate::config::Config;
use crate::error::Result;
use crate::providers::Role;
use colored::Colorize;
use prettytable::{format, Table};

/// Handle session management commands
pub fn handle_sessions(config: &Config, command: SessionCommand) -> Result<()> {
    // One-shot commands talk to the store directly: there is no engine
    // running, so nothing can be in flight.
    let storage = open_storage(config)?;

    match command {
        SessionCommand::List => {
            let sessions = storage.list_conversations()?;

            if sessions.is_empty() {
                println!("{}", "No conversations found.".yellow());
                return Ok(());
            }

            let mut table = Table::new();
            table.set_format(*format::consts::FORMAT_BORDERS_ONLY);

            table.add_row(prettytable::row![
                "ID".bold(),
                "Title".bold(),
                "Messages".bold(),
                "Last Updated".bold()
            ]);

            for session in sessions {
                let id_short = &session.id[..8.min(session.id.len())];
                let title = if session.title.chars().count() > 40 {
                    let prefix: String = session.title.chars().take(37).collect();
                    format!("{}...", prefix)
                } else {
                    session.title
                };
                let updated = session.updated_at.format("%Y-%m-%d %H:%M").to_string();

                table.add_row(prettytable::row![
                    id_short.cyan(),
                    title,
                    session.message_count,
                    updated
                ]);
            }

            println!("\nConversations:");
            table.printstd();
            println!();
            println!(
                "Use {} to resume a conversation.",
                "kaiwa chat --session <ID>".cyan()
            );
            println!();
        }
        SessionCommand::Show { id } => {
            let messages = storage.list_messages(&id)?;
            if messages.is_empty() {
                println!("{}", "Conversation is empty.".yellow());
                return Ok(());
            }
            for message in messages {
                let label = match message.role {
                    Role::User => "you>".cyan(),
                    Role::Assistant => "gemini>".green(),
                };
                println!("{} {}", label, message.content);
            }
        }
        SessionCommand::Delete { id } => {
            storage.delete_conversation(&id)?;
            println!("{}", format!("Deleted conversation {}", id).green());
        }
        SessionCommand::Rename { id, title } => {
            storage.rename_conversation(&id, &title)?;
            println!("{}", format!("Renamed conversation {}", id).green());
        }
    }

    Ok(())
}
