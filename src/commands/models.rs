use crate::cli::ModelCommand;
use crate::config::Config;
use crate::error::Result;
use crate::providers::create_client;
use colored::Colorize;
use prettytable::{format, Table};

/// Handle model management commands
pub async fn handle_models(config: &Config, command: ModelCommand) -> Result<()> {
    let client = create_client(&config.gemini)?;

    match command {
        ModelCommand::List => {
            let models = client.list_models().await?;

            if models.is_empty() {
                println!("{}", "No generation models available.".yellow());
                return Ok(());
            }

            let mut table = Table::new();
            table.set_format(*format::consts::FORMAT_BORDERS_ONLY);

            table.add_row(prettytable::row![
                "Name".bold(),
                "Display Name".bold(),
                "Description".bold()
            ]);

            for model in models {
                let description = if model.description.chars().count() > 60 {
                    let prefix: String = model.description.chars().take(57).collect();
                    format!("{}...", prefix)
                } else {
                    model.description
                };

                let name = if model.name == client.current_model() {
                    format!("{} *", model.name).green().to_string()
                } else {
                    model.name
                };

                table.add_row(prettytable::row![name, model.display_name, description]);
            }

            println!("\nAvailable models:");
            table.printstd();
            println!();
        }
    }

    Ok(())
}
