use crate::config::Config;
use crate::error::Result;
use crate::providers::create_client;
use futures::StreamExt;
use std::io::Write;

/// Send a single prompt and print the response
///
/// Nothing is persisted: this is a stateless completion outside any
/// conversation.
///
/// # Arguments
///
/// * `config` - Global configuration
/// * `prompt` - The prompt text
/// * `stream` - Print fragments as they arrive instead of waiting for the
///   full response
pub async fn run_ask(config: &Config, prompt: &str, stream: bool) -> Result<()> {
    let client = create_client(&config.gemini)?;

    if stream {
        let mut fragments = client.complete_streaming(prompt).await?;
        while let Some(fragment) = fragments.next().await {
            // Fragments already printed remain valid partial output even if
            // the stream fails here.
            print!("{}", fragment?);
            std::io::stdout().flush()?;
        }
        println!();
    } else {
        let response = client.complete(prompt).await?;
        println!("{}", response);
    }

    Ok(())
}
