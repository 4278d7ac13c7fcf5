//! `relayclaw chat` — Interactive or single-message chat mode.

use std::io::{BufRead, Write};
use std::sync::Arc;

use relayclaw_agent::AgentLoop;
use relayclaw_config::AppConfig;
use relayclaw_core::message::Message;
use relayclaw_core::session::SessionStore;
use relayclaw_session::InMemorySessionStore;

const CLI_USER: &str = "cli_user";

pub async fn run(message: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if !config.has_api_key() {
        eprintln!();
        eprintln!("  ERROR: No completion API key configured!");
        eprintln!();
        eprintln!("  Set the environment variable:");
        eprintln!("    export GEMINI_API_KEY='...'");
        eprintln!();
        eprintln!("  Or add api_key to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let client = relayclaw_providers::from_config(&config)?;
    let sessions = InMemorySessionStore::new(
        std::env::var("GITHUB_TOKEN").ok(),
        config.channel.history_window,
    );
    let max_length = config.channel.max_message_length;
    let agent = AgentLoop::new(Arc::new(client), config);

    if let Some(msg) = message {
        let reply = run_one(&agent, &sessions, &msg, max_length).await?;
        println!("{reply}");
        return Ok(());
    }

    // Interactive mode
    println!("RelayClaw interactive chat. Type 'exit' or Ctrl-D to quit.\n");
    let stdin = std::io::stdin();
    let mut line = String::new();
    loop {
        print!("you> ");
        std::io::stdout().flush()?;
        line.clear();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input == "exit" || input == "quit" {
            break;
        }

        let reply = run_one(&agent, &sessions, input, max_length).await?;
        println!("\nagent> {reply}\n");
    }

    Ok(())
}

/// One chat turn against the local session.
async fn run_one(
    agent: &AgentLoop,
    sessions: &InMemorySessionStore,
    message: &str,
    max_length: usize,
) -> Result<String, Box<dyn std::error::Error>> {
    let session = sessions.get_or_create(CLI_USER).await?;
    let history = sessions.window(CLI_USER, usize::MAX).await?;
    sessions.append(CLI_USER, Message::user(message)).await?;

    let outcome = agent
        .run_turn(&history, message, session.credential.as_deref())
        .await;
    let reply = relayclaw_format::postprocess(&outcome.text, max_length);

    sessions.append(CLI_USER, Message::model(reply.clone())).await?;
    Ok(reply)
}
