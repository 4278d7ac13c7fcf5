//! RelayClaw CLI — the main entry point.
//!
//! Commands:
//! - `gateway` — Start the HTTP webhook server
//! - `chat`    — Interactive chat or single-message mode
//! - `doctor`  — Diagnose configuration and provider health

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "relayclaw",
    about = "RelayClaw - conversational coding agent over WhatsApp",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway server
    Gateway {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Chat with the agent from the terminal
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Diagnose configuration and provider health
    Doctor,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Gateway { port } => commands::gateway::run(port).await?,
        Commands::Chat { message } => commands::chat::run(message).await?,
        Commands::Doctor => commands::doctor::run().await?,
    }

    Ok(())
}
