//! CLI module — command parsing and dispatch
//!
//! All CLI logic lives here. `main.rs` calls `cli::run()`.

mod common;
mod memory;
mod session;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "sotto")]
#[command(version)]
#[command(about = "Crash-safe voice-and-text personal AI assistant", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the interactive assistant (typed input + wake detection)
    Run {
        /// Archive any recovered session and start clean
        #[arg(long)]
        fresh: bool,
    },
    /// Process a single message and print the reply
    Ask {
        /// The message to process
        message: String,
        /// Archive any recovered session and start clean
        #[arg(long)]
        fresh: bool,
    },
    /// Show remembered facts
    Facts,
    /// List archived sessions
    Sessions,
}

/// Parse arguments and dispatch.
pub async fn run() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Run { fresh }) => session::cmd_run(fresh).await,
        Some(Commands::Ask { message, fresh }) => session::cmd_ask(&message, fresh).await,
        Some(Commands::Facts) => memory::cmd_facts().await,
        Some(Commands::Sessions) => memory::cmd_sessions().await,
        None => session::cmd_run(false).await,
    }
}
