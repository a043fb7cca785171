//! # Paimon CLI
//!
//! *"The King teaches all arts and sciences"*
//!
//! The command-line interface for the Paimon learning assistant.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::eyre::Result;

mod commands;
mod config;

#[derive(Parser)]
#[command(name = "paimon")]
#[command(author = "Daemoniorum Engineering")]
#[command(version)]
#[command(about = "Retrieval-augmented programming learning assistant", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "warn", global = true)]
    log_level: String,

    /// Enable JSON logging
    #[arg(long, global = true)]
    json_logs: bool,

    /// Configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Host to bind to
        #[arg(short = 'H', long)]
        host: Option<String>,

        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Start an interactive, streaming chat session
    Chat {
        /// Conversation identifier
        #[arg(short, long, default_value = "default")]
        memory_id: String,
    },

    /// Ask a single question
    Ask {
        /// The message to send
        message: String,

        /// Conversation identifier
        #[arg(short, long, default_value = "default")]
        memory_id: String,
    },

    /// Generate a structured learning report
    Report {
        /// Describe your situation and goals
        message: String,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the knowledge base segments retrieved for a query
    Search {
        /// The query to retrieve for
        query: String,
    },

    /// Display version and build info
    Version,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show config file path
    Path,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    let telemetry_config = dantalion::TelemetryConfig::new("paimon")
        .with_log_level(&cli.log_level)
        .with_json_logs(cli.json_logs);
    dantalion::init_logging(&telemetry_config);

    let config_file = cli.config.as_deref();

    match cli.command {
        Commands::Serve { host, port } => {
            commands::serve(config::Config::load(config_file), host, port).await?;
        }

        Commands::Chat { memory_id } => {
            commands::chat(config::Config::load(config_file), memory_id).await?;
        }

        Commands::Ask { message, memory_id } => {
            commands::ask(config::Config::load(config_file), memory_id, message).await?;
        }

        Commands::Report { message, json } => {
            commands::report(config::Config::load(config_file), message, json).await?;
        }

        Commands::Search { query } => {
            commands::search(config::Config::load(config_file), query).await?;
        }

        Commands::Version => {
            commands::version();
        }

        Commands::Config { action } => match action {
            ConfigAction::Show => config::show_config(config_file),
            ConfigAction::Path => commands::config_path(config_file),
        },
    }

    Ok(())
}
