//! CLI entry and dispatch.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chatline_core::{config, interrupt, logging};
use clap::Parser;

mod commands;

#[derive(Parser)]
#[command(name = "chatline")]
#[command(version = "0.1")]
#[command(about = "Stream, render and edit flow chat messages")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Identifiers attached to persisted edits.
#[derive(clap::Args, Debug, Clone, Default)]
struct FlowArgs {
    /// Flow the conversation belongs to
    #[arg(long, value_name = "ID", default_value = "")]
    flow_id: String,

    /// Session used when the message carries none
    #[arg(long, value_name = "ID")]
    session_id: Option<String>,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Follow a message stream until it settles and print the final text
    Watch {
        /// Stream URL, absolute or relative to the server base URL
        #[arg(value_name = "URL")]
        url: String,

        /// Print the rendered segments as JSON instead of the text
        #[arg(long)]
        segments: bool,
    },

    /// Render a stored chat record (JSON) into display segments
    Render {
        /// Read the record from this file instead of stdin
        #[arg(short, long, value_name = "PATH")]
        file: Option<PathBuf>,

        /// Show the expanded reasoning trace
        #[arg(long)]
        expand_thought: bool,

        /// Show the filled-in prompt template
        #[arg(long)]
        open_prompt: bool,
    },

    /// Replace a message's text on the server
    Edit {
        /// The ID of the message to edit
        #[arg(value_name = "MESSAGE_ID")]
        id: String,

        /// New message text
        #[arg(short, long)]
        text: String,

        /// The message was produced by the flow rather than the user
        #[arg(long)]
        machine: bool,

        #[command(flatten)]
        flow: FlowArgs,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(clap::Subcommand)]
enum ConfigCommands {
    /// Show the path to the config file
    Path,
    /// Initialize a default config file (if not present)
    Init,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    interrupt::init()?;

    // one tokio runtime for everything
    let rt = tokio::runtime::Runtime::new().context("create tokio runtime")?;

    rt.block_on(async move { dispatch(cli).await })
}

async fn dispatch(cli: Cli) -> Result<()> {
    let config = config::Config::load().context("load config")?;
    // held until exit so buffered file logs are flushed
    let _log_guard = logging::init(&config.log)?;

    match cli.command {
        Commands::Watch { url, segments } => commands::watch::run(&config, &url, segments).await,
        Commands::Render {
            file,
            expand_thought,
            open_prompt,
        } => commands::render::run(file.as_deref(), expand_thought, open_prompt),
        Commands::Edit {
            id,
            text,
            machine,
            flow,
        } => {
            commands::edit::run(commands::edit::EditOptions {
                config: &config,
                id: &id,
                text: &text,
                machine,
                flow_id: &flow.flow_id,
                session_id: flow.session_id.as_deref(),
            })
            .await
        }

        Commands::Config { command } => match command {
            ConfigCommands::Path => {
                commands::config::path();
                Ok(())
            }
            ConfigCommands::Init => commands::config::init(),
        },
    }
}
