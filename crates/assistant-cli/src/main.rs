use std::path::PathBuf;

use anyhow::Result;
use assistant_core::{ExportFormat, Theme};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{App, ChatArgs, SetArgs};

#[derive(Parser)]
#[command(name = "assistant")]
#[command(about = "Chat with the research assistant and manage local conversation history")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a message and print the reply as it streams in
    Chat {
        /// Your message
        message: String,
        /// Attach a text file to the message
        #[arg(short, long)]
        file: Option<PathBuf>,
        /// Continue an existing conversation
        #[arg(short, long)]
        conversation: Option<String>,
        /// Model to use instead of the configured one
        #[arg(short, long)]
        model: Option<String>,
        /// Wait for the complete reply instead of streaming it
        #[arg(long)]
        no_stream: bool,
        /// Sampling temperature
        #[arg(long)]
        temperature: Option<f32>,
        /// Cap on the reply length in tokens
        #[arg(long)]
        max_tokens: Option<u32>,
    },
    /// List saved conversations, most recent first
    History,
    /// Print a saved conversation
    Show {
        id: String,
    },
    /// Delete a saved conversation
    Delete {
        id: String,
    },
    /// Delete all saved conversations
    Clear,
    /// Export a saved conversation
    Export {
        id: String,
        /// markdown, json or html
        #[arg(short, long, default_value = "markdown")]
        format: ExportFormat,
        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print the current settings
    Settings,
    /// Change settings
    Set {
        /// dark, light or system
        #[arg(long)]
        theme: Option<Theme>,
        #[arg(long)]
        model: Option<String>,
        #[arg(long, conflicts_with = "clear_api_key")]
        api_key: Option<String>,
        /// Remove the stored API key (demo mode)
        #[arg(long)]
        clear_api_key: bool,
        /// Stream replies (true/false)
        #[arg(long)]
        streaming: Option<bool>,
    },
    /// List models offered by the completion service
    Models,
    /// Check whether the completion service is reachable
    Health,
    /// Upload a document for analysis
    Upload {
        path: PathBuf,
    },
}

fn init_logging() {
    // stdout carries the reply text, so logs go to stderr
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging();

    let app = App::load()?;

    match cli.command {
        Commands::Chat {
            message,
            file,
            conversation,
            model,
            no_stream,
            temperature,
            max_tokens,
        } => {
            commands::chat(
                &app,
                ChatArgs {
                    message,
                    file,
                    conversation,
                    model,
                    no_stream,
                    temperature,
                    max_tokens,
                },
            )
            .await?
        }
        Commands::History => commands::history(&app),
        Commands::Show { id } => commands::show(&app, &id)?,
        Commands::Delete { id } => commands::delete(&app, &id)?,
        Commands::Clear => commands::clear(&app)?,
        Commands::Export { id, format, output } => {
            commands::export(&app, &id, format, output.as_deref())?
        }
        Commands::Settings => commands::print_settings(&app),
        Commands::Set {
            theme,
            model,
            api_key,
            clear_api_key,
            streaming,
        } => commands::set(
            &app,
            SetArgs {
                theme,
                model,
                api_key,
                clear_api_key,
                streaming,
            },
        )?,
        Commands::Models => commands::models(&app).await?,
        Commands::Health => commands::health(&app).await?,
        Commands::Upload { path } => commands::upload(&app, &path).await?,
    }

    Ok(())
}
