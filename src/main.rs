use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ops_rag::commands::{answer_question, chat_loop, init_collection, show_status, stream_answer};
use ops_rag::config::{Config, resolve_config_dir, run_interactive_config, show_config};
use ops_rag::pipeline::Pipeline;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "ops-rag")]
#[command(about = "Question answering over operations documentation kept in a wiki")]
#[command(version)]
struct Cli {
    /// Configuration directory (defaults to ~/.ops-rag)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure the wiki and model provider
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Index a wiki page and its direct children
    Init {
        /// Id of the root wiki page
        root_id: String,
    },
    /// Answer a question
    Query {
        question: String,
    },
    /// Answer a question as a stream of server-sent event frames
    Ask {
        question: String,
    },
    /// Interactive question loop
    Chat,
    /// Show the state of the vector database
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_dir = resolve_config_dir(cli.config_dir)?;

    if let Commands::Config { show } = cli.command {
        if show {
            show_config(&config_dir)?;
        } else {
            run_interactive_config(&config_dir)?;
        }
        return Ok(());
    }

    let config = Config::load(&config_dir).context("Failed to load configuration")?;
    let pipeline = Pipeline::open(&config)
        .await
        .context("Failed to open pipeline")?;

    match cli.command {
        Commands::Init { root_id } => init_collection(&pipeline, &root_id).await?,
        Commands::Query { question } => answer_question(&pipeline, &question).await?,
        Commands::Ask { question } => stream_answer(&pipeline, &question).await?,
        Commands::Chat => chat_loop(&pipeline).await?,
        Commands::Status => show_status(&pipeline).await?,
        Commands::Config { .. } => {}
    }

    Ok(())
}
