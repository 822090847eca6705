//! TARS CLI: the main entry point.
//!
//! Commands:
//! - `ingest`     Add text or markdown files to the knowledge base
//! - `remove`     Remove a document and its chunks
//! - `documents`  List indexed documents
//! - `search`     Search the knowledge base directly
//! - `chat`       Interactive chat or single-message mode
//! - `rebuild`    Re-embed every chunk with the configured model
//! - `status`     Show configuration and index health

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "tars",
    about = "TARS: a retrieval-augmented assistant for your documents",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Add .txt or .md files to the knowledge base
    Ingest {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Remove a document by id
    Remove { id: String },

    /// List indexed documents
    Documents,

    /// Search the knowledge base
    Search {
        query: String,

        /// Maximum number of results
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Minimum cosine similarity (-1.0 to 1.0)
        #[arg(long, allow_hyphen_values = true)]
        min_score: Option<f32>,
    },

    /// Chat with TARS
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Re-embed every stored chunk
    Rebuild,

    /// Show configuration and index health
    Status,
}

fn init_tracing(verbose: bool, json: bool) {
    let filter = if verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.with_target(false).init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    match cli.command {
        Commands::Ingest { files } => commands::ingest::run(files).await?,
        Commands::Remove { id } => commands::remove::run(&id).await?,
        Commands::Documents => commands::documents::run().await?,
        Commands::Search { query, top_k, min_score } => commands::search::run(&query, top_k, min_score).await?,
        Commands::Chat { message } => commands::chat::run(message).await?,
        Commands::Rebuild => commands::rebuild::run().await?,
        Commands::Status => commands::status::run().await?,
    }

    Ok(())
}
