mod cli;
mod config;
mod embedding;
mod error;
mod memory;
mod storage;

use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use memory::store::MemoryStore;
use memory::types::Message;

#[derive(Parser)]
#[command(name = "engram", version, about = "Local semantic memory store")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Store a new memory from one message
    Add {
        /// Message content
        content: String,
        /// Message role
        #[arg(long, default_value = "user")]
        role: String,
        /// User the memory belongs to (defaults to config)
        #[arg(long)]
        user: Option<String>,
    },
    /// List stored memories, one page at a time
    List {
        #[arg(long)]
        user: Option<String>,
        #[arg(long, default_value_t = 1)]
        page: usize,
        #[arg(long, default_value_t = 50)]
        page_size: usize,
    },
    /// Search memories by semantic similarity
    Search {
        /// Query text
        query: String,
        #[arg(long)]
        user: Option<String>,
        #[arg(long, default_value_t = 5)]
        limit: usize,
    },
    /// Manage the embedding model
    Model {
        #[command(subcommand)]
        action: ModelAction,
    },
}

#[derive(Subcommand)]
enum ModelAction {
    /// Download the embedding model to ~/.engram/models/
    Download,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = config::EngramConfig::load()?;

    // Log to stderr so stdout stays clean for JSON output.
    let filter =
        EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Add {
            content,
            role,
            user,
        } => {
            let store = open_store(&config)?;
            let user = user.unwrap_or_else(|| config.storage.default_user.clone());
            let id = store.add(&[Message::new(role, content)], &user)?;
            println!("{id}");
        }
        Command::List {
            user,
            page,
            page_size,
        } => {
            let store = open_store(&config)?;
            let user = user.unwrap_or_else(|| config.storage.default_user.clone());
            let response = store.get_all(&user, page, page_size)?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Command::Search { query, user, limit } => {
            let store = open_store(&config)?;
            let user = user.unwrap_or_else(|| config.storage.default_user.clone());
            let response = store.search(&query, &user, limit)?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Command::Model { action } => match action {
            ModelAction::Download => {
                cli::model_download(&config.embedding).await?;
            }
        },
    }

    Ok(())
}

/// Wire the embedding provider and the configured backend into a facade.
fn open_store(config: &config::EngramConfig) -> Result<MemoryStore> {
    let provider = embedding::create_provider(&config.embedding)?;
    let provider: Arc<dyn embedding::EmbeddingProvider> = Arc::from(provider);
    let store = storage::create_store(&config.storage, provider.clone())?;
    tracing::info!(backend = %config.storage.backend, "memory store ready");
    Ok(MemoryStore::new(store, provider))
}
