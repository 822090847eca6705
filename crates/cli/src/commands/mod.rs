//! CLI subcommands. Each `run` loads config, opens what it needs, and
//! prints human-readable output.

pub mod chat;
pub mod documents;
pub mod ingest;
pub mod rebuild;
pub mod remove;
pub mod search;
pub mod status;

use std::error::Error;
use std::sync::Arc;

use tars_config::AppConfig;
use tars_knowledge::{KnowledgeBase, KnowledgeOptions, SqliteDocumentStore};

pub(crate) fn load_config() -> Result<AppConfig, Box<dyn Error>> {
    Ok(AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?)
}

/// Open the SQLite-backed knowledge base, creating the database if needed.
pub(crate) async fn open_knowledge(config: &AppConfig) -> Result<Arc<KnowledgeBase>, Box<dyn Error>> {
    let path = config.db_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let store = SqliteDocumentStore::open(&path).await?;
    let embedder = tars_providers::build_embedder(config)?;
    let options = KnowledgeOptions::from_config(config)?;
    let kb = KnowledgeBase::open(Arc::new(store), Arc::new(embedder), options).await?;
    Ok(Arc::new(kb))
}

/// First line of `text`, cut to `max` characters.
pub(crate) fn one_line(text: &str, max: usize) -> String {
    let line = text.lines().find(|l| !l.trim().is_empty()).unwrap_or("").trim();
    match line.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", &line[..cut]),
        None => line.to_string(),
    }
}
