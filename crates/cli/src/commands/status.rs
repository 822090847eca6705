//! `tars status`: Show configuration, counts and index health.

use tars_config::AppConfig;

use super::{load_config, open_knowledge};

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;

    println!("🤖 TARS Status");
    println!("==============");
    println!("  Config dir:   {}", AppConfig::config_dir().display());
    println!("  Database:     {}", config.db_path().display());
    println!("  Model:        {}", config.anthropic.model);
    println!("  Embeddings:   {} @ {}", config.embedding.model, config.embedding.api_url);
    println!("  API key:      {}", if config.has_api_key() { "set" } else { "missing" });
    println!(
        "  Chunking:     {} chars, {} overlap",
        config.knowledge.chunk_size, config.knowledge.chunk_overlap
    );
    println!(
        "  Retrieval:    top {} (analysis {}), min score {:.2}",
        config.knowledge.knowledge_top_k, config.knowledge.analysis_top_k, config.knowledge.min_score
    );
    println!("  Prompt cap:   {} tokens", config.context.max_prompt_tokens);

    let kb = open_knowledge(&config).await?;
    let stats = kb.stats().await?;
    let health = kb.verify().await?;

    println!();
    println!("  Documents:    {}", stats.documents);
    println!("  Chunks:       {}", stats.chunks);
    println!("  Vectors:      {}", stats.indexed_vectors);

    if health.is_healthy() {
        println!("\n  ✅ Index healthy");
    } else {
        println!("\n  ⚠️  Index needs attention:");
        if health.missing_vectors > 0 {
            println!("     {} chunks have no vector", health.missing_vectors);
        }
        if health.orphan_vectors > 0 {
            println!("     {} vectors have no chunk", health.orphan_vectors);
        }
        if health.stale_model_vectors > 0 {
            println!(
                "     {} vectors come from a different model than {}",
                health.stale_model_vectors, stats.embedding_model
            );
        }
        if health.mixed_dimensions {
            println!("     vectors have mixed dimensions");
        }
        println!("     Run `tars rebuild` to fix.");
    }

    let config_path = AppConfig::config_dir().join("config.toml");
    if !config_path.exists() {
        println!("\n  ℹ️  No config file at {}; using defaults", config_path.display());
    }
    Ok(())
}
