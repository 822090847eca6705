//! `tars search`: Query the knowledge base without the LLM.

use super::{load_config, one_line, open_knowledge};

pub async fn run(query: &str, top_k: Option<usize>, min_score: Option<f32>) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    let top_k = top_k.unwrap_or(config.knowledge.knowledge_top_k);
    let min_score = min_score.unwrap_or(config.knowledge.min_score);
    if !(-1.0..=1.0).contains(&min_score) {
        return Err("--min-score must be between -1.0 and 1.0".into());
    }

    let kb = open_knowledge(&config).await?;
    let results = kb.search(query, top_k, min_score).await?;

    println!("🔍 \"{query}\" (top {top_k}, min score {min_score:.2})");
    println!();
    if results.is_empty() {
        println!("   No matching chunks.");
    }
    for (i, r) in results.iter().enumerate() {
        println!("  {:>2}. [{:.3}] {}  ({})", i + 1, r.score, r.document_source, r.chunk_id);
        println!("      {}", one_line(&r.text, 120));
    }

    if kb.needs_rebuild() {
        eprintln!();
        eprintln!("  ⚠️  Some hits were missing from the store. Run `tars rebuild`.");
    }
    Ok(())
}
