//! `tars rebuild`: Re-embed every stored chunk with the configured model.

use super::{load_config, open_knowledge};

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    let kb = open_knowledge(&config).await?;

    eprint!("  Rebuilding index...");
    let report = kb.rebuild().await?;
    eprint!("\r                     \r");
    println!("✅ Re-embedded {} chunks with {}", report.chunks, report.model);
    Ok(())
}
