//! `tars documents`: List indexed documents.

use super::{load_config, one_line, open_knowledge};

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    let kb = open_knowledge(&config).await?;
    let docs = kb.list_documents().await?;

    if docs.is_empty() {
        println!("No documents indexed yet. Add some with `tars ingest <files>`.");
        return Ok(());
    }

    println!("📚 {} documents", docs.len());
    println!();
    for doc in &docs {
        println!("  {}  {}", doc.id, doc.source_name);
        println!(
            "      {} · {} chunks · {} chars · {}",
            doc.mime_type,
            doc.chunk_count,
            doc.char_count,
            doc.uploaded_at.format("%Y-%m-%d %H:%M")
        );
        println!("      {}", one_line(&doc.preview, 100));
    }
    Ok(())
}
