//! `tars remove`: Remove a document and its chunks.

use super::{load_config, open_knowledge};

pub async fn run(id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    let kb = open_knowledge(&config).await?;

    let chunks = kb.remove_document(id).await?;
    println!("🗑️  Removed document {id} ({chunks} chunks)");
    Ok(())
}
