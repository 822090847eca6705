//! `tars ingest`: Add text and markdown files to the knowledge base.

use std::path::{Path, PathBuf};

use tars_core::Document;

use super::{load_config, open_knowledge};

/// MIME type for a supported file, by extension.
pub fn mime_for(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "txt" | "text" => Some("text/plain"),
        "md" | "markdown" => Some("text/markdown"),
        _ => None,
    }
}

/// Read a supported file into a document named after the file.
pub fn read_document(path: &Path) -> Result<Document, String> {
    let mime = mime_for(path).ok_or_else(|| format!("{}: only .txt and .md files are supported", path.display()))?;
    let text = std::fs::read_to_string(path).map_err(|e| format!("{}: {e}", path.display()))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    Ok(Document::new(name, mime, text))
}

pub async fn run(files: Vec<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;

    let mut documents = Vec::new();
    let mut failed = 0;
    for path in &files {
        match read_document(path) {
            Ok(doc) => documents.push(doc),
            Err(e) => {
                eprintln!("  ✗ {e}");
                failed += 1;
            }
        }
    }

    if !documents.is_empty() {
        let kb = open_knowledge(&config).await?;
        for (source, result) in kb.ingest_many(documents).await {
            match result {
                Ok(report) if report.deduplicated => {
                    println!("  = {source}: already indexed as {}", report.document_id);
                }
                Ok(report) => {
                    println!("  ✓ {source}: {} chunks ({})", report.chunks, report.document_id);
                }
                Err(e) => {
                    eprintln!("  ✗ {source}: {e}");
                    failed += 1;
                }
            }
        }
    }

    if failed > 0 {
        return Err(format!("{failed} of {} files failed to ingest", files.len()).into());
    }
    Ok(())
}
