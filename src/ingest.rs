//! Document ingestion: load a file, split it into clause segments, and
//! replace the index contents with the result.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::index::SemanticIndex;
use crate::segmenter::ClauseSegmenter;

/// Outcome of a single-document ingestion.
pub struct IngestSummary {
    pub filename: String,
    pub num_clauses: usize,
}

/// Load, segment, and index one document, replacing any previously
/// indexed content.
pub async fn ingest_document(
    index: Arc<dyn SemanticIndex>,
    bytes: &[u8],
    filename: &str,
) -> Result<IngestSummary> {
    let text = crate::loader::load(bytes, filename)?;

    let segmenter = ClauseSegmenter::new();
    let mut metadata = BTreeMap::new();
    metadata.insert("source".to_string(), filename.to_string());

    let segments = segmenter.to_documents(&[text], &[metadata]);
    info!(filename, num_clauses = segments.len(), "Segmented document");

    let ids = index.add_segments(&segments, true).await?;

    Ok(IngestSummary {
        filename: filename.to_string(),
        num_clauses: ids.len(),
    })
}

/// CLI entry point: ingest a file from disk and print a summary.
pub async fn run_ingest(index: Arc<dyn SemanticIndex>, path: &Path) -> Result<()> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read file: {}", path.display()))?;
    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("document.txt");

    let summary = ingest_document(index, &bytes, filename).await?;

    println!("Ingested {}", summary.filename);
    println!("  {} clause segment(s) indexed", summary.num_clauses);

    Ok(())
}
