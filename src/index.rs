//! Semantic index over ingested clause segments.
//!
//! The [`SemanticIndex`] trait is the retrieval collaborator consumed by
//! the analysis pipeline: store segments, wipe them, and return the top-k
//! best matches for a query. The production [`SqliteIndex`] persists
//! segments and their embedding vectors (little-endian f32 BLOBs) in
//! SQLite and ranks by brute-force cosine similarity. When the embedding
//! provider is disabled it degrades to case-insensitive term-overlap
//! scoring so the CLI stays usable offline.
//!
//! Ingestion uses clear-and-replace semantics: at most one logical
//! document's segments live in the index at a time.

use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::embedding::EmbeddingProvider;
use crate::models::Segment;

/// Nearest-neighbor lookup over stored segments.
#[async_trait]
pub trait SemanticIndex: Send + Sync {
    /// Store segments, optionally wiping existing ones first.
    /// Returns the assigned segment ids.
    async fn add_segments(&self, segments: &[Segment], clear_existing: bool)
        -> Result<Vec<String>>;

    /// Remove all stored segments and vectors.
    async fn clear(&self) -> Result<()>;

    /// Top-k lookup, best match first, as `(segment, relevance_score)`.
    async fn search(&self, query: &str, k: usize) -> Result<Vec<(Segment, f64)>>;
}

/// SQLite-backed index with pluggable embeddings.
pub struct SqliteIndex {
    pool: SqlitePool,
    embedder: Box<dyn EmbeddingProvider>,
    embeddings_enabled: bool,
}

impl SqliteIndex {
    pub fn new(
        pool: SqlitePool,
        embedder: Box<dyn EmbeddingProvider>,
        embeddings_enabled: bool,
    ) -> Self {
        Self {
            pool,
            embedder,
            embeddings_enabled,
        }
    }

    async fn load_segments(&self) -> Result<Vec<(String, Segment)>> {
        let rows =
            sqlx::query("SELECT id, clause_id, text, metadata_json FROM segments ORDER BY position")
                .fetch_all(&self.pool)
                .await?;

        let mut segments = Vec::with_capacity(rows.len());
        for row in rows {
            let id: String = row.get("id");
            let clause_id: String = row.get("clause_id");
            let text: String = row.get("text");
            let metadata_json: String = row.get("metadata_json");
            let metadata: BTreeMap<String, String> =
                serde_json::from_str(&metadata_json).unwrap_or_default();
            segments.push((
                id,
                Segment {
                    text,
                    clause_id,
                    metadata,
                },
            ));
        }
        Ok(segments)
    }
}

#[async_trait]
impl SemanticIndex for SqliteIndex {
    async fn add_segments(
        &self,
        segments: &[Segment],
        clear_existing: bool,
    ) -> Result<Vec<String>> {
        if segments.is_empty() {
            return Ok(Vec::new());
        }

        if clear_existing {
            self.clear().await?;
        }

        // Embed the whole batch before writing anything, so an embedding
        // failure leaves the index untouched.
        let vectors = if self.embeddings_enabled {
            let texts: Vec<String> = segments.iter().map(|s| s.text.clone()).collect();
            Some(self.embedder.embed(&texts).await?)
        } else {
            None
        };

        let now = chrono::Utc::now().timestamp();
        let mut ids = Vec::with_capacity(segments.len());
        let mut tx = self.pool.begin().await?;

        for (position, segment) in segments.iter().enumerate() {
            let id = Uuid::new_v4().to_string();
            let metadata_json = serde_json::to_string(&segment.metadata)?;

            sqlx::query(
                "INSERT INTO segments (id, position, clause_id, text, metadata_json, ingested_at) \
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&id)
            .bind(position as i64)
            .bind(&segment.clause_id)
            .bind(&segment.text)
            .bind(&metadata_json)
            .bind(now)
            .execute(&mut *tx)
            .await?;

            if let Some(ref vecs) = vectors {
                let vector = &vecs[position];
                sqlx::query(
                    "INSERT INTO segment_vectors (segment_id, vector, dims, model) \
                     VALUES (?, ?, ?, ?)",
                )
                .bind(&id)
                .bind(vec_to_blob(vector))
                .bind(vector.len() as i64)
                .bind(self.embedder.model_name())
                .execute(&mut *tx)
                .await?;
            }

            ids.push(id);
        }

        tx.commit().await?;
        Ok(ids)
    }

    async fn clear(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM segment_vectors")
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM segments").execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn search(&self, query: &str, k: usize) -> Result<Vec<(Segment, f64)>> {
        let segments = self.load_segments().await?;
        if segments.is_empty() {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(Segment, f64)> = if self.embeddings_enabled {
            let query_vec = self
                .embedder
                .embed(&[query.to_string()])
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| anyhow::anyhow!("Empty embedding response for query"))?;

            let rows = sqlx::query("SELECT segment_id, vector FROM segment_vectors")
                .fetch_all(&self.pool)
                .await?;
            let mut vectors: BTreeMap<String, Vec<f32>> = BTreeMap::new();
            for row in rows {
                let segment_id: String = row.get("segment_id");
                let blob: Vec<u8> = row.get("vector");
                vectors.insert(segment_id, blob_to_vec(&blob));
            }

            segments
                .into_iter()
                .filter_map(|(id, segment)| {
                    vectors
                        .get(&id)
                        .map(|vec| (segment, cosine_similarity(&query_vec, vec) as f64))
                })
                .collect()
        } else {
            keyword_scores(query, segments)
        };

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }
}

/// Term-overlap scoring used when embeddings are disabled. Segments
/// matching no query term are excluded.
fn keyword_scores(query: &str, segments: Vec<(String, Segment)>) -> Vec<(Segment, f64)> {
    let query_lower = query.to_lowercase();
    let terms: Vec<&str> = query_lower.split_whitespace().collect();
    if terms.is_empty() {
        return Vec::new();
    }

    segments
        .into_iter()
        .filter_map(|(_id, segment)| {
            let text_lower = segment.text.to_lowercase();
            let matches = terms.iter().filter(|t| text_lower.contains(**t)).count();
            if matches > 0 {
                Some((segment, matches as f64))
            } else {
                None
            }
        })
        .collect()
}

/// Encode a float vector as little-endian f32 bytes for BLOB storage.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity in `[-1.0, 1.0]`; zero for empty or mismatched vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}
