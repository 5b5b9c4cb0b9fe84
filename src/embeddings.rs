use crate::clients::Embedder;
use crate::db::Db;
use crate::error::{PipelineError, PipelineResult};
use crate::models::SimilarAnswer;
use rusqlite::{Connection, params};

/// Approved-answer retrieval store. Vectors are L2-normalized at write
/// time and kept as little-endian f32 BLOBs, so search is a dot product.
///
/// The database lock is taken only after the embedding call returns, so a
/// slow provider never stalls request handlers.
pub struct EmbeddingStore {
    pub min_similarity: f64,
}

impl Default for EmbeddingStore {
    fn default() -> Self {
        EmbeddingStore {
            min_similarity: 0.6,
        }
    }
}

fn normalize(mut v: Vec<f32>) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
    v
}

fn to_blob(v: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(v.len() * 4);
    for x in v {
        out.extend_from_slice(&x.to_le_bytes());
    }
    out
}

fn from_blob(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

fn dot(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() {
        return 0.0;
    }
    a.iter().zip(b).map(|(x, y)| (*x as f64) * (*y as f64)).sum()
}

impl EmbeddingStore {
    pub fn new(min_similarity: f64) -> Self {
        EmbeddingStore { min_similarity }
    }

    /// Store one approved (guest message, final answer) pair. Immutable
    /// after insert; called only once an operator has signed off.
    #[allow(clippy::too_many_arguments)]
    pub async fn store(
        &self,
        db: &Db,
        embedder: &dyn Embedder,
        guest_message: &str,
        final_answer: &str,
        property_code: Option<&str>,
        was_edited: bool,
        conversation_ref: Option<&str>,
        thread_id: Option<&str>,
    ) -> PipelineResult<String> {
        let vector = normalize(embedder.embed(guest_message).await?);
        if vector.len() != embedder.dim() {
            return Err(PipelineError::Transport(format!(
                "embedding dimension mismatch: got {}, expected {}",
                vector.len(),
                embedder.dim()
            )));
        }
        let id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now().to_rfc3339();
        let conn = db.conn();
        conn.execute(
            "INSERT INTO answer_embeddings
                (id, guest_message, final_answer, embedding, property_code, was_edited, conversation_ref, thread_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                id,
                guest_message,
                final_answer,
                to_blob(&vector),
                property_code,
                was_edited,
                conversation_ref,
                thread_id,
                now
            ],
        )?;
        Ok(id)
    }

    /// K-nearest approved answers for a query, cosine similarity over
    /// normalized vectors. Same-property matches rank ahead of
    /// cross-property ones; anything below `min_similarity` is dropped.
    pub async fn search(
        &self,
        db: &Db,
        embedder: &dyn Embedder,
        query_text: &str,
        property_code: Option<&str>,
        k: usize,
    ) -> PipelineResult<Vec<SimilarAnswer>> {
        let query = normalize(embedder.embed(query_text).await?);
        let conn = db.conn();
        self.search_with_vector(&conn, &query, property_code, k)
    }

    /// Synchronous scan against a pre-computed, normalized query vector.
    pub fn search_with_vector(
        &self,
        conn: &Connection,
        query: &[f32],
        property_code: Option<&str>,
        k: usize,
    ) -> PipelineResult<Vec<SimilarAnswer>> {
        let mut stmt = conn.prepare(
            "SELECT guest_message, final_answer, embedding, property_code, was_edited FROM answer_embeddings",
        )?;
        let rows = stmt.query_map([], |row| {
            let blob: Vec<u8> = row.get(2)?;
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                blob,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, bool>(4)?,
            ))
        })?;

        let mut scored: Vec<(bool, SimilarAnswer)> = Vec::new();
        for row in rows.flatten() {
            let (guest_message, final_answer, blob, row_property, was_edited) = row;
            let similarity = dot(query, &from_blob(&blob));
            if similarity < self.min_similarity {
                continue;
            }
            let same_property = match (property_code, row_property.as_deref()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            };
            scored.push((
                same_property,
                SimilarAnswer {
                    guest_message,
                    final_answer,
                    similarity,
                    property_code: row_property,
                    was_edited,
                },
            ));
        }

        // Same-property first, then by similarity descending.
        scored.sort_by(|a, b| {
            b.0.cmp(&a.0).then(
                b.1.similarity
                    .partial_cmp(&a.1.similarity)
                    .unwrap_or(std::cmp::Ordering::Equal),
            )
        });

        Ok(scored.into_iter().take(k).map(|(_, s)| s).collect())
    }

    /// Compose a prompt-ready few-shot block from the top-k similar
    /// answers. None when nothing clears the similarity threshold.
    pub async fn few_shot_block(
        &self,
        db: &Db,
        embedder: &dyn Embedder,
        query_text: &str,
        property_code: Option<&str>,
        k: usize,
    ) -> PipelineResult<Option<String>> {
        let results = self
            .search(db, embedder, query_text, property_code, k)
            .await?;
        if results.is_empty() {
            return Ok(None);
        }

        let mut block = String::from("Past approved replies to similar guest messages:\n");
        for r in &results {
            block.push_str(&format!(
                "\nGuest asked: {}\nAnswer: {}\n",
                r.guest_message.trim(),
                r.final_answer.trim()
            ));
        }
        Ok(Some(block))
    }
}
