//! Per-observation embedding storage and exact-scan cosine search
//!

use rusqlite::params;

use crate::error::{MemoryError, Result};
use crate::types::StoredEmbedding;

use super::rows::parse_rfc3339;
use super::Store;

/// Encode a vector as concatenated little-endian IEEE-754 float64 values
pub fn encode_embedding(vector: &[f64]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vector.len() * 8);
    for v in vector {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a blob produced by [`encode_embedding`]. Dimensions are recovered
/// as `len / 8`.
pub fn decode_embedding(bytes: &[u8]) -> Vec<f64> {
    bytes
        .chunks_exact(8)
        .map(|chunk| f64::from_le_bytes(chunk.try_into().unwrap()))
        .collect()
}

/// Cosine similarity `<a,b> / (||a|| * ||b||)`. Mismatched dimensionality
/// or a zero-norm vector scores 0
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f64 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f64 = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// A scored vector-search hit, joined against the owning observation/entity.
#[derive(Debug, Clone)]
pub struct VectorHit {
    pub observation_id: i64,
    pub entity_name: String,
    pub entity_type: String,
    pub content: String,
    pub score: f64,
}

impl Store {
    /// Upsert the embedding for `observation_id`.
    pub fn store_embedding(&self, observation_id: i64, vector: &[f64], model: &str) -> Result<()> {
        if vector.is_empty() {
            return Err(MemoryError::InvalidArgument("embedding vector is empty".into()));
        }
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO observation_embeddings (observation_id, embedding, model, dimensions)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(observation_id) DO UPDATE SET
                    embedding = excluded.embedding,
                    model = excluded.model,
                    dimensions = excluded.dimensions,
                    created_at = CURRENT_TIMESTAMP",
                params![observation_id, encode_embedding(vector), model, vector.len() as i64],
            )?;
            Ok(())
        })
    }

    /// Fetch the stored embedding for `observation_id`, if any.
    pub fn get_embedding(&self, observation_id: i64) -> Result<Option<StoredEmbedding>> {
        self.with_connection(|conn| {
            let row = conn
                .query_row(
                    "SELECT observation_id, embedding, model, dimensions, created_at FROM observation_embeddings WHERE observation_id = ?1",
                    params![observation_id],
                    |row| {
                        let blob: Vec<u8> = row.get(1)?;
                        let created_at: String = row.get(4)?;
                        Ok((row.get::<_, i64>(0)?, blob, row.get::<_, String>(2)?, row.get::<_, i64>(3)?, created_at))
                    },
                )
                .optional_none_on_no_rows()?;
            Ok(row.map(|(observation_id, blob, model, dimensions, created_at)| StoredEmbedding {
                observation_id,
                vector: decode_embedding(&blob),
                model,
                dimensions,
                created_at: parse_rfc3339(&created_at),
            }))
        })
    }

    /// Whether `observation_id` has a stored embedding.
    pub fn has_embedding(&self, observation_id: i64) -> Result<bool> {
        self.with_connection(|conn| {
            Ok(conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM observation_embeddings WHERE observation_id = ?1)",
                params![observation_id],
                |row| row.get::<_, i64>(0),
            )? != 0)
        })
    }

    /// Observations of latest entities that have no embedding yet, for backfill.
    pub fn observations_without_embeddings(&self) -> Result<Vec<(i64, String, String, String)>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT o.id, o.content, e.name, e.entity_type
                 FROM observations o
                 JOIN entities e ON e.id = o.entity_id
                 LEFT JOIN observation_embeddings ve ON ve.observation_id = o.id
                 WHERE e.is_latest = 1 AND ve.observation_id IS NULL
                 ORDER BY o.id",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?;
            Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
        })
    }

    /// Upsert many embeddings in one transaction. Fails if `rows.len() !=
    /// vectors.len()`
    pub fn batch_store_embeddings(
        &self,
        rows: &[i64],
        vectors: &[Vec<f64>],
        model: &str,
    ) -> Result<usize> {
        if rows.len() != vectors.len() {
            return Err(MemoryError::InvalidArgument(format!(
                "row count {} does not match vector count {}",
                rows.len(),
                vectors.len()
            )));
        }
        self.with_transaction(|tx| {
            for (observation_id, vector) in rows.iter().zip(vectors.iter()) {
                tx.execute(
                    "INSERT INTO observation_embeddings (observation_id, embedding, model, dimensions)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(observation_id) DO UPDATE SET
                        embedding = excluded.embedding,
                        model = excluded.model,
                        dimensions = excluded.dimensions,
                        created_at = CURRENT_TIMESTAMP",
                    params![observation_id, encode_embedding(vector), model, vector.len() as i64],
                )?;
            }
            Ok(rows.len())
        })
    }

    /// Exact cosine scan over every stored embedding, returning the top
    /// `limit`
    pub fn vector_search(&self, query_vec: &[f64], limit: usize) -> Result<Vec<VectorHit>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT ve.embedding, o.id, o.content, e.name, e.entity_type
                 FROM observation_embeddings ve
                 JOIN observations o ON o.id = ve.observation_id
                 JOIN entities e ON e.id = o.entity_id
                 WHERE e.is_latest = 1",
            )?;
            let mut hits: Vec<VectorHit> = stmt
                .query_map([], |row| {
                    let blob: Vec<u8> = row.get(0)?;
                    Ok((
                        decode_embedding(&blob),
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                })?
                .filter_map(std::result::Result::ok)
                .map(|(vector, observation_id, content, entity_name, entity_type)| VectorHit {
                    observation_id,
                    entity_name,
                    entity_type,
                    content,
                    score: cosine_similarity(query_vec, &vector),
                })
                .collect();

            hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
            hits.truncate(limit);
            Ok(hits)
        })
    }

    /// `(total_observations, with_embeddings)`
    pub fn embedding_stats(&self) -> Result<(i64, i64)> {
        self.with_connection(|conn| {
            let total: i64 = conn.query_row("SELECT COUNT(*) FROM observations", [], |row| row.get(0))?;
            let with_embeddings: i64 = conn.query_row(
                "SELECT COUNT(*) FROM observation_embeddings",
                [],
                |row| row.get(0),
            )?;
            Ok((total, with_embeddings))
        })
    }
}

trait OptionalNoRows<T> {
    fn optional_none_on_no_rows(self) -> rusqlite::Result<Option<T>>;
}

impl<T> OptionalNoRows<T> for rusqlite::Result<T> {
    fn optional_none_on_no_rows(self) -> rusqlite::Result<Option<T>> {
        match self {
            Ok(v) => Ok(Some(v)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_encode_decode() {
        let v = vec![1.0, -2.5, 3.25];
        let bytes = encode_embedding(&v);
        assert_eq!(bytes.len(), 24);
        assert_eq!(decode_embedding(&bytes), v);
    }

    #[test]
    fn cosine_identities() {
        let a = vec![1.0, 2.0, 3.0];
        let neg_a: Vec<f64> = a.iter().map(|x| -x).collect();
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-9);
        assert!((cosine_similarity(&a, &neg_a) - (-1.0)).abs() < 1e-9);

        let e1 = vec![1.0, 0.0];
        let e2 = vec![0.0, 1.0];
        assert!(cosine_similarity(&e1, &e2).abs() < 1e-9);
    }

    #[test]
    fn cosine_mismatched_or_zero_scores_zero() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn batch_store_rejects_count_mismatch() {
        let store = Store::open_in_memory().unwrap();
        let err = store
            .batch_store_embeddings(&[1, 2], &[vec![1.0]], "test-model")
            .unwrap_err();
        assert!(matches!(err, MemoryError::InvalidArgument(_)));
    }

    #[test]
    fn vector_search_ranks_by_similarity() {
        let store = Store::open_in_memory().unwrap();
        store
            .create_entity("A", "t", &["alpha".into(), "beta".into()])
            .unwrap();
        let entity = store.get_entity("A").unwrap();
        let alpha = entity.observations.iter().find(|o| o.content == "alpha").unwrap();
        let beta = entity.observations.iter().find(|o| o.content == "beta").unwrap();

        store.store_embedding(alpha.id, &[1.0, 0.0], "m").unwrap();
        store.store_embedding(beta.id, &[0.0, 1.0], "m").unwrap();

        let hits = store.vector_search(&[1.0, 0.0], 10).unwrap();
        assert_eq!(hits[0].content, "alpha");
    }
}
