//! Hybrid FTS + vector retrieval

use crate::embedding::Embedder;
use crate::error::Result;
use crate::storage::Store;
use crate::types::{RankedItem, SearchSource};

use super::fusion::fuse_rrf;

impl Store {
    /// Run FTS (if `query_text` is non-blank) and vector search (if
    /// `query_vec` is given) as independent strategies, then RRF-fuse and
    /// truncate to `limit`. Each strategy fetches up to `2*limit` candidates
    /// so fusion has enough material to re-rank
    pub fn hybrid_search(
        &self,
        query_text: &str,
        query_vec: Option<&[f64]>,
        limit: usize,
        rrf_k: f64,
    ) -> Result<Vec<crate::types::FusedResult>> {
        let fetch = limit.saturating_mul(2).max(1);
        let mut lists: Vec<Vec<RankedItem>> = Vec::new();

        if !query_text.trim().is_empty() {
            let hits = self.fts_search(query_text, fetch)?;
            lists.push(
                hits.into_iter()
                    .map(|h| RankedItem {
                        entity_name: h.entity_name,
                        entity_type: h.entity_type,
                        content: h.content,
                        score: h.score,
                        source: SearchSource::Fts,
                    })
                    .collect(),
            );
        }

        if let Some(vec) = query_vec {
            if !vec.is_empty() {
                let hits = self.vector_search(vec, fetch)?;
                lists.push(
                    hits.into_iter()
                        .map(|h| RankedItem {
                            entity_name: h.entity_name,
                            entity_type: h.entity_type,
                            content: h.content,
                            score: h.score,
                            source: SearchSource::Vector,
                        })
                        .collect(),
                );
            }
        }

        if lists.iter().all(|l| l.is_empty()) {
            return Ok(Vec::new());
        }

        let mut fused = fuse_rrf(&lists, rrf_k);
        fused.truncate(limit);
        Ok(fused)
    }

    /// Embeds `query_text` via `embedder` before delegating to
    /// [`Store::hybrid_search`]. Any embedder failure falls back to
    /// FTS-only — vector search is an enhancement, never a hard dependency
    ///
    pub fn hybrid_search_with_embedder(
        &self,
        query_text: &str,
        embedder: &dyn Embedder,
        limit: usize,
        rrf_k: f64,
    ) -> Result<Vec<crate::types::FusedResult>> {
        let query_vec = if query_text.trim().is_empty() {
            None
        } else {
            match embedder.create_embedding(query_text) {
                Ok(vec) => Some(vec),
                Err(e) => {
                    tracing::warn!("embedder unavailable, falling back to FTS-only: {e}");
                    None
                }
            }
        };
        self.hybrid_search(query_text, query_vec.as_deref(), limit, rrf_k)
    }

    /// Runs hybrid search over `2*limit` candidates, then multiplies the
    /// fusion score of any result whose entity carries `container_tag` by
    /// `boost`, re-sorts, and truncates
    pub fn hybrid_search_with_boost(
        &self,
        query_text: &str,
        query_vec: Option<&[f64]>,
        limit: usize,
        rrf_k: f64,
        container_tag: &str,
        boost: f64,
    ) -> Result<Vec<crate::types::FusedResult>> {
        let mut fused = self.hybrid_search(query_text, query_vec, limit.saturating_mul(2).max(1), rrf_k)?;

        for result in &mut fused {
            if self
                .get_container_tag(&result.entity_name)
                .ok()
                .flatten()
                .as_deref()
                == Some(container_tag)
            {
                result.fused_score *= boost;
            }
        }

        fused.sort_by(|a, b| b.fused_score.partial_cmp(&a.fused_score).unwrap_or(std::cmp::Ordering::Equal));
        fused.truncate(limit);
        Ok(fused)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MemoryError;

    struct FailingEmbedder;
    impl Embedder for FailingEmbedder {
        fn create_embedding(&self, _text: &str) -> Result<Vec<f64>> {
            Err(MemoryError::External("network down".into()))
        }
    }

    #[test]
    fn both_strategies_empty_yields_empty() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.hybrid_search("", None, 10, 60.0).unwrap().is_empty());
    }

    #[test]
    fn fts_only_when_no_vector_query() {
        let store = Store::open_in_memory().unwrap();
        store.create_entity("Doc", "page", &["hello world".into()]).unwrap();
        let results = store.hybrid_search("hello", None, 10, 60.0).unwrap();
        assert!(!results.is_empty());
    }

    #[test]
    fn embedder_failure_falls_back_to_fts_only() {
        let store = Store::open_in_memory().unwrap();
        store.create_entity("Doc", "page", &["hello world".into()]).unwrap();
        let results = store
            .hybrid_search_with_embedder("hello", &FailingEmbedder, 10, 60.0)
            .unwrap();
        assert!(!results.is_empty());
    }

    #[test]
    fn boost_reorders_tagged_results() {
        let store = Store::open_in_memory().unwrap();
        store.create_entity("Tagged", "page", &["shared topic".into()]).unwrap();
        store.create_entity("Untagged", "page", &["shared topic".into()]).unwrap();
        store.set_container_tag("Tagged", "proj").unwrap();

        let boosted = store
            .hybrid_search_with_boost("shared topic", None, 10, 60.0, "proj", 5.0)
            .unwrap();
        assert_eq!(boosted[0].entity_name, "Tagged");
    }
}
