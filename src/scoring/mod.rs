//! Importance scoring
//!
//! Pure scoring functions operate on plain numbers so they can be unit
//! tested without a database; [`Store::recalculate_importance`] wires them
//! to the storage layer.

use chrono::{DateTime, Utc};
use rusqlite::params;

use crate::config::ScoringConfig;
use crate::error::Result;
use crate::storage::relation_count;
use crate::storage::Store;
use crate::types::FactType;

/// `exp(-days/decay_constant)`, clamped to 1 for non-positive `days`.
pub fn recency_decay(days: f64, decay_constant: f64) -> f64 {
    if days <= 0.0 {
        return 1.0;
    }
    (-days / decay_constant).exp()
}

/// `1 + ln(1 + count) / 10`; negative counts clamp to 0 before the log.
pub fn frequency_score(count: f64) -> f64 {
    let count = count.max(0.0);
    1.0 + (1.0 + count).ln() / 10.0
}

/// `0.5 + 0.5 * min(1, rel_count/max_rel)`, or `0.75` when there are no
/// relations in the whole graph (`max_rel == 0`).
pub fn centrality_score(rel_count: f64, max_rel: f64) -> f64 {
    if max_rel <= 0.0 {
        return 0.75;
    }
    0.5 + 0.5 * (rel_count / max_rel).min(1.0)
}

/// `base * (w_r·recency + w_f·frequency + w_c·centrality)`.
pub fn importance(
    base: f64,
    days_since: f64,
    access_count: f64,
    rel_count: f64,
    max_rel: f64,
    config: &ScoringConfig,
) -> f64 {
    let recency = recency_decay(days_since, config.decay_constant);
    let frequency = frequency_score(access_count);
    let centrality = centrality_score(rel_count, max_rel);
    base * (config.recency_weight * recency
        + config.frequency_weight * frequency
        + config.centrality_weight * centrality)
}

fn days_between(earlier: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    (now - earlier).num_seconds() as f64 / 86_400.0
}

impl Store {
    /// Recompute importance for every observation of a latest entity.
    /// Static facts never drop below a base of 0.8. Rows whose recomputed
    /// score differs from the stored one by more than 0.01 are updated;
    /// returns the number of rows changed
    pub fn recalculate_importance(&self, config: &ScoringConfig) -> Result<usize> {
        self.with_transaction(|conn| {
            let now = Utc::now();

            let max_relations: i64 = conn
                .query_row(
                    "SELECT COALESCE(MAX(cnt), 0) FROM (
                        SELECT COUNT(*) AS cnt FROM relations
                        GROUP BY from_entity_id
                        UNION ALL
                        SELECT COUNT(*) AS cnt FROM relations
                        GROUP BY to_entity_id
                    )",
                    [],
                    |row| row.get(0),
                )
                .unwrap_or(0)
                .max(1);

            let mut stmt = conn.prepare(
                "SELECT o.id, o.entity_id, o.fact_type, o.importance, o.created_at, o.last_accessed
                 FROM observations o
                 JOIN entities e ON e.id = o.entity_id
                 WHERE e.is_latest = 1",
            )?;
            let rows: Vec<(i64, i64, String, f64, String, Option<String>)> = stmt
                .query_map([], |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                    ))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let mut updated = 0usize;
            for (obs_id, entity_id, fact_type_str, old_importance, created_at, last_accessed) in rows {
                let reference = last_accessed
                    .as_deref()
                    .map(crate::storage::rows::parse_rfc3339)
                    .unwrap_or_else(|| crate::storage::rows::parse_rfc3339(&created_at));
                let days_since = days_between(reference, now).max(0.0);
                let rel_count = relation_count(conn, entity_id)? as f64;

                let fact_type: FactType = fact_type_str.parse().unwrap_or_default();
                let base = if fact_type == FactType::Static {
                    old_importance.max(0.8)
                } else {
                    old_importance
                };

                let new_importance = importance(
                    base,
                    days_since,
                    // access_count is not separately tracked; recency already
                    // captures recent use, so frequency uses a constant floor.
                    1.0,
                    rel_count,
                    max_relations as f64,
                    config,
                );

                if (new_importance - old_importance).abs() > 0.01 {
                    conn.execute(
                        "UPDATE observations SET importance = ?1 WHERE id = ?2",
                        params![new_importance, obs_id],
                    )?;
                    updated += 1;
                }
            }

            tracing::debug!(updated, "importance recalculation pass complete");
            Ok(updated)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recency_decay_clamps_at_zero_days() {
        assert_eq!(recency_decay(0.0, 30.0), 1.0);
        assert_eq!(recency_decay(-5.0, 30.0), 1.0);
    }

    #[test]
    fn recency_decay_is_63_percent_at_the_constant() {
        let value = recency_decay(30.0, 30.0);
        assert!((value - (-1.0f64).exp()).abs() < 1e-9);
    }

    #[test]
    fn frequency_score_clamps_negative_counts() {
        assert_eq!(frequency_score(-10.0), frequency_score(0.0));
    }

    #[test]
    fn centrality_with_no_relations_in_graph() {
        assert_eq!(centrality_score(0.0, 0.0), 0.75);
    }

    #[test]
    fn centrality_caps_at_one() {
        assert_eq!(centrality_score(100.0, 10.0), 1.0);
    }

    #[test]
    fn recalculate_importance_updates_stale_rows() {
        let store = Store::open_in_memory().unwrap();
        store
            .create_entity("Doc", "page", &["content".into()])
            .unwrap();
        let updated = store.recalculate_importance(&ScoringConfig::default()).unwrap();
        assert!(updated <= 1);
    }

    #[test]
    fn static_facts_use_a_base_of_at_least_point_eight() {
        let config = ScoringConfig::default();
        let with_low_base = importance(0.2, 0.0, 1.0, 0.0, 0.0, &config);
        let with_floor = importance(0.8, 0.0, 1.0, 0.0, 0.0, &config);
        assert!(with_low_base < with_floor);
    }
}
