//! Decay and archival maintenance passes

use rusqlite::params;

use crate::config::DecayConfig;
use crate::error::Result;
use crate::scoring::recency_decay;

use super::rows::parse_rfc3339;
use super::Store;

/// Totals surfaced by the CLI's `decay stats` subcommand.
#[derive(Debug, Clone, Copy, Default)]
pub struct DecayStats {
    pub total_observations: i64,
    pub below_soft_threshold: i64,
    pub archived: i64,
    pub expired_pending: i64,
}

impl Store {
    /// Multiply importance by `recency_decay(days_since)` for every
    /// observation of a latest entity whose importance sits in
    /// `[threshold, 1)`. Calling this twice on the same day is a near
    /// no-op since `recency_decay` is ~1 for `days_since ≈ 0`
    pub fn apply_soft_decay(&self, threshold: f64, decay_constant: f64) -> Result<usize> {
        self.with_transaction(|conn| {
            let now = chrono::Utc::now();
            let mut stmt = conn.prepare(
                "SELECT o.id, o.importance, o.created_at, o.last_accessed
                 FROM observations o
                 JOIN entities e ON e.id = o.entity_id
                 WHERE e.is_latest = 1 AND o.importance >= ?1 AND o.importance < 1.0",
            )?;
            let rows: Vec<(i64, f64, String, Option<String>)> = stmt
                .query_map(params![threshold], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let mut touched = 0usize;
            for (id, current_importance, created_at, last_accessed) in rows {
                let reference = last_accessed
                    .as_deref()
                    .map(parse_rfc3339)
                    .unwrap_or_else(|| parse_rfc3339(&created_at));
                let days_since = (now - reference).num_seconds() as f64 / 86_400.0;
                let decayed = current_importance * recency_decay(days_since.max(0.0), decay_constant);
                conn.execute(
                    "UPDATE observations SET importance = ?1 WHERE id = ?2",
                    params![decayed, id],
                )?;
                touched += 1;
            }
            tracing::debug!(touched, "soft decay pass complete");
            Ok(touched)
        })
    }

    /// Move observations meeting the archive predicate into
    /// `archived_observations`, then delete the originals — both steps in
    /// one transaction so the counts agree
    pub fn archive_old(&self, config: &DecayConfig) -> Result<usize> {
        self.with_transaction(|conn| {
            let cutoff = chrono::Utc::now() - chrono::Duration::seconds((config.archive_after_days * 86_400.0) as i64);
            let cutoff_str = cutoff.to_rfc3339();

            conn.execute(
                "INSERT INTO archived_observations (original_entity_id, entity_name, content, fact_type, importance)
                 SELECT o.entity_id, e.name, o.content, o.fact_type, o.importance
                 FROM observations o
                 JOIN entities e ON e.id = o.entity_id
                 WHERE e.is_latest = 1
                   AND o.importance < ?1
                   AND o.fact_type != 'static'
                   AND COALESCE(o.last_accessed, o.created_at) < ?2",
                params![config.min_to_keep, cutoff_str],
            )?;

            let archived = conn.execute(
                "DELETE FROM observations
                 WHERE id IN (
                    SELECT o.id FROM observations o
                    JOIN entities e ON e.id = o.entity_id
                    WHERE e.is_latest = 1
                      AND o.importance < ?1
                      AND o.fact_type != 'static'
                      AND COALESCE(o.last_accessed, o.created_at) < ?2
                 )",
                params![config.min_to_keep, cutoff_str],
            )?;

            tracing::info!(archived, "archive pass moved stale observations out of the live graph");
            Ok(archived)
        })
    }

    /// Delete observations whose `forget_after` has passed.
    pub fn forget_expired(&self) -> Result<usize> {
        self.with_connection(|conn| {
            let now = chrono::Utc::now().to_rfc3339();
            let removed = conn.execute(
                "DELETE FROM observations WHERE forget_after IS NOT NULL AND forget_after < ?1",
                params![now],
            )?;
            if removed > 0 {
                tracing::info!(removed, "expired observations forgotten");
            }
            Ok(removed)
        })
    }

    /// Delete archived rows older than `days`.
    pub fn forget_old_archived(&self, days: f64) -> Result<usize> {
        self.with_connection(|conn| {
            let cutoff = (chrono::Utc::now() - chrono::Duration::seconds((days * 86_400.0) as i64)).to_rfc3339();
            Ok(conn.execute(
                "DELETE FROM archived_observations WHERE archived_at < ?1",
                params![cutoff],
            )?)
        })
    }

    /// Counts used by the CLI's `decay stats` subcommand.
    pub fn decay_stats(&self, config: &DecayConfig) -> Result<DecayStats> {
        self.with_connection(|conn| {
            let total_observations: i64 =
                conn.query_row("SELECT COUNT(*) FROM observations", [], |row| row.get(0))?;
            let below_soft_threshold: i64 = conn.query_row(
                "SELECT COUNT(*) FROM observations WHERE importance < ?1",
                params![config.soft_decay_threshold],
                |row| row.get(0),
            )?;
            let archived: i64 = conn.query_row(
                "SELECT COUNT(*) FROM archived_observations",
                [],
                |row| row.get(0),
            )?;
            let now = chrono::Utc::now().to_rfc3339();
            let expired_pending: i64 = conn.query_row(
                "SELECT COUNT(*) FROM observations WHERE forget_after IS NOT NULL AND forget_after < ?1",
                params![now],
                |row| row.get(0),
            )?;
            Ok(DecayStats {
                total_observations,
                below_soft_threshold,
                archived,
                expired_pending,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn soft_decay_is_a_near_noop_same_day() {
        let store = Store::open_in_memory().unwrap();
        store.create_entity("Doc", "page", &["x".into()]).unwrap();
        store.apply_soft_decay(0.3, 30.0).unwrap();
        let entity = store.get_entity("Doc").unwrap();
        assert!((entity.observations[0].importance - 1.0).abs() < 0.05);
    }

    #[test]
    fn archive_old_moves_stale_low_importance_rows() {
        let store = Store::open_in_memory().unwrap();
        store.create_entity("Doc", "page", &["stale".into()]).unwrap();
        store.with_connection(|conn| {
            conn.execute(
                "UPDATE observations SET importance = 0.05, created_at = '2000-01-01T00:00:00Z', last_accessed = NULL",
                [],
            )?;
            Ok(())
        }).unwrap();

        let archived = store.archive_old(&DecayConfig::default()).unwrap();
        assert_eq!(archived, 1);
        assert_eq!(store.get_entity("Doc").unwrap().observations.len(), 0);

        let stats = store.decay_stats(&DecayConfig::default()).unwrap();
        assert_eq!(stats.archived, 1);
    }

    #[test]
    fn forget_expired_deletes_past_due_rows() {
        let store = Store::open_in_memory().unwrap();
        store.create_entity("Doc", "page", &["temp".into()]).unwrap();
        store.with_connection(|conn| {
            conn.execute(
                "UPDATE observations SET forget_after = '2000-01-01T00:00:00Z'",
                [],
            )?;
            Ok(())
        }).unwrap();

        let removed = store.forget_expired().unwrap();
        assert_eq!(removed, 1);
    }
}
