//! Observation CRUD

use rusqlite::{params, Connection, OptionalExtension};

use super::entities::latest_entity_row;
use super::rows::{fact_type_column, observation_from_row};
use crate::error::{MemoryError, Result};
use crate::types::{FactType, Observation};

use super::Store;

impl Store {
    /// Append an observation with the default fact type (`dynamic`).
    /// Duplicate `(entity, content)` is a silent no-op
    pub fn add_observation(&self, entity_name: &str, content: &str) -> Result<()> {
        self.add_observation_with_type(entity_name, content, FactType::default())
    }

    /// Append an observation with an explicit fact type.
    pub fn add_observation_with_type(
        &self,
        entity_name: &str,
        content: &str,
        fact_type: FactType,
    ) -> Result<()> {
        self.with_connection(|conn| {
            let entity = latest_entity_row(conn, entity_name)?
                .ok_or_else(|| MemoryError::NotFound(entity_name.to_string()))?;
            insert_observation_tx(conn, entity.id, content, fact_type)?;
            Ok(())
        })
    }

    /// Delete the observation with this exact content under `entity_name`.
    pub fn delete_observation(&self, entity_name: &str, content: &str) -> Result<()> {
        self.with_connection(|conn| {
            let entity = latest_entity_row(conn, entity_name)?
                .ok_or_else(|| MemoryError::NotFound(entity_name.to_string()))?;
            let changed = conn.execute(
                "DELETE FROM observations WHERE entity_id = ?1 AND content = ?2",
                params![entity.id, content],
            )?;
            if changed == 0 {
                return Err(MemoryError::NotFound(format!(
                    "observation {content:?} on {entity_name}"
                )));
            }
            Ok(())
        })
    }

    /// Set the `last_accessed` timestamp to now on every observation of the
    /// latest version of `entity_name`
    pub fn update_last_accessed(&self, entity_name: &str) -> Result<()> {
        self.with_connection(|conn| {
            let entity = latest_entity_row(conn, entity_name)?
                .ok_or_else(|| MemoryError::NotFound(entity_name.to_string()))?;
            conn.execute(
                "UPDATE observations SET last_accessed = CURRENT_TIMESTAMP WHERE entity_id = ?1",
                params![entity.id],
            )?;
            Ok(())
        })
    }
}

pub(crate) fn list_observations(conn: &Connection, entity_id: i64) -> Result<Vec<Observation>> {
    let mut stmt = conn.prepare(
        "SELECT * FROM observations WHERE entity_id = ?1 ORDER BY created_at ASC, id ASC",
    )?;
    let rows = stmt.query_map(params![entity_id], observation_from_row)?;
    Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
}

pub(crate) fn observation_by_content(
    conn: &Connection,
    entity_id: i64,
    content: &str,
) -> Result<Option<Observation>> {
    Ok(conn
        .query_row(
            "SELECT * FROM observations WHERE entity_id = ?1 AND content = ?2",
            params![entity_id, content],
            observation_from_row,
        )
        .optional()?)
}

/// Insert-or-ignore: re-inserting identical `(entity_id, content)` is a
/// silent no-op
pub(crate) fn insert_observation_tx(
    conn: &Connection,
    entity_id: i64,
    content: &str,
    fact_type: FactType,
) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO observations (entity_id, content, fact_type) VALUES (?1, ?2, ?3)",
        params![entity_id, content, fact_type_column(fact_type)],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_insert_is_noop() {
        let store = Store::open_in_memory().unwrap();
        store.create_entity("Doc", "page", &[]).unwrap();
        store.add_observation("Doc", "hello").unwrap();
        store.add_observation("Doc", "hello").unwrap();
        let got = store.get_entity("Doc").unwrap();
        assert_eq!(got.observations.len(), 1);
    }

    #[test]
    fn delete_then_delete_again_is_not_found() {
        let store = Store::open_in_memory().unwrap();
        store.create_entity("Doc", "page", &["bye".into()]).unwrap();
        store.delete_observation("Doc", "bye").unwrap();
        let err = store.delete_observation("Doc", "bye").unwrap_err();
        assert!(matches!(err, MemoryError::NotFound(_)));
        assert_eq!(store.get_entity("Doc").unwrap().observations.len(), 0);
    }

    #[test]
    fn add_observation_missing_entity_not_found() {
        let store = Store::open_in_memory().unwrap();
        let err = store.add_observation("Ghost", "x").unwrap_err();
        assert!(matches!(err, MemoryError::NotFound(_)));
    }
}
