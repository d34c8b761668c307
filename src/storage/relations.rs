//! Relation CRUD

use rusqlite::{params, Row};

use super::entities::latest_entity_row;
use crate::error::{MemoryError, Result};
use crate::types::Relation;

use super::rows::parse_rfc3339;
use super::Store;

fn relation_from_row(row: &Row) -> rusqlite::Result<Relation> {
    let created_at: String = row.get("created_at")?;
    Ok(Relation {
        id: row.get("id")?,
        from_entity_id: row.get("from_entity_id")?,
        to_entity_id: row.get("to_entity_id")?,
        relation_type: row.get("relation_type")?,
        created_at: parse_rfc3339(&created_at),
    })
}

impl Store {
    /// Create a typed edge between the latest versions of `from` and `to`.
    /// Duplicates on `(from, to, type)` are silent no-ops
    pub fn create_relation(&self, from: &str, to: &str, relation_type: &str) -> Result<()> {
        self.with_connection(|conn| {
            let from_entity =
                latest_entity_row(conn, from)?.ok_or_else(|| MemoryError::NotFound(from.to_string()))?;
            let to_entity =
                latest_entity_row(conn, to)?.ok_or_else(|| MemoryError::NotFound(to.to_string()))?;
            conn.execute(
                "INSERT OR IGNORE INTO relations (from_entity_id, to_entity_id, relation_type) VALUES (?1, ?2, ?3)",
                params![from_entity.id, to_entity.id, relation_type],
            )?;
            Ok(())
        })
    }

    /// All edges incident on `entity_name` in either direction, ordered by
    /// `created_at` ascending.
    pub fn list_relations(&self, entity_name: &str) -> Result<Vec<Relation>> {
        self.with_connection(|conn| {
            let entity = latest_entity_row(conn, entity_name)?
                .ok_or_else(|| MemoryError::NotFound(entity_name.to_string()))?;
            let mut stmt = conn.prepare(
                "SELECT * FROM relations WHERE from_entity_id = ?1 OR to_entity_id = ?1 ORDER BY created_at ASC, id ASC",
            )?;
            let rows = stmt.query_map(params![entity.id], relation_from_row)?;
            Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
        })
    }

    /// Delete the edge matching `(from, to, type)` exactly.
    pub fn delete_relation(&self, from: &str, to: &str, relation_type: &str) -> Result<()> {
        self.with_connection(|conn| {
            let from_entity =
                latest_entity_row(conn, from)?.ok_or_else(|| MemoryError::NotFound(from.to_string()))?;
            let to_entity =
                latest_entity_row(conn, to)?.ok_or_else(|| MemoryError::NotFound(to.to_string()))?;
            let changed = conn.execute(
                "DELETE FROM relations WHERE from_entity_id = ?1 AND to_entity_id = ?2 AND relation_type = ?3",
                params![from_entity.id, to_entity.id, relation_type],
            )?;
            if changed == 0 {
                return Err(MemoryError::NotFound(format!(
                    "relation {from} --{relation_type}--> {to}"
                )));
            }
            Ok(())
        })
    }

}

/// Count of edges incident on `entity_id`, used by the scoring engine's
/// centrality term
pub(crate) fn relation_count(conn: &rusqlite::Connection, entity_id: i64) -> Result<i64> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM relations WHERE from_entity_id = ?1 OR to_entity_id = ?1",
        params![entity_id],
        |row| row.get(0),
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_and_list_both_directions() {
        let store = Store::open_in_memory().unwrap();
        store.create_entity("MyApp", "project", &[]).unwrap();
        store.create_entity("Architecture", "doc", &[]).unwrap();
        store
            .create_relation("MyApp", "Architecture", "has_decision")
            .unwrap();
        assert_eq!(store.list_relations("MyApp").unwrap().len(), 1);
        assert_eq!(store.list_relations("Architecture").unwrap().len(), 1);
    }

    #[test]
    fn duplicate_relation_is_noop() {
        let store = Store::open_in_memory().unwrap();
        store.create_entity("A", "t", &[]).unwrap();
        store.create_entity("B", "t", &[]).unwrap();
        store.create_relation("A", "B", "rel").unwrap();
        store.create_relation("A", "B", "rel").unwrap();
        assert_eq!(store.list_relations("A").unwrap().len(), 1);
    }

    #[test]
    fn missing_endpoint_not_found() {
        let store = Store::open_in_memory().unwrap();
        store.create_entity("A", "t", &[]).unwrap();
        let err = store.create_relation("A", "Ghost", "rel").unwrap_err();
        assert!(matches!(err, MemoryError::NotFound(_)));
    }
}
