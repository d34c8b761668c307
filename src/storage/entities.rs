//! Entity CRUD and versioning

use rusqlite::{params, Connection, OptionalExtension};

use super::observations::insert_observation_tx;
use super::rows::entity_from_row;
use crate::error::{MemoryError, Result};
use crate::types::{Entity, EntityWithObservations, FactType};

use super::Store;

impl Store {
    /// Create a new entity at version 1. Fails with [`MemoryError::AlreadyExists`]
    /// if a row with this name already has `is_latest = true`
    pub fn create_entity(
        &self,
        name: &str,
        entity_type: &str,
        observations: &[String],
    ) -> Result<Entity> {
        if name.trim().is_empty() {
            return Err(MemoryError::InvalidArgument("entity name is empty".into()));
        }
        self.with_transaction(|tx| {
            if latest_entity_row(tx, name)?.is_some() {
                return Err(MemoryError::AlreadyExists(name.to_string()));
            }
            let id = insert_entity_row(tx, name, entity_type, 1, true, None)?;
            for content in observations {
                insert_observation_tx(tx, id, content, FactType::default())?;
            }
            fetch_entity_by_id(tx, id)
        })
    }

    /// Create `name` if absent; otherwise supersede the current latest row
    /// with a new version. The flip of `is_latest` and the insert of the new
    /// row happen in one transaction
    pub fn create_or_update_entity(
        &self,
        name: &str,
        entity_type: &str,
        observations: &[String],
    ) -> Result<Entity> {
        if name.trim().is_empty() {
            return Err(MemoryError::InvalidArgument("entity name is empty".into()));
        }
        self.with_transaction(|tx| {
            let prev = latest_entity_row(tx, name)?;
            let (version, supersedes_id) = match &prev {
                Some(p) => {
                    tx.execute(
                        "UPDATE entities SET is_latest = 0 WHERE id = ?1",
                        [p.id],
                    )?;
                    (p.version + 1, Some(p.id))
                }
                None => (1, None),
            };
            let id = insert_entity_row(tx, name, entity_type, version, true, supersedes_id)?;
            for content in observations {
                insert_observation_tx(tx, id, content, FactType::default())?;
            }
            fetch_entity_by_id(tx, id)
        })
    }

    /// Fetch the latest row for `name` plus its observations, ordered by
    /// `created_at` ascending.
    pub fn get_entity(&self, name: &str) -> Result<EntityWithObservations> {
        self.with_connection(|conn| {
            let entity = latest_entity_row(conn, name)?
                .ok_or_else(|| MemoryError::NotFound(name.to_string()))?;
            let observations = super::observations::list_observations(conn, entity.id)?;
            Ok(EntityWithObservations {
                entity,
                observations,
            })
        })
    }

    /// All latest-version entities, optionally filtered by `entity_type`,
    /// ordered by name.
    pub fn list_entities(&self, entity_type: Option<&str>) -> Result<Vec<Entity>> {
        self.with_connection(|conn| {
            let mut stmt = if entity_type.is_some() {
                conn.prepare(
                    "SELECT * FROM entities WHERE is_latest = 1 AND entity_type = ?1 ORDER BY name",
                )?
            } else {
                conn.prepare("SELECT * FROM entities WHERE is_latest = 1 ORDER BY name")?
            };
            let rows = if let Some(t) = entity_type {
                stmt.query_map(params![t], entity_from_row)?
            } else {
                stmt.query_map([], entity_from_row)?
            };
            Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
        })
    }

    /// All versions sharing `name`, newest first.
    pub fn get_entity_history(&self, name: &str) -> Result<Vec<Entity>> {
        self.with_connection(|conn| {
            let mut stmt =
                conn.prepare("SELECT * FROM entities WHERE name = ?1 ORDER BY version DESC")?;
            let rows = stmt.query_map(params![name], entity_from_row)?;
            Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
        })
    }

    /// Delete the latest row for `name`; cascades to observations and relations.
    pub fn delete_entity(&self, name: &str) -> Result<()> {
        self.with_connection(|conn| {
            let entity =
                latest_entity_row(conn, name)?.ok_or_else(|| MemoryError::NotFound(name.to_string()))?;
            conn.execute("DELETE FROM entities WHERE id = ?1", [entity.id])?;
            Ok(())
        })
    }

    /// Set the project-scope tag on the latest row for `name`.
    pub fn set_container_tag(&self, name: &str, tag: &str) -> Result<()> {
        self.with_connection(|conn| {
            let entity =
                latest_entity_row(conn, name)?.ok_or_else(|| MemoryError::NotFound(name.to_string()))?;
            conn.execute(
                "UPDATE entities SET container_tag = ?1 WHERE id = ?2",
                params![tag, entity.id],
            )?;
            Ok(())
        })
    }

    /// Get the project-scope tag on the latest row for `name`.
    pub fn get_container_tag(&self, name: &str) -> Result<Option<String>> {
        self.with_connection(|conn| {
            let entity =
                latest_entity_row(conn, name)?.ok_or_else(|| MemoryError::NotFound(name.to_string()))?;
            Ok(entity.container_tag)
        })
    }

    /// All latest entities whose `container_tag` equals `tag`.
    pub fn list_by_container_tag(&self, tag: &str) -> Result<Vec<Entity>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM entities WHERE is_latest = 1 AND container_tag = ?1 ORDER BY name",
            )?;
            let rows = stmt.query_map(params![tag], entity_from_row)?;
            Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
        })
    }
}

pub(crate) fn latest_entity_row(conn: &Connection, name: &str) -> Result<Option<Entity>> {
    Ok(conn
        .query_row(
            "SELECT * FROM entities WHERE name = ?1 AND is_latest = 1",
            params![name],
            entity_from_row,
        )
        .optional()?)
}

pub(crate) fn entity_by_id(conn: &Connection, id: i64) -> Result<Option<Entity>> {
    Ok(conn
        .query_row("SELECT * FROM entities WHERE id = ?1", params![id], entity_from_row)
        .optional()?)
}

fn fetch_entity_by_id(conn: &Connection, id: i64) -> Result<Entity> {
    entity_by_id(conn, id)?.ok_or_else(|| MemoryError::Internal("entity vanished after insert".into()))
}

fn insert_entity_row(
    conn: &Connection,
    name: &str,
    entity_type: &str,
    version: i32,
    is_latest: bool,
    supersedes_id: Option<i64>,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO entities (name, entity_type, version, is_latest, supersedes_id) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![name, entity_type, version, is_latest as i64, supersedes_id],
    )?;
    Ok(conn.last_insert_rowid())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_then_get_roundtrips() {
        let store = Store::open_in_memory().unwrap();
        store
            .create_entity("MyApp", "project", &["React frontend".into()])
            .unwrap();
        let got = store.get_entity("MyApp").unwrap();
        assert_eq!(got.entity.entity_type, "project");
        assert_eq!(got.observations.len(), 1);
        assert_eq!(got.observations[0].content, "React frontend");
    }

    #[test]
    fn create_twice_is_already_exists() {
        let store = Store::open_in_memory().unwrap();
        store.create_entity("Doc", "page", &[]).unwrap();
        let err = store.create_entity("Doc", "page", &[]).unwrap_err();
        assert!(matches!(err, MemoryError::AlreadyExists(_)));
    }

    #[test]
    fn versioning_chain_has_one_latest() {
        let store = Store::open_in_memory().unwrap();
        store
            .create_or_update_entity("Doc", "page", &["v1".into()])
            .unwrap();
        let second = store
            .create_or_update_entity("Doc", "page", &["v2".into()])
            .unwrap();
        assert_eq!(second.version, 2);

        let got = store.get_entity("Doc").unwrap();
        assert_eq!(got.entity.version, 2);
        assert_eq!(got.observations.len(), 1);
        assert_eq!(got.observations[0].content, "v2");

        let history = store.get_entity_history("Doc").unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].version, 2);
        assert_eq!(history[1].version, 1);
        assert_eq!(history.iter().filter(|e| e.is_latest).count(), 1);
    }

    #[test]
    fn delete_missing_entity_not_found() {
        let store = Store::open_in_memory().unwrap();
        let err = store.delete_entity("nope").unwrap_err();
        assert!(matches!(err, MemoryError::NotFound(_)));
    }
}
