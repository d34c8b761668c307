//! Full-graph dump

use super::observations::list_observations;
use super::rows::{entity_from_row, parse_rfc3339};
use crate::error::Result;
use crate::types::{EntityWithObservations, GraphDump, Relation};

use super::Store;

impl Store {
    /// Every latest entity with its observations, plus every relation.
    /// Field order is stable: entities first, then relations
    pub fn read_graph(&self) -> Result<GraphDump> {
        self.with_connection(|conn| {
            let mut stmt =
                conn.prepare("SELECT * FROM entities WHERE is_latest = 1 ORDER BY name")?;
            let entity_rows = stmt
                .query_map([], entity_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let mut entities = Vec::with_capacity(entity_rows.len());
            for entity in entity_rows {
                let observations = list_observations(conn, entity.id)?;
                entities.push(EntityWithObservations {
                    entity,
                    observations,
                });
            }

            let mut rel_stmt =
                conn.prepare("SELECT * FROM relations ORDER BY created_at ASC, id ASC")?;
            let relations = rel_stmt
                .query_map([], |row| {
                    let created_at: String = row.get("created_at")?;
                    Ok(Relation {
                        id: row.get("id")?,
                        from_entity_id: row.get("from_entity_id")?,
                        to_entity_id: row.get("to_entity_id")?,
                        relation_type: row.get("relation_type")?,
                        created_at: parse_rfc3339(&created_at),
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(GraphDump { entities, relations })
        })
    }
}
