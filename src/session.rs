//! Session capture: recording an assistant session as a specially-shaped
//! entity

use rusqlite::params;

use crate::error::{MemoryError, Result};
use crate::storage::Store;
use crate::types::{Entity, FactType, SessionEvent, SessionInfo, SessionMetadata, SessionStatus};

fn session_name(project: &str, started_at: chrono::DateTime<chrono::Utc>) -> String {
    format!("session-{project}-{}", started_at.format("%Y%m%dT%H%M%S%.3fZ"))
}

fn metadata_from_entity(entity: &Entity) -> Result<SessionMetadata> {
    let tag = entity
        .container_tag
        .as_deref()
        .ok_or_else(|| MemoryError::Corruption(format!("session {} has no metadata tag", entity.name)))?;
    Ok(serde_json::from_str(tag)?)
}

impl Store {
    /// Create a new session entity of type `session`, named
    /// `session-<project>-<timestamp>`, with a JSON metadata tag recording
    /// `status = active`
    pub fn create_session(&self, project: &str) -> Result<Entity> {
        let started_at = chrono::Utc::now();
        let name = session_name(project, started_at);
        let metadata = SessionMetadata {
            project: project.to_string(),
            status: SessionStatus::Active,
            started_at,
            ended_at: None,
        };
        let entity = self.create_entity(&name, "session", &[])?;
        self.set_container_tag(&name, &serde_json::to_string(&metadata)?)?;
        self.get_entity(&name).map(|e| e.entity)
    }

    /// Append a tool-use event observation (`fact_type = session_event`).
    pub fn capture_session_event(&self, session_name: &str, event: &SessionEvent) -> Result<()> {
        let content = serde_json::to_string(event)?;
        self.add_observation_with_type(session_name, &content, FactType::SessionEvent)
    }

    /// Append the one allowed summary observation and mark the session
    /// `completed` with `ended_at = now`
    pub fn complete_session(&self, session_name: &str, summary: &str) -> Result<()> {
        self.add_observation_with_type(session_name, summary, FactType::SessionSummary)?;

        let entity = self.get_entity(session_name)?.entity;
        let mut metadata = metadata_from_entity(&entity)?;
        metadata.status = SessionStatus::Completed;
        metadata.ended_at = Some(chrono::Utc::now());
        self.set_container_tag(session_name, &serde_json::to_string(&metadata)?)
    }

    /// The session entity, its parsed metadata, and the count of
    /// `session_event` observations
    pub fn get_session(&self, name: &str) -> Result<SessionInfo> {
        let with_observations = self.get_entity(name)?;
        let metadata = metadata_from_entity(&with_observations.entity)?;
        let event_count = with_observations
            .observations
            .iter()
            .filter(|o| o.fact_type == FactType::SessionEvent)
            .count() as i64;
        Ok(SessionInfo {
            entity: with_observations.entity,
            metadata,
            event_count,
        })
    }

    /// All sessions of type `session`, optionally filtered by parsed
    /// `project` and/or `status`, newest-started first, capped at `limit`.
    pub fn list_sessions(
        &self,
        project: Option<&str>,
        status: Option<SessionStatus>,
        limit: usize,
    ) -> Result<Vec<SessionInfo>> {
        let sessions = self.list_entities(Some("session"))?;
        let mut infos: Vec<SessionInfo> = Vec::new();
        for entity in sessions {
            let Ok(metadata) = metadata_from_entity(&entity) else {
                continue;
            };
            if let Some(project) = project {
                if metadata.project != project {
                    continue;
                }
            }
            if let Some(status) = status {
                if metadata.status != status {
                    continue;
                }
            }
            let event_count = self
                .with_connection(|conn| {
                    Ok(conn.query_row(
                        "SELECT COUNT(*) FROM observations WHERE entity_id = ?1 AND fact_type = 'session_event'",
                        params![entity.id],
                        |row| row.get::<_, i64>(0),
                    )?)
                })
                .unwrap_or(0);
            infos.push(SessionInfo {
                entity,
                metadata,
                event_count,
            });
        }
        infos.sort_by(|a, b| b.metadata.started_at.cmp(&a.metadata.started_at));
        infos.truncate(limit);
        Ok(infos)
    }

    /// `session_summary` observations within the past `hours`, newest
    /// first, filtered by `project` if given, packed into `token_budget`
    ///
    pub fn get_recent_session_summaries(
        &self,
        project: Option<&str>,
        hours: f64,
        token_budget: usize,
    ) -> Result<Vec<String>> {
        let cutoff = (chrono::Utc::now() - chrono::Duration::seconds((hours * 3600.0) as i64)).to_rfc3339();
        let rows: Vec<(String, String, String)> = self.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT e.name, e.container_tag, o.content
                 FROM observations o
                 JOIN entities e ON e.id = o.entity_id
                 WHERE e.entity_type = 'session' AND o.fact_type = 'session_summary' AND o.created_at >= ?1
                 ORDER BY o.created_at DESC",
            )?;
            let rows = stmt.query_map(params![cutoff], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                    row.get::<_, String>(2)?,
                ))
            })?;
            Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
        })?;

        let mut summaries = Vec::new();
        let mut used = 0usize;
        for (_name, tag, content) in rows {
            if let Some(project) = project {
                let matches_project = serde_json::from_str::<SessionMetadata>(&tag)
                    .map(|m| m.project == project)
                    .unwrap_or(false);
                if !matches_project {
                    continue;
                }
            }
            let cost = crate::context::estimate_tokens(&content);
            if used + cost > token_budget {
                break;
            }
            used += cost;
            summaries.push(content);
        }
        Ok(summaries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_session_lifecycle() {
        let store = Store::open_in_memory().unwrap();
        let entity = store.create_session("myapp").unwrap();
        assert!(entity.name.starts_with("session-myapp-"));

        store
            .capture_session_event(
                &entity.name,
                &SessionEvent {
                    tool_name: "Read".into(),
                    file_path: Some("src/lib.rs".into()),
                    command: None,
                    timestamp: None,
                },
            )
            .unwrap();

        let info = store.get_session(&entity.name).unwrap();
        assert_eq!(info.event_count, 1);
        assert_eq!(info.metadata.status, SessionStatus::Active);

        store.complete_session(&entity.name, "did some work").unwrap();
        let info = store.get_session(&entity.name).unwrap();
        assert_eq!(info.metadata.status, SessionStatus::Completed);
        assert!(info.metadata.ended_at.is_some());
    }

    #[test]
    fn list_sessions_filters_by_project_and_status() {
        let store = Store::open_in_memory().unwrap();
        let a = store.create_session("app-a").unwrap();
        store.create_session("app-b").unwrap();
        store.complete_session(&a.name, "done").unwrap();

        let active = store.list_sessions(None, Some(SessionStatus::Active), 10).unwrap();
        assert_eq!(active.len(), 1);

        let app_a = store.list_sessions(Some("app-a"), None, 10).unwrap();
        assert_eq!(app_a.len(), 1);
    }
}
