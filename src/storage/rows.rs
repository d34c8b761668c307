//! Row-mapping helpers shared across the storage modules.

use chrono::{DateTime, Utc};
use rusqlite::Row;

use crate::types::{Entity, FactType, Observation};

pub(crate) fn parse_rfc3339(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

pub(crate) fn parse_rfc3339_opt(s: Option<String>) -> Option<DateTime<Utc>> {
    s.and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

pub(crate) fn entity_from_row(row: &Row) -> rusqlite::Result<Entity> {
    let created_at: String = row.get("created_at")?;
    let is_latest: i64 = row.get("is_latest")?;
    Ok(Entity {
        id: row.get("id")?,
        name: row.get("name")?,
        entity_type: row.get("entity_type")?,
        created_at: parse_rfc3339(&created_at),
        version: row.get("version")?,
        is_latest: is_latest != 0,
        supersedes_id: row.get("supersedes_id")?,
        container_tag: row.get("container_tag")?,
    })
}

pub(crate) fn observation_from_row(row: &Row) -> rusqlite::Result<Observation> {
    let created_at: String = row.get("created_at")?;
    let fact_type_str: String = row.get("fact_type")?;
    let last_accessed: Option<String> = row.get("last_accessed")?;
    let forget_after: Option<String> = row.get("forget_after")?;
    Ok(Observation {
        id: row.get("id")?,
        entity_id: row.get("entity_id")?,
        content: row.get("content")?,
        created_at: parse_rfc3339(&created_at),
        fact_type: fact_type_str.parse().unwrap_or_default(),
        importance: row.get("importance")?,
        last_accessed: parse_rfc3339_opt(last_accessed),
        forget_after: parse_rfc3339_opt(forget_after),
    })
}

pub(crate) fn fact_type_column(fact_type: FactType) -> String {
    fact_type.as_str().to_string()
}
