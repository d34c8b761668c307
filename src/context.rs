//! Token-budgeted context assembly for injection into an assistant's prompt
//!

use rusqlite::params;

use crate::config::ContextConfig;
use crate::error::Result;
use crate::storage::rows::parse_rfc3339;
use crate::storage::Store;
use crate::types::{ContextEntry, FactType};

/// `len(text) / 4`, the rough token estimate used by the assembler and the
/// embedder's batching
pub fn estimate_tokens(text: &str) -> usize {
    text.len() / 4
}

fn entry_tokens(entry: &ContextEntry) -> usize {
    (entry.entity_name.len() + entry.content.len() + 20) / 4
}

fn recency_boost(days_since_access: f64) -> f64 {
    1.0 + 0.5 * (-days_since_access / 30.0).exp()
}

fn project_matches(project: &str, entity_name: &str, content: &str) -> bool {
    let needle = project.to_lowercase();
    entity_name.to_lowercase().contains(&needle) || content.to_lowercase().contains(&needle)
}

impl Store {
    /// Select observations of latest entities with `importance >=
    /// config.min_importance`, order by fact-type priority then importance
    /// descending, score each with the recency/project/static boosts, and
    /// greedily pack into `config.token_budget`
    pub fn get_context_for_injection(
        &self,
        config: &ContextConfig,
        project: Option<&str>,
    ) -> Result<Vec<ContextEntry>> {
        self.with_connection(|conn| {
            let now = chrono::Utc::now();
            let mut stmt = conn.prepare(
                "SELECT e.name, e.entity_type, o.content, o.fact_type, o.importance, o.created_at, o.last_accessed
                 FROM observations o
                 JOIN entities e ON e.id = o.entity_id
                 WHERE e.is_latest = 1 AND o.importance >= ?1",
            )?;
            let rows: Vec<(String, String, String, String, f64, String, Option<String>)> = stmt
                .query_map(params![config.min_importance], |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                        row.get(6)?,
                    ))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let mut entries: Vec<ContextEntry> = rows
                .into_iter()
                .map(|(entity_name, entity_type, content, fact_type_str, importance, created_at, last_accessed)| {
                    let fact_type: FactType = fact_type_str.parse().unwrap_or_default();
                    let reference = last_accessed
                        .as_deref()
                        .map(parse_rfc3339)
                        .unwrap_or_else(|| parse_rfc3339(&created_at));
                    let days_since_access = (now - reference).num_seconds() as f64 / 86_400.0;

                    let mut final_score = importance * recency_boost(days_since_access.max(0.0));
                    if let Some(project) = project.filter(|p| !p.is_empty()) {
                        if project_matches(project, &entity_name, &content) {
                            final_score *= 1.3;
                        }
                    }
                    if fact_type == FactType::Static {
                        final_score *= 1.2;
                    }

                    ContextEntry {
                        entity_name,
                        entity_type,
                        content,
                        fact_type,
                        importance,
                        days_since_access,
                        final_score,
                    }
                })
                .collect();

            entries.sort_by(|a, b| {
                a.fact_type
                    .priority()
                    .cmp(&b.fact_type.priority())
                    .then(b.importance.partial_cmp(&a.importance).unwrap_or(std::cmp::Ordering::Equal))
            });

            Ok(pack_to_budget(entries, config.token_budget))
        })
    }

    /// Observations accessed within the last `hours`, newest-accessed
    /// first; only the project-substring boost applies — no recency decay
    /// since the time window itself is the filter
    pub fn get_recent_context(
        &self,
        hours: f64,
        project: Option<&str>,
        token_budget: usize,
    ) -> Result<Vec<ContextEntry>> {
        self.with_connection(|conn| {
            let now = chrono::Utc::now();
            let cutoff = (now - chrono::Duration::seconds((hours * 3600.0) as i64)).to_rfc3339();

            let mut stmt = conn.prepare(
                "SELECT e.name, e.entity_type, o.content, o.fact_type, o.importance, o.last_accessed
                 FROM observations o
                 JOIN entities e ON e.id = o.entity_id
                 WHERE e.is_latest = 1 AND o.last_accessed IS NOT NULL AND o.last_accessed >= ?1
                 ORDER BY o.last_accessed DESC",
            )?;
            let rows: Vec<(String, String, String, String, f64, String)> = stmt
                .query_map(params![cutoff], |row| {
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

            let entries: Vec<ContextEntry> = rows
                .into_iter()
                .map(|(entity_name, entity_type, content, fact_type_str, importance, last_accessed)| {
                    let fact_type: FactType = fact_type_str.parse().unwrap_or_default();
                    let days_since_access = (now - parse_rfc3339(&last_accessed)).num_seconds() as f64 / 86_400.0;
                    let mut final_score = importance;
                    if let Some(project) = project.filter(|p| !p.is_empty()) {
                        if project_matches(project, &entity_name, &content) {
                            final_score *= 1.3;
                        }
                    }
                    ContextEntry {
                        entity_name,
                        entity_type,
                        content,
                        fact_type,
                        importance,
                        days_since_access,
                        final_score,
                    }
                })
                .collect();

            Ok(pack_to_budget(entries, token_budget))
        })
    }

    /// Same scoring as [`Store::get_context_for_injection`], but the project
    /// boost applies when `entities.container_tag == tag`
    pub fn get_context_with_container_tag(
        &self,
        config: &ContextConfig,
        tag: &str,
    ) -> Result<Vec<ContextEntry>> {
        self.with_connection(|conn| {
            let now = chrono::Utc::now();
            let mut stmt = conn.prepare(
                "SELECT e.name, e.entity_type, o.content, o.fact_type, o.importance, o.created_at, o.last_accessed, e.container_tag
                 FROM observations o
                 JOIN entities e ON e.id = o.entity_id
                 WHERE e.is_latest = 1 AND o.importance >= ?1",
            )?;
            let rows: Vec<(String, String, String, String, f64, String, Option<String>, Option<String>)> = stmt
                .query_map(params![config.min_importance], |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                        row.get(6)?,
                        row.get(7)?,
                    ))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let mut entries: Vec<ContextEntry> = rows
                .into_iter()
                .map(|(entity_name, entity_type, content, fact_type_str, importance, created_at, last_accessed, container_tag)| {
                    let fact_type: FactType = fact_type_str.parse().unwrap_or_default();
                    let reference = last_accessed
                        .as_deref()
                        .map(parse_rfc3339)
                        .unwrap_or_else(|| parse_rfc3339(&created_at));
                    let days_since_access = (now - reference).num_seconds() as f64 / 86_400.0;

                    let mut final_score = importance * recency_boost(days_since_access.max(0.0));
                    if container_tag.as_deref() == Some(tag) {
                        final_score *= 1.3;
                    }
                    if fact_type == FactType::Static {
                        final_score *= 1.2;
                    }

                    ContextEntry {
                        entity_name,
                        entity_type,
                        content,
                        fact_type,
                        importance,
                        days_since_access,
                        final_score,
                    }
                })
                .collect();

            entries.sort_by(|a, b| {
                a.fact_type
                    .priority()
                    .cmp(&b.fact_type.priority())
                    .then(b.importance.partial_cmp(&a.importance).unwrap_or(std::cmp::Ordering::Equal))
            });

            Ok(pack_to_budget(entries, config.token_budget))
        })
    }
}

/// Walk `entries` in order, stopping before the entry that would push the
/// running token estimate over `token_budget`.
fn pack_to_budget(entries: Vec<ContextEntry>, token_budget: usize) -> Vec<ContextEntry> {
    let mut packed = Vec::new();
    let mut used = 0usize;
    for entry in entries {
        let cost = entry_tokens(&entry);
        if used + cost > token_budget {
            break;
        }
        used += cost;
        packed.push(entry);
    }
    packed
}

/// Group `results` by fact type into three Markdown-ish sections. Empty
/// input yields the empty string
pub fn format_context_results(results: &[ContextEntry]) -> String {
    if results.is_empty() {
        return String::new();
    }

    let is_session = |f: FactType| {
        matches!(f, FactType::SessionTurn | FactType::SessionEvent | FactType::SessionSummary)
    };

    let mut sections = Vec::new();
    for (title, predicate) in [
        ("STATIC Project Conventions", &(|f: FactType| f == FactType::Static) as &dyn Fn(FactType) -> bool),
        ("DYNAMIC Recent Context", &(|f: FactType| f == FactType::Dynamic) as &dyn Fn(FactType) -> bool),
        ("SESSION Conversation History", &is_session as &dyn Fn(FactType) -> bool),
    ] {
        let items: Vec<&ContextEntry> = results.iter().filter(|e| predicate(e.fact_type)).collect();
        if items.is_empty() {
            continue;
        }
        let mut section = format!("## {title}\n");
        for item in items {
            section.push_str(&format!("- **{}**: {}\n", item.entity_name, item.content));
        }
        sections.push(section);
    }

    sections.join("\n")
}
