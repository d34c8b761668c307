//! Core types for the memory engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for an entity row
pub type EntityId = i64;
/// Unique identifier for an observation row
pub type ObservationId = i64;
/// Unique identifier for a relation row
pub type RelationId = i64;

/// Category controlling context-injection priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FactType {
    /// Durable preferences and project conventions; never drop below 0.8 importance.
    Static,
    /// Ordinary session-scoped context.
    #[default]
    Dynamic,
    /// A single conversational turn captured verbatim.
    SessionTurn,
    /// A tool-use event captured during an active session.
    SessionEvent,
    /// The one summary observation written when a session completes.
    SessionSummary,
}

impl FactType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FactType::Static => "static",
            FactType::Dynamic => "dynamic",
            FactType::SessionTurn => "session_turn",
            FactType::SessionEvent => "session_event",
            FactType::SessionSummary => "session_summary",
        }
    }

    /// SQL-level ordering key used by the context assembler:
    /// static first, then dynamic, then session_turn, everything else last.
    pub fn priority(&self) -> i32 {
        match self {
            FactType::Static => 0,
            FactType::Dynamic => 1,
            FactType::SessionTurn => 2,
            FactType::SessionEvent => 3,
            FactType::SessionSummary => 3,
        }
    }
}

impl std::str::FromStr for FactType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "static" => Ok(FactType::Static),
            "dynamic" => Ok(FactType::Dynamic),
            "session_turn" => Ok(FactType::SessionTurn),
            "session_event" => Ok(FactType::SessionEvent),
            "session_summary" => Ok(FactType::SessionSummary),
            other => Err(format!("unknown fact type: {other}")),
        }
    }
}

impl std::fmt::Display for FactType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named node in the knowledge graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub name: String,
    pub entity_type: String,
    pub created_at: DateTime<Utc>,
    pub version: i32,
    pub is_latest: bool,
    pub supersedes_id: Option<EntityId>,
    pub container_tag: Option<String>,
}

/// A text statement attached to an entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    pub id: ObservationId,
    pub entity_id: EntityId,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub fact_type: FactType,
    pub importance: f64,
    pub last_accessed: Option<DateTime<Utc>>,
    pub forget_after: Option<DateTime<Utc>>,
}

/// An entity plus its observations, ordered by `created_at` ascending.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityWithObservations {
    pub entity: Entity,
    pub observations: Vec<Observation>,
}

/// A typed directed edge between two entities
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relation {
    pub id: RelationId,
    pub from_entity_id: EntityId,
    pub to_entity_id: EntityId,
    pub relation_type: String,
    pub created_at: DateTime<Utc>,
}

/// Full graph dump returned by `read_graph`: entities
/// first, then relations, in that stable field order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphDump {
    pub entities: Vec<EntityWithObservations>,
    pub relations: Vec<Relation>,
}

/// A stored embedding for one observation
#[derive(Debug, Clone)]
pub struct StoredEmbedding {
    pub observation_id: ObservationId,
    pub vector: Vec<f64>,
    pub model: String,
    pub dimensions: i64,
    pub created_at: DateTime<Utc>,
}

/// An observation displaced into the archive table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchivedObservation {
    pub id: i64,
    pub original_entity_id: EntityId,
    pub entity_name: String,
    pub content: String,
    pub fact_type: FactType,
    pub importance: f64,
    pub archived_at: DateTime<Utc>,
}

/// Which retrieval strategy produced a ranked item, threaded through fusion
/// for observability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchSource {
    Fts,
    Vector,
}

impl SearchSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchSource::Fts => "fts",
            SearchSource::Vector => "vector",
        }
    }
}

/// One item in a ranked list produced by a single retrieval strategy,
/// grouped for fusion by `content`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedItem {
    pub entity_name: String,
    pub entity_type: String,
    pub content: String,
    pub score: f64,
    pub source: SearchSource,
}

/// Per-source provenance recorded for a fused result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceContribution {
    pub source: SearchSource,
    pub original_score: f64,
    pub rank: usize,
}

/// Output of reciprocal-rank or weighted fusion: one item per unique content,
/// sorted descending by fused score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusedResult {
    pub entity_name: String,
    pub entity_type: String,
    pub content: String,
    pub fused_score: f64,
    pub contributions: Vec<SourceContribution>,
}

/// One entry returned by the context assembler, already scored
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextEntry {
    pub entity_name: String,
    pub entity_type: String,
    pub content: String,
    pub fact_type: FactType,
    pub importance: f64,
    pub days_since_access: f64,
    pub final_score: f64,
}

/// Status of a captured session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Active,
    Completed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Completed => "completed",
        }
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(SessionStatus::Active),
            "completed" => Ok(SessionStatus::Completed),
            other => Err(format!("unknown session status: {other}")),
        }
    }
}

/// JSON metadata stored in a session entity's `container_tag` column
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub project: String,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

/// A session entity plus its parsed metadata and event count
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub entity: Entity,
    pub metadata: SessionMetadata,
    pub event_count: i64,
}

/// JSON body of a `session_event` observation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEvent {
    pub tool_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}
