//! Ordered, idempotent schema migrations
//!
//! Every migration is safe to re-run: table creation uses `IF NOT EXISTS`,
//! column additions probe `pragma_table_info` first. The version row is
//! updated in the same call as the schema change so a crash between the two
//! is recovered by simply re-running `run_migrations`.

use rusqlite::Connection;

use crate::error::Result;

/// Current schema version. Bump this and add a `migrate_vN` when the schema
/// changes.
pub const SCHEMA_VERSION: i32 = 6;

/// Apply all migrations up to [`SCHEMA_VERSION`] that have not yet run.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    migrate_to(conn, SCHEMA_VERSION)
}

/// Apply migrations up to (and including) `target`, skipping any already
/// recorded. `target` must not exceed [`SCHEMA_VERSION`].
pub fn migrate_to(conn: &Connection, target: i32) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    let current: i32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    let steps: [(i32, fn(&Connection) -> Result<()>, &str); 6] = [
        (1, migrate_v1, "base graph tables and FTS indexes"),
        (2, migrate_v2, "fact_type column"),
        (3, migrate_v3, "importance, forget_after, last_accessed"),
        (4, migrate_v4, "entity versioning columns"),
        (5, migrate_v5, "container_tag"),
        (6, migrate_v6, "embeddings, archive table, entity name uniqueness rebuild"),
    ];

    for (version, step, description) in steps {
        if current < version && version <= target {
            step(conn)?;
            tracing::info!(version, description, "migration applied");
        }
    }

    Ok(())
}

/// Returns the schema version currently recorded in the database.
pub fn current_version(conn: &Connection) -> Result<i32> {
    Ok(conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?)
}

fn record_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute(
        "INSERT INTO schema_version (version) VALUES (?1)",
        [version],
    )?;
    Ok(())
}

fn has_column(conn: &Connection, table: &str, column: &str) -> Result<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let exists = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .filter_map(std::result::Result::ok)
        .any(|name| name == column);
    Ok(exists)
}

/// v1: base entities/observations/relations tables and FTS indexes.
fn migrate_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS entities (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            entity_type TEXT NOT NULL DEFAULT 'note',
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );

        CREATE TABLE IF NOT EXISTS observations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            entity_id INTEGER NOT NULL,
            content TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE(entity_id, content),
            FOREIGN KEY (entity_id) REFERENCES entities(id) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS relations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            from_entity_id INTEGER NOT NULL,
            to_entity_id INTEGER NOT NULL,
            relation_type TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE(from_entity_id, to_entity_id, relation_type),
            FOREIGN KEY (from_entity_id) REFERENCES entities(id) ON DELETE CASCADE,
            FOREIGN KEY (to_entity_id) REFERENCES entities(id) ON DELETE CASCADE
        );

        CREATE VIRTUAL TABLE IF NOT EXISTS observations_fts USING fts5(
            content, content='observations', content_rowid='id', tokenize='porter unicode61'
        );

        CREATE VIRTUAL TABLE IF NOT EXISTS entities_fts USING fts5(
            name, entity_type, content='entities', content_rowid='id', tokenize='porter unicode61'
        );

        CREATE TRIGGER IF NOT EXISTS observations_ai AFTER INSERT ON observations BEGIN
            INSERT INTO observations_fts(rowid, content) VALUES (new.id, new.content);
        END;
        CREATE TRIGGER IF NOT EXISTS observations_ad AFTER DELETE ON observations BEGIN
            INSERT INTO observations_fts(observations_fts, rowid, content) VALUES ('delete', old.id, old.content);
        END;
        CREATE TRIGGER IF NOT EXISTS observations_au AFTER UPDATE ON observations BEGIN
            INSERT INTO observations_fts(observations_fts, rowid, content) VALUES ('delete', old.id, old.content);
            INSERT INTO observations_fts(rowid, content) VALUES (new.id, new.content);
        END;

        CREATE TRIGGER IF NOT EXISTS entities_ai AFTER INSERT ON entities BEGIN
            INSERT INTO entities_fts(rowid, name, entity_type) VALUES (new.id, new.name, new.entity_type);
        END;
        CREATE TRIGGER IF NOT EXISTS entities_ad AFTER DELETE ON entities BEGIN
            INSERT INTO entities_fts(entities_fts, rowid, name, entity_type) VALUES ('delete', old.id, old.name, old.entity_type);
        END;
        CREATE TRIGGER IF NOT EXISTS entities_au AFTER UPDATE ON entities BEGIN
            INSERT INTO entities_fts(entities_fts, rowid, name, entity_type) VALUES ('delete', old.id, old.name, old.entity_type);
            INSERT INTO entities_fts(rowid, name, entity_type) VALUES (new.id, new.name, new.entity_type);
        END;
        "#,
    )?;
    record_version(conn, 1)
}

/// v2: `fact_type` on observations, default `dynamic`.
fn migrate_v2(conn: &Connection) -> Result<()> {
    if !has_column(conn, "observations", "fact_type")? {
        conn.execute_batch(
            "ALTER TABLE observations ADD COLUMN fact_type TEXT NOT NULL DEFAULT 'dynamic';",
        )?;
    }
    record_version(conn, 2)
}

/// v3: importance, forget_after, last_accessed on observations.
fn migrate_v3(conn: &Connection) -> Result<()> {
    if !has_column(conn, "observations", "importance")? {
        conn.execute_batch(
            "ALTER TABLE observations ADD COLUMN importance REAL NOT NULL DEFAULT 1.0;",
        )?;
    }
    if !has_column(conn, "observations", "forget_after")? {
        conn.execute_batch("ALTER TABLE observations ADD COLUMN forget_after TEXT;")?;
    }
    if !has_column(conn, "observations", "last_accessed")? {
        conn.execute_batch("ALTER TABLE observations ADD COLUMN last_accessed TEXT;")?;
    }
    record_version(conn, 3)
}

/// v4: versioning columns on entities (`supersedes_id`, `is_latest`, `version`).
fn migrate_v4(conn: &Connection) -> Result<()> {
    if !has_column(conn, "entities", "version")? {
        conn.execute_batch("ALTER TABLE entities ADD COLUMN version INTEGER NOT NULL DEFAULT 1;")?;
    }
    if !has_column(conn, "entities", "is_latest")? {
        conn.execute_batch(
            "ALTER TABLE entities ADD COLUMN is_latest INTEGER NOT NULL DEFAULT 1;",
        )?;
    }
    if !has_column(conn, "entities", "supersedes_id")? {
        conn.execute_batch("ALTER TABLE entities ADD COLUMN supersedes_id INTEGER;")?;
    }
    record_version(conn, 4)
}

/// v5: `container_tag` on entities plus a supporting index.
fn migrate_v5(conn: &Connection) -> Result<()> {
    if !has_column(conn, "entities", "container_tag")? {
        conn.execute_batch("ALTER TABLE entities ADD COLUMN container_tag TEXT;")?;
    }
    conn.execute_batch(
        "CREATE INDEX IF NOT EXISTS idx_entities_container_tag ON entities(container_tag);",
    )?;
    record_version(conn, 5)
}

/// v6: embedding table, archive table, and the entity-name uniqueness
/// rebuild
fn migrate_v6(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS observation_embeddings (
            observation_id INTEGER PRIMARY KEY,
            embedding BLOB NOT NULL,
            model TEXT NOT NULL,
            dimensions INTEGER NOT NULL,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            FOREIGN KEY (observation_id) REFERENCES observations(id) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS archived_observations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            original_entity_id INTEGER NOT NULL,
            entity_name TEXT NOT NULL,
            content TEXT NOT NULL,
            fact_type TEXT NOT NULL,
            importance REAL NOT NULL,
            archived_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );
        "#,
    )?;

    let unique_name = conn
        .query_row(
            "SELECT sql FROM sqlite_master WHERE type='table' AND name='entities'",
            [],
            |row| row.get::<_, String>(0),
        )
        .unwrap_or_default();

    if unique_name.contains("name TEXT NOT NULL UNIQUE") {
        conn.execute_batch(
            r#"
            DROP TRIGGER IF EXISTS entities_ai;
            DROP TRIGGER IF EXISTS entities_ad;
            DROP TRIGGER IF EXISTS entities_au;

            CREATE TABLE entities_new (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                entity_type TEXT NOT NULL DEFAULT 'note',
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                version INTEGER NOT NULL DEFAULT 1,
                is_latest INTEGER NOT NULL DEFAULT 1,
                supersedes_id INTEGER,
                container_tag TEXT
            );
            INSERT INTO entities_new (id, name, entity_type, created_at, version, is_latest, supersedes_id, container_tag)
                SELECT id, name, entity_type, created_at, version, is_latest, supersedes_id, container_tag FROM entities;
            DROP TABLE entities;
            ALTER TABLE entities_new RENAME TO entities;

            CREATE INDEX IF NOT EXISTS idx_entities_container_tag ON entities(container_tag);
            CREATE INDEX IF NOT EXISTS idx_entities_name ON entities(name);

            CREATE TRIGGER entities_ai AFTER INSERT ON entities BEGIN
                INSERT INTO entities_fts(rowid, name, entity_type) VALUES (new.id, new.name, new.entity_type);
            END;
            CREATE TRIGGER entities_ad AFTER DELETE ON entities BEGIN
                INSERT INTO entities_fts(entities_fts, rowid, name, entity_type) VALUES ('delete', old.id, old.name, old.entity_type);
            END;
            CREATE TRIGGER entities_au AFTER UPDATE ON entities BEGIN
                INSERT INTO entities_fts(entities_fts, rowid, name, entity_type) VALUES ('delete', old.id, old.name, old.entity_type);
                INSERT INTO entities_fts(rowid, name, entity_type) VALUES (new.id, new.name, new.entity_type);
            END;
            "#,
        )?;
    } else {
        conn.execute_batch("CREATE INDEX IF NOT EXISTS idx_entities_name ON entities(name);")?;
    }

    record_version(conn, 6)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrating_twice_is_a_noop() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();
        assert_eq!(current_version(&conn).unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn partial_application_is_recovered() {
        let conn = Connection::open_in_memory().unwrap();
        migrate_v1(&conn).unwrap();
        // Simulate a crash: schema changed (v1 applied) but nothing past it.
        run_migrations(&conn).unwrap();
        assert_eq!(current_version(&conn).unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn migrate_to_stops_at_the_requested_version() {
        let conn = Connection::open_in_memory().unwrap();
        migrate_to(&conn, 3).unwrap();
        assert_eq!(current_version(&conn).unwrap(), 3);
        assert!(has_column(&conn, "observations", "importance").unwrap());
        assert!(!has_column(&conn, "entities", "version").unwrap());

        migrate_to(&conn, SCHEMA_VERSION).unwrap();
        assert_eq!(current_version(&conn).unwrap(), SCHEMA_VERSION);
    }
}
