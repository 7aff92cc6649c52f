//! SQLite schema and migrations for the SPO fact store.

use rusqlite::{Connection, Result as SqliteResult};

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema.
pub fn initialize_schema(conn: &Connection) -> SqliteResult<()> {
    // WAL keeps readers non-blocking while the single writer commits
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    let current_version: i32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if current_version < 1 {
        apply_v1_schema(conn)?;
    }

    Ok(())
}

/// Apply version 1 schema.
fn apply_v1_schema(conn: &Connection) -> SqliteResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS spo_triplets (
            id TEXT PRIMARY KEY,
            subject TEXT NOT NULL,
            predicate TEXT NOT NULL,
            object TEXT NOT NULL,
            confidence REAL NOT NULL CHECK(confidence >= 0.0 AND confidence <= 1.0),
            tier TEXT NOT NULL CHECK(tier IN ('bronze', 'silver', 'gold')) DEFAULT 'bronze',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            provenance_json TEXT NOT NULL,
            metadata_json TEXT
        )",
        [],
    )?;

    // Indexes for exact-filter queries and ordering
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_spo_subject ON spo_triplets(subject)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_spo_predicate ON spo_triplets(predicate)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_spo_object ON spo_triplets(object)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_spo_tier ON spo_triplets(tier)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_spo_confidence ON spo_triplets(confidence DESC)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_spo_created_at ON spo_triplets(created_at DESC)",
        [],
    )?;

    // Provenance origin lookup for per-node fact-quality scoring
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_spo_source_id
         ON spo_triplets(json_extract(provenance_json, '$.source_id'))",
        [],
    )?;

    // Full-text search over subject/predicate/object
    conn.execute(
        "CREATE VIRTUAL TABLE IF NOT EXISTS spo_fts USING fts5(
            id UNINDEXED,
            subject,
            predicate,
            object,
            content='spo_triplets',
            content_rowid='rowid'
        )",
        [],
    )?;

    // Triggers keep FTS in sync with the content table
    conn.execute(
        "CREATE TRIGGER IF NOT EXISTS spo_ai AFTER INSERT ON spo_triplets BEGIN
            INSERT INTO spo_fts(rowid, id, subject, predicate, object)
            VALUES (NEW.rowid, NEW.id, NEW.subject, NEW.predicate, NEW.object);
        END",
        [],
    )?;
    conn.execute(
        "CREATE TRIGGER IF NOT EXISTS spo_ad AFTER DELETE ON spo_triplets BEGIN
            INSERT INTO spo_fts(spo_fts, rowid, id, subject, predicate, object)
            VALUES ('delete', OLD.rowid, OLD.id, OLD.subject, OLD.predicate, OLD.object);
        END",
        [],
    )?;
    conn.execute(
        "CREATE TRIGGER IF NOT EXISTS spo_au AFTER UPDATE ON spo_triplets BEGIN
            INSERT INTO spo_fts(spo_fts, rowid, id, subject, predicate, object)
            VALUES ('delete', OLD.rowid, OLD.id, OLD.subject, OLD.predicate, OLD.object);
            INSERT INTO spo_fts(rowid, id, subject, predicate, object)
            VALUES (NEW.rowid, NEW.id, NEW.subject, NEW.predicate, NEW.object);
        END",
        [],
    )?;

    conn.execute("INSERT INTO schema_version (version) VALUES (1)", [])?;

    Ok(())
}

/// Get the current schema version.
pub fn get_schema_version(conn: &Connection) -> SqliteResult<i32> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )
}

/// Check if the schema is initialized.
pub fn is_initialized(conn: &Connection) -> bool {
    conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='spo_triplets'",
        [],
        |row| row.get::<_, i32>(0),
    )
    .map(|count| count > 0)
    .unwrap_or(false)
}
