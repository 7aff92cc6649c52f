//! SQLite-backed SPO fact store.
//!
//! Single-writer discipline: all mutations go through one connection guarded
//! by a mutex; readers see committed snapshots. The FTS index is maintained
//! by triggers, so insert/update/delete keep it in sync atomically.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::error::{Error, Result};
use crate::facts::schema::{initialize_schema, is_initialized};
use crate::facts::types::{FactQuery, FactStoreStats, Provenance, Tier, Triplet, TripletId};

/// Embedded transactional store for SPO triplets.
///
/// Cloning is cheap; clones share the same underlying connection.
#[derive(Clone)]
pub struct FactStore {
    conn: Arc<Mutex<Connection>>,
}

impl FactStore {
    /// Open or create a fact store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;

        if !is_initialized(&conn) {
            initialize_schema(&conn)?;
        }

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create an in-memory store (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| Error::Internal(format!("Failed to lock connection: {}", e)))?;
        f(&conn)
    }

    /// Insert a new triplet. Assigns a fresh id if the triplet's id is empty,
    /// validates invariants, and stamps `updated_at`.
    pub fn insert(&self, triplet: &Triplet) -> Result<TripletId> {
        let mut triplet = triplet.clone();
        if triplet.id.as_str().is_empty() {
            triplet.id = TripletId::generate();
        }
        triplet.validate()?;
        triplet.updated_at = Utc::now();

        let provenance_json = serde_json::to_string(&triplet.provenance)?;
        let metadata_json = serde_json::to_string(&triplet.metadata)?;

        self.with_conn(|conn| {
            let exists: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM spo_triplets WHERE id = ?1",
                    params![triplet.id.as_str()],
                    |row| row.get(0),
                )
                .optional()?;
            if exists.is_some() {
                return Err(Error::DuplicateId(triplet.id.to_string()));
            }

            conn.execute(
                "INSERT INTO spo_triplets
                 (id, subject, predicate, object, confidence, tier, created_at, updated_at, provenance_json, metadata_json)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    triplet.id.as_str(),
                    triplet.subject,
                    triplet.predicate,
                    triplet.object,
                    triplet.confidence,
                    triplet.tier.as_str(),
                    triplet.created_at.to_rfc3339(),
                    triplet.updated_at.to_rfc3339(),
                    provenance_json,
                    metadata_json,
                ],
            )?;
            Ok(())
        })?;

        Ok(triplet.id)
    }

    /// Get a triplet by id.
    pub fn get(&self, id: &TripletId) -> Result<Option<Triplet>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, subject, predicate, object, confidence, tier,
                            created_at, updated_at, provenance_json, metadata_json
                     FROM spo_triplets WHERE id = ?1",
                    params![id.as_str()],
                    row_to_triplet,
                )
                .optional()?;
            Ok(row)
        })
    }

    /// Query triplets matching all supplied exact filters, ordered by
    /// confidence descending then creation time descending.
    pub fn query(&self, query: &FactQuery) -> Result<Vec<Triplet>> {
        self.with_conn(|conn| {
            let mut sql = String::from(
                "SELECT id, subject, predicate, object, confidence, tier,
                        created_at, updated_at, provenance_json, metadata_json
                 FROM spo_triplets WHERE 1=1",
            );
            let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

            if let Some(ref subject) = query.subject {
                sql.push_str(" AND subject = ?");
                params_vec.push(Box::new(subject.clone()));
            }
            if let Some(ref predicate) = query.predicate {
                sql.push_str(" AND predicate = ?");
                params_vec.push(Box::new(predicate.clone()));
            }
            if let Some(ref object) = query.object {
                sql.push_str(" AND object = ?");
                params_vec.push(Box::new(object.clone()));
            }
            if let Some(tier) = query.tier {
                sql.push_str(" AND tier = ?");
                params_vec.push(Box::new(tier.as_str().to_string()));
            }
            if query.min_confidence > 0.0 {
                sql.push_str(" AND confidence >= ?");
                params_vec.push(Box::new(query.min_confidence));
            }

            sql.push_str(" ORDER BY confidence DESC, created_at DESC LIMIT ?");
            params_vec.push(Box::new(query.limit as i64));

            let params_refs: Vec<&dyn rusqlite::ToSql> =
                params_vec.iter().map(|b| b.as_ref()).collect();

            let mut stmt = conn.prepare(&sql)?;
            let triplets = stmt
                .query_map(params_refs.as_slice(), row_to_triplet)?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            Ok(triplets)
        })
    }

    /// Full-text ranked retrieval over subject/predicate/object. Ties in FTS
    /// rank break by confidence, then recency.
    pub fn search(&self, text: &str, limit: usize) -> Result<Vec<Triplet>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT t.id, t.subject, t.predicate, t.object, t.confidence, t.tier,
                        t.created_at, t.updated_at, t.provenance_json, t.metadata_json
                 FROM spo_triplets t
                 JOIN spo_fts f ON t.rowid = f.rowid
                 WHERE spo_fts MATCH ?1
                 ORDER BY rank, t.confidence DESC, t.created_at DESC
                 LIMIT ?2",
            )?;

            let triplets = stmt
                .query_map(params![text, limit as i64], row_to_triplet)?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            Ok(triplets)
        })
    }

    /// Write a new tier for a triplet and stamp `updated_at`.
    ///
    /// Monotonicity is not enforced here; the tier promoter is the sole
    /// caller for tier moves.
    pub fn update_tier(&self, id: &TripletId, new_tier: Tier) -> Result<bool> {
        self.with_conn(|conn| {
            let rows = conn.execute(
                "UPDATE spo_triplets SET tier = ?1, updated_at = ?2 WHERE id = ?3",
                params![new_tier.as_str(), Utc::now().to_rfc3339(), id.as_str()],
            )?;
            Ok(rows > 0)
        })
    }

    /// Mark a triplet verified and append a verification source to its
    /// provenance (no-op on the source set if already present).
    pub fn update_provenance(
        &self,
        id: &TripletId,
        verified: bool,
        new_source: Option<&str>,
    ) -> Result<bool> {
        let Some(mut triplet) = self.get(id)? else {
            return Ok(false);
        };

        triplet.provenance.verified = verified;
        if let Some(source) = new_source {
            triplet.provenance.add_verification_source(source);
        }

        let provenance_json = serde_json::to_string(&triplet.provenance)?;
        self.with_conn(|conn| {
            let rows = conn.execute(
                "UPDATE spo_triplets SET provenance_json = ?1, updated_at = ?2 WHERE id = ?3",
                params![provenance_json, Utc::now().to_rfc3339(), id.as_str()],
            )?;
            Ok(rows > 0)
        })
    }

    /// Delete a triplet; the FTS entry goes with it via trigger.
    pub fn delete(&self, id: &TripletId) -> Result<bool> {
        self.with_conn(|conn| {
            let rows = conn.execute(
                "DELETE FROM spo_triplets WHERE id = ?1",
                params![id.as_str()],
            )?;
            Ok(rows > 0)
        })
    }

    /// All triplets whose provenance originates at `source_id` or whose
    /// verification sources include it. Backs per-node fact-quality scoring.
    pub fn facts_for_source(&self, source_id: &str) -> Result<Vec<Triplet>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, subject, predicate, object, confidence, tier,
                        created_at, updated_at, provenance_json, metadata_json
                 FROM spo_triplets
                 WHERE json_extract(provenance_json, '$.source_id') = ?1
                    OR EXISTS (
                        SELECT 1 FROM json_each(provenance_json, '$.verification_sources')
                        WHERE json_each.value = ?1
                    )",
            )?;

            let triplets = stmt
                .query_map(params![source_id], row_to_triplet)?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            Ok(triplets)
        })
    }

    /// All triplets up to `limit`, ordered by creation time ascending. Used by
    /// the intelligence layer for full-store scans.
    pub fn all(&self, limit: usize) -> Result<Vec<Triplet>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, subject, predicate, object, confidence, tier,
                        created_at, updated_at, provenance_json, metadata_json
                 FROM spo_triplets ORDER BY created_at ASC LIMIT ?1",
            )?;

            let triplets = stmt
                .query_map(params![limit as i64], row_to_triplet)?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            Ok(triplets)
        })
    }

    /// Counts per tier, verified count, and mean confidence.
    pub fn stats(&self) -> Result<FactStoreStats> {
        self.with_conn(|conn| {
            let total: i64 =
                conn.query_row("SELECT COUNT(*) FROM spo_triplets", [], |row| row.get(0))?;

            let by_tier: HashMap<Tier, u64> = {
                let mut stmt =
                    conn.prepare("SELECT tier, COUNT(*) FROM spo_triplets GROUP BY tier")?;
                let rows = stmt.query_map([], |row| {
                    let tier_str: String = row.get(0)?;
                    let count: i64 = row.get(1)?;
                    Ok((tier_str, count))
                })?;
                rows.filter_map(|r| r.ok())
                    .filter_map(|(s, c)| Tier::parse(&s).ok().map(|t| (t, c as u64)))
                    .collect()
            };

            let verified: i64 = conn.query_row(
                "SELECT COUNT(*) FROM spo_triplets
                 WHERE json_extract(provenance_json, '$.verified') = 1",
                [],
                |row| row.get(0),
            )?;

            let avg_confidence: f64 = conn.query_row(
                "SELECT COALESCE(AVG(confidence), 0.0) FROM spo_triplets",
                [],
                |row| row.get(0),
            )?;

            Ok(FactStoreStats {
                total_triplets: total as u64,
                by_tier,
                verified_count: verified as u64,
                avg_confidence,
            })
        })
    }
}

fn row_to_triplet(row: &rusqlite::Row) -> rusqlite::Result<Triplet> {
    let id: String = row.get(0)?;
    let tier_str: String = row.get(5)?;
    let provenance_json: String = row.get(8)?;
    let metadata_json: Option<String> = row.get(9)?;

    let provenance: Provenance = serde_json::from_str(&provenance_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(8, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let metadata: HashMap<String, Value> = metadata_json
        .as_deref()
        .and_then(|s| serde_json::from_str(s).ok())
        .unwrap_or_default();

    let tier = Tier::parse(&tier_str).unwrap_or(Tier::Bronze);

    Ok(Triplet {
        id: TripletId::new(id),
        subject: row.get(1)?,
        predicate: row.get(2)?,
        object: row.get(3)?,
        confidence: row.get(4)?,
        tier,
        provenance,
        created_at: parse_datetime(row.get::<_, String>(6)?),
        updated_at: parse_datetime(row.get::<_, String>(7)?),
        metadata,
    })
}

fn parse_datetime(s: String) -> chrono::DateTime<Utc> {
    chrono::DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
