//! SQLite-backed memory store.
//!
//! Records are keyed by a UUID and unique per content hash. Near-duplicate
//! lookups go through an in-memory [`PerceptualIndex`] that is topped up from
//! the `memories` table (by `rowid`) before every query, so rows written by
//! other handles on the same file are always visible.

pub mod migrations;

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::index::{DistanceMetric, PerceptualIndex};
use crate::types::{AddOutcome, MemoryRecord, NewMemory, UpdateMemory, VersionHistoryEntry};

const MEMORY_COLUMNS: &str = "id, content_hash, perceptual_hash, structural_hash, structured_content,
     summary, version, created_at, updated_at, metadata";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Memory store.
///
/// Thread-safe via internal Mutexes. The connection lock is always taken
/// before the index lock.
pub struct MemoryDatabase {
    conn: Mutex<Connection>,
    index: Mutex<PerceptualIndex>,
}

impl MemoryDatabase {
    /// Open (or create) a database file in WAL mode and apply migrations.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        debug!(path = %path.display(), journal_mode = %mode, "Opened memory database");
        Self::from_connection(conn)
    }

    /// Open a private in-memory database (tests and one-shot runs).
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.pragma_update(None, "foreign_keys", true)?;
        migrations::run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            index: Mutex::new(PerceptualIndex::new(DistanceMetric::default())),
        })
    }

    /// Use `metric` for perceptual lookups. The index is rebuilt on next query.
    pub fn with_metric(self, metric: DistanceMetric) -> Self {
        Self {
            conn: self.conn,
            index: Mutex::new(PerceptualIndex::new(metric)),
        }
    }

    /// Check database connectivity
    pub fn ping(&self) -> Result<()> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        conn.execute_batch("SELECT 1").map_err(Error::Database)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Memory Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert a memory unless one with the same content hash exists.
    ///
    /// The uniqueness check and the insert are a single statement, so two
    /// concurrent inserts of the same image yield one `Created` and one
    /// `Existing`.
    pub fn add_memory(&self, memory: &NewMemory) -> Result<AddOutcome> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let now = Utc::now().timestamp_millis();
        let fingerprints = &memory.fingerprints;

        let inserted = conn.execute(
            "INSERT INTO memories
             (id, content_hash, perceptual_hash, structural_hash, structured_content,
              summary, version, created_at, updated_at, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7, ?7, ?8)
             ON CONFLICT(content_hash) DO NOTHING",
            params![
                memory.id,
                fingerprints.content_hash,
                fingerprints.perceptual_hash,
                fingerprints.structural_hash,
                serde_json::to_string(&memory.structured_content)?,
                memory.summary(),
                now,
                serde_json::to_string(&memory.metadata)?,
            ],
        )?;

        let record = Self::query_memory(&conn, "content_hash = ?1", &fingerprints.content_hash)?
            .ok_or_else(|| Error::not_found("Memory", &fingerprints.content_hash))?;

        if inserted == 1 {
            info!(memory_id = %record.id, content_hash = %record.content_hash, "Created memory");
            Ok(AddOutcome::Created(record))
        } else {
            debug!(memory_id = %record.id, "Content hash already stored");
            Ok(AddOutcome::Existing(record))
        }
    }

    /// Get memory by ID
    pub fn get_memory(&self, id: &str) -> Result<Option<MemoryRecord>> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        Self::query_memory(&conn, "id = ?1", id)
    }

    /// Exact lookup by content hash.
    pub fn find_by_content_hash(&self, content_hash: &str) -> Result<Option<MemoryRecord>> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        Self::query_memory(&conn, "content_hash = ?1", content_hash)
    }

    /// Closest memory whose perceptual hash is within `threshold`.
    ///
    /// Ties on distance go to the earliest inserted memory.
    pub fn find_by_perceptual_hash(
        &self,
        perceptual_hash: &str,
        threshold: u32,
    ) -> Result<Option<MemoryRecord>> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;

        let best = {
            let mut index = self.index.lock().map_err(|_| Error::LockPoisoned)?;
            Self::sync_index(&conn, &mut index)?;
            index.nearest(perceptual_hash, threshold)
        };

        let Some(best) = best else {
            return Ok(None);
        };
        debug!(
            memory_id = %best.id,
            distance = best.distance,
            threshold,
            "Perceptual match"
        );
        Self::query_memory(&conn, "id = ?1", &best.id)
    }

    /// Apply an update and append its history entry in one transaction.
    ///
    /// With `expected_version` set, the write only happens if the stored
    /// version still matches; otherwise [`Error::VersionConflict`] is returned
    /// and nothing changes.
    pub fn update_memory(&self, update: &UpdateMemory) -> Result<MemoryRecord> {
        if update.version_increment < 1 {
            return Err(Error::InvalidInput {
                field: "version_increment".into(),
                message: format!("must be at least 1, got {}", update.version_increment),
            });
        }

        let mut conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let current: i64 = tx
            .query_row(
                "SELECT version FROM memories WHERE id = ?1",
                params![update.memory_id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| Error::not_found("Memory", &update.memory_id))?;

        if let Some(expected) = update.expected_version {
            if expected != current {
                return Err(Error::VersionConflict {
                    memory_id: update.memory_id.clone(),
                    expected,
                    found: current,
                });
            }
        }

        let version = current + update.version_increment;
        let now = Utc::now().timestamp_millis();

        tx.execute(
            "UPDATE memories
             SET structured_content = ?1, summary = ?2, version = ?3, updated_at = ?4
             WHERE id = ?5 AND version = ?6",
            params![
                serde_json::to_string(&update.structured_content)?,
                update.summary,
                version,
                now,
                update.memory_id,
                current,
            ],
        )?;

        tx.execute(
            "INSERT INTO memory_versions (memory_id, version, diff, text_diffs, change_hash, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                update.memory_id,
                version,
                serde_json::to_string(&update.changes)?,
                serde_json::to_string(&update.text_diffs)?,
                update.change_hash,
                now,
            ],
        )?;

        tx.commit()?;

        info!(
            memory_id = %update.memory_id,
            version,
            changes = update.changes.len(),
            "Updated memory"
        );

        Self::query_memory(&conn, "id = ?1", &update.memory_id)?
            .ok_or_else(|| Error::not_found("Memory", &update.memory_id))
    }

    /// Most recently updated memories first.
    pub fn list_recent(&self, limit: usize) -> Result<Vec<MemoryRecord>> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM memories ORDER BY updated_at DESC, rowid DESC LIMIT ?1",
            MEMORY_COLUMNS
        ))?;
        let records = stmt
            .query_map(params![limit as i64], Self::map_memory)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// Version history of a memory, oldest first.
    pub fn history(&self, memory_id: &str) -> Result<Vec<VersionHistoryEntry>> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let mut stmt = conn.prepare(
            "SELECT id, memory_id, version, diff, text_diffs, change_hash, created_at
             FROM memory_versions
             WHERE memory_id = ?1
             ORDER BY version ASC, id ASC",
        )?;
        let entries = stmt
            .query_map(params![memory_id], Self::map_history)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    /// Number of stored memories
    pub fn count(&self) -> Result<u64> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM memories", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Helpers
    // ─────────────────────────────────────────────────────────────────────────

    fn query_memory(conn: &Connection, filter: &str, value: &str) -> Result<Option<MemoryRecord>> {
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {} FROM memories WHERE {}",
            MEMORY_COLUMNS, filter
        ))?;
        Ok(stmt.query_row(params![value], Self::map_memory).optional()?)
    }

    /// Index every row added since the last sync.
    fn sync_index(conn: &Connection, index: &mut PerceptualIndex) -> Result<()> {
        let after = index.last_sequence();
        let mut stmt = conn.prepare_cached(
            "SELECT rowid, id, perceptual_hash FROM memories WHERE rowid > ?1 ORDER BY rowid",
        )?;
        let rows = stmt.query_map(params![after], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut added = 0usize;
        for row in rows {
            let (sequence, id, hash) = row?;
            index.insert(&hash, &id, sequence);
            added += 1;
        }
        if added > 0 {
            debug!(added, indexed = index.len(), "Synced perceptual index");
        }
        Ok(())
    }

    fn map_memory(row: &Row) -> rusqlite::Result<MemoryRecord> {
        Ok(MemoryRecord {
            id: row.get(0)?,
            content_hash: row.get(1)?,
            perceptual_hash: row.get(2)?,
            structural_hash: row.get(3)?,
            structured_content: json_column::<Value>(row, 4)?,
            summary: row.get(5)?,
            version: row.get(6)?,
            created_at: millis(row.get(7)?),
            updated_at: millis(row.get(8)?),
            metadata: json_column::<Map<String, Value>>(row, 9)?,
        })
    }

    fn map_history(row: &Row) -> rusqlite::Result<VersionHistoryEntry> {
        Ok(VersionHistoryEntry {
            id: row.get(0)?,
            memory_id: row.get(1)?,
            version: row.get(2)?,
            diff: json_column(row, 3)?,
            text_diffs: json_column(row, 4)?,
            change_hash: row.get(5)?,
            created_at: millis(row.get(6)?),
        })
    }
}

fn json_column<T: DeserializeOwned>(row: &Row, index: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(index)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(e)))
}

fn millis(value: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(value).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{path, DiffOperation, FingerprintSet};
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn fingerprints(content: &str, perceptual: &str) -> FingerprintSet {
        FingerprintSet {
            content_hash: content.to_string(),
            perceptual_hash: perceptual.to_string(),
            structural_hash: format!("s-{}", content),
            width: 100,
            height: 80,
            color_mode: "RGB".to_string(),
        }
    }

    fn new_memory(content: &str, perceptual: &str) -> NewMemory {
        NewMemory::new(
            fingerprints(content, perceptual),
            json!({"extracted_text": "hello", "full_summary": format!("summary {}", content)}),
        )
    }

    fn update_for(record: &MemoryRecord, expected: Option<i64>) -> UpdateMemory {
        let changes = vec![DiffOperation::update(
            path(["extracted_text"]),
            json!("hello"),
            json!("hello world"),
            0.5,
        )];
        UpdateMemory {
            memory_id: record.id.clone(),
            structured_content: json!({"extracted_text": "hello world", "full_summary": "updated"}),
            summary: "updated".to_string(),
            change_hash: crate::history::change_hash(&changes),
            changes,
            text_diffs: BTreeMap::new(),
            version_increment: 1,
            expected_version: expected,
        }
    }

    #[test]
    fn test_add_and_get() {
        let db = MemoryDatabase::open_in_memory().unwrap();
        db.ping().unwrap();

        let mut memory = new_memory("c1", "0000000000000000");
        memory.metadata.insert("source".into(), json!("test"));
        let outcome = db.add_memory(&memory).unwrap();
        assert!(outcome.is_created());

        let record = db.get_memory(&memory.id).unwrap().unwrap();
        assert_eq!(record.version, 1);
        assert_eq!(record.summary, "summary c1");
        assert_eq!(record.structural_hash.as_deref(), Some("s-c1"));
        assert_eq!(record.metadata["source"], "test");
        assert_eq!(record.created_at, record.updated_at);
        assert_eq!(db.count().unwrap(), 1);
        assert!(db.get_memory("missing").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_content_hash_returns_existing() {
        let db = MemoryDatabase::open_in_memory().unwrap();
        let first = db.add_memory(&new_memory("same", "0000000000000000")).unwrap();
        let second = db.add_memory(&new_memory("same", "ffffffffffffffff")).unwrap();

        assert!(first.is_created());
        assert!(!second.is_created());
        assert_eq!(first.record().id, second.record().id);
        assert_eq!(db.count().unwrap(), 1);
    }

    #[test]
    fn test_find_by_content_hash() {
        let db = MemoryDatabase::open_in_memory().unwrap();
        db.add_memory(&new_memory("abc", "0000000000000000")).unwrap();
        assert!(db.find_by_content_hash("abc").unwrap().is_some());
        assert!(db.find_by_content_hash("abd").unwrap().is_none());
    }

    #[test]
    fn test_perceptual_lookup_threshold_and_ties() {
        let db = MemoryDatabase::open_in_memory().unwrap();
        let first = db.add_memory(&new_memory("c1", "000000000000000f")).unwrap();
        db.add_memory(&new_memory("c2", "00000000000000f0")).unwrap();

        // Four bits from both stored hashes: the earlier one wins.
        let hit = db.find_by_perceptual_hash("0000000000000000", 4).unwrap().unwrap();
        assert_eq!(hit.id, first.record().id);

        assert!(db.find_by_perceptual_hash("0000000000000000", 3).unwrap().is_none());
        assert!(db.find_by_perceptual_hash("ffffffffffffffff", 4).unwrap().is_none());
    }

    #[test]
    fn test_symbolwise_metric() {
        let db = MemoryDatabase::open_in_memory()
            .unwrap()
            .with_metric(DistanceMetric::Symbolwise);
        db.add_memory(&new_memory("c1", "0000000000000000")).unwrap();
        // Sixteen bits differ but only four symbols do.
        assert!(db.find_by_perceptual_hash("ffff000000000000", 4).unwrap().is_some());
        assert!(db.find_by_perceptual_hash("fffff00000000000", 4).unwrap().is_none());
    }

    #[test]
    fn test_update_increments_version_and_appends_history() {
        let db = MemoryDatabase::open_in_memory().unwrap();
        let record = db.add_memory(&new_memory("c1", "0000000000000000")).unwrap().record().clone();

        let updated = db.update_memory(&update_for(&record, Some(1))).unwrap();
        assert_eq!(updated.version, 2);
        assert_eq!(updated.summary, "updated");
        assert_eq!(updated.structured_content["extracted_text"], "hello world");
        assert_eq!(updated.created_at, record.created_at);

        let history = db.history(&record.id).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].version, 2);
        assert_eq!(history[0].diff.len(), 1);
        assert_eq!(history[0].change_hash.len(), 32);
    }

    #[test]
    fn test_version_conflict_changes_nothing() {
        let db = MemoryDatabase::open_in_memory().unwrap();
        let record = db.add_memory(&new_memory("c1", "0000000000000000")).unwrap().record().clone();
        db.update_memory(&update_for(&record, Some(1))).unwrap();

        let err = db.update_memory(&update_for(&record, Some(1))).unwrap_err();
        assert!(matches!(err, Error::VersionConflict { expected: 1, found: 2, .. }));
        assert!(err.is_storage());

        assert_eq!(db.get_memory(&record.id).unwrap().unwrap().version, 2);
        assert_eq!(db.history(&record.id).unwrap().len(), 1);
    }

    #[test]
    fn test_non_positive_increment_is_rejected() {
        let db = MemoryDatabase::open_in_memory().unwrap();
        let record = db.add_memory(&new_memory("c1", "0000000000000000")).unwrap().record().clone();

        for increment in [0, -1] {
            let mut update = update_for(&record, Some(1));
            update.version_increment = increment;
            let err = db.update_memory(&update).unwrap_err();
            assert!(matches!(err, Error::InvalidInput { ref field, .. } if field == "version_increment"));
        }

        assert_eq!(db.get_memory(&record.id).unwrap().unwrap().version, 1);
        assert!(db.history(&record.id).unwrap().is_empty());
    }

    #[test]
    fn test_update_missing_memory() {
        let db = MemoryDatabase::open_in_memory().unwrap();
        let record = db.add_memory(&new_memory("c1", "0000000000000000")).unwrap().record().clone();
        let mut update = update_for(&record, None);
        update.memory_id = "nope".into();
        assert!(db.update_memory(&update).unwrap_err().is_not_found());
    }

    #[test]
    fn test_list_recent_orders_by_update_time() {
        let db = MemoryDatabase::open_in_memory().unwrap();
        let a = db.add_memory(&new_memory("a", "0000000000000000")).unwrap().record().clone();
        std::thread::sleep(Duration::from_millis(5));
        let b = db.add_memory(&new_memory("b", "1111111111111111")).unwrap().record().clone();

        let ids: Vec<String> = db.list_recent(10).unwrap().into_iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![b.id.clone(), a.id.clone()]);

        std::thread::sleep(Duration::from_millis(5));
        db.update_memory(&update_for(&a, None)).unwrap();
        let ids: Vec<String> = db.list_recent(1).unwrap().into_iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![a.id]);
    }

    #[test]
    fn test_file_database_sees_other_handles() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("memories.db");

        let writer = MemoryDatabase::open(&path).unwrap();
        let reader = MemoryDatabase::open(&path).unwrap();

        assert!(reader.find_by_perceptual_hash("0000000000000000", 4).unwrap().is_none());
        writer.add_memory(&new_memory("c1", "0000000000000001")).unwrap();
        assert!(reader.find_by_perceptual_hash("0000000000000000", 4).unwrap().is_some());
    }

    #[test]
    fn test_concurrent_inserts_create_once() {
        let dir = tempdir().unwrap();
        let db = Arc::new(MemoryDatabase::open(&dir.path().join("m.db")).unwrap());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let db = Arc::clone(&db);
                std::thread::spawn(move || {
                    db.add_memory(&new_memory("shared", "0000000000000000"))
                        .unwrap()
                        .is_created()
                })
            })
            .collect();

        let created = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|created| *created)
            .count();
        assert_eq!(created, 1);
        assert_eq!(db.count().unwrap(), 1);
    }
}
