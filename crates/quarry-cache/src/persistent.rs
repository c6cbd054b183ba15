//! SQLite file backing the L2 document-embedding tier.
//!
//! One database file per data directory, tagged with a schema version in a
//! `meta` table. A file that fails its integrity or schema check on open is
//! deleted and recreated empty: the tier only ever holds recomputable data.

use std::path::{Path, PathBuf};

use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use quarry_core::config::defaults::DEFAULT_L2_DB_FILENAME;
use quarry_core::constants::CACHE_SCHEMA_VERSION;
use quarry_core::errors::{CacheError, QuarryResult, StorageError};
use quarry_observability::events;

use crate::l2_document::DocEmbedding;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS meta (
        key   TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS doc_embeddings (
        fingerprint TEXT PRIMARY KEY,
        doc_id      TEXT NOT NULL,
        collection  TEXT NOT NULL,
        dims        INTEGER NOT NULL,
        embedding   BLOB NOT NULL,
        created_at  INTEGER NOT NULL,
        last_access INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_doc_embeddings_doc ON doc_embeddings(doc_id);
    CREATE INDEX IF NOT EXISTS idx_doc_embeddings_collection ON doc_embeddings(collection);
    CREATE INDEX IF NOT EXISTS idx_doc_embeddings_access ON doc_embeddings(last_access);
";

fn sqlite_err(e: rusqlite::Error) -> StorageError {
    StorageError::Sqlite {
        message: e.to_string(),
    }
}

/// Persistent document-embedding rows keyed by cache fingerprint.
pub struct PersistentStore {
    db: Mutex<Db>,
    path: PathBuf,
}

/// The connection and its row count, kept in step under one lock so
/// eviction never has to scan the table.
struct Db {
    conn: Connection,
    rows: u64,
}

impl Db {
    fn deleted(&mut self, removed: usize) {
        self.rows = self.rows.saturating_sub(removed as u64);
    }
}

impl PersistentStore {
    /// Open (or create) the store under `dir`, rebuilding a corrupted file.
    pub fn open(dir: &Path) -> QuarryResult<Self> {
        std::fs::create_dir_all(dir).map_err(|e| CacheError::PersistentUnavailable {
            reason: format!("cannot create {}: {e}", dir.display()),
        })?;
        let path = dir.join(DEFAULT_L2_DB_FILENAME);

        let conn = match open_verified(&path) {
            Ok(conn) => conn,
            Err(err @ (StorageError::CorruptedState { .. } | StorageError::SchemaMismatch { .. })) => {
                events::corrupted_unit_rebuilt(&path.display().to_string(), &err.to_string());
                remove_db_files(&path)?;
                open_verified(&path)?
            }
            Err(err) => return Err(err.into()),
        };

        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM doc_embeddings", [], |row| row.get(0))
            .map_err(sqlite_err)?;
        debug!(path = %path.display(), rows, "L2 persistent store opened");
        Ok(Self {
            db: Mutex::new(Db {
                conn,
                rows: rows.max(0) as u64,
            }),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Fetch an embedding and bump its access time.
    pub fn get(&self, fingerprint: &str) -> QuarryResult<Option<DocEmbedding>> {
        let mut db = self.db.lock();
        let row: Option<(String, String, i64, Vec<u8>)> = db
            .conn
            .query_row(
                "SELECT doc_id, collection, dims, embedding
                 FROM doc_embeddings WHERE fingerprint = ?1",
                params![fingerprint],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()
            .map_err(sqlite_err)?;

        let Some((doc_id, collection, dims, blob)) = row else {
            return Ok(None);
        };
        let vector = match decode(fingerprint, dims, &blob) {
            Ok(v) => v,
            Err(err) => {
                let removed = db
                    .conn
                    .execute(
                        "DELETE FROM doc_embeddings WHERE fingerprint = ?1",
                        params![fingerprint],
                    )
                    .map_err(sqlite_err)?;
                db.deleted(removed);
                return Err(err.into());
            }
        };
        db.conn.execute(
            "UPDATE doc_embeddings SET last_access = ?2 WHERE fingerprint = ?1",
            params![fingerprint, Utc::now().timestamp_millis()],
        )
        .map_err(sqlite_err)?;
        Ok(Some(DocEmbedding {
            doc_id,
            collection,
            vector,
        }))
    }

    pub fn put(
        &self,
        fingerprint: &str,
        doc_id: &str,
        collection: &str,
        vector: &[f32],
    ) -> QuarryResult<()> {
        let now = Utc::now().timestamp_millis();
        let blob: Vec<u8> = vector.iter().flat_map(|f| f.to_le_bytes()).collect();
        let mut db = self.db.lock();
        let exists = db
            .conn
            .query_row(
                "SELECT 1 FROM doc_embeddings WHERE fingerprint = ?1",
                params![fingerprint],
                |_| Ok(()),
            )
            .optional()
            .map_err(sqlite_err)?
            .is_some();
        db.conn
            .execute(
                "INSERT INTO doc_embeddings
                    (fingerprint, doc_id, collection, dims, embedding, created_at, last_access)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
                 ON CONFLICT(fingerprint) DO UPDATE SET
                    doc_id = excluded.doc_id,
                    collection = excluded.collection,
                    dims = excluded.dims,
                    embedding = excluded.embedding,
                    last_access = excluded.last_access",
                params![fingerprint, doc_id, collection, vector.len() as i64, blob, now],
            )
            .map_err(sqlite_err)?;
        if !exists {
            db.rows += 1;
        }
        Ok(())
    }

    /// Delete least-recently-used rows until at most `max_rows` remain.
    pub fn evict_to(&self, max_rows: u64) -> QuarryResult<u64> {
        let mut db = self.db.lock();
        if db.rows <= max_rows {
            return Ok(0);
        }
        let excess = i64::try_from(db.rows - max_rows).unwrap_or(i64::MAX);
        let removed = db
            .conn
            .execute(
                "DELETE FROM doc_embeddings WHERE fingerprint IN (
                    SELECT fingerprint FROM doc_embeddings
                    ORDER BY last_access ASC, created_at ASC
                    LIMIT ?1
                 )",
                params![excess],
            )
            .map_err(sqlite_err)?;
        db.deleted(removed);
        Ok(removed as u64)
    }

    pub fn delete_document(&self, doc_id: &str) -> QuarryResult<usize> {
        let mut db = self.db.lock();
        let removed = db
            .conn
            .execute(
                "DELETE FROM doc_embeddings WHERE doc_id = ?1",
                params![doc_id],
            )
            .map_err(sqlite_err)?;
        db.deleted(removed);
        Ok(removed)
    }

    pub fn delete_collection(&self, collection: &str) -> QuarryResult<usize> {
        let mut db = self.db.lock();
        let removed = db
            .conn
            .execute(
                "DELETE FROM doc_embeddings WHERE collection = ?1",
                params![collection],
            )
            .map_err(sqlite_err)?;
        db.deleted(removed);
        Ok(removed)
    }

    /// Row count tracked alongside every write.
    pub fn count(&self) -> QuarryResult<u64> {
        Ok(self.db.lock().rows)
    }

    pub fn clear(&self) -> QuarryResult<()> {
        let mut db = self.db.lock();
        db.conn
            .execute("DELETE FROM doc_embeddings", [])
            .map_err(sqlite_err)?;
        db.rows = 0;
        Ok(())
    }
}

/// Open, apply pragmas, check integrity, create tables, check schema version.
///
/// Any failure to read the file as a database is reported as corruption.
fn open_verified(path: &Path) -> Result<Connection, StorageError> {
    let unit = path.display().to_string();
    let corrupted = |e: rusqlite::Error| StorageError::CorruptedState {
        unit: unit.clone(),
        details: e.to_string(),
    };

    let conn = Connection::open(path).map_err(|e| StorageError::Io {
        path: unit.clone(),
        message: e.to_string(),
    })?;

    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA busy_timeout = 5000;
        ",
    )
    .map_err(corrupted)?;

    let check: String = conn
        .query_row("PRAGMA quick_check", [], |row| row.get(0))
        .map_err(corrupted)?;
    if !check.eq_ignore_ascii_case("ok") {
        return Err(StorageError::CorruptedState {
            unit,
            details: check,
        });
    }

    conn.execute_batch(SCHEMA).map_err(corrupted)?;

    let found: Option<String> = conn
        .query_row(
            "SELECT value FROM meta WHERE key = 'schema_version'",
            [],
            |row| row.get(0),
        )
        .optional()
        .map_err(corrupted)?;
    match found {
        None => {
            conn.execute(
                "INSERT INTO meta (key, value) VALUES ('schema_version', ?1)",
                params![CACHE_SCHEMA_VERSION.to_string()],
            )
            .map_err(sqlite_err)?;
        }
        Some(v) => {
            let found = v.parse::<u32>().unwrap_or(0);
            if found != CACHE_SCHEMA_VERSION {
                return Err(StorageError::SchemaMismatch {
                    unit,
                    expected: CACHE_SCHEMA_VERSION,
                    found,
                });
            }
        }
    }
    Ok(conn)
}

fn remove_db_files(path: &Path) -> Result<(), StorageError> {
    for suffix in ["", "-wal", "-shm"] {
        let mut candidate = path.as_os_str().to_owned();
        candidate.push(suffix);
        let candidate = PathBuf::from(candidate);
        if candidate.exists() {
            std::fs::remove_file(&candidate).map_err(|e| StorageError::Io {
                path: candidate.display().to_string(),
                message: e.to_string(),
            })?;
        }
    }
    Ok(())
}

fn decode(fingerprint: &str, dims: i64, blob: &[u8]) -> Result<Vec<f32>, CacheError> {
    let expected = usize::try_from(dims).unwrap_or(0) * 4;
    if blob.len() != expected {
        return Err(CacheError::MalformedEntry {
            fingerprint: fingerprint.to_string(),
            reason: format!("{} bytes for {dims} dimensions", blob.len()),
        });
    }
    Ok(blob
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = PersistentStore::open(dir.path()).unwrap();
        let embedding = vec![1.0f32, 2.5, -3.7, 0.0];
        store.put("fp", "doc-1", "c", &embedding).unwrap();
        let got = store.get("fp").unwrap().unwrap();
        assert_eq!(got.vector, embedding);
        assert_eq!(got.doc_id, "doc-1");
        assert_eq!(got.collection, "c");
        assert!(store.get("missing").unwrap().is_none());
    }

    #[test]
    fn evicts_least_recently_used() {
        let dir = tempfile::tempdir().unwrap();
        let store = PersistentStore::open(dir.path()).unwrap();
        store.put("old", "d1", "c", &[1.0]).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        store.put("new", "d2", "c", &[2.0]).unwrap();
        assert_eq!(store.evict_to(1).unwrap(), 1);
        assert!(store.get("old").unwrap().is_none());
        assert!(store.get("new").unwrap().is_some());
    }

    #[test]
    fn row_count_tracks_writes_without_rescanning() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = PersistentStore::open(dir.path()).unwrap();
            store.put("a", "d1", "c", &[1.0]).unwrap();
            store.put("a", "d1", "c", &[2.0]).unwrap();
            store.put("b", "d2", "c", &[1.0]).unwrap();
            store.put("c", "d3", "c", &[1.0]).unwrap();
            assert_eq!(store.count().unwrap(), 3);
            assert_eq!(store.evict_to(5).unwrap(), 0);
            assert_eq!(store.delete_document("d3").unwrap(), 1);
            assert_eq!(store.count().unwrap(), 2);
        }
        let reopened = PersistentStore::open(dir.path()).unwrap();
        assert_eq!(reopened.count().unwrap(), 2);
        assert_eq!(reopened.evict_to(1).unwrap(), 1);
        assert_eq!(reopened.count().unwrap(), 1);
        let actual: i64 = reopened
            .db
            .lock()
            .conn
            .query_row("SELECT COUNT(*) FROM doc_embeddings", [], |row| row.get(0))
            .unwrap();
        assert_eq!(actual, 1);
    }

    #[test]
    fn deletes_by_document_and_collection() {
        let dir = tempfile::tempdir().unwrap();
        let store = PersistentStore::open(dir.path()).unwrap();
        store.put("a", "d1", "c1", &[1.0]).unwrap();
        store.put("b", "d1", "c1", &[1.0]).unwrap();
        store.put("c", "d2", "c2", &[1.0]).unwrap();
        assert_eq!(store.delete_document("d1").unwrap(), 2);
        assert_eq!(store.delete_collection("c2").unwrap(), 1);
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn garbage_file_is_rebuilt() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(DEFAULT_L2_DB_FILENAME), b"not a database at all").unwrap();
        let store = PersistentStore::open(dir.path()).unwrap();
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn schema_mismatch_is_rebuilt() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = PersistentStore::open(dir.path()).unwrap();
            store.put("a", "d1", "c1", &[1.0]).unwrap();
            store
                .db
                .lock()
                .conn
                .execute("UPDATE meta SET value = '999' WHERE key = 'schema_version'", [])
                .unwrap();
        }
        let store = PersistentStore::open(dir.path()).unwrap();
        assert_eq!(store.count().unwrap(), 0);
    }
}
