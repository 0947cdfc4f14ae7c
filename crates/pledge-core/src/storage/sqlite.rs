//! SqliteStore - SQLite WAL record store
//!
//! - WAL journal with `synchronous = FULL`: a committed write survives power loss
//! - `INSERT OR REPLACE`: records are replaced atomically, never partially
//! - Blake3 checksum written with every record and verified on read

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::time::Duration;

use super::RecordStore;
use crate::error::StoreError;
use crate::types::PromiseId;

/// Durable record store backed by a single SQLite file
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database at `path`.
    ///
    /// ```no_run
    /// use pledge_core::storage::SqliteStore;
    /// let store = SqliteStore::open(".pledge/promises.db").unwrap();
    /// ```
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        tracing::debug!(path = %path.display(), "opened promise database");
        Self::configure(conn)
    }

    /// Private in-memory database; not durable
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::configure(Connection::open_in_memory()?)
    }

    fn configure(conn: Connection) -> Result<Self, StoreError> {
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
        conn.pragma_update(None, "synchronous", "FULL")?;
        conn.busy_timeout(Duration::from_millis(5000))?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    /// Idempotent DDL
    fn migrate(&self) -> Result<(), StoreError> {
        self.conn.lock().execute_batch(
            "
            CREATE TABLE IF NOT EXISTS promise_records (
                id            TEXT PRIMARY KEY,
                payload       BLOB NOT NULL,
                checksum      TEXT NOT NULL,
                updated_at_ms INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_promise_records_updated
                ON promise_records(updated_at_ms);
            ",
        )?;
        Ok(())
    }

    /// Database statistics
    pub fn stats(&self) -> Result<serde_json::Value, StoreError> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM promise_records", [], |row| row.get(0))?;
        let journal_mode: String = conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))?;
        let bytes: i64 = conn.query_row(
            "SELECT COALESCE(SUM(LENGTH(payload)), 0) FROM promise_records",
            [],
            |row| row.get(0),
        )?;

        Ok(serde_json::json!({
            "records": count,
            "payload_bytes": bytes,
            "journal_mode": journal_mode,
            "wal_mode": journal_mode.eq_ignore_ascii_case("wal")
        }))
    }
}

impl RecordStore for SqliteStore {
    fn put(&self, id: &PromiseId, bytes: &[u8]) -> Result<(), StoreError> {
        let checksum = blake3::hash(bytes).to_hex().to_string();
        let updated_at_ms = chrono::Utc::now().timestamp_millis();

        self.conn.lock().execute(
            "INSERT OR REPLACE INTO promise_records (id, payload, checksum, updated_at_ms)
             VALUES (?1, ?2, ?3, ?4)",
            params![id.key(), bytes, checksum, updated_at_ms],
        )?;
        Ok(())
    }

    fn get(&self, id: &PromiseId) -> Result<Option<Vec<u8>>, StoreError> {
        let row = self
            .conn
            .lock()
            .query_row(
                "SELECT payload, checksum FROM promise_records WHERE id = ?1",
                params![id.key()],
                |row| Ok((row.get::<_, Vec<u8>>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?;

        match row {
            Some((payload, stored)) => {
                let actual = blake3::hash(&payload).to_hex().to_string();
                if actual != stored {
                    return Err(StoreError::Integrity {
                        id: id.key(),
                        expected: stored,
                        actual,
                    });
                }
                Ok(Some(payload))
            }
            None => Ok(None),
        }
    }

    fn delete(&self, id: &PromiseId) -> Result<(), StoreError> {
        self.conn
            .lock()
            .execute("DELETE FROM promise_records WHERE id = ?1", params![id.key()])?;
        Ok(())
    }

    fn list(&self) -> Result<Vec<PromiseId>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT id FROM promise_records ORDER BY updated_at_ms")?;
        let keys = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut ids = Vec::with_capacity(keys.len());
        for key in keys {
            match key.parse::<PromiseId>() {
                Ok(id) => ids.push(id),
                Err(e) => tracing::warn!(key = %key, error = %e, "skipping malformed promise key"),
            }
        }
        Ok(ids)
    }
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> SqliteStore {
        SqliteStore::open_in_memory().expect("in-memory SQLite should open")
    }

    #[test]
    fn test_put_get_replace() {
        let store = temp_store();
        let id = PromiseId::generate();

        store.put(&id, b"first").unwrap();
        store.put(&id, b"second").unwrap();

        assert_eq!(store.get(&id).unwrap(), Some(b"second".to_vec()));
        assert_eq!(store.list().unwrap(), vec![id]);
    }

    #[test]
    fn test_delete_absent_is_ok() {
        let store = temp_store();
        let id = PromiseId::generate();
        store.delete(&id).unwrap();

        store.put(&id, b"x").unwrap();
        store.delete(&id).unwrap();
        assert!(store.get(&id).unwrap().is_none());
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn test_checksum_mismatch_is_detected() {
        let store = temp_store();
        let id = PromiseId::generate();
        store.put(&id, b"original").unwrap();

        store
            .conn
            .lock()
            .execute(
                "UPDATE promise_records SET payload = ?1 WHERE id = ?2",
                params![b"tampered".to_vec(), id.key()],
            )
            .unwrap();

        let err = store.get(&id).unwrap_err();
        assert!(matches!(err, StoreError::Integrity { .. }));
    }

    #[test]
    fn test_reopen_file_keeps_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("promises.db");
        let id = PromiseId::generate();

        {
            let store = SqliteStore::open(&path).unwrap();
            store.put(&id, b"durable").unwrap();
        }

        let reopened = SqliteStore::open(&path).unwrap();
        assert_eq!(reopened.get(&id).unwrap(), Some(b"durable".to_vec()));
    }

    #[test]
    fn test_stats() {
        let store = temp_store();
        store.put(&PromiseId::generate(), b"abc").unwrap();
        let stats = store.stats().unwrap();
        assert_eq!(stats["records"], 1);
        assert_eq!(stats["payload_bytes"], 3);
    }

    #[test]
    fn test_stats_report_actual_journal_mode() {
        let memory = SqliteStore::open_in_memory().unwrap().stats().unwrap();
        assert_eq!(memory["journal_mode"], "memory");
        assert_eq!(memory["wal_mode"], false);

        let dir = tempfile::tempdir().unwrap();
        let file = SqliteStore::open(dir.path().join("promises.db"))
            .unwrap()
            .stats()
            .unwrap();
        assert_eq!(file["journal_mode"], "wal");
        assert_eq!(file["wal_mode"], true);
    }
}
