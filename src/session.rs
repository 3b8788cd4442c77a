//! Trip session persistence.
//!
//! A trip snapshot is written after every meaningful shopper action so an
//! interrupted trip can be resumed mid-aisle. Snapshots are keyed by list
//! id, carry the full plan payload, and expire after 24 hours.
//!
//! Corrupt records are treated as absent: a snapshot that fails to parse
//! is logged, deleted, and reported as no session.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TripError};
use crate::PlanInput;

/// Sessions older than this are never resumed.
pub const SESSION_MAX_AGE_MS: i64 = 24 * 60 * 60 * 1000;

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// A resumable snapshot of an in-progress trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripSession {
    pub list_id: i64,
    /// The plan exactly as it was supplied; the route is rebuilt on resume.
    pub plan_snapshot: PlanInput,
    pub current_store_index: usize,
    pub current_aisle_index: usize,
    pub completed_item_ids: Vec<i64>,
    /// False until the shopper toggles or dispositions an item. Sessions
    /// are only ever written once this is true.
    pub has_started_shopping: bool,
    pub is_completed: bool,
    /// Unix millis of the last write.
    pub timestamp: i64,
}

impl TripSession {
    /// Whether this session may be offered for resumption at `now_ms`.
    pub fn is_resumable(&self, now_ms: i64) -> bool {
        !self.is_completed && now_ms.saturating_sub(self.timestamp) <= SESSION_MAX_AGE_MS
    }
}

/// Storage for trip sessions, keyed by list id.
pub trait SessionStore {
    fn load(&mut self, list_id: i64) -> Result<Option<TripSession>>;
    fn save(&mut self, list_id: i64, session: &TripSession) -> Result<()>;
    fn clear(&mut self, list_id: i64) -> Result<()>;
}

// ============================================================================
// In-Memory Store
// ============================================================================

/// Process-local session store backed by a map of JSON strings.
///
/// Storing serialized records rather than structs keeps the corruption
/// handling path identical to the SQLite store.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    records: HashMap<i64, String>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a raw record, bypassing serialization. Test hook for
    /// exercising the corrupt-record path.
    pub fn insert_raw(&mut self, list_id: i64, raw: &str) {
        self.records.insert(list_id, raw.to_string());
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&mut self, list_id: i64) -> Result<Option<TripSession>> {
        let Some(raw) = self.records.get(&list_id) else {
            return Ok(None);
        };
        match serde_json::from_str::<TripSession>(raw) {
            Ok(session) => Ok(Some(session)),
            Err(e) => {
                warn!(
                    "[Session] Corrupt record for list {}: {}, discarding",
                    list_id, e
                );
                self.records.remove(&list_id);
                Ok(None)
            }
        }
    }

    fn save(&mut self, list_id: i64, session: &TripSession) -> Result<()> {
        let raw = serde_json::to_string(session)
            .map_err(|e| TripError::persistence(format!("serialize session: {}", e)))?;
        self.records.insert(list_id, raw);
        Ok(())
    }

    fn clear(&mut self, list_id: i64) -> Result<()> {
        self.records.remove(&list_id);
        Ok(())
    }
}

// ============================================================================
// SQLite Store
// ============================================================================

#[cfg(feature = "persistence")]
pub use sqlite::SqliteSessionStore;

#[cfg(feature = "persistence")]
mod sqlite {
    use super::*;
    use log::info;
    use rusqlite::{params, Connection, OptionalExtension};
    use std::path::Path;

    /// SQLite-backed session store. One row per list id.
    pub struct SqliteSessionStore {
        pub(crate) conn: Connection,
    }

    impl SqliteSessionStore {
        /// Open (or create) a session database at the given path.
        pub fn new(path: impl AsRef<Path>) -> Result<Self> {
            let conn = Connection::open(path)
                .map_err(|e| TripError::persistence(format!("open database: {}", e)))?;
            Self::init(conn)
        }

        /// Open an in-memory session database. Useful for tests.
        pub fn in_memory() -> Result<Self> {
            let conn = Connection::open_in_memory()
                .map_err(|e| TripError::persistence(format!("open in-memory database: {}", e)))?;
            Self::init(conn)
        }

        fn init(conn: Connection) -> Result<Self> {
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS trip_sessions (
                    list_id INTEGER PRIMARY KEY,
                    snapshot BLOB NOT NULL,
                    updated_at INTEGER NOT NULL
                );",
            )
            .map_err(|e| TripError::persistence(format!("create schema: {}", e)))?;
            info!("[Session] SQLite session store ready");
            Ok(Self { conn })
        }
    }

    impl SessionStore for SqliteSessionStore {
        fn load(&mut self, list_id: i64) -> Result<Option<TripSession>> {
            let raw: Option<Vec<u8>> = self
                .conn
                .query_row(
                    "SELECT snapshot FROM trip_sessions WHERE list_id = ?1",
                    params![list_id],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|e| TripError::persistence(format!("load session: {}", e)))?;

            let Some(raw) = raw else {
                return Ok(None);
            };

            match serde_json::from_slice::<TripSession>(&raw) {
                Ok(session) => Ok(Some(session)),
                Err(e) => {
                    warn!(
                        "[Session] Corrupt record for list {}: {}, discarding",
                        list_id, e
                    );
                    self.clear(list_id)?;
                    Ok(None)
                }
            }
        }

        fn save(&mut self, list_id: i64, session: &TripSession) -> Result<()> {
            let raw = serde_json::to_vec(session)
                .map_err(|e| TripError::persistence(format!("serialize session: {}", e)))?;
            self.conn
                .execute(
                    "INSERT OR REPLACE INTO trip_sessions (list_id, snapshot, updated_at)
                     VALUES (?1, ?2, ?3)",
                    params![list_id, raw, session.timestamp],
                )
                .map_err(|e| TripError::persistence(format!("save session: {}", e)))?;
            Ok(())
        }

        fn clear(&mut self, list_id: i64) -> Result<()> {
            self.conn
                .execute(
                    "DELETE FROM trip_sessions WHERE list_id = ?1",
                    params![list_id],
                )
                .map_err(|e| TripError::persistence(format!("clear session: {}", e)))?;
            Ok(())
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Retailer, ShoppingItem};

    fn sample_session(list_id: i64, timestamp: i64) -> TripSession {
        TripSession {
            list_id,
            plan_snapshot: PlanInput::SingleStore {
                retailer: Retailer::new(1, "Greenmart"),
                items: vec![ShoppingItem::new(1, "Milk", 1)],
            },
            current_store_index: 0,
            current_aisle_index: 1,
            completed_item_ids: vec![1],
            has_started_shopping: true,
            is_completed: false,
            timestamp,
        }
    }

    #[test]
    fn test_memory_round_trip() {
        let mut store = MemorySessionStore::new();
        let session = sample_session(42, now_ms());

        store.save(42, &session).unwrap();
        assert_eq!(store.load(42).unwrap(), Some(session));

        store.clear(42).unwrap();
        assert_eq!(store.load(42).unwrap(), None);
    }

    #[test]
    fn test_corrupt_record_is_discarded() {
        let mut store = MemorySessionStore::new();
        store.insert_raw(7, "{not valid json!");

        assert_eq!(store.load(7).unwrap(), None);
        // Discarded, not just skipped
        assert!(store.is_empty());
    }

    #[test]
    fn test_resumability_window() {
        let now = now_ms();
        let fresh = sample_session(1, now - 60_000);
        assert!(fresh.is_resumable(now));

        let stale = sample_session(1, now - SESSION_MAX_AGE_MS - 1);
        assert!(!stale.is_resumable(now));

        let mut finished = sample_session(1, now);
        finished.is_completed = true;
        assert!(!finished.is_resumable(now));
    }

    #[test]
    fn test_session_wire_naming() {
        let session = sample_session(3, 1_000);
        let json = serde_json::to_string(&session).unwrap();
        assert!(json.contains("\"planSnapshot\""));
        assert!(json.contains("\"currentStoreIndex\""));
        assert!(json.contains("\"hasStartedShopping\""));
        assert!(json.contains("\"completedItemIds\""));
    }

    #[cfg(feature = "persistence")]
    mod sqlite_tests {
        use super::*;

        #[test]
        fn test_sqlite_round_trip() {
            let mut store = SqliteSessionStore::in_memory().unwrap();
            let session = sample_session(42, now_ms());

            store.save(42, &session).unwrap();
            assert_eq!(store.load(42).unwrap(), Some(session.clone()));

            // Overwrite replaces the row
            let mut updated = session;
            updated.current_aisle_index = 3;
            store.save(42, &updated).unwrap();
            assert_eq!(store.load(42).unwrap(), Some(updated));

            store.clear(42).unwrap();
            assert_eq!(store.load(42).unwrap(), None);
        }

        #[test]
        fn test_sqlite_corrupt_blob_is_discarded() {
            let mut store = SqliteSessionStore::in_memory().unwrap();
            store
                .conn
                .execute(
                    "INSERT INTO trip_sessions (list_id, snapshot, updated_at)
                     VALUES (9, X'DEADBEEF', 0)",
                    [],
                )
                .unwrap();

            assert_eq!(store.load(9).unwrap(), None);
            assert_eq!(store.load(9).unwrap(), None);
        }
    }
}
