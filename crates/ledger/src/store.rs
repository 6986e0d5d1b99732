//! Append-only record stores
//!
//! The ledger needs a durable byte store keyed by monotonically increasing
//! sequence number. Any backend with compare-and-append semantics works;
//! three are provided: in-memory (tests), JSON lines file, and SQLite.

use crate::record::{EncodedRecord, LedgerRecord};
use rusqlite::{params, Connection, OptionalExtension};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};
use thiserror::Error;

/// Errors from a store backend
#[derive(Debug, Error)]
pub enum StoreError {
    /// Another appender won the race for this sequence number. The caller
    /// must rebuild the record against the new tail and retry.
    #[error("append conflict: tried sequence {attempted}, store is at {current}")]
    Conflict { attempted: u64, current: u64 },

    #[error("store I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt record at sequence {sequence}: {detail}")]
    Corrupt { sequence: u64, detail: String },

    #[error("store backend: {0}")]
    Backend(String),
}

/// Durable append-only byte store keyed by sequence number
///
/// `append` must be atomic with respect to the sequence check: a record
/// whose sequence is not the store's current length is rejected with
/// `Conflict`, never written out of order.
pub trait Store: Send + Sync {
    /// Persist `record` at `record.sequence`, or fail with `Conflict`
    fn append(&self, record: &LedgerRecord) -> Result<(), StoreError>;

    /// Read the record at `sequence`, `None` if past the tail
    fn read(&self, sequence: u64) -> Result<Option<LedgerRecord>, StoreError>;

    /// Number of records in the store
    fn len(&self) -> Result<u64, StoreError>;
}

/// In-memory store for tests and ephemeral ledgers
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<Vec<LedgerRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    fn append(&self, record: &LedgerRecord) -> Result<(), StoreError> {
        let mut records = self.records.write().unwrap();
        let current = records.len() as u64;
        if record.sequence != current {
            return Err(StoreError::Conflict {
                attempted: record.sequence,
                current,
            });
        }
        records.push(record.clone());
        Ok(())
    }

    fn read(&self, sequence: u64) -> Result<Option<LedgerRecord>, StoreError> {
        let records = self.records.read().unwrap();
        Ok(records.get(sequence as usize).cloned())
    }

    fn len(&self) -> Result<u64, StoreError> {
        Ok(self.records.read().unwrap().len() as u64)
    }
}

/// JSON-lines file store, one encoded record per line
///
/// Appends are synced to disk before returning. External appends by other
/// handles of the same file are detected by comparing the cached byte
/// length against the file's actual length and rescanning when they differ.
pub struct FileStore {
    path: PathBuf,
    state: Mutex<FileState>,
}

struct FileState {
    next_sequence: u64,
    byte_len: u64,
}

impl FileStore {
    /// Open (or create) a ledger file
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let state = Self::scan(&path)?;
        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    /// Walk the file, validating sequence order, and return its state
    fn scan(path: &Path) -> Result<FileState, StoreError> {
        if !path.exists() {
            return Ok(FileState {
                next_sequence: 0,
                byte_len: 0,
            });
        }

        let byte_len = fs::metadata(path)?.len();
        let file = File::open(path)?;
        let reader = BufReader::new(file);

        let mut next_sequence = 0u64;
        for line in reader.lines() {
            let line = line?;
            let encoded: EncodedRecord =
                serde_json::from_str(&line).map_err(|e| StoreError::Corrupt {
                    sequence: next_sequence,
                    detail: e.to_string(),
                })?;
            if encoded.sequence != next_sequence {
                return Err(StoreError::Corrupt {
                    sequence: next_sequence,
                    detail: format!("found sequence {} instead", encoded.sequence),
                });
            }
            next_sequence += 1;
        }

        Ok(FileState {
            next_sequence,
            byte_len,
        })
    }

    /// Rescan if the file changed underneath us
    fn refresh(&self, state: &mut FileState) -> Result<(), StoreError> {
        let actual = fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0);
        if actual != state.byte_len {
            *state = Self::scan(&self.path)?;
        }
        Ok(())
    }
}

impl Store for FileStore {
    fn append(&self, record: &LedgerRecord) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        self.refresh(&mut state)?;

        if record.sequence != state.next_sequence {
            return Err(StoreError::Conflict {
                attempted: record.sequence,
                current: state.next_sequence,
            });
        }

        let line = serde_json::to_string(&EncodedRecord::from(record))
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", line)?;
        // Durability before the append is acknowledged
        file.sync_all()?;

        state.next_sequence += 1;
        state.byte_len += line.len() as u64 + 1;
        Ok(())
    }

    fn read(&self, sequence: u64) -> Result<Option<LedgerRecord>, StoreError> {
        if !self.path.exists() {
            return Ok(None);
        }

        let file = File::open(&self.path)?;
        let reader = BufReader::new(file);

        for line in reader.lines() {
            let line = line?;
            let encoded: EncodedRecord =
                serde_json::from_str(&line).map_err(|e| StoreError::Corrupt {
                    sequence,
                    detail: e.to_string(),
                })?;
            if encoded.sequence == sequence {
                let record = LedgerRecord::try_from(encoded)
                    .map_err(|detail| StoreError::Corrupt { sequence, detail })?;
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    fn len(&self) -> Result<u64, StoreError> {
        let mut state = self.state.lock().unwrap();
        self.refresh(&mut state)?;
        Ok(state.next_sequence)
    }
}

/// SQLite-backed store
///
/// The sequence check and the insert run inside one immediate transaction,
/// so two connections to the same database cannot both claim a sequence.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a ledger database
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(|e| StoreError::Backend(e.to_string()))?;
        Self::init(conn)
    }

    /// Open an in-memory database (tests)
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(|e| StoreError::Backend(e.to_string()))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;

            CREATE TABLE IF NOT EXISTS records (
                sequence INTEGER PRIMARY KEY,
                payload_digest BLOB NOT NULL,
                chain_digest BLOB NOT NULL,
                payload BLOB NOT NULL
            );
            "#,
        )
        .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl Store for SqliteStore {
    fn append(&self, record: &LedgerRecord) -> Result<(), StoreError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn
            .transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        let current: u64 = tx
            .query_row("SELECT COUNT(*) FROM records", [], |row| row.get::<_, i64>(0))
            .map(|n| n as u64)
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        if record.sequence != current {
            return Err(StoreError::Conflict {
                attempted: record.sequence,
                current,
            });
        }

        tx.execute(
            "INSERT INTO records (sequence, payload_digest, chain_digest, payload)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                record.sequence as i64,
                record.payload_digest.as_slice(),
                record.chain_digest.as_slice(),
                record.payload,
            ],
        )
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        tx.commit().map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }

    fn read(&self, sequence: u64) -> Result<Option<LedgerRecord>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT payload_digest, chain_digest, payload FROM records WHERE sequence = ?1",
                params![sequence as i64],
                |row| {
                    Ok((
                        row.get::<_, Vec<u8>>(0)?,
                        row.get::<_, Vec<u8>>(1)?,
                        row.get::<_, Vec<u8>>(2)?,
                    ))
                },
            )
            .optional()
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        match row {
            None => Ok(None),
            Some((payload_digest, chain_digest, payload)) => {
                let payload_digest =
                    payload_digest
                        .try_into()
                        .map_err(|_| StoreError::Corrupt {
                            sequence,
                            detail: "payload digest is not 32 bytes".into(),
                        })?;
                let chain_digest = chain_digest.try_into().map_err(|_| StoreError::Corrupt {
                    sequence,
                    detail: "chain digest is not 32 bytes".into(),
                })?;
                Ok(Some(LedgerRecord {
                    sequence,
                    payload,
                    payload_digest,
                    chain_digest,
                }))
            }
        }
    }

    fn len(&self) -> Result<u64, StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT COUNT(*) FROM records", [], |row| row.get::<_, i64>(0))
            .map(|n| n as u64)
            .map_err(|e| StoreError::Backend(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::genesis_seed;
    use tempfile::tempdir;

    fn record(sequence: u64, payload: &[u8], prev: &crate::record::Digest) -> LedgerRecord {
        LedgerRecord::chained(sequence, payload.to_vec(), prev)
    }

    #[test]
    fn test_memory_store_round_trip() {
        let store = MemoryStore::new();
        let r0 = record(0, b"zero", &genesis_seed());
        store.append(&r0).unwrap();

        assert_eq!(store.len().unwrap(), 1);
        assert_eq!(store.read(0).unwrap(), Some(r0));
        assert_eq!(store.read(1).unwrap(), None);
    }

    #[test]
    fn test_memory_store_conflict() {
        let store = MemoryStore::new();
        store.append(&record(0, b"zero", &genesis_seed())).unwrap();

        let stale = record(0, b"stale", &genesis_seed());
        match store.append(&stale) {
            Err(StoreError::Conflict { attempted: 0, current: 1 }) => {}
            other => panic!("expected conflict, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_file_store_persists_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ledger.jsonl");

        {
            let store = FileStore::open(&path).unwrap();
            let r0 = record(0, b"first", &genesis_seed());
            store.append(&r0).unwrap();
            store
                .append(&record(1, b"second", &r0.chain_digest))
                .unwrap();
        }

        let store = FileStore::open(&path).unwrap();
        assert_eq!(store.len().unwrap(), 2);
        let r1 = store.read(1).unwrap().unwrap();
        assert_eq!(r1.payload, b"second");
        assert!(r1.payload_intact());
    }

    #[test]
    fn test_file_store_detects_external_append() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ledger.jsonl");

        let a = FileStore::open(&path).unwrap();
        let b = FileStore::open(&path).unwrap();

        let r0 = record(0, b"from-a", &genesis_seed());
        a.append(&r0).unwrap();

        // b's cached state is stale; it must rescan, then reject the
        // stale sequence rather than double-assign it
        let stale = record(0, b"from-b", &genesis_seed());
        match b.append(&stale) {
            Err(StoreError::Conflict { attempted: 0, current: 1 }) => {}
            other => panic!("expected conflict, got {:?}", other.map(|_| ())),
        }
        assert_eq!(b.len().unwrap(), 1);
    }

    #[test]
    fn test_sqlite_store_round_trip() {
        let store = SqliteStore::open_in_memory().unwrap();
        let r0 = record(0, b"zero", &genesis_seed());
        let r1 = record(1, b"one", &r0.chain_digest);

        store.append(&r0).unwrap();
        store.append(&r1).unwrap();

        assert_eq!(store.len().unwrap(), 2);
        assert_eq!(store.read(0).unwrap(), Some(r0));
        assert_eq!(store.read(1).unwrap(), Some(r1));
        assert_eq!(store.read(5).unwrap(), None);
    }

    #[test]
    fn test_sqlite_store_conflict() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.append(&record(0, b"zero", &genesis_seed())).unwrap();

        match store.append(&record(5, b"gap", &genesis_seed())) {
            Err(StoreError::Conflict { attempted: 5, current: 1 }) => {}
            other => panic!("expected conflict, got {:?}", other.map(|_| ())),
        }
    }
}
