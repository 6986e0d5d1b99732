//! The append/verify/read surface over a store
//!
//! `append` is the single serialization point for audit state: it reads
//! the current tail, chains a new record, and compare-and-appends. A lost
//! race surfaces as a store conflict and is retried against the new tail,
//! up to a bound; exhausting the bound means the ledger is unavailable and
//! callers must fail closed.

use crate::record::{genesis_seed, LedgerRecord};
use crate::store::{Store, StoreError};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, warn};

/// Default bound on append-conflict retries
pub const DEFAULT_APPEND_RETRIES: usize = 5;

/// Errors from ledger operations
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("record {0} not found")]
    NotFound(u64),

    #[error("invalid sequence range {from}..={to} (ledger has {len} records)")]
    InvalidRange { from: u64, to: u64, len: u64 },

    #[error("ledger unavailable after {attempts} append attempts")]
    Unavailable {
        attempts: usize,
        #[source]
        source: StoreError,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Append-only, hash-chained record ledger
pub struct Ledger {
    store: Arc<dyn Store>,
    append_retries: usize,
}

impl Ledger {
    /// Create a ledger over a store with the default retry bound
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self::with_retries(store, DEFAULT_APPEND_RETRIES)
    }

    /// Create a ledger with an explicit append-retry bound
    pub fn with_retries(store: Arc<dyn Store>, append_retries: usize) -> Self {
        Self {
            store,
            append_retries,
        }
    }

    /// Append opaque payload bytes as the next record
    ///
    /// The record is durably persisted before this returns. Payloads
    /// containing sensitive content must be redacted or digested by the
    /// caller first; the ledger stores what it is given.
    pub fn append(&self, payload: &[u8]) -> Result<LedgerRecord, LedgerError> {
        let mut last_conflict = None;

        for attempt in 0..=self.append_retries {
            let sequence = self.store.len()?;
            let prev_chain = if sequence == 0 {
                genesis_seed()
            } else {
                self.store
                    .read(sequence - 1)?
                    .ok_or(LedgerError::NotFound(sequence - 1))?
                    .chain_digest
            };

            let record = LedgerRecord::chained(sequence, payload.to_vec(), &prev_chain);
            match self.store.append(&record) {
                Ok(()) => return Ok(record),
                Err(conflict @ StoreError::Conflict { .. }) => {
                    warn!(attempt, sequence, "ledger append lost the race, retrying");
                    last_conflict = Some(conflict);
                }
                Err(other) => return Err(other.into()),
            }
        }

        let source = last_conflict.expect("retry loop exits only via conflict");
        error!(
            attempts = self.append_retries + 1,
            "ledger append exhausted its retry bound"
        );
        Err(LedgerError::Unavailable {
            attempts: self.append_retries + 1,
            source,
        })
    }

    /// Direct lookup by sequence number
    pub fn read(&self, sequence: u64) -> Result<LedgerRecord, LedgerError> {
        self.store
            .read(sequence)?
            .ok_or(LedgerError::NotFound(sequence))
    }

    /// Number of records appended so far
    pub fn len(&self) -> Result<u64, LedgerError> {
        Ok(self.store.len()?)
    }

    /// Whether the ledger holds no records yet
    pub fn is_empty(&self) -> Result<bool, LedgerError> {
        Ok(self.len()? == 0)
    }

    /// The most recent `count` records, oldest first
    pub fn tail(&self, count: u64) -> Result<Vec<LedgerRecord>, LedgerError> {
        let len = self.len()?;
        let from = len.saturating_sub(count);
        (from..len).map(|seq| self.read(seq)).collect()
    }

    /// Recompute the chain across `from..=to` and report whether every
    /// payload digest and chain digest matches
    ///
    /// Altering payload `n` invalidates the chain for every record `>= n`,
    /// so verification fails for every range that includes a tampered
    /// record. Integrity failures are an operator concern (tampering
    /// investigation), logged here at error level.
    pub fn verify(&self, from: u64, to: u64) -> Result<bool, LedgerError> {
        let len = self.len()?;
        if from > to || to >= len {
            return Err(LedgerError::InvalidRange { from, to, len });
        }

        let mut prev_chain = if from == 0 {
            genesis_seed()
        } else {
            self.read(from - 1)?.chain_digest
        };

        for sequence in from..=to {
            let record = self.read(sequence)?;
            if !record.payload_intact() {
                error!(sequence, "ledger payload digest mismatch");
                return Ok(false);
            }
            if !record.chains_from(&prev_chain) {
                error!(sequence, "ledger chain digest mismatch");
                return Ok(false);
            }
            prev_chain = record.chain_digest;
        }

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{FileStore, MemoryStore};
    use std::thread;
    use tempfile::tempdir;

    #[test]
    fn test_append_assigns_gapless_sequences() {
        let ledger = Ledger::new(Arc::new(MemoryStore::new()));

        for i in 0..5u64 {
            let record = ledger.append(format!("payload-{}", i).as_bytes()).unwrap();
            assert_eq!(record.sequence, i);
        }

        assert_eq!(ledger.len().unwrap(), 5);
        assert!(ledger.verify(0, 4).unwrap());
    }

    #[test]
    fn test_read_not_found() {
        let ledger = Ledger::new(Arc::new(MemoryStore::new()));
        ledger.append(b"only").unwrap();

        assert!(matches!(ledger.read(7), Err(LedgerError::NotFound(7))));
    }

    #[test]
    fn test_verify_rejects_bad_range() {
        let ledger = Ledger::new(Arc::new(MemoryStore::new()));
        ledger.append(b"only").unwrap();

        assert!(matches!(
            ledger.verify(0, 3),
            Err(LedgerError::InvalidRange { .. })
        ));
        assert!(matches!(
            ledger.verify(1, 0),
            Err(LedgerError::InvalidRange { .. })
        ));
    }

    #[test]
    fn test_concurrent_appends_form_contiguous_chain() {
        // Bound must exceed the worst case: a thread can lose one race per
        // append any other thread completes
        let ledger = Arc::new(Ledger::with_retries(Arc::new(MemoryStore::new()), 512));
        let threads = 8;
        let per_thread = 25;

        let handles: Vec<_> = (0..threads)
            .map(|t| {
                let ledger = Arc::clone(&ledger);
                thread::spawn(move || {
                    for i in 0..per_thread {
                        ledger
                            .append(format!("t{}-{}", t, i).as_bytes())
                            .expect("append within retry bound");
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let total = (threads * per_thread) as u64;
        assert_eq!(ledger.len().unwrap(), total);
        // Sequences are the read index, so contiguity falls out of len +
        // every read succeeding; the chain proves the order is consistent.
        for seq in 0..total {
            assert_eq!(ledger.read(seq).unwrap().sequence, seq);
        }
        assert!(ledger.verify(0, total - 1).unwrap());
    }

    #[test]
    fn test_tampering_breaks_every_range_including_the_record() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ledger.jsonl");

        {
            let ledger = Ledger::new(Arc::new(FileStore::open(&path).unwrap()));
            for i in 0..4u64 {
                ledger.append(format!("entry-{}", i).as_bytes()).unwrap();
            }
            assert!(ledger.verify(0, 3).unwrap());
        }

        // Rewrite record 2's payload on disk without touching its digests
        let content = std::fs::read_to_string(&path).unwrap();
        let mut lines: Vec<String> = content.lines().map(String::from).collect();
        let mut encoded: crate::record::EncodedRecord = serde_json::from_str(&lines[2]).unwrap();
        encoded.payload = {
            use base64::{engine::general_purpose::STANDARD, Engine as _};
            STANDARD.encode(b"entry-X")
        };
        lines[2] = serde_json::to_string(&encoded).unwrap();
        std::fs::write(&path, lines.join("\n") + "\n").unwrap();

        let ledger = Ledger::new(Arc::new(FileStore::open(&path).unwrap()));
        assert!(!ledger.verify(0, 3).unwrap());
        assert!(!ledger.verify(2, 2).unwrap());
        assert!(!ledger.verify(2, 3).unwrap());
        // Ranges strictly before the tampered record still verify
        assert!(ledger.verify(0, 1).unwrap());
    }

    #[test]
    fn test_tail_returns_most_recent() {
        let ledger = Ledger::new(Arc::new(MemoryStore::new()));
        for i in 0..10u64 {
            ledger.append(format!("{}", i).as_bytes()).unwrap();
        }

        let tail = ledger.tail(3).unwrap();
        assert_eq!(tail.len(), 3);
        assert_eq!(tail[0].sequence, 7);
        assert_eq!(tail[2].sequence, 9);
    }
}
