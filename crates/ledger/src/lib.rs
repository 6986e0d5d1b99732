//! Parley Ledger - Write-once, hash-chained audit trail
//!
//! "If it isn't in the ledger, it didn't happen. If it's in the ledger,
//! it can't quietly change."
//!
//! Every consent decision, trust-score snapshot, and checkpoint outcome is
//! appended here. Each record's chain digest incorporates the previous
//! record's chain digest, so altering any stored payload invalidates the
//! chain for every later record. Appends are linearized by optimistic
//! compare-and-append against the backing store with a bounded retry.

pub mod ledger;
pub mod payload;
pub mod record;
pub mod store;

pub use ledger::{Ledger, LedgerError};
pub use record::{genesis_seed, Digest, EncodedRecord, LedgerRecord};
pub use store::{FileStore, MemoryStore, SqliteStore, Store, StoreError};
