//! Parley TRS - Trust Resilience Score engine
//!
//! Aggregates four behavioral signals per session into one normalized
//! trust metric. Component updates are exponentially-weighted moving
//! averages, so the score tracks recent behavior without letting a single
//! event whipsaw it. Every snapshot is mirrored into the audit ledger.

pub mod component;
pub mod engine;
pub mod snapshot;

pub use component::{Component, ComponentScores};
pub use engine::{TrsEngine, TrsError};
pub use snapshot::TrsSnapshot;

/// Ledger payload tag for snapshots
pub const SNAPSHOT_KIND: &str = "trs_snapshot";
