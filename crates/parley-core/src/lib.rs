//! Parley Core - Shared functionality for all Parley components
//!
//! Paths, configuration, the risk-tier contract shared by every
//! component, and the injectable clock the timed state transitions
//! run on.

pub mod clock;
pub mod config;
pub mod paths;
pub mod tier;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use paths::Paths;
pub use tier::RiskTier;
