//! Parley Gateway - Tiered consent gating for model-bound requests
//!
//! "The model answers nothing the process hasn't answered for."
//!
//! Every request passes through here before a model response may reach
//! the user. The gateway classifies risk, ratchets the session's tier
//! ceiling (up only, never down), runs the friction orchestrator when a
//! checkpoint is owed, applies the tier's consent rule, and appends the
//! decision to the audit ledger before anything is allowed through. If
//! the ledger cannot take the record, the decision fails closed.

pub mod classify;
pub mod consent;
pub mod gateway;
pub mod notify;
pub mod scan;
pub mod session;
pub mod signals;

pub use classify::{Classifier, KeywordClassifier};
pub use consent::{ConsentDecision, ConsentRecord, ConsentState, ReasonCode};
pub use gateway::{
    parse_tier, ConsentGateway, Decision, Evaluation, GatewayConfig, GatewayError,
    IncomingRequest, Request,
};
pub use notify::{Escalation, FileSink, NotificationSink, TracingSink};
pub use parley_core::RiskTier;
pub use scan::{Finding, FindingKind, RegexScanner, ScanReport, Scanner};
pub use session::{Session, SessionFiles, SessionRegistry};

/// Ledger payload tag for consent records
pub const CONSENT_KIND: &str = "consent_record";
