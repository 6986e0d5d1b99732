//! Consent state machine types and the decision record
//!
//! Per session×tier: `Unseen -> Pending -> Granted | Denied | Escalated`.
//! Granted persists for the rest of the session at that tier. Denied is
//! re-requestable: the user is told the window closed and a later request
//! starts a fresh round. Escalated requests keep escalating - there is no
//! way to answer your way out of FORENSIC handling.

use chrono::{DateTime, Utc};
use parley_core::RiskTier;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Consent progress for one session×tier pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsentState {
    /// Tier never seen in this session
    Unseen,
    /// Checkpoint issued, awaiting the user's reply
    Pending,
    /// Consent granted; persists for the session at this tier
    Granted,
    /// Consent refused or window closed; a later request may retry
    Denied,
    /// Routed to a human accountability channel
    Escalated,
}

impl Default for ConsentState {
    fn default() -> Self {
        ConsentState::Unseen
    }
}

/// The decision recorded for one request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsentDecision {
    Allow,
    Hold,
    Deny,
    Escalate,
}

impl ConsentDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Hold => "hold",
            Self::Deny => "deny",
            Self::Escalate => "escalate",
        }
    }
}

impl fmt::Display for ConsentDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Why a decision came out the way it did
///
/// Every user-visible outcome carries one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    /// DEFAULT tier auto-grants
    TierDefault,
    /// Session already holds a grant at this tier
    PriorGrant,
    /// Challenge answered at or above the quality floor
    ChallengeAnswered,
    /// Checkpoint issued, waiting on the user
    ChallengePending,
    /// Reply scored below the quality floor
    QualityBelowFloor,
    /// Challenge expired unanswered
    ConsentWindowClosed,
    /// RESEARCH tier needs a written justification of minimum length
    JustificationRequired,
    /// FORENSIC tier escalates unconditionally
    ForensicMandatory,
    /// Prompt-injection pattern in the request
    InjectionDetected,
    /// Decision record could not be durably appended; failing closed
    LedgerUnavailable,
}

impl ReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TierDefault => "tier_default",
            Self::PriorGrant => "prior_grant",
            Self::ChallengeAnswered => "challenge_answered",
            Self::ChallengePending => "challenge_pending",
            Self::QualityBelowFloor => "quality_below_floor",
            Self::ConsentWindowClosed => "consent_window_closed",
            Self::JustificationRequired => "justification_required",
            Self::ForensicMandatory => "forensic_mandatory",
            Self::InjectionDetected => "injection_detected",
            Self::LedgerUnavailable => "ledger_unavailable",
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of a consent check, mirrored into the audit ledger
///
/// Created once per evaluated request; immutable. Carries the payload
/// digest rather than the payload, so the ledger stays free of sensitive
/// content by default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsentRecord {
    pub request_id: String,
    pub session_id: String,

    /// Effective tier the decision was made at (the session ceiling)
    pub tier: RiskTier,

    pub decision: ConsentDecision,
    pub reason: ReasonCode,

    /// Written justification, required for RESEARCH grants
    #[serde(skip_serializing_if = "Option::is_none")]
    pub justification: Option<String>,

    /// Hex SHA-256 of the redacted request payload
    pub payload_digest: String,

    /// Challenge settled by this decision, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub challenge_id: Option<String>,

    /// Reply quality, when a challenge was scored
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<f64>,

    pub timestamp: DateTime<Utc>,
}
