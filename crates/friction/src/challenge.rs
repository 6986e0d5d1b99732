//! Challenge lifecycle
//!
//! One challenge per gated request at most. Lifecycle:
//! `Issued -> Answered` on a scored reply, or `Issued -> Expired` when the
//! window closes (or the session is torn down mid-challenge).

use chrono::{DateTime, Duration, Utc};
use parley_core::RiskTier;
use serde::{Deserialize, Serialize};

/// Where a challenge is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChallengeState {
    /// Presented to the user, awaiting a reply
    Issued,
    /// Reply received and scored
    Answered,
    /// Window closed without a reply
    Expired,
}

/// A checkpoint question interposed before a high-stakes response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrictionChallenge {
    /// Unique challenge ID
    pub id: String,

    /// The request this challenge gates
    pub request_id: String,

    /// Session the request belongs to
    pub session_id: String,

    /// Tier that triggered the checkpoint
    pub tier: RiskTier,

    /// The checkpoint question shown to the user
    pub prompt: String,

    /// Minimum reply quality expected for this challenge
    pub min_quality: f64,

    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,

    pub state: ChallengeState,
}

impl FrictionChallenge {
    /// Create an issued challenge with an expiry window
    pub fn issue(
        request_id: &str,
        session_id: &str,
        tier: RiskTier,
        prompt: &str,
        min_quality: f64,
        issued_at: DateTime<Utc>,
        window: Duration,
    ) -> Self {
        Self {
            id: format!("chal_{}", uuid::Uuid::new_v4().simple()),
            request_id: request_id.to_string(),
            session_id: session_id.to_string(),
            tier,
            prompt: prompt.to_string(),
            min_quality,
            issued_at,
            expires_at: issued_at + window,
            state: ChallengeState::Issued,
        }
    }

    /// Still waiting for a reply?
    pub fn is_open(&self) -> bool {
        self.state == ChallengeState::Issued
    }

    /// Has the window closed as of `now`?
    pub fn is_due_to_expire(&self, now: DateTime<Utc>) -> bool {
        self.is_open() && now >= self.expires_at
    }

    /// Mark answered. Only valid from `Issued`.
    pub(crate) fn mark_answered(&mut self) {
        debug_assert_eq!(self.state, ChallengeState::Issued);
        self.state = ChallengeState::Answered;
    }

    /// Mark expired. Only valid from `Issued`.
    pub(crate) fn mark_expired(&mut self) {
        debug_assert_eq!(self.state, ChallengeState::Issued);
        self.state = ChallengeState::Expired;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn challenge(now: DateTime<Utc>) -> FrictionChallenge {
        FrictionChallenge::issue(
            "req_1",
            "ses_1",
            RiskTier::Sensitive,
            "Do you understand?",
            0.5,
            now,
            Duration::seconds(120),
        )
    }

    #[test]
    fn test_new_challenge_is_open() {
        let now = Utc::now();
        let challenge = challenge(now);
        assert!(challenge.is_open());
        assert_eq!(challenge.expires_at - challenge.issued_at, Duration::seconds(120));
    }

    #[test]
    fn test_expiry_boundary() {
        let now = Utc::now();
        let challenge = challenge(now);

        assert!(!challenge.is_due_to_expire(now + Duration::seconds(119)));
        assert!(challenge.is_due_to_expire(now + Duration::seconds(120)));
        assert!(challenge.is_due_to_expire(now + Duration::seconds(150)));
    }

    #[test]
    fn test_answered_challenge_never_expires() {
        let now = Utc::now();
        let mut challenge = challenge(now);
        challenge.mark_answered();

        assert!(!challenge.is_due_to_expire(now + Duration::seconds(999)));
    }

    #[test]
    fn test_ids_are_unique() {
        let now = Utc::now();
        assert_ne!(challenge(now).id, challenge(now).id);
    }
}
