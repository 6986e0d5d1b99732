//! Immutable score snapshots

use crate::component::{Component, ComponentScores};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One computed TRS, frozen at a point in time
///
/// Many snapshots per session, one per scored event. Immutable once
/// computed; the ledger copy is the authoritative one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrsSnapshot {
    pub session_id: String,
    pub timestamp: DateTime<Utc>,

    pub friction_engagement: f64,
    pub verification_actions: f64,
    pub acknowledged_responsibility: f64,
    pub correction_clarification: f64,

    /// 0.40·friction + 0.30·verification + 0.20·acknowledgment + 0.10·correction
    pub composite: f64,
}

impl TrsSnapshot {
    /// Freeze the current aggregates for a session
    pub fn from_scores(
        session_id: &str,
        scores: &ComponentScores,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            session_id: session_id.to_string(),
            timestamp,
            friction_engagement: scores.value_or_zero(Component::FrictionEngagement),
            verification_actions: scores.value_or_zero(Component::VerificationActions),
            acknowledged_responsibility: scores
                .value_or_zero(Component::AcknowledgedResponsibility),
            correction_clarification: scores.value_or_zero(Component::CorrectionClarification),
            composite: scores.composite(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_carries_inputs_and_composite() {
        let mut scores = ComponentScores::default();
        scores.set(Component::FrictionEngagement, 0.8);
        scores.set(Component::VerificationActions, 0.6);

        let snapshot = TrsSnapshot::from_scores("ses_1", &scores, Utc::now());
        assert_eq!(snapshot.friction_engagement, 0.8);
        assert_eq!(snapshot.verification_actions, 0.6);
        assert_eq!(snapshot.acknowledged_responsibility, 0.0);
        assert!((snapshot.composite - (0.8 * 0.40 + 0.6 * 0.30)).abs() < 1e-9);
    }
}
