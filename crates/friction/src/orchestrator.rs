//! The orchestrator: decide, issue, score, expire
//!
//! Decides whether a checkpoint is owed for a request, issues it, scores
//! the user's reply, and forwards the quality to the TRS engine. Every
//! terminal outcome (answered or expired) is mirrored into the audit
//! ledger.

use crate::challenge::{ChallengeState, FrictionChallenge};
use crate::prompts::checkpoint_prompt;
use crate::quality::{HeuristicQuality, QualityStrategy};
use crate::OUTCOME_KIND;
use chrono::{DateTime, Duration, Utc};
use ledger::{payload, Ledger, LedgerError};
use parley_core::{Clock, RiskTier};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};
use trs::{Component, TrsEngine, TrsError};

/// Errors from friction orchestration
#[derive(Debug, Error)]
pub enum FrictionError {
    /// The consent window closed before a reply arrived
    #[error("challenge {0} has expired; consent window closed, re-request")]
    ChallengeExpired(String),

    /// Scoring attempted on a challenge that already reached a terminal state
    #[error("challenge {id} cannot be scored in state {state:?}")]
    NotScorable { id: String, state: ChallengeState },

    #[error(transparent)]
    Trs(#[from] TrsError),

    #[error("challenge outcome could not be appended to the ledger")]
    Ledger(#[from] LedgerError),

    #[error("outcome encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Tuning for when checkpoints fire and how long they wait
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrictionConfig {
    /// Seconds a challenge waits for a reply before expiring
    pub window_secs: i64,

    /// Geometric decay on the probability of re-challenging a tier
    pub decay: f64,

    /// Probability floor so repeat challenges never fully stop
    pub floor: f64,

    /// Minimum quality stamped onto issued challenges
    pub min_quality: f64,
}

impl Default for FrictionConfig {
    fn default() -> Self {
        Self {
            window_secs: 120,
            decay: 0.5,
            floor: 0.1,
            min_quality: 0.5,
        }
    }
}

impl From<&parley_core::Config> for FrictionConfig {
    fn from(config: &parley_core::Config) -> Self {
        Self {
            window_secs: config.challenge_window_secs,
            decay: config.challenge_decay,
            floor: config.challenge_floor,
            min_quality: config.quality_floor,
        }
    }
}

/// Why a checkpoint is (or is not) owed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeReason {
    /// First request at this tier in this session - always challenged
    FirstOccurrence,
    /// Repeat request sampled in by the decay schedule
    RepeatSampled,
    /// Repeat request sampled out to avoid checkpoint fatigue
    RepeatSkipped,
    /// DEFAULT tier carries no friction
    TierExempt,
}

/// Outcome of the "is a checkpoint owed?" decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChallengeDecision {
    pub owed: bool,
    pub reason: ChallengeReason,
}

/// A user's reply to a checkpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeReply {
    pub text: String,

    /// How long the user took, if the caller measured it
    pub response_time_ms: Option<u64>,
}

/// Terminal challenge outcome, as mirrored into the ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChallengeOutcome {
    pub challenge_id: String,
    pub request_id: String,
    pub session_id: String,
    pub tier: RiskTier,
    pub state: ChallengeState,
    pub quality: f64,
    pub timestamp: DateTime<Utc>,
}

/// Friction orchestrator
///
/// Stateless with respect to sessions: the caller owns the open challenge
/// and the per-tier challenge counts, and passes them in.
pub struct FrictionOrchestrator {
    trs: Arc<TrsEngine>,
    ledger: Arc<Ledger>,
    clock: Arc<dyn Clock>,
    config: FrictionConfig,
    strategy: Box<dyn QualityStrategy>,
}

impl FrictionOrchestrator {
    pub fn new(trs: Arc<TrsEngine>, ledger: Arc<Ledger>, clock: Arc<dyn Clock>) -> Self {
        Self {
            trs,
            ledger,
            clock,
            config: FrictionConfig::default(),
            strategy: Box::new(HeuristicQuality),
        }
    }

    pub fn with_config(mut self, config: FrictionConfig) -> Self {
        self.config = config;
        self
    }

    /// Swap in a different reply-quality model
    pub fn with_strategy(mut self, strategy: Box<dyn QualityStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn config(&self) -> &FrictionConfig {
        &self.config
    }

    /// Is a checkpoint owed for a request at `tier`, given how many
    /// challenges this session has already seen at that tier?
    pub fn decide(&self, tier: RiskTier, prior_challenges: u32) -> ChallengeDecision {
        let roll = rand::thread_rng().gen::<f64>();
        self.decide_with_roll(tier, prior_challenges, roll)
    }

    /// Deterministic core of `decide`: `roll` is compared against the
    /// repeat probability `max(floor, decay^n)`
    pub fn decide_with_roll(
        &self,
        tier: RiskTier,
        prior_challenges: u32,
        roll: f64,
    ) -> ChallengeDecision {
        if !tier.gated() {
            return ChallengeDecision {
                owed: false,
                reason: ChallengeReason::TierExempt,
            };
        }

        if prior_challenges == 0 {
            return ChallengeDecision {
                owed: true,
                reason: ChallengeReason::FirstOccurrence,
            };
        }

        let probability = self
            .config
            .decay
            .powi(prior_challenges as i32)
            .max(self.config.floor);
        if roll < probability {
            ChallengeDecision {
                owed: true,
                reason: ChallengeReason::RepeatSampled,
            }
        } else {
            ChallengeDecision {
                owed: false,
                reason: ChallengeReason::RepeatSkipped,
            }
        }
    }

    /// Issue a checkpoint for a request
    pub fn issue(&self, request_id: &str, session_id: &str, tier: RiskTier) -> FrictionChallenge {
        let challenge = FrictionChallenge::issue(
            request_id,
            session_id,
            tier,
            checkpoint_prompt(tier),
            self.config.min_quality,
            self.clock.now(),
            Duration::seconds(self.config.window_secs),
        );
        debug!(
            challenge = %challenge.id,
            session = session_id,
            tier = %tier,
            "issued friction challenge"
        );
        challenge
    }

    /// Score a reply and settle the challenge
    ///
    /// The quality is forwarded to the TRS engine and the outcome mirrored
    /// into the ledger. If the window already closed, the challenge
    /// expires instead (scored 0.0, still forwarded) and this fails with
    /// `ChallengeExpired`.
    pub fn score(
        &self,
        challenge: &mut FrictionChallenge,
        reply: &ChallengeReply,
    ) -> Result<f64, FrictionError> {
        if self.expire_if_due(challenge)? {
            return Err(FrictionError::ChallengeExpired(challenge.id.clone()));
        }
        match challenge.state {
            ChallengeState::Issued => {}
            ChallengeState::Expired => {
                return Err(FrictionError::ChallengeExpired(challenge.id.clone()))
            }
            state => {
                return Err(FrictionError::NotScorable {
                    id: challenge.id.clone(),
                    state,
                })
            }
        }

        let quality = self.strategy.score(challenge, reply).clamp(0.0, 1.0);
        challenge.mark_answered();
        self.settle(challenge, quality)?;

        debug!(challenge = %challenge.id, quality, "challenge answered");
        Ok(quality)
    }

    /// Expire the challenge if its window has closed
    ///
    /// Returns whether it expired. An expired challenge is scored 0.0 and
    /// forwarded, so silent abandonment depresses the session's score.
    pub fn expire_if_due(&self, challenge: &mut FrictionChallenge) -> Result<bool, FrictionError> {
        if !challenge.is_due_to_expire(self.clock.now()) {
            return Ok(false);
        }
        challenge.mark_expired();
        self.settle(challenge, 0.0)?;

        info!(
            challenge = %challenge.id,
            session = %challenge.session_id,
            "challenge expired unanswered"
        );
        Ok(true)
    }

    /// Force-expire an open challenge on session teardown
    ///
    /// A disconnect mid-challenge must not leave the challenge dangling.
    pub fn abandon(&self, challenge: &mut FrictionChallenge) -> Result<(), FrictionError> {
        if !challenge.is_open() {
            return Ok(());
        }
        challenge.mark_expired();
        self.settle(challenge, 0.0)?;

        warn!(
            challenge = %challenge.id,
            session = %challenge.session_id,
            "challenge abandoned at session teardown"
        );
        Ok(())
    }

    /// Forward the quality signal and mirror the outcome
    fn settle(&self, challenge: &FrictionChallenge, quality: f64) -> Result<(), FrictionError> {
        self.trs.record_component(
            &challenge.session_id,
            Component::FrictionEngagement,
            quality,
        )?;

        let outcome = ChallengeOutcome {
            challenge_id: challenge.id.clone(),
            request_id: challenge.request_id.clone(),
            session_id: challenge.session_id.clone(),
            tier: challenge.tier,
            state: challenge.state,
            quality,
            timestamp: self.clock.now(),
        };
        let bytes = payload::encode(OUTCOME_KIND, &outcome)?;
        self.ledger.append(&bytes)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger::MemoryStore;
    use parley_core::ManualClock;

    struct Harness {
        orchestrator: FrictionOrchestrator,
        trs: Arc<TrsEngine>,
        ledger: Arc<Ledger>,
        clock: Arc<ManualClock>,
    }

    fn harness() -> Harness {
        let ledger = Arc::new(Ledger::new(Arc::new(MemoryStore::new())));
        let clock = Arc::new(ManualClock::new());
        let trs = Arc::new(TrsEngine::new(
            Arc::clone(&ledger),
            Arc::clone(&clock) as Arc<dyn Clock>,
        ));
        let orchestrator = FrictionOrchestrator::new(
            Arc::clone(&trs),
            Arc::clone(&ledger),
            Arc::clone(&clock) as Arc<dyn Clock>,
        );
        Harness {
            orchestrator,
            trs,
            ledger,
            clock,
        }
    }

    fn good_reply() -> ChallengeReply {
        ChallengeReply {
            text: "I understand and acknowledge that an AI cannot replace \
                   professional advice. I accept responsibility and will \
                   verify anything important."
                .to_string(),
            response_time_ms: Some(9_000),
        }
    }

    #[test]
    fn test_first_occurrence_always_owed() {
        let h = harness();
        for tier in [RiskTier::Sensitive, RiskTier::Research, RiskTier::Forensic] {
            let decision = h.orchestrator.decide_with_roll(tier, 0, 0.999);
            assert!(decision.owed);
            assert_eq!(decision.reason, ChallengeReason::FirstOccurrence);
        }
    }

    #[test]
    fn test_default_tier_exempt() {
        let h = harness();
        let decision = h.orchestrator.decide_with_roll(RiskTier::Default, 0, 0.0);
        assert!(!decision.owed);
        assert_eq!(decision.reason, ChallengeReason::TierExempt);
    }

    #[test]
    fn test_repeat_probability_decays_to_floor() {
        let h = harness();

        // decay 0.5: after 1 challenge p=0.5, after 2 p=0.25, floor 0.1
        let sampled = h.orchestrator.decide_with_roll(RiskTier::Sensitive, 1, 0.49);
        assert!(sampled.owed);
        assert_eq!(sampled.reason, ChallengeReason::RepeatSampled);

        let skipped = h.orchestrator.decide_with_roll(RiskTier::Sensitive, 1, 0.51);
        assert!(!skipped.owed);
        assert_eq!(skipped.reason, ChallengeReason::RepeatSkipped);

        // Deep into the session the floor keeps challenges alive
        let floored = h.orchestrator.decide_with_roll(RiskTier::Sensitive, 30, 0.09);
        assert!(floored.owed);
        let past_floor = h.orchestrator.decide_with_roll(RiskTier::Sensitive, 30, 0.11);
        assert!(!past_floor.owed);
    }

    #[test]
    fn test_answered_challenge_feeds_trs_and_ledger() {
        let h = harness();
        let mut challenge = h.orchestrator.issue("req_1", "ses_1", RiskTier::Sensitive);

        h.clock.advance(Duration::seconds(30));
        let quality = h.orchestrator.score(&mut challenge, &good_reply()).unwrap();

        assert_eq!(challenge.state, ChallengeState::Answered);
        assert!(quality > 0.5);
        assert_eq!(
            h.trs.components("ses_1").friction_engagement,
            Some(quality)
        );

        let record = h.ledger.read(0).unwrap();
        assert_eq!(payload::kind(&record.payload).as_deref(), Some(OUTCOME_KIND));
        let outcome: ChallengeOutcome = payload::decode(&record.payload).unwrap();
        assert_eq!(outcome.state, ChallengeState::Answered);
        assert_eq!(outcome.quality, quality);
    }

    #[test]
    fn test_expiry_scores_zero_and_forwards() {
        let h = harness();
        let mut challenge = h.orchestrator.issue("req_1", "ses_1", RiskTier::Sensitive);

        // Default window is 120s; nothing for 150s
        h.clock.advance(Duration::seconds(150));
        assert!(h.orchestrator.expire_if_due(&mut challenge).unwrap());

        assert_eq!(challenge.state, ChallengeState::Expired);
        assert_eq!(h.trs.components("ses_1").friction_engagement, Some(0.0));

        let outcome: ChallengeOutcome =
            payload::decode(&h.ledger.read(0).unwrap().payload).unwrap();
        assert_eq!(outcome.state, ChallengeState::Expired);
        assert_eq!(outcome.quality, 0.0);
    }

    #[test]
    fn test_score_after_expiry_fails() {
        let h = harness();
        let mut challenge = h.orchestrator.issue("req_1", "ses_1", RiskTier::Sensitive);

        h.clock.advance(Duration::seconds(150));
        let result = h.orchestrator.score(&mut challenge, &good_reply());
        assert!(matches!(result, Err(FrictionError::ChallengeExpired(_))));
        assert_eq!(challenge.state, ChallengeState::Expired);

        // The expiry outcome was still settled exactly once
        assert_eq!(h.trs.components("ses_1").friction_engagement, Some(0.0));
        assert_eq!(h.ledger.len().unwrap(), 1);
    }

    #[test]
    fn test_abandon_forces_expiry() {
        let h = harness();
        let mut challenge = h.orchestrator.issue("req_1", "ses_1", RiskTier::Research);

        // Teardown well before the window closes
        h.clock.advance(Duration::seconds(5));
        h.orchestrator.abandon(&mut challenge).unwrap();

        assert_eq!(challenge.state, ChallengeState::Expired);
        assert_eq!(h.trs.components("ses_1").friction_engagement, Some(0.0));

        // Abandoning again is a no-op
        h.orchestrator.abandon(&mut challenge).unwrap();
        assert_eq!(h.ledger.len().unwrap(), 1);
    }

    #[test]
    fn test_issue_uses_tier_prompt_and_window() {
        let h = harness();
        let challenge = h.orchestrator.issue("req_1", "ses_1", RiskTier::Forensic);

        assert_eq!(challenge.tier, RiskTier::Forensic);
        assert!(challenge.prompt.contains("escalated"));
        assert_eq!(
            challenge.expires_at - challenge.issued_at,
            Duration::seconds(120)
        );
    }
}
