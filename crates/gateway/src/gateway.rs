//! The consent gateway
//!
//! `evaluate` is the one entry point: scan, classify, ratchet the session
//! ceiling, run the consent state machine for the effective tier, and
//! append the decision to the audit ledger. The append is the last gate:
//! if the record cannot be durably written, an Allow or Hold degrades to
//! Deny. An unaudited action never proceeds.

use crate::classify::{Classifier, KeywordClassifier};
use crate::consent::{ConsentDecision, ConsentRecord, ConsentState, ReasonCode};
use crate::notify::{Escalation, NotificationSink, TracingSink};
use crate::scan::{RegexScanner, Scanner};
use crate::session::{Session, SessionRegistry};
use crate::signals;
use crate::CONSENT_KIND;
use chrono::{DateTime, Utc};
use friction::{ChallengeReply, FrictionChallenge, FrictionError, FrictionOrchestrator};
use ledger::record::{payload_digest, to_hex};
use ledger::{payload, Ledger, LedgerError};
use parley_core::{Clock, RiskTier};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info};
use trs::{Component, TrsEngine, TrsError, TrsSnapshot};

/// Gateway tuning
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Minimum reply quality for a SENSITIVE/RESEARCH grant
    pub quality_floor: f64,

    /// Minimum written-justification length for RESEARCH grants
    pub min_justification_len: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            quality_floor: 0.5,
            min_justification_len: 40,
        }
    }
}

impl From<&parley_core::Config> for GatewayConfig {
    fn from(config: &parley_core::Config) -> Self {
        Self {
            quality_floor: config.quality_floor,
            min_justification_len: config.min_justification_len,
        }
    }
}

/// Errors from the gateway
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Malformed input; the single request is rejected, session unaffected
    #[error("validation: {0}")]
    Validation(String),

    /// A collaborator produced a tier outside the four known values
    #[error("unknown risk tier: {0}")]
    UnknownTier(String),

    #[error(transparent)]
    Friction(#[from] FrictionError),

    #[error(transparent)]
    Trs(#[from] TrsError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("pattern compilation failed: {0}")]
    Pattern(#[from] regex::Error),

    #[error("record encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Parse a tier name from an out-of-process collaborator
///
/// The gateway validates classifier output no further than this: it must
/// be one of the four known tiers.
pub fn parse_tier(name: &str) -> Result<RiskTier, GatewayError> {
    RiskTier::from_str(name).ok_or_else(|| GatewayError::UnknownTier(name.to_string()))
}

/// One user message bound for the model, plus consent-flow context
#[derive(Debug, Clone)]
pub struct IncomingRequest {
    pub session_id: String,
    pub user_id: String,

    /// Raw request text. Scanned and redacted before anything is digested.
    pub text: String,

    /// Written justification (RESEARCH tier requires one to grant)
    pub justification: Option<String>,

    /// Reply to the session's open challenge, if the user sent one
    pub challenge_reply: Option<ChallengeReply>,
}

impl IncomingRequest {
    pub fn new(session_id: &str, user_id: &str, text: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            user_id: user_id.to_string(),
            text: text.to_string(),
            justification: None,
            challenge_reply: None,
        }
    }

    pub fn with_justification(mut self, justification: &str) -> Self {
        self.justification = Some(justification.to_string());
        self
    }

    pub fn with_reply(mut self, reply: ChallengeReply) -> Self {
        self.challenge_reply = Some(reply);
        self
    }
}

/// Immutable request metadata; the raw payload is digested, not kept
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub id: String,
    pub session_id: String,

    /// Hex SHA-256 of the redacted payload
    pub payload_digest: String,

    /// Tier the classifier assigned to this request's content
    pub tier: RiskTier,

    pub timestamp: DateTime<Utc>,
}

/// The gateway's answer for one request
#[derive(Debug, Clone)]
pub enum Decision {
    /// Proceed: the caller may invoke the model provider
    Allow { reason: ReasonCode },

    /// Blocked on the user: present the challenge and call back with the
    /// reply
    Hold { challenge: FrictionChallenge },

    /// Refused, with a user-visible reason code
    Deny { reason: ReasonCode },

    /// Routed to a human accountability channel
    Escalate { reason: ReasonCode },
}

impl Decision {
    pub fn consent(&self) -> ConsentDecision {
        match self {
            Self::Allow { .. } => ConsentDecision::Allow,
            Self::Hold { .. } => ConsentDecision::Hold,
            Self::Deny { .. } => ConsentDecision::Deny,
            Self::Escalate { .. } => ConsentDecision::Escalate,
        }
    }

    pub fn reason(&self) -> ReasonCode {
        match self {
            Self::Allow { reason } | Self::Deny { reason } | Self::Escalate { reason } => *reason,
            Self::Hold { .. } => ReasonCode::ChallengePending,
        }
    }

    /// May the caller invoke the model provider?
    pub fn allows(&self) -> bool {
        matches!(self, Self::Allow { .. })
    }
}

/// Everything `evaluate` produces for one request
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub request: Request,
    pub decision: Decision,

    /// The consent record as appended to the ledger
    pub record: ConsentRecord,

    /// TRS snapshot taken when a challenge was settled this turn
    pub trs: Option<TrsSnapshot>,
}

/// What the state machine concluded, before the ledger gate
struct Outcome {
    decision: Decision,
    challenge_id: Option<String>,
    quality: Option<f64>,
    snapshot: Option<TrsSnapshot>,
}

impl Outcome {
    fn plain(decision: Decision) -> Self {
        Self {
            decision,
            challenge_id: None,
            quality: None,
            snapshot: None,
        }
    }
}

/// The top-level consent state machine
pub struct ConsentGateway {
    ledger: Arc<Ledger>,
    trs: Arc<TrsEngine>,
    friction: FrictionOrchestrator,
    clock: Arc<dyn Clock>,
    registry: SessionRegistry,
    classifier: Box<dyn Classifier>,
    scanner: Box<dyn Scanner>,
    sink: Box<dyn NotificationSink>,
    config: GatewayConfig,
}

impl ConsentGateway {
    /// Assemble a gateway with the default classifier, scanner, and sink
    pub fn new(
        ledger: Arc<Ledger>,
        trs: Arc<TrsEngine>,
        friction: FrictionOrchestrator,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, GatewayError> {
        Ok(Self {
            ledger,
            trs,
            friction,
            clock,
            registry: SessionRegistry::new(),
            classifier: Box::new(KeywordClassifier::new()?),
            scanner: Box::new(RegexScanner::new()?),
            sink: Box::new(TracingSink),
            config: GatewayConfig::default(),
        })
    }

    pub fn with_classifier(mut self, classifier: Box<dyn Classifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_scanner(mut self, scanner: Box<dyn Scanner>) -> Self {
        self.scanner = scanner;
        self
    }

    pub fn with_sink(mut self, sink: Box<dyn NotificationSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_config(mut self, config: GatewayConfig) -> Self {
        self.config = config;
        self
    }

    /// Session registry, for adoption/inspection by operational tooling
    pub fn sessions(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Evaluate one request end to end
    pub fn evaluate(&self, input: IncomingRequest) -> Result<Evaluation, GatewayError> {
        if input.session_id.trim().is_empty() {
            return Err(GatewayError::Validation("session id is empty".into()));
        }
        if input.user_id.trim().is_empty() {
            return Err(GatewayError::Validation("user id is empty".into()));
        }
        if input.text.trim().is_empty() && input.challenge_reply.is_none() {
            return Err(GatewayError::Validation("request text is empty".into()));
        }

        // Redact before anything is digested or classified
        let report = self.scanner.scan(&input.text);
        let classified = self.classifier.classify(&report.redacted);
        let now = self.clock.now();

        let request = Request {
            id: format!("req_{}", uuid::Uuid::new_v4().simple()),
            session_id: input.session_id.clone(),
            payload_digest: to_hex(&payload_digest(report.redacted.as_bytes())),
            tier: classified,
            timestamp: now,
        };

        let entry = self
            .registry
            .get_or_create(&input.session_id, &input.user_id, now);
        let mut session = entry.lock().unwrap();

        // The ratchet only turns up; a lower classification inherits the
        // session's ceiling for gating
        if classified > session.ceiling() {
            session.raise_ceiling(classified);
        }
        let effective = session.ceiling();

        // Passive behavioral signals
        if signals::verification_intent(&input.text) {
            self.trs
                .record_component(&session.id, Component::VerificationActions, 1.0)?;
        }
        if signals::correction_intent(&input.text) {
            self.trs
                .record_component(&session.id, Component::CorrectionClarification, 1.0)?;
        }

        let outcome = if report.injection_detected() {
            info!(
                session = %session.id,
                request = %request.id,
                "prompt injection detected; escalating"
            );
            Outcome::plain(Decision::Escalate {
                reason: ReasonCode::InjectionDetected,
            })
        } else {
            self.run_consent_machine(&mut session, &request, &input, effective)?
        };

        self.finish(&mut session, request, outcome, effective, input.justification)
    }

    /// Tear a session down; an open challenge is force-expired, never left
    /// dangling
    pub fn teardown(&self, session_id: &str) -> Result<(), GatewayError> {
        if let Some(entry) = self.registry.remove(session_id) {
            let mut session = entry.lock().unwrap();
            if let Some(mut challenge) = session.open_challenge.take() {
                self.friction.abandon(&mut challenge)?;
                session.set_consent(challenge.tier, ConsentState::Denied);
            }
        }
        Ok(())
    }

    /// The per-tier consent rules, given the session's state at `effective`
    fn run_consent_machine(
        &self,
        session: &mut Session,
        request: &Request,
        input: &IncomingRequest,
        effective: RiskTier,
    ) -> Result<Outcome, GatewayError> {
        // A grant persists for the session at that tier
        if session.consent_state(effective) == ConsentState::Granted {
            return Ok(Outcome::plain(Decision::Allow {
                reason: ReasonCode::PriorGrant,
            }));
        }

        // Settle the open challenge first, if there is one
        if let Some(mut challenge) = session.open_challenge.take() {
            if self.friction.expire_if_due(&mut challenge)? {
                return self.settle_expired(session, &challenge, effective);
            }

            return match &input.challenge_reply {
                None => {
                    // Still waiting; re-present the same checkpoint
                    session.open_challenge = Some(challenge.clone());
                    let challenge_id = challenge.id.clone();
                    Ok(Outcome {
                        decision: Decision::Hold { challenge },
                        challenge_id: Some(challenge_id),
                        quality: None,
                        snapshot: None,
                    })
                }
                Some(reply) => self.settle_reply(session, challenge, reply, input, effective),
            };
        }

        // No open challenge: decide whether one is owed
        let state = session.consent_state(effective);
        let owed = match state {
            // A denial is re-requestable, and a retry always re-challenges
            ConsentState::Denied => effective.gated(),
            _ => {
                self.friction
                    .decide(effective, session.challenges_at(effective))
                    .owed
            }
        };

        match effective {
            RiskTier::Default => {
                session.set_consent(effective, ConsentState::Granted);
                Ok(Outcome::plain(Decision::Allow {
                    reason: ReasonCode::TierDefault,
                }))
            }
            RiskTier::Forensic if !owed => {
                // Repeat friction sampled out; escalation is still mandatory
                session.set_consent(effective, ConsentState::Escalated);
                Ok(Outcome::plain(Decision::Escalate {
                    reason: ReasonCode::ForensicMandatory,
                }))
            }
            _ => {
                let challenge = self.friction.issue(&request.id, &session.id, effective);
                session.note_challenge(effective);
                session.set_consent(effective, ConsentState::Pending);
                session.open_challenge = Some(challenge.clone());
                debug!(
                    session = %session.id,
                    tier = %effective,
                    "holding for consent"
                );
                let challenge_id = challenge.id.clone();
                Ok(Outcome {
                    decision: Decision::Hold { challenge },
                    challenge_id: Some(challenge_id),
                    quality: None,
                    snapshot: None,
                })
            }
        }
    }

    /// An expired challenge denies the pending request (fail closed)
    fn settle_expired(
        &self,
        session: &mut Session,
        challenge: &FrictionChallenge,
        effective: RiskTier,
    ) -> Result<Outcome, GatewayError> {
        session.set_consent(effective, ConsentState::Denied);
        self.trs
            .record_component(&session.id, Component::AcknowledgedResponsibility, 0.0)?;
        let snapshot = self.try_snapshot(&session.id);

        Ok(Outcome {
            decision: Decision::Deny {
                reason: ReasonCode::ConsentWindowClosed,
            },
            challenge_id: Some(challenge.id.clone()),
            quality: Some(0.0),
            snapshot,
        })
    }

    /// Score the reply and apply the tier's grant rule
    fn settle_reply(
        &self,
        session: &mut Session,
        mut challenge: FrictionChallenge,
        reply: &ChallengeReply,
        input: &IncomingRequest,
        effective: RiskTier,
    ) -> Result<Outcome, GatewayError> {
        let quality = match self.friction.score(&mut challenge, reply) {
            Ok(quality) => quality,
            // The window closed between issue and reply
            Err(FrictionError::ChallengeExpired(_)) => {
                return self.settle_expired(session, &challenge, effective)
            }
            Err(e) => return Err(e.into()),
        };

        let engaged = quality >= self.config.quality_floor;
        self.trs.record_component(
            &session.id,
            Component::AcknowledgedResponsibility,
            if engaged { 1.0 } else { 0.0 },
        )?;
        let snapshot = self.try_snapshot(&session.id);

        let justified = input
            .justification
            .as_deref()
            .map(|j| j.trim().len() >= self.config.min_justification_len)
            .unwrap_or(false);

        let decision = match effective {
            RiskTier::Default | RiskTier::Sensitive if engaged => {
                session.set_consent(effective, ConsentState::Granted);
                Decision::Allow {
                    reason: ReasonCode::ChallengeAnswered,
                }
            }
            RiskTier::Research if engaged && justified => {
                session.set_consent(effective, ConsentState::Granted);
                Decision::Allow {
                    reason: ReasonCode::ChallengeAnswered,
                }
            }
            RiskTier::Research if engaged => {
                session.set_consent(effective, ConsentState::Denied);
                Decision::Deny {
                    reason: ReasonCode::JustificationRequired,
                }
            }
            // Escalation is unconditional: answering perfectly does not
            // buy FORENSIC requests out of human review
            RiskTier::Forensic => {
                session.set_consent(effective, ConsentState::Escalated);
                Decision::Escalate {
                    reason: ReasonCode::ForensicMandatory,
                }
            }
            _ => {
                session.set_consent(effective, ConsentState::Denied);
                Decision::Deny {
                    reason: ReasonCode::QualityBelowFloor,
                }
            }
        };

        Ok(Outcome {
            decision,
            challenge_id: Some(challenge.id),
            quality: Some(quality),
            snapshot,
        })
    }

    /// Append the consent record; degrade to Deny if the ledger won't
    /// take it, then notify on escalation
    fn finish(
        &self,
        session: &mut Session,
        request: Request,
        outcome: Outcome,
        effective: RiskTier,
        justification: Option<String>,
    ) -> Result<Evaluation, GatewayError> {
        let now = self.clock.now();
        session.touch(now);

        let Outcome {
            mut decision,
            challenge_id,
            quality,
            snapshot,
        } = outcome;
        let mut record = self.build_record(
            &request,
            &decision,
            &challenge_id,
            quality,
            effective,
            &justification,
            now,
        );

        if let Err(e) = self.append_record(&record) {
            error!(
                request = %request.id,
                "consent record could not be appended: {}; failing closed",
                e
            );
            if !matches!(decision, Decision::Escalate { .. }) {
                decision = Decision::Deny {
                    reason: ReasonCode::LedgerUnavailable,
                };
                // An unaudited grant must not survive in session state
                session.set_consent(effective, ConsentState::Denied);
                session.open_challenge = None;
                record = self.build_record(
                    &request,
                    &decision,
                    &challenge_id,
                    quality,
                    effective,
                    &justification,
                    now,
                );
            }
            if let Err(e) = self.append_record(&record) {
                error!(
                    request = %request.id,
                    "fail-closed record also unappendable: {}",
                    e
                );
            }
        }

        if let Decision::Escalate { reason } = &decision {
            self.sink.notify(&Escalation {
                session_id: session.id.clone(),
                request_id: request.id.clone(),
                tier: effective,
                reason: *reason,
                timestamp: now,
            });
        }

        debug!(
            request = %request.id,
            session = %session.id,
            tier = %effective,
            decision = %decision.consent(),
            reason = %decision.reason(),
            "consent decision"
        );

        Ok(Evaluation {
            request,
            decision,
            record,
            trs: snapshot,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn build_record(
        &self,
        request: &Request,
        decision: &Decision,
        challenge_id: &Option<String>,
        quality: Option<f64>,
        effective: RiskTier,
        justification: &Option<String>,
        now: DateTime<Utc>,
    ) -> ConsentRecord {
        ConsentRecord {
            request_id: request.id.clone(),
            session_id: request.session_id.clone(),
            tier: effective,
            decision: decision.consent(),
            reason: decision.reason(),
            justification: justification.clone(),
            payload_digest: request.payload_digest.clone(),
            challenge_id: challenge_id.clone(),
            quality,
            timestamp: now,
        }
    }

    fn append_record(&self, record: &ConsentRecord) -> Result<(), LedgerError> {
        let bytes = payload::encode(CONSENT_KIND, record)
            .map_err(|e| LedgerError::Store(ledger::StoreError::Backend(e.to_string())))?;
        self.ledger.append(&bytes)?;
        Ok(())
    }

    /// Snapshot the TRS; a ledger hiccup here is logged, not fatal - the
    /// consent append below is the gate that fails closed
    fn try_snapshot(&self, session_id: &str) -> Option<TrsSnapshot> {
        match self.trs.snapshot(session_id) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                error!(session = session_id, "TRS snapshot failed: {}", e);
                None
            }
        }
    }
}
