//! Parley Friction - Checkpoint orchestration
//!
//! "The pause is the product."
//!
//! Before a high-stakes exchange proceeds, the orchestrator may interpose
//! a checkpoint question. It decides when one is owed (always on first
//! contact with a gated tier, probabilistically on repeats so users are
//! not fatigued), issues the challenge with an expiry window, scores the
//! reply, and feeds the quality into the Trust Resilience Score. A
//! challenge that dies unanswered scores 0.0 - silence is a signal too.

pub mod challenge;
pub mod orchestrator;
pub mod prompts;
pub mod quality;

pub use challenge::{ChallengeState, FrictionChallenge};
pub use orchestrator::{
    ChallengeDecision, ChallengeOutcome, ChallengeReason, ChallengeReply, FrictionConfig,
    FrictionError, FrictionOrchestrator,
};
pub use quality::{HeuristicQuality, QualityStrategy};

/// Ledger payload tag for challenge outcomes
pub const OUTCOME_KIND: &str = "friction_outcome";
