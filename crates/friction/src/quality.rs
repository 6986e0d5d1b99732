//! Reply quality scoring
//!
//! The exact semantic-quality model is deliberately pluggable: the
//! orchestrator only needs a number in [0, 1]. The default heuristic
//! rewards substance (length, acknowledgment vocabulary, complete
//! sentences) and penalizes the two classic gaming moves: answering
//! faster than a human reads, and answering with a grunt.

use crate::challenge::FrictionChallenge;
use crate::orchestrator::ChallengeReply;

/// Pluggable scorer for challenge replies
pub trait QualityStrategy: Send + Sync {
    /// Score a reply against the challenge's intent, in [0, 1]
    fn score(&self, challenge: &FrictionChallenge, reply: &ChallengeReply) -> f64;
}

/// Default heuristic scorer
pub struct HeuristicQuality;

impl HeuristicQuality {
    /// Vocabulary that signals genuine engagement with a stated limitation
    const ACKNOWLEDGMENT_TERMS: &'static [&'static str] = &[
        "understand",
        "acknowledge",
        "aware",
        "recognize",
        "confirm",
        "agree",
        "consent",
        "accept",
        "verify",
        "check",
        "validate",
        "limitation",
        "responsibility",
    ];

    /// Replies faster than this are likely scripted
    const MIN_RESPONSE_TIME_MS: u64 = 2000;

    /// Replies shorter than this carry no substance
    const MIN_SUBSTANTIVE_LEN: usize = 20;

    /// Reply length at which the length score saturates
    const FULL_LENGTH: usize = 200;
}

impl QualityStrategy for HeuristicQuality {
    fn score(&self, _challenge: &FrictionChallenge, reply: &ChallengeReply) -> f64 {
        let text = reply.text.trim();
        if text.is_empty() {
            return 0.0;
        }
        let lower = text.to_lowercase();

        // Substance from length, saturating
        let length_score = (text.len() as f64 / Self::FULL_LENGTH as f64).min(1.0);

        // Engagement vocabulary
        let term_count = Self::ACKNOWLEDGMENT_TERMS
            .iter()
            .filter(|term| lower.contains(**term))
            .count();
        let keyword_score = (term_count as f64 * 0.2).min(1.0);

        // Complete thoughts
        let sentences = text.matches(['.', '!', '?']).count();
        let structure_score = (sentences as f64 * 0.25).min(1.0);

        let mut score = length_score * 0.3 + keyword_score * 0.4 + structure_score * 0.3;

        // Gaming penalties
        if let Some(elapsed) = reply.response_time_ms {
            if elapsed < Self::MIN_RESPONSE_TIME_MS {
                score *= 0.5;
            }
        }
        if text.len() < Self::MIN_SUBSTANTIVE_LEN {
            score *= 0.7;
        }

        score.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use parley_core::RiskTier;

    fn challenge() -> FrictionChallenge {
        FrictionChallenge::issue(
            "req_1",
            "ses_1",
            RiskTier::Sensitive,
            "What are the limits of relying on an AI here?",
            0.5,
            Utc::now(),
            Duration::seconds(120),
        )
    }

    fn reply(text: &str, elapsed_ms: Option<u64>) -> ChallengeReply {
        ChallengeReply {
            text: text.to_string(),
            response_time_ms: elapsed_ms,
        }
    }

    #[test]
    fn test_empty_reply_scores_zero() {
        let quality = HeuristicQuality;
        assert_eq!(quality.score(&challenge(), &reply("", None)), 0.0);
        assert_eq!(quality.score(&challenge(), &reply("   ", None)), 0.0);
    }

    #[test]
    fn test_substantive_acknowledgment_scores_high() {
        let quality = HeuristicQuality;
        let text = "I understand and acknowledge that an AI cannot replace a \
                    qualified professional. I accept responsibility for how I \
                    use this information and will verify anything important \
                    against authoritative sources.";
        let score = quality.score(&challenge(), &reply(text, Some(12_000)));
        assert!(score > 0.7, "score was {}", score);
    }

    #[test]
    fn test_grunt_scores_low() {
        let quality = HeuristicQuality;
        let score = quality.score(&challenge(), &reply("ok", Some(12_000)));
        assert!(score < 0.2, "score was {}", score);
    }

    #[test]
    fn test_fast_reply_penalized() {
        let quality = HeuristicQuality;
        let text = "I understand and acknowledge the limitations of AI advice. \
                    I will verify important claims independently.";

        let unhurried = quality.score(&challenge(), &reply(text, Some(8_000)));
        let scripted = quality.score(&challenge(), &reply(text, Some(400)));
        assert!((scripted - unhurried * 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_score_stays_in_bounds() {
        let quality = HeuristicQuality;
        let long = "I understand, acknowledge, recognize, confirm, agree, \
                    consent, accept, and will verify and validate everything. "
            .repeat(10);
        let score = quality.score(&challenge(), &reply(&long, Some(60_000)));
        assert!((0.0..=1.0).contains(&score));
    }
}
