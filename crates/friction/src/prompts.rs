//! Checkpoint prompts by tier

use parley_core::RiskTier;

/// The checkpoint question for a tier
///
/// Prompts ask the user to demonstrate understanding, not merely to click
/// through - the reply is scored for substance.
pub fn checkpoint_prompt(tier: RiskTier) -> &'static str {
    match tier {
        RiskTier::Default => {
            "Please acknowledge that you understand you are interacting with \
             an AI system with limitations."
        }
        RiskTier::Sensitive => {
            "This topic calls for care. Before we continue, please acknowledge \
             that I am an AI and cannot replace qualified professional advice. \
             In your own words, what are the limits of relying on an AI here?"
        }
        RiskTier::Research => {
            "This request is gated as research use. Please acknowledge the \
             limitations of AI-generated material in research, and provide a \
             written justification describing the purpose and oversight of \
             this work."
        }
        RiskTier::Forensic => {
            "This request falls under forensic handling and will be escalated \
             to a human reviewer regardless of your answer. Please describe, \
             in your own words, why this request requires that level of \
             accountability. If you are in immediate danger, contact emergency \
             services now."
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_tier_has_a_prompt() {
        for tier in RiskTier::all() {
            assert!(!checkpoint_prompt(*tier).is_empty());
        }
    }
}
