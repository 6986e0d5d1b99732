//! Risk tiers
//!
//! Ordered classification of a request's sensitivity, driving how strict
//! consent gating is. Tiers only ever go up within a session.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Risk tier, ordered by increasing stringency
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskTier {
    /// Implicit consent; auto-granted
    Default,

    /// Explicit acknowledgment required
    Sensitive,

    /// Written justification required on top of acknowledgment
    Research,

    /// Mandatory escalation to a human accountability channel
    Forensic,
}

impl Default for RiskTier {
    fn default() -> Self {
        RiskTier::Default
    }
}

impl RiskTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskTier::Default => "default",
            RiskTier::Sensitive => "sensitive",
            RiskTier::Research => "research",
            RiskTier::Forensic => "forensic",
        }
    }

    /// Parse a tier name; `None` for anything outside the four known tiers
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "default" => Some(RiskTier::Default),
            "sensitive" => Some(RiskTier::Sensitive),
            "research" => Some(RiskTier::Research),
            "forensic" => Some(RiskTier::Forensic),
            _ => None,
        }
    }

    /// Does this tier require a consent checkpoint at all?
    pub fn gated(&self) -> bool {
        *self > RiskTier::Default
    }

    pub fn all() -> &'static [Self] {
        &[
            RiskTier::Default,
            RiskTier::Sensitive,
            RiskTier::Research,
            RiskTier::Forensic,
        ]
    }
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_ordering() {
        assert!(RiskTier::Default < RiskTier::Sensitive);
        assert!(RiskTier::Sensitive < RiskTier::Research);
        assert!(RiskTier::Research < RiskTier::Forensic);
    }

    #[test]
    fn test_name_round_trip() {
        for tier in RiskTier::all() {
            assert_eq!(RiskTier::from_str(tier.as_str()), Some(*tier));
        }
        assert_eq!(RiskTier::from_str("cosmic"), None);
    }

    #[test]
    fn test_gating() {
        assert!(!RiskTier::Default.gated());
        assert!(RiskTier::Sensitive.gated());
        assert!(RiskTier::Forensic.gated());
    }
}
