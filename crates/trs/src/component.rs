//! The four TRS measurement axes and their published weights

use serde::{Deserialize, Serialize};
use std::fmt;

/// A TRS sub-score
///
/// The weights are the externally published scoring methodology. They are
/// constants, not configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Component {
    /// Quality of checkpoint-prompt responses (40%)
    FrictionEngagement,
    /// User-initiated fact-checking behavior (30%)
    VerificationActions,
    /// Explicit consent acknowledgments (20%)
    AcknowledgedResponsibility,
    /// User corrections and clarifications of model output (10%)
    CorrectionClarification,
}

impl Component {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FrictionEngagement => "friction_engagement",
            Self::VerificationActions => "verification_actions",
            Self::AcknowledgedResponsibility => "acknowledged_responsibility",
            Self::CorrectionClarification => "correction_clarification",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "friction_engagement" => Some(Self::FrictionEngagement),
            "verification_actions" => Some(Self::VerificationActions),
            "acknowledged_responsibility" => Some(Self::AcknowledgedResponsibility),
            "correction_clarification" => Some(Self::CorrectionClarification),
            _ => None,
        }
    }

    /// Composite weight for this component
    pub fn weight(&self) -> f64 {
        match self {
            Self::FrictionEngagement => 0.40,
            Self::VerificationActions => 0.30,
            Self::AcknowledgedResponsibility => 0.20,
            Self::CorrectionClarification => 0.10,
        }
    }

    pub fn all() -> &'static [Self] {
        &[
            Self::FrictionEngagement,
            Self::VerificationActions,
            Self::AcknowledgedResponsibility,
            Self::CorrectionClarification,
        ]
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Running per-session aggregates, one slot per component
///
/// `None` means no observation yet; the composite treats it as 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentScores {
    pub friction_engagement: Option<f64>,
    pub verification_actions: Option<f64>,
    pub acknowledged_responsibility: Option<f64>,
    pub correction_clarification: Option<f64>,
}

impl ComponentScores {
    pub fn get(&self, component: Component) -> Option<f64> {
        match component {
            Component::FrictionEngagement => self.friction_engagement,
            Component::VerificationActions => self.verification_actions,
            Component::AcknowledgedResponsibility => self.acknowledged_responsibility,
            Component::CorrectionClarification => self.correction_clarification,
        }
    }

    pub fn set(&mut self, component: Component, value: f64) {
        let slot = match component {
            Component::FrictionEngagement => &mut self.friction_engagement,
            Component::VerificationActions => &mut self.verification_actions,
            Component::AcknowledgedResponsibility => &mut self.acknowledged_responsibility,
            Component::CorrectionClarification => &mut self.correction_clarification,
        };
        *slot = Some(value);
    }

    /// Aggregate value used by the composite: 0 until observed
    pub fn value_or_zero(&self, component: Component) -> f64 {
        self.get(component).unwrap_or(0.0)
    }

    /// Weighted composite, clamped to [0, 1]
    pub fn composite(&self) -> f64 {
        let raw: f64 = Component::all()
            .iter()
            .map(|c| self.value_or_zero(*c) * c.weight())
            .sum();
        raw.clamp(0.0, 1.0)
    }
}
