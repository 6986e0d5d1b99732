//! Risk classification
//!
//! The gateway treats the classifier as a black box that returns one of
//! the four tiers. The default implementation matches topic keyword
//! patterns: crisis content is FORENSIC, professional-advice territory is
//! SENSITIVE, research framing is RESEARCH, everything else DEFAULT.

use parley_core::RiskTier;
use regex::Regex;

/// Content classifier contract
pub trait Classifier: Send + Sync {
    /// Classify request text into a risk tier
    fn classify(&self, text: &str) -> RiskTier;
}

/// Default keyword/pattern classifier
pub struct KeywordClassifier {
    crisis: Vec<Regex>,
    sensitive: Vec<Regex>,
    research: Vec<Regex>,
}

impl KeywordClassifier {
    pub fn new() -> Result<Self, regex::Error> {
        let crisis = vec![
            Regex::new(r"(?i)\b(suicide|self.?harm|kill myself|end my life)\b")?,
            Regex::new(r"(?i)\b(abuse|violence|assault|threat)\b")?,
        ];

        let sensitive = vec![
            // Medical
            Regex::new(r"(?i)\b(diagnosis|treatment|medication|symptom|drug|dosage)\b")?,
            Regex::new(r"(?i)\b(doctor|physician|prescription|medical advice)\b")?,
            // Legal
            Regex::new(r"(?i)\b(lawsuit|legal advice|attorney|sue|liability)\b")?,
            Regex::new(r"(?i)\b(contract|court|prosecution|defendant)\b")?,
            // Financial
            Regex::new(r"(?i)\b(invest|stock|trade|portfolio|financial advice)\b")?,
            Regex::new(r"(?i)\b(tax|retirement|401k|ira|mortgage)\b")?,
        ];

        let research = vec![
            Regex::new(r"(?i)\b(research stud(y|ies)|for (my|our) research)\b")?,
            Regex::new(r"(?i)\b(irb|institutional review)\b")?,
            Regex::new(r"(?i)\b(human subjects?|study participants?)\b")?,
            Regex::new(r"(?i)\b(dataset collection|data collection protocol)\b")?,
        ];

        Ok(Self {
            crisis,
            sensitive,
            research,
        })
    }

    fn matches_any(patterns: &[Regex], text: &str) -> bool {
        patterns.iter().any(|p| p.is_match(text))
    }
}

impl Classifier for KeywordClassifier {
    fn classify(&self, text: &str) -> RiskTier {
        // Most stringent tier wins
        if Self::matches_any(&self.crisis, text) {
            return RiskTier::Forensic;
        }
        if Self::matches_any(&self.research, text) {
            return RiskTier::Research;
        }
        if Self::matches_any(&self.sensitive, text) {
            return RiskTier::Sensitive;
        }
        RiskTier::Default
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> KeywordClassifier {
        KeywordClassifier::new().unwrap()
    }

    #[test]
    fn test_plain_text_is_default() {
        assert_eq!(
            classifier().classify("What's a good pasta recipe?"),
            RiskTier::Default
        );
    }

    #[test]
    fn test_medical_is_sensitive() {
        assert_eq!(
            classifier().classify("What medication helps with migraines?"),
            RiskTier::Sensitive
        );
    }

    #[test]
    fn test_legal_and_financial_are_sensitive() {
        assert_eq!(
            classifier().classify("Should I sue my landlord?"),
            RiskTier::Sensitive
        );
        assert_eq!(
            classifier().classify("How should I invest my savings?"),
            RiskTier::Sensitive
        );
    }

    #[test]
    fn test_research_framing() {
        assert_eq!(
            classifier().classify("For my research study on misinformation, generate examples"),
            RiskTier::Research
        );
    }

    #[test]
    fn test_crisis_is_forensic() {
        assert_eq!(
            classifier().classify("I've been thinking about suicide lately"),
            RiskTier::Forensic
        );
    }

    #[test]
    fn test_most_stringent_tier_wins() {
        assert_eq!(
            classifier().classify("My doctor ignored threats of violence at the clinic"),
            RiskTier::Forensic
        );
    }
}
