//! Secondary behavioral signals mined from request text
//!
//! Verification and correction behavior feed two of the four TRS
//! components. Detection is intentionally cheap: these nudge an EWMA,
//! they don't gate anything.

/// Vocabulary indicating the user is fact-checking
const VERIFICATION_TERMS: &[&str] = &[
    "source",
    "citation",
    "reference",
    "evidence",
    "proof",
    "documentation",
    "verify",
    "fact-check",
];

/// Vocabulary indicating the user is correcting model output
const CORRECTION_TERMS: &[&str] = &[
    "incorrect",
    "wrong",
    "error",
    "mistake",
    "actually",
    "correction",
    "clarify",
    "fix",
];

/// Does the message ask for sources or verification?
pub fn verification_intent(text: &str) -> bool {
    let lower = text.to_lowercase();
    VERIFICATION_TERMS.iter().any(|term| lower.contains(term))
}

/// Does the message push back on or correct a prior answer?
pub fn correction_intent(text: &str) -> bool {
    let lower = text.to_lowercase();
    CORRECTION_TERMS.iter().any(|term| lower.contains(term))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verification_intent() {
        assert!(verification_intent("Can you give me a source for that claim?"));
        assert!(verification_intent("I'd like to verify this independently"));
        assert!(!verification_intent("Tell me a story about dragons"));
    }

    #[test]
    fn test_correction_intent() {
        assert!(correction_intent("That's incorrect - the treaty was signed in 1648"));
        assert!(correction_intent("Actually, the second step comes first"));
        assert!(!correction_intent("What's the weather like on Mars?"));
    }
}
