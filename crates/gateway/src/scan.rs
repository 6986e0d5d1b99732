//! Payload scanning: PII redaction and prompt-injection detection
//!
//! The scanner runs before payload digests are computed, so raw PII never
//! reaches the ledger. It is a pure function behind a trait: swap in an
//! external scanning service without touching the gateway.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// What a scan turned up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    Email,
    Phone,
    Ssn,
    CreditCard,
    IpAddress,
    PromptInjection,
}

impl FindingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Phone => "phone",
            Self::Ssn => "ssn",
            Self::CreditCard => "credit_card",
            Self::IpAddress => "ip_address",
            Self::PromptInjection => "prompt_injection",
        }
    }

    /// Placeholder substituted for redacted matches
    fn placeholder(&self) -> String {
        format!("[{}_REDACTED]", self.as_str().to_uppercase())
    }
}

impl fmt::Display for FindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One kind of match found in the text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub kind: FindingKind,
    pub occurrences: usize,
}

/// Scan result: the redacted text plus everything found
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanReport {
    pub redacted: String,
    pub findings: Vec<Finding>,
}

impl ScanReport {
    /// Did the scan find a prompt-injection attempt?
    pub fn injection_detected(&self) -> bool {
        self.findings
            .iter()
            .any(|f| f.kind == FindingKind::PromptInjection)
    }

    /// Total PII matches redacted
    pub fn redaction_count(&self) -> usize {
        self.findings
            .iter()
            .filter(|f| f.kind != FindingKind::PromptInjection)
            .map(|f| f.occurrences)
            .sum()
    }
}

/// Redaction/injection scanner contract
pub trait Scanner: Send + Sync {
    fn scan(&self, text: &str) -> ScanReport;
}

/// Default regex-based scanner
pub struct RegexScanner {
    pii: Vec<(FindingKind, Regex)>,
    injection: Vec<Regex>,
}

impl RegexScanner {
    pub fn new() -> Result<Self, regex::Error> {
        let pii = vec![
            (
                FindingKind::Email,
                Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b")?,
            ),
            (
                FindingKind::Ssn,
                Regex::new(r"\b\d{3}-\d{2}-\d{4}\b")?,
            ),
            (
                FindingKind::CreditCard,
                Regex::new(r"\b\d{4}[-\s]?\d{4}[-\s]?\d{4}[-\s]?\d{4}\b")?,
            ),
            (
                FindingKind::IpAddress,
                Regex::new(r"\b\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}\b")?,
            ),
            (
                FindingKind::Phone,
                Regex::new(r"\b\d{3}[-.\s]\d{3}[-.\s]\d{4}\b")?,
            ),
        ];

        let injection = vec![
            Regex::new(r"(?i)ignore (previous|all|above) instructions")?,
            Regex::new(r"(?i)disregard (your|the) (rules|guidelines|instructions)")?,
            Regex::new(r"(?i)\byou are now\b")?,
            Regex::new(r"(?i)\bnew persona\b")?,
            Regex::new(r"(?i)\bjailbreak\b")?,
            Regex::new(r"(?i)\bDAN mode\b")?,
        ];

        Ok(Self { pii, injection })
    }
}

impl Scanner for RegexScanner {
    fn scan(&self, text: &str) -> ScanReport {
        let mut redacted = text.to_string();
        let mut findings = Vec::new();

        // PII kinds are checked in order; SSN and credit card run before
        // phone so the narrower patterns claim their matches first
        for (kind, pattern) in &self.pii {
            let occurrences = pattern.find_iter(&redacted).count();
            if occurrences > 0 {
                redacted = pattern
                    .replace_all(&redacted, kind.placeholder().as_str())
                    .into_owned();
                findings.push(Finding {
                    kind: *kind,
                    occurrences,
                });
            }
        }

        let injections = self
            .injection
            .iter()
            .filter(|pattern| pattern.is_match(text))
            .count();
        if injections > 0 {
            findings.push(Finding {
                kind: FindingKind::PromptInjection,
                occurrences: injections,
            });
        }

        ScanReport { redacted, findings }
    }
}
