//! Escalation notifications
//!
//! Fire-and-forget from the gateway's perspective: the consent decision
//! stands whether or not the notification lands. Sinks must not panic and
//! must not block for long; delivery failure is logged and dropped.

use crate::consent::ReasonCode;
use chrono::{DateTime, Utc};
use parley_core::RiskTier;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use tracing::{error, warn};

/// What gets sent to the accountability channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Escalation {
    pub session_id: String,
    pub request_id: String,
    pub tier: RiskTier,
    pub reason: ReasonCode,
    pub timestamp: DateTime<Utc>,
}

/// Outbound notification contract
pub trait NotificationSink: Send + Sync {
    /// Deliver an escalation. Must not panic; failures are the sink's
    /// problem to log, never the gateway's to handle.
    fn notify(&self, escalation: &Escalation);
}

/// Sink that emits a structured log event
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn notify(&self, escalation: &Escalation) {
        warn!(
            session = %escalation.session_id,
            request = %escalation.request_id,
            tier = %escalation.tier,
            reason = %escalation.reason,
            "consent escalation"
        );
    }
}

/// Sink that appends escalations to a JSON-lines history file
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    /// Write escalations to the default history file
    pub fn new() -> Self {
        Self {
            path: parley_core::Paths::new().escalations(),
        }
    }

    /// Write escalations somewhere specific
    pub fn with_path(path: PathBuf) -> Self {
        Self { path }
    }

    fn append(&self, escalation: &Escalation) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let json = serde_json::to_string(escalation)?;
        writeln!(file, "{}", json)?;
        Ok(())
    }
}

impl Default for FileSink {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationSink for FileSink {
    fn notify(&self, escalation: &Escalation) {
        if let Err(e) = self.append(escalation) {
            error!(
                session = %escalation.session_id,
                "failed to write escalation notification: {}",
                e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_file_sink_appends_jsonl() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("escalations.jsonl");
        let sink = FileSink::with_path(path.clone());

        for i in 0..2 {
            sink.notify(&Escalation {
                session_id: format!("ses_{}", i),
                request_id: "req_1".into(),
                tier: RiskTier::Forensic,
                reason: ReasonCode::ForensicMandatory,
                timestamp: Utc::now(),
            });
        }

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: Escalation = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed.reason, ReasonCode::ForensicMandatory);
    }
}
