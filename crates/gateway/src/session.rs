//! Session state and lifecycle
//!
//! A session is one continuous user↔system interaction. Created on first
//! request, never deleted, only appended to. The tier ceiling is a
//! monotonic ratchet: a single setter accepts increases and rejects
//! (loudly) anything else. Per-session state is mutated only under the
//! session's own lock; sessions never share one.

use crate::consent::ConsentState;
use chrono::{DateTime, Utc};
use friction::FrictionChallenge;
use parley_core::RiskTier;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock};
use tracing::warn;

/// One user↔system interaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Unique session ID
    pub id: String,

    /// The user this session belongs to
    pub user_id: String,

    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,

    /// Highest tier any request in this session has classified at.
    /// Only `raise_ceiling` writes this.
    ceiling: RiskTier,

    /// Consent progress per tier
    consent: HashMap<RiskTier, ConsentState>,

    /// Challenges issued so far, per tier (drives repeat-friction decay)
    challenges_issued: HashMap<RiskTier, u32>,

    /// The challenge currently awaiting a reply, if any
    pub open_challenge: Option<FrictionChallenge>,
}

impl Session {
    /// Create a fresh session at the DEFAULT tier
    pub fn new(id: String, user_id: String, now: DateTime<Utc>) -> Self {
        Self {
            id,
            user_id,
            created_at: now,
            last_activity: now,
            ceiling: RiskTier::Default,
            consent: HashMap::new(),
            challenges_issued: HashMap::new(),
            open_challenge: None,
        }
    }

    /// The session's current tier ceiling
    pub fn ceiling(&self) -> RiskTier {
        self.ceiling
    }

    /// Raise the tier ceiling. The ratchet only turns one way: an
    /// attempted decrease is rejected and logged, never silently applied.
    pub fn raise_ceiling(&mut self, tier: RiskTier) -> bool {
        if tier < self.ceiling {
            warn!(
                session = %self.id,
                current = %self.ceiling,
                attempted = %tier,
                "rejected attempt to lower session tier ceiling"
            );
            return false;
        }
        self.ceiling = tier;
        true
    }

    /// Consent progress at a tier (`Unseen` until something happens)
    pub fn consent_state(&self, tier: RiskTier) -> ConsentState {
        self.consent.get(&tier).copied().unwrap_or_default()
    }

    pub fn set_consent(&mut self, tier: RiskTier, state: ConsentState) {
        self.consent.insert(tier, state);
    }

    /// Challenges issued at a tier so far
    pub fn challenges_at(&self, tier: RiskTier) -> u32 {
        self.challenges_issued.get(&tier).copied().unwrap_or(0)
    }

    /// Count a newly issued challenge at a tier
    pub fn note_challenge(&mut self, tier: RiskTier) {
        *self.challenges_issued.entry(tier).or_insert(0) += 1;
    }

    /// Record activity
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_activity = now;
    }
}

/// Generate a unique session ID
pub fn generate_session_id() -> String {
    format!("ses_{}", uuid::Uuid::new_v4().simple())
}

/// In-memory session registry with per-session locks
///
/// Concurrent requests for different sessions run fully in parallel;
/// requests for the same session serialize on that session's mutex. The
/// registry lock is held only long enough to find or insert the entry.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<Mutex<Session>>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Find a session, creating it on first contact
    pub fn get_or_create(
        &self,
        session_id: &str,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Arc<Mutex<Session>> {
        if let Some(session) = self.get(session_id) {
            return session;
        }

        let mut sessions = self.sessions.write().unwrap();
        // Re-check under the write lock: another request may have won
        Arc::clone(sessions.entry(session_id.to_string()).or_insert_with(|| {
            Arc::new(Mutex::new(Session::new(
                session_id.to_string(),
                user_id.to_string(),
                now,
            )))
        }))
    }

    pub fn get(&self, session_id: &str) -> Option<Arc<Mutex<Session>>> {
        self.sessions.read().unwrap().get(session_id).cloned()
    }

    /// Insert an existing session (e.g. one loaded from disk)
    pub fn adopt(&self, session: Session) -> Arc<Mutex<Session>> {
        let entry = Arc::new(Mutex::new(session.clone()));
        self.sessions
            .write()
            .unwrap()
            .insert(session.id.clone(), Arc::clone(&entry));
        entry
    }

    /// Remove a session from the registry (teardown)
    pub fn remove(&self, session_id: &str) -> Option<Arc<Mutex<Session>>> {
        self.sessions.write().unwrap().remove(session_id)
    }

    pub fn ids(&self) -> Vec<String> {
        self.sessions.read().unwrap().keys().cloned().collect()
    }
}

/// JSON-file persistence for sessions, used by the CLI
pub struct SessionFiles {
    dir: PathBuf,
}

impl SessionFiles {
    /// Store sessions at the default data path
    pub fn new() -> Self {
        Self {
            dir: parley_core::Paths::new().sessions(),
        }
    }

    /// Store sessions somewhere specific
    pub fn with_dir(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Load a session by ID
    pub fn load(&self, session_id: &str) -> anyhow::Result<Option<Session>> {
        let path = self.session_path(session_id);
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    /// Save a session
    pub fn save(&self, session: &Session) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.session_path(&session.id);
        let content = serde_json::to_string_pretty(session)?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// List all persisted sessions, most recently active first
    pub fn list(&self) -> anyhow::Result<Vec<Session>> {
        let mut sessions = Vec::new();
        if !self.dir.exists() {
            return Ok(sessions);
        }

        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().map_or(false, |e| e == "json") {
                if let Ok(content) = std::fs::read_to_string(&path) {
                    if let Ok(session) = serde_json::from_str::<Session>(&content) {
                        sessions.push(session);
                    }
                }
            }
        }

        sessions.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
        Ok(sessions)
    }

    fn session_path(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", session_id))
    }
}

impl Default for SessionFiles {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ceiling_ratchets_up_only() {
        let mut session = Session::new("s".into(), "u".into(), Utc::now());
        assert_eq!(session.ceiling(), RiskTier::Default);

        assert!(session.raise_ceiling(RiskTier::Research));
        assert_eq!(session.ceiling(), RiskTier::Research);

        // Decrease is rejected, ceiling unchanged
        assert!(!session.raise_ceiling(RiskTier::Sensitive));
        assert_eq!(session.ceiling(), RiskTier::Research);

        // Same tier is a legal no-op
        assert!(session.raise_ceiling(RiskTier::Research));
    }

    #[test]
    fn test_consent_defaults_to_unseen() {
        let mut session = Session::new("s".into(), "u".into(), Utc::now());
        assert_eq!(session.consent_state(RiskTier::Sensitive), ConsentState::Unseen);

        session.set_consent(RiskTier::Sensitive, ConsentState::Granted);
        assert_eq!(session.consent_state(RiskTier::Sensitive), ConsentState::Granted);
        assert_eq!(session.consent_state(RiskTier::Forensic), ConsentState::Unseen);
    }

    #[test]
    fn test_challenge_counting() {
        let mut session = Session::new("s".into(), "u".into(), Utc::now());
        assert_eq!(session.challenges_at(RiskTier::Sensitive), 0);

        session.note_challenge(RiskTier::Sensitive);
        session.note_challenge(RiskTier::Sensitive);
        assert_eq!(session.challenges_at(RiskTier::Sensitive), 2);
        assert_eq!(session.challenges_at(RiskTier::Research), 0);
    }

    #[test]
    fn test_registry_returns_same_session() {
        let registry = SessionRegistry::new();
        let a = registry.get_or_create("s1", "u", Utc::now());
        let b = registry.get_or_create("s1", "u", Utc::now());
        assert!(Arc::ptr_eq(&a, &b));

        let other = registry.get_or_create("s2", "u", Utc::now());
        assert!(!Arc::ptr_eq(&a, &other));
    }

    #[test]
    fn test_session_files_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let files = SessionFiles::with_dir(dir.path().to_path_buf());

        let mut session = Session::new("ses_test".into(), "u".into(), Utc::now());
        session.raise_ceiling(RiskTier::Sensitive);
        session.set_consent(RiskTier::Sensitive, ConsentState::Granted);
        files.save(&session).unwrap();

        let loaded = files.load("ses_test").unwrap().unwrap();
        assert_eq!(loaded.ceiling(), RiskTier::Sensitive);
        assert_eq!(loaded.consent_state(RiskTier::Sensitive), ConsentState::Granted);
        assert!(files.load("ses_missing").unwrap().is_none());

        assert_eq!(files.list().unwrap().len(), 1);
    }
}
