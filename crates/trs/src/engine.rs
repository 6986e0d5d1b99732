//! The scoring engine
//!
//! Component updates are EWMA-smoothed per session; snapshots freeze the
//! aggregates and mirror them into the audit ledger.

use crate::component::{Component, ComponentScores};
use crate::snapshot::TrsSnapshot;
use crate::SNAPSHOT_KIND;
use ledger::{payload, Ledger, LedgerError};
use parley_core::Clock;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tracing::debug;

/// Default EWMA smoothing factor
pub const DEFAULT_SMOOTHING: f64 = 0.3;

/// Errors from the TRS engine
#[derive(Debug, Error)]
pub enum TrsError {
    /// Unrecognized component name from a collaborator. Integration error,
    /// never silently defaulted.
    #[error("unknown TRS component: {0}")]
    InvalidComponent(String),

    #[error("component value {value} is outside [0, 1]")]
    OutOfRange { value: f64 },

    #[error("smoothing factor {0} is outside (0, 1]")]
    InvalidSmoothing(f64),

    #[error("snapshot could not be appended to the ledger")]
    Ledger(#[from] LedgerError),

    #[error("snapshot encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Trust Resilience Score engine
pub struct TrsEngine {
    ledger: Arc<Ledger>,
    clock: Arc<dyn Clock>,
    smoothing: f64,
    sessions: RwLock<HashMap<String, ComponentScores>>,
}

impl TrsEngine {
    /// Create an engine with the default smoothing factor
    pub fn new(ledger: Arc<Ledger>, clock: Arc<dyn Clock>) -> Self {
        Self {
            ledger,
            clock,
            smoothing: DEFAULT_SMOOTHING,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Create an engine with an explicit smoothing factor in (0, 1]
    pub fn with_smoothing(
        ledger: Arc<Ledger>,
        clock: Arc<dyn Clock>,
        smoothing: f64,
    ) -> Result<Self, TrsError> {
        if !(smoothing > 0.0 && smoothing <= 1.0) {
            return Err(TrsError::InvalidSmoothing(smoothing));
        }
        Ok(Self {
            smoothing,
            ..Self::new(ledger, clock)
        })
    }

    /// Fold one observation into a session's aggregate for a component
    ///
    /// First observation seeds the aggregate; later ones are blended as
    /// `new = old·(1-α) + value·α` so recent behavior dominates without
    /// single-event noise.
    pub fn record_component(
        &self,
        session_id: &str,
        component: Component,
        value: f64,
    ) -> Result<(), TrsError> {
        if !value.is_finite() || !(0.0..=1.0).contains(&value) {
            return Err(TrsError::OutOfRange { value });
        }

        let mut sessions = self.sessions.write().unwrap();
        let scores = sessions.entry(session_id.to_string()).or_default();
        let updated = match scores.get(component) {
            None => value,
            Some(prev) => prev * (1.0 - self.smoothing) + value * self.smoothing,
        };
        scores.set(component, updated);

        debug!(
            session = session_id,
            component = component.as_str(),
            value,
            aggregate = updated,
            "recorded TRS component"
        );
        Ok(())
    }

    /// String-named entry point for out-of-process collaborators
    pub fn record_component_named(
        &self,
        session_id: &str,
        name: &str,
        value: f64,
    ) -> Result<(), TrsError> {
        let component =
            Component::from_str(name).ok_or_else(|| TrsError::InvalidComponent(name.to_string()))?;
        self.record_component(session_id, component, value)
    }

    /// Current aggregates for a session (all-`None` if never observed)
    pub fn components(&self, session_id: &str) -> ComponentScores {
        self.sessions
            .read()
            .unwrap()
            .get(session_id)
            .copied()
            .unwrap_or_default()
    }

    /// Freeze the composite and mirror it into the audit ledger
    ///
    /// A session with zero observations snapshots to composite 0.0 -
    /// that is a valid score, not an error.
    pub fn snapshot(&self, session_id: &str) -> Result<TrsSnapshot, TrsError> {
        let scores = self.components(session_id);
        let snapshot = TrsSnapshot::from_scores(session_id, &scores, self.clock.now());

        let bytes = payload::encode(SNAPSHOT_KIND, &snapshot)?;
        self.ledger.append(&bytes)?;

        debug!(
            session = session_id,
            composite = snapshot.composite,
            "TRS snapshot appended to ledger"
        );
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger::MemoryStore;
    use parley_core::ManualClock;

    fn engine() -> (TrsEngine, Arc<Ledger>) {
        let ledger = Arc::new(Ledger::new(Arc::new(MemoryStore::new())));
        let clock = Arc::new(ManualClock::new());
        (TrsEngine::new(Arc::clone(&ledger), clock), ledger)
    }

    #[test]
    fn test_first_observation_seeds_aggregate() {
        let (engine, _) = engine();
        engine
            .record_component("s1", Component::FrictionEngagement, 0.9)
            .unwrap();

        let scores = engine.components("s1");
        assert_eq!(scores.friction_engagement, Some(0.9));
    }

    #[test]
    fn test_ewma_blends_later_observations() {
        let (engine, _) = engine();
        engine
            .record_component("s1", Component::FrictionEngagement, 1.0)
            .unwrap();
        engine
            .record_component("s1", Component::FrictionEngagement, 0.0)
            .unwrap();

        // 1.0·0.7 + 0.0·0.3
        let aggregate = engine.components("s1").friction_engagement.unwrap();
        assert!((aggregate - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_out_of_range_rejected() {
        let (engine, _) = engine();
        for bad in [-0.1, 1.1, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                engine.record_component("s1", Component::VerificationActions, bad),
                Err(TrsError::OutOfRange { .. })
            ));
        }
        // A rejected update must not touch the aggregates
        assert_eq!(engine.components("s1"), ComponentScores::default());
    }

    #[test]
    fn test_invalid_component_name_rejected() {
        let (engine, _) = engine();
        assert!(matches!(
            engine.record_component_named("s1", "charisma", 0.5),
            Err(TrsError::InvalidComponent(_))
        ));
        engine
            .record_component_named("s1", "verification_actions", 0.5)
            .unwrap();
    }

    #[test]
    fn test_snapshot_of_unobserved_session_is_zero() {
        let (engine, ledger) = engine();
        let snapshot = engine.snapshot("ghost").unwrap();
        assert_eq!(snapshot.composite, 0.0);
        assert_eq!(ledger.len().unwrap(), 1);
    }

    #[test]
    fn test_perfect_components_give_composite_one() {
        let (engine, _) = engine();
        for component in Component::all() {
            engine.record_component("s1", *component, 1.0).unwrap();
        }
        let snapshot = engine.snapshot("s1").unwrap();
        assert!((snapshot.composite - 1.0).abs() < 1e-9);

        for component in Component::all() {
            engine.record_component("s2", *component, 0.0).unwrap();
        }
        assert_eq!(engine.snapshot("s2").unwrap().composite, 0.0);
    }

    #[test]
    fn test_composite_stays_in_bounds() {
        let (engine, _) = engine();
        let values = [0.0, 0.3, 0.7, 1.0, 0.1, 0.9];
        for (i, value) in values.iter().enumerate() {
            let component = Component::all()[i % 4];
            engine.record_component("s1", component, *value).unwrap();
            let composite = engine.snapshot("s1").unwrap().composite;
            assert!((0.0..=1.0).contains(&composite));
        }
    }

    #[test]
    fn test_snapshot_round_trips_through_ledger() {
        let (engine, ledger) = engine();
        engine
            .record_component("s1", Component::AcknowledgedResponsibility, 1.0)
            .unwrap();
        let snapshot = engine.snapshot("s1").unwrap();

        let record = ledger.read(0).unwrap();
        assert_eq!(
            payload::kind(&record.payload).as_deref(),
            Some(SNAPSHOT_KIND)
        );
        let stored: TrsSnapshot = payload::decode(&record.payload).unwrap();
        assert_eq!(stored, snapshot);
    }

    #[test]
    fn test_sessions_are_independent() {
        let (engine, _) = engine();
        engine
            .record_component("a", Component::FrictionEngagement, 1.0)
            .unwrap();

        assert_eq!(engine.components("b"), ComponentScores::default());
        assert_eq!(engine.components("a").friction_engagement, Some(1.0));
    }

    #[test]
    fn test_invalid_smoothing_rejected() {
        let ledger = Arc::new(Ledger::new(Arc::new(MemoryStore::new())));
        let clock = Arc::new(ManualClock::new());
        assert!(matches!(
            TrsEngine::with_smoothing(ledger, clock, 0.0),
            Err(TrsError::InvalidSmoothing(_))
        ));
    }
}
