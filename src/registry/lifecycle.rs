use std::collections::HashMap;

use chrono::Utc;

use crate::error::RegistryError;
use crate::formulary::{Measurements, Score};
use crate::gate::GateDecision;
use crate::registry::artifact::{Artifact, LifecycleState};

/// Manages artifact lifecycle state transitions.
///
/// Enforces valid state transitions and the requirements for moving
/// artifacts between trust levels.
pub struct LifecycleManager {
    valid_transitions: HashMap<LifecycleState, Vec<LifecycleState>>,
}

impl LifecycleManager {
    /// Create a new lifecycle manager with standard transition rules.
    ///
    /// Valid transitions:
    /// - Experimental -> Benchmarking (scoring begins)
    /// - Benchmarking -> Staging (measurements recorded)
    /// - Staging -> Production (gate passed)
    /// - Staging -> Deprecated (gate failed)
    /// - Production -> Archived, Deprecated -> Archived (retention)
    pub fn new() -> Self {
        let mut valid_transitions = HashMap::new();

        valid_transitions.insert(
            LifecycleState::Experimental,
            vec![LifecycleState::Benchmarking],
        );

        valid_transitions.insert(LifecycleState::Benchmarking, vec![LifecycleState::Staging]);

        valid_transitions.insert(
            LifecycleState::Staging,
            vec![LifecycleState::Production, LifecycleState::Deprecated],
        );

        valid_transitions.insert(LifecycleState::Production, vec![LifecycleState::Archived]);

        valid_transitions.insert(LifecycleState::Deprecated, vec![LifecycleState::Archived]);

        valid_transitions.insert(LifecycleState::Archived, vec![]);

        Self { valid_transitions }
    }

    /// Check if a transition between two states is allowed.
    pub fn can_transition(&self, from: LifecycleState, to: LifecycleState) -> bool {
        self.valid_transitions
            .get(&from)
            .map(|targets| targets.contains(&to))
            .unwrap_or(false)
    }

    /// `Experimental -> Benchmarking`.
    pub fn begin_benchmarking(&self, artifact: &mut Artifact) -> Result<(), RegistryError> {
        self.transition(artifact, LifecycleState::Benchmarking, "scoring started")
    }

    /// Records measurements and moves `Benchmarking -> Staging`.
    pub fn record_measurements(
        &self,
        artifact: &mut Artifact,
        measurements: Measurements,
    ) -> Result<(), RegistryError> {
        if artifact.state != LifecycleState::Benchmarking {
            return Err(RegistryError::RequirementsNotMet(format!(
                "measurements can only be recorded while benchmarking (artifact is {})",
                artifact.state
            )));
        }
        if let Some((dimension, value)) = measurements.iter().find(|(_, v)| !v.is_finite()) {
            return Err(RegistryError::RequirementsNotMet(format!(
                "measurement '{}' is not finite: {}",
                dimension, value
            )));
        }

        artifact.measurements = Some(measurements);
        self.transition(artifact, LifecycleState::Staging, "measurements recorded")
    }

    /// Applies a gate decision and moves `Staging -> Production | Deprecated`.
    ///
    /// Returns the state the artifact ended in.
    pub fn apply_gate(
        &self,
        artifact: &mut Artifact,
        decision: GateDecision,
    ) -> Result<LifecycleState, RegistryError> {
        if artifact.state != LifecycleState::Staging {
            return Err(RegistryError::RequirementsNotMet(format!(
                "gate can only be applied in staging (artifact is {})",
                artifact.state
            )));
        }

        let target = if decision.passed {
            LifecycleState::Production
        } else {
            LifecycleState::Deprecated
        };
        let reason = format!(
            "{} {} {} {}",
            decision.score,
            if decision.passed { ">=" } else { "<" },
            decision.threshold_name,
            decision.threshold
        );

        artifact.decision_score = Some(decision.score);
        artifact.gate = Some(decision);
        self.transition(artifact, target, &reason)?;
        Ok(target)
    }

    /// Moves a `Production` or `Deprecated` artifact to `Archived`.
    pub fn archive(&self, artifact: &mut Artifact, reason: &str) -> Result<(), RegistryError> {
        self.transition(artifact, LifecycleState::Archived, reason)
    }

    /// Attempt to transition an artifact to a new state.
    ///
    /// # Errors
    /// Returns an error if:
    /// - The transition is not allowed
    /// - Requirements for the target state are not met
    pub fn transition(
        &self,
        artifact: &mut Artifact,
        new_state: LifecycleState,
        reason: &str,
    ) -> Result<(), RegistryError> {
        let current_state = artifact.state;

        if !self.can_transition(current_state, new_state) {
            return Err(RegistryError::InvalidTransition {
                from: current_state.to_string(),
                to: new_state.to_string(),
                reason: format!(
                    "Transition from {} to {} is not allowed. Reason: {}",
                    current_state, new_state, reason
                ),
            });
        }

        match new_state {
            LifecycleState::Staging => self.check_staging_requirements(artifact)?,
            LifecycleState::Production => self.check_production_requirements(artifact)?,
            LifecycleState::Deprecated => self.check_deprecation_requirements(artifact)?,
            LifecycleState::Experimental
            | LifecycleState::Benchmarking
            | LifecycleState::Archived => {}
        }

        artifact.state = new_state;
        artifact.updated_at = Utc::now();

        tracing::info!(
            artifact_id = %artifact.id,
            job_id = %artifact.job_id,
            from = %current_state,
            to = %new_state,
            reason,
            "Artifact transition"
        );

        Ok(())
    }

    fn check_staging_requirements(&self, artifact: &Artifact) -> Result<(), RegistryError> {
        if artifact.measurements.is_none() {
            return Err(RegistryError::RequirementsNotMet(
                "Artifact must have recorded measurements before staging".to_string(),
            ));
        }
        Ok(())
    }

    fn check_production_requirements(&self, artifact: &Artifact) -> Result<(), RegistryError> {
        self.check_staging_requirements(artifact)?;

        let gate = self.gate_matching_score(artifact)?;
        if !gate.passed {
            return Err(RegistryError::RequirementsNotMet(format!(
                "Decision score {} does not satisfy {} >= {}",
                gate.score, gate.threshold_name, gate.threshold
            )));
        }
        Ok(())
    }

    fn check_deprecation_requirements(&self, artifact: &Artifact) -> Result<(), RegistryError> {
        let gate = self.gate_matching_score(artifact)?;
        if gate.passed {
            return Err(RegistryError::RequirementsNotMet(
                "Artifact passed the gate and cannot be deprecated from staging".to_string(),
            ));
        }
        Ok(())
    }

    fn gate_matching_score<'a>(
        &self,
        artifact: &'a Artifact,
    ) -> Result<&'a GateDecision, RegistryError> {
        let score: Score = artifact.decision_score.ok_or_else(|| {
            RegistryError::RequirementsNotMet("Artifact has no decision score".to_string())
        })?;
        let gate = artifact.gate.as_ref().ok_or_else(|| {
            RegistryError::RequirementsNotMet("Artifact has not been gated".to_string())
        })?;
        if gate.score != score {
            return Err(RegistryError::RequirementsNotMet(
                "Gate decision was made for a different score".to_string(),
            ));
        }
        Ok(gate)
    }
}

impl Default for LifecycleManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::{PolicyGate, MIN_ROI};
    use crate::manifest::PolicyBlock;
    use uuid::Uuid;

    fn create_test_artifact() -> Artifact {
        Artifact::new(Uuid::new_v4(), "artifacts/test/adapter_model.safetensors", "base")
    }

    fn measurements() -> Measurements {
        [("accuracy".to_string(), 0.95), ("tps".to_string(), 50.5)]
            .into_iter()
            .collect()
    }

    fn decision(score: f64, threshold: f64) -> GateDecision {
        PolicyGate::min_roi(0.0).evaluate(
            Score::Finite(score),
            &PolicyBlock::new().with_threshold(MIN_ROI, threshold),
        )
    }

    fn staged() -> (LifecycleManager, Artifact) {
        let manager = LifecycleManager::new();
        let mut artifact = create_test_artifact();
        manager.begin_benchmarking(&mut artifact).unwrap();
        manager.record_measurements(&mut artifact, measurements()).unwrap();
        (manager, artifact)
    }

    #[test]
    fn test_valid_transitions() {
        let manager = LifecycleManager::new();

        assert!(manager.can_transition(LifecycleState::Experimental, LifecycleState::Benchmarking));
        assert!(manager.can_transition(LifecycleState::Benchmarking, LifecycleState::Staging));
        assert!(manager.can_transition(LifecycleState::Staging, LifecycleState::Production));
        assert!(manager.can_transition(LifecycleState::Staging, LifecycleState::Deprecated));
        assert!(manager.can_transition(LifecycleState::Production, LifecycleState::Archived));
        assert!(manager.can_transition(LifecycleState::Deprecated, LifecycleState::Archived));
    }

    #[test]
    fn test_invalid_transitions() {
        let manager = LifecycleManager::new();

        assert!(!manager.can_transition(LifecycleState::Experimental, LifecycleState::Production));
        assert!(!manager.can_transition(LifecycleState::Experimental, LifecycleState::Staging));
        assert!(!manager.can_transition(LifecycleState::Benchmarking, LifecycleState::Production));
        assert!(!manager.can_transition(LifecycleState::Deprecated, LifecycleState::Production));
        assert!(!manager.can_transition(LifecycleState::Archived, LifecycleState::Production));
    }

    #[test]
    fn test_promotion_path() {
        let (manager, mut artifact) = staged();
        assert_eq!(artifact.state(), LifecycleState::Staging);

        let state = manager.apply_gate(&mut artifact, decision(0.4227, 0.1)).unwrap();
        assert_eq!(state, LifecycleState::Production);
        assert_eq!(artifact.decision_score(), Some(Score::Finite(0.4227)));
        assert!(artifact.gate().unwrap().passed);
    }

    #[test]
    fn test_demotion_path() {
        let (manager, mut artifact) = staged();
        let state = manager.apply_gate(&mut artifact, decision(0.4227, 0.95)).unwrap();
        assert_eq!(state, LifecycleState::Deprecated);
    }

    #[test]
    fn test_staging_requires_measurements() {
        let manager = LifecycleManager::new();
        let mut artifact = create_test_artifact();
        manager.begin_benchmarking(&mut artifact).unwrap();

        let result = manager.transition(&mut artifact, LifecycleState::Staging, "shortcut");
        assert!(matches!(result, Err(RegistryError::RequirementsNotMet(_))));
        assert_eq!(artifact.state(), LifecycleState::Benchmarking);
    }

    #[test]
    fn test_measurements_only_while_benchmarking() {
        let manager = LifecycleManager::new();
        let mut artifact = create_test_artifact();
        assert!(manager.record_measurements(&mut artifact, measurements()).is_err());
        assert!(artifact.measurements().is_none());
    }

    #[test]
    fn test_non_finite_measurement_rejected() {
        let manager = LifecycleManager::new();
        let mut artifact = create_test_artifact();
        manager.begin_benchmarking(&mut artifact).unwrap();

        let mut bad = measurements();
        bad.insert("latency".to_string(), f64::NAN);
        assert!(manager.record_measurements(&mut artifact, bad).is_err());
        assert_eq!(artifact.state(), LifecycleState::Benchmarking);
    }

    #[test]
    fn test_production_requires_passed_gate() {
        let (manager, mut artifact) = staged();

        let result = manager.transition(&mut artifact, LifecycleState::Production, "no gate");
        assert!(matches!(result, Err(RegistryError::RequirementsNotMet(_))));

        artifact.decision_score = Some(Score::Finite(0.1));
        artifact.gate = Some(decision(0.1, 0.5));
        let result = manager.transition(&mut artifact, LifecycleState::Production, "failed gate");
        assert!(result.is_err());
        assert_eq!(artifact.state(), LifecycleState::Staging);
    }

    #[test]
    fn test_gate_must_match_recorded_score() {
        let (manager, mut artifact) = staged();
        artifact.decision_score = Some(Score::Finite(0.01));
        artifact.gate = Some(decision(0.9, 0.5));

        let result = manager.transition(&mut artifact, LifecycleState::Production, "stale gate");
        assert!(result.is_err());
    }

    #[test]
    fn test_gate_outside_staging_rejected() {
        let manager = LifecycleManager::new();
        let mut artifact = create_test_artifact();
        assert!(manager.apply_gate(&mut artifact, decision(1.0, 0.0)).is_err());
        assert!(artifact.decision_score().is_none());
    }

    #[test]
    fn test_archive_after_terminal_gate() {
        let (manager, mut artifact) = staged();
        assert!(manager.archive(&mut artifact, "retention").is_err());

        manager.apply_gate(&mut artifact, decision(0.2, 0.95)).unwrap();
        manager.archive(&mut artifact, "retention").unwrap();
        assert_eq!(artifact.state(), LifecycleState::Archived);
        assert!(manager.archive(&mut artifact, "again").is_err());
    }
}
