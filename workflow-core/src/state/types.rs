//! Core types for workflow state persistence
//!
//! These types are what the store adapters hold: the job record, the
//! per-job workflow snapshot, and the refinement history entries.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::criteria::{CriteriaRefinement, EffectiveCriteria, SelectionCriteria};

/// Unique identifier for job descriptions (and therefore workflows).
pub type JobId = String;

/// Phase of a workflow.
///
/// Every workflow starts at `Initial` and ends at `Complete`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowPhase {
    /// Created, nothing generated yet.
    Initial,
    /// A generation round is in flight.
    Generating,
    /// A batch is out for human review.
    Evaluating,
    /// Feedback processed, criteria refined, ready for the next round.
    Refining,
    /// Terminal.
    Complete,
}

impl WorkflowPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete)
    }
}

impl fmt::Display for WorkflowPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initial => write!(f, "INITIAL"),
            Self::Generating => write!(f, "GENERATING"),
            Self::Evaluating => write!(f, "EVALUATING"),
            Self::Refining => write!(f, "REFINING"),
            Self::Complete => write!(f, "COMPLETE"),
        }
    }
}

/// The read-only job record a workflow is keyed by.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDescription {
    pub id: JobId,
    pub title: String,
    pub body: String,
}

impl JobDescription {
    pub fn new(id: impl Into<String>, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            body: body.into(),
        }
    }
}

/// Snapshot of one workflow.
///
/// Snapshots are values: every transition produces a new snapshot and the
/// store swaps it in atomically against `version`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowState {
    pub job_description_id: JobId,

    /// Number of processed feedback batches. Starts at 0.
    pub iteration_count: u32,

    pub current_phase: WorkflowPhase,

    /// Baseline criteria. Never mutated after initialization.
    pub scoring_criteria: SelectionCriteria,

    /// Latest refinement; replaces any earlier one wholesale.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refined_criteria: Option<CriteriaRefinement>,

    pub should_terminate: bool,

    /// Compare-and-swap token, bumped once per persisted snapshot.
    pub version: u64,

    pub updated_at: DateTime<Utc>,
}

impl WorkflowState {
    /// Fresh snapshot for a newly initialized workflow.
    pub fn new(job_description_id: impl Into<String>, scoring_criteria: SelectionCriteria) -> Self {
        Self {
            job_description_id: job_description_id.into(),
            iteration_count: 0,
            current_phase: WorkflowPhase::Initial,
            scoring_criteria,
            refined_criteria: None,
            should_terminate: false,
            version: 1,
            updated_at: Utc::now(),
        }
    }

    /// Refined criteria if present, baseline otherwise.
    pub fn effective_criteria(&self) -> EffectiveCriteria<'_> {
        match &self.refined_criteria {
            Some(refined) => EffectiveCriteria::Refined(refined),
            None => EffectiveCriteria::Baseline(&self.scoring_criteria),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.current_phase.is_terminal()
    }

    pub fn check_invariants(&self) -> Result<(), String> {
        if self.is_complete() != self.should_terminate {
            return Err(format!(
                "phase {} inconsistent with should_terminate={}",
                self.current_phase, self.should_terminate
            ));
        }
        if self.version == 0 {
            return Err("snapshot version must be at least 1".to_string());
        }
        Ok(())
    }
}

/// One entry of the append-only refinement history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefinementRecord {
    pub job_description_id: JobId,
    /// Iteration of the batch whose feedback produced this refinement.
    pub iteration: u32,
    pub refinement: CriteriaRefinement,
    pub recorded_at: DateTime<Utc>,
}

impl RefinementRecord {
    pub fn new(
        job_description_id: impl Into<String>,
        iteration: u32,
        refinement: CriteriaRefinement,
    ) -> Self {
        Self {
            job_description_id: job_description_id.into(),
            iteration,
            refinement,
            recorded_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::tests::react_refinement;

    #[test]
    fn test_phase_wire_and_display() {
        assert_eq!(
            serde_json::to_string(&WorkflowPhase::Evaluating).unwrap(),
            "\"EVALUATING\""
        );
        let phase: WorkflowPhase = serde_json::from_str("\"REFINING\"").unwrap();
        assert_eq!(phase, WorkflowPhase::Refining);
        assert_eq!(WorkflowPhase::Complete.to_string(), "COMPLETE");
        assert!(WorkflowPhase::Complete.is_terminal());
        assert!(!WorkflowPhase::Refining.is_terminal());
    }

    #[test]
    fn test_new_state() {
        let state = WorkflowState::new("job-1", SelectionCriteria::new().require_skill("React", 4));
        assert_eq!(state.iteration_count, 0);
        assert_eq!(state.current_phase, WorkflowPhase::Initial);
        assert_eq!(state.version, 1);
        assert!(!state.effective_criteria().is_refined());
        assert!(state.check_invariants().is_ok());
    }

    #[test]
    fn test_effective_criteria_prefers_refinement() {
        let mut state = WorkflowState::new("job-1", SelectionCriteria::new());
        state.refined_criteria = Some(react_refinement());
        assert!(state.effective_criteria().is_refined());
    }

    #[test]
    fn test_invariants_catch_inconsistent_termination() {
        let mut state = WorkflowState::new("job-1", SelectionCriteria::new());
        state.should_terminate = true;
        assert!(state.check_invariants().is_err());
        state.current_phase = WorkflowPhase::Complete;
        assert!(state.check_invariants().is_ok());
        state.version = 0;
        assert!(state.check_invariants().is_err());
    }

    #[test]
    fn test_state_wire_shape() {
        let state = WorkflowState::new("job-1", SelectionCriteria::new());
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["jobDescriptionId"], "job-1");
        assert_eq!(json["currentPhase"], "INITIAL");
        assert_eq!(json["iterationCount"], 0);
        assert!(json.get("refinedCriteria").is_none());
    }
}
