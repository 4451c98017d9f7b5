//! Workflow phase machine: legal transitions and pure step functions.
//!
//! Every step takes a snapshot by reference and returns a new one; the input
//! is never mutated. Persisting the result (and bumping `version`) is the
//! orchestrator's job, through `WorkflowStore::replace_state`.
//!
//! ```text
//! Initial  → Generating
//! Refining → Generating | Complete
//! Generating → Evaluating
//! Evaluating → Refining
//! ```

use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::types::{WorkflowPhase, WorkflowState};
use crate::criteria::CriteriaRefinement;
use crate::decider::DecisionReason;

/// Iterations after which the workflow produces its final batch.
pub const DEFAULT_MAX_ITERATIONS: u32 = 4;

/// Candidates requested in a regular round.
pub const ROUND_CANDIDATE_COUNT: usize = 5;

/// Candidates requested in the final round.
pub const FINAL_CANDIDATE_COUNT: usize = 10;

fn is_legal_transition(from: WorkflowPhase, to: WorkflowPhase) -> bool {
    use WorkflowPhase::*;

    matches!(
        (from, to),
        (Initial, Generating)
            | (Refining, Generating)
            | (Generating, Evaluating)
            | (Evaluating, Refining)
            | (Refining, Complete)
    )
}

/// Error returned when an illegal transition is attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IllegalTransition {
    pub from: WorkflowPhase,
    pub to: WorkflowPhase,
}

impl fmt::Display for IllegalTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Illegal phase transition: {} → {}", self.from, self.to)
    }
}

impl std::error::Error for IllegalTransition {}

/// Move `state` to `to`, producing a new snapshot.
fn advance(state: &WorkflowState, to: WorkflowPhase) -> Result<WorkflowState, IllegalTransition> {
    if !is_legal_transition(state.current_phase, to) {
        return Err(IllegalTransition {
            from: state.current_phase,
            to,
        });
    }

    tracing::debug!(
        job = %state.job_description_id,
        from = %state.current_phase,
        to = %to,
        iteration = state.iteration_count,
        "Phase transition"
    );

    let mut next = state.clone();
    next.current_phase = to;
    next.updated_at = Utc::now();
    Ok(next)
}

/// How a processed feedback batch ended.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedbackOutcome {
    /// The decider asked for refinement and the refiner produced criteria.
    Refined(CriteriaRefinement),
    /// The decider chose to terminate.
    Declined(DecisionReason),
    /// Refinement was requested but the model output was unusable.
    RefinementUnavailable(String),
}

impl FeedbackOutcome {
    pub fn terminates(&self) -> bool {
        !matches!(self, Self::Refined(_))
    }
}

/// `Initial | Refining → Generating`.
pub fn begin_generation(state: &WorkflowState) -> Result<WorkflowState, IllegalTransition> {
    advance(state, WorkflowPhase::Generating)
}

/// `Generating → Evaluating`.
pub fn finish_generation(state: &WorkflowState) -> Result<WorkflowState, IllegalTransition> {
    advance(state, WorkflowPhase::Evaluating)
}

/// `Evaluating → Refining`, then either stay there with the new criteria or
/// continue to `Complete`. Increments `iteration_count` exactly once.
///
/// A `Generating` snapshot is first moved to `Evaluating`, so feedback on a
/// round whose phase write was lost still applies.
pub fn apply_feedback_outcome(
    state: &WorkflowState,
    outcome: FeedbackOutcome,
) -> Result<WorkflowState, IllegalTransition> {
    let evaluating = if state.current_phase == WorkflowPhase::Generating {
        finish_generation(state)?
    } else {
        state.clone()
    };

    let mut next = advance(&evaluating, WorkflowPhase::Refining)?;
    next.iteration_count += 1;

    match outcome {
        FeedbackOutcome::Refined(refinement) => {
            next.refined_criteria = Some(refinement);
            next.should_terminate = false;
            Ok(next)
        }
        FeedbackOutcome::Declined(_) | FeedbackOutcome::RefinementUnavailable(_) => {
            let mut done = advance(&next, WorkflowPhase::Complete)?;
            done.should_terminate = true;
            Ok(done)
        }
    }
}

/// Batch size for a round generated at `iteration_count`.
pub fn candidates_for_iteration(iteration_count: u32, max_iterations: u32) -> usize {
    if is_final_iteration(iteration_count, max_iterations) {
        FINAL_CANDIDATE_COUNT
    } else {
        ROUND_CANDIDATE_COUNT
    }
}

pub fn is_final_iteration(iteration_count: u32, max_iterations: u32) -> bool {
    iteration_count >= max_iterations
}
