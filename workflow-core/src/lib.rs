//! Candidate-Matching Workflow Core
//!
//! Deterministic building blocks for the iterative candidate-matching loop:
//! - Selection criteria and the refinement delta produced by the model
//! - Generated candidate profiles, their evaluation and ranking, and their
//!   per-iteration batches
//! - Human feedback, feedback analysis, and the refinement decider
//! - The workflow phase machine and copy-on-write state snapshots
//! - The workflow store adapter (in-memory, JSON files, RocksDB)
//!
//! Nothing in this crate talks to the generative model. The model-facing
//! side (generator, evaluator, analyzer, refiner, orchestrator) lives in
//! `matching-agents` and consumes these types.
//!
//! # Loop
//!
//! ```text
//! INITIAL ──generate──▶ EVALUATING ──feedback──▶ REFINING ──generate──▶ EVALUATING ...
//!                                                    │
//!                                                    └──declined / cap──▶ COMPLETE
//! ```

#![allow(clippy::uninlined_format_args)]

pub mod candidate;
pub mod criteria;
pub mod decider;
pub mod error;
pub mod feedback;
pub mod retry;
pub mod state;

pub use candidate::{
    apply_evaluations, rank_candidates, CandidateBatch, CandidateEvaluation, CandidateProfile,
    Experience, ScoringDetails,
};
pub use criteria::{
    Adjustment, AdjustmentDirection, CriteriaRefinement, CriteriaSummary, CulturalAttribute,
    EffectiveCriteria, ExperienceBounds, RefinedAttribute, RefinedCriteria, RefinedExperience,
    RefinedSkill, ScoringWeights, SelectionCriteria, SkillRequirement,
};
pub use decider::{DecisionReason, RefinementDecider, RefinementDecision};
pub use error::{FailureContext, ModelStage, WorkflowError, WorkflowResult};
pub use feedback::{
    validate_feedback_batch, CandidateFeedback, CriterionScore, FeedbackAnalysis, FeedbackImpact,
    FeedbackPatterns, FeedbackRecommendations, FeedbackRecord, FeedbackSummary,
};
pub use retry::RetryPolicy;
pub use state::{
    apply_feedback_outcome, begin_generation, candidates_for_iteration, finish_generation,
    is_final_iteration, FeedbackOutcome, FileWorkflowStore, IllegalTransition,
    InMemoryWorkflowStore, JobDescription, JobId, RefinementRecord, SharedWorkflowStore,
    StoreError, StoreResult, WorkflowPhase, WorkflowState, WorkflowStore, DEFAULT_MAX_ITERATIONS,
    FINAL_CANDIDATE_COUNT, ROUND_CANDIDATE_COUNT,
};

#[cfg(feature = "heavy-state")]
pub use state::RocksWorkflowStore;
