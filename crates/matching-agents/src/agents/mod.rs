//! Model-backed stages of the matching loop.
//!
//! Each stage makes exactly one completion call per invocation and parses
//! the answer fail-closed through [`crate::schema`]. None of them retries;
//! transient failures are retried beneath them by `ResilientCompletion`,
//! and everything else is surfaced as a [`StageError`].

pub mod analyzer;
pub mod evaluator;
pub mod generator;
pub mod refiner;

use thiserror::Error;
use workflow_core::{FailureContext, ModelStage, WorkflowError};

use crate::completion::{CompletionError, SharedCompletionService};
use crate::config::ModelConfig;

pub use analyzer::FeedbackAnalyzer;
pub use evaluator::CandidateEvaluator;
pub use generator::{CandidateGenerator, GenerationInput};
pub use refiner::CriteriaRefiner;

/// Failure of one model-backed stage.
#[derive(Debug, Error)]
pub enum StageError {
    /// The completion call failed after the adapter's retry budget.
    #[error("{stage} call failed: {source}")]
    Upstream {
        stage: ModelStage,
        #[source]
        source: CompletionError,
    },

    /// The model answered, but not in the contracted shape.
    #[error("malformed {stage} output: {message}")]
    Malformed { stage: ModelStage, message: String },
}

impl StageError {
    pub fn stage(&self) -> ModelStage {
        match self {
            Self::Upstream { stage, .. } | Self::Malformed { stage, .. } => *stage,
        }
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::Malformed { .. })
    }

    /// Attach workflow context for the caller.
    ///
    /// Upstream rejections and timeouts are reported the same way as network
    /// failures: the operation did not advance and may be re-issued.
    pub fn into_workflow_error(self, context: FailureContext) -> WorkflowError {
        match self {
            Self::Upstream { stage, source } => WorkflowError::TransientUpstream {
                context,
                stage,
                message: source.to_string(),
            },
            Self::Malformed { stage, message } => WorkflowError::MalformedOutput {
                context,
                stage,
                message,
            },
        }
    }
}

/// The four stages wired to one completion backend.
#[derive(Clone)]
pub struct MatchingAgents {
    pub generator: CandidateGenerator,
    pub evaluator: CandidateEvaluator,
    pub analyzer: FeedbackAnalyzer,
    pub refiner: CriteriaRefiner,
}

impl MatchingAgents {
    pub fn new(completion: SharedCompletionService, model: &ModelConfig) -> Self {
        Self {
            generator: CandidateGenerator::new(completion.clone(), model.generation_temperature),
            evaluator: CandidateEvaluator::new(completion.clone(), model.analysis_temperature),
            analyzer: FeedbackAnalyzer::new(completion.clone(), model.analysis_temperature),
            refiner: CriteriaRefiner::new(completion, model.analysis_temperature),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use workflow_core::WorkflowPhase;

    #[test]
    fn test_stage_error_mapping() {
        let ctx = FailureContext::new("job-1", WorkflowPhase::Refining, 1);
        let upstream = StageError::Upstream {
            stage: ModelStage::Generation,
            source: CompletionError::Transient("HTTP 503".into()),
        };
        assert!(!upstream.is_malformed());
        let err = upstream.into_workflow_error(ctx.clone());
        assert!(err.is_retriable());
        assert_eq!(err.context().unwrap().iteration, 1);

        let malformed = StageError::Malformed {
            stage: ModelStage::Refinement,
            message: "expected object".into(),
        };
        assert_eq!(malformed.stage(), ModelStage::Refinement);
        assert!(!malformed.into_workflow_error(ctx).is_retriable());
    }
}
