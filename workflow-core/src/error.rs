//! Workflow error taxonomy
//!
//! | Variant             | Side effects before failure      | Caller action                    |
//! |---------------------|----------------------------------|----------------------------------|
//! | `TransientUpstream` | none (phase unchanged)           | re-issue the same operation      |
//! | `MalformedOutput`   | none (phase unchanged)           | surface; fix prompt/model        |
//! | `Validation`        | none                             | fix the input                    |
//! | `Conflict`          | none                             | reload state, retry whole op     |
//! | `InvalidPhase`      | none                             | reload state                     |
//! | `Aborted`           | unknown                          | reload state                     |
//!
//! Feedback is the one exception to "no side effects": raw feedback is
//! persisted before analysis, so a `TransientUpstream` or `MalformedOutput`
//! from the analyzer leaves the feedback durably recorded.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::state::{IllegalTransition, StoreError, WorkflowPhase};

/// Result type alias for workflow operations.
pub type WorkflowResult<T> = Result<T, WorkflowError>;

/// Which external model call produced an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelStage {
    /// Candidate profile generation.
    Generation,
    /// Scoring generated candidates against the effective criteria.
    Evaluation,
    /// Feedback pattern analysis.
    Analysis,
    /// Criteria refinement.
    Refinement,
}

impl fmt::Display for ModelStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Generation => write!(f, "generation"),
            Self::Evaluation => write!(f, "evaluation"),
            Self::Analysis => write!(f, "analysis"),
            Self::Refinement => write!(f, "refinement"),
        }
    }
}

/// Where in the workflow a failure happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureContext {
    pub job_description_id: String,
    pub phase: WorkflowPhase,
    pub iteration: u32,
}

impl FailureContext {
    pub fn new(
        job_description_id: impl Into<String>,
        phase: WorkflowPhase,
        iteration: u32,
    ) -> Self {
        Self {
            job_description_id: job_description_id.into(),
            phase,
            iteration,
        }
    }
}

impl fmt::Display for FailureContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "job={} phase={} iteration={}",
            self.job_description_id, self.phase, self.iteration
        )
    }
}

/// Unified error type for workflow operations.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// Network failure, upstream 5xx, or timeout after the retry budget ran out.
    #[error("upstream {stage} call failed ({context}): {message}")]
    TransientUpstream {
        context: FailureContext,
        stage: ModelStage,
        message: String,
    },

    /// The model answered but the payload did not match the expected schema.
    #[error("malformed {stage} output ({context}): {message}")]
    MalformedOutput {
        context: FailureContext,
        stage: ModelStage,
        message: String,
    },

    /// Caller-supplied state, criteria or feedback failed validation.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A concurrent transition already moved the stored snapshot.
    #[error("conflicting transition for job {job_description_id}: expected version {expected}, found {found}")]
    Conflict {
        job_description_id: String,
        expected: u64,
        found: u64,
    },

    #[error("workflow already exists for job {0}")]
    AlreadyExists(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// The operation is not allowed in the snapshot's current phase.
    #[error("{operation} not allowed ({context})")]
    InvalidPhase {
        context: FailureContext,
        operation: &'static str,
    },

    #[error(transparent)]
    IllegalTransition(#[from] IllegalTransition),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The task running the operation ended without a result.
    #[error("operation aborted: {0}")]
    Aborted(String),
}

impl WorkflowError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Whether re-issuing the whole operation may succeed.
    ///
    /// Malformed output is never retriable: a model that cannot produce the
    /// schema will not start producing it because we asked again.
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::TransientUpstream { .. } | Self::Conflict { .. } => true,
            Self::Store(e) => e.is_retriable(),
            _ => false,
        }
    }

    /// The failure context, when the error carries one.
    pub fn context(&self) -> Option<&FailureContext> {
        match self {
            Self::TransientUpstream { context, .. }
            | Self::MalformedOutput { context, .. }
            | Self::InvalidPhase { context, .. } => Some(context),
            _ => None,
        }
    }

    /// Machine-readable error code for callers that surface a generic
    /// "processing failed, retry" message.
    pub fn code(&self) -> &'static str {
        match self {
            Self::TransientUpstream { .. } => "UPSTREAM_UNAVAILABLE",
            Self::MalformedOutput { .. } => "MALFORMED_MODEL_OUTPUT",
            Self::Validation(_) => "VALIDATION_FAILED",
            Self::Conflict { .. } => "CONFLICT",
            Self::AlreadyExists(_) => "ALREADY_EXISTS",
            Self::NotFound(_) => "NOT_FOUND",
            Self::InvalidPhase { .. } => "INVALID_PHASE",
            Self::IllegalTransition(_) => "ILLEGAL_TRANSITION",
            Self::Store(_) => "STORE_ERROR",
            Self::Aborted(_) => "ABORTED",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> FailureContext {
        FailureContext::new("job-1", WorkflowPhase::Evaluating, 2)
    }

    #[test]
    fn test_transient_is_retriable() {
        let err = WorkflowError::TransientUpstream {
            context: ctx(),
            stage: ModelStage::Generation,
            message: "503".into(),
        };
        assert!(err.is_retriable());
        assert_eq!(err.code(), "UPSTREAM_UNAVAILABLE");
        assert_eq!(err.context().unwrap().iteration, 2);
    }

    #[test]
    fn test_malformed_is_not_retriable() {
        let err = WorkflowError::MalformedOutput {
            context: ctx(),
            stage: ModelStage::Refinement,
            message: "expected object".into(),
        };
        assert!(!err.is_retriable());
    }

    #[test]
    fn test_display_includes_context() {
        let err = WorkflowError::MalformedOutput {
            context: ctx(),
            stage: ModelStage::Analysis,
            message: "missing field `confidence`".into(),
        };
        let text = err.to_string();
        assert!(text.contains("job=job-1"));
        assert!(text.contains("phase=EVALUATING"));
        assert!(text.contains("analysis"));
    }

    #[test]
    fn test_conflict_is_retriable() {
        let err = WorkflowError::Conflict {
            job_description_id: "job-1".into(),
            expected: 3,
            found: 4,
        };
        assert!(err.is_retriable());
        assert!(err.context().is_none());
    }
}
