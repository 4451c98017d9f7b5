//! Criteria refiner.

use tracing::info;
use workflow_core::{CriteriaRefinement, FeedbackAnalysis, ModelStage, WorkflowState};

use super::StageError;
use crate::completion::{CompletionRequest, SharedCompletionService};
use crate::prompts::{self, PROMPT_VERSION};
use crate::schema;

#[derive(Clone)]
pub struct CriteriaRefiner {
    completion: SharedCompletionService,
    temperature: f32,
}

impl CriteriaRefiner {
    pub fn new(completion: SharedCompletionService, temperature: f32) -> Self {
        Self {
            completion,
            temperature,
        }
    }

    /// Produce a full replacement for the state's effective criteria.
    pub async fn refine(
        &self,
        state: &WorkflowState,
        analysis: &FeedbackAnalysis,
    ) -> Result<CriteriaRefinement, StageError> {
        let request = CompletionRequest::new(
            ModelStage::Refinement,
            prompts::refinement_system(),
            prompts::refinement_user(state.effective_criteria(), analysis),
            self.temperature,
        );

        let raw = self
            .completion
            .complete(&request)
            .await
            .map_err(|source| StageError::Upstream {
                stage: ModelStage::Refinement,
                source,
            })?;

        let refinement =
            schema::parse_refinement(&raw).map_err(|message| StageError::Malformed {
                stage: ModelStage::Refinement,
                message,
            })?;

        info!(
            job = %state.job_description_id,
            iteration = state.iteration_count,
            required = refinement.refined_criteria.required_skills.len(),
            adjustments = refinement.refined_criteria.adjustments.len(),
            prompt_version = PROMPT_VERSION,
            "Criteria refined"
        );
        Ok(refinement)
    }
}
