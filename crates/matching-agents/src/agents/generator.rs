//! Candidate generator.

use tracing::{debug, info, warn};
use workflow_core::{
    CandidateBatch, CandidateProfile, EffectiveCriteria, FeedbackRecord, JobDescription, ModelStage,
};

use super::StageError;
use crate::completion::{CompletionRequest, SharedCompletionService};
use crate::prompts::{self, PROMPT_VERSION};
use crate::schema;

/// Everything one generation round is conditioned on.
#[derive(Debug, Clone, Copy)]
pub struct GenerationInput<'a> {
    pub job: &'a JobDescription,
    pub criteria: EffectiveCriteria<'a>,
    /// All feedback recorded so far for this job.
    pub history: &'a [FeedbackRecord],
    /// Earlier batches, used to name candidates in the feedback history.
    pub batches: &'a [CandidateBatch],
    pub count: usize,
}

#[derive(Clone)]
pub struct CandidateGenerator {
    completion: SharedCompletionService,
    temperature: f32,
}

impl CandidateGenerator {
    pub fn new(completion: SharedCompletionService, temperature: f32) -> Self {
        Self {
            completion,
            temperature,
        }
    }

    /// Generate up to `input.count` profiles.
    ///
    /// Never returns more than requested; may return fewer.
    pub async fn generate(
        &self,
        input: GenerationInput<'_>,
    ) -> Result<Vec<CandidateProfile>, StageError> {
        let request = CompletionRequest::new(
            ModelStage::Generation,
            prompts::generation_system(),
            prompts::generation_user(
                input.job,
                input.criteria,
                input.history,
                input.batches,
                input.count,
            ),
            self.temperature,
        );
        debug!(
            job = %input.job.id,
            prompt_version = PROMPT_VERSION,
            refined = input.criteria.is_refined(),
            history = input.history.len(),
            "Generation prompt built"
        );

        let raw = self
            .completion
            .complete(&request)
            .await
            .map_err(|source| StageError::Upstream {
                stage: ModelStage::Generation,
                source,
            })?;

        let profiles =
            schema::parse_generation(&raw, input.count).map_err(|message| StageError::Malformed {
                stage: ModelStage::Generation,
                message,
            })?;

        if profiles.len() < input.count {
            warn!(
                job = %input.job.id,
                requested = input.count,
                returned = profiles.len(),
                "Model returned fewer candidates than requested"
            );
        }
        info!(
            job = %input.job.id,
            count = profiles.len(),
            prompt_version = PROMPT_VERSION,
            "Candidates generated"
        );
        Ok(profiles)
    }
}
