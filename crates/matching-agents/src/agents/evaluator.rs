//! Candidate evaluator: re-scores a generated batch against the effective
//! criteria before it is ranked and persisted.

use tracing::{debug, info};
use workflow_core::{
    CandidateEvaluation, CandidateProfile, EffectiveCriteria, JobDescription, ModelStage,
};

use super::StageError;
use crate::completion::{CompletionRequest, SharedCompletionService};
use crate::prompts::{self, PROMPT_VERSION};
use crate::schema;

#[derive(Clone)]
pub struct CandidateEvaluator {
    completion: SharedCompletionService,
    temperature: f32,
}

impl CandidateEvaluator {
    pub fn new(completion: SharedCompletionService, temperature: f32) -> Self {
        Self {
            completion,
            temperature,
        }
    }

    /// Score every candidate in one call. An empty batch makes no call.
    pub async fn evaluate(
        &self,
        job: &JobDescription,
        criteria: EffectiveCriteria<'_>,
        candidates: &[CandidateProfile],
    ) -> Result<Vec<CandidateEvaluation>, StageError> {
        if candidates.is_empty() {
            debug!(job = %job.id, "No candidates to evaluate");
            return Ok(Vec::new());
        }

        let request = CompletionRequest::new(
            ModelStage::Evaluation,
            prompts::evaluation_system(),
            prompts::evaluation_user(job, criteria, candidates),
            self.temperature,
        );

        let raw = self
            .completion
            .complete(&request)
            .await
            .map_err(|source| StageError::Upstream {
                stage: ModelStage::Evaluation,
                source,
            })?;

        let evaluations =
            schema::parse_evaluation(&raw).map_err(|message| StageError::Malformed {
                stage: ModelStage::Evaluation,
                message,
            })?;

        info!(
            job = %job.id,
            candidates = candidates.len(),
            evaluations = evaluations.len(),
            prompt_version = PROMPT_VERSION,
            "Candidates evaluated"
        );
        Ok(evaluations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::{CompletionError, MockCompletionService};
    use std::sync::Arc;
    use workflow_core::{Experience, SelectionCriteria};

    fn job() -> JobDescription {
        JobDescription::new("job-1", "Senior Frontend Engineer", "Build our React platform.")
    }

    fn profile(id: &str) -> CandidateProfile {
        CandidateProfile {
            id: id.into(),
            name: format!("Candidate {}", id),
            skills: vec!["React".into()],
            experience: Experience {
                years: 6.0,
                summary: "Frontend".into(),
                highlights: vec![],
            },
            match_score: 70.0,
            reasoning: "generated".into(),
            scoring_details: None,
        }
    }

    #[tokio::test]
    async fn test_empty_batch_makes_no_call() {
        let mut mock = MockCompletionService::new();
        mock.expect_complete().times(0);
        let evaluator = CandidateEvaluator::new(Arc::new(mock), 0.3);
        let criteria = SelectionCriteria::new().require_skill("React", 4);

        let evaluations = evaluator
            .evaluate(&job(), EffectiveCriteria::Baseline(&criteria), &[])
            .await
            .unwrap();
        assert!(evaluations.is_empty());
    }

    #[tokio::test]
    async fn test_batch_is_scored_in_one_call() {
        let mut mock = MockCompletionService::new();
        mock.expect_complete()
            .withf(|req| {
                req.stage == ModelStage::Evaluation
                    && req.user.contains("\"id\": \"a\"")
                    && req.user.contains("\"id\": \"b\"")
            })
            .times(1)
            .returning(|_| {
                Ok(r#"{"evaluations":[{"candidateId":"b","matchScore":93,"reasoning":"Led a design system"},{"candidateId":"a","matchScore":61,"reasoning":"Mostly backend"}]}"#.into())
            });
        let evaluator = CandidateEvaluator::new(Arc::new(mock), 0.3);
        let criteria = SelectionCriteria::new().require_skill("React", 4);

        let evaluations = evaluator
            .evaluate(
                &job(),
                EffectiveCriteria::Baseline(&criteria),
                &[profile("a"), profile("b")],
            )
            .await
            .unwrap();
        assert_eq!(evaluations.len(), 2);
        assert_eq!(evaluations[0].candidate_id, "b");
        assert_eq!(evaluations[0].match_score, 93.0);
    }

    #[tokio::test]
    async fn test_malformed_and_upstream_are_distinguished() {
        let mut mock = MockCompletionService::new();
        let mut seq = mockall::Sequence::new();
        mock.expect_complete()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| {
                Ok(r#"{"evaluations":[{"candidateId":"a","matchScore":250,"reasoning":"x"}]}"#.into())
            });
        mock.expect_complete()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(CompletionError::Transient("HTTP 503".into())));
        let evaluator = CandidateEvaluator::new(Arc::new(mock), 0.3);
        let criteria = SelectionCriteria::new().require_skill("React", 4);
        let batch = [profile("a")];

        let err = evaluator
            .evaluate(&job(), EffectiveCriteria::Baseline(&criteria), &batch)
            .await
            .unwrap_err();
        assert!(err.is_malformed());
        assert_eq!(err.stage(), ModelStage::Evaluation);

        let err = evaluator
            .evaluate(&job(), EffectiveCriteria::Baseline(&criteria), &batch)
            .await
            .unwrap_err();
        assert!(matches!(err, StageError::Upstream { .. }));
    }
}
