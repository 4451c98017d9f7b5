//! Feedback analyzer.

use tracing::{debug, info};
use workflow_core::{CandidateFeedback, FeedbackAnalysis, FeedbackSummary, ModelStage};

use super::StageError;
use crate::completion::{CompletionRequest, SharedCompletionService};
use crate::prompts::{self, PROMPT_VERSION};
use crate::schema;

#[derive(Clone)]
pub struct FeedbackAnalyzer {
    completion: SharedCompletionService,
    temperature: f32,
}

impl FeedbackAnalyzer {
    pub fn new(completion: SharedCompletionService, temperature: f32) -> Self {
        Self {
            completion,
            temperature,
        }
    }

    /// Condense a feedback set into patterns and a confidence.
    ///
    /// Empty feedback is "no signal": returns [`FeedbackAnalysis::empty`]
    /// without calling the model.
    pub async fn analyze(
        &self,
        feedback: &[CandidateFeedback],
    ) -> Result<FeedbackAnalysis, StageError> {
        if feedback.is_empty() {
            debug!("No feedback to analyze");
            return Ok(FeedbackAnalysis::empty());
        }

        let summary = FeedbackSummary::of(feedback);
        let request = CompletionRequest::new(
            ModelStage::Analysis,
            prompts::analysis_system(),
            prompts::analysis_user(feedback),
            self.temperature,
        );

        let raw = self
            .completion
            .complete(&request)
            .await
            .map_err(|source| StageError::Upstream {
                stage: ModelStage::Analysis,
                source,
            })?;

        let analysis = schema::parse_analysis(&raw).map_err(|message| StageError::Malformed {
            stage: ModelStage::Analysis,
            message,
        })?;

        info!(
            total = summary.total,
            positive = summary.positive,
            confidence = analysis.confidence,
            prompt_version = PROMPT_VERSION,
            "Feedback analyzed"
        );
        Ok(analysis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::{CompletionError, MockCompletionService};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_empty_feedback_makes_no_call() {
        let mut mock = MockCompletionService::new();
        mock.expect_complete().times(0);
        let analyzer = FeedbackAnalyzer::new(Arc::new(mock), 0.3);

        let analysis = analyzer.analyze(&[]).await.unwrap();
        assert!(analysis.is_empty());
        assert_eq!(analysis.confidence, 0.0);
    }

    #[tokio::test]
    async fn test_analysis_uses_low_temperature_and_parses() {
        let mut mock = MockCompletionService::new();
        mock.expect_complete()
            .withf(|req| req.stage == ModelStage::Analysis && (req.temperature - 0.3).abs() < 1e-6)
            .times(1)
            .returning(|_| {
                Ok(r#"{"patterns":{"positivePatterns":["Strong technical skills"]},"recommendations":{},"confidence":0.8}"#.into())
            });
        let analyzer = FeedbackAnalyzer::new(Arc::new(mock), 0.3);

        let feedback = vec![CandidateFeedback::positive("1", "Strong technical skills")];
        let analysis = analyzer.analyze(&feedback).await.unwrap();
        assert!((analysis.confidence - 0.8).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_malformed_and_upstream_are_distinguished() {
        let mut mock = MockCompletionService::new();
        let mut seq = mockall::Sequence::new();
        mock.expect_complete()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok("not json at all".into()));
        mock.expect_complete()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(CompletionError::Timeout(std::time::Duration::from_secs(60))));
        let analyzer = FeedbackAnalyzer::new(Arc::new(mock), 0.3);
        let feedback = vec![CandidateFeedback::negative("1", "Too junior")];

        assert!(analyzer.analyze(&feedback).await.unwrap_err().is_malformed());
        let err = analyzer.analyze(&feedback).await.unwrap_err();
        assert!(matches!(err, StageError::Upstream { .. }));
    }
}
