//! Where `run_to_completion` gets its feedback from.

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;
use workflow_core::{
    CandidateBatch, CandidateFeedback, CriterionScore, WorkflowResult, WorkflowState,
};

/// Supplies the feedback for one generated batch.
#[async_trait]
pub trait FeedbackSource: Send + Sync {
    async fn collect(
        &self,
        state: &WorkflowState,
        batch: &CandidateBatch,
    ) -> WorkflowResult<Vec<CandidateFeedback>>;
}

/// A verdict on the candidate at `index` in a batch.
///
/// Candidate ids are assigned at generation time, so scripts address
/// candidates by position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptedVerdict {
    pub index: usize,
    pub is_positive: bool,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub criteria: Option<Vec<CriterionScore>>,
}

impl ScriptedVerdict {
    pub fn positive(index: usize, reason: impl Into<String>) -> Self {
        Self {
            index,
            is_positive: true,
            reason: Some(reason.into()),
            criteria: None,
        }
    }

    pub fn negative(index: usize, reason: impl Into<String>) -> Self {
        Self {
            index,
            is_positive: false,
            reason: Some(reason.into()),
            criteria: None,
        }
    }
}

/// Feedback scripted per round: `rounds[i]` judges the batch generated at
/// iteration `i`. Rounds past the end of the script yield no feedback,
/// which ends the workflow.
///
/// ```json
/// { "rounds": [ [ { "index": 0, "isPositive": true, "reason": "Strong React" } ] ] }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScriptedFeedback {
    pub rounds: Vec<Vec<ScriptedVerdict>>,
}

impl ScriptedFeedback {
    pub fn new(rounds: Vec<Vec<ScriptedVerdict>>) -> Self {
        Self { rounds }
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        use anyhow::Context;

        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading feedback script {}", path.display()))?;
        Self::from_json(&text)
            .with_context(|| format!("parsing feedback script {}", path.display()))
    }

    /// Resolve the verdicts for `batch` into feedback on its candidate ids.
    pub fn feedback_for(&self, batch: &CandidateBatch) -> Vec<CandidateFeedback> {
        let Some(round) = self.rounds.get(batch.iteration as usize) else {
            return Vec::new();
        };
        round
            .iter()
            .filter_map(|v| match batch.candidates.get(v.index) {
                Some(candidate) => Some(CandidateFeedback {
                    candidate_id: candidate.id.clone(),
                    is_positive: v.is_positive,
                    reason: v.reason.clone(),
                    criteria: v.criteria.clone(),
                }),
                None => {
                    warn!(
                        iteration = batch.iteration,
                        index = v.index,
                        batch_size = batch.candidates.len(),
                        "Scripted verdict points past the end of the batch; skipped"
                    );
                    None
                }
            })
            .collect()
    }
}

#[async_trait]
impl FeedbackSource for ScriptedFeedback {
    async fn collect(
        &self,
        _state: &WorkflowState,
        batch: &CandidateBatch,
    ) -> WorkflowResult<Vec<CandidateFeedback>> {
        Ok(self.feedback_for(batch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use workflow_core::{CandidateProfile, Experience};

    fn batch(iteration: u32, ids: &[&str]) -> CandidateBatch {
        let candidates = ids
            .iter()
            .map(|id| CandidateProfile {
                id: id.to_string(),
                name: id.to_uppercase(),
                skills: vec![],
                experience: Experience {
                    years: 3.0,
                    summary: String::new(),
                    highlights: vec![],
                },
                match_score: 50.0,
                reasoning: String::new(),
                scoring_details: None,
            })
            .collect();
        CandidateBatch::new("job-1", iteration, false, 5, candidates)
    }

    #[test]
    fn test_verdicts_resolve_to_batch_ids() {
        let script = ScriptedFeedback::from_json(
            r#"{"rounds":[[{"index":1,"isPositive":true,"reason":"Strong React"}],[]]}"#,
        )
        .unwrap();
        let feedback = script.feedback_for(&batch(0, &["a", "b"]));
        assert_eq!(feedback.len(), 1);
        assert_eq!(feedback[0].candidate_id, "b");
        assert!(feedback[0].is_positive);

        assert!(script.feedback_for(&batch(1, &["c"])).is_empty());
        assert!(script.feedback_for(&batch(7, &["d"])).is_empty());
    }

    #[test]
    fn test_out_of_range_index_is_skipped() {
        let script = ScriptedFeedback::new(vec![vec![
            ScriptedVerdict::negative(0, "Too junior"),
            ScriptedVerdict::positive(9, "ghost"),
        ]]);
        let feedback = script.feedback_for(&batch(0, &["a"]));
        assert_eq!(feedback.len(), 1);
        assert_eq!(feedback[0].reason.as_deref(), Some("Too junior"));
    }
}
