//! Read-only summary of one workflow.

use std::fmt::Write as _;

use serde::Serialize;
use workflow_core::{
    CandidateBatch, CandidateProfile, CriteriaSummary, FeedbackRecord, WorkflowPhase,
    WorkflowState,
};

/// One generated round.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub iteration: u32,
    pub is_final: bool,
    pub requested_count: usize,
    pub returned_count: usize,
    pub positive_feedback: usize,
    pub negative_feedback: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowReport {
    pub job_description_id: String,
    pub phase: WorkflowPhase,
    pub iteration_count: u32,
    pub should_terminate: bool,
    pub version: u64,
    pub batches: Vec<BatchSummary>,
    pub feedback_total: usize,
    pub refinements: usize,
    pub criteria: CriteriaSummary,
    /// Candidates of the last batch once the workflow is complete.
    pub final_candidates: Vec<CandidateProfile>,
}

impl WorkflowReport {
    pub fn build(
        state: &WorkflowState,
        batches: &[CandidateBatch],
        feedback: &[FeedbackRecord],
        refinements: usize,
    ) -> Self {
        let batch_summaries = batches
            .iter()
            .map(|b| {
                let round = feedback.iter().filter(|r| r.iteration == b.iteration);
                let positive = round.clone().filter(|r| r.feedback.is_positive).count();
                BatchSummary {
                    iteration: b.iteration,
                    is_final: b.is_final,
                    requested_count: b.requested_count,
                    returned_count: b.candidates.len(),
                    positive_feedback: positive,
                    negative_feedback: round.count() - positive,
                }
            })
            .collect();

        let final_candidates = if state.is_complete() {
            batches
                .last()
                .map(|b| b.candidates.clone())
                .unwrap_or_default()
        } else {
            Vec::new()
        };

        Self {
            job_description_id: state.job_description_id.clone(),
            phase: state.current_phase,
            iteration_count: state.iteration_count,
            should_terminate: state.should_terminate,
            version: state.version,
            batches: batch_summaries,
            feedback_total: feedback.len(),
            refinements,
            criteria: state.effective_criteria().summary(),
            final_candidates,
        }
    }

    /// Plain-text rendering for the terminal.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Job {}: {} (iteration {}, version {})",
            self.job_description_id, self.phase, self.iteration_count, self.version
        );
        let _ = writeln!(
            out,
            "Criteria: {}{}",
            if self.criteria.refined { "refined" } else { "baseline" },
            self.criteria
                .explanation
                .as_deref()
                .map(|e| format!(" ({})", e))
                .unwrap_or_default()
        );
        for s in &self.criteria.required_skills {
            let _ = writeln!(out, "  required  {} [{}]", s.name, s.importance);
        }
        for s in &self.criteria.preferred_skills {
            let _ = writeln!(out, "  preferred {} [{}]", s.name, s.importance);
        }
        match self.criteria.max_years {
            Some(max) => {
                let _ = writeln!(out, "  experience {}-{} years", self.criteria.min_years, max);
            }
            None => {
                let _ = writeln!(out, "  experience {}+ years", self.criteria.min_years);
            }
        }

        let _ = writeln!(
            out,
            "Batches: {}  Feedback: {}  Refinements: {}",
            self.batches.len(),
            self.feedback_total,
            self.refinements
        );
        for b in &self.batches {
            let _ = writeln!(
                out,
                "  round {}{}: {}/{} candidates, {} liked, {} rejected",
                b.iteration,
                if b.is_final { " (final)" } else { "" },
                b.returned_count,
                b.requested_count,
                b.positive_feedback,
                b.negative_feedback
            );
        }

        if !self.final_candidates.is_empty() {
            let _ = writeln!(out, "Final candidates:");
            for c in &self.final_candidates {
                let _ = writeln!(out, "  {:>5.1}  {}  ({})", c.match_score, c.name, c.id);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use workflow_core::{
        CandidateFeedback, Experience, SelectionCriteria, WorkflowPhase,
    };

    fn profile(id: &str) -> CandidateProfile {
        CandidateProfile {
            id: id.into(),
            name: format!("Candidate {id}"),
            skills: vec!["React".into()],
            experience: Experience {
                years: 6.0,
                summary: "Frontend".into(),
                highlights: vec![],
            },
            match_score: 82.0,
            reasoning: "fits".into(),
            scoring_details: None,
        }
    }

    #[test]
    fn test_counts_feedback_per_round() {
        let criteria = SelectionCriteria::new().require_skill("React", 4);
        let mut state = WorkflowState::new("job-1", criteria);
        state.current_phase = WorkflowPhase::Complete;
        state.should_terminate = true;
        state.iteration_count = 2;

        let batches = vec![
            CandidateBatch::new("job-1", 0, false, 5, vec![profile("a"), profile("b")]),
            CandidateBatch::new("job-1", 1, false, 5, vec![profile("c")]),
        ];
        let feedback = vec![
            FeedbackRecord::new("job-1", 0, CandidateFeedback::positive("a", "good")),
            FeedbackRecord::new("job-1", 0, CandidateFeedback::negative("b", "junior")),
            FeedbackRecord::new("job-1", 1, CandidateFeedback::negative("c", "junior")),
        ];

        let report = WorkflowReport::build(&state, &batches, &feedback, 1);
        assert_eq!(report.batches[0].positive_feedback, 1);
        assert_eq!(report.batches[0].negative_feedback, 1);
        assert_eq!(report.batches[1].negative_feedback, 1);
        assert_eq!(report.feedback_total, 3);
        assert_eq!(report.final_candidates.len(), 1);

        let text = report.render();
        assert!(text.contains("COMPLETE"));
        assert!(text.contains("required  React [4]"));
        assert!(text.contains("round 1: 1/5 candidates"));
    }

    #[test]
    fn test_no_final_candidates_while_running() {
        let state = WorkflowState::new("job-1", SelectionCriteria::new());
        let batches = vec![CandidateBatch::new("job-1", 0, false, 5, vec![profile("a")])];
        let report = WorkflowReport::build(&state, &batches, &[], 0);
        assert!(report.final_candidates.is_empty());
        assert!(!report.criteria.refined);
    }
}
