//! Feedback input types and batch validation.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Criterion score bounds (inclusive).
pub const MIN_CRITERION_SCORE: u8 = 1;
pub const MAX_CRITERION_SCORE: u8 = 5;

/// A reviewer's score for one category of a candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriterionScore {
    pub category: String,
    pub score: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// A verdict on one generated candidate. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateFeedback {
    pub candidate_id: String,
    pub is_positive: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub criteria: Option<Vec<CriterionScore>>,
}

impl CandidateFeedback {
    pub fn positive(candidate_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            candidate_id: candidate_id.into(),
            is_positive: true,
            reason: Some(reason.into()),
            criteria: None,
        }
    }

    pub fn negative(candidate_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            candidate_id: candidate_id.into(),
            is_positive: false,
            reason: Some(reason.into()),
            criteria: None,
        }
    }

    pub fn with_score(
        mut self,
        category: impl Into<String>,
        score: u8,
        comment: Option<&str>,
    ) -> Self {
        self.criteria
            .get_or_insert_with(Vec::new)
            .push(CriterionScore {
                category: category.into(),
                score,
                comment: comment.map(String::from),
            });
        self
    }

    pub fn has_scores(&self) -> bool {
        self.criteria.as_ref().is_some_and(|c| !c.is_empty())
    }

    /// One-line rendering used in prompts and logs.
    pub fn describe(&self) -> String {
        let mut parts = vec![
            format!("Candidate {}", self.candidate_id),
            if self.is_positive {
                "Good fit".to_string()
            } else {
                "Not a good fit".to_string()
            },
        ];
        if let Some(reason) = self.reason.as_deref().filter(|r| !r.trim().is_empty()) {
            parts.push(format!("Reason: {reason}"));
        }
        if let Some(scores) = self.criteria.as_ref().filter(|c| !c.is_empty()) {
            let rendered: Vec<String> = scores
                .iter()
                .map(|c| match &c.comment {
                    Some(comment) => format!("{}: {}/5 ({})", c.category, c.score, comment),
                    None => format!("{}: {}/5", c.category, c.score),
                })
                .collect();
            parts.push(rendered.join(", "));
        }
        parts.join(" - ")
    }
}

/// Feedback as stored in the append-only log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackRecord {
    pub job_description_id: String,
    /// Iteration of the batch this feedback judged.
    pub iteration: u32,
    pub feedback: CandidateFeedback,
    pub recorded_at: DateTime<Utc>,
}

impl FeedbackRecord {
    pub fn new(
        job_description_id: impl Into<String>,
        iteration: u32,
        feedback: CandidateFeedback,
    ) -> Self {
        Self {
            job_description_id: job_description_id.into(),
            iteration,
            feedback,
            recorded_at: Utc::now(),
        }
    }
}

/// Positive/negative tally of a feedback set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeedbackSummary {
    pub total: usize,
    pub positive: usize,
    pub negative: usize,
}

impl FeedbackSummary {
    pub fn of(feedback: &[CandidateFeedback]) -> Self {
        let positive = feedback.iter().filter(|f| f.is_positive).count();
        Self {
            total: feedback.len(),
            positive,
            negative: feedback.len() - positive,
        }
    }

    /// Share of positive verdicts; 0.0 for an empty set.
    pub fn positive_ratio(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.positive as f64 / self.total as f64
        }
    }
}

/// Validate a feedback batch against the candidates it claims to judge.
///
/// Runs before any store write or model call. Returns every violation.
pub fn validate_feedback_batch<'a, I>(
    feedback: &[CandidateFeedback],
    known_candidate_ids: I,
) -> Result<(), Vec<String>>
where
    I: IntoIterator<Item = &'a str>,
{
    let known: HashSet<&str> = known_candidate_ids.into_iter().collect();
    let mut seen = HashSet::new();
    let mut violations = Vec::new();

    for f in feedback {
        if f.candidate_id.trim().is_empty() {
            violations.push("feedback has an empty candidate id".to_string());
            continue;
        }
        if !known.contains(f.candidate_id.as_str()) {
            violations.push(format!(
                "candidate {} is not part of the most recent batch",
                f.candidate_id
            ));
        }
        if !seen.insert(f.candidate_id.as_str()) {
            violations.push(format!(
                "duplicate feedback for candidate {}",
                f.candidate_id
            ));
        }
        for c in f.criteria.iter().flatten() {
            if c.category.trim().is_empty() {
                violations.push(format!(
                    "candidate {} has a criterion with an empty category",
                    f.candidate_id
                ));
            }
            if !(MIN_CRITERION_SCORE..=MAX_CRITERION_SCORE).contains(&c.score) {
                violations.push(format!(
                    "candidate {} criterion '{}' score {} outside {}..={}",
                    f.candidate_id, c.category, c.score, MIN_CRITERION_SCORE, MAX_CRITERION_SCORE
                ));
            }
        }
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(violations)
    }
}
