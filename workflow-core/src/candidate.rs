//! Generated candidate profiles and per-iteration batches.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Experience block of a generated profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experience {
    pub years: f64,
    pub summary: String,
    #[serde(default)]
    pub highlights: Vec<String>,
}

/// Per-category scores the model attached to a profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoringDetails {
    pub skills_score: f64,
    pub experience_score: f64,
    pub achievements_score: f64,
    pub cultural_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leadership_score: Option<f64>,
    pub score_breakdown: String,
}

/// A generated candidate. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateProfile {
    pub id: String,
    pub name: String,
    pub skills: Vec<String>,
    pub experience: Experience,
    /// Match score on the 0–100 scale.
    pub match_score: f64,
    pub reasoning: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scoring_details: Option<ScoringDetails>,
}

impl CandidateProfile {
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut violations = Vec::new();
        if self.id.trim().is_empty() {
            violations.push("candidate id is empty".to_string());
        }
        if self.name.trim().is_empty() {
            violations.push("candidate name is empty".to_string());
        }
        if !(0.0..=100.0).contains(&self.match_score) {
            violations.push(format!(
                "candidate '{}' match score {} outside 0..=100",
                self.name, self.match_score
            ));
        }
        if !self.experience.years.is_finite() || self.experience.years < 0.0 {
            violations.push(format!(
                "candidate '{}' has invalid years of experience {}",
                self.name, self.experience.years
            ));
        }
        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations)
        }
    }
}

/// A re-score of one generated candidate against the effective criteria.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateEvaluation {
    pub candidate_id: String,
    /// Match score on the 0–100 scale.
    pub match_score: f64,
    pub reasoning: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scoring_details: Option<ScoringDetails>,
}

impl CandidateEvaluation {
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=100.0).contains(&self.match_score) {
            return Err(format!(
                "evaluation of '{}' has match score {} outside 0..=100",
                self.candidate_id, self.match_score
            ));
        }
        Ok(())
    }
}

/// Sort by match score, highest first. Ties keep their generated order.
pub fn rank_candidates(candidates: &mut [CandidateProfile]) {
    candidates.sort_by(|a, b| {
        b.match_score
            .partial_cmp(&a.match_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

/// Overwrite scores with `evaluations` (matched by candidate id), then rank.
///
/// Candidates without an evaluation keep their generated score. For a
/// candidate evaluated more than once the first evaluation wins. Returns how
/// many candidates were re-scored.
pub fn apply_evaluations(
    candidates: &mut [CandidateProfile],
    evaluations: &[CandidateEvaluation],
) -> usize {
    let mut applied = 0;
    for candidate in candidates.iter_mut() {
        if let Some(e) = evaluations.iter().find(|e| e.candidate_id == candidate.id) {
            candidate.match_score = e.match_score;
            candidate.reasoning = e.reasoning.clone();
            if e.scoring_details.is_some() {
                candidate.scoring_details = e.scoring_details.clone();
            }
            applied += 1;
        }
    }
    rank_candidates(candidates);
    applied
}

/// The candidates produced by one generation round.
///
/// Keyed by `(job_description_id, iteration)` in the append-only log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateBatch {
    pub job_description_id: String,
    pub iteration: u32,
    /// True only for the round generated at the iteration cap.
    pub is_final: bool,
    /// How many candidates were asked for (the batch may hold fewer).
    pub requested_count: usize,
    pub candidates: Vec<CandidateProfile>,
    pub created_at: DateTime<Utc>,
}

impl CandidateBatch {
    pub fn new(
        job_description_id: impl Into<String>,
        iteration: u32,
        is_final: bool,
        requested_count: usize,
        candidates: Vec<CandidateProfile>,
    ) -> Self {
        Self {
            job_description_id: job_description_id.into(),
            iteration,
            is_final,
            requested_count,
            candidates,
            created_at: Utc::now(),
        }
    }

    pub fn contains(&self, candidate_id: &str) -> bool {
        self.candidates.iter().any(|c| c.id == candidate_id)
    }

    pub fn candidate_ids(&self) -> Vec<&str> {
        self.candidates.iter().map(|c| c.id.as_str()).collect()
    }

    /// Fewer candidates than requested came back.
    pub fn is_short(&self) -> bool {
        self.candidates.len() < self.requested_count
    }
}
