//! Prompt builders for the four model stages.
//!
//! Prompt versioning: bump `PROMPT_VERSION` whenever any template changes.
//! The version is logged with every model call so a regression in model
//! behavior can be traced to the prompt that produced it.

use workflow_core::{
    CandidateBatch, CandidateFeedback, CandidateProfile, EffectiveCriteria, FeedbackAnalysis,
    FeedbackRecord, JobDescription,
};

use crate::schema::{
    schema_json, AnalysisResponse, EvaluationResponse, GenerationResponse, RefinementResponse,
};

/// Prompt version. Bump on any template change.
pub const PROMPT_VERSION: &str = "1.3.0";

const GENERATION_PREAMBLE: &str = "\
You are an expert AI recruiter. Your task is to generate realistic candidate profiles \
based on job requirements and selection criteria. Each candidate should have unique \
characteristics while matching the core requirements. Consider previous feedback when \
generating new candidates.";

const EVALUATION_PREAMBLE: &str = "\
You are an expert technical recruiter evaluating candidates. Score each candidate against \
the job description and selection criteria on a scale of 0 to 100, with a breakdown for \
skills, experience, achievements, cultural fit, and leadership where relevant. Be objective \
and refer to each candidate by the id it is listed with.";

const ANALYSIS_PREAMBLE: &str = "\
You are an AI recruitment analyst processing candidate feedback. Analyze patterns in the \
feedback to identify key strengths and areas for improvement. Consider both positive and \
negative feedback to refine future candidate recommendations. Be objective and focus on \
actionable insights. Report your confidence in the analysis as a number between 0 and 1.";

const REFINEMENT_PREAMBLE: &str = "\
You are an expert recruitment strategist. Based on a feedback analysis, produce a complete \
replacement of the selection criteria: required and preferred skills with importance from \
1 to 5, an experience range, and cultural attributes. Every entry needs a reason tied to \
the analysis. List each change relative to the current criteria under adjustments.";

fn with_schema(preamble: &str, schema: String) -> String {
    format!(
        "{}\n\nRespond with a single JSON object matching this JSON Schema. \
         Do not wrap it in prose.\n\n{}",
        preamble, schema
    )
}

pub fn generation_system() -> String {
    with_schema(GENERATION_PREAMBLE, schema_json::<GenerationResponse>())
}

pub fn evaluation_system() -> String {
    with_schema(EVALUATION_PREAMBLE, schema_json::<EvaluationResponse>())
}

pub fn analysis_system() -> String {
    with_schema(ANALYSIS_PREAMBLE, schema_json::<AnalysisResponse>())
}

pub fn refinement_system() -> String {
    with_schema(REFINEMENT_PREAMBLE, schema_json::<RefinementResponse>())
}

/// Name of a previously generated candidate, if its batch is known.
fn candidate_name<'a>(batches: &'a [CandidateBatch], record: &FeedbackRecord) -> Option<&'a str> {
    batches
        .iter()
        .find(|b| b.iteration == record.iteration)
        .and_then(|b| {
            b.candidates
                .iter()
                .find(|c| c.id == record.feedback.candidate_id)
        })
        .map(|c| c.name.as_str())
}

fn history_line(batches: &[CandidateBatch], record: &FeedbackRecord) -> String {
    let who = candidate_name(batches, record)
        .map(String::from)
        .unwrap_or_else(|| format!("Candidate {}", record.feedback.candidate_id));
    match record.feedback.reason.as_deref().filter(|r| !r.trim().is_empty()) {
        Some(reason) => format!("- {} (round {}): {}", who, record.iteration + 1, reason),
        None => format!("- {} (round {})", who, record.iteration + 1),
    }
}

/// User prompt for a generation round.
///
/// Prior feedback is split into liked and rejected examples so the model can
/// steer away from profiles reviewers already turned down.
pub fn generation_user(
    job: &JobDescription,
    criteria: EffectiveCriteria<'_>,
    history: &[FeedbackRecord],
    batches: &[CandidateBatch],
    count: usize,
) -> String {
    let mut prompt = format!(
        "Generate {} candidate profiles for the following job:\n\n\
         Job Title: {}\n\
         Job Description:\n{}\n\n\
         Selection Criteria:\n{}\n",
        count,
        job.title,
        job.body,
        criteria.selection_lines().join("\n")
    );

    if !history.is_empty() {
        let (liked, rejected): (Vec<&FeedbackRecord>, Vec<&FeedbackRecord>) =
            history.iter().partition(|r| r.feedback.is_positive);
        prompt.push_str("\nConsider this feedback from previous candidates:\n");
        if !liked.is_empty() {
            prompt.push_str("Liked (generate more candidates with these qualities):\n");
            for r in liked {
                prompt.push_str(&history_line(batches, r));
                prompt.push('\n');
            }
        }
        if !rejected.is_empty() {
            prompt.push_str("Rejected (do not repeat these profiles):\n");
            for r in rejected {
                prompt.push_str(&history_line(batches, r));
                prompt.push('\n');
            }
        }
    }

    prompt.push_str(
        "\nImportant:\n\
         - Each candidate must have a detailed background summary\n\
         - Include specific achievements that demonstrate their expertise\n\
         - Provide accurate years of experience\n\
         - Give detailed reasoning for match scores (0-100)\n\
         - Include scoring details with a breakdown for each category\n",
    );
    prompt
}

/// User prompt for scoring a generated batch.
pub fn evaluation_user(
    job: &JobDescription,
    criteria: EffectiveCriteria<'_>,
    candidates: &[CandidateProfile],
) -> String {
    let profiles = serde_json::to_string_pretty(candidates).unwrap_or_default();
    format!(
        "Evaluate the following candidate profiles against the job description and \
         selection criteria.\n\n\
         Job Title: {}\n\
         Job Description:\n{}\n\n\
         Selection Criteria:\n{}\n\n\
         Candidate Profiles:\n{}\n\n\
         For each candidate, provide the total match score (0-100), a breakdown of \
         scores, and detailed reasoning for the score.",
        job.title,
        job.body,
        criteria.selection_lines().join("\n"),
        profiles
    )
}

/// User prompt for feedback analysis: one line per verdict.
pub fn analysis_user(feedback: &[CandidateFeedback]) -> String {
    let lines: Vec<String> = feedback.iter().map(|f| format!("- {}", f.describe())).collect();
    format!(
        "Analyze the following candidate feedback and identify patterns and insights:\n\n{}",
        lines.join("\n")
    )
}

/// User prompt for criteria refinement.
pub fn refinement_user(criteria: EffectiveCriteria<'_>, analysis: &FeedbackAnalysis) -> String {
    let current = serde_json::to_string_pretty(&criteria.to_json()).unwrap_or_default();
    let analysis = serde_json::to_string_pretty(analysis).unwrap_or_default();
    format!(
        "Based on the feedback analysis, refine the selection criteria.\n\n\
         Current Criteria:\n{}\n\n\
         Feedback Analysis:\n{}",
        current, analysis
    )
}
