//! Model response contracts and fail-closed parsing.
//!
//! Every model answer is parsed into a typed payload before the workflow
//! touches it. Anything that does not decode, or decodes but violates a
//! range constraint, is rejected with a message; callers turn that into
//! `MalformedOutput`. Nothing here retries.
//!
//! ## Contracts
//!
//! ```text
//! GenerationResponse  { candidates: [ { name, skills[], experience{years,summary,highlights[]},
//!                                       matchScore 0-100, reasoning, scoringDetails? } ] }
//! EvaluationResponse  { evaluations: [ { candidateId, matchScore 0-100, reasoning, scoringDetails? } ] }
//! AnalysisResponse    { patterns{..}, recommendations{..}, confidence 0-1 }
//! RefinementResponse  { refinedCriteria{..}, explanation }
//! ```

use std::sync::OnceLock;

use regex::Regex;
use schemars::JsonSchema;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use workflow_core::{
    Adjustment, AdjustmentDirection, CandidateEvaluation, CandidateProfile, CriteriaRefinement,
    Experience,
    FeedbackAnalysis, FeedbackPatterns, FeedbackRecommendations, RefinedAttribute,
    RefinedCriteria, RefinedExperience, RefinedSkill, ScoringDetails,
};

// ============================================================================
// Generation
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WireExperience {
    pub years: f64,
    pub summary: String,
    #[serde(default)]
    pub highlights: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WireScoringDetails {
    pub skills_score: f64,
    pub experience_score: f64,
    pub achievements_score: f64,
    pub cultural_score: f64,
    #[serde(default)]
    pub leadership_score: Option<f64>,
    pub score_breakdown: String,
}

/// One generated candidate as the model returns it (ids are assigned by us).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WireCandidate {
    pub name: String,
    pub skills: Vec<String>,
    pub experience: WireExperience,
    /// 0-100.
    pub match_score: f64,
    pub reasoning: String,
    #[serde(default)]
    pub scoring_details: Option<WireScoringDetails>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GenerationResponse {
    pub candidates: Vec<WireCandidate>,
}

impl From<WireScoringDetails> for ScoringDetails {
    fn from(s: WireScoringDetails) -> Self {
        ScoringDetails {
            skills_score: s.skills_score,
            experience_score: s.experience_score,
            achievements_score: s.achievements_score,
            cultural_score: s.cultural_score,
            leadership_score: s.leadership_score,
            score_breakdown: s.score_breakdown,
        }
    }
}

impl WireCandidate {
    fn into_profile(self, id: String) -> CandidateProfile {
        CandidateProfile {
            id,
            name: self.name,
            skills: self.skills,
            experience: Experience {
                years: self.experience.years,
                summary: self.experience.summary,
                highlights: self.experience.highlights,
            },
            match_score: self.match_score,
            reasoning: self.reasoning,
            scoring_details: self.scoring_details.map(ScoringDetails::from),
        }
    }
}

// ============================================================================
// Evaluation
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WireEvaluation {
    /// Id of the candidate as listed in the prompt.
    pub candidate_id: String,
    /// 0-100.
    pub match_score: f64,
    pub reasoning: String,
    #[serde(default)]
    pub scoring_details: Option<WireScoringDetails>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct EvaluationResponse {
    pub evaluations: Vec<WireEvaluation>,
}

impl From<WireEvaluation> for CandidateEvaluation {
    fn from(e: WireEvaluation) -> Self {
        CandidateEvaluation {
            candidate_id: e.candidate_id,
            match_score: e.match_score,
            reasoning: e.reasoning,
            scoring_details: e.scoring_details.map(ScoringDetails::from),
        }
    }
}

// ============================================================================
// Analysis
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WirePatterns {
    #[serde(default)]
    pub positive_patterns: Vec<String>,
    #[serde(default)]
    pub negative_patterns: Vec<String>,
    #[serde(default)]
    pub skill_gaps: Vec<String>,
    #[serde(default)]
    pub cultural_insights: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WireRecommendations {
    #[serde(default)]
    pub skills_to_emphasize: Vec<String>,
    #[serde(default)]
    pub skills_to_deemphasize: Vec<String>,
    #[serde(default)]
    pub experience_adjustments: Vec<String>,
    #[serde(default)]
    pub cultural_fit_adjustments: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AnalysisResponse {
    pub patterns: WirePatterns,
    pub recommendations: WireRecommendations,
    /// 0-1.
    pub confidence: f64,
}

impl From<AnalysisResponse> for FeedbackAnalysis {
    fn from(r: AnalysisResponse) -> Self {
        FeedbackAnalysis {
            patterns: FeedbackPatterns {
                positive_patterns: r.patterns.positive_patterns,
                negative_patterns: r.patterns.negative_patterns,
                skill_gaps: r.patterns.skill_gaps,
                cultural_insights: r.patterns.cultural_insights,
            },
            recommendations: FeedbackRecommendations {
                skills_to_emphasize: r.recommendations.skills_to_emphasize,
                skills_to_deemphasize: r.recommendations.skills_to_deemphasize,
                experience_adjustments: r.recommendations.experience_adjustments,
                cultural_fit_adjustments: r.recommendations.cultural_fit_adjustments,
            },
            confidence: r.confidence,
        }
    }
}

// ============================================================================
// Refinement
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WireRefinedSkill {
    pub skill: String,
    /// 1-5.
    pub importance: u8,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WireRefinedAttribute {
    pub attribute: String,
    /// 1-5.
    pub importance: u8,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WireExperienceLevel {
    pub min_years: u32,
    pub max_years: u32,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum WireChange {
    Increased,
    Decreased,
    Unchanged,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WireAdjustment {
    pub aspect: String,
    pub change: WireChange,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WireRefinedCriteria {
    pub required_skills: Vec<WireRefinedSkill>,
    #[serde(default)]
    pub preferred_skills: Vec<WireRefinedSkill>,
    pub experience_level: WireExperienceLevel,
    #[serde(default)]
    pub cultural_attributes: Vec<WireRefinedAttribute>,
    #[serde(default)]
    pub adjustments: Vec<WireAdjustment>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RefinementResponse {
    pub refined_criteria: WireRefinedCriteria,
    pub explanation: String,
}

fn refined_skill(s: WireRefinedSkill) -> RefinedSkill {
    RefinedSkill {
        skill: s.skill,
        importance: s.importance,
        reason: s.reason,
    }
}

impl From<RefinementResponse> for CriteriaRefinement {
    fn from(r: RefinementResponse) -> Self {
        let rc = r.refined_criteria;
        CriteriaRefinement {
            refined_criteria: RefinedCriteria {
                required_skills: rc.required_skills.into_iter().map(refined_skill).collect(),
                preferred_skills: rc.preferred_skills.into_iter().map(refined_skill).collect(),
                experience_level: RefinedExperience {
                    min_years: rc.experience_level.min_years,
                    max_years: rc.experience_level.max_years,
                    reason: rc.experience_level.reason,
                },
                cultural_attributes: rc
                    .cultural_attributes
                    .into_iter()
                    .map(|a| RefinedAttribute {
                        attribute: a.attribute,
                        importance: a.importance,
                        reason: a.reason,
                    })
                    .collect(),
                adjustments: rc
                    .adjustments
                    .into_iter()
                    .map(|a| Adjustment {
                        aspect: a.aspect,
                        change: match a.change {
                            WireChange::Increased => AdjustmentDirection::Increased,
                            WireChange::Decreased => AdjustmentDirection::Decreased,
                            WireChange::Unchanged => AdjustmentDirection::Unchanged,
                        },
                        reason: a.reason,
                    })
                    .collect(),
            },
            explanation: r.explanation,
        }
    }
}

// ============================================================================
// Parsing
// ============================================================================

/// Pretty JSON Schema for `T`, embedded in system prompts.
pub fn schema_json<T: JsonSchema>() -> String {
    let schema = schemars::schema_for!(T);
    serde_json::to_string_pretty(&schema).unwrap_or_default()
}

fn fence_regex() -> Option<&'static Regex> {
    static FENCE: OnceLock<Option<Regex>> = OnceLock::new();
    FENCE
        .get_or_init(|| Regex::new(r"(?s)```(?:json|JSON)?\s*(.*?)```").ok())
        .as_ref()
}

/// Pull the JSON object out of a model answer.
///
/// Prefers the content of a markdown fence when one is present, then takes
/// the text between the first `{` and the last `}`.
pub fn extract_json_object(raw: &str) -> String {
    let trimmed = raw.trim();
    let body = fence_regex()
        .and_then(|re| re.captures(trimmed))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim())
        .unwrap_or(trimmed);

    if let (Some(start), Some(end)) = (body.find('{'), body.rfind('}')) {
        if start < end {
            return body[start..=end].to_string();
        }
    }
    body.to_string()
}

fn decode<T: DeserializeOwned>(raw: &str) -> Result<T, String> {
    let json = extract_json_object(raw);
    serde_json::from_str(&json).map_err(|e| format!("response does not match schema: {}", e))
}

/// Parse a generation answer into at most `count` profiles with fresh ids.
///
/// Excess candidates are truncated; a deficit is returned as-is. Any
/// candidate violating a range constraint rejects the whole answer.
pub fn parse_generation(raw: &str, count: usize) -> Result<Vec<CandidateProfile>, String> {
    let response: GenerationResponse = decode(raw)?;
    let profiles: Vec<CandidateProfile> = response
        .candidates
        .into_iter()
        .take(count)
        .map(|c| c.into_profile(uuid::Uuid::new_v4().to_string()))
        .collect();

    let violations: Vec<String> = profiles
        .iter()
        .filter_map(|p| p.validate().err())
        .flatten()
        .collect();
    if !violations.is_empty() {
        return Err(violations.join("; "));
    }
    Ok(profiles)
}

/// Parse an evaluation answer. Any out-of-range score rejects the whole answer.
pub fn parse_evaluation(raw: &str) -> Result<Vec<CandidateEvaluation>, String> {
    let response: EvaluationResponse = decode(raw)?;
    let evaluations: Vec<CandidateEvaluation> = response
        .evaluations
        .into_iter()
        .map(CandidateEvaluation::from)
        .collect();
    let violations: Vec<String> = evaluations
        .iter()
        .filter_map(|e| e.validate().err())
        .collect();
    if !violations.is_empty() {
        return Err(violations.join("; "));
    }
    Ok(evaluations)
}

pub fn parse_analysis(raw: &str) -> Result<FeedbackAnalysis, String> {
    let response: AnalysisResponse = decode(raw)?;
    let analysis = FeedbackAnalysis::from(response);
    analysis.validate()?;
    Ok(analysis)
}

pub fn parse_refinement(raw: &str) -> Result<CriteriaRefinement, String> {
    let response: RefinementResponse = decode(raw)?;
    let refinement = CriteriaRefinement::from(response);
    refinement.validate().map_err(|v| v.join("; "))?;
    Ok(refinement)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate_json(name: &str, score: f64) -> String {
        format!(
            r#"{{"name":"{name}","skills":["React"],"experience":{{"years":6,"summary":"Frontend","highlights":[]}},"matchScore":{score},"reasoning":"fits"}}"#
        )
    }

    fn generation_json(n: usize) -> String {
        let items: Vec<String> = (0..n).map(|i| candidate_json(&format!("C{i}"), 80.0)).collect();
        format!(r#"{{"candidates":[{}]}}"#, items.join(","))
    }

    #[test]
    fn test_extract_strips_fences_and_prose() {
        assert_eq!(extract_json_object("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(
            extract_json_object("Sure! Here it is: {\"a\":{\"b\":2}} Thanks"),
            "{\"a\":{\"b\":2}}"
        );
        assert_eq!(extract_json_object("no json here"), "no json here");
    }

    #[test]
    fn test_generation_truncates_excess() {
        let profiles = parse_generation(&generation_json(7), 5).unwrap();
        assert_eq!(profiles.len(), 5);
        assert_eq!(profiles[0].name, "C0");
    }

    #[test]
    fn test_generation_accepts_deficit() {
        assert_eq!(parse_generation(&generation_json(3), 5).unwrap().len(), 3);
    }

    #[test]
    fn test_generation_assigns_unique_ids() {
        let profiles = parse_generation(&generation_json(4), 10).unwrap();
        let mut ids: Vec<&str> = profiles.iter().map(|p| p.id.as_str()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 4);
        assert!(uuid::Uuid::parse_str(ids[0]).is_ok());
    }

    #[test]
    fn test_generation_rejects_out_of_range_score() {
        let raw = format!(r#"{{"candidates":[{}]}}"#, candidate_json("Over", 140.0));
        let err = parse_generation(&raw, 5).unwrap_err();
        assert!(err.contains("match score"), "{err}");
    }

    #[test]
    fn test_generation_rejects_missing_fields() {
        let err = parse_generation(r#"{"candidates":[{"name":"x"}]}"#, 5).unwrap_err();
        assert!(err.contains("does not match schema"));
        assert!(parse_generation("I cannot help with that", 5).is_err());
    }

    #[test]
    fn test_evaluation_parses_scoring_details() {
        let raw = r#"{"evaluations":[{"candidateId":"a","matchScore":91,"reasoning":"Deep React","scoringDetails":{"skillsScore":95,"experienceScore":88,"achievementsScore":90,"culturalScore":80,"scoreBreakdown":"strong"}}]}"#;
        let evaluations = parse_evaluation(raw).unwrap();
        assert_eq!(evaluations.len(), 1);
        assert_eq!(evaluations[0].candidate_id, "a");
        let details = evaluations[0].scoring_details.as_ref().unwrap();
        assert_eq!(details.skills_score, 95.0);
        assert!(details.leadership_score.is_none());
    }

    #[test]
    fn test_evaluation_rejects_out_of_range_score() {
        let raw = r#"{"evaluations":[{"candidateId":"a","matchScore":130,"reasoning":"x"}]}"#;
        assert!(parse_evaluation(raw).unwrap_err().contains("outside 0..=100"));
        assert!(parse_evaluation(r#"{"scores":[]}"#).is_err());
    }

    #[test]
    fn test_analysis_confidence_range() {
        let ok = r#"{"patterns":{"positivePatterns":["Strong technical skills"]},"recommendations":{"skillsToEmphasize":["React"]},"confidence":0.8}"#;
        let analysis = parse_analysis(ok).unwrap();
        assert_eq!(analysis.recommendations.skills_to_emphasize, vec!["React".to_string()]);

        let bad = r#"{"patterns":{},"recommendations":{},"confidence":1.5}"#;
        assert!(parse_analysis(bad).is_err());
    }

    #[test]
    fn test_refinement_roundtrip_into_domain() {
        let raw = r#"```json
        {
          "refinedCriteria": {
            "requiredSkills": [{"skill": "React", "importance": 5, "reason": "praised"}],
            "experienceLevel": {"minYears": 5, "maxYears": 10, "reason": "senior"},
            "adjustments": [{"aspect": "React", "change": "increased", "reason": "praised"}]
          },
          "explanation": "Emphasize React"
        }
        ```"#;
        let refinement = parse_refinement(raw).unwrap();
        assert_eq!(refinement.refined_criteria.required_skills[0].importance, 5);
        assert_eq!(
            refinement.refined_criteria.adjustments[0].change,
            AdjustmentDirection::Increased
        );
    }

    #[test]
    fn test_refinement_rejects_bad_importance() {
        let raw = r#"{"refinedCriteria":{"requiredSkills":[{"skill":"React","importance":9,"reason":"x"}],"experienceLevel":{"minYears":5,"maxYears":10,"reason":"x"}},"explanation":"x"}"#;
        assert!(parse_refinement(raw).unwrap_err().contains("importance"));
    }

    #[test]
    fn test_schema_mentions_wire_names() {
        let schema = schema_json::<GenerationResponse>();
        assert!(schema.contains("matchScore"));
        let schema = schema_json::<EvaluationResponse>();
        assert!(schema.contains("candidateId"));
        let schema = schema_json::<RefinementResponse>();
        assert!(schema.contains("refinedCriteria"));
        assert!(schema.contains("increased"));
    }
}
