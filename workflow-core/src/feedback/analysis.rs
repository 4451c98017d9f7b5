//! Feedback analysis value types.
//!
//! An analysis is recomputed from the full feedback set every time it is
//! needed; analyses are never merged incrementally.

use serde::{Deserialize, Serialize};

use super::types::CandidateFeedback;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackPatterns {
    pub positive_patterns: Vec<String>,
    pub negative_patterns: Vec<String>,
    pub skill_gaps: Vec<String>,
    pub cultural_insights: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackRecommendations {
    pub skills_to_emphasize: Vec<String>,
    pub skills_to_deemphasize: Vec<String>,
    pub experience_adjustments: Vec<String>,
    pub cultural_fit_adjustments: Vec<String>,
}

/// Structured patterns extracted from a feedback set.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FeedbackAnalysis {
    pub patterns: FeedbackPatterns,
    pub recommendations: FeedbackRecommendations,
    /// Model confidence in [0, 1].
    pub confidence: f64,
}

impl FeedbackAnalysis {
    /// The "no signal" analysis returned for empty feedback.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns == FeedbackPatterns::default()
            && self.recommendations == FeedbackRecommendations::default()
    }

    /// Any skill gap, cultural insight or concrete recommendation present.
    pub fn has_actionable_signal(&self) -> bool {
        let p = &self.patterns;
        let r = &self.recommendations;
        !p.skill_gaps.is_empty()
            || !p.cultural_insights.is_empty()
            || !r.skills_to_emphasize.is_empty()
            || !r.skills_to_deemphasize.is_empty()
            || !r.experience_adjustments.is_empty()
    }

    pub fn validate(&self) -> Result<(), String> {
        if !self.confidence.is_finite() || !(0.0..=1.0).contains(&self.confidence) {
            return Err(format!("confidence {} outside 0..=1", self.confidence));
        }
        Ok(())
    }
}

/// How strongly a feedback set should pull each criteria category.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackImpact {
    pub skills_impact: f64,
    pub experience_impact: f64,
    pub cultural_impact: f64,
    pub overall_confidence: f64,
}

impl FeedbackImpact {
    /// Weighted impact per category.
    ///
    /// Skills: 0.2 per skill to emphasize. Experience: 0.3 × share of
    /// feedback carrying criterion scores. Cultural: 0.25 per cultural
    /// insight. Empty feedback yields zero impact.
    pub fn compute(feedback: &[CandidateFeedback], analysis: &FeedbackAnalysis) -> Self {
        if feedback.is_empty() {
            return Self::default();
        }
        let scored = feedback.iter().filter(|f| f.has_scores()).count();
        Self {
            skills_impact: analysis.recommendations.skills_to_emphasize.len() as f64 * 0.2,
            experience_impact: (scored as f64 / feedback.len() as f64) * 0.3,
            cultural_impact: analysis.patterns.cultural_insights.len() as f64 * 0.25,
            overall_confidence: analysis.confidence,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn confident_analysis(confidence: f64) -> FeedbackAnalysis {
        FeedbackAnalysis {
            patterns: FeedbackPatterns {
                positive_patterns: vec!["Strong technical skills".into()],
                cultural_insights: vec!["Values teamwork".into()],
                ..Default::default()
            },
            recommendations: FeedbackRecommendations {
                skills_to_emphasize: vec!["React".into()],
                ..Default::default()
            },
            confidence,
        }
    }

    #[test]
    fn test_empty_analysis() {
        let a = FeedbackAnalysis::empty();
        assert!(a.is_empty());
        assert_eq!(a.confidence, 0.0);
        assert!(!a.has_actionable_signal());
    }

    #[test]
    fn test_actionable_signal() {
        assert!(confident_analysis(0.8).has_actionable_signal());
    }

    #[test]
    fn test_confidence_bounds() {
        assert!(confident_analysis(1.0).validate().is_ok());
        assert!(confident_analysis(1.2).validate().is_err());
        assert!(confident_analysis(f64::NAN).validate().is_err());
    }

    #[test]
    fn test_impact() {
        let feedback = vec![
            CandidateFeedback::positive("c1", "good").with_score("skills", 4, None),
            CandidateFeedback::negative("c2", "bad"),
        ];
        let impact = FeedbackImpact::compute(&feedback, &confident_analysis(0.85));
        assert!((impact.skills_impact - 0.2).abs() < 1e-9);
        assert!((impact.experience_impact - 0.15).abs() < 1e-9);
        assert!((impact.cultural_impact - 0.25).abs() < 1e-9);
        assert!((impact.overall_confidence - 0.85).abs() < 1e-9);

        assert_eq!(
            FeedbackImpact::compute(&[], &confident_analysis(0.9)),
            FeedbackImpact::default()
        );
    }

    #[test]
    fn test_analysis_wire_shape() {
        let json = r#"{
            "patterns": {"positivePatterns": ["a"], "negativePatterns": [], "skillGaps": [], "culturalInsights": []},
            "recommendations": {"skillsToEmphasize": [], "skillsToDeemphasize": [], "experienceAdjustments": [], "culturalFitAdjustments": []},
            "confidence": 0.8
        }"#;
        let a: FeedbackAnalysis = serde_json::from_str(json).unwrap();
        assert_eq!(a.patterns.positive_patterns, vec!["a".to_string()]);
        assert!(!a.is_empty());
    }
}
