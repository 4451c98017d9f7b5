//! Selection criteria and the refinement delta.
//!
//! `SelectionCriteria` is the baseline set once at initialization and never
//! mutated. `CriteriaRefinement` is what the refiner produces; each new
//! refinement replaces the previous one wholesale. `EffectiveCriteria` picks
//! whichever of the two the next generation round should use.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Default importance for skills/attributes given as bare strings.
pub const DEFAULT_IMPORTANCE: u8 = 3;
/// Importance scale bounds (inclusive).
pub const MIN_IMPORTANCE: u8 = 1;
pub const MAX_IMPORTANCE: u8 = 5;

fn default_importance() -> u8 {
    DEFAULT_IMPORTANCE
}

fn importance_in_range(value: u8) -> bool {
    (MIN_IMPORTANCE..=MAX_IMPORTANCE).contains(&value)
}

// ============================================================================
// Baseline criteria
// ============================================================================

/// A skill with an importance on the 1–5 scale.
///
/// Deserializes from either `"React"` or `{"skill": "React", "importance": 5}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "SkillRequirementRepr")]
pub struct SkillRequirement {
    pub skill: String,
    pub importance: u8,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SkillRequirementRepr {
    Name(String),
    Full {
        skill: String,
        #[serde(default = "default_importance", alias = "weight")]
        importance: u8,
    },
}

impl From<SkillRequirementRepr> for SkillRequirement {
    fn from(repr: SkillRequirementRepr) -> Self {
        match repr {
            SkillRequirementRepr::Name(skill) => Self::new(skill, DEFAULT_IMPORTANCE),
            SkillRequirementRepr::Full { skill, importance } => Self::new(skill, importance),
        }
    }
}

impl SkillRequirement {
    pub fn new(skill: impl Into<String>, importance: u8) -> Self {
        Self {
            skill: skill.into(),
            importance,
        }
    }
}

/// A cultural or leadership attribute with an importance on the 1–5 scale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "CulturalAttributeRepr")]
pub struct CulturalAttribute {
    pub attribute: String,
    pub importance: u8,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CulturalAttributeRepr {
    Name(String),
    Full {
        attribute: String,
        #[serde(default = "default_importance", alias = "weight")]
        importance: u8,
    },
}

impl From<CulturalAttributeRepr> for CulturalAttribute {
    fn from(repr: CulturalAttributeRepr) -> Self {
        match repr {
            CulturalAttributeRepr::Name(attribute) => Self::new(attribute, DEFAULT_IMPORTANCE),
            CulturalAttributeRepr::Full {
                attribute,
                importance,
            } => Self::new(attribute, importance),
        }
    }
}

impl CulturalAttribute {
    pub fn new(attribute: impl Into<String>, importance: u8) -> Self {
        Self {
            attribute: attribute.into(),
            importance,
        }
    }
}

/// Years-of-experience bounds.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperienceBounds {
    #[serde(default)]
    pub min_years: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_years: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_years: Option<u32>,
}

/// Relative weight of each scoring category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoringWeights {
    pub skills: f64,
    pub experience: f64,
    pub achievements: f64,
    pub cultural: f64,
    pub leadership: f64,
}

impl ScoringWeights {
    fn all(&self) -> [(&'static str, f64); 5] {
        [
            ("skills", self.skills),
            ("experience", self.experience),
            ("achievements", self.achievements),
            ("cultural", self.cultural),
            ("leadership", self.leadership),
        ]
    }
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            skills: 0.3,
            experience: 0.2,
            achievements: 0.2,
            cultural: 0.2,
            leadership: 0.1,
        }
    }
}

/// Baseline selection criteria for a job description.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionCriteria {
    #[serde(default)]
    pub required_skills: Vec<SkillRequirement>,
    #[serde(default)]
    pub preferred_skills: Vec<SkillRequirement>,
    #[serde(default)]
    pub experience: ExperienceBounds,
    #[serde(default)]
    pub cultural_attributes: Vec<CulturalAttribute>,
    #[serde(default)]
    pub leadership_attributes: Vec<CulturalAttribute>,
    #[serde(default)]
    pub weights: ScoringWeights,
}

impl SelectionCriteria {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn require_skill(mut self, skill: impl Into<String>, importance: u8) -> Self {
        self.required_skills
            .push(SkillRequirement::new(skill, importance));
        self
    }

    pub fn prefer_skill(mut self, skill: impl Into<String>, importance: u8) -> Self {
        self.preferred_skills
            .push(SkillRequirement::new(skill, importance));
        self
    }

    pub fn min_years(mut self, years: u32) -> Self {
        self.experience.min_years = years;
        self
    }

    pub fn max_years(mut self, years: u32) -> Self {
        self.experience.max_years = Some(years);
        self
    }

    pub fn cultural(mut self, attribute: impl Into<String>, importance: u8) -> Self {
        self.cultural_attributes
            .push(CulturalAttribute::new(attribute, importance));
        self
    }

    /// Check structural validity. Returns every violation, not just the first.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut violations = Vec::new();

        for (list, label) in [
            (&self.required_skills, "required skill"),
            (&self.preferred_skills, "preferred skill"),
        ] {
            for s in list {
                if s.skill.trim().is_empty() {
                    violations.push(format!("{label} name is empty"));
                }
                if !importance_in_range(s.importance) {
                    violations.push(format!(
                        "{label} '{}' importance {} outside {MIN_IMPORTANCE}..={MAX_IMPORTANCE}",
                        s.skill, s.importance
                    ));
                }
            }
        }

        for (list, label) in [
            (&self.cultural_attributes, "cultural attribute"),
            (&self.leadership_attributes, "leadership attribute"),
        ] {
            for a in list {
                if a.attribute.trim().is_empty() {
                    violations.push(format!("{label} name is empty"));
                }
                if !importance_in_range(a.importance) {
                    violations.push(format!(
                        "{label} '{}' importance {} outside {MIN_IMPORTANCE}..={MAX_IMPORTANCE}",
                        a.attribute, a.importance
                    ));
                }
            }
        }

        let exp = &self.experience;
        if let Some(max) = exp.max_years {
            if exp.min_years > max {
                violations.push(format!(
                    "minimum years {} exceeds maximum years {max}",
                    exp.min_years
                ));
            }
            if let Some(preferred) = exp.preferred_years {
                if preferred > max {
                    violations.push(format!(
                        "preferred years {preferred} exceeds maximum years {max}"
                    ));
                }
            }
        }

        let weights = self.weights.all();
        for (name, w) in weights {
            if !(0.0..=1.0).contains(&w) {
                violations.push(format!("{name} weight {w} outside 0..=1"));
            }
        }
        if weights.iter().map(|(_, w)| w).sum::<f64>() <= 0.0 {
            violations.push("scoring weights sum to zero".to_string());
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations)
        }
    }
}

// ============================================================================
// Refinement delta
// ============================================================================

/// A refined skill with the justification the model gave for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefinedSkill {
    pub skill: String,
    pub importance: u8,
    pub reason: String,
}

/// A refined cultural attribute with its justification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefinedAttribute {
    pub attribute: String,
    pub importance: u8,
    pub reason: String,
}

/// Refined experience range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefinedExperience {
    pub min_years: u32,
    pub max_years: u32,
    pub reason: String,
}

/// Direction of a single criteria adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdjustmentDirection {
    Increased,
    Decreased,
    Unchanged,
}

impl fmt::Display for AdjustmentDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Increased => write!(f, "increased"),
            Self::Decreased => write!(f, "decreased"),
            Self::Unchanged => write!(f, "unchanged"),
        }
    }
}

/// One documented change relative to the previous criteria.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Adjustment {
    pub aspect: String,
    pub change: AdjustmentDirection,
    pub reason: String,
}

/// The full set of refined criteria fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefinedCriteria {
    pub required_skills: Vec<RefinedSkill>,
    pub preferred_skills: Vec<RefinedSkill>,
    pub experience_level: RefinedExperience,
    pub cultural_attributes: Vec<RefinedAttribute>,
    #[serde(default)]
    pub adjustments: Vec<Adjustment>,
}

/// A complete criteria replacement produced by the refiner.
///
/// Never merged with a previous refinement: the newest one wins in full.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CriteriaRefinement {
    pub refined_criteria: RefinedCriteria,
    pub explanation: String,
}

impl CriteriaRefinement {
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut violations = Vec::new();
        let rc = &self.refined_criteria;

        for (list, label) in [
            (&rc.required_skills, "required skill"),
            (&rc.preferred_skills, "preferred skill"),
        ] {
            for s in list {
                if s.skill.trim().is_empty() {
                    violations.push(format!("{label} name is empty"));
                }
                if !importance_in_range(s.importance) {
                    violations.push(format!(
                        "{label} '{}' importance {} outside {MIN_IMPORTANCE}..={MAX_IMPORTANCE}",
                        s.skill, s.importance
                    ));
                }
            }
        }

        for a in &rc.cultural_attributes {
            if a.attribute.trim().is_empty() {
                violations.push("cultural attribute name is empty".to_string());
            }
            if !importance_in_range(a.importance) {
                violations.push(format!(
                    "cultural attribute '{}' importance {} outside {MIN_IMPORTANCE}..={MAX_IMPORTANCE}",
                    a.attribute, a.importance
                ));
            }
        }

        let exp = &rc.experience_level;
        if exp.min_years > exp.max_years {
            violations.push(format!(
                "refined minimum years {} exceeds maximum years {}",
                exp.min_years, exp.max_years
            ));
        }

        if self.explanation.trim().is_empty() {
            violations.push("refinement explanation is empty".to_string());
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations)
        }
    }
}

// ============================================================================
// Effective criteria
// ============================================================================

/// The criteria the next generation round runs against.
#[derive(Debug, Clone, Copy)]
pub enum EffectiveCriteria<'a> {
    Baseline(&'a SelectionCriteria),
    Refined(&'a CriteriaRefinement),
}

fn join_or_none<I: IntoIterator<Item = String>>(items: I) -> String {
    let joined = items.into_iter().collect::<Vec<_>>().join(", ");
    if joined.is_empty() {
        "None specified".to_string()
    } else {
        joined
    }
}

impl<'a> EffectiveCriteria<'a> {
    pub fn is_refined(&self) -> bool {
        matches!(self, Self::Refined(_))
    }

    /// Human-readable criteria lines embedded in the generation prompt.
    pub fn selection_lines(&self) -> Vec<String> {
        match self {
            Self::Baseline(c) => {
                let exp = &c.experience;
                let experience = match exp.max_years {
                    Some(max) => format!("Experience Level: {}-{} years", exp.min_years, max),
                    None => format!("Experience Level: {}+ years", exp.min_years),
                };
                vec![
                    format!(
                        "Required Skills: {}",
                        join_or_none(
                            c.required_skills
                                .iter()
                                .map(|s| format!("{} (importance {})", s.skill, s.importance))
                        )
                    ),
                    format!(
                        "Preferred Skills: {}",
                        join_or_none(
                            c.preferred_skills
                                .iter()
                                .map(|s| format!("{} (importance {})", s.skill, s.importance))
                        )
                    ),
                    experience,
                    format!(
                        "Cultural Attributes: {}",
                        join_or_none(c.cultural_attributes.iter().map(|a| a.attribute.clone()))
                    ),
                ]
            }
            Self::Refined(r) => {
                let rc = &r.refined_criteria;
                vec![
                    format!(
                        "Required Skills: {}",
                        join_or_none(
                            rc.required_skills
                                .iter()
                                .map(|s| format!("{} (importance {})", s.skill, s.importance))
                        )
                    ),
                    format!(
                        "Preferred Skills: {}",
                        join_or_none(
                            rc.preferred_skills
                                .iter()
                                .map(|s| format!("{} (importance {})", s.skill, s.importance))
                        )
                    ),
                    format!(
                        "Experience Level: {}-{} years",
                        rc.experience_level.min_years, rc.experience_level.max_years
                    ),
                    format!(
                        "Cultural Attributes: {}",
                        join_or_none(rc.cultural_attributes.iter().map(|a| a.attribute.clone()))
                    ),
                ]
            }
        }
    }

    /// JSON rendering used by the refinement prompt.
    pub fn to_json(&self) -> serde_json::Value {
        let value = match self {
            Self::Baseline(c) => serde_json::to_value(c),
            Self::Refined(r) => serde_json::to_value(r),
        };
        value.unwrap_or(serde_json::Value::Null)
    }

    pub fn summary(&self) -> CriteriaSummary {
        CriteriaSummary::from(*self)
    }
}

/// One row of a criteria summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryItem {
    pub name: String,
    pub importance: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Flattened display view of whichever criteria are in effect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CriteriaSummary {
    pub refined: bool,
    pub required_skills: Vec<SummaryItem>,
    pub preferred_skills: Vec<SummaryItem>,
    pub min_years: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_years: Option<u32>,
    pub cultural_attributes: Vec<SummaryItem>,
    pub adjustments: Vec<Adjustment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

impl<'a> From<EffectiveCriteria<'a>> for CriteriaSummary {
    fn from(criteria: EffectiveCriteria<'a>) -> Self {
        match criteria {
            EffectiveCriteria::Baseline(c) => {
                let skills = |list: &[SkillRequirement]| {
                    list.iter()
                        .map(|s| SummaryItem {
                            name: s.skill.clone(),
                            importance: s.importance,
                            reason: None,
                        })
                        .collect()
                };
                Self {
                    refined: false,
                    required_skills: skills(&c.required_skills),
                    preferred_skills: skills(&c.preferred_skills),
                    min_years: c.experience.min_years,
                    max_years: c.experience.max_years,
                    cultural_attributes: c
                        .cultural_attributes
                        .iter()
                        .map(|a| SummaryItem {
                            name: a.attribute.clone(),
                            importance: a.importance,
                            reason: None,
                        })
                        .collect(),
                    adjustments: Vec::new(),
                    explanation: None,
                }
            }
            EffectiveCriteria::Refined(r) => {
                let rc = &r.refined_criteria;
                let skills = |list: &[RefinedSkill]| {
                    list.iter()
                        .map(|s| SummaryItem {
                            name: s.skill.clone(),
                            importance: s.importance,
                            reason: Some(s.reason.clone()),
                        })
                        .collect()
                };
                Self {
                    refined: true,
                    required_skills: skills(&rc.required_skills),
                    preferred_skills: skills(&rc.preferred_skills),
                    min_years: rc.experience_level.min_years,
                    max_years: Some(rc.experience_level.max_years),
                    cultural_attributes: rc
                        .cultural_attributes
                        .iter()
                        .map(|a| SummaryItem {
                            name: a.attribute.clone(),
                            importance: a.importance,
                            reason: Some(a.reason.clone()),
                        })
                        .collect(),
                    adjustments: rc.adjustments.clone(),
                    explanation: Some(r.explanation.clone()),
                }
            }
        }
    }
}
