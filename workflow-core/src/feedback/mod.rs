//! Human Feedback Module
//!
//! Feedback arrives as an already-collected batch of per-candidate verdicts.
//! It is validated against the most recent candidate batch, recorded in an
//! append-only log, then condensed into a `FeedbackAnalysis` by the model.
//!
//! ```text
//! [CandidateFeedback] → validate → FeedbackRecord (log) → analyzer → FeedbackAnalysis
//! ```

pub mod analysis;
pub mod types;

pub use analysis::{FeedbackAnalysis, FeedbackImpact, FeedbackPatterns, FeedbackRecommendations};
pub use types::{
    validate_feedback_batch, CandidateFeedback, CriterionScore, FeedbackRecord, FeedbackSummary,
};
