//! Refinement decider: whether this iteration's feedback should refine the
//! criteria and continue the loop, or terminate it.
//!
//! Termination is the default; refinement is the exception that continues.
//!
//! | Condition                                   | Refine | Reason               |
//! |---------------------------------------------|--------|----------------------|
//! | no feedback                                 | no     | `NoFeedback`         |
//! | `iteration_count >= max_iterations`         | no     | `IterationCapReached`|
//! | below cap, `confidence >= threshold`        | yes    | `ConfidentSignal`    |
//! | below cap, `confidence < threshold`         | yes    | `BelowIterationCap`  |
//!
//! Pure and deterministic: no I/O, no clock, no randomness.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::feedback::{CandidateFeedback, FeedbackAnalysis};
use crate::state::DEFAULT_MAX_ITERATIONS;

/// Default analysis confidence considered a strong signal.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.7;

/// Why the decider answered the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    NoFeedback,
    IterationCapReached,
    ConfidentSignal,
    BelowIterationCap,
}

impl fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoFeedback => write!(f, "no feedback"),
            Self::IterationCapReached => write!(f, "iteration cap reached"),
            Self::ConfidentSignal => write!(f, "confident feedback signal"),
            Self::BelowIterationCap => write!(f, "below iteration cap"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefinementDecision {
    pub refine: bool,
    pub reason: DecisionReason,
}

/// Refinement policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefinementDecider {
    pub max_iterations: u32,
    pub confidence_threshold: f64,
}

impl Default for RefinementDecider {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
        }
    }
}

impl RefinementDecider {
    pub fn new(max_iterations: u32, confidence_threshold: f64) -> Self {
        Self {
            max_iterations,
            confidence_threshold,
        }
    }

    /// Decide for the feedback judging the batch generated at `iteration_count`.
    pub fn decide(
        &self,
        feedback: &[CandidateFeedback],
        analysis: &FeedbackAnalysis,
        iteration_count: u32,
    ) -> RefinementDecision {
        let (refine, reason) = if feedback.is_empty() {
            (false, DecisionReason::NoFeedback)
        } else if iteration_count >= self.max_iterations {
            (false, DecisionReason::IterationCapReached)
        } else if analysis.confidence >= self.confidence_threshold {
            (true, DecisionReason::ConfidentSignal)
        } else {
            (true, DecisionReason::BelowIterationCap)
        };
        RefinementDecision { refine, reason }
    }

    pub fn should_refine(
        &self,
        feedback: &[CandidateFeedback],
        analysis: &FeedbackAnalysis,
        iteration_count: u32,
    ) -> bool {
        self.decide(feedback, analysis, iteration_count).refine
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feedback::analysis::tests::confident_analysis;

    fn one_positive() -> Vec<CandidateFeedback> {
        vec![CandidateFeedback::positive("1", "Strong technical skills")]
    }

    #[test]
    fn test_empty_feedback_never_refines() {
        let decider = RefinementDecider::default();
        for iteration in 0..6 {
            for confidence in [0.0, 0.5, 1.0] {
                let decision = decider.decide(&[], &confident_analysis(confidence), iteration);
                assert!(!decision.refine);
                assert_eq!(decision.reason, DecisionReason::NoFeedback);
            }
        }
    }

    #[test]
    fn test_cap_forces_termination_regardless_of_confidence() {
        let decider = RefinementDecider::default();
        let decision = decider.decide(&one_positive(), &confident_analysis(1.0), 4);
        assert!(!decision.refine);
        assert_eq!(decision.reason, DecisionReason::IterationCapReached);
        assert!(!decider.should_refine(&one_positive(), &confident_analysis(1.0), 7));
    }

    #[test]
    fn test_confident_signal_below_cap() {
        let decider = RefinementDecider::default();
        let decision = decider.decide(&one_positive(), &confident_analysis(0.8), 1);
        assert!(decision.refine);
        assert_eq!(decision.reason, DecisionReason::ConfidentSignal);
    }

    #[test]
    fn test_low_confidence_below_cap_still_refines() {
        let decider = RefinementDecider::default();
        let decision = decider.decide(&one_positive(), &FeedbackAnalysis::empty(), 3);
        assert!(decision.refine);
        assert_eq!(decision.reason, DecisionReason::BelowIterationCap);
    }

    #[test]
    fn test_deterministic() {
        let decider = RefinementDecider::new(2, 0.5);
        let a = decider.decide(&one_positive(), &confident_analysis(0.6), 1);
        let b = decider.decide(&one_positive(), &confident_analysis(0.6), 1);
        assert_eq!(a, b);
    }
}
