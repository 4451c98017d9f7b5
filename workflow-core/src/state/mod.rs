//! Workflow state: phase machine, snapshots, and persistence
//!
//! # Architecture
//!
//! A workflow is one [`WorkflowState`] snapshot per job description plus
//! three append-only logs kept beside it:
//!
//! - `feedback`: every [`FeedbackRecord`](crate::FeedbackRecord), keyed by
//!   `(job, iteration, candidate)`
//! - `candidates`: one [`CandidateBatch`](crate::CandidateBatch) per `(job, iteration)`
//! - `refinements`: one [`RefinementRecord`] per `(job, iteration)`
//!
//! Snapshots change only through the pure step functions in [`machine`] and
//! are persisted with compare-and-swap on `version`.
//!
//! # Usage
//!
//! ```
//! use workflow_core::{
//!     begin_generation, finish_generation, InMemoryWorkflowStore, SelectionCriteria,
//!     WorkflowState, WorkflowStore,
//! };
//!
//! let store = InMemoryWorkflowStore::new();
//! let criteria = SelectionCriteria::new().require_skill("React", 4);
//! let state = store.insert_state_if_absent(&WorkflowState::new("job-1", criteria))?;
//!
//! let evaluating = finish_generation(&begin_generation(&state)?)?;
//! let stored = store.replace_state(&evaluating, state.version)?;
//! assert_eq!(stored.version, 2);
//! # Ok::<(), workflow_core::WorkflowError>(())
//! ```

pub mod file_store;
pub mod machine;
#[cfg(feature = "heavy-state")]
pub mod rocks;
pub mod schema;
pub mod store;
pub mod types;

pub use file_store::FileWorkflowStore;
pub use machine::{
    apply_feedback_outcome, begin_generation, candidates_for_iteration, finish_generation,
    is_final_iteration, FeedbackOutcome, IllegalTransition, DEFAULT_MAX_ITERATIONS,
    FINAL_CANDIDATE_COUNT, ROUND_CANDIDATE_COUNT,
};
#[cfg(feature = "heavy-state")]
pub use rocks::RocksWorkflowStore;
pub use store::{InMemoryWorkflowStore, SharedWorkflowStore, StoreError, StoreResult, WorkflowStore};
pub use types::{JobDescription, JobId, RefinementRecord, WorkflowPhase, WorkflowState};
