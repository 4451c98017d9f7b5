//! Workflow state store adapter
//!
//! One trait, three backends:
//! - [`InMemoryWorkflowStore`]: tests and embedding
//! - [`FileWorkflowStore`](super::FileWorkflowStore): JSON documents in a directory
//! - `RocksWorkflowStore`: RocksDB column families (`heavy-state` feature)
//!
//! Snapshots are swapped with compare-and-swap on `WorkflowState::version`.
//! Feedback, candidate batches and refinements are append-only logs.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use super::types::{JobDescription, RefinementRecord, WorkflowState};
use crate::candidate::CandidateBatch;
use crate::feedback::{CandidateFeedback, FeedbackRecord};

/// Error type for store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[cfg(feature = "heavy-state")]
    #[error("RocksDB error: {0}")]
    RocksDb(#[from] rocksdb::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Key not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Version conflict for job {job_description_id}: expected {expected}, found {found}")]
    VersionConflict {
        job_description_id: String,
        expected: u64,
        found: u64,
    },

    #[error("Lock poisoned")]
    LockPoisoned,

    #[error("Column family not found: {0}")]
    ColumnFamilyNotFound(String),
}

impl StoreError {
    /// Whether the failed call may succeed if repeated.
    pub fn is_retriable(&self) -> bool {
        match self {
            #[cfg(feature = "heavy-state")]
            Self::RocksDb(_) => true,
            Self::Io(_) | Self::VersionConflict { .. } => true,
            _ => false,
        }
    }
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Shared reference to a workflow store
pub type SharedWorkflowStore = Arc<dyn WorkflowStore>;

/// Persistence seam for workflows.
///
/// All methods are synchronous and short; callers in async code hold no
/// store borrow across an await.
pub trait WorkflowStore: Send + Sync {
    // Job descriptions ------------------------------------------------------

    fn put_job_description(&self, job: &JobDescription) -> StoreResult<()>;

    fn get_job_description(&self, job_id: &str) -> StoreResult<Option<JobDescription>>;

    // Snapshots -------------------------------------------------------------

    fn get_state(&self, job_id: &str) -> StoreResult<Option<WorkflowState>>;

    /// Insert `state` unless a snapshot already exists; either way return
    /// the snapshot now stored.
    fn insert_state_if_absent(&self, state: &WorkflowState) -> StoreResult<WorkflowState>;

    /// Replace the stored snapshot if its version equals `expected_version`.
    ///
    /// The stored copy gets `version = expected_version + 1` and is returned.
    fn replace_state(&self, state: &WorkflowState, expected_version: u64)
        -> StoreResult<WorkflowState>;

    // Feedback log ----------------------------------------------------------

    /// Record feedback on the batch generated at `iteration`. Entries already
    /// recorded for the same candidate and iteration are skipped. Returns how
    /// many entries were new.
    fn append_feedback(
        &self,
        job_id: &str,
        iteration: u32,
        feedback: &[CandidateFeedback],
    ) -> StoreResult<usize>;

    /// All recorded feedback for a job, oldest iteration first.
    fn load_feedback(&self, job_id: &str) -> StoreResult<Vec<FeedbackRecord>>;

    // Candidate log ---------------------------------------------------------

    /// Fails with `AlreadyExists` if a batch for `(job, iteration)` exists.
    fn append_candidates(&self, batch: &CandidateBatch) -> StoreResult<()>;

    fn get_candidates(&self, job_id: &str, iteration: u32) -> StoreResult<Option<CandidateBatch>>;

    /// All batches for a job, ordered by iteration.
    fn list_batches(&self, job_id: &str) -> StoreResult<Vec<CandidateBatch>>;

    // Refinement history ----------------------------------------------------

    /// Record the refinement derived from the feedback on `record.iteration`.
    /// A second record for the same iteration is ignored.
    fn append_refinement(&self, record: &RefinementRecord) -> StoreResult<()>;

    fn list_refinements(&self, job_id: &str) -> StoreResult<Vec<RefinementRecord>>;
}

/// Shared compare-and-swap check used by every backend.
pub(crate) fn check_version(
    job_id: &str,
    stored: Option<&WorkflowState>,
    expected_version: u64,
) -> StoreResult<()> {
    match stored {
        None => Err(StoreError::NotFound(format!("workflow {}", job_id))),
        Some(current) if current.version != expected_version => Err(StoreError::VersionConflict {
            job_description_id: job_id.to_string(),
            expected: expected_version,
            found: current.version,
        }),
        Some(_) => Ok(()),
    }
}

/// Snapshot as it should be persisted after a successful swap.
pub(crate) fn next_version(state: &WorkflowState, expected_version: u64) -> WorkflowState {
    let mut next = state.clone();
    next.version = expected_version + 1;
    next
}

// ============================================================================
// In-memory backend
// ============================================================================

#[derive(Default)]
struct Tables {
    jobs: HashMap<String, JobDescription>,
    states: HashMap<String, WorkflowState>,
    feedback: HashMap<String, Vec<FeedbackRecord>>,
    batches: HashMap<String, BTreeMap<u32, CandidateBatch>>,
    refinements: HashMap<String, BTreeMap<u32, RefinementRecord>>,
}

/// Process-local store. Every operation takes one lock, so each call is atomic.
#[derive(Default)]
pub struct InMemoryWorkflowStore {
    tables: RwLock<Tables>,
}

impl InMemoryWorkflowStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared(self) -> SharedWorkflowStore {
        Arc::new(self)
    }

    fn read(&self) -> StoreResult<std::sync::RwLockReadGuard<'_, Tables>> {
        self.tables.read().map_err(|_| StoreError::LockPoisoned)
    }

    fn write(&self) -> StoreResult<std::sync::RwLockWriteGuard<'_, Tables>> {
        self.tables.write().map_err(|_| StoreError::LockPoisoned)
    }
}

impl WorkflowStore for InMemoryWorkflowStore {
    fn put_job_description(&self, job: &JobDescription) -> StoreResult<()> {
        self.write()?.jobs.insert(job.id.clone(), job.clone());
        Ok(())
    }

    fn get_job_description(&self, job_id: &str) -> StoreResult<Option<JobDescription>> {
        Ok(self.read()?.jobs.get(job_id).cloned())
    }

    fn get_state(&self, job_id: &str) -> StoreResult<Option<WorkflowState>> {
        Ok(self.read()?.states.get(job_id).cloned())
    }

    fn insert_state_if_absent(&self, state: &WorkflowState) -> StoreResult<WorkflowState> {
        let mut tables = self.write()?;
        let stored = tables
            .states
            .entry(state.job_description_id.clone())
            .or_insert_with(|| state.clone());
        Ok(stored.clone())
    }

    fn replace_state(
        &self,
        state: &WorkflowState,
        expected_version: u64,
    ) -> StoreResult<WorkflowState> {
        let mut tables = self.write()?;
        let job_id = state.job_description_id.as_str();
        check_version(job_id, tables.states.get(job_id), expected_version)?;
        let next = next_version(state, expected_version);
        tables.states.insert(job_id.to_string(), next.clone());
        Ok(next)
    }

    fn append_feedback(
        &self,
        job_id: &str,
        iteration: u32,
        feedback: &[CandidateFeedback],
    ) -> StoreResult<usize> {
        let mut tables = self.write()?;
        let log = tables.feedback.entry(job_id.to_string()).or_default();
        let mut added = 0;
        for f in feedback {
            let duplicate = log
                .iter()
                .any(|r| r.iteration == iteration && r.feedback.candidate_id == f.candidate_id);
            if !duplicate {
                log.push(FeedbackRecord::new(job_id, iteration, f.clone()));
                added += 1;
            }
        }
        Ok(added)
    }

    fn load_feedback(&self, job_id: &str) -> StoreResult<Vec<FeedbackRecord>> {
        let mut records = self
            .read()?
            .feedback
            .get(job_id)
            .cloned()
            .unwrap_or_default();
        records.sort_by_key(|r| r.iteration);
        Ok(records)
    }

    fn append_candidates(&self, batch: &CandidateBatch) -> StoreResult<()> {
        let mut tables = self.write()?;
        let batches = tables
            .batches
            .entry(batch.job_description_id.clone())
            .or_default();
        if batches.contains_key(&batch.iteration) {
            return Err(StoreError::AlreadyExists(format!(
                "candidates for job {} iteration {}",
                batch.job_description_id, batch.iteration
            )));
        }
        batches.insert(batch.iteration, batch.clone());
        Ok(())
    }

    fn get_candidates(&self, job_id: &str, iteration: u32) -> StoreResult<Option<CandidateBatch>> {
        Ok(self
            .read()?
            .batches
            .get(job_id)
            .and_then(|b| b.get(&iteration))
            .cloned())
    }

    fn list_batches(&self, job_id: &str) -> StoreResult<Vec<CandidateBatch>> {
        Ok(self
            .read()?
            .batches
            .get(job_id)
            .map(|b| b.values().cloned().collect())
            .unwrap_or_default())
    }

    fn append_refinement(&self, record: &RefinementRecord) -> StoreResult<()> {
        self.write()?
            .refinements
            .entry(record.job_description_id.clone())
            .or_default()
            .entry(record.iteration)
            .or_insert_with(|| record.clone());
        Ok(())
    }

    fn list_refinements(&self, job_id: &str) -> StoreResult<Vec<RefinementRecord>> {
        Ok(self
            .read()?
            .refinements
            .get(job_id)
            .map(|r| r.values().cloned().collect())
            .unwrap_or_default())
    }
}

/// Behavior every backend must share. Each backend's tests run these.
#[cfg(test)]
pub(crate) mod conformance {
    use super::*;
    use crate::candidate::tests::profile;
    use crate::criteria::tests::react_refinement;
    use crate::criteria::SelectionCriteria;
    use crate::state::WorkflowPhase;

    fn state(job: &str) -> WorkflowState {
        WorkflowState::new(job, SelectionCriteria::new().require_skill("React", 4))
    }

    pub(crate) fn job_descriptions(store: &dyn WorkflowStore) {
        assert!(store.get_job_description("job-1").unwrap().is_none());
        let job = JobDescription::new("job-1", "Senior Frontend Engineer", "React, TypeScript");
        store.put_job_description(&job).unwrap();
        assert_eq!(store.get_job_description("job-1").unwrap(), Some(job));
    }

    pub(crate) fn insert_if_absent_is_idempotent(store: &dyn WorkflowStore) {
        let first = store.insert_state_if_absent(&state("job-1")).unwrap();

        let mut other = state("job-1");
        other.scoring_criteria = SelectionCriteria::new().require_skill("Go", 5);
        let second = store.insert_state_if_absent(&other).unwrap();

        assert_eq!(first, second);
        assert_eq!(store.get_state("job-1").unwrap(), Some(first));
    }

    pub(crate) fn replace_state_is_compare_and_swap(store: &dyn WorkflowStore) {
        let stored = store.insert_state_if_absent(&state("job-1")).unwrap();
        assert_eq!(stored.version, 1);

        let mut next = stored.clone();
        next.current_phase = WorkflowPhase::Evaluating;
        let swapped = store.replace_state(&next, 1).unwrap();
        assert_eq!(swapped.version, 2);
        assert_eq!(store.get_state("job-1").unwrap().unwrap().version, 2);

        // The loser of a race still holds version 1.
        let err = store.replace_state(&next, 1).unwrap_err();
        match err {
            StoreError::VersionConflict { expected, found, .. } => {
                assert_eq!(expected, 1);
                assert_eq!(found, 2);
            }
            other => panic!("expected VersionConflict, got {other:?}"),
        }
        assert!(err_is_retriable(store, &next));

        let missing = store.replace_state(&state("nope"), 1).unwrap_err();
        assert!(matches!(missing, StoreError::NotFound(_)));
    }

    fn err_is_retriable(store: &dyn WorkflowStore, stale: &WorkflowState) -> bool {
        store
            .replace_state(stale, 1)
            .err()
            .is_some_and(|e| e.is_retriable())
    }

    pub(crate) fn feedback_log_is_idempotent(store: &dyn WorkflowStore) {
        let batch = vec![
            CandidateFeedback::positive("c1", "Strong technical skills"),
            CandidateFeedback::negative("c2", "Too junior"),
        ];
        assert_eq!(store.append_feedback("job-1", 0, &batch).unwrap(), 2);
        assert_eq!(store.append_feedback("job-1", 0, &batch).unwrap(), 0);
        assert_eq!(store.append_feedback("job-1", 1, &batch[..1]).unwrap(), 1);

        let records = store.load_feedback("job-1").unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].iteration, 0);
        assert_eq!(records[2].iteration, 1);
        assert!(store.load_feedback("job-2").unwrap().is_empty());
    }

    pub(crate) fn candidate_log_rejects_duplicates(store: &dyn WorkflowStore) {
        let batch = CandidateBatch::new("job-1", 0, false, 5, vec![profile("c1", "Ada")]);
        store.append_candidates(&batch).unwrap();
        let err = store.append_candidates(&batch).unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));

        let later = CandidateBatch::new("job-1", 1, false, 5, vec![profile("c2", "Grace")]);
        store.append_candidates(&later).unwrap();

        assert_eq!(store.get_candidates("job-1", 0).unwrap(), Some(batch));
        assert!(store.get_candidates("job-1", 7).unwrap().is_none());
        let all = store.list_batches("job-1").unwrap();
        assert_eq!(all.iter().map(|b| b.iteration).collect::<Vec<_>>(), vec![0, 1]);
    }

    pub(crate) fn refinement_history(store: &dyn WorkflowStore) {
        let first = RefinementRecord::new("job-1", 0, react_refinement());
        store.append_refinement(&first).unwrap();

        let mut replay = first.clone();
        replay.refinement.explanation = "different".into();
        store.append_refinement(&replay).unwrap();

        store
            .append_refinement(&RefinementRecord::new("job-1", 1, react_refinement()))
            .unwrap();

        let history = store.list_refinements("job-1").unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].refinement.explanation, first.refinement.explanation);
        assert_eq!(history[1].iteration, 1);
    }

    pub(crate) fn run_all<S: WorkflowStore>(make: impl Fn() -> S) {
        job_descriptions(&make());
        insert_if_absent_is_idempotent(&make());
        replace_state_is_compare_and_swap(&make());
        feedback_log_is_idempotent(&make());
        candidate_log_rejects_duplicates(&make());
        refinement_history(&make());
    }
}
