//! JSON-file store
//!
//! Layout under the root directory (job ids are percent-encoded):
//!
//! ```text
//! jobs/<job>.json
//! workflows/<job>.json
//! feedback/<job>.json                 array of FeedbackRecord
//! candidates/<job>/<iteration>.json
//! refinements/<job>/<iteration>.json
//! ```
//!
//! Writes go to a temp file and are renamed into place. Compare-and-swap is
//! serialized by an in-process mutex; two processes sharing one directory
//! are not coordinated.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::{de::DeserializeOwned, Serialize};

use super::schema::{self, keys};
use super::store::{
    check_version, next_version, SharedWorkflowStore, StoreError, StoreResult, WorkflowStore,
};
use super::types::{JobDescription, RefinementRecord, WorkflowState};
use crate::candidate::CandidateBatch;
use crate::feedback::{CandidateFeedback, FeedbackRecord};

pub struct FileWorkflowStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl FileWorkflowStore {
    /// Open or create a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        for cf in schema::ALL_CFS {
            fs::create_dir_all(root.join(cf))?;
        }
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    pub fn shared(self) -> SharedWorkflowStore {
        Arc::new(self)
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    // =========================================================================
    // Generic operations
    // =========================================================================

    fn doc_path(&self, cf: &str, job_id: &str) -> PathBuf {
        self.root
            .join(cf)
            .join(format!("{}.json", keys::file_safe(job_id)))
    }

    fn iteration_dir(&self, cf: &str, job_id: &str) -> PathBuf {
        self.root.join(cf).join(keys::file_safe(job_id))
    }

    fn iteration_path(&self, cf: &str, job_id: &str, iteration: u32) -> PathBuf {
        self.iteration_dir(cf, job_id)
            .join(format!("{:010}.json", iteration))
    }

    fn lock(&self) -> StoreResult<std::sync::MutexGuard<'_, ()>> {
        self.write_lock.lock().map_err(|_| StoreError::LockPoisoned)
    }

    fn put<T: Serialize>(path: &Path, value: &T) -> StoreResult<()> {
        let json = serde_json::to_string_pretty(value)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    fn get<T: DeserializeOwned>(path: &Path) -> StoreResult<Option<T>> {
        if !path.exists() {
            return Ok(None);
        }
        let json = fs::read_to_string(path)?;
        let value = serde_json::from_str(&json).map_err(|e| {
            StoreError::Deserialization(format!("{}: {}", path.display(), e))
        })?;
        Ok(Some(value))
    }

    /// Every `<iteration>.json` document under `dir`, in iteration order.
    fn list_iterations<T: DeserializeOwned>(dir: &Path) -> StoreResult<Vec<T>> {
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();

        let mut values = Vec::with_capacity(paths.len());
        for path in paths {
            if let Some(value) = Self::get(&path)? {
                values.push(value);
            }
        }
        Ok(values)
    }
}

impl WorkflowStore for FileWorkflowStore {
    fn put_job_description(&self, job: &JobDescription) -> StoreResult<()> {
        let _guard = self.lock()?;
        Self::put(&self.doc_path(schema::CF_JOBS, &job.id), job)
    }

    fn get_job_description(&self, job_id: &str) -> StoreResult<Option<JobDescription>> {
        Self::get(&self.doc_path(schema::CF_JOBS, job_id))
    }

    fn get_state(&self, job_id: &str) -> StoreResult<Option<WorkflowState>> {
        Self::get(&self.doc_path(schema::CF_WORKFLOWS, job_id))
    }

    fn insert_state_if_absent(&self, state: &WorkflowState) -> StoreResult<WorkflowState> {
        let _guard = self.lock()?;
        let path = self.doc_path(schema::CF_WORKFLOWS, &state.job_description_id);
        if let Some(existing) = Self::get(&path)? {
            return Ok(existing);
        }
        Self::put(&path, state)?;
        Ok(state.clone())
    }

    fn replace_state(
        &self,
        state: &WorkflowState,
        expected_version: u64,
    ) -> StoreResult<WorkflowState> {
        let _guard = self.lock()?;
        let job_id = state.job_description_id.as_str();
        let path = self.doc_path(schema::CF_WORKFLOWS, job_id);
        let stored: Option<WorkflowState> = Self::get(&path)?;
        check_version(job_id, stored.as_ref(), expected_version)?;
        let next = next_version(state, expected_version);
        Self::put(&path, &next)?;
        Ok(next)
    }

    fn append_feedback(
        &self,
        job_id: &str,
        iteration: u32,
        feedback: &[CandidateFeedback],
    ) -> StoreResult<usize> {
        let _guard = self.lock()?;
        let path = self.doc_path(schema::CF_FEEDBACK, job_id);
        let mut log: Vec<FeedbackRecord> = Self::get(&path)?.unwrap_or_default();
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
        if added > 0 {
            Self::put(&path, &log)?;
        }
        Ok(added)
    }

    fn load_feedback(&self, job_id: &str) -> StoreResult<Vec<FeedbackRecord>> {
        let mut log: Vec<FeedbackRecord> =
            Self::get(&self.doc_path(schema::CF_FEEDBACK, job_id))?.unwrap_or_default();
        log.sort_by_key(|r| r.iteration);
        Ok(log)
    }

    fn append_candidates(&self, batch: &CandidateBatch) -> StoreResult<()> {
        let _guard = self.lock()?;
        let path = self.iteration_path(
            schema::CF_CANDIDATES,
            &batch.job_description_id,
            batch.iteration,
        );
        if path.exists() {
            return Err(StoreError::AlreadyExists(format!(
                "candidates for job {} iteration {}",
                batch.job_description_id, batch.iteration
            )));
        }
        Self::put(&path, batch)
    }

    fn get_candidates(&self, job_id: &str, iteration: u32) -> StoreResult<Option<CandidateBatch>> {
        Self::get(&self.iteration_path(schema::CF_CANDIDATES, job_id, iteration))
    }

    fn list_batches(&self, job_id: &str) -> StoreResult<Vec<CandidateBatch>> {
        Self::list_iterations(&self.iteration_dir(schema::CF_CANDIDATES, job_id))
    }

    fn append_refinement(&self, record: &RefinementRecord) -> StoreResult<()> {
        let _guard = self.lock()?;
        let path = self.iteration_path(
            schema::CF_REFINEMENTS,
            &record.job_description_id,
            record.iteration,
        );
        if path.exists() {
            return Ok(());
        }
        Self::put(&path, record)
    }

    fn list_refinements(&self, job_id: &str) -> StoreResult<Vec<RefinementRecord>> {
        Self::list_iterations(&self.iteration_dir(schema::CF_REFINEMENTS, job_id))
    }
}
