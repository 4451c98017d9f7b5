//! RocksDB-backed workflow store
//!
//! One column family per record kind (see [`schema`](super::schema)).
//! Values are JSON so documents stay readable with `ldb` and match the
//! file store byte-for-byte in shape.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock};

use rocksdb::{ColumnFamilyDescriptor, Options, DB};
use serde::{de::DeserializeOwned, Serialize};

use super::schema::{self, keys, ALL_CFS};
use super::store::{
    check_version, next_version, SharedWorkflowStore, StoreError, StoreResult, WorkflowStore,
};
use super::types::{JobDescription, RefinementRecord, WorkflowState};
use crate::candidate::CandidateBatch;
use crate::feedback::{CandidateFeedback, FeedbackRecord};

/// RocksDB-backed persistent workflow store
pub struct RocksWorkflowStore {
    db: RwLock<DB>,
    path: PathBuf,
    /// Serializes read-check-write sequences (CAS, insert-if-absent, appends).
    write_lock: Mutex<()>,
}

impl RocksWorkflowStore {
    /// Open or create a store at the given path
    pub fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = ALL_CFS
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect();

        let db = DB::open_cf_descriptors(&opts, &path, cf_descriptors)?;

        Ok(Self {
            db: RwLock::new(db),
            path,
            write_lock: Mutex::new(()),
        })
    }

    pub fn shared(self) -> SharedWorkflowStore {
        Arc::new(self)
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn lock(&self) -> StoreResult<std::sync::MutexGuard<'_, ()>> {
        self.write_lock.lock().map_err(|_| StoreError::LockPoisoned)
    }

    // =========================================================================
    // Generic operations
    // =========================================================================

    fn put<T: Serialize>(&self, cf_name: &str, key: &str, value: &T) -> StoreResult<()> {
        let db = self.db.read().map_err(|_| StoreError::LockPoisoned)?;
        let cf = db
            .cf_handle(cf_name)
            .ok_or_else(|| StoreError::ColumnFamilyNotFound(cf_name.to_string()))?;

        let bytes =
            serde_json::to_vec(value).map_err(|e| StoreError::Serialization(e.to_string()))?;

        db.put_cf(&cf, key.as_bytes(), bytes)?;
        Ok(())
    }

    fn get<T: DeserializeOwned>(&self, cf_name: &str, key: &str) -> StoreResult<Option<T>> {
        let db = self.db.read().map_err(|_| StoreError::LockPoisoned)?;
        let cf = db
            .cf_handle(cf_name)
            .ok_or_else(|| StoreError::ColumnFamilyNotFound(cf_name.to_string()))?;

        match db.get_cf(&cf, key.as_bytes())? {
            Some(bytes) => {
                let value = serde_json::from_slice(&bytes)
                    .map_err(|e| StoreError::Deserialization(e.to_string()))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    fn exists(&self, cf_name: &str, key: &str) -> StoreResult<bool> {
        let db = self.db.read().map_err(|_| StoreError::LockPoisoned)?;
        let cf = db
            .cf_handle(cf_name)
            .ok_or_else(|| StoreError::ColumnFamilyNotFound(cf_name.to_string()))?;
        Ok(db.get_pinned_cf(&cf, key.as_bytes())?.is_some())
    }

    /// All values whose key starts with `prefix`, in key order.
    fn scan_prefix<T: DeserializeOwned>(&self, cf_name: &str, prefix: &str) -> StoreResult<Vec<T>> {
        let db = self.db.read().map_err(|_| StoreError::LockPoisoned)?;
        let cf = db
            .cf_handle(cf_name)
            .ok_or_else(|| StoreError::ColumnFamilyNotFound(cf_name.to_string()))?;

        let mut values = Vec::new();
        let iter = db.iterator_cf(
            &cf,
            rocksdb::IteratorMode::From(prefix.as_bytes(), rocksdb::Direction::Forward),
        );

        for result in iter {
            let (key, value) = result?;
            if !key.starts_with(prefix.as_bytes()) {
                break;
            }
            let value = serde_json::from_slice(&value)
                .map_err(|e| StoreError::Deserialization(e.to_string()))?;
            values.push(value);
        }

        Ok(values)
    }
}

impl WorkflowStore for RocksWorkflowStore {
    fn put_job_description(&self, job: &JobDescription) -> StoreResult<()> {
        self.put(schema::CF_JOBS, &keys::job(&job.id), job)
    }

    fn get_job_description(&self, job_id: &str) -> StoreResult<Option<JobDescription>> {
        self.get(schema::CF_JOBS, &keys::job(job_id))
    }

    fn get_state(&self, job_id: &str) -> StoreResult<Option<WorkflowState>> {
        self.get(schema::CF_WORKFLOWS, &keys::workflow(job_id))
    }

    fn insert_state_if_absent(&self, state: &WorkflowState) -> StoreResult<WorkflowState> {
        let _guard = self.lock()?;
        let key = keys::workflow(&state.job_description_id);
        if let Some(existing) = self.get(schema::CF_WORKFLOWS, &key)? {
            return Ok(existing);
        }
        self.put(schema::CF_WORKFLOWS, &key, state)?;
        Ok(state.clone())
    }

    fn replace_state(
        &self,
        state: &WorkflowState,
        expected_version: u64,
    ) -> StoreResult<WorkflowState> {
        let _guard = self.lock()?;
        let job_id = state.job_description_id.as_str();
        let key = keys::workflow(job_id);
        let stored: Option<WorkflowState> = self.get(schema::CF_WORKFLOWS, &key)?;
        check_version(job_id, stored.as_ref(), expected_version)?;
        let next = next_version(state, expected_version);
        self.put(schema::CF_WORKFLOWS, &key, &next)?;
        Ok(next)
    }

    fn append_feedback(
        &self,
        job_id: &str,
        iteration: u32,
        feedback: &[CandidateFeedback],
    ) -> StoreResult<usize> {
        let _guard = self.lock()?;
        let mut added = 0;
        for f in feedback {
            let key = keys::feedback(job_id, iteration, &f.candidate_id);
            if !self.exists(schema::CF_FEEDBACK, &key)? {
                let record = FeedbackRecord::new(job_id, iteration, f.clone());
                self.put(schema::CF_FEEDBACK, &key, &record)?;
                added += 1;
            }
        }
        Ok(added)
    }

    fn load_feedback(&self, job_id: &str) -> StoreResult<Vec<FeedbackRecord>> {
        let records: Vec<FeedbackRecord> =
            self.scan_prefix(schema::CF_FEEDBACK, &keys::job_prefix("fb", job_id))?;
        // A job id containing ':' can share a prefix with another job.
        Ok(records
            .into_iter()
            .filter(|r| r.job_description_id == job_id)
            .collect())
    }

    fn append_candidates(&self, batch: &CandidateBatch) -> StoreResult<()> {
        let _guard = self.lock()?;
        let key = keys::candidates(&batch.job_description_id, batch.iteration);
        if self.exists(schema::CF_CANDIDATES, &key)? {
            return Err(StoreError::AlreadyExists(format!(
                "candidates for job {} iteration {}",
                batch.job_description_id, batch.iteration
            )));
        }
        self.put(schema::CF_CANDIDATES, &key, batch)
    }

    fn get_candidates(&self, job_id: &str, iteration: u32) -> StoreResult<Option<CandidateBatch>> {
        self.get(schema::CF_CANDIDATES, &keys::candidates(job_id, iteration))
    }

    fn list_batches(&self, job_id: &str) -> StoreResult<Vec<CandidateBatch>> {
        let batches: Vec<CandidateBatch> =
            self.scan_prefix(schema::CF_CANDIDATES, &keys::job_prefix("cand", job_id))?;
        Ok(batches
            .into_iter()
            .filter(|b| b.job_description_id == job_id)
            .collect())
    }

    fn append_refinement(&self, record: &RefinementRecord) -> StoreResult<()> {
        let _guard = self.lock()?;
        let key = keys::refinement(&record.job_description_id, record.iteration);
        if self.exists(schema::CF_REFINEMENTS, &key)? {
            return Ok(());
        }
        self.put(schema::CF_REFINEMENTS, &key, record)
    }

    fn list_refinements(&self, job_id: &str) -> StoreResult<Vec<RefinementRecord>> {
        let records: Vec<RefinementRecord> =
            self.scan_prefix(schema::CF_REFINEMENTS, &keys::job_prefix("ref", job_id))?;
        Ok(records
            .into_iter()
            .filter(|r| r.job_description_id == job_id)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::store::conformance;
    use tempfile::tempdir;

    #[test]
    fn test_rocks_conformance() {
        let dir = tempdir().unwrap();
        conformance::run_all(|| {
            RocksWorkflowStore::open(dir.path().join(uuid::Uuid::new_v4().to_string())).unwrap()
        });
    }

    #[test]
    fn test_prefix_scan_isolates_jobs() {
        let dir = tempdir().unwrap();
        let store = RocksWorkflowStore::open(dir.path().join("test.db")).unwrap();
        store
            .append_feedback("a", 0, &[CandidateFeedback::positive("c1", "ok")])
            .unwrap();
        store
            .append_feedback("a:0000000000", 0, &[CandidateFeedback::positive("c1", "ok")])
            .unwrap();
        assert_eq!(store.load_feedback("a").unwrap().len(), 1);
    }
}
