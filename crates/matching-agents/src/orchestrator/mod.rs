//! Workflow orchestrator: the matching loop over the workflow store.
//!
//! ```text
//! initialize ─▶ INITIAL
//! generate         INITIAL | REFINING ─▶ EVALUATING        (batch evaluated, ranked, persisted first)
//! process_feedback EVALUATING ─▶ REFINING | COMPLETE        (feedback persisted first)
//! ```
//!
//! Callers pass the snapshot they last saw and get the next one back. Every
//! returned snapshot is already durable. Operations on one job are
//! linearized twice over: an in-process lock per job, and compare-and-swap
//! on `WorkflowState::version` in the store. A job's lock is dropped from the
//! lock table once no operation holds or waits on it.
//!
//! A caller holding a snapshot that is one step behind gets the already
//! applied result instead of a second application. Anything further behind
//! is a `Conflict`.
//!
//! Operation bodies run on spawned tasks. Dropping the returned future does
//! not abort an in-flight model call, and a successful result is persisted
//! regardless.

pub mod report;
pub mod source;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use workflow_core::{
    apply_evaluations, apply_feedback_outcome, begin_generation, candidates_for_iteration,
    finish_generation, is_final_iteration, validate_feedback_batch, CandidateBatch,
    CandidateFeedback, CandidateProfile, FailureContext, FeedbackAnalysis, FeedbackImpact,
    FeedbackOutcome, JobDescription,
    RefinementDecider, RefinementRecord, SelectionCriteria, SharedWorkflowStore, StoreError,
    WorkflowError, WorkflowPhase, WorkflowResult, WorkflowState,
};

use crate::agents::{GenerationInput, MatchingAgents, StageError};

pub use report::{BatchSummary, WorkflowReport};
pub use source::{FeedbackSource, ScriptedFeedback, ScriptedVerdict};

fn store_err(e: StoreError) -> WorkflowError {
    match e {
        StoreError::VersionConflict {
            job_description_id,
            expected,
            found,
        } => WorkflowError::Conflict {
            job_description_id,
            expected,
            found,
        },
        StoreError::NotFound(what) => WorkflowError::NotFound(what),
        other => WorkflowError::Store(other),
    }
}

fn failure_context(state: &WorkflowState) -> FailureContext {
    FailureContext::new(
        state.job_description_id.clone(),
        state.current_phase,
        state.iteration_count,
    )
}

fn conflict(caller: &WorkflowState, stored: &WorkflowState) -> WorkflowError {
    WorkflowError::Conflict {
        job_description_id: stored.job_description_id.clone(),
        expected: caller.version,
        found: stored.version,
    }
}

/// `caller` is the snapshot `generate` was applied to and `stored` its result.
fn generation_already_applied(caller: &WorkflowState, stored: &WorkflowState) -> bool {
    matches!(
        caller.current_phase,
        WorkflowPhase::Initial | WorkflowPhase::Refining
    ) && stored.current_phase == WorkflowPhase::Evaluating
        && stored.iteration_count == caller.iteration_count
}

/// `caller` is the snapshot `process_feedback` was applied to and `stored` its result.
fn feedback_already_applied(caller: &WorkflowState, stored: &WorkflowState) -> bool {
    matches!(
        caller.current_phase,
        WorkflowPhase::Evaluating | WorkflowPhase::Generating
    ) && stored.current_phase == WorkflowPhase::Refining
        && stored.iteration_count == caller.iteration_count + 1
}

async fn join<T>(handle: JoinHandle<WorkflowResult<T>>) -> WorkflowResult<T> {
    match handle.await {
        Ok(result) => result,
        Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
        Err(e) => Err(WorkflowError::Aborted(e.to_string())),
    }
}

/// Exclusive hold on one job. Dropping it releases the job and evicts its
/// lock-table entry when nobody else holds or waits on it.
struct JobLock {
    orchestrator: WorkflowOrchestrator,
    job_id: String,
    lock: Arc<AsyncMutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for JobLock {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.orchestrator.release_job_lock(&self.job_id, &self.lock);
    }
}

struct Inner {
    store: SharedWorkflowStore,
    agents: MatchingAgents,
    decider: RefinementDecider,
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

/// Drives candidate-matching workflows. Cheap to clone.
#[derive(Clone)]
pub struct WorkflowOrchestrator {
    inner: Arc<Inner>,
}

impl WorkflowOrchestrator {
    pub fn new(
        store: SharedWorkflowStore,
        agents: MatchingAgents,
        decider: RefinementDecider,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                agents,
                decider,
                locks: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn store(&self) -> &SharedWorkflowStore {
        &self.inner.store
    }

    pub fn max_iterations(&self) -> u32 {
        self.inner.decider.max_iterations
    }

    fn lock_table(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<AsyncMutex<()>>>> {
        self.inner
            .locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn lock_job(&self, job_id: &str) -> JobLock {
        let lock = self
            .lock_table()
            .entry(job_id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone();
        let mut held = JobLock {
            orchestrator: self.clone(),
            job_id: job_id.to_string(),
            lock,
            guard: None,
        };
        held.guard = Some(held.lock.clone().lock_owned().await);
        held
    }

    /// Evict `lock` if the table and the releasing caller are its only owners.
    /// Owners can only be added under the table mutex, so the count is exact.
    fn release_job_lock(&self, job_id: &str, lock: &Arc<AsyncMutex<()>>) {
        let mut locks = self.lock_table();
        let idle = Arc::strong_count(lock) == 2
            && locks.get(job_id).is_some_and(|entry| Arc::ptr_eq(entry, lock));
        if idle {
            locks.remove(job_id);
        }
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Store a job description. Re-registering replaces the text.
    pub fn register_job(&self, job: &JobDescription) -> WorkflowResult<()> {
        if job.id.trim().is_empty() {
            return Err(WorkflowError::validation("job description id is empty"));
        }
        if job.body.trim().is_empty() {
            return Err(WorkflowError::validation(format!(
                "job description {} has no text",
                job.id
            )));
        }
        self.inner.store.put_job_description(job).map_err(store_err)?;
        info!(job = %job.id, title = %job.title, "Job description registered");
        Ok(())
    }

    pub fn load_state(&self, job_id: &str) -> WorkflowResult<WorkflowState> {
        self.inner
            .store
            .get_state(job_id)
            .map_err(store_err)?
            .ok_or_else(|| WorkflowError::NotFound(format!("workflow {}", job_id)))
    }

    /// Batches, feedback counts and effective criteria for one job.
    pub fn report(&self, job_id: &str) -> WorkflowResult<WorkflowReport> {
        let state = self.load_state(job_id)?;
        let store = &self.inner.store;
        let batches = store.list_batches(job_id).map_err(store_err)?;
        let feedback = store.load_feedback(job_id).map_err(store_err)?;
        let refinements = store.list_refinements(job_id).map_err(store_err)?;
        Ok(WorkflowReport::build(
            &state,
            &batches,
            &feedback,
            refinements.len(),
        ))
    }

    /// Load the stored snapshot for a caller-supplied one.
    fn stored_for(&self, caller: &WorkflowState) -> WorkflowResult<WorkflowState> {
        if caller.job_description_id.trim().is_empty() {
            return Err(WorkflowError::validation("snapshot has an empty job id"));
        }
        caller
            .check_invariants()
            .map_err(WorkflowError::Validation)?;
        self.load_state(&caller.job_description_id)
    }

    /// Whether `caller` is behind `stored`. A snapshot claiming a version
    /// the store never issued is a conflict.
    fn is_stale(caller: &WorkflowState, stored: &WorkflowState) -> WorkflowResult<bool> {
        if caller.version > stored.version {
            return Err(conflict(caller, stored));
        }
        if caller.version == stored.version
            && (caller.current_phase != stored.current_phase
                || caller.iteration_count != stored.iteration_count)
        {
            return Err(WorkflowError::validation(format!(
                "snapshot for job {} does not match stored version {}",
                stored.job_description_id, stored.version
            )));
        }
        Ok(caller.version < stored.version)
    }

    // ========================================================================
    // Initialize
    // ========================================================================

    /// Create the workflow for a job, or return the one that already exists.
    pub async fn initialize(
        &self,
        job_id: &str,
        criteria: SelectionCriteria,
    ) -> WorkflowResult<WorkflowState> {
        if job_id.trim().is_empty() {
            return Err(WorkflowError::validation("job description id is empty"));
        }
        criteria
            .validate()
            .map_err(|v| WorkflowError::validation(v.join("; ")))?;

        let _job = self.lock_job(job_id).await;

        let fresh = WorkflowState::new(job_id, criteria);
        let stored = self
            .inner
            .store
            .insert_state_if_absent(&fresh)
            .map_err(store_err)?;
        if stored == fresh {
            info!(
                job = %job_id,
                phase = %stored.current_phase,
                iteration = stored.iteration_count,
                version = stored.version,
                "Workflow initialized"
            );
        } else {
            debug!(job = %job_id, version = stored.version, "Workflow already initialized");
        }
        Ok(stored)
    }

    // ========================================================================
    // Generate
    // ========================================================================

    /// Generate the batch for the snapshot's iteration and move to `EVALUATING`.
    ///
    /// Requests 5 candidates per round and 10 once the iteration cap is
    /// reached. The batch is scored by the evaluator and ranked by match
    /// score, highest first, before it is persisted; unusable evaluator
    /// output falls back to the generated scores. A batch already persisted
    /// for this iteration is reused. On a
    /// `COMPLETE` workflow this is a no-op returning the last batch.
    pub async fn generate(
        &self,
        state: &WorkflowState,
    ) -> WorkflowResult<(Vec<CandidateProfile>, WorkflowState)> {
        let this = self.clone();
        let state = state.clone();
        join(tokio::spawn(async move { this.generate_locked(state).await })).await
    }

    async fn generate_locked(
        self,
        state: WorkflowState,
    ) -> WorkflowResult<(Vec<CandidateProfile>, WorkflowState)> {
        let _job = self.lock_job(&state.job_description_id).await;

        let store = &self.inner.store;
        let stored = self.stored_for(&state)?;
        let job_id = stored.job_description_id.as_str();

        if stored.is_complete() {
            warn!(
                job = %job_id,
                version = stored.version,
                "Workflow already complete; generate ignored"
            );
            let last = store.list_batches(job_id).map_err(store_err)?.pop();
            return Ok((last.map(|b| b.candidates).unwrap_or_default(), stored));
        }

        if Self::is_stale(&state, &stored)? {
            if generation_already_applied(&state, &stored) {
                let batch = self.current_batch(&stored)?;
                debug!(job = %job_id, version = stored.version, "Generation already applied");
                return Ok((batch.candidates, stored));
            }
            return Err(conflict(&state, &stored));
        }

        if !matches!(
            stored.current_phase,
            WorkflowPhase::Initial | WorkflowPhase::Refining
        ) {
            return Err(WorkflowError::InvalidPhase {
                context: failure_context(&stored),
                operation: "generate",
            });
        }

        let iteration = stored.iteration_count;
        let batch = match store.get_candidates(job_id, iteration).map_err(store_err)? {
            Some(batch) => {
                info!(
                    job = %job_id,
                    iteration,
                    candidates = batch.candidates.len(),
                    "Resuming from persisted candidate batch"
                );
                batch
            }
            None => self.generate_batch(&stored).await?,
        };

        let next = finish_generation(&begin_generation(&stored)?)?;
        let persisted = store
            .replace_state(&next, stored.version)
            .map_err(store_err)?;

        info!(
            job = %job_id,
            phase = %persisted.current_phase,
            iteration = persisted.iteration_count,
            version = persisted.version,
            candidates = batch.candidates.len(),
            is_final = batch.is_final,
            "Generation persisted"
        );
        Ok((batch.candidates, persisted))
    }

    async fn generate_batch(&self, stored: &WorkflowState) -> WorkflowResult<CandidateBatch> {
        let store = &self.inner.store;
        let job_id = stored.job_description_id.as_str();
        let iteration = stored.iteration_count;
        let max = self.max_iterations();

        let job = store
            .get_job_description(job_id)
            .map_err(store_err)?
            .ok_or_else(|| WorkflowError::NotFound(format!("job description {}", job_id)))?;
        let history = store.load_feedback(job_id).map_err(store_err)?;
        let batches = store.list_batches(job_id).map_err(store_err)?;
        let count = candidates_for_iteration(iteration, max);
        let criteria = stored.effective_criteria();
        let agents = &self.inner.agents;

        let mut profiles = agents
            .generator
            .generate(GenerationInput {
                job: &job,
                criteria,
                history: &history,
                batches: &batches,
                count,
            })
            .await
            .map_err(|e| e.into_workflow_error(failure_context(stored)))?;

        let evaluations = match agents.evaluator.evaluate(&job, criteria, &profiles).await {
            Ok(evaluations) => evaluations,
            Err(StageError::Malformed { message, .. }) => {
                warn!(
                    job = %job_id,
                    iteration,
                    error = %message,
                    "Evaluator output unusable; ranking by generated scores"
                );
                Vec::new()
            }
            Err(e) => return Err(e.into_workflow_error(failure_context(stored))),
        };
        let rescored = apply_evaluations(&mut profiles, &evaluations);
        debug!(
            job = %job_id,
            iteration,
            rescored,
            candidates = profiles.len(),
            "Batch ranked"
        );

        let batch = CandidateBatch::new(
            job_id,
            iteration,
            is_final_iteration(iteration, max),
            count,
            profiles,
        );
        match store.append_candidates(&batch) {
            Ok(()) => Ok(batch),
            Err(StoreError::AlreadyExists(_)) => {
                warn!(job = %job_id, iteration, "Batch persisted by another writer; using it");
                self.current_batch(stored)
            }
            Err(e) => Err(store_err(e)),
        }
    }

    fn current_batch(&self, stored: &WorkflowState) -> WorkflowResult<CandidateBatch> {
        self.inner
            .store
            .get_candidates(&stored.job_description_id, stored.iteration_count)
            .map_err(store_err)?
            .ok_or_else(|| {
                WorkflowError::NotFound(format!(
                    "candidate batch {} for job {}",
                    stored.iteration_count, stored.job_description_id
                ))
            })
    }

    // ========================================================================
    // Process feedback
    // ========================================================================

    /// Record feedback on the latest batch, analyze it together with every
    /// earlier round, and either refine the criteria (`REFINING`) or finish
    /// the workflow (`COMPLETE`). Only the latest round decides whether there
    /// is any feedback at all.
    ///
    /// The feedback is durable before the analyzer runs. If analysis or
    /// refinement fails upstream the phase is unchanged and the same call can
    /// be re-issued; recorded feedback is not duplicated. Unusable refiner
    /// output ends the workflow.
    pub async fn process_feedback(
        &self,
        state: &WorkflowState,
        feedback: Vec<CandidateFeedback>,
    ) -> WorkflowResult<WorkflowState> {
        let this = self.clone();
        let state = state.clone();
        join(tokio::spawn(async move {
            this.process_feedback_locked(state, feedback).await
        }))
        .await
    }

    async fn process_feedback_locked(
        self,
        state: WorkflowState,
        feedback: Vec<CandidateFeedback>,
    ) -> WorkflowResult<WorkflowState> {
        let _job = self.lock_job(&state.job_description_id).await;

        let store = &self.inner.store;
        let stored = self.stored_for(&state)?;
        let job_id = stored.job_description_id.as_str();

        if stored.is_complete() {
            warn!(
                job = %job_id,
                version = stored.version,
                "Workflow already complete; feedback ignored"
            );
            return Ok(stored);
        }

        if Self::is_stale(&state, &stored)? {
            if feedback_already_applied(&state, &stored) {
                self.record_refinement_history(&stored)?;
                debug!(job = %job_id, version = stored.version, "Feedback already applied");
                return Ok(stored);
            }
            return Err(conflict(&state, &stored));
        }

        if !matches!(
            stored.current_phase,
            WorkflowPhase::Evaluating | WorkflowPhase::Generating
        ) {
            return Err(WorkflowError::InvalidPhase {
                context: failure_context(&stored),
                operation: "process_feedback",
            });
        }

        let iteration = stored.iteration_count;
        let batch = store
            .get_candidates(job_id, iteration)
            .map_err(store_err)?
            .ok_or_else(|| {
                WorkflowError::validation(format!(
                    "no candidate batch for job {} iteration {}",
                    job_id, iteration
                ))
            })?;
        validate_feedback_batch(&feedback, batch.candidates.iter().map(|c| c.id.as_str()))
            .map_err(|v| WorkflowError::validation(v.join("; ")))?;

        let added = store
            .append_feedback(job_id, iteration, &feedback)
            .map_err(store_err)?;
        let recorded = store.load_feedback(job_id).map_err(store_err)?;
        let round: Vec<CandidateFeedback> = recorded
            .iter()
            .filter(|r| r.iteration == iteration)
            .map(|r| r.feedback.clone())
            .collect();
        let all: Vec<CandidateFeedback> = recorded.into_iter().map(|r| r.feedback).collect();
        debug!(
            job = %job_id,
            iteration,
            added,
            round = round.len(),
            total = all.len(),
            "Feedback recorded"
        );

        // An empty round ends the workflow, so earlier rounds are not re-analyzed.
        let context = failure_context(&stored);
        let agents = &self.inner.agents;
        let analysis = if round.is_empty() {
            FeedbackAnalysis::empty()
        } else {
            agents
                .analyzer
                .analyze(&all)
                .await
                .map_err(|e| e.into_workflow_error(context.clone()))?
        };

        let impact = FeedbackImpact::compute(&all, &analysis);
        debug!(
            job = %job_id,
            skills = impact.skills_impact,
            experience = impact.experience_impact,
            cultural = impact.cultural_impact,
            confidence = impact.overall_confidence,
            actionable = analysis.has_actionable_signal(),
            "Feedback impact"
        );

        let decision = self.inner.decider.decide(&round, &analysis, iteration);
        let outcome = if decision.refine {
            match agents.refiner.refine(&stored, &analysis).await {
                Ok(refinement) => FeedbackOutcome::Refined(refinement),
                Err(StageError::Malformed { message, .. }) => {
                    warn!(
                        job = %job_id,
                        iteration,
                        error = %message,
                        "Refiner output unusable; ending workflow"
                    );
                    FeedbackOutcome::RefinementUnavailable(message)
                }
                Err(e) => return Err(e.into_workflow_error(context)),
            }
        } else {
            FeedbackOutcome::Declined(decision.reason)
        };

        let next = apply_feedback_outcome(&stored, outcome)?;
        let persisted = store
            .replace_state(&next, stored.version)
            .map_err(store_err)?;
        self.record_refinement_history(&persisted)?;

        info!(
            job = %job_id,
            phase = %persisted.current_phase,
            iteration = persisted.iteration_count,
            version = persisted.version,
            reason = %decision.reason,
            refined = decision.refine && !persisted.should_terminate,
            "Feedback processed"
        );
        Ok(persisted)
    }

    /// Append the refinement a `REFINING` snapshot carries to the history.
    /// Already-recorded iterations are left as they are.
    fn record_refinement_history(&self, state: &WorkflowState) -> WorkflowResult<()> {
        if state.current_phase != WorkflowPhase::Refining || state.iteration_count == 0 {
            return Ok(());
        }
        if let Some(refinement) = &state.refined_criteria {
            let record = RefinementRecord::new(
                state.job_description_id.clone(),
                state.iteration_count - 1,
                refinement.clone(),
            );
            self.inner
                .store
                .append_refinement(&record)
                .map_err(store_err)?;
        }
        Ok(())
    }

    // ========================================================================
    // Driver
    // ========================================================================

    /// Drive a workflow to `COMPLETE`, pulling feedback from `source`.
    pub async fn run_to_completion(
        &self,
        job_id: &str,
        source: &dyn FeedbackSource,
    ) -> WorkflowResult<WorkflowReport> {
        let mut state = self.load_state(job_id)?;
        while !state.is_complete() {
            state = match state.current_phase {
                WorkflowPhase::Initial | WorkflowPhase::Refining => {
                    self.generate(&state).await?.1
                }
                WorkflowPhase::Evaluating | WorkflowPhase::Generating => {
                    let batch = self.current_batch(&state)?;
                    let feedback = source.collect(&state, &batch).await?;
                    self.process_feedback(&state, feedback).await?
                }
                WorkflowPhase::Complete => break,
            };
        }
        info!(job = %job_id, iterations = state.iteration_count, "Workflow run finished");
        self.report(job_id)
    }
}
