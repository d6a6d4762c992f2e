//! Batch orchestration.
//!
//! A job is a list of items processed by a bounded pool of tokio workers.
//! Items succeed or fail independently; progress is derived from the number
//! of items that reached a terminal state, so it never moves backwards.
//! Finished jobs are dropped once they are older than the retention period.

mod job;

pub use job::{
    BatchItem, BatchJob, BatchOutcome, ItemFailure, ItemStatus, JobItem, JobKind, JobProgress, JobStatus,
};

use crate::error::{ReadLevelError, Result};
use async_trait::async_trait;
use chrono::Utc;
use futures::FutureExt;
use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Work performed for each item of a job.
#[async_trait]
pub trait BatchTask: Send + Sync {
    /// Checked once before the job is created.
    async fn preflight(&self) -> Result<()> {
        Ok(())
    }

    /// Process one item, returning a JSON result recorded on the item.
    async fn execute(&self, item: &BatchItem) -> Result<serde_json::Value>;
}

struct JobState {
    job: BatchJob,
    /// Indices of items not yet handed to a worker.
    queue: VecDeque<usize>,
    progress: watch::Sender<JobProgress>,
}

impl JobState {
    fn publish(&self) {
        self.progress.send_replace(self.job.progress());
    }
}

/// How long finished jobs are kept by default.
pub const DEFAULT_JOB_RETENTION: Duration = Duration::from_secs(3600);

/// Runs and tracks batch jobs.
#[derive(Clone)]
pub struct BatchOrchestrator {
    jobs: Arc<Mutex<HashMap<Uuid, JobState>>>,
    retention: Duration,
}

impl Default for BatchOrchestrator {
    fn default() -> Self {
        Self {
            jobs: Arc::default(),
            retention: DEFAULT_JOB_RETENTION,
        }
    }
}

impl BatchOrchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep finished jobs for `retention` after their last item lands.
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<Uuid, JobState>>> {
        self.jobs
            .lock()
            .map_err(|e| ReadLevelError::Store(format!("Failed to acquire job lock: {}", e)))
    }

    /// Drop finished jobs older than the retention period. Running jobs stay.
    fn evict_expired(&self, jobs: &mut HashMap<Uuid, JobState>) {
        let now = Utc::now();
        let before = jobs.len();
        jobs.retain(|_, state| {
            state.job.finished_at.map_or(true, |finished| {
                (now - finished)
                    .to_std()
                    .map_or(true, |age| age < self.retention)
            })
        });
        let evicted = before - jobs.len();
        if evicted > 0 {
            debug!("Evicted {} finished jobs", evicted);
        }
    }

    /// Create a job and start processing it in the background.
    #[instrument(skip(self, items, task), fields(items = items.len()))]
    pub async fn run(
        &self,
        kind: JobKind,
        items: Vec<BatchItem>,
        task: Arc<dyn BatchTask>,
        concurrency_limit: usize,
    ) -> Result<Uuid> {
        if concurrency_limit == 0 {
            return Err(ReadLevelError::Validation(
                "Concurrency limit must be at least 1".to_string(),
            ));
        }

        task.preflight().await.map_err(|e| match e {
            ReadLevelError::ServiceUnavailable(msg) => ReadLevelError::ServiceUnavailable(msg),
            other => ReadLevelError::ServiceUnavailable(format!("Preflight failed: {}", other)),
        })?;

        let mut job = BatchJob::new(kind, items);
        job.refresh();
        let job_id = job.id;
        let total = job.items.len();
        let (progress, _) = watch::channel(job.progress());

        {
            let mut jobs = self.lock()?;
            self.evict_expired(&mut jobs);
            jobs.insert(
                job_id,
                JobState {
                    job,
                    queue: (0..total).collect(),
                    progress,
                },
            );
        }

        let workers = concurrency_limit.min(total);
        info!("Started {} job {} with {} items on {} workers", kind, job_id, total, workers);

        for worker in 0..workers {
            let orchestrator = self.clone();
            let task = Arc::clone(&task);
            tokio::spawn(async move {
                orchestrator.work(job_id, worker, task).await;
            });
        }

        Ok(job_id)
    }

    /// Claim the next queued item, marking it running.
    fn claim(&self, job_id: Uuid) -> Option<(usize, BatchItem)> {
        let mut jobs = self.lock().ok()?;
        let state = jobs.get_mut(&job_id)?;
        if state.job.status != JobStatus::Running {
            return None;
        }

        let index = state.queue.pop_front()?;
        let item = &mut state.job.items[index];
        item.status = ItemStatus::Running;
        let batch_item = item.as_batch_item();
        state.publish();
        Some((index, batch_item))
    }

    fn record(&self, job_id: Uuid, index: usize, result: Result<serde_json::Value>) {
        let mut jobs = match self.lock() {
            Ok(jobs) => jobs,
            Err(e) => {
                warn!("Dropping result for job {}: {}", job_id, e);
                return;
            }
        };
        let Some(state) = jobs.get_mut(&job_id) else {
            return;
        };

        let item = &mut state.job.items[index];
        match result {
            Ok(value) => {
                item.status = ItemStatus::Succeeded;
                item.result = Some(value);
            }
            Err(e) => {
                debug!("Item {} of job {} failed: {}", item.target_id, job_id, e);
                item.status = ItemStatus::Failed;
                item.error = Some(e.to_string());
            }
        }

        state.job.refresh();
        state.publish();

        if state.job.is_finished() {
            let outcome = state.job.outcome();
            info!(
                "Job {} {}: {} succeeded, {} failed, {} skipped",
                job_id,
                state.job.status,
                outcome.succeeded.len(),
                outcome.failed.len(),
                outcome.skipped.len()
            );
        }
    }

    async fn work(&self, job_id: Uuid, worker: usize, task: Arc<dyn BatchTask>) {
        while let Some((index, item)) = self.claim(job_id) {
            debug!(worker, "Processing {} for job {}", item.target_id, job_id);
            let result = match AssertUnwindSafe(task.execute(&item)).catch_unwind().await {
                Ok(result) => result,
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    warn!("Item {} of job {} panicked: {}", item.target_id, job_id, message);
                    Err(ReadLevelError::Panicked(message))
                }
            };
            self.record(job_id, index, result);
        }
        debug!(worker, "Worker for job {} finished", job_id);
    }

    /// Snapshot of a job.
    pub fn get_status(&self, job_id: Uuid) -> Result<BatchJob> {
        self.lock()?
            .get(&job_id)
            .map(|state| state.job.clone())
            .ok_or_else(|| ReadLevelError::NotFound(format!("Job {} not found", job_id)))
    }

    /// Stop dispatching new items. In-flight items are still recorded.
    #[instrument(skip(self))]
    pub fn cancel(&self, job_id: Uuid) -> Result<BatchJob> {
        let mut jobs = self.lock()?;
        let state = jobs
            .get_mut(&job_id)
            .ok_or_else(|| ReadLevelError::NotFound(format!("Job {} not found", job_id)))?;

        if state.job.status != JobStatus::Running {
            return Err(ReadLevelError::Conflict(format!(
                "Job {} is already {}",
                job_id, state.job.status
            )));
        }

        state.job.status = JobStatus::Cancelled;
        let skipped = state.queue.len();
        while let Some(index) = state.queue.pop_front() {
            state.job.items[index].status = ItemStatus::Skipped;
        }
        state.job.refresh();
        state.publish();

        info!("Cancelled job {} ({} items skipped)", job_id, skipped);
        Ok(state.job.clone())
    }

    /// Receive a progress snapshot after every change to the job.
    pub fn subscribe(&self, job_id: Uuid) -> Result<watch::Receiver<JobProgress>> {
        self.lock()?
            .get(&job_id)
            .map(|state| state.progress.subscribe())
            .ok_or_else(|| ReadLevelError::NotFound(format!("Job {} not found", job_id)))
    }

    /// Wait until the job has no pending or running items.
    pub async fn wait(&self, job_id: Uuid) -> Result<BatchJob> {
        let mut rx = self.subscribe(job_id)?;
        rx.wait_for(|p| p.finished)
            .await
            .map_err(|_| ReadLevelError::NotFound(format!("Job {} was dropped", job_id)))?;
        self.get_status(job_id)
    }

    /// Retained jobs, newest first.
    pub fn list_jobs(&self) -> Result<Vec<BatchJob>> {
        let mut state = self.lock()?;
        self.evict_expired(&mut state);
        let mut jobs: Vec<BatchJob> = state.values().map(|s| s.job.clone()).collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(jobs)
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
