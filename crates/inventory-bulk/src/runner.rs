//! In-process job runner.
//!
//! Stands in for a queue worker: each submitted event becomes a task on the
//! tokio runtime, and at most `jobs.max_concurrent_jobs` of them run at once.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::error::JobError;
use crate::job::{BulkJob, JobEvent, JobPatch, JobPlugins, JobRecord, JobStatus};

#[derive(Clone)]
pub struct JobRunner {
    plugins: JobPlugins,
    permits: Arc<Semaphore>,
}

impl JobRunner {
    pub fn new(plugins: JobPlugins) -> Self {
        let permits = Arc::new(Semaphore::new(plugins.config.jobs.max_concurrent_jobs));
        Self { plugins, permits }
    }

    /// Spawns the job described by `event`; the handle resolves to its
    /// final record.
    pub fn submit(&self, event: JobEvent) -> Result<JoinHandle<JobRecord>, JobError> {
        let job = BulkJob::from_event(event, self.plugins.clone())?;
        let permits = self.permits.clone();
        Ok(tokio::spawn(async move {
            // The semaphore is never closed, so acquisition only waits.
            let _permit = permits.acquire_owned().await.ok();
            job.run().await
        }))
    }

    /// Like [`submit`](Self::submit), calling `on_done` exactly once with the
    /// final record. A panicking job is reported as `Failed`, and a
    /// best-effort `Failed` patch is sent for it.
    pub fn submit_with<F>(&self, event: JobEvent, on_done: F) -> Result<JoinHandle<()>, JobError>
    where
        F: FnOnce(JobRecord) + Send + 'static,
    {
        let mut fallback = JobRecord::from_event(&event);
        let job = BulkJob::from_event(event, self.plugins.clone())?;
        let storage = self.plugins.storage.clone();
        let permits = self.permits.clone();
        Ok(tokio::spawn(async move {
            let _permit = permits.acquire_owned().await.ok();
            let record = match AssertUnwindSafe(job.run()).catch_unwind().await {
                Ok(record) => record,
                Err(_) => {
                    tracing::error!(job_id = %fallback.id, "job panicked");
                    let patch = JobPatch::status(JobStatus::Failed)
                        .with_error_log("job panicked")
                        .completed_now();
                    if let Err(err) = storage
                        .patch(&fallback.resource_type, &fallback.id, &patch.to_value())
                        .await
                    {
                        tracing::warn!(
                            job_id = %fallback.id,
                            error = %err,
                            "failed to mark panicked job"
                        );
                    }
                    fallback.status = JobStatus::Failed;
                    fallback.error_log = patch.error_log;
                    fallback.completion_date = patch.completion_date;
                    fallback
                }
            };
            tracing::debug!(job_id = %record.id, status = %record.status, "job done");
            on_done(record);
        }))
    }

    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }
}
