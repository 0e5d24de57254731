use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

use crate::models::job::{FailureKind, JobFailure, JobId, JobInput, Transition};
use crate::models::separation::{JobConfiguration, SeparationResult};
use crate::services::job_store::JobStore;
use crate::services::separator::{SeparationRequest, Separator};
use crate::services::storage::LocalStorage;
use crate::services::validation;
use crate::telemetry;

#[derive(Debug, Clone)]
pub struct RunnerSettings {
    /// Upper bound for one invocation; `None` lets it run indefinitely.
    /// Time spent waiting for a concurrency permit is not counted.
    pub timeout: Option<Duration>,
    pub max_concurrent_jobs: usize,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            timeout: Some(Duration::from_secs(1800)),
            max_concurrent_jobs: 2,
        }
    }
}

/// Drives separation jobs from submission to a terminal state.
///
/// `submit` returns as soon as the job is recorded. The invocation runs on
/// its own task, waits for a concurrency permit while `Queued`, and always
/// ends in `Completed` or `Failed`.
pub struct JobRunner {
    store: Arc<JobStore>,
    storage: Arc<LocalStorage>,
    separator: Arc<dyn Separator>,
    settings: RunnerSettings,
    permits: Semaphore,
}

impl JobRunner {
    pub fn new(
        store: Arc<JobStore>,
        storage: Arc<LocalStorage>,
        separator: Arc<dyn Separator>,
        settings: RunnerSettings,
    ) -> Self {
        let permits = Semaphore::new(settings.max_concurrent_jobs.max(1));
        Self {
            store,
            storage,
            separator,
            settings,
            permits,
        }
    }

    /// Record a job and schedule its invocation without waiting for it.
    pub fn submit(self: &Arc<Self>, input: impl Into<JobInput>, configuration: JobConfiguration) -> JobId {
        let input = input.into();
        let descriptor = input.descriptor.clone();
        let id = self.store.create(configuration, input);

        metrics::counter!(telemetry::JOBS_SUBMITTED).increment(1);
        tracing::info!(job_id = %id, input = %descriptor, "Separation job submitted");

        let runner = Arc::clone(self);
        tokio::spawn(async move { runner.run(id).await });

        id
    }

    async fn run(&self, id: JobId) {
        let _permit = match self.permits.acquire().await {
            Ok(permit) => permit,
            Err(_) => {
                tracing::error!(job_id = %id, "Job runner closed before job could start");
                return;
            }
        };

        let job = match self.store.transition(id, Transition::Processing) {
            Ok(job) => job,
            Err(e) => {
                tracing::error!(job_id = %id, error = %e, "Failed to start job");
                return;
            }
        };

        tracing::info!(
            job_id = %id,
            model = %job.configuration.model,
            device = %job.configuration.device,
            "Processing separation job"
        );

        metrics::gauge!(telemetry::JOBS_IN_FLIGHT).increment(1.0);
        let start = Instant::now();
        let outcome = self
            .invoke(id, job.input.path, job.configuration)
            .await;
        let elapsed = start.elapsed();
        metrics::gauge!(telemetry::JOBS_IN_FLIGHT).decrement(1.0);

        let transition = match outcome {
            Ok(result) => {
                metrics::counter!(telemetry::JOBS_COMPLETED).increment(1);
                metrics::histogram!(telemetry::PROCESSING_SECONDS).record(elapsed.as_secs_f64());
                tracing::info!(
                    job_id = %id,
                    elapsed_ms = elapsed.as_millis() as u64,
                    stems = ?result.stems,
                    "Separation job completed"
                );
                Transition::Completed(result)
            }
            Err(failure) => {
                metrics::counter!(telemetry::JOBS_FAILED, "kind" => failure.kind.to_string())
                    .increment(1);
                tracing::warn!(
                    job_id = %id,
                    kind = %failure.kind,
                    reason = %failure.reason,
                    "Separation job failed"
                );
                Transition::Failed(failure)
            }
        };

        if let Err(e) = self.store.transition(id, transition) {
            tracing::error!(job_id = %id, error = %e, "Failed to record job outcome");
        }
    }

    /// Run the separator for one job, converting every way it can end into
    /// either a result or a failure.
    async fn invoke(
        &self,
        id: JobId,
        input: PathBuf,
        configuration: JobConfiguration,
    ) -> Result<SeparationResult, JobFailure> {
        let input = validation::validate_input(&input)
            .await
            .map_err(|e| e.into_failure())?;

        let output_dir = self.storage.job_output_dir(id);
        tokio::fs::create_dir_all(&output_dir).await.map_err(|e| {
            JobFailure::new(
                FailureKind::Internal,
                format!("Failed to create output directory: {e}"),
            )
        })?;

        let request = SeparationRequest {
            input: input.path,
            output_dir,
            configuration,
        };
        let separator = Arc::clone(&self.separator);
        let mut handle = tokio::spawn(async move { separator.separate(&request).await });

        let joined = match self.settings.timeout {
            Some(bound) => match tokio::time::timeout(bound, &mut handle).await {
                Ok(joined) => joined,
                Err(_) => {
                    // Dropping the separator future kills its child process.
                    handle.abort();
                    tracing::warn!(job_id = %id, timeout_ms = bound.as_millis() as u64, "Separation timed out");
                    return Err(JobFailure::timeout());
                }
            },
            None => handle.await,
        };

        match joined {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(e)) => Err(e.into_failure()),
            Err(e) if e.is_panic() => Err(JobFailure::new(
                FailureKind::Internal,
                "Separator panicked during invocation",
            )),
            Err(_) => Err(JobFailure::new(
                FailureKind::Internal,
                "Separator task was cancelled",
            )),
        }
    }
}
