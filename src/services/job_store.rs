use chrono::Utc;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::models::api::JobView;
use crate::models::job::{JobId, JobInput, JobStatus, SeparationJob, Transition};
use crate::models::separation::JobConfiguration;
use crate::services::relay::{NotificationRelay, Subscription};

/// In-memory store holding the authoritative state of every job.
///
/// All mutations take the write lock, so two transitions of the same job
/// are applied one after the other and the second sees the first's status.
pub struct JobStore {
    jobs: RwLock<HashMap<JobId, SeparationJob>>,
    relay: Arc<NotificationRelay>,
}

/// Number of stored jobs per status.
#[derive(Debug, Default, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct JobCounts {
    pub queued: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
}

impl JobStore {
    pub fn new(relay: Arc<NotificationRelay>) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            relay,
        }
    }

    pub fn relay(&self) -> &Arc<NotificationRelay> {
        &self.relay
    }

    /// Insert a new `Queued` job and return its id.
    pub fn create(&self, configuration: JobConfiguration, input: impl Into<JobInput>) -> JobId {
        let input = input.into();
        let mut jobs = self.jobs.write();
        let mut id = Uuid::new_v4();
        while jobs.contains_key(&id) {
            id = Uuid::new_v4();
        }
        jobs.insert(id, SeparationJob::new(id, input, configuration));
        id
    }

    pub fn get(&self, id: JobId) -> Result<SeparationJob, JobStoreError> {
        self.jobs
            .read()
            .get(&id)
            .cloned()
            .ok_or(JobStoreError::NotFound(id))
    }

    pub fn view(&self, id: JobId) -> Result<JobView, JobStoreError> {
        self.jobs
            .read()
            .get(&id)
            .map(JobView::from)
            .ok_or(JobStoreError::NotFound(id))
    }

    /// Apply a single forward transition and notify listeners before
    /// returning. Illegal transitions leave the job untouched.
    pub fn transition(
        &self,
        id: JobId,
        transition: Transition,
    ) -> Result<SeparationJob, JobStoreError> {
        let mut jobs = self.jobs.write();
        let job = jobs.get_mut(&id).ok_or(JobStoreError::NotFound(id))?;

        let to = transition.target();
        if !job.status.can_transition_to(to) {
            return Err(JobStoreError::InvalidTransition {
                id,
                from: job.status,
                to,
            });
        }

        job.apply(transition);
        self.relay.publish(&JobView::from(&*job));

        tracing::debug!(job_id = %id, status = %job.status, "Job transitioned");

        Ok(job.clone())
    }

    /// Subscribe to a job's transitions.
    ///
    /// Returns the job's state at the moment of subscription together with
    /// the subscription. If that state is terminal, the subscription yields
    /// it once and then ends.
    pub fn subscribe(&self, id: JobId) -> Result<(JobView, Subscription), JobStoreError> {
        // Registration happens under the read lock: transitions need the write
        // lock, so none can slip between the snapshot and the registration.
        let jobs = self.jobs.read();
        let job = jobs.get(&id).ok_or(JobStoreError::NotFound(id))?;
        let view = JobView::from(job);
        let subscription = self.relay.register(&view);
        Ok((view, subscription))
    }

    pub fn counts(&self) -> JobCounts {
        let jobs = self.jobs.read();
        let mut counts = JobCounts::default();
        for job in jobs.values() {
            match job.status {
                JobStatus::Queued => counts.queued += 1,
                JobStatus::Processing => counts.processing += 1,
                JobStatus::Completed => counts.completed += 1,
                JobStatus::Failed => counts.failed += 1,
            }
        }
        counts
    }

    /// Remove terminal jobs that ended at least `retention` ago and return
    /// them. Jobs still queued or processing are never evicted.
    pub fn evict_expired(&self, retention: Duration) -> Vec<SeparationJob> {
        let retention =
            chrono::Duration::from_std(retention).unwrap_or_else(|_| chrono::Duration::days(36_500));
        let cutoff = Utc::now() - retention;

        let mut jobs = self.jobs.write();
        let expired: Vec<JobId> = jobs
            .values()
            .filter(|job| job.status.is_terminal())
            .filter(|job| job.ended_at.is_some_and(|ended| ended <= cutoff))
            .map(|job| job.id)
            .collect();

        expired
            .into_iter()
            .filter_map(|id| {
                self.relay.forget(id);
                jobs.remove(&id)
            })
            .collect()
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum JobStoreError {
    #[error("Job not found: {0}")]
    NotFound(JobId),

    #[error("Invalid transition for job {id}: {from} -> {to}")]
    InvalidTransition {
        id: JobId,
        from: JobStatus,
        to: JobStatus,
    },
}
