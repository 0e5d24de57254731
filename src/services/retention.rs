use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::services::job_store::JobStore;
use crate::services::storage::LocalStorage;

/// Evict finished jobs older than `retention` and delete their outputs and
/// any audio uploaded for them.
/// Returns the number of evicted jobs.
pub async fn sweep_expired(store: &JobStore, storage: &LocalStorage, retention: Duration) -> usize {
    let evicted = store.evict_expired(retention);

    for job in &evicted {
        if let Err(e) = storage.remove_job_output(job.id).await {
            tracing::warn!(job_id = %job.id, error = %e, "Failed to remove output of evicted job");
        }
        if job.input.owned_upload {
            storage.discard_upload(&job.input.path).await;
        }
        tracing::debug!(job_id = %job.id, status = %job.status, "Evicted expired job");
    }

    if !evicted.is_empty() {
        tracing::info!(evicted = evicted.len(), "Retention sweep complete");
    }

    evicted.len()
}

/// Run `sweep_expired` every `every` until the runtime shuts down.
pub fn spawn_sweeper(
    store: Arc<JobStore>,
    storage: Arc<LocalStorage>,
    retention: Duration,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            sweep_expired(&store, &storage, retention).await;
        }
    })
}
