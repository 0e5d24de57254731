use std::sync::Arc;

use crate::services::{
    job_store::JobStore,
    relay::NotificationRelay,
    runner::{JobRunner, RunnerSettings},
    separator::Separator,
    storage::LocalStorage,
};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub jobs: Arc<JobStore>,
    pub runner: Arc<JobRunner>,
    pub storage: Arc<LocalStorage>,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(
        storage: LocalStorage,
        separator: Arc<dyn Separator>,
        settings: RunnerSettings,
        max_upload_bytes: usize,
    ) -> Self {
        let jobs = Arc::new(JobStore::new(NotificationRelay::new()));
        let storage = Arc::new(storage);
        let runner = Arc::new(JobRunner::new(
            Arc::clone(&jobs),
            Arc::clone(&storage),
            separator,
            settings,
        ));

        Self {
            jobs,
            runner,
            storage,
            max_upload_bytes,
        }
    }
}
