//! Shared fixtures for in-process tests: scratch storage and scripted
//! separators standing in for the real separation CLI.
#![allow(dead_code)]

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use stem_separator_service::{
    models::api::JobView,
    models::job::JobId,
    models::separation::{SeparationResult, Stem},
    services::job_store::JobStore,
    services::separator::{SeparationError, SeparationRequest, Separator},
    services::storage::LocalStorage,
};

pub const STEM_BYTES: &[u8] = b"RIFF....WAVEfmt stem";

/// Storage rooted in a fresh temp directory.
pub async fn scratch_storage() -> LocalStorage {
    let root = std::env::temp_dir().join(format!("stem-it-{}", uuid::Uuid::new_v4()));
    LocalStorage::init(root.join("uploads"), root.join("output"))
        .await
        .expect("Failed to create scratch storage")
}

/// Write a small audio file into the upload directory and return its path.
pub async fn audio_file(storage: &LocalStorage, name: &str) -> PathBuf {
    storage
        .upload(name, b"RIFF....WAVE")
        .await
        .expect("Failed to write audio fixture")
}

/// Wait until the job reaches a terminal state and return every state the
/// subscription observed, the initial snapshot first.
pub async fn observe_until_terminal(store: &JobStore, id: JobId) -> Vec<JobView> {
    let (snapshot, mut subscription) = store.subscribe(id).expect("Job should exist");
    let mut seen = Vec::new();
    if !snapshot.status.is_terminal() {
        seen.push(snapshot);
    }

    tokio::time::timeout(Duration::from_secs(10), async {
        while let Some(view) = subscription.recv().await {
            let terminal = view.status.is_terminal();
            seen.push(view);
            if terminal {
                break;
            }
        }
    })
    .await
    .expect("Job did not finish in time");

    seen
}

pub async fn wait_for_terminal(store: &JobStore, id: JobId) -> JobView {
    observe_until_terminal(store, id)
        .await
        .pop()
        .expect("Subscription ended without a state")
}

/// Writes every stem into the job's output directory and reports success.
#[derive(Default)]
pub struct StemWriter {
    pub calls: AtomicUsize,
}

#[async_trait]
impl Separator for StemWriter {
    async fn separate(
        &self,
        request: &SeparationRequest,
    ) -> Result<SeparationResult, SeparationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut stems = Vec::new();
        for stem in [Stem::Drums, Stem::Other, Stem::Vocals, Stem::Bass] {
            tokio::fs::write(request.output_dir.join(stem.file_name()), STEM_BYTES)
                .await
                .map_err(|e| SeparationError::Reported(e.to_string()))?;
            stems.push(stem.file_name());
        }

        Ok(SeparationResult {
            output_dir: request.output_dir.clone(),
            model_used: request.configuration.model.to_string(),
            processing_time_secs: 0.01,
            stems: Stem::canonical_names(stems.iter().map(String::as_str)),
        })
    }
}

/// Never finishes on its own.
pub struct Stalled;

#[async_trait]
impl Separator for Stalled {
    async fn separate(
        &self,
        _request: &SeparationRequest,
    ) -> Result<SeparationResult, SeparationError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Err(SeparationError::Reported("woke up".to_string()))
    }
}

pub struct Panicking;

#[async_trait]
impl Separator for Panicking {
    async fn separate(
        &self,
        _request: &SeparationRequest,
    ) -> Result<SeparationResult, SeparationError> {
        panic!("separator blew up");
    }
}

/// Reports a failure the way the CLI does for an undecodable file.
pub struct Rejecting;

#[async_trait]
impl Separator for Rejecting {
    async fn separate(
        &self,
        _request: &SeparationRequest,
    ) -> Result<SeparationResult, SeparationError> {
        Err(SeparationError::Reported("Failed to load audio".to_string()))
    }
}

/// Tracks how many invocations overlap.
#[derive(Default)]
pub struct Overlap {
    active: AtomicUsize,
    pub peak: AtomicUsize,
}

#[async_trait]
impl Separator for Overlap {
    async fn separate(
        &self,
        request: &SeparationRequest,
    ) -> Result<SeparationResult, SeparationError> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(30)).await;
        self.active.fetch_sub(1, Ordering::SeqCst);

        Ok(SeparationResult {
            output_dir: request.output_dir.clone(),
            model_used: request.configuration.model.to_string(),
            processing_time_secs: 0.03,
            stems: vec!["vocals".to_string()],
        })
    }
}
