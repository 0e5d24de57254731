use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use crate::models::separation::{JobConfiguration, SeparationResult};

pub type JobId = Uuid;

/// Status of a separation job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Statuses only move forward: queued -> processing -> completed | failed.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Queued, JobStatus::Processing)
                | (JobStatus::Processing, JobStatus::Completed)
                | (JobStatus::Processing, JobStatus::Failed)
        )
    }
}

/// Classification of a failed job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FailureKind {
    NotFound,
    UnsupportedFormat,
    InvocationFailure,
    Timeout,
    Internal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobFailure {
    pub kind: FailureKind,
    pub reason: String,
}

impl JobFailure {
    pub fn new(kind: FailureKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
        }
    }

    pub fn timeout() -> Self {
        Self::new(FailureKind::Timeout, "timeout")
    }
}

/// A single forward move of a job, carrying the payload recorded with it.
#[derive(Debug, Clone)]
pub enum Transition {
    Processing,
    Completed(SeparationResult),
    Failed(JobFailure),
}

impl Transition {
    pub fn target(&self) -> JobStatus {
        match self {
            Transition::Processing => JobStatus::Processing,
            Transition::Completed(_) => JobStatus::Completed,
            Transition::Failed(_) => JobStatus::Failed,
        }
    }
}

/// The audio a job reads.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobInput {
    /// Location on this host handed to the separation process.
    #[serde(skip)]
    pub path: PathBuf,
    /// How clients refer to the input: the submitted path, or the original
    /// file name of an upload.
    pub descriptor: String,
    /// Stored by the upload route for this job and deleted with it.
    #[serde(skip)]
    pub owned_upload: bool,
}

impl JobInput {
    /// A file the server already had; it is never deleted by the service.
    pub fn local(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            descriptor: path.display().to_string(),
            path,
            owned_upload: false,
        }
    }

    pub fn upload(path: impl Into<PathBuf>, file_name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            descriptor: file_name.into(),
            owned_upload: true,
        }
    }
}

impl From<&str> for JobInput {
    fn from(path: &str) -> Self {
        Self::local(path)
    }
}

impl From<String> for JobInput {
    fn from(path: String) -> Self {
        Self::local(path)
    }
}

impl From<PathBuf> for JobInput {
    fn from(path: PathBuf) -> Self {
        Self::local(path)
    }
}

/// A tracked separation job.
///
/// `result` is only set once the job is `Completed` and `failure` only once
/// it is `Failed`.
#[derive(Debug, Clone, Serialize)]
pub struct SeparationJob {
    pub id: JobId,
    pub status: JobStatus,
    pub input: JobInput,
    pub configuration: JobConfiguration,
    pub progress: u8,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub result: Option<SeparationResult>,
    pub failure: Option<JobFailure>,
}

impl SeparationJob {
    pub fn new(id: JobId, input: JobInput, configuration: JobConfiguration) -> Self {
        Self {
            id,
            status: JobStatus::Queued,
            input,
            configuration,
            progress: 0,
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
            result: None,
            failure: None,
        }
    }

    /// Apply `transition` in place. Callers must check legality first.
    pub(crate) fn apply(&mut self, transition: Transition) {
        let now = Utc::now();
        self.status = transition.target();
        match transition {
            Transition::Processing => {
                self.started_at = Some(now);
            }
            Transition::Completed(result) => {
                self.progress = 100;
                self.ended_at = Some(now);
                self.result = Some(result);
            }
            Transition::Failed(failure) => {
                self.ended_at = Some(now);
                self.failure = Some(failure);
            }
        }
    }
}
