use chrono::{DateTime, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};

use crate::models::job::{FailureKind, JobId, JobStatus, SeparationJob};
use crate::models::separation::{Device, JobConfiguration, SeparationModel, SeparationResult};

/// Request to separate an audio file already reachable by the server.
#[derive(Debug, Deserialize, Validate)]
pub struct SubmitJobRequest {
    #[garde(length(min = 1, max = 4096))]
    pub input_path: String,

    #[garde(skip)]
    pub model: Option<String>,

    #[garde(skip)]
    pub device: Option<String>,

    #[garde(length(min = 1, max = 64))]
    pub model_variant: Option<String>,

    #[garde(skip)]
    pub verbose: Option<bool>,
}

/// Processing options shared by JSON and multipart submissions.
#[derive(Debug, Default, Clone)]
pub struct SubmitOptions {
    pub model: Option<SeparationModel>,
    pub device: Option<Device>,
    pub model_variant: Option<String>,
    pub verbose: Option<bool>,
}

impl SubmitOptions {
    /// Resolve into a configuration, rejecting a variant that does not
    /// belong to the selected model.
    pub fn into_configuration(self) -> Result<JobConfiguration, String> {
        let model = self.model.unwrap_or_default();
        let model_variant = self.model_variant.filter(|v| !v.trim().is_empty());
        if let Some(variant) = model_variant.as_deref() {
            if !model.supports_variant(variant) {
                return Err(format!(
                    "Unsupported variant '{}' for model {}. Use one of {:?}",
                    variant,
                    model,
                    model.variants()
                ));
            }
        }

        Ok(JobConfiguration {
            model,
            device: self.device.unwrap_or_default(),
            model_variant,
            verbose: self.verbose.unwrap_or(false),
        })
    }
}

impl SubmitJobRequest {
    pub fn options(&self) -> Result<SubmitOptions, String> {
        Ok(SubmitOptions {
            model: self.model.as_deref().map(parse_model).transpose()?,
            device: self.device.as_deref().map(parse_device).transpose()?,
            model_variant: self.model_variant.clone(),
            verbose: self.verbose,
        })
    }
}

/// Parse a model name the way both submission routes accept it (case-insensitive).
pub fn parse_model(value: &str) -> Result<SeparationModel, String> {
    value
        .trim()
        .parse()
        .map_err(|_| format!("Unsupported model: {value}. Use demucs or openunmix"))
}

pub fn parse_device(value: &str) -> Result<Device, String> {
    value
        .trim()
        .parse()
        .map_err(|_| format!("Unsupported device: {value}. Use auto, cpu or cuda"))
}

/// Response after submitting a separation job.
#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitJobResponse {
    pub job_id: JobId,
    pub status: JobStatus,
    pub message: String,
}

/// Client-facing view of a job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobView {
    pub id: JobId,
    pub status: JobStatus,
    pub progress: u8,
    pub input: String,
    pub configuration: JobConfiguration,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<SeparationResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_kind: Option<FailureKind>,
}

impl From<&SeparationJob> for JobView {
    fn from(job: &SeparationJob) -> Self {
        let terminal = job.status.is_terminal();
        Self {
            id: job.id,
            status: job.status,
            progress: job.progress,
            input: job.input.descriptor.clone(),
            configuration: job.configuration.clone(),
            created_at: job.created_at,
            started_at: job.started_at,
            ended_at: job.ended_at,
            result: job.result.clone().filter(|_| terminal),
            failure_reason: job.failure.as_ref().filter(|_| terminal).map(|f| f.reason.clone()),
            failure_kind: job.failure.as_ref().filter(|_| terminal).map(|f| f.kind),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
