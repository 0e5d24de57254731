//! Test helper utilities for E2E testing against a running server

use reqwest::multipart;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::time::sleep;
use uuid::Uuid;

/// Response from POST /api/v1/jobs and /api/v1/jobs/upload
#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub job_id: Uuid,
    pub status: String,
}

/// Response from GET /api/v1/jobs/{job_id}
#[derive(Debug, Serialize, Deserialize)]
pub struct JobStatusResponse {
    pub id: Uuid,
    pub status: String,
    pub progress: u8,
    pub result: Option<SeparationOutput>,
    pub failure_reason: Option<String>,
    pub failure_kind: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SeparationOutput {
    pub output_dir: String,
    pub model_used: String,
    pub processing_time_secs: f64,
    pub stems: Vec<String>,
}

/// One second of 16-bit mono silence at 44.1kHz, as a WAV file.
pub fn silent_wav() -> Vec<u8> {
    let sample_rate: u32 = 44_100;
    let data_len: u32 = sample_rate * 2;
    let mut wav = Vec::with_capacity(44 + data_len as usize);
    wav.extend_from_slice(b"RIFF");
    wav.extend_from_slice(&(36 + data_len).to_le_bytes());
    wav.extend_from_slice(b"WAVEfmt ");
    wav.extend_from_slice(&16u32.to_le_bytes());
    wav.extend_from_slice(&1u16.to_le_bytes());
    wav.extend_from_slice(&1u16.to_le_bytes());
    wav.extend_from_slice(&sample_rate.to_le_bytes());
    wav.extend_from_slice(&(sample_rate * 2).to_le_bytes());
    wav.extend_from_slice(&2u16.to_le_bytes());
    wav.extend_from_slice(&16u16.to_le_bytes());
    wav.extend_from_slice(b"data");
    wav.extend_from_slice(&data_len.to_le_bytes());
    wav.resize(44 + data_len as usize, 0);
    wav
}

/// Upload audio to the upload endpoint
pub async fn upload_audio(
    client: &reqwest::Client,
    base_url: &str,
    file_name: &str,
    audio: Vec<u8>,
    model: Option<&str>,
) -> Result<SubmitResponse, Box<dyn std::error::Error>> {
    let mut form = multipart::Form::new().part(
        "audio",
        multipart::Part::bytes(audio)
            .file_name(file_name.to_string())
            .mime_str("audio/wav")?,
    );
    if let Some(m) = model {
        form = form.text("model", m.to_string());
    }

    let response = client
        .post(format!("{}/api/v1/jobs/upload", base_url))
        .multipart(form)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let error_text = response.text().await?;
        return Err(format!("Upload failed with status {}: {}", status, error_text).into());
    }

    Ok(response.json::<SubmitResponse>().await?)
}

/// Submit a file the server can read directly
pub async fn submit_path(
    client: &reqwest::Client,
    base_url: &str,
    input_path: &Path,
) -> Result<SubmitResponse, Box<dyn std::error::Error>> {
    let response = client
        .post(format!("{}/api/v1/jobs", base_url))
        .json(&serde_json::json!({ "input_path": input_path }))
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let error_text = response.text().await?;
        return Err(format!("Submit failed with status {}: {}", status, error_text).into());
    }

    Ok(response.json::<SubmitResponse>().await?)
}

/// Poll job status until completed or failed (with timeout)
pub async fn poll_job_status(
    client: &reqwest::Client,
    base_url: &str,
    job_id: &Uuid,
    timeout_secs: u64,
) -> Result<JobStatusResponse, Box<dyn std::error::Error>> {
    let max_attempts = timeout_secs * 2; // Poll every 500ms

    for attempt in 0..max_attempts {
        let response = client
            .get(format!("{}/api/v1/jobs/{}", base_url, job_id))
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(format!("Status check failed: {}", error_text).into());
        }

        let status_response = response.json::<JobStatusResponse>().await?;

        match status_response.status.as_str() {
            "completed" | "failed" => return Ok(status_response),
            "queued" | "processing" => {
                if attempt % 20 == 0 && attempt > 0 {
                    println!("  ... still waiting (attempt {}/{})", attempt, max_attempts);
                }
                sleep(Duration::from_millis(500)).await;
            }
            _ => {
                return Err(format!("Unknown job status: {}", status_response.status).into());
            }
        }
    }

    Err(format!("Job did not finish within {} seconds", timeout_secs).into())
}

/// Separation on CPU is slow; allow up to ten minutes.
pub async fn wait_for_job_completion(
    client: &reqwest::Client,
    base_url: &str,
    job_id: &Uuid,
) -> Result<JobStatusResponse, Box<dyn std::error::Error>> {
    poll_job_status(client, base_url, job_id, 600).await
}
