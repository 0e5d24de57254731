use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, Path, Request, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::{Stream, StreamExt};
use garde::Validate;
use std::convert::Infallible;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tower::ServiceExt;
use tower_http::services::ServeFile;

use crate::app_state::AppState;
use crate::models::api::{
    parse_device, parse_model, JobView, SubmitJobRequest, SubmitJobResponse, SubmitOptions,
};
use crate::models::job::{JobId, JobInput, JobStatus};
use crate::models::separation::{JobConfiguration, ModelCatalog, Stem};
use crate::routes::error::{parse_job_id, ApiError};
use crate::services::storage::{LocalStorage, StorageError};
use crate::services::validation;

type Accepted = (StatusCode, Json<SubmitJobResponse>);

fn accepted(state: &AppState, input: JobInput, configuration: JobConfiguration) -> Accepted {
    let job_id: JobId = state.runner.submit(input, configuration);
    (
        StatusCode::ACCEPTED,
        Json(SubmitJobResponse {
            job_id,
            status: JobStatus::Queued,
            message: "Separation job queued".to_string(),
        }),
    )
}

/// POST /api/v1/jobs: Submit a separation job for a file the server can read.
#[tracing::instrument(skip(state, payload))]
pub async fn submit_job(
    State(state): State<AppState>,
    payload: Result<Json<SubmitJobRequest>, JsonRejection>,
) -> Result<Accepted, ApiError> {
    let Json(request) = payload?;
    request
        .validate()
        .map_err(|e| ApiError::Validation(e.to_string()))?;
    let configuration = request
        .options()
        .and_then(SubmitOptions::into_configuration)
        .map_err(ApiError::Validation)?;

    Ok(accepted(&state, JobInput::local(request.input_path), configuration))
}

#[derive(Default)]
struct UploadForm {
    /// Stored path and the client's file name.
    audio: Option<(PathBuf, String)>,
    options: SubmitOptions,
}

/// POST /api/v1/jobs/upload: Upload an audio file and submit it.
///
/// Expects an `audio` file field plus optional `model`, `device`,
/// `model_variant` and `verbose` text fields.
#[tracing::instrument(skip(state, multipart))]
pub async fn upload_job(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Accepted, ApiError> {
    let mut form = UploadForm::default();
    let configuration = match read_upload_form(&state.storage, &mut multipart, &mut form).await {
        Ok(()) => form.options.clone().into_configuration().map_err(ApiError::Validation),
        Err(e) => Err(e),
    };

    let configuration = match configuration {
        Ok(configuration) => configuration,
        Err(e) => {
            if let Some((path, _)) = &form.audio {
                state.storage.discard_upload(path).await;
            }
            return Err(e);
        }
    };

    match form.audio {
        Some((path, file_name)) => Ok(accepted(
            &state,
            JobInput::upload(path, file_name),
            configuration,
        )),
        None => Err(ApiError::BadRequest("No audio file uploaded".to_string())),
    }
}

async fn read_upload_form(
    storage: &LocalStorage,
    multipart: &mut Multipart,
    form: &mut UploadForm,
) -> Result<(), ApiError> {
    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "audio" => {
                if form.audio.is_some() {
                    return Err(ApiError::BadRequest(
                        "Only one audio file per request".to_string(),
                    ));
                }
                let file_name = field.file_name().unwrap_or("upload").to_string();
                if !validation::is_supported_format(std::path::Path::new(&file_name)) {
                    return Err(ApiError::UnsupportedMediaType(format!(
                        "Unsupported audio format: {}. Supported formats: {}",
                        file_name,
                        validation::SUPPORTED_EXTENSIONS.join(", ")
                    )));
                }

                let (path, mut file) = storage.create_upload(&file_name).await?;
                form.audio = Some((path.clone(), file_name.clone()));
                while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
                    file.write_all(&chunk).await.map_err(StorageError::from)?;
                }
                file.flush().await.map_err(StorageError::from)?;

                tracing::debug!(file_name = %file_name, path = %path.display(), "Stored upload");
            }
            "model" => {
                let value = field.text().await.map_err(multipart_error)?;
                form.options.model = Some(parse_model(&value).map_err(ApiError::Validation)?);
            }
            "device" => {
                let value = field.text().await.map_err(multipart_error)?;
                form.options.device = Some(parse_device(&value).map_err(ApiError::Validation)?);
            }
            "model_variant" => {
                form.options.model_variant = Some(field.text().await.map_err(multipart_error)?);
            }
            "verbose" => {
                let value = field.text().await.map_err(multipart_error)?;
                form.options.verbose = Some(matches!(
                    value.trim().to_ascii_lowercase().as_str(),
                    "true" | "1" | "yes" | "on"
                ));
            }
            _ => {
                tracing::debug!(field = %name, "Ignoring unknown multipart field");
            }
        }
    }
    Ok(())
}

fn multipart_error(err: axum::extract::multipart::MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge("Upload exceeds the maximum allowed size".to_string())
    } else {
        ApiError::BadRequest(format!("Failed to read multipart: {}", err.body_text()))
    }
}

/// GET /api/v1/jobs/{job_id}: Current status of a job.
pub async fn get_job_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<JobView>, ApiError> {
    let id = parse_job_id(&job_id)?;
    Ok(Json(state.jobs.view(id)?))
}

/// GET /api/v1/jobs/{job_id}/events: Server-sent job state changes.
///
/// Sends the current state first (unless already terminal), then every
/// transition; the stream ends after the terminal state.
pub async fn job_events(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let id = parse_job_id(&job_id)?;
    let (snapshot, subscription) = state.jobs.subscribe(id)?;

    let initial = (!snapshot.status.is_terminal()).then_some(snapshot);
    let events = futures::stream::iter(initial)
        .chain(subscription.into_stream())
        .map(|view| Ok(job_event(&view)));

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

fn job_event(view: &JobView) -> Event {
    Event::default()
        .event(view.status.to_string())
        .json_data(view)
        .unwrap_or_else(|e| {
            tracing::error!(job_id = %view.id, error = %e, "Failed to encode job event");
            Event::default().event("error")
        })
}

/// GET /api/v1/jobs/{job_id}/artifacts/{stem}: Download one separated stem.
pub async fn get_artifact(
    State(state): State<AppState>,
    Path((job_id, artifact)): Path<(String, String)>,
    request: Request,
) -> Result<Response, ApiError> {
    let id = parse_job_id(&job_id)?;
    let job = state.jobs.get(id)?;

    let stem = Stem::from_file_name(&artifact)
        .ok_or_else(|| ApiError::NotFound(format!("Unknown artifact: {artifact}")))?;

    let result = job
        .result
        .as_ref()
        .filter(|_| job.status == JobStatus::Completed)
        .ok_or_else(|| ApiError::NotFound(format!("Job {id} has no artifacts yet")))?;
    if !result.has_stem(stem) {
        return Err(ApiError::NotFound(format!("Job {id} did not produce {stem}")));
    }

    let path = state.storage.artifact_path(id, stem);
    if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
        return Err(ApiError::NotFound(format!("Artifact {stem} is no longer available")));
    }

    match ServeFile::new(&path).oneshot(request).await {
        Ok(response) => Ok(response.into_response()),
        Err(never) => match never {},
    }
}

/// GET /api/v1/models: Supported models, variants, devices and stems.
pub async fn list_models() -> Json<ModelCatalog> {
    Json(ModelCatalog::current())
}
