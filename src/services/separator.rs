use async_trait::async_trait;
use serde::Deserialize;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;

use crate::config::AppConfig;
use crate::models::job::{FailureKind, JobFailure};
use crate::models::separation::{JobConfiguration, SeparationResult, Stem};

/// Number of trailing stderr lines kept in a failure reason.
const STDERR_TAIL_LINES: usize = 20;

/// One separation run: read `input`, write stems into `output_dir`.
#[derive(Debug, Clone)]
pub struct SeparationRequest {
    pub input: PathBuf,
    pub output_dir: PathBuf,
    pub configuration: JobConfiguration,
}

/// The external separation computation.
///
/// Implementations either return the produced stems or fail with a
/// diagnostic. Cancellation happens by dropping the returned future.
#[async_trait]
pub trait Separator: Send + Sync {
    async fn separate(&self, request: &SeparationRequest)
        -> Result<SeparationResult, SeparationError>;
}

#[derive(Debug, thiserror::Error)]
pub enum SeparationError {
    #[error("Input file not found: {}", .0.display())]
    InputNotFound(PathBuf),

    #[error("Input file is not readable: {}: {source}", .path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unsupported format: {0}. Supported formats: mp3, wav, flac, m4a, aac, ogg, wma")]
    UnsupportedFormat(String),

    #[error("Failed to start separator `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Separator exited with {status}: {stderr}")]
    ProcessFailed { status: String, stderr: String },

    #[error("{0}")]
    Reported(String),

    #[error("Malformed separator output: {0}")]
    MalformedOutput(String),
}

impl SeparationError {
    pub fn kind(&self) -> FailureKind {
        match self {
            SeparationError::InputNotFound(_) => FailureKind::NotFound,
            SeparationError::UnsupportedFormat(_) => FailureKind::UnsupportedFormat,
            SeparationError::Unreadable { .. }
            | SeparationError::Spawn { .. }
            | SeparationError::ProcessFailed { .. }
            | SeparationError::Reported(_)
            | SeparationError::MalformedOutput(_) => FailureKind::InvocationFailure,
        }
    }

    pub fn into_failure(self) -> JobFailure {
        JobFailure::new(self.kind(), self.to_string())
    }
}

/// JSON document the separation CLI prints on stdout.
#[derive(Debug, Deserialize)]
struct ProcessReport {
    success: bool,
    output_folder: Option<String>,
    model_used: Option<String>,
    processing_time: Option<f64>,
    #[serde(default)]
    stems: Vec<String>,
    error: Option<String>,
}

/// Runs the Python separation CLI as a child process per request.
pub struct ProcessSeparator {
    program: String,
    base_args: Vec<String>,
    workdir: Option<PathBuf>,
}

impl ProcessSeparator {
    pub fn new(program: impl Into<String>, base_args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            base_args,
            workdir: None,
        }
    }

    pub fn with_workdir(mut self, workdir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(workdir.into());
        self
    }

    pub fn from_config(config: &AppConfig) -> Self {
        let separator = Self::new(config.separator_program.clone(), config.separator_args.clone());
        match &config.separator_workdir {
            Some(dir) => separator.with_workdir(dir),
            None => separator,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    fn build_args(&self, request: &SeparationRequest) -> Vec<OsString> {
        let config = &request.configuration;
        let mut args: Vec<OsString> = self.base_args.iter().map(OsString::from).collect();
        args.push("--input".into());
        args.push(request.input.clone().into_os_string());
        args.push("--output".into());
        args.push(request.output_dir.clone().into_os_string());
        args.push("--model".into());
        args.push(config.model.to_string().into());
        args.push("--device".into());
        args.push(config.device.to_string().into());
        if let Some(variant) = &config.model_variant {
            args.push("--model-variant".into());
            args.push(variant.into());
        }
        args.push(OsString::from(if config.verbose { "--verbose" } else { "--quiet" }));
        args
    }
}

#[async_trait]
impl Separator for ProcessSeparator {
    async fn separate(
        &self,
        request: &SeparationRequest,
    ) -> Result<SeparationResult, SeparationError> {
        let args = self.build_args(request);
        tracing::debug!(program = %self.program, ?args, "Running separator");

        let mut command = Command::new(&self.program);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.workdir {
            command.current_dir(dir);
        }

        let child = command.spawn().map_err(|source| SeparationError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| SeparationError::ProcessFailed {
                status: "unknown status".to_string(),
                stderr: e.to_string(),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        match parse_report(&stdout) {
            Some(report) => interpret_report(report, request),
            None if !output.status.success() => Err(SeparationError::ProcessFailed {
                status: output.status.to_string(),
                stderr: stderr_tail(&stderr),
            }),
            None => Err(SeparationError::MalformedOutput(truncate(stdout.trim(), 200))),
        }
    }
}

/// Parse the report, tolerating stray lines printed around the JSON object.
fn parse_report(stdout: &str) -> Option<ProcessReport> {
    let trimmed = stdout.trim();
    if let Ok(report) = serde_json::from_str(trimmed) {
        return Some(report);
    }
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&trimmed[start..=end]).ok()
}

fn interpret_report(
    report: ProcessReport,
    request: &SeparationRequest,
) -> Result<SeparationResult, SeparationError> {
    if !report.success {
        return Err(SeparationError::Reported(
            report
                .error
                .unwrap_or_else(|| "Separation failed without a diagnostic".to_string()),
        ));
    }

    let stems = Stem::canonical_names(report.stems.iter().map(String::as_str));
    if stems.is_empty() {
        return Err(SeparationError::Reported(
            "Separation produced no stems".to_string(),
        ));
    }

    Ok(SeparationResult {
        output_dir: report
            .output_folder
            .map(PathBuf::from)
            .unwrap_or_else(|| request.output_dir.clone()),
        model_used: report
            .model_used
            .unwrap_or_else(|| request.configuration.model.to_string()),
        processing_time_secs: report.processing_time.unwrap_or_default(),
        stems,
    })
}

fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.lines().collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    let tail = lines[start..].join("\n");
    if tail.is_empty() {
        "no diagnostic output".to_string()
    } else {
        tail
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::separation::{Device, SeparationModel};

    fn request(configuration: JobConfiguration) -> SeparationRequest {
        SeparationRequest {
            input: PathBuf::from("/data/song.mp3"),
            output_dir: PathBuf::from("/data/output/job"),
            configuration,
        }
    }

    #[test]
    fn test_build_args_passes_configuration_through() {
        let separator = ProcessSeparator::new("python", vec!["-m".into(), "src.main".into()]);
        let args = separator.build_args(&request(JobConfiguration {
            model: SeparationModel::OpenUnmix,
            device: Device::Cuda,
            model_variant: Some("umx".into()),
            verbose: true,
        }));
        let args: Vec<String> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();

        assert_eq!(
            args,
            vec![
                "-m", "src.main", "--input", "/data/song.mp3", "--output", "/data/output/job",
                "--model", "openunmix", "--device", "cuda", "--model-variant", "umx", "--verbose",
            ]
        );
    }

    #[test]
    fn test_build_args_quiet_without_variant() {
        let separator = ProcessSeparator::new("separate", vec![]);
        let args = separator.build_args(&request(JobConfiguration::default()));
        let args: Vec<String> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        assert!(!args.contains(&"--model-variant".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("--quiet"));
        assert!(args.windows(2).any(|w| w[0] == "--device" && w[1] == "auto"));
    }

    #[test]
    fn test_success_report_is_normalized() {
        let stdout = r#"{
  "success": true,
  "input_file": "/data/song.mp3",
  "output_folder": "/data/output/job",
  "model_used": "demucs",
  "processing_time": 42.17,
  "stems": ["drums.wav", "bass.wav", "other.wav", "vocals.wav"]
}"#;
        let report = parse_report(stdout).unwrap();
        let result = interpret_report(report, &request(JobConfiguration::default())).unwrap();

        assert_eq!(result.stems, vec!["vocals", "drums", "bass", "other"]);
        assert_eq!(result.model_used, "demucs");
        assert_eq!(result.output_dir, PathBuf::from("/data/output/job"));
        assert!((result.processing_time_secs - 42.17).abs() < f64::EPSILON);
    }

    #[test]
    fn test_failure_report_carries_error() {
        let stdout = r#"{"success": false, "error": "Failed to load audio", "input_file": "x"}"#;
        let report = parse_report(stdout).unwrap();
        let err = interpret_report(report, &request(JobConfiguration::default())).unwrap_err();

        assert_eq!(err.to_string(), "Failed to load audio");
        assert_eq!(err.kind(), FailureKind::InvocationFailure);
    }

    #[test]
    fn test_report_found_among_stray_output() {
        let stdout = "Downloading model...\n{\"success\": true, \"stems\": [\"vocals.wav\"]}\n";
        let report = parse_report(stdout).unwrap();
        let result = interpret_report(report, &request(JobConfiguration::default())).unwrap();
        assert_eq!(result.stems, vec!["vocals"]);
        assert_eq!(result.output_dir, PathBuf::from("/data/output/job"));
    }

    #[test]
    fn test_empty_stems_is_failure() {
        let report = parse_report(r#"{"success": true, "stems": []}"#).unwrap();
        assert!(interpret_report(report, &request(JobConfiguration::default())).is_err());
    }

    #[test]
    fn test_garbage_output_does_not_parse() {
        assert!(parse_report("Traceback (most recent call last):").is_none());
        assert!(parse_report("} nothing {").is_none());
    }

    #[test]
    fn test_stderr_tail_keeps_last_lines() {
        let stderr: String = (0..50).map(|i| format!("line {i}\n")).collect();
        let tail = stderr_tail(&stderr);
        assert!(tail.starts_with("line 30"));
        assert!(tail.ends_with("line 49"));
        assert_eq!(stderr_tail(""), "no diagnostic output");
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            SeparationError::InputNotFound(PathBuf::from("a.wav")).kind(),
            FailureKind::NotFound
        );
        assert_eq!(
            SeparationError::UnsupportedFormat(".png".into()).kind(),
            FailureKind::UnsupportedFormat
        );
        let failure = SeparationError::InputNotFound(PathBuf::from("a.wav")).into_failure();
        assert_eq!(failure.reason, "Input file not found: a.wav");
    }
}
