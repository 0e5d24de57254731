use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::services::runner::RunnerSettings;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000").
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Program that runs one separation (the Python interpreter by default).
    #[serde(default = "default_separator_program")]
    pub separator_program: String,

    /// Arguments placed before the per-job arguments, comma separated in the
    /// environment.
    #[serde(default = "default_separator_args")]
    pub separator_args: Vec<String>,

    /// Working directory of the separation process.
    pub separator_workdir: Option<PathBuf>,

    /// Root directory for job outputs; each job gets `<output_root>/<job_id>`.
    #[serde(default = "default_output_root")]
    pub output_root: PathBuf,

    /// Directory where uploaded audio files are stored.
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,

    /// Upper bound for one separation run. `0` disables the bound.
    #[serde(default = "default_invocation_timeout_secs")]
    pub invocation_timeout_secs: u64,

    /// Number of separations allowed to run at the same time.
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,

    /// How long finished jobs stay queryable.
    #[serde(default = "default_job_retention_secs")]
    pub job_retention_secs: u64,

    /// Interval between retention sweeps.
    #[serde(default = "default_retention_sweep_secs")]
    pub retention_sweep_secs: u64,

    /// Maximum accepted upload size in megabytes.
    #[serde(default = "default_max_upload_mb")]
    pub max_upload_mb: usize,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_separator_program() -> String {
    "python".to_string()
}

fn default_separator_args() -> Vec<String> {
    vec!["-m".to_string(), "src.main".to_string()]
}

fn default_output_root() -> PathBuf {
    PathBuf::from("./output")
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("./uploads")
}

fn default_invocation_timeout_secs() -> u64 {
    1800
}

fn default_max_concurrent_jobs() -> usize {
    2
}

fn default_job_retention_secs() -> u64 {
    3600
}

fn default_retention_sweep_secs() -> u64 {
    60
}

fn default_max_upload_mb() -> usize {
    500
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    pub fn invocation_timeout(&self) -> Option<Duration> {
        (self.invocation_timeout_secs > 0).then(|| Duration::from_secs(self.invocation_timeout_secs))
    }

    pub fn job_retention(&self) -> Duration {
        Duration::from_secs(self.job_retention_secs)
    }

    pub fn retention_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.retention_sweep_secs.max(1))
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb.saturating_mul(1024 * 1024)
    }

    pub fn runner_settings(&self) -> RunnerSettings {
        RunnerSettings {
            timeout: self.invocation_timeout(),
            max_concurrent_jobs: self.max_concurrent_jobs,
        }
    }
}
