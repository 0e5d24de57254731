//! Metric names and their registration with the installed recorder.

pub const JOBS_SUBMITTED: &str = "separation_jobs_submitted_total";
pub const JOBS_COMPLETED: &str = "separation_jobs_completed_total";
pub const JOBS_FAILED: &str = "separation_jobs_failed_total";
pub const JOBS_IN_FLIGHT: &str = "separation_jobs_in_flight";
pub const PROCESSING_SECONDS: &str = "separation_processing_seconds";

pub fn describe_metrics() {
    metrics::describe_counter!(JOBS_SUBMITTED, "Total separation jobs submitted");
    metrics::describe_counter!(JOBS_COMPLETED, "Total separation jobs completed");
    metrics::describe_counter!(JOBS_FAILED, "Total separation jobs that failed, by failure kind");
    metrics::describe_gauge!(JOBS_IN_FLIGHT, "Separation invocations currently running");
    metrics::describe_histogram!(
        PROCESSING_SECONDS,
        metrics::Unit::Seconds,
        "Wall time of successful separation invocations"
    );
}
