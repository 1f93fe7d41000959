//! Observability metrics for the engine
//!
//! Emitted through the `metrics` crate facade. All observations are
//! fire-and-forget plumbing: nothing here may affect control flow.

use metrics::{counter, histogram};

use trellis_core::domain::pipeline::FailureReason;

/// Metric names as constants for consistency.
pub mod names {
    /// Histogram: duration of one pipeline chain step in seconds.
    pub const STEP_DURATION_SECONDS: &str = "trellis_pipeline_creation_step_duration_seconds";
    /// Histogram: duration of a whole pipeline creation attempt in seconds.
    pub const CREATION_DURATION_SECONDS: &str = "trellis_pipeline_creation_duration_seconds";
    /// Histogram: size of a created pipeline in jobs.
    pub const PIPELINE_SIZE_JOBS: &str = "trellis_pipeline_size_jobs";
    /// Counter: pipeline creation attempts rejected, by terminal reason.
    pub const PIPELINE_FAILURES_TOTAL: &str = "trellis_pipeline_failures_total";
    /// Counter: artifacts destroyed by the expiry sweeper.
    pub const ARTIFACTS_REMOVED_TOTAL: &str = "trellis_artifacts_removed_total";
    /// Counter: sweep batches whose destroy failed.
    pub const SWEEP_BATCH_FAILURES_TOTAL: &str = "trellis_sweep_batch_failures_total";
}

/// Label keys used across metrics.
pub mod labels {
    /// Chain step name.
    pub const STEP: &str = "step";
    /// Terminal failure reason.
    pub const REASON: &str = "reason";
}

pub fn observe_step_duration(step: &'static str, seconds: f64) {
    histogram!(names::STEP_DURATION_SECONDS, labels::STEP => step).record(seconds);
}

pub fn observe_creation_duration(seconds: f64) {
    histogram!(names::CREATION_DURATION_SECONDS).record(seconds);
}

pub fn observe_pipeline_size(jobs: usize) {
    histogram!(names::PIPELINE_SIZE_JOBS).record(jobs as f64);
}

pub fn increment_failure_reason(reason: FailureReason) {
    counter!(names::PIPELINE_FAILURES_TOTAL, labels::REASON => reason.as_str()).increment(1);
}

pub fn add_removed_artifacts(count: u64) {
    counter!(names::ARTIFACTS_REMOVED_TOTAL).increment(count);
}

pub fn increment_sweep_batch_failure() {
    counter!(names::SWEEP_BATCH_FAILURES_TOTAL).increment(1);
}
