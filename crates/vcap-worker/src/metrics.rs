//! Pipeline metrics.

use metrics::{counter, histogram};

use vcap_models::PipelineStage;

/// Metric names as constants for consistency.
pub mod names {
    pub const PIPELINE_RUNS_TOTAL: &str = "vcap_pipeline_runs_total";
    pub const PIPELINE_DURATION_SECONDS: &str = "vcap_pipeline_duration_seconds";
    pub const CACHE_LOOKUPS_TOTAL: &str = "vcap_cache_lookups_total";
    pub const STAGE_DURATION_SECONDS: &str = "vcap_stage_duration_seconds";
    pub const SINGLE_FLIGHT_WAITS_TOTAL: &str = "vcap_single_flight_waits_total";
}

/// Record a finished run; `outcome` is `hit`, `generated` or `failed`.
pub fn record_run(outcome: &str, stage: Option<PipelineStage>, duration_secs: f64) {
    let labels = [
        ("outcome", outcome.to_string()),
        ("stage", stage.map(|s| s.as_str()).unwrap_or("none").to_string()),
    ];
    counter!(names::PIPELINE_RUNS_TOTAL, &labels).increment(1);
    histogram!(names::PIPELINE_DURATION_SECONDS, "outcome" => outcome.to_string())
        .record(duration_secs);
}

pub fn record_cache_lookup(hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    counter!(names::CACHE_LOOKUPS_TOTAL, "result" => result).increment(1);
}

pub fn record_stage_duration(stage: PipelineStage, duration_secs: f64) {
    histogram!(names::STAGE_DURATION_SECONDS, "stage" => stage.as_str()).record(duration_secs);
}

pub fn record_single_flight_wait() {
    counter!(names::SINGLE_FLIGHT_WAITS_TOTAL).increment(1);
}
