use std::time::Duration;

use ::metrics::{counter, histogram};

/// Messages appended to the data lake
pub const MESSAGES_SCRAPED: &str = "pipeline_messages_scraped_total";
/// Photos saved next to the logs
pub const PHOTOS_DOWNLOADED: &str = "pipeline_photos_downloaded_total";
/// Raw rows committed by the loader
pub const ROWS_LOADED: &str = "pipeline_rows_loaded_total";
/// Malformed log lines the loader skipped
pub const LINES_SKIPPED: &str = "pipeline_lines_skipped_total";
/// Detection rows written by the enricher
pub const DETECTIONS_INSERTED: &str = "pipeline_detections_inserted_total";
/// Wall time of each pipeline step, labelled by step
pub const STEP_DURATION: &str = "pipeline_step_duration_seconds";
/// Failed pipeline steps, labelled by step
pub const STEP_FAILURES: &str = "pipeline_step_failures_total";
/// Analytics API requests, labelled by endpoint
pub const API_REQUESTS: &str = "api_requests_total";

/// Add `count` to one of the unlabelled pipeline counters
pub fn increment(name: &'static str, count: usize) {
    counter!(name).increment(u64::try_from(count).unwrap_or(u64::MAX));
}

/// Record how one pipeline step went
pub fn record_step(step: &str, duration: Duration, success: bool) {
    histogram!(STEP_DURATION, "step" => step.to_owned()).record(duration.as_secs_f64());
    if !success {
        counter!(STEP_FAILURES, "step" => step.to_owned()).increment(1);
    }
}

/// Count a request to an analytics endpoint
pub fn record_api_request(endpoint: &'static str) {
    counter!(API_REQUESTS, "endpoint" => endpoint).increment(1);
}
