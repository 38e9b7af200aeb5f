//! Autoscaler counters.
//!
//! A thin facade over the `metrics` crate. Recording is immediate and
//! exporter-agnostic; whichever recorder the host process installs decides
//! how and when tallies leave the process.

use metrics::{counter, describe_counter, describe_histogram, histogram};

use crate::types::DenialReason;

/// Ticks that completed without error.
pub const REQUESTS_SUCCESS: &str = "granite_autoscaler_requests_success_total";

/// Ticks aborted by a parse, strategy, or store error.
pub const REQUESTS_FAILED: &str = "granite_autoscaler_requests_failed_total";

/// Resize operations that completed successfully.
pub const SCALING_SUCCESS: &str = "granite_autoscaler_scaling_success_total";

/// Resize submissions or operations that failed.
pub const SCALING_FAILED: &str = "granite_autoscaler_scaling_failed_total";

/// Ticks that declined to resize, labelled by reason.
pub const SCALING_DENIED: &str = "granite_autoscaler_scaling_denied_total";

/// End-to-end resize duration in milliseconds, labelled by method and
/// previous/requested size.
pub const SCALING_DURATION_MS: &str = "granite_autoscaler_scaling_duration_ms";

/// Operations completed by the status-API-failure fallback. A climbing
/// value means the status API is persistently unreachable.
pub const STATUS_FALLBACK: &str = "granite_autoscaler_status_fallback_total";

/// Registers metric descriptions. Call once at startup, after installing
/// the recorder.
pub fn register_metrics() {
    describe_counter!(REQUESTS_SUCCESS, "Ticks that completed without error");
    describe_counter!(
        REQUESTS_FAILED,
        "Ticks aborted by a parse, strategy, or store error"
    );
    describe_counter!(SCALING_SUCCESS, "Resize operations completed successfully");
    describe_counter!(SCALING_FAILED, "Resize submissions or operations that failed");
    describe_counter!(SCALING_DENIED, "Ticks that declined to resize, by reason");
    describe_histogram!(
        SCALING_DURATION_MS,
        "End-to-end resize duration in milliseconds"
    );
    describe_counter!(
        STATUS_FALLBACK,
        "Operations completed by the status-API-failure fallback"
    );
}

/// Records the outcome of one tick.
pub fn record_request(success: bool) {
    if success {
        counter!(REQUESTS_SUCCESS).increment(1);
    } else {
        counter!(REQUESTS_FAILED).increment(1);
    }
}

/// Records a successfully completed resize.
pub fn record_scaling_success() {
    counter!(SCALING_SUCCESS).increment(1);
}

/// Records a failed resize submission or operation.
pub fn record_scaling_failed() {
    counter!(SCALING_FAILED).increment(1);
}

/// Records a declined tick.
pub fn record_scaling_denied(reason: DenialReason) {
    counter!(SCALING_DENIED, "reason" => reason.as_str()).increment(1);
}

/// Records how long a resize took, with the metadata on record.
#[allow(clippy::cast_precision_loss)]
pub fn record_scaling_duration(
    method: Option<&str>,
    previous_size: Option<u64>,
    requested_size: Option<u64>,
    duration_ms: i64,
) {
    let labels = [
        ("method", method.unwrap_or("unknown").to_string()),
        (
            "previous_size",
            previous_size.map_or_else(|| "unknown".to_string(), |v| v.to_string()),
        ),
        (
            "requested_size",
            requested_size.map_or_else(|| "unknown".to_string(), |v| v.to_string()),
        ),
    ];
    histogram!(SCALING_DURATION_MS, &labels).record(duration_ms.max(0) as f64);
}

/// Records a completed-by-fallback operation.
pub fn record_status_fallback() {
    counter!(STATUS_FALLBACK).increment(1);
}
