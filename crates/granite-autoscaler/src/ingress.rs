//! Snapshot deserialization for the supported ingress paths.
//!
//! A snapshot arrives either as a raw JSON body or as a base64-encoded
//! JSON payload on a message-bus envelope. Both funnel into the same
//! validated [`InstanceSnapshot`]; processing is identical to a direct
//! in-process call from there on.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use tracing::debug;

use crate::error::{AutoscalerError, Result};
use crate::types::InstanceSnapshot;

/// Parses and validates a snapshot from a JSON body.
///
/// # Errors
///
/// Returns [`AutoscalerError::MalformedSnapshot`] when the body is not
/// valid JSON, or [`AutoscalerError::InvalidSnapshot`] when it violates a
/// structural constraint.
pub fn snapshot_from_json(body: &[u8]) -> Result<InstanceSnapshot> {
    let snapshot: InstanceSnapshot =
        serde_json::from_slice(body).map_err(|e| AutoscalerError::MalformedSnapshot {
            reason: e.to_string(),
        })?;
    snapshot.validate()?;
    debug!(
        project = %snapshot.project_id,
        instance = %snapshot.instance_id,
        "snapshot parsed from json body"
    );
    Ok(snapshot)
}

/// Parses and validates a snapshot from a base64-encoded envelope payload.
///
/// # Errors
///
/// See [`snapshot_from_json`]; a payload that is not valid base64 is also
/// a [`AutoscalerError::MalformedSnapshot`].
pub fn snapshot_from_envelope(data: &str) -> Result<InstanceSnapshot> {
    let decoded = STANDARD
        .decode(data.trim())
        .map_err(|e| AutoscalerError::MalformedSnapshot {
            reason: format!("invalid base64 payload: {e}"),
        })?;
    snapshot_from_json(&decoded)
}
