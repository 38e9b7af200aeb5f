//! Reconciliation of in-flight resize operations.
//!
//! On every tick with a non-null operation id the tracker fetches the
//! operation's status and settles the durable state: completion timestamps
//! on success, zeroed timestamps on failure, untouched (but persisted)
//! state while the operation is still running.
//!
//! When the status API itself fails, the operation is treated as complete.
//! The service reconciles the resize on its own; wedging every future tick
//! on our inability to read status would be strictly worse. The fallback
//! is counted so a persistent status outage is visible to operators.

use std::sync::Arc;
use std::time::Duration;

use chrono::DateTime;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::driver::{FulfillmentPeriod, OperationMetadata, OperationStatus, OperationsApi};
use crate::error::{AutoscalerError, Result};
use crate::metrics;
use crate::state::{ScalingState, StateStore};
use crate::types::InstanceSnapshot;

/// Polls the long-running resize operation and classifies its outcome.
pub struct OperationTracker {
    operations: Arc<dyn OperationsApi>,
    request_timeout: Duration,
}

impl OperationTracker {
    /// Creates a tracker over `operations` with a per-fetch deadline.
    #[must_use]
    pub fn new(operations: Arc<dyn OperationsApi>, request_timeout: Duration) -> Self {
        Self {
            operations,
            request_timeout,
        }
    }

    /// Reconciles the saved state against the operation's current status.
    ///
    /// Returns the settled state and, for a still-running operation, its
    /// fulfillment period. The mutated state is persisted before returning
    /// on every branch. A state with no operation in flight is returned
    /// untouched.
    ///
    /// # Errors
    ///
    /// Returns an error only when persisting the settled state fails.
    pub async fn reconcile(
        &self,
        store: &dyn StateStore,
        snapshot: &InstanceSnapshot,
        mut state: ScalingState,
    ) -> Result<(ScalingState, Option<FulfillmentPeriod>)> {
        let Some(operation_id) = state.scaling_operation_id.clone() else {
            return Ok((state, None));
        };

        let status = self.fetch_status(&operation_id).await;

        let fulfillment = match status {
            Err(e) => {
                warn!(
                    instance = %snapshot.instance_id,
                    operation = %operation_id,
                    error = %e,
                    "operation status unavailable, treating resize as complete"
                );
                backfill_requested_size(&mut state, snapshot, None);
                let complete_ms = state.last_scaling_timestamp;
                self.settle_success(&mut state, complete_ms);
                metrics::record_status_fallback();
                None
            }
            Ok(status) => {
                backfill_requested_size(&mut state, snapshot, status.metadata.as_ref());

                if !status.done {
                    let fulfillment = status
                        .metadata
                        .as_ref()
                        .and_then(|m| m.expected_fulfillment_period)
                        .unwrap_or_default();
                    debug!(
                        instance = %snapshot.instance_id,
                        operation = %operation_id,
                        fulfillment = ?fulfillment,
                        "resize still in progress"
                    );
                    Some(fulfillment)
                } else if let Some(message) = status.error {
                    warn!(
                        instance = %snapshot.instance_id,
                        operation = %operation_id,
                        error = %message,
                        "resize operation failed"
                    );
                    metrics::record_scaling_failed();
                    state.fail_scaling();
                    None
                } else {
                    let complete_ms = self.completion_time(snapshot, &state, &status);
                    self.settle_success(&mut state, complete_ms);
                    None
                }
            }
        };

        store.update(&state).await?;
        Ok((state, fulfillment))
    }

    #[allow(clippy::cast_possible_truncation)]
    async fn fetch_status(&self, operation_id: &str) -> Result<OperationStatus> {
        match timeout(self.request_timeout, self.operations.get_operation(operation_id)).await {
            Ok(result) => result,
            Err(_) => Err(AutoscalerError::DeadlineExceeded {
                millis: self.request_timeout.as_millis() as u64,
            }),
        }
    }

    /// Parses the operation's end time, falling back to the request time.
    fn completion_time(
        &self,
        snapshot: &InstanceSnapshot,
        state: &ScalingState,
        status: &OperationStatus,
    ) -> i64 {
        let end_time = status.metadata.as_ref().and_then(|m| m.end_time.as_deref());
        match end_time {
            Some(raw) => match DateTime::parse_from_rfc3339(raw) {
                // Completion never precedes the request time.
                Ok(dt) => dt.timestamp_millis().max(state.last_scaling_timestamp),
                Err(e) => {
                    warn!(
                        instance = %snapshot.instance_id,
                        end_time = %raw,
                        error = %e,
                        "unparseable operation end time, using request timestamp"
                    );
                    state.last_scaling_timestamp
                }
            },
            None => {
                warn!(
                    instance = %snapshot.instance_id,
                    "operation finished without an end time, using request timestamp"
                );
                state.last_scaling_timestamp
            }
        }
    }

    fn settle_success(&self, state: &mut ScalingState, complete_ms: i64) {
        let duration_ms = complete_ms - state.last_scaling_timestamp;
        metrics::record_scaling_duration(
            state.scaling_method.as_deref(),
            state.scaling_previous_size,
            state.scaling_requested_size,
            duration_ms,
        );
        metrics::record_scaling_success();
        info!(
            method = state.scaling_method.as_deref().unwrap_or("unknown"),
            previous_size = ?state.scaling_previous_size,
            requested_size = ?state.scaling_requested_size,
            duration_ms,
            "resize complete"
        );
        state.complete_scaling(complete_ms);
    }
}

/// Populates `scaling_requested_size` for records written before the field
/// existed: from operation metadata when it carries a capacity, from the
/// snapshot's current size as a last resort.
fn backfill_requested_size(
    state: &mut ScalingState,
    snapshot: &InstanceSnapshot,
    metadata: Option<&OperationMetadata>,
) {
    if state.scaling_requested_size.is_some() {
        return;
    }
    let from_metadata = metadata
        .and_then(|m| m.instance.as_ref())
        .and_then(|i| i.size(snapshot.units));
    state.scaling_requested_size = Some(from_metadata.unwrap_or(snapshot.current_size));
}
