//! Resize submission and operation-status seams.
//!
//! The autoscaler never talks to the cloud API directly; it goes through
//! [`ResizeDriver`] to submit a resize and [`OperationsApi`] to poll the
//! resulting long-running operation. Production implementations wrap the
//! authenticated service clients; [`InMemoryCloud`] implements both seams
//! for tests and local runs.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{AutoscalerError, Result};
use crate::types::{CapacityUnits, InstanceSnapshot};

/// The service's advertised completion window for a resize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FulfillmentPeriod {
    /// Expected to complete promptly.
    #[serde(rename = "FULFILLMENT_PERIOD_NORMAL")]
    Normal,
    /// May take up to an hour.
    #[serde(rename = "FULFILLMENT_PERIOD_EXTENDED")]
    Extended,
    /// The service did not say.
    #[default]
    #[serde(other, rename = "FULFILLMENT_PERIOD_UNSPECIFIED")]
    Unspecified,
}

/// Capacity block inside operation metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceCapacity {
    /// Node count, for node-based instances.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_count: Option<u64>,
    /// Processing units, for finer-grained instances.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_units: Option<u64>,
}

impl InstanceCapacity {
    /// The capacity in the snapshot's units, whichever field is set.
    #[must_use]
    pub fn size(&self, units: CapacityUnits) -> Option<u64> {
        match units {
            CapacityUnits::Nodes => self.node_count,
            CapacityUnits::ProcessingUnits => self.processing_units,
        }
    }
}

/// Metadata attached to a resize operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationMetadata {
    /// RFC 3339 start time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    /// RFC 3339 end time, present once the operation finished.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
    /// Advertised completion window.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_fulfillment_period: Option<FulfillmentPeriod>,
    /// Target capacity of the resize.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance: Option<InstanceCapacity>,
}

/// Status of a long-running resize operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationStatus {
    /// Whether the operation has finished.
    pub done: bool,
    /// Failure message, present when the operation finished unsuccessfully.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Operation metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<OperationMetadata>,
}

/// Body of a resize submission. Exactly one capacity field is set,
/// matching the snapshot's units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResizeRequest {
    /// Instance to resize.
    pub instance: String,
    /// Target node count, for node-based instances.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_count: Option<u64>,
    /// Target processing units, for finer-grained instances.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_units: Option<u64>,
}

impl ResizeRequest {
    /// Builds the request for `snapshot` resizing to `target_size`.
    #[must_use]
    pub fn new(snapshot: &InstanceSnapshot, target_size: u64) -> Self {
        let (node_count, processing_units) = match snapshot.units {
            CapacityUnits::Nodes => (Some(target_size), None),
            CapacityUnits::ProcessingUnits => (None, Some(target_size)),
        };
        Self {
            instance: snapshot.instance_id.clone(),
            node_count,
            processing_units,
        }
    }
}

/// Submits resize requests.
#[async_trait]
pub trait ResizeDriver: Send + Sync {
    /// Submits a resize of `snapshot`'s instance to `target_size` and
    /// returns the opaque operation id.
    ///
    /// # Errors
    ///
    /// Any submission failure is reported to the caller; the driver does
    /// not retry.
    async fn start(&self, snapshot: &InstanceSnapshot, target_size: u64) -> Result<String>;
}

/// Fetches the status of a long-running operation.
#[async_trait]
pub trait OperationsApi: Send + Sync {
    /// Returns the current status of `operation_id`.
    ///
    /// # Errors
    ///
    /// Returns [`AutoscalerError::StatusUnavailable`] when the status API
    /// cannot be reached.
    async fn get_operation(&self, operation_id: &str) -> Result<OperationStatus>;
}

#[derive(Default)]
struct CloudInner {
    operations: HashMap<String, OperationStatus>,
    requests: Vec<ResizeRequest>,
    next_op: u64,
    fail_start: bool,
    fail_status: bool,
}

/// In-memory resize backend implementing both seams.
#[derive(Default)]
pub struct InMemoryCloud {
    inner: RwLock<CloudInner>,
}

impl InMemoryCloud {
    /// Creates an empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent resize submissions fail.
    pub fn fail_submissions(&self, fail: bool) {
        self.inner.write().fail_start = fail;
    }

    /// Makes subsequent status fetches fail.
    pub fn fail_status_fetches(&self, fail: bool) {
        self.inner.write().fail_status = fail;
    }

    /// Sets the status returned for `operation_id`.
    pub fn set_operation(&self, operation_id: impl Into<String>, status: OperationStatus) {
        self.inner.write().operations.insert(operation_id.into(), status);
    }

    /// Resize requests submitted so far, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<ResizeRequest> {
        self.inner.read().requests.clone()
    }
}

#[async_trait]
impl ResizeDriver for InMemoryCloud {
    async fn start(&self, snapshot: &InstanceSnapshot, target_size: u64) -> Result<String> {
        let mut inner = self.inner.write();
        if inner.fail_start {
            return Err(AutoscalerError::ResizeFailed {
                reason: "injected submission failure".into(),
            });
        }

        inner.next_op += 1;
        let id = format!("op-{}", inner.next_op);
        inner.requests.push(ResizeRequest::new(snapshot, target_size));
        inner.operations.insert(
            id.clone(),
            OperationStatus {
                done: false,
                error: None,
                metadata: Some(OperationMetadata {
                    expected_fulfillment_period: Some(FulfillmentPeriod::Normal),
                    instance: Some(match snapshot.units {
                        CapacityUnits::Nodes => InstanceCapacity {
                            node_count: Some(target_size),
                            processing_units: None,
                        },
                        CapacityUnits::ProcessingUnits => InstanceCapacity {
                            node_count: None,
                            processing_units: Some(target_size),
                        },
                    }),
                    ..OperationMetadata::default()
                }),
            },
        );
        Ok(id)
    }
}

#[async_trait]
impl OperationsApi for InMemoryCloud {
    async fn get_operation(&self, operation_id: &str) -> Result<OperationStatus> {
        let inner = self.inner.read();
        if inner.fail_status {
            return Err(AutoscalerError::StatusUnavailable {
                reason: "injected status failure".into(),
            });
        }
        inner
            .operations
            .get(operation_id)
            .cloned()
            .ok_or_else(|| AutoscalerError::StatusUnavailable {
                reason: format!("unknown operation {operation_id}"),
            })
    }
}
