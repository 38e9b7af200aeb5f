//! Core types for the autoscaler.
//!
//! This module provides the fundamental types used throughout
//! granite-autoscaler:
//! - [`InstanceSnapshot`]: the per-tick observation of one instance
//! - [`CapacityUnits`]: whether capacity is counted in nodes or processing
//!   units
//! - [`MetricReading`]: one observed metric with its scaling thresholds
//! - [`DenialReason`]: why a tick declined to resize

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{AutoscalerError, Result};

/// The unit an instance's capacity is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CapacityUnits {
    /// Integral nodes.
    Nodes,
    /// Finer-grained processing units. Valid sizes are multiples of 100
    /// below 1000 and multiples of 1000 at or above.
    ProcessingUnits,
}

impl fmt::Display for CapacityUnits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nodes => write!(f, "NODES"),
            Self::ProcessingUnits => write!(f, "PROCESSING_UNITS"),
        }
    }
}

/// One observed metric with the thresholds that drive scaling decisions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricReading {
    /// Metric name (e.g. `high_priority_cpu`).
    pub name: String,
    /// Observed value.
    pub value: f64,
    /// Threshold the value is compared against.
    pub threshold: f64,
    /// Tolerance band around the threshold before scaling kicks in.
    #[serde(default)]
    pub margin: f64,
}

impl MetricReading {
    /// Creates a reading with an explicit margin.
    #[must_use]
    pub fn new(name: impl Into<String>, value: f64, threshold: f64, margin: f64) -> Self {
        Self {
            name: name.into(),
            value,
            threshold,
            margin,
        }
    }

    /// True if the value sits above the upper tolerance band.
    #[must_use]
    pub fn above_range(&self) -> bool {
        self.value > self.threshold + self.margin
    }

    /// True if the value sits below the lower tolerance band.
    #[must_use]
    pub fn below_range(&self) -> bool {
        self.value < self.threshold - self.margin
    }
}

/// Which backend holds the durable per-instance scaling state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateBackend {
    /// JSON file per instance under the factory's root directory.
    #[default]
    File,
    /// Process-local shared map (tests and single-process deployments).
    Memory,
}

/// Where the per-instance scaling state lives. Carried on the snapshot so
/// the store adapter can be constructed per tick.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateStoreSpec {
    /// The store backend.
    #[serde(default)]
    pub backend: StateBackend,
    /// Backend location override (a directory for the file backend).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

/// The per-tick immutable observation of one instance.
///
/// The only field the orchestrator mutates is `scaling_method`, which is
/// rewritten to the default when the requested method is unknown so that
/// downstream logging and state reflect the strategy actually used.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceSnapshot {
    /// Project the instance belongs to.
    pub project_id: String,
    /// Instance identifier.
    pub instance_id: String,
    /// Unit of capacity.
    pub units: CapacityUnits,
    /// Current capacity.
    pub current_size: u64,
    /// Never scale below this.
    pub min_size: u64,
    /// Never scale above this.
    pub max_size: u64,
    /// Cooldown after a resize before the next scale-out, in minutes.
    pub scale_out_cooling_minutes: u64,
    /// Cooldown after a resize before the next scale-in, in minutes.
    pub scale_in_cooling_minutes: u64,
    /// Cooldown override while the instance is overloaded, in minutes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overload_cooling_minutes: Option<u64>,
    /// Whether the instance is currently overloaded.
    #[serde(default)]
    pub is_overloaded: bool,
    /// Name of the sizing strategy to use.
    #[serde(default = "default_scaling_method")]
    pub scaling_method: String,
    /// Topic scaling lifecycle events are published to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downstream_topic: Option<String>,
    /// Observed metrics, in the order the poller reported them.
    #[serde(default)]
    pub metrics: Vec<MetricReading>,
    /// Where the durable scaling state for this instance lives.
    #[serde(default)]
    pub state_store: StateStoreSpec,
}

fn default_scaling_method() -> String {
    crate::strategy::DEFAULT_METHOD.to_string()
}

impl InstanceSnapshot {
    /// Validates the snapshot's structural constraints.
    ///
    /// # Errors
    ///
    /// Returns [`AutoscalerError::InvalidSnapshot`] if ids are empty, sizes
    /// are non-positive or inverted, or a processing-unit size is off its
    /// quantization boundary.
    pub fn validate(&self) -> Result<()> {
        if self.project_id.is_empty() {
            return Err(AutoscalerError::InvalidSnapshot {
                reason: "projectId must not be empty".into(),
            });
        }
        if self.instance_id.is_empty() {
            return Err(AutoscalerError::InvalidSnapshot {
                reason: "instanceId must not be empty".into(),
            });
        }
        if self.current_size == 0 {
            return Err(AutoscalerError::InvalidSnapshot {
                reason: "currentSize must be positive".into(),
            });
        }
        if self.min_size == 0 {
            return Err(AutoscalerError::InvalidSnapshot {
                reason: "minSize must be at least 1".into(),
            });
        }
        if self.min_size > self.max_size {
            return Err(AutoscalerError::InvalidSnapshot {
                reason: format!(
                    "minSize ({}) cannot exceed maxSize ({})",
                    self.min_size, self.max_size
                ),
            });
        }
        if self.units == CapacityUnits::ProcessingUnits {
            for (label, size) in [
                ("currentSize", self.current_size),
                ("minSize", self.min_size),
                ("maxSize", self.max_size),
            ] {
                if !valid_processing_units(size) {
                    return Err(AutoscalerError::InvalidSnapshot {
                        reason: format!(
                            "{label} ({size}) is not a valid processing-unit capacity"
                        ),
                    });
                }
            }
        }
        Ok(())
    }
}

/// True if `size` sits on a valid processing-unit boundary.
#[must_use]
pub fn valid_processing_units(size: u64) -> bool {
    if size >= 1000 {
        size % 1000 == 0
    } else {
        size > 0 && size % 100 == 0
    }
}

/// Why a tick declined to resize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DenialReason {
    /// The suggested size equals the current size, which is the maximum.
    MaxSize,
    /// The suggested size equals the current size.
    CurrentSize,
    /// A resize operation is already in flight.
    InProgress,
    /// The cooldown window has not elapsed.
    WithinCooldown,
}

impl DenialReason {
    /// Returns the reason as its wire/metric label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MaxSize => "MAX_SIZE",
            Self::CurrentSize => "CURRENT_SIZE",
            Self::InProgress => "IN_PROGRESS",
            Self::WithinCooldown => "WITHIN_COOLDOWN",
        }
    }
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn snapshot(current: u64, min: u64, max: u64) -> InstanceSnapshot {
        InstanceSnapshot {
            project_id: "proj-1".to_string(),
            instance_id: "db-main".to_string(),
            units: CapacityUnits::Nodes,
            current_size: current,
            min_size: min,
            max_size: max,
            scale_out_cooling_minutes: 5,
            scale_in_cooling_minutes: 30,
            overload_cooling_minutes: None,
            is_overloaded: false,
            scaling_method: "STEPWISE".to_string(),
            downstream_topic: None,
            metrics: Vec::new(),
            state_store: StateStoreSpec::default(),
        }
    }

    mod validation_tests {
        use super::*;

        #[test]
        fn valid_snapshot_passes() {
            assert!(snapshot(3, 1, 10).validate().is_ok());
        }

        #[test]
        fn empty_project_fails() {
            let mut s = snapshot(3, 1, 10);
            s.project_id.clear();
            assert!(matches!(
                s.validate(),
                Err(AutoscalerError::InvalidSnapshot { .. })
            ));
        }

        #[test]
        fn zero_current_size_fails() {
            assert!(snapshot(0, 1, 10).validate().is_err());
        }

        #[test]
        fn inverted_bounds_fail() {
            let err = snapshot(5, 10, 3).validate().unwrap_err();
            assert!(err.to_string().contains("cannot exceed"));
        }

        #[test]
        fn processing_units_off_boundary_fail() {
            let mut s = snapshot(150, 100, 2000);
            s.units = CapacityUnits::ProcessingUnits;
            assert!(s.validate().is_err());

            s.current_size = 200;
            assert!(s.validate().is_ok());
        }

        #[test]
        fn processing_units_above_1000_must_be_thousands() {
            let mut s = snapshot(1500, 100, 10_000);
            s.units = CapacityUnits::ProcessingUnits;
            assert!(s.validate().is_err());

            s.current_size = 2000;
            assert!(s.validate().is_ok());
        }
    }

    mod serde_tests {
        use super::*;

        #[test]
        fn snapshot_deserializes_from_camel_case() {
            let json = r#"{
                "projectId": "proj-1",
                "instanceId": "db-main",
                "units": "PROCESSING_UNITS",
                "currentSize": 500,
                "minSize": 100,
                "maxSize": 2000,
                "scaleOutCoolingMinutes": 5,
                "scaleInCoolingMinutes": 30,
                "isOverloaded": true,
                "scalingMethod": "LINEAR",
                "metrics": [
                    {"name": "cpu", "value": 80.0, "threshold": 65.0, "margin": 5.0}
                ]
            }"#;

            let s: InstanceSnapshot = serde_json::from_str(json).expect("parse");
            assert_eq!(s.units, CapacityUnits::ProcessingUnits);
            assert_eq!(s.current_size, 500);
            assert!(s.is_overloaded);
            assert_eq!(s.scaling_method, "LINEAR");
            assert_eq!(s.metrics.len(), 1);
            assert!((s.metrics[0].margin - 5.0).abs() < f64::EPSILON);
        }

        #[test]
        fn scaling_method_defaults_to_stepwise() {
            let json = r#"{
                "projectId": "p",
                "instanceId": "i",
                "units": "NODES",
                "currentSize": 1,
                "minSize": 1,
                "maxSize": 3,
                "scaleOutCoolingMinutes": 5,
                "scaleInCoolingMinutes": 30
            }"#;

            let s: InstanceSnapshot = serde_json::from_str(json).expect("parse");
            assert_eq!(s.scaling_method, "STEPWISE");
            assert!(!s.is_overloaded);
            assert!(s.metrics.is_empty());
        }

        #[test]
        fn state_store_spec_parses() {
            let json = r#"{"backend": "memory"}"#;
            let spec: StateStoreSpec = serde_json::from_str(json).expect("parse");
            assert_eq!(spec.backend, StateBackend::Memory);
            assert!(spec.path.is_none());
        }
    }

    mod metric_reading_tests {
        use super::*;

        #[test]
        fn range_checks() {
            let m = MetricReading::new("cpu", 75.0, 65.0, 5.0);
            assert!(m.above_range());
            assert!(!m.below_range());

            let m = MetricReading::new("cpu", 55.0, 65.0, 5.0);
            assert!(m.below_range());

            let m = MetricReading::new("cpu", 67.0, 65.0, 5.0);
            assert!(!m.above_range());
            assert!(!m.below_range());
        }
    }

    mod denial_reason_tests {
        use super::*;

        #[test]
        fn wire_labels() {
            assert_eq!(DenialReason::MaxSize.as_str(), "MAX_SIZE");
            assert_eq!(DenialReason::CurrentSize.as_str(), "CURRENT_SIZE");
            assert_eq!(DenialReason::InProgress.as_str(), "IN_PROGRESS");
            assert_eq!(DenialReason::WithinCooldown.as_str(), "WITHIN_COOLDOWN");
        }

        #[test]
        fn serializes_as_screaming_snake() {
            let json = serde_json::to_string(&DenialReason::WithinCooldown).expect("json");
            assert_eq!(json, "\"WITHIN_COOLDOWN\"");
        }
    }

    #[test]
    fn processing_unit_boundaries() {
        assert!(valid_processing_units(100));
        assert!(valid_processing_units(900));
        assert!(valid_processing_units(1000));
        assert!(valid_processing_units(5000));
        assert!(!valid_processing_units(0));
        assert!(!valid_processing_units(50));
        assert!(!valid_processing_units(950));
        assert!(!valid_processing_units(1500));
    }
}
