//! Downstream scaling lifecycle events.
//!
//! The orchestrator reports every resize attempt to an optional downstream
//! topic. Publication is best-effort: failures are logged and never
//! propagated, so a broken event bus cannot block scaling.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{AutoscalerError, Result};
use crate::types::{CapacityUnits, InstanceSnapshot};

/// Name of a scaling lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventName {
    /// A resize was submitted.
    Scaling,
    /// A resize submission failed.
    ScalingFailure,
}

impl EventName {
    /// The event name on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Scaling => "SCALING",
            Self::ScalingFailure => "SCALING_FAILURE",
        }
    }
}

impl std::fmt::Display for EventName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One metric inside a downstream event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMetric {
    /// Metric name.
    pub name: String,
    /// Threshold the value was compared against.
    pub threshold: f32,
    /// Observed value.
    pub value: f32,
    /// Tolerance band.
    pub margin: f32,
}

/// The wire schema published to the downstream topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownstreamEvent {
    /// Project the instance belongs to.
    pub project_id: String,
    /// Instance identifier.
    pub instance_id: String,
    /// Capacity at decision time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_size: Option<i32>,
    /// Capacity the decision suggested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_size: Option<i32>,
    /// Unit of capacity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub units: Option<CapacityUnits>,
    /// The metrics that drove the decision.
    #[serde(default)]
    pub metrics: Vec<EventMetric>,
}

impl DownstreamEvent {
    /// Builds the event for `snapshot` with the given suggestion.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn new(snapshot: &InstanceSnapshot, suggested_size: u64) -> Self {
        Self {
            project_id: snapshot.project_id.clone(),
            instance_id: snapshot.instance_id.clone(),
            current_size: i32::try_from(snapshot.current_size).ok(),
            suggested_size: i32::try_from(suggested_size).ok(),
            units: Some(snapshot.units),
            metrics: snapshot
                .metrics
                .iter()
                .map(|m| EventMetric {
                    name: m.name.clone(),
                    threshold: m.threshold as f32,
                    value: m.value as f32,
                    margin: m.margin as f32,
                })
                .collect(),
        }
    }
}

/// Publishes serialized events to a topic.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publishes `payload` under `event` to `topic`.
    ///
    /// # Errors
    ///
    /// Returns [`AutoscalerError::PublishFailed`] if the bus rejects the
    /// event.
    async fn publish(&self, topic: &str, event: &str, payload: &[u8]) -> Result<()>;
}

/// Best-effort emitter wrapping an [`EventPublisher`].
pub struct Emitter {
    publisher: Arc<dyn EventPublisher>,
}

impl Emitter {
    /// Creates an emitter over `publisher`.
    #[must_use]
    pub fn new(publisher: Arc<dyn EventPublisher>) -> Self {
        Self { publisher }
    }

    /// Emits `event` for `snapshot` if the snapshot names a topic.
    ///
    /// Serialization and publish failures are logged and swallowed.
    pub async fn emit(&self, event: EventName, snapshot: &InstanceSnapshot, suggested_size: u64) {
        let Some(topic) = snapshot.downstream_topic.as_deref() else {
            debug!(
                instance = %snapshot.instance_id,
                event = %event,
                "no downstream topic, skipping event"
            );
            return;
        };

        let payload = match serde_json::to_vec(&DownstreamEvent::new(snapshot, suggested_size)) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(
                    instance = %snapshot.instance_id,
                    event = %event,
                    error = %e,
                    "failed to serialize downstream event"
                );
                return;
            }
        };

        if let Err(e) = self.publisher.publish(topic, event.as_str(), &payload).await {
            warn!(
                instance = %snapshot.instance_id,
                topic = %topic,
                event = %event,
                error = %e,
                "failed to publish downstream event"
            );
        }
    }
}

/// A published event captured by [`InMemoryPublisher`].
#[derive(Debug, Clone)]
pub struct CapturedEvent {
    /// Topic the event was published to.
    pub topic: String,
    /// Event name.
    pub event: String,
    /// Serialized payload.
    pub payload: Vec<u8>,
}

/// In-memory publisher for tests.
#[derive(Default)]
pub struct InMemoryPublisher {
    events: RwLock<Vec<CapturedEvent>>,
    fail: RwLock<bool>,
}

impl InMemoryPublisher {
    /// Creates an empty publisher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent publishes fail.
    pub fn fail_publishes(&self, fail: bool) {
        *self.fail.write() = fail;
    }

    /// Events published so far, in order.
    #[must_use]
    pub fn events(&self) -> Vec<CapturedEvent> {
        self.events.read().clone()
    }
}

#[async_trait]
impl EventPublisher for InMemoryPublisher {
    async fn publish(&self, topic: &str, event: &str, payload: &[u8]) -> Result<()> {
        if *self.fail.read() {
            return Err(AutoscalerError::PublishFailed {
                reason: "injected publish failure".into(),
            });
        }
        self.events.write().push(CapturedEvent {
            topic: topic.to_string(),
            event: event.to_string(),
            payload: payload.to_vec(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MetricReading, StateStoreSpec};

    fn snapshot() -> InstanceSnapshot {
        InstanceSnapshot {
            project_id: "proj-1".to_string(),
            instance_id: "db-main".to_string(),
            units: CapacityUnits::Nodes,
            current_size: 1,
            min_size: 1,
            max_size: 10,
            scale_out_cooling_minutes: 5,
            scale_in_cooling_minutes: 30,
            overload_cooling_minutes: None,
            is_overloaded: false,
            scaling_method: "STEPWISE".to_string(),
            downstream_topic: Some("scaling-events".to_string()),
            metrics: vec![MetricReading::new("cpu", 85.0, 65.0, 5.0)],
            state_store: StateStoreSpec::default(),
        }
    }

    mod schema_tests {
        use super::*;

        #[test]
        fn event_carries_snapshot_fields() {
            let event = DownstreamEvent::new(&snapshot(), 3);
            assert_eq!(event.project_id, "proj-1");
            assert_eq!(event.instance_id, "db-main");
            assert_eq!(event.current_size, Some(1));
            assert_eq!(event.suggested_size, Some(3));
            assert_eq!(event.units, Some(CapacityUnits::Nodes));
            assert_eq!(event.metrics.len(), 1);
            assert_eq!(event.metrics[0].name, "cpu");
        }

        #[test]
        fn wire_field_names_are_snake_case() {
            let json =
                serde_json::to_value(DownstreamEvent::new(&snapshot(), 3)).expect("json");
            assert!(json.get("project_id").is_some());
            assert!(json.get("instance_id").is_some());
            assert!(json.get("current_size").is_some());
            assert!(json.get("suggested_size").is_some());
            assert_eq!(json["units"], "NODES");
        }

        #[test]
        fn event_names_on_the_wire() {
            assert_eq!(EventName::Scaling.as_str(), "SCALING");
            assert_eq!(EventName::ScalingFailure.as_str(), "SCALING_FAILURE");
        }
    }

    mod emitter_tests {
        use super::*;

        #[tokio::test]
        async fn emits_to_configured_topic() {
            let publisher = Arc::new(InMemoryPublisher::new());
            let emitter = Emitter::new(Arc::clone(&publisher) as Arc<dyn EventPublisher>);

            emitter.emit(EventName::Scaling, &snapshot(), 3).await;

            let events = publisher.events();
            assert_eq!(events.len(), 1);
            assert_eq!(events[0].topic, "scaling-events");
            assert_eq!(events[0].event, "SCALING");

            let decoded: DownstreamEvent =
                serde_json::from_slice(&events[0].payload).expect("payload");
            assert_eq!(decoded.suggested_size, Some(3));
        }

        #[tokio::test]
        async fn missing_topic_skips_emission() {
            let publisher = Arc::new(InMemoryPublisher::new());
            let emitter = Emitter::new(Arc::clone(&publisher) as Arc<dyn EventPublisher>);

            let mut snap = snapshot();
            snap.downstream_topic = None;
            emitter.emit(EventName::Scaling, &snap, 3).await;

            assert!(publisher.events().is_empty());
        }

        #[tokio::test]
        async fn publish_failure_is_swallowed() {
            let publisher = Arc::new(InMemoryPublisher::new());
            publisher.fail_publishes(true);
            let emitter = Emitter::new(Arc::clone(&publisher) as Arc<dyn EventPublisher>);

            // Must not panic or propagate.
            emitter.emit(EventName::ScalingFailure, &snapshot(), 3).await;
            assert!(publisher.events().is_empty());
        }
    }
}
