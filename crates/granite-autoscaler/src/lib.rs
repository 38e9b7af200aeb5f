//! Autoscaler control loop for granite database instances.
//!
//! Upstream pollers deliver per-instance metric snapshots; the
//! [`Orchestrator`] decides whether to resize each instance and drives the
//! resize to completion while enforcing cooldowns, overload handling, and
//! at-most-one concurrent resize per instance. Capacity is expressed in
//! integral nodes or finer-grained processing units.
//!
//! # Architecture
//!
//! Each tick composes a handful of small pieces:
//! - [`StrategyRegistry`] resolves a named [`SizingStrategy`]
//!   (stepwise, linear, direct) that maps the snapshot to a suggested
//!   capacity.
//! - [`StateStoreFactory`] opens the durable per-instance
//!   [`ScalingState`]; the persisted operation id is the cross-process
//!   lock that keeps resizes exclusive.
//! - [`OperationTracker`] reconciles any in-flight resize against the
//!   operation-status API before a new decision is made.
//! - The cooldown policy in [`cooldown`] gates non-trivial suggestions.
//! - [`ResizeDriver`] submits the resize; [`Emitter`] reports lifecycle
//!   events downstream, best-effort.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use granite_autoscaler::{
//!     InMemoryCloud, InMemoryPublisher, Orchestrator, StateStoreFactory,
//! };
//!
//! # async fn example() -> granite_autoscaler::Result<()> {
//! let cloud = Arc::new(InMemoryCloud::new());
//! let orchestrator = Orchestrator::new(
//!     StateStoreFactory::new("/var/lib/granite-autoscaler"),
//!     Arc::clone(&cloud) as _,
//!     Arc::clone(&cloud) as _,
//!     Arc::new(InMemoryPublisher::new()),
//! );
//!
//! let snapshot = granite_autoscaler::ingress::snapshot_from_json(br#"{
//!     "projectId": "proj-1",
//!     "instanceId": "db-main",
//!     "units": "NODES",
//!     "currentSize": 1,
//!     "minSize": 1,
//!     "maxSize": 10,
//!     "scaleOutCoolingMinutes": 5,
//!     "scaleInCoolingMinutes": 30
//! }"#)?;
//! let outcome = orchestrator.process(snapshot).await?;
//! println!("{outcome:?}");
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]

pub mod cooldown;
pub mod driver;
pub mod error;
pub mod events;
pub mod ingress;
pub mod metrics;
pub mod orchestrator;
pub mod state;
pub mod strategy;
pub mod tracker;
pub mod types;

pub use driver::{
    FulfillmentPeriod, InMemoryCloud, InstanceCapacity, OperationMetadata, OperationStatus,
    OperationsApi, ResizeDriver, ResizeRequest,
};
pub use error::{AutoscalerError, Result};
pub use events::{DownstreamEvent, Emitter, EventName, EventPublisher, InMemoryPublisher};
pub use orchestrator::{Orchestrator, OrchestratorConfig, TickOutcome};
pub use state::{
    FileStateStore, InMemoryStateStore, ScalingState, StateStore, StateStoreFactory,
};
pub use strategy::{
    Direct, Linear, SizingStrategy, Stepwise, StrategyRegistry, DEFAULT_METHOD,
};
pub use tracker::OperationTracker;
pub use types::{
    CapacityUnits, DenialReason, InstanceSnapshot, MetricReading, StateBackend, StateStoreSpec,
};
