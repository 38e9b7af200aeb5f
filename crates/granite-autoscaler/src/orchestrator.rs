//! Per-tick scaling controller.
//!
//! One [`Orchestrator::process`] call handles one instance snapshot: load
//! the saved state, reconcile any in-flight resize, ask the strategy for a
//! suggestion, gate it through the cooldown policy, and drive an admitted
//! resize through the driver, the state store, the downstream emitter, and
//! the counters.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::cooldown;
use crate::driver::{FulfillmentPeriod, OperationsApi, ResizeDriver};
use crate::error::{AutoscalerError, Result};
use crate::events::{Emitter, EventName, EventPublisher};
use crate::metrics;
use crate::state::{StateStore, StateStoreFactory};
use crate::strategy::{SizingStrategy, StrategyRegistry};
use crate::tracker::OperationTracker;
use crate::types::{DenialReason, InstanceSnapshot};

/// Configuration for the orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Deadline applied to each resize submission and status fetch.
    pub request_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// What one tick decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// A resize was submitted and recorded.
    Scaled {
        /// Capacity before the resize.
        previous_size: u64,
        /// Capacity the resize targets.
        requested_size: u64,
        /// Id of the submitted operation.
        operation_id: String,
    },
    /// The tick declined to resize.
    Denied(DenialReason),
    /// The resize submission failed; the next tick re-evaluates.
    ResizeFailed {
        /// Description of the submission failure.
        reason: String,
    },
}

/// Top-level per-tick controller.
pub struct Orchestrator {
    registry: StrategyRegistry,
    stores: StateStoreFactory,
    driver: Arc<dyn ResizeDriver>,
    tracker: OperationTracker,
    emitter: Emitter,
    config: OrchestratorConfig,
}

impl Orchestrator {
    /// Creates an orchestrator with the built-in strategies and default
    /// configuration.
    #[must_use]
    pub fn new(
        stores: StateStoreFactory,
        driver: Arc<dyn ResizeDriver>,
        operations: Arc<dyn OperationsApi>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self::with_config(stores, driver, operations, publisher, OrchestratorConfig::default())
    }

    /// Creates an orchestrator with custom configuration.
    #[must_use]
    pub fn with_config(
        stores: StateStoreFactory,
        driver: Arc<dyn ResizeDriver>,
        operations: Arc<dyn OperationsApi>,
        publisher: Arc<dyn EventPublisher>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            registry: StrategyRegistry::new(),
            stores,
            driver,
            tracker: OperationTracker::new(operations, config.request_timeout),
            emitter: Emitter::new(publisher),
            config,
        }
    }

    /// Registers an additional sizing strategy.
    pub fn register_strategy(&mut self, strategy: Arc<dyn SizingStrategy>) {
        self.registry.register(strategy);
    }

    /// Processes one snapshot at the current time.
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid snapshot, a strategy with no sizing
    /// operation, or a state-store failure. Resize submission failures are
    /// reported through [`TickOutcome::ResizeFailed`], not as errors.
    pub async fn process(&self, snapshot: InstanceSnapshot) -> Result<TickOutcome> {
        self.process_at(snapshot, Utc::now().timestamp_millis()).await
    }

    /// Processes one snapshot at a caller-supplied time.
    ///
    /// # Errors
    ///
    /// See [`process`](Self::process).
    pub async fn process_at(
        &self,
        mut snapshot: InstanceSnapshot,
        now_ms: i64,
    ) -> Result<TickOutcome> {
        let result = self.tick(&mut snapshot, now_ms).await;
        match &result {
            Ok(outcome) => {
                debug!(
                    project = %snapshot.project_id,
                    instance = %snapshot.instance_id,
                    outcome = ?outcome,
                    "tick complete"
                );
                metrics::record_request(true);
            }
            Err(e) => {
                warn!(
                    project = %snapshot.project_id,
                    instance = %snapshot.instance_id,
                    error = %e,
                    "tick aborted"
                );
                metrics::record_request(false);
            }
        }
        result
    }

    async fn tick(&self, snapshot: &mut InstanceSnapshot, now_ms: i64) -> Result<TickOutcome> {
        snapshot.validate()?;

        let store = self.stores.open(snapshot)?;
        let outcome = self.tick_with_store(store.as_ref(), snapshot, now_ms).await;
        if let Err(e) = store.close().await {
            warn!(instance = %snapshot.instance_id, error = %e, "failed to close state store");
        }
        outcome
    }

    async fn tick_with_store(
        &self,
        store: &dyn StateStore,
        snapshot: &mut InstanceSnapshot,
        now_ms: i64,
    ) -> Result<TickOutcome> {
        let saved = store.get().await?;
        let (state, fulfillment) = self.tracker.reconcile(store, snapshot, saved).await?;

        let strategy = self.registry.resolve(snapshot);
        let suggested = self.suggest(strategy.as_ref(), snapshot)?;
        let current = snapshot.current_size;

        if suggested == current {
            let reason = if current == snapshot.max_size {
                DenialReason::MaxSize
            } else {
                DenialReason::CurrentSize
            };
            debug!(
                instance = %snapshot.instance_id,
                size = current,
                reason = %reason,
                "no resize warranted"
            );
            metrics::record_scaling_denied(reason);
            return Ok(TickOutcome::Denied(reason));
        }

        if state.is_scaling() {
            if fulfillment == Some(FulfillmentPeriod::Extended)
                && state.scaling_requested_size != Some(suggested)
            {
                // Cancel-and-resubmit is an open question; for now the
                // in-flight operation wins and the divergence is logged.
                warn!(
                    instance = %snapshot.instance_id,
                    in_flight = ?state.scaling_requested_size,
                    suggested,
                    "suggested size diverged from extended in-flight resize"
                );
            }
            metrics::record_scaling_denied(DenialReason::InProgress);
            return Ok(TickOutcome::Denied(DenialReason::InProgress));
        }

        if !cooldown::admits(snapshot, suggested, &state, now_ms) {
            info!(
                instance = %snapshot.instance_id,
                current,
                suggested,
                "resize denied, within cooldown"
            );
            metrics::record_scaling_denied(DenialReason::WithinCooldown);
            return Ok(TickOutcome::Denied(DenialReason::WithinCooldown));
        }

        match self.submit_resize(snapshot, suggested).await {
            Ok(operation_id) => {
                let mut state = state;
                state.begin_scaling(
                    operation_id.clone(),
                    snapshot.scaling_method.clone(),
                    current,
                    suggested,
                    now_ms,
                );
                store.update(&state).await?;

                info!(
                    project = %snapshot.project_id,
                    instance = %snapshot.instance_id,
                    method = %snapshot.scaling_method,
                    from = current,
                    to = suggested,
                    operation = %operation_id,
                    "resize submitted"
                );
                self.emitter.emit(EventName::Scaling, snapshot, suggested).await;

                Ok(TickOutcome::Scaled {
                    previous_size: current,
                    requested_size: suggested,
                    operation_id,
                })
            }
            Err(e) => {
                warn!(
                    instance = %snapshot.instance_id,
                    from = current,
                    to = suggested,
                    error = %e,
                    "resize submission failed"
                );
                metrics::record_scaling_failed();
                self.emitter
                    .emit(EventName::ScalingFailure, snapshot, suggested)
                    .await;
                Ok(TickOutcome::ResizeFailed {
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Runs the strategy's preferred sizing operation, falling back to the
    /// deprecated node-count operation with a warning.
    fn suggest(&self, strategy: &dyn SizingStrategy, snapshot: &InstanceSnapshot) -> Result<u64> {
        if let Some(size) = strategy.suggest(snapshot) {
            return Ok(size);
        }
        if let Some(size) = strategy.suggest_nodes(snapshot) {
            warn!(
                method = strategy.name(),
                "strategy exposes only the deprecated node-count operation"
            );
            return Ok(size);
        }
        Err(AutoscalerError::NoSizingOperation {
            method: snapshot.scaling_method.clone(),
        })
    }

    #[allow(clippy::cast_possible_truncation)]
    async fn submit_resize(&self, snapshot: &InstanceSnapshot, target_size: u64) -> Result<String> {
        match timeout(
            self.config.request_timeout,
            self.driver.start(snapshot, target_size),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(AutoscalerError::DeadlineExceeded {
                millis: self.config.request_timeout.as_millis() as u64,
            }),
        }
    }
}
