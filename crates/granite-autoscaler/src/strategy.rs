//! Sizing strategies and the registry that resolves them by name.
//!
//! A strategy is a pure function from an [`InstanceSnapshot`] to a suggested
//! capacity. Strategies must clamp their suggestion to
//! `[min_size, max_size]` and, for processing units, land on a valid
//! capacity boundary; [`clamp_to_bounds`] and [`quantize`] do both.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::warn;

use crate::types::{CapacityUnits, InstanceSnapshot, MetricReading};

/// Name of the default sizing strategy.
pub const DEFAULT_METHOD: &str = "STEPWISE";

/// Capacity step for node-based instances.
const NODE_STEP: u64 = 2;

/// Capacity step for processing-unit instances.
const PROCESSING_UNIT_STEP: u64 = 2000;

/// A pluggable sizing strategy.
///
/// New strategies implement [`suggest`](Self::suggest). The node-count
/// operation [`suggest_nodes`](Self::suggest_nodes) is the legacy entry
/// point kept for strategies written before processing units existed; the
/// orchestrator falls back to it with a deprecation warning when `suggest`
/// is not provided.
pub trait SizingStrategy: Send + Sync {
    /// Canonical name of this strategy (uppercase by convention).
    fn name(&self) -> &'static str;

    /// Suggests a capacity for the instance described by the snapshot.
    fn suggest(&self, snapshot: &InstanceSnapshot) -> Option<u64> {
        let _ = snapshot;
        None
    }

    /// Legacy sizing operation, counted in nodes only. Prefer
    /// [`suggest`](Self::suggest).
    fn suggest_nodes(&self, snapshot: &InstanceSnapshot) -> Option<u64> {
        let _ = snapshot;
        None
    }
}

/// Clamps a raw suggestion into the snapshot's `[min_size, max_size]`.
#[must_use]
pub fn clamp_to_bounds(snapshot: &InstanceSnapshot, size: u64) -> u64 {
    size.clamp(snapshot.min_size, snapshot.max_size)
}

/// Snaps `size` onto a valid capacity boundary.
///
/// Nodes are already integral. Processing units round away from the hold
/// position: up to the next boundary when scaling out, down when scaling
/// in, so a quantized suggestion never flips direction.
#[must_use]
pub fn quantize(units: CapacityUnits, size: u64, scaling_out: bool) -> u64 {
    match units {
        CapacityUnits::Nodes => size,
        CapacityUnits::ProcessingUnits => {
            let step = if size >= 1000 { 1000 } else { 100 };
            let rem = size % step;
            if rem == 0 {
                size
            } else if scaling_out {
                size - rem + step
            } else {
                size - rem
            }
        }
    }
}

fn capacity_step(units: CapacityUnits) -> u64 {
    match units {
        CapacityUnits::Nodes => NODE_STEP,
        CapacityUnits::ProcessingUnits => PROCESSING_UNIT_STEP,
    }
}

/// Steps capacity up or down by a fixed increment.
///
/// Scales out when any metric is above its tolerance band, scales in when
/// every metric is below its band, and otherwise holds.
#[derive(Debug, Clone, Copy, Default)]
pub struct Stepwise;

impl SizingStrategy for Stepwise {
    fn name(&self) -> &'static str {
        "STEPWISE"
    }

    fn suggest(&self, snapshot: &InstanceSnapshot) -> Option<u64> {
        let current = snapshot.current_size;
        let step = capacity_step(snapshot.units);

        let any_above = snapshot.metrics.iter().any(|m| m.above_range());
        let all_below = !snapshot.metrics.is_empty()
            && snapshot.metrics.iter().all(|m| m.below_range());

        let raw = if any_above {
            current.saturating_add(step)
        } else if all_below {
            current.saturating_sub(step)
        } else {
            current
        };

        let quantized = quantize(snapshot.units, raw, raw > current);
        Some(clamp_to_bounds(snapshot, quantized))
    }
}

/// Sizes capacity proportionally to how far metrics sit from threshold.
///
/// For each metric above its band the target is
/// `ceil(current × value / threshold)`; the largest target wins. When no
/// metric is above and every metric is below, the same ratio shrinks
/// capacity, taking the largest (most conservative) of the shrunk targets.
#[derive(Debug, Clone, Copy, Default)]
pub struct Linear;

impl SizingStrategy for Linear {
    fn name(&self) -> &'static str {
        "LINEAR"
    }

    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn suggest(&self, snapshot: &InstanceSnapshot) -> Option<u64> {
        let current = snapshot.current_size;

        let scaled_target = |m: &MetricReading| -> u64 {
            if m.threshold <= 0.0 {
                return current;
            }
            let target = (current as f64 * m.value / m.threshold).ceil();
            if target < 0.0 {
                0
            } else {
                target as u64
            }
        };

        let any_above = snapshot.metrics.iter().any(|m| m.above_range());
        let all_below = !snapshot.metrics.is_empty()
            && snapshot.metrics.iter().all(|m| m.below_range());

        let raw = if any_above {
            snapshot
                .metrics
                .iter()
                .filter(|m| m.above_range())
                .map(scaled_target)
                .max()
                .unwrap_or(current)
        } else if all_below {
            snapshot.metrics.iter().map(scaled_target).max().unwrap_or(current)
        } else {
            current
        };

        let quantized = quantize(snapshot.units, raw, raw > current);
        Some(clamp_to_bounds(snapshot, quantized))
    }
}

/// Jumps straight to `max_size`.
///
/// Used to pre-provision for a known load event. Once at `max_size` the
/// suggestion equals the current size and the tick is a no-op.
#[derive(Debug, Clone, Copy, Default)]
pub struct Direct;

impl SizingStrategy for Direct {
    fn name(&self) -> &'static str {
        "DIRECT"
    }

    fn suggest(&self, snapshot: &InstanceSnapshot) -> Option<u64> {
        Some(snapshot.max_size)
    }
}

/// Holds named sizing strategies and resolves them with fallback to the
/// default.
pub struct StrategyRegistry {
    strategies: HashMap<String, Arc<dyn SizingStrategy>>,
    default: Arc<dyn SizingStrategy>,
}

impl StrategyRegistry {
    /// Creates a registry with the built-in strategies registered and
    /// [`Stepwise`] as the default.
    #[must_use]
    pub fn new() -> Self {
        let default: Arc<dyn SizingStrategy> = Arc::new(Stepwise);
        let mut registry = Self {
            strategies: HashMap::new(),
            default: Arc::clone(&default),
        };
        registry.register(default);
        registry.register(Arc::new(Linear));
        registry.register(Arc::new(Direct));
        registry
    }

    /// Registers a strategy under its normalized name, replacing any
    /// previous registration.
    pub fn register(&mut self, strategy: Arc<dyn SizingStrategy>) {
        self.strategies
            .insert(normalize_method(strategy.name()), strategy);
    }

    /// Resolves the snapshot's scaling method.
    ///
    /// On a miss the default strategy is substituted and the snapshot's
    /// `scaling_method` is rewritten to the default's name so downstream
    /// logging and state reflect the strategy actually used.
    pub fn resolve(&self, snapshot: &mut InstanceSnapshot) -> Arc<dyn SizingStrategy> {
        let key = normalize_method(&snapshot.scaling_method);
        if let Some(strategy) = self.strategies.get(&key) {
            return Arc::clone(strategy);
        }

        warn!(
            instance = %snapshot.instance_id,
            method = %snapshot.scaling_method,
            default = self.default.name(),
            "unknown scaling method, falling back to default"
        );
        snapshot.scaling_method = self.default.name().to_string();
        Arc::clone(&self.default)
    }

    /// Number of registered strategies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    /// True if no strategies are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Normalizes a method name to a safe lowercase identifier.
///
/// Drops every character that is not alphanumeric, `_`, or `-`; in
/// particular path separators and dots, so a hostile method name cannot
/// traverse the strategy namespace.
#[must_use]
pub fn normalize_method(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect::<String>()
        .to_ascii_lowercase()
}
