//! Durable per-instance scaling state and its store adapters.
//!
//! One [`ScalingState`] record exists per `(project, instance)` pair. The
//! record is the authoritative cross-process lock: a non-null
//! `scaling_operation_id` means a resize is in flight and no new resize may
//! start. Stores are opened per tick through [`StateStoreFactory`], which
//! reads the backend and location from the snapshot.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use granite_persist::JsonStore;

use crate::error::{AutoscalerError, Result};
use crate::types::{InstanceSnapshot, StateBackend};

/// Durable scaling state for one instance.
///
/// Field invariants:
/// - `scaling_operation_id == None` implies `scaling_method`,
///   `scaling_previous_size`, and `scaling_requested_size` are all `None`.
/// - While an operation is in flight, `last_scaling_timestamp > 0` and
///   `last_scaling_complete_timestamp` is `None`.
/// - `last_scaling_complete_timestamp >= last_scaling_timestamp` whenever
///   both are set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScalingState {
    /// Opaque id of the in-flight resize operation, if any.
    #[serde(default)]
    pub scaling_operation_id: Option<String>,
    /// When the last resize was requested, in ms since epoch. 0 = never.
    #[serde(default)]
    pub last_scaling_timestamp: i64,
    /// When the last resize completed, in ms since epoch.
    #[serde(default)]
    pub last_scaling_complete_timestamp: Option<i64>,
    /// Method that initiated the in-flight operation.
    #[serde(default)]
    pub scaling_method: Option<String>,
    /// Capacity before the in-flight operation.
    #[serde(default)]
    pub scaling_previous_size: Option<u64>,
    /// Capacity the in-flight operation is resizing to. May be absent in
    /// records written by earlier versions.
    #[serde(default)]
    pub scaling_requested_size: Option<u64>,
}

impl ScalingState {
    /// True while a resize operation is in flight.
    #[must_use]
    pub fn is_scaling(&self) -> bool {
        self.scaling_operation_id.is_some()
    }

    /// The timestamp cooldowns are measured from: completion when known,
    /// request time otherwise. 0 means no resize has ever run.
    #[must_use]
    pub fn cooldown_reference(&self) -> i64 {
        self.last_scaling_complete_timestamp
            .unwrap_or(self.last_scaling_timestamp)
    }

    /// Marks a resize as started.
    pub fn begin_scaling(
        &mut self,
        operation_id: impl Into<String>,
        method: impl Into<String>,
        previous_size: u64,
        requested_size: u64,
        now_ms: i64,
    ) {
        self.scaling_operation_id = Some(operation_id.into());
        self.last_scaling_timestamp = now_ms;
        self.last_scaling_complete_timestamp = None;
        self.scaling_method = Some(method.into());
        self.scaling_previous_size = Some(previous_size);
        self.scaling_requested_size = Some(requested_size);
    }

    /// Marks the in-flight resize as completed at `complete_ms`.
    pub fn complete_scaling(&mut self, complete_ms: i64) {
        self.last_scaling_complete_timestamp = Some(complete_ms);
        self.clear_in_flight();
    }

    /// Marks the in-flight resize as failed. Timestamps are zeroed so the
    /// next decision is not cooldown-blocked by a failed attempt.
    pub fn fail_scaling(&mut self) {
        self.last_scaling_timestamp = 0;
        self.last_scaling_complete_timestamp = None;
        self.clear_in_flight();
    }

    /// Clears the four in-flight fields.
    pub fn clear_in_flight(&mut self) {
        self.scaling_operation_id = None;
        self.scaling_method = None;
        self.scaling_previous_size = None;
        self.scaling_requested_size = None;
    }
}

/// A handle to the durable state record of a single instance.
///
/// Acquired at tick start and released with [`close`](Self::close) on every
/// exit path. Writes are whole-record, last-writer-wins.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Returns the saved record, or an all-default record if none exists.
    async fn get(&self) -> Result<ScalingState>;

    /// Overwrites the stored record.
    async fn update(&self, state: &ScalingState) -> Result<()>;

    /// Releases the store handle.
    async fn close(&self) -> Result<()>;
}

fn record_key(snapshot: &InstanceSnapshot) -> String {
    format!("{}-{}", snapshot.project_id, snapshot.instance_id)
}

/// File-backed state store: one JSON record per instance.
pub struct FileStateStore {
    store: JsonStore,
}

impl FileStateStore {
    /// Opens the record for `snapshot` under `dir`.
    #[must_use]
    pub fn open(dir: &std::path::Path, snapshot: &InstanceSnapshot) -> Self {
        Self {
            store: JsonStore::new(dir, &record_key(snapshot)),
        }
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn get(&self) -> Result<ScalingState> {
        Ok(self.store.load())
    }

    async fn update(&self, state: &ScalingState) -> Result<()> {
        self.store
            .save(state)
            .map_err(|e| AutoscalerError::StateStore {
                reason: e.to_string(),
            })
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

type SharedStates = Arc<RwLock<HashMap<String, ScalingState>>>;

/// In-memory state store sharing a map across ticks.
pub struct InMemoryStateStore {
    states: SharedStates,
    key: String,
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn get(&self) -> Result<ScalingState> {
        Ok(self.states.read().get(&self.key).cloned().unwrap_or_default())
    }

    async fn update(&self, state: &ScalingState) -> Result<()> {
        self.states.write().insert(self.key.clone(), state.clone());
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Builds the state store named by each tick's snapshot.
///
/// The file backend defaults to the factory's root directory unless the
/// snapshot carries a path override. The memory backend shares one map
/// across every store the factory opens.
pub struct StateStoreFactory {
    root: PathBuf,
    memory: SharedStates,
}

impl StateStoreFactory {
    /// Creates a factory whose file-backed stores live under `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            memory: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Opens the state store for one tick.
    ///
    /// # Errors
    ///
    /// Returns [`AutoscalerError::StateStore`] if the backend cannot be
    /// constructed.
    pub fn open(&self, snapshot: &InstanceSnapshot) -> Result<Box<dyn StateStore>> {
        match snapshot.state_store.backend {
            StateBackend::File => {
                let dir = snapshot
                    .state_store
                    .path
                    .clone()
                    .unwrap_or_else(|| self.root.clone());
                debug!(
                    instance = %snapshot.instance_id,
                    dir = %dir.display(),
                    "opening file state store"
                );
                Ok(Box::new(FileStateStore::open(&dir, snapshot)))
            }
            StateBackend::Memory => Ok(Box::new(InMemoryStateStore {
                states: Arc::clone(&self.memory),
                key: record_key(snapshot),
            })),
        }
    }
}
