//! File-backed JSON snapshot store.
//!
//! Provides [`JsonStore`], the small persistence foundation used by the
//! granite autoscaler for durable per-instance state. A store is bound to a
//! directory and a record name; it loads the record on demand and saves it
//! atomically (write to a temp file in the same directory, then rename).

#![forbid(unsafe_code)]

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors raised while loading or saving a JSON snapshot.
#[derive(Debug, Error)]
pub enum PersistError {
    /// Filesystem error while reading or writing the snapshot.
    #[error("persist io error: {0}")]
    Io(#[from] std::io::Error),

    /// The record could not be serialized.
    #[error("persist serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Result type for persistence operations.
pub type Result<T> = std::result::Result<T, PersistError>;

/// A JSON snapshot store for a single named record.
///
/// The record lives at `<dir>/<name>.json`. Loading a missing or unreadable
/// file yields the record type's default; a corrupt file is logged and also
/// falls back to the default rather than wedging the caller.
#[derive(Debug, Clone)]
pub struct JsonStore {
    path: PathBuf,
}

impl JsonStore {
    /// Creates a store for `<dir>/<name>.json`.
    #[must_use]
    pub fn new(dir: &Path, name: &str) -> Self {
        Self {
            path: dir.join(format!("{name}.json")),
        }
    }

    /// Returns the path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the record, falling back to `T::default()` when the file is
    /// absent or unparseable.
    #[must_use]
    pub fn load<T: DeserializeOwned + Default>(&self) -> T {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no snapshot on disk, using default");
                return T::default();
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to read snapshot");
                return T::default();
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(value) => value,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "corrupt snapshot, using default");
                T::default()
            }
        }
    }

    /// Saves the record atomically.
    ///
    /// # Errors
    ///
    /// Returns [`PersistError`] if the directory cannot be created, the
    /// record cannot be serialized, or the temp file cannot be written or
    /// renamed into place.
    pub fn save<T: Serialize>(&self, value: &T) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }

        let json = serde_json::to_vec_pretty(value)?;

        // Write-then-rename so readers never observe a partial record.
        let tmp = self.path.with_extension("json.tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&json)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;

        debug!(path = %self.path.display(), bytes = json.len(), "snapshot saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(
        Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize,
    )]
    struct Record {
        count: u32,
        label: String,
    }

    #[test]
    fn load_missing_returns_default() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonStore::new(dir.path(), "absent");

        let record: Record = store.load();
        assert_eq!(record, Record::default());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonStore::new(dir.path(), "counters");

        let record = Record {
            count: 7,
            label: "seven".to_string(),
        };
        store.save(&record).expect("save");

        let loaded: Record = store.load();
        assert_eq!(loaded, record);
    }

    #[test]
    fn save_creates_missing_directories() {
        let dir = tempfile::tempdir().expect("tempdir");
        let nested = dir.path().join("a").join("b");
        let store = JsonStore::new(&nested, "rec");

        store.save(&Record::default()).expect("save");
        assert!(store.path().exists());
    }

    #[test]
    fn corrupt_file_falls_back_to_default() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonStore::new(dir.path(), "broken");

        fs::write(store.path(), b"{not json").expect("write");
        let record: Record = store.load();
        assert_eq!(record, Record::default());
    }

    #[test]
    fn save_overwrites_previous_record() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonStore::new(dir.path(), "map");

        let mut map = HashMap::new();
        map.insert("a".to_string(), 1u32);
        store.save(&map).expect("save");

        map.insert("b".to_string(), 2u32);
        store.save(&map).expect("save again");

        let loaded: HashMap<String, u32> = store.load();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.get("b"), Some(&2));
    }

    #[test]
    fn no_temp_file_left_behind() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonStore::new(dir.path(), "clean");
        store.save(&Record::default()).expect("save");

        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .expect("read dir")
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
