//! The `persistence` module stores bootstrap snapshots for the page layer.
//!
//! The relay itself keeps no durable state. A few upstream categories
//! (credentials, the stock list, company names) are not topics at all but
//! one-shot data the page-rendering layer reads later; the ingest adapter
//! hands them to a `SnapshotStore` by name.
//!
//! Two backends exist: plain files in a directory, and an embedded `sled`
//! database.

pub mod file_store;
pub mod sled_store;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::config::{SnapshotBackend, SnapshotSettings};
use crate::utils::RelayError;

pub use file_store::FileSnapshotStore;
pub use sled_store::SledSnapshotStore;

pub trait SnapshotStore: Send + Sync {
    /// Replace the snapshot stored under `name`.
    fn persist_snapshot(&self, name: &str, bytes: &[u8]) -> Result<(), RelayError>;

    fn load_snapshot(&self, name: &str) -> Result<Option<Vec<u8>>, RelayError>;
}

/// Open the backend selected in configuration.
pub fn open_store(settings: &SnapshotSettings) -> Result<Arc<dyn SnapshotStore>, RelayError> {
    Ok(match settings.backend {
        SnapshotBackend::File => Arc::new(FileSnapshotStore::new(&settings.path)),
        SnapshotBackend::Sled => Arc::new(SledSnapshotStore::open(&settings.path)?),
    })
}

/// Keeps snapshots in memory; for embedding and tests.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    snapshots: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn names(&self) -> Vec<String> {
        let snapshots = self.snapshots.lock().unwrap_or_else(|e| e.into_inner());
        let mut names: Vec<String> = snapshots.keys().cloned().collect();
        names.sort();
        names
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn persist_snapshot(&self, name: &str, bytes: &[u8]) -> Result<(), RelayError> {
        self.snapshots
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name.to_string(), bytes.to_vec());
        Ok(())
    }

    fn load_snapshot(&self, name: &str) -> Result<Option<Vec<u8>>, RelayError> {
        Ok(self
            .snapshots
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned())
    }
}
