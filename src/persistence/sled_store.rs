//! Snapshot store backed by `sled`
//!
//! Snapshots live in a dedicated tree keyed by snapshot name. Every write is
//! flushed before returning, since snapshots are rare and the page layer
//! may read them from another process right after.

use sled::{Db, Tree};

use crate::persistence::SnapshotStore;
use crate::utils::RelayError;

const SNAPSHOT_TREE: &str = "snapshots";

#[derive(Clone)]
pub struct SledSnapshotStore {
    db: Db,
    tree: Tree,
}

impl SledSnapshotStore {
    /// Open or create a sled database at `path`.
    pub fn open(path: &str) -> Result<Self, RelayError> {
        let db = sled::open(path)?;
        let tree = db.open_tree(SNAPSHOT_TREE)?;
        Ok(Self { db, tree })
    }

    pub fn names(&self) -> Vec<String> {
        self.tree
            .iter()
            .keys()
            .filter_map(|key| key.ok())
            .filter_map(|key| String::from_utf8(key.to_vec()).ok())
            .collect()
    }
}

impl SnapshotStore for SledSnapshotStore {
    fn persist_snapshot(&self, name: &str, bytes: &[u8]) -> Result<(), RelayError> {
        self.tree.insert(name.as_bytes(), bytes)?;
        self.db.flush()?;
        Ok(())
    }

    fn load_snapshot(&self, name: &str) -> Result<Option<Vec<u8>>, RelayError> {
        Ok(self.tree.get(name.as_bytes())?.map(|value| value.to_vec()))
    }
}

impl std::fmt::Debug for SledSnapshotStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledSnapshotStore")
            .field("db", &"sled::Db")
            .finish()
    }
}
