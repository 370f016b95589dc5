//! Snapshot files in a well-known directory
//!
//! Each snapshot is one file named after the snapshot. Writes go to a
//! temporary sibling first and are renamed into place, so a reader never
//! sees a half-written file.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::persistence::SnapshotStore;
use crate::utils::RelayError;

#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    dir: PathBuf,
}

impl FileSnapshotStore {
    /// The directory is created on first write.
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn persist_snapshot(&self, name: &str, bytes: &[u8]) -> Result<(), RelayError> {
        fs::create_dir_all(&self.dir)?;
        let target = self.path_for(name);
        let staging = self.dir.join(format!(".{name}.tmp"));
        fs::write(&staging, bytes)?;
        fs::rename(&staging, &target)?;
        Ok(())
    }

    fn load_snapshot(&self, name: &str) -> Result<Option<Vec<u8>>, RelayError> {
        match fs::read(self.path_for(name)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
