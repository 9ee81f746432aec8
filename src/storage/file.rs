//! File-based storage backend.

use crate::error::Result;
use crate::storage::traits::KeyValueStore;
use std::fs;
use std::io;
use std::path::PathBuf;

/// File-based storage backend with atomic writes.
///
/// Each key lives in its own `state/<key>.json` file.
#[derive(Debug)]
pub struct FileBackend {
    base_dir: PathBuf,
}

impl FileBackend {
    /// Create a new file backend.
    ///
    /// Creates the state directory if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the state directory cannot be created.
    pub fn new(base_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(base_dir.join("state"))?;
        Ok(Self { base_dir })
    }

    /// Get the path to a key's file.
    fn key_path(&self, key: &str) -> PathBuf {
        self.base_dir.join("state").join(format!("{key}.json"))
    }
}

impl KeyValueStore for FileBackend {
    fn get(&self, key: &str) -> Result<Option<String>> {
        match fs::read_to_string(self.key_path(key)) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let path = self.key_path(key);
        let temp = path.with_extension("tmp");

        fs::write(&temp, value)?;

        // Atomic rename - prevents torn records if the process dies mid-write
        fs::rename(&temp, &path)?;

        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.key_path(key)) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}
