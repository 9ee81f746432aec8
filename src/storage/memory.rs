//! In-memory storage backend for testing and embedding.

use crate::error::Result;
use crate::storage::traits::KeyValueStore;
use parking_lot::RwLock;
use std::collections::HashMap;

/// In-memory storage backend.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryBackend {
    /// Create a new in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether no keys are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueStore for MemoryBackend {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .write()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries.write().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_missing_key() {
        let store = MemoryBackend::new();
        assert!(store.get("nonexistent").unwrap().is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn set_and_get() {
        let store = MemoryBackend::new();
        store.set("broker_session", "{}").unwrap();
        assert_eq!(store.get("broker_session").unwrap().as_deref(), Some("{}"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn remove_deletes_key() {
        let store = MemoryBackend::new();
        store.set("broker_session", "{}").unwrap();
        store.remove("broker_session").unwrap();
        assert!(store.get("broker_session").unwrap().is_none());
    }

    #[test]
    fn remove_nonexistent_key_succeeds() {
        let store = MemoryBackend::new();
        store.remove("nonexistent").unwrap();
    }

    #[test]
    fn concurrent_read_write() {
        use std::sync::Arc;
        use std::thread;

        let store = Arc::new(MemoryBackend::new());
        store.set("shared", "0").unwrap();

        let mut handles = vec![];

        for _ in 0..5 {
            let store_clone = Arc::clone(&store);
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    assert!(store_clone.get("shared").unwrap().is_some());
                }
            }));
        }

        for i in 0..5 {
            let store_clone = Arc::clone(&store);
            handles.push(thread::spawn(move || {
                for j in 0..20 {
                    store_clone.set("shared", &format!("{i}-{j}")).unwrap();
                    store_clone.set(&format!("key-{i}-{j}"), "v").unwrap();
                }
            }));
        }

        for handle in handles {
            handle.join().expect("Thread panicked");
        }

        assert_eq!(store.len(), 101); // shared + 5*20 distinct keys
    }
}
