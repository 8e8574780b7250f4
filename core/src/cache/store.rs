use std::{collections::HashMap, error::Error, sync::Mutex};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store backend failed: {0}")]
    Backend(#[source] Box<dyn Error + Send + Sync>),
    #[error("store lock poisoned")]
    Poisoned,
}

impl StoreError {
    pub fn backend<E: Error + Send + Sync + 'static>(e: E) -> Self {
        Self::Backend(Box::new(e))
    }
}

/// Durable key to bytes storage. Calls are synchronous and expected to be local.
pub trait BlobStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;
    fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError>;
    /// Returns whether the key existed
    fn delete(&self, key: &str) -> Result<bool, StoreError>;
}

/// A store that lives as long as the process
#[derive(Debug, Default)]
pub struct MemoryStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlobStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let blobs = self.blobs.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(blobs.get(key).cloned())
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let mut blobs = self.blobs.lock().map_err(|_| StoreError::Poisoned)?;
        blobs.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let mut blobs = self.blobs.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(blobs.remove(key).is_some())
    }
}
