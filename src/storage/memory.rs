//! In-memory secure store, for tests and ephemeral sessions.

use crate::storage::{validate_identity, SealedBlob, SecureStore, StoreError};
use std::collections::HashMap;

#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    blobs: HashMap<String, SealedBlob>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

impl SecureStore for MemoryStore {
    fn persist(&mut self, identity_id: &str, blob: &SealedBlob) -> Result<(), StoreError> {
        validate_identity(identity_id)?;
        self.blobs.insert(identity_id.to_string(), blob.clone());
        Ok(())
    }

    fn retrieve(&self, identity_id: &str) -> Result<SealedBlob, StoreError> {
        self.blobs
            .get(identity_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(identity_id.to_string()))
    }

    fn delete(&mut self, identity_id: &str) -> Result<(), StoreError> {
        self.blobs
            .remove(identity_id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(identity_id.to_string()))
    }

    fn contains(&self, identity_id: &str) -> bool {
        self.blobs.contains_key(identity_id)
    }
}
