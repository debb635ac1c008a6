//! File-backed secure store: one `<identity>.sealed` file per identity.

use crate::storage::{validate_identity, SealedBlob, SecureStore, StoreError};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Create a store rooted at `root`, creating the directory if needed.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| StoreError::Io(e.to_string()))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn blob_path(&self, identity_id: &str) -> Result<PathBuf, StoreError> {
        validate_identity(identity_id)?;
        Ok(self.root.join(format!("{identity_id}.sealed")))
    }
}

impl SecureStore for FileStore {
    /// Write to a temporary file and rename over the old blob, so a
    /// re-enrollment either fully replaces the template or leaves it intact.
    fn persist(&mut self, identity_id: &str, blob: &SealedBlob) -> Result<(), StoreError> {
        let path = self.blob_path(identity_id)?;
        let tmp = self.root.join(format!(".{identity_id}.sealed.tmp"));

        std::fs::write(&tmp, blob.as_bytes()).map_err(|e| StoreError::Io(e.to_string()))?;
        std::fs::rename(&tmp, &path).map_err(|e| {
            let _ = std::fs::remove_file(&tmp);
            StoreError::Io(e.to_string())
        })
    }

    fn retrieve(&self, identity_id: &str) -> Result<SealedBlob, StoreError> {
        let path = self.blob_path(identity_id)?;
        match std::fs::read(&path) {
            Ok(bytes) => Ok(SealedBlob::from_bytes(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(identity_id.to_string()))
            }
            Err(e) => Err(StoreError::Io(e.to_string())),
        }
    }

    fn delete(&mut self, identity_id: &str) -> Result<(), StoreError> {
        let path = self.blob_path(identity_id)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(identity_id.to_string()))
            }
            Err(e) => Err(StoreError::Io(e.to_string())),
        }
    }

    fn contains(&self, identity_id: &str) -> bool {
        self.blob_path(identity_id)
            .map(|p| p.is_file())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_store_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileStore::new(dir.path().join("templates")).unwrap();

        assert!(!store.contains("alice"));
        store.persist("alice", &SealedBlob::from_bytes(vec![1, 2, 3])).unwrap();
        assert!(store.contains("alice"));
        assert_eq!(store.retrieve("alice").unwrap().as_bytes(), &[1, 2, 3]);

        store.persist("alice", &SealedBlob::from_bytes(vec![9])).unwrap();
        assert_eq!(store.retrieve("alice").unwrap().as_bytes(), &[9]);

        store.delete("alice").unwrap();
        assert_eq!(
            store.retrieve("alice"),
            Err(StoreError::NotFound("alice".to_string()))
        );
    }

    #[test]
    fn test_path_traversal_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileStore::new(dir.path()).unwrap();
        assert!(matches!(
            store.persist("../escape", &SealedBlob::from_bytes(vec![0])),
            Err(StoreError::InvalidIdentity(_))
        ));
    }
}
