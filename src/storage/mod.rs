//! Secure-storage collaborators.
//!
//! The decision engine never touches key material. It sees two
//! capabilities: a [`Sealer`] that turns plaintext into an opaque
//! authenticated-encryption blob and back, and a [`SecureStore`] that
//! persists one blob per identity. [`TemplateVault`] couples them with the
//! template codec.

pub mod aead;
pub mod file;
pub mod memory;
pub mod vault;

pub use aead::AesGcmSealer;
pub use file::FileStore;
pub use memory::MemoryStore;
pub use vault::TemplateVault;

/// Ciphertext produced by a [`Sealer`]. Opaque to everything else.
#[derive(Clone, PartialEq, Eq)]
pub struct SealedBlob(Vec<u8>);

impl SealedBlob {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for SealedBlob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SealedBlob({} bytes)", self.0.len())
    }
}

/// Authenticated-encryption capability.
pub trait Sealer {
    fn seal(&self, plaintext: &[u8]) -> Result<SealedBlob, SealError>;

    /// Open a blob. A tag mismatch must surface as [`SealError::DecryptionFailure`].
    fn open(&self, blob: &SealedBlob) -> Result<Vec<u8>, SealError>;
}

/// Per-identity blob persistence.
pub trait SecureStore {
    fn persist(&mut self, identity_id: &str, blob: &SealedBlob) -> Result<(), StoreError>;

    fn retrieve(&self, identity_id: &str) -> Result<SealedBlob, StoreError>;

    fn delete(&mut self, identity_id: &str) -> Result<(), StoreError>;

    fn contains(&self, identity_id: &str) -> bool {
        self.retrieve(identity_id).is_ok()
    }
}

/// Sealing errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SealError {
    /// Key material could not be loaded or created
    Key(String),
    /// Encryption failed
    SealFailed(String),
    /// Tag mismatch or malformed blob
    DecryptionFailure,
}

impl std::fmt::Display for SealError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SealError::Key(e) => write!(f, "Key error: {e}"),
            SealError::SealFailed(e) => write!(f, "Seal failed: {e}"),
            SealError::DecryptionFailure => {
                write!(f, "Decryption failed - invalid key or tampered data")
            }
        }
    }
}

impl std::error::Error for SealError {}

/// Store errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    NotFound(String),
    InvalidIdentity(String),
    Io(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::NotFound(id) => write!(f, "Nothing stored for '{id}'"),
            StoreError::InvalidIdentity(id) => write!(f, "Invalid identity id '{id}'"),
            StoreError::Io(e) => write!(f, "IO error: {e}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Identity ids double as file names, so only a conservative charset is allowed.
pub fn validate_identity(identity_id: &str) -> Result<(), StoreError> {
    let ok = !identity_id.is_empty()
        && identity_id.len() <= 128
        && !identity_id.starts_with('.')
        && identity_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '@'));
    if ok {
        Ok(())
    } else {
        Err(StoreError::InvalidIdentity(identity_id.to_string()))
    }
}
