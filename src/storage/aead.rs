//! AES-256-GCM sealer.
//!
//! Blob layout: 12-byte random nonce followed by ciphertext and the 16-byte
//! tag.

use crate::storage::{SealError, SealedBlob, Sealer};
use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::rngs::OsRng;
use rand::RngCore;
use std::path::Path;

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Seals template plaintext with a 256-bit key.
#[derive(Clone)]
pub struct AesGcmSealer {
    key: [u8; KEY_LEN],
}

impl AesGcmSealer {
    pub fn new(key: [u8; KEY_LEN]) -> Self {
        Self { key }
    }

    /// Sealer with a fresh random key.
    pub fn generate() -> Self {
        let mut key = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut key);
        Self { key }
    }

    pub fn from_hex(encoded: &str) -> Result<Self, SealError> {
        let bytes = hex::decode(encoded.trim()).map_err(|e| SealError::Key(e.to_string()))?;
        let key: [u8; KEY_LEN] = bytes
            .try_into()
            .map_err(|_| SealError::Key("key must be 32 bytes".to_string()))?;
        Ok(Self { key })
    }

    /// Load the hex key at `path`, creating one if the file does not exist.
    pub fn load_or_create(path: &Path) -> Result<Self, SealError> {
        if path.exists() {
            let content =
                std::fs::read_to_string(path).map_err(|e| SealError::Key(e.to_string()))?;
            return Self::from_hex(&content);
        }

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SealError::Key(e.to_string()))?;
        }
        let sealer = Self::generate();
        std::fs::write(path, hex::encode(sealer.key)).map_err(|e| SealError::Key(e.to_string()))?;
        restrict_permissions(path)?;
        tracing::info!(path = %path.display(), "created new template sealing key");
        Ok(sealer)
    }

    fn cipher(&self) -> Result<Aes256Gcm, SealError> {
        Aes256Gcm::new_from_slice(&self.key).map_err(|e| SealError::Key(e.to_string()))
    }
}

impl std::fmt::Debug for AesGcmSealer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AesGcmSealer { key: <redacted> }")
    }
}

impl Sealer for AesGcmSealer {
    fn seal(&self, plaintext: &[u8]) -> Result<SealedBlob, SealError> {
        let cipher = self.cipher()?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext)
            .map_err(|e| SealError::SealFailed(e.to_string()))?;

        let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        blob.extend_from_slice(&nonce_bytes);
        blob.extend(ciphertext);
        Ok(SealedBlob::from_bytes(blob))
    }

    fn open(&self, blob: &SealedBlob) -> Result<Vec<u8>, SealError> {
        let bytes = blob.as_bytes();
        if bytes.len() < NONCE_LEN + TAG_LEN {
            return Err(SealError::DecryptionFailure);
        }

        let (nonce_bytes, ciphertext) = bytes.split_at(NONCE_LEN);
        self.cipher()?
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| SealError::DecryptionFailure)
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<(), SealError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| SealError::Key(e.to_string()))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<(), SealError> {
    Ok(())
}
