//! Sealed template persistence.

use crate::core::template::{self, Template, TemplateError};
use crate::storage::{SealError, Sealer, SecureStore, StoreError};

/// Couples a [`SecureStore`] with a [`Sealer`]: templates go in as
/// plaintext records and are only ever persisted sealed.
#[derive(Debug)]
pub struct TemplateVault<S, T> {
    store: S,
    sealer: T,
}

impl<S: SecureStore, T: Sealer> TemplateVault<S, T> {
    pub fn new(store: S, sealer: T) -> Self {
        Self { store, sealer }
    }

    /// Seal and persist, replacing any previous template for the identity.
    pub fn save(&mut self, template: &Template) -> Result<(), TemplateError> {
        let plaintext = template::to_bytes(&template.to_record()?)?;
        let blob = self
            .sealer
            .seal(&plaintext)
            .map_err(|e| TemplateError::SealFailed(e.to_string()))?;
        self.store
            .persist(template.identity_id(), &blob)
            .map_err(storage_error)
    }

    pub fn load(&self, identity_id: &str) -> Result<Template, TemplateError> {
        let blob = self.store.retrieve(identity_id).map_err(|e| match e {
            StoreError::NotFound(id) => TemplateError::TemplateNotFound(id),
            other => storage_error(other),
        })?;

        let plaintext = self.sealer.open(&blob).map_err(|e| match e {
            SealError::DecryptionFailure => TemplateError::OpenFailed(e.to_string()),
            other => TemplateError::Storage(other.to_string()),
        })?;

        let template = Template::from_record(&template::from_bytes(&plaintext)?)?;
        if template.identity_id() != identity_id {
            return Err(TemplateError::OpenFailed(format!(
                "blob for '{identity_id}' holds a template for '{}'",
                template.identity_id()
            )));
        }
        Ok(template)
    }

    pub fn remove(&mut self, identity_id: &str) -> Result<(), TemplateError> {
        self.store.delete(identity_id).map_err(|e| match e {
            StoreError::NotFound(id) => TemplateError::TemplateNotFound(id),
            other => storage_error(other),
        })
    }

    pub fn is_enrolled(&self, identity_id: &str) -> bool {
        self.store.contains(identity_id)
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }
}

fn storage_error(e: StoreError) -> TemplateError {
    TemplateError::Storage(e.to_string())
}
