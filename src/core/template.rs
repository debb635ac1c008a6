//! Enrolled templates and their versioned storage record.
//!
//! The codec turns a feature vector plus metadata into a plaintext
//! [`TemplateRecord`] and back. It performs no cryptography; sealing is done
//! by the storage collaborators in [`crate::storage`].

use crate::core::features::FeatureVector;
use crate::core::policy::SecurityLevel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Schema version written into every record.
pub const CURRENT_TEMPLATE_VERSION: u32 = 1;

/// Everything stored alongside the feature vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateMetadata {
    pub id: Uuid,
    pub identity_id: String,
    pub created_at: DateTime<Utc>,
    pub last_authenticated_at: Option<DateTime<Utc>>,
    pub authentication_count: u64,
    pub security_level: SecurityLevel,
    /// Host the template was enrolled on, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
}

/// Plaintext, versioned storage form of a template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateRecord {
    pub template_version: u32,
    pub metadata: TemplateMetadata,
    pub feature_vector: FeatureVector,
}

/// Template codec and vault errors.
#[derive(Debug)]
pub enum TemplateError {
    /// The record could not be produced or parsed
    SerializationFailed(String),
    /// The sealing collaborator refused the plaintext
    SealFailed(String),
    /// The sealed blob failed to open: corrupted or tampered data
    OpenFailed(String),
    /// No template stored for the identity
    TemplateNotFound(String),
    /// The record was written by an unknown schema version
    UnsupportedVersion(u32),
    /// The storage collaborator failed
    Storage(String),
}

impl std::fmt::Display for TemplateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TemplateError::SerializationFailed(e) => {
                write!(f, "Template serialization failed: {e}")
            }
            TemplateError::SealFailed(e) => write!(f, "Template seal failed: {e}"),
            TemplateError::OpenFailed(e) => {
                write!(f, "Template could not be opened (corrupted or tampered): {e}")
            }
            TemplateError::TemplateNotFound(id) => write!(f, "No template found for '{id}'"),
            TemplateError::UnsupportedVersion(v) => {
                write!(f, "Unsupported template version {v} (expected {CURRENT_TEMPLATE_VERSION})")
            }
            TemplateError::Storage(e) => write!(f, "Template storage error: {e}"),
        }
    }
}

impl std::error::Error for TemplateError {}

/// Build a record from a feature vector and its metadata.
///
/// Invalid vectors (NaN, Inf, out-of-bound descriptors) are never encoded.
pub fn encode(
    vector: &FeatureVector,
    metadata: &TemplateMetadata,
) -> Result<TemplateRecord, TemplateError> {
    if !vector.is_valid() {
        return Err(TemplateError::SerializationFailed(
            "feature vector contains non-finite or out-of-range descriptors".to_string(),
        ));
    }
    Ok(TemplateRecord {
        template_version: CURRENT_TEMPLATE_VERSION,
        metadata: metadata.clone(),
        feature_vector: *vector,
    })
}

/// Recover the feature vector from a record.
pub fn decode(record: &TemplateRecord) -> Result<FeatureVector, TemplateError> {
    if record.template_version != CURRENT_TEMPLATE_VERSION {
        return Err(TemplateError::UnsupportedVersion(record.template_version));
    }
    if !record.feature_vector.is_valid() {
        return Err(TemplateError::SerializationFailed(
            "stored feature vector is invalid".to_string(),
        ));
    }
    Ok(record.feature_vector)
}

/// Serialize a record to the plaintext handed to the sealer.
pub fn to_bytes(record: &TemplateRecord) -> Result<Vec<u8>, TemplateError> {
    serde_json::to_vec(record).map_err(|e| TemplateError::SerializationFailed(e.to_string()))
}

/// Parse plaintext produced by [`to_bytes`].
///
/// The version is read before the body so a record from a newer schema
/// fails with `UnsupportedVersion` rather than a parse error.
pub fn from_bytes(bytes: &[u8]) -> Result<TemplateRecord, TemplateError> {
    let value: serde_json::Value = serde_json::from_slice(bytes)
        .map_err(|e| TemplateError::SerializationFailed(e.to_string()))?;

    let version = value
        .get("template_version")
        .and_then(|v| v.as_u64())
        .ok_or_else(|| {
            TemplateError::SerializationFailed("missing template_version".to_string())
        })?;

    match u32::try_from(version) {
        Ok(CURRENT_TEMPLATE_VERSION) => serde_json::from_value(value)
            .map_err(|e| TemplateError::SerializationFailed(e.to_string())),
        Ok(other) => Err(TemplateError::UnsupportedVersion(other)),
        Err(_) => Err(TemplateError::UnsupportedVersion(u32::MAX)),
    }
}

/// An enrolled identity's template.
///
/// Counters change only through [`Template::record_authentication`], which
/// the decision engine calls on approval.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    metadata: TemplateMetadata,
    feature_vector: FeatureVector,
}

impl Template {
    /// Create a fresh template at enrollment time.
    pub fn new(
        identity_id: impl Into<String>,
        feature_vector: FeatureVector,
        security_level: SecurityLevel,
        created_at: DateTime<Utc>,
        device_id: Option<String>,
    ) -> Self {
        Self {
            metadata: TemplateMetadata {
                id: Uuid::new_v4(),
                identity_id: identity_id.into(),
                created_at,
                last_authenticated_at: None,
                authentication_count: 0,
                security_level,
                device_id,
            },
            feature_vector,
        }
    }

    pub fn from_record(record: &TemplateRecord) -> Result<Self, TemplateError> {
        Ok(Self {
            feature_vector: decode(record)?,
            metadata: record.metadata.clone(),
        })
    }

    pub fn to_record(&self) -> Result<TemplateRecord, TemplateError> {
        encode(&self.feature_vector, &self.metadata)
    }

    pub fn id(&self) -> Uuid {
        self.metadata.id
    }

    pub fn identity_id(&self) -> &str {
        &self.metadata.identity_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.metadata.created_at
    }

    pub fn last_authenticated_at(&self) -> Option<DateTime<Utc>> {
        self.metadata.last_authenticated_at
    }

    pub fn authentication_count(&self) -> u64 {
        self.metadata.authentication_count
    }

    pub fn security_level(&self) -> SecurityLevel {
        self.metadata.security_level
    }

    pub fn device_id(&self) -> Option<&str> {
        self.metadata.device_id.as_deref()
    }

    pub fn feature_vector(&self) -> &FeatureVector {
        &self.feature_vector
    }

    pub fn metadata(&self) -> &TemplateMetadata {
        &self.metadata
    }

    pub(crate) fn record_authentication(&mut self, at: DateTime<Utc>) {
        self.metadata.authentication_count += 1;
        self.metadata.last_authenticated_at = Some(at);
    }
}
