//! Publish/fetch boundary.
//!
//! A registry is an opaque content store: it takes a canonical blob, assigns
//! it a unique id and a timestamp, and signs the triple with its own key so
//! holders of a [`Receipt`] can check where the object came from.

mod memory;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{RegistryError, VerificationFailure};
use crate::signing::{self, PublicKey, SignatureBytes};

pub use memory::InMemoryRegistry;

/// Object store contracts are published to.
///
/// Implementations must hand out a unique id per `publish`, even under
/// concurrent callers.
pub trait Registry: Send + Sync {
    /// Name receipts are scoped to.
    fn name(&self) -> &str;

    /// Stores `data`.
    fn publish(&self, data: String) -> Result<Receipt, RegistryError>;

    /// Retrieves a previously published object.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::ObjectNotFound` for an unknown id.
    fn fetch(&self, id: &str) -> Result<StoredRecord, RegistryError>;
}

/// Object as kept by a registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredRecord {
    /// Registry-assigned id.
    pub id: String,
    /// When the registry accepted the object.
    pub publish_timestamp: DateTime<Utc>,
    /// Registry signature over the publication digest.
    pub publish_signature: SignatureBytes,
    /// Published payload, verbatim.
    pub data: String,
}

/// What `publish` hands back: the stored record plus the registry it lives on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    /// Name of the registry holding the record.
    pub registry: String,
    /// The stored record.
    #[serde(flatten)]
    pub record: StoredRecord,
}

impl Receipt {
    /// Registry-assigned id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.record.id
    }

    /// `<registry>/<id>`.
    #[must_use]
    pub fn namespaced_id(&self) -> String {
        namespaced_id(&self.registry, &self.record.id)
    }

    /// Checks the registry's signature over this publication.
    ///
    /// # Errors
    ///
    /// Returns `VerificationFailure` if `registry_key` did not sign this
    /// data, id and timestamp.
    pub fn verify_publication(&self, registry_key: &PublicKey) -> Result<(), VerificationFailure> {
        let message = publication_message(
            &self.record.data,
            &self.namespaced_id(),
            &self.record.publish_timestamp,
        );
        signing::verify(registry_key, &message, &self.record.publish_signature)
    }
}

pub(crate) fn namespaced_id(registry: &str, id: &str) -> String {
    format!("{registry}/{id}")
}

/// Digest a registry signs when it accepts an object.
pub(crate) fn publication_message(data: &str, namespaced_id: &str, timestamp: &DateTime<Utc>) -> [u8; 32] {
    *blake3::hash(format!("{data}/{namespaced_id}/{}", timestamp.to_rfc3339()).as_bytes()).as_bytes()
}
