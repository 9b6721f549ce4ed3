//! In-memory registry.
//!
//! Thread-safe, process-local implementation of [`Registry`]. Used for
//! embedded hosting and tests, and as the reference for other backends.

use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;

use chrono::Utc;
use uuid::Uuid;

use crate::error::{RegistryError, ValidationError};
use crate::party::{Party, Right};
use crate::signing::{self, KeyPair, PrivateKey, PublicKey};

use super::{namespaced_id, publication_message, Receipt, Registry, StoredRecord};

fn lock_err(context: &'static str) -> RegistryError {
    RegistryError::Backend(format!("poisoned lock: {context}"))
}

/// Registry holding objects in a process-local map.
pub struct InMemoryRegistry {
    name: String,
    keys: KeyPair,
    objects: RwLock<HashMap<String, StoredRecord>>,
}

impl InMemoryRegistry {
    /// Creates an empty registry with a fresh signing key.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::EmptyName` if `name` is blank.
    pub fn new(name: impl Into<String>) -> Result<Self, ValidationError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ValidationError::EmptyName {
                field: "registry.name".to_string(),
            });
        }
        Ok(Self {
            name,
            keys: KeyPair::generate(),
            objects: RwLock::new(HashMap::new()),
        })
    }

    /// Key publication signatures verify against.
    #[must_use]
    pub const fn public_key(&self) -> &PublicKey {
        &self.keys.public_key
    }

    /// Issues a new party identity bound to this registry, returning the
    /// party and its private key.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::EmptyName` if `name` is blank.
    pub fn issue_party(&self, name: &str) -> Result<(Party, PrivateKey), ValidationError> {
        let keys = KeyPair::generate();
        let party = Party::new(name, keys.public_key)?.on_registry(self.name.clone());
        Ok((party, keys.private_key))
    }

    /// Issues a new right bound to this registry.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::EmptyName` if `name` is blank.
    pub fn issue_right(&self, name: &str) -> Result<Right, ValidationError> {
        Ok(Right::new(name)?
            .with_public_key(KeyPair::generate().public_key)
            .on_registry(self.name.clone()))
    }

    /// Number of stored objects.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::Backend` if the store lock is poisoned.
    pub fn len(&self) -> Result<usize, RegistryError> {
        Ok(self.objects.read().map_err(|_| lock_err("registry.len"))?.len())
    }

    /// Returns true if nothing has been published.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::Backend` if the store lock is poisoned.
    pub fn is_empty(&self) -> Result<bool, RegistryError> {
        Ok(self.len()? == 0)
    }
}

impl Registry for InMemoryRegistry {
    fn name(&self) -> &str {
        &self.name
    }

    fn publish(&self, data: String) -> Result<Receipt, RegistryError> {
        let mut objects = self.objects.write().map_err(|_| lock_err("registry.publish"))?;

        let mut id = Uuid::new_v4().to_string();
        while objects.contains_key(&id) {
            id = Uuid::new_v4().to_string();
        }
        let publish_timestamp = Utc::now();
        let message = publication_message(&data, &namespaced_id(&self.name, &id), &publish_timestamp);
        let record = StoredRecord {
            id: id.clone(),
            publish_timestamp,
            publish_signature: signing::sign(&self.keys.private_key, &message),
            data,
        };
        objects.insert(id, record.clone());

        tracing::info!(registry = %self.name, id = %record.id, "object published");
        Ok(Receipt {
            registry: self.name.clone(),
            record,
        })
    }

    fn fetch(&self, id: &str) -> Result<StoredRecord, RegistryError> {
        let objects = self.objects.read().map_err(|_| lock_err("registry.fetch"))?;
        objects.get(id).cloned().ok_or_else(|| RegistryError::ObjectNotFound {
            registry: self.name.clone(),
            id: id.to_string(),
        })
    }
}

impl fmt::Debug for InMemoryRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryRegistry")
            .field("name", &self.name)
            .field("public_key", &self.keys.public_key)
            .finish_non_exhaustive()
    }
}
