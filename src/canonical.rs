//! Canonical contract encoding.
//!
//! A contract is published and hashed as JSON with a fixed field order:
//! `parties`, `body`, `isExpired`, `isRevoked`, `rights`, `registry`,
//! `signatures`. Maps are `BTreeMap`s so keys come out sorted. The hash
//! every party signs is `blake3` over this encoding with `signatures` left
//! out.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::body::{BodyRecord, PredicateRecord};
use crate::error::{ContractError, DeserializationError};
use crate::party::{Party, Right};
use crate::signing::SignatureBytes;

/// Which optional parts a serialization includes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanonicalFilter {
    /// Include the `signatures` map.
    pub signatures: bool,
}

impl CanonicalFilter {
    /// Everything, for publishing.
    pub const FULL: Self = Self { signatures: true };

    /// The signed message: no signatures.
    pub const UNSIGNED: Self = Self { signatures: false };
}

impl Default for CanonicalFilter {
    fn default() -> Self {
        Self::FULL
    }
}

/// Plain-record form of a contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct ContractRecord {
    pub parties: BTreeMap<String, Party>,
    pub body: BodyRecord,
    #[serde(default)]
    pub is_expired: PredicateRecord,
    #[serde(default)]
    pub is_revoked: PredicateRecord,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub rights: BTreeMap<String, Right>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signatures: Option<BTreeMap<String, SignatureBytes>>,
}

impl ContractRecord {
    /// Encodes the record, dropping whatever `filter` excludes.
    pub fn to_canonical_json(&self, filter: CanonicalFilter) -> Result<String, ContractError> {
        let encoded = if filter.signatures || self.signatures.is_none() {
            serde_json::to_string(self)
        } else {
            serde_json::to_string(&Self {
                signatures: None,
                ..self.clone()
            })
        };
        encoded.map_err(|e| ContractError::internal(format!("serialize contract: {e}")))
    }

    /// Decodes a stored blob.
    pub fn from_json(data: &str) -> Result<Self, DeserializationError> {
        serde_json::from_str(data).map_err(|e| DeserializationError::Malformed {
            reason: e.to_string(),
        })
    }
}

/// `blake3` digest of a contract's signature-free canonical encoding.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContractHash([u8; 32]);

impl ContractHash {
    /// Hashes canonical bytes.
    #[must_use]
    pub fn of(canonical: &[u8]) -> Self {
        Self(*blake3::hash(canonical).as_bytes())
    }

    /// Raw digest.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lower-case hex digest.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for ContractHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ContractHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContractHash({})", self.to_hex())
    }
}
