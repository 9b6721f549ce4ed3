//! Parties and rights.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::joint::JointState;
use crate::signing::PublicKey;
use crate::state::State;

/// Identity reference: a name bound to a public key.
///
/// Shared read-only across every contract that references it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Party {
    /// Unique name within a contract.
    pub name: String,
    /// Key the party's signatures verify against.
    #[serde(default)]
    pub public_key: Option<PublicKey>,
    /// Registry that issued the identity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry: Option<String>,
}

impl Party {
    /// Creates a party bound to `public_key`.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::EmptyName` if `name` is blank.
    pub fn new(name: impl Into<String>, public_key: PublicKey) -> Result<Self, ValidationError> {
        let party = Self::unkeyed(name)?;
        Ok(Self {
            public_key: Some(public_key),
            ..party
        })
    }

    /// Creates a party with no public key. Such a party can never be
    /// verified as having signed.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::EmptyName` if `name` is blank.
    pub fn unkeyed(name: impl Into<String>) -> Result<Self, ValidationError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ValidationError::EmptyName {
                field: "party.name".to_string(),
            });
        }
        Ok(Self {
            name,
            public_key: None,
            registry: None,
        })
    }

    /// Records the registry this identity was issued by.
    #[must_use]
    pub fn on_registry(mut self, registry: impl Into<String>) -> Self {
        self.registry = Some(registry.into());
        self
    }
}

/// Scarce capability granted to a party with an associated belief.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Right {
    /// Unique name within a contract.
    pub name: String,
    /// Key of the right's issuer.
    #[serde(default)]
    pub public_key: Option<PublicKey>,
    /// Registry that issued the right.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry: Option<String>,
    /// Which party holds the right, and how strongly. Runtime state, not
    /// part of the right's definition.
    #[serde(skip)]
    valid: JointState,
}

impl Right {
    /// Creates an unassigned right.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::EmptyName` if `name` is blank.
    pub fn new(name: impl Into<String>) -> Result<Self, ValidationError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ValidationError::EmptyName {
                field: "right.name".to_string(),
            });
        }
        Ok(Self {
            name,
            public_key: None,
            registry: None,
            valid: JointState::new(),
        })
    }

    /// Attaches the issuer's key.
    #[must_use]
    pub fn with_public_key(mut self, public_key: PublicKey) -> Self {
        self.public_key = Some(public_key);
        self
    }

    /// Binds the right to a registry.
    #[must_use]
    pub fn on_registry(mut self, registry: impl Into<String>) -> Self {
        self.registry = Some(registry.into());
        self
    }

    /// Grants the right to `party` with belief `state`, replacing any
    /// previous assignment.
    pub fn assign(&mut self, party: &Party, state: impl Into<State>) -> &JointState {
        self.valid = JointState::new().with(party.name.clone(), state);
        &self.valid
    }

    /// Current holder(s) of the right.
    #[must_use]
    pub const fn valid(&self) -> &JointState {
        &self.valid
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::UnitState;

    #[test]
    fn party_requires_name() {
        assert!(Party::unkeyed("  ").is_err());
        let p = Party::unkeyed("alice").unwrap().on_registry("local");
        assert_eq!(p.registry.as_deref(), Some("local"));
        assert!(p.public_key.is_none());
    }

    #[test]
    fn party_wire_form() {
        let p = Party::new("alice", PublicKey::from_bytes(vec![1, 2])).unwrap();
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json, serde_json::json!({"name": "alice", "publicKey": "0102"}));
    }

    #[test]
    fn assign_records_holder_and_provenance() {
        let bob = Party::unkeyed("bob").unwrap();
        let mut porsche = Right::new("alicesPorsche").unwrap();
        assert!(porsche.valid().is_empty());

        let transfer = UnitState::TRUE.with_source("local/transferLedger");
        porsche.assign(&bob, transfer.clone());

        let held = porsche.valid().get("bob").unwrap();
        assert_eq!(held, &State::Unit(transfer));
        assert_eq!(porsche.valid().len(), 1);
    }

    #[test]
    fn right_valid_is_not_serialized() {
        let bob = Party::unkeyed("bob").unwrap();
        let mut right = Right::new("r").unwrap();
        right.assign(&bob, UnitState::TRUE);
        let json = serde_json::to_value(&right).unwrap();
        assert!(json.get("valid").is_none());
    }
}
