//! Reusable contract templates.
//!
//! A template carries parties, a body and predicates shared by many
//! contracts. Each field a builder sets explicitly wins over the template's,
//! and the template's wins over the builder default.

use crate::body::{ContractBody, Predicate};
use crate::clause::Clause;
use crate::party::Party;

use super::builder::Pending;
use super::{Contract, ContractBuilder};

/// Defaults for the contracts instantiated from it.
///
/// # Examples
///
/// ```
/// use oc_contracts::{ContractTemplate, Party};
///
/// let escrow = ContractTemplate::new().is_revoked_source("expr", "after 2030-01-01T00:00:00Z");
///
/// let contract = escrow
///     .instantiate()
///     .party(Party::unkeyed("alice").unwrap())
///     .build()
///     .unwrap();
/// assert_eq!(contract.parties().len(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ContractTemplate {
    pub(super) parties: Vec<Party>,
    pub(super) body: Option<Pending<ContractBody>>,
    pub(super) is_expired: Option<Pending<Predicate>>,
    pub(super) is_revoked: Option<Pending<Predicate>>,
}

impl ContractTemplate {
    /// Template with no defaults of its own.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a default party. A builder that declares any party replaces the
    /// whole list.
    #[must_use]
    pub fn party(mut self, party: Party) -> Self {
        self.parties.push(party);
        self
    }

    /// Adds several default parties.
    #[must_use]
    pub fn parties(mut self, parties: impl IntoIterator<Item = Party>) -> Self {
        self.parties.extend(parties);
        self
    }

    /// Sets the default body.
    #[must_use]
    pub fn body(mut self, body: impl Into<ContractBody>) -> Self {
        self.body = Some(Pending::Ready(body.into()));
        self
    }

    /// Sets the default body to a clause tree.
    #[must_use]
    pub fn clause(self, clause: Clause) -> Self {
        self.body(clause)
    }

    /// Sets the default body to source text, compiled by each contract's
    /// `build()` against that contract's parties.
    #[must_use]
    pub fn source(mut self, dialect: impl Into<String>, source: impl Into<String>) -> Self {
        self.body = Some(Pending::Source {
            dialect: dialect.into(),
            source: source.into(),
        });
        self
    }

    /// Sets the default expiry predicate.
    #[must_use]
    pub fn is_expired(mut self, predicate: Predicate) -> Self {
        self.is_expired = Some(Pending::Ready(predicate));
        self
    }

    /// Sets the default expiry predicate as source text.
    #[must_use]
    pub fn is_expired_source(mut self, dialect: impl Into<String>, source: impl Into<String>) -> Self {
        self.is_expired = Some(Pending::Source {
            dialect: dialect.into(),
            source: source.into(),
        });
        self
    }

    /// Sets the default revocation predicate.
    #[must_use]
    pub fn is_revoked(mut self, predicate: Predicate) -> Self {
        self.is_revoked = Some(Pending::Ready(predicate));
        self
    }

    /// Sets the default revocation predicate as source text.
    #[must_use]
    pub fn is_revoked_source(mut self, dialect: impl Into<String>, source: impl Into<String>) -> Self {
        self.is_revoked = Some(Pending::Source {
            dialect: dialect.into(),
            source: source.into(),
        });
        self
    }

    /// Starts a contract builder seeded with this template.
    #[must_use]
    pub fn instantiate(&self) -> ContractBuilder {
        ContractBuilder::new().template(self.clone())
    }
}

impl From<&Contract> for ContractTemplate {
    /// Template reproducing an existing contract's parties, body and
    /// predicates.
    fn from(contract: &Contract) -> Self {
        Self {
            parties: contract.parties.values().cloned().collect(),
            body: Some(Pending::Ready(contract.body.clone())),
            is_expired: Some(Pending::Ready(contract.is_expired.clone())),
            is_revoked: Some(Pending::Ready(contract.is_revoked.clone())),
        }
    }
}
