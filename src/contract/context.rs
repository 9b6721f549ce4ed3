//! Restricted execution context for contract callables.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::party::{Party, Right};

/// Everything a body or predicate callable may touch.
///
/// Parties are read-only. Rights can be assigned; assignments are committed
/// to the contract only if the whole `update()` succeeds.
pub struct ContractContext<'c> {
    parties: &'c BTreeMap<String, Party>,
    rights: &'c mut BTreeMap<String, Right>,
    registry: Option<&'c str>,
    now: DateTime<Utc>,
}

impl<'c> ContractContext<'c> {
    pub(crate) fn new(
        parties: &'c BTreeMap<String, Party>,
        rights: &'c mut BTreeMap<String, Right>,
        registry: Option<&'c str>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            parties,
            rights,
            registry,
            now,
        }
    }

    /// Declared party by name.
    #[must_use]
    pub fn party(&self, name: &str) -> Option<&Party> {
        self.parties.get(name)
    }

    /// Declared parties, sorted by name.
    pub fn parties(&self) -> impl Iterator<Item = &Party> {
        self.parties.values()
    }

    /// Names of the declared parties, sorted.
    pub fn party_names(&self) -> impl Iterator<Item = &str> {
        self.parties.keys().map(String::as_str)
    }

    /// Declared right by name.
    #[must_use]
    pub fn right(&self, name: &str) -> Option<&Right> {
        self.rights.get(name)
    }

    /// Mutable access to a declared right, for [`Right::assign`].
    pub fn right_mut(&mut self, name: &str) -> Option<&mut Right> {
        self.rights.get_mut(name)
    }

    /// Registry the contract is bound to, if any.
    #[must_use]
    pub const fn registry(&self) -> Option<&str> {
        self.registry
    }

    /// Instant the current update is evaluated at.
    #[must_use]
    pub const fn now(&self) -> DateTime<Utc> {
        self.now
    }
}
