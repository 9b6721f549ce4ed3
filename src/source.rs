//! Provenance tags.
//!
//! Every probability derived from evidence records where it came from, so
//! any party can audit why a contract is believed valid.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of the evidence source that produced a probability.
///
/// Oracle answers are tagged `"<registry>/<oracle>"`.
///
/// # Examples
///
/// ```
/// use oc_contracts::Provenance;
///
/// let tag = Provenance::oracle("local", "transferLedger");
/// assert_eq!(tag.as_str(), "local/transferLedger");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Provenance(String);

impl Provenance {
    /// Creates a provenance tag from a free-form identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Creates the tag for an oracle published on a registry.
    #[must_use]
    pub fn oracle(registry: &str, oracle: &str) -> Self {
        Self(format!("{registry}/{oracle}"))
    }

    /// Tag as written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the registry part of an oracle tag, if the tag has one.
    #[must_use]
    pub fn registry(&self) -> Option<&str> {
        self.0.split_once('/').map(|(registry, _)| registry)
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Provenance {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Provenance {
    fn from(value: String) -> Self {
        Self(value)
    }
}
