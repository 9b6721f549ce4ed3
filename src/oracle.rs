//! Oracle boundary.
//!
//! An oracle answers a [`Query`] with a single [`UnitState`] whose source
//! names the oracle. Oracles may be slow or unreliable; retry policy is the
//! oracle's responsibility, not the evaluator's.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::query::Query;
use crate::source::Provenance;
use crate::state::UnitState;

/// Failure reported by an oracle.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct OracleError {
    /// What went wrong, as reported by the oracle.
    pub message: String,
}

impl OracleError {
    /// Error carrying `message`.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// External evidence source.
#[async_trait]
pub trait Oracle: Send + Sync {
    /// Answers `query` with a probability and provenance tag.
    async fn query(&self, query: &Query) -> Result<UnitState, OracleError>;
}

#[async_trait]
impl<T: Oracle + ?Sized> Oracle for Arc<T> {
    async fn query(&self, query: &Query) -> Result<UnitState, OracleError> {
        (**self).query(query).await
    }
}

/// Oracle that always answers with the same probability, tagged with its own name.
#[derive(Debug, Clone)]
pub struct ConstantOracle {
    answer: UnitState,
}

impl ConstantOracle {
    /// Oracle named `name` on `registry` that answers "certainly true".
    #[must_use]
    pub fn new(registry: &str, name: &str) -> Self {
        Self {
            answer: UnitState::TRUE.with_source(Provenance::oracle(registry, name)),
        }
    }

    /// Oracle that answers with `answer`, keeping its provenance.
    #[must_use]
    pub const fn answering(answer: UnitState) -> Self {
        Self { answer }
    }
}

#[async_trait]
impl Oracle for ConstantOracle {
    async fn query(&self, _query: &Query) -> Result<UnitState, OracleError> {
        Ok(self.answer.clone())
    }
}

/// Oracles published on one registry, dispatched by the query's oracle name.
#[derive(Clone, Default)]
pub struct OracleSet {
    registry: String,
    oracles: HashMap<String, Arc<dyn Oracle>>,
}

impl OracleSet {
    /// Creates an empty set scoped to `registry`.
    #[must_use]
    pub fn new(registry: impl Into<String>) -> Self {
        Self {
            registry: registry.into(),
            oracles: HashMap::new(),
        }
    }

    /// Registers `oracle` under `name`.
    #[must_use]
    pub fn with_oracle(mut self, name: impl Into<String>, oracle: impl Oracle + 'static) -> Self {
        self.oracles.insert(name.into(), Arc::new(oracle));
        self
    }

    /// Registers a [`ConstantOracle`] answering "certainly true" under `name`.
    #[must_use]
    pub fn with_stub(self, name: &str) -> Self {
        let stub = ConstantOracle::new(&self.registry, name);
        self.with_oracle(name, stub)
    }

    /// Registry prefix used in provenance tags.
    #[must_use]
    pub fn registry(&self) -> &str {
        &self.registry
    }

    /// Looks up an oracle by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Oracle>> {
        self.oracles.get(name)
    }
}

impl fmt::Debug for OracleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.oracles.keys().collect();
        names.sort();
        f.debug_struct("OracleSet")
            .field("registry", &self.registry)
            .field("oracles", &names)
            .finish()
    }
}

#[async_trait]
impl Oracle for OracleSet {
    async fn query(&self, query: &Query) -> Result<UnitState, OracleError> {
        let oracle = self.get(query.oracle()).ok_or_else(|| {
            OracleError::new(format!(
                "no oracle named '{}' on registry {}",
                query.oracle(),
                self.registry
            ))
        })?;
        oracle.query(query).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_dispatches_by_name() {
        let low = UnitState::new(0.2).unwrap().with_source("local/low");
        let set = OracleSet::new("local")
            .with_stub("transferLedger")
            .with_oracle("low", ConstantOracle::answering(low.clone()));

        let a = set
            .query(&Query::new("transferLedger", serde_json::Value::Null))
            .await
            .unwrap();
        assert_eq!(a.source().unwrap().as_str(), "local/transferLedger");

        let b = set.query(&Query::new("low", serde_json::Value::Null)).await.unwrap();
        assert_eq!(b, low);
    }

    #[tokio::test]
    async fn unknown_oracle_is_an_error() {
        let set = OracleSet::new("local");
        let err = set
            .query(&Query::new("missing", serde_json::Value::Null))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("missing"));
    }
}
