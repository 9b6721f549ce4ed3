//! Oracle evidence references and the per-pass memo.
//!
//! A [`Query`] is a pure description `(oracle, params)`; it holds no cache.
//! Answers live in a [`QueryMemo`] owned by a single evaluation pass, so a
//! query shared by many clauses, or reused across many `update()` calls,
//! never leaks stale evidence from one pass into the next.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::EvaluationError;
use crate::oracle::Oracle;
use crate::state::UnitState;

/// A single oracle-evidence reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    oracle: String,
    #[serde(default)]
    params: serde_json::Value,
}

impl Query {
    /// Creates a query against the oracle named `oracle`.
    #[must_use]
    pub fn new(oracle: impl Into<String>, params: serde_json::Value) -> Self {
        Self {
            oracle: oracle.into(),
            params,
        }
    }

    /// Oracle name (or URI) this query is addressed to.
    #[must_use]
    pub fn oracle(&self) -> &str {
        &self.oracle
    }

    /// Oracle-specific parameters.
    #[must_use]
    pub const fn params(&self) -> &serde_json::Value {
        &self.params
    }

    /// Identity used for memoization: equal queries share one answer per pass.
    #[must_use]
    pub fn key(&self) -> QueryKey {
        QueryKey {
            oracle: self.oracle.clone(),
            params: self.params.to_string(),
        }
    }

    /// Answers the query, consulting `memo` first.
    ///
    /// # Errors
    ///
    /// Returns `EvaluationError::Oracle` or `EvaluationError::QueryTimedOut`
    /// if the oracle cannot answer. The memo is left untouched in that case.
    pub async fn run(
        &self,
        oracle: &dyn Oracle,
        memo: &mut QueryMemo,
    ) -> Result<UnitState, EvaluationError> {
        memo.run(self, oracle).await
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.oracle, self.params)
    }
}

/// Memo key for a [`Query`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
    oracle: String,
    params: String,
}

/// Answers gathered during one evaluation pass.
#[derive(Debug, Default)]
pub struct QueryMemo {
    answers: HashMap<QueryKey, UnitState>,
    timeout: Option<Duration>,
    oracle_calls: usize,
}

impl QueryMemo {
    /// Creates an empty memo with no per-query timeout.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty memo that bounds each oracle call by `timeout`.
    #[must_use]
    pub fn with_timeout(timeout: Option<Duration>) -> Self {
        Self {
            timeout,
            ..Self::default()
        }
    }

    /// Number of oracle invocations made through this memo.
    #[must_use]
    pub const fn oracle_calls(&self) -> usize {
        self.oracle_calls
    }

    /// Number of memoized answers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.answers.len()
    }

    /// True if nothing is memoized.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.answers.is_empty()
    }

    /// Forgets every answer so the next run re-queries the oracles.
    pub fn clear(&mut self) {
        self.answers.clear();
    }

    /// Answers `query`, invoking the oracle at most once per key.
    ///
    /// # Errors
    ///
    /// See [`Query::run`].
    pub async fn run(
        &mut self,
        query: &Query,
        oracle: &dyn Oracle,
    ) -> Result<UnitState, EvaluationError> {
        let key = query.key();
        if let Some(answer) = self.answers.get(&key) {
            tracing::debug!(oracle = %query.oracle, "query memo hit");
            return Ok(answer.clone());
        }

        self.oracle_calls += 1;
        tracing::debug!(oracle = %query.oracle, params = %query.params, "querying oracle");

        // Dropping the in-flight future on timeout or cancellation leaves the
        // memo without an entry for this key.
        let answer = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, oracle.query(query))
                .await
                .map_err(|_| EvaluationError::QueryTimedOut {
                    uri: query.oracle.clone(),
                    timeout_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                })?,
            None => oracle.query(query).await,
        }
        .map_err(|e| EvaluationError::Oracle {
            uri: query.oracle.clone(),
            message: e.to_string(),
        })?;

        self.answers.insert(key, answer.clone());
        Ok(answer)
    }
}
