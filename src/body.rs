//! Contract bodies and predicates.
//!
//! A body is either a [`Clause`] tree, a native callable registered by name,
//! or source text in a named dialect compiled by a
//! [`DialectRegistry`](crate::DialectRegistry) plugin. Callables see only a
//! [`ContractContext`].

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::clause::Clause;
use crate::config::EvaluationConfig;
use crate::contract::ContractContext;
use crate::error::{ContractResult, ExecutionError};
use crate::joint::JointState;
use crate::oracle::Oracle;

/// Failure reported by a callable.
pub type CallableError = Box<dyn std::error::Error + Send + Sync>;

/// Callable computing a contract's validity.
pub type BodyFn = Arc<dyn Fn(&mut ContractContext<'_>) -> Result<JointState, CallableError> + Send + Sync>;

/// Callable computing an expiry or revocation predicate.
pub type PredicateFn = Arc<dyn Fn(&mut ContractContext<'_>) -> Result<bool, CallableError> + Send + Sync>;

/// Dialect name under which native callables are published.
pub const NATIVE_DIALECT: &str = "native";

/// The three body representations.
#[derive(Clone)]
pub enum ContractBody {
    /// Deferred clause tree.
    Clause(Clause),
    /// Host callable; `name` is its published identity.
    Native {
        /// Name the callable is registered and published under.
        name: String,
        /// The callable.
        f: BodyFn,
    },
    /// Source text compiled by the `dialect` plugin.
    Source {
        /// Dialect name.
        dialect: String,
        /// Text as published.
        source: String,
        /// Result of compiling `source`.
        compiled: BodyFn,
    },
}

impl ContractBody {
    /// Wraps a native callable published as `name`.
    pub fn native<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&mut ContractContext<'_>) -> Result<JointState, CallableError> + Send + Sync + 'static,
    {
        Self::Native {
            name: name.into(),
            f: Arc::new(f),
        }
    }

    /// Variant tag used in the canonical encoding.
    #[must_use]
    pub const fn tag(&self) -> &'static str {
        match self {
            Self::Clause(_) => "clause",
            Self::Native { .. } => "fn",
            Self::Source { .. } => "fnString",
        }
    }

    /// Evaluates the body. Clause bodies get a fresh evaluation pass whose
    /// query memo is discarded on return.
    ///
    /// # Errors
    ///
    /// Clause evaluation errors propagate as `ContractError::Evaluation`; a
    /// failing callable becomes `ExecutionError::Sandbox`.
    pub async fn eval(
        &self,
        oracle: &dyn Oracle,
        config: &EvaluationConfig,
        ctx: &mut ContractContext<'_>,
    ) -> ContractResult<JointState> {
        match self {
            Self::Clause(clause) => Ok(clause.eval(oracle, config).await?),
            Self::Native { name, f } => run_sandboxed(&format!("body fn '{name}'"), || f(ctx)),
            Self::Source {
                dialect, compiled, ..
            } => run_sandboxed(&format!("body ({dialect})"), || compiled(ctx)),
        }
    }

    pub(crate) fn to_record(&self) -> BodyRecord {
        match self {
            Self::Clause(clause) => BodyRecord::Clause {
                clause: clause.clone(),
            },
            Self::Native { name, .. } => BodyRecord::Native {
                fn_string: name.clone(),
                language: NATIVE_DIALECT.to_string(),
            },
            Self::Source {
                dialect, source, ..
            } => BodyRecord::Source {
                fn_string: source.clone(),
                language: dialect.clone(),
            },
        }
    }
}

impl From<Clause> for ContractBody {
    fn from(clause: Clause) -> Self {
        Self::Clause(clause)
    }
}

impl fmt::Debug for ContractBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Clause(clause) => f.debug_tuple("Clause").field(clause).finish(),
            Self::Native { name, .. } => f.debug_struct("Native").field("name", name).finish(),
            Self::Source {
                dialect, source, ..
            } => f
                .debug_struct("Source")
                .field("dialect", dialect)
                .field("source", source)
                .finish(),
        }
    }
}

/// Expiry / revocation predicate.
#[derive(Clone)]
pub enum Predicate {
    /// Fixed answer.
    Constant(bool),
    /// Host callable; `name` is its published identity.
    Native {
        /// Name the callable is registered and published under.
        name: String,
        /// The callable.
        f: PredicateFn,
    },
    /// Source text compiled by the `dialect` plugin.
    Source {
        /// Dialect name.
        dialect: String,
        /// Text as published.
        source: String,
        /// Result of compiling `source`.
        compiled: PredicateFn,
    },
}

impl Predicate {
    /// Predicate backed by a host callable, published as `name`.
    pub fn native<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&mut ContractContext<'_>) -> Result<bool, CallableError> + Send + Sync + 'static,
    {
        Self::Native {
            name: name.into(),
            f: Arc::new(f),
        }
    }

    /// Runs the predicate; `target` names it in errors and logs.
    ///
    /// # Errors
    ///
    /// Returns `ExecutionError::Sandbox` if the callable fails.
    pub fn eval(&self, target: &str, ctx: &mut ContractContext<'_>) -> Result<bool, ExecutionError> {
        match self {
            Self::Constant(value) => Ok(*value),
            Self::Native { name, f } => run_sandboxed(&format!("{target} fn '{name}'"), || f(ctx)),
            Self::Source {
                dialect, compiled, ..
            } => run_sandboxed(&format!("{target} ({dialect})"), || compiled(ctx)),
        }
    }

    pub(crate) fn to_record(&self) -> PredicateRecord {
        match self {
            Self::Constant(value) => PredicateRecord::Constant { value: *value },
            Self::Native { name, .. } => PredicateRecord::Native {
                fn_string: name.clone(),
                language: NATIVE_DIALECT.to_string(),
            },
            Self::Source {
                dialect, source, ..
            } => PredicateRecord::Source {
                fn_string: source.clone(),
                language: dialect.clone(),
            },
        }
    }
}

impl Default for Predicate {
    fn default() -> Self {
        Self::Constant(false)
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Constant(value) => f.debug_tuple("Constant").field(value).finish(),
            Self::Native { name, .. } => f.debug_struct("Native").field("name", name).finish(),
            Self::Source {
                dialect, source, ..
            } => f
                .debug_struct("Source")
                .field("dialect", dialect)
                .field("source", source)
                .finish(),
        }
    }
}

fn run_sandboxed<T, E, F>(target: &str, f: F) -> Result<T, E>
where
    F: FnOnce() -> Result<T, CallableError>,
    E: From<ExecutionError>,
{
    f().map_err(|e| {
        tracing::warn!(target_fn = %target, error = %e, "sandbox execution failed");
        ExecutionError::Sandbox {
            target: target.to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}

/// Canonical encoding of a body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub(crate) enum BodyRecord {
    #[serde(rename = "clause")]
    Clause { clause: Clause },
    #[serde(rename = "fn")]
    Native {
        #[serde(rename = "fnString")]
        fn_string: String,
        language: String,
    },
    #[serde(rename = "fnString")]
    Source {
        #[serde(rename = "fnString")]
        fn_string: String,
        language: String,
    },
}

/// Canonical encoding of a predicate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub(crate) enum PredicateRecord {
    #[serde(rename = "const")]
    Constant { value: bool },
    #[serde(rename = "fn")]
    Native {
        #[serde(rename = "fnString")]
        fn_string: String,
        language: String,
    },
    #[serde(rename = "fnString")]
    Source {
        #[serde(rename = "fnString")]
        fn_string: String,
        language: String,
    },
}

impl Default for PredicateRecord {
    fn default() -> Self {
        Self::Constant { value: false }
    }
}
