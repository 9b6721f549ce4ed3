//! Error types for oc-contracts.
//!
//! All errors are strongly typed using thiserror. Structural and programmer
//! errors (undefined names, ambiguous clause usage, missing dialects) are
//! fatal and surface immediately. A bad signature is not an error at this
//! level: it degrades to `signed[party] = false` on the contract.

use thiserror::Error;

/// Validation errors that occur while constructing values.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Probability {value} is out of range [0.0, 1.0]")]
    ProbabilityOutOfRange {
        value: f64,
    },

    #[error("Field '{field}' cannot be empty")]
    EmptyName {
        field: String,
    },

    #[error("Contract declares no parties")]
    NoParties,

    #[error("Party '{name}' is declared more than once")]
    DuplicateParty {
        name: String,
    },

    #[error("'{name}' is not a party to this contract")]
    UnknownParty {
        name: String,
    },

    #[error("Invalid key for '{party}': {reason}")]
    InvalidKey {
        party: String,
        reason: String,
    },
}

/// Errors raised while evaluating a clause tree.
#[derive(Debug, Error)]
pub enum EvaluationError {
    #[error("Undefined name '{name}'")]
    UndefinedName {
        name: String,
    },

    #[error("Unclear usage of .{method} on a clause with {parties} parties")]
    AmbiguousClauseUsage {
        method: &'static str,
        parties: usize,
    },

    #[error("Unclear usage of .{method}: not a base clause")]
    NotABaseClause {
        method: &'static str,
    },

    #[error("Oracle '{uri}' failed: {message}")]
    Oracle {
        uri: String,
        message: String,
    },

    #[error("Oracle '{uri}' did not answer within {timeout_ms}ms")]
    QueryTimedOut {
        uri: String,
        timeout_ms: u64,
    },

    #[error("Clause nesting exceeds maximum depth of {max}")]
    DepthExceeded {
        max: usize,
    },
}

/// Errors raised by the contract lifecycle.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Sandbox execution failed for {target}: {reason}")]
    Sandbox {
        target: String,
        reason: String,
    },

    #[error("No public key for party '{party}'")]
    MissingPublicKey {
        party: String,
    },
}

/// Errors raised at the publish/fetch boundary.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("No object {id} on registry {registry}")]
    ObjectNotFound {
        registry: String,
        id: String,
    },

    #[error("Receipt belongs to registry '{expected}', not '{actual}'")]
    RegistryMismatch {
        expected: String,
        actual: String,
    },

    #[error("Registry backend error: {0}")]
    Backend(String),
}

/// Errors raised while rebuilding a contract from a stored blob.
#[derive(Debug, Error)]
pub enum DeserializationError {
    #[error("Malformed contract record: {reason}")]
    Malformed {
        reason: String,
    },

    #[error("No dialect plugin registered for '{dialect}'")]
    UnknownDialect {
        dialect: String,
    },

    #[error("Dialect '{dialect}' rejected source: {reason}")]
    Compile {
        dialect: String,
        reason: String,
    },

    #[error("Invalid party record '{party}': {reason}")]
    InvalidPartyRecord {
        party: String,
        reason: String,
    },

    #[error("Invalid signature record for '{party}': {reason}")]
    InvalidSignature {
        party: String,
        reason: String,
    },
}

/// A signature was present but did not verify.
///
/// Never propagated out of the contract lifecycle; it is logged and
/// reported as `false` in the contract's `signed` map.
#[derive(Debug, Error)]
#[error("Signature verification failed: {reason}")]
pub struct VerificationFailure {
    pub reason: String,
}

/// Top-level error type for oc-contracts.
#[derive(Debug, Error)]
pub enum ContractError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Evaluation error: {0}")]
    Evaluation(#[from] EvaluationError),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Deserialization error: {0}")]
    Deserialization(#[from] DeserializationError),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl ContractError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is an evaluation error.
    #[must_use]
    pub const fn is_evaluation(&self) -> bool {
        matches!(self, Self::Evaluation(_))
    }

    /// Returns true if this is an execution error.
    #[must_use]
    pub const fn is_execution(&self) -> bool {
        matches!(self, Self::Execution(_))
    }

    /// Returns true if this is a registry error.
    #[must_use]
    pub const fn is_registry(&self) -> bool {
        matches!(self, Self::Registry(_))
    }

    /// Returns true if this is a deserialization error.
    #[must_use]
    pub const fn is_deserialization(&self) -> bool {
        matches!(self, Self::Deserialization(_))
    }

    /// Returns true if the failure came from unreliable evidence rather
    /// than from the contract definition, so a later `update()` may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Evaluation(e) => {
                matches!(e, EvaluationError::Oracle { .. } | EvaluationError::QueryTimedOut { .. })
            }
            Self::Registry(e) => matches!(e, RegistryError::Backend(_)),
            _ => false,
        }
    }
}

/// Result type alias for oc-contracts operations.
pub type ContractResult<T> = Result<T, ContractError>;
