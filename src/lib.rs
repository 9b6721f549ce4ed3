//! # oc-contracts - probabilistic multi-party contracts
//!
//! A contract's validity is not a boolean but a belief per party, derived
//! from oracle evidence and combined with probabilistic AND/OR/NOT. Every
//! derived belief keeps the provenance of the evidence behind it, so any
//! party can audit why the contract is considered valid.
//!
//! ## Core Concepts
//!
//! - **UnitState / CompoundState**: a probability (or unknown) with its
//!   source, and the derivation tree that produced a combined probability
//! - **JointState**: one belief per party, the unit of contract validity
//! - **Clause**: deferred, composable description of a JointState whose
//!   leaves may be oracle queries, with named `where` definitions
//! - **Contract**: parties, a body, expiry/revocation predicates and
//!   signatures over a fixed canonical hash
//! - **Registry**: publish/fetch boundary contracts round-trip through
//!
//! ## Usage
//!
//! ```rust,ignore
//! use oc_contracts::{Clause, Contract, InMemoryRegistry, OracleSet, Query, UnitState};
//!
//! let registry = InMemoryRegistry::new("local")?;
//! let (alice, alice_key) = registry.issue_party("alice")?;
//! let (bob, bob_key) = registry.issue_party("bob")?;
//!
//! let mut contract = Contract::builder()
//!     .parties([alice, bob])
//!     .clause(Clause::and([
//!         Clause::single("alice", Query::new("payments", json!({"from": "alice"}))),
//!         Clause::single("bob", UnitState::new(0.9)?),
//!     ]))
//!     .build()?;
//!
//! contract.sign([("alice", &alice_key), ("bob", &bob_key)])?;
//! contract.update(&OracleSet::new("local").with_stub("payments")).await?;
//! let receipt = contract.publish(&registry)?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Probability algebra
pub mod error;
pub mod joint;
pub mod source;
pub mod state;

// Evidence
pub mod oracle;
pub mod query;

// Clauses and bodies
pub mod body;
pub mod clause;
pub mod config;
pub mod dialect;

// Contracts, identity and publication
pub mod canonical;
pub mod contract;
pub mod party;
pub mod registry;
pub mod signing;

pub use body::{BodyFn, CallableError, ContractBody, Predicate, PredicateFn, NATIVE_DIALECT};
pub use canonical::{CanonicalFilter, ContractHash};
pub use clause::{Clause, EvalPass, Leaf, NodeId};
pub use config::EvaluationConfig;
pub use contract::{Contract, ContractBuilder, ContractContext, ContractTemplate};
pub use dialect::{Bindings, Dialect, DialectRegistry, ExprDialect, NativeDialect};
pub use error::{
    ContractError, ContractResult, DeserializationError, EvaluationError, ExecutionError,
    RegistryError, ValidationError, VerificationFailure,
};
pub use joint::JointState;
pub use oracle::{ConstantOracle, Oracle, OracleError, OracleSet};
pub use party::{Party, Right};
pub use query::{Query, QueryKey, QueryMemo};
pub use registry::{InMemoryRegistry, Receipt, Registry, StoredRecord};
pub use signing::{KeyPair, PrivateKey, PublicKey, SignatureBytes};
pub use source::Provenance;
pub use state::{CompoundState, Operator, State, UnitState};
