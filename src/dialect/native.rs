//! Host callables published by name.
//!
//! A native body travels as its registered name. Loading it back on another
//! node only works if that node registered a callable under the same name.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::body::{BodyFn, CallableError, PredicateFn, NATIVE_DIALECT};
use crate::contract::ContractContext;
use crate::error::DeserializationError;
use crate::joint::JointState;

use super::{Bindings, Dialect};

/// Table of named host callables.
#[derive(Clone, Default)]
pub struct NativeDialect {
    bodies: HashMap<String, BodyFn>,
    predicates: HashMap<String, PredicateFn>,
}

impl NativeDialect {
    /// Registers (or replaces) a body callable.
    pub fn register_body<F>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(&mut ContractContext<'_>) -> Result<JointState, CallableError> + Send + Sync + 'static,
    {
        self.bodies.insert(name.into(), Arc::new(f));
        self
    }

    /// Registers (or replaces) a predicate callable.
    pub fn register_predicate<F>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(&mut ContractContext<'_>) -> Result<bool, CallableError> + Send + Sync + 'static,
    {
        self.predicates.insert(name.into(), Arc::new(f));
        self
    }

    fn missing(kind: &str, name: &str) -> DeserializationError {
        DeserializationError::Compile {
            dialect: NATIVE_DIALECT.to_string(),
            reason: format!("no native {kind} registered as '{name}'"),
        }
    }
}

impl Dialect for NativeDialect {
    fn name(&self) -> &str {
        NATIVE_DIALECT
    }

    fn library(&self) -> &[&'static str] {
        &[]
    }

    fn compile_body(&self, source: &str, _bindings: &Bindings) -> Result<BodyFn, DeserializationError> {
        self.bodies
            .get(source)
            .cloned()
            .ok_or_else(|| Self::missing("body", source))
    }

    fn compile_predicate(
        &self,
        source: &str,
        _bindings: &Bindings,
    ) -> Result<PredicateFn, DeserializationError> {
        self.predicates
            .get(source)
            .cloned()
            .ok_or_else(|| Self::missing("predicate", source))
    }
}

impl fmt::Debug for NativeDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut bodies: Vec<&String> = self.bodies.keys().collect();
        bodies.sort();
        let mut predicates: Vec<&String> = self.predicates.keys().collect();
        predicates.sort();
        f.debug_struct("NativeDialect")
            .field("bodies", &bodies)
            .field("predicates", &predicates)
            .finish()
    }
}
