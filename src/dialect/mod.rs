//! Pluggable compilers for textual contract logic.
//!
//! Source-text bodies and predicates are compiled by a [`Dialect`] looked up
//! by name in a [`DialectRegistry`]. A compiled callable may refer only to
//! the symbols listed in its [`Bindings`]: the contract's declared parties
//! and rights plus the dialect's own enumerated keywords. Nothing else from
//! the host is reachable. A binding that spells one of the dialect's
//! keywords is rejected before compiling, so every symbol resolves one way.

mod expr;
mod native;

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use crate::body::{BodyFn, ContractBody, Predicate, PredicateFn, NATIVE_DIALECT};
use crate::error::DeserializationError;

pub use expr::ExprDialect;
pub use native::NativeDialect;

/// Symbols a compiled callable may reference.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bindings {
    /// Declared party names.
    pub parties: BTreeSet<String>,
    /// Declared right names.
    pub rights: BTreeSet<String>,
}

impl Bindings {
    /// Bindings for the given party and right names.
    #[must_use]
    pub fn new<P, R>(parties: P, rights: R) -> Self
    where
        P: IntoIterator,
        P::Item: Into<String>,
        R: IntoIterator,
        R::Item: Into<String>,
    {
        Self {
            parties: parties.into_iter().map(Into::into).collect(),
            rights: rights.into_iter().map(Into::into).collect(),
        }
    }
}

/// Compiler for one source dialect.
pub trait Dialect: Send + Sync {
    /// Name used in the canonical `language` field.
    fn name(&self) -> &str;

    /// Keywords the dialect itself provides, in addition to `Bindings`.
    /// Parties and rights may not reuse them.
    fn library(&self) -> &[&'static str];

    /// Compiles a body.
    ///
    /// # Errors
    ///
    /// Returns `DeserializationError::Compile` for source the dialect rejects.
    fn compile_body(&self, source: &str, bindings: &Bindings) -> Result<BodyFn, DeserializationError>;

    /// Compiles an expiry / revocation predicate.
    ///
    /// # Errors
    ///
    /// Returns `DeserializationError::Compile` for source the dialect rejects.
    fn compile_predicate(
        &self,
        source: &str,
        bindings: &Bindings,
    ) -> Result<PredicateFn, DeserializationError>;
}

/// Named dialect strategies available to a hosting node.
#[derive(Clone)]
pub struct DialectRegistry {
    dialects: HashMap<String, Arc<dyn Dialect>>,
    native: NativeDialect,
}

impl DialectRegistry {
    /// Registry with no text dialects and no native callables.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            dialects: HashMap::new(),
            native: NativeDialect::default(),
        }
    }

    /// Adds (or replaces) a dialect under its own name.
    #[must_use]
    pub fn with_dialect(mut self, dialect: impl Dialect + 'static) -> Self {
        self.dialects.insert(dialect.name().to_string(), Arc::new(dialect));
        self
    }

    /// Mutable access to the native callable table.
    pub fn native_mut(&mut self) -> &mut NativeDialect {
        &mut self.native
    }

    /// Looks up a dialect by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&dyn Dialect> {
        if name == NATIVE_DIALECT {
            return Some(&self.native);
        }
        self.dialects.get(name).map(|d| &**d)
    }

    /// Names of all available dialects, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.dialects.keys().map(String::as_str).collect();
        names.push(NATIVE_DIALECT);
        names.sort_unstable();
        names
    }

    /// Looks up `name` and checks that no binding shadows one of its keywords.
    fn require(&self, name: &str, bindings: &Bindings) -> Result<&dyn Dialect, DeserializationError> {
        let dialect = self.get(name).ok_or_else(|| DeserializationError::UnknownDialect {
            dialect: name.to_string(),
        })?;
        let library = dialect.library();
        if let Some(symbol) = bindings
            .parties
            .iter()
            .chain(&bindings.rights)
            .find(|symbol| library.contains(&symbol.as_str()))
        {
            return Err(DeserializationError::Compile {
                dialect: name.to_string(),
                reason: format!("symbol '{symbol}' shadows a dialect keyword"),
            });
        }
        Ok(dialect)
    }

    /// Compiles `source` into a body.
    ///
    /// Native callables come back as [`ContractBody::Native`] so they keep
    /// their published identity.
    ///
    /// # Errors
    ///
    /// Returns `DeserializationError::UnknownDialect` if no plugin is
    /// registered for `dialect`, or the plugin's compile error.
    pub fn compile_body(
        &self,
        dialect: &str,
        source: &str,
        bindings: &Bindings,
    ) -> Result<ContractBody, DeserializationError> {
        let compiled = self.require(dialect, bindings)?.compile_body(source, bindings)?;
        tracing::debug!(dialect, "compiled contract body");
        Ok(if dialect == NATIVE_DIALECT {
            ContractBody::Native {
                name: source.to_string(),
                f: compiled,
            }
        } else {
            ContractBody::Source {
                dialect: dialect.to_string(),
                source: source.to_string(),
                compiled,
            }
        })
    }

    /// Compiles `source` into a predicate.
    ///
    /// # Errors
    ///
    /// See [`DialectRegistry::compile_body`].
    pub fn compile_predicate(
        &self,
        dialect: &str,
        source: &str,
        bindings: &Bindings,
    ) -> Result<Predicate, DeserializationError> {
        let compiled = self.require(dialect, bindings)?.compile_predicate(source, bindings)?;
        Ok(if dialect == NATIVE_DIALECT {
            Predicate::Native {
                name: source.to_string(),
                f: compiled,
            }
        } else {
            Predicate::Source {
                dialect: dialect.to_string(),
                source: source.to_string(),
                compiled,
            }
        })
    }
}

/// Registry with the built-in `expr` dialect and an empty native table.
impl Default for DialectRegistry {
    fn default() -> Self {
        Self::empty().with_dialect(ExprDialect::new())
    }
}

impl fmt::Debug for DialectRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DialectRegistry")
            .field("dialects", &self.names())
            .finish()
    }
}
