//! Contract construction.

use std::collections::BTreeMap;

use crate::body::{BodyRecord, ContractBody, Predicate, PredicateRecord, NATIVE_DIALECT};
use crate::canonical::{CanonicalFilter, ContractHash, ContractRecord};
use crate::clause::{Clause, Leaf};
use crate::config::EvaluationConfig;
use crate::dialect::{Bindings, DialectRegistry};
use crate::error::{ContractResult, DeserializationError, ValidationError};
use crate::party::{Party, Right};
use crate::signing::SignatureBytes;
use crate::state::UnitState;

use super::{Contract, ContractTemplate};

/// Body or predicate, either ready to run or still source text.
#[derive(Debug, Clone)]
pub(super) enum Pending<T> {
    Ready(T),
    Source { dialect: String, source: String },
}

/// Builder for [`Contract`].
///
/// Source-text bodies and predicates are compiled by `build()` against the
/// builder's dialects, with the declared parties and rights as bindings.
#[derive(Debug, Default)]
pub struct ContractBuilder {
    parties: Vec<Party>,
    body: Option<Pending<ContractBody>>,
    is_expired: Option<Pending<Predicate>>,
    is_revoked: Option<Pending<Predicate>>,
    rights: Vec<Right>,
    registry: Option<String>,
    signatures: BTreeMap<String, SignatureBytes>,
    config: EvaluationConfig,
    dialects: DialectRegistry,
    template: Option<ContractTemplate>,
}

impl ContractBuilder {
    /// Empty builder; see [`Contract::builder`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Falls back to `template` for parties, body and predicates this
    /// builder leaves unset.
    #[must_use]
    pub fn template(mut self, template: ContractTemplate) -> Self {
        self.template = Some(template);
        self
    }

    /// Adds a party.
    #[must_use]
    pub fn party(mut self, party: Party) -> Self {
        self.parties.push(party);
        self
    }

    /// Adds several parties.
    #[must_use]
    pub fn parties(mut self, parties: impl IntoIterator<Item = Party>) -> Self {
        self.parties.extend(parties);
        self
    }

    /// Sets the body. Defaults to every party being `TRUE`.
    #[must_use]
    pub fn body(mut self, body: impl Into<ContractBody>) -> Self {
        self.body = Some(Pending::Ready(body.into()));
        self
    }

    /// Sets the body to a clause tree.
    #[must_use]
    pub fn clause(self, clause: Clause) -> Self {
        self.body(clause)
    }

    /// Sets the body to `source` in `dialect`, compiled at build time.
    #[must_use]
    pub fn source(mut self, dialect: impl Into<String>, source: impl Into<String>) -> Self {
        self.body = Some(Pending::Source {
            dialect: dialect.into(),
            source: source.into(),
        });
        self
    }

    /// Sets the expiry predicate. Defaults to `false`.
    #[must_use]
    pub fn is_expired(mut self, predicate: Predicate) -> Self {
        self.is_expired = Some(Pending::Ready(predicate));
        self
    }

    /// Sets the expiry predicate as source text, compiled at build time.
    #[must_use]
    pub fn is_expired_source(mut self, dialect: impl Into<String>, source: impl Into<String>) -> Self {
        self.is_expired = Some(Pending::Source {
            dialect: dialect.into(),
            source: source.into(),
        });
        self
    }

    /// Sets the revocation predicate. Defaults to `false`.
    #[must_use]
    pub fn is_revoked(mut self, predicate: Predicate) -> Self {
        self.is_revoked = Some(Pending::Ready(predicate));
        self
    }

    /// Sets the revocation predicate as source text, compiled at build time.
    #[must_use]
    pub fn is_revoked_source(mut self, dialect: impl Into<String>, source: impl Into<String>) -> Self {
        self.is_revoked = Some(Pending::Source {
            dialect: dialect.into(),
            source: source.into(),
        });
        self
    }

    /// Declares a right callables may assign.
    #[must_use]
    pub fn right(mut self, right: Right) -> Self {
        self.rights.push(right);
        self
    }

    /// Declares several rights.
    #[must_use]
    pub fn rights(mut self, rights: impl IntoIterator<Item = Right>) -> Self {
        self.rights.extend(rights);
        self
    }

    /// Binds the contract to a registry name.
    #[must_use]
    pub fn registry(mut self, registry: impl Into<String>) -> Self {
        self.registry = Some(registry.into());
        self
    }

    /// Adds existing signatures.
    #[must_use]
    pub fn signatures<I, S>(mut self, signatures: I) -> Self
    where
        I: IntoIterator<Item = (S, SignatureBytes)>,
        S: Into<String>,
    {
        self.signatures
            .extend(signatures.into_iter().map(|(party, sig)| (party.into(), sig)));
        self
    }

    /// Evaluation settings for `update()`.
    #[must_use]
    pub fn config(mut self, config: EvaluationConfig) -> Self {
        self.config = config;
        self
    }

    /// Dialects used to compile source text. Defaults to
    /// [`DialectRegistry::default`].
    #[must_use]
    pub fn dialects(mut self, dialects: DialectRegistry) -> Self {
        self.dialects = dialects;
        self
    }

    /// Builds the contract and fixes its canonical hash.
    ///
    /// Parties, body and predicates left unset come from the template, if
    /// any, then from the defaults.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::NoParties`, `ValidationError::DuplicateParty`,
    /// `ValidationError::UnknownParty` for a signature by a stranger, or a
    /// `DeserializationError` if source text does not compile.
    pub fn build(self) -> ContractResult<Contract> {
        let template = self.template.unwrap_or_default();
        let declared = if self.parties.is_empty() {
            template.parties
        } else {
            self.parties
        };
        if declared.is_empty() {
            return Err(ValidationError::NoParties.into());
        }
        let mut parties = BTreeMap::new();
        for party in declared {
            let name = party.name.clone();
            if parties.insert(name.clone(), party).is_some() {
                return Err(ValidationError::DuplicateParty { name }.into());
            }
        }
        if let Some(name) = self.signatures.keys().find(|name| !parties.contains_key(*name)) {
            return Err(ValidationError::UnknownParty { name: name.clone() }.into());
        }

        let rights: BTreeMap<String, Right> = self
            .rights
            .into_iter()
            .map(|right| (right.name.clone(), right))
            .collect();
        let bindings = Bindings::new(parties.keys().cloned(), rights.keys().cloned());

        let body = match self.body.or(template.body) {
            None => ContractBody::Clause(Clause::base(
                parties.keys().map(|name| (name.clone(), Leaf::State(UnitState::TRUE))),
            )),
            Some(Pending::Ready(body)) => body,
            Some(Pending::Source { dialect, source }) => {
                self.dialects.compile_body(&dialect, &source, &bindings)?
            }
        };
        let is_expired = compile_predicate(self.is_expired.or(template.is_expired), &self.dialects, &bindings)?;
        let is_revoked = compile_predicate(self.is_revoked.or(template.is_revoked), &self.dialects, &bindings)?;

        let mut contract = Contract {
            parties,
            body,
            is_expired,
            is_revoked,
            rights,
            registry: self.registry,
            signatures: self.signatures,
            sha_msg: ContractHash::of(&[]),
            config: self.config,
            valid: None,
            expired: None,
            revoked: None,
            signed: None,
        };
        contract.sha_msg = ContractHash::of(contract.serialize(CanonicalFilter::UNSIGNED)?.as_bytes());
        Ok(contract)
    }

    /// Builder for a stored contract record. Source text is compiled by
    /// `build()` with `dialects`.
    pub(crate) fn from_record(
        record: ContractRecord,
        dialects: &DialectRegistry,
    ) -> Result<Self, DeserializationError> {
        for (key, party) in &record.parties {
            if key != &party.name {
                return Err(DeserializationError::InvalidPartyRecord {
                    party: key.clone(),
                    reason: format!("record is for '{}'", party.name),
                });
            }
        }
        for (key, right) in &record.rights {
            if key != &right.name {
                return Err(DeserializationError::Malformed {
                    reason: format!("right '{key}' holds a record for '{}'", right.name),
                });
            }
        }
        let signatures = record.signatures.unwrap_or_default();
        if let Some(name) = signatures.keys().find(|name| !record.parties.contains_key(*name)) {
            return Err(DeserializationError::InvalidSignature {
                party: name.clone(),
                reason: "not a declared party".to_string(),
            });
        }

        let body = match record.body {
            BodyRecord::Clause { clause } => Pending::Ready(ContractBody::Clause(clause)),
            BodyRecord::Native { fn_string, language } => pending_native(fn_string, language)?,
            BodyRecord::Source { fn_string, language } => pending_source(fn_string, language)?,
        };

        Ok(Self {
            parties: record.parties.into_values().collect(),
            body: Some(body),
            is_expired: Some(predicate_from_record(record.is_expired)?),
            is_revoked: Some(predicate_from_record(record.is_revoked)?),
            rights: record.rights.into_values().collect(),
            registry: record.registry,
            signatures,
            config: EvaluationConfig::default(),
            dialects: dialects.clone(),
            template: None,
        })
    }
}

fn compile_predicate(
    pending: Option<Pending<Predicate>>,
    dialects: &DialectRegistry,
    bindings: &Bindings,
) -> Result<Predicate, DeserializationError> {
    match pending {
        None => Ok(Predicate::default()),
        Some(Pending::Ready(predicate)) => Ok(predicate),
        Some(Pending::Source { dialect, source }) => dialects.compile_predicate(&dialect, &source, bindings),
    }
}

fn pending_native<T>(name: String, language: String) -> Result<Pending<T>, DeserializationError> {
    if language != NATIVE_DIALECT {
        return Err(DeserializationError::Malformed {
            reason: format!("fn record in language '{language}', expected '{NATIVE_DIALECT}'"),
        });
    }
    Ok(Pending::Source {
        dialect: language,
        source: name,
    })
}

fn pending_source<T>(source: String, language: String) -> Result<Pending<T>, DeserializationError> {
    if language == NATIVE_DIALECT {
        return Err(DeserializationError::Malformed {
            reason: "fnString record cannot use the native dialect".to_string(),
        });
    }
    Ok(Pending::Source {
        dialect: language,
        source,
    })
}

fn predicate_from_record(record: PredicateRecord) -> Result<Pending<Predicate>, DeserializationError> {
    match record {
        PredicateRecord::Constant { value } => Ok(Pending::Ready(Predicate::Constant(value))),
        PredicateRecord::Native { fn_string, language } => pending_native(fn_string, language),
        PredicateRecord::Source { fn_string, language } => pending_source(fn_string, language),
    }
}
