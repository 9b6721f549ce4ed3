//! Contracts and their lifecycle.
//!
//! A [`Contract`] binds parties, a body, expiry/revocation predicates and
//! signatures. Its canonical hash (`sha_msg`) is fixed when it is built and
//! is the message every party signs. `valid`, `expired`, `revoked` and
//! `signed` are only meaningful after [`Contract::update`].

mod builder;
mod context;
mod template;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::body::{ContractBody, Predicate};
use crate::canonical::{CanonicalFilter, ContractHash, ContractRecord};
use crate::config::EvaluationConfig;
use crate::dialect::DialectRegistry;
use crate::error::{ContractResult, ExecutionError, RegistryError, ValidationError};
use crate::joint::JointState;
use crate::oracle::Oracle;
use crate::party::{Party, Right};
use crate::registry::{Receipt, Registry};
use crate::signing::{self, PrivateKey, SignatureBytes};

pub use builder::ContractBuilder;
pub use context::ContractContext;
pub use template::ContractTemplate;

/// Multi-party contract with probabilistic validity.
#[derive(Debug, Clone)]
pub struct Contract {
    parties: BTreeMap<String, Party>,
    body: ContractBody,
    is_expired: Predicate,
    is_revoked: Predicate,
    rights: BTreeMap<String, Right>,
    registry: Option<String>,
    signatures: BTreeMap<String, SignatureBytes>,
    sha_msg: ContractHash,
    config: EvaluationConfig,
    valid: Option<JointState>,
    expired: Option<bool>,
    revoked: Option<bool>,
    signed: Option<BTreeMap<String, bool>>,
}

impl Contract {
    /// Creates a contract builder.
    #[must_use]
    pub fn builder() -> ContractBuilder {
        ContractBuilder::new()
    }

    /// Re-evaluates the contract now. See [`Contract::update_at`].
    ///
    /// # Errors
    ///
    /// See [`Contract::update_at`].
    pub async fn update(&mut self, oracle: &dyn Oracle) -> ContractResult<&mut Self> {
        self.update_at(oracle, Utc::now()).await
    }

    /// Evaluates the body, the expiry and revocation predicates, and
    /// re-verifies every party's signature, as of `now`.
    ///
    /// Results and any right assignments made by callables are committed
    /// together; if a step fails the contract is left as it was.
    ///
    /// # Errors
    ///
    /// Returns the clause evaluation error, `ExecutionError::Sandbox` if a
    /// callable fails, or `ExecutionError::MissingPublicKey` for a party
    /// without a key. A signature that does not verify is not an error.
    pub async fn update_at(
        &mut self,
        oracle: &dyn Oracle,
        now: DateTime<Utc>,
    ) -> ContractResult<&mut Self> {
        let mut rights = self.rights.clone();
        let (valid, expired, revoked) = {
            let mut ctx = ContractContext::new(&self.parties, &mut rights, self.registry.as_deref(), now);
            let valid = self.body.eval(oracle, &self.config, &mut ctx).await?;
            let expired = self.is_expired.eval("is_expired", &mut ctx)?;
            let revoked = self.is_revoked.eval("is_revoked", &mut ctx)?;
            (valid, expired, revoked)
        };
        let signed = self.verify_signatures(&self.signatures)?;

        tracing::debug!(
            sha_msg = %self.sha_msg,
            parties = valid.len(),
            expired,
            revoked,
            fully_signed = signed.values().all(|s| *s),
            "contract updated"
        );

        self.rights = rights;
        self.valid = Some(valid);
        self.expired = Some(expired);
        self.revoked = Some(revoked);
        self.signed = Some(signed);
        Ok(self)
    }

    /// Signs `sha_msg` for each `(party, key)` pair, merging the new
    /// signatures into the existing ones, then re-verifies all of them.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::UnknownParty` for a key whose party is not
    /// declared, or `ExecutionError::MissingPublicKey` from re-verification.
    /// On error no signature is recorded.
    pub fn sign<'k, I, S>(&mut self, keys: I) -> ContractResult<&mut Self>
    where
        I: IntoIterator<Item = (S, &'k PrivateKey)>,
        S: Into<String>,
    {
        let mut signatures = self.signatures.clone();
        let mut signers = Vec::new();
        for (party, key) in keys {
            let party = party.into();
            if !self.parties.contains_key(&party) {
                return Err(ValidationError::UnknownParty { name: party }.into());
            }
            signatures.insert(party.clone(), signing::sign(key, self.sha_msg.as_bytes()));
            signers.push(party);
        }
        let signed = self.verify_signatures(&signatures)?;

        tracing::info!(sha_msg = %self.sha_msg, signers = ?signers, "contract signed");
        self.signatures = signatures;
        self.signed = Some(signed);
        Ok(self)
    }

    fn verify_signatures(
        &self,
        signatures: &BTreeMap<String, SignatureBytes>,
    ) -> Result<BTreeMap<String, bool>, ExecutionError> {
        let mut signed = BTreeMap::new();
        for (name, party) in &self.parties {
            let key = party
                .public_key
                .as_ref()
                .ok_or_else(|| ExecutionError::MissingPublicKey { party: name.clone() })?;
            let ok = match signatures.get(name) {
                None => false,
                Some(signature) => match signing::verify(key, self.sha_msg.as_bytes(), signature) {
                    Ok(()) => true,
                    Err(e) => {
                        tracing::warn!(party = %name, sha_msg = %self.sha_msg, error = %e, "signature rejected");
                        false
                    }
                },
            };
            signed.insert(name.clone(), ok);
        }
        Ok(signed)
    }

    pub(crate) fn to_record(&self) -> ContractRecord {
        ContractRecord {
            parties: self.parties.clone(),
            body: self.body.to_record(),
            is_expired: self.is_expired.to_record(),
            is_revoked: self.is_revoked.to_record(),
            rights: self.rights.clone(),
            registry: self.registry.clone(),
            signatures: Some(self.signatures.clone()),
        }
    }

    /// Canonical encoding of the contract.
    ///
    /// # Errors
    ///
    /// Returns `ContractError::Internal` if encoding fails.
    pub fn serialize(&self, filter: CanonicalFilter) -> ContractResult<String> {
        self.to_record().to_canonical_json(filter)
    }

    /// Publishes the full contract, signatures included.
    ///
    /// # Errors
    ///
    /// Returns the registry's error.
    pub fn publish(&self, registry: &dyn Registry) -> ContractResult<Receipt> {
        self.publish_with(registry, CanonicalFilter::FULL)
    }

    /// Publishes the contract with `filter` applied.
    ///
    /// # Errors
    ///
    /// Returns the registry's error.
    pub fn publish_with(&self, registry: &dyn Registry, filter: CanonicalFilter) -> ContractResult<Receipt> {
        let receipt = registry.publish(self.serialize(filter)?)?;
        tracing::info!(
            registry = %receipt.registry,
            id = %receipt.id(),
            sha_msg = %self.sha_msg,
            "contract published"
        );
        Ok(receipt)
    }

    /// Fetches and rebuilds a published contract. Textual bodies and
    /// predicates are compiled with `dialects`.
    ///
    /// The loaded contract has not been evaluated; call
    /// [`Contract::update`] before reading its state.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::RegistryMismatch` if `receipt` was issued by
    /// another registry, `RegistryError::ObjectNotFound` for an unknown id,
    /// or a `DeserializationError` for a blob that cannot be rebuilt.
    pub fn load(registry: &dyn Registry, receipt: &Receipt, dialects: &DialectRegistry) -> ContractResult<Self> {
        if receipt.registry != registry.name() {
            return Err(RegistryError::RegistryMismatch {
                expected: receipt.registry.clone(),
                actual: registry.name().to_string(),
            }
            .into());
        }
        let stored = registry.fetch(receipt.id())?;
        let record = ContractRecord::from_json(&stored.data)?;
        let contract = ContractBuilder::from_record(record, dialects)?.build()?;
        tracing::info!(
            registry = %receipt.registry,
            id = %receipt.id(),
            sha_msg = %contract.sha_msg,
            "contract loaded"
        );
        Ok(contract)
    }

    /// Replaces the evaluation settings.
    #[must_use]
    pub fn with_config(mut self, config: EvaluationConfig) -> Self {
        self.config = config;
        self
    }

    /// The hash every signature certifies.
    #[must_use]
    pub const fn sha_msg(&self) -> &ContractHash {
        &self.sha_msg
    }

    /// Per-party validity from the last update.
    #[must_use]
    pub const fn valid(&self) -> Option<&JointState> {
        self.valid.as_ref()
    }

    /// Expiry as of the last update.
    #[must_use]
    pub const fn expired(&self) -> Option<bool> {
        self.expired
    }

    /// Revocation as of the last update.
    #[must_use]
    pub const fn revoked(&self) -> Option<bool> {
        self.revoked
    }

    /// Per-party signature status from the last update or sign.
    #[must_use]
    pub const fn signed(&self) -> Option<&BTreeMap<String, bool>> {
        self.signed.as_ref()
    }

    /// True once every party's signature has verified.
    #[must_use]
    pub fn is_fully_signed(&self) -> bool {
        self.signed
            .as_ref()
            .is_some_and(|signed| signed.len() == self.parties.len() && signed.values().all(|s| *s))
    }

    /// Declared parties by name.
    #[must_use]
    pub const fn parties(&self) -> &BTreeMap<String, Party> {
        &self.parties
    }

    /// Declared rights by name, with their current holders.
    #[must_use]
    pub const fn rights(&self) -> &BTreeMap<String, Right> {
        &self.rights
    }

    /// Declared right by name.
    #[must_use]
    pub fn right(&self, name: &str) -> Option<&Right> {
        self.rights.get(name)
    }

    /// Signatures over `sha_msg`, by party.
    #[must_use]
    pub const fn signatures(&self) -> &BTreeMap<String, SignatureBytes> {
        &self.signatures
    }

    /// Logic evaluated into `valid`.
    #[must_use]
    pub const fn body(&self) -> &ContractBody {
        &self.body
    }

    /// Registry the contract is bound to, if any.
    #[must_use]
    pub fn registry(&self) -> Option<&str> {
        self.registry.as_deref()
    }

    /// Evaluation settings used by `update()`.
    #[must_use]
    pub const fn config(&self) -> &EvaluationConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clause::Clause;
    use crate::error::ContractError;
    use crate::oracle::ConstantOracle;
    use crate::signing::KeyPair;
    use crate::state::UnitState;

    struct Signer {
        party: Party,
        key: PrivateKey,
    }

    fn signer(name: &str) -> Signer {
        let pair = KeyPair::generate();
        Signer {
            party: Party::new(name, pair.public_key).unwrap(),
            key: pair.private_key,
        }
    }

    fn oracle() -> ConstantOracle {
        ConstantOracle::new("local", "stub")
    }

    #[tokio::test]
    async fn default_body_makes_every_party_true() {
        let (a, b) = (signer("alice"), signer("bob"));
        let mut c = Contract::builder()
            .parties([a.party, b.party])
            .build()
            .unwrap();
        assert!(c.valid().is_none());

        c.update(&oracle()).await.unwrap();
        let valid = c.valid().unwrap();
        assert_eq!(valid.p("alice"), Some(1.0));
        assert_eq!(valid.p("bob"), Some(1.0));
        assert_eq!(c.expired(), Some(false));
        assert_eq!(c.revoked(), Some(false));
    }

    #[tokio::test]
    async fn unsigned_parties_report_false() {
        let (a, b) = (signer("alice"), signer("bob"));
        let mut c = Contract::builder().parties([a.party, b.party]).build().unwrap();
        c.sign([("alice", &a.key)]).unwrap();
        c.update(&oracle()).await.unwrap();

        let signed = c.signed().unwrap();
        assert!(signed["alice"]);
        assert!(!signed["bob"]);
        assert!(!c.is_fully_signed());

        c.sign([("bob", &b.key)]).unwrap();
        assert!(c.is_fully_signed());
    }

    #[test]
    fn signing_keeps_sha_msg_and_is_idempotent() {
        let a = signer("alice");
        let mut c = Contract::builder().parties([a.party]).build().unwrap();
        let before = *c.sha_msg();

        c.sign([("alice", &a.key)]).unwrap();
        let first = c.signatures().clone();
        c.sign([("alice", &a.key)]).unwrap();

        assert_eq!(*c.sha_msg(), before);
        assert_eq!(c.signatures(), &first);
    }

    #[test]
    fn wrong_key_is_recorded_but_not_trusted() {
        let (a, b) = (signer("alice"), signer("bob"));
        let mut c = Contract::builder().parties([a.party, b.party]).build().unwrap();
        c.sign([("alice", &b.key)]).unwrap();
        assert!(c.signatures().contains_key("alice"));
        assert_eq!(c.signed().unwrap().get("alice"), Some(&false));
    }

    #[test]
    fn signing_for_a_stranger_is_rejected() {
        let (a, m) = (signer("alice"), signer("mallory"));
        let mut c = Contract::builder().parties([a.party]).build().unwrap();
        let err = c.sign([("alice", &a.key), ("mallory", &m.key)]).unwrap_err();
        assert!(matches!(
            err,
            ContractError::Validation(ValidationError::UnknownParty { ref name }) if name == "mallory"
        ));
        assert!(c.signatures().is_empty());
    }

    #[tokio::test]
    async fn party_without_key_is_fatal() {
        let a = signer("alice");
        let mut c = Contract::builder()
            .parties([a.party, Party::unkeyed("bob").unwrap()])
            .build()
            .unwrap();
        let err = c.update(&oracle()).await.unwrap_err();
        assert!(matches!(
            err,
            ContractError::Execution(ExecutionError::MissingPublicKey { ref party }) if party == "bob"
        ));
        assert!(c.valid().is_none());
    }

    #[tokio::test]
    async fn failing_predicate_leaves_contract_untouched() {
        let a = signer("alice");
        let mut c = Contract::builder()
            .parties([a.party])
            .clause(Clause::single("alice", UnitState::new(0.5).unwrap()))
            .build()
            .unwrap();
        c.update(&oracle()).await.unwrap();
        assert_eq!(c.valid().unwrap().p("alice"), Some(0.5));

        let mut broken = c.clone();
        broken.is_revoked = Predicate::native("explodes", |_| Err("boom".into()));
        let err = broken.update(&oracle()).await.unwrap_err();
        match err {
            ContractError::Execution(ExecutionError::Sandbox { target, reason }) => {
                assert!(target.contains("is_revoked"));
                assert_eq!(reason, "boom");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(broken.valid().unwrap().p("alice"), Some(0.5));
        assert_eq!(broken.revoked(), Some(false));
    }

    #[test]
    fn serialize_filters_signatures() {
        let a = signer("alice");
        let mut c = Contract::builder().parties([a.party]).build().unwrap();
        c.sign([("alice", &a.key)]).unwrap();

        let full = c.serialize(CanonicalFilter::FULL).unwrap();
        let unsigned = c.serialize(CanonicalFilter::UNSIGNED).unwrap();
        assert!(full.contains("\"signatures\""));
        assert!(!unsigned.contains("\"signatures\""));
        assert_eq!(ContractHash::of(unsigned.as_bytes()), *c.sha_msg());
    }
}
