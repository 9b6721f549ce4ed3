//! Signature primitives.
//!
//! Parties sign the contract's canonical hash with Ed25519. Keys and
//! signatures travel as hex strings; their bytes are reconstructed opaquely
//! and only interpreted at verification time, so a malformed key or
//! signature is a verification failure rather than a load failure.

use std::fmt;

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::{ValidationError, VerificationFailure};

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}

/// Public verification key, stored as raw bytes.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PublicKey(#[serde(with = "hex_bytes")] Vec<u8>);

impl PublicKey {
    /// Wraps raw key bytes without interpreting them.
    #[must_use]
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Raw key bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    fn verifying_key(&self) -> Result<VerifyingKey, VerificationFailure> {
        let arr: [u8; 32] = self.0.as_slice().try_into().map_err(|_| VerificationFailure {
            reason: format!("public key must be 32 bytes, got {}", self.0.len()),
        })?;
        VerifyingKey::from_bytes(&arr).map_err(|e| VerificationFailure {
            reason: format!("invalid public key: {e}"),
        })
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", hex::encode(&self.0))
    }
}

/// Secret signing key. Never serialized.
#[derive(Clone)]
pub struct PrivateKey(SigningKey);

impl PrivateKey {
    /// Rebuilds a key from its 32-byte seed.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidKey` if `seed` is not 32 bytes.
    pub fn from_seed(seed: &[u8]) -> Result<Self, ValidationError> {
        let arr: [u8; 32] = seed.try_into().map_err(|_| ValidationError::InvalidKey {
            party: "<seed>".to_string(),
            reason: format!("seed must be 32 bytes, got {}", seed.len()),
        })?;
        Ok(Self(SigningKey::from_bytes(&arr)))
    }

    /// Matching verification key.
    #[must_use]
    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.0.verifying_key().to_bytes().to_vec())
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateKey(<redacted>)")
    }
}

/// Fresh signing key pair.
#[derive(Debug, Clone)]
pub struct KeyPair {
    /// Signing half; keep it secret.
    pub private_key: PrivateKey,
    /// Verification half.
    pub public_key: PublicKey,
}

impl KeyPair {
    /// Generates a key pair from the operating system's RNG.
    #[must_use]
    pub fn generate() -> Self {
        let mut seed = [0u8; 32];
        OsRng.fill_bytes(&mut seed);
        let private_key = PrivateKey(SigningKey::from_bytes(&seed));
        let public_key = private_key.public_key();
        Self {
            private_key,
            public_key,
        }
    }
}

/// Raw signature bytes.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SignatureBytes(#[serde(with = "hex_bytes")] Vec<u8>);

impl SignatureBytes {
    /// Wraps raw signature bytes.
    #[must_use]
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Raw signature bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for SignatureBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SignatureBytes({})", hex::encode(&self.0))
    }
}

/// Signs `message` (a canonical hash) with `key`.
#[must_use]
pub fn sign(key: &PrivateKey, message: &[u8]) -> SignatureBytes {
    SignatureBytes(key.0.sign(message).to_bytes().to_vec())
}

/// Verifies `signature` over `message` with `key`.
///
/// # Errors
///
/// Returns `VerificationFailure` for a malformed key or signature, or a
/// signature that does not match.
pub fn verify(
    key: &PublicKey,
    message: &[u8],
    signature: &SignatureBytes,
) -> Result<(), VerificationFailure> {
    let verifying_key = key.verifying_key()?;
    let signature = Signature::from_slice(&signature.0).map_err(|e| VerificationFailure {
        reason: format!("malformed signature: {e}"),
    })?;
    verifying_key
        .verify(message, &signature)
        .map_err(|e| VerificationFailure {
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_then_verify() {
        let pair = KeyPair::generate();
        let sig = sign(&pair.private_key, b"contract-hash");
        assert!(verify(&pair.public_key, b"contract-hash", &sig).is_ok());
    }

    #[test]
    fn signing_is_deterministic() {
        let pair = KeyPair::generate();
        assert_eq!(sign(&pair.private_key, b"m"), sign(&pair.private_key, b"m"));
    }

    #[test]
    fn wrong_key_or_message_fails() {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        let sig = sign(&alice.private_key, b"m");
        assert!(verify(&bob.public_key, b"m", &sig).is_err());
        assert!(verify(&alice.public_key, b"other", &sig).is_err());
    }

    #[test]
    fn malformed_inputs_fail_verification() {
        let pair = KeyPair::generate();
        let sig = sign(&pair.private_key, b"m");
        assert!(verify(&PublicKey::from_bytes(vec![0u8; 5]), b"m", &sig).is_err());
        assert!(verify(&pair.public_key, b"m", &SignatureBytes::from_bytes(vec![1, 2, 3])).is_err());
    }

    #[test]
    fn keys_serialize_as_hex() {
        let key = PublicKey::from_bytes(vec![0xab, 0xcd]);
        assert_eq!(serde_json::to_string(&key).unwrap(), "\"abcd\"");
        let back: PublicKey = serde_json::from_str("\"abcd\"").unwrap();
        assert_eq!(back, key);
        assert!(serde_json::from_str::<PublicKey>("\"zz\"").is_err());
    }

    #[test]
    fn private_key_from_seed() {
        let a = PrivateKey::from_seed(&[7u8; 32]).unwrap();
        let b = PrivateKey::from_seed(&[7u8; 32]).unwrap();
        assert_eq!(a.public_key(), b.public_key());
        assert!(PrivateKey::from_seed(&[7u8; 31]).is_err());
        assert_eq!(format!("{a:?}"), "PrivateKey(<redacted>)");
    }
}
