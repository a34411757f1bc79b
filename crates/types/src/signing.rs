//! Recoverable secp256k1 ECDSA over EIP-191 message digests.
//!
//! States are signed over the EIP-191 digest of their canonical hash, so the
//! signer address can be recovered from the signature alone and matched
//! against the channel's participant list.

use alloy_primitives::{keccak256, Address, B256};
use k256::ecdsa::{RecoveryId, SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from signing or recovery.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    /// Seed or key bytes were not a valid secp256k1 scalar.
    #[error("invalid secret key")]
    InvalidKey,
    /// `v` was not 27 or 28.
    #[error("invalid recovery id: {0}")]
    InvalidRecoveryId(u8),
    /// The (r, s) pair or the recovery itself was rejected by the curve.
    #[error("signature recovery failed")]
    RecoveryFailed,
}

/// A recoverable ECDSA signature `(r, s, v)` with `v` in `{27, 28}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub r: B256,
    pub s: B256,
    pub v: u8,
}

impl Signature {
    /// Recover the signer address from the digest that was signed.
    pub fn recover(&self, digest: B256) -> Result<Address, SignatureError> {
        let recovery_id = RecoveryId::from_byte(
            self.v
                .checked_sub(27)
                .ok_or(SignatureError::InvalidRecoveryId(self.v))?,
        )
        .ok_or(SignatureError::InvalidRecoveryId(self.v))?;
        let signature = k256::ecdsa::Signature::from_scalars(self.r.0, self.s.0)
            .map_err(|_| SignatureError::RecoveryFailed)?;
        let key = VerifyingKey::recover_from_prehash(digest.as_slice(), &signature, recovery_id)
            .map_err(|_| SignatureError::RecoveryFailed)?;
        Ok(address_of(&key))
    }
}

/// A participant's signing key and its derived address.
#[derive(Clone)]
pub struct KeyPair {
    secret: SigningKey,
    address: Address,
}

impl KeyPair {
    /// Derive a keypair from a fixed 32-byte seed. Deterministic; used for
    /// test fixtures and configured identities.
    pub fn from_seed(seed: &[u8; 32]) -> Result<Self, SignatureError> {
        let secret =
            SigningKey::from_bytes(seed.into()).map_err(|_| SignatureError::InvalidKey)?;
        let address = address_of(secret.verifying_key());
        Ok(Self { secret, address })
    }

    /// Generate a fresh random keypair.
    pub fn random() -> Self {
        let secret = SigningKey::random(&mut rand::rngs::OsRng);
        let address = address_of(secret.verifying_key());
        Self { secret, address }
    }

    /// The Ethereum-style address of this key.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Sign a 32-byte digest, producing a recoverable signature.
    pub fn sign_digest(&self, digest: B256) -> Result<Signature, SignatureError> {
        let (signature, recovery_id) = self
            .secret
            .sign_prehash_recoverable(digest.as_slice())
            .map_err(|_| SignatureError::RecoveryFailed)?;
        let r: [u8; 32] = signature.r().to_bytes().into();
        let s: [u8; 32] = signature.s().to_bytes().into();
        Ok(Signature {
            r: B256::from(r),
            s: B256::from(s),
            v: 27 + recovery_id.to_byte(),
        })
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print the secret.
        f.debug_struct("KeyPair")
            .field("address", &self.address)
            .finish()
    }
}

/// EIP-191 digest of a 32-byte message hash
/// (`keccak256("\x19Ethereum Signed Message:\n32" || hash)`).
pub fn hash_message(hash: B256) -> B256 {
    alloy_primitives::utils::eip191_hash_message(hash.as_slice())
}

fn address_of(key: &VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    let digest = keccak256(&point.as_bytes()[1..]);
    Address::from_slice(&digest[12..])
}
