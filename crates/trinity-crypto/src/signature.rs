/// Domain-Separated Signatures
///
/// Every message a verifier signs is built from a fixed domain tag plus the
/// identity of the engine that will consume it. A signature produced for one
/// engine, one chain or one kind of message can never verify in another
/// context.
///
/// Signatures are 65-byte recoverable secp256k1 ECDSA (`r || s || v`) over a
/// Keccak-256 digest. Signers are identified by the 20-byte address derived
/// from their public key, the same way the source chains do.

use std::fmt;
use std::str::FromStr;

use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha3::{Digest, Keccak256};

use crate::merkle_commitment::Hash32;
use crate::{CryptoError, CryptoResult};

/// Domain tag for cross-chain confirmation proofs
pub const PROOF_DOMAIN: &[u8] = b"TRINITY_PROOF_V1";

/// Domain tag for circuit-breaker resume votes
pub const RESUME_DOMAIN: &[u8] = b"TRINITY_RESUME_V1";

/// Domain tag for trust-material proposals (key rotation, root updates)
pub const PROPOSAL_DOMAIN: &[u8] = b"TRINITY_PROPOSAL_V1";

/// Length of a recoverable signature
pub const SIGNATURE_LEN: usize = 65;

// ==================== ADDRESS ====================

/// 20-byte account / signer address
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address(pub [u8; 20]);

impl Address {
    pub const ZERO: Address = Address([0u8; 20]);

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }

    /// Address of a secp256k1 public key: last 20 bytes of keccak(X || Y)
    pub fn from_verifying_key(key: &VerifyingKey) -> Self {
        let point = key.to_encoded_point(false);
        let mut hasher = Keccak256::new();
        hasher.update(&point.as_bytes()[1..]);
        let digest = hasher.finalize();

        let mut address = [0u8; 20];
        address.copy_from_slice(&digest[12..]);
        Address(address)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self)
    }
}

impl FromStr for Address {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(trimmed).map_err(|e| CryptoError::InvalidAddress(e.to_string()))?;
        if bytes.len() != 20 {
            return Err(CryptoError::InvalidAddress(format!(
                "expected 20 bytes, got {}",
                bytes.len()
            )));
        }
        let mut address = [0u8; 20];
        address.copy_from_slice(&bytes);
        Ok(Address(address))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

// ==================== ENGINE IDENTITY ====================

/// Identity of the verifying engine, bound into every signed message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineIdentity {
    /// Chain the engine settles on
    pub chain_id: u64,

    /// Address of the engine itself
    pub engine_address: Address,
}

// ==================== MESSAGE BUILDER ====================

/// Builds a domain-separated message and hashes it to the signing digest.
///
/// Fixed-width fields are appended as-is, variable-length fields are length
/// prefixed so that no two distinct field sequences share an encoding.
#[derive(Clone)]
pub struct DomainMessage {
    hasher: Keccak256,
}

impl DomainMessage {
    pub fn new(domain: &[u8], identity: &EngineIdentity) -> Self {
        let mut message = DomainMessage {
            hasher: Keccak256::new(),
        };
        message = message.var_bytes(domain);
        message.hasher.update(identity.chain_id.to_be_bytes());
        message.hasher.update(identity.engine_address.as_bytes());
        message
    }

    pub fn u8(mut self, value: u8) -> Self {
        self.hasher.update([value]);
        self
    }

    pub fn u64(mut self, value: u64) -> Self {
        self.hasher.update(value.to_be_bytes());
        self
    }

    pub fn u128(mut self, value: u128) -> Self {
        self.hasher.update(value.to_be_bytes());
        self
    }

    pub fn hash32(mut self, value: &Hash32) -> Self {
        self.hasher.update(value);
        self
    }

    pub fn address(mut self, value: &Address) -> Self {
        self.hasher.update(value.as_bytes());
        self
    }

    pub fn var_bytes(mut self, value: &[u8]) -> Self {
        self.hasher.update((value.len() as u32).to_be_bytes());
        self.hasher.update(value);
        self
    }

    /// Final signing digest (also the replay fingerprint)
    pub fn digest(self) -> Hash32 {
        let mut digest = [0u8; 32];
        digest.copy_from_slice(&self.hasher.finalize());
        digest
    }
}

// ==================== SIGNING & RECOVERY ====================

/// Recover the signer address of a 65-byte `r || s || v` signature.
///
/// `v` may be given raw (0/1) or Ethereum-style (27/28).
pub fn recover_signer(digest: &Hash32, signature: &[u8]) -> CryptoResult<Address> {
    if signature.len() != SIGNATURE_LEN {
        return Err(CryptoError::MalformedSignature(format!(
            "expected {} bytes, got {}",
            SIGNATURE_LEN,
            signature.len()
        )));
    }

    let sig = Signature::from_slice(&signature[..64])
        .map_err(|e| CryptoError::MalformedSignature(e.to_string()))?;
    let v = match signature[64] {
        v @ 27..=28 => v - 27,
        v => v,
    };
    let recovery_id = RecoveryId::from_byte(v)
        .ok_or_else(|| CryptoError::MalformedSignature(format!("bad recovery id {}", v)))?;

    let key = VerifyingKey::recover_from_prehash(digest, &sig, recovery_id)
        .map_err(|_| CryptoError::RecoveryFailed)?;

    Ok(Address::from_verifying_key(&key))
}

/// A verifier's signing key (held off-ledger by verifier processes)
#[derive(Clone)]
pub struct SignerKey {
    inner: SigningKey,
}

impl SignerKey {
    /// Load a key from 32 secret bytes
    pub fn from_bytes(secret: &[u8]) -> CryptoResult<Self> {
        let inner = SigningKey::from_slice(secret).map_err(|_| CryptoError::InvalidSecretKey)?;
        Ok(Self { inner })
    }

    pub fn address(&self) -> Address {
        Address::from_verifying_key(self.inner.verifying_key())
    }

    /// Sign a 32-byte digest, returning `r || s || v`
    pub fn sign_digest(&self, digest: &Hash32) -> CryptoResult<Vec<u8>> {
        let (sig, recovery_id) = self
            .inner
            .sign_prehash_recoverable(digest)
            .map_err(|e| CryptoError::SigningFailed(e.to_string()))?;

        let mut out = Vec::with_capacity(SIGNATURE_LEN);
        out.extend_from_slice(&sig.to_bytes());
        out.push(recovery_id.to_byte());
        Ok(out)
    }
}

impl fmt::Debug for SignerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignerKey").field("address", &self.address()).finish()
    }
}
