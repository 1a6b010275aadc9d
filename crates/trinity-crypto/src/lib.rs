pub mod merkle_commitment;
pub mod signature;

use thiserror::Error;

pub use merkle_commitment::{
    fold_commitment_path, hash_ordered_pair, keccak256, keccak256_concat, verify_inclusion,
    CommitmentTree, Hash32, ZERO_HASH,
};
pub use signature::{
    recover_signer, Address, DomainMessage, EngineIdentity, SignerKey, PROOF_DOMAIN,
    PROPOSAL_DOMAIN, RESUME_DOMAIN, SIGNATURE_LEN,
};

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Tree is empty")]
    EmptyTree,

    #[error("Leaf {0} not found")]
    LeafNotFound(usize),

    #[error("Commitment mismatch: expected {expected}, computed {computed}")]
    CommitmentMismatch { expected: String, computed: String },

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Malformed signature: {0}")]
    MalformedSignature(String),

    #[error("Signer recovery failed")]
    RecoveryFailed,

    #[error("Invalid secret key")]
    InvalidSecretKey,

    #[error("Signing failed: {0}")]
    SigningFailed(String),
}

pub type CryptoResult<T> = Result<T, CryptoError>;
