use thiserror::Error;
use trinity_consensus::{BreakerError, GovernanceError, HaltKind, RegistryError, SourcePopulation};
use trinity_crypto::{Address, CryptoError};

use crate::asset_transfer::TransferError;
use crate::operation::{OperationId, OperationStatus};

/// Operation request refused; nothing was created
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AdmissionError {
    #[error("Amount must be non-zero")]
    ZeroAmount,

    #[error("Route to {0} is not supported")]
    UnsupportedRoute(String),

    #[error("Recipient cannot be the zero address")]
    ZeroRecipient,

    #[error("Requester {requester} exceeded the daily quota of {limit} operations")]
    QuotaExceeded { requester: Address, limit: u32 },

    #[error("Attached value {attached} does not cover required {required}")]
    InsufficientValue { required: u128, attached: u128 },

    #[error("Security tier {actual} below required {required}")]
    SecurityTierTooLow { required: u8, actual: u8 },

    #[error("Debit failed: {0}")]
    DebitFailed(TransferError),

    #[error("Amount overflow")]
    Overflow,
}

/// Proof refused before any cryptographic judgement; nothing was recorded
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProofRejection {
    #[error("Commitment path is empty")]
    EmptyPath,

    #[error("Commitment path depth {depth} exceeds {max}")]
    PathTooDeep { depth: usize, max: usize },

    #[error("Commitment root is zero")]
    ZeroRoot,

    #[error("Signature is empty")]
    EmptySignature,

    #[error("Observed at {observed_at}, which is after now ({now})")]
    FromFuture { observed_at: u64, now: u64 },

    #[error("Observed at {observed_at}, older than {max_age}s")]
    Stale { observed_at: u64, max_age: u64 },

    #[error("Signer {signer} is not authorized for {population}")]
    UnauthorizedSigner {
        population: SourcePopulation,
        signer: Address,
    },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConflictKind {
    #[error("operation is {0}")]
    OperationNotPending(OperationStatus),

    #[error("{0} already has an accepted proof")]
    DuplicatePopulation(SourcePopulation),

    #[error("signature already consumed")]
    Replay,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("System halted ({0:?})")]
    Halted(HaltKind),

    #[error("Admission rejected: {0}")]
    Admission(#[from] AdmissionError),

    #[error("Proof rejected: {0}")]
    ProofRejected(#[from] ProofRejection),

    #[error("Quorum conflict: {0}")]
    QuorumConflict(#[from] ConflictKind),

    #[error("Operation {0} not found")]
    NotFound(OperationId),

    #[error("Caller {0} is not authorized")]
    Unauthorized(Address),

    #[error("Invalid transition {from} -> {to}")]
    InvalidTransition {
        from: OperationStatus,
        to: OperationStatus,
    },

    #[error("Settlement failed: {0}")]
    Settlement(TransferError),

    #[error("Refund failed: {0}")]
    Refund(TransferError),

    #[error(transparent)]
    Breaker(BreakerError),

    #[error(transparent)]
    Governance(#[from] GovernanceError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Snapshot error: {0}")]
    Snapshot(String),
}

impl From<BreakerError> for EngineError {
    fn from(err: BreakerError) -> Self {
        match err {
            BreakerError::Halted(kind) => EngineError::Halted(kind),
            other => EngineError::Breaker(other),
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
