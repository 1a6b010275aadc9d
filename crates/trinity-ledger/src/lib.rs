pub mod admission;
pub mod asset_transfer;
pub mod config;
pub mod engine;
pub mod errors;
pub mod fee;
pub mod ledger;
pub mod merkle_cache;
pub mod operation;
pub mod proof;
pub mod proof_verifier;
pub mod replay_guard;
pub mod shared;
pub mod signing;
pub mod snapshot;

pub use admission::{AdmissionPolicy, RateLimiter};
pub use asset_transfer::{AssetTransfer, InMemoryVault, TransferError};
pub use config::{EngineConfig, IdentityConfig};
pub use engine::{OperationReceipt, ProofOutcome, TrinityEngine};
pub use errors::{
    AdmissionError, ConfigError, ConflictKind, EngineError, EngineResult, ProofRejection,
};
pub use fee::FeeSchedule;
pub use ledger::{OperationLedger, Settlement};
pub use merkle_cache::MerkleCache;
pub use operation::{
    AssetRef, Operation, OperationId, OperationRequest, OperationStatus, OperationType, Route,
    StoredProof,
};
pub use proof::{CrossChainProof, SourceBlockReference};
pub use proof_verifier::{InvalidReason, VerificationParams};
pub use replay_guard::ReplayGuard;
pub use shared::SharedEngine;
pub use signing::{ProposalConfirmation, ResumeVote, SignedProposal};
pub use snapshot::LedgerSnapshot;
