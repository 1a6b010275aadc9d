// OPERATIONS
// One cross-chain request and its lifecycle
//
// SAFETY INVARIANTS:
// 1. PENDING is the only non-terminal state; nothing leaves a terminal state
// 2. valid_proof_count always equals the number of stored proofs
// 3. At most one stored proof per source population
// 4. Ids are content-derived and include a monotonic nonce

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use trinity_consensus::{SourcePopulation, QUORUM_THRESHOLD};
use trinity_crypto::{keccak256_concat, Address, Hash32};

use crate::proof::SourceBlockReference;

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OperationId(pub Hash32);

impl OperationId {
    pub fn as_bytes(&self) -> &Hash32 {
        &self.0
    }

    /// Merkle leaf committing to this operation
    pub fn leaf(&self) -> Hash32 {
        self.0
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OperationId({})", hex::encode(&self.0[..8]))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationStatus {
    Pending,
    Completed,
    Canceled,
    Failed,
}

impl OperationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationStatus::Pending => "PENDING",
            OperationStatus::Completed => "COMPLETED",
            OperationStatus::Canceled => "CANCELED",
            OperationStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, OperationStatus::Pending)
    }

    pub fn can_transition_to(&self, next: OperationStatus) -> bool {
        matches!(
            (self, next),
            (OperationStatus::Pending, OperationStatus::Completed)
                | (OperationStatus::Pending, OperationStatus::Canceled)
                | (OperationStatus::Pending, OperationStatus::Failed)
        )
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationType {
    CrossChainTransfer,
    VaultWithdrawal,
    HtlcSwap,
    EmergencyRecovery,
}

impl OperationType {
    pub fn id(&self) -> u8 {
        match self {
            OperationType::CrossChainTransfer => 0,
            OperationType::VaultWithdrawal => 1,
            OperationType::HtlcSwap => 2,
            OperationType::EmergencyRecovery => 3,
        }
    }

    /// Requires the requester to hold the minimum security tier
    pub fn is_high_risk(&self) -> bool {
        matches!(self, OperationType::VaultWithdrawal | OperationType::EmergencyRecovery)
    }
}

/// Destination of an operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    /// Destination chain name, e.g. "solana"
    pub destination_chain: String,

    pub recipient: Address,
}

impl Route {
    pub fn new(destination_chain: impl Into<String>, recipient: Address) -> Self {
        Route {
            destination_chain: destination_chain.into(),
            recipient,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AssetRef {
    Native,
    Token(Address),
}

impl AssetRef {
    pub fn is_native(&self) -> bool {
        matches!(self, AssetRef::Native)
    }

    fn encode(&self) -> [u8; 21] {
        let mut out = [0u8; 21];
        if let AssetRef::Token(address) = self {
            out[0] = 1;
            out[1..].copy_from_slice(address.as_bytes());
        }
        out
    }
}

/// Input to create_operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationRequest {
    pub requester: Address,
    pub route: Route,
    pub asset: AssetRef,
    pub amount: u128,
    pub operation_type: OperationType,
    pub prioritize_speed: bool,
    pub prioritize_security: bool,

    /// Native value sent with the request
    pub attached_value: u128,
}

/// An accepted proof, kept as audit trail
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredProof {
    pub population: SourcePopulation,
    pub signer: Address,
    pub commitment_root: Hash32,
    pub source_block: SourceBlockReference,
    pub observed_at: u64,
    pub fingerprint: Hash32,
    pub accepted_at: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    pub id: OperationId,
    pub requester: Address,
    pub route: Route,
    pub asset: AssetRef,
    pub amount: u128,
    pub fee: u128,
    pub operation_type: OperationType,
    pub created_at: u64,
    pub created_height: u64,
    pub status: OperationStatus,
    pub valid_proof_count: u8,
    pub proofs: BTreeMap<SourcePopulation, StoredProof>,
    pub closed_at: Option<u64>,
}

impl Operation {
    pub fn is_pending(&self) -> bool {
        self.status == OperationStatus::Pending
    }

    pub fn has_proof_from(&self, population: SourcePopulation) -> bool {
        self.proofs.contains_key(&population)
    }

    pub fn is_at_quorum(&self) -> bool {
        self.valid_proof_count as usize >= QUORUM_THRESHOLD
    }
}

/// keccak(requester || timestamp || route || amount || nonce || type || asset)
pub fn derive_operation_id(
    requester: &Address,
    timestamp: u64,
    route: &Route,
    amount: u128,
    nonce: u64,
    operation_type: OperationType,
    asset: &AssetRef,
) -> OperationId {
    let chain = route.destination_chain.as_bytes();
    OperationId(keccak256_concat(&[
        requester.as_bytes().as_slice(),
        timestamp.to_be_bytes().as_slice(),
        (chain.len() as u32).to_be_bytes().as_slice(),
        chain,
        route.recipient.as_bytes().as_slice(),
        amount.to_be_bytes().as_slice(),
        nonce.to_be_bytes().as_slice(),
        [operation_type.id()].as_slice(),
        asset.encode().as_slice(),
    ]))
}
