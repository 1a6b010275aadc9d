// OPERATION LEDGER
// Authoritative record of operations, escrow and settlements
//
// SAFETY INVARIANTS:
// 1. Operations are never deleted
// 2. An operation settles at most once; a Settlement record exists iff COMPLETED
// 3. Escrow for an asset equals the sum still owed by PENDING operations
// 4. Callers run the check_* methods and external transfers first; the
//    bookkeeping methods that follow cannot fail

use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use trinity_consensus::SourcePopulation;
use trinity_crypto::Address;

use crate::errors::{ConflictKind, EngineError, EngineResult};
use crate::operation::{AssetRef, Operation, OperationId, OperationStatus, StoredProof};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    pub operation_id: OperationId,
    pub recipient: Address,
    pub asset: AssetRef,
    pub amount: u128,
    pub fee: u128,
    pub settled_at: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct OperationLedger {
    operations: BTreeMap<OperationId, Operation>,
    settlements: BTreeMap<OperationId, Settlement>,
    escrow: BTreeMap<AssetRef, u128>,
    collected_fees: BTreeMap<AssetRef, u128>,
    nonce: u64,
}

impl OperationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    pub fn operation(&self, id: &OperationId) -> Option<&Operation> {
        self.operations.get(id)
    }

    pub fn operations(&self) -> impl Iterator<Item = &Operation> {
        self.operations.values()
    }

    pub fn settlement(&self, id: &OperationId) -> Option<&Settlement> {
        self.settlements.get(id)
    }

    pub fn escrow_balance(&self, asset: &AssetRef) -> u128 {
        self.escrow.get(asset).copied().unwrap_or(0)
    }

    pub fn collected_fees(&self, asset: &AssetRef) -> u128 {
        self.collected_fees.get(asset).copied().unwrap_or(0)
    }

    fn add_escrow(&mut self, asset: AssetRef, amount: u128) {
        let balance = self.escrow.entry(asset).or_insert(0);
        *balance = balance.saturating_add(amount);
    }

    fn release_escrow(&mut self, asset: AssetRef, amount: u128) {
        let balance = self.escrow.entry(asset).or_insert(0);
        *balance = balance.saturating_sub(amount);
    }

    /// Escrow portions of an operation: (asset, amount) and (native, fee)
    fn escrow_parts(operation: &Operation) -> [(AssetRef, u128); 2] {
        [(operation.asset, operation.amount), (AssetRef::Native, operation.fee)]
    }

    /// Record a new PENDING operation and escrow its amount and fee
    pub fn insert(&mut self, operation: Operation) {
        for (asset, amount) in Self::escrow_parts(&operation) {
            self.add_escrow(asset, amount);
        }
        self.nonce = self.nonce.saturating_add(1);
        self.operations.insert(operation.id, operation);
    }

    /// Staged check for a proof from `population`. Returns the valid-proof
    /// count the operation would reach.
    pub fn check_proof(&self, id: &OperationId, population: SourcePopulation) -> EngineResult<u8> {
        let operation = self.operations.get(id).ok_or(EngineError::NotFound(*id))?;
        if !operation.is_pending() {
            return Err(ConflictKind::OperationNotPending(operation.status).into());
        }
        if operation.has_proof_from(population) {
            return Err(ConflictKind::DuplicatePopulation(population).into());
        }
        Ok(operation.valid_proof_count.saturating_add(1))
    }

    /// Attach a proof that passed `check_proof`. Returns the new valid-proof count.
    pub fn record_proof(&mut self, id: &OperationId, proof: StoredProof) -> u8 {
        let Some(operation) = self.operations.get_mut(id) else {
            warn!("Proof for unknown operation {} dropped", id);
            return 0;
        };
        if operation.is_pending() {
            operation.proofs.entry(proof.population).or_insert(proof);
            operation.valid_proof_count = operation.proofs.len() as u8;
        }
        operation.valid_proof_count
    }

    /// Staged check that `id` can complete. Returns the settlement it would book.
    pub fn check_settle(&self, id: &OperationId, now: u64) -> EngineResult<Settlement> {
        let operation = self.operations.get(id).ok_or(EngineError::NotFound(*id))?;
        if !operation.status.can_transition_to(OperationStatus::Completed) {
            return Err(EngineError::InvalidTransition {
                from: operation.status,
                to: OperationStatus::Completed,
            });
        }
        Ok(Settlement {
            operation_id: *id,
            recipient: operation.route.recipient,
            asset: operation.asset,
            amount: operation.amount,
            fee: operation.fee,
            settled_at: now,
        })
    }

    /// Mark the operation COMPLETED and book the release staged by
    /// `check_settle`. The caller has already credited the recipient.
    pub fn settle(&mut self, settlement: &Settlement) {
        let id = settlement.operation_id;
        let parts = match self.operations.get_mut(&id) {
            Some(operation) if operation.status.can_transition_to(OperationStatus::Completed) => {
                operation.status = OperationStatus::Completed;
                operation.closed_at = Some(settlement.settled_at);
                Self::escrow_parts(operation)
            }
            _ => {
                warn!("Settlement of {} skipped: not pending", id);
                return;
            }
        };

        for (asset, amount) in parts {
            self.release_escrow(asset, amount);
        }
        let fees = self.collected_fees.entry(AssetRef::Native).or_insert(0);
        *fees = fees.saturating_add(settlement.fee);
        self.settlements.insert(id, settlement.clone());

        info!(
            "Operation {} settled: {} to {} (fee {})",
            id, settlement.amount, settlement.recipient, settlement.fee
        );
    }

    /// Staged check for moving `id` to CANCELED or FAILED.
    pub fn check_close(
        &self,
        id: &OperationId,
        status: OperationStatus,
    ) -> EngineResult<&Operation> {
        let operation = self.operations.get(id).ok_or(EngineError::NotFound(*id))?;
        if status == OperationStatus::Completed || !operation.status.can_transition_to(status) {
            return Err(EngineError::InvalidTransition {
                from: operation.status,
                to: status,
            });
        }
        Ok(operation)
    }

    /// Close an operation that passed `check_close` and release its escrow.
    /// The caller has already refunded the requester.
    pub fn close(&mut self, id: &OperationId, status: OperationStatus, now: u64) {
        if status == OperationStatus::Completed {
            warn!("Close of {} as {} skipped", id, status);
            return;
        }
        let parts = match self.operations.get_mut(id) {
            Some(operation) if operation.status.can_transition_to(status) => {
                operation.status = status;
                operation.closed_at = Some(now);
                Self::escrow_parts(operation)
            }
            _ => {
                warn!("Close of {} as {} skipped", id, status);
                return;
            }
        };

        for (asset, amount) in parts {
            self.release_escrow(asset, amount);
        }
        info!("Operation {} closed as {}", id, status);
    }
}
