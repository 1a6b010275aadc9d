use std::sync::Arc;

use parking_lot::Mutex;
use trinity_consensus::{BlockContext, BreakerStatus, ConfirmOutcome, ResumeOutcome};
use trinity_crypto::{Address, Hash32};

use crate::asset_transfer::AssetTransfer;
use crate::engine::{OperationReceipt, ProofOutcome, TrinityEngine};
use crate::errors::EngineResult;
use crate::operation::{OperationId, OperationRequest, OperationStatus};
use crate::proof::CrossChainProof;
use crate::signing::{ProposalConfirmation, ResumeVote, SignedProposal};

/// Engine handle for concurrent callers.
///
/// Each call holds the lock for its whole unit of work, so submissions are
/// sequenced one at a time and the first one sequenced wins.
pub struct SharedEngine<V: AssetTransfer> {
    inner: Arc<Mutex<TrinityEngine<V>>>,
}

impl<V: AssetTransfer> Clone for SharedEngine<V> {
    fn clone(&self) -> Self {
        SharedEngine {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V: AssetTransfer> SharedEngine<V> {
    pub fn new(engine: TrinityEngine<V>) -> Self {
        SharedEngine {
            inner: Arc::new(Mutex::new(engine)),
        }
    }

    pub fn create_operation(
        &self,
        request: OperationRequest,
        ctx: BlockContext,
    ) -> EngineResult<OperationReceipt> {
        self.inner.lock().create_operation(request, ctx)
    }

    pub fn submit_proof(
        &self,
        id: &OperationId,
        proof: CrossChainProof,
        ctx: BlockContext,
    ) -> EngineResult<ProofOutcome> {
        self.inner.lock().submit_proof(id, proof, ctx)
    }

    pub fn submit_resume_vote(
        &self,
        vote: ResumeVote,
        ctx: BlockContext,
    ) -> EngineResult<ResumeOutcome> {
        self.inner.lock().submit_resume_vote(vote, ctx)
    }

    pub fn propose_trust_change(
        &self,
        proposal: SignedProposal,
        ctx: BlockContext,
    ) -> EngineResult<Hash32> {
        self.inner.lock().propose_trust_change(proposal, ctx)
    }

    pub fn confirm_trust_change(
        &self,
        confirmation: ProposalConfirmation,
        ctx: BlockContext,
    ) -> EngineResult<ConfirmOutcome> {
        self.inner.lock().confirm_trust_change(confirmation, ctx)
    }

    pub fn manual_halt(
        &self,
        caller: &Address,
        reason: String,
        ctx: BlockContext,
    ) -> EngineResult<()> {
        self.inner.lock().manual_halt(caller, reason, ctx)
    }

    pub fn manual_resume(&self, caller: &Address, ctx: BlockContext) -> EngineResult<()> {
        self.inner.lock().manual_resume(caller, ctx)
    }

    pub fn operation_status(&self, id: &OperationId) -> Option<OperationStatus> {
        self.inner.lock().operation_status(id)
    }

    pub fn is_at_quorum(&self, id: &OperationId) -> bool {
        self.inner.lock().is_at_quorum(id)
    }

    pub fn circuit_breaker_status(&self, now: u64) -> BreakerStatus {
        self.inner.lock().circuit_breaker_status(now)
    }

    /// Run a read-only closure against the engine
    pub fn read<R>(&self, f: impl FnOnce(&TrinityEngine<V>) -> R) -> R {
        f(&self.inner.lock())
    }
}
