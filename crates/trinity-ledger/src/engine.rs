// TRINITY ENGINE
// Admission -> escrow -> 2-of-3 proof quorum -> settlement, behind the
// circuit breaker.
//
// SAFETY INVARIANTS:
// 1. Every call is one all-or-nothing unit: checks are staged and pure,
//    state is committed only after the last fallible step
// 2. Any Err leaves every piece of engine state untouched
// 3. The replay fingerprint is consumed first in the commit of an accepted proof
// 4. Settlement happens inside the call that records the quorum-reaching proof
// 5. While halted only resume votes and manual resume change state
// 6. Trust material changes only through 2-of-3 signed proposals
// 7. Merkle cache entries are pruned on the tier-3 cadence

use log::{debug, info, warn};
use trinity_consensus::{
    trust_proposal_id, AnomalyMetrics, BlockContext, BreakerStatus, CircuitBreaker, ConfirmOutcome,
    HaltReason, PopulationSeed, QuorumProposal, ResumeOutcome, SourcePopulation, TrustGovernor,
    TrustProposal, ValidatorRegistry, QUORUM_THRESHOLD,
};
use trinity_crypto::{recover_signer, Address, EngineIdentity, Hash32};

use crate::admission::{assess, RateLimiter};
use crate::asset_transfer::AssetTransfer;
use crate::config::EngineConfig;
use crate::errors::{AdmissionError, EngineError, EngineResult};
use crate::ledger::{OperationLedger, Settlement};
use crate::merkle_cache::MerkleCache;
use crate::operation::{
    derive_operation_id, AssetRef, Operation, OperationId, OperationRequest, OperationStatus,
    StoredProof,
};
use crate::proof::CrossChainProof;
use crate::proof_verifier::{InvalidReason, ProofVerifier, Verdict};
use crate::replay_guard::ReplayGuard;
use crate::signing::{
    proposal_digest, resume_vote_digest, ProposalConfirmation, ResumeVote, SignedProposal,
};
use crate::snapshot::LedgerSnapshot;

/// Result of create_operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationReceipt {
    pub id: OperationId,
    pub fee: u128,

    /// Attached value returned to the requester
    pub refund: u128,

    /// Set when this operation tripped the breaker
    pub tripped: Option<HaltReason>,
}

/// Result of submit_proof that did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProofOutcome {
    Accepted { confirmations: u8 },
    Settled { confirmations: u8, settlement: Settlement },
    /// Counted as a failure for anomaly purposes; nothing else changed
    Invalid(InvalidReason),
}

pub struct TrinityEngine<V: AssetTransfer> {
    config: EngineConfig,
    identity: EngineIdentity,
    ledger: OperationLedger,
    registry: ValidatorRegistry,
    governor: TrustGovernor,
    breaker: CircuitBreaker,
    replay: ReplayGuard,
    cache: MerkleCache,
    limiter: RateLimiter,
    vault: V,
}

impl<V: AssetTransfer> TrinityEngine<V> {
    pub fn new(
        config: EngineConfig,
        seeds: Vec<PopulationSeed>,
        vault: V,
        genesis: BlockContext,
    ) -> EngineResult<Self> {
        config.validate()?;
        let registry = ValidatorRegistry::new(seeds, genesis.timestamp)?;
        let breaker = CircuitBreaker::new(config.anomaly.clone(), genesis)?;
        let cache = MerkleCache::new(config.verification.cache_lifetime);

        info!(
            "Trinity engine started on chain {} at {}",
            config.identity.chain_id, config.identity.engine_address
        );
        Ok(TrinityEngine {
            identity: config.identity.engine_identity(),
            config,
            ledger: OperationLedger::new(),
            registry,
            governor: TrustGovernor::new(),
            breaker,
            replay: ReplayGuard::new(),
            cache,
            limiter: RateLimiter::new(),
            vault,
        })
    }

    // ==================== OPERATIONS ====================

    /// Admit, price and escrow a new operation
    pub fn create_operation(
        &mut self,
        request: OperationRequest,
        ctx: BlockContext,
    ) -> EngineResult<OperationReceipt> {
        self.breaker.check_gate(ctx.timestamp)?;

        let quote = assess(
            &request,
            &self.config.admission,
            &self.config.fees,
            &self.limiter,
            &self.vault,
            ctx.timestamp,
        )?;

        let id = derive_operation_id(
            &request.requester,
            ctx.timestamp,
            &request.route,
            request.amount,
            self.ledger.nonce(),
            request.operation_type,
            &request.asset,
        );

        if let AssetRef::Token(_) = request.asset {
            self.vault
                .debit(&request.requester, &request.asset, request.amount)
                .map_err(AdmissionError::DebitFailed)?;
        }

        // commit
        self.limiter.record(request.requester, ctx.timestamp);
        self.ledger.insert(Operation {
            id,
            requester: request.requester,
            route: request.route,
            asset: request.asset,
            amount: request.amount,
            fee: quote.fee,
            operation_type: request.operation_type,
            created_at: ctx.timestamp,
            created_height: ctx.height,
            status: OperationStatus::Pending,
            valid_proof_count: 0,
            proofs: Default::default(),
            closed_at: None,
        });
        self.housekeeping(ctx);
        let tripped = self.breaker.observe_operation(ctx, request.amount);

        info!(
            "Operation {} created by {} (amount {}, fee {})",
            id, request.requester, request.amount, quote.fee
        );
        Ok(OperationReceipt {
            id,
            fee: quote.fee,
            refund: quote.refund,
            tripped,
        })
    }

    /// Verify a proof; settles the operation when it completes the quorum
    pub fn submit_proof(
        &mut self,
        operation_id: &OperationId,
        proof: CrossChainProof,
        ctx: BlockContext,
    ) -> EngineResult<ProofOutcome> {
        self.breaker.check_gate(ctx.timestamp)?;

        let population = proof.population();
        let confirmations = self.ledger.check_proof(operation_id, population)?;
        let operation = self
            .ledger
            .operation(operation_id)
            .ok_or(EngineError::NotFound(*operation_id))?;

        let verdict = ProofVerifier {
            identity: &self.identity,
            params: &self.config.verification,
            registry: &self.registry,
            cache: &self.cache,
            replay: &self.replay,
        }
        .verify(operation, &proof, ctx)?;

        let verified = match verdict {
            Verdict::Invalid(reason) => {
                warn!(
                    "Invalid proof from {} for {}: {}",
                    population,
                    operation_id,
                    reason.as_str()
                );
                self.housekeeping(ctx);
                self.breaker.observe_proof(ctx, false);
                return Ok(ProofOutcome::Invalid(reason));
            }
            Verdict::Valid(verified) => verified,
        };

        let settlement = if confirmations as usize >= QUORUM_THRESHOLD {
            let settlement = self.ledger.check_settle(operation_id, ctx.timestamp)?;
            self.vault
                .credit(&settlement.recipient, &settlement.asset, settlement.amount)
                .map_err(EngineError::Settlement)?;
            Some(settlement)
        } else {
            None
        };

        // commit; nothing below can fail
        self.replay.consume(verified.fingerprint);
        if !verified.cache_hit {
            self.cache.insert(*operation_id, verified.root, ctx.height);
        }
        self.registry.record_accepted_proof(population, &verified.signer);
        let confirmations = self.ledger.record_proof(
            operation_id,
            StoredProof {
                population,
                signer: verified.signer,
                commitment_root: verified.root,
                source_block: proof.source,
                observed_at: proof.observed_at,
                fingerprint: verified.fingerprint,
                accepted_at: ctx.timestamp,
            },
        );
        self.housekeeping(ctx);
        self.breaker.observe_proof(ctx, true);

        debug!("Proof from {} accepted for {} ({}/2)", population, operation_id, confirmations);
        match settlement {
            Some(settlement) => {
                self.ledger.settle(&settlement);
                Ok(ProofOutcome::Settled {
                    confirmations,
                    settlement,
                })
            }
            None => Ok(ProofOutcome::Accepted { confirmations }),
        }
    }

    /// Privileged: PENDING -> CANCELED, refunding amount and fee
    pub fn cancel_operation(
        &mut self,
        caller: &Address,
        id: &OperationId,
        ctx: BlockContext,
    ) -> EngineResult<()> {
        self.close_operation(caller, id, OperationStatus::Canceled, ctx)
    }

    /// Privileged: PENDING -> FAILED, refunding amount and fee
    pub fn fail_operation(
        &mut self,
        caller: &Address,
        id: &OperationId,
        ctx: BlockContext,
    ) -> EngineResult<()> {
        self.close_operation(caller, id, OperationStatus::Failed, ctx)
    }

    fn close_operation(
        &mut self,
        caller: &Address,
        id: &OperationId,
        status: OperationStatus,
        ctx: BlockContext,
    ) -> EngineResult<()> {
        self.require_operator(caller)?;
        self.breaker.check_gate(ctx.timestamp)?;

        let operation = self.ledger.check_close(id, status)?;
        let requester = operation.requester;
        let asset = operation.asset;
        let (amount, fee) = (operation.amount, operation.fee);

        if asset.is_native() {
            self.vault
                .credit(&requester, &AssetRef::Native, amount.saturating_add(fee))
                .map_err(EngineError::Refund)?;
        } else {
            self.vault.credit(&requester, &asset, amount).map_err(EngineError::Refund)?;
            if let Err(err) = self.vault.credit(&requester, &AssetRef::Native, fee) {
                // take the token refund back so the call stays all-or-nothing
                if let Err(undo) = self.vault.debit(&requester, &asset, amount) {
                    warn!("Could not reverse token refund for {}: {}", id, undo);
                }
                return Err(EngineError::Refund(err));
            }
        }

        self.ledger.close(id, status, ctx.timestamp);
        self.housekeeping(ctx);
        Ok(())
    }

    // ==================== CIRCUIT BREAKER ====================

    /// Signed 2-of-3 vote to clear an automatic halt. Accepted while halted.
    pub fn submit_resume_vote(
        &mut self,
        vote: ResumeVote,
        ctx: BlockContext,
    ) -> EngineResult<ResumeOutcome> {
        let digest = resume_vote_digest(&self.identity, vote.population, vote.halt_epoch);
        self.authenticate(vote.population, &digest, &vote.signature)?;
        self.breaker.check_resume_vote(vote.halt_epoch, ctx.timestamp)?;

        self.housekeeping(ctx);
        Ok(self.breaker.submit_resume_vote(vote.population, vote.halt_epoch, ctx)?)
    }

    pub fn manual_halt(
        &mut self,
        caller: &Address,
        reason: String,
        ctx: BlockContext,
    ) -> EngineResult<()> {
        self.require_operator(caller)?;
        self.breaker.manual_halt(reason, ctx)?;
        Ok(())
    }

    pub fn manual_resume(&mut self, caller: &Address, ctx: BlockContext) -> EngineResult<()> {
        self.require_operator(caller)?;
        self.breaker.manual_resume(ctx)?;
        self.housekeeping(ctx);
        Ok(())
    }

    // ==================== TRUST GOVERNANCE ====================

    /// Open a signed trust proposal. Returns its id.
    pub fn propose_trust_change(
        &mut self,
        proposal: SignedProposal,
        ctx: BlockContext,
    ) -> EngineResult<Hash32> {
        self.breaker.check_gate(ctx.timestamp)?;

        let id = trust_proposal_id(&proposal.payload, proposal.expires_at, proposal.proposer)?;
        let digest = proposal_digest(&self.identity, &id, proposal.proposer);
        self.authenticate(proposal.proposer, &digest, &proposal.signature)?;

        let opened = self.governor.propose(
            &self.registry,
            proposal.payload,
            proposal.proposer,
            proposal.expires_at,
            ctx.timestamp,
        )?;
        self.housekeeping(ctx);
        Ok(opened)
    }

    /// Add a signed confirmation; applies the change on reaching quorum
    pub fn confirm_trust_change(
        &mut self,
        confirmation: ProposalConfirmation,
        ctx: BlockContext,
    ) -> EngineResult<ConfirmOutcome> {
        self.breaker.check_gate(ctx.timestamp)?;

        let digest = proposal_digest(
            &self.identity,
            &confirmation.proposal_id,
            confirmation.population,
        );
        self.authenticate(confirmation.population, &digest, &confirmation.signature)?;

        let outcome = self.governor.confirm(
            &mut self.registry,
            &confirmation.proposal_id,
            confirmation.population,
            ctx.timestamp,
        )?;

        if let Some(applied) = &outcome.applied {
            if let TrustProposal::UpdateRoot { .. } = applied.payload {
                if let Some(previous) = applied.previous_root {
                    self.cache.invalidate_root(&previous);
                }
            }
        }
        self.housekeeping(ctx);
        Ok(outcome)
    }

    // ==================== QUERIES ====================

    pub fn operation(&self, id: &OperationId) -> Option<&Operation> {
        self.ledger.operation(id)
    }

    pub fn operation_status(&self, id: &OperationId) -> Option<OperationStatus> {
        self.ledger.operation(id).map(|op| op.status)
    }

    /// Read-only quorum check consumed by the swap component
    pub fn is_at_quorum(&self, id: &OperationId) -> bool {
        self.ledger.operation(id).map(|op| op.is_at_quorum()).unwrap_or(false)
    }

    pub fn circuit_breaker_status(&self, now: u64) -> BreakerStatus {
        self.breaker.status(now)
    }

    pub fn anomaly_metrics(&self) -> &AnomalyMetrics {
        self.breaker.metrics()
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn trusted_root(&self, population: SourcePopulation) -> EngineResult<Hash32> {
        Ok(self.registry.trusted_root(population)?)
    }

    pub fn is_authorized(&self, population: SourcePopulation, signer: &Address) -> bool {
        self.registry.is_authorized(population, signer)
    }

    pub fn registry(&self) -> &ValidatorRegistry {
        &self.registry
    }

    pub fn settlement(&self, id: &OperationId) -> Option<&Settlement> {
        self.ledger.settlement(id)
    }

    pub fn escrow_balance(&self, asset: &AssetRef) -> u128 {
        self.ledger.escrow_balance(asset)
    }

    pub fn collected_fees(&self, asset: &AssetRef) -> u128 {
        self.ledger.collected_fees(asset)
    }

    pub fn proposal(&self, id: &Hash32) -> Option<&QuorumProposal<TrustProposal>> {
        self.governor.proposal(id)
    }

    pub fn is_consumed(&self, fingerprint: &Hash32) -> bool {
        self.replay.is_consumed(fingerprint)
    }

    pub fn merkle_cache(&self) -> &MerkleCache {
        &self.cache
    }

    pub fn identity(&self) -> &EngineIdentity {
        &self.identity
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn vault(&self) -> &V {
        &self.vault
    }

    pub fn vault_mut(&mut self) -> &mut V {
        &mut self.vault
    }

    // ==================== PERSISTENCE ====================

    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            version: LedgerSnapshot::VERSION,
            config: self.config.clone(),
            ledger: self.ledger.clone(),
            registry: self.registry.clone(),
            governor: self.governor.clone(),
            breaker: self.breaker.clone(),
            replay: self.replay.clone(),
            cache: self.cache.clone(),
            limiter: self.limiter.clone(),
        }
    }

    pub fn from_snapshot(snapshot: LedgerSnapshot, vault: V) -> EngineResult<Self> {
        if snapshot.version != LedgerSnapshot::VERSION {
            return Err(EngineError::Snapshot(format!(
                "unsupported snapshot version {}",
                snapshot.version
            )));
        }
        snapshot.config.validate()?;
        info!("Engine restored with {} operations", snapshot.ledger.operations().count());
        Ok(TrinityEngine {
            identity: snapshot.config.identity.engine_identity(),
            config: snapshot.config,
            ledger: snapshot.ledger,
            registry: snapshot.registry,
            governor: snapshot.governor,
            breaker: snapshot.breaker,
            replay: snapshot.replay,
            cache: snapshot.cache,
            limiter: snapshot.limiter,
            vault,
        })
    }

    // ==================== HELPERS ====================

    /// Lazy breaker housekeeping; stale cache entries go with each tier-3 pass
    fn housekeeping(&mut self, ctx: BlockContext) {
        if self.breaker.refresh(ctx) {
            let pruned = self.cache.prune(ctx.height);
            if pruned > 0 {
                debug!("Pruned {} stale Merkle cache entries at height {}", pruned, ctx.height);
            }
        }
    }

    fn require_operator(&self, caller: &Address) -> EngineResult<()> {
        if *caller != self.config.identity.operator {
            warn!("Privileged call rejected for {}", caller);
            return Err(EngineError::Unauthorized(*caller));
        }
        Ok(())
    }

    /// Recovered signer must be an active key of `population`
    fn authenticate(
        &self,
        population: SourcePopulation,
        digest: &Hash32,
        signature: &[u8],
    ) -> EngineResult<Address> {
        let signer = recover_signer(digest, signature)?;
        if !self.registry.is_authorized(population, &signer) {
            return Err(EngineError::Unauthorized(signer));
        }
        Ok(signer)
    }
}
