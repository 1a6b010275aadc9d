// TRUST GOVERNANCE
// Key rotation, signer activation and trusted-root updates as 2-of-3
// quorum actions.
//
// SAFETY INVARIANTS:
// 1. No single population can alter trust material on its own
// 2. Proposals carry a mandatory expiry; past it they are void
// 3. A proposal is validated when opened and again when applied
// 4. Applying an approved proposal is all-or-nothing: a failed application
//    leaves both the proposal book and the registry untouched

use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use trinity_crypto::{keccak256_concat, Address, Hash32};

use crate::population::{SourcePopulation, QUORUM_THRESHOLD};
use crate::quorum_proposal::{ProposalError, ProposalStatus, QuorumProposal};
use crate::validator_registry::{RegistryError, ValidatorRegistry};

#[derive(Debug, Error)]
pub enum GovernanceError {
    #[error(transparent)]
    Proposal(#[from] ProposalError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// A change to trust material
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum TrustProposal {
    RotateKey {
        population: SourcePopulation,
        old_signer: Address,
        new_signer: Address,
    },
    UpdateRoot {
        population: SourcePopulation,
        new_root: Hash32,
    },
    SetSignerActive {
        population: SourcePopulation,
        signer: Address,
        active: bool,
    },
}

impl TrustProposal {
    /// Population whose trust material changes
    pub fn target(&self) -> SourcePopulation {
        match self {
            TrustProposal::RotateKey { population, .. }
            | TrustProposal::UpdateRoot { population, .. }
            | TrustProposal::SetSignerActive { population, .. } => *population,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TrustProposal::RotateKey { .. } => "ROTATE_KEY",
            TrustProposal::UpdateRoot { .. } => "UPDATE_ROOT",
            TrustProposal::SetSignerActive { .. } => "SET_SIGNER_ACTIVE",
        }
    }

    fn check(&self, registry: &ValidatorRegistry) -> Result<(), RegistryError> {
        match self {
            TrustProposal::RotateKey { population, old_signer, new_signer } => {
                registry.check_rotation(*population, old_signer, new_signer)
            }
            TrustProposal::UpdateRoot { population, new_root } => {
                registry.check_root_update(*population, new_root)
            }
            TrustProposal::SetSignerActive { population, signer, active } => {
                registry.check_activation(*population, signer, *active)
            }
        }
    }

    fn apply(
        &self,
        registry: &mut ValidatorRegistry,
        now: u64,
    ) -> Result<Option<Hash32>, RegistryError> {
        match self {
            TrustProposal::RotateKey { population, old_signer, new_signer } => {
                registry.rotate_key(*population, old_signer, *new_signer, now)?;
                Ok(None)
            }
            TrustProposal::UpdateRoot { population, new_root } => {
                registry.update_root(*population, *new_root, now).map(Some)
            }
            TrustProposal::SetSignerActive { population, signer, active } => {
                registry.set_active(*population, signer, *active)?;
                Ok(None)
            }
        }
    }
}

/// Deterministic id: keccak(bincode(payload) || expiry || proposer)
pub fn trust_proposal_id(
    payload: &TrustProposal,
    expires_at: u64,
    proposer: SourcePopulation,
) -> Result<Hash32, GovernanceError> {
    let encoded = bincode::serialize(payload)
        .map_err(|e| GovernanceError::SerializationError(e.to_string()))?;
    Ok(keccak256_concat(&[
        encoded.as_slice(),
        expires_at.to_be_bytes().as_slice(),
        [proposer.id()].as_slice(),
    ]))
}

/// Record of an applied change (immutable audit trail)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppliedChange {
    pub proposal_id: Hash32,
    pub payload: TrustProposal,
    pub applied_at: u64,
    /// Root replaced by an UpdateRoot
    pub previous_root: Option<Hash32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmOutcome {
    pub status: ProposalStatus,
    pub confirmations: usize,
    pub applied: Option<AppliedChange>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrustGovernor {
    proposals: BTreeMap<Hash32, QuorumProposal<TrustProposal>>,
    history: Vec<AppliedChange>,
}

impl TrustGovernor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a proposal; the proposer's confirmation counts immediately.
    pub fn propose(
        &mut self,
        registry: &ValidatorRegistry,
        payload: TrustProposal,
        proposer: SourcePopulation,
        expires_at: u64,
        now: u64,
    ) -> Result<Hash32, GovernanceError> {
        payload.check(registry)?;

        let id = trust_proposal_id(&payload, expires_at, proposer)?;
        if self.proposals.contains_key(&id) {
            return Err(ProposalError::AlreadyExists.into());
        }

        let kind = payload.as_str();
        let target = payload.target();
        let proposal =
            QuorumProposal::open(id, payload, proposer, now, Some(expires_at), QUORUM_THRESHOLD)?;
        self.proposals.insert(id, proposal);

        info!(
            "Trust proposal {} ({} for {}) opened by {}",
            hex::encode(id),
            kind,
            target,
            proposer
        );
        Ok(id)
    }

    /// Confirm a proposal; applies it to the registry the instant it reaches quorum.
    pub fn confirm(
        &mut self,
        registry: &mut ValidatorRegistry,
        id: &Hash32,
        population: SourcePopulation,
        now: u64,
    ) -> Result<ConfirmOutcome, GovernanceError> {
        let mut proposal = self.proposals.get(id).ok_or(ProposalError::NotFound)?.clone();

        let status = proposal.confirm(population, now).map_err(|e| {
            if let ProposalError::Expired { .. } = e {
                warn!("Confirmation for expired trust proposal {} ignored", hex::encode(id));
            }
            e
        })?;

        let mut applied = None;
        if status == ProposalStatus::Approved {
            proposal.payload.check(registry)?;
            let previous_root = proposal.payload.apply(registry, now)?;
            let change = AppliedChange {
                proposal_id: *id,
                payload: proposal.payload.clone(),
                applied_at: now,
                previous_root,
            };
            self.history.push(change.clone());
            applied = Some(change);
            info!("Trust proposal {} approved and applied", hex::encode(id));
        }

        let confirmations = proposal.confirmation_count();
        self.proposals.insert(*id, proposal);

        Ok(ConfirmOutcome {
            status,
            confirmations,
            applied,
        })
    }

    pub fn proposal(&self, id: &Hash32) -> Option<&QuorumProposal<TrustProposal>> {
        self.proposals.get(id)
    }

    pub fn history(&self) -> &[AppliedChange] {
        &self.history
    }
}
