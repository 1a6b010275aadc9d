// N-OF-M QUORUM PROPOSALS
// One primitive for every action that needs independent agreement from
// several populations: trust-material changes and circuit-breaker resume.
//
// SAFETY INVARIANTS:
// 1. A population's confirmation counts at most once (set semantics)
// 2. Ordering among confirmations is irrelevant, only the count matters
// 3. Once Approved or Expired a proposal never changes again
// 4. Expiry is evaluated against the caller's "now", never by a timer

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;
use trinity_crypto::Hash32;

use crate::population::SourcePopulation;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProposalError {
    #[error("Proposal expired at {expired_at}")]
    Expired { expired_at: u64 },

    #[error("Proposal already {0:?}")]
    AlreadyDecided(ProposalStatus),

    #[error("Proposal not found")]
    NotFound,

    #[error("Proposal already exists")]
    AlreadyExists,

    #[error("Invalid proposal: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ProposalStatus {
    Open,
    Approved,
    Expired,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuorumProposal<T> {
    /// Deterministic proposal id
    pub id: Hash32,

    pub payload: T,

    /// Population whose confirmation created the proposal
    pub proposer: SourcePopulation,

    pub created_at: u64,

    /// None = never expires
    pub expires_at: Option<u64>,

    confirmations: BTreeSet<SourcePopulation>,

    threshold: usize,

    status: ProposalStatus,

    decided_at: Option<u64>,
}

impl<T> QuorumProposal<T> {
    /// Open a proposal. The proposer's confirmation is counted immediately.
    pub fn open(
        id: Hash32,
        payload: T,
        proposer: SourcePopulation,
        created_at: u64,
        expires_at: Option<u64>,
        threshold: usize,
    ) -> Result<Self, ProposalError> {
        if threshold == 0 || threshold > SourcePopulation::ALL.len() {
            return Err(ProposalError::Invalid(format!("threshold {} out of range", threshold)));
        }
        if let Some(expiry) = expires_at {
            if expiry <= created_at {
                return Err(ProposalError::Invalid("expiry must be after creation".to_string()));
            }
        }

        let mut proposal = QuorumProposal {
            id,
            payload,
            proposer,
            created_at,
            expires_at,
            confirmations: BTreeSet::new(),
            threshold,
            status: ProposalStatus::Open,
            decided_at: None,
        };
        proposal.confirm(proposer, created_at)?;
        Ok(proposal)
    }

    /// Past expiry at `now`? Pure.
    pub fn is_expired_at(&self, now: u64) -> bool {
        matches!(self.expires_at, Some(expiry) if now >= expiry)
    }

    /// Record a population's confirmation.
    ///
    /// Confirming twice is a no-op that reports the current status.
    pub fn confirm(
        &mut self,
        population: SourcePopulation,
        now: u64,
    ) -> Result<ProposalStatus, ProposalError> {
        match self.status {
            ProposalStatus::Open => {}
            decided => return Err(ProposalError::AlreadyDecided(decided)),
        }

        if self.is_expired_at(now) {
            self.status = ProposalStatus::Expired;
            self.decided_at = Some(now);
            return Err(ProposalError::Expired {
                expired_at: self.expires_at.unwrap_or(now),
            });
        }

        self.confirmations.insert(population);
        if self.confirmations.len() >= self.threshold {
            self.status = ProposalStatus::Approved;
            self.decided_at = Some(now);
        }

        Ok(self.status)
    }

    /// Status as of `now` (an open proposal past expiry reads as Expired)
    pub fn status_at(&self, now: u64) -> ProposalStatus {
        if self.status == ProposalStatus::Open && self.is_expired_at(now) {
            ProposalStatus::Expired
        } else {
            self.status
        }
    }

    pub fn status(&self) -> ProposalStatus {
        self.status
    }

    pub fn confirmations(&self) -> &BTreeSet<SourcePopulation> {
        &self.confirmations
    }

    pub fn confirmation_count(&self) -> usize {
        self.confirmations.len()
    }

    pub fn has_confirmed(&self, population: SourcePopulation) -> bool {
        self.confirmations.contains(&population)
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn decided_at(&self) -> Option<u64> {
        self.decided_at
    }
}
