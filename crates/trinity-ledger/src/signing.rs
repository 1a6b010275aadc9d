// SIGNED MESSAGES
// Digests verifiers sign for proofs, resume votes and trust proposals.
//
// Every digest starts with its domain tag and the engine identity
// (chain id, engine address); see trinity_crypto::DomainMessage.

use serde::{Deserialize, Serialize};
use trinity_consensus::{SourcePopulation, TrustProposal};
use trinity_crypto::{
    CryptoResult, DomainMessage, EngineIdentity, Hash32, SignerKey, PROOF_DOMAIN, PROPOSAL_DOMAIN,
    RESUME_DOMAIN,
};

use crate::operation::Operation;
use crate::proof::SourceBlockReference;

/// Digest of a proof; doubles as its replay fingerprint.
///
/// Binds population, operation id, commitment root, the full route,
/// requester, source block reference and observation time.
pub fn proof_signing_digest(
    identity: &EngineIdentity,
    operation: &Operation,
    source: &SourceBlockReference,
    commitment_root: &Hash32,
    observed_at: u64,
) -> Hash32 {
    let mut message = DomainMessage::new(PROOF_DOMAIN, identity)
        .u8(source.population().id())
        .hash32(operation.id.as_bytes())
        .hash32(commitment_root)
        .var_bytes(operation.route.destination_chain.as_bytes())
        .address(&operation.route.recipient)
        .address(&operation.requester)
        .u64(source.height());
    if let SourceBlockReference::Solana { block_hash, .. } = source {
        message = message.hash32(block_hash);
    }
    message.u64(observed_at).digest()
}

/// Digest of a resume vote for automatic halt number `halt_epoch`
pub fn resume_vote_digest(
    identity: &EngineIdentity,
    population: SourcePopulation,
    halt_epoch: u64,
) -> Hash32 {
    DomainMessage::new(RESUME_DOMAIN, identity)
        .u8(population.id())
        .u64(halt_epoch)
        .digest()
}

/// Digest of a confirmation (or the opening) of a trust proposal
pub fn proposal_digest(
    identity: &EngineIdentity,
    proposal_id: &Hash32,
    population: SourcePopulation,
) -> Hash32 {
    DomainMessage::new(PROPOSAL_DOMAIN, identity)
        .hash32(proposal_id)
        .u8(population.id())
        .digest()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeVote {
    pub population: SourcePopulation,

    /// Epoch of the automatic halt being voted on
    pub halt_epoch: u64,

    pub signature: Vec<u8>,
}

impl ResumeVote {
    pub fn signed(
        key: &SignerKey,
        identity: &EngineIdentity,
        population: SourcePopulation,
        halt_epoch: u64,
    ) -> CryptoResult<Self> {
        let digest = resume_vote_digest(identity, population, halt_epoch);
        Ok(ResumeVote {
            population,
            halt_epoch,
            signature: key.sign_digest(&digest)?,
        })
    }
}

/// A new trust proposal, signed by a key of the proposing population
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedProposal {
    pub payload: TrustProposal,
    pub proposer: SourcePopulation,
    pub expires_at: u64,
    pub signature: Vec<u8>,
}

impl SignedProposal {
    pub fn signed(
        key: &SignerKey,
        identity: &EngineIdentity,
        payload: TrustProposal,
        proposer: SourcePopulation,
        expires_at: u64,
    ) -> Result<Self, crate::errors::EngineError> {
        let id = trinity_consensus::trust_proposal_id(&payload, expires_at, proposer)?;
        let signature = key.sign_digest(&proposal_digest(identity, &id, proposer))?;
        Ok(SignedProposal {
            payload,
            proposer,
            expires_at,
            signature,
        })
    }
}

/// Confirmation of an open trust proposal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalConfirmation {
    pub proposal_id: Hash32,
    pub population: SourcePopulation,
    pub signature: Vec<u8>,
}

impl ProposalConfirmation {
    pub fn signed(
        key: &SignerKey,
        identity: &EngineIdentity,
        proposal_id: Hash32,
        population: SourcePopulation,
    ) -> CryptoResult<Self> {
        Ok(ProposalConfirmation {
            proposal_id,
            population,
            signature: key.sign_digest(&proposal_digest(identity, &proposal_id, population))?,
        })
    }
}
