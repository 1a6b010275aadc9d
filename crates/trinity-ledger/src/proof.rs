/// Cross-Chain Proofs
///
/// A proof is one population's signed claim that it observed an operation
/// committed under a Merkle root on its source network. The source block
/// reference is a closed, tagged variant: its tag determines the population
/// the proof claims to come from, so a proof cannot name one population and
/// carry another network's block reference.

use serde::{Deserialize, Serialize};
use trinity_consensus::SourcePopulation;
use trinity_crypto::{CryptoResult, EngineIdentity, Hash32, SignerKey};

use crate::operation::Operation;
use crate::signing::proof_signing_digest;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceBlockReference {
    Arbitrum { block_number: u64 },
    Solana { slot: u64, block_hash: Hash32 },
    Ton { seqno: u64 },
}

impl SourceBlockReference {
    pub fn population(&self) -> SourcePopulation {
        match self {
            SourceBlockReference::Arbitrum { .. } => SourcePopulation::Arbitrum,
            SourceBlockReference::Solana { .. } => SourcePopulation::Solana,
            SourceBlockReference::Ton { .. } => SourcePopulation::Ton,
        }
    }

    /// Block number, slot or seqno
    pub fn height(&self) -> u64 {
        match self {
            SourceBlockReference::Arbitrum { block_number } => *block_number,
            SourceBlockReference::Solana { slot, .. } => *slot,
            SourceBlockReference::Ton { seqno } => *seqno,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossChainProof {
    pub source: SourceBlockReference,
    pub commitment_root: Hash32,

    /// Sibling hashes, leaf level first
    pub commitment_path: Vec<Hash32>,

    /// Claimed confirmation time (seconds)
    pub observed_at: u64,

    /// 65-byte `r || s || v`
    pub signature: Vec<u8>,
}

impl CrossChainProof {
    pub fn population(&self) -> SourcePopulation {
        self.source.population()
    }

    /// Build and sign a proof for `operation` the way a verifier process does
    pub fn signed(
        key: &SignerKey,
        identity: &EngineIdentity,
        operation: &Operation,
        source: SourceBlockReference,
        commitment_root: Hash32,
        commitment_path: Vec<Hash32>,
        observed_at: u64,
    ) -> CryptoResult<Self> {
        let digest =
            proof_signing_digest(identity, operation, &source, &commitment_root, observed_at);
        Ok(CrossChainProof {
            source,
            commitment_root,
            commitment_path,
            observed_at,
            signature: key.sign_digest(&digest)?,
        })
    }
}
