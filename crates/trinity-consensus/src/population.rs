// SOURCE POPULATIONS
// The three independent verifier groups, one per source network.
//
// SAFETY INVARIANTS:
// 1. The set of populations is closed: exactly three variants, fixed ids 1..=3
// 2. Quorum is 2 of 3 distinct populations, never 2 signers of one population
// 3. Raw ids outside 1..=3 never map to a population

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PopulationError {
    #[error("Unknown population id {0}")]
    UnknownId(u8),
}

/// Number of independent populations
pub const POPULATION_COUNT: usize = 3;

/// Distinct populations that must agree
pub const QUORUM_THRESHOLD: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SourcePopulation {
    /// Ethereum L2 verifiers, block numbers
    Arbitrum,

    /// Solana verifiers, slots
    Solana,

    /// TON verifiers, masterchain seqnos
    Ton,
}

impl SourcePopulation {
    pub const ALL: [SourcePopulation; POPULATION_COUNT] = [
        SourcePopulation::Arbitrum,
        SourcePopulation::Solana,
        SourcePopulation::Ton,
    ];

    pub fn id(&self) -> u8 {
        match self {
            SourcePopulation::Arbitrum => 1,
            SourcePopulation::Solana => 2,
            SourcePopulation::Ton => 3,
        }
    }

    pub fn from_id(id: u8) -> Result<Self, PopulationError> {
        match id {
            1 => Ok(SourcePopulation::Arbitrum),
            2 => Ok(SourcePopulation::Solana),
            3 => Ok(SourcePopulation::Ton),
            other => Err(PopulationError::UnknownId(other)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SourcePopulation::Arbitrum => "ARBITRUM",
            SourcePopulation::Solana => "SOLANA",
            SourcePopulation::Ton => "TON",
        }
    }

    /// Unit of the source block reference carried by this population's proofs
    pub fn block_reference_unit(&self) -> &'static str {
        match self {
            SourcePopulation::Arbitrum => "block",
            SourcePopulation::Solana => "slot",
            SourcePopulation::Ton => "seqno",
        }
    }
}

impl fmt::Display for SourcePopulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<u8> for SourcePopulation {
    type Error = PopulationError;

    fn try_from(id: u8) -> Result<Self, Self::Error> {
        SourcePopulation::from_id(id)
    }
}

/// Point in ledger time at which a call is sequenced.
///
/// `height` is the discrete time-unit (block), `timestamp` is seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BlockContext {
    pub height: u64,
    pub timestamp: u64,
}

impl BlockContext {
    pub fn new(height: u64, timestamp: u64) -> Self {
        BlockContext { height, timestamp }
    }
}
