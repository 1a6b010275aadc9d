//! Trinity
//!
//! Cross-chain operation ledger. Requesters escrow value into operations;
//! three independent verifier populations (Arbitrum, Solana, TON) submit
//! signed Merkle-inclusion proofs, and the operation settles the moment two
//! distinct populations agree. An anomaly circuit breaker halts the system
//! on bursts, volume spikes or proof failure rates.
//!
//! - [`crypto`]: Keccak commitments, domain-separated ECDSA recovery
//! - [`consensus`]: populations, validator registry, quorum proposals, circuit breaker
//! - [`ledger`]: admission, proof verification, escrow and settlement engine

pub use trinity_consensus as consensus;
pub use trinity_crypto as crypto;
pub use trinity_ledger as ledger;

pub use trinity_consensus::{BlockContext, SourcePopulation};
pub use trinity_ledger::{EngineConfig, EngineError, SharedEngine, TrinityEngine};
