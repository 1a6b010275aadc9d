/// Ledger Snapshots
///
/// The persisted shape of an engine: operations with their proofs, the
/// replay guard, trust material, breaker state with its metrics, escrow and
/// fee balances. The vault is external and is supplied again on restore.

use serde::{Deserialize, Serialize};
use trinity_consensus::{CircuitBreaker, TrustGovernor, ValidatorRegistry};

use crate::admission::RateLimiter;
use crate::config::EngineConfig;
use crate::errors::{EngineError, EngineResult};
use crate::ledger::OperationLedger;
use crate::merkle_cache::MerkleCache;
use crate::replay_guard::ReplayGuard;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub version: u32,
    pub config: EngineConfig,
    pub ledger: OperationLedger,
    pub registry: ValidatorRegistry,
    pub governor: TrustGovernor,
    pub breaker: CircuitBreaker,
    pub replay: ReplayGuard,
    pub cache: MerkleCache,
    pub limiter: RateLimiter,
}

impl LedgerSnapshot {
    pub const VERSION: u32 = 2;

    pub fn encode(&self) -> EngineResult<Vec<u8>> {
        bincode::serialize(self).map_err(|e| EngineError::Snapshot(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> EngineResult<Self> {
        bincode::deserialize(bytes).map_err(|e| EngineError::Snapshot(e.to_string()))
    }
}
