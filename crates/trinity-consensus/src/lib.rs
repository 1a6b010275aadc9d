pub mod circuit_breaker;
pub mod population;
pub mod quorum_proposal;
pub mod trust_governance;
pub mod validator_registry;

pub use circuit_breaker::{
    AnomalyMetrics, AnomalyParams, BreakerError, BreakerStatus, CircuitBreaker, CircuitBreakerState,
    ClearPath, HaltKind, HaltReason, HaltRecord, ResumeMotion, ResumeOutcome,
};
pub use population::{
    BlockContext, PopulationError, SourcePopulation, POPULATION_COUNT, QUORUM_THRESHOLD,
};
pub use quorum_proposal::{ProposalError, ProposalStatus, QuorumProposal};
pub use trust_governance::{
    trust_proposal_id, AppliedChange, ConfirmOutcome, GovernanceError, TrustGovernor, TrustProposal,
};
pub use validator_registry::{
    PopulationSeed, PopulationTrust, RegistryError, ValidatorRecord, ValidatorRegistry,
};
