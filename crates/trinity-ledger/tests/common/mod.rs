// Shared fixture: an engine with one signer per population and helpers
// that play the part of the verifier processes.

#![allow(dead_code)]

use trinity_consensus::{BlockContext, PopulationSeed, SourcePopulation, TrustProposal};
use trinity_crypto::{keccak256, Address, CommitmentTree, EngineIdentity, SignerKey};
use trinity_ledger::{
    AssetRef, CrossChainProof, EngineConfig, FeeSchedule, InMemoryVault, OperationId,
    OperationRequest, OperationType, ProposalConfirmation, Route, SignedProposal,
    SourceBlockReference, TrinityEngine,
};

pub const OPERATOR: Address = Address([0xAA; 20]);
pub const REQUESTER: Address = Address([0x01; 20]);
pub const RECIPIENT: Address = Address([0x02; 20]);
pub const GENESIS: BlockContext = BlockContext { height: 1, timestamp: 1_000_000 };

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn key(population: SourcePopulation) -> SignerKey {
    SignerKey::from_bytes(&[population.id(); 32]).unwrap()
}

pub fn outsider_key() -> SignerKey {
    SignerKey::from_bytes(&[0x99; 32]).unwrap()
}

pub fn config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.identity.chain_id = 42161;
    config.identity.engine_address = Address([0xEE; 20]);
    config.identity.operator = OPERATOR;
    config.fees = FeeSchedule {
        base_fee: 1,
        max_fee: 10,
        ..Default::default()
    };
    config
}

pub fn seeds() -> Vec<PopulationSeed> {
    SourcePopulation::ALL
        .iter()
        .map(|p| PopulationSeed {
            population: *p,
            signers: vec![key(*p).address()],
            trusted_root: [p.id(); 32],
        })
        .collect()
}

pub fn engine() -> TrinityEngine<InMemoryVault> {
    engine_with(config())
}

pub fn engine_with(config: EngineConfig) -> TrinityEngine<InMemoryVault> {
    init_logging();
    TrinityEngine::new(config, seeds(), InMemoryVault::new(), GENESIS).unwrap()
}

pub fn at(height: u64, offset_secs: u64) -> BlockContext {
    BlockContext::new(height, GENESIS.timestamp + offset_secs)
}

pub fn native_request(amount: u128, attached_value: u128) -> OperationRequest {
    OperationRequest {
        requester: REQUESTER,
        route: Route::new("solana", RECIPIENT),
        asset: AssetRef::Native,
        amount,
        operation_type: OperationType::CrossChainTransfer,
        prioritize_speed: false,
        prioritize_security: false,
        attached_value,
    }
}

pub fn source(population: SourcePopulation) -> SourceBlockReference {
    match population {
        SourcePopulation::Arbitrum => SourceBlockReference::Arbitrum { block_number: 180_000_000 },
        SourcePopulation::Solana => SourceBlockReference::Solana {
            slot: 250_000_000,
            block_hash: keccak256(b"slot"),
        },
        SourcePopulation::Ton => SourceBlockReference::Ton { seqno: 38_000_000 },
    }
}

/// Commitment tree over the given operations plus a filler leaf
pub fn tree_for(ids: &[OperationId]) -> CommitmentTree {
    let mut leaves: Vec<_> = ids.iter().map(|id| id.leaf()).collect();
    leaves.push(keccak256(b"unrelated operation"));
    CommitmentTree::build(leaves).unwrap()
}

/// Move every population's trusted root to `root` through 2-of-3 proposals
pub fn trust_root(engine: &mut TrinityEngine<InMemoryVault>, root: [u8; 32], ctx: BlockContext) {
    let identity = *engine.identity();
    for population in SourcePopulation::ALL {
        let proposer = population;
        let confirmer = next(population);
        let proposal = SignedProposal::signed(
            &key(proposer),
            &identity,
            TrustProposal::UpdateRoot { population, new_root: root },
            proposer,
            ctx.timestamp + 3_600,
        )
        .unwrap();
        let id = engine.propose_trust_change(proposal, ctx).unwrap();
        let confirmation =
            ProposalConfirmation::signed(&key(confirmer), &identity, id, confirmer).unwrap();
        engine.confirm_trust_change(confirmation, ctx).unwrap();
    }
}

pub fn next(population: SourcePopulation) -> SourcePopulation {
    match population {
        SourcePopulation::Arbitrum => SourcePopulation::Solana,
        SourcePopulation::Solana => SourcePopulation::Ton,
        SourcePopulation::Ton => SourcePopulation::Arbitrum,
    }
}

/// Proof for `id` from `population`, signed by `signer`, against `tree`
pub fn proof_with(
    engine: &TrinityEngine<InMemoryVault>,
    signer: &SignerKey,
    population: SourcePopulation,
    id: &OperationId,
    tree: &CommitmentTree,
    observed_at: u64,
) -> CrossChainProof {
    let operation = engine.operation(id).unwrap().clone();
    let index = tree.position_of(&id.leaf()).unwrap();
    let identity: EngineIdentity = *engine.identity();
    CrossChainProof::signed(
        signer,
        &identity,
        &operation,
        source(population),
        tree.root(),
        tree.inclusion_path(index).unwrap(),
        observed_at,
    )
    .unwrap()
}

pub fn proof(
    engine: &TrinityEngine<InMemoryVault>,
    population: SourcePopulation,
    id: &OperationId,
    tree: &CommitmentTree,
    observed_at: u64,
) -> CrossChainProof {
    proof_with(engine, &key(population), population, id, tree, observed_at)
}

/// Create a native operation and commit it under a trusted tree
pub fn committed_operation(
    engine: &mut TrinityEngine<InMemoryVault>,
    amount: u128,
    ctx: BlockContext,
) -> (OperationId, CommitmentTree) {
    let receipt = engine.create_operation(native_request(amount, amount + 1), ctx).unwrap();
    let tree = tree_for(&[receipt.id]);
    trust_root(engine, tree.root(), ctx);
    (receipt.id, tree)
}
