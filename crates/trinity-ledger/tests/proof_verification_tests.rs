// PROOF VERIFICATION TESTS
// Structure, freshness, domain binding, Merkle cache and failure accounting
//
// Test Categories:
// 1. Rejections (caller errors, nothing counted)
// 2. Cryptographic verdicts (counted as failures)
// 3. Domain isolation
// 4. Merkle cache behaviour

mod common;

use common::*;
use trinity_consensus::{HaltReason, SourcePopulation};
use trinity_crypto::{keccak256, Address, CommitmentTree, EngineIdentity};
use trinity_ledger::{
    ConflictKind, CrossChainProof, EngineError, InvalidReason, ProofOutcome, ProofRejection,
    SourceBlockReference,
};

// ============================================================================
// REJECTIONS
// ============================================================================

#[test]
fn test_structural_rejections_leave_metrics_alone() {
    let mut engine = engine();
    let ctx = at(2, 10);
    let (id, tree) = committed_operation(&mut engine, 10, ctx);
    let good = proof(&engine, SourcePopulation::Arbitrum, &id, &tree, ctx.timestamp);
    let now = at(3, 20);

    let mut empty_path = good.clone();
    empty_path.commitment_path.clear();
    assert!(matches!(
        engine.submit_proof(&id, empty_path, now),
        Err(EngineError::ProofRejected(ProofRejection::EmptyPath))
    ));

    let mut too_deep = good.clone();
    too_deep.commitment_path = vec![keccak256(b"sibling"); 33];
    assert!(matches!(
        engine.submit_proof(&id, too_deep, now),
        Err(EngineError::ProofRejected(ProofRejection::PathTooDeep { depth: 33, max: 32 }))
    ));

    let mut zero_root = good.clone();
    zero_root.commitment_root = [0u8; 32];
    assert!(matches!(
        engine.submit_proof(&id, zero_root, now),
        Err(EngineError::ProofRejected(ProofRejection::ZeroRoot))
    ));

    let mut unsigned = good;
    unsigned.signature.clear();
    assert!(matches!(
        engine.submit_proof(&id, unsigned, now),
        Err(EngineError::ProofRejected(ProofRejection::EmptySignature))
    ));

    assert_eq!(engine.anomaly_metrics().total_proofs, 0);
    assert_eq!(engine.operation(&id).unwrap().valid_proof_count, 0);
}

#[test]
fn test_freshness_window() {
    let mut engine = engine();
    let ctx = at(2, 10);
    let (id, tree) = committed_operation(&mut engine, 10, ctx);

    let future = proof(&engine, SourcePopulation::Ton, &id, &tree, ctx.timestamp + 100);
    assert!(matches!(
        engine.submit_proof(&id, future, at(3, 20)),
        Err(EngineError::ProofRejected(ProofRejection::FromFuture { .. }))
    ));

    let observed = proof(&engine, SourcePopulation::Ton, &id, &tree, ctx.timestamp);
    assert!(matches!(
        engine.submit_proof(&id, observed.clone(), at(9, 10 + 3_601)),
        Err(EngineError::ProofRejected(ProofRejection::Stale { max_age: 3_600, .. }))
    ));

    // exactly at the age limit is still fresh
    assert_eq!(
        engine.submit_proof(&id, observed, at(9, 10 + 3_600)).unwrap(),
        ProofOutcome::Accepted { confirmations: 1 }
    );
}

#[test]
fn test_unregistered_signer_rejected() {
    let mut engine = engine();
    let ctx = at(2, 10);
    let (id, tree) = committed_operation(&mut engine, 10, ctx);

    let forged =
        proof_with(&engine, &outsider_key(), SourcePopulation::Solana, &id, &tree, ctx.timestamp);
    assert!(matches!(
        engine.submit_proof(&id, forged, at(3, 20)),
        Err(EngineError::ProofRejected(ProofRejection::UnauthorizedSigner {
            population: SourcePopulation::Solana,
            ..
        }))
    ));
    assert_eq!(engine.anomaly_metrics().total_proofs, 0);
}

#[test]
fn test_unknown_operation_not_found() {
    let mut engine = engine();
    let ctx = at(2, 10);
    let (id, tree) = committed_operation(&mut engine, 10, ctx);
    let p = proof(&engine, SourcePopulation::Solana, &id, &tree, ctx.timestamp);

    let missing = trinity_ledger::OperationId(keccak256(b"missing"));
    assert!(matches!(engine.submit_proof(&missing, p, at(3, 20)), Err(EngineError::NotFound(_))));
}

// ============================================================================
// CRYPTOGRAPHIC VERDICTS
// ============================================================================

#[test]
fn test_tampered_path_is_commitment_mismatch() {
    let mut engine = engine();
    let ctx = at(2, 10);
    let (id, tree) = committed_operation(&mut engine, 10, ctx);

    let mut tampered = proof(&engine, SourcePopulation::Arbitrum, &id, &tree, ctx.timestamp);
    tampered.commitment_path[0] = keccak256(b"wrong sibling");
    let outcome = engine.submit_proof(&id, tampered, at(3, 20)).unwrap();
    match outcome {
        ProofOutcome::Invalid(InvalidReason::CommitmentMismatch { claimed, computed }) => {
            assert_eq!(claimed, tree.root());
            assert_ne!(computed, tree.root());
        }
        other => panic!("expected commitment mismatch, got {:?}", other),
    }
    assert_eq!(engine.anomaly_metrics().failed_proofs, 1);
}

#[test]
fn test_garbage_signature_is_counted_failure() {
    let mut engine = engine();
    let ctx = at(2, 10);
    let (id, tree) = committed_operation(&mut engine, 10, ctx);

    let mut garbage = proof(&engine, SourcePopulation::Arbitrum, &id, &tree, ctx.timestamp);
    garbage.signature = vec![0u8; 65];
    assert_eq!(
        engine.submit_proof(&id, garbage, at(3, 20)).unwrap(),
        ProofOutcome::Invalid(InvalidReason::UnrecoverableSignature)
    );
    assert_eq!(engine.anomaly_metrics().failed_proofs, 1);
    assert_eq!(engine.anomaly_metrics().total_proofs, 1);
}

#[test]
fn test_failure_rate_trips_breaker() {
    let mut engine = engine();
    let ctx = at(2, 10);
    let (id, tree) = committed_operation(&mut engine, 10, ctx);

    let mut garbage = proof(&engine, SourcePopulation::Arbitrum, &id, &tree, ctx.timestamp);
    garbage.signature = vec![0u8; 65];
    for i in 0..10u64 {
        let outcome = engine.submit_proof(&id, garbage.clone(), at(3, 20 + i)).unwrap();
        assert!(matches!(outcome, ProofOutcome::Invalid(_)));
    }

    let status = engine.circuit_breaker_status(ctx.timestamp + 30);
    assert!(status.automatic_halt);
    assert_eq!(status.reason, Some(HaltReason::FailureRate { failed: 10, total: 10 }));

    let good = proof(&engine, SourcePopulation::Solana, &id, &tree, ctx.timestamp);
    assert!(matches!(engine.submit_proof(&id, good, at(3, 40)), Err(EngineError::Halted(_))));
}

// ============================================================================
// DOMAIN ISOLATION
// ============================================================================

#[test]
fn test_proof_for_one_operation_cannot_confirm_another() {
    let mut engine = engine();
    let ctx = at(2, 10);
    let a = engine.create_operation(native_request(10, 11), ctx).unwrap().id;
    let b = engine.create_operation(native_request(20, 21), ctx).unwrap().id;
    let tree = tree_for(&[a, b]);
    trust_root(&mut engine, tree.root(), ctx);

    let for_a = proof(&engine, SourcePopulation::Arbitrum, &a, &tree, ctx.timestamp);
    assert!(matches!(
        engine.submit_proof(&b, for_a.clone(), at(3, 20)),
        Err(EngineError::ProofRejected(ProofRejection::UnauthorizedSigner { .. }))
    ));
    assert_eq!(engine.operation(&b).unwrap().valid_proof_count, 0);

    // still good for the operation it was made for
    assert_eq!(
        engine.submit_proof(&a, for_a.clone(), at(3, 21)).unwrap(),
        ProofOutcome::Accepted { confirmations: 1 }
    );

    // consumed now, on every operation
    assert!(engine.submit_proof(&b, for_a, at(3, 22)).is_err());
}

#[test]
fn test_key_cannot_speak_for_another_population() {
    let mut engine = engine();
    let ctx = at(2, 10);
    let (id, tree) = committed_operation(&mut engine, 10, ctx);

    let borrowed = proof_with(
        &engine,
        &key(SourcePopulation::Arbitrum),
        SourcePopulation::Ton,
        &id,
        &tree,
        ctx.timestamp,
    );
    assert!(matches!(
        engine.submit_proof(&id, borrowed, at(3, 20)),
        Err(EngineError::ProofRejected(ProofRejection::UnauthorizedSigner {
            population: SourcePopulation::Ton,
            ..
        }))
    ));
}

#[test]
fn test_proof_signed_for_other_engine_rejected() {
    let mut engine = engine();
    let ctx = at(2, 10);
    let (id, tree) = committed_operation(&mut engine, 10, ctx);

    let other = EngineIdentity {
        chain_id: 1,
        engine_address: Address([0xEE; 20]),
    };
    let operation = engine.operation(&id).unwrap().clone();
    let index = tree.position_of(&id.leaf()).unwrap();
    let foreign = CrossChainProof::signed(
        &key(SourcePopulation::Solana),
        &other,
        &operation,
        source(SourcePopulation::Solana),
        tree.root(),
        tree.inclusion_path(index).unwrap(),
        ctx.timestamp,
    )
    .unwrap();

    assert!(matches!(
        engine.submit_proof(&id, foreign, at(3, 20)),
        Err(EngineError::ProofRejected(ProofRejection::UnauthorizedSigner { .. }))
    ));
}

#[test]
fn test_solana_block_hash_is_bound() {
    let mut engine = engine();
    let ctx = at(2, 10);
    let (id, tree) = committed_operation(&mut engine, 10, ctx);

    let mut swapped = proof(&engine, SourcePopulation::Solana, &id, &tree, ctx.timestamp);
    if let SourceBlockReference::Solana { block_hash, .. } = &mut swapped.source {
        *block_hash = keccak256(b"another fork");
    }
    assert!(matches!(
        engine.submit_proof(&id, swapped, at(3, 20)),
        Err(EngineError::ProofRejected(ProofRejection::UnauthorizedSigner { .. }))
    ));
}

// ============================================================================
// MERKLE CACHE
// ============================================================================

#[test]
fn test_cache_hit_skips_fold_within_lifetime() {
    let mut engine = engine();
    let ctx = at(2, 10);
    let (id, tree) = committed_operation(&mut engine, 10, ctx);

    let first = proof(&engine, SourcePopulation::Arbitrum, &id, &tree, ctx.timestamp);
    engine.submit_proof(&id, first, at(3, 20)).unwrap();
    let entry = *engine.merkle_cache().entry(&id).unwrap();
    assert_eq!(entry.root, tree.root());

    // the path is not signed over; a hit never looks at it
    let mut second = proof(&engine, SourcePopulation::Ton, &id, &tree, ctx.timestamp);
    second.commitment_path = vec![keccak256(b"never folded")];
    assert!(matches!(
        engine.submit_proof(&id, second, at(50, 30)).unwrap(),
        ProofOutcome::Settled { confirmations: 2, .. }
    ));
}

#[test]
fn test_expired_cache_entry_forces_fold() {
    let mut engine = engine();
    let ctx = at(2, 10);
    let (id, tree) = committed_operation(&mut engine, 10, ctx);

    let first = proof(&engine, SourcePopulation::Arbitrum, &id, &tree, ctx.timestamp);
    engine.submit_proof(&id, first, at(3, 20)).unwrap();

    let mut second = proof(&engine, SourcePopulation::Ton, &id, &tree, ctx.timestamp);
    second.commitment_path = vec![keccak256(b"never folded")];
    assert!(matches!(
        engine.submit_proof(&id, second, at(3 + 100, 30)).unwrap(),
        ProofOutcome::Invalid(InvalidReason::CommitmentMismatch { .. })
    ));
}

#[test]
fn test_stale_cache_entries_pruned_on_tier3_pass() {
    let mut engine = engine();
    let ctx = at(2, 10);
    let (id, tree) = committed_operation(&mut engine, 10, ctx);
    let first = proof(&engine, SourcePopulation::Arbitrum, &id, &tree, ctx.timestamp);
    engine.submit_proof(&id, first, at(3, 20)).unwrap();
    assert_eq!(engine.merkle_cache().len(), 1);

    // tier 3 not due yet
    engine.create_operation(native_request(10, 11), at(60, 30)).unwrap();
    assert_eq!(engine.merkle_cache().len(), 1);

    engine.create_operation(native_request(10, 11), at(150, 40)).unwrap();
    assert_eq!(engine.anomaly_metrics().last_tier3_height, 150);
    assert!(engine.merkle_cache().is_empty());
}

#[test]
fn test_root_update_invalidates_cache() {
    let mut engine = engine();
    let ctx = at(2, 10);
    let (id, tree) = committed_operation(&mut engine, 10, ctx);

    let first = proof(&engine, SourcePopulation::Arbitrum, &id, &tree, ctx.timestamp);
    engine.submit_proof(&id, first, at(3, 20)).unwrap();
    assert_eq!(engine.merkle_cache().len(), 1);

    let rotated = CommitmentTree::build(vec![id.leaf(), keccak256(b"next batch")]).unwrap();
    trust_root(&mut engine, rotated.root(), at(4, 40));
    assert!(engine.merkle_cache().is_empty());

    // proofs against the old root no longer pass
    let stale_root = proof(&engine, SourcePopulation::Ton, &id, &tree, ctx.timestamp);
    assert!(matches!(
        engine.submit_proof(&id, stale_root, at(5, 50)).unwrap(),
        ProofOutcome::Invalid(InvalidReason::UntrustedRoot { .. })
    ));

    let current = proof(&engine, SourcePopulation::Ton, &id, &rotated, ctx.timestamp);
    assert!(matches!(
        engine.submit_proof(&id, current, at(5, 51)).unwrap(),
        ProofOutcome::Settled { .. }
    ));
}

#[test]
fn test_duplicate_check_precedes_replay_check() {
    let mut engine = engine();
    let ctx = at(2, 10);
    let (id, tree) = committed_operation(&mut engine, 10, ctx);
    let p = proof(&engine, SourcePopulation::Arbitrum, &id, &tree, ctx.timestamp);
    engine.submit_proof(&id, p.clone(), at(3, 20)).unwrap();

    assert!(matches!(
        engine.submit_proof(&id, p, at(3, 21)),
        Err(EngineError::QuorumConflict(ConflictKind::DuplicatePopulation(_)))
    ));
}
