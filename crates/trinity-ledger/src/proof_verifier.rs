// PROOF VERIFIER
// Staged, read-only validation of a cross-chain proof
//
// SAFETY INVARIANTS:
// 1. Verification never mutates state; the engine commits the verdict
// 2. Checks run in a fixed order; the first failure decides the outcome
// 3. Caller errors (structure, freshness, unauthorized signer, replay) are
//    rejections; cryptographic failures are verdicts that get counted
// 4. A cache hit still requires the claimed root to equal the trusted root

use serde::{Deserialize, Serialize};
use trinity_consensus::{BlockContext, SourcePopulation, ValidatorRegistry};
use trinity_crypto::{
    fold_commitment_path, recover_signer, Address, EngineIdentity, Hash32, ZERO_HASH,
};

use crate::errors::{ConflictKind, EngineError, EngineResult, ProofRejection};
use crate::merkle_cache::MerkleCache;
use crate::operation::Operation;
use crate::proof::CrossChainProof;
use crate::replay_guard::ReplayGuard;
use crate::signing::proof_signing_digest;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct VerificationParams {
    /// Longest accepted commitment path
    pub max_commitment_depth: usize,

    /// Seconds
    pub max_proof_age_secs: u64,

    /// Height units a Merkle cache entry stays valid
    pub cache_lifetime: u64,
}

impl Default for VerificationParams {
    fn default() -> Self {
        VerificationParams {
            max_commitment_depth: 32,
            max_proof_age_secs: 3600,
            cache_lifetime: 100,
        }
    }
}

/// Why a well-formed proof failed cryptographically
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvalidReason {
    UnrecoverableSignature,
    CommitmentMismatch { claimed: Hash32, computed: Hash32 },
    UntrustedRoot { claimed: Hash32, trusted: Hash32 },
}

impl InvalidReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvalidReason::UnrecoverableSignature => "UNRECOVERABLE_SIGNATURE",
            InvalidReason::CommitmentMismatch { .. } => "COMMITMENT_MISMATCH",
            InvalidReason::UntrustedRoot { .. } => "UNTRUSTED_ROOT",
        }
    }
}

/// Everything the engine needs to commit an accepted proof
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedProof {
    pub population: SourcePopulation,
    pub signer: Address,
    pub fingerprint: Hash32,
    pub root: Hash32,
    pub cache_hit: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Valid(VerifiedProof),
    Invalid(InvalidReason),
}

/// Borrowed view of the state a verification reads
pub struct ProofVerifier<'a> {
    pub identity: &'a EngineIdentity,
    pub params: &'a VerificationParams,
    pub registry: &'a ValidatorRegistry,
    pub cache: &'a MerkleCache,
    pub replay: &'a ReplayGuard,
}

impl<'a> ProofVerifier<'a> {
    pub fn verify(
        &self,
        operation: &Operation,
        proof: &CrossChainProof,
        ctx: BlockContext,
    ) -> EngineResult<Verdict> {
        self.check_structure(proof)?;
        self.check_freshness(proof, ctx.timestamp)?;

        let population = proof.population();
        let fingerprint = proof_signing_digest(
            self.identity,
            operation,
            &proof.source,
            &proof.commitment_root,
            proof.observed_at,
        );
        let signer = match recover_signer(&fingerprint, &proof.signature) {
            Ok(signer) => signer,
            Err(_) => return Ok(Verdict::Invalid(InvalidReason::UnrecoverableSignature)),
        };

        if self.replay.is_consumed(&fingerprint) {
            return Err(EngineError::QuorumConflict(ConflictKind::Replay));
        }

        if !self.registry.is_authorized(population, &signer) {
            return Err(ProofRejection::UnauthorizedSigner { population, signer }.into());
        }

        let cache_hit = self.cache.lookup(&operation.id, &proof.commitment_root, ctx.height);
        if !cache_hit {
            let computed = fold_commitment_path(&operation.id.leaf(), &proof.commitment_path);
            if computed != proof.commitment_root {
                return Ok(Verdict::Invalid(InvalidReason::CommitmentMismatch {
                    claimed: proof.commitment_root,
                    computed,
                }));
            }
        }

        let trusted = self.registry.trusted_root(population)?;
        if proof.commitment_root != trusted {
            return Ok(Verdict::Invalid(InvalidReason::UntrustedRoot {
                claimed: proof.commitment_root,
                trusted,
            }));
        }

        Ok(Verdict::Valid(VerifiedProof {
            population,
            signer,
            fingerprint,
            root: proof.commitment_root,
            cache_hit,
        }))
    }

    fn check_structure(&self, proof: &CrossChainProof) -> Result<(), ProofRejection> {
        if proof.commitment_path.is_empty() {
            return Err(ProofRejection::EmptyPath);
        }
        if proof.commitment_path.len() > self.params.max_commitment_depth {
            return Err(ProofRejection::PathTooDeep {
                depth: proof.commitment_path.len(),
                max: self.params.max_commitment_depth,
            });
        }
        if proof.commitment_root == ZERO_HASH {
            return Err(ProofRejection::ZeroRoot);
        }
        if proof.signature.is_empty() {
            return Err(ProofRejection::EmptySignature);
        }
        Ok(())
    }

    fn check_freshness(&self, proof: &CrossChainProof, now: u64) -> Result<(), ProofRejection> {
        if proof.observed_at > now {
            return Err(ProofRejection::FromFuture {
                observed_at: proof.observed_at,
                now,
            });
        }
        if now - proof.observed_at > self.params.max_proof_age_secs {
            return Err(ProofRejection::Stale {
                observed_at: proof.observed_at,
                max_age: self.params.max_proof_age_secs,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use trinity_consensus::PopulationSeed;
    use trinity_crypto::{keccak256, CommitmentTree, SignerKey};

    use crate::operation::{AssetRef, OperationId, OperationStatus, OperationType, Route};
    use crate::proof::SourceBlockReference;

    const NOW: BlockContext = BlockContext { height: 10, timestamp: 5_000 };

    struct Fixture {
        identity: EngineIdentity,
        params: VerificationParams,
        registry: ValidatorRegistry,
        cache: MerkleCache,
        replay: ReplayGuard,
        operation: Operation,
        tree: CommitmentTree,
        key: SignerKey,
    }

    impl Fixture {
        fn new() -> Self {
            let key = SignerKey::from_bytes(&[7; 32]).unwrap();
            let id = OperationId(keccak256(b"operation"));
            let tree = CommitmentTree::build(vec![id.leaf(), keccak256(b"other")]).unwrap();
            let seeds = SourcePopulation::ALL
                .iter()
                .map(|p| PopulationSeed {
                    population: *p,
                    signers: if *p == SourcePopulation::Ton {
                        vec![key.address()]
                    } else {
                        vec![Address([p.id(); 20])]
                    },
                    trusted_root: tree.root(),
                })
                .collect();

            Fixture {
                identity: EngineIdentity {
                    chain_id: 42161,
                    engine_address: Address([0xEE; 20]),
                },
                params: VerificationParams::default(),
                registry: ValidatorRegistry::new(seeds, 0).unwrap(),
                cache: MerkleCache::new(100),
                replay: ReplayGuard::new(),
                operation: Operation {
                    id,
                    requester: Address([1; 20]),
                    route: Route::new("ton", Address([2; 20])),
                    asset: AssetRef::Native,
                    amount: 10,
                    fee: 1,
                    operation_type: OperationType::CrossChainTransfer,
                    created_at: 4_000,
                    created_height: 9,
                    status: OperationStatus::Pending,
                    valid_proof_count: 0,
                    proofs: BTreeMap::new(),
                    closed_at: None,
                },
                tree,
                key,
            }
        }

        fn proof(&self) -> CrossChainProof {
            CrossChainProof::signed(
                &self.key,
                &self.identity,
                &self.operation,
                SourceBlockReference::Ton { seqno: 77 },
                self.tree.root(),
                self.tree.inclusion_path(0).unwrap(),
                4_900,
            )
            .unwrap()
        }

        fn verify(&self, proof: &CrossChainProof) -> EngineResult<Verdict> {
            ProofVerifier {
                identity: &self.identity,
                params: &self.params,
                registry: &self.registry,
                cache: &self.cache,
                replay: &self.replay,
            }
            .verify(&self.operation, proof, NOW)
        }
    }

    #[test]
    fn test_valid_proof_yields_fingerprint() {
        let fixture = Fixture::new();
        match fixture.verify(&fixture.proof()).unwrap() {
            Verdict::Valid(verified) => {
                assert_eq!(verified.population, SourcePopulation::Ton);
                assert_eq!(verified.signer, fixture.key.address());
                assert_eq!(verified.root, fixture.tree.root());
                assert!(!verified.cache_hit);
            }
            other => panic!("expected valid verdict, got {:?}", other),
        }
    }

    #[test]
    fn test_consumed_fingerprint_is_replay() {
        let mut fixture = Fixture::new();
        let proof = fixture.proof();
        let fingerprint = match fixture.verify(&proof).unwrap() {
            Verdict::Valid(verified) => verified.fingerprint,
            other => panic!("expected valid verdict, got {:?}", other),
        };

        fixture.replay.consume(fingerprint);
        assert!(matches!(
            fixture.verify(&proof),
            Err(EngineError::QuorumConflict(ConflictKind::Replay))
        ));
    }

    #[test]
    fn test_cache_hit_still_checks_trusted_root() {
        let mut fixture = Fixture::new();
        let rogue = keccak256(b"rogue root");
        fixture.cache.insert(fixture.operation.id, rogue, NOW.height);

        let mut proof = fixture.proof();
        proof.commitment_root = rogue;
        proof.signature = fixture
            .key
            .sign_digest(&proof_signing_digest(
                &fixture.identity,
                &fixture.operation,
                &proof.source,
                &rogue,
                proof.observed_at,
            ))
            .unwrap();

        assert!(matches!(
            fixture.verify(&proof).unwrap(),
            Verdict::Invalid(InvalidReason::UntrustedRoot { .. })
        ));
    }

    #[test]
    fn test_cached_root_reported_as_hit() {
        let mut fixture = Fixture::new();
        fixture.cache.insert(fixture.operation.id, fixture.tree.root(), NOW.height - 1);
        match fixture.verify(&fixture.proof()).unwrap() {
            Verdict::Valid(verified) => assert!(verified.cache_hit),
            other => panic!("expected valid verdict, got {:?}", other),
        }
    }
}
