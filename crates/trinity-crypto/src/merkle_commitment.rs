/// Merkle Commitments for Cross-Chain Confirmation Proofs
///
/// Verifier populations attest to their own chain state with a Merkle root;
/// a proof for one operation carries the sibling path from the operation's
/// leaf up to that root. This module folds such paths and builds trees on
/// the verifier side.
///
/// SAFETY GUARANTEES:
/// - Pair hashing is canonical (smaller operand first), so paths carry no
///   left/right position bits and sibling order at a level cannot be forged
/// - Folding is deterministic and allocation-free
/// - Keccak-256 is used throughout, matching the source chains

use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};

use crate::{CryptoError, CryptoResult};

/// 32-byte Keccak digest
pub type Hash32 = [u8; 32];

/// All-zero digest, never a valid commitment root
pub const ZERO_HASH: Hash32 = [0u8; 32];

/// Keccak-256 of a single byte string
pub fn keccak256(data: &[u8]) -> Hash32 {
    keccak256_concat(&[data])
}

/// Keccak-256 over the concatenation of several byte strings
pub fn keccak256_concat(parts: &[&[u8]]) -> Hash32 {
    let mut hasher = Keccak256::new();
    for part in parts {
        hasher.update(part);
    }
    let mut digest = [0u8; 32];
    digest.copy_from_slice(&hasher.finalize());
    digest
}

/// Hash two nodes in canonical order: the lexicographically smaller first.
pub fn hash_ordered_pair(a: &Hash32, b: &Hash32) -> Hash32 {
    if a <= b {
        keccak256_concat(&[a.as_slice(), b.as_slice()])
    } else {
        keccak256_concat(&[b.as_slice(), a.as_slice()])
    }
}

/// Fold a leaf through its sibling path and return the resulting root.
pub fn fold_commitment_path(leaf: &Hash32, path: &[Hash32]) -> Hash32 {
    path.iter()
        .fold(*leaf, |current, sibling| hash_ordered_pair(&current, sibling))
}

/// Check that `leaf` is committed under `root` by `path`.
pub fn verify_inclusion(leaf: &Hash32, path: &[Hash32], root: &Hash32) -> CryptoResult<()> {
    let computed = fold_commitment_path(leaf, path);
    if &computed == root {
        Ok(())
    } else {
        Err(CryptoError::CommitmentMismatch {
            expected: hex::encode(root),
            computed: hex::encode(computed),
        })
    }
}

/// A finalized commitment tree built over a list of leaves.
///
/// Odd nodes at any level are paired with themselves. Levels are kept so
/// that inclusion paths can be produced without rebuilding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitmentTree {
    /// levels[0] are the leaves, the last level holds only the root
    levels: Vec<Vec<Hash32>>,
}

impl CommitmentTree {
    /// Build a tree over the given leaves
    pub fn build(leaves: Vec<Hash32>) -> CryptoResult<Self> {
        if leaves.is_empty() {
            return Err(CryptoError::EmptyTree);
        }

        let mut levels = vec![leaves];
        while levels.last().map(Vec::len).unwrap_or(0) > 1 {
            let current = &levels[levels.len() - 1];
            let next: Vec<Hash32> = current
                .chunks(2)
                .map(|pair| match pair {
                    [left, right] => hash_ordered_pair(left, right),
                    [single] => hash_ordered_pair(single, single),
                    _ => unreachable!("chunks(2) yields one or two items"),
                })
                .collect();
            levels.push(next);
        }

        Ok(Self { levels })
    }

    /// Root of the tree
    pub fn root(&self) -> Hash32 {
        self.levels
            .last()
            .and_then(|level| level.first())
            .copied()
            .unwrap_or(ZERO_HASH)
    }

    /// Number of leaves
    pub fn len(&self) -> usize {
        self.levels.first().map(Vec::len).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sibling path for the leaf at `index`
    pub fn inclusion_path(&self, index: usize) -> CryptoResult<Vec<Hash32>> {
        if index >= self.len() {
            return Err(CryptoError::LeafNotFound(index));
        }

        let mut path = Vec::with_capacity(self.levels.len().saturating_sub(1));
        let mut position = index;
        for level in &self.levels[..self.levels.len() - 1] {
            let sibling = position ^ 1;
            // Odd node out: paired with itself
            path.push(*level.get(sibling).unwrap_or(&level[position]));
            position /= 2;
        }

        Ok(path)
    }

    /// Position of a leaf, if present
    pub fn position_of(&self, leaf: &Hash32) -> Option<usize> {
        self.levels.first()?.iter().position(|l| l == leaf)
    }
}
