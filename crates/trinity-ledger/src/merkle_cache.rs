// MERKLE COMMITMENT CACHE
// Time-bounded record of roots already folded for an operation.
//
// SAFETY INVARIANTS:
// 1. Entries are written only after the computed root matched the trusted root
// 2. An entry is bound to the root it was verified against; any other root misses
// 3. Freshness is measured in height units and checked lazily

use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use trinity_crypto::Hash32;

use crate::operation::OperationId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleCacheEntry {
    pub root: Hash32,
    pub verified_at_height: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MerkleCache {
    entries: BTreeMap<OperationId, MerkleCacheEntry>,

    /// Height units an entry stays valid
    lifetime: u64,
}

impl MerkleCache {
    pub fn new(lifetime: u64) -> Self {
        MerkleCache {
            entries: BTreeMap::new(),
            lifetime,
        }
    }

    pub fn lifetime(&self) -> u64 {
        self.lifetime
    }

    fn is_fresh(&self, entry: &MerkleCacheEntry, height: u64) -> bool {
        height < entry.verified_at_height.saturating_add(self.lifetime)
    }

    /// Fresh entry for `operation` verified against exactly `root`? Pure.
    pub fn lookup(&self, operation: &OperationId, root: &Hash32, height: u64) -> bool {
        self.entries
            .get(operation)
            .map(|entry| entry.root == *root && self.is_fresh(entry, height))
            .unwrap_or(false)
    }

    pub fn entry(&self, operation: &OperationId) -> Option<&MerkleCacheEntry> {
        self.entries.get(operation)
    }

    pub fn insert(&mut self, operation: OperationId, root: Hash32, height: u64) {
        self.entries.insert(
            operation,
            MerkleCacheEntry {
                root,
                verified_at_height: height,
            },
        );
    }

    /// Drop entries verified against `root` (it is no longer trusted)
    pub fn invalidate_root(&mut self, root: &Hash32) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.root != *root);
        let dropped = before - self.entries.len();
        if dropped > 0 {
            debug!("Invalidated {} cache entries for root {}", dropped, hex::encode(root));
        }
        dropped
    }

    /// Drop entries stale at `height`
    pub fn prune(&mut self, height: u64) -> usize {
        let lifetime = self.lifetime;
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| height < entry.verified_at_height.saturating_add(lifetime));
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
