use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use trinity_crypto::Hash32;

/// Set of consumed proof fingerprints, global across operations.
///
/// Entries are never removed.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReplayGuard {
    consumed: BTreeSet<Hash32>,
}

impl ReplayGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_consumed(&self, fingerprint: &Hash32) -> bool {
        self.consumed.contains(fingerprint)
    }

    /// Mark `fingerprint` consumed. Returns false if it already was.
    pub fn consume(&mut self, fingerprint: Hash32) -> bool {
        self.consumed.insert(fingerprint)
    }

    pub fn len(&self) -> usize {
        self.consumed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.consumed.is_empty()
    }
}
