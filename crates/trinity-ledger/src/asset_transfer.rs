// ASSET TRANSFER CAPABILITY
// Seam to the vault / share-accounting component that actually moves value.
//
// SAFETY INVARIANTS:
// 1. A failed debit or credit leaves balances unchanged
// 2. The engine never assumes a transfer succeeded without an Ok

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;
use trinity_crypto::Address;

use crate::operation::AssetRef;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransferError {
    #[error("Insufficient balance for {account}: needed {needed}, available {available}")]
    InsufficientBalance {
        account: Address,
        needed: u128,
        available: u128,
    },

    #[error("Transfer to {0} rejected")]
    Rejected(Address),

    #[error("Balance overflow")]
    Overflow,
}

/// Value movement and security-tier lookups provided by the vault
pub trait AssetTransfer {
    /// Pull `amount` of `asset` from `from` into engine custody
    fn debit(&mut self, from: &Address, asset: &AssetRef, amount: u128)
        -> Result<(), TransferError>;

    /// Release `amount` of `asset` from engine custody to `to`
    fn credit(&mut self, to: &Address, asset: &AssetRef, amount: u128) -> Result<(), TransferError>;

    /// Security tier held by `account` (0 = none)
    fn security_tier(&self, account: &Address) -> u8;
}

/// Balance-map vault used for tests and local simulation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InMemoryVault {
    balances: BTreeMap<(Address, AssetRef), u128>,
    tiers: BTreeMap<Address, u8>,
    blocked: BTreeSet<Address>,
}

impl InMemoryVault {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fund(&mut self, account: Address, asset: AssetRef, amount: u128) {
        let balance = self.balances.entry((account, asset)).or_insert(0);
        *balance = balance.saturating_add(amount);
    }

    pub fn set_security_tier(&mut self, account: Address, tier: u8) {
        self.tiers.insert(account, tier);
    }

    /// Reject every credit to `account` from now on
    pub fn block(&mut self, account: Address) {
        self.blocked.insert(account);
    }

    pub fn unblock(&mut self, account: &Address) {
        self.blocked.remove(account);
    }

    pub fn balance_of(&self, account: &Address, asset: &AssetRef) -> u128 {
        self.balances.get(&(*account, *asset)).copied().unwrap_or(0)
    }
}

impl AssetTransfer for InMemoryVault {
    fn debit(
        &mut self,
        from: &Address,
        asset: &AssetRef,
        amount: u128,
    ) -> Result<(), TransferError> {
        let available = self.balance_of(from, asset);
        if available < amount {
            return Err(TransferError::InsufficientBalance {
                account: *from,
                needed: amount,
                available,
            });
        }
        self.balances.insert((*from, *asset), available - amount);
        Ok(())
    }

    fn credit(
        &mut self,
        to: &Address,
        asset: &AssetRef,
        amount: u128,
    ) -> Result<(), TransferError> {
        if self.blocked.contains(to) {
            return Err(TransferError::Rejected(*to));
        }
        let balance = self
            .balance_of(to, asset)
            .checked_add(amount)
            .ok_or(TransferError::Overflow)?;
        self.balances.insert((*to, *asset), balance);
        Ok(())
    }

    fn security_tier(&self, account: &Address) -> u8 {
        self.tiers.get(account).copied().unwrap_or(0)
    }
}
