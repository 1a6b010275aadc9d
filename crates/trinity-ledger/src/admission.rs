// ADMISSION / RATE LIMITER
// Guards operation creation: input checks, per-requester daily quota,
// security tier for high-risk types, fee coverage.
//
// SAFETY INVARIANTS:
// 1. assess() is pure; the quota counter moves only when the engine commits
// 2. Daily usage resets lazily on the first request of a new UTC day

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use trinity_crypto::Address;

use crate::asset_transfer::AssetTransfer;
use crate::errors::{AdmissionError, ConfigError};
use crate::fee::FeeSchedule;
use crate::operation::OperationRequest;

pub const SECONDS_PER_DAY: u64 = 86_400;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AdmissionPolicy {
    /// Operations per requester per UTC day
    pub daily_quota: u32,

    /// Destination chain names accepted in routes
    pub supported_routes: BTreeSet<String>,

    /// Tier required for high-risk operation types
    pub min_security_tier: u8,
}

impl Default for AdmissionPolicy {
    fn default() -> Self {
        AdmissionPolicy {
            daily_quota: 100,
            supported_routes: ["arbitrum", "solana", "ton"].iter().map(|s| s.to_string()).collect(),
            min_security_tier: 1,
        }
    }
}

impl AdmissionPolicy {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.daily_quota == 0 {
            return Err(ConfigError::Invalid("admission.daily_quota must be greater than 0".into()));
        }
        if self.supported_routes.is_empty() {
            return Err(ConfigError::Invalid("admission.supported_routes cannot be empty".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DailyUsage {
    pub day: u64,
    pub count: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RateLimiter {
    usage: BTreeMap<Address, DailyUsage>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Operations `requester` created on the UTC day containing `now`
    pub fn used_today(&self, requester: &Address, now: u64) -> u32 {
        let day = now / SECONDS_PER_DAY;
        match self.usage.get(requester) {
            Some(usage) if usage.day == day => usage.count,
            _ => 0,
        }
    }

    pub fn check(&self, requester: &Address, now: u64, quota: u32) -> Result<(), AdmissionError> {
        if self.used_today(requester, now) >= quota {
            return Err(AdmissionError::QuotaExceeded {
                requester: *requester,
                limit: quota,
            });
        }
        Ok(())
    }

    pub fn record(&mut self, requester: Address, now: u64) {
        let day = now / SECONDS_PER_DAY;
        let usage = self.usage.entry(requester).or_default();
        if usage.day != day {
            *usage = DailyUsage { day, count: 0 };
        }
        usage.count = usage.count.saturating_add(1);
    }
}

/// Priced, admitted request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmissionQuote {
    pub fee: u128,

    /// Attached value consumed (fee, plus amount for native operations)
    pub required: u128,

    pub refund: u128,
}

/// Run every admission check except the halt gate. Pure.
pub fn assess<V: AssetTransfer>(
    request: &OperationRequest,
    policy: &AdmissionPolicy,
    fees: &FeeSchedule,
    limiter: &RateLimiter,
    vault: &V,
    now: u64,
) -> Result<AdmissionQuote, AdmissionError> {
    if request.amount == 0 {
        return Err(AdmissionError::ZeroAmount);
    }
    if !policy.supported_routes.contains(&request.route.destination_chain) {
        return Err(AdmissionError::UnsupportedRoute(request.route.destination_chain.clone()));
    }
    if request.route.recipient.is_zero() {
        return Err(AdmissionError::ZeroRecipient);
    }
    limiter.check(&request.requester, now, policy.daily_quota)?;

    if request.operation_type.is_high_risk() {
        let actual = vault.security_tier(&request.requester);
        if actual < policy.min_security_tier {
            return Err(AdmissionError::SecurityTierTooLow {
                required: policy.min_security_tier,
                actual,
            });
        }
    }

    let fee = fees.compute(request.prioritize_speed, request.prioritize_security);
    let required = if request.asset.is_native() {
        fee.checked_add(request.amount).ok_or(AdmissionError::Overflow)?
    } else {
        fee
    };
    if request.attached_value < required {
        return Err(AdmissionError::InsufficientValue {
            required,
            attached: request.attached_value,
        });
    }

    Ok(AdmissionQuote {
        fee,
        required,
        refund: request.attached_value - required,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset_transfer::InMemoryVault;
    use crate::operation::{AssetRef, OperationType, Route};

    fn request(amount: u128, attached_value: u128) -> OperationRequest {
        OperationRequest {
            requester: Address([1; 20]),
            route: Route::new("solana", Address([2; 20])),
            asset: AssetRef::Native,
            amount,
            operation_type: OperationType::CrossChainTransfer,
            prioritize_speed: false,
            prioritize_security: false,
            attached_value,
        }
    }

    fn fees() -> FeeSchedule {
        FeeSchedule {
            base_fee: 1,
            max_fee: 10,
            ..Default::default()
        }
    }

    #[test]
    fn test_exact_value_no_refund() {
        let quote = assess(
            &request(10, 11),
            &AdmissionPolicy::default(),
            &fees(),
            &RateLimiter::new(),
            &InMemoryVault::new(),
            0,
        )
        .unwrap();
        assert_eq!(quote, AdmissionQuote { fee: 1, required: 11, refund: 0 });
    }

    #[test]
    fn test_native_value_must_cover_amount() {
        let result = assess(
            &request(10, 10),
            &AdmissionPolicy::default(),
            &fees(),
            &RateLimiter::new(),
            &InMemoryVault::new(),
            0,
        );
        assert_eq!(result, Err(AdmissionError::InsufficientValue { required: 11, attached: 10 }));
    }

    #[test]
    fn test_token_value_covers_fee_only() {
        let mut token = request(10, 3);
        token.asset = AssetRef::Token(Address([5; 20]));
        let policy = AdmissionPolicy::default();
        let vault = InMemoryVault::new();
        let quote = assess(&token, &policy, &fees(), &RateLimiter::new(), &vault, 0).unwrap();
        assert_eq!(quote.refund, 2);
    }

    #[test]
    fn test_unsupported_route() {
        let mut bad = request(10, 11);
        bad.route.destination_chain = "bitcoin".to_string();
        let policy = AdmissionPolicy::default();
        let vault = InMemoryVault::new();
        assert_eq!(
            assess(&bad, &policy, &fees(), &RateLimiter::new(), &vault, 0),
            Err(AdmissionError::UnsupportedRoute("bitcoin".to_string()))
        );
    }

    #[test]
    fn test_high_risk_requires_tier() {
        let mut withdrawal = request(10, 11);
        withdrawal.operation_type = OperationType::VaultWithdrawal;
        let mut vault = InMemoryVault::new();
        let policy = AdmissionPolicy::default();

        assert_eq!(
            assess(&withdrawal, &policy, &fees(), &RateLimiter::new(), &vault, 0),
            Err(AdmissionError::SecurityTierTooLow { required: 1, actual: 0 })
        );
        vault.set_security_tier(withdrawal.requester, 1);
        assert!(assess(&withdrawal, &policy, &fees(), &RateLimiter::new(), &vault, 0).is_ok());
    }

    #[test]
    fn test_quota_resets_next_day() {
        let mut limiter = RateLimiter::new();
        let requester = Address([1; 20]);
        for _ in 0..3 {
            limiter.record(requester, 10);
        }
        assert!(limiter.check(&requester, 100, 3).is_err());
        assert!(limiter.check(&requester, SECONDS_PER_DAY, 3).is_ok());

        limiter.record(requester, SECONDS_PER_DAY + 5);
        assert_eq!(limiter.used_today(&requester, SECONDS_PER_DAY + 6), 1);
    }
}
