/// OPERATION FEES
///
/// Flat base fee scaled by priority multipliers, capped. Amounts are in
/// 18-decimal base units of the native asset.

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

/// 0.001 native unit
pub const DEFAULT_BASE_FEE: u128 = 1_000_000_000_000_000;

/// 0.1 native unit
pub const DEFAULT_MAX_FEE: u128 = 100_000_000_000_000_000;

/// 1.0x in basis points
pub const BPS_DENOMINATOR: u128 = 10_000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FeeSchedule {
    pub base_fee: u128,

    /// Applied when the request prioritizes speed (15000 = 1.5x)
    pub speed_multiplier_bps: u128,

    /// Applied when the request prioritizes security (12000 = 1.2x)
    pub security_multiplier_bps: u128,

    pub max_fee: u128,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        FeeSchedule {
            base_fee: DEFAULT_BASE_FEE,
            speed_multiplier_bps: 15_000,
            security_multiplier_bps: 12_000,
            max_fee: DEFAULT_MAX_FEE,
        }
    }
}

impl FeeSchedule {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_fee == 0 {
            return Err(ConfigError::Invalid("fees.max_fee must be greater than 0".into()));
        }
        if self.base_fee > self.max_fee {
            return Err(ConfigError::Invalid("fees.base_fee exceeds fees.max_fee".into()));
        }
        if self.speed_multiplier_bps < BPS_DENOMINATOR
            || self.security_multiplier_bps < BPS_DENOMINATOR
        {
            return Err(ConfigError::Invalid("fee multipliers must be at least 10000 bps".into()));
        }
        Ok(())
    }

    pub fn compute(&self, prioritize_speed: bool, prioritize_security: bool) -> u128 {
        let mut fee = self.base_fee;
        if prioritize_speed {
            fee = fee.saturating_mul(self.speed_multiplier_bps) / BPS_DENOMINATOR;
        }
        if prioritize_security {
            fee = fee.saturating_mul(self.security_multiplier_bps) / BPS_DENOMINATOR;
        }
        fee.min(self.max_fee)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multipliers_stack() {
        let fees = FeeSchedule::default();
        assert_eq!(fees.compute(false, false), DEFAULT_BASE_FEE);
        assert_eq!(fees.compute(true, false), 1_500_000_000_000_000);
        assert_eq!(fees.compute(false, true), 1_200_000_000_000_000);
        assert_eq!(fees.compute(true, true), 1_800_000_000_000_000);
    }

    #[test]
    fn test_fee_capped() {
        let fees = FeeSchedule {
            base_fee: 90,
            max_fee: 100,
            ..Default::default()
        };
        assert_eq!(fees.compute(true, true), 100);
    }

    #[test]
    fn test_base_above_cap_rejected() {
        let fees = FeeSchedule {
            base_fee: 101,
            max_fee: 100,
            ..Default::default()
        };
        assert!(fees.validate().is_err());
    }
}
