use std::fs;
use std::path::Path;

use log::info;
use serde::{Deserialize, Serialize};
use trinity_consensus::AnomalyParams;
use trinity_crypto::{Address, EngineIdentity};

use crate::admission::AdmissionPolicy;
use crate::errors::ConfigError;
use crate::fee::FeeSchedule;
use crate::proof_verifier::VerificationParams;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct IdentityConfig {
    pub chain_id: u64,
    pub engine_address: Address,

    /// Only caller allowed manual halt/resume and cancel/fail
    pub operator: Address,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        IdentityConfig {
            chain_id: 42161,
            engine_address: Address::ZERO,
            operator: Address::ZERO,
        }
    }
}

impl IdentityConfig {
    pub fn engine_identity(&self) -> EngineIdentity {
        EngineIdentity {
            chain_id: self.chain_id,
            engine_address: self.engine_address,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.chain_id == 0 {
            return Err(ConfigError::Invalid("identity.chain_id must be greater than 0".into()));
        }
        Ok(())
    }
}

/// Full engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EngineConfig {
    pub identity: IdentityConfig,
    pub fees: FeeSchedule,
    pub admission: AdmissionPolicy,
    pub anomaly: AnomalyParams,
    pub verification: VerificationParams,
}

impl EngineConfig {
    pub fn from_yaml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_yaml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        let config = Self::from_yaml_str(&raw)?;
        info!("Loaded engine config from {}", path.display());
        Ok(config)
    }

    pub fn to_yaml_string(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.identity.validate()?;
        self.fees.validate()?;
        self.admission.validate()?;
        self.anomaly
            .validate()
            .map_err(|err| ConfigError::Invalid(format!("anomaly: {}", err)))?;

        let verification = &self.verification;
        if verification.max_commitment_depth == 0 {
            return Err(ConfigError::Invalid(
                "verification.max_commitment_depth must be greater than 0".into(),
            ));
        }
        if verification.max_proof_age_secs == 0 {
            return Err(ConfigError::Invalid(
                "verification.max_proof_age_secs must be greater than 0".into(),
            ));
        }
        if verification.cache_lifetime == 0 {
            return Err(ConfigError::Invalid(
                "verification.cache_lifetime must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.anomaly.max_ops_per_height, 10);
        assert_eq!(config.verification.max_commitment_depth, 32);
        assert_eq!(config.admission.daily_quota, 100);
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let raw = r#"
identity:
  chain_id: 10
  engine_address: "0x1111111111111111111111111111111111111111"
  operator: "0x2222222222222222222222222222222222222222"
admission:
  supported_routes: [solana]
anomaly:
  max_ops_per_height: 3
"#;
        let config = EngineConfig::from_yaml_str(raw).unwrap();
        assert_eq!(config.identity.chain_id, 10);
        assert_eq!(config.identity.operator, Address([0x22; 20]));
        assert_eq!(config.anomaly.max_ops_per_height, 3);
        assert_eq!(config.anomaly.tier2_interval, 10);
        assert_eq!(config.admission.daily_quota, 100);
        assert!(config.admission.supported_routes.contains("solana"));
        assert_eq!(config.admission.supported_routes.len(), 1);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let empty_routes = "admission:\n  supported_routes: []\n";
        assert!(matches!(EngineConfig::from_yaml_str(empty_routes), Err(ConfigError::Invalid(_))));

        let zero_window = "anomaly:\n  proof_window_secs: 0\n";
        assert!(matches!(EngineConfig::from_yaml_str(zero_window), Err(ConfigError::Invalid(_))));

        let fee_above_cap = "fees:\n  base_fee: 10\n  max_fee: 5\n";
        assert!(matches!(EngineConfig::from_yaml_str(fee_above_cap), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_yaml_round_trip() {
        let config = EngineConfig::default();
        let yaml = config.to_yaml_string().unwrap();
        assert_eq!(EngineConfig::from_yaml_str(&yaml).unwrap(), config);
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            EngineConfig::from_yaml_file(Path::new("/nonexistent/trinity.yaml")),
            Err(ConfigError::Io(_))
        ));
    }
}
