// VALIDATOR REGISTRY
// Per-population signer sets and trusted commitment roots
//
// SAFETY INVARIANTS:
// 1. All three populations are seeded at construction, each with >= 1 signer
// 2. A signer address belongs to at most one population (no double counting)
// 3. Trusted roots are never zero
// 4. After seeding, trust material only changes through an approved quorum
//    proposal (see trust_governance); this module exposes the raw mutators
//    to that module only

use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use trinity_crypto::{Address, Hash32, ZERO_HASH};

use crate::population::SourcePopulation;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Population {0} not seeded")]
    PopulationNotSeeded(SourcePopulation),

    #[error("Population {0} has no signers")]
    EmptySignerSet(SourcePopulation),

    #[error("Trusted root for population {0} cannot be zero")]
    ZeroRoot(SourcePopulation),

    #[error("Signer {signer} is not registered for population {population}")]
    UnknownSigner {
        population: SourcePopulation,
        signer: Address,
    },

    #[error("Signer {signer} is already registered (population {population})")]
    SignerAlreadyRegistered {
        population: SourcePopulation,
        signer: Address,
    },

    #[error("Population {0} seeded twice")]
    DuplicateSeed(SourcePopulation),

    #[error("Cannot deactivate the last active signer of population {0}")]
    LastActiveSigner(SourcePopulation),
}

/// A registered signer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidatorRecord {
    pub address: Address,

    pub population: SourcePopulation,

    /// Inactive signers are not authorized but keep their history
    pub active: bool,

    /// Proofs from this signer that were accepted
    pub proofs_accepted: u64,

    /// Timestamp of registration (seed or rotation)
    pub registered_at: u64,
}

/// Initial trust material for one population
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PopulationSeed {
    pub population: SourcePopulation,
    pub signers: Vec<Address>,
    pub trusted_root: Hash32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PopulationTrust {
    signers: BTreeMap<Address, ValidatorRecord>,
    trusted_root: Hash32,
    root_updated_at: u64,
}

impl PopulationTrust {
    pub fn trusted_root(&self) -> Hash32 {
        self.trusted_root
    }

    pub fn root_updated_at(&self) -> u64 {
        self.root_updated_at
    }

    pub fn signers(&self) -> impl Iterator<Item = &ValidatorRecord> {
        self.signers.values()
    }

    pub fn active_signer_count(&self) -> usize {
        self.signers.values().filter(|r| r.active).count()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidatorRegistry {
    populations: BTreeMap<SourcePopulation, PopulationTrust>,
}

impl ValidatorRegistry {
    /// Seed the registry. Every population must appear exactly once.
    pub fn new(seeds: Vec<PopulationSeed>, seeded_at: u64) -> Result<Self, RegistryError> {
        let mut populations = BTreeMap::new();
        let mut owners: BTreeMap<Address, SourcePopulation> = BTreeMap::new();

        for seed in seeds {
            if populations.contains_key(&seed.population) {
                return Err(RegistryError::DuplicateSeed(seed.population));
            }
            if seed.signers.is_empty() {
                return Err(RegistryError::EmptySignerSet(seed.population));
            }
            if seed.trusted_root == ZERO_HASH {
                return Err(RegistryError::ZeroRoot(seed.population));
            }

            let mut signers = BTreeMap::new();
            for signer in seed.signers {
                if let Some(owner) = owners.get(&signer) {
                    return Err(RegistryError::SignerAlreadyRegistered {
                        population: *owner,
                        signer,
                    });
                }
                owners.insert(signer, seed.population);
                signers.insert(
                    signer,
                    ValidatorRecord {
                        address: signer,
                        population: seed.population,
                        active: true,
                        proofs_accepted: 0,
                        registered_at: seeded_at,
                    },
                );
            }

            populations.insert(
                seed.population,
                PopulationTrust {
                    signers,
                    trusted_root: seed.trusted_root,
                    root_updated_at: seeded_at,
                },
            );
        }

        for population in SourcePopulation::ALL {
            if !populations.contains_key(&population) {
                return Err(RegistryError::PopulationNotSeeded(population));
            }
        }

        info!("Validator registry seeded for {} populations", populations.len());
        Ok(ValidatorRegistry { populations })
    }

    pub fn population(
        &self,
        population: SourcePopulation,
    ) -> Result<&PopulationTrust, RegistryError> {
        self.populations
            .get(&population)
            .ok_or(RegistryError::PopulationNotSeeded(population))
    }

    fn population_mut(
        &mut self,
        population: SourcePopulation,
    ) -> Result<&mut PopulationTrust, RegistryError> {
        self.populations
            .get_mut(&population)
            .ok_or(RegistryError::PopulationNotSeeded(population))
    }

    /// Is `signer` a currently authorized key of `population`?
    pub fn is_authorized(&self, population: SourcePopulation, signer: &Address) -> bool {
        self.populations
            .get(&population)
            .and_then(|trust| trust.signers.get(signer))
            .map(|record| record.active)
            .unwrap_or(false)
    }

    pub fn trusted_root(&self, population: SourcePopulation) -> Result<Hash32, RegistryError> {
        Ok(self.population(population)?.trusted_root)
    }

    pub fn validator(&self, signer: &Address) -> Option<&ValidatorRecord> {
        self.populations.values().find_map(|trust| trust.signers.get(signer))
    }

    fn owner_of(&self, signer: &Address) -> Option<SourcePopulation> {
        self.validator(signer).map(|record| record.population)
    }

    /// Count an accepted proof against its signer. Unknown signers are ignored.
    pub fn record_accepted_proof(&mut self, population: SourcePopulation, signer: &Address) {
        match self
            .populations
            .get_mut(&population)
            .and_then(|trust| trust.signers.get_mut(signer))
        {
            Some(record) => record.proofs_accepted = record.proofs_accepted.saturating_add(1),
            None => debug!("No record for {} in {}; proof not counted", signer, population),
        }
    }

    /// Check that a rotation would succeed without applying it
    pub fn check_rotation(
        &self,
        population: SourcePopulation,
        old: &Address,
        new: &Address,
    ) -> Result<(), RegistryError> {
        let trust = self.population(population)?;
        if !trust.signers.contains_key(old) {
            return Err(RegistryError::UnknownSigner { population, signer: *old });
        }
        if let Some(owner) = self.owner_of(new) {
            return Err(RegistryError::SignerAlreadyRegistered { population: owner, signer: *new });
        }
        Ok(())
    }

    pub(crate) fn rotate_key(
        &mut self,
        population: SourcePopulation,
        old: &Address,
        new: Address,
        now: u64,
    ) -> Result<(), RegistryError> {
        self.check_rotation(population, old, &new)?;

        let trust = self.population_mut(population)?;
        trust.signers.remove(old);
        trust.signers.insert(
            new,
            ValidatorRecord {
                address: new,
                population,
                active: true,
                proofs_accepted: 0,
                registered_at: now,
            },
        );

        info!("Signer rotated for {}: {} -> {}", population, old, new);
        Ok(())
    }

    pub fn check_root_update(
        &self,
        population: SourcePopulation,
        root: &Hash32,
    ) -> Result<(), RegistryError> {
        self.population(population)?;
        if *root == ZERO_HASH {
            return Err(RegistryError::ZeroRoot(population));
        }
        Ok(())
    }

    pub(crate) fn update_root(
        &mut self,
        population: SourcePopulation,
        root: Hash32,
        now: u64,
    ) -> Result<Hash32, RegistryError> {
        self.check_root_update(population, &root)?;

        let trust = self.population_mut(population)?;
        let previous = trust.trusted_root;
        trust.trusted_root = root;
        trust.root_updated_at = now;

        info!("Trusted root updated for {}: {}", population, hex::encode(root));
        Ok(previous)
    }

    pub fn check_activation(
        &self,
        population: SourcePopulation,
        signer: &Address,
        active: bool,
    ) -> Result<(), RegistryError> {
        let trust = self.population(population)?;
        let record = trust
            .signers
            .get(signer)
            .ok_or(RegistryError::UnknownSigner { population, signer: *signer })?;
        if !active && record.active && trust.active_signer_count() == 1 {
            return Err(RegistryError::LastActiveSigner(population));
        }
        Ok(())
    }

    pub(crate) fn set_active(
        &mut self,
        population: SourcePopulation,
        signer: &Address,
        active: bool,
    ) -> Result<(), RegistryError> {
        self.check_activation(population, signer, active)?;

        if let Some(record) = self.population_mut(population)?.signers.get_mut(signer) {
            record.active = active;
        }
        info!("Signer {} of {} set active={}", signer, population, active);
        Ok(())
    }
}
