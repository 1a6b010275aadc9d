// ANOMALY DETECTOR / CIRCUIT BREAKER
// Rolling traffic metrics inspected at three cost tiers; a global halt flag
// with timed auto-recovery and a 2-of-3 resume vote.
//
// SAFETY INVARIANTS:
// 1. Detection is deterministic: same call sequence, same halts
// 2. A trigger never reverts the call that tripped it; only later calls are gated
// 3. A second trigger while halted keeps the original triggered_at
// 4. Rolling windows reset lazily; "has it expired" is a pure function of now
// 5. Manual halt is independent of automatic halt and never cleared by votes
// 6. Every halt and every clearance is appended to the incident trail
// 7. Each automatic halt gets a fresh epoch; resume votes bind to it

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use trinity_crypto::{keccak256_concat, Hash32};

use crate::population::{BlockContext, SourcePopulation, QUORUM_THRESHOLD};
use crate::quorum_proposal::{ProposalError, ProposalStatus, QuorumProposal};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BreakerError {
    #[error("System halted ({0:?})")]
    Halted(HaltKind),

    #[error("No automatic halt is active")]
    NotHalted,

    #[error("Resume vote is for halt epoch {voted_for}, current halt epoch is {current}")]
    StaleVote { voted_for: u64, current: u64 },

    #[error("Manual halt already active")]
    AlreadyManuallyHalted,

    #[error("No manual halt is active")]
    NotManuallyHalted,

    #[error("Invalid anomaly parameters: {0}")]
    InvalidParams(String),

    #[error(transparent)]
    Proposal(#[from] ProposalError),
}

/// Which flag keeps the gate closed
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum HaltKind {
    Automatic,
    Manual,
    Both,
}

/// Detection thresholds and window lengths
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AnomalyParams {
    /// Tier 1: operations allowed in one height unit
    pub max_ops_per_height: u32,

    /// Tier 2 runs on every Nth operation and every Nth proof
    pub tier2_interval: u64,

    /// Tier 2: amount above this multiple of the rolling average halts
    pub volume_spike_multiple: u128,

    /// Tier 2: failed-proof percentage above this halts
    pub failure_rate_pct: u64,

    /// Tier 2: failure rate ignored below this many proofs
    pub min_proof_sample: u64,

    /// Seconds
    pub volume_window_secs: u64,

    /// Seconds
    pub proof_window_secs: u64,

    /// Tier 3 runs once per this many height units
    pub tier3_interval: u64,

    /// Seconds after trigger at which an automatic halt self-clears
    pub auto_recovery_secs: u64,
}

impl Default for AnomalyParams {
    fn default() -> Self {
        AnomalyParams {
            max_ops_per_height: 10,
            tier2_interval: 10,
            volume_spike_multiple: 5,
            failure_rate_pct: 20,
            min_proof_sample: 10,
            volume_window_secs: 24 * 3600,
            proof_window_secs: 3600,
            tier3_interval: 100,
            auto_recovery_secs: 4 * 3600,
        }
    }
}

impl AnomalyParams {
    pub fn validate(&self) -> Result<(), BreakerError> {
        let zero = [
            ("max_ops_per_height", self.max_ops_per_height as u64),
            ("tier2_interval", self.tier2_interval),
            ("volume_window_secs", self.volume_window_secs),
            ("proof_window_secs", self.proof_window_secs),
            ("tier3_interval", self.tier3_interval),
            ("auto_recovery_secs", self.auto_recovery_secs),
        ];
        if let Some((name, _)) = zero.iter().find(|(_, value)| *value == 0) {
            return Err(BreakerError::InvalidParams(format!("{} must be non-zero", name)));
        }
        if self.volume_spike_multiple < 2 {
            return Err(BreakerError::InvalidParams(
                "volume_spike_multiple must be at least 2".to_string(),
            ));
        }
        if self.failure_rate_pct == 0 || self.failure_rate_pct >= 100 {
            return Err(BreakerError::InvalidParams(
                "failure_rate_pct must be in 1..100".to_string(),
            ));
        }
        Ok(())
    }
}

/// Rolling counters
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnomalyMetrics {
    pub volume_in_window: u128,
    pub ops_in_window: u64,
    pub window_start: u64,

    pub failed_proofs: u64,
    pub total_proofs: u64,
    pub proof_window_start: u64,

    pub ops_in_current_block: u32,
    pub last_block_marker: u64,

    /// Lifetime counters driving the tier-2 cadence
    pub operation_counter: u64,
    pub proof_counter: u64,

    pub last_tier3_height: u64,
}

impl AnomalyMetrics {
    fn starting_at(ctx: BlockContext) -> Self {
        AnomalyMetrics {
            window_start: ctx.timestamp,
            proof_window_start: ctx.timestamp,
            last_block_marker: ctx.height,
            last_tier3_height: ctx.height,
            ..Default::default()
        }
    }

    pub fn volume_window_expired(&self, now: u64, params: &AnomalyParams) -> bool {
        now >= self.window_start.saturating_add(params.volume_window_secs)
    }

    pub fn proof_window_expired(&self, now: u64, params: &AnomalyParams) -> bool {
        now >= self.proof_window_start.saturating_add(params.proof_window_secs)
    }

    pub fn tier3_due(&self, height: u64, params: &AnomalyParams) -> bool {
        height >= self.last_tier3_height.saturating_add(params.tier3_interval)
    }

    /// Average operation size in the current window
    pub fn rolling_average(&self) -> Option<u128> {
        if self.ops_in_window == 0 {
            None
        } else {
            Some(self.volume_in_window / self.ops_in_window as u128)
        }
    }

    pub fn failure_rate_exceeded(&self, params: &AnomalyParams) -> bool {
        let failed_pct = (self.failed_proofs as u128) * 100;
        let limit = (self.total_proofs as u128) * params.failure_rate_pct as u128;
        self.total_proofs >= params.min_proof_sample && failed_pct > limit
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum HaltReason {
    OperationBurst { height: u64, operations: u32 },
    VolumeSpike { amount: u128, rolling_average: u128 },
    FailureRate { failed: u64, total: u64 },
    Manual(String),
}

impl HaltReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            HaltReason::OperationBurst { .. } => "OPERATION_BURST",
            HaltReason::VolumeSpike { .. } => "VOLUME_SPIKE",
            HaltReason::FailureRate { .. } => "FAILURE_RATE",
            HaltReason::Manual(_) => "MANUAL",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ClearPath {
    AutoRecovery,
    ResumeVote,
    Operator,
}

/// Incident trail entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HaltRecord {
    pub reason: HaltReason,
    pub triggered_at: u64,
    pub height: u64,
    pub cleared_at: Option<u64>,
    pub cleared_by: Option<ClearPath>,
}

/// Payload of a resume motion: the halt being voted on
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResumeMotion {
    pub halt_epoch: u64,
}

fn resume_motion_id(halt_epoch: u64) -> Hash32 {
    keccak256_concat(&[b"resume".as_slice(), halt_epoch.to_be_bytes().as_slice()])
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CircuitBreakerState {
    pub automatic_halt: bool,
    pub manual_halt: bool,

    /// Number of automatic halts ever triggered; the current one while halted
    pub halt_epoch: u64,

    pub triggered_at: Option<u64>,
    pub reason: Option<HaltReason>,
    pub manual_reason: Option<String>,
    resume: Option<QuorumProposal<ResumeMotion>>,
}

impl CircuitBreakerState {
    pub fn resume_votes(&self) -> Vec<SourcePopulation> {
        self.resume
            .as_ref()
            .map(|motion| motion.confirmations().iter().copied().collect())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResumeOutcome {
    /// Vote counted, halt still active
    Recorded { votes: usize },
    /// Quorum reached, automatic halt cleared
    Resumed,
}

/// Read-only view for status queries
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BreakerStatus {
    pub halted: bool,
    pub automatic_halt: bool,
    pub manual_halt: bool,

    /// Epoch resume votes must name
    pub halt_epoch: Option<u64>,

    pub triggered_at: Option<u64>,
    pub reason: Option<HaltReason>,
    pub manual_reason: Option<String>,
    pub resume_votes: Vec<SourcePopulation>,
    pub auto_recovery_at: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreaker {
    params: AnomalyParams,
    state: CircuitBreakerState,
    metrics: AnomalyMetrics,
    incidents: Vec<HaltRecord>,
}

impl CircuitBreaker {
    pub fn new(params: AnomalyParams, genesis: BlockContext) -> Result<Self, BreakerError> {
        params.validate()?;
        info!(
            "Circuit breaker armed: {} ops/height, tier-2 every {}, spike x{}, failure {}%",
            params.max_ops_per_height,
            params.tier2_interval,
            params.volume_spike_multiple,
            params.failure_rate_pct
        );
        Ok(CircuitBreaker {
            params,
            state: CircuitBreakerState::default(),
            metrics: AnomalyMetrics::starting_at(genesis),
            incidents: Vec::new(),
        })
    }

    pub fn params(&self) -> &AnomalyParams {
        &self.params
    }

    pub fn state(&self) -> &CircuitBreakerState {
        &self.state
    }

    pub fn metrics(&self) -> &AnomalyMetrics {
        &self.metrics
    }

    pub fn incidents(&self) -> &[HaltRecord] {
        &self.incidents
    }

    fn auto_recovery_at(&self) -> Option<u64> {
        match (self.state.automatic_halt, self.state.triggered_at) {
            (true, Some(at)) => Some(at.saturating_add(self.params.auto_recovery_secs)),
            _ => None,
        }
    }

    /// Automatic halt still in force at `now` (accounts for pending auto-recovery)
    pub fn automatic_halt_active_at(&self, now: u64) -> bool {
        match self.auto_recovery_at() {
            Some(recovers_at) => now < recovers_at,
            None => false,
        }
    }

    pub fn is_halted_at(&self, now: u64) -> bool {
        self.state.manual_halt || self.automatic_halt_active_at(now)
    }

    /// Pure gate check for state-changing calls
    pub fn check_gate(&self, now: u64) -> Result<(), BreakerError> {
        match (self.automatic_halt_active_at(now), self.state.manual_halt) {
            (false, false) => Ok(()),
            (true, false) => Err(BreakerError::Halted(HaltKind::Automatic)),
            (false, true) => Err(BreakerError::Halted(HaltKind::Manual)),
            (true, true) => Err(BreakerError::Halted(HaltKind::Both)),
        }
    }

    /// Apply lazy housekeeping due at `ctx`: auto-recovery and tier-3 resets.
    /// Idempotent for a fixed `ctx`. Returns true when the tier-3 pass ran.
    pub fn refresh(&mut self, ctx: BlockContext) -> bool {
        if self.state.automatic_halt && !self.automatic_halt_active_at(ctx.timestamp) {
            info!("Automatic halt auto-recovered at {}", ctx.timestamp);
            self.clear_automatic(ctx.timestamp, ClearPath::AutoRecovery);
        }

        if self.metrics.tier3_due(ctx.height, &self.params) {
            if self.metrics.volume_window_expired(ctx.timestamp, &self.params) {
                debug!("Volume window reset at {}", ctx.timestamp);
                self.metrics.volume_in_window = 0;
                self.metrics.ops_in_window = 0;
                self.metrics.window_start = ctx.timestamp;
            }
            if self.metrics.proof_window_expired(ctx.timestamp, &self.params) {
                debug!("Proof window reset at {}", ctx.timestamp);
                self.metrics.failed_proofs = 0;
                self.metrics.total_proofs = 0;
                self.metrics.proof_window_start = ctx.timestamp;
            }
            self.metrics.last_tier3_height = ctx.height;
            return true;
        }
        false
    }

    /// Record an admitted operation. Returns the reason if this call tripped the breaker.
    pub fn observe_operation(&mut self, ctx: BlockContext, amount: u128) -> Option<HaltReason> {
        let mut tripped = None;

        // Tier 1
        if ctx.height != self.metrics.last_block_marker {
            self.metrics.last_block_marker = ctx.height;
            self.metrics.ops_in_current_block = 0;
        }
        self.metrics.ops_in_current_block = self.metrics.ops_in_current_block.saturating_add(1);
        if self.metrics.ops_in_current_block > self.params.max_ops_per_height {
            tripped = self.trigger(
                HaltReason::OperationBurst {
                    height: ctx.height,
                    operations: self.metrics.ops_in_current_block,
                },
                ctx,
            );
        }

        // Tier 2
        self.metrics.operation_counter = self.metrics.operation_counter.saturating_add(1);
        if self.metrics.operation_counter % self.params.tier2_interval == 0 {
            if let Some(average) = self.metrics.rolling_average() {
                if amount > average.saturating_mul(self.params.volume_spike_multiple) {
                    let reason = HaltReason::VolumeSpike {
                        amount,
                        rolling_average: average,
                    };
                    tripped = self.trigger(reason, ctx).or(tripped);
                }
            }
        }

        self.metrics.volume_in_window = self.metrics.volume_in_window.saturating_add(amount);
        self.metrics.ops_in_window = self.metrics.ops_in_window.saturating_add(1);

        tripped
    }

    /// Record a verified proof (valid or cryptographically failing).
    pub fn observe_proof(&mut self, ctx: BlockContext, valid: bool) -> Option<HaltReason> {
        self.metrics.proof_counter = self.metrics.proof_counter.saturating_add(1);
        self.metrics.total_proofs = self.metrics.total_proofs.saturating_add(1);
        if !valid {
            self.metrics.failed_proofs = self.metrics.failed_proofs.saturating_add(1);
        }

        if self.metrics.proof_counter % self.params.tier2_interval == 0
            && self.metrics.failure_rate_exceeded(&self.params)
        {
            let reason = HaltReason::FailureRate {
                failed: self.metrics.failed_proofs,
                total: self.metrics.total_proofs,
            };
            return self.trigger(reason, ctx);
        }
        None
    }

    fn trigger(&mut self, reason: HaltReason, ctx: BlockContext) -> Option<HaltReason> {
        if self.state.automatic_halt {
            debug!("{} detected while already halted; keeping original trigger", reason.as_str());
            return None;
        }

        warn!(
            "CIRCUIT BREAKER TRIPPED: {} at height {} ({:?})",
            reason.as_str(),
            ctx.height,
            reason
        );
        self.state.automatic_halt = true;
        self.state.halt_epoch = self.state.halt_epoch.saturating_add(1);
        self.state.triggered_at = Some(ctx.timestamp);
        self.state.reason = Some(reason.clone());
        self.state.resume = None;
        self.incidents.push(HaltRecord {
            reason: reason.clone(),
            triggered_at: ctx.timestamp,
            height: ctx.height,
            cleared_at: None,
            cleared_by: None,
        });
        Some(reason)
    }

    fn clear_automatic(&mut self, now: u64, path: ClearPath) {
        let triggered_at = self.state.triggered_at;
        self.state.automatic_halt = false;
        self.state.triggered_at = None;
        self.state.reason = None;
        self.state.resume = None;

        let open_automatic = |r: &&mut HaltRecord| {
            !matches!(r.reason, HaltReason::Manual(_))
                && Some(r.triggered_at) == triggered_at
                && r.cleared_at.is_none()
        };
        if let Some(record) = self.incidents.iter_mut().rev().find(open_automatic) {
            record.cleared_at = Some(now);
            record.cleared_by = Some(path);
        }
    }

    /// Check an authenticated resume vote without recording it
    pub fn check_resume_vote(&self, voted_for: u64, now: u64) -> Result<(), BreakerError> {
        if !self.automatic_halt_active_at(now) {
            return Err(BreakerError::NotHalted);
        }
        let current = self.state.halt_epoch;
        if voted_for != current {
            return Err(BreakerError::StaleVote { voted_for, current });
        }
        Ok(())
    }

    /// Count an authenticated resume vote from `population` for halt epoch
    /// `voted_for`. A population voting twice counts once.
    pub fn submit_resume_vote(
        &mut self,
        population: SourcePopulation,
        voted_for: u64,
        ctx: BlockContext,
    ) -> Result<ResumeOutcome, BreakerError> {
        self.check_resume_vote(voted_for, ctx.timestamp)?;

        let status = match self.state.resume.as_mut() {
            Some(motion) => motion.confirm(population, ctx.timestamp)?,
            None => {
                let motion = QuorumProposal::open(
                    resume_motion_id(voted_for),
                    ResumeMotion { halt_epoch: voted_for },
                    population,
                    ctx.timestamp,
                    None,
                    QUORUM_THRESHOLD,
                )?;
                let status = motion.status();
                self.state.resume = Some(motion);
                status
            }
        };

        if status == ProposalStatus::Approved {
            info!("Resume quorum reached ({} voted last); automatic halt cleared", population);
            self.clear_automatic(ctx.timestamp, ClearPath::ResumeVote);
            return Ok(ResumeOutcome::Resumed);
        }

        let votes = self.state.resume.as_ref().map(|m| m.confirmation_count()).unwrap_or(0);
        info!("Resume vote from {} recorded ({}/{})", population, votes, QUORUM_THRESHOLD);
        Ok(ResumeOutcome::Recorded { votes })
    }

    pub fn manual_halt(&mut self, reason: String, ctx: BlockContext) -> Result<(), BreakerError> {
        if self.state.manual_halt {
            return Err(BreakerError::AlreadyManuallyHalted);
        }
        warn!("MANUAL HALT at height {}: {}", ctx.height, reason);
        self.state.manual_halt = true;
        self.state.manual_reason = Some(reason.clone());
        self.incidents.push(HaltRecord {
            reason: HaltReason::Manual(reason),
            triggered_at: ctx.timestamp,
            height: ctx.height,
            cleared_at: None,
            cleared_by: None,
        });
        Ok(())
    }

    /// Clear the manual halt. An automatic halt, if any, stays in force.
    pub fn manual_resume(&mut self, ctx: BlockContext) -> Result<(), BreakerError> {
        if !self.state.manual_halt {
            return Err(BreakerError::NotManuallyHalted);
        }
        self.state.manual_halt = false;
        self.state.manual_reason = None;
        if let Some(record) = self
            .incidents
            .iter_mut()
            .rev()
            .find(|r| matches!(r.reason, HaltReason::Manual(_)) && r.cleared_at.is_none())
        {
            record.cleared_at = Some(ctx.timestamp);
            record.cleared_by = Some(ClearPath::Operator);
        }
        info!("Manual halt cleared at height {}", ctx.height);
        Ok(())
    }

    pub fn status(&self, now: u64) -> BreakerStatus {
        let automatic = self.automatic_halt_active_at(now);
        BreakerStatus {
            halted: self.is_halted_at(now),
            automatic_halt: automatic,
            manual_halt: self.state.manual_halt,
            halt_epoch: if automatic { Some(self.state.halt_epoch) } else { None },
            triggered_at: if automatic { self.state.triggered_at } else { None },
            reason: if automatic { self.state.reason.clone() } else { None },
            manual_reason: self.state.manual_reason.clone(),
            resume_votes: if automatic { self.state.resume_votes() } else { Vec::new() },
            auto_recovery_at: if automatic { self.auto_recovery_at() } else { None },
        }
    }
}
