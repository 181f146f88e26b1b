//! Campaign runner: many seeds, one report.
//!
//! Executes a seed range with shared parameters, collecting pass/fail results
//! and the first failing seed for replay.

use std::ops::Range;

use anyhow::{Result, bail};
use cellsync_core::config::SimConfig;
use cellsync_core::model::CellKind;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::oracle::InvariantViolation;
use crate::{SimulationConfig, SimulationResult, Simulator};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignConfig {
    /// Range of seeds to execute, e.g., `0..100`.
    pub seed_range: Range<u64>,
    /// Operations per seed.
    pub steps: usize,
    /// Share of remote operations (percent, 0-100).
    pub remote_percent: u8,
    pub cell_kind: CellKind,
}

impl Default for CampaignConfig {
    fn default() -> Self {
        Self::from_sim_config(&SimConfig::default())
    }
}

impl CampaignConfig {
    /// Campaign over seeds `0..config.seeds`.
    #[must_use]
    pub const fn from_sim_config(config: &SimConfig) -> Self {
        Self {
            seed_range: 0..config.seeds,
            steps: config.steps,
            remote_percent: config.remote_percent,
            cell_kind: config.cell_kind,
        }
    }

    #[must_use]
    pub const fn sim_config_for_seed(&self, seed: u64) -> SimulationConfig {
        SimulationConfig {
            seed,
            steps: self.steps,
            remote_percent: self.remote_percent,
            cell_kind: self.cell_kind,
        }
    }

    /// Validate configuration before running.
    ///
    /// # Errors
    ///
    /// Returns an error if any parameter is out of valid range.
    pub fn validate(&self) -> Result<()> {
        if self.seed_range.is_empty() {
            bail!("seed_range must not be empty");
        }
        self.sim_config_for_seed(self.seed_range.start).validate()
    }
}

/// Failure details for a single seed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedFailure {
    pub seed: u64,
    pub violations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignReport {
    pub seeds_run: usize,
    pub seeds_passed: usize,
    /// First seed that failed (for prioritized replay).
    pub first_failure: Option<u64>,
    pub failures: Vec<SeedFailure>,
    /// Seeds in which a remote change needed a reconciliation write-back.
    pub interesting_states_reached: usize,
    /// Operations the engine refused without mutating state, across all seeds.
    pub rejected_ops: usize,
}

impl CampaignReport {
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Run a full campaign across all seeds in the config.
///
/// # Errors
///
/// Returns an error if config validation fails or a simulation encounters
/// an internal error.
pub fn run_campaign(config: &CampaignConfig) -> Result<CampaignReport> {
    config.validate()?;

    let mut report = CampaignReport {
        seeds_run: 0,
        seeds_passed: 0,
        first_failure: None,
        failures: Vec::new(),
        interesting_states_reached: 0,
        rejected_ops: 0,
    };

    for seed in config.seed_range.clone() {
        report.seeds_run += 1;
        let result = replay_seed(seed, config)?;
        report.rejected_ops += result.rejected_ops();
        if result.interesting_state_reached {
            report.interesting_states_reached += 1;
        }

        if result.oracle.passed {
            report.seeds_passed += 1;
        } else {
            warn!(seed, violations = result.oracle.violations.len(), "seed failed");
            report.first_failure.get_or_insert(seed);
            report.failures.push(SeedFailure {
                seed,
                violations: result.oracle.violations.iter().map(format_violation).collect(),
            });
        }
    }

    Ok(report)
}

/// Run a single seed and return Ok(()) on pass, Err(violations) on failure.
///
/// # Errors
///
/// Returns an `anyhow::Error` if the simulation itself fails (invalid
/// config, unserializable cell). The inner `Result` distinguishes pass from
/// invariant violations.
pub fn run_single_seed(
    seed: u64,
    config: &CampaignConfig,
) -> Result<std::result::Result<(), Vec<InvariantViolation>>> {
    let result = replay_seed(seed, config)?;
    if result.oracle.passed {
        Ok(Ok(()))
    } else {
        Ok(Err(result.oracle.violations))
    }
}

/// Replay a single seed with its full trace for debugging.
///
/// # Errors
///
/// Returns an error when config validation or simulation fails.
pub fn replay_seed(seed: u64, config: &CampaignConfig) -> Result<SimulationResult> {
    let mut simulator = Simulator::new(config.sim_config_for_seed(seed))?;
    simulator.run()
}

/// Format an invariant violation into a human-readable string.
#[must_use]
pub fn format_violation(v: &InvariantViolation) -> String {
    match v {
        InvariantViolation::Consistency {
            step,
            field,
            local,
            shared,
        } => format!("Consistency: step {step} {field:?} diverged (local={local}, shared={shared})"),
        InvariantViolation::Alias { step, metadata } => {
            format!("Alias: step {step} collapsed/outputs_hidden disagree in {metadata}")
        }
        InvariantViolation::Dirty {
            step,
            expected,
            actual,
        } => format!("Dirty: step {step} expected is_dirty={expected}, got {actual}"),
        InvariantViolation::Echo { step, detail } => format!("Echo: step {step} {detail}"),
        InvariantViolation::Fatal { step, message } => format!("Fatal: step {step} {message}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small(kind: CellKind) -> CampaignConfig {
        CampaignConfig {
            seed_range: 0..10,
            steps: 80,
            remote_percent: 40,
            cell_kind: kind,
        }
    }

    #[test]
    fn campaign_config_default_is_valid() {
        assert!(CampaignConfig::default().validate().is_ok());
    }

    #[test]
    fn campaign_config_empty_seed_range_rejected() {
        let config = CampaignConfig {
            seed_range: 5..5,
            ..CampaignConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn campaign_config_zero_steps_rejected() {
        let config = CampaignConfig {
            steps: 0,
            ..CampaignConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn sim_config_for_seed_uses_correct_seed() {
        let config = CampaignConfig::default();
        let sim = config.sim_config_for_seed(42);
        assert_eq!(sim.seed, 42);
        assert_eq!(sim.steps, config.steps);
        assert_eq!(sim.cell_kind, config.cell_kind);
    }

    #[test]
    fn run_single_seed_passes() {
        let result = run_single_seed(0, &small(CellKind::Code)).expect("sim should not error");
        assert!(result.is_ok(), "seed 0 should pass: {result:?}");
    }

    #[test]
    fn run_campaign_all_seeds_pass() {
        for kind in CellKind::ALL {
            let report = run_campaign(&small(kind)).expect("campaign");
            assert_eq!(report.seeds_run, 10);
            assert!(report.all_passed(), "{kind}: {:?}", report.failures);
            assert_eq!(report.first_failure, None);
        }
    }

    #[test]
    fn code_campaign_reaches_reconciliation() {
        let report = run_campaign(&small(CellKind::Code)).expect("campaign");
        assert!(report.interesting_states_reached > 0);
        assert!(report.rejected_ops > 0);
    }

    #[test]
    fn replay_is_deterministic() {
        let config = small(CellKind::Code);
        let a = replay_seed(4, &config).expect("replay");
        let b = replay_seed(4, &config).expect("replay");
        assert_eq!(a.trace, b.trace);
        assert_eq!(a.final_cell, b.final_cell);
    }

    #[test]
    fn report_serializes() {
        let report = run_campaign(&CampaignConfig {
            seed_range: 0..2,
            ..small(CellKind::Raw)
        })
        .expect("campaign");
        let json = serde_json::to_value(&report).expect("serialize");
        assert_eq!(json["seeds_run"], 2);
        assert!(json["failures"].as_array().is_some());
    }

    #[test]
    fn format_violation_names_the_invariant() {
        let text = format_violation(&InvariantViolation::Dirty {
            step: 3,
            expected: true,
            actual: false,
        });
        assert!(text.starts_with("Dirty: step 3"));
    }
}
