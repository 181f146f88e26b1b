//! cellsync-sim library.
//!
//! Seeded random interleavings of local and remote edits against one
//! [`SyncEngine`], checked step by step by the [`oracle`].
//!
//! # Conventions
//!
//! - **Errors**: Use `anyhow::Result` for return types. Engine errors that are
//!   not contract breaches are recorded in the trace as rejected operations.
//! - **Logging**: Use `tracing` macros (`info!` per run, `debug!` per step).

pub mod campaign;
pub mod ops;
pub mod oracle;
pub mod rng;

use anyhow::{Result, bail};
use cellsync_core::config::SimConfig;
use cellsync_core::model::CellKind;
use cellsync_core::shared::{MemorySharedCell, MutationCounters};
use cellsync_core::{CellRecord, SyncEngine, SyncStats};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::ops::{Actor, CellOp, OpGenerator};
use crate::oracle::{CellOracle, DirtyModel, InvariantViolation, OracleResult, StepBaseline};
use crate::rng::DeterministicRng;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub seed: u64,
    pub steps: usize,
    /// Share of steps performed by the remote peer, 0..=100.
    pub remote_percent: u8,
    pub cell_kind: CellKind,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self::from_sim_config(0, &SimConfig::default())
    }
}

impl SimulationConfig {
    #[must_use]
    pub const fn from_sim_config(seed: u64, config: &SimConfig) -> Self {
        Self {
            seed,
            steps: config.steps,
            remote_percent: config.remote_percent,
            cell_kind: config.cell_kind,
        }
    }

    /// # Errors
    ///
    /// Returns an error if any parameter is out of range.
    pub fn validate(&self) -> Result<()> {
        if self.steps == 0 {
            bail!("steps must be > 0");
        }
        if self.remote_percent > 100 {
            bail!("remote_percent must be <= 100, got {}", self.remote_percent);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Applied,
    /// The engine refused the operation without mutating anything.
    Rejected { code: String, message: String },
    /// The engine reported a contract breach; the run stops here.
    Fatal { code: String, message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEvent {
    pub step: usize,
    pub actor: Actor,
    pub op: CellOp,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationResult {
    pub seed: u64,
    pub trace: Vec<TraceEvent>,
    pub oracle: OracleResult,
    pub stats: SyncStats,
    pub counters: MutationCounters,
    /// The cell in notebook form after the last step.
    pub final_cell: Value,
    /// At least one remote change needed a reconciliation write-back.
    pub interesting_state_reached: bool,
}

impl SimulationResult {
    #[must_use]
    pub fn rejected_ops(&self) -> usize {
        self.trace
            .iter()
            .filter(|event| matches!(event.outcome, Outcome::Rejected { .. }))
            .count()
    }
}

/// Drives one engine through `steps` seeded operations.
#[derive(Debug)]
pub struct Simulator {
    config: SimulationConfig,
    rng: DeterministicRng,
    generator: OpGenerator,
    engine: SyncEngine<MemorySharedCell>,
    model: DirtyModel,
}

impl Simulator {
    /// # Errors
    ///
    /// Returns an error for an invalid config or if the engine cannot be
    /// constructed.
    pub fn new(config: SimulationConfig) -> Result<Self> {
        config.validate()?;
        let id = format!("sim-{}", config.seed);
        let cell = CellRecord::with_id(config.cell_kind, id.clone());
        let engine = SyncEngine::new(cell, MemorySharedCell::new(id))?;
        let model = DirtyModel::from_engine(&engine);
        Ok(Self {
            rng: DeterministicRng::new(config.seed),
            generator: OpGenerator::new(config.cell_kind, config.remote_percent),
            config,
            engine,
            model,
        })
    }

    #[must_use]
    pub const fn engine(&self) -> &SyncEngine<MemorySharedCell> {
        &self.engine
    }

    /// Run all steps, checking the oracle after each one.
    ///
    /// # Errors
    ///
    /// Returns an error if the final cell cannot be serialized.
    pub fn run(&mut self) -> Result<SimulationResult> {
        let mut trace = Vec::with_capacity(self.config.steps);
        let mut oracle = CellOracle::check_consistency(0, &self.engine);

        for step in 1..=self.config.steps {
            let op = self.generator.next_op(&mut self.rng, &self.engine);
            let baseline = StepBaseline::capture(&self.engine);

            let outcome = match op.apply(&mut self.engine) {
                Ok(()) => Outcome::Applied,
                Err(err) if err.is_fatal() => Outcome::Fatal {
                    code: err.code().code().to_string(),
                    message: err.to_string(),
                },
                Err(err) => Outcome::Rejected {
                    code: err.code().code().to_string(),
                    message: err.to_string(),
                },
            };
            debug!(seed = self.config.seed, step, ?op, ?outcome, "sim step");

            if let Outcome::Fatal { message, .. } = &outcome {
                oracle = oracle.merge(OracleResult::fail(vec![InvariantViolation::Fatal {
                    step,
                    message: message.clone(),
                }]));
                trace.push(TraceEvent {
                    step,
                    actor: op.actor(),
                    op,
                    outcome,
                });
                break;
            }

            self.model.observe(baseline.count, &self.engine);
            oracle = oracle.merge(CellOracle::check_step(
                step,
                &op,
                &baseline,
                &self.model,
                &self.engine,
            ));
            trace.push(TraceEvent {
                step,
                actor: op.actor(),
                op,
                outcome,
            });
        }

        let stats = self.engine.stats();
        let final_cell = self.engine.cell().to_notebook().to_json()?;
        info!(
            seed = self.config.seed,
            steps = trace.len(),
            passed = oracle.passed,
            reconciled = stats.reconciled,
            "simulation finished"
        );

        Ok(SimulationResult {
            seed: self.config.seed,
            trace,
            oracle,
            stats,
            counters: self.engine.shared().counters(),
            final_cell,
            interesting_state_reached: stats.reconciled > 0,
        })
    }
}
