//! `cellsync sim`: deterministic simulation campaigns.
//!
//! `cellsync sim run` executes a campaign across many seeds.
//! `cellsync sim replay` replays one seed with its full operation trace.

use std::io::Write;

use anyhow::Result;
use cellsync_core::config::EffectiveConfig;
use cellsync_core::model::CellKind;
use cellsync_sim::campaign::{CampaignConfig, format_violation, replay_seed, run_campaign};
use cellsync_sim::{Outcome, TraceEvent};
use clap::{Args, Subcommand};
use serde::Serialize;

use crate::output::{OutputMode, pretty_kv, pretty_section, render_mode};

#[derive(Args, Debug)]
pub struct SimArgs {
    #[command(subcommand)]
    pub command: SimCommand,
}

#[derive(Subcommand, Debug)]
pub enum SimCommand {
    #[command(
        about = "Run a simulation campaign across multiple seeds",
        long_about = "Drive one cell through seeded interleavings of local and remote edits per seed,\n\
                      checking consistency, alias, dirty and no-echo invariants after every step.\n\
                      Defaults come from the [sim] section of .cellsync/config.toml.",
        after_help = "EXAMPLES:\n    # Run 100 seeds with defaults\n    cellsync sim run --seeds 100\n\n\
                      # Markdown cells, remote-heavy\n    cellsync sim run --kind markdown --remote-percent 80\n\n\
                      # Machine-readable output\n    cellsync sim run --format json"
    )]
    Run(SimRunArgs),

    #[command(
        about = "Replay a single seed with detailed trace output",
        after_help = "EXAMPLES:\n    # Replay seed 42\n    cellsync sim replay --seed 42\n\n\
                      # Include every operation\n    cellsync sim replay --seed 42 --trace"
    )]
    Replay(SimReplayArgs),
}

/// Parameters shared by both subcommands; unset values fall back to config.
#[derive(Args, Debug, Default)]
pub struct SimParams {
    /// Operations per seed.
    #[arg(long)]
    pub steps: Option<usize>,

    /// Share of remote operations (0-100).
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
    pub remote_percent: Option<u8>,

    /// Cell type to simulate.
    #[arg(long)]
    pub kind: Option<CellKind>,
}

#[derive(Args, Debug)]
pub struct SimRunArgs {
    /// Number of seeds to run.
    #[arg(long)]
    pub seeds: Option<u64>,

    /// Starting seed value.
    #[arg(long, default_value = "0")]
    pub seed_start: u64,

    #[command(flatten)]
    pub params: SimParams,
}

#[derive(Args, Debug)]
pub struct SimReplayArgs {
    #[arg(long)]
    pub seed: u64,

    /// Print every operation and its outcome.
    #[arg(long)]
    pub trace: bool,

    #[command(flatten)]
    pub params: SimParams,
}

fn campaign_config(seed_start: u64, seeds: Option<u64>, params: &SimParams, config: &EffectiveConfig) -> CampaignConfig {
    let sim = &config.project.sim;
    let seeds = seeds.unwrap_or(sim.seeds);
    CampaignConfig {
        seed_range: seed_start..seed_start.saturating_add(seeds),
        steps: params.steps.unwrap_or(sim.steps),
        remote_percent: params.remote_percent.unwrap_or(sim.remote_percent),
        cell_kind: params.kind.unwrap_or(sim.cell_kind),
    }
}

#[derive(Debug, Serialize)]
struct RunOutput {
    seeds_run: usize,
    seeds_passed: usize,
    seeds_failed: usize,
    first_failure: Option<u64>,
    interesting_states_reached: usize,
    rejected_ops: usize,
    all_passed: bool,
    steps: usize,
    remote_percent: u8,
    cell_kind: CellKind,
    failures: Vec<cellsync_sim::campaign::SeedFailure>,
}

#[derive(Debug, Serialize)]
struct ReplayOutput {
    seed: u64,
    steps: usize,
    applied: usize,
    rejected: usize,
    oracle_passed: bool,
    violations: Vec<String>,
    interesting_state_reached: bool,
    stats: cellsync_core::SyncStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    trace: Option<Vec<TraceEvent>>,
}

/// Execute `cellsync sim run`.
pub fn run_sim_run(args: &SimRunArgs, config: &EffectiveConfig, output: OutputMode) -> Result<()> {
    let campaign = campaign_config(args.seed_start, args.seeds, &args.params, config);
    let report = run_campaign(&campaign)?;

    let out = RunOutput {
        seeds_run: report.seeds_run,
        seeds_passed: report.seeds_passed,
        seeds_failed: report.failures.len(),
        first_failure: report.first_failure,
        interesting_states_reached: report.interesting_states_reached,
        rejected_ops: report.rejected_ops,
        all_passed: report.all_passed(),
        steps: campaign.steps,
        remote_percent: campaign.remote_percent,
        cell_kind: campaign.cell_kind,
        failures: report.failures,
    };

    render_mode(
        output,
        &out,
        |out, w| {
            writeln!(
                w,
                "campaign seeds_run={} steps={} remote_percent={} kind={}",
                out.seeds_run, out.steps, out.remote_percent, out.cell_kind
            )?;
            writeln!(
                w,
                "results passed={} failed={} interesting_states={} rejected_ops={} all_passed={}",
                out.seeds_passed,
                out.seeds_failed,
                out.interesting_states_reached,
                out.rejected_ops,
                out.all_passed
            )?;
            for failure in out.failures.iter().take(5) {
                writeln!(w, "failure seed={} violations={}", failure.seed, failure.violations.len())?;
            }
            if let Some(seed) = out.first_failure {
                writeln!(w, "hint replay_seed={seed}")?;
            }
            Ok(())
        },
        |out, w| {
            pretty_section(w, "Simulation Campaign")?;
            pretty_kv(w, "Seeds", out.seeds_run.to_string())?;
            pretty_kv(w, "Steps", out.steps.to_string())?;
            pretty_kv(w, "Remote", format!("{}%", out.remote_percent))?;
            pretty_kv(w, "Cell type", out.cell_kind.to_string())?;
            pretty_kv(
                w,
                "Results",
                format!(
                    "{} passed / {} failed ({} reconciling, {} rejected ops)",
                    out.seeds_passed, out.seeds_failed, out.interesting_states_reached, out.rejected_ops
                ),
            )?;
            match out.first_failure {
                None => pretty_kv(w, "Status", "all seeds passed"),
                Some(seed) => {
                    pretty_kv(w, "Status", format!("{} failures (first at seed {seed})", out.seeds_failed))?;
                    writeln!(w)?;
                    pretty_section(w, "Failure Samples")?;
                    for failure in out.failures.iter().take(5) {
                        writeln!(w, "seed {:<8} violations={}", failure.seed, failure.violations.len())?;
                        for violation in failure.violations.iter().take(3) {
                            writeln!(w, "  - {violation}")?;
                        }
                    }
                    writeln!(w)?;
                    pretty_kv(w, "Replay", format!("cellsync sim replay --seed {seed}"))
                }
            }
        },
    )?;

    // Exit code 1 on any failure for CI integration
    if !out.all_passed {
        std::process::exit(1);
    }
    Ok(())
}

/// Execute `cellsync sim replay`.
pub fn run_sim_replay(args: &SimReplayArgs, config: &EffectiveConfig, output: OutputMode) -> Result<()> {
    let campaign = campaign_config(args.seed, Some(1), &args.params, config);
    campaign.validate()?;
    let result = replay_seed(args.seed, &campaign)?;
    let rejected = result.rejected_ops();

    let out = ReplayOutput {
        seed: result.seed,
        steps: result.trace.len(),
        applied: result
            .trace
            .iter()
            .filter(|event| event.outcome == Outcome::Applied)
            .count(),
        rejected,
        oracle_passed: result.oracle.passed,
        violations: result.oracle.violations.iter().map(format_violation).collect(),
        interesting_state_reached: result.interesting_state_reached,
        stats: result.stats,
        trace: args.trace.then(|| result.trace.clone()),
    };

    render_mode(
        output,
        &out,
        |out, w| {
            writeln!(
                w,
                "replay seed={} steps={} applied={} rejected={} oracle_passed={} interesting_state_reached={}",
                out.seed, out.steps, out.applied, out.rejected, out.oracle_passed, out.interesting_state_reached
            )?;
            for violation in &out.violations {
                writeln!(w, "violation={violation}")?;
            }
            for event in out.trace.iter().flatten() {
                writeln!(w, "{}", trace_line(event))?;
            }
            Ok(())
        },
        |out, w| {
            pretty_section(w, &format!("Replay Seed {}", out.seed))?;
            pretty_kv(w, "Steps", out.steps.to_string())?;
            pretty_kv(w, "Applied", out.applied.to_string())?;
            pretty_kv(w, "Rejected", out.rejected.to_string())?;
            pretty_kv(w, "Shared writes", out.stats.local_to_shared.to_string())?;
            pretty_kv(w, "Remote applied", out.stats.shared_to_local.to_string())?;
            pretty_kv(w, "Reconciled", out.stats.reconciled.to_string())?;
            pretty_kv(w, "Oracle", if out.oracle_passed { "passed" } else { "FAILED" })?;
            for violation in &out.violations {
                writeln!(w, "  - {violation}")?;
            }
            if let Some(trace) = &out.trace {
                writeln!(w)?;
                pretty_section(w, "Trace")?;
                for event in trace {
                    writeln!(w, "{}", trace_line(event))?;
                }
            }
            Ok(())
        },
    )?;

    if !out.oracle_passed {
        std::process::exit(1);
    }
    Ok(())
}

fn trace_line(event: &TraceEvent) -> String {
    let op = serde_json::to_string(&event.op).unwrap_or_default();
    let outcome = match &event.outcome {
        Outcome::Applied => "applied".to_string(),
        Outcome::Rejected { code, .. } => format!("rejected[{code}]"),
        Outcome::Fatal { code, .. } => format!("fatal[{code}]"),
    };
    format!("{:>4} {:<6} {outcome:<16} {op}", event.step, format!("{:?}", event.actor).to_lowercase())
}
