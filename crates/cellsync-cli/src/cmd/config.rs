//! `cellsync config`: show the effective configuration.

use std::io::Write;

use anyhow::Result;
use cellsync_core::config::EffectiveConfig;
use clap::Args;

use crate::output::{OutputMode, pretty_kv, pretty_section, render_mode};

#[derive(Args, Debug)]
pub struct ConfigArgs {}

pub fn run_config(_args: &ConfigArgs, config: &EffectiveConfig, output: OutputMode) -> Result<()> {
    render_mode(
        output,
        config,
        |value, w| {
            writeln!(w, "resolved_output={}", value.resolved_output)?;
            writeln!(w, "cells.default_kind={}", value.project.cells.default_kind)?;
            writeln!(w, "sim.seeds={}", value.project.sim.seeds)?;
            writeln!(w, "sim.steps={}", value.project.sim.steps)?;
            writeln!(w, "sim.remote_percent={}", value.project.sim.remote_percent)?;
            writeln!(w, "sim.cell_kind={}", value.project.sim.cell_kind)?;
            writeln!(w, "user.output={}", value.user.output.as_deref().unwrap_or("-"))
        },
        |value, w| {
            pretty_section(w, "Effective Configuration")?;
            pretty_kv(w, "Output", &value.resolved_output)?;
            pretty_kv(w, "Default kind", value.project.cells.default_kind.to_string())?;
            pretty_kv(
                w,
                "Simulation",
                format!(
                    "{} seeds x {} steps, {}% remote, {} cells",
                    value.project.sim.seeds,
                    value.project.sim.steps,
                    value.project.sim.remote_percent,
                    value.project.sim.cell_kind
                ),
            )
        },
    )
}
