//! `cellsync normalize`: round-trip every cell through the cell model.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use cellsync_core::config::EffectiveConfig;
use clap::Args;
use serde::Serialize;
use tracing::info;

use crate::notebook::NotebookDocument;
use crate::output::{OutputMode, pretty_kv, render_mode};

#[derive(Args, Debug)]
pub struct NormalizeArgs {
    /// Notebook to normalize.
    pub path: PathBuf,

    /// Rewrite the file instead of printing the normalized notebook.
    #[arg(short, long)]
    pub in_place: bool,

    /// Exit with status 1 when normalization would change the file.
    #[arg(long, conflicts_with = "in_place")]
    pub check: bool,
}

#[derive(Debug, Serialize)]
struct NormalizeReport {
    path: String,
    cells: usize,
    changed: bool,
    written: bool,
}

pub fn run_normalize(args: &NormalizeArgs, config: &EffectiveConfig, output: OutputMode) -> Result<()> {
    let original = fs::read_to_string(&args.path)
        .with_context(|| format!("Failed to read {}", args.path.display()))?;
    let document = NotebookDocument::parse(&original)
        .with_context(|| format!("Failed to parse {}", args.path.display()))?;
    let normalized = document.normalized(config.project.cells.default_kind)?;
    let text = normalized.to_ipynb_string()?;
    let changed = text != original;

    if !args.in_place && !args.check {
        std::io::stdout().lock().write_all(text.as_bytes())?;
        return Ok(());
    }

    if args.in_place && changed {
        write_atomically(&args.path, &text)?;
        info!(path = %args.path.display(), cells = normalized.cells.len(), "notebook normalized");
    }

    let report = NormalizeReport {
        path: args.path.display().to_string(),
        cells: normalized.cells.len(),
        changed,
        written: args.in_place && changed,
    };
    render_mode(
        output,
        &report,
        |r, w| writeln!(w, "path={} cells={} changed={} written={}", r.path, r.cells, r.changed, r.written),
        |r, w| {
            pretty_kv(w, "Notebook", &r.path)?;
            pretty_kv(w, "Cells", r.cells.to_string())?;
            let status = match (r.changed, r.written) {
                (false, _) => "already normalized",
                (true, true) => "rewritten",
                (true, false) => "would change",
            };
            pretty_kv(w, "Status", status)
        },
    )?;

    if args.check && changed {
        std::process::exit(1);
    }
    Ok(())
}

/// Write through a sibling temp file so a crash never leaves half a notebook.
fn write_atomically(path: &Path, text: &str) -> Result<()> {
    let tmp = path.with_extension("ipynb.tmp");
    fs::write(&tmp, text).with_context(|| format!("Failed to write {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}
