//! `cellsync inspect`: per-cell summary of a notebook.

use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::Result;
use cellsync_core::config::EffectiveConfig;
use cellsync_core::CellRecord;
use cellsync_core::execution::{ExecutionCount, ExecutionState};
use cellsync_core::metadata::alias;
use cellsync_core::model::{Attachments, CellKind};
use cellsync_core::outputs::OutputLedger;
use clap::Args;
use serde::Serialize;
use serde_json::Value;

use crate::notebook::NotebookDocument;
use crate::output::{OutputMode, Renderable, pretty_kv, pretty_rule, render_list};

#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Notebook to inspect.
    pub path: PathBuf,

    /// Only show cells of this type.
    #[arg(long)]
    pub kind: Option<CellKind>,
}

#[derive(Debug, Serialize)]
pub struct CellSummary {
    index: usize,
    id: String,
    kind: CellKind,
    execution_count: Option<u64>,
    state: Option<&'static str>,
    dirty: bool,
    outputs: usize,
    attachments: usize,
    collapsed: Option<Value>,
    source_lines: usize,
}

impl CellSummary {
    fn from_record(index: usize, record: &CellRecord) -> Self {
        Self {
            index,
            id: record.id().to_string(),
            kind: record.kind(),
            execution_count: record.execution_count().ok().flatten().map(ExecutionCount::get),
            state: record.execution_state().ok().map(ExecutionState::as_str),
            dirty: record.is_dirty().unwrap_or(false),
            outputs: record.outputs().map_or(0, OutputLedger::len),
            attachments: record.attachments().map_or(0, Attachments::len),
            collapsed: record.metadata().get(alias::COLLAPSED).cloned(),
            source_lines: record.source().lines().count(),
        }
    }

    fn count_label(&self) -> String {
        self.execution_count
            .map_or_else(|| "-".to_string(), |count| count.to_string())
    }
}

impl Renderable for CellSummary {
    fn render_human(&self, w: &mut dyn Write) -> io::Result<()> {
        writeln!(w, "[{}] {} ({})", self.index, self.id, self.kind)?;
        pretty_kv(w, "Lines", self.source_lines.to_string())?;
        if self.kind.is_code() {
            pretty_kv(w, "Execution", self.count_label())?;
            pretty_kv(w, "State", self.state.unwrap_or("-"))?;
            pretty_kv(w, "Outputs", self.outputs.to_string())?;
        } else {
            pretty_kv(w, "Attachments", self.attachments.to_string())?;
        }
        if let Some(collapsed) = &self.collapsed {
            pretty_kv(w, "Collapsed", collapsed.to_string())?;
        }
        pretty_rule(w)
    }

    fn render_table(&self, w: &mut dyn Write) -> io::Result<()> {
        let collapsed = self
            .collapsed
            .as_ref()
            .map_or_else(|| "-".to_string(), Value::to_string);
        writeln!(
            w,
            "{}  {}  {}  {}  {}  {}  {}",
            self.index,
            self.id,
            self.kind,
            self.count_label(),
            self.dirty,
            self.outputs,
            collapsed
        )
    }

    fn table_headers() -> &'static [&'static str] {
        &["INDEX", "ID", "KIND", "COUNT", "DIRTY", "OUTPUTS", "COLLAPSED"]
    }
}

pub fn summarize(document: &NotebookDocument, default_kind: CellKind) -> Result<Vec<CellSummary>> {
    Ok(document
        .records(default_kind)?
        .iter()
        .enumerate()
        .map(|(index, record)| CellSummary::from_record(index, record))
        .collect())
}

pub fn run_inspect(args: &InspectArgs, config: &EffectiveConfig, output: OutputMode) -> Result<()> {
    let document = NotebookDocument::load(&args.path)?;
    let mut cells = summarize(&document, config.project.cells.default_kind)?;
    if let Some(kind) = args.kind {
        cells.retain(|cell| cell.kind == kind);
    }
    let stdout = io::stdout();
    render_list(&mut stdout.lock(), &cells, output)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document() -> NotebookDocument {
        NotebookDocument::parse(
            r##"{"cells": [
                {"cell_type": "code", "id": "c", "source": "a\nb", "metadata": {"jupyter": {"outputs_hidden": true}},
                 "execution_count": 4, "outputs": [{"output_type": "stream", "text": "x"}]},
                {"cell_type": "markdown", "id": "m", "source": "# t", "metadata": {},
                 "attachments": {"a.png": {"image/png": "AA=="}}}
            ]}"##,
        )
        .expect("fixture")
    }

    #[test]
    fn summary_reports_code_facets() {
        let cells = summarize(&document(), CellKind::Code).expect("summary");
        let code = &cells[0];
        assert_eq!(code.execution_count, Some(4));
        assert_eq!(code.state, Some("clean-executed"));
        assert_eq!(code.outputs, 1);
        assert_eq!(code.collapsed, Some(Value::Bool(true)));
        assert_eq!(code.source_lines, 2);
    }

    #[test]
    fn summary_reports_markdown_attachments() {
        let cells = summarize(&document(), CellKind::Code).expect("summary");
        let md = &cells[1];
        assert_eq!(md.kind, CellKind::Markdown);
        assert_eq!(md.attachments, 1);
        assert_eq!(md.state, None);
        assert!(!md.dirty);
    }

    #[test]
    fn table_row_matches_headers() {
        let cells = summarize(&document(), CellKind::Code).expect("summary");
        let mut buf = Vec::new();
        cells[0].render_table(&mut buf).expect("render");
        let row = String::from_utf8(buf).expect("utf8");
        assert_eq!(row.split("  ").count(), CellSummary::table_headers().len());
        assert!(row.starts_with("0  c  code  4  false  1  true"));
    }
}
