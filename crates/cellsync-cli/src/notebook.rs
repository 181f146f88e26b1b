//! Whole-notebook file handling.
//!
//! Only `cells` is interpreted; every other top-level key (`metadata`,
//! `nbformat`, `nbformat_minor`, ...) passes through untouched.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use cellsync_core::model::CellKind;
use cellsync_core::nbformat::NotebookCell;
use cellsync_core::{CellRecord, SyncError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotebookDocument {
    pub cells: Vec<Value>,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

impl NotebookDocument {
    /// Read and parse a `.ipynb` file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a notebook object.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// # Errors
    ///
    /// Returns an error for invalid JSON or a missing `cells` array.
    pub fn parse(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        if !value.get("cells").is_some_and(Value::is_array) {
            bail!("notebook has no \"cells\" array");
        }
        Ok(serde_json::from_value(value)?)
    }

    /// Load every cell into a [`CellRecord`].
    ///
    /// Cells without a `cell_type` are read as `default_kind`.
    ///
    /// # Errors
    ///
    /// Returns the first cell that cannot be interpreted, with its index.
    pub fn records(&self, default_kind: CellKind) -> Result<Vec<CellRecord>> {
        self.cells
            .iter()
            .enumerate()
            .map(|(index, raw)| {
                load_cell(raw, default_kind).with_context(|| format!("cell {index}"))
            })
            .collect()
    }

    /// The same notebook with every cell passed through [`CellRecord`].
    ///
    /// # Errors
    ///
    /// See [`records`](Self::records).
    pub fn normalized(&self, default_kind: CellKind) -> Result<Self> {
        let cells = self
            .records(default_kind)?
            .iter()
            .map(|record| record.to_notebook().to_json())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            cells,
            rest: self.rest.clone(),
        })
    }

    /// Serialize with the one-space indent Jupyter writes, plus a trailing newline.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_ipynb_string(&self) -> Result<String> {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b" ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
        self.serialize(&mut serializer)?;
        buf.push(b'\n');
        Ok(String::from_utf8(buf)?)
    }
}

fn load_cell(raw: &Value, default_kind: CellKind) -> Result<CellRecord> {
    let mut raw = raw.clone();
    if let Some(map) = raw.as_object_mut() {
        map.entry("cell_type").or_insert_with(|| {
            debug!(kind = %default_kind, "cell without cell_type");
            Value::String(default_kind.to_string())
        });
    }
    let cell = NotebookCell::from_json(raw).map_err(SyncError::from)?;
    Ok(CellRecord::from_notebook(&cell)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn notebook() -> NotebookDocument {
        serde_json::from_value(json!({
            "cells": [
                { "cell_type": "code", "id": "a", "source": ["x = 1\r\n", "x"], "metadata": {},
                  "execution_count": 2, "outputs": [] },
                { "id": "b", "source": "untyped", "metadata": {} }
            ],
            "metadata": { "kernelspec": { "name": "python3" } },
            "nbformat": 4,
            "nbformat_minor": 5
        }))
        .expect("fixture")
    }

    #[test]
    fn parse_requires_cells() {
        assert!(NotebookDocument::parse(r#"{"metadata": {}}"#).is_err());
        assert!(NotebookDocument::parse(r#"{"cells": []}"#).is_ok());
    }

    #[test]
    fn untyped_cells_use_default_kind() {
        let records = notebook().records(CellKind::Markdown).expect("records");
        assert_eq!(records[0].kind(), CellKind::Code);
        assert_eq!(records[1].kind(), CellKind::Markdown);
    }

    #[test]
    fn normalize_keeps_top_level_keys() {
        let normalized = notebook().normalized(CellKind::Raw).expect("normalize");
        assert_eq!(normalized.rest["nbformat"], json!(4));
        assert_eq!(normalized.rest["metadata"]["kernelspec"]["name"], "python3");
        assert_eq!(normalized.cells[0]["source"], "x = 1\nx");
        assert_eq!(normalized.cells[1]["cell_type"], "raw");
    }

    #[test]
    fn normalize_is_idempotent() {
        let once = notebook().normalized(CellKind::Code).expect("normalize");
        let twice = once.normalized(CellKind::Code).expect("normalize");
        assert_eq!(once, twice);
    }

    #[test]
    fn bad_cell_names_its_index() {
        let doc = NotebookDocument::parse(r#"{"cells": [{"cell_type": "heading", "source": ""}]}"#)
            .expect("parse");
        let err = doc.records(CellKind::Code).unwrap_err();
        assert!(format!("{err:#}").starts_with("cell 0"));
    }

    #[test]
    fn ipynb_string_uses_one_space_indent() {
        let text = notebook().to_ipynb_string().expect("serialize");
        assert!(text.starts_with("{\n \"cells\""));
        assert!(text.ends_with("}\n"));
    }
}
