//! nbformat 4 cell JSON.
//!
//! Deserialization is lenient where notebooks in the wild are: `source` may be
//! a string, a list of strings, null or missing. Serialization always emits
//! `source` as one string and always carries `id`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::model::CellKind;

/// Metadata keys only meaningful on some cell kinds.
pub const FORMAT_KEY: &str = "format";
pub const SCROLLED_KEY: &str = "scrolled";
pub const TRUSTED_KEY: &str = "trusted";

/// Cell `source` as found on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Source {
    Text(String),
    Lines(Vec<String>),
    Other(Value),
}

impl Default for Source {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl Source {
    /// Joined text with line endings normalized to `\n`.
    #[must_use]
    pub fn to_text(&self) -> String {
        match self {
            Self::Text(text) => normalize_line_endings(text),
            Self::Lines(lines) => lines.iter().map(|l| normalize_line_endings(l)).collect(),
            Self::Other(Value::Null) => String::new(),
            Self::Other(other) => {
                warn!(?other, "ignoring non-text cell source");
                String::new()
            }
        }
    }
}

impl From<&str> for Source {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

/// Rewrite `\r\n` and lone `\r` to `\n`.
#[must_use]
pub fn normalize_line_endings(text: &str) -> String {
    if !text.contains('\r') {
        return text.to_string();
    }
    text.replace("\r\n", "\n").replace('\r', "\n")
}

/// Fields of a code cell.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeCellJson {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub source: Source,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub execution_count: Option<i64>,
    #[serde(default)]
    pub outputs: Vec<Value>,
}

/// Fields shared by markdown and raw cells.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextCellJson {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub source: Source,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachments: Option<Map<String, Value>>,
}

/// One cell of an `.ipynb` document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cell_type", rename_all = "lowercase")]
pub enum NotebookCell {
    Code(CodeCellJson),
    Markdown(TextCellJson),
    Raw(TextCellJson),
}

impl NotebookCell {
    #[must_use]
    pub const fn kind(&self) -> CellKind {
        match self {
            Self::Code(_) => CellKind::Code,
            Self::Markdown(_) => CellKind::Markdown,
            Self::Raw(_) => CellKind::Raw,
        }
    }

    #[must_use]
    pub fn id(&self) -> Option<&str> {
        match self {
            Self::Code(cell) => cell.id.as_deref(),
            Self::Markdown(cell) | Self::Raw(cell) => cell.id.as_deref(),
        }
    }

    #[must_use]
    pub fn source(&self) -> &Source {
        match self {
            Self::Code(cell) => &cell.source,
            Self::Markdown(cell) | Self::Raw(cell) => &cell.source,
        }
    }

    #[must_use]
    pub fn metadata(&self) -> &Map<String, Value> {
        match self {
            Self::Code(cell) => &cell.metadata,
            Self::Markdown(cell) | Self::Raw(cell) => &cell.metadata,
        }
    }

    /// Parse one cell from JSON.
    ///
    /// # Errors
    ///
    /// Returns a JSON error for a missing or unknown `cell_type` or for
    /// wrongly typed fields.
    pub fn from_json(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    /// # Errors
    ///
    /// Fails only if a metadata value cannot be represented as JSON.
    pub fn to_json(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

/// Loose truthiness used for `metadata.trusted`: `false`, `0`, `""` and
/// `null` are false, every other value is true.
#[must_use]
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(n) => n.as_f64().is_some_and(|f| f.abs() > 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Drop metadata keys that do not belong on `kind`.
pub fn strip_foreign_metadata(kind: CellKind, metadata: &mut Map<String, Value>) {
    if kind != CellKind::Raw {
        metadata.remove(FORMAT_KEY);
    }
    if kind != CellKind::Code {
        metadata.remove(crate::metadata::alias::COLLAPSED);
        metadata.remove(SCROLLED_KEY);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn truthiness_follows_loose_rules() {
        for value in [json!(true), json!(1), json!("yes"), json!([]), json!({})] {
            assert!(is_truthy(&value), "{value}");
        }
        for value in [json!(false), json!(0), json!(0.0), json!(""), Value::Null] {
            assert!(!is_truthy(&value), "{value}");
        }
    }

    #[test]
    fn source_forms_are_joined_and_normalized() {
        assert_eq!(Source::from("a\r\nb\rc").to_text(), "a\nb\nc");
        let lines = Source::Lines(vec!["x = 1\r\n".into(), "y = 2".into()]);
        assert_eq!(lines.to_text(), "x = 1\ny = 2");
        assert_eq!(Source::Other(Value::Null).to_text(), "");
        assert_eq!(Source::Other(json!(42)).to_text(), "");
    }

    #[test]
    fn missing_and_null_source_are_empty() {
        let cell = NotebookCell::from_json(json!({ "cell_type": "markdown", "metadata": {} }))
            .expect("parse");
        assert_eq!(cell.source().to_text(), "");

        let cell = NotebookCell::from_json(json!({
            "cell_type": "code", "source": null, "metadata": {}, "outputs": []
        }))
        .expect("parse");
        assert_eq!(cell.source().to_text(), "");
        assert_eq!(cell.kind(), CellKind::Code);
    }

    #[test]
    fn unknown_cell_type_is_rejected() {
        let err = NotebookCell::from_json(json!({ "cell_type": "heading", "source": "" }));
        assert!(err.is_err());
    }

    #[test]
    fn serialized_code_cell_keeps_null_count() {
        let cell = NotebookCell::Code(CodeCellJson {
            id: Some("c1".into()),
            source: Source::from("x"),
            ..CodeCellJson::default()
        });
        let json = cell.to_json().expect("serialize");
        assert_eq!(json["cell_type"], "code");
        assert_eq!(json["execution_count"], Value::Null);
        assert_eq!(json["outputs"], json!([]));
        assert_eq!(json["id"], "c1");
    }

    #[test]
    fn strip_rules_depend_on_kind() {
        let base = json!({ "format": "text/latex", "collapsed": true, "scrolled": false, "tags": [] });
        let Value::Object(base) = base else { unreachable!() };

        let mut raw = base.clone();
        strip_foreign_metadata(CellKind::Raw, &mut raw);
        assert!(raw.contains_key("format"));
        assert!(!raw.contains_key("collapsed"));

        let mut code = base.clone();
        strip_foreign_metadata(CellKind::Code, &mut code);
        assert!(!code.contains_key("format"));
        assert!(code.contains_key("collapsed"));
        assert!(code.contains_key("scrolled"));

        let mut markdown = base;
        strip_foreign_metadata(CellKind::Markdown, &mut markdown);
        assert_eq!(markdown.keys().collect::<Vec<_>>(), vec!["tags"]);
    }
}
