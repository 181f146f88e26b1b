//! Contract with the shared collaborative document.
//!
//! The document itself (CRDT transport, peers, convergence) is opaque. The
//! engine only needs field getters, field setters, and the change event each
//! setter raises. Events are delivered synchronously as the setter's return
//! value.
//!
//! Deltas follow the Yjs shape: a sequence of `retain n`, `delete n` and
//! `insert content` operations walking the old value from the start.

pub mod memory;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::SyncError;

pub use memory::{MemorySharedCell, MutationCounters};

/// One delta operation over a sequence of `T` items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Delta<T> {
    Insert(T),
    Delete(usize),
    Retain(usize),
}

/// Scalar field change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ValueChange<T> {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_value: Option<Value>,
    pub new_value: T,
}

/// Change event raised by the shared document.
///
/// Absent fields did not change. Unknown fields are a protocol violation.
/// A `null` metadata value means the document cleared the map; the engine
/// re-reads the field either way.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SharedChange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata_change: Option<ValueChange<Option<Map<String, Value>>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs_change: Option<Vec<Delta<Vec<Value>>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_count_change: Option<ValueChange<Option<i64>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_change: Option<Vec<Delta<String>>>,
}

impl SharedChange {
    /// Decode an event from its JSON wire form.
    ///
    /// # Errors
    ///
    /// Any decode failure (unknown field, unknown delta operation, wrong
    /// type) is a [`SyncError::ProtocolViolation`].
    pub fn from_json(text: &str) -> Result<Self, SyncError> {
        serde_json::from_str(text).map_err(|err| SyncError::ProtocolViolation(err.to_string()))
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.metadata_change.is_none()
            && self.outputs_change.is_none()
            && self.execution_count_change.is_none()
            && self.source_change.is_none()
    }

    /// Merge `other` into `self`; later field changes replace earlier ones.
    pub fn merge(&mut self, other: Self) {
        if other.metadata_change.is_some() {
            self.metadata_change = other.metadata_change;
        }
        if other.outputs_change.is_some() {
            self.outputs_change = other.outputs_change;
        }
        if other.execution_count_change.is_some() {
            self.execution_count_change = other.execution_count_change;
        }
        if other.source_change.is_some() {
            self.source_change = other.source_change;
        }
    }
}

/// The shared-document side of one cell.
///
/// Every mutator returns the change event the document raised for it.
pub trait SharedCell {
    fn id(&self) -> &str;

    fn get_source(&self) -> String;
    fn set_source(&mut self, text: &str) -> SharedChange;

    fn get_metadata(&self) -> Map<String, Value>;
    fn set_metadata(&mut self, metadata: Map<String, Value>) -> SharedChange;

    fn get_outputs(&self) -> Vec<Value>;

    /// Replace the half-open range `[start, end)` with `values`.
    ///
    /// # Errors
    ///
    /// [`SyncError::OutOfRange`] when the range is not inside the list.
    fn update_outputs(
        &mut self,
        start: usize,
        end: usize,
        values: Vec<Value>,
    ) -> Result<SharedChange, SyncError>;

    fn execution_count(&self) -> Option<i64>;
    fn set_execution_count(&mut self, count: Option<i64>) -> SharedChange;
}

/// Apply a list delta to `base`.
///
/// # Errors
///
/// [`SyncError::ProtocolViolation`] when the delta walks past the end.
pub fn apply_list_delta(base: &[Value], delta: &[Delta<Vec<Value>>]) -> Result<Vec<Value>, SyncError> {
    let mut out = Vec::with_capacity(base.len());
    let mut cursor = 0;
    for op in delta {
        match op {
            Delta::Retain(n) => {
                let end = advance(cursor, *n, base.len())?;
                out.extend_from_slice(&base[cursor..end]);
                cursor = end;
            }
            Delta::Delete(n) => cursor = advance(cursor, *n, base.len())?,
            Delta::Insert(values) => out.extend(values.iter().cloned()),
        }
    }
    out.extend_from_slice(&base[cursor..]);
    Ok(out)
}

/// Apply a text delta to `base`. Counts are in Unicode scalar values.
///
/// # Errors
///
/// [`SyncError::ProtocolViolation`] when the delta walks past the end.
pub fn apply_text_delta(base: &str, delta: &[Delta<String>]) -> Result<String, SyncError> {
    let chars: Vec<char> = base.chars().collect();
    let mut out = String::with_capacity(base.len());
    let mut cursor = 0;
    for op in delta {
        match op {
            Delta::Retain(n) => {
                let end = advance(cursor, *n, chars.len())?;
                out.extend(&chars[cursor..end]);
                cursor = end;
            }
            Delta::Delete(n) => cursor = advance(cursor, *n, chars.len())?,
            Delta::Insert(text) => out.push_str(text),
        }
    }
    out.extend(&chars[cursor..]);
    Ok(out)
}

fn advance(cursor: usize, n: usize, len: usize) -> Result<usize, SyncError> {
    let end = cursor.saturating_add(n);
    if end > len {
        return Err(SyncError::ProtocolViolation(format!(
            "delta walks to {end} past length {len}"
        )));
    }
    Ok(end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_yjs_shaped_events() {
        let change = SharedChange::from_json(
            r#"{
                "sourceChange": [{"retain": 6}, {"delete": 1}, {"insert": "2"}],
                "outputsChange": [{"delete": 2}],
                "executionCountChange": {"oldValue": 3, "newValue": null},
                "metadataChange": {"newValue": {"collapsed": true}}
            }"#,
        )
        .expect("valid event");
        assert!(!change.is_empty());
        assert!(SharedChange::default().is_empty());
        assert_eq!(
            change.source_change,
            Some(vec![
                Delta::Retain(6),
                Delta::Delete(1),
                Delta::Insert("2".to_string())
            ])
        );
        assert_eq!(change.execution_count_change.map(|c| c.new_value), Some(None));
    }

    #[test]
    fn null_metadata_value_decodes() {
        let change = SharedChange::from_json(r#"{"metadataChange": {"newValue": null}}"#)
            .expect("valid event");
        assert_eq!(change.metadata_change.map(|c| c.new_value), Some(None));
    }

    #[test]
    fn unknown_field_is_protocol_violation() {
        let err = SharedChange::from_json(r#"{"attachmentsChange": {}}"#).unwrap_err();
        assert!(matches!(err, SyncError::ProtocolViolation(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn unknown_delta_operation_is_protocol_violation() {
        let err = SharedChange::from_json(r#"{"outputsChange": [{"move": 1}]}"#).unwrap_err();
        assert!(matches!(err, SyncError::ProtocolViolation(_)));
    }

    #[test]
    fn text_delta_applies_by_chars() {
        let delta = vec![
            Delta::Retain(6),
            Delta::Delete(1),
            Delta::Insert("2".to_string()),
        ];
        assert_eq!(apply_text_delta("print(1)", &delta).unwrap(), "print(2)");
        assert_eq!(
            apply_text_delta("héllo", &[Delta::Retain(1), Delta::Delete(1), Delta::Insert("e".into())])
                .unwrap(),
            "hello"
        );
    }

    #[test]
    fn list_delta_applies() {
        let base = vec![json!(1), json!(2), json!(3)];
        let delta = vec![Delta::Retain(1), Delta::Delete(1), Delta::Insert(vec![json!(9)])];
        assert_eq!(
            apply_list_delta(&base, &delta).unwrap(),
            vec![json!(1), json!(9), json!(3)]
        );
        assert!(apply_list_delta(&base, &[Delta::Delete(4)]).is_err());
    }

    #[test]
    fn merge_keeps_latest_per_field() {
        let mut first = SharedChange {
            source_change: Some(vec![Delta::Insert("a".into())]),
            ..SharedChange::default()
        };
        first.merge(SharedChange {
            execution_count_change: Some(ValueChange {
                old_value: None,
                new_value: Some(1),
            }),
            ..SharedChange::default()
        });
        assert!(first.source_change.is_some());
        assert!(first.execution_count_change.is_some());
    }
}
