use serde::Serialize;
use serde_json::{Map, Value};

use super::{Delta, SharedCell, SharedChange, ValueChange};
use crate::error::SyncError;

/// Per-field count of setter calls on a [`MemorySharedCell`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MutationCounters {
    pub source: u64,
    pub metadata: u64,
    pub outputs: u64,
    pub execution_count: u64,
}

impl MutationCounters {
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.source + self.metadata + self.outputs + self.execution_count
    }

    /// Field-wise difference `self - earlier`.
    #[must_use]
    pub const fn since(&self, earlier: &Self) -> Self {
        Self {
            source: self.source.saturating_sub(earlier.source),
            metadata: self.metadata.saturating_sub(earlier.metadata),
            outputs: self.outputs.saturating_sub(earlier.outputs),
            execution_count: self.execution_count.saturating_sub(earlier.execution_count),
        }
    }
}

/// In-memory shared cell that raises Yjs-style deltas.
///
/// Every setter call is counted, including calls that change nothing (those
/// raise an empty event).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemorySharedCell {
    id: String,
    source: String,
    metadata: Map<String, Value>,
    outputs: Vec<Value>,
    execution_count: Option<i64>,
    counters: MutationCounters,
}

impl MemorySharedCell {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    #[must_use]
    pub fn with_outputs(mut self, outputs: Vec<Value>) -> Self {
        self.outputs = outputs;
        self
    }

    #[must_use]
    pub const fn with_execution_count(mut self, count: Option<i64>) -> Self {
        self.execution_count = count;
        self
    }

    #[must_use]
    pub const fn counters(&self) -> MutationCounters {
        self.counters
    }
}

impl SharedCell for MemorySharedCell {
    fn id(&self) -> &str {
        &self.id
    }

    fn get_source(&self) -> String {
        self.source.clone()
    }

    fn set_source(&mut self, text: &str) -> SharedChange {
        self.counters.source += 1;
        if text == self.source {
            return SharedChange::default();
        }
        let delta = text_delta(&self.source, text);
        self.source = text.to_string();
        SharedChange {
            source_change: Some(delta),
            ..SharedChange::default()
        }
    }

    fn get_metadata(&self) -> Map<String, Value> {
        self.metadata.clone()
    }

    fn set_metadata(&mut self, metadata: Map<String, Value>) -> SharedChange {
        self.counters.metadata += 1;
        if metadata == self.metadata {
            return SharedChange::default();
        }
        let old = std::mem::replace(&mut self.metadata, metadata.clone());
        SharedChange {
            metadata_change: Some(ValueChange {
                old_value: Some(Value::Object(old)),
                new_value: Some(metadata),
            }),
            ..SharedChange::default()
        }
    }

    fn get_outputs(&self) -> Vec<Value> {
        self.outputs.clone()
    }

    fn update_outputs(
        &mut self,
        start: usize,
        end: usize,
        values: Vec<Value>,
    ) -> Result<SharedChange, SyncError> {
        if start > end || end > self.outputs.len() {
            return Err(SyncError::OutOfRange {
                index: end.max(start),
                len: self.outputs.len(),
            });
        }
        self.counters.outputs += 1;
        if self.outputs[start..end] == values[..] {
            return Ok(SharedChange::default());
        }

        let mut delta = Vec::with_capacity(3);
        if start > 0 {
            delta.push(Delta::Retain(start));
        }
        if end > start {
            delta.push(Delta::Delete(end - start));
        }
        if !values.is_empty() {
            delta.push(Delta::Insert(values.clone()));
        }
        self.outputs.splice(start..end, values);
        Ok(SharedChange {
            outputs_change: Some(delta),
            ..SharedChange::default()
        })
    }

    fn execution_count(&self) -> Option<i64> {
        self.execution_count
    }

    fn set_execution_count(&mut self, count: Option<i64>) -> SharedChange {
        self.counters.execution_count += 1;
        if count == self.execution_count {
            return SharedChange::default();
        }
        let old = std::mem::replace(&mut self.execution_count, count);
        SharedChange {
            execution_count_change: Some(ValueChange {
                old_value: Some(old.map_or(Value::Null, Value::from)),
                new_value: count,
            }),
            ..SharedChange::default()
        }
    }
}

/// Minimal retain/delete/insert delta turning `old` into `new`, found by
/// trimming the common prefix and suffix.
fn text_delta(old: &str, new: &str) -> Vec<Delta<String>> {
    let old_chars: Vec<char> = old.chars().collect();
    let new_chars: Vec<char> = new.chars().collect();

    let prefix = old_chars
        .iter()
        .zip(&new_chars)
        .take_while(|(a, b)| a == b)
        .count();
    let max_suffix = old_chars.len().min(new_chars.len()) - prefix;
    let suffix = old_chars
        .iter()
        .rev()
        .zip(new_chars.iter().rev())
        .take(max_suffix)
        .take_while(|(a, b)| a == b)
        .count();

    let deleted = old_chars.len() - prefix - suffix;
    let inserted: String = new_chars[prefix..new_chars.len() - suffix].iter().collect();

    let mut delta = Vec::with_capacity(3);
    if prefix > 0 {
        delta.push(Delta::Retain(prefix));
    }
    if deleted > 0 {
        delta.push(Delta::Delete(deleted));
    }
    if !inserted.is_empty() {
        delta.push(Delta::Insert(inserted));
    }
    delta
}
