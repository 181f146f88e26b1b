//! Observable cell metadata.
//!
//! [`Metadata`] is a string-keyed map of JSON values. Every mutation that
//! actually changes the map returns a [`MetadataChange`] describing it;
//! writing a value equal to the current one returns `None` and raises nothing.

pub mod alias;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Well-known metadata key recording execution timing for code cells.
pub const EXECUTION: &str = "execution";

/// Kind of a map mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Add,
    Change,
    Remove,
}

impl ChangeKind {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Change => "change",
            Self::Remove => "remove",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One key-level mutation of a [`Metadata`] map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataChange {
    pub kind: ChangeKind,
    pub key: String,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
}

/// Cell metadata map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata {
    entries: Map<String, Value>,
}

impl Metadata {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_map(entries: Map<String, Value>) -> Self {
        Self { entries }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.entries
    }

    /// Deep copy of the underlying map.
    #[must_use]
    pub fn to_map(&self) -> Map<String, Value> {
        self.entries.clone()
    }

    /// Insert or replace `key`. Returns `None` when the value is unchanged.
    pub fn set(&mut self, key: impl Into<String>, value: Value) -> Option<MetadataChange> {
        let key = key.into();
        if self.entries.get(&key) == Some(&value) {
            return None;
        }
        let old_value = self.entries.insert(key.clone(), value.clone());
        let kind = if old_value.is_some() {
            ChangeKind::Change
        } else {
            ChangeKind::Add
        };
        Some(MetadataChange {
            kind,
            key,
            old_value,
            new_value: Some(value),
        })
    }

    /// Remove `key`. Returns `None` when it was absent.
    pub fn delete(&mut self, key: &str) -> Option<MetadataChange> {
        let old_value = self.entries.remove(key)?;
        Some(MetadataChange {
            kind: ChangeKind::Remove,
            key: key.to_string(),
            old_value: Some(old_value),
            new_value: None,
        })
    }
}

/// Apply a change onto a plain JSON object map (the shared-document side).
pub fn apply_change(target: &mut Map<String, Value>, change: &MetadataChange) {
    match (change.kind, &change.new_value) {
        (ChangeKind::Add | ChangeKind::Change, Some(value)) => {
            target.insert(change.key.clone(), value.clone());
        }
        (ChangeKind::Remove, _) | (_, None) => {
            target.remove(&change.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn set_reports_add_then_change() {
        let mut md = Metadata::new();
        let first = md.set("tags", json!(["a"])).expect("add");
        assert_eq!(first.kind, ChangeKind::Add);
        assert_eq!(first.old_value, None);

        let second = md.set("tags", json!(["a", "b"])).expect("change");
        assert_eq!(second.kind, ChangeKind::Change);
        assert_eq!(second.old_value, Some(json!(["a"])));
        assert_eq!(second.new_value, Some(json!(["a", "b"])));
    }

    #[test]
    fn redundant_set_is_silent() {
        let mut md = Metadata::new();
        md.set("name", json!("x"));
        assert!(md.set("name", json!("x")).is_none());
    }

    #[test]
    fn delete_missing_key_is_silent() {
        let mut md = Metadata::new();
        assert!(md.delete("nope").is_none());
        md.set("nope", json!(1));
        let change = md.delete("nope").expect("remove");
        assert_eq!(change.kind, ChangeKind::Remove);
        assert_eq!(change.old_value, Some(json!(1)));
        assert!(md.is_empty());
    }

    #[test]
    fn apply_change_mirrors_onto_plain_map() {
        let mut md = Metadata::new();
        let mut mirror = Map::new();
        for change in [
            md.set("a", json!(1)),
            md.set("b", json!(true)),
            md.set("a", json!(2)),
            md.delete("b"),
        ]
        .into_iter()
        .flatten()
        {
            apply_change(&mut mirror, &change);
        }
        assert_eq!(&mirror, md.as_map());
    }
}
