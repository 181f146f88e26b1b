//! `collapsed` / `jupyter.outputs_hidden` alias resolution.
//!
//! nbformat 4.4 carries the "outputs hidden" state twice: the legacy top-level
//! `collapsed` key and the nested `jupyter.outputs_hidden` key. Both must
//! denote the same state. After one key changes, [`resolve`] rewrites the other
//! to match; the rewrite itself is a fixed point, so re-resolving the keys it
//! touched changes nothing.
//!
//! A missing or non-object `jupyter` value is treated as an empty object.

use serde_json::{Map, Value};

use super::{Metadata, MetadataChange};

pub const COLLAPSED: &str = "collapsed";
pub const JUPYTER: &str = "jupyter";
pub const OUTPUTS_HIDDEN: &str = "outputs_hidden";

/// Reconcile the alias pair after `changed_key` was set to `new_value`
/// (`None` meaning the key was removed). Returns the changes made.
pub fn resolve(
    metadata: &mut Metadata,
    changed_key: &str,
    new_value: Option<&Value>,
) -> Vec<MetadataChange> {
    match changed_key {
        COLLAPSED => sync_jupyter_from_collapsed(metadata, new_value),
        JUPYTER => sync_collapsed_from_jupyter(metadata, new_value),
        _ => Vec::new(),
    }
}

/// Construction-time reconciliation: `collapsed` wins when present, otherwise
/// a present `jupyter.outputs_hidden` is copied into `collapsed`.
pub fn initialize(metadata: &mut Metadata) -> Vec<MetadataChange> {
    if let Some(collapsed) = metadata.get(COLLAPSED).cloned() {
        return resolve(metadata, COLLAPSED, Some(&collapsed));
    }
    let jupyter = metadata.get(JUPYTER).cloned();
    if outputs_hidden(jupyter.as_ref()).is_some() {
        return resolve(metadata, JUPYTER, jupyter.as_ref());
    }
    Vec::new()
}

/// `true` when both keys denote the same state (absent counts as a state).
#[must_use]
pub fn is_consistent(metadata: &Metadata) -> bool {
    metadata.get(COLLAPSED) == outputs_hidden(metadata.get(JUPYTER))
}

fn outputs_hidden(jupyter: Option<&Value>) -> Option<&Value> {
    jupyter
        .and_then(Value::as_object)
        .and_then(|obj| obj.get(OUTPUTS_HIDDEN))
}

fn sync_jupyter_from_collapsed(
    metadata: &mut Metadata,
    new_value: Option<&Value>,
) -> Vec<MetadataChange> {
    let mut jupyter: Map<String, Value> = metadata
        .get(JUPYTER)
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    let current = jupyter.remove(OUTPUTS_HIDDEN);
    if current.as_ref() == new_value {
        return Vec::new();
    }

    if let Some(value) = new_value {
        jupyter.insert(OUTPUTS_HIDDEN.to_string(), value.clone());
    }
    let change = if jupyter.is_empty() {
        metadata.delete(JUPYTER)
    } else {
        metadata.set(JUPYTER, Value::Object(jupyter))
    };
    change.into_iter().collect()
}

fn sync_collapsed_from_jupyter(
    metadata: &mut Metadata,
    new_value: Option<&Value>,
) -> Vec<MetadataChange> {
    let change = match outputs_hidden(new_value) {
        Some(hidden) => metadata.set(COLLAPSED, hidden.clone()),
        None => metadata.delete(COLLAPSED),
    };
    change.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn metadata(value: Value) -> Metadata {
        match value {
            Value::Object(map) => Metadata::from_map(map),
            _ => panic!("metadata fixture must be an object"),
        }
    }

    fn set_and_resolve(md: &mut Metadata, key: &str, value: Value) -> Vec<MetadataChange> {
        md.set(key, value.clone());
        resolve(md, key, Some(&value))
    }

    fn delete_and_resolve(md: &mut Metadata, key: &str) -> Vec<MetadataChange> {
        md.delete(key);
        resolve(md, key, None)
    }

    #[test]
    fn collapsed_propagates_into_jupyter() {
        for v in [true, false] {
            let mut md = Metadata::new();
            set_and_resolve(&mut md, COLLAPSED, json!(v));
            assert_eq!(md.get(JUPYTER), Some(&json!({ "outputs_hidden": v })));
            assert!(is_consistent(&md));
        }
    }

    #[test]
    fn jupyter_propagates_into_collapsed() {
        for v in [true, false] {
            let mut md = Metadata::new();
            set_and_resolve(&mut md, JUPYTER, json!({ "outputs_hidden": v }));
            assert_eq!(md.get(COLLAPSED), Some(&json!(v)));
            assert!(is_consistent(&md));
        }
    }

    #[test]
    fn collapsed_preserves_other_jupyter_fields() {
        let mut md = metadata(json!({ "jupyter": { "source_hidden": true } }));
        set_and_resolve(&mut md, COLLAPSED, json!(true));
        assert_eq!(
            md.get(JUPYTER),
            Some(&json!({ "source_hidden": true, "outputs_hidden": true }))
        );
    }

    #[test]
    fn removing_collapsed_drops_empty_jupyter() {
        let mut md = metadata(json!({
            "collapsed": true,
            "jupyter": { "outputs_hidden": true }
        }));
        let changes = delete_and_resolve(&mut md, COLLAPSED);
        assert_eq!(changes.len(), 1);
        assert!(!md.contains_key(JUPYTER));
        assert!(md.is_empty());
    }

    #[test]
    fn removing_collapsed_keeps_nonempty_jupyter() {
        let mut md = metadata(json!({
            "collapsed": true,
            "jupyter": { "outputs_hidden": true, "source_hidden": false }
        }));
        delete_and_resolve(&mut md, COLLAPSED);
        assert_eq!(md.get(JUPYTER), Some(&json!({ "source_hidden": false })));
    }

    #[test]
    fn jupyter_without_outputs_hidden_removes_collapsed() {
        let mut md = metadata(json!({ "collapsed": false }));
        set_and_resolve(&mut md, JUPYTER, json!({ "source_hidden": true }));
        assert!(!md.contains_key(COLLAPSED));
        assert!(is_consistent(&md));
    }

    #[test]
    fn removing_jupyter_removes_collapsed() {
        let mut md = metadata(json!({
            "collapsed": true,
            "jupyter": { "outputs_hidden": true }
        }));
        delete_and_resolve(&mut md, JUPYTER);
        assert!(md.is_empty());
    }

    #[test]
    fn malformed_jupyter_is_treated_as_absent() {
        let mut md = metadata(json!({ "jupyter": "garbage" }));
        set_and_resolve(&mut md, COLLAPSED, json!(true));
        assert_eq!(md.get(JUPYTER), Some(&json!({ "outputs_hidden": true })));
    }

    #[test]
    fn resolution_is_a_fixed_point() {
        let mut md = Metadata::new();
        set_and_resolve(&mut md, COLLAPSED, json!(true));
        let jupyter = md.get(JUPYTER).cloned();
        assert!(resolve(&mut md, JUPYTER, jupyter.as_ref()).is_empty());
        let collapsed = md.get(COLLAPSED).cloned();
        assert!(resolve(&mut md, COLLAPSED, collapsed.as_ref()).is_empty());
    }

    #[test]
    fn unrelated_keys_are_ignored() {
        let mut md = Metadata::new();
        assert!(set_and_resolve(&mut md, "tags", json!(["x"])).is_empty());
    }

    #[test]
    fn initialize_prefers_collapsed() {
        let mut md = metadata(json!({
            "collapsed": true,
            "jupyter": { "outputs_hidden": false }
        }));
        initialize(&mut md);
        assert_eq!(md.get(JUPYTER), Some(&json!({ "outputs_hidden": true })));
        assert_eq!(md.get(COLLAPSED), Some(&json!(true)));
    }

    #[test]
    fn initialize_copies_outputs_hidden_when_alone() {
        let mut md = metadata(json!({ "jupyter": { "outputs_hidden": true } }));
        initialize(&mut md);
        assert_eq!(md.get(COLLAPSED), Some(&json!(true)));
    }

    #[test]
    fn initialize_leaves_unrelated_jupyter_alone() {
        let mut md = metadata(json!({ "jupyter": { "source_hidden": true } }));
        assert!(initialize(&mut md).is_empty());
        assert!(!md.contains_key(COLLAPSED));
    }
}
