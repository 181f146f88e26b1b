use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::error::SyncError;

/// One attachment payload: MIME type → JSON data (usually base64 text).
pub type MimeBundle = Map<String, Value>;

/// Named attachments of a markdown or raw cell.
///
/// Binary storage lives elsewhere; this is only the nbformat view of it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Attachments {
    entries: BTreeMap<String, MimeBundle>,
}

impl Attachments {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the nbformat `attachments` object.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::MalformedCell`] when an entry is not an object.
    pub fn from_json(value: &Map<String, Value>) -> Result<Self, SyncError> {
        let mut entries = BTreeMap::new();
        for (name, bundle) in value {
            let Value::Object(bundle) = bundle else {
                return Err(SyncError::MalformedCell(format!(
                    "attachment '{name}' is not a MIME bundle"
                )));
            };
            entries.insert(name.clone(), bundle.clone());
        }
        Ok(Self { entries })
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&MimeBundle> {
        self.entries.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
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

    /// Returns `true` when the stored bundle changed.
    pub fn set(&mut self, name: impl Into<String>, bundle: MimeBundle) -> bool {
        let name = name.into();
        if self.entries.get(&name) == Some(&bundle) {
            return false;
        }
        self.entries.insert(name, bundle);
        true
    }

    /// Returns `true` when an attachment was removed.
    pub fn remove(&mut self, name: &str) -> bool {
        self.entries.remove(name).is_some()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// nbformat JSON object form.
    #[must_use]
    pub fn to_json(&self) -> Map<String, Value> {
        self.entries
            .iter()
            .map(|(name, bundle)| (name.clone(), Value::Object(bundle.clone())))
            .collect()
    }
}
