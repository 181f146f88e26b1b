//! Output ledger: the ordered execution results of a code cell.
//!
//! Local list mutations are described by [`ListChange`] and translated into a
//! half-open range replacement ([`RangePatch`]) against the shared document.
//! Translation is exact: applying the patch to a copy of the pre-mutation list
//! yields the post-mutation list.
//!
//! # Patch shapes
//!
//! | Local mutation          | Shared patch                              |
//! |-------------------------|-------------------------------------------|
//! | `add(values, at)`       | replace `[at, at)` with `values`          |
//! | `set(values, at)`       | replace `[at, at + values.len())`         |
//! | `remove(at, count)`     | replace `[at, at + count)` with nothing   |
//! | `clear()`               | replace `[0, len)` with nothing           |
//! | `move(from, to)`        | not expressible: `invalid ledger event`   |

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SyncError;

/// One output record (`stream`, `display_data`, `execute_result`, `error`).
///
/// Records are opaque JSON; the ledger never looks inside them.
pub type OutputRecord = Value;

/// A mutation of the local output list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ListChange {
    Add {
        new_index: usize,
        new_values: Vec<OutputRecord>,
    },
    Set {
        old_index: usize,
        old_values: Vec<OutputRecord>,
        new_values: Vec<OutputRecord>,
    },
    Remove {
        old_index: usize,
        old_values: Vec<OutputRecord>,
    },
    Move {
        old_index: usize,
        new_index: usize,
        values: Vec<OutputRecord>,
    },
}

impl ListChange {
    /// Event discriminant as it appears on the wire.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Add { .. } => "add",
            Self::Set { .. } => "set",
            Self::Remove { .. } => "remove",
            Self::Move { .. } => "move",
        }
    }
}

/// Half-open range replacement `[start, end) := values`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangePatch {
    pub start: usize,
    pub end: usize,
    pub values: Vec<OutputRecord>,
}

impl RangePatch {
    /// Apply the patch to `target`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::OutOfRange`] if the range does not lie inside
    /// `target`.
    pub fn apply(&self, target: &mut Vec<OutputRecord>) -> Result<(), SyncError> {
        if self.start > self.end || self.end > target.len() {
            return Err(SyncError::OutOfRange {
                index: self.end.max(self.start),
                len: target.len(),
            });
        }
        target.splice(self.start..self.end, self.values.iter().cloned());
        Ok(())
    }
}

/// Translate a local list mutation into the equivalent shared range patch.
///
/// # Errors
///
/// Returns [`SyncError::InvalidLedgerEvent`] for mutation kinds that have no
/// range-replacement form.
pub fn translate(change: &ListChange) -> Result<RangePatch, SyncError> {
    match change {
        ListChange::Add {
            new_index,
            new_values,
        } => Ok(RangePatch {
            start: *new_index,
            end: *new_index,
            values: new_values.clone(),
        }),
        ListChange::Set {
            old_index,
            new_values,
            ..
        } => Ok(RangePatch {
            start: *old_index,
            end: old_index + new_values.len(),
            values: new_values.clone(),
        }),
        ListChange::Remove {
            old_index,
            old_values,
        } => Ok(RangePatch {
            start: *old_index,
            end: old_index + old_values.len(),
            values: Vec::new(),
        }),
        ListChange::Move { .. } => Err(SyncError::InvalidLedgerEvent {
            kind: change.kind(),
        }),
    }
}

/// Ordered output records of one code cell.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputLedger {
    items: Vec<OutputRecord>,
    trusted: bool,
}

impl OutputLedger {
    #[must_use]
    pub fn new(values: Vec<OutputRecord>, trusted: bool) -> Self {
        Self {
            items: values,
            trusted,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&OutputRecord> {
        self.items.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &OutputRecord> {
        self.items.iter()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[OutputRecord] {
        &self.items
    }

    /// Whether outputs may be rendered as active content.
    #[must_use]
    pub const fn trusted(&self) -> bool {
        self.trusted
    }

    pub fn set_trusted(&mut self, trusted: bool) {
        self.trusted = trusted;
    }

    /// Insert `values` before index `at`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::OutOfRange`] when `at > len`.
    pub fn add(
        &mut self,
        values: Vec<OutputRecord>,
        at: usize,
    ) -> Result<Option<ListChange>, SyncError> {
        self.check_index(at)?;
        if values.is_empty() {
            return Ok(None);
        }
        self.items.splice(at..at, values.iter().cloned());
        Ok(Some(ListChange::Add {
            new_index: at,
            new_values: values,
        }))
    }

    /// Append a single record.
    pub fn push(&mut self, value: OutputRecord) -> ListChange {
        let at = self.items.len();
        self.items.push(value.clone());
        ListChange::Add {
            new_index: at,
            new_values: vec![value],
        }
    }

    /// Overwrite the entries starting at `at` with `values`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::OutOfRange`] when the overwritten span runs past
    /// the end of the ledger.
    pub fn set(
        &mut self,
        values: Vec<OutputRecord>,
        at: usize,
    ) -> Result<Option<ListChange>, SyncError> {
        let len = self.items.len();
        let Some(end) = at.checked_add(values.len()).filter(|&end| end <= len) else {
            return Err(SyncError::OutOfRange {
                index: at.saturating_add(values.len()).saturating_sub(1).max(at),
                len,
            });
        };
        if self.items[at..end] == values[..] {
            return Ok(None);
        }
        let old_values: Vec<OutputRecord> =
            self.items.splice(at..end, values.iter().cloned()).collect();
        Ok(Some(ListChange::Set {
            old_index: at,
            old_values,
            new_values: values,
        }))
    }

    /// Remove up to `count` entries starting at `at`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::OutOfRange`] when `at > len`.
    pub fn remove(&mut self, at: usize, count: usize) -> Result<Option<ListChange>, SyncError> {
        self.check_index(at)?;
        let end = at.saturating_add(count).min(self.items.len());
        if end == at {
            return Ok(None);
        }
        let old_values: Vec<OutputRecord> = self.items.drain(at..end).collect();
        Ok(Some(ListChange::Remove {
            old_index: at,
            old_values,
        }))
    }

    /// Remove everything; equivalent to `remove(0, len)`.
    pub fn clear(&mut self) -> Option<ListChange> {
        if self.items.is_empty() {
            return None;
        }
        let old_values = std::mem::take(&mut self.items);
        Some(ListChange::Remove {
            old_index: 0,
            old_values,
        })
    }

    /// Move one entry from `from` to `to`.
    ///
    /// The ledger supports reordering locally, but the move has no range
    /// patch form; the engine rejects it as an invalid ledger event.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::OutOfRange`] when either index is not an entry.
    pub fn move_item(&mut self, from: usize, to: usize) -> Result<Option<ListChange>, SyncError> {
        let len = self.items.len();
        for index in [from, to] {
            if index >= len {
                return Err(SyncError::OutOfRange { index, len });
            }
        }
        if from == to {
            return Ok(None);
        }
        let value = self.items.remove(from);
        self.items.insert(to, value.clone());
        Ok(Some(ListChange::Move {
            old_index: from,
            new_index: to,
            values: vec![value],
        }))
    }

    /// Replace the whole list: clear, then add every value.
    pub fn replace_all(&mut self, values: Vec<OutputRecord>) -> Vec<ListChange> {
        if self.items == values {
            return Vec::new();
        }
        let mut changes: Vec<ListChange> = self.clear().into_iter().collect();
        if !values.is_empty() {
            self.items = values.clone();
            changes.push(ListChange::Add {
                new_index: 0,
                new_values: values,
            });
        }
        changes
    }

    /// The records as externally representable JSON, in order.
    #[must_use]
    pub fn to_serializable(&self) -> Vec<OutputRecord> {
        self.items.clone()
    }

    fn check_index(&self, at: usize) -> Result<(), SyncError> {
        if at > self.items.len() {
            return Err(SyncError::OutOfRange {
                index: at,
                len: self.items.len(),
            });
        }
        Ok(())
    }
}
