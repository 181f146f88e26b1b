//! Execution count and output staleness tracking for code cells.
//!
//! # States
//!
//! ```text
//!                 count := n                source edit (trim differs)
//! CleanUnexecuted ──────────▶ CleanExecuted ─────────────────────────▶ Dirty
//!        ▲                       ▲    ▲                                  │
//!        │  count := null        │    └──── source edit (trim equal) ────┤
//!        └───────────────────────┴────────────── count := n ─────────────┘
//! ```
//!
//! A cell is dirty iff it has an execution count and its trimmed source
//! differs from the snapshot taken at the last count assignment. Source edits
//! on a cell without a count never change the state.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::num::NonZeroU64;

use crate::events::{StateChange, StateName};

/// A positive execution counter. Zero and negative inputs mean "never executed".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionCount(NonZeroU64);

impl ExecutionCount {
    /// `None` for zero.
    #[must_use]
    pub const fn new(count: u64) -> Option<Self> {
        match NonZeroU64::new(count) {
            Some(n) => Some(Self(n)),
            None => None,
        }
    }

    /// Normalize a signed wire value; non-positive values map to `None`.
    #[must_use]
    pub fn from_i64(count: i64) -> Option<Self> {
        u64::try_from(count).ok().and_then(Self::new)
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for ExecutionCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// JSON form of an optional count, used in `stateChanged` payloads.
#[must_use]
pub fn count_to_json(count: Option<ExecutionCount>) -> Value {
    count.map_or(Value::Null, |c| Value::from(c.get()))
}

/// Derived execution state of a code cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutionState {
    CleanUnexecuted,
    CleanExecuted,
    Dirty,
}

impl ExecutionState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CleanUnexecuted => "clean-unexecuted",
            Self::CleanExecuted => "clean-executed",
            Self::Dirty => "dirty",
        }
    }
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Execution count, executed-source snapshot and dirty flag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionTracker {
    count: Option<ExecutionCount>,
    snapshot: String,
    dirty: bool,
}

impl ExecutionTracker {
    /// Loaded content with a count is presumed to match its last execution.
    #[must_use]
    pub fn new(count: Option<ExecutionCount>, source: &str) -> Self {
        let snapshot = if count.is_some() {
            source.trim().to_string()
        } else {
            String::new()
        };
        Self {
            count,
            snapshot,
            dirty: false,
        }
    }

    #[must_use]
    pub const fn count(&self) -> Option<ExecutionCount> {
        self.count
    }

    #[must_use]
    pub const fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Trimmed source as of the last count assignment.
    #[must_use]
    pub fn executed_snapshot(&self) -> &str {
        &self.snapshot
    }

    #[must_use]
    pub const fn state(&self) -> ExecutionState {
        match (self.count, self.dirty) {
            (None, _) => ExecutionState::CleanUnexecuted,
            (Some(_), false) => ExecutionState::CleanExecuted,
            (Some(_), true) => ExecutionState::Dirty,
        }
    }

    /// Recompute dirtiness after a source edit.
    pub fn on_source_changed(&mut self, source: &str) -> Option<StateChange> {
        if self.count.is_none() {
            return None;
        }
        let dirty = source.trim() != self.snapshot;
        self.set_dirty(dirty)
    }

    /// Assign a new count. Returns the notifications to emit, in order;
    /// empty when the count is unchanged.
    pub fn assign_count(
        &mut self,
        count: Option<ExecutionCount>,
        source: &str,
    ) -> Vec<StateChange> {
        if count == self.count {
            return Vec::new();
        }
        let old = self.count;
        self.count = count;
        self.snapshot = if count.is_some() {
            source.trim().to_string()
        } else {
            String::new()
        };

        let mut changes = vec![StateChange::new(
            StateName::ExecutionCount,
            count_to_json(old),
            count_to_json(count),
        )];
        changes.extend(self.set_dirty(false));
        changes
    }

    /// Back to clean-unexecuted.
    pub fn reset(&mut self) -> Vec<StateChange> {
        self.assign_count(None, "")
    }

    fn set_dirty(&mut self, dirty: bool) -> Option<StateChange> {
        if dirty == self.dirty {
            return None;
        }
        self.dirty = dirty;
        Some(StateChange::new(StateName::IsDirty, !dirty, dirty))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count(n: u64) -> Option<ExecutionCount> {
        ExecutionCount::new(n)
    }

    #[test]
    fn zero_and_negative_counts_are_null() {
        assert_eq!(ExecutionCount::new(0), None);
        assert_eq!(ExecutionCount::from_i64(-3), None);
        assert_eq!(ExecutionCount::from_i64(4).map(ExecutionCount::get), Some(4));
    }

    #[test]
    fn initial_state_follows_count() {
        let fresh = ExecutionTracker::new(None, "x");
        assert_eq!(fresh.state(), ExecutionState::CleanUnexecuted);
        assert_eq!(fresh.executed_snapshot(), "");

        let loaded = ExecutionTracker::new(count(3), "  print(1)\n");
        assert_eq!(loaded.state(), ExecutionState::CleanExecuted);
        assert_eq!(loaded.executed_snapshot(), "print(1)");
    }

    #[test]
    fn source_edit_without_count_is_ignored() {
        let mut tracker = ExecutionTracker::new(None, "");
        assert!(tracker.on_source_changed("anything").is_none());
        assert!(!tracker.is_dirty());
    }

    #[test]
    fn dirty_tracks_trimmed_comparison() {
        let mut tracker = ExecutionTracker::new(count(5), "x");
        let change = tracker.on_source_changed("y").expect("became dirty");
        assert_eq!(change.name, StateName::IsDirty);
        assert_eq!(change.new_value, Value::Bool(true));
        assert!(tracker.is_dirty());

        assert!(tracker.on_source_changed("z").is_none(), "still dirty, no event");

        let change = tracker.on_source_changed("  x \n").expect("clean again");
        assert_eq!(change.new_value, Value::Bool(false));
        assert_eq!(tracker.state(), ExecutionState::CleanExecuted);
    }

    #[test]
    fn assigning_count_snapshots_and_cleans() {
        let mut tracker = ExecutionTracker::new(count(3), "print(1)");
        tracker.on_source_changed("print(2)\n");
        assert!(tracker.is_dirty());

        let changes = tracker.assign_count(count(4), "print(2)\n");
        let names: Vec<StateName> = changes.iter().map(|c| c.name).collect();
        assert_eq!(names, vec![StateName::ExecutionCount, StateName::IsDirty]);
        assert!(!tracker.is_dirty());
        assert_eq!(tracker.executed_snapshot(), "print(2)");
    }

    #[test]
    fn first_execution_snapshots_current_source() {
        let mut tracker = ExecutionTracker::new(None, "");
        tracker.assign_count(count(1), "a = 1");
        assert_eq!(tracker.executed_snapshot(), "a = 1");
        assert!(tracker.on_source_changed("a = 1 ").is_none());
        assert!(tracker.on_source_changed("a = 2").is_some());
    }

    #[test]
    fn same_count_is_redundant() {
        let mut tracker = ExecutionTracker::new(count(2), "x");
        assert!(tracker.assign_count(count(2), "y").is_empty());
        assert_eq!(tracker.executed_snapshot(), "x");
    }

    #[test]
    fn reset_clears_everything() {
        let mut tracker = ExecutionTracker::new(count(2), "x");
        tracker.on_source_changed("y");
        let changes = tracker.reset();
        assert_eq!(changes.len(), 2);
        assert_eq!(tracker.state(), ExecutionState::CleanUnexecuted);
        assert_eq!(tracker.count(), None);
        assert!(!tracker.is_dirty());
        assert!(tracker.reset().is_empty());
    }
}
