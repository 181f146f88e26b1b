//! Bidirectional, loop-free synchronization between a [`CellRecord`] and its
//! shared document.
//!
//! # Flow
//!
//! ```text
//! local edit ─▶ CellRecord ─▶ on_local_changes ─[guard]─▶ SharedCell write
//!                                                             │ echo
//!                                           on_shared_change ◀┘ suppressed
//!
//! remote edit ─▶ SharedChange ─▶ on_shared_change ─[guard]─▶ CellRecord write
//!                                                               │ echo
//!                                              on_local_changes ◀┘ suppressed
//! ```
//!
//! Remote changes pull full field values from the shared document; the event
//! only says which fields moved. When the pulled value does not survive
//! local normalization unchanged (line endings, alias fix-ups, non-positive
//! counts) the local value is written back once, still under the guard.

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, trace};

use crate::error::SyncError;
use crate::events::{CellEvent, SubscriptionId};
use crate::execution::ExecutionCount;
use crate::guard::{Guarded, ReentrancyGuard, with_guard};
use crate::metadata::{self, alias};
use crate::model::{CellRecord, LocalChange, MimeBundle};
use crate::outputs::{OutputRecord, translate};
use crate::shared::{SharedCell, SharedChange};

/// Traffic counters of one engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncStats {
    /// Shared-document writes caused by local edits.
    pub local_to_shared: u64,
    /// Remote change events applied locally.
    pub shared_to_local: u64,
    /// Shared echoes dropped while the guard was held.
    pub suppressed_shared: u64,
    /// Local echoes dropped while the guard was held.
    pub suppressed_local: u64,
    /// Write-backs after a remote change did not survive normalization.
    pub reconciled: u64,
}

/// One cell wired to one shared document.
#[derive(Debug)]
pub struct SyncEngine<S: SharedCell> {
    cell: CellRecord,
    shared: S,
    guard: ReentrancyGuard,
    stats: SyncStats,
}

impl<S: SharedCell> Guarded for SyncEngine<S> {
    fn guard_mut(&mut self) -> &mut ReentrancyGuard {
        &mut self.guard
    }
}

impl<S: SharedCell> SyncEngine<S> {
    /// Wire `cell` to `shared`, pushing the local state into the document.
    ///
    /// # Errors
    ///
    /// Propagates shared-document write failures.
    pub fn new(cell: CellRecord, shared: S) -> Result<Self, SyncError> {
        let mut engine = Self::detached(cell, shared);
        with_guard(&mut engine, Self::push_all)?;
        debug!(cell = %engine.cell.id(), "engine initialized from local state");
        Ok(engine)
    }

    /// Wire `cell` to an existing shared document, adopting its state.
    ///
    /// # Errors
    ///
    /// [`SyncError::ProtocolViolation`] if the document carries outputs or a
    /// count for a non-code cell.
    pub fn join(cell: CellRecord, shared: S) -> Result<Self, SyncError> {
        let mut engine = Self::detached(cell, shared);
        with_guard(&mut engine, Self::pull_all)?;
        debug!(cell = %engine.cell.id(), "engine joined shared document");
        Ok(engine)
    }

    fn detached(cell: CellRecord, shared: S) -> Self {
        Self {
            cell,
            shared,
            guard: ReentrancyGuard::new(),
            stats: SyncStats::default(),
        }
    }

    #[must_use]
    pub const fn cell(&self) -> &CellRecord {
        &self.cell
    }

    #[must_use]
    pub const fn shared(&self) -> &S {
        &self.shared
    }

    #[must_use]
    pub const fn stats(&self) -> SyncStats {
        self.stats
    }

    #[must_use]
    pub const fn guard(&self) -> &ReentrancyGuard {
        &self.guard
    }

    pub fn subscribe(&mut self, subscriber: impl FnMut(&CellEvent) + 'static) -> SubscriptionId {
        self.cell.subscribe(subscriber)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.cell.unsubscribe(id)
    }

    /// Swap in another shared document and return the previous one.
    ///
    /// With `reinitialize` the cell adopts the new document's state;
    /// otherwise the cell's state is pushed into it.
    ///
    /// # Errors
    ///
    /// As for [`SyncEngine::join`] or [`SyncEngine::new`].
    pub fn switch_shared(&mut self, shared: S, reinitialize: bool) -> Result<S, SyncError> {
        let previous = std::mem::replace(&mut self.shared, shared);
        if reinitialize {
            with_guard(self, Self::pull_all)?;
        } else {
            with_guard(self, Self::push_all)?;
        }
        debug!(cell = %self.cell.id(), reinitialize, "switched shared document");
        Ok(previous)
    }

    /// Dispose the cell; further edits fail with [`SyncError::Disposed`].
    pub fn dispose(&mut self) {
        self.cell.dispose();
    }

    /// Run one local edit against the cell and mirror its changes.
    ///
    /// # Errors
    ///
    /// Whatever the edit returns, plus fatal translation errors.
    pub fn edit(
        &mut self,
        edit: impl FnOnce(&mut CellRecord) -> Result<Vec<LocalChange>, SyncError>,
    ) -> Result<(), SyncError> {
        let changes = edit(&mut self.cell)?;
        self.on_local_changes(&changes)
    }

    /// # Errors
    ///
    /// See [`CellRecord::set_source`].
    pub fn set_source(&mut self, text: &str) -> Result<(), SyncError> {
        self.edit(|cell| cell.set_source(text))
    }

    /// # Errors
    ///
    /// See [`CellRecord::set_metadata`].
    pub fn set_metadata(&mut self, key: &str, value: Value) -> Result<(), SyncError> {
        self.edit(|cell| cell.set_metadata(key, value))
    }

    /// # Errors
    ///
    /// See [`CellRecord::delete_metadata`].
    pub fn delete_metadata(&mut self, key: &str) -> Result<(), SyncError> {
        self.edit(|cell| cell.delete_metadata(key))
    }

    /// Trust is local-only and never reaches the shared document.
    ///
    /// # Errors
    ///
    /// See [`CellRecord::set_trusted`].
    pub fn set_trusted(&mut self, trusted: bool) -> Result<(), SyncError> {
        self.edit(|cell| cell.set_trusted(trusted))
    }

    /// # Errors
    ///
    /// See [`CellRecord::set_execution_count`].
    pub fn set_execution_count(&mut self, count: Option<ExecutionCount>) -> Result<(), SyncError> {
        self.edit(|cell| cell.set_execution_count(count))
    }

    /// # Errors
    ///
    /// See [`CellRecord::add_outputs`].
    pub fn add_outputs(&mut self, values: Vec<OutputRecord>, at: usize) -> Result<(), SyncError> {
        self.edit(|cell| cell.add_outputs(values, at))
    }

    /// # Errors
    ///
    /// See [`CellRecord::push_output`].
    pub fn push_output(&mut self, value: OutputRecord) -> Result<(), SyncError> {
        self.edit(|cell| cell.push_output(value))
    }

    /// # Errors
    ///
    /// See [`CellRecord::set_outputs`].
    pub fn set_outputs(&mut self, values: Vec<OutputRecord>, at: usize) -> Result<(), SyncError> {
        self.edit(|cell| cell.set_outputs(values, at))
    }

    /// # Errors
    ///
    /// See [`CellRecord::remove_outputs`].
    pub fn remove_outputs(&mut self, at: usize, count: usize) -> Result<(), SyncError> {
        self.edit(|cell| cell.remove_outputs(at, count))
    }

    /// # Errors
    ///
    /// See [`CellRecord::clear_outputs`].
    pub fn clear_outputs(&mut self) -> Result<(), SyncError> {
        self.edit(CellRecord::clear_outputs)
    }

    /// Always fails once the local move happened: a move has no range-patch
    /// form.
    ///
    /// # Errors
    ///
    /// [`SyncError::InvalidLedgerEvent`] for any effective move.
    pub fn move_output(&mut self, from: usize, to: usize) -> Result<(), SyncError> {
        self.edit(|cell| cell.move_output(from, to))
    }

    /// # Errors
    ///
    /// See [`CellRecord::replace_outputs`].
    pub fn replace_outputs(&mut self, values: Vec<OutputRecord>) -> Result<(), SyncError> {
        self.edit(|cell| cell.replace_outputs(values))
    }

    /// # Errors
    ///
    /// See [`CellRecord::clear_execution`].
    pub fn clear_execution(&mut self) -> Result<(), SyncError> {
        self.edit(CellRecord::clear_execution)
    }

    /// # Errors
    ///
    /// See [`CellRecord::set_attachment`].
    pub fn set_attachment(&mut self, name: &str, bundle: MimeBundle) -> Result<(), SyncError> {
        self.edit(|cell| cell.set_attachment(name, bundle))
    }

    /// # Errors
    ///
    /// See [`CellRecord::remove_attachment`].
    pub fn remove_attachment(&mut self, name: &str) -> Result<(), SyncError> {
        self.edit(|cell| cell.remove_attachment(name))
    }

    /// Let a remote peer edit the shared document, then apply the event it
    /// raised.
    ///
    /// # Errors
    ///
    /// The edit's own error, or any error from applying the event.
    pub fn apply_remote(
        &mut self,
        edit: impl FnOnce(&mut S) -> Result<SharedChange, SyncError>,
    ) -> Result<(), SyncError> {
        let change = edit(&mut self.shared)?;
        self.on_shared_change(change)
    }

    /// Apply a change event delivered in JSON form.
    ///
    /// # Errors
    ///
    /// [`SyncError::ProtocolViolation`] for undecodable events.
    pub fn apply_shared_json(&mut self, text: &str) -> Result<(), SyncError> {
        let change = SharedChange::from_json(text)?;
        self.on_shared_change(change)
    }

    /// Receiving handler for shared-document change events.
    ///
    /// # Errors
    ///
    /// [`SyncError::ProtocolViolation`] for outputs or count changes on a
    /// non-code cell; local mutation errors otherwise.
    pub fn on_shared_change(&mut self, change: SharedChange) -> Result<(), SyncError> {
        if change.is_empty() {
            return Ok(());
        }
        if self.guard.is_held() {
            self.guard.note_suppressed();
            self.stats.suppressed_shared += 1;
            trace!(cell = %self.cell.id(), "suppressed shared echo");
            return Ok(());
        }
        with_guard(self, |engine| engine.pull(&change))
    }

    /// Receiving handler for local change events.
    fn on_local_changes(&mut self, changes: &[LocalChange]) -> Result<(), SyncError> {
        if changes.is_empty() {
            return Ok(());
        }
        if self.guard.is_held() {
            self.guard.note_suppressed();
            self.stats.suppressed_local += 1;
            trace!(cell = %self.cell.id(), count = changes.len(), "suppressed local echo");
            return Ok(());
        }
        with_guard(self, |engine| engine.push(changes))
    }

    fn push(&mut self, changes: &[LocalChange]) -> Result<(), SyncError> {
        let mut shared_metadata = None;
        for change in changes {
            match change {
                LocalChange::Source { new, .. } => {
                    let echo = self.shared.set_source(new);
                    self.wrote(echo)?;
                }
                LocalChange::Metadata(change) => {
                    let map = shared_metadata.get_or_insert_with(|| self.shared.get_metadata());
                    metadata::apply_change(map, change);
                }
                LocalChange::Outputs(change) => {
                    let patch = translate(change)?;
                    let echo = self
                        .shared
                        .update_outputs(patch.start, patch.end, patch.values)?;
                    self.wrote(echo)?;
                }
                LocalChange::ExecutionCount { new, .. } => {
                    let echo = self.shared.set_execution_count(count_to_shared(*new));
                    self.wrote(echo)?;
                }
                LocalChange::Trusted { .. } | LocalChange::Attachment { .. } => {}
            }
        }
        if let Some(map) = shared_metadata {
            let echo = self.shared.set_metadata(map);
            self.wrote(echo)?;
        }
        Ok(())
    }

    fn push_all(&mut self) -> Result<(), SyncError> {
        let echo = self.shared.set_source(self.cell.source());
        self.wrote(echo)?;
        let echo = self.shared.set_metadata(self.cell.metadata().to_map());
        self.wrote(echo)?;
        if self.cell.kind().is_code() {
            let outputs = self.cell.outputs()?.to_serializable();
            let len = self.shared.get_outputs().len();
            let echo = self.shared.update_outputs(0, len, outputs)?;
            self.wrote(echo)?;
            let count = self.cell.execution_count()?;
            let echo = self.shared.set_execution_count(count_to_shared(count));
            self.wrote(echo)?;
        }
        Ok(())
    }

    fn wrote(&mut self, echo: SharedChange) -> Result<(), SyncError> {
        self.stats.local_to_shared += 1;
        self.on_shared_change(echo)
    }

    fn pull(&mut self, change: &SharedChange) -> Result<(), SyncError> {
        let kind = self.cell.kind();
        if !kind.is_code()
            && (change.outputs_change.is_some() || change.execution_count_change.is_some())
        {
            return Err(SyncError::ProtocolViolation(format!(
                "outputs or execution count change on a {kind} cell"
            )));
        }
        self.stats.shared_to_local += 1;
        debug!(cell = %self.cell.id(), "applying shared change");

        if change.source_change.is_some() {
            self.pull_source()?;
        }
        if change.metadata_change.is_some() {
            self.pull_metadata()?;
        }
        if change.outputs_change.is_some() {
            self.pull_outputs()?;
        }
        if change.execution_count_change.is_some() {
            self.pull_execution_count()?;
        }
        Ok(())
    }

    fn pull_all(&mut self) -> Result<(), SyncError> {
        self.pull_source()?;
        self.pull_metadata()?;
        if self.cell.kind().is_code() {
            self.pull_outputs()?;
            self.pull_execution_count()?;
        } else if !self.shared.get_outputs().is_empty() || self.shared.execution_count().is_some()
        {
            return Err(SyncError::ProtocolViolation(format!(
                "shared document carries outputs for a {} cell",
                self.cell.kind()
            )));
        }
        Ok(())
    }

    fn pull_source(&mut self) -> Result<(), SyncError> {
        let text = self.shared.get_source();
        let changes = self.cell.set_source(&text)?;
        self.on_local_changes(&changes)?;
        if self.cell.source() != text {
            self.stats.reconciled += 1;
            let echo = self.shared.set_source(self.cell.source());
            self.wrote(echo)?;
        }
        Ok(())
    }

    /// Deletes local keys the document lacks, then sets every remote key
    /// with `collapsed` last so it wins the alias pair.
    fn pull_metadata(&mut self) -> Result<(), SyncError> {
        let remote = self.shared.get_metadata();
        let stale: Vec<String> = self
            .cell
            .metadata()
            .keys()
            .filter(|key| !remote.contains_key(*key))
            .map(str::to_string)
            .collect();

        let mut changes = Vec::new();
        for key in &stale {
            changes.extend(self.cell.delete_metadata(key)?);
        }
        let collapsed = remote.get(alias::COLLAPSED).cloned();
        for (key, value) in &remote {
            if key != alias::COLLAPSED {
                changes.extend(self.cell.set_metadata(key, value.clone())?);
            }
        }
        if let Some(value) = collapsed {
            changes.extend(self.cell.set_metadata(alias::COLLAPSED, value)?);
        }
        self.on_local_changes(&changes)?;

        if self.cell.metadata().as_map() != &remote {
            self.stats.reconciled += 1;
            let echo = self.shared.set_metadata(self.cell.metadata().to_map());
            self.wrote(echo)?;
        }
        Ok(())
    }

    fn pull_outputs(&mut self) -> Result<(), SyncError> {
        let values = self.shared.get_outputs();
        let changes = self.cell.replace_outputs(values)?;
        self.on_local_changes(&changes)
    }

    fn pull_execution_count(&mut self) -> Result<(), SyncError> {
        let remote = self.shared.execution_count();
        let count = remote.and_then(ExecutionCount::from_i64);
        let changes = self.cell.set_execution_count(count)?;
        self.on_local_changes(&changes)?;
        if count_to_shared(count) != remote {
            self.stats.reconciled += 1;
            let echo = self.shared.set_execution_count(count_to_shared(count));
            self.wrote(echo)?;
        }
        Ok(())
    }
}

fn count_to_shared(count: Option<ExecutionCount>) -> Option<i64> {
    count.and_then(|c| i64::try_from(c.get()).ok())
}
