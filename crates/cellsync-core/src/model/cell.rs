use serde::Serialize;
use serde_json::Value;
use tracing::trace;

use super::attachments::{Attachments, MimeBundle};
use super::factory::{ContentFactory, DefaultContentFactory};
use super::kind::CellKind;
use crate::error::SyncError;
use crate::events::{CellEvent, Signal, StateChange, StateName, SubscriptionId};
use crate::execution::{ExecutionCount, ExecutionState, ExecutionTracker};
use crate::metadata::{EXECUTION, Metadata, MetadataChange, alias};
use crate::nbformat::{
    CodeCellJson, NotebookCell, Source, TRUSTED_KEY, TextCellJson, normalize_line_endings,
    is_truthy, strip_foreign_metadata,
};
use crate::outputs::{ListChange, OutputLedger, OutputRecord};

/// One observable mutation of a [`CellRecord`], as handed to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "field", rename_all = "snake_case")]
pub enum LocalChange {
    Source {
        old: String,
        new: String,
    },
    Metadata(MetadataChange),
    Outputs(ListChange),
    ExecutionCount {
        old: Option<ExecutionCount>,
        new: Option<ExecutionCount>,
    },
    Trusted {
        old: bool,
        new: bool,
    },
    Attachment {
        name: String,
    },
}

/// Execution facet of a code cell.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionFacet {
    pub outputs: OutputLedger,
    pub tracker: ExecutionTracker,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum CellBody {
    Code(ExecutionFacet),
    Markdown(Attachments),
    Raw(Attachments),
}

impl CellBody {
    fn empty(kind: CellKind, factory: &dyn ContentFactory) -> Self {
        match kind {
            CellKind::Code => Self::Code(ExecutionFacet {
                outputs: factory.create_output_ledger(Vec::new(), false),
                tracker: ExecutionTracker::default(),
            }),
            CellKind::Markdown => {
                Self::Markdown(factory.create_attachments(None).unwrap_or_default())
            }
            CellKind::Raw => Self::Raw(factory.create_attachments(None).unwrap_or_default()),
        }
    }

    const fn kind(&self) -> CellKind {
        match self {
            Self::Code(_) => CellKind::Code,
            Self::Markdown(_) => CellKind::Markdown,
            Self::Raw(_) => CellKind::Raw,
        }
    }

    fn execution(&self, facet: &'static str) -> Result<&ExecutionFacet, SyncError> {
        match self {
            Self::Code(execution) => Ok(execution),
            other => Err(SyncError::KindMismatch {
                kind: other.kind(),
                facet,
            }),
        }
    }

    fn execution_mut(&mut self, facet: &'static str) -> Result<&mut ExecutionFacet, SyncError> {
        match self {
            Self::Code(execution) => Ok(execution),
            other => Err(SyncError::KindMismatch {
                kind: other.kind(),
                facet,
            }),
        }
    }

    fn attachments(&self) -> Result<&Attachments, SyncError> {
        match self {
            Self::Markdown(attachments) | Self::Raw(attachments) => Ok(attachments),
            Self::Code(_) => Err(SyncError::KindMismatch {
                kind: CellKind::Code,
                facet: "attachments",
            }),
        }
    }

    fn attachments_mut(&mut self) -> Result<&mut Attachments, SyncError> {
        match self {
            Self::Markdown(attachments) | Self::Raw(attachments) => Ok(attachments),
            Self::Code(_) => Err(SyncError::KindMismatch {
                kind: CellKind::Code,
                facet: "attachments",
            }),
        }
    }
}

/// Authoritative local state of one notebook cell.
///
/// Every mutator returns the [`LocalChange`]s it caused (empty when the call
/// was redundant) and notifies subscribers before returning. Facet operations
/// on the wrong kind fail with [`SyncError::KindMismatch`] and change nothing.
#[derive(Debug)]
pub struct CellRecord {
    id: String,
    source: String,
    metadata: Metadata,
    trusted: bool,
    body: CellBody,
    signal: Signal<CellEvent>,
    disposed: bool,
}

impl CellRecord {
    /// Empty cell with a fresh UUID v4 id.
    #[must_use]
    pub fn new(kind: CellKind) -> Self {
        Self::with_id(kind, uuid::Uuid::new_v4().to_string())
    }

    #[must_use]
    pub fn with_id(kind: CellKind, id: impl Into<String>) -> Self {
        Self::with_factory(kind, id, &DefaultContentFactory)
    }

    #[must_use]
    pub fn with_factory(
        kind: CellKind,
        id: impl Into<String>,
        factory: &dyn ContentFactory,
    ) -> Self {
        Self {
            id: id.into(),
            source: String::new(),
            metadata: Metadata::new(),
            trusted: false,
            body: CellBody::empty(kind, factory),
            signal: Signal::new(),
            disposed: false,
        }
    }

    /// Build a cell from its nbformat JSON.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::MalformedCell`] when attachments are not MIME bundles.
    pub fn from_notebook(cell: &NotebookCell) -> Result<Self, SyncError> {
        Self::from_notebook_with(cell, &DefaultContentFactory)
    }

    /// Build a cell from its nbformat JSON with injected sub-stores.
    ///
    /// `metadata.trusted` becomes the trusted flag and is removed from the
    /// map. Keys foreign to the cell kind are dropped and, for code cells,
    /// the `collapsed` alias pair is reconciled.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::MalformedCell`] when attachments are not MIME bundles.
    pub fn from_notebook_with(
        cell: &NotebookCell,
        factory: &dyn ContentFactory,
    ) -> Result<Self, SyncError> {
        let kind = cell.kind();
        let id = cell
            .id()
            .filter(|id| !id.is_empty())
            .map_or_else(|| uuid::Uuid::new_v4().to_string(), str::to_string);

        let mut raw_metadata = cell.metadata().clone();
        let trusted = raw_metadata.remove(TRUSTED_KEY).is_some_and(|v| is_truthy(&v));
        strip_foreign_metadata(kind, &mut raw_metadata);
        let mut metadata = Metadata::from_map(raw_metadata);
        let source = cell.source().to_text();

        let body = match cell {
            NotebookCell::Code(code) => {
                alias::initialize(&mut metadata);
                let count = code.execution_count.and_then(ExecutionCount::from_i64);
                CellBody::Code(ExecutionFacet {
                    outputs: factory.create_output_ledger(code.outputs.clone(), trusted),
                    tracker: ExecutionTracker::new(count, &source),
                })
            }
            NotebookCell::Markdown(text) => {
                CellBody::Markdown(factory.create_attachments(text.attachments.as_ref())?)
            }
            NotebookCell::Raw(text) => {
                CellBody::Raw(factory.create_attachments(text.attachments.as_ref())?)
            }
        };

        Ok(Self {
            id,
            source,
            metadata,
            trusted,
            body,
            signal: Signal::new(),
            disposed: false,
        })
    }

    /// nbformat JSON form.
    ///
    /// Keys foreign to the cell kind are left out even when an edit put them
    /// in the map; `trusted` always reflects the flag, not the map.
    #[must_use]
    pub fn to_notebook(&self) -> NotebookCell {
        let mut metadata = self.metadata.to_map();
        strip_foreign_metadata(self.kind(), &mut metadata);
        metadata.remove(TRUSTED_KEY);
        if self.trusted {
            metadata.insert(TRUSTED_KEY.to_string(), Value::Bool(true));
        }
        let id = Some(self.id.clone());
        let source = Source::Text(self.source.clone());

        match &self.body {
            CellBody::Code(execution) => NotebookCell::Code(CodeCellJson {
                id,
                source,
                metadata,
                execution_count: execution
                    .tracker
                    .count()
                    .and_then(|c| i64::try_from(c.get()).ok()),
                outputs: execution.outputs.to_serializable(),
            }),
            CellBody::Markdown(attachments) | CellBody::Raw(attachments) => {
                let text = TextCellJson {
                    id,
                    source,
                    metadata,
                    attachments: (!attachments.is_empty()).then(|| attachments.to_json()),
                };
                if self.kind() == CellKind::Markdown {
                    NotebookCell::Markdown(text)
                } else {
                    NotebookCell::Raw(text)
                }
            }
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub const fn kind(&self) -> CellKind {
        self.body.kind()
    }

    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    #[must_use]
    pub const fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    #[must_use]
    pub const fn trusted(&self) -> bool {
        self.trusted
    }

    #[must_use]
    pub const fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// # Errors
    ///
    /// [`SyncError::KindMismatch`] for markdown and raw cells.
    pub fn outputs(&self) -> Result<&OutputLedger, SyncError> {
        Ok(&self.body.execution("outputs")?.outputs)
    }

    /// # Errors
    ///
    /// [`SyncError::KindMismatch`] for markdown and raw cells.
    pub fn execution_count(&self) -> Result<Option<ExecutionCount>, SyncError> {
        Ok(self.body.execution("execution count")?.tracker.count())
    }

    /// # Errors
    ///
    /// [`SyncError::KindMismatch`] for markdown and raw cells.
    pub fn is_dirty(&self) -> Result<bool, SyncError> {
        Ok(self.body.execution("execution state")?.tracker.is_dirty())
    }

    /// # Errors
    ///
    /// [`SyncError::KindMismatch`] for markdown and raw cells.
    pub fn execution_state(&self) -> Result<ExecutionState, SyncError> {
        Ok(self.body.execution("execution state")?.tracker.state())
    }

    /// # Errors
    ///
    /// [`SyncError::KindMismatch`] for markdown and raw cells.
    pub fn executed_snapshot(&self) -> Result<&str, SyncError> {
        Ok(self
            .body
            .execution("execution state")?
            .tracker
            .executed_snapshot())
    }

    /// # Errors
    ///
    /// [`SyncError::KindMismatch`] for code cells.
    pub fn attachments(&self) -> Result<&Attachments, SyncError> {
        self.body.attachments()
    }

    pub fn subscribe(&mut self, subscriber: impl FnMut(&CellEvent) + 'static) -> SubscriptionId {
        self.signal.connect(subscriber)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.signal.disconnect(id)
    }

    /// Replace the source text; line endings are normalized first.
    ///
    /// # Errors
    ///
    /// [`SyncError::Disposed`] after disposal.
    pub fn set_source(&mut self, text: &str) -> Result<Vec<LocalChange>, SyncError> {
        self.ensure_live()?;
        let text = normalize_line_endings(text);
        if text == self.source {
            return Ok(Vec::new());
        }
        let old = std::mem::replace(&mut self.source, text.clone());
        let dirty = match &mut self.body {
            CellBody::Code(execution) => execution.tracker.on_source_changed(&self.source),
            _ => None,
        };
        trace!(cell = %self.id, len = text.len(), "source set");
        self.notify(true, dirty.as_slice());
        Ok(vec![LocalChange::Source { old, new: text }])
    }

    /// Set one metadata key. On code cells the alias partner is reconciled in
    /// the same step and reported in the returned changes.
    ///
    /// # Errors
    ///
    /// [`SyncError::Disposed`] after disposal.
    pub fn set_metadata(
        &mut self,
        key: &str,
        value: Value,
    ) -> Result<Vec<LocalChange>, SyncError> {
        self.ensure_live()?;
        let Some(change) = self.metadata.set(key, value.clone()) else {
            return Ok(Vec::new());
        };
        let mut changes = vec![change];
        if self.kind().is_code() {
            changes.extend(alias::resolve(&mut self.metadata, key, Some(&value)));
        }
        Ok(self.finish_metadata(changes))
    }

    /// Remove one metadata key.
    ///
    /// # Errors
    ///
    /// [`SyncError::Disposed`] after disposal.
    pub fn delete_metadata(&mut self, key: &str) -> Result<Vec<LocalChange>, SyncError> {
        self.ensure_live()?;
        let Some(change) = self.metadata.delete(key) else {
            return Ok(Vec::new());
        };
        let mut changes = vec![change];
        if self.kind().is_code() {
            changes.extend(alias::resolve(&mut self.metadata, key, None));
        }
        Ok(self.finish_metadata(changes))
    }

    /// # Errors
    ///
    /// [`SyncError::Disposed`] after disposal.
    pub fn set_trusted(&mut self, trusted: bool) -> Result<Vec<LocalChange>, SyncError> {
        self.ensure_live()?;
        if trusted == self.trusted {
            return Ok(Vec::new());
        }
        let old = std::mem::replace(&mut self.trusted, trusted);
        if let CellBody::Code(execution) = &mut self.body {
            execution.outputs.set_trusted(trusted);
        }
        self.notify(false, &[StateChange::new(StateName::Trusted, old, trusted)]);
        Ok(vec![LocalChange::Trusted { old, new: trusted }])
    }

    /// Assign the execution count; a non-null count snapshots the current
    /// source and clears the dirty flag.
    ///
    /// # Errors
    ///
    /// [`SyncError::KindMismatch`] for markdown and raw cells;
    /// [`SyncError::Disposed`] after disposal.
    pub fn set_execution_count(
        &mut self,
        count: Option<ExecutionCount>,
    ) -> Result<Vec<LocalChange>, SyncError> {
        self.ensure_live()?;
        let execution = self.body.execution_mut("execution count")?;
        let old = execution.tracker.count();
        let states = execution.tracker.assign_count(count, &self.source);
        if states.is_empty() {
            return Ok(Vec::new());
        }
        self.notify(true, &states);
        Ok(vec![LocalChange::ExecutionCount { old, new: count }])
    }

    /// # Errors
    ///
    /// [`SyncError::OutOfRange`] when `at > len`; facet and disposal errors as
    /// for every output mutation.
    pub fn add_outputs(
        &mut self,
        values: Vec<OutputRecord>,
        at: usize,
    ) -> Result<Vec<LocalChange>, SyncError> {
        self.mutate_outputs(|ledger| Ok(ledger.add(values, at)?.into_iter().collect()))
    }

    /// # Errors
    ///
    /// Facet and disposal errors.
    pub fn push_output(&mut self, value: OutputRecord) -> Result<Vec<LocalChange>, SyncError> {
        self.mutate_outputs(|ledger| Ok(vec![ledger.push(value)]))
    }

    /// # Errors
    ///
    /// [`SyncError::OutOfRange`] when the span does not fit.
    pub fn set_outputs(
        &mut self,
        values: Vec<OutputRecord>,
        at: usize,
    ) -> Result<Vec<LocalChange>, SyncError> {
        self.mutate_outputs(|ledger| Ok(ledger.set(values, at)?.into_iter().collect()))
    }

    /// # Errors
    ///
    /// [`SyncError::OutOfRange`] when `at > len`.
    pub fn remove_outputs(&mut self, at: usize, count: usize) -> Result<Vec<LocalChange>, SyncError> {
        self.mutate_outputs(|ledger| Ok(ledger.remove(at, count)?.into_iter().collect()))
    }

    /// # Errors
    ///
    /// Facet and disposal errors.
    pub fn clear_outputs(&mut self) -> Result<Vec<LocalChange>, SyncError> {
        self.mutate_outputs(|ledger| Ok(ledger.clear().into_iter().collect()))
    }

    /// Reorder one output locally. The engine cannot mirror this and rejects
    /// it as an invalid ledger event.
    ///
    /// # Errors
    ///
    /// [`SyncError::OutOfRange`] when either index is not an entry.
    pub fn move_output(&mut self, from: usize, to: usize) -> Result<Vec<LocalChange>, SyncError> {
        self.mutate_outputs(|ledger| Ok(ledger.move_item(from, to)?.into_iter().collect()))
    }

    /// Replace the whole output list (clear, then add).
    ///
    /// # Errors
    ///
    /// Facet and disposal errors.
    pub fn replace_outputs(
        &mut self,
        values: Vec<OutputRecord>,
    ) -> Result<Vec<LocalChange>, SyncError> {
        self.mutate_outputs(|ledger| Ok(ledger.replace_all(values)))
    }

    /// Clear outputs, null the count and drop `metadata.execution`.
    /// Subscribers are notified only after every field is updated.
    ///
    /// # Errors
    ///
    /// [`SyncError::KindMismatch`] for markdown and raw cells;
    /// [`SyncError::Disposed`] after disposal.
    pub fn clear_execution(&mut self) -> Result<Vec<LocalChange>, SyncError> {
        self.ensure_live()?;
        let execution = self.body.execution_mut("execution count")?;
        let mut changes: Vec<LocalChange> = execution
            .outputs
            .clear()
            .map(LocalChange::Outputs)
            .into_iter()
            .collect();
        let old = execution.tracker.count();
        let states = execution.tracker.reset();
        if !states.is_empty() {
            changes.push(LocalChange::ExecutionCount { old, new: None });
        }
        if let Some(change) = self.metadata.delete(EXECUTION) {
            changes.push(LocalChange::Metadata(change));
        }
        if !changes.is_empty() {
            self.notify(true, &states);
        }
        Ok(changes)
    }

    /// # Errors
    ///
    /// [`SyncError::KindMismatch`] for code cells.
    pub fn set_attachment(
        &mut self,
        name: &str,
        bundle: MimeBundle,
    ) -> Result<Vec<LocalChange>, SyncError> {
        self.ensure_live()?;
        if !self.body.attachments_mut()?.set(name, bundle) {
            return Ok(Vec::new());
        }
        self.notify(true, &[]);
        Ok(vec![LocalChange::Attachment {
            name: name.to_string(),
        }])
    }

    /// # Errors
    ///
    /// [`SyncError::KindMismatch`] for code cells.
    pub fn remove_attachment(&mut self, name: &str) -> Result<Vec<LocalChange>, SyncError> {
        self.ensure_live()?;
        if !self.body.attachments_mut()?.remove(name) {
            return Ok(Vec::new());
        }
        self.notify(true, &[]);
        Ok(vec![LocalChange::Attachment {
            name: name.to_string(),
        }])
    }

    /// Release facets and subscribers. Idempotent.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        match &mut self.body {
            CellBody::Code(execution) => *execution = ExecutionFacet::default(),
            CellBody::Markdown(attachments) | CellBody::Raw(attachments) => attachments.clear(),
        }
        self.signal.disconnect_all();
        trace!(cell = %self.id, "disposed");
    }

    fn ensure_live(&self) -> Result<(), SyncError> {
        if self.disposed {
            return Err(SyncError::Disposed {
                id: self.id.clone(),
            });
        }
        Ok(())
    }

    fn mutate_outputs(
        &mut self,
        mutate: impl FnOnce(&mut OutputLedger) -> Result<Vec<ListChange>, SyncError>,
    ) -> Result<Vec<LocalChange>, SyncError> {
        self.ensure_live()?;
        let execution = self.body.execution_mut("outputs")?;
        let changes = mutate(&mut execution.outputs)?;
        if !changes.is_empty() {
            self.notify(true, &[]);
        }
        Ok(changes.into_iter().map(LocalChange::Outputs).collect())
    }

    fn finish_metadata(&mut self, changes: Vec<MetadataChange>) -> Vec<LocalChange> {
        self.notify(true, &[]);
        changes.into_iter().map(LocalChange::Metadata).collect()
    }

    fn notify(&mut self, content_changed: bool, states: &[StateChange]) {
        if content_changed {
            self.signal.emit(&CellEvent::ContentChanged);
        }
        for state in states {
            self.signal.emit(&CellEvent::StateChanged(state.clone()));
        }
    }
}
