//! Operations the simulator performs against one engine.
//!
//! Local operations go through the engine's mutators, as an editor would.
//! Remote operations write straight into the shared document and deliver the
//! resulting change event, as a collaborator's edit would arrive.

use cellsync_core::execution::ExecutionCount;
use cellsync_core::model::CellKind;
use cellsync_core::outputs::OutputLedger;
use cellsync_core::shared::{MemorySharedCell, SharedCell};
use cellsync_core::{SyncEngine, SyncError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::rng::DeterministicRng;

/// Who performed an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Actor {
    Local,
    Remote,
}

/// Cell field an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Source,
    Metadata,
    Outputs,
    ExecutionCount,
    /// Local-only state (trust, attachments).
    LocalOnly,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum CellOp {
    SetSource { text: String },
    SetMetadata { key: String, value: Value },
    DeleteMetadata { key: String },
    SetTrusted { trusted: bool },
    SetExecutionCount { count: Option<u64> },
    AddOutputs { at: usize, values: Vec<Value> },
    PushOutput { value: Value },
    SetOutputs { at: usize, values: Vec<Value> },
    RemoveOutputs { at: usize, count: usize },
    ClearOutputs,
    ClearExecution,
    SetAttachment { name: String },
    RemoveAttachment { name: String },

    RemoteSource { text: String },
    RemoteMetadata { metadata: Map<String, Value> },
    RemoteOutputs { start: usize, end: usize, values: Vec<Value> },
    RemoteExecutionCount { count: Option<i64> },
    /// A collaborator's kernel run: new count and replaced outputs, raised as
    /// one event.
    RemoteRun { count: Option<i64>, values: Vec<Value> },
}

impl CellOp {
    #[must_use]
    pub const fn actor(&self) -> Actor {
        match self {
            Self::RemoteSource { .. }
            | Self::RemoteMetadata { .. }
            | Self::RemoteOutputs { .. }
            | Self::RemoteExecutionCount { .. }
            | Self::RemoteRun { .. } => Actor::Remote,
            _ => Actor::Local,
        }
    }

    /// The field this operation writes first. `ClearExecution` touches
    /// several fields and reports `Outputs`; `RemoteRun` reports
    /// `ExecutionCount`.
    #[must_use]
    pub const fn field(&self) -> Field {
        match self {
            Self::SetSource { .. } | Self::RemoteSource { .. } => Field::Source,
            Self::SetMetadata { .. } | Self::DeleteMetadata { .. } | Self::RemoteMetadata { .. } => {
                Field::Metadata
            }
            Self::SetExecutionCount { .. }
            | Self::RemoteExecutionCount { .. }
            | Self::RemoteRun { .. } => Field::ExecutionCount,
            Self::AddOutputs { .. }
            | Self::PushOutput { .. }
            | Self::SetOutputs { .. }
            | Self::RemoveOutputs { .. }
            | Self::ClearOutputs
            | Self::ClearExecution
            | Self::RemoteOutputs { .. } => Field::Outputs,
            Self::SetTrusted { .. } | Self::SetAttachment { .. } | Self::RemoveAttachment { .. } => {
                Field::LocalOnly
            }
        }
    }

    /// Perform the operation.
    ///
    /// # Errors
    ///
    /// Whatever the engine or the shared document reports. Out-of-range
    /// indices are expected and leave state untouched; fatal errors are
    /// findings.
    pub fn apply(&self, engine: &mut SyncEngine<MemorySharedCell>) -> Result<(), SyncError> {
        match self {
            Self::SetSource { text } => engine.set_source(text),
            Self::SetMetadata { key, value } => engine.set_metadata(key, value.clone()),
            Self::DeleteMetadata { key } => engine.delete_metadata(key),
            Self::SetTrusted { trusted } => engine.set_trusted(*trusted),
            Self::SetExecutionCount { count } => {
                engine.set_execution_count(count.and_then(ExecutionCount::new))
            }
            Self::AddOutputs { at, values } => engine.add_outputs(values.clone(), *at),
            Self::PushOutput { value } => engine.push_output(value.clone()),
            Self::SetOutputs { at, values } => engine.set_outputs(values.clone(), *at),
            Self::RemoveOutputs { at, count } => engine.remove_outputs(*at, *count),
            Self::ClearOutputs => engine.clear_outputs(),
            Self::ClearExecution => engine.clear_execution(),
            Self::SetAttachment { name } => {
                let mut bundle = Map::new();
                bundle.insert("image/png".to_string(), json!(format!("{name}-bytes")));
                engine.set_attachment(name, bundle)
            }
            Self::RemoveAttachment { name } => engine.remove_attachment(name),
            Self::RemoteSource { text } => engine.apply_remote(|shared| Ok(shared.set_source(text))),
            Self::RemoteMetadata { metadata } => {
                engine.apply_remote(|shared| Ok(shared.set_metadata(metadata.clone())))
            }
            Self::RemoteOutputs { start, end, values } => {
                engine.apply_remote(|shared| shared.update_outputs(*start, *end, values.clone()))
            }
            Self::RemoteExecutionCount { count } => {
                engine.apply_remote(|shared| Ok(shared.set_execution_count(*count)))
            }
            Self::RemoteRun { count, values } => engine.apply_remote(|shared| {
                let mut change = shared.set_execution_count(*count);
                let end = shared.get_outputs().len();
                change.merge(shared.update_outputs(0, end, values.clone())?);
                Ok(change)
            }),
        }
    }
}

// Small pools so identical values recur and redundant writes get exercised.
const SOURCES: &[&str] = &[
    "",
    "x = 1",
    "x = 1\n",
    "  x = 1  ",
    "print(1)\r\n",
    "for i in range(3):\r\n    print(i)\r",
    "é = 'ü'",
];
const METADATA_KEYS: &[&str] = &["collapsed", "jupyter", "tags", "execution"];
const ATTACHMENT_NAMES: &[&str] = &["plot.png", "logo.png"];

fn metadata_value(rng: &mut DeterministicRng, key: &str) -> Value {
    let flag = rng.hit_rate_percent(50);
    match key {
        "collapsed" => match rng.next_bounded(4) {
            0 => json!("yes"),
            _ => json!(flag),
        },
        "jupyter" => match rng.next_bounded(4) {
            0 => json!({ "source_hidden": flag }),
            1 => json!({ "outputs_hidden": flag, "source_hidden": true }),
            _ => json!({ "outputs_hidden": flag }),
        },
        "tags" => json!([if flag { "slow" } else { "setup" }]),
        _ => json!({ "iopub.status.busy": rng.next_bounded(3) }),
    }
}

fn output_record(rng: &mut DeterministicRng) -> Value {
    match rng.next_bounded(3) {
        0 => json!({ "output_type": "stream", "name": "stdout", "text": format!("{}\n", rng.next_bounded(4)) }),
        1 => json!({
            "output_type": "execute_result",
            "data": { "text/plain": rng.next_bounded(4).to_string() },
            "metadata": {}
        }),
        _ => json!({ "output_type": "error", "ename": "ValueError", "evalue": "bad", "traceback": [] }),
    }
}

fn output_records(rng: &mut DeterministicRng, max: u64) -> Vec<Value> {
    (0..rng.next_bounded(max + 1)).map(|_| output_record(rng)).collect()
}

fn source_text(rng: &mut DeterministicRng) -> String {
    rng.pick(SOURCES).copied().unwrap_or_default().to_string()
}

fn metadata_key(rng: &mut DeterministicRng) -> String {
    rng.pick(METADATA_KEYS).copied().unwrap_or("tags").to_string()
}

fn attachment_name(rng: &mut DeterministicRng) -> String {
    rng.pick(ATTACHMENT_NAMES).copied().unwrap_or("plot.png").to_string()
}

/// Produces the next operation from the current engine state.
///
/// Indices are drawn slightly past the end of the output list so that rejected
/// operations occur alongside accepted ones.
#[derive(Debug, Clone)]
pub struct OpGenerator {
    kind: CellKind,
    remote_percent: u8,
}

impl OpGenerator {
    #[must_use]
    pub const fn new(kind: CellKind, remote_percent: u8) -> Self {
        Self {
            kind,
            remote_percent,
        }
    }

    pub fn next_op(
        &self,
        rng: &mut DeterministicRng,
        engine: &SyncEngine<MemorySharedCell>,
    ) -> CellOp {
        if rng.hit_rate_percent(self.remote_percent) {
            self.remote_op(rng, engine)
        } else {
            self.local_op(rng, engine)
        }
    }

    fn local_op(&self, rng: &mut DeterministicRng, engine: &SyncEngine<MemorySharedCell>) -> CellOp {
        let shared_choices = 4;
        let facet_choices = if self.kind.is_code() { 8 } else { 2 };
        let choice = rng.next_bounded(shared_choices + facet_choices);
        match choice {
            0 => CellOp::SetSource {
                text: source_text(rng),
            },
            1 => {
                let key = metadata_key(rng);
                let value = metadata_value(rng, &key);
                CellOp::SetMetadata { key, value }
            }
            2 => CellOp::DeleteMetadata {
                key: metadata_key(rng),
            },
            3 => CellOp::SetTrusted {
                trusted: rng.hit_rate_percent(50),
            },
            _ if self.kind.is_code() => code_op(rng, engine, choice - shared_choices),
            _ if rng.hit_rate_percent(70) => CellOp::SetAttachment {
                name: attachment_name(rng),
            },
            _ => CellOp::RemoveAttachment {
                name: attachment_name(rng),
            },
        }
    }

    fn remote_op(&self, rng: &mut DeterministicRng, engine: &SyncEngine<MemorySharedCell>) -> CellOp {
        let choices = if self.kind.is_code() { 5 } else { 2 };
        match rng.next_bounded(choices) {
            0 => CellOp::RemoteSource {
                text: source_text(rng),
            },
            1 => {
                let mut metadata = engine.shared().get_metadata();
                for _ in 0..=rng.next_bounded(2) {
                    let key = metadata_key(rng);
                    if rng.hit_rate_percent(25) {
                        metadata.remove(&key);
                    } else {
                        let value = metadata_value(rng, &key);
                        metadata.insert(key, value);
                    }
                }
                CellOp::RemoteMetadata { metadata }
            }
            2 => {
                let len = engine.shared().get_outputs().len();
                let start = rng.next_index(len + 1);
                let end = start + rng.next_index(len - start + 1);
                CellOp::RemoteOutputs {
                    start,
                    end,
                    values: output_records(rng, 2),
                }
            }
            3 => CellOp::RemoteExecutionCount {
                count: remote_count(rng),
            },
            _ => CellOp::RemoteRun {
                count: remote_count(rng),
                values: output_records(rng, 2),
            },
        }
    }
}

fn remote_count(rng: &mut DeterministicRng) -> Option<i64> {
    match rng.next_bounded(5) {
        0 => None,
        1 => Some(0),
        2 => Some(-1),
        _ => Some(i64::try_from(1 + rng.next_bounded(5)).unwrap_or(1)),
    }
}

fn code_op(rng: &mut DeterministicRng, engine: &SyncEngine<MemorySharedCell>, choice: u64) -> CellOp {
    let len = engine.cell().outputs().map_or(0, OutputLedger::len);
    match choice {
        0 => CellOp::AddOutputs {
            at: rng.next_index(len + 2),
            values: output_records(rng, 2),
        },
        1 => CellOp::PushOutput {
            value: output_record(rng),
        },
        2 => CellOp::SetOutputs {
            at: rng.next_index(len + 1),
            values: output_records(rng, 2),
        },
        3 => CellOp::RemoveOutputs {
            at: rng.next_index(len + 1),
            count: rng.next_index(3),
        },
        4 => CellOp::ClearOutputs,
        5 => CellOp::ClearExecution,
        _ => CellOp::SetExecutionCount {
            count: match rng.next_bounded(4) {
                0 => None,
                n => Some(n),
            },
        },
    }
}
