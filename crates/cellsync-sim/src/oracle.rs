//! Invariant oracle for simulated edit sequences.
//!
//! Checked after every step:
//!
//! 1. **Consistency**: local cell and shared document hold the same source,
//!    metadata, outputs and execution count.
//! 2. **Alias**: on code cells `collapsed` and `jupyter.outputs_hidden` agree.
//! 3. **Dirty**: a code cell is dirty exactly when it has a count and its
//!    trimmed source differs from the source trimmed at the last count change.
//! 4. **No echo**: a local operation never re-enters the local side and writes
//!    each shared field at most once; a remote operation writes back only for
//!    reconciliation.

use cellsync_core::execution::{ExecutionCount, count_to_json};
use cellsync_core::metadata::alias;
use cellsync_core::outputs::OutputLedger;
use cellsync_core::shared::{MemorySharedCell, MutationCounters, SharedCell};
use cellsync_core::{SyncEngine, SyncStats};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::ops::{Actor, CellOp, Field};

// ── Violation types ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "invariant", rename_all = "snake_case")]
pub enum InvariantViolation {
    /// Local and shared values of a field differ after a step.
    Consistency {
        step: usize,
        field: Field,
        local: Value,
        shared: Value,
    },

    /// The `collapsed` / `jupyter.outputs_hidden` pair disagrees.
    Alias { step: usize, metadata: Value },

    /// `is_dirty` differs from the independently tracked expectation.
    Dirty {
        step: usize,
        expected: bool,
        actual: bool,
    },

    /// Extra traffic caused by a single operation.
    Echo { step: usize, detail: String },

    /// The engine reported a contract breach.
    Fatal { step: usize, message: String },
}

impl InvariantViolation {
    #[must_use]
    pub const fn step(&self) -> usize {
        match self {
            Self::Consistency { step, .. }
            | Self::Alias { step, .. }
            | Self::Dirty { step, .. }
            | Self::Echo { step, .. }
            | Self::Fatal { step, .. } => *step,
        }
    }
}

// ── Oracle result ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OracleResult {
    pub passed: bool,
    pub violations: Vec<InvariantViolation>,
}

impl OracleResult {
    #[must_use]
    pub const fn pass() -> Self {
        Self {
            passed: true,
            violations: Vec::new(),
        }
    }

    #[must_use]
    pub fn fail(violations: Vec<InvariantViolation>) -> Self {
        Self {
            passed: false,
            violations,
        }
    }

    fn from_violations(violations: Vec<InvariantViolation>) -> Self {
        if violations.is_empty() {
            Self::pass()
        } else {
            Self::fail(violations)
        }
    }

    /// Combine two results; passes only when both pass.
    #[must_use]
    pub fn merge(mut self, other: Self) -> Self {
        self.passed = self.passed && other.passed;
        self.violations.extend(other.violations);
        self
    }
}

// ── Traffic snapshot ──────────────────────────────────────────────────────────

/// Counters captured before a step, compared against the state after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepBaseline {
    pub counters: MutationCounters,
    pub stats: SyncStats,
    pub count: Option<ExecutionCount>,
}

impl StepBaseline {
    #[must_use]
    pub fn capture(engine: &SyncEngine<MemorySharedCell>) -> Self {
        Self {
            counters: engine.shared().counters(),
            stats: engine.stats(),
            count: engine.cell().execution_count().ok().flatten(),
        }
    }
}

/// Independent model of the executed snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirtyModel {
    snapshot: Option<String>,
}

impl DirtyModel {
    #[must_use]
    pub fn from_engine(engine: &SyncEngine<MemorySharedCell>) -> Self {
        let cell = engine.cell();
        let snapshot = match cell.execution_count() {
            Ok(Some(_)) => Some(cell.source().trim().to_string()),
            _ => None,
        };
        Self { snapshot }
    }

    /// Record the effect of a step whose baseline count was `before`.
    pub fn observe(&mut self, before: Option<ExecutionCount>, engine: &SyncEngine<MemorySharedCell>) {
        let cell = engine.cell();
        let Ok(after) = cell.execution_count() else {
            return;
        };
        if after != before {
            self.snapshot = after.map(|_| cell.source().trim().to_string());
        }
    }

    #[must_use]
    pub fn expected_dirty(&self, source: &str) -> bool {
        self.snapshot.as_deref().is_some_and(|snap| source.trim() != snap)
    }
}

// ── Oracle ────────────────────────────────────────────────────────────────────

/// Per-step invariant checks. All methods are `#[must_use]`.
pub struct CellOracle;

impl CellOracle {
    /// Run every check for one completed step.
    #[must_use]
    pub fn check_step(
        step: usize,
        op: &CellOp,
        baseline: &StepBaseline,
        model: &DirtyModel,
        engine: &SyncEngine<MemorySharedCell>,
    ) -> OracleResult {
        Self::check_consistency(step, engine)
            .merge(Self::check_alias(step, engine))
            .merge(Self::check_dirty(step, model, engine))
            .merge(Self::check_echo(step, op, baseline, engine))
    }

    // ── Invariant 1: Consistency ─────────────────────────────────────────────

    #[must_use]
    pub fn check_consistency(step: usize, engine: &SyncEngine<MemorySharedCell>) -> OracleResult {
        let cell = engine.cell();
        let shared = engine.shared();
        let mut violations = Vec::new();
        let mut compare = |field: Field, local: Value, shared: Value| {
            if local != shared {
                violations.push(InvariantViolation::Consistency {
                    step,
                    field,
                    local,
                    shared,
                });
            }
        };

        compare(
            Field::Source,
            json!(cell.source()),
            json!(shared.get_source()),
        );
        compare(
            Field::Metadata,
            Value::Object(cell.metadata().to_map()),
            Value::Object(shared.get_metadata()),
        );

        let local_outputs = cell
            .outputs()
            .map(OutputLedger::to_serializable)
            .unwrap_or_default();
        compare(
            Field::Outputs,
            Value::Array(local_outputs),
            Value::Array(shared.get_outputs()),
        );

        let local_count = cell.execution_count().ok().flatten();
        compare(
            Field::ExecutionCount,
            count_to_json(local_count),
            json!(shared.execution_count()),
        );

        OracleResult::from_violations(violations)
    }

    // ── Invariant 2: Alias pair ──────────────────────────────────────────────

    #[must_use]
    pub fn check_alias(step: usize, engine: &SyncEngine<MemorySharedCell>) -> OracleResult {
        let cell = engine.cell();
        if !cell.kind().is_code() || alias::is_consistent(cell.metadata()) {
            return OracleResult::pass();
        }
        OracleResult::fail(vec![InvariantViolation::Alias {
            step,
            metadata: Value::Object(cell.metadata().to_map()),
        }])
    }

    // ── Invariant 3: Dirty flag ──────────────────────────────────────────────

    #[must_use]
    pub fn check_dirty(
        step: usize,
        model: &DirtyModel,
        engine: &SyncEngine<MemorySharedCell>,
    ) -> OracleResult {
        let cell = engine.cell();
        let Ok(actual) = cell.is_dirty() else {
            return OracleResult::pass();
        };
        let expected = model.expected_dirty(cell.source());
        if actual == expected {
            OracleResult::pass()
        } else {
            OracleResult::fail(vec![InvariantViolation::Dirty {
                step,
                expected,
                actual,
            }])
        }
    }

    // ── Invariant 4: No echo ─────────────────────────────────────────────────

    #[must_use]
    pub fn check_echo(
        step: usize,
        op: &CellOp,
        baseline: &StepBaseline,
        engine: &SyncEngine<MemorySharedCell>,
    ) -> OracleResult {
        let mut violations = Vec::new();
        let mut echo = |detail: String| violations.push(InvariantViolation::Echo { step, detail });

        if engine.guard().is_held() {
            echo("guard still held after the step".to_string());
        }

        let writes = engine.shared().counters().since(&baseline.counters);
        let stats = engine.stats();
        let engine_writes = stats.local_to_shared - baseline.stats.local_to_shared;
        let reconciled = stats.reconciled - baseline.stats.reconciled;

        match op.actor() {
            Actor::Local => {
                let reentered = stats.suppressed_local - baseline.stats.suppressed_local;
                if reentered > 0 {
                    echo(format!("local op re-entered the local side {reentered} time(s)"));
                }
                for (field, count) in per_field(&writes) {
                    if count > 1 {
                        echo(format!("local op wrote shared {field:?} {count} times"));
                    }
                }
                if engine_writes != writes.total() {
                    echo(format!(
                        "engine counted {engine_writes} writes, document saw {}",
                        writes.total()
                    ));
                }
            }
            Actor::Remote => {
                if engine_writes != reconciled {
                    echo(format!(
                        "remote op caused {engine_writes} write(s) but only {reconciled} reconciliation(s)"
                    ));
                }
                // The remote's own write plus at most one write-back.
                for (field, count) in per_field(&writes) {
                    if count > 2 {
                        echo(format!("remote op wrote shared {field:?} {count} times"));
                    }
                }
            }
        }

        OracleResult::from_violations(violations)
    }
}

fn per_field(counters: &MutationCounters) -> [(Field, u64); 4] {
    [
        (Field::Source, counters.source),
        (Field::Metadata, counters.metadata),
        (Field::Outputs, counters.outputs),
        (Field::ExecutionCount, counters.execution_count),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use cellsync_core::CellRecord;
    use cellsync_core::model::CellKind;

    fn engine() -> SyncEngine<MemorySharedCell> {
        SyncEngine::new(CellRecord::with_id(CellKind::Code, "o"), MemorySharedCell::new("o"))
            .expect("engine")
    }

    #[test]
    fn merge_keeps_all_violations() {
        let a = OracleResult::fail(vec![InvariantViolation::Echo {
            step: 1,
            detail: "a".into(),
        }]);
        let b = OracleResult::pass();
        let merged = b.merge(a);
        assert!(!merged.passed);
        assert_eq!(merged.violations.len(), 1);
        assert_eq!(merged.violations[0].step(), 1);
    }

    #[test]
    fn fresh_engine_is_consistent() {
        let engine = engine();
        assert!(CellOracle::check_consistency(0, &engine).passed);
        assert!(CellOracle::check_alias(0, &engine).passed);
    }

    #[test]
    fn detects_divergence_introduced_behind_the_engines_back() {
        let mut engine = engine();
        // Mutate the document without delivering the event.
        engine
            .apply_remote(|shared| {
                let _ = shared.set_source("hidden");
                Ok(cellsync_core::SharedChange::default())
            })
            .expect("remote");
        let result = CellOracle::check_consistency(3, &engine);
        assert!(!result.passed);
        assert!(matches!(
            result.violations[0],
            InvariantViolation::Consistency {
                step: 3,
                field: Field::Source,
                ..
            }
        ));
    }

    #[test]
    fn dirty_model_follows_count_changes() {
        let mut engine = engine();
        let mut model = DirtyModel::from_engine(&engine);
        assert!(!model.expected_dirty(""));

        let before = StepBaseline::capture(&engine);
        engine.set_source("x = 1").expect("source");
        engine.set_execution_count(ExecutionCount::new(1)).expect("count");
        model.observe(before.count, &engine);
        assert!(!model.expected_dirty(" x = 1\n"));
        assert!(model.expected_dirty("x = 2"));
        assert!(CellOracle::check_dirty(1, &model, &engine).passed);
    }

    #[test]
    fn local_source_edit_has_no_echo() {
        let mut engine = engine();
        let op = CellOp::SetSource { text: "y".into() };
        let baseline = StepBaseline::capture(&engine);
        op.apply(&mut engine).expect("apply");
        assert!(CellOracle::check_echo(1, &op, &baseline, &engine).passed);
    }

    #[test]
    fn remote_reconciliation_is_not_an_echo() {
        let mut engine = engine();
        let op = CellOp::RemoteExecutionCount { count: Some(-1) };
        let baseline = StepBaseline::capture(&engine);
        op.apply(&mut engine).expect("apply");
        let result = CellOracle::check_echo(1, &op, &baseline, &engine);
        assert!(result.passed, "{result:?}");
        assert_eq!(engine.stats().reconciled, 1);
    }
}
