use cellsync_core::execution::ExecutionCount;
use cellsync_core::metadata::alias;
use cellsync_core::model::{CellKind, CellRecord, LocalChange};
use cellsync_core::outputs::translate;
use cellsync_core::shared::{MemorySharedCell, SharedCell};
use cellsync_core::SyncEngine;
use proptest::prelude::*;

#[path = "generators.rs"]
mod generators;
use generators::*;

fn apply_ledger_op(cell: &mut CellRecord, op: LedgerOp) -> Vec<LocalChange> {
    let result = match op {
        LedgerOp::Add(values, at) => cell.add_outputs(values, at),
        LedgerOp::Push(value) => cell.push_output(value),
        LedgerOp::Set(values, at) => cell.set_outputs(values, at),
        LedgerOp::Remove(at, n) => cell.remove_outputs(at, n),
        LedgerOp::Clear => cell.clear_outputs(),
        LedgerOp::Replace(values) => cell.replace_outputs(values),
    };
    // Out-of-range ops are rejected without mutation.
    result.unwrap_or_default()
}

proptest! {
    #![proptest_config(proptest::test_runner::Config::with_cases(512))]

    #[test]
    fn translated_patches_replay_exactly(
        initial in arb_outputs(4),
        ops in prop::collection::vec(arb_ledger_op(), 0..20),
    ) {
        let mut cell = CellRecord::new(CellKind::Code);
        cell.replace_outputs(initial.clone()).expect("code cell");
        let mut shared = initial;

        for op in ops {
            for change in apply_ledger_op(&mut cell, op) {
                let LocalChange::Outputs(change) = change else {
                    panic!("ledger op produced a non-output change");
                };
                let patch = translate(&change).expect("no moves generated");
                patch.apply(&mut shared).expect("patch in range");
            }
            let local = cell.outputs().expect("code").to_serializable();
            prop_assert_eq!(&shared, &local);
        }
    }

    #[test]
    fn alias_pair_is_consistent_after_every_edit(
        ops in prop::collection::vec(arb_metadata_op(), 0..20),
    ) {
        let mut cell = CellRecord::new(CellKind::Code);
        for op in ops {
            let result = match op {
                MetadataOp::Set(key, value) => cell.set_metadata(key, value),
                MetadataOp::Delete(key) => cell.delete_metadata(key),
            };
            result.expect("live cell");
            prop_assert!(alias::is_consistent(cell.metadata()), "{:?}", cell.metadata());
        }
    }

    #[test]
    fn dirty_matches_definition(
        initial in arb_source(),
        steps in prop::collection::vec((arb_source(), prop::option::of(0u64..4)), 0..15),
    ) {
        let mut cell = CellRecord::new(CellKind::Code);
        cell.set_source(&initial).expect("live");
        let mut snapshot: Option<String> = None;

        for (source, count) in steps {
            match count {
                Some(n) => {
                    let count = ExecutionCount::new(n);
                    let before = cell.execution_count().expect("code");
                    cell.set_execution_count(count).expect("code");
                    if count != before {
                        snapshot = count.map(|_| cell.source().trim().to_string());
                    }
                }
                None => {
                    cell.set_source(&source).expect("live");
                }
            }
            let expected = snapshot
                .as_deref()
                .is_some_and(|snap| cell.source().trim() != snap);
            prop_assert_eq!(cell.is_dirty().expect("code"), expected);
            prop_assert!(!cell.source().contains('\r'));
        }
    }

    #[test]
    fn local_edits_write_each_field_at_most_once(
        ops in prop::collection::vec(arb_metadata_op(), 1..10),
        sources in prop::collection::vec(arb_source(), 1..5),
    ) {
        let cell = CellRecord::new(CellKind::Code);
        let id = cell.id().to_string();
        let mut engine = SyncEngine::new(cell, MemorySharedCell::new(id)).expect("engine");

        for op in ops {
            let before = engine.shared().counters();
            let stats = engine.stats();
            let result = match op {
                MetadataOp::Set(key, value) => engine.set_metadata(key, value),
                MetadataOp::Delete(key) => engine.delete_metadata(key),
            };
            result.expect("live");
            let diff = engine.shared().counters().since(&before);
            prop_assert!(diff.metadata <= 1);
            prop_assert_eq!(diff.total(), diff.metadata);
            prop_assert_eq!(engine.stats().suppressed_local, stats.suppressed_local);
            let shared_metadata = engine.shared().get_metadata();
            prop_assert_eq!(engine.cell().metadata().as_map(), &shared_metadata);
        }
        for source in sources {
            let before = engine.shared().counters();
            engine.set_source(&source).expect("live");
            prop_assert!(engine.shared().counters().since(&before).source <= 1);
            prop_assert_eq!(engine.cell().source(), engine.shared().get_source());
        }
        prop_assert!(!engine.guard().is_held());
    }

    #[test]
    fn notebook_round_trip_is_stable(
        source in arb_source(),
        outputs in arb_outputs(3),
        count in prop::option::of(-2i64..5),
        trusted in any::<bool>(),
    ) {
        let json = serde_json::json!({
            "cell_type": "code",
            "id": "rt",
            "source": source,
            "metadata": { "trusted": trusted, "collapsed": true, "format": "x" },
            "execution_count": count,
            "outputs": outputs,
        });
        let parsed = cellsync_core::nbformat::NotebookCell::from_json(json).expect("parse");
        let first = CellRecord::from_notebook(&parsed).expect("valid");
        let again = CellRecord::from_notebook(&first.to_notebook()).expect("valid");

        prop_assert_eq!(again.kind(), first.kind());
        prop_assert_eq!(again.source(), first.source());
        prop_assert_eq!(again.metadata(), first.metadata());
        prop_assert_eq!(again.trusted(), trusted);
        prop_assert_eq!(again.execution_count().expect("code"), first.execution_count().expect("code"));
        prop_assert_eq!(
            again.outputs().expect("code").to_serializable(),
            first.outputs().expect("code").to_serializable()
        );
        prop_assert!(!first.metadata().contains_key("format"));
    }
}
