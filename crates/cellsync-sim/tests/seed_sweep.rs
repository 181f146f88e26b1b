use cellsync_core::model::CellKind;
use cellsync_sim::{SimulationConfig, Simulator};
use proptest::prelude::*;

fn arb_kind() -> impl Strategy<Value = CellKind> {
    prop_oneof![
        Just(CellKind::Code),
        Just(CellKind::Markdown),
        Just(CellKind::Raw)
    ]
}

proptest! {
    #![proptest_config(proptest::test_runner::Config::with_cases(64))]

    #[test]
    fn every_seed_satisfies_the_oracle(
        seed in any::<u64>(),
        remote_percent in 0u8..=100,
        kind in arb_kind(),
    ) {
        let config = SimulationConfig {
            seed,
            steps: 60,
            remote_percent,
            cell_kind: kind,
        };
        let result = Simulator::new(config).expect("valid config").run().expect("run");
        prop_assert!(result.oracle.passed, "seed {}: {:?}", seed, result.oracle.violations);
        prop_assert!(!result.final_cell["source"].as_str().unwrap_or_default().contains('\r'));
    }
}

#[test]
fn all_local_run_never_reconciles() {
    let config = SimulationConfig {
        seed: 9,
        steps: 200,
        remote_percent: 0,
        cell_kind: CellKind::Code,
    };
    let result = Simulator::new(config).expect("config").run().expect("run");
    assert!(result.oracle.passed);
    assert_eq!(result.stats.reconciled, 0);
    assert_eq!(result.stats.suppressed_local, 0);
}

#[test]
fn trace_serializes_as_json_lines() {
    let config = SimulationConfig {
        steps: 5,
        ..SimulationConfig::default()
    };
    let result = Simulator::new(config).expect("config").run().expect("run");
    for event in &result.trace {
        let line = serde_json::to_string(event).expect("serialize");
        let back: cellsync_sim::TraceEvent = serde_json::from_str(&line).expect("parse");
        assert_eq!(&back, event);
    }
}
