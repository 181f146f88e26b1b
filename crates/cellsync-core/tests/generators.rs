#![allow(dead_code)]

use proptest::prelude::*;
use serde_json::{Value, json};

/// Small pool so value-identical writes happen often.
pub fn arb_output() -> impl Strategy<Value = Value> {
    prop_oneof![
        "[a-c]{0,3}".prop_map(|text| json!({ "output_type": "stream", "name": "stdout", "text": text })),
        (1u8..4).prop_map(|n| json!({ "output_type": "execute_result", "data": { "text/plain": n.to_string() } })),
    ]
}

pub fn arb_outputs(max: usize) -> impl Strategy<Value = Vec<Value>> {
    prop::collection::vec(arb_output(), 0..=max)
}

/// Source text including `\r\n`, lone `\r` and surrounding whitespace.
pub fn arb_source() -> impl Strategy<Value = String> {
    prop::collection::vec(
        prop_oneof![
            Just("x".to_string()),
            Just("print(1)".to_string()),
            Just(" ".to_string()),
            Just("\n".to_string()),
            Just("\r\n".to_string()),
            Just("\r".to_string()),
            Just("é".to_string()),
        ],
        0..6,
    )
    .prop_map(|parts| parts.concat())
}

/// One output-ledger mutation with raw (possibly out-of-range) indices.
#[derive(Debug, Clone)]
pub enum LedgerOp {
    Add(Vec<Value>, usize),
    Push(Value),
    Set(Vec<Value>, usize),
    Remove(usize, usize),
    Clear,
    Replace(Vec<Value>),
}

pub fn arb_ledger_op() -> impl Strategy<Value = LedgerOp> {
    prop_oneof![
        (arb_outputs(3), 0usize..6).prop_map(|(v, at)| LedgerOp::Add(v, at)),
        arb_output().prop_map(LedgerOp::Push),
        (arb_outputs(2), 0usize..6).prop_map(|(v, at)| LedgerOp::Set(v, at)),
        (0usize..6, 0usize..4).prop_map(|(at, n)| LedgerOp::Remove(at, n)),
        Just(LedgerOp::Clear),
        arb_outputs(3).prop_map(LedgerOp::Replace),
    ]
}

/// One metadata mutation touching the alias pair or an unrelated key.
#[derive(Debug, Clone)]
pub enum MetadataOp {
    Set(&'static str, Value),
    Delete(&'static str),
}

pub fn arb_metadata_op() -> impl Strategy<Value = MetadataOp> {
    let key = prop_oneof![Just("collapsed"), Just("jupyter"), Just("tags")];
    let value = prop_oneof![
        any::<bool>().prop_map(Value::Bool),
        any::<bool>().prop_map(|b| json!({ "outputs_hidden": b })),
        any::<bool>().prop_map(|b| json!({ "outputs_hidden": b, "source_hidden": true })),
        Just(json!({ "source_hidden": false })),
        Just(json!("garbage")),
    ];
    prop_oneof![
        (key.clone(), value).prop_map(|(k, v)| MetadataOp::Set(k, v)),
        key.prop_map(MetadataOp::Delete),
    ]
}
