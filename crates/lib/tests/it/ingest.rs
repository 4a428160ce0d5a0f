//! Ingestion: idempotence, gap buffering and per-transaction rejection.

use covalent::{
    AgentSecret, CoValueCore, CoValueHeader, CoValueType, Edit, IngestOutcome, NodeConfig, Ruleset,
    transaction::Op,
};
use serde_json::{Value, json};

use crate::helpers::{export, node_with, replay, signed, test_node};

fn items(value: &Value) -> Vec<Value> {
    value["items"].as_array().cloned().unwrap_or_default()
}

#[test]
fn reingesting_accepted_transactions_changes_nothing() {
    let writer = test_node();
    let id = writer
        .create_with_ruleset(CoValueType::Map, Ruleset::UnsafeAllowAll, json!({"a": 1}), None)
        .unwrap();
    writer.mutate(&id, vec![Edit::set("b", 2)]).unwrap();
    writer.mutate(&id, vec![Edit::delete("a")]).unwrap();
    let (header, txs) = export(&writer, &id);

    let reader = test_node();
    replay(&header, &txs, &reader);
    let first = reader.read(&id).unwrap();
    assert_eq!(first.value, json!({"b": 2}));

    let appended = reader.ingest(&id, Some(header), txs.clone()).unwrap();
    assert_eq!(appended, 0);
    assert_eq!(reader.read(&id).unwrap(), first);
}

#[test]
fn stream_withholds_content_until_the_gap_closes() {
    let writer = test_node();
    let id = writer
        .create_with_ruleset(CoValueType::Stream, Ruleset::UnsafeAllowAll, Value::Null, None)
        .unwrap();
    for n in 0..4 {
        writer.mutate(&id, vec![Edit::append(n)]).unwrap();
    }
    let (header, txs) = export(&writer, &id);
    assert_eq!(txs.len(), 4);

    let config = NodeConfig {
        gap_window_ms: 50,
        ..NodeConfig::default()
    };
    let (reader, clock) = node_with(1_000, config);
    reader
        .ingest(&id, Some(header), vec![txs[0].clone(), txs[1].clone(), txs[3].clone()])
        .unwrap();
    assert_eq!(items(&reader.read(&id).unwrap().value), vec![json!(0), json!(1)]);
    assert!(reader.unresolved_gaps(&id).unwrap().is_empty());

    clock.advance(100);
    let gaps = reader.unresolved_gaps(&id).unwrap();
    assert_eq!(gaps.len(), 1);
    assert_eq!(gaps[0].expected_index, 2);
    assert_eq!(gaps[0].buffered, vec![3]);

    assert_eq!(reader.ingest(&id, None, vec![txs[2].clone()]).unwrap(), 2);
    assert_eq!(
        items(&reader.read(&id).unwrap().value),
        vec![json!(0), json!(1), json!(2), json!(3)]
    );
    assert!(reader.unresolved_gaps(&id).unwrap().is_empty());
}

#[test]
fn bad_signature_drops_only_that_transaction() {
    let header = CoValueHeader::new(CoValueType::Map, Ruleset::UnsafeAllowAll, None, 5);
    let id = header.id().unwrap();
    let alice = AgentSecret::generate();
    let set = |key: &str| Op::Set {
        key: key.to_string(),
        value: json!(true),
    };

    let genuine = signed(&id, &alice, "d", 10, 0, vec![set("a")]);
    let mut forged = signed(&id, &alice, "d", 10, 0, vec![set("evil")]);
    forged.signature = genuine.signature.clone();
    let next = signed(&id, &alice, "d", 11, 1, vec![set("b")]);

    let node = test_node();
    node.ingest(&id, Some(header), vec![forged]).unwrap();
    assert_eq!(node.ingest(&id, None, vec![genuine, next]).unwrap(), 2);
    assert_eq!(node.read(&id).unwrap().value, json!({"a": true, "b": true}));
}

#[test]
fn second_transaction_for_an_occupied_slot_is_a_conflict() {
    let header = CoValueHeader::new(CoValueType::Map, Ruleset::UnsafeAllowAll, None, 6);
    let mut core = CoValueCore::new(header).unwrap();
    let alice = AgentSecret::generate();
    let id = core.id().clone();
    let first = signed(&id, &alice, "d", 10, 0, vec![Op::Del { key: "x".into() }]);
    let rival = signed(&id, &alice, "d", 10, 0, vec![Op::Del { key: "y".into() }]);

    assert_eq!(
        core.ingest(first.clone(), 0).unwrap(),
        IngestOutcome::Appended { count: 1 }
    );
    assert_eq!(core.ingest(first, 0).unwrap(), IngestOutcome::Duplicate);
    assert!(core.ingest(rival, 0).unwrap_err().is_conflict());
    assert_eq!(core.transaction_count(), 1);
}

#[test]
fn header_under_the_wrong_id_is_structural() {
    let header = CoValueHeader::new(CoValueType::List, Ruleset::UnsafeAllowAll, None, 1);
    let other = CoValueHeader::new(CoValueType::List, Ruleset::UnsafeAllowAll, None, 2)
        .id()
        .unwrap();
    let node = test_node();
    let err = node.ingest(&other, Some(header), Vec::new()).unwrap_err();
    assert!(err.is_structural());
}

#[test]
fn content_for_an_unknown_value_needs_its_header() {
    let header = CoValueHeader::new(CoValueType::List, Ruleset::UnsafeAllowAll, None, 3);
    let id = header.id().unwrap();
    let node = test_node();
    assert!(node.ingest(&id, None, Vec::new()).unwrap_err().is_not_found());
}
