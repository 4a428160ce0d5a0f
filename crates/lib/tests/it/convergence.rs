//! Replicas converge whatever order transactions arrive in.

use covalent::{CoID, CoValueHeader, CoValueType, Edit, Node, Ruleset, Transaction};
use proptest::prelude::*;
use serde_json::{Value, json};

use crate::helpers::{export, node_at, replay, test_node};

/// Hand `to` everything `from` holds of `id`, header included.
fn share(from: &Node, to: &Node, id: &CoID) {
    let (header, txs) = export(from, id);
    to.ingest(id, Some(header), txs).unwrap();
}

#[test]
fn later_causal_key_wins_regardless_of_arrival() {
    let (a, clock_a) = node_at(2_000);
    let (b, clock_b) = node_at(2_000);
    let id = a
        .create_with_ruleset(CoValueType::Map, Ruleset::UnsafeAllowAll, Value::Null, None)
        .unwrap();
    share(&a, &b, &id);

    clock_a.set(5_000);
    a.mutate(&id, vec![Edit::set("title", "A")]).unwrap();
    clock_b.set(6_000);
    b.mutate(&id, vec![Edit::set("title", "B")]).unwrap();

    let (header, from_a) = export(&a, &id);
    let (_, from_b) = export(&b, &id);
    a.ingest(&id, None, from_b.clone()).unwrap();
    b.ingest(&id, None, from_a.clone()).unwrap();
    assert_eq!(a.read(&id).unwrap().value, json!({"title": "B"}));
    assert_eq!(b.read(&id).unwrap().value, json!({"title": "B"}));

    let late_first = test_node();
    replay(&header, &[from_b, from_a].concat(), &late_first);
    assert_eq!(late_first.read(&id).unwrap().value, json!({"title": "B"}));
}

#[test]
fn concurrent_inserts_at_one_position_interleave_identically() {
    let (a, clock_a) = node_at(2_000);
    let (b, clock_b) = node_at(2_000);
    let id = a
        .create_with_ruleset(CoValueType::List, Ruleset::UnsafeAllowAll, json!(["x"]), None)
        .unwrap();
    share(&a, &b, &id);

    // Same madeAt on both sides: only the session id separates them.
    clock_a.set(7_000);
    clock_a.freeze();
    clock_b.set(7_000);
    clock_b.freeze();
    a.mutate(&id, vec![Edit::insert(1, "a1"), Edit::insert(2, "a2")])
        .unwrap();
    b.mutate(&id, vec![Edit::insert(1, "b1")]).unwrap();

    share(&a, &b, &id);
    share(&b, &a, &id);
    let merged = a.read(&id).unwrap().value;
    assert_eq!(merged, b.read(&id).unwrap().value);

    let items = merged.as_array().unwrap();
    assert_eq!(items.len(), 4);
    assert_eq!(items[0], json!("x"));
    let a1 = items.iter().position(|v| v == "a1").unwrap();
    let a2 = items.iter().position(|v| v == "a2").unwrap();
    assert_eq!(a2, a1 + 1, "one writer's run stays contiguous: {merged}");
}

#[test]
fn equal_timestamps_in_one_map_resolve_the_same_everywhere() {
    let (a, clock_a) = node_at(3_000);
    let (b, clock_b) = node_at(3_000);
    let id = a
        .create_with_ruleset(CoValueType::Map, Ruleset::UnsafeAllowAll, Value::Null, None)
        .unwrap();
    share(&a, &b, &id);
    clock_a.freeze();
    clock_b.freeze();
    a.mutate(&id, vec![Edit::set("owner", "a")]).unwrap();
    b.mutate(&id, vec![Edit::set("owner", "b")]).unwrap();

    share(&a, &b, &id);
    share(&b, &a, &id);
    assert_eq!(a.read(&id).unwrap(), b.read(&id).unwrap());
}

/// A history written by three replicas with partial exchanges in between.
struct History {
    header: CoValueHeader,
    transactions: Vec<Transaction>,
    expected: Value,
}

fn round_edits(co_type: CoValueType, writer: usize, round: usize) -> Vec<Vec<Edit>> {
    let tag = format!("w{writer}r{round}");
    match co_type {
        CoValueType::Map => {
            let mut edits = vec![vec![
                Edit::set("title", tag.clone()),
                Edit::set(format!("by{writer}"), round as u64),
            ]];
            if round > 0 && writer == 1 {
                edits.push(vec![Edit::delete("by0")]);
            }
            edits
        }
        CoValueType::List => {
            let mut edits = vec![vec![Edit::insert(0, tag.clone()), Edit::push(tag)]];
            if round > 0 {
                edits.push(vec![Edit::remove(0)]);
            }
            edits
        }
        CoValueType::Text => {
            let mut edits = vec![vec![Edit::insert_text(0, tag)]];
            if round > 0 {
                edits.push(vec![Edit::delete_text(0, 2)]);
            }
            edits
        }
        CoValueType::Stream => vec![vec![Edit::append(tag)]],
    }
}

fn history(co_type: CoValueType) -> History {
    let writers: Vec<Node> = (0..3).map(|n| node_at(1_000 + 7 * n).0).collect();
    let id = writers[0]
        .create_with_ruleset(co_type, Ruleset::UnsafeAllowAll, Value::Null, None)
        .unwrap();
    for other in &writers[1..] {
        share(&writers[0], other, &id);
    }

    for round in 0..3 {
        for (n, writer) in writers.iter().enumerate() {
            for edits in round_edits(co_type, n, round) {
                writer.mutate(&id, edits).unwrap();
            }
        }
        // Only the first two replicas talk mid-history.
        share(&writers[0], &writers[1], &id);
        share(&writers[1], &writers[0], &id);
    }

    for other in &writers[1..] {
        share(other, &writers[0], &id);
    }
    let expected = writers[0].read(&id).unwrap().value;
    let (header, transactions) = export(&writers[0], &id);

    share(&writers[0], &writers[2], &id);
    assert_eq!(writers[2].read(&id).unwrap().value, expected);

    History {
        header,
        transactions,
        expected,
    }
}

/// Reorder `txs` by the sort weights proptest picked.
fn permute(txs: &[Transaction], weights: &[u32]) -> Vec<Transaction> {
    let mut order: Vec<usize> = (0..txs.len()).collect();
    order.sort_by_key(|&i| (weights[i % weights.len()], i));
    order.into_iter().map(|i| txs[i].clone()).collect()
}

fn replays_to_expected(co_type: CoValueType, weights: &[u32]) -> std::result::Result<(), TestCaseError> {
    let history = history(co_type);
    let node = test_node();
    let id = replay(
        &history.header,
        &permute(&history.transactions, weights),
        &node,
    );
    prop_assert_eq!(node.read(&id).unwrap().value, history.expected);
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn map_converges_in_any_order(weights in prop::collection::vec(any::<u32>(), 32)) {
        replays_to_expected(CoValueType::Map, &weights)?;
    }

    #[test]
    fn list_converges_in_any_order(weights in prop::collection::vec(any::<u32>(), 32)) {
        replays_to_expected(CoValueType::List, &weights)?;
    }

    #[test]
    fn text_converges_in_any_order(weights in prop::collection::vec(any::<u32>(), 32)) {
        replays_to_expected(CoValueType::Text, &weights)?;
    }

    #[test]
    fn stream_converges_in_any_order(weights in prop::collection::vec(any::<u32>(), 32)) {
        replays_to_expected(CoValueType::Stream, &weights)?;
    }
}
