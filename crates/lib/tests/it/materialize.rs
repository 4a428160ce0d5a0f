//! Lazy and incremental materialization produce identical values.

use std::sync::Arc;

use covalent::{
    CoValueType, Edit, FixedClock, LocalKeyring, MaterializationStrategy, Node, NodeConfig, Role,
    storage::InMemory,
};
use serde_json::json;

use crate::helpers::{export, lazy_node, node_at, replay, test_node};

fn keyring_node(keys: Arc<LocalKeyring>, strategy: MaterializationStrategy) -> Node {
    Node::open_with_clock(
        keys,
        Arc::new(InMemory::new()),
        NodeConfig::default().with_materialization(strategy),
        Arc::new(FixedClock::new(1_000)),
    )
    .unwrap()
}

#[test]
fn strategies_agree_after_every_delivery() {
    let (admin, clock) = node_at(1_000);
    let (editor, _) = node_at(1_000);
    let group = admin.create_group().unwrap();
    admin
        .set_role(&group, &editor.agent_id(), Role::Writer)
        .unwrap();
    let doc = admin
        .create(&group, CoValueType::List, json!(["a", "b"]), None)
        .unwrap();
    admin.mutate(&doc, vec![Edit::push("c")]).unwrap();
    admin.rotate_read_key(&group).unwrap();
    admin.mutate(&doc, vec![Edit::remove(0)]).unwrap();
    admin
        .set_role(&group, &editor.agent_id(), Role::Reader)
        .unwrap();
    clock.advance(10);
    admin.mutate(&doc, vec![Edit::insert(0, "z")]).unwrap();

    let (group_header, group_txs) = export(&admin, &group);
    let (doc_header, doc_txs) = export(&admin, &doc);

    let lazy = lazy_node(1_000);
    let incremental = test_node();
    assert_eq!(
        incremental.config().materialization,
        MaterializationStrategy::Incremental
    );

    for node in [&lazy, &incremental] {
        node.ingest(&group, Some(group_header.clone()), Vec::new())
            .unwrap();
        node.ingest(&doc, Some(doc_header.clone()), Vec::new())
            .unwrap();
    }

    // Interleave group and value deliveries, reading after each one.
    let mut group_txs = group_txs.into_iter();
    let mut doc_txs = doc_txs.into_iter();
    loop {
        let next_doc = doc_txs.next();
        let next_group = group_txs.next();
        if next_doc.is_none() && next_group.is_none() {
            break;
        }
        for node in [&lazy, &incremental] {
            if let Some(tx) = &next_doc {
                node.ingest(&doc, None, vec![tx.clone()]).unwrap();
            }
            if let Some(tx) = &next_group {
                node.ingest(&group, None, vec![tx.clone()]).unwrap();
            }
        }
        assert_eq!(lazy.read(&doc).unwrap(), incremental.read(&doc).unwrap());
    }

    // Neither replica is a member; both see the same hidden count.
    let outcome = incremental.read(&doc).unwrap();
    assert_eq!(outcome.value, json!([]));
    assert_eq!(outcome.hidden, 4);

    let (key_id, secret) = admin.current_read_key(&group).unwrap();
    lazy.add_read_key(key_id.clone(), secret.clone());
    incremental.add_read_key(key_id, secret);
    let lazy_view = lazy.read(&doc).unwrap();
    assert_eq!(lazy_view, incremental.read(&doc).unwrap());
    assert_eq!(lazy_view, admin.read(&doc).unwrap());
    assert_eq!(lazy_view.value, json!(["z", "b", "c"]));
}

#[test]
fn repeated_reads_without_changes_are_stable() {
    let node = test_node();
    let group = node.create_group().unwrap();
    let doc = node
        .create(&group, CoValueType::Text, json!("abc"), None)
        .unwrap();
    let first = node.read(&doc).unwrap();
    assert_eq!(node.read(&doc).unwrap(), first);
    node.mutate(&doc, vec![Edit::delete_text(1, 1)]).unwrap();
    assert_eq!(node.read(&doc).unwrap().value, json!("ac"));
}

#[test]
fn keys_added_to_the_keyring_reach_both_strategies() {
    let admin = test_node();
    let group = admin.create_group().unwrap();
    let doc = admin
        .create(&group, CoValueType::List, json!(["secret"]), None)
        .unwrap();
    let (group_header, group_txs) = export(&admin, &group);
    let (doc_header, doc_txs) = export(&admin, &doc);

    let lazy_keys = Arc::new(LocalKeyring::generate());
    let incremental_keys = Arc::new(LocalKeyring::generate());
    let lazy = keyring_node(lazy_keys.clone(), MaterializationStrategy::Lazy);
    let incremental = keyring_node(incremental_keys.clone(), MaterializationStrategy::Incremental);
    for node in [&lazy, &incremental] {
        replay(&group_header, &group_txs, node);
        replay(&doc_header, &doc_txs, node);
        let locked = node.read(&doc).unwrap();
        assert_eq!(locked.value, json!([]));
        assert!(locked.hidden > 0);
    }

    // Straight into the keyrings, bypassing the nodes.
    let (key_id, secret) = admin.current_read_key(&group).unwrap();
    lazy_keys.insert_read_key(key_id.clone(), secret.clone());
    incremental_keys.insert_read_key(key_id, secret);

    let lazy_view = lazy.read(&doc).unwrap();
    assert_eq!(lazy_view, incremental.read(&doc).unwrap());
    assert_eq!(lazy_view.value, json!(["secret"]));
    assert_eq!(lazy_view.hidden, 0);
}

#[test]
fn strategies_agree_when_the_group_reloads_between_reads() {
    let (admin, admin_clock) = node_at(1_000);
    let (editor, editor_clock) = node_at(1_000);
    let group = admin.create_group().unwrap();
    admin
        .set_role(&group, &editor.agent_id(), Role::Writer)
        .unwrap();
    let doc = admin
        .create(&group, CoValueType::List, json!(["a"]), None)
        .unwrap();
    let (group_header, group_txs) = export(&admin, &group);
    let (doc_header, doc_txs) = export(&admin, &doc);
    replay(&group_header, &group_txs, &editor);
    replay(&doc_header, &doc_txs, &editor);

    editor_clock.set(60_000);
    editor.mutate(&doc, vec![Edit::push("late")]).unwrap();
    admin_clock.set(50_000);
    admin
        .set_role(&group, &editor.agent_id(), Role::Reader)
        .unwrap();
    let (_, all_group_txs) = export(&admin, &group);
    let demotion = all_group_txs
        .into_iter()
        .find(|tx| !group_txs.contains(tx))
        .unwrap();
    let (_, doc_txs) = export(&editor, &doc);

    let (key_id, secret) = admin.current_read_key(&group).unwrap();
    let lazy = lazy_node(1_000);
    let incremental = test_node();
    for node in [&lazy, &incremental] {
        replay(&group_header, &group_txs, node);
        replay(&doc_header, &doc_txs, node);
        node.add_read_key(key_id.clone(), secret.clone());
    }
    let before = incremental.read(&doc).unwrap();
    assert_eq!(before, lazy.read(&doc).unwrap());
    assert_eq!(before.value, json!(["a", "late"]));

    for node in [&lazy, &incremental] {
        assert!(node.evict(&group));
    }
    assert_eq!(incremental.read(&doc).unwrap(), before);
    assert_eq!(lazy.read(&doc).unwrap(), before);

    for node in [&lazy, &incremental] {
        assert!(node.evict(&group));
        node.ingest(&group, None, vec![demotion.clone()]).unwrap();
    }
    let after = incremental.read(&doc).unwrap();
    assert_eq!(after, lazy.read(&doc).unwrap());
    assert_eq!(after.value, json!(["a"]));
    assert_eq!(after.rejected, 1);
}
