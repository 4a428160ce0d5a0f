//! Change subscriptions: snapshots, batching and cancellation.

use std::time::Duration;

use covalent::{
    CoValueType, Edit, Error, Materialized, Role, Ruleset, node::NodeError,
};
use serde_json::{Value, json};
use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};

use crate::helpers::{node_at, test_node};

fn recorder() -> (
    impl Fn(Materialized) + Send + 'static,
    UnboundedReceiver<Materialized>,
) {
    let (tx, rx) = unbounded_channel();
    (
        move |snapshot| {
            let _ = tx.send(snapshot);
        },
        rx,
    )
}

async fn next(rx: &mut UnboundedReceiver<Materialized>) -> Value {
    tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("notification arrives")
        .expect("subscription alive")
        .value
}

async fn settle() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn burst_of_writes_yields_one_notification() {
    let node = test_node();
    let id = node
        .create_with_ruleset(CoValueType::List, Ruleset::UnsafeAllowAll, json!([]), None)
        .unwrap();
    let (callback, mut rx) = recorder();
    let subscription = node.subscribe(&id, callback).unwrap();
    assert_eq!(subscription.id(), &id);
    assert_eq!(next(&mut rx).await, json!([]));

    for n in 0..3 {
        node.mutate(&id, vec![Edit::push(n)]).unwrap();
    }
    assert_eq!(next(&mut rx).await, json!([0, 1, 2]));
    settle().await;
    assert!(rx.try_recv().is_err());
    assert!(subscription.is_active());
}

#[tokio::test]
async fn cancelled_subscription_stays_silent() {
    let node = test_node();
    let id = node
        .create_with_ruleset(CoValueType::Map, Ruleset::UnsafeAllowAll, Value::Null, None)
        .unwrap();
    let (callback, mut rx) = recorder();
    let subscription = node.subscribe(&id, callback).unwrap();
    assert_eq!(next(&mut rx).await, json!({}));

    subscription.cancel();
    node.mutate(&id, vec![Edit::set("k", 1)]).unwrap();
    settle().await;
    assert!(rx.try_recv().is_err());

    let (callback, mut rx) = recorder();
    drop(node.subscribe(&id, callback).unwrap());
    node.mutate(&id, vec![Edit::set("k", 2)]).unwrap();
    settle().await;
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn subscription_survives_eviction() {
    let node = test_node();
    let id = node
        .create_with_ruleset(CoValueType::Text, Ruleset::UnsafeAllowAll, json!("ab"), None)
        .unwrap();
    let (callback, mut rx) = recorder();
    let _subscription = node.subscribe(&id, callback).unwrap();
    assert_eq!(next(&mut rx).await, json!("ab"));

    assert!(node.evict(&id));
    assert!(!node.registry().is_loaded(&id));
    node.mutate(&id, vec![Edit::insert_text(2, "c")]).unwrap();
    assert_eq!(next(&mut rx).await, json!("abc"));
}

#[tokio::test]
async fn group_changes_notify_owned_values() {
    let (admin, _) = node_at(1_000);
    let (other, _) = node_at(1_000);
    let group = admin.create_group().unwrap();
    let doc = admin
        .create(&group, CoValueType::Map, json!({"a": 1}), None)
        .unwrap();
    let (callback, mut rx) = recorder();
    let _subscription = admin.subscribe(&doc, callback).unwrap();
    assert_eq!(next(&mut rx).await, json!({"a": 1}));

    admin
        .set_role(&group, &other.agent_id(), Role::Writer)
        .unwrap();
    assert_eq!(next(&mut rx).await, json!({"a": 1}));
}

#[test]
fn subscribing_needs_a_runtime() {
    let node = test_node();
    let id = node
        .create_with_ruleset(CoValueType::Map, Ruleset::UnsafeAllowAll, Value::Null, None)
        .unwrap();
    let err = node.subscribe(&id, |_| {}).unwrap_err();
    assert!(matches!(err, Error::Node(NodeError::NoRuntime)));
}
