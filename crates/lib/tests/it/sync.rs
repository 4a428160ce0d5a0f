//! Exchanges between nodes, retries and resumption.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use covalent::{
    CoValueType, Edit, Error, LocalTransport, NodeConfig, Ruleset, SyncTransport,
    node::SyncConfig,
    sync::{Content, SyncError, SyncRequest, SyncResponse},
    transaction::TransactionRecord,
};
use serde_json::{Value, json};

use crate::helpers::{export, node_at, node_with, test_node};

fn plain(node: &covalent::Node, co_type: CoValueType, initial: Value) -> covalent::CoID {
    node.create_with_ruleset(co_type, Ruleset::UnsafeAllowAll, initial, None)
        .unwrap()
}

#[tokio::test]
async fn sync_exchanges_values_in_both_directions() {
    let (a, _) = node_at(1_000);
    let (b, _) = node_at(2_000);
    let group = a.create_group().unwrap();
    let owned = a
        .create(&group, CoValueType::Map, json!({"from": "a"}), None)
        .unwrap();
    let list = b
        .create_with_ruleset(CoValueType::List, Ruleset::UnsafeAllowAll, json!([1, 2]), None)
        .unwrap();

    let report = a.sync(&LocalTransport::new(b.clone())).await.unwrap();
    assert_eq!(report.values, 3);
    assert!(report.received > 0);
    assert!(report.sent > 0);

    assert_eq!(a.read(&list).unwrap(), b.read(&list).unwrap());
    assert_eq!(b.read(&owned).unwrap().value, json!({}));
    assert_eq!(b.read(&owned).unwrap().hidden, 1);
    assert_eq!(a.ids().unwrap(), b.ids().unwrap());
}

#[tokio::test]
async fn repeating_a_sync_transfers_nothing() {
    let (a, _) = node_at(1_000);
    let (b, _) = node_at(1_000);
    let id = plain(&a, CoValueType::Stream, json!(["x", "y"]));
    b.ingest(&id, Some(a.header(&id).unwrap()), Vec::new()).unwrap();
    b.mutate(&id, vec![Edit::append("z")]).unwrap();

    let link = LocalTransport::new(b.clone());
    let first = a.sync(&link).await.unwrap();
    assert_eq!(first.received, 1);
    assert_eq!(first.sent, 1);

    let second = a.sync(&link).await.unwrap();
    assert_eq!(second.received, 0);
    assert_eq!(second.sent, 0);
    assert_eq!(a.read(&id).unwrap(), b.read(&id).unwrap());

    let state = a.peer_state(link.peer_id()).unwrap();
    assert!(state.last_sync().is_some());
    assert_eq!(state.acknowledged(&id).unwrap().transaction_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn unreachable_peer_is_reported_after_retries() {
    let config = NodeConfig {
        sync: SyncConfig {
            max_attempts: 3,
            initial_backoff_ms: 50,
            max_backoff_ms: 80,
        },
        ..NodeConfig::default()
    };
    let (a, _) = node_with(1_000, config);
    let b = test_node();
    plain(&a, CoValueType::Map, json!({"k": 1}));

    let link = LocalTransport::new(b.clone());
    link.set_online(false);
    let started = tokio::time::Instant::now();
    let err = a.sync(&link).await.unwrap_err();

    assert!(err.is_network_error(), "{err}");
    assert!(matches!(
        err,
        Error::Sync(SyncError::PeerUnreachable { attempts: 3, .. })
    ));
    assert_eq!(link.requests(), 3);
    // 50ms, then 80ms (capped) between the three attempts.
    assert!(started.elapsed() >= std::time::Duration::from_millis(130));
    assert!(a.peer_state(link.peer_id()).is_none());
    assert!(b.ids().unwrap().is_empty());
}

#[tokio::test]
async fn peer_that_lost_its_data_is_repaired() {
    let (a, _) = node_at(1_000);
    let id = plain(&a, CoValueType::List, json!(["kept"]));
    let as_peer_b = || NodeConfig {
        device_id: Some("peer-b".to_string()),
        ..NodeConfig::default()
    };

    let (first, _) = node_with(1_000, as_peer_b());
    let link = LocalTransport::new(first);
    assert_eq!(a.sync(&link).await.unwrap().sent, 1);
    let peer = link.peer_id().to_string();
    assert!(a.peer_state(&peer).unwrap().acknowledged(&id).is_some());

    // Same peer id, empty storage.
    let (restarted, _) = node_with(1_000, as_peer_b());
    let link = LocalTransport::new(restarted.clone());
    assert_eq!(link.peer_id(), peer);
    let report = a.sync(&link).await.unwrap();
    assert_eq!(report.sent, 1);
    assert_eq!(restarted.read(&id).unwrap(), a.read(&id).unwrap());
    let acknowledged = a.peer_state(&peer).unwrap();
    assert_eq!(acknowledged.acknowledged(&id).unwrap().transaction_count(), 1);
}

/// Answers a fixed number of requests, then fails until refilled.
struct Flaky {
    inner: LocalTransport,
    budget: AtomicUsize,
}

impl Flaky {
    fn refill(&self, budget: usize) {
        self.budget.store(budget, Ordering::SeqCst);
    }
}

#[async_trait]
impl SyncTransport for Flaky {
    fn peer_id(&self) -> &str {
        self.inner.peer_id()
    }

    async fn send(&self, request: &SyncRequest) -> Result<SyncResponse, SyncError> {
        let spent = self
            .budget
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1));
        if spent.is_err() {
            return Err(SyncError::Network("connection dropped".to_string()));
        }
        self.inner.send(request).await
    }
}

#[tokio::test(start_paused = true)]
async fn interrupted_sync_resumes_without_resending() {
    let (a, _) = node_at(1_000);
    let b = test_node();
    let ids: Vec<_> = (0..3)
        .map(|n| plain(&a, CoValueType::List, json!([n, n + 1])))
        .collect();

    // Catalog, then load and push of one value, then the line drops.
    let flaky = Flaky {
        inner: LocalTransport::new(b.clone()),
        budget: AtomicUsize::new(4),
    };
    let err = a.sync(&flaky).await.unwrap_err();
    assert!(err.is_network_error());
    let partial = a.peer_state(flaky.peer_id()).unwrap();
    assert!(partial.last_sync().is_none());
    let delivered = ids
        .iter()
        .filter(|id| partial.acknowledged(id).is_some())
        .count();
    assert_eq!(delivered, 1);

    flaky.refill(usize::MAX);
    let report = a.sync(&flaky).await.unwrap();
    assert_eq!(report.sent, ids.len() - delivered);
    for id in &ids {
        assert_eq!(a.read(id).unwrap(), b.read(id).unwrap());
    }
    assert!(a.peer_state(flaky.peer_id()).unwrap().last_sync().is_some());
}

#[test]
fn records_filed_under_another_value_are_dropped() {
    let source = test_node();
    let first = plain(&source, CoValueType::Map, json!({"a": 1}));
    let second = plain(&source, CoValueType::Map, json!({"b": 2}));
    let (header, _) = export(&source, &first);
    let (_, stray) = export(&source, &second);

    let target = test_node();
    let content = Content {
        id: first.clone(),
        header: Some(header),
        transactions: stray
            .into_iter()
            .map(|transaction| TransactionRecord {
                co_id: second.clone(),
                transaction,
            })
            .collect(),
    };
    assert_eq!(target.receive(content).unwrap(), 0);
    assert_eq!(target.read(&first).unwrap().value, json!({}));
}

#[test]
fn load_of_an_unknown_value_answers_with_empty_state() {
    let node = test_node();
    let missing = covalent::CoID::new("co_zmissing");
    let response = node
        .handle_sync_request(SyncRequest::Load {
            known: covalent::sync::KnownState::unknown(missing.clone()),
        })
        .unwrap();
    match response {
        SyncResponse::Content { known, content } => {
            assert_eq!(known, covalent::sync::KnownState::unknown(missing));
            assert!(content.is_none());
        }
        other => panic!("unexpected response {other:?}"),
    }
}
