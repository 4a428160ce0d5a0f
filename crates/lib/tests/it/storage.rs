//! Eviction, reload and file persistence.

use std::sync::Arc;

use covalent::{
    AgentSecret, CoValueType, Edit, FixedClock, KeyProvider, LocalKeyring, Node, NodeConfig,
    storage::{InMemory, Storage},
};
use serde_json::json;

use crate::helpers::test_node;

fn open(keys: Arc<dyn KeyProvider>, storage: Arc<InMemory>, config: NodeConfig) -> Node {
    Node::open_with_clock(keys, storage, config, Arc::new(FixedClock::new(10_000))).unwrap()
}

#[test]
fn evicted_values_reload_from_storage() {
    let node = test_node();
    let group = node.create_group().unwrap();
    let doc = node
        .create(&group, CoValueType::Map, json!({"k": "v"}), None)
        .unwrap();
    let before = node.read(&doc).unwrap();

    assert!(node.evict(&doc));
    assert!(node.evict(&group));
    assert!(!node.evict(&doc));
    assert!(node.ids().unwrap().contains(&doc));

    assert_eq!(node.read(&doc).unwrap(), before);
    assert!(node.registry().is_loaded(&doc));
    assert!(node.registry().is_loaded(&group));
}

#[tokio::test]
async fn values_survive_a_restart_through_a_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("covalent.json");
    let keys: Arc<dyn KeyProvider> =
        Arc::new(LocalKeyring::with_device_id(AgentSecret::generate(), "laptop"));

    let storage = Arc::new(InMemory::new());
    let node = open(keys.clone(), storage.clone(), NodeConfig::default());
    let group = node.create_group().unwrap();
    let doc = node
        .create(&group, CoValueType::List, json!(["one"]), None)
        .unwrap();
    let session_before = node.known_state(&doc).unwrap().sessions;
    storage.save_to_file(&path).await.unwrap();
    drop(node);

    let storage = Arc::new(InMemory::load_from_file(&path).await.unwrap());
    assert_eq!(storage.ids().unwrap().len(), 2);
    let node = open(keys, storage.clone(), NodeConfig::default());
    assert_eq!(node.read(&doc).unwrap().value, json!(["one"]));

    // Same agent and device: the existing session continues.
    node.mutate(&doc, vec![Edit::push("two")]).unwrap();
    let sessions = node.known_state(&doc).unwrap().sessions;
    assert_eq!(sessions.len(), 1);
    assert_eq!(
        sessions.keys().collect::<Vec<_>>(),
        session_before.keys().collect::<Vec<_>>()
    );
    assert_eq!(sessions.values().sum::<u64>(), 2);
    assert_eq!(node.read(&doc).unwrap().value, json!(["one", "two"]));
    assert_eq!(storage.load(&doc).unwrap().unwrap().transaction_count(), 2);
}

#[test]
fn another_device_writes_in_its_own_session() {
    let keys: Arc<dyn KeyProvider> =
        Arc::new(LocalKeyring::with_device_id(AgentSecret::generate(), "laptop"));
    let storage = Arc::new(InMemory::new());
    let laptop = open(keys.clone(), storage.clone(), NodeConfig::default());
    let id = laptop
        .create_with_ruleset(
            CoValueType::Map,
            covalent::Ruleset::Account {
                agent: laptop.agent_id(),
            },
            json!({"laptop": true}),
            None,
        )
        .unwrap();
    assert_eq!(laptop.device_id(), "laptop");
    drop(laptop);

    let config = NodeConfig {
        device_id: Some("tablet".to_string()),
        ..NodeConfig::default()
    };
    let tablet = open(keys, storage, config);
    assert_eq!(tablet.device_id(), "tablet");
    tablet.mutate(&id, vec![Edit::set("tablet", true)]).unwrap();

    assert_eq!(
        tablet.read(&id).unwrap().value,
        json!({"laptop": true, "tablet": true})
    );
    assert_eq!(tablet.known_state(&id).unwrap().sessions.len(), 2);
}

#[tokio::test]
async fn missing_file_starts_empty() {
    let dir = tempfile::tempdir().unwrap();
    let storage = InMemory::load_from_file(dir.path().join("absent.json"))
        .await
        .unwrap();
    assert!(storage.ids().unwrap().is_empty());
}
