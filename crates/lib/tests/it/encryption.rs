//! Read keys: hidden content, key delivery, rotation and sealing.

use std::sync::Arc;

use covalent::{
    AgentSecret, CoValueType, Edit, FixedClock, LocalKeyring, LocalTransport, Node, NodeConfig,
    Role,
    crypto::{seal, unseal},
    storage::InMemory,
};
use serde_json::json;

use crate::helpers::{export, node_at, replay};

#[test]
fn content_appears_once_the_key_is_delivered() {
    let (admin, _) = node_at(1_000);
    let (outsider, _) = node_at(1_000);
    let group = admin.create_group().unwrap();
    let doc = admin
        .create(&group, CoValueType::Map, json!({"secret": 42}), None)
        .unwrap();

    let (group_header, group_txs) = export(&admin, &group);
    let (doc_header, doc_txs) = export(&admin, &doc);
    replay(&group_header, &group_txs, &outsider);
    replay(&doc_header, &doc_txs, &outsider);

    let hidden = outsider.read(&doc).unwrap();
    assert_eq!(hidden.value, json!({}));
    assert_eq!(hidden.hidden, 1);
    assert_eq!(hidden.rejected, 0);

    let (key_id, secret) = admin.current_read_key(&group).unwrap();
    outsider.add_read_key(key_id, secret);
    let shown = outsider.read(&doc).unwrap();
    assert_eq!(shown.value, json!({"secret": 42}));
    assert_eq!(shown.hidden, 0);
}

#[tokio::test]
async fn membership_grant_delivers_the_key_through_sync() {
    let (admin, _) = node_at(1_000);
    let (reader, _) = node_at(1_000);
    let group = admin.create_group().unwrap();
    let doc = admin
        .create(&group, CoValueType::Text, json!("for members"), None)
        .unwrap();
    let link = LocalTransport::new(admin.clone());

    reader.sync(&link).await.unwrap();
    assert_eq!(reader.read(&doc).unwrap().value, json!(""));

    admin
        .set_role(&group, &reader.agent_id(), Role::Reader)
        .unwrap();
    let report = reader.sync(&link).await.unwrap();
    assert!(report.received > 0);
    assert_eq!(reader.read(&doc).unwrap().value, json!("for members"));
}

#[test]
fn keys_held_by_the_host_are_used() {
    let (admin, _) = node_at(1_000);
    let group = admin.create_group().unwrap();
    let doc = admin
        .create(&group, CoValueType::List, json!(["a"]), None)
        .unwrap();
    let (key_id, secret) = admin.current_read_key(&group).unwrap();

    let keyring = Arc::new(LocalKeyring::generate());
    keyring.insert_read_key(key_id, secret);
    let host = Node::open_with_clock(
        keyring,
        Arc::new(InMemory::new()),
        NodeConfig::default(),
        Arc::new(FixedClock::new(1_000)),
    )
    .unwrap();
    let (group_header, group_txs) = export(&admin, &group);
    let (doc_header, doc_txs) = export(&admin, &doc);
    replay(&group_header, &group_txs, &host);
    replay(&doc_header, &doc_txs, &host);
    assert_eq!(host.read(&doc).unwrap().value, json!(["a"]));
}

#[tokio::test]
async fn members_added_after_rotation_read_older_content() {
    let (admin, _) = node_at(1_000);
    let (late, _) = node_at(1_000);
    let group = admin.create_group().unwrap();
    let doc = admin
        .create(&group, CoValueType::Map, json!({"v1": true}), None)
        .unwrap();
    let first_key = admin.current_read_key(&group).unwrap().0;

    let second_key = admin.rotate_read_key(&group).unwrap();
    assert_ne!(first_key, second_key);
    admin.mutate(&doc, vec![Edit::set("v2", true)]).unwrap();

    admin
        .set_role(&group, &late.agent_id(), Role::Reader)
        .unwrap();
    let state = admin.group_state(&group).unwrap();
    assert!(state.sealed_key_for(&first_key, &late.agent_id()).is_none());
    assert!(state.sealed_key_for(&second_key, &late.agent_id()).is_some());

    late.sync(&LocalTransport::new(admin.clone())).await.unwrap();
    let seen = late.read(&doc).unwrap();
    assert_eq!(seen.value, json!({"v1": true, "v2": true}));
    assert_eq!(seen.hidden, 0);
}

#[tokio::test]
async fn removed_members_cannot_read_new_content() {
    let (admin, _) = node_at(1_000);
    let (member, _) = node_at(1_000);
    let group = admin.create_group().unwrap();
    admin
        .set_role(&group, &member.agent_id(), Role::Reader)
        .unwrap();
    let doc = admin
        .create(&group, CoValueType::Map, json!({"before": 1}), None)
        .unwrap();

    let rotated = admin.remove_member(&group, &member.agent_id()).unwrap();
    admin.mutate(&doc, vec![Edit::set("after", 2)]).unwrap();
    assert_eq!(
        admin.group_state(&group).unwrap().role(&member.agent_id()),
        Some(Role::Revoked)
    );

    member.sync(&LocalTransport::new(admin.clone())).await.unwrap();
    let seen = member.read(&doc).unwrap();
    assert_eq!(seen.value, json!({"before": 1}));
    assert_eq!(seen.hidden, 1);

    let state = member.group_state(&group).unwrap();
    assert_eq!(state.read_key_id(), Some(rotated.clone()));
    assert!(state.sealed_key_for(&rotated, &member.agent_id()).is_none());
}

#[test]
fn sealed_payload_opens_only_for_recipients() {
    let alice = AgentSecret::generate();
    let bob = AgentSecret::generate();
    let eve = AgentSecret::generate();
    let recipients = [
        alice.agent_id().sealer().unwrap(),
        bob.agent_id().sealer().unwrap(),
    ];

    let sealed = seal(b"group key", &recipients).unwrap();
    assert_eq!(unseal(&sealed, &alice.sealer).unwrap(), b"group key");
    assert_eq!(unseal(&sealed, &bob.sealer).unwrap(), b"group key");
    assert!(unseal(&sealed, &eve.sealer).is_err());
}
