//! Integration tests for the group registry over the in-memory store.

use assert_matches::assert_matches;
use bytes::Bytes;
use corral_groups::{
    Error, Group, GroupChange, GroupManagement, GroupManager, GroupManagerConfig, InvalidGroup,
};
use corral_store::Store;
use corral_store_memory::MemoryStore;
use futures::StreamExt;

const PREFIX: &str = "corral/group/";

fn manager(store: &MemoryStore) -> GroupManager<MemoryStore> {
    GroupManager::new(GroupManagerConfig {
        store: store.clone(),
        prefix: PREFIX.to_string(),
    })
}

fn group(id: &str, name: &str, nids: &[&str]) -> Group {
    Group {
        id: id.to_string(),
        name: name.to_string(),
        node_ids: nids.iter().map(ToString::to_string).collect(),
    }
}

#[tokio::test]
async fn test_missing_group_is_absent() {
    let store = MemoryStore::new();
    let groups = manager(&store);

    assert!(groups.get("no-such-group").await.unwrap().is_none());

    // An empty id is absent without a store lookup, not an error.
    assert!(groups.get("").await.unwrap().is_none());
}

#[tokio::test]
async fn test_put_then_get_round_trip() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let store = MemoryStore::new();
    let groups = manager(&store);

    let first = groups
        .put(group("workers", "  Worker nodes ", &["node-7", "node-2"]), 0)
        .await
        .unwrap();

    let entry = groups.get("workers").await.unwrap().unwrap();
    assert_eq!(entry.revision, first);
    assert_eq!(entry.group.name, "Worker nodes");
    assert_eq!(entry.group.node_ids, vec!["node-7", "node-2"]);

    // Updating at the read revision replaces the prior value.
    let mut updated = entry.group.clone();
    updated.node_ids.push("node-9".to_string());
    let second = groups.put(updated, entry.revision).await.unwrap();
    assert!(second > first);

    let entry = groups.get("workers").await.unwrap().unwrap();
    assert_eq!(entry.group.node_ids, vec!["node-7", "node-2", "node-9"]);
}

#[tokio::test]
async fn test_validation_fails_before_any_write() {
    let store = MemoryStore::new();
    let groups = manager(&store);

    let err = groups.put(group("bad/id", "Name", &[]), 0).await.unwrap_err();
    assert_matches!(err, Error::Invalid(InvalidGroup::Id));

    let err = groups.put(group("ok", "   ", &[]), 0).await.unwrap_err();
    assert_matches!(err, Error::Invalid(InvalidGroup::Name));

    assert!(groups.list(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_conflicting_put_is_rejected() {
    let store = MemoryStore::new();
    let groups = manager(&store);

    let revision = groups.put(group("workers", "Workers", &[]), 0).await.unwrap();

    // First writer at the read revision wins.
    groups
        .put(group("workers", "Workers v2", &[]), revision)
        .await
        .unwrap();

    // Second writer still holding the stale revision loses; state is
    // untouched.
    let err = groups
        .put(group("workers", "Workers v3", &[]), revision)
        .await
        .unwrap_err();
    assert_matches!(err, Error::Conflict { ref id } if id == "workers");

    let entry = groups.get("workers").await.unwrap().unwrap();
    assert_eq!(entry.group.name, "Workers v2");
}

#[tokio::test]
async fn test_list_filters_by_membership() {
    let store = MemoryStore::new();
    let groups = manager(&store);

    groups
        .put(group("g1", "Group One", &["node-7", "node-2"]), 0)
        .await
        .unwrap();
    groups
        .put(group("g2", "Group Two", &["node-3"]), 0)
        .await
        .unwrap();

    let all = groups.list(None).await.unwrap();
    assert_eq!(all.len(), 2);
    assert!(all.contains_key("g1"));
    assert!(all.contains_key("g2"));

    let with_node_7 = groups.list(Some("node-7")).await.unwrap();
    assert_eq!(with_node_7.len(), 1);
    assert!(with_node_7.contains_key("g1"));

    assert!(groups.list(Some("node-9")).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_list_skips_undecodable_records() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let store = MemoryStore::new();
    let groups = manager(&store);

    groups
        .put(group("g1", "Group One", &["node-7"]), 0)
        .await
        .unwrap();

    // A record written by something else entirely must not hide the rest
    // of the registry.
    store
        .put(
            format!("{PREFIX}broken"),
            Bytes::from_static(b"not json"),
            0,
        )
        .await
        .unwrap();

    let all = groups.list(None).await.unwrap();
    assert_eq!(all.len(), 1);
    assert!(all.contains_key("g1"));
}

#[tokio::test]
async fn test_delete() {
    let store = MemoryStore::new();
    let groups = manager(&store);

    let err = groups.delete("no-such-group").await.unwrap_err();
    assert_matches!(err, Error::NotFound { ref id } if id == "no-such-group");

    groups.put(group("workers", "Workers", &[]), 0).await.unwrap();
    groups.delete("workers").await.unwrap();
    assert!(groups.get("workers").await.unwrap().is_none());
}

#[tokio::test]
async fn test_watch_observes_put_and_delete() {
    let store = MemoryStore::new();
    let groups = manager(&store);

    let mut watch = groups.watch().await.unwrap();

    groups
        .put(group("g1", "Group One", &["node-7"]), 0)
        .await
        .unwrap();

    // Writes outside the group namespace are invisible to the feed.
    store
        .put("corral/node/n1", Bytes::from_static(b"{}"), 0)
        .await
        .unwrap();

    groups.delete("g1").await.unwrap();

    let change = watch.next().await.unwrap().unwrap();
    assert_matches!(change, GroupChange::Put { ref id, ref group, .. } if id == "g1" && group.name == "Group One");

    let change = watch.next().await.unwrap().unwrap();
    assert_matches!(change, GroupChange::Delete { ref id } if id == "g1");
}

#[tokio::test]
async fn test_watch_surfaces_decode_failures_per_event() {
    let store = MemoryStore::new();
    let groups = manager(&store);

    let mut watch = groups.watch().await.unwrap();

    store
        .put(
            format!("{PREFIX}broken"),
            Bytes::from_static(b"not json"),
            0,
        )
        .await
        .unwrap();
    groups
        .put(group("g1", "Group One", &[]), 0)
        .await
        .unwrap();

    // The undecodable value is an error item, not a dropped event, and the
    // feed keeps going.
    let err = watch.next().await.unwrap().unwrap_err();
    assert_matches!(err, Error::Decode { ref key, .. } if key == "corral/group/broken");

    let change = watch.next().await.unwrap().unwrap();
    assert_matches!(change, GroupChange::Put { ref id, .. } if id == "g1");
}

#[tokio::test]
async fn test_key_derivation() {
    let store = MemoryStore::new();
    let groups = manager(&store);

    assert_eq!(groups.key_for("g1"), "corral/group/g1");

    // Total for any string; validation, not key construction, is the safety
    // net for ids that never passed a put.
    assert_eq!(groups.key_for("a/b"), "corral/group/a/b");
}
