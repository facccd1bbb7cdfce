//! Integration tests for client-side ring routing.

use std::num::NonZeroU32;

use cinder_cluster::{ClusterError, ClusterRouter, ConnectionParams};
use cinder_protocol::Frame;

use crate::helpers::{cmd, ring_cluster, MockBackends};

fn aliased(host: &str, alias: &str) -> ConnectionParams {
    ConnectionParams::new(host, 6379).with_alias(alias)
}

fn three_node_cluster(backends: &MockBackends) -> cinder_cluster::RingCluster {
    ring_cluster(
        backends,
        &[
            aliased("10.0.0.1", "a"),
            aliased("10.0.0.2", "b"),
            aliased("10.0.0.3", "c"),
        ],
    )
}

/// The id of the node a key routes to.
fn target_of(cluster: &mut cinder_cluster::RingCluster, key: &[u8]) -> String {
    cluster
        .connection_for_key(key)
        .unwrap()
        .params()
        .canonical_id()
}

#[test]
fn key_routing_is_deterministic() {
    let backends = MockBackends::new();
    let mut cluster = three_node_cluster(&backends);

    for i in 0..50u32 {
        let key = format!("key:{i}");
        let first = target_of(&mut cluster, key.as_bytes());
        let second = target_of(&mut cluster, key.as_bytes());
        assert_eq!(first, second);
    }
}

#[test]
fn hash_tags_colocate_keys() {
    let backends = MockBackends::new();
    let mut cluster = three_node_cluster(&backends);

    let a = target_of(&mut cluster, b"{user1000}.following");
    let b = target_of(&mut cluster, b"{user1000}.followers");
    assert_eq!(a, b);
}

#[test]
fn commands_route_like_their_keys() {
    let backends = MockBackends::new();
    let mut cluster = three_node_cluster(&backends);

    let expected = target_of(&mut cluster, b"user:42");
    let mut get = cmd("GET", &["user:42"]);
    cluster.execute_command(&mut get).unwrap();

    assert_eq!(backends.executed(&expected), vec!["GET user:42"]);
    assert!(get.hash().is_some());
}

#[test]
fn memoized_hash_short_circuits_extraction() {
    let backends = MockBackends::new();
    let mut cluster = three_node_cluster(&backends);

    let mut get = cmd("GET", &["user:42"]);
    let first = cluster.connection_for(&mut get).unwrap().params().canonical_id();
    let second = cluster.connection_for(&mut get).unwrap().params().canonical_id();
    assert_eq!(first, second);
}

#[test]
fn cross_node_multi_key_commands_are_refused() {
    let backends = MockBackends::new();
    let mut cluster = three_node_cluster(&backends);

    // find two keys living on different nodes
    let mut keys: Option<(String, String)> = None;
    let anchor = target_of(&mut cluster, b"key:0");
    for i in 1..1000u32 {
        let candidate = format!("key:{i}");
        if target_of(&mut cluster, candidate.as_bytes()) != anchor {
            keys = Some(("key:0".to_string(), candidate));
            break;
        }
    }
    let (first, second) = keys.expect("3-node ring should split 1000 keys");

    let mut mget = cmd("MGET", &[&first, &second]);
    let err = cluster.execute_command(&mut mget).unwrap_err();
    assert!(matches!(err, ClusterError::CrossNode(..)));
    assert!(err.is_unroutable());
}

#[test]
fn broadcast_runs_in_insertion_order() {
    let backends = MockBackends::new();
    let mut cluster = three_node_cluster(&backends);

    backends.push_reply("a", Frame::Integer(1));
    backends.push_reply("b", Frame::Integer(2));
    backends.push_reply("c", Frame::Integer(3));

    let replies = cluster.execute_on_all(&cmd("DBSIZE", &[])).unwrap();
    assert_eq!(
        replies,
        vec![Frame::Integer(1), Frame::Integer(2), Frame::Integer(3)]
    );
    for id in ["a", "b", "c"] {
        assert_eq!(backends.executed(id), vec!["DBSIZE"]);
    }
}

#[test]
fn ids_follow_insertion_order() {
    let backends = MockBackends::new();
    let cluster = ring_cluster(
        &backends,
        &[
            aliased("10.0.0.3", "c"),
            aliased("10.0.0.1", "a"),
            aliased("10.0.0.2", "b"),
        ],
    );
    assert_eq!(cluster.ids(), vec!["c", "a", "b"]);
}

#[test]
fn alias_less_connections_get_numeric_ids() {
    let backends = MockBackends::new();
    let mut cluster = ring_cluster(
        &backends,
        &[
            ConnectionParams::new("10.0.0.1", 6379),
            ConnectionParams::new("10.0.0.2", 6379),
        ],
    );
    assert_eq!(cluster.ids(), vec!["0", "1"]);

    // removal by parameters still finds the numerically-keyed connection
    let removed = cluster
        .remove(&ConnectionParams::new("10.0.0.2", 6379))
        .unwrap();
    assert_eq!(removed.params().addr(), "10.0.0.2:6379");
    assert_eq!(cluster.ids(), vec!["0"]);
}

#[test]
fn removal_reroutes_and_readd_restores() {
    let backends = MockBackends::new();
    let mut cluster = three_node_cluster(&backends);

    // pick a key owned by "b"
    let mut key = None;
    for i in 0..1000u32 {
        let candidate = format!("key:{i}");
        if target_of(&mut cluster, candidate.as_bytes()) == "b" {
            key = Some(candidate);
            break;
        }
    }
    let key = key.expect("some key lands on b");

    let removed = cluster.remove_by_id("b").unwrap();
    assert_eq!(cluster.len(), 2);
    let fallback = target_of(&mut cluster, key.as_bytes());
    assert_ne!(fallback, "b");

    cluster.add(removed);
    assert_eq!(target_of(&mut cluster, key.as_bytes()), "b");
}

#[test]
fn weighted_nodes_take_a_larger_share() {
    let backends = MockBackends::new();
    let mut cluster = ring_cluster(
        &backends,
        &[
            aliased("10.0.0.1", "light"),
            aliased("10.0.0.2", "heavy").with_weight(NonZeroU32::new(4).unwrap()),
        ],
    );

    let mut heavy = 0u32;
    const KEYS: u32 = 2000;
    for i in 0..KEYS {
        let key = format!("key:{i}");
        if target_of(&mut cluster, key.as_bytes()) == "heavy" {
            heavy += 1;
        }
    }

    // 4 of 5 weight units; accept anything clearly above an even split
    assert!(
        heavy > KEYS * 6 / 10,
        "weight-4 node only took {heavy} of {KEYS} keys"
    );
    assert!(heavy < KEYS, "weight-1 node took no keys at all");
}

#[test]
fn server_errors_pass_through_untouched() {
    let backends = MockBackends::new();
    let mut cluster = three_node_cluster(&backends);

    let target = target_of(&mut cluster, b"foo");
    backends.push_reply(&target, Frame::Error("MOVED 3000 10.0.0.9:6379".into()));

    // no redirection in this regime: the error is the reply
    let reply = cluster.execute_command(&mut cmd("GET", &["foo"])).unwrap();
    assert_eq!(reply, Frame::Error("MOVED 3000 10.0.0.9:6379".into()));
    assert!(!backends.has("10.0.0.9:6379"));
}

#[test]
fn empty_pool_is_an_error() {
    let backends = MockBackends::new();
    let mut cluster = ring_cluster(&backends, &[]);

    let err = cluster.connection_for_key(b"foo").unwrap_err();
    assert!(matches!(err, ClusterError::EmptyPool));
}
