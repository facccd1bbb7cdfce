//! Integration tests for MOVED/ASK redirection handling.

use cinder_cluster::{ClusterError, ClusterRouter};
use cinder_protocol::Frame;

use crate::helpers::{ask, cmd, key_for_slot, moved, slot_cluster, MockBackends};

const NODE_A: &str = "10.0.0.1:6379";
const NODE_B: &str = "10.0.0.2:6379";
const NODE_C: &str = "10.0.0.3:6379";

/// One node owning every slot, so each command starts at A.
fn single_owner_cluster(backends: &MockBackends) -> cinder_cluster::SlotCluster {
    let mut cluster = slot_cluster(backends, &[("10.0.0.1", 6379)]);
    cluster.assign_slots(0, 16383, NODE_A).unwrap();
    cluster
}

#[test]
fn moved_materializes_target_and_reexecutes() {
    let backends = MockBackends::new();
    let mut cluster = single_owner_cluster(&backends);

    let key = key_for_slot(3000);
    backends.push_reply(NODE_A, moved(3000, NODE_B));

    let mut get = cmd("GET", &[&key]);
    let reply = cluster.execute_command(&mut get).unwrap();
    assert_eq!(reply, Frame::Simple("OK".into()));

    // the target was created through the factory, pooled, and used
    assert!(backends.has(NODE_B));
    assert!(cluster.ids().contains(&NODE_B.to_string()));
    assert_eq!(backends.executed(NODE_B), vec![format!("GET {key}")]);

    // the memoized routing was rewritten to the new owner
    assert_eq!(cluster.cached_target(3000), Some(NODE_B));
}

#[test]
fn slot_stays_on_the_new_owner_after_moved() {
    let backends = MockBackends::new();
    let mut cluster = single_owner_cluster(&backends);

    let key = key_for_slot(3000);
    backends.push_reply(NODE_A, moved(3000, NODE_B));
    cluster.execute_command(&mut cmd("GET", &[&key])).unwrap();

    // second command to the same slot goes straight to B
    cluster.execute_command(&mut cmd("GET", &[&key])).unwrap();

    assert_eq!(backends.executed(NODE_A).len(), 1);
    assert_eq!(backends.executed(NODE_B).len(), 2);
}

#[test]
fn moved_is_idempotent() {
    let backends = MockBackends::new();
    let mut cluster = single_owner_cluster(&backends);

    let key = key_for_slot(3000);
    backends.push_reply(NODE_A, moved(3000, NODE_B));
    cluster.execute_command(&mut cmd("GET", &[&key])).unwrap();

    // B repeating the same MOVED (e.g. a stale retry) changes nothing
    backends.push_reply(NODE_B, moved(3000, NODE_B));
    let reply = cluster.execute_command(&mut cmd("GET", &[&key])).unwrap();
    assert_eq!(reply, Frame::Simple("OK".into()));

    assert_eq!(cluster.cached_target(3000), Some(NODE_B));
    assert_eq!(cluster.len(), 2);
}

#[test]
fn chained_moved_is_followed() {
    let backends = MockBackends::new();
    let mut cluster = slot_cluster(&backends, &[("10.0.0.1", 6379), ("10.0.0.2", 6379)]);
    cluster.assign_slots(0, 16383, NODE_A).unwrap();

    let key = key_for_slot(3000);
    backends.push_reply(NODE_A, moved(3000, NODE_B));
    backends.push_reply(NODE_B, moved(3000, NODE_C));

    let reply = cluster.execute_command(&mut cmd("GET", &[&key])).unwrap();
    assert_eq!(reply, Frame::Simple("OK".into()));

    assert_eq!(backends.executed(NODE_C), vec![format!("GET {key}")]);
    assert_eq!(cluster.cached_target(3000), Some(NODE_C));
    assert_eq!(cluster.len(), 3);
}

#[test]
fn ask_redirects_once_with_asking_preamble() {
    let backends = MockBackends::new();
    let mut cluster = slot_cluster(&backends, &[("10.0.0.1", 6379), ("10.0.0.2", 6379)]);
    cluster.assign_slots(0, 16383, NODE_A).unwrap();

    let key = key_for_slot(3000);
    backends.push_reply(NODE_A, ask(3000, NODE_B));
    backends.push_reply(NODE_B, Frame::Simple("OK".into())); // ASKING ack
    backends.push_reply(NODE_B, Frame::bulk(b"value"));

    let reply = cluster.execute_command(&mut cmd("GET", &[&key])).unwrap();
    assert_eq!(reply, Frame::bulk(b"value"));

    // ASKING and the command went out on the target in one write
    assert_eq!(
        backends.written(NODE_B),
        vec!["ASKING".to_string(), format!("GET {key}")]
    );
}

#[test]
fn ask_does_not_change_routing_state() {
    let backends = MockBackends::new();
    let mut cluster = slot_cluster(&backends, &[("10.0.0.1", 6379), ("10.0.0.2", 6379)]);
    cluster.assign_slots(0, 16383, NODE_A).unwrap();

    let key = key_for_slot(3000);
    backends.push_reply(NODE_A, ask(3000, NODE_B));
    cluster.execute_command(&mut cmd("GET", &[&key])).unwrap();

    assert_eq!(cluster.assigned_owner(3000), Some(NODE_A));
    assert_eq!(cluster.cached_target(3000), Some(NODE_A));

    // the next command for the slot still routes to A
    cluster.execute_command(&mut cmd("GET", &[&key])).unwrap();
    assert_eq!(backends.executed(NODE_A).len(), 2);
}

#[test]
fn ask_target_outside_the_pool_stays_outside() {
    let backends = MockBackends::new();
    let mut cluster = single_owner_cluster(&backends);

    let key = key_for_slot(3000);
    backends.push_reply(NODE_A, ask(3000, NODE_B));

    let reply = cluster.execute_command(&mut cmd("GET", &[&key])).unwrap();
    assert_eq!(reply, Frame::Simple("OK".into()));

    // a transient connection served the ASK without joining the pool
    assert!(backends.has(NODE_B));
    assert_eq!(cluster.len(), 1);
    assert_eq!(
        backends.written(NODE_B),
        vec!["ASKING".to_string(), format!("GET {key}")]
    );
}

#[test]
fn redirect_ping_pong_hits_the_loop_cap() {
    let backends = MockBackends::new();
    let mut cluster = slot_cluster(&backends, &[("10.0.0.1", 6379), ("10.0.0.2", 6379)]);
    cluster.assign_slots(0, 16383, NODE_A).unwrap();

    // two nodes that keep pointing at each other
    for _ in 0..20 {
        backends.push_reply(NODE_A, moved(3000, NODE_B));
        backends.push_reply(NODE_B, moved(3000, NODE_A));
    }

    let key = key_for_slot(3000);
    let err = cluster.execute_command(&mut cmd("GET", &[&key])).unwrap_err();
    assert!(matches!(
        err,
        ClusterError::RedirectLoop { slot: 3000, .. }
    ));
}

#[test]
fn malformed_redirects_are_a_client_error() {
    let backends = MockBackends::new();
    let mut cluster = single_owner_cluster(&backends);

    let key = key_for_slot(3000);
    backends.push_reply(NODE_A, Frame::Error("MOVED notaslot 10.0.0.2:6379".into()));

    let err = cluster.execute_command(&mut cmd("GET", &[&key])).unwrap_err();
    assert!(matches!(err, ClusterError::MalformedRedirect(_)));
}

#[test]
fn ordinary_server_errors_are_replies_not_redirects() {
    let backends = MockBackends::new();
    let mut cluster = single_owner_cluster(&backends);

    backends.push_reply(NODE_A, Frame::Error("WRONGTYPE not a string".into()));

    let reply = cluster.execute_command(&mut cmd("GET", &["foo"])).unwrap();
    assert_eq!(reply, Frame::Error("WRONGTYPE not a string".into()));
    assert_eq!(cluster.len(), 1);
}
