//! Maintenance sweep behavior: heartbeats, replay protection, eviction
//! and the client's fallback to discovery.

mod common;

use common::{fast_config, node, pump, Inbox, RecordingHandler};
use peerlink::crypto;
use peerlink::protocol::{ConnectionStatus, Role};
use peerlink::transport::{NodeAddr, SharedMedium};
use peerlink::wire::{Frame, FrameType};

const PID: u8 = 3;
const SERVER: u64 = 5;
const CLIENT: u64 = 9;

fn connected_pair(medium: &SharedMedium) -> (common::TestNode, common::TestNode) {
    let mut server = node(medium, SERVER, fast_config());
    let mut client = node(medium, CLIENT, fast_config());
    server
        .stack
        .register(PID, Role::Server, RecordingHandler::new(&Inbox::new()))
        .unwrap();
    client
        .stack
        .register(PID, Role::Client, RecordingHandler::new(&Inbox::new()))
        .unwrap();
    pump(&mut [&mut server, &mut client], medium, 1000);
    assert!(server.stack.is_connected(PID));
    assert!(client.stack.is_connected(PID));
    (server, client)
}

#[test]
fn test_heartbeats_keep_idle_session_alive() {
    let medium = SharedMedium::new();
    let (mut server, mut client) = connected_pair(&medium);

    // Far past the delete threshold in virtual time; heartbeats must keep
    // resetting both records.
    pump(&mut [&mut server, &mut client], &medium, 8000);

    assert!(server.stack.is_connected(PID));
    assert!(client.stack.is_connected(PID));
    let s = server.stack.connection(PID, NodeAddr(CLIENT)).unwrap();
    let c = client.stack.connection(PID, NodeAddr(SERVER)).unwrap();
    assert_eq!(s.client_counter, c.client_counter);
    assert_eq!(s.server_counter, c.server_counter);
}

#[test]
fn test_client_restarts_discovery_after_peer_loss() {
    let medium = SharedMedium::new();
    let (server, mut client) = connected_pair(&medium);
    drop(server);

    let old_counter = client
        .stack
        .connection(PID, NodeAddr(SERVER))
        .unwrap()
        .client_counter;

    // The server has gone silent; heartbeats go unanswered until the
    // delete threshold trips.
    let now = client.timers.now();
    pump(&mut [&mut client], &medium, now + 1600);

    let rec = client.stack.connection_by_pid(PID).unwrap();
    assert_eq!(rec.status, ConnectionStatus::SendingDiscovery);
    assert_eq!(rec.peer, NodeAddr::UNSET);
    assert_eq!(rec.nonce, 0);
    assert_eq!(rec.session_key, [0u8; 16]);
    assert_ne!(rec.client_counter, old_counter);
}

#[test]
fn test_server_evicts_silent_session() {
    let medium = SharedMedium::new();
    let (mut server, client) = connected_pair(&medium);
    drop(client);

    let now = server.timers.now();
    pump(&mut [&mut server], &medium, now + 1600);

    assert_eq!(server.stack.connection_count(), 0);
}

#[test]
fn test_server_abandons_stalled_handshake() {
    let medium = SharedMedium::new();
    let mut server = node(&medium, SERVER, fast_config());
    server
        .stack
        .register(PID, Role::Server, RecordingHandler::new(&Inbox::new()))
        .unwrap();

    let mut discovery = Frame::new(FrameType::Discovery, false);
    discovery.set_pid(PID);
    discovery.set_counter(42);
    discovery.extend_payload(&[0]);
    crypto::seal(discovery.as_mut_vec(), &crypto::REQUEST_KEY);
    server.stack.handle_frame(NodeAddr(CLIENT), discovery.as_bytes());
    assert_eq!(server.stack.connection_count(), 1);
    medium.drain();

    // No Connect-Request ever arrives.
    let now = server.timers.now();
    pump(&mut [&mut server], &medium, now + 600);
    assert_eq!(server.stack.connection_count(), 0);
}

#[test]
fn test_client_abandons_stalled_handshake() {
    let medium = SharedMedium::new();
    let mut client = node(&medium, CLIENT, fast_config());
    client
        .stack
        .register(PID, Role::Client, RecordingHandler::new(&Inbox::new()))
        .unwrap();

    let counter = client.stack.connection_by_pid(PID).unwrap().client_counter;
    let mut advertise = Frame::new(FrameType::Advertise, false);
    advertise.set_pid(PID);
    advertise.set_counter(counter);
    advertise.extend_payload(&[0]);
    crypto::seal(advertise.as_mut_vec(), &crypto::REQUEST_KEY);
    client.stack.handle_frame(NodeAddr(SERVER), advertise.as_bytes());

    assert_eq!(
        client.stack.connection_by_pid(PID).unwrap().status,
        ConnectionStatus::ConnectSent
    );
    medium.drain();

    // The Connect-Allow never arrives; the record must fall back to
    // discovery rather than disappear.
    let now = client.timers.now();
    pump(&mut [&mut client], &medium, now + 600);

    let rec = client.stack.connection_by_pid(PID).unwrap();
    assert_eq!(rec.status, ConnectionStatus::SendingDiscovery);
    assert_eq!(rec.peer, NodeAddr::UNSET);
}

#[test]
fn test_replayed_heartbeat_is_ignored() {
    let medium = SharedMedium::new();
    let (mut server, client) = connected_pair(&medium);
    drop(client);
    medium.drain();

    let rec = server.stack.connection(PID, NodeAddr(CLIENT)).unwrap();
    let expected = rec.client_counter;
    let key = rec.session_key;

    let mut hb = Frame::new(FrameType::Heartbeat, false);
    hb.set_pid(PID);
    hb.set_counter(expected);
    crypto::seal(hb.as_mut_vec(), &key);

    // First delivery matches and advances the counter.
    server.stack.handle_frame(NodeAddr(CLIENT), hb.as_bytes());
    assert_eq!(
        server
            .stack
            .connection(PID, NodeAddr(CLIENT))
            .unwrap()
            .client_counter,
        expected.wrapping_add(1)
    );

    // The identical frame replayed must change nothing.
    server.stack.handle_frame(NodeAddr(CLIENT), hb.as_bytes());
    assert_eq!(
        server
            .stack
            .connection(PID, NodeAddr(CLIENT))
            .unwrap()
            .client_counter,
        expected.wrapping_add(1)
    );
}

#[test]
fn test_stale_discovery_timer_is_noop() {
    let medium = SharedMedium::new();
    let mut client = node(&medium, CLIENT, fast_config());
    client
        .stack
        .register(PID, Role::Client, RecordingHandler::new(&Inbox::new()))
        .unwrap();
    client.stack.unregister(PID).unwrap();
    medium.drain();

    // The retry scheduled at registration now refers to an erased slot.
    client.timers.advance_to(50);
    while let Some(event) = client.timers.pop_due() {
        client.stack.handle_timer(event);
    }
    assert_eq!(medium.pending(), 0);
    assert_eq!(client.stack.connection_count(), 0);
}
