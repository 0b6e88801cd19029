//! Shared harness: deterministic nodes on one in-memory medium.

// Each integration test binary uses a different subset of the harness.
#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use rand_chacha::rand_core::SeedableRng;
use rand_chacha::ChaCha8Rng;

use peerlink::config::Config;
use peerlink::protocol::{Endpoint, LinkStack, ProtocolHandler};
use peerlink::transport::{MemRadio, NodeAddr, SharedMedium, SimTimers};

/// Delivered payloads, shared between a handler and the test body.
#[derive(Clone, Default)]
pub struct Inbox(Rc<RefCell<Vec<(Endpoint, NodeAddr, Vec<u8>)>>>);

impl Inbox {
    /// Empty inbox.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain everything delivered so far.
    pub fn take(&self) -> Vec<(Endpoint, NodeAddr, Vec<u8>)> {
        self.0.borrow_mut().drain(..).collect()
    }
}

/// Handler that records every delivery into an [`Inbox`].
pub struct RecordingHandler {
    inbox: Inbox,
}

impl RecordingHandler {
    /// Boxed handler feeding the given inbox.
    pub fn new(inbox: &Inbox) -> Box<Self> {
        Box::new(Self {
            inbox: inbox.clone(),
        })
    }
}

impl ProtocolHandler for RecordingHandler {
    fn deliver(
        &mut self,
        source: Endpoint,
        peer: NodeAddr,
        payload: &[u8],
    ) -> peerlink::Result<()> {
        self.inbox.0.borrow_mut().push((source, peer, payload.to_vec()));
        Ok(())
    }

    fn acquire_buffer(&mut self, existing: Option<Vec<u8>>, len: usize, _will_ack: bool) -> Vec<u8> {
        let mut buf = existing.unwrap_or_default();
        if buf.len() < len {
            buf.resize(len, 0);
        }
        buf
    }
}

/// One simulated node: stack plus the timer queue driving it.
pub struct TestNode {
    pub addr: NodeAddr,
    pub timers: SimTimers,
    pub stack: LinkStack<MemRadio, SimTimers, ChaCha8Rng>,
}

/// Node with a seeded RNG and an already-started stack.
pub fn node(medium: &SharedMedium, addr: u64, config: Config) -> TestNode {
    node_with_mtu(medium, addr, config, None)
}

/// Like [`node`], with an overridden radio MTU.
pub fn node_with_mtu(
    medium: &SharedMedium,
    addr: u64,
    config: Config,
    mtu: Option<usize>,
) -> TestNode {
    let addr = NodeAddr(addr);
    let timers = SimTimers::new();
    let mut radio = medium.endpoint(addr);
    if let Some(mtu) = mtu {
        radio = radio.with_mtu(mtu);
    }
    let mut stack = LinkStack::new(radio, timers.clone(), ChaCha8Rng::seed_from_u64(addr.0), config);
    stack.start();
    TestNode { addr, timers, stack }
}

/// Timings shrunk so eviction paths trigger within a short virtual run.
pub fn fast_config() -> Config {
    let mut config = Config::default();
    config.timing.discovery_period_ms = 50;
    config.timing.sweep_period_ms = 100;
    config.timing.sweep_initial_grace_ms = 0;
    config.timing.heartbeat_threshold_ms = 300;
    config.timing.connect_timeout_ms = 400;
    config.timing.delete_threshold_ms = 1000;
    config.validate().unwrap();
    config
}

/// Deliver in-flight frames and fire due timers until quiescent or the
/// virtual clock would pass `until_ms`. Nodes absent from the slice have
/// effectively gone silent; frames addressed to them are dropped.
pub fn pump(nodes: &mut [&mut TestNode], medium: &SharedMedium, until_ms: u64) {
    loop {
        loop {
            let frames = medium.drain();
            if frames.is_empty() {
                break;
            }
            for f in frames {
                for node in nodes.iter_mut() {
                    if node.addr == f.from {
                        continue;
                    }
                    if f.to == node.addr || f.to == NodeAddr::BROADCAST {
                        node.stack.handle_frame(f.from, &f.frame);
                    }
                }
            }
        }

        let mut fired = false;
        for node in nodes.iter_mut() {
            while let Some(event) = node.timers.pop_due() {
                node.stack.handle_timer(event);
                fired = true;
            }
        }
        if fired || medium.pending() > 0 {
            continue;
        }

        let next = nodes.iter().filter_map(|n| n.timers.next_deadline()).min();
        match next {
            Some(deadline) if deadline <= until_ms => {
                for node in nodes.iter_mut() {
                    node.timers.advance_to(deadline);
                }
            },
            _ => return,
        }
    }
}
