//! In-process broadcast medium and simulated timer service.
//!
//! Used by the demo binary and the integration tests to wire several
//! stacks together deterministically. Shared state is `Rc<RefCell<..>>`
//! because the whole model is single-threaded by design.

use std::cell::RefCell;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, VecDeque};
use std::rc::Rc;
use std::time::Duration;

use super::{NodeAddr, TimerEvent, TimerService, Transport};
use crate::error::Result;

/// Default frame size limit of the in-memory radio (bytes).
pub const DEFAULT_MTU: usize = 96;

/// A frame sitting on the medium, waiting for the driver to deliver it.
#[derive(Debug, Clone)]
pub struct InFlight {
    /// Sender address.
    pub from: NodeAddr,
    /// Destination, possibly [`NodeAddr::BROADCAST`].
    pub to: NodeAddr,
    /// Raw frame bytes.
    pub frame: Vec<u8>,
}

/// Shared broadcast bus connecting several [`MemRadio`] endpoints.
#[derive(Debug, Clone, Default)]
pub struct SharedMedium {
    queue: Rc<RefCell<VecDeque<InFlight>>>,
}

impl SharedMedium {
    /// Create an empty medium.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a radio endpoint with the default MTU.
    pub fn endpoint(&self, addr: NodeAddr) -> MemRadio {
        MemRadio {
            addr,
            mtu: DEFAULT_MTU,
            medium: self.clone(),
        }
    }

    /// Take every frame currently in flight, in send order.
    pub fn drain(&self) -> Vec<InFlight> {
        self.queue.borrow_mut().drain(..).collect()
    }

    /// Number of frames waiting for delivery.
    pub fn pending(&self) -> usize {
        self.queue.borrow().len()
    }
}

/// Radio endpoint bound to a [`SharedMedium`].
#[derive(Debug, Clone)]
pub struct MemRadio {
    addr: NodeAddr,
    mtu: usize,
    medium: SharedMedium,
}

impl MemRadio {
    /// Override the frame size limit, for fragmentation tests.
    pub fn with_mtu(mut self, mtu: usize) -> Self {
        self.mtu = mtu;
        self
    }
}

impl Transport for MemRadio {
    fn local_addr(&self) -> NodeAddr {
        self.addr
    }

    fn send(&mut self, dest: NodeAddr, frame: &[u8]) -> Result<()> {
        tracing::trace!(from = %self.addr, to = %dest, len = frame.len(), "radio send");
        self.medium.queue.borrow_mut().push_back(InFlight {
            from: self.addr,
            to: dest,
            frame: frame.to_vec(),
        });
        Ok(())
    }

    fn max_frame_len(&self) -> usize {
        self.mtu
    }
}

#[derive(Debug, Default)]
struct TimerInner {
    now_ms: u64,
    seq: u64,
    // Reverse for a min-heap; seq breaks deadline ties in schedule order.
    heap: BinaryHeap<Reverse<(u64, u64, EventKey)>>,
}

// TimerEvent carries no ordering of its own; wrap it in an orderable key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct EventKey(u8, u32, u32);

impl From<TimerEvent> for EventKey {
    fn from(ev: TimerEvent) -> Self {
        match ev {
            TimerEvent::MaintenanceSweep => EventKey(0, 0, 0),
            TimerEvent::DiscoveryRetry(h) => EventKey(1, h.index() as u32, h.generation()),
        }
    }
}

impl From<EventKey> for TimerEvent {
    fn from(key: EventKey) -> Self {
        match key {
            EventKey(0, _, _) => TimerEvent::MaintenanceSweep,
            EventKey(_, index, generation) => {
                TimerEvent::DiscoveryRetry(crate::protocol::ConnHandle::new(
                    index as usize,
                    generation,
                ))
            },
        }
    }
}

/// Simulated one-shot timer queue with a millisecond virtual clock.
///
/// The stack holds one clone as its [`TimerService`]; the driving loop
/// holds another and pumps due events back into the stack.
#[derive(Debug, Clone, Default)]
pub struct SimTimers {
    inner: Rc<RefCell<TimerInner>>,
}

impl SimTimers {
    /// Create a timer queue at virtual time zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current virtual time in milliseconds.
    pub fn now(&self) -> u64 {
        self.inner.borrow().now_ms
    }

    /// Deadline of the earliest pending event, if any.
    pub fn next_deadline(&self) -> Option<u64> {
        self.inner.borrow().heap.peek().map(|Reverse((t, _, _))| *t)
    }

    /// Advance the virtual clock. Never moves backwards.
    pub fn advance_to(&self, now_ms: u64) {
        let mut inner = self.inner.borrow_mut();
        if now_ms > inner.now_ms {
            inner.now_ms = now_ms;
        }
    }

    /// Pop one event whose deadline has passed, earliest first.
    pub fn pop_due(&self) -> Option<TimerEvent> {
        let mut inner = self.inner.borrow_mut();
        match inner.heap.peek() {
            Some(Reverse((t, _, _))) if *t <= inner.now_ms => {
                let Reverse((_, _, key)) = inner.heap.pop().unwrap();
                Some(key.into())
            },
            _ => None,
        }
    }
}

impl TimerService for SimTimers {
    fn schedule(&mut self, delay: Duration, event: TimerEvent) {
        let mut inner = self.inner.borrow_mut();
        let deadline = inner.now_ms + delay.as_millis() as u64;
        let seq = inner.seq;
        inner.seq += 1;
        inner.heap.push(Reverse((deadline, seq, event.into())));
    }
}
