//! Link-layer and timer abstractions for the peerlink stack.
//!
//! The stack is transport-agnostic: it only needs a broadcast-capable
//! send primitive, a one-shot timer service, and a few address constants.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │               LinkStack                  │
//! │          (Transport-Agnostic)           │
//! └──────────────────┬──────────────────────┘
//!                    │
//!          ┌────────┴────────┐
//!          ▼                 ▼
//! ┌─────────────────┐ ┌─────────────────┐
//! │    MemRadio     │ │  (hardware      │
//! │ (in-process bus)│ │   radio driver) │
//! └─────────────────┘ └─────────────────┘
//! ```
//!
//! The concurrency model is single-threaded and cooperative: exactly one
//! of inbound dispatch, a timer callback, or an application `send` runs at
//! a time, invoked synchronously by the surrounding event loop. No
//! operation blocks; all suspension is "schedule an event N milliseconds
//! from now and return".

mod mem;

pub use mem::{MemRadio, SharedMedium, SimTimers};

use std::time::Duration;

use crate::error::Result;
use crate::protocol::ConnHandle;

/// Link-layer node address.
///
/// `UNSET` marks a client record that is still broadcasting discovery and
/// has not bound a peer yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeAddr(pub u64);

impl NodeAddr {
    /// All nodes in communication range.
    pub const BROADCAST: NodeAddr = NodeAddr(u64::MAX);
    /// Unknown / no node address.
    pub const UNSET: NodeAddr = NodeAddr(0);

    /// Big-endian byte representation, used in session-key derivation.
    pub fn to_bytes(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }
}

impl Default for NodeAddr {
    fn default() -> Self {
        NodeAddr::UNSET
    }
}

impl std::fmt::Display for NodeAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if *self == NodeAddr::BROADCAST {
            write!(f, "broadcast")
        } else {
            write!(f, "{:#x}", self.0)
        }
    }
}

/// Raw frame delivery between node addresses.
///
/// Implementations handle the physical link while the stack remains
/// transport-agnostic. Delivery is unreliable and unordered; the stack's
/// timeout machinery tolerates loss.
pub trait Transport {
    /// The local link address.
    fn local_addr(&self) -> NodeAddr;

    /// Send one frame to `dest` (or every reachable node for
    /// [`NodeAddr::BROADCAST`]).
    fn send(&mut self, dest: NodeAddr, frame: &[u8]) -> Result<()>;

    /// Largest frame the link accepts, headers and footer included.
    fn max_frame_len(&self) -> usize;
}

/// Events the stack asks the timer service to deliver back to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    /// Re-broadcast discovery for one client record.
    DiscoveryRetry(ConnHandle),
    /// Run the periodic maintenance sweep over the connection table.
    MaintenanceSweep,
}

/// One-shot delayed callback scheduling.
///
/// Each `schedule` call fires exactly once; recurring activities re-arm
/// themselves from inside the callback.
pub trait TimerService {
    /// Deliver `event` back to the stack after `delay`.
    fn schedule(&mut self, delay: Duration, event: TimerEvent);
}
