//! Peer discovery, session handshake and connection maintenance.
//!
//! One protocol id pairs exactly one client with one server. The client
//! broadcasts Discovery until a server answers, then the four-step
//! handshake derives a shared session key from the pre-shared request
//! key, both link addresses and a client-chosen nonce:
//!
//! ```text
//!   Client                              Server
//!     │  Discovery (broadcast) ──────────▶ │
//!     │ ◀────────────────────── Advertise  │
//!     │  Connect-Request (nonce) ────────▶ │
//!     │ ◀──────── Connect-Allow (counter)  │
//!     │  Connect-Finish ─────────────────▶ │
//!     │          ... application data ...  │
//! ```
//!
//! Per-record state machines:
//!
//! ```text
//! client:  Unused ─▶ SendingDiscovery ─▶ ConnectSent ─▶ Connected
//!                        ▲                                  │
//!                        └───────── delete timeout ─────────┘
//!
//! server:  Unused ─▶ AdvertiseSent ─▶ AllowSent ─▶ Connected
//!                        │               │              │
//!                        └── timeout ────┴──▶ erased ◀──┘
//! ```
//!
//! Connected records exchange heartbeats carrying strictly increasing
//! counters; a silent peer is evicted by the maintenance sweep. Client
//! records survive eviction by falling back to discovery, server records
//! are simply erased.

mod registry;
mod stack;
mod table;

pub use registry::{Endpoint, ProtocolEntry, ProtocolHandler, ProtocolRegistry, Role};
pub use stack::LinkStack;
pub use table::{ConnHandle, ConnectionRecord, ConnectionStatus, ConnectionTable};
