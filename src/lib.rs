//! # peerlink
//!
//! Peer-discovery and session-handshake stack for resource-constrained
//! wireless nodes.
//!
//! Applications register protocols (by numeric id) as either server or
//! client. The stack then autonomously discovers a matching peer over a
//! broadcast-capable link, performs a four-step handshake that derives a
//! per-session key, and keeps the session alive with counter-protected
//! heartbeats. Application payloads ride on top, with transparent
//! fragmentation, optional acknowledgements and a lightweight integrity
//! footer on every frame.
//!
//! ## Layers
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │   application handlers  (ProtocolHandler)     │
//! ├───────────────────────────────────────────────┤
//! │   LinkStack   handshake · sessions · sweep    │
//! ├──────────────────────┬────────────────────────┤
//! │   wire  (framing)    │  crypto (key, footer)  │
//! ├──────────────────────┴────────────────────────┤
//! │   Transport + TimerService                    │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use peerlink::config::Config;
//! use peerlink::protocol::{LinkStack, Role};
//! use peerlink::transport::{MemRadio, NodeAddr, SharedMedium, SimTimers};
//!
//! # fn handler() -> Box<dyn peerlink::protocol::ProtocolHandler> { unimplemented!() }
//! let medium = SharedMedium::new();
//! let timers = SimTimers::new();
//! let mut node: LinkStack<MemRadio, SimTimers, _> = LinkStack::new(
//!     medium.endpoint(NodeAddr(5)),
//!     timers.clone(),
//!     rand::thread_rng(),
//!     Config::default(),
//! );
//! node.start();
//! node.register(3, Role::Client, handler()).unwrap();
//! ```
//!
//! The stack is single-threaded and event driven: the embedding event
//! loop feeds received frames into [`LinkStack::handle_frame`] and due
//! timers into [`LinkStack::handle_timer`]; no call blocks.

pub mod config;
pub mod crypto;
pub mod error;
pub mod protocol;
pub mod transport;
pub mod wire;

pub use config::Config;
pub use error::{LinkError, Result};
pub use protocol::{ConnHandle, ConnectionStatus, Endpoint, LinkStack, ProtocolHandler, Role};
pub use transport::{NodeAddr, TimerEvent, TimerService, Transport};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
