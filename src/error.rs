//! Peerlink error types.
//!
//! Nothing in the receive path is fatal: every error results in the current
//! frame being dropped and the stack continuing. Timeouts, driven by the
//! maintenance sweep, are the primary recovery mechanism for stuck
//! handshakes.

use thiserror::Error;

/// Peerlink errors.
#[derive(Error, Debug)]
pub enum LinkError {
    /// A protocol id was registered twice.
    #[error("Protocol {0} already registered")]
    DuplicateProtocol(u8),

    /// The protocol registry or connection table is at capacity.
    #[error("Table full: {0}")]
    TableFull(&'static str),

    /// Application `send` with no matching connected record.
    #[error("No established connection for protocol {0}")]
    NoConnection(u8),

    /// Integrity footer mismatch on an inbound frame.
    #[error("Integrity footer mismatch")]
    IntegrityFailure,

    /// A connection-phase frame arrived with no matching record.
    #[error("Unexpected state: {0}")]
    UnexpectedState(String),

    /// Malformed or truncated frame.
    #[error("Codec error: {0}")]
    Codec(String),

    /// Outbound payload cannot fit the transport frame size.
    #[error("Payload too large: {got} bytes exceeds limit {limit}")]
    PayloadTooLarge {
        /// Requested payload size.
        got: usize,
        /// Largest payload the transport and fragmentation scheme allow.
        limit: usize,
    },

    /// Link-layer send failure.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for peerlink operations.
pub type Result<T> = std::result::Result<T, LinkError>;

impl From<toml::de::Error> for LinkError {
    fn from(err: toml::de::Error) -> Self {
        LinkError::Config(err.to_string())
    }
}
