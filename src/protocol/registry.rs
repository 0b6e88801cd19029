//! Protocol registry: protocol id → role and application handler.

use crate::error::{LinkError, Result};
use crate::transport::NodeAddr;

/// Which side of a protocol this node plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Answers Discovery broadcasts and grants connections.
    Server,
    /// Broadcasts Discovery and initiates connections.
    Client,
}

/// Application endpoint within a protocol: the destination of `send` and
/// the source reported on delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Endpoint {
    /// Protocol id.
    pub pid: u8,
    /// Sub id, the application-level function/endpoint selector.
    pub sub_id: u8,
    /// Whether the receiver should acknowledge the request.
    pub ack_required: bool,
}

/// Application-side capabilities injected at registration.
///
/// The stack calls [`acquire_buffer`](ProtocolHandler::acquire_buffer)
/// to obtain storage for an inbound payload (handing back the previous
/// buffer during fragment reassembly), then
/// [`deliver`](ProtocolHandler::deliver) once the payload is complete.
pub trait ProtocolHandler {
    /// Deliver a complete inbound payload. The reported length never
    /// includes footer bytes.
    fn deliver(&mut self, source: Endpoint, peer: NodeAddr, payload: &[u8]) -> Result<()>;

    /// Provide a buffer of at least `len` bytes. `existing` is the buffer
    /// from a previous fragment of the same message, if any; `will_ack`
    /// tells the application an acknowledgement is being generated for
    /// this message.
    fn acquire_buffer(&mut self, existing: Option<Vec<u8>>, len: usize, will_ack: bool)
        -> Vec<u8>;
}

/// One registered protocol.
pub struct ProtocolEntry {
    /// Server or client.
    pub role: Role,
    handler: Box<dyn ProtocolHandler>,
}

impl ProtocolEntry {
    /// Mutable access to the application handler.
    pub fn handler_mut(&mut self) -> &mut dyn ProtocolHandler {
        self.handler.as_mut()
    }
}

/// Fixed-capacity map from protocol id to [`ProtocolEntry`].
pub struct ProtocolRegistry {
    entries: Vec<(u8, ProtocolEntry)>,
    capacity: usize,
}

impl ProtocolRegistry {
    /// Create a registry with the given slot count.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Insert a protocol. Fails with [`LinkError::DuplicateProtocol`] on id
    /// reuse and [`LinkError::TableFull`] at capacity.
    pub fn insert(
        &mut self,
        pid: u8,
        role: Role,
        handler: Box<dyn ProtocolHandler>,
    ) -> Result<()> {
        if self.contains(pid) {
            return Err(LinkError::DuplicateProtocol(pid));
        }
        if self.entries.len() >= self.capacity {
            return Err(LinkError::TableFull("protocol registry"));
        }
        self.entries.push((pid, ProtocolEntry { role, handler }));
        Ok(())
    }

    /// Remove a protocol. Returns whether it was present.
    pub fn remove(&mut self, pid: u8) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(id, _)| *id != pid);
        self.entries.len() != before
    }

    /// Whether the id is registered.
    pub fn contains(&self, pid: u8) -> bool {
        self.entries.iter().any(|(id, _)| *id == pid)
    }

    /// Role of a registered protocol.
    pub fn role(&self, pid: u8) -> Option<Role> {
        self.get(pid).map(|e| e.role)
    }

    /// Look up an entry.
    pub fn get(&self, pid: u8) -> Option<&ProtocolEntry> {
        self.entries
            .iter()
            .find(|(id, _)| *id == pid)
            .map(|(_, e)| e)
    }

    /// Look up an entry mutably.
    pub fn get_mut(&mut self, pid: u8) -> Option<&mut ProtocolEntry> {
        self.entries
            .iter_mut()
            .find(|(id, _)| *id == pid)
            .map(|(_, e)| e)
    }

    /// Number of registered protocols.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no protocol is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullHandler;

    impl ProtocolHandler for NullHandler {
        fn deliver(&mut self, _source: Endpoint, _peer: NodeAddr, _payload: &[u8]) -> Result<()> {
            Ok(())
        }

        fn acquire_buffer(
            &mut self,
            existing: Option<Vec<u8>>,
            len: usize,
            _will_ack: bool,
        ) -> Vec<u8> {
            existing.unwrap_or_else(|| vec![0; len])
        }
    }

    #[test]
    fn test_duplicate_pid_rejected() {
        let mut registry = ProtocolRegistry::new(4);
        registry
            .insert(3, Role::Server, Box::new(NullHandler))
            .unwrap();
        let err = registry
            .insert(3, Role::Client, Box::new(NullHandler))
            .unwrap_err();
        assert!(matches!(err, LinkError::DuplicateProtocol(3)));
        assert_eq!(registry.role(3), Some(Role::Server));
    }

    #[test]
    fn test_capacity_enforced() {
        let mut registry = ProtocolRegistry::new(1);
        registry
            .insert(1, Role::Client, Box::new(NullHandler))
            .unwrap();
        let err = registry
            .insert(2, Role::Client, Box::new(NullHandler))
            .unwrap_err();
        assert!(matches!(err, LinkError::TableFull(_)));
    }

    #[test]
    fn test_remove() {
        let mut registry = ProtocolRegistry::new(4);
        registry
            .insert(7, Role::Client, Box::new(NullHandler))
            .unwrap();
        assert!(registry.remove(7));
        assert!(!registry.remove(7));
        assert!(!registry.contains(7));
    }
}
