//! Fixed-capacity connection table with generation-checked handles.
//!
//! Timer callbacks hold a [`ConnHandle`] across an asynchronous delay.
//! Slots never move on erase; instead each erase bumps the slot's
//! generation, so a stale handle resolves to `None` rather than silently
//! aliasing a reused slot.

use crate::crypto::SESSION_KEY_LEN;
use crate::transport::NodeAddr;

/// Handshake progress of one connection record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    /// Empty record; never stored in an occupied slot.
    #[default]
    Unused,
    /// Client broadcasting Discovery, peer not yet bound.
    SendingDiscovery,
    /// Client sent Connect-Request, awaiting Allow.
    ConnectSent,
    /// Server replied Advertise, awaiting Connect-Request.
    AdvertiseSent,
    /// Server sent Connect-Allow, awaiting Finish.
    AllowSent,
    /// Session established on both sides.
    Connected,
}

/// Per-(protocol, peer) session state.
#[derive(Debug, Clone, Default)]
pub struct ConnectionRecord {
    /// Protocol id this record belongs to.
    pub pid: u8,
    /// Peer link address, [`NodeAddr::UNSET`] while discovering.
    pub peer: NodeAddr,
    /// Handshake progress.
    pub status: ConnectionStatus,
    /// Counter advanced by the client-side traffic source.
    pub client_counter: u32,
    /// Counter advanced by the server-side traffic source.
    pub server_counter: u32,
    /// Time since the last valid activity, advanced by the sweep and
    /// reset on every valid send or receive for this record.
    pub elapsed_time: u16,
    /// Nonce chosen by the client, used once in key derivation.
    pub nonce: u32,
    /// Derived session key for footer-protected traffic.
    pub session_key: [u8; SESSION_KEY_LEN],
}

/// Stable, generation-checked reference to a table slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnHandle {
    index: usize,
    generation: u32,
}

impl ConnHandle {
    /// Rebuild a handle from its parts (timer-event plumbing).
    pub fn new(index: usize, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Slot index.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Slot generation this handle was issued for.
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    record: Option<ConnectionRecord>,
}

/// Fixed-capacity arena of connection records.
pub struct ConnectionTable {
    slots: Vec<Slot>,
}

impl ConnectionTable {
    /// Create a table with the given slot count.
    pub fn new(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, Slot::default);
        Self { slots }
    }

    /// Insert a record, returning its handle, or `None` when full.
    pub fn insert(&mut self, record: ConnectionRecord) -> Option<ConnHandle> {
        let (index, slot) = self
            .slots
            .iter_mut()
            .enumerate()
            .find(|(_, s)| s.record.is_none())?;
        slot.record = Some(record);
        Some(ConnHandle {
            index,
            generation: slot.generation,
        })
    }

    /// Resolve a handle. Stale generations return `None`.
    pub fn get(&self, handle: ConnHandle) -> Option<&ConnectionRecord> {
        let slot = self.slots.get(handle.index)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.record.as_ref()
    }

    /// Resolve a handle mutably.
    pub fn get_mut(&mut self, handle: ConnHandle) -> Option<&mut ConnectionRecord> {
        let slot = self.slots.get_mut(handle.index)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.record.as_mut()
    }

    /// Erase the record behind a handle, invalidating every outstanding
    /// handle to that slot. Returns whether anything was erased.
    pub fn erase(&mut self, handle: ConnHandle) -> bool {
        match self.slots.get_mut(handle.index) {
            Some(slot) if slot.generation == handle.generation && slot.record.is_some() => {
                slot.record = None;
                slot.generation = slot.generation.wrapping_add(1);
                true
            },
            _ => false,
        }
    }

    /// Erase every record of one protocol (unregister cascade). Returns
    /// the number erased.
    pub fn erase_protocol(&mut self, pid: u8) -> usize {
        let mut erased = 0;
        for slot in &mut self.slots {
            if slot.record.as_ref().is_some_and(|r| r.pid == pid) {
                slot.record = None;
                slot.generation = slot.generation.wrapping_add(1);
                erased += 1;
            }
        }
        erased
    }

    /// Find the record for an exact (protocol, peer) pair.
    pub fn find(&self, pid: u8, peer: NodeAddr) -> Option<ConnHandle> {
        self.handles()
            .into_iter()
            .find(|h| self.get(*h).is_some_and(|r| r.pid == pid && r.peer == peer))
    }

    /// Find any record for a protocol id (client lookup during discovery,
    /// where the peer is still unset).
    pub fn find_by_pid(&self, pid: u8) -> Option<ConnHandle> {
        self.handles()
            .into_iter()
            .find(|h| self.get(*h).is_some_and(|r| r.pid == pid))
    }

    /// Find a connected record for a protocol id (application send path).
    pub fn find_connected(&self, pid: u8) -> Option<ConnHandle> {
        self.handles().into_iter().find(|h| {
            self.get(*h)
                .is_some_and(|r| r.pid == pid && r.status == ConnectionStatus::Connected)
        })
    }

    /// Handles of every occupied slot, in slot order. Safe to erase
    /// through while iterating the returned list.
    pub fn handles(&self) -> Vec<ConnHandle> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.record.is_some())
            .map(|(index, s)| ConnHandle {
                index,
                generation: s.generation,
            })
            .collect()
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.record.is_some()).count()
    }

    /// Whether the table holds no records.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether every slot is occupied.
    pub fn is_full(&self) -> bool {
        self.slots.iter().all(|s| s.record.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pid: u8, peer: u64) -> ConnectionRecord {
        ConnectionRecord {
            pid,
            peer: NodeAddr(peer),
            status: ConnectionStatus::Connected,
            ..Default::default()
        }
    }

    #[test]
    fn test_insert_and_find() {
        let mut table = ConnectionTable::new(2);
        let h = table.insert(record(3, 9)).unwrap();
        assert_eq!(table.find(3, NodeAddr(9)), Some(h));
        assert_eq!(table.find(3, NodeAddr(5)), None);
        assert_eq!(table.find_connected(3), Some(h));
    }

    #[test]
    fn test_capacity() {
        let mut table = ConnectionTable::new(1);
        table.insert(record(1, 1)).unwrap();
        assert!(table.is_full());
        assert!(table.insert(record(2, 2)).is_none());
    }

    #[test]
    fn test_stale_handle_after_reuse() {
        let mut table = ConnectionTable::new(1);
        let h1 = table.insert(record(1, 1)).unwrap();
        assert!(table.erase(h1));

        // Slot is reused: the old handle must not resolve.
        let h2 = table.insert(record(2, 2)).unwrap();
        assert_eq!(h1.index(), h2.index());
        assert!(table.get(h1).is_none());
        assert_eq!(table.get(h2).unwrap().pid, 2);
        assert!(!table.erase(h1));
    }

    #[test]
    fn test_erase_during_iteration() {
        let mut table = ConnectionTable::new(3);
        table.insert(record(1, 1)).unwrap();
        table.insert(record(2, 2)).unwrap();
        table.insert(record(3, 3)).unwrap();

        for h in table.handles() {
            table.erase(h);
        }
        assert!(table.is_empty());
    }

    #[test]
    fn test_erase_protocol_cascade() {
        let mut table = ConnectionTable::new(4);
        table.insert(record(1, 1)).unwrap();
        table.insert(record(1, 2)).unwrap();
        table.insert(record(2, 3)).unwrap();

        assert_eq!(table.erase_protocol(1), 2);
        assert_eq!(table.len(), 1);
        assert!(table.find_by_pid(2).is_some());
    }
}
