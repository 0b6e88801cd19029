//! The peerlink stack: registration, dispatch, handshake and maintenance.
//!
//! One `LinkStack` instance exclusively owns the protocol registry and the
//! connection table of a node. Every entry point (`handle_frame`,
//! `handle_timer`, `send`) runs to completion synchronously; handshake
//! steps are fire-and-forget with timeout-driven retry, never blocking
//! round-trips.

use std::time::Duration;

use rand::RngCore;

use super::registry::{Endpoint, ProtocolHandler, ProtocolRegistry, Role};
use super::table::{ConnHandle, ConnectionRecord, ConnectionStatus, ConnectionTable};
use crate::config::Config;
use crate::crypto;
use crate::error::{LinkError, Result};
use crate::transport::{NodeAddr, TimerEvent, TimerService, Transport};
use crate::wire::{Frame, FrameType, FOOTER_LEN, FRAG_HEADER_LEN, HEADER_LEN};

/// In-progress reassembly of one fragmented application message.
#[derive(Debug)]
struct Reassembly {
    pid: u8,
    peer: NodeAddr,
    counter: u32,
    total: usize,
    // Covered byte ranges, sorted and merged. Duplicated fragments must
    // not count twice towards completeness.
    ranges: Vec<(usize, usize)>,
    buf: Vec<u8>,
}

impl Reassembly {
    fn mark(&mut self, start: usize, end: usize) {
        self.ranges.push((start, end));
        self.ranges.sort_unstable();
        let mut merged: Vec<(usize, usize)> = Vec::with_capacity(self.ranges.len());
        for &(s, e) in &self.ranges {
            match merged.last_mut() {
                Some(last) if s <= last.1 => last.1 = last.1.max(e),
                _ => merged.push((s, e)),
            }
        }
        self.ranges = merged;
    }

    fn complete(&self) -> bool {
        self.ranges.as_slice() == [(0, self.total)]
    }
}

/// Protocol stack instance for one node.
pub struct LinkStack<T, M, R> {
    transport: T,
    timers: M,
    rng: R,
    config: Config,
    registry: ProtocolRegistry,
    table: ConnectionTable,
    reassembly: Option<Reassembly>,
}

impl<T: Transport, M: TimerService, R: RngCore> LinkStack<T, M, R> {
    /// Build a stack over the given collaborators.
    pub fn new(transport: T, timers: M, rng: R, config: Config) -> Self {
        let registry = ProtocolRegistry::new(config.limits.max_protocols);
        let table = ConnectionTable::new(config.limits.max_connections);
        Self {
            transport,
            timers,
            rng,
            config,
            registry,
            table,
            reassembly: None,
        }
    }

    /// Arm the recurring maintenance sweep. The first run is delayed by an
    /// extra grace period so initial connections can establish.
    pub fn start(&mut self) {
        tracing::debug!(addr = %self.transport.local_addr(), "peerlink stack starting");
        self.timers
            .schedule(self.config.timing.first_sweep_delay(), TimerEvent::MaintenanceSweep);
    }

    /// Local link address.
    pub fn local_addr(&self) -> NodeAddr {
        self.transport.local_addr()
    }

    /// Register a protocol with its role and application handler.
    ///
    /// A client registration immediately starts discovery. If the
    /// connection table is full at that point the registration itself
    /// still succeeds; the discovery record is dropped with a logged
    /// warning and the client will never connect until re-registered.
    pub fn register(
        &mut self,
        pid: u8,
        role: Role,
        handler: Box<dyn ProtocolHandler>,
    ) -> Result<()> {
        self.registry.insert(pid, role, handler)?;
        tracing::debug!(pid, ?role, addr = %self.transport.local_addr(), "protocol registered");

        if role == Role::Client {
            let record = ConnectionRecord {
                pid,
                status: ConnectionStatus::SendingDiscovery,
                client_counter: self.rng.next_u32(),
                ..Default::default()
            };
            match self.table.insert(record) {
                Some(handle) => {
                    self.timers.schedule(
                        self.config.timing.discovery_period(),
                        TimerEvent::DiscoveryRetry(handle),
                    );
                },
                None => {
                    tracing::warn!(pid, "connection table full, discovery record dropped");
                },
            }
        }
        Ok(())
    }

    /// Unregister a protocol, erasing every connection record tied to it.
    /// Best-effort: unknown ids are a no-op.
    pub fn unregister(&mut self, pid: u8) -> Result<()> {
        if self.registry.remove(pid) {
            let erased = self.table.erase_protocol(pid);
            tracing::debug!(pid, erased, "protocol unregistered");
        }
        Ok(())
    }

    /// Send an application payload to the connected peer of a protocol.
    ///
    /// Payloads that do not fit one frame are split into fragments
    /// carrying a (total length, shift) header; all fragments of one
    /// message share a sequence counter.
    pub fn send(&mut self, dest: Endpoint, data: &[u8]) -> Result<()> {
        let handle = self
            .table
            .find_connected(dest.pid)
            .ok_or(LinkError::NoConnection(dest.pid))?;
        let role = self
            .registry
            .role(dest.pid)
            .ok_or_else(|| LinkError::UnexpectedState(format!("protocol {} not registered", dest.pid)))?;

        let footer_len = if self.config.security.footer_enabled {
            FOOTER_LEN
        } else {
            0
        };
        let mtu = self.transport.max_frame_len();
        let single_max = mtu - HEADER_LEN - footer_len;

        // Reject before stamping the counter: the error branch must not
        // desync the record.
        if data.len() > single_max && data.len() > usize::from(u16::MAX) {
            return Err(LinkError::PayloadTooLarge {
                got: data.len(),
                limit: usize::from(u16::MAX),
            });
        }

        let (peer, key, counter) = {
            let rec = self.table.get_mut(handle).expect("handle from find_connected");
            let counter = match role {
                Role::Server => {
                    let c = rec.server_counter;
                    rec.server_counter = c.wrapping_add(1);
                    c
                },
                Role::Client => {
                    let c = rec.client_counter;
                    rec.client_counter = c.wrapping_add(1);
                    c
                },
            };
            rec.elapsed_time = 0;
            (rec.peer, rec.session_key, counter)
        };

        if data.len() <= single_max {
            let mut frame = Frame::new(FrameType::AppRequest, false);
            frame.set_pid(dest.pid);
            frame.set_sub_id(dest.sub_id);
            frame.set_ack_requested(dest.ack_required);
            frame.set_counter(counter);
            frame.extend_payload(data);
            self.seal_and_send(peer, frame, &key)?;
        } else {
            let frag_max = mtu - HEADER_LEN - FRAG_HEADER_LEN - footer_len;
            let total = data.len() as u16;
            let mut shift = 0usize;
            while shift < data.len() {
                let chunk = frag_max.min(data.len() - shift);
                let mut frame = Frame::new(FrameType::AppRequest, true);
                frame.set_pid(dest.pid);
                frame.set_sub_id(dest.sub_id);
                frame.set_ack_requested(dest.ack_required);
                frame.set_counter(counter);
                frame.set_frag_header(total, shift as u16);
                frame.extend_payload(&data[shift..shift + chunk]);
                self.seal_and_send(peer, frame, &key)?;
                shift += chunk;
            }
        }

        tracing::trace!(pid = dest.pid, sub_id = dest.sub_id, len = data.len(), %peer, "app send");
        Ok(())
    }

    /// Tear down a connection, notifying the peer with Connect-Abort.
    pub fn abort(&mut self, pid: u8, peer: NodeAddr) -> Result<()> {
        let handle = self
            .table
            .find(pid, peer)
            .ok_or(LinkError::NoConnection(pid))?;
        let _ = self.send_control(peer, FrameType::ConnectAbort, handle);
        self.table.erase(handle);
        Ok(())
    }

    /// Dispatch one inbound frame from the transport's receive callback.
    ///
    /// Never fatal: malformed, unverifiable or unexpected frames are
    /// dropped with a diagnostic and the stack keeps running.
    pub fn handle_frame(&mut self, from: NodeAddr, data: &[u8]) {
        let frame = match Frame::from_bytes(data) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::debug!(%from, %e, "dropping malformed frame");
                return;
            },
        };

        let kind = frame.kind();
        tracing::trace!(addr = %self.transport.local_addr(), %from, ?kind, "frame received");

        if kind.is_lookup() {
            self.on_lookup(from, &frame);
        } else if kind.is_connect() {
            self.on_connect(from, &frame);
        } else if kind == FrameType::Unknown {
            tracing::debug!(%from, "dropping frame with unknown type");
        } else {
            self.on_session(from, &frame);
        }
    }

    /// Deliver a due timer event back into the stack.
    pub fn handle_timer(&mut self, event: TimerEvent) {
        match event {
            TimerEvent::DiscoveryRetry(handle) => self.on_discovery_timer(handle),
            TimerEvent::MaintenanceSweep => {
                self.sweep();
                self.timers
                    .schedule(self.config.timing.sweep_period(), TimerEvent::MaintenanceSweep);
            },
        }
    }

    /// Record for an exact (protocol, peer) pair, for inspection.
    pub fn connection(&self, pid: u8, peer: NodeAddr) -> Option<&ConnectionRecord> {
        self.table.find(pid, peer).and_then(|h| self.table.get(h))
    }

    /// Any record of a protocol, peer bound or not.
    pub fn connection_by_pid(&self, pid: u8) -> Option<&ConnectionRecord> {
        self.table.find_by_pid(pid).and_then(|h| self.table.get(h))
    }

    /// Whether a protocol has an established session.
    pub fn is_connected(&self, pid: u8) -> bool {
        self.table.find_connected(pid).is_some()
    }

    /// Number of occupied connection slots.
    pub fn connection_count(&self) -> usize {
        self.table.len()
    }

    // --- handshake frame handling -------------------------------------

    /// Discovery / Advertise: validated with the pre-shared request key.
    fn on_lookup(&mut self, from: NodeAddr, frame: &Frame) {
        if self.config.security.footer_enabled
            && !crypto::verify(frame.as_bytes(), &self.config.security.request_key)
        {
            tracing::debug!(%from, "footer mismatch in lookup frame");
            return;
        }

        let pid = frame.pid();
        match (frame.kind(), self.registry.role(pid)) {
            (FrameType::Discovery, Some(Role::Server)) => {
                // A record for this (protocol, client) already exists:
                // duplicate Discovery, ignore to keep sessions unique.
                if self.table.find(pid, from).is_some() {
                    return;
                }
                let record = ConnectionRecord {
                    pid,
                    peer: from,
                    status: ConnectionStatus::AdvertiseSent,
                    client_counter: frame.counter(),
                    ..Default::default()
                };
                match self.table.insert(record) {
                    Some(handle) => {
                        let _ = self.send_control(from, FrameType::Advertise, handle);
                    },
                    None => {
                        tracing::warn!(pid, %from, "connection table full, discovery ignored");
                    },
                }
            },
            (FrameType::Advertise, Some(Role::Client)) => {
                let Some(handle) = self.table.find_by_pid(pid) else {
                    return;
                };
                {
                    let rec = self.table.get_mut(handle).expect("handle from find_by_pid");
                    // Duplicate Advertise or counter mismatch: stale reply.
                    if rec.peer != NodeAddr::UNSET || rec.client_counter != frame.counter() {
                        return;
                    }
                    rec.elapsed_time = 0;
                    rec.status = ConnectionStatus::ConnectSent;
                    rec.peer = from;
                }
                let _ = self.send_control(from, FrameType::ConnectRequest, handle);
            },
            _ => {
                // Wrong role or unregistered protocol: not for us.
            },
        }
    }

    /// Connect-Request / Allow / Finish / Abort.
    fn on_connect(&mut self, from: NodeAddr, frame: &Frame) {
        let pid = frame.pid();
        let footer = self.config.security.footer_enabled;

        let matched = self.table.find(pid, from).filter(|h| {
            self.table
                .get(*h)
                .is_some_and(|r| {
                    r.client_counter == frame.counter() && r.status != ConnectionStatus::Connected
                })
        });
        let Some(handle) = matched else {
            // No reply: an unsolicited connect frame must not trigger
            // reflection traffic.
            tracing::debug!(%from, pid, "connection frame without matching record");
            return;
        };

        let kind = frame.kind();

        // Connect-Request carries the nonce the session key is derived
        // from, so it must be processed before footer validation.
        if kind == FrameType::ConnectRequest {
            let Some(nonce) = frame.payload(footer).ok().and_then(read_u32) else {
                tracing::debug!(%from, pid, "truncated connect-request");
                self.table.erase(handle);
                return;
            };
            let local = self.transport.local_addr();
            let request_key = self.config.security.request_key;
            let rec = self.table.get_mut(handle).expect("matched above");
            rec.status = ConnectionStatus::AllowSent;
            rec.nonce = nonce;
            rec.session_key = crypto::derive_session_key(local, rec.peer, nonce, &request_key);
        }

        if footer {
            let key = self.table.get(handle).expect("matched above").session_key;
            if !crypto::verify(frame.as_bytes(), &key) {
                // A poisoned in-progress handshake is unrecoverable;
                // erase and let discovery start over.
                tracing::debug!(%from, pid, "footer mismatch in connection frame, erasing record");
                self.table.erase(handle);
                return;
            }
        }

        self.table.get_mut(handle).expect("matched above").elapsed_time = 0;

        match kind {
            FrameType::ConnectRequest => {
                let _ = self.send_control(from, FrameType::ConnectAllow, handle);
            },
            FrameType::ConnectAllow => {
                let Some(server_counter) = frame.payload(footer).ok().and_then(read_u32) else {
                    tracing::debug!(%from, pid, "truncated connect-allow");
                    return;
                };
                {
                    let rec = self.table.get_mut(handle).expect("matched above");
                    rec.status = ConnectionStatus::Connected;
                    rec.server_counter = server_counter;
                }
                tracing::debug!(addr = %self.transport.local_addr(), %from, pid, "client connected");
                let _ = self.send_control(from, FrameType::ConnectFinish, handle);
            },
            FrameType::ConnectFinish => {
                self.table.get_mut(handle).expect("matched above").status =
                    ConnectionStatus::Connected;
                tracing::debug!(addr = %self.transport.local_addr(), %from, pid, "server connected");
            },
            FrameType::ConnectAbort => {
                tracing::debug!(%from, pid, "connection aborted by peer");
                self.table.erase(handle);
            },
            _ => {},
        }
    }

    /// Heartbeat / App-Request / App-Ack on an established session.
    fn on_session(&mut self, from: NodeAddr, frame: &Frame) {
        let pid = frame.pid();
        let Some(handle) = self.table.find(pid, from) else {
            tracing::debug!(%from, pid, "session frame without matching record");
            return;
        };

        if self.config.security.footer_enabled {
            let key = self.table.get(handle).expect("found above").session_key;
            if !crypto::verify(frame.as_bytes(), &key) {
                tracing::debug!(%from, pid, "footer mismatch in session frame");
                return;
            }
        }

        match frame.kind() {
            FrameType::Heartbeat => self.on_heartbeat(handle, frame),
            FrameType::AppRequest => self.on_app_request(handle, from, frame),
            FrameType::AppAck => {
                // Reserved for retransmission logic; observed only.
                tracing::trace!(%from, pid, counter = frame.counter(), "ack observed");
            },
            _ => {},
        }
    }

    /// A heartbeat must carry the exact expected counter; anything else is
    /// a stale or replayed frame and is silently ignored.
    fn on_heartbeat(&mut self, handle: ConnHandle, frame: &Frame) {
        let role = self.registry.role(frame.pid());
        let rec = self.table.get_mut(handle).expect("resolved by caller");
        match role {
            Some(Role::Server) if rec.client_counter == frame.counter() => {
                rec.elapsed_time = 0;
                rec.client_counter = rec.client_counter.wrapping_add(1);
            },
            Some(Role::Client) if rec.server_counter == frame.counter() => {
                rec.elapsed_time = 0;
                rec.server_counter = rec.server_counter.wrapping_add(1);
            },
            _ => {
                tracing::trace!(pid = frame.pid(), counter = frame.counter(), "stale heartbeat ignored");
            },
        }
    }

    fn on_app_request(&mut self, handle: ConnHandle, from: NodeAddr, frame: &Frame) {
        let footer = self.config.security.footer_enabled;
        let pid = frame.pid();

        let Ok(payload) = frame.payload(footer) else {
            tracing::debug!(%from, pid, "truncated app request");
            return;
        };

        if frame.ack_requested() {
            self.send_app_ack(handle, frame);
        }

        let will_ack = frame.ack_requested();
        let source = Endpoint {
            pid,
            sub_id: frame.sub_id(),
            ack_required: false,
        };

        if frame.fragmented() {
            let total = usize::from(frame.frag_total());
            let shift = usize::from(frame.frag_shift());
            if shift + payload.len() > total {
                tracing::debug!(%from, pid, "fragment outside reassembly bounds");
                return;
            }

            let pending = match self.reassembly.take() {
                Some(r)
                    if r.pid == pid
                        && r.peer == from
                        && r.counter == frame.counter()
                        && r.total == total =>
                {
                    Some(r)
                },
                Some(_) => {
                    tracing::debug!("dropping stale partial reassembly");
                    None
                },
                None => None,
            };

            let mut r = match pending {
                Some(mut r) => {
                    // Hand the buffer from the previous fragment back to
                    // the application, per the acquire contract.
                    let Some(entry) = self.registry.get_mut(pid) else {
                        return;
                    };
                    let prev = std::mem::take(&mut r.buf);
                    r.buf = entry.handler_mut().acquire_buffer(Some(prev), total, will_ack);
                    r
                },
                None => {
                    let Some(entry) = self.registry.get_mut(pid) else {
                        return;
                    };
                    let buf = entry.handler_mut().acquire_buffer(None, total, will_ack);
                    Reassembly {
                        pid,
                        peer: from,
                        counter: frame.counter(),
                        total,
                        ranges: Vec::new(),
                        buf,
                    }
                },
            };

            if r.buf.len() < total {
                r.buf.resize(total, 0);
            }
            r.buf[shift..shift + payload.len()].copy_from_slice(payload);
            r.mark(shift, shift + payload.len());

            if r.complete() {
                self.bump_receive_counter(handle, pid);
                if let Some(entry) = self.registry.get_mut(pid) {
                    let _ = entry.handler_mut().deliver(source, from, &r.buf[..total]);
                }
            } else {
                self.reassembly = Some(r);
            }
        } else {
            let payload = payload.to_vec();
            let Some(entry) = self.registry.get_mut(pid) else {
                return;
            };
            let mut buf = entry
                .handler_mut()
                .acquire_buffer(None, payload.len(), will_ack);
            if buf.len() < payload.len() {
                buf.resize(payload.len(), 0);
            }
            buf[..payload.len()].copy_from_slice(&payload);

            self.bump_receive_counter(handle, pid);
            if let Some(entry) = self.registry.get_mut(pid) {
                let _ = entry.handler_mut().deliver(source, from, &buf[..payload.len()]);
            }
        }
    }

    /// Advance the peer side's sequence counter after accepting a request,
    /// and mark the record active.
    fn bump_receive_counter(&mut self, handle: ConnHandle, pid: u8) {
        let role = self.registry.role(pid);
        if let Some(rec) = self.table.get_mut(handle) {
            rec.elapsed_time = 0;
            match role {
                Some(Role::Server) => rec.client_counter = rec.client_counter.wrapping_add(1),
                Some(Role::Client) => rec.server_counter = rec.server_counter.wrapping_add(1),
                None => {},
            }
        }
    }

    /// Echo pid, sub id, counter and any fragmentation header so the peer
    /// can correlate the acknowledgement.
    fn send_app_ack(&mut self, handle: ConnHandle, request: &Frame) {
        let (peer, key) = {
            let rec = self.table.get(handle).expect("resolved by caller");
            (rec.peer, rec.session_key)
        };
        let mut ack = Frame::new(FrameType::AppAck, request.fragmented());
        if request.fragmented() {
            ack.set_frag_header(request.frag_total(), request.frag_shift());
        }
        ack.set_pid(request.pid());
        ack.set_sub_id(request.sub_id());
        ack.set_counter(request.counter());
        let _ = self.seal_and_send(peer, ack, &key);
    }

    // --- timers --------------------------------------------------------

    /// Discovery retry. A stale handle or an advanced record implicitly
    /// cancels the retry: nothing is sent and nothing is re-armed.
    fn on_discovery_timer(&mut self, handle: ConnHandle) {
        let still_discovering = self
            .table
            .get(handle)
            .is_some_and(|r| r.status == ConnectionStatus::SendingDiscovery);
        if !still_discovering {
            return;
        }

        let _ = self.send_control(NodeAddr::BROADCAST, FrameType::Discovery, handle);

        let period_ms = self.config.timing.discovery_period_ms;
        if let Some(rec) = self.table.get_mut(handle) {
            if rec.status == ConnectionStatus::SendingDiscovery {
                rec.elapsed_time = rec.elapsed_time.saturating_add(period_ms);
                self.timers.schedule(
                    Duration::from_millis(u64::from(period_ms)),
                    TimerEvent::DiscoveryRetry(handle),
                );
            }
        }
    }

    /// Periodic maintenance: age every record, emit heartbeats, evict
    /// stale server-side records, restart discovery on client-side ones.
    fn sweep(&mut self) {
        let period = self.config.timing.sweep_period_ms;
        let heartbeat = self.config.timing.heartbeat_threshold_ms;
        let delete = self.config.timing.delete_threshold_ms;
        let connect_timeout = self.config.timing.connect_timeout_ms;

        for handle in self.table.handles() {
            let Some(rec) = self.table.get_mut(handle) else {
                continue;
            };
            rec.elapsed_time = rec.elapsed_time.saturating_add(period);
            let (pid, peer, status, elapsed) = (rec.pid, rec.peer, rec.status, rec.elapsed_time);

            if status == ConnectionStatus::Connected && elapsed >= heartbeat && elapsed < delete {
                let _ = self.send_control(peer, FrameType::Heartbeat, handle);
                continue;
            }

            match self.registry.role(pid) {
                Some(Role::Server) => {
                    let stalled = matches!(
                        status,
                        ConnectionStatus::AdvertiseSent | ConnectionStatus::AllowSent
                    ) && elapsed >= connect_timeout;
                    let expired = status == ConnectionStatus::Connected && elapsed >= delete;
                    if stalled || expired {
                        tracing::debug!(pid, %peer, "evicting server-side record");
                        self.table.erase(handle);
                    }
                },
                Some(Role::Client) => {
                    let stalled =
                        status == ConnectionStatus::ConnectSent && elapsed >= connect_timeout;
                    let expired = status == ConnectionStatus::Connected && elapsed >= delete;
                    if stalled || expired {
                        tracing::debug!(pid, %peer, "restarting discovery");
                        let fresh_counter = self.rng.next_u32();
                        let rec = self.table.get_mut(handle).expect("visited above");
                        rec.status = ConnectionStatus::SendingDiscovery;
                        rec.client_counter = fresh_counter;
                        rec.server_counter = 0;
                        rec.peer = NodeAddr::UNSET;
                        rec.nonce = 0;
                        rec.session_key = [0; crypto::SESSION_KEY_LEN];
                        self.timers.schedule(
                            self.config.timing.discovery_period(),
                            TimerEvent::DiscoveryRetry(handle),
                        );
                    }
                },
                None => {
                    // No registry entry behind this record; unregister
                    // cascades, so this indicates a bug upstream.
                    tracing::debug!(pid, %peer, "erasing orphaned record");
                    self.table.erase(handle);
                },
            }
        }
    }

    // --- frame emission ------------------------------------------------

    /// Build, seal and send one handshake/heartbeat frame for a record.
    fn send_control(
        &mut self,
        dest: NodeAddr,
        kind: FrameType,
        handle: ConnHandle,
    ) -> Result<()> {
        let request_key = self.config.security.request_key;
        let local = self.transport.local_addr();

        let mut frame = Frame::new(kind, false);
        let mut use_request_key = false;

        let key = {
            let role = self
                .table
                .get(handle)
                .and_then(|r| self.registry.role(r.pid));
            let rec = self
                .table
                .get_mut(handle)
                .ok_or_else(|| LinkError::UnexpectedState("stale connection handle".to_string()))?;
            frame.set_pid(rec.pid);
            frame.set_counter(rec.client_counter);

            match kind {
                FrameType::Discovery | FrameType::Advertise => {
                    use_request_key = true;
                    // Filter count; filters are not implemented.
                    frame.extend_payload(&[0]);
                },
                FrameType::ConnectRequest => {
                    rec.nonce = self.rng.next_u32();
                    frame.extend_payload(&rec.nonce.to_be_bytes());
                    rec.session_key =
                        crypto::derive_session_key(local, rec.peer, rec.nonce, &request_key);
                },
                FrameType::ConnectAllow => {
                    rec.server_counter = self.rng.next_u32();
                    frame.extend_payload(&rec.server_counter.to_be_bytes());
                },
                FrameType::ConnectFinish => {
                    frame.extend_payload(&rec.server_counter.to_be_bytes());
                },
                FrameType::ConnectAbort => {
                    frame.extend_payload(&self.rng.next_u32().to_be_bytes());
                },
                FrameType::Heartbeat => match role {
                    Some(Role::Server) => {
                        frame.set_counter(rec.server_counter);
                        rec.server_counter = rec.server_counter.wrapping_add(1);
                    },
                    _ => {
                        rec.client_counter = rec.client_counter.wrapping_add(1);
                    },
                },
                _ => {
                    tracing::debug!(?kind, "unsupported control frame type");
                    return Err(LinkError::UnexpectedState(format!(
                        "{kind:?} is not a control frame"
                    )));
                },
            }

            if use_request_key {
                request_key
            } else {
                rec.session_key
            }
        };

        tracing::trace!(addr = %local, %dest, ?kind, "control send");
        self.seal_and_send(dest, frame, &key)
    }

    fn seal_and_send(
        &mut self,
        dest: NodeAddr,
        mut frame: Frame,
        key: &[u8; crypto::SESSION_KEY_LEN],
    ) -> Result<()> {
        if self.config.security.footer_enabled {
            crypto::seal(frame.as_mut_vec(), key);
        }
        self.transport.send(dest, frame.as_bytes())
    }
}

fn read_u32(payload: &[u8]) -> Option<u32> {
    payload.get(0..4).map(|b| {
        u32::from_be_bytes(b.try_into().expect("slice of length 4"))
    })
}
