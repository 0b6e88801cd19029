//! Frame construction and field access.
//!
//! The stack never touches raw offsets; everything goes through the
//! accessors here.

use super::{
    FrameType, FLAG_ACK_REQUESTED, FLAG_FRAGMENTED, FOOTER_LEN, FRAG_HEADER_LEN, HEADER_LEN,
};
use crate::error::{LinkError, Result};

/// A single wire frame, owned buffer plus payload offset.
#[derive(Debug, Clone)]
pub struct Frame {
    buf: Vec<u8>,
    payload_start: usize,
}

impl Frame {
    /// Start a new outbound frame of the given type. The fixed header is
    /// zeroed; set fields before appending payload.
    pub fn new(kind: FrameType, fragmented: bool) -> Self {
        let payload_start = HEADER_LEN + if fragmented { FRAG_HEADER_LEN } else { 0 };
        let mut buf = vec![0u8; payload_start];
        buf[0] = kind.as_byte();
        if fragmented {
            buf[1] |= FLAG_FRAGMENTED;
        }
        Self { buf, payload_start }
    }

    /// Parse an inbound frame. Validates only structure; integrity is the
    /// caller's business.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_LEN {
            return Err(LinkError::Codec(format!(
                "frame too short: {} bytes",
                data.len()
            )));
        }
        let fragmented = data[1] & FLAG_FRAGMENTED != 0;
        let payload_start = HEADER_LEN + if fragmented { FRAG_HEADER_LEN } else { 0 };
        if data.len() < payload_start {
            return Err(LinkError::Codec(
                "frame too short for fragmentation header".to_string(),
            ));
        }
        Ok(Self {
            buf: data.to_vec(),
            payload_start,
        })
    }

    /// Frame type field.
    pub fn kind(&self) -> FrameType {
        FrameType::from_byte(self.buf[0])
    }

    /// Protocol id field.
    pub fn pid(&self) -> u8 {
        self.buf[2]
    }

    /// Set the protocol id field.
    pub fn set_pid(&mut self, pid: u8) {
        self.buf[2] = pid;
    }

    /// Sub id (application endpoint) field.
    pub fn sub_id(&self) -> u8 {
        self.buf[3]
    }

    /// Set the sub id field.
    pub fn set_sub_id(&mut self, sub_id: u8) {
        self.buf[3] = sub_id;
    }

    /// Whether the sender requested an acknowledgement.
    pub fn ack_requested(&self) -> bool {
        self.buf[1] & FLAG_ACK_REQUESTED != 0
    }

    /// Set or clear the acknowledgement-requested flag.
    pub fn set_ack_requested(&mut self, ack: bool) {
        if ack {
            self.buf[1] |= FLAG_ACK_REQUESTED;
        } else {
            self.buf[1] &= !FLAG_ACK_REQUESTED;
        }
    }

    /// Whether a fragmentation header is present.
    pub fn fragmented(&self) -> bool {
        self.buf[1] & FLAG_FRAGMENTED != 0
    }

    /// Sequence counter field.
    pub fn counter(&self) -> u32 {
        u32::from_be_bytes([self.buf[4], self.buf[5], self.buf[6], self.buf[7]])
    }

    /// Set the sequence counter field.
    pub fn set_counter(&mut self, counter: u32) {
        self.buf[4..8].copy_from_slice(&counter.to_be_bytes());
    }

    /// Total reassembled length from the fragmentation header.
    pub fn frag_total(&self) -> u16 {
        debug_assert!(self.fragmented());
        u16::from_be_bytes([self.buf[8], self.buf[9]])
    }

    /// Byte offset of this fragment within the reassembled payload.
    pub fn frag_shift(&self) -> u16 {
        debug_assert!(self.fragmented());
        u16::from_be_bytes([self.buf[10], self.buf[11]])
    }

    /// Write the fragmentation header. The frame must have been created
    /// with `fragmented = true`.
    pub fn set_frag_header(&mut self, total: u16, shift: u16) {
        debug_assert!(self.fragmented());
        self.buf[8..10].copy_from_slice(&total.to_be_bytes());
        self.buf[10..12].copy_from_slice(&shift.to_be_bytes());
    }

    /// Append payload bytes after the header(s).
    pub fn extend_payload(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Offset where the payload begins.
    pub fn payload_start(&self) -> usize {
        self.payload_start
    }

    /// Everything after the header(s): payload plus, on inbound frames
    /// with the footer enabled, the trailing footer bytes.
    pub fn body(&self) -> &[u8] {
        &self.buf[self.payload_start..]
    }

    /// Payload excluding the trailing integrity footer.
    pub fn payload(&self, footer_enabled: bool) -> Result<&[u8]> {
        let body = self.body();
        if footer_enabled {
            if body.len() < FOOTER_LEN {
                return Err(LinkError::Codec("frame too short for footer".to_string()));
            }
            Ok(&body[..body.len() - FOOTER_LEN])
        } else {
            Ok(body)
        }
    }

    /// Current wire length.
    pub fn wire_len(&self) -> usize {
        self.buf.len()
    }

    /// Raw bytes for transmission.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Mutable access to the raw buffer, used for footer sealing.
    pub fn as_mut_vec(&mut self) -> &mut Vec<u8> {
        &mut self.buf
    }
}
