//! Peerlink wire format.
//!
//! Every frame starts with a fixed 8-byte header; fragmented application
//! frames insert a 4-byte fragmentation header before the payload, and a
//! 4-byte integrity footer may trail the frame when enabled.
//!
//! ```text
//! offset  size  field
//! 0       1     frame type
//! 1       1     flags (bit 0: ack requested, bit 1: fragmented)
//! 2       1     protocol id
//! 3       1     sub id (application endpoint)
//! 4       4     sequence counter (big-endian)
//! [8      2     fragment total length (big-endian)]   when fragmented
//! [10     2     fragment shift (big-endian)]          when fragmented
//! ...           payload
//! [tail   4     integrity footer]                     when enabled
//! ```

mod frame;

pub use frame::Frame;

/// Fixed header size in bytes.
pub const HEADER_LEN: usize = 8;

/// Fragmentation header size in bytes.
pub const FRAG_HEADER_LEN: usize = 4;

/// Integrity footer size in bytes.
pub const FOOTER_LEN: usize = 4;

/// Flag bit: the sender requests an acknowledgement.
pub const FLAG_ACK_REQUESTED: u8 = 0x01;

/// Flag bit: a fragmentation header follows the fixed header.
pub const FLAG_FRAGMENTED: u8 = 0x02;

/// Frame type identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameType {
    /// Client broadcast looking for a server.
    Discovery = 0x01,
    /// Server reply offering the protocol.
    Advertise = 0x02,
    /// Client request carrying the connection nonce.
    ConnectRequest = 0x03,
    /// Server grant carrying the server counter.
    ConnectAllow = 0x04,
    /// Client confirmation completing the handshake.
    ConnectFinish = 0x05,
    /// Either side tearing down an in-progress connection.
    ConnectAbort = 0x06,
    /// Periodic liveness frame carrying the next expected counter.
    Heartbeat = 0x07,
    /// Application request payload.
    AppRequest = 0x10,
    /// Acknowledgement of an application request.
    AppAck = 0x11,
    /// Unrecognised type byte.
    Unknown = 0xFF,
}

impl FrameType {
    /// Decode a wire byte.
    pub fn from_byte(b: u8) -> Self {
        match b {
            0x01 => FrameType::Discovery,
            0x02 => FrameType::Advertise,
            0x03 => FrameType::ConnectRequest,
            0x04 => FrameType::ConnectAllow,
            0x05 => FrameType::ConnectFinish,
            0x06 => FrameType::ConnectAbort,
            0x07 => FrameType::Heartbeat,
            0x10 => FrameType::AppRequest,
            0x11 => FrameType::AppAck,
            _ => FrameType::Unknown,
        }
    }

    /// Wire byte for this type.
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    /// Discovery / Advertise: validated with the pre-shared request key.
    pub fn is_lookup(self) -> bool {
        matches!(self, FrameType::Discovery | FrameType::Advertise)
    }

    /// Connect-Request / Allow / Finish / Abort: the handshake proper.
    pub fn is_connect(self) -> bool {
        matches!(
            self,
            FrameType::ConnectRequest
                | FrameType::ConnectAllow
                | FrameType::ConnectFinish
                | FrameType::ConnectAbort
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_type_roundtrip() {
        for ty in [
            FrameType::Discovery,
            FrameType::Advertise,
            FrameType::ConnectRequest,
            FrameType::ConnectAllow,
            FrameType::ConnectFinish,
            FrameType::ConnectAbort,
            FrameType::Heartbeat,
            FrameType::AppRequest,
            FrameType::AppAck,
        ] {
            assert_eq!(FrameType::from_byte(ty.as_byte()), ty);
        }
        assert_eq!(FrameType::from_byte(0x42), FrameType::Unknown);
    }

    #[test]
    fn test_frame_type_classes() {
        assert!(FrameType::Discovery.is_lookup());
        assert!(FrameType::Advertise.is_lookup());
        assert!(!FrameType::Heartbeat.is_lookup());

        assert!(FrameType::ConnectRequest.is_connect());
        assert!(FrameType::ConnectAbort.is_connect());
        assert!(!FrameType::AppRequest.is_connect());
    }
}
