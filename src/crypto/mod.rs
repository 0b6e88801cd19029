//! Session-key derivation and the lightweight integrity footer.
//!
//! Neither construction is cryptographic. The key derivation binds a
//! session to the two peer addresses and a client-chosen nonce; the footer
//! is a 4-byte XOR fold that catches corruption and casual spoofing, not a
//! MAC. Deployments needing real authentication would select the strong
//! footer, which is intentionally unimplemented (see below).

#[cfg(feature = "strong-footer")]
compile_error!(
    "the `strong-footer` feature selects the AES-based footer, which is not implemented; \
     build with the default XOR footer instead"
);

use crate::transport::NodeAddr;
use crate::wire::FOOTER_LEN;

/// Session key length in bytes.
pub const SESSION_KEY_LEN: usize = 16;

/// Default pre-shared key validating Discovery/Advertise exchanges.
///
/// Process-wide immutable configuration: deployments override it through
/// [`crate::config::SecurityConfig`]; this constant is only the default.
pub const REQUEST_KEY: [u8; SESSION_KEY_LEN] = [
    112, 86, 44, 43, 207, 145, 21, 13, 37, 123, 182, 70, 194, 174, 152, 239,
];

/// Derive the 16-byte session key for a connection.
///
/// Starts from the request key, overwrites bytes `[0..8)` with the
/// numerically larger of the two addresses and `[8..16)` with the smaller
/// (a canonical order, so both sides compute the same key regardless of
/// who initiated), then XORs the big-endian nonce into each 4-byte group.
pub fn derive_session_key(
    local: NodeAddr,
    peer: NodeAddr,
    nonce: u32,
    request_key: &[u8; SESSION_KEY_LEN],
) -> [u8; SESSION_KEY_LEN] {
    let mut key = *request_key;

    let (hi, lo) = if peer > local {
        (peer, local)
    } else {
        (local, peer)
    };
    key[0..8].copy_from_slice(&hi.to_bytes());
    key[8..16].copy_from_slice(&lo.to_bytes());

    let nonce_bytes = nonce.to_be_bytes();
    for group in key.chunks_exact_mut(4) {
        for (byte, n) in group.iter_mut().zip(nonce_bytes) {
            *byte ^= n;
        }
    }
    key
}

/// Fold `data` and the key into the 4-byte integrity footer.
pub fn compute_footer(data: &[u8], key: &[u8; SESSION_KEY_LEN]) -> [u8; FOOTER_LEN] {
    let mut acc = [0u8; FOOTER_LEN];
    for (i, byte) in data.iter().enumerate() {
        acc[i % FOOTER_LEN] ^= byte;
    }
    for (i, byte) in key.iter().enumerate() {
        acc[i % FOOTER_LEN] ^= byte;
    }
    acc
}

/// Append the footer over the current buffer contents.
pub fn seal(buf: &mut Vec<u8>, key: &[u8; SESSION_KEY_LEN]) {
    let footer = compute_footer(buf, key);
    buf.extend_from_slice(&footer);
}

/// Check the trailing footer of an inbound frame.
pub fn verify(buf: &[u8], key: &[u8; SESSION_KEY_LEN]) -> bool {
    if buf.len() < FOOTER_LEN {
        return false;
    }
    let body_len = buf.len() - FOOTER_LEN;
    compute_footer(&buf[..body_len], key) == buf[body_len..]
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_key_symmetric_for_scenario_addresses() {
        let k_server = derive_session_key(NodeAddr(5), NodeAddr(9), 0x1234_5678, &REQUEST_KEY);
        let k_client = derive_session_key(NodeAddr(9), NodeAddr(5), 0x1234_5678, &REQUEST_KEY);
        assert_eq!(k_server, k_client);

        // Canonical order: 9 > 5, so the first half carries address 9.
        assert_eq!(
            u64::from_be_bytes(k_server[0..8].try_into().unwrap())
                ^ u64::from_be_bytes([0x12, 0x34, 0x56, 0x78, 0x12, 0x34, 0x56, 0x78]),
            9
        );
    }

    #[test]
    fn test_key_depends_on_nonce() {
        let a = derive_session_key(NodeAddr(5), NodeAddr(9), 1, &REQUEST_KEY);
        let b = derive_session_key(NodeAddr(5), NodeAddr(9), 2, &REQUEST_KEY);
        assert_ne!(a, b);
    }

    #[test]
    fn test_footer_roundtrip_and_flip_detection() {
        let key = derive_session_key(NodeAddr(5), NodeAddr(9), 42, &REQUEST_KEY);
        let mut buf = b"peerlink heartbeat".to_vec();
        seal(&mut buf, &key);
        assert!(verify(&buf, &key));

        // Flipping any single payload byte must invalidate the footer.
        for i in 0..buf.len() - FOOTER_LEN {
            let mut tampered = buf.clone();
            tampered[i] ^= 0x01;
            assert!(!verify(&tampered, &key), "flip at byte {i} went undetected");
        }
    }

    #[test]
    fn test_footer_rejects_wrong_key() {
        let key = derive_session_key(NodeAddr(5), NodeAddr(9), 42, &REQUEST_KEY);
        let other = derive_session_key(NodeAddr(5), NodeAddr(9), 43, &REQUEST_KEY);
        let mut buf = b"payload".to_vec();
        seal(&mut buf, &key);
        assert!(!verify(&buf, &other));
    }

    #[test]
    fn test_verify_short_buffer() {
        assert!(!verify(&[1, 2, 3], &REQUEST_KEY));
    }

    proptest! {
        #[test]
        fn prop_key_derivation_symmetric(a in 1u64.., b in 1u64.., nonce: u32) {
            prop_assume!(a != b);
            let k1 = derive_session_key(NodeAddr(a), NodeAddr(b), nonce, &REQUEST_KEY);
            let k2 = derive_session_key(NodeAddr(b), NodeAddr(a), nonce, &REQUEST_KEY);
            prop_assert_eq!(k1, k2);
        }

        #[test]
        fn prop_footer_deterministic(data: Vec<u8>, nonce: u32) {
            let key = derive_session_key(NodeAddr(5), NodeAddr(9), nonce, &REQUEST_KEY);
            let mut sealed = data.clone();
            seal(&mut sealed, &key);
            prop_assert!(verify(&sealed, &key));
            prop_assert_eq!(&sealed[..data.len()], &data[..]);
        }
    }
}
