//! Cold-start placeholder tokens.
//!
//! Layout before encoding:
//!
//! ```text
//! [34, len, key0, key1, 0, client_state, ts(4, BE), identifier...]
//!           \________________ payload (len bytes) ______________/
//! ```
//!
//! Every payload byte after the two keys is XORed with `key[i % 2]`, and the
//! whole packet is encoded as URL-safe base64.

use base64::{Engine, engine::general_purpose::URL_SAFE};
use std::time::{SystemTime, UNIX_EPOCH};

const PACKET_TAG: u8 = 34;
const CLIENT_STATE: u8 = 1;
/// Largest identifier that still fits the one-byte length field
pub const MAX_IDENTIFIER_LEN: usize = 118;

pub fn generate(identifier: &str) -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as u32;
    let keys: [u8; 2] = rand::random();
    encode(identifier, keys, now)
}

fn encode(identifier: &str, keys: [u8; 2], timestamp: u32) -> String {
    let id_bytes = truncate_utf8(identifier, MAX_IDENTIFIER_LEN).as_bytes();

    let mut payload = Vec::with_capacity(8 + id_bytes.len());
    payload.extend_from_slice(&keys);
    payload.push(0);
    payload.push(CLIENT_STATE);
    payload.extend_from_slice(&timestamp.to_be_bytes());
    payload.extend_from_slice(id_bytes);

    for i in keys.len()..payload.len() {
        payload[i] ^= keys[i % keys.len()];
    }

    let mut packet = Vec::with_capacity(payload.len() + 2);
    packet.push(PACKET_TAG);
    packet.push(payload.len() as u8);
    packet.extend_from_slice(&payload);

    URL_SAFE.encode(packet)
}

fn truncate_utf8(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
