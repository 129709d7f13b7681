use sha2::{Digest, Sha256};

use crate::dialog::StateDefinition;

/// SHA-256 over the canonical JSON form of each state, in declaration order.
pub(crate) fn fingerprint_states(states: &[StateDefinition]) -> String {
    let mut hasher = Sha256::new();
    for state in states {
        match serde_json::to_vec(state) {
            Ok(bytes) => hasher.update(&bytes),
            Err(_) => hasher.update(state.id.as_str().as_bytes()),
        }
        hasher.update([0u8]);
    }
    to_hex_lower(&hasher.finalize())
}

pub(crate) fn to_hex_lower(bytes: &[u8]) -> String {
    let mut output = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        use std::fmt::Write as _;
        let _ = write!(&mut output, "{byte:02x}");
    }
    output
}
