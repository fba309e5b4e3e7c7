//! Deterministic fingerprints for configuration documents.
//!
//! Used to tell sweep runs apart in reports; not a cryptographic hash.
//!
//! TODO: Hash a canonical key order so reordered but equal documents share a fingerprint.

use serde_json::Value;

/// FNV-1a, 64-bit.
#[derive(Copy, Clone, Debug)]
pub struct SimpleHash(u64);

impl SimpleHash {
    /// Create a new hash state with the FNV offset basis.
    pub fn new() -> Self {
        Self(0xcbf2_9ce4_8422_2325)
    }

    /// Feed bytes into the hash function.
    pub fn update(&mut self, bytes: &[u8]) {
        for b in bytes {
            self.0 = (self.0 ^ u64::from(*b)).wrapping_mul(0x0000_0100_0000_01b3);
        }
    }

    /// Finalise the hash and return a 16-character lowercase hex string.
    pub fn finish_hex(&self) -> String {
        format!("{:016x}", self.0)
    }
}

impl Default for SimpleHash {
    fn default() -> Self {
        Self::new()
    }
}

/// Fingerprint of a document's compact serialization.
pub fn fingerprint(value: &Value) -> String {
    let mut hasher = SimpleHash::new();
    hasher.update(value.to_string().as_bytes());
    hasher.finish_hex()
}
