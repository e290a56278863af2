//! Deterministic development keys.
//!
//! Every role on every chain gets a 32-byte secret derived from the stack
//! seed, so the same configuration always produces the same accounts.

use hmac::{Hmac, Mac};
use mamut_core::ChainId;
use parking_lot::Mutex;
use sha2::Sha256;
use std::collections::HashMap;

type HmacSha256 = Hmac<Sha256>;

/// A derived 32-byte secret.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct DevKey([u8; 32]);

impl DevKey {
    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// `0x`-prefixed hex rendering, as node binaries accept on the command
    /// line.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl std::fmt::Debug for DevKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DevKey(0x{}..)", hex::encode(&self.0[..4]))
    }
}

/// Key derivation for one seed, with memoisation.
#[derive(Debug)]
pub struct DevKeys {
    seed: Vec<u8>,
    cache: Mutex<HashMap<String, DevKey>>,
}

impl DevKeys {
    /// Creates a deriver for `seed`.
    pub fn new(seed: impl AsRef<[u8]>) -> Self {
        Self {
            seed: seed.as_ref().to_vec(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Derives the key for `role` on `chain`.
    ///
    /// The key is HMAC-SHA256 keyed by the seed over `"<role>/<chain>"`.
    pub fn key(&self, role: &str, chain: ChainId) -> DevKey {
        self.derive(&format!("{role}/{chain}"))
    }

    /// Derives a key for an arbitrary path such as `"sequencer/901"`.
    pub fn derive(&self, path: &str) -> DevKey {
        if let Some(key) = self.cache.lock().get(path) {
            return *key;
        }
        // HMAC accepts keys of any length.
        let mut mac = match HmacSha256::new_from_slice(&self.seed) {
            Ok(mac) => mac,
            Err(_) => unreachable!("hmac accepts any key length"),
        };
        mac.update(path.as_bytes());
        let key = DevKey(mac.finalize().into_bytes().into());
        self.cache.lock().insert(path.to_string(), key);
        key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derivation_is_deterministic() {
        let a = DevKeys::new("seed");
        let b = DevKeys::new("seed");
        assert_eq!(a.key("batcher", ChainId(901)), b.key("batcher", ChainId(901)));
        assert_eq!(a.key("batcher", ChainId(901)), a.derive("batcher/901"));
    }

    #[test]
    fn test_distinct_inputs_distinct_keys() {
        let keys = DevKeys::new("seed");
        let batcher = keys.key("batcher", ChainId(901));
        assert_ne!(batcher, keys.key("proposer", ChainId(901)));
        assert_ne!(batcher, keys.key("batcher", ChainId(902)));
        assert_ne!(batcher, DevKeys::new("other").key("batcher", ChainId(901)));
    }

    #[test]
    fn test_hex_rendering() {
        let key = DevKeys::new("seed").derive("sequencer/901");
        let hex = key.to_hex();
        assert!(hex.starts_with("0x"));
        assert_eq!(hex.len(), 66);
        assert!(format!("{key:?}").starts_with("DevKey(0x"));
    }
}
