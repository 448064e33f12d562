//! Identifiers for CoValues and read keys.

use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Blake3 of a CoValue's canonical header.
///
/// Groups and accounts are CoValues too, so they share this identifier space.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CoValueId(pub [u8; 32]);

fixed_bytes!(CoValueId, 32, "CoValueId");

/// Groups are CoValues; the alias documents intent at call sites.
pub type GroupId = CoValueId;

impl fmt::Display for CoValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "co_z{}", &self.to_hex()[..16])
    }
}

/// Identifier of a symmetric read key.
///
/// Random, not derived from the secret, so it can be published in plaintext.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct KeyId(pub [u8; 16]);

fixed_bytes!(KeyId, 16, "KeyId");

impl KeyId {
    pub fn generate() -> Self {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "key_z{}", self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_covalue_id_display() {
        let id = CoValueId::from_bytes([0xab; 32]);
        assert_eq!(format!("{}", id), "co_zabababababababab");
        assert_eq!(format!("{:?}", id), "CoValueId(abababababababab)");
    }

    #[test]
    fn test_key_ids_are_random() {
        assert_ne!(KeyId::generate(), KeyId::generate());
    }

    #[test]
    fn test_key_id_display() {
        let id = KeyId::from_bytes([0x01; 16]);
        assert_eq!(format!("{}", id), "key_z01010101010101010101010101010101");
    }
}
