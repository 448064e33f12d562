//! Encrypted payload envelope.
//!
//! The changes of a private transaction are wrapped in an
//! [`EncryptedPayload`] bound to the CoValue they were written to, so the
//! ciphertext cannot be replayed into another CoValue.

use serde::{Deserialize, Serialize};

use coledger_core::CoValueId;

use crate::crypto::{decrypt_raw, encrypt, EncryptionNonce, KeySecret};
use crate::error::{PermsError, Result};

/// Format identifier for encrypted payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum EncryptionFormat {
    /// ChaCha20-Poly1305 with 256-bit key, CoValue id as associated data.
    ChaCha20Poly1305 = 1,
}

/// An encrypted payload envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedPayload {
    /// Encryption algorithm used.
    pub format: EncryptionFormat,

    /// Nonce used for encryption (unique per encryption).
    pub nonce: EncryptionNonce,

    /// The encrypted data (includes authentication tag).
    pub ciphertext: Vec<u8>,
}

impl EncryptedPayload {
    /// Encrypt changes for `covalue` under a read key.
    pub fn seal_changes(plaintext: &[u8], key: &KeySecret, covalue: &CoValueId) -> Result<Self> {
        let nonce = EncryptionNonce::generate();
        let ciphertext = encrypt(key, plaintext, &nonce, covalue.as_bytes())?;

        Ok(Self {
            format: EncryptionFormat::ChaCha20Poly1305,
            nonce,
            ciphertext,
        })
    }

    /// Decrypt changes of `covalue`.
    pub fn open_changes(&self, key: &KeySecret, covalue: &CoValueId) -> Result<Vec<u8>> {
        match self.format {
            EncryptionFormat::ChaCha20Poly1305 => {
                decrypt_raw(key, &self.ciphertext, &self.nonce, covalue.as_bytes())
            }
        }
    }

    /// Serialize to CBOR bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf).expect("CBOR serialization failed");
        buf
    }

    /// Deserialize from CBOR bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        ciborium::from_reader(bytes).map_err(|e| PermsError::SerializationError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_open() {
        let key = KeySecret::generate();
        let covalue = CoValueId::from_bytes([5; 32]);

        let envelope = EncryptedPayload::seal_changes(b"changes", &key, &covalue).unwrap();
        let bytes = envelope.to_bytes();
        let recovered = EncryptedPayload::from_bytes(&bytes).unwrap();

        assert_eq!(recovered.open_changes(&key, &covalue).unwrap(), b"changes");
    }

    #[test]
    fn test_bound_to_covalue() {
        let key = KeySecret::generate();
        let envelope =
            EncryptedPayload::seal_changes(b"x", &key, &CoValueId::from_bytes([5; 32])).unwrap();

        assert!(envelope
            .open_changes(&key, &CoValueId::from_bytes([6; 32]))
            .is_err());
        assert!(envelope
            .open_changes(&KeySecret::generate(), &CoValueId::from_bytes([5; 32]))
            .is_err());
    }
}
