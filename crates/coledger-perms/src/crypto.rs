//! Symmetric crypto for read keys.
//!
//! Provides ChaCha20-Poly1305 authenticated encryption under read-key
//! secrets, and wrapping of one read-key secret under another.

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Key, Nonce,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;

use coledger_core::{AgentSecret, KeyId};

use crate::error::{PermsError, Result};

/// A 256-bit read-key secret.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySecret(pub [u8; 32]);

impl KeySecret {
    /// Generate a new random secret.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    fn cipher(&self) -> ChaCha20Poly1305 {
        ChaCha20Poly1305::new(Key::from_slice(&self.0))
    }
}

impl fmt::Debug for KeySecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("KeySecret(..)")
    }
}

/// A 96-bit nonce for ChaCha20-Poly1305.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionNonce(pub [u8; 12]);

impl EncryptionNonce {
    /// Generate a new random nonce.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 12];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Derive a nonce from material that is unique per encryption.
    pub fn derive(material: &[&[u8]]) -> Self {
        let mut hasher = blake3::Hasher::new_derive_key("coledger-perms-v0-nonce");
        for part in material {
            hasher.update(part);
        }
        let mut bytes = [0u8; 12];
        bytes.copy_from_slice(&hasher.finalize().as_bytes()[..12]);
        Self(bytes)
    }
}

/// Encrypt `plaintext` under `key`, binding `aad`.
pub fn encrypt(key: &KeySecret, plaintext: &[u8], nonce: &EncryptionNonce, aad: &[u8]) -> Result<Vec<u8>> {
    key.cipher()
        .encrypt(
            Nonce::from_slice(&nonce.0),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|e| PermsError::EncryptionError(e.to_string()))
}

/// Decrypt `ciphertext` under `key`, checking `aad`.
pub fn decrypt_raw(
    key: &KeySecret,
    ciphertext: &[u8],
    nonce: &EncryptionNonce,
    aad: &[u8],
) -> Result<Vec<u8>> {
    key.cipher()
        .decrypt(
            Nonce::from_slice(&nonce.0),
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|e| PermsError::DecryptionError(e.to_string()))
}

/// Encrypt the secret of `to_wrap` under the secret of `under`.
///
/// The nonce is derived from both key ids, so a given (key, wrapping key)
/// pair always yields the same entry.
pub fn encrypt_key_secret(to_wrap: (KeyId, &KeySecret), under: (KeyId, &KeySecret)) -> Result<Vec<u8>> {
    let nonce = EncryptionNonce::derive(&[to_wrap.0.as_bytes(), under.0.as_bytes()]);
    encrypt(under.1, to_wrap.1.as_bytes(), &nonce, b"coledger-key-wrap")
}

/// Recover the secret of `wrapped_id` from a wrap made under `under`.
pub fn decrypt_key_secret(
    wrapped_id: KeyId,
    encrypted: &[u8],
    under: (KeyId, &KeySecret),
) -> Result<KeySecret> {
    let nonce = EncryptionNonce::derive(&[wrapped_id.as_bytes(), under.0.as_bytes()]);
    let bytes = decrypt_raw(under.1, encrypted, &nonce, b"coledger-key-wrap")?;
    secret_from_vec(bytes)
}

pub(crate) fn secret_from_vec(bytes: Vec<u8>) -> Result<KeySecret> {
    let arr: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
        PermsError::DecryptionError(format!(
            "invalid key length: expected 32, got {}",
            bytes.len()
        ))
    })?;
    Ok(KeySecret(arr))
}

/// A fresh read key and its id.
pub fn new_random_key_secret() -> (KeyId, KeySecret) {
    (KeyId::generate(), KeySecret::generate())
}

/// A fresh agent not attached to any account (used for invites).
pub fn new_random_agent_secret() -> AgentSecret {
    AgentSecret::generate()
}
