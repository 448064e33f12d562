//! Sealed read keys via X25519 key agreement.
//!
//! A revelation seals a read-key secret from the revealing agent's sealer
//! to the recipient's sealer. Both sides derive the same wrapping key from
//! the static-static Diffie-Hellman secret, so unsealing also authenticates
//! the revealer.

use serde::{Deserialize, Serialize};

use coledger_core::{GroupId, KeyId, X25519PublicKey, X25519StaticSecret};

use crate::crypto::{decrypt_raw, encrypt, secret_from_vec, EncryptionNonce, KeySecret};
use crate::error::{PermsError, Result};

const SEAL_CONTEXT: &str = "coledger-perms-v0-seal";

/// A read-key secret sealed to one recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedSecret {
    /// Nonce used for encryption.
    pub nonce: EncryptionNonce,

    /// The secret, encrypted with the derived wrapping key.
    pub ciphertext: Vec<u8>,
}

impl SealedSecret {
    /// Seal `secret` (read key `key` of `group`) for `to`.
    pub fn seal(
        secret: &KeySecret,
        group: &GroupId,
        key: KeyId,
        from: &X25519StaticSecret,
        to: &X25519PublicKey,
    ) -> Result<Self> {
        let wrap_key = wrapping_key(from, to, group, key);
        let nonce = EncryptionNonce::generate();
        let ciphertext = encrypt(&wrap_key, secret.as_bytes(), &nonce, key.as_bytes())?;
        Ok(Self { nonce, ciphertext })
    }

    /// Unseal with the recipient's secret and the revealer's public sealer.
    pub fn unseal(
        &self,
        group: &GroupId,
        key: KeyId,
        recipient: &X25519StaticSecret,
        from: &X25519PublicKey,
    ) -> Result<KeySecret> {
        let wrap_key = wrapping_key(recipient, from, group, key);
        let bytes = decrypt_raw(&wrap_key, &self.ciphertext, &self.nonce, key.as_bytes())?;
        secret_from_vec(bytes)
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

fn wrapping_key(
    mine: &X25519StaticSecret,
    theirs: &X25519PublicKey,
    group: &GroupId,
    key: KeyId,
) -> KeySecret {
    let shared = mine.diffie_hellman(theirs);
    let mut material = Vec::with_capacity(48);
    material.extend_from_slice(group.as_bytes());
    material.extend_from_slice(key.as_bytes());
    KeySecret(shared.derive_key(SEAL_CONTEXT, &material))
}

#[cfg(test)]
mod tests {
    use super::*;
    use coledger_core::CoValueId;

    fn parties() -> (X25519StaticSecret, X25519StaticSecret) {
        (X25519StaticSecret::generate(), X25519StaticSecret::generate())
    }

    #[test]
    fn test_seal_unseal() {
        let (alice, bob) = parties();
        let group = CoValueId::from_bytes([7; 32]);
        let key = KeyId::generate();
        let secret = KeySecret::generate();

        let sealed = SealedSecret::seal(&secret, &group, key, &alice, &bob.public_key()).unwrap();
        let opened = sealed.unseal(&group, key, &bob, &alice.public_key()).unwrap();

        assert_eq!(opened, secret);
    }

    #[test]
    fn test_wrong_recipient_fails() {
        let (alice, bob) = parties();
        let eve = X25519StaticSecret::generate();
        let group = CoValueId::from_bytes([7; 32]);
        let key = KeyId::generate();

        let sealed =
            SealedSecret::seal(&KeySecret::generate(), &group, key, &alice, &bob.public_key()).unwrap();

        assert!(sealed.unseal(&group, key, &eve, &alice.public_key()).is_err());
    }

    #[test]
    fn test_bound_to_group_and_key() {
        let (alice, bob) = parties();
        let group = CoValueId::from_bytes([7; 32]);
        let key = KeyId::generate();

        let sealed =
            SealedSecret::seal(&KeySecret::generate(), &group, key, &alice, &bob.public_key()).unwrap();

        let other_group = CoValueId::from_bytes([8; 32]);
        assert!(sealed.unseal(&other_group, key, &bob, &alice.public_key()).is_err());
        assert!(sealed
            .unseal(&group, KeyId::generate(), &bob, &alice.public_key())
            .is_err());
    }

    #[test]
    fn test_self_seal() {
        let me = X25519StaticSecret::generate();
        let group = CoValueId::from_bytes([1; 32]);
        let key = KeyId::generate();
        let secret = KeySecret::generate();

        let sealed = SealedSecret::seal(&secret, &group, key, &me, &me.public_key()).unwrap();
        assert_eq!(sealed.unseal(&group, key, &me, &me.public_key()).unwrap(), secret);
    }

    #[test]
    fn test_serialization() {
        let (alice, bob) = parties();
        let group = CoValueId::from_bytes([7; 32]);
        let sealed = SealedSecret::seal(
            &KeySecret::generate(),
            &group,
            KeyId::generate(),
            &alice,
            &bob.public_key(),
        )
        .unwrap();

        assert_eq!(SealedSecret::from_bytes(&sealed.to_bytes()).unwrap(), sealed);
    }
}
