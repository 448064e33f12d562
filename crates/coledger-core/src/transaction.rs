//! Transactions: the atomic unit appended to a CoValue's session log.
//!
//! A transaction is immutable once appended. Whether it takes effect is
//! decided later, at replay time, by the permission engine.

use bytes::Bytes;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::canonical::signed_message;
use crate::crypto::{Blake3Hash, Ed25519Signature, Keypair};
use crate::identity::TxAuthor;
use crate::types::{CoValueId, KeyId};

/// One author's append-only stream of transactions on a CoValue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionId {
    /// The author signing every transaction in this session.
    pub author: TxAuthor,
    /// Distinguishes concurrent sessions of the same author.
    pub nonce: [u8; 8],
}

impl SessionId {
    /// A fresh session for `author`.
    pub fn new(author: TxAuthor) -> Self {
        let mut nonce = [0u8; 8];
        rand::thread_rng().fill_bytes(&mut nonce);
        Self { author, nonce }
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_session_z{}", self.author, hex::encode(self.nonce))
    }
}

/// Position of a transaction: its session and 0-based index within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TxId {
    pub session: SessionId,
    pub index: u32,
}

/// Whether a transaction's changes are readable by anyone or encrypted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Privacy {
    Trusting,
    Private,
}

/// The body of a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxPayload {
    /// Plaintext changes (roles, key ledger entries, extend edges).
    Trusting { changes: Bytes },

    /// Changes encrypted under the owning group's read key `key_used`.
    Private {
        key_used: KeyId,
        encrypted_changes: Bytes,
    },
}

impl TxPayload {
    /// The privacy class of this payload.
    pub fn privacy(&self) -> Privacy {
        match self {
            TxPayload::Trusting { .. } => Privacy::Trusting,
            TxPayload::Private { .. } => Privacy::Private,
        }
    }
}

/// An unsigned transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Author-claimed creation time (Unix milliseconds). Used for ordering.
    pub made_at: i64,

    pub payload: TxPayload,
}

impl Transaction {
    /// A plaintext transaction.
    pub fn trusting(made_at: i64, changes: impl Into<Bytes>) -> Self {
        Self {
            made_at,
            payload: TxPayload::Trusting {
                changes: changes.into(),
            },
        }
    }

    /// An encrypted transaction.
    pub fn private(made_at: i64, key_used: KeyId, encrypted_changes: impl Into<Bytes>) -> Self {
        Self {
            made_at,
            payload: TxPayload::Private {
                key_used,
                encrypted_changes: encrypted_changes.into(),
            },
        }
    }

    /// Sign this transaction at position `tx_id` of `covalue`, chained to `prev_hash`.
    pub fn sign(
        self,
        covalue: &CoValueId,
        tx_id: &TxId,
        prev_hash: &Blake3Hash,
        keypair: &Keypair,
    ) -> SignedTransaction {
        let message = signed_message(covalue, tx_id, prev_hash, &self);
        let hash = Blake3Hash::hash(&message);
        let signature = keypair.sign(&message);
        SignedTransaction {
            tx: self,
            signature,
            hash,
        }
    }
}

/// A transaction with its session signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    pub tx: Transaction,

    /// Ed25519 signature over the canonical signed message.
    pub signature: Ed25519Signature,

    /// Blake3 of the signed message; the next transaction chains to it.
    pub hash: Blake3Hash,
}
