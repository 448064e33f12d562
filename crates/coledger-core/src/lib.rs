//! # coledger core
//!
//! Pure primitives for coledger: identities, CoValue headers, signed
//! transactions and the per-CoValue session log.
//!
//! This crate contains no I/O, no storage, no networking. It is pure computation
//! over cryptographic data structures.
//!
//! ## Key Types
//!
//! - [`CoValueId`] - Content-addressed identifier of a CoValue (Blake3 of its header)
//! - [`AgentId`] / [`AccountId`] - Who signs transactions and receives sealed keys
//! - [`MemberRef`] - A key in a group's role map, including `everyone`
//! - [`Transaction`] - The atomic unit appended to a session
//! - [`CoValueLog`] - Sessions of one CoValue, replayed in `(made_at, session, index)` order
//!
//! ## Canonicalization
//!
//! Headers and signed messages are encoded using deterministic CBOR. See [`canonical`] module.

#[macro_use]
mod macros;

pub mod canonical;
pub mod crypto;
pub mod error;
pub mod header;
pub mod identity;
pub mod log;
pub mod transaction;
pub mod types;
pub mod validation;

pub use canonical::{canonical_header_bytes, signed_message, SIGN_DOMAIN};
pub use crypto::{
    Blake3Hash, Ed25519PublicKey, Ed25519Signature, Keypair, SharedKey, X25519PublicKey,
    X25519StaticSecret,
};
pub use error::{CoreError, ValidationError};
pub use header::{CoValueHeader, Ruleset};
pub use identity::{AccountId, AgentId, AgentSecret, MemberRef, TxAuthor};
pub use log::{CoValueLog, IngestResult, LogBound, LogEntry};
pub use transaction::{Privacy, SessionId, SignedTransaction, Transaction, TxId, TxPayload};
pub use types::{CoValueId, GroupId, KeyId};
pub use validation::{validate_transaction, validate_transaction_structure, SessionTail};
