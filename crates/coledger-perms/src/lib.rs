//! # coledger permissions
//!
//! Roles, group inheritance and read-key distribution for coledger groups.
//!
//! ## Overview
//!
//! A group's content is a map of entries written by signed transactions:
//! member roles, the current read key, key revelations, key wraps and
//! extend edges. Nothing in a group is mutable state; the current view is
//! always the replay of every accepted transaction, and a transaction is
//! accepted only if its author held the needed role at the time it claims
//! to have been made.
//!
//! ## Key Concepts
//!
//! - **Role**: `admin`, `writer`, `reader`, `writeOnly` or `revoked`, plus
//!   invite roles that let a bearer secret admit itself
//! - **Extend edge**: a child group inherits members of a parent, optionally
//!   capped by a mapping
//! - **Read key**: a symmetric key encrypting private content, revealed to
//!   members sealed to their agent, and wrapped under newer and parent keys
//!
//! ## Encryption Model
//!
//! 1. **Read keys**: ChaCha20-Poly1305 keys that encrypt private transactions
//! 2. **Revelations**: a read key sealed with X25519 from the revealer to a member
//! 3. **Key wraps**: a read key encrypted under another read key, so members
//!    of a newer key or a parent group can recover it
//!
//! Rotating the read key after a removal cuts the removed member off from
//! everything written afterwards without re-encrypting history.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use coledger_perms::{GroupSource, RoleGraph, replay_group};
//!
//! // let graph = RoleGraph::new(&source, 64);
//! // let state = replay_group(&graph, &log, &LogBound::Full);
//! // let role = graph.role_of(&state, &member, &LogBound::Full)?;
//! ```

pub mod crypto;
pub mod entry;
pub mod envelope;
pub mod error;
pub mod key_ledger;
pub mod map;
pub mod role;
pub mod role_graph;
pub mod seal;
pub mod state;
pub mod validator;

#[cfg(test)]
mod testing;

pub use crypto::{
    decrypt_key_secret, encrypt_key_secret, new_random_agent_secret, new_random_key_secret,
    EncryptionNonce, KeySecret,
};
pub use entry::{GroupKey, GroupOp, GroupValue, LinkState};
pub use envelope::{EncryptedPayload, EncryptionFormat};
pub use error::{PermsError, Result};
pub use key_ledger::{KeyLedger, Reader};
pub use map::{MapContent, MapEdit, MapOp};
pub use role::{ExtendRole, InviteRole, Role, RoleEntry};
pub use role_graph::{GroupSource, RoleGraph};
pub use seal::SealedSecret;
pub use state::{EntryRecord, GroupState};
pub use validator::{apply_group_tx, check_owned_tx, replay_group, replay_owned, AcceptedTx};
