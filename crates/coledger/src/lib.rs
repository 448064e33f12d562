//! # coledger
//!
//! Local-first groups with roles, inheritance and encrypted content.
//!
//! ## Overview
//!
//! A [`LocalNode`] acts as one account and holds the session logs of every
//! CoValue it knows:
//!
//! - **Accounts**: CoValues naming an agent; they are groups administered by themselves
//! - **Groups**: role maps plus a key ledger, optionally extending other groups
//! - **Maps**: owned key-value CoValues whose private edits are encrypted
//!   under the owning group's read key
//! - **Invites**: bearer secrets that let their holder join a group at a capped role
//!
//! ## Key Concepts
//!
//! - **Replay**: all state is derived by replaying signed transactions;
//!   unauthorized transactions are kept in the log but have no effect.
//! - **Causal point**: each transaction is checked against roles as they
//!   were at its own `made_at`.
//! - **Rotation**: removing a member rotates the read key, cascading into
//!   child groups this account administers.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use coledger::{LocalNode, NodeConfig, Privacy, Role};
//!
//! fn example() -> coledger::Result<()> {
//!     let mut alice = LocalNode::create_account(NodeConfig::default())?;
//!     let bob = LocalNode::create_account(NodeConfig::default())?;
//!
//!     // Alice needs Bob's account header to seal keys to him
//!     alice.import_from(&bob, bob.account_id().covalue_id())?;
//!
//!     let group = alice.create_group()?.id();
//!     alice.group(&group)?.add_member(bob.account_id(), Role::Reader)?;
//!
//!     let map = alice.create_map(&group)?;
//!     alice.map_set(&map, "foo", "bar".into(), Privacy::Private)?;
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `coledger::core` - Identities, headers, transactions and session logs
//! - `coledger::perms` - Roles, role graph, key ledger and replay

pub mod covalue;
pub mod error;
pub mod group;
pub mod invite;
pub mod node;

// Re-export component crates
pub use coledger_core as core;
pub use coledger_perms as perms;

// Re-export main types for convenience
pub use covalue::CoValueContent;
pub use error::{NodeError, Result};
pub use group::Group;
pub use invite::InviteSecret;
pub use node::{AccountCredentials, ImportReport, LocalNode, NodeConfig};

// Re-export commonly used types
pub use coledger_core::{
    AccountId, AgentId, AgentSecret, CoValueId, GroupId, KeyId, LogBound, MemberRef, Privacy,
    TxAuthor, TxId,
};
pub use coledger_perms::{ExtendRole, InviteRole, KeySecret, MapContent, PermsError, Role, RoleEntry};
