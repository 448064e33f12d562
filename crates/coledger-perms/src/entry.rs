//! Group entries: the keys and values written by group transactions.
//!
//! A group transaction carries a list of [`GroupOp`]s, each setting one
//! [`GroupKey`] to one [`GroupValue`]. The role map, the read-key pointer,
//! revelations, key wraps, write keys and extend edges all live in the same
//! keyspace.

use serde::{Deserialize, Serialize};
use std::fmt;

use coledger_core::{GroupId, KeyId, MemberRef};

use crate::crypto::KeySecret;
use crate::error::{PermsError, Result};
use crate::role::{ExtendRole, RoleEntry};
use crate::seal::SealedSecret;

/// A key in a group's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum GroupKey {
    /// Role of a member.
    Member(MemberRef),
    /// Pointer to the current read key.
    ReadKey,
    /// `key` revealed to `to`: sealed for agents/accounts, plaintext for `everyone`.
    Revelation { key: KeyId, to: MemberRef },
    /// `key` encrypted under `under` (older key of the same group, or a parent key).
    KeyWrap { key: KeyId, under: KeyId },
    /// Key a writeOnly member encrypts with.
    WriteKeyFor(MemberRef),
    /// This group extends the given group.
    Parent(GroupId),
    /// The given group extends this group.
    Child(GroupId),
}

impl GroupKey {
    /// Entries that are immutable once written.
    pub fn is_first_write_wins(&self) -> bool {
        matches!(
            self,
            GroupKey::Revelation { .. } | GroupKey::KeyWrap { .. } | GroupKey::WriteKeyFor(_)
        )
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupKey::Member(m) => write!(f, "{}", m),
            GroupKey::ReadKey => f.write_str("readKey"),
            GroupKey::Revelation { key, to } => write!(f, "{}_for_{}", key, to),
            GroupKey::KeyWrap { key, under } => write!(f, "{}_for_{}", key, under),
            GroupKey::WriteKeyFor(m) => write!(f, "writeKeyFor_{}", m),
            GroupKey::Parent(id) => write!(f, "parent_{}", id),
            GroupKey::Child(id) => write!(f, "child_{}", id),
        }
    }
}

/// State of an extend edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LinkState {
    Extend(ExtendRole),
    Revoked,
}

impl LinkState {
    /// The role mapping, if the edge is live.
    pub fn mapping(self) -> Option<ExtendRole> {
        match self {
            LinkState::Extend(mapping) => Some(mapping),
            LinkState::Revoked => None,
        }
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkState::Extend(ExtendRole::Inherit) => f.write_str("extend"),
            LinkState::Extend(mapping) => write!(f, "extend({})", mapping),
            LinkState::Revoked => f.write_str("revoked"),
        }
    }
}

/// A value in a group's content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupValue {
    Role(RoleEntry),
    /// A read key id (`readKey`, `writeKeyFor_*`).
    KeyRef(KeyId),
    Sealed(SealedSecret),
    Plain(KeySecret),
    Wrapped(Vec<u8>),
    Link(LinkState),
}

/// One entry write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupOp {
    pub key: GroupKey,
    pub value: GroupValue,
}

impl GroupOp {
    pub fn new(key: GroupKey, value: GroupValue) -> Self {
        Self { key, value }
    }

    /// Set a member's role.
    pub fn role(member: MemberRef, role: impl Into<RoleEntry>) -> Self {
        Self::new(GroupKey::Member(member), GroupValue::Role(role.into()))
    }

    /// Point `readKey` at `key`.
    pub fn read_key(key: KeyId) -> Self {
        Self::new(GroupKey::ReadKey, GroupValue::KeyRef(key))
    }

    /// Check that key and value belong together.
    pub fn check_shape(&self) -> Result<()> {
        let ok = match (&self.key, &self.value) {
            (GroupKey::Member(_), GroupValue::Role(_)) => true,
            (GroupKey::ReadKey, GroupValue::KeyRef(_)) => true,
            (GroupKey::WriteKeyFor(m), GroupValue::KeyRef(_)) => !m.is_everyone(),
            (GroupKey::Revelation { to, .. }, GroupValue::Plain(_)) => to.is_everyone(),
            (GroupKey::Revelation { to, .. }, GroupValue::Sealed(_)) => !to.is_everyone(),
            (GroupKey::KeyWrap { key, under }, GroupValue::Wrapped(_)) => key != under,
            (GroupKey::Parent(_), GroupValue::Link(_)) => true,
            (GroupKey::Child(_), GroupValue::Link(_)) => true,
            _ => false,
        };
        if ok {
            Ok(())
        } else {
            Err(PermsError::MismatchedEntry(self.key.to_string()))
        }
    }

    /// Encode a transaction's ops to CBOR bytes.
    pub fn encode_all(ops: &[GroupOp]) -> Vec<u8> {
        let mut buf = Vec::new();
        ciborium::into_writer(ops, &mut buf).expect("CBOR serialization failed");
        buf
    }

    /// Decode a transaction's ops from CBOR bytes.
    pub fn decode_all(bytes: &[u8]) -> Result<Vec<GroupOp>> {
        ciborium::from_reader(bytes).map_err(|e| PermsError::SerializationError(e.to_string()))
    }
}
