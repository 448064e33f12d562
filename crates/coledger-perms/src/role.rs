//! Roles held in a group's role map.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An effective role in a group.
///
/// Ordered by permissions: `admin > writer > reader > writeOnly`, with
/// `revoked` below all of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Role {
    Admin,
    Writer,
    Reader,
    WriteOnly,
    Revoked,
}

impl Role {
    /// Position in the permission order; higher is more permissive.
    pub const fn rank(self) -> u8 {
        match self {
            Role::Admin => 4,
            Role::Writer => 3,
            Role::Reader => 2,
            Role::WriteOnly => 1,
            Role::Revoked => 0,
        }
    }

    /// The more permissive of two roles.
    pub fn max(self, other: Role) -> Role {
        if other.rank() > self.rank() {
            other
        } else {
            self
        }
    }

    /// The less permissive of two roles.
    pub fn min(self, other: Role) -> Role {
        if other.rank() < self.rank() {
            other
        } else {
            self
        }
    }

    /// Whether this role may author content transactions.
    pub const fn can_write(self) -> bool {
        matches!(self, Role::Admin | Role::Writer | Role::WriteOnly)
    }

    /// Whether this role is expected to read content.
    pub const fn can_read(self) -> bool {
        matches!(self, Role::Admin | Role::Writer | Role::Reader)
    }

    /// Roles `everyone` may hold.
    pub const fn allowed_for_everyone(self) -> bool {
        matches!(
            self,
            Role::Writer | Role::Reader | Role::WriteOnly | Role::Revoked
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Writer => "writer",
            Role::Reader => "reader",
            Role::WriteOnly => "writeOnly",
            Role::Revoked => "revoked",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A one-shot grant role held by an invite agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InviteRole {
    AdminInvite,
    WriterInvite,
    ReaderInvite,
    WriteOnlyInvite,
}

impl InviteRole {
    /// The highest role this invite may grant.
    pub const fn ceiling(self) -> Role {
        match self {
            InviteRole::AdminInvite => Role::Admin,
            InviteRole::WriterInvite => Role::Writer,
            InviteRole::ReaderInvite => Role::Reader,
            InviteRole::WriteOnlyInvite => Role::WriteOnly,
        }
    }

    /// Whether `role` is grantable under this invite.
    pub fn permits(self, role: Role) -> bool {
        role != Role::Revoked && role.rank() <= self.ceiling().rank()
    }
}

impl fmt::Display for InviteRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InviteRole::AdminInvite => "adminInvite",
            InviteRole::WriterInvite => "writerInvite",
            InviteRole::ReaderInvite => "readerInvite",
            InviteRole::WriteOnlyInvite => "writeOnlyInvite",
        };
        f.write_str(s)
    }
}

/// A value in the role map: a role, or an invite role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RoleEntry {
    Role(Role),
    Invite(InviteRole),
}

impl RoleEntry {
    /// The plain role, if this is not an invite.
    pub fn role(self) -> Option<Role> {
        match self {
            RoleEntry::Role(r) => Some(r),
            RoleEntry::Invite(_) => None,
        }
    }

    /// The invite role, if this is one.
    pub fn invite(self) -> Option<InviteRole> {
        match self {
            RoleEntry::Invite(i) => Some(i),
            RoleEntry::Role(_) => None,
        }
    }

    /// Whether the holder should receive the group's read key.
    pub fn receives_read_key(self) -> bool {
        !matches!(self, RoleEntry::Role(Role::Revoked))
    }
}

impl From<Role> for RoleEntry {
    fn from(role: Role) -> Self {
        RoleEntry::Role(role)
    }
}

impl From<InviteRole> for RoleEntry {
    fn from(invite: InviteRole) -> Self {
        RoleEntry::Invite(invite)
    }
}

impl fmt::Display for RoleEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoleEntry::Role(r) => fmt::Display::fmt(r, f),
            RoleEntry::Invite(i) => fmt::Display::fmt(i, f),
        }
    }
}

/// Role mapping on an extend edge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExtendRole {
    /// Pass the parent role through unchanged.
    #[default]
    Inherit,
    Admin,
    Writer,
    Reader,
}

impl ExtendRole {
    /// Cap a role inherited across this edge.
    ///
    /// writeOnly ranks below reader, so a writeOnly member of the parent
    /// keeps writeOnly (and with it write access) across a reader edge.
    pub fn cap(self, inherited: Role) -> Role {
        match self {
            ExtendRole::Inherit => inherited,
            ExtendRole::Admin => inherited.min(Role::Admin),
            ExtendRole::Writer => inherited.min(Role::Writer),
            ExtendRole::Reader => inherited.min(Role::Reader),
        }
    }
}

impl fmt::Display for ExtendRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExtendRole::Inherit => "inherit",
            ExtendRole::Admin => "admin",
            ExtendRole::Writer => "writer",
            ExtendRole::Reader => "reader",
        };
        f.write_str(s)
    }
}
