//! Invites: a bearer secret that lets its holder admit itself to a group.
//!
//! The secret is the seed of an invite agent. The group lists that agent
//! with an invite role and reveals the read key to it; accepting signs,
//! as the invite agent, the new member's role and a revelation to it.

use std::fmt;
use std::str::FromStr;

use tracing::debug;

use coledger_core::{crypto::random_bytes_32, AgentSecret, GroupId, LogBound, MemberRef, SessionId, TxAuthor};
use coledger_perms::{GroupKey, GroupOp, GroupValue, PermsError, Reader, Role, RoleEntry};

use crate::error::{NodeError, Result};
use crate::node::LocalNode;

const PREFIX: &str = "inviteSecret_z";

/// Secret seed of an invite agent.
#[derive(Clone, PartialEq, Eq)]
pub struct InviteSecret([u8; 32]);

impl InviteSecret {
    /// A fresh random invite.
    pub fn generate() -> Self {
        Self(random_bytes_32())
    }

    /// The invite agent this secret stands for.
    pub fn agent(&self) -> AgentSecret {
        AgentSecret::from_seed(&self.0)
    }
}

impl fmt::Debug for InviteSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InviteSecret({})", self.agent().agent_id())
    }
}

impl fmt::Display for InviteSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", PREFIX, hex::encode(self.0))
    }
}

impl FromStr for InviteSecret {
    type Err = NodeError;

    fn from_str(s: &str) -> Result<Self> {
        let hex_part = s
            .strip_prefix(PREFIX)
            .ok_or_else(|| NodeError::InvalidInvite(format!("missing {} prefix", PREFIX)))?;
        let bytes = hex::decode(hex_part).map_err(|e| NodeError::InvalidInvite(e.to_string()))?;
        let seed: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| NodeError::InvalidInvite(format!("expected 32 bytes, got {}", bytes.len())))?;
        Ok(Self(seed))
    }
}

impl LocalNode {
    /// Join `group` at the invite's ceiling role.
    ///
    /// If this account already holds that role or better, nothing is
    /// written and the current role is returned.
    pub fn accept_invite(&mut self, group: &GroupId, invite: &InviteSecret) -> Result<Role> {
        self.accept_invite_with(group, invite, None)
    }

    /// Join `group` asking the invite for a specific role.
    ///
    /// The role must be within the invite's ceiling.
    pub fn accept_invite_as_role(&mut self, group: &GroupId, invite: &InviteSecret, role: Role) -> Result<Role> {
        self.accept_invite_with(group, invite, Some(role))
    }

    fn accept_invite_with(&mut self, group: &GroupId, invite: &InviteSecret, requested: Option<Role>) -> Result<Role> {
        let state = self.group_state(group)?;
        let agent = invite.agent();
        let invite_member = MemberRef::Agent(agent.agent_id());

        let invite_role = match state.direct_role(&invite_member) {
            Some(RoleEntry::Invite(role)) => role,
            Some(RoleEntry::Role(Role::Revoked)) => return Err(PermsError::InviteAlreadyConsumed.into()),
            _ => {
                return Err(PermsError::InsufficientPermission(format!(
                    "{} is not an invite of {}",
                    invite_member, group
                ))
                .into())
            }
        };
        let role = requested.unwrap_or(invite_role.ceiling());
        let me = self.member();

        if requested.is_none() {
            if let Some(current) = self.graph().role_of(&state, &me, &LogBound::Full)? {
                if current != Role::Revoked && current.rank() >= role.rank() {
                    debug!(%group, role = %current, "already a member; invite unused");
                    return Ok(current);
                }
            }
        }

        let reader = Reader {
            agent: &agent,
            member: invite_member,
        };
        let (key, secret) = self.ledger_as(reader).current_read_key(&state)?;

        let mut ops = vec![
            GroupOp::role(me, role),
            self.reveal(group, key, &secret, me, &agent)?,
        ];
        if role == Role::WriteOnly {
            ops.push(GroupOp::new(GroupKey::WriteKeyFor(me), GroupValue::KeyRef(key)));
        }

        let session = SessionId::new(TxAuthor::Agent(agent.agent_id()));
        let tx = self.prepare_group_tx(group, session, &ops)?;
        self.commit_as(group, session, &agent, tx)?;

        debug!(%group, %invite_role, %role, "invite accepted");
        Ok(role)
    }
}
