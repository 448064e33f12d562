//! Group mutations.
//!
//! Every operation here is one or more group transactions authored by the
//! node's account, checked locally before they are appended. A check that
//! fails locally returns the error; nothing is written.

use std::collections::BTreeSet;
use std::rc::Rc;

use tracing::debug;

use coledger_core::{CoValueHeader, GroupId, KeyId, LogBound, MemberRef, TxAuthor};
use coledger_perms::{
    encrypt_key_secret, new_random_key_secret, ExtendRole, GroupKey, GroupOp, GroupState,
    GroupValue, InviteRole, KeySecret, LinkState, PermsError, Role, RoleEntry,
};

use crate::error::{NodeError, Result};
use crate::invite::InviteSecret;
use crate::node::{now_millis, LocalNode};

/// A group on a node, for reading roles and authoring changes.
pub struct Group<'n> {
    node: &'n mut LocalNode,
    id: GroupId,
}

impl LocalNode {
    /// Create a group administered by this account, with a fresh read key.
    pub fn create_group(&mut self) -> Result<Group<'_>> {
        let header = CoValueHeader::new_group(TxAuthor::Account(self.account_id()), now_millis());
        let id = self.insert_log(header);
        self.bootstrap_group(id)?;
        debug!(group = %id, "group created");
        Ok(Group { node: self, id })
    }

    /// Open a known group.
    pub fn group(&mut self, id: &GroupId) -> Result<Group<'_>> {
        if !self.log(id)?.header().is_group() {
            return Err(NodeError::NotAGroup(*id));
        }
        Ok(Group { node: self, id: *id })
    }

    /// Make this account the first admin of `id` and give it a read key.
    pub(crate) fn bootstrap_group(&mut self, id: GroupId) -> Result<()> {
        let me = self.member();
        let (key, secret) = new_random_key_secret();
        let revelation = self.reveal(&id, key, &secret, me, self.agent())?;
        self.author_group_ops(
            id,
            vec![GroupOp::role(me, Role::Admin), revelation, GroupOp::read_key(key)],
        )?;
        Ok(())
    }

    /// A wrap of `key` under the current read key of `parent`, if this
    /// account can resolve that key.
    fn parent_wrap(&self, parent: &GroupId, key: (KeyId, &KeySecret)) -> Result<Option<GroupOp>> {
        let Some(parent_state) = self.group_state_at(parent, &LogBound::Full) else {
            return Ok(None);
        };
        match self.ledger().current_read_key(&parent_state) {
            Ok((under, under_secret)) => {
                let wrapped = encrypt_key_secret(key, (under, &under_secret))?;
                Ok(Some(GroupOp::new(
                    GroupKey::KeyWrap { key: key.0, under },
                    GroupValue::Wrapped(wrapped),
                )))
            }
            Err(PermsError::NoReadKeyAvailable(reason)) => {
                debug!(%parent, %reason, "parent key not resolvable; no wrap");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn rotate(&mut self, group: GroupId, visited: &mut BTreeSet<GroupId>) -> Result<KeyId> {
        visited.insert(group);
        let state = self.group_state(&group)?;
        let previous = match state.read_key() {
            Some(_) => Some(self.ledger().current_read_key(&state)?),
            None => None,
        };
        let (key, secret) = new_random_key_secret();

        let mut ops = Vec::new();
        for (member, entry) in state.direct_members() {
            if !entry.receives_read_key() {
                continue;
            }
            match self.reveal(&group, key, &secret, member, self.agent()) {
                Ok(op) => ops.push(op),
                Err(NodeError::UnknownAccount(account)) => {
                    debug!(%group, %account, "member account unknown; no revelation")
                }
                Err(e) => return Err(e),
            }
        }
        if let Some((old, old_secret)) = &previous {
            let wrapped = encrypt_key_secret((*old, old_secret), (key, &secret))?;
            ops.push(GroupOp::new(
                GroupKey::KeyWrap { key: *old, under: key },
                GroupValue::Wrapped(wrapped),
            ));
        }
        for (parent, link) in state.parents() {
            if parent == group || link.mapping().is_none() {
                continue;
            }
            if let Some(op) = self.parent_wrap(&parent, (key, &secret))? {
                ops.push(op);
            }
        }
        ops.push(GroupOp::read_key(key));

        self.author_group_ops(group, ops)?;
        debug!(%group, %key, "read key rotated");

        for (child, link) in state.children() {
            if link.mapping().is_none() || visited.contains(&child) {
                continue;
            }
            let Some(child_state) = self.group_state_at(&child, &LogBound::Full) else {
                debug!(%group, %child, "child group not loaded; not cascading");
                continue;
            };
            let my_role = self.graph().role_of(&child_state, &self.member(), &LogBound::Full)?;
            if my_role != Some(Role::Admin) {
                debug!(%group, %child, "not an admin of child group; not cascading");
                continue;
            }
            if let Err(e) = self.rotate(child, visited) {
                debug!(%group, %child, error = %e, "cascading rotation failed");
            }
        }

        Ok(key)
    }
}

impl Group<'_> {
    pub fn id(&self) -> GroupId {
        self.id
    }

    /// Current state of this group.
    pub fn state(&self) -> Result<Rc<GroupState>> {
        self.node.group_state(&self.id)
    }

    /// Set a member's role and, unless revoked, reveal the current read key
    /// to it. `everyone` receives the key in plaintext.
    pub fn add_member(&mut self, member: impl Into<MemberRef>, role: impl Into<RoleEntry>) -> Result<()> {
        let (member, role) = (member.into(), role.into());
        let state = self.state()?;

        let mut ops = vec![GroupOp::role(member, role)];
        if role.receives_read_key() {
            let (key, secret) = self.node.ledger().current_read_key(&state)?;
            if state.get(&GroupKey::Revelation { key, to: member }).is_none() {
                ops.push(self.node.reveal(&self.id, key, &secret, member, self.node.agent())?);
            }
        }

        self.node.author_group_ops(self.id, ops)?;
        debug!(group = %self.id, %member, %role, "member set");
        Ok(())
    }

    /// Revoke a member, then rotate the read key so it cannot read anything
    /// written afterwards.
    pub fn remove_member(&mut self, member: impl Into<MemberRef>) -> Result<KeyId> {
        let member = member.into();
        self.node
            .author_group_ops(self.id, vec![GroupOp::role(member, Role::Revoked)])?;
        debug!(group = %self.id, %member, "member revoked");
        self.rotate_read_key()
    }

    /// Give up this account's own role. The read key is left as is; an admin
    /// rotates it when it wants the leaver locked out of new content.
    pub fn leave(&mut self) -> Result<()> {
        let me = self.node.member();
        self.node
            .author_group_ops(self.id, vec![GroupOp::role(me, Role::Revoked)])?;
        debug!(group = %self.id, member = %me, "left group");
        Ok(())
    }

    /// Replace the read key, re-reveal it to every non-revoked direct member
    /// and cascade to child groups this account administers.
    pub fn rotate_read_key(&mut self) -> Result<KeyId> {
        let mut visited = BTreeSet::new();
        self.node.rotate(self.id, &mut visited)
    }

    /// Extend `parent`: its members gain their role here.
    pub fn extend(&mut self, parent: &GroupId) -> Result<()> {
        self.extend_with(parent, ExtendRole::Inherit)
    }

    /// Extend `parent`, capping inherited roles by `mapping`.
    pub fn extend_with(&mut self, parent: &GroupId, mapping: ExtendRole) -> Result<()> {
        let child = self.id;
        let link = GroupValue::Link(LinkState::Extend(mapping));

        if *parent == child {
            self.node.author_group_ops(
                child,
                vec![
                    GroupOp::new(GroupKey::Parent(child), link.clone()),
                    GroupOp::new(GroupKey::Child(child), link),
                ],
            )?;
            return Ok(());
        }

        let child_state = self.state()?;
        self.node.group_state(parent)?;

        let mut child_ops = vec![GroupOp::new(GroupKey::Parent(*parent), link.clone())];
        match self.node.ledger().current_read_key(&child_state) {
            Ok((key, secret)) => {
                if let Some(wrap) = self.node.parent_wrap(parent, (key, &secret))? {
                    if child_state.get(&wrap.key).is_none() {
                        child_ops.push(wrap);
                    }
                }
            }
            Err(e) => debug!(group = %child, error = %e, "own key not resolvable; no wrap"),
        }
        let parent_ops = vec![GroupOp::new(GroupKey::Child(child), link)];

        let session = self.node.session();
        let child_tx = self.node.prepare_group_tx(&child, session, &child_ops)?;
        let parent_tx = self.node.prepare_group_tx(parent, session, &parent_ops)?;
        self.node.commit(&child, child_tx)?;
        self.node.commit(parent, parent_tx)?;

        debug!(group = %child, %parent, %mapping, "extended");
        Ok(())
    }

    /// Cut the edge to `parent` and rotate, so parent members lose access
    /// to new content.
    pub fn revoke_extend(&mut self, parent: &GroupId) -> Result<KeyId> {
        let child = self.id;
        let revoked = GroupValue::Link(LinkState::Revoked);

        if *parent == child {
            self.node.author_group_ops(
                child,
                vec![
                    GroupOp::new(GroupKey::Parent(child), revoked.clone()),
                    GroupOp::new(GroupKey::Child(child), revoked),
                ],
            )?;
        } else {
            self.node
                .author_group_ops(child, vec![GroupOp::new(GroupKey::Parent(*parent), revoked.clone())])?;
            if let Err(e) = self
                .node
                .author_group_ops(*parent, vec![GroupOp::new(GroupKey::Child(child), revoked)])
            {
                debug!(group = %child, %parent, error = %e, "cannot mark parent side of edge");
            }
        }

        debug!(group = %child, %parent, "extend revoked");
        self.rotate_read_key()
    }

    /// Register a fresh invite agent with `role` and reveal the read key
    /// to it.
    pub fn create_invite(&mut self, role: InviteRole) -> Result<InviteSecret> {
        let invite = InviteSecret::generate();
        self.add_member(invite.agent().agent_id(), role)?;
        Ok(invite)
    }

    /// Revoke an invite so it can no longer be accepted.
    pub fn revoke_invite(&mut self, invite: &InviteSecret) -> Result<()> {
        let member = MemberRef::Agent(invite.agent().agent_id());
        self.node
            .author_group_ops(self.id, vec![GroupOp::role(member, Role::Revoked)])?;
        Ok(())
    }

    /// This account's effective role.
    pub fn my_role(&self) -> Result<Option<Role>> {
        self.role_of(self.node.member())
    }

    /// Effective role of `member`, including inherited roles.
    pub fn role_of(&self, member: impl Into<MemberRef>) -> Result<Option<Role>> {
        let state = self.state()?;
        Ok(self
            .node
            .graph()
            .role_of(&state, &member.into(), &LogBound::Full)?)
    }

    /// Members named here or in any extended group, with effective roles.
    pub fn members(&self) -> Result<Vec<(MemberRef, Role)>> {
        let state = self.state()?;
        Ok(self.node.graph().members(&state, &LogBound::Full)?)
    }

    /// Entries of this group's own role map, invites included.
    pub fn direct_members(&self) -> Result<Vec<(MemberRef, RoleEntry)>> {
        Ok(self.state()?.direct_members())
    }

    /// The current read key id and secret, as this account resolves them.
    pub fn current_read_key(&self) -> Result<(KeyId, KeySecret)> {
        let state = self.state()?;
        Ok(self.node.ledger().current_read_key(&state)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeConfig;

    fn node() -> LocalNode {
        LocalNode::create_account(NodeConfig::default()).unwrap()
    }

    #[test]
    fn test_create_group() {
        let mut alice = node();
        let group = alice.create_group().unwrap();
        assert_eq!(group.my_role().unwrap(), Some(Role::Admin));
        assert!(group.current_read_key().is_ok());
        assert_eq!(group.direct_members().unwrap().len(), 1);
    }

    #[test]
    fn test_add_member_requires_known_account() {
        let mut alice = node();
        let bob = node();
        let mut group = alice.create_group().unwrap();

        let err = group.add_member(bob.account_id(), Role::Reader).unwrap_err();
        assert!(matches!(err, NodeError::UnknownAccount(_)));
        assert_eq!(group.role_of(bob.account_id()).unwrap(), None);
    }

    #[test]
    fn test_everyone_cannot_be_admin() {
        let mut alice = node();
        let mut group = alice.create_group().unwrap();

        let err = group.add_member(MemberRef::Everyone, Role::Admin).unwrap_err();
        assert!(matches!(
            err,
            NodeError::Perms(PermsError::InvalidRoleTransition(_))
        ));

        group.add_member(MemberRef::Everyone, Role::Reader).unwrap();
        let key = group.current_read_key().unwrap().0;
        assert!(group
            .state()
            .unwrap()
            .public_revelation(key)
            .is_some());
    }

    #[test]
    fn test_rotation_wraps_old_key() {
        let mut alice = node();
        let mut group = alice.create_group().unwrap();
        let (old, _) = group.current_read_key().unwrap();

        let new = group.rotate_read_key().unwrap();
        assert_ne!(old, new);
        let state = group.state().unwrap();
        assert!(state.has_wrap(old, new));
        assert_eq!(state.read_key(), Some(new));
    }

    #[test]
    fn test_extend_writes_both_edges_and_wrap() {
        let mut alice = node();
        let parent = alice.create_group().unwrap().id();
        let mut child = alice.create_group().unwrap();
        child.extend(&parent).unwrap();

        let child_state = child.state().unwrap();
        let (child_key, _) = child.current_read_key().unwrap();
        let parent_state = alice.group_state(&parent).unwrap();
        let parent_key = parent_state.read_key().unwrap();

        assert_eq!(child_state.parents().len(), 1);
        assert_eq!(parent_state.children().len(), 1);
        assert!(child_state.has_wrap(child_key, parent_key));
    }

    #[test]
    fn test_self_extension_is_harmless() {
        let mut alice = node();
        let mut group = alice.create_group().unwrap();
        group.extend(&group.id()).unwrap();

        assert_eq!(group.my_role().unwrap(), Some(Role::Admin));
        assert!(group.current_read_key().is_ok());
        group.rotate_read_key().unwrap();
    }
}
