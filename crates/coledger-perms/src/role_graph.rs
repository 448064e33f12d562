//! Effective roles across extend edges, and entry authorization.
//!
//! A member's role in a group is the union of every path to it: the direct
//! entry, the `everyone` entry, and every live parent edge (capped by the
//! edge's mapping). The most permissive non-revoked role wins.

use std::collections::BTreeSet;
use std::rc::Rc;

use tracing::warn;

use coledger_core::{AgentId, GroupId, LogBound, MemberRef, TxAuthor};

use crate::entry::{GroupKey, GroupOp, GroupValue};
use crate::error::{PermsError, Result};
use crate::role::{InviteRole, Role, RoleEntry};
use crate::state::GroupState;

/// Where the engine reads other groups and identities from.
pub trait GroupSource {
    /// The state of group `id` folded up to `bound`.
    ///
    /// `None` if the group is unknown, not a group, or currently being
    /// replayed further up the stack.
    fn group_state(&self, id: &GroupId, bound: &LogBound) -> Option<Rc<GroupState>>;

    /// The agent that signs for `author`.
    fn agent_of(&self, author: &TxAuthor) -> Option<AgentId>;
}

/// Resolves roles and checks entry writes.
pub struct RoleGraph<'a, S: GroupSource + ?Sized> {
    source: &'a S,
    max_depth: usize,
}

#[derive(Default)]
struct RoleUnion {
    best: Option<Role>,
    mentioned: bool,
}

impl RoleUnion {
    fn add(&mut self, role: Role) {
        if role == Role::Revoked {
            self.mentioned = true;
        } else {
            self.best = Some(self.best.map_or(role, |b| b.max(role)));
        }
    }

    fn finish(self) -> Option<Role> {
        self.best.or(self.mentioned.then_some(Role::Revoked))
    }
}

impl<'a, S: GroupSource + ?Sized> RoleGraph<'a, S> {
    pub fn new(source: &'a S, max_depth: usize) -> Self {
        Self { source, max_depth }
    }

    pub fn source(&self) -> &'a S {
        self.source
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Effective role of `member` in `state`, with parents read at `bound`.
    ///
    /// Invite roles are never returned; `revoked` only when some path names
    /// the member and none grants a role.
    pub fn role_of(&self, state: &GroupState, member: &MemberRef, bound: &LogBound) -> Result<Option<Role>> {
        let mut path = Vec::new();
        self.resolve(state, member, bound, &mut path)
    }

    fn resolve(
        &self,
        state: &GroupState,
        member: &MemberRef,
        bound: &LogBound,
        path: &mut Vec<GroupId>,
    ) -> Result<Option<Role>> {
        if path.contains(state.id()) {
            return Ok(None);
        }
        if path.len() >= self.max_depth {
            warn!(group = %state.id(), limit = self.max_depth, "role resolution exceeded depth budget");
            return Err(PermsError::CycleBudgetExceeded {
                limit: self.max_depth,
            });
        }

        path.push(*state.id());
        let result = self.union_of_paths(state, member, bound, path);
        path.pop();
        result
    }

    fn union_of_paths(
        &self,
        state: &GroupState,
        member: &MemberRef,
        bound: &LogBound,
        path: &mut Vec<GroupId>,
    ) -> Result<Option<Role>> {
        let mut union = RoleUnion::default();

        if let Some(RoleEntry::Role(role)) = state.direct_role(member) {
            union.add(role);
        }
        if !member.is_everyone() {
            if let Some(RoleEntry::Role(role)) = state.direct_role(&MemberRef::Everyone) {
                union.add(role);
            }
        }

        for (parent_id, link) in state.parents() {
            let Some(mapping) = link.mapping() else {
                continue;
            };
            let Some(parent) = self.source.group_state(&parent_id, bound) else {
                continue;
            };
            if let Some(role) = self.resolve(&parent, member, bound, path)? {
                union.add(mapping.cap(role));
            }
        }

        Ok(union.finish())
    }

    /// Members named in this group or any ancestor, with their effective role.
    pub fn members(&self, state: &GroupState, bound: &LogBound) -> Result<Vec<(MemberRef, Role)>> {
        let mut candidates = BTreeSet::new();
        let mut seen = BTreeSet::new();
        let mut stack = vec![Rc::new(state.clone())];

        while let Some(group) = stack.pop() {
            if !seen.insert(*group.id()) {
                continue;
            }
            if seen.len() > self.max_depth {
                return Err(PermsError::CycleBudgetExceeded {
                    limit: self.max_depth,
                });
            }
            candidates.extend(group.direct_members().into_iter().map(|(m, _)| m));
            for (parent_id, link) in group.parents() {
                if link.mapping().is_some() {
                    if let Some(parent) = self.source.group_state(&parent_id, bound) {
                        stack.push(parent);
                    }
                }
            }
        }

        let mut members = Vec::new();
        for member in candidates {
            if let Some(role) = self.role_of(state, &member, bound)? {
                members.push((member, role));
            }
        }
        Ok(members)
    }

    /// Check whether `author` may apply `op` on top of `state`.
    pub fn check_op(&self, state: &GroupState, author: &TxAuthor, op: &GroupOp, bound: &LogBound) -> Result<()> {
        op.check_shape()?;

        let me = author.member();
        let invite = state.direct_role(&me).and_then(RoleEntry::invite);
        let role = self.role_of(state, &me, bound)?;
        let is_admin = role == Some(Role::Admin);

        match (&op.key, &op.value) {
            (GroupKey::Member(target), GroupValue::Role(new)) => {
                self.check_role_change(state, author, target, *new, role, invite)
            }
            (GroupKey::ReadKey, _) | (GroupKey::KeyWrap { .. }, _) | (GroupKey::Parent(_), _) => {
                if is_admin {
                    Ok(())
                } else {
                    Err(insufficient(&op.key, "admin"))
                }
            }
            (GroupKey::Revelation { to, .. }, _) => {
                if is_admin || (invite.is_some() && !to.is_everyone()) {
                    Ok(())
                } else {
                    Err(insufficient(&op.key, "admin or invite"))
                }
            }
            (GroupKey::WriteKeyFor(target), _) => {
                if state.direct_role(target) != Some(RoleEntry::Role(Role::WriteOnly)) {
                    return Err(PermsError::InvalidRoleTransition(format!(
                        "{} is not a writeOnly member",
                        target
                    )));
                }
                let own_write_only = *target == me && role == Some(Role::WriteOnly);
                if is_admin || invite.is_some() || own_write_only {
                    Ok(())
                } else {
                    Err(insufficient(&op.key, "admin, invite or the writeOnly member"))
                }
            }
            (GroupKey::Child(_), _) => match role {
                Some(r) if r != Role::Revoked => Ok(()),
                _ => Err(insufficient(&op.key, "any role")),
            },
            _ => Err(PermsError::MismatchedEntry(op.key.to_string())),
        }
    }

    fn check_role_change(
        &self,
        state: &GroupState,
        author: &TxAuthor,
        target: &MemberRef,
        new: RoleEntry,
        role: Option<Role>,
        invite: Option<InviteRole>,
    ) -> Result<()> {
        let me = author.member();

        if target.is_everyone() && !matches!(new, RoleEntry::Role(r) if r.allowed_for_everyone()) {
            return Err(PermsError::InvalidRoleTransition(format!(
                "everyone cannot hold {}",
                new
            )));
        }

        if *target == me && new == RoleEntry::Role(Role::Admin) && state.initial_admin() == Some(author) {
            return Ok(());
        }

        if role == Some(Role::Admin) {
            let demotes_admin = *target != me
                && state.direct_role(target) == Some(RoleEntry::Role(Role::Admin))
                && new != RoleEntry::Role(Role::Admin);
            if demotes_admin {
                return Err(PermsError::InvalidRoleTransition(format!(
                    "{} is an admin and can only be demoted by itself",
                    target
                )));
            }
            return Ok(());
        }

        if let Some(invite) = invite {
            let RoleEntry::Role(granted) = new else {
                return Err(PermsError::InvalidRoleTransition(format!(
                    "{} cannot grant {}",
                    invite, new
                )));
            };
            if target.is_everyone() {
                return Err(insufficient(&GroupKey::Member(*target), "admin"));
            }
            if !invite.permits(granted) {
                return Err(PermsError::InvalidRoleTransition(format!(
                    "{} cannot grant {}",
                    invite, granted
                )));
            }
            return match state.direct_role(target) {
                None => Ok(()),
                Some(existing) if existing == new => Ok(()),
                Some(existing) => Err(PermsError::InvalidRoleTransition(format!(
                    "{} already holds {}; invites only admit new members",
                    target, existing
                ))),
            };
        }

        // Anyone may leave.
        if *target == me && new == RoleEntry::Role(Role::Revoked) && role.is_some() {
            return Ok(());
        }

        Err(insufficient(&GroupKey::Member(*target), "admin"))
    }
}

fn insufficient(key: &GroupKey, needed: &str) -> PermsError {
    PermsError::InsufficientPermission(format!("setting {} requires {}", key, needed))
}
