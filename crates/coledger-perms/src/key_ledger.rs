//! Read-key resolution for one reader.
//!
//! A read key of a group is found, in order, through a sealed revelation to
//! the reader, a plaintext revelation to `everyone`, or a wrap under another
//! key the reader can resolve: a newer key of the same group, or a key of a
//! parent group.

use std::cell::RefCell;
use std::collections::HashMap;

use tracing::{debug, warn};

use coledger_core::{AgentSecret, GroupId, KeyId, LogBound, MemberRef};

use crate::crypto::{decrypt_key_secret, KeySecret};
use crate::error::{PermsError, Result};
use crate::role::Role;
use crate::role_graph::GroupSource;
use crate::state::GroupState;

/// Who is reading: the agent holding the sealer secret, and the role-map
/// key revelations to it are filed under.
#[derive(Clone, Copy)]
pub struct Reader<'a> {
    pub agent: &'a AgentSecret,
    pub member: MemberRef,
}

/// Resolves read keys for a single reader, memoizing hits.
pub struct KeyLedger<'a, S: GroupSource + ?Sized> {
    source: &'a S,
    reader: Reader<'a>,
    max_depth: usize,
    memo: RefCell<HashMap<(GroupId, KeyId), KeySecret>>,
}

impl<'a, S: GroupSource + ?Sized> KeyLedger<'a, S> {
    pub fn new(source: &'a S, reader: Reader<'a>, max_depth: usize) -> Self {
        Self {
            source,
            reader,
            max_depth,
            memo: RefCell::new(HashMap::new()),
        }
    }

    pub fn reader(&self) -> &Reader<'a> {
        &self.reader
    }

    /// The secret of `key` in `state`, if this reader can derive it.
    pub fn get_read_key(&self, state: &GroupState, key: KeyId) -> Result<Option<KeySecret>> {
        let mut path = Vec::new();
        self.resolve(state, key, &mut path)
    }

    /// The group's current read key and its secret.
    pub fn current_read_key(&self, state: &GroupState) -> Result<(KeyId, KeySecret)> {
        let key = state.read_key().ok_or_else(|| {
            PermsError::NoReadKeyAvailable(format!("{} has no read key", state.id()))
        })?;
        match self.get_read_key(state, key)? {
            Some(secret) => Ok((key, secret)),
            None => Err(PermsError::NoReadKeyAvailable(format!(
                "cannot derive {} of {}",
                key,
                state.id()
            ))),
        }
    }

    /// The key this reader should encrypt new content with, given its
    /// effective `role` in the group.
    ///
    /// A writeOnly member's `writeKeyFor` entry is used only while it names
    /// the current read key. After a rotation every writer moves to the new
    /// key, so members revoked at the rotation cannot read later writes.
    pub fn write_key(&self, state: &GroupState, role: Option<Role>) -> Result<(KeyId, KeySecret)> {
        let pinned = state
            .write_key_for(&self.reader.member)
            .filter(|key| role == Some(Role::WriteOnly) && state.read_key() == Some(*key));
        if let Some(key) = pinned {
            if let Some(secret) = self.get_read_key(state, key)? {
                return Ok((key, secret));
            }
        }
        self.current_read_key(state)
    }

    fn resolve(
        &self,
        state: &GroupState,
        key: KeyId,
        path: &mut Vec<(GroupId, KeyId)>,
    ) -> Result<Option<KeySecret>> {
        let slot = (*state.id(), key);
        if let Some(secret) = self.memo.borrow().get(&slot) {
            return Ok(Some(secret.clone()));
        }
        if path.contains(&slot) {
            return Ok(None);
        }
        if path.len() >= self.max_depth {
            warn!(group = %state.id(), %key, limit = self.max_depth, "key resolution exceeded depth budget");
            return Err(PermsError::CycleBudgetExceeded {
                limit: self.max_depth,
            });
        }

        path.push(slot);
        let found = self.resolve_uncached(state, key, path);
        path.pop();

        let found = found?;
        if let Some(secret) = &found {
            self.memo.borrow_mut().insert(slot, secret.clone());
        }
        Ok(found)
    }

    fn resolve_uncached(
        &self,
        state: &GroupState,
        key: KeyId,
        path: &mut Vec<(GroupId, KeyId)>,
    ) -> Result<Option<KeySecret>> {
        if let Some(secret) = self.unseal_direct(state, key) {
            return Ok(Some(secret));
        }
        if let Some(secret) = state.public_revelation(key) {
            return Ok(Some(secret.clone()));
        }

        for (under, wrapped) in state.wraps_of(key) {
            if state.knows_key(&under) {
                if let Some(under_secret) = self.resolve(state, under, path)? {
                    if let Some(secret) = unwrap(key, wrapped, under, &under_secret, state.id()) {
                        return Ok(Some(secret));
                    }
                }
            }

            for (parent_id, _) in state.parents() {
                let Some(parent) = self.source.group_state(&parent_id, &LogBound::Full) else {
                    continue;
                };
                if !parent.knows_key(&under) {
                    continue;
                }
                if let Some(under_secret) = self.resolve(&parent, under, path)? {
                    if let Some(secret) = unwrap(key, wrapped, under, &under_secret, state.id()) {
                        return Ok(Some(secret));
                    }
                }
            }
        }

        Ok(None)
    }

    fn unseal_direct(&self, state: &GroupState, key: KeyId) -> Option<KeySecret> {
        let (sealed, by) = state.sealed_revelation(key, &self.reader.member)?;
        let Some(revealer) = self.source.agent_of(by) else {
            debug!(group = %state.id(), %key, revealer = %by, "revealer agent unknown");
            return None;
        };
        match sealed.unseal(state.id(), key, self.reader.agent.sealer(), &revealer.sealer) {
            Ok(secret) => Some(secret),
            Err(e) => {
                debug!(group = %state.id(), %key, error = %e, "cannot unseal revelation");
                None
            }
        }
    }
}

fn unwrap(key: KeyId, wrapped: &[u8], under: KeyId, under_secret: &KeySecret, group: &GroupId) -> Option<KeySecret> {
    match decrypt_key_secret(key, wrapped, (under, under_secret)) {
        Ok(secret) => Some(secret),
        Err(e) => {
            debug!(%group, %key, %under, error = %e, "cannot unwrap key");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{encrypt_key_secret, new_random_key_secret};
    use crate::entry::{GroupKey, GroupOp, GroupValue, LinkState};
    use crate::role::ExtendRole;
    use crate::seal::SealedSecret;
    use crate::testing::LogSource;

    fn reveal(
        group: GroupId,
        key: (KeyId, &KeySecret),
        from: &AgentSecret,
        to: &AgentSecret,
    ) -> GroupOp {
        let sealed =
            SealedSecret::seal(key.1, &group, key.0, from.sealer(), &to.agent_id().sealer).unwrap();
        GroupOp::new(
            GroupKey::Revelation {
                key: key.0,
                to: MemberRef::Agent(to.agent_id()),
            },
            GroupValue::Sealed(sealed),
        )
    }

    fn reader(agent: &AgentSecret) -> Reader<'_> {
        Reader {
            agent,
            member: MemberRef::Agent(agent.agent_id()),
        }
    }

    #[test]
    fn test_direct_revelation() {
        let mut src = LogSource::default();
        let (admin, bob, eve) = (AgentSecret::generate(), AgentSecret::generate(), AgentSecret::generate());
        let g = src.new_group(&admin, 1);
        let (k, secret) = new_random_key_secret();
        src.append(
            g,
            &admin,
            2,
            vec![
                GroupOp::role(MemberRef::Agent(bob.agent_id()), Role::Reader),
                reveal(g, (k, &secret), &admin, &bob),
                GroupOp::read_key(k),
            ],
        );

        let state = src.full(g);
        let ledger = KeyLedger::new(&src, reader(&bob), 64);
        assert_eq!(ledger.current_read_key(&state).unwrap(), (k, secret));

        let outsider = KeyLedger::new(&src, reader(&eve), 64);
        assert!(matches!(
            outsider.current_read_key(&state),
            Err(PermsError::NoReadKeyAvailable(_))
        ));
    }

    #[test]
    fn test_everyone_revelation() {
        let mut src = LogSource::default();
        let (admin, anyone) = (AgentSecret::generate(), AgentSecret::generate());
        let g = src.new_group(&admin, 1);
        let (k, secret) = new_random_key_secret();
        src.append(
            g,
            &admin,
            2,
            vec![
                GroupOp::role(MemberRef::Everyone, Role::Reader),
                GroupOp::new(
                    GroupKey::Revelation {
                        key: k,
                        to: MemberRef::Everyone,
                    },
                    GroupValue::Plain(secret.clone()),
                ),
                GroupOp::read_key(k),
            ],
        );

        let ledger = KeyLedger::new(&src, reader(&anyone), 64);
        assert_eq!(ledger.get_read_key(&src.full(g), k).unwrap(), Some(secret));
    }

    #[test]
    fn test_old_key_through_newer_key() {
        let mut src = LogSource::default();
        let (admin, late) = (AgentSecret::generate(), AgentSecret::generate());
        let g = src.new_group(&admin, 1);
        let (k1, s1) = new_random_key_secret();
        let (k2, s2) = new_random_key_secret();
        src.append(
            g,
            &admin,
            2,
            vec![reveal(g, (k1, &s1), &admin, &admin), GroupOp::read_key(k1)],
        );
        src.append(
            g,
            &admin,
            3,
            vec![
                GroupOp::role(MemberRef::Agent(late.agent_id()), Role::Reader),
                reveal(g, (k2, &s2), &admin, &late),
                GroupOp::new(
                    GroupKey::KeyWrap { key: k1, under: k2 },
                    GroupValue::Wrapped(encrypt_key_secret((k1, &s1), (k2, &s2)).unwrap()),
                ),
                GroupOp::read_key(k2),
            ],
        );

        let ledger = KeyLedger::new(&src, reader(&late), 64);
        assert_eq!(ledger.get_read_key(&src.full(g), k1).unwrap(), Some(s1));
    }

    #[test]
    fn test_child_key_through_parent() {
        let mut src = LogSource::default();
        let (admin, member) = (AgentSecret::generate(), AgentSecret::generate());
        let parent = src.new_group(&admin, 1);
        let child = src.new_group(&admin, 1);
        let (pk, ps) = new_random_key_secret();
        let (ck, cs) = new_random_key_secret();

        src.append(
            parent,
            &admin,
            2,
            vec![
                GroupOp::role(MemberRef::Agent(member.agent_id()), Role::Reader),
                reveal(parent, (pk, &ps), &admin, &member),
                GroupOp::read_key(pk),
                GroupOp::new(
                    GroupKey::Child(child),
                    GroupValue::Link(LinkState::Extend(ExtendRole::Inherit)),
                ),
            ],
        );
        src.append(
            child,
            &admin,
            2,
            vec![
                reveal(child, (ck, &cs), &admin, &admin),
                GroupOp::read_key(ck),
                GroupOp::new(
                    GroupKey::Parent(parent),
                    GroupValue::Link(LinkState::Extend(ExtendRole::Inherit)),
                ),
                GroupOp::new(
                    GroupKey::KeyWrap { key: ck, under: pk },
                    GroupValue::Wrapped(encrypt_key_secret((ck, &cs), (pk, &ps)).unwrap()),
                ),
            ],
        );

        let ledger = KeyLedger::new(&src, reader(&member), 64);
        assert_eq!(ledger.current_read_key(&src.full(child)).unwrap(), (ck, cs));
    }

    #[test]
    fn test_cyclic_wraps_terminate() {
        let mut src = LogSource::default();
        let (admin, outsider) = (AgentSecret::generate(), AgentSecret::generate());
        let g = src.new_group(&admin, 1);
        let (k1, s1) = new_random_key_secret();
        let (k2, s2) = new_random_key_secret();
        src.append(
            g,
            &admin,
            2,
            vec![
                GroupOp::new(
                    GroupKey::KeyWrap { key: k1, under: k2 },
                    GroupValue::Wrapped(encrypt_key_secret((k1, &s1), (k2, &s2)).unwrap()),
                ),
                GroupOp::new(
                    GroupKey::KeyWrap { key: k2, under: k1 },
                    GroupValue::Wrapped(encrypt_key_secret((k2, &s2), (k1, &s1)).unwrap()),
                ),
                GroupOp::new(GroupKey::Parent(g), GroupValue::Link(LinkState::Extend(ExtendRole::Inherit))),
                GroupOp::read_key(k1),
            ],
        );

        let ledger = KeyLedger::new(&src, reader(&outsider), 64);
        assert_eq!(ledger.get_read_key(&src.full(g), k1).unwrap(), None);
    }

    #[test]
    fn test_write_key_follows_rotation() {
        let mut src = LogSource::default();
        let (admin, writer) = (AgentSecret::generate(), AgentSecret::generate());
        let g = src.new_group(&admin, 1);
        let (k1, s1) = new_random_key_secret();
        let (k2, s2) = new_random_key_secret();
        let me = MemberRef::Agent(writer.agent_id());
        src.append(
            g,
            &admin,
            2,
            vec![
                GroupOp::role(me, Role::WriteOnly),
                reveal(g, (k1, &s1), &admin, &writer),
                GroupOp::new(GroupKey::WriteKeyFor(me), GroupValue::KeyRef(k1)),
                GroupOp::read_key(k1),
            ],
        );

        let ledger = KeyLedger::new(&src, reader(&writer), 64);
        let write_only = Some(Role::WriteOnly);
        assert_eq!(ledger.write_key(&src.full(g), write_only).unwrap().0, k1);

        src.append(
            g,
            &admin,
            3,
            vec![reveal(g, (k2, &s2), &admin, &writer), GroupOp::read_key(k2)],
        );
        let ledger = KeyLedger::new(&src, reader(&writer), 64);
        let state = src.full(g);
        assert_eq!(state.write_key_for(&me), Some(k1));
        assert_eq!(ledger.write_key(&state, write_only).unwrap().0, k2);
    }

    #[test]
    fn test_write_key_ignored_for_other_roles() {
        let mut src = LogSource::default();
        let (admin, writer) = (AgentSecret::generate(), AgentSecret::generate());
        let g = src.new_group(&admin, 1);
        let (k1, s1) = new_random_key_secret();
        let (k2, s2) = new_random_key_secret();
        let me = MemberRef::Agent(writer.agent_id());
        src.append(
            g,
            &admin,
            2,
            vec![
                GroupOp::role(me, Role::WriteOnly),
                reveal(g, (k1, &s1), &admin, &writer),
                reveal(g, (k2, &s2), &admin, &writer),
                GroupOp::new(GroupKey::WriteKeyFor(me), GroupValue::KeyRef(k1)),
                GroupOp::read_key(k2),
                GroupOp::role(me, Role::Writer),
            ],
        );

        let ledger = KeyLedger::new(&src, reader(&writer), 64);
        let state = src.full(g);
        assert_eq!(ledger.write_key(&state, Some(Role::Writer)).unwrap().0, k2);
        assert_eq!(ledger.write_key(&state, Some(Role::WriteOnly)).unwrap().0, k2);
    }
}
