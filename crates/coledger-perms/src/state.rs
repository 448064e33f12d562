//! Group state computation.
//!
//! Group state is the fold of a group's accepted transactions. Entries are
//! last-writer-wins in replay order, except revelations, key wraps and
//! write keys, which keep their first write.

use std::collections::{BTreeMap, BTreeSet};

use coledger_core::{GroupId, KeyId, MemberRef, TxAuthor, TxId};

use crate::entry::{GroupKey, GroupOp, GroupValue, LinkState};
use crate::role::RoleEntry;
use crate::seal::SealedSecret;
use crate::crypto::KeySecret;

/// A stored entry and the transaction that wrote it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryRecord {
    pub value: GroupValue,
    /// Author of the writing transaction.
    pub by: TxAuthor,
    pub tx: TxId,
    pub made_at: i64,
}

/// Resolved content of a group: role map and key ledger.
#[derive(Debug, Clone)]
pub struct GroupState {
    id: GroupId,
    initial_admin: Option<TxAuthor>,
    entries: BTreeMap<GroupKey, EntryRecord>,
    /// Every key id that any accepted entry mentions.
    known_keys: BTreeSet<KeyId>,
    /// Number of accepted transactions.
    accepted: usize,
}

impl GroupState {
    /// Empty state for group `id`.
    pub fn new(id: GroupId, initial_admin: Option<TxAuthor>) -> Self {
        Self {
            id,
            initial_admin,
            entries: BTreeMap::new(),
            known_keys: BTreeSet::new(),
            accepted: 0,
        }
    }

    pub fn id(&self) -> &GroupId {
        &self.id
    }

    /// The author allowed to make itself the first admin.
    pub fn initial_admin(&self) -> Option<&TxAuthor> {
        self.initial_admin.as_ref()
    }

    /// Apply one op. First-write-wins entries ignore later writes.
    pub fn apply(&mut self, op: &GroupOp, by: TxAuthor, tx: TxId, made_at: i64) {
        if op.key.is_first_write_wins() && self.entries.contains_key(&op.key) {
            return;
        }

        match (&op.key, &op.value) {
            (GroupKey::ReadKey, GroupValue::KeyRef(k)) | (GroupKey::WriteKeyFor(_), GroupValue::KeyRef(k)) => {
                self.known_keys.insert(*k);
            }
            (GroupKey::Revelation { key, .. }, _) => {
                self.known_keys.insert(*key);
            }
            (GroupKey::KeyWrap { key, .. }, _) => {
                self.known_keys.insert(*key);
            }
            _ => {}
        }

        self.entries.insert(
            op.key,
            EntryRecord {
                value: op.value.clone(),
                by,
                tx,
                made_at,
            },
        );
    }

    /// Mark one transaction as folded in.
    pub fn record_accepted(&mut self) {
        self.accepted += 1;
    }

    /// Number of accepted transactions.
    pub fn accepted_count(&self) -> usize {
        self.accepted
    }

    /// Look up a raw entry.
    pub fn get(&self, key: &GroupKey) -> Option<&EntryRecord> {
        self.entries.get(key)
    }

    /// All entries in key order.
    pub fn entries(&self) -> impl Iterator<Item = (&GroupKey, &EntryRecord)> {
        self.entries.iter()
    }

    /// The member's own entry in this group's role map.
    pub fn direct_role(&self, member: &MemberRef) -> Option<RoleEntry> {
        match self.entries.get(&GroupKey::Member(*member)) {
            Some(EntryRecord {
                value: GroupValue::Role(entry),
                ..
            }) => Some(*entry),
            _ => None,
        }
    }

    /// Direct members and their entries, `everyone` included.
    pub fn direct_members(&self) -> Vec<(MemberRef, RoleEntry)> {
        self.entries
            .iter()
            .filter_map(|(key, record)| match (key, &record.value) {
                (GroupKey::Member(m), GroupValue::Role(entry)) => Some((*m, *entry)),
                _ => None,
            })
            .collect()
    }

    /// The current read key.
    pub fn read_key(&self) -> Option<KeyId> {
        self.key_ref(&GroupKey::ReadKey)
    }

    /// The key a writeOnly member encrypts with.
    pub fn write_key_for(&self, member: &MemberRef) -> Option<KeyId> {
        self.key_ref(&GroupKey::WriteKeyFor(*member))
    }

    fn key_ref(&self, key: &GroupKey) -> Option<KeyId> {
        match self.entries.get(key) {
            Some(EntryRecord {
                value: GroupValue::KeyRef(k),
                ..
            }) => Some(*k),
            _ => None,
        }
    }

    /// Whether any accepted entry mentions `key`.
    pub fn knows_key(&self, key: &KeyId) -> bool {
        self.known_keys.contains(key)
    }

    /// Sealed revelation of `key` to `member`, with its revealer.
    pub fn sealed_revelation(&self, key: KeyId, member: &MemberRef) -> Option<(&SealedSecret, &TxAuthor)> {
        match self.entries.get(&GroupKey::Revelation { key, to: *member }) {
            Some(EntryRecord {
                value: GroupValue::Sealed(sealed),
                by,
                ..
            }) => Some((sealed, by)),
            _ => None,
        }
    }

    /// Plaintext revelation of `key` to `everyone`.
    pub fn public_revelation(&self, key: KeyId) -> Option<&KeySecret> {
        match self.entries.get(&GroupKey::Revelation {
            key,
            to: MemberRef::Everyone,
        }) {
            Some(EntryRecord {
                value: GroupValue::Plain(secret),
                ..
            }) => Some(secret),
            _ => None,
        }
    }

    /// Wraps of `key`: the wrapping key id and ciphertext.
    pub fn wraps_of(&self, key: KeyId) -> Vec<(KeyId, &[u8])> {
        self.entries
            .iter()
            .filter_map(|(k, record)| match (k, &record.value) {
                (GroupKey::KeyWrap { key: wrapped, under }, GroupValue::Wrapped(bytes)) if *wrapped == key => {
                    Some((*under, bytes.as_slice()))
                }
                _ => None,
            })
            .collect()
    }

    /// Whether a wrap of `key` under `under` exists.
    pub fn has_wrap(&self, key: KeyId, under: KeyId) -> bool {
        self.entries.contains_key(&GroupKey::KeyWrap { key, under })
    }

    /// Parent edges (groups this group extends).
    pub fn parents(&self) -> Vec<(GroupId, LinkState)> {
        self.links(|k| match k {
            GroupKey::Parent(id) => Some(*id),
            _ => None,
        })
    }

    /// Child edges (groups extending this group).
    pub fn children(&self) -> Vec<(GroupId, LinkState)> {
        self.links(|k| match k {
            GroupKey::Child(id) => Some(*id),
            _ => None,
        })
    }

    fn links(&self, select: impl Fn(&GroupKey) -> Option<GroupId>) -> Vec<(GroupId, LinkState)> {
        self.entries
            .iter()
            .filter_map(|(key, record)| match (select(key), &record.value) {
                (Some(id), GroupValue::Link(link)) => Some((id, *link)),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::role::Role;
    use coledger_core::{AgentSecret, CoValueId, SessionId};

    fn author() -> (TxAuthor, TxId) {
        let author = TxAuthor::Agent(AgentSecret::generate().agent_id());
        let tx = TxId {
            session: SessionId::new(author),
            index: 0,
        };
        (author, tx)
    }

    #[test]
    fn test_roles_are_last_writer_wins() {
        let (by, tx) = author();
        let mut state = GroupState::new(CoValueId::from_bytes([1; 32]), Some(by));
        let member = MemberRef::Everyone;

        state.apply(&GroupOp::role(member, Role::Reader), by, tx, 1);
        state.apply(&GroupOp::role(member, Role::Writer), by, tx, 2);

        assert_eq!(state.direct_role(&member), Some(RoleEntry::Role(Role::Writer)));
    }

    #[test]
    fn test_revelations_are_first_write_wins() {
        let (by, tx) = author();
        let mut state = GroupState::new(CoValueId::from_bytes([1; 32]), Some(by));
        let key = KeyId::generate();
        let first = KeySecret::generate();

        let reveal = |secret: &KeySecret| {
            GroupOp::new(
                GroupKey::Revelation {
                    key,
                    to: MemberRef::Everyone,
                },
                GroupValue::Plain(secret.clone()),
            )
        };
        state.apply(&reveal(&first), by, tx, 1);
        state.apply(&reveal(&KeySecret::generate()), by, tx, 2);

        assert_eq!(state.public_revelation(key), Some(&first));
        assert!(state.knows_key(&key));
    }

    #[test]
    fn test_links_and_wraps() {
        let (by, tx) = author();
        let mut state = GroupState::new(CoValueId::from_bytes([1; 32]), Some(by));
        let parent = CoValueId::from_bytes([2; 32]);
        let child = CoValueId::from_bytes([3; 32]);
        let (k1, k2) = (KeyId::generate(), KeyId::generate());

        state.apply(
            &GroupOp::new(GroupKey::Parent(parent), GroupValue::Link(LinkState::Revoked)),
            by,
            tx,
            1,
        );
        state.apply(
            &GroupOp::new(
                GroupKey::Child(child),
                GroupValue::Link(LinkState::Extend(Default::default())),
            ),
            by,
            tx,
            1,
        );
        state.apply(
            &GroupOp::new(GroupKey::KeyWrap { key: k1, under: k2 }, GroupValue::Wrapped(vec![9])),
            by,
            tx,
            1,
        );

        assert_eq!(state.parents(), vec![(parent, LinkState::Revoked)]);
        assert_eq!(state.children().len(), 1);
        assert_eq!(state.wraps_of(k1), vec![(k2, &[9u8][..])]);
        assert!(state.wraps_of(k2).is_empty());
        assert!(state.has_wrap(k1, k2));
    }
}
