//! Owned map CoValues and content views.
//!
//! A map is owned by a group (or account) for its whole life. Writes need
//! admin, writer or writeOnly in the owner; private writes are encrypted
//! under the owner's read key (or the writer's write key) and are only
//! visible to readers who can resolve that key.

use std::rc::Rc;

use serde_json::Value;
use tracing::debug;

use coledger_core::{CoValueHeader, CoValueId, KeyId, LogBound, LogEntry, Privacy, Transaction, TxId};
use coledger_perms::{
    check_owned_tx, replay_owned, EncryptedPayload, GroupState, KeySecret, MapContent, MapOp,
    PermsError, Role,
};

use crate::error::{NodeError, Result};
use crate::node::{now_millis, AccountCredentials, LocalNode};

/// Content of a CoValue as seen by one account.
#[derive(Debug, Clone)]
pub enum CoValueContent {
    Group(Rc<GroupState>),
    Map(MapContent),
}

impl CoValueContent {
    pub fn as_map(&self) -> Option<&MapContent> {
        match self {
            CoValueContent::Map(map) => Some(map),
            CoValueContent::Group(_) => None,
        }
    }

    pub fn as_group(&self) -> Option<&GroupState> {
        match self {
            CoValueContent::Group(state) => Some(state),
            CoValueContent::Map(_) => None,
        }
    }
}

impl LocalNode {
    /// Create an empty map owned by `owner`.
    pub fn create_map(&mut self, owner: &CoValueId) -> Result<CoValueId> {
        self.group_state(owner)?;
        let id = self.insert_log(CoValueHeader::new_owned(*owner, now_millis()));
        debug!(map = %id, %owner, "map created");
        Ok(id)
    }

    /// Set `key` to `value`.
    pub fn map_set(&mut self, map: &CoValueId, key: &str, value: Value, privacy: Privacy) -> Result<TxId> {
        self.map_edit(
            map,
            vec![MapOp::Set {
                key: key.to_string(),
                value,
            }],
            privacy,
        )
    }

    /// Delete `key`.
    pub fn map_delete(&mut self, map: &CoValueId, key: &str, privacy: Privacy) -> Result<TxId> {
        self.map_edit(map, vec![MapOp::Delete { key: key.to_string() }], privacy)
    }

    /// Apply several edits as one transaction.
    pub fn map_edit(&mut self, map: &CoValueId, ops: Vec<MapOp>, privacy: Privacy) -> Result<TxId> {
        let owner = self.owner_of(map)?;
        let owner_state = self.group_state(&owner)?;

        let role = self.graph().role_of(&owner_state, &self.member(), &LogBound::Full)?;
        if !role.is_some_and(Role::can_write) {
            return Err(PermsError::InsufficientPermission(format!(
                "{} cannot write to values owned by {}",
                self.member(),
                owner
            ))
            .into());
        }

        let session = self.session();
        let tail = self.log(map)?.tail(&session);
        let made_at = self.next_made_at().max(tail.made_at);
        let changes = MapOp::encode_all(&ops);
        let tx = match privacy {
            Privacy::Trusting => Transaction::trusting(made_at, changes),
            Privacy::Private => {
                let (key, secret) = self.ledger().write_key(&owner_state, role)?;
                let envelope = EncryptedPayload::seal_changes(&changes, &secret, map)?;
                Transaction::private(made_at, key, envelope.to_bytes())
            }
        };

        let entry = LogEntry {
            id: TxId {
                session,
                index: tail.len,
            },
            tx: &tx,
        };
        check_owned_tx(&self.graph(), &owner, &entry)?;
        self.commit(map, tx)
    }

    /// Current content of a map.
    pub fn map_content(&self, map: &CoValueId) -> Result<MapContent> {
        self.content_at(map, &LogBound::Full)
    }

    /// Content of a map as of `bound`.
    pub fn content_at(&self, map: &CoValueId, bound: &LogBound) -> Result<MapContent> {
        let owner = self.owner_of(map)?;
        let log = self.log(map)?;
        let accepted = replay_owned(&self.graph(), log, bound);

        let owner_state = self.group_state_at(&owner, &LogBound::Full);
        let ledger = self.ledger();
        Ok(MapContent::fold(&accepted, |key, bytes| {
            let state = owner_state.as_deref()?;
            let secret = match ledger.get_read_key(state, key) {
                Ok(secret) => secret?,
                Err(e) => {
                    debug!(%map, %key, error = %e, "key resolution failed");
                    return None;
                }
            };
            match EncryptedPayload::from_bytes(bytes).and_then(|env| env.open_changes(&secret, map)) {
                Ok(plaintext) => Some(plaintext),
                Err(e) => {
                    debug!(%map, %key, error = %e, "cannot open private changes");
                    None
                }
            }
        }))
    }

    /// Content of any CoValue: a group's state or a map's entries.
    pub fn get_current_content(&self, id: &CoValueId) -> Result<CoValueContent> {
        if self.log(id)?.header().is_group() {
            Ok(CoValueContent::Group(self.group_state(id)?))
        } else {
            Ok(CoValueContent::Map(self.map_content(id)?))
        }
    }

    /// Content of `id` as another account would see it from this node's logs.
    pub fn content_in_cloned_node_with_different_account(
        &self,
        id: &CoValueId,
        credentials: &AccountCredentials,
    ) -> Result<CoValueContent> {
        self.clone_with_account(credentials).get_current_content(id)
    }

    /// The current read key of a group, or of a map's owner.
    pub fn get_current_read_key(&self, id: &CoValueId) -> Result<(KeyId, KeySecret)> {
        let group = if self.log(id)?.header().is_group() {
            *id
        } else {
            self.owner_of(id)?
        };
        let state = self.group_state(&group)?;
        Ok(self.ledger().current_read_key(&state)?)
    }

    fn owner_of(&self, map: &CoValueId) -> Result<CoValueId> {
        self.log(map)?
            .header()
            .owner()
            .copied()
            .ok_or(NodeError::NotAMap(*map))
    }
}
