//! The local node: an account identity plus every CoValue log it knows.
//!
//! All derived state (group role maps, key ledgers, map content) is a pure
//! replay of the logs. Replayed group states are cached per
//! `(group, bound)` and the cache is dropped whenever a log changes.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::rc::Rc;

use tracing::{debug, warn};

use coledger_core::{
    AccountId, AgentId, AgentSecret, CoValueHeader, CoValueId, CoValueLog, GroupId, IngestResult,
    KeyId, Keypair, LogBound, LogEntry, MemberRef, SessionId, Transaction, TxAuthor, TxId,
};
use coledger_perms::{
    apply_group_tx, replay_group, GroupKey, GroupOp, GroupSource, GroupState, GroupValue,
    KeyLedger, KeySecret, Reader, RoleGraph, SealedSecret,
};

use crate::error::{NodeError, Result};

/// Configuration for a node.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Depth cap for extend-graph traversal: role resolution, key
    /// resolution and nested group replay.
    pub max_extend_depth: usize,
    /// Whether to verify signatures and hash chains of imported transactions.
    pub verify_on_import: bool,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            max_extend_depth: 64,
            verify_on_import: true,
        }
    }
}

/// Everything needed to act as an account.
#[derive(Debug, Clone)]
pub struct AccountCredentials {
    pub account: AccountId,
    pub agent: AgentSecret,
}

/// Outcome of copying logs from another node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    /// CoValues touched.
    pub covalues: usize,
    /// New transactions stored.
    pub accepted: usize,
    /// Transactions already present.
    pub duplicates: usize,
    /// Transactions dropped for failing verification.
    pub rejected: usize,
}

/// A node acting as one account.
pub struct LocalNode {
    config: NodeConfig,
    account: AccountId,
    agent: AgentSecret,
    /// Session this node authors account transactions in.
    session: SessionId,
    logs: BTreeMap<CoValueId, CoValueLog>,
    /// Highest `made_at` authored or imported. Local transactions are
    /// stamped after it so they replay after everything they were checked
    /// against.
    last_made_at: i64,
    group_cache: RefCell<HashMap<(GroupId, LogBound), Rc<GroupState>>>,
    /// Groups currently being replayed, outermost first.
    replaying: RefCell<Vec<GroupId>>,
    /// Groups a nested replay found in progress. A state computed under a
    /// cut is only cached once the cut group itself finishes.
    cuts: RefCell<Vec<GroupId>>,
}

impl LocalNode {
    /// Create a node with a brand-new account.
    pub fn create_account(config: NodeConfig) -> Result<Self> {
        let agent = AgentSecret::generate();
        let header = CoValueHeader::new_account(agent.agent_id(), now_millis());
        let account = AccountId(header.id());

        let mut node = Self::from_credentials(config, AccountCredentials { account, agent });
        node.logs.insert(*account.covalue_id(), CoValueLog::new(header));
        node.bootstrap_group(*account.covalue_id())?;

        debug!(%account, "account created");
        Ok(node)
    }

    /// A node for an existing account with no CoValues loaded yet.
    pub fn from_credentials(config: NodeConfig, credentials: AccountCredentials) -> Self {
        Self {
            config,
            account: credentials.account,
            session: SessionId::new(TxAuthor::Account(credentials.account)),
            agent: credentials.agent,
            logs: BTreeMap::new(),
            last_made_at: i64::MIN,
            group_cache: RefCell::new(HashMap::new()),
            replaying: RefCell::new(Vec::new()),
            cuts: RefCell::new(Vec::new()),
        }
    }

    /// A copy of this node's logs, acting as a different account.
    ///
    /// The copy is independent: nothing it authors reaches this node.
    pub fn clone_with_account(&self, credentials: &AccountCredentials) -> LocalNode {
        let mut node = Self::from_credentials(self.config.clone(), credentials.clone());
        node.logs = self.logs.clone();
        node.last_made_at = self.last_made_at;
        node
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn account_id(&self) -> AccountId {
        self.account
    }

    pub fn agent_id(&self) -> AgentId {
        self.agent.agent_id()
    }

    /// This account as a role-map key.
    pub fn member(&self) -> MemberRef {
        MemberRef::Account(self.account)
    }

    pub fn credentials(&self) -> AccountCredentials {
        AccountCredentials {
            account: self.account,
            agent: self.agent.clone(),
        }
    }

    /// Ids of every CoValue this node holds.
    pub fn covalue_ids(&self) -> impl Iterator<Item = &CoValueId> {
        self.logs.keys()
    }

    /// The log of a known CoValue.
    pub fn log(&self, id: &CoValueId) -> Result<&CoValueLog> {
        self.logs.get(id).ok_or(NodeError::UnknownCoValue(*id))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Resolution
    // ─────────────────────────────────────────────────────────────────────────

    /// Role resolution over this node's groups.
    pub fn graph(&self) -> RoleGraph<'_, Self> {
        RoleGraph::new(self, self.config.max_extend_depth)
    }

    /// Key resolution as this node's account.
    pub fn ledger(&self) -> KeyLedger<'_, Self> {
        self.ledger_as(Reader {
            agent: &self.agent,
            member: self.member(),
        })
    }

    pub(crate) fn ledger_as<'a>(&'a self, reader: Reader<'a>) -> KeyLedger<'a, Self> {
        KeyLedger::new(self, reader, self.config.max_extend_depth)
    }

    /// Current state of a group.
    pub fn group_state(&self, id: &GroupId) -> Result<Rc<GroupState>> {
        if !self.log(id)?.header().is_group() {
            return Err(NodeError::NotAGroup(*id));
        }
        self.group_state_at(id, &LogBound::Full)
            .ok_or(NodeError::UnknownCoValue(*id))
    }

    /// State of a group folded up to `bound`.
    ///
    /// `None` if the group is unknown, is not a group, is already being
    /// replayed further up the stack, or nesting exceeds the depth cap.
    pub fn group_state_at(&self, id: &GroupId, bound: &LogBound) -> Option<Rc<GroupState>> {
        let slot = (*id, *bound);
        if let Some(state) = self.group_cache.borrow().get(&slot) {
            return Some(Rc::clone(state));
        }
        let log = self.logs.get(id).filter(|log| log.header().is_group())?;

        if self.replaying.borrow().contains(id) {
            self.cuts.borrow_mut().push(*id);
            return None;
        }
        if self.replaying.borrow().len() >= self.config.max_extend_depth {
            warn!(group = %id, limit = self.config.max_extend_depth, "nested group replay exceeded depth budget");
            self.cuts.borrow_mut().push(*id);
            return None;
        }

        let cuts_before = self.cuts.borrow().len();
        self.replaying.borrow_mut().push(*id);
        let state = Rc::new(replay_group(&self.graph(), log, bound));
        self.replaying.borrow_mut().pop();

        let mut cuts = self.cuts.borrow_mut();
        let outer: Vec<GroupId> = cuts.drain(cuts_before..).filter(|c| c != id).collect();
        let complete = outer.is_empty();
        cuts.extend(outer);
        if self.replaying.borrow().is_empty() {
            cuts.clear();
        }
        drop(cuts);

        if complete {
            self.group_cache.borrow_mut().insert(slot, Rc::clone(&state));
        }
        Some(state)
    }

    fn clear_caches(&self) {
        self.group_cache.borrow_mut().clear();
    }

    /// Build a revelation of `key` to `to`, sealed from `from`.
    pub(crate) fn reveal(
        &self,
        group: &GroupId,
        key: KeyId,
        secret: &KeySecret,
        to: MemberRef,
        from: &AgentSecret,
    ) -> Result<GroupOp> {
        let value = match to {
            MemberRef::Everyone => GroupValue::Plain(secret.clone()),
            MemberRef::Account(account) => {
                let agent = if account == self.account {
                    self.agent.agent_id()
                } else {
                    self.agent_of(&TxAuthor::Account(account))
                        .ok_or(NodeError::UnknownAccount(account))?
                };
                GroupValue::Sealed(SealedSecret::seal(secret, group, key, from.sealer(), &agent.sealer)?)
            }
            MemberRef::Agent(agent) => {
                GroupValue::Sealed(SealedSecret::seal(secret, group, key, from.sealer(), &agent.sealer)?)
            }
        };
        Ok(GroupOp::new(GroupKey::Revelation { key, to }, value))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Authoring
    // ─────────────────────────────────────────────────────────────────────────

    /// Timestamp for the next local transaction.
    pub(crate) fn next_made_at(&self) -> i64 {
        now_millis().max(self.last_made_at.saturating_add(1))
    }

    /// Build a group transaction in `session` and check it exactly as replay
    /// would, against the group's current state.
    pub(crate) fn prepare_group_tx(
        &self,
        group: &GroupId,
        session: SessionId,
        ops: &[GroupOp],
    ) -> Result<Transaction> {
        let state = self.group_state(group)?;
        let tail = self.log(group)?.tail(&session);
        let tx = Transaction::trusting(
            self.next_made_at().max(tail.made_at),
            GroupOp::encode_all(ops),
        );
        let entry = LogEntry {
            id: TxId {
                session,
                index: tail.len,
            },
            tx: &tx,
        };
        apply_group_tx(&self.graph(), &state, &entry)?;
        Ok(tx)
    }

    /// Check and append `ops` as one transaction by this account.
    pub(crate) fn author_group_ops(&mut self, group: GroupId, ops: Vec<GroupOp>) -> Result<TxId> {
        let tx = self.prepare_group_tx(&group, self.session, &ops)?;
        self.commit(&group, tx)
    }

    /// Append a checked transaction in this account's session.
    pub(crate) fn commit(&mut self, id: &CoValueId, tx: Transaction) -> Result<TxId> {
        let tx_id = append_signed(&mut self.logs, id, self.session, tx, self.agent.signer())?;
        self.after_commit(id, &tx_id);
        Ok(tx_id)
    }

    /// Append a checked transaction in another agent's session.
    pub(crate) fn commit_as(
        &mut self,
        id: &CoValueId,
        session: SessionId,
        agent: &AgentSecret,
        tx: Transaction,
    ) -> Result<TxId> {
        let tx_id = append_signed(&mut self.logs, id, session, tx, agent.signer())?;
        self.after_commit(id, &tx_id);
        Ok(tx_id)
    }

    fn after_commit(&mut self, id: &CoValueId, tx_id: &TxId) {
        if let Some(made_at) = self.logs.get(id).and_then(|log| log.made_at(tx_id)) {
            self.last_made_at = self.last_made_at.max(made_at);
        }
        self.clear_caches();
    }

    pub(crate) fn insert_log(&mut self, header: CoValueHeader) -> CoValueId {
        let log = CoValueLog::new(header);
        let id = *log.id();
        self.logs.insert(id, log);
        id
    }

    pub(crate) fn session(&self) -> SessionId {
        self.session
    }

    pub(crate) fn agent(&self) -> &AgentSecret {
        &self.agent
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Import
    // ─────────────────────────────────────────────────────────────────────────

    /// Copy one CoValue, and the accounts that authored it, from `other`.
    pub fn import_from(&mut self, other: &LocalNode, id: &CoValueId) -> Result<ImportReport> {
        let remote = other.log(id)?;
        let mut report = ImportReport::default();

        for account in authoring_accounts(remote) {
            if account.covalue_id() == id {
                continue;
            }
            if let Some(account_log) = other.logs.get(account.covalue_id()) {
                self.import_log(account_log, &mut report);
            }
        }
        self.import_log(remote, &mut report);

        self.clear_caches();
        debug!(covalue = %id, ?report, "imported");
        Ok(report)
    }

    /// Copy every CoValue `other` holds, accounts first.
    pub fn import_all_from(&mut self, other: &LocalNode) -> ImportReport {
        let mut report = ImportReport::default();
        let (accounts, rest): (Vec<&CoValueLog>, Vec<&CoValueLog>) = other
            .logs
            .values()
            .partition(|log| log.header().account_agent().is_some());

        for log in accounts.into_iter().chain(rest) {
            self.import_log(log, &mut report);
        }

        self.clear_caches();
        debug!(?report, "imported all");
        report
    }

    fn import_log(&mut self, remote: &CoValueLog, report: &mut ImportReport) {
        let id = *remote.id();
        let known = match self.logs.get(&id) {
            Some(local) => local.known_state(),
            None => {
                self.logs.insert(id, CoValueLog::new(remote.header().clone()));
                BTreeMap::new()
            }
        };
        report.covalues += 1;

        for (tx_id, signed) in remote.new_since(&known) {
            let signer = if self.config.verify_on_import {
                match self.agent_of(&tx_id.session.author) {
                    Some(agent) => Some(agent.signer),
                    None => {
                        warn!(covalue = %id, session = %tx_id.session, "dropping transaction by unknown author");
                        report.rejected += 1;
                        continue;
                    }
                }
            } else {
                None
            };

            let made_at = signed.tx.made_at;
            let Some(local) = self.logs.get_mut(&id) else {
                continue;
            };
            match local.ingest(tx_id, signed, signer.as_ref()) {
                Ok(IngestResult::Accepted) => {
                    report.accepted += 1;
                    self.last_made_at = self.last_made_at.max(made_at);
                }
                Ok(IngestResult::Duplicate) => report.duplicates += 1,
                Err(e) => {
                    warn!(covalue = %id, session = %tx_id.session, index = tx_id.index, error = %e, "dropping invalid transaction");
                    report.rejected += 1;
                }
            }
        }
    }
}

impl GroupSource for LocalNode {
    fn group_state(&self, id: &GroupId, bound: &LogBound) -> Option<Rc<GroupState>> {
        self.group_state_at(id, bound)
    }

    fn agent_of(&self, author: &TxAuthor) -> Option<AgentId> {
        match author {
            TxAuthor::Agent(agent) => Some(*agent),
            TxAuthor::Account(account) => self
                .logs
                .get(account.covalue_id())?
                .header()
                .account_agent()
                .copied(),
        }
    }
}

fn append_signed(
    logs: &mut BTreeMap<CoValueId, CoValueLog>,
    id: &CoValueId,
    session: SessionId,
    tx: Transaction,
    signer: &Keypair,
) -> Result<TxId> {
    let log = logs.get_mut(id).ok_or(NodeError::UnknownCoValue(*id))?;
    Ok(log.append(session, tx, signer))
}

fn authoring_accounts(log: &CoValueLog) -> BTreeSet<AccountId> {
    log.known_state()
        .keys()
        .filter_map(|session| match session.author {
            TxAuthor::Account(account) => Some(account),
            TxAuthor::Agent(_) => None,
        })
        .collect()
}

/// Get current time in milliseconds.
pub(crate) fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use coledger_perms::{ExtendRole, Role};

    #[test]
    fn test_account_bootstraps_itself() {
        let node = LocalNode::create_account(NodeConfig::default()).unwrap();
        let account = *node.account_id().covalue_id();

        let state = node.group_state(&account).unwrap();
        assert_eq!(state.accepted_count(), 1);
        assert_eq!(
            node.graph().role_of(&state, &node.member(), &LogBound::Full).unwrap(),
            Some(Role::Admin)
        );
        assert!(node.ledger().current_read_key(&state).is_ok());
    }

    #[test]
    fn test_import_requires_known_author() {
        let alice = LocalNode::create_account(NodeConfig::default()).unwrap();
        let mut bob = LocalNode::create_account(NodeConfig::default()).unwrap();
        let account = *alice.account_id().covalue_id();

        let report = bob.import_from(&alice, &account).unwrap();
        assert_eq!(report.accepted, 1);
        assert_eq!(report.rejected, 0);

        let again = bob.import_from(&alice, &account).unwrap();
        assert_eq!(again.accepted, 0);
        assert_eq!(bob.log(&account).unwrap().len(), 1);
    }

    #[test]
    fn test_cyclic_groups_replay_and_cache() {
        let mut node = LocalNode::create_account(NodeConfig::default()).unwrap();
        let a = node.create_group().unwrap().id();
        let b = node.create_group().unwrap().id();
        node.group(&a).unwrap().extend_with(&b, ExtendRole::Inherit).unwrap();
        node.group(&b).unwrap().extend_with(&a, ExtendRole::Inherit).unwrap();

        let first = node.group_state(&a).unwrap();
        let second = node.group_state(&a).unwrap();
        assert!(Rc::ptr_eq(&first, &second));
        assert!(node.cuts.borrow().is_empty());
        assert!(node.replaying.borrow().is_empty());
    }

    #[test]
    fn test_local_timestamps_increase() {
        let mut node = LocalNode::create_account(NodeConfig::default()).unwrap();
        let g = node.create_group().unwrap().id();
        let before = node.last_made_at;
        node.group(&g).unwrap().rotate_read_key().unwrap();
        assert!(node.last_made_at > before);
    }
}
