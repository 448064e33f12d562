//! In-memory group sources for unit tests.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use coledger_core::{
    AgentId, AgentSecret, CoValueHeader, CoValueId, CoValueLog, GroupId, KeyId, LogBound,
    MemberRef, SessionId, Transaction, TxAuthor, TxId,
};

use crate::entry::{GroupKey, GroupOp, GroupValue, LinkState};
use crate::role::ExtendRole;
use crate::role_graph::{GroupSource, RoleGraph};
use crate::state::GroupState;
use crate::validator::replay_group;

pub(crate) fn agent_author() -> (TxAuthor, MemberRef) {
    let author = TxAuthor::Agent(AgentSecret::generate().agent_id());
    (author, author.member())
}

/// Hand-built group states, unbounded by time.
#[derive(Default)]
pub(crate) struct MemorySource {
    groups: HashMap<GroupId, GroupState>,
}

impl MemorySource {
    pub fn set(&mut self, group: GroupId, op: GroupOp) {
        let (by, _) = agent_author();
        let tx = TxId {
            session: SessionId::new(by),
            index: 0,
        };
        self.groups
            .entry(group)
            .or_insert_with(|| GroupState::new(group, None))
            .apply(&op, by, tx, 0);
    }

    pub fn link(&mut self, child: GroupId, parent: GroupId, mapping: ExtendRole) {
        self.set(
            child,
            GroupOp::new(GroupKey::Parent(parent), GroupValue::Link(LinkState::Extend(mapping))),
        );
        self.set(
            parent,
            GroupOp::new(GroupKey::Child(child), GroupValue::Link(LinkState::Extend(mapping))),
        );
    }

    pub fn state(&self, group: GroupId) -> Rc<GroupState> {
        Rc::new(
            self.groups
                .get(&group)
                .cloned()
                .unwrap_or_else(|| GroupState::new(group, None)),
        )
    }
}

impl GroupSource for MemorySource {
    fn group_state(&self, id: &GroupId, _bound: &LogBound) -> Option<Rc<GroupState>> {
        self.groups.get(id).map(|s| Rc::new(s.clone()))
    }

    fn agent_of(&self, author: &TxAuthor) -> Option<AgentId> {
        match author {
            TxAuthor::Agent(agent) => Some(*agent),
            TxAuthor::Account(_) => None,
        }
    }
}

/// Real session logs, replayed on every lookup.
#[derive(Default)]
pub(crate) struct LogSource {
    pub logs: HashMap<CoValueId, CoValueLog>,
    sessions: HashMap<TxAuthor, SessionId>,
    replaying: RefCell<Vec<CoValueId>>,
}

impl LogSource {
    /// A group whose first admin is `admin`, already bootstrapped.
    pub fn new_group(&mut self, admin: &AgentSecret, made_at: i64) -> GroupId {
        let author = TxAuthor::Agent(admin.agent_id());
        let header = CoValueHeader::new_group(author, made_at);
        let id = header.id();
        self.logs.insert(id, CoValueLog::new(header));
        self.append(id, admin, made_at, vec![GroupOp::role(author.member(), crate::role::Role::Admin)]);
        id
    }

    /// A value owned by `owner`.
    pub fn new_owned(&mut self, owner: CoValueId, made_at: i64) -> CoValueId {
        let header = CoValueHeader::new_owned(owner, made_at);
        let id = header.id();
        self.logs.insert(id, CoValueLog::new(header));
        id
    }

    fn session(&mut self, author: TxAuthor) -> SessionId {
        *self
            .sessions
            .entry(author)
            .or_insert_with(|| SessionId::new(author))
    }

    pub fn append(&mut self, id: CoValueId, agent: &AgentSecret, made_at: i64, ops: Vec<GroupOp>) -> TxId {
        let tx = Transaction::trusting(made_at, GroupOp::encode_all(&ops));
        self.append_tx(id, agent, tx)
    }

    pub fn append_raw(&mut self, id: CoValueId, agent: &AgentSecret, made_at: i64, changes: Vec<u8>) -> TxId {
        self.append_tx(id, agent, Transaction::trusting(made_at, changes))
    }

    pub fn append_private(
        &mut self,
        id: CoValueId,
        agent: &AgentSecret,
        made_at: i64,
        key: KeyId,
        encrypted: Vec<u8>,
    ) -> TxId {
        self.append_tx(id, agent, Transaction::private(made_at, key, encrypted))
    }

    fn append_tx(&mut self, id: CoValueId, agent: &AgentSecret, tx: Transaction) -> TxId {
        let session = self.session(TxAuthor::Agent(agent.agent_id()));
        self.logs
            .get_mut(&id)
            .expect("unknown test covalue")
            .append(session, tx, agent.signer())
    }

    pub fn full(&self, id: GroupId) -> Rc<GroupState> {
        self.group_state(&id, &LogBound::Full).expect("unknown test group")
    }
}

impl GroupSource for LogSource {
    fn group_state(&self, id: &GroupId, bound: &LogBound) -> Option<Rc<GroupState>> {
        let log = self.logs.get(id)?;
        if !log.header().is_group() || self.replaying.borrow().contains(id) {
            return None;
        }
        self.replaying.borrow_mut().push(*id);
        let state = replay_group(&RoleGraph::new(self, 64), log, bound);
        self.replaying.borrow_mut().pop();
        Some(Rc::new(state))
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
