//! CoValue headers: the immutable part of a CoValue that determines its id.

use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::canonical::canonical_header_bytes;
use crate::crypto::Blake3Hash;
use crate::identity::{AccountId, AgentId, TxAuthor};
use crate::types::CoValueId;

/// How transactions on a CoValue are authorized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Ruleset {
    /// A group. The named author may make itself the first admin.
    Group { initial_admin: TxAuthor },

    /// An account. Its content is a group whose first admin is the account itself.
    Account { agent: AgentId },

    /// A plain value owned by a group (or account) for its whole lifetime.
    OwnedBy { owner: CoValueId },
}

/// The header of a CoValue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoValueHeader {
    /// Authorization rules.
    pub ruleset: Ruleset,

    /// Creation time (Unix milliseconds). Untrusted.
    pub created_at: i64,

    /// Random bytes so that identical headers still get distinct ids.
    pub uniqueness: [u8; 16],
}

impl CoValueHeader {
    fn with_ruleset(ruleset: Ruleset, created_at: i64) -> Self {
        let mut uniqueness = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut uniqueness);
        Self {
            ruleset,
            created_at,
            uniqueness,
        }
    }

    /// Header for a new group administered initially by `initial_admin`.
    pub fn new_group(initial_admin: TxAuthor, created_at: i64) -> Self {
        Self::with_ruleset(Ruleset::Group { initial_admin }, created_at)
    }

    /// Header for a new account controlled by `agent`.
    pub fn new_account(agent: AgentId, created_at: i64) -> Self {
        Self::with_ruleset(Ruleset::Account { agent }, created_at)
    }

    /// Header for a new value owned by `owner`.
    pub fn new_owned(owner: CoValueId, created_at: i64) -> Self {
        Self::with_ruleset(Ruleset::OwnedBy { owner }, created_at)
    }

    /// Compute the CoValue id (Blake3 hash of the canonical header).
    pub fn id(&self) -> CoValueId {
        CoValueId(Blake3Hash::hash(&canonical_header_bytes(self)).0)
    }

    /// Whether the content of this CoValue is a role map + key ledger.
    pub fn is_group(&self) -> bool {
        matches!(self.ruleset, Ruleset::Group { .. } | Ruleset::Account { .. })
    }

    /// The author allowed to bootstrap the first admin entry.
    ///
    /// `id` must be this header's id; accounts administer themselves.
    pub fn initial_admin(&self, id: &CoValueId) -> Option<TxAuthor> {
        match &self.ruleset {
            Ruleset::Group { initial_admin } => Some(*initial_admin),
            Ruleset::Account { .. } => Some(TxAuthor::Account(AccountId(*id))),
            Ruleset::OwnedBy { .. } => None,
        }
    }

    /// The owning group of a plain value.
    pub fn owner(&self) -> Option<&CoValueId> {
        match &self.ruleset {
            Ruleset::OwnedBy { owner } => Some(owner),
            _ => None,
        }
    }

    /// The agent of an account header.
    pub fn account_agent(&self) -> Option<&AgentId> {
        match &self.ruleset {
            Ruleset::Account { agent } => Some(agent),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::AgentSecret;

    #[test]
    fn test_header_id_is_stable() {
        let agent = AgentSecret::generate().agent_id();
        let header = CoValueHeader::new_account(agent, 1000);
        assert_eq!(header.id(), header.id());
        assert_eq!(header.clone().id(), header.id());
    }

    #[test]
    fn test_uniqueness_separates_ids() {
        let agent = AgentSecret::generate().agent_id();
        let a = CoValueHeader::new_group(TxAuthor::Agent(agent), 1000);
        let b = CoValueHeader::new_group(TxAuthor::Agent(agent), 1000);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_account_administers_itself() {
        let agent = AgentSecret::generate().agent_id();
        let header = CoValueHeader::new_account(agent, 1000);
        let id = header.id();
        assert_eq!(header.initial_admin(&id), Some(TxAuthor::Account(AccountId(id))));
        assert!(header.is_group());
        assert_eq!(header.account_agent(), Some(&agent));
    }

    #[test]
    fn test_owned_value_is_not_a_group() {
        let owner = CoValueId::from_bytes([1; 32]);
        let header = CoValueHeader::new_owned(owner, 1000);
        assert!(!header.is_group());
        assert_eq!(header.owner(), Some(&owner));
        assert_eq!(header.initial_admin(&header.id()), None);
    }
}
