//! Agents, accounts and the member references used in role maps.
//!
//! An **agent** is a bare pair of keys: an Ed25519 signer used to author
//! transactions and an X25519 sealer used to receive sealed read keys.
//! An **account** is a CoValue whose header names its agent, so an
//! [`AccountId`] can always be resolved to an [`AgentId`] once the account
//! header is known locally.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::crypto::{Ed25519PublicKey, Keypair, X25519PublicKey, X25519StaticSecret};
use crate::types::CoValueId;

/// Public identity of an agent: its signer and sealer public keys.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AgentId {
    /// Verifies transactions authored by this agent.
    pub signer: Ed25519PublicKey,
    /// Receives sealed key revelations.
    pub sealer: X25519PublicKey,
}

impl fmt::Debug for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AgentId({})", self)
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "sealer_z{}/signer_z{}",
            &self.sealer.to_hex()[..16],
            &self.signer.to_hex()[..16]
        )
    }
}

/// Secret half of an agent.
#[derive(Clone)]
pub struct AgentSecret {
    signer: Keypair,
    sealer: X25519StaticSecret,
}

impl AgentSecret {
    /// Generate a fresh random agent secret.
    pub fn generate() -> Self {
        Self {
            signer: Keypair::generate(),
            sealer: X25519StaticSecret::generate(),
        }
    }

    /// Deterministically derive both keys from a single 32-byte seed.
    ///
    /// Used for invite agents, whose whole identity travels as one secret.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let signer_seed = blake3::derive_key("coledger-agent-v0-signer", seed);
        let sealer_seed = blake3::derive_key("coledger-agent-v0-sealer", seed);
        Self {
            signer: Keypair::from_seed(&signer_seed),
            sealer: X25519StaticSecret::from_bytes(sealer_seed),
        }
    }

    /// The public identity of this agent.
    pub fn agent_id(&self) -> AgentId {
        AgentId {
            signer: self.signer.public_key(),
            sealer: self.sealer.public_key(),
        }
    }

    /// The signing keypair.
    pub fn signer(&self) -> &Keypair {
        &self.signer
    }

    /// The sealing secret.
    pub fn sealer(&self) -> &X25519StaticSecret {
        &self.sealer
    }
}

impl fmt::Debug for AgentSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AgentSecret({})", self.agent_id())
    }
}

/// Identifier of an account: the id of the account's own CoValue.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AccountId(pub CoValueId);

impl AccountId {
    /// The underlying CoValue id.
    pub const fn covalue_id(&self) -> &CoValueId {
        &self.0
    }
}

impl fmt::Debug for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccountId({})", &self.0.to_hex()[..16])
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Who authored a transaction: an account or a bare agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TxAuthor {
    Account(AccountId),
    Agent(AgentId),
}

impl TxAuthor {
    /// The role-map key this author is looked up under.
    pub fn member(&self) -> MemberRef {
        match self {
            TxAuthor::Account(id) => MemberRef::Account(*id),
            TxAuthor::Agent(id) => MemberRef::Agent(*id),
        }
    }
}

impl fmt::Display for TxAuthor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TxAuthor::Account(id) => write!(f, "{}", id),
            TxAuthor::Agent(id) => write!(f, "{}", id),
        }
    }
}

/// A key in a group's role map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MemberRef {
    Account(AccountId),
    Agent(AgentId),
    /// Every account, including ones never named in the group.
    Everyone,
}

impl MemberRef {
    /// Whether this is the `everyone` pseudo-member.
    pub fn is_everyone(&self) -> bool {
        matches!(self, MemberRef::Everyone)
    }

    /// The transaction author this member would sign as, if any.
    pub fn as_author(&self) -> Option<TxAuthor> {
        match self {
            MemberRef::Account(id) => Some(TxAuthor::Account(*id)),
            MemberRef::Agent(id) => Some(TxAuthor::Agent(*id)),
            MemberRef::Everyone => None,
        }
    }
}

impl From<AccountId> for MemberRef {
    fn from(id: AccountId) -> Self {
        MemberRef::Account(id)
    }
}

impl From<AgentId> for MemberRef {
    fn from(id: AgentId) -> Self {
        MemberRef::Agent(id)
    }
}

impl fmt::Display for MemberRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemberRef::Account(id) => write!(f, "{}", id),
            MemberRef::Agent(id) => write!(f, "{}", id),
            MemberRef::Everyone => f.write_str("everyone"),
        }
    }
}
