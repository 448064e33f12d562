//! Error types for the node.

use coledger_core::{AccountId, CoValueId, CoreError, ValidationError};
use coledger_perms::PermsError;
use thiserror::Error;

/// Errors that can occur during node operations.
#[derive(Debug, Error)]
pub enum NodeError {
    /// Permission error.
    #[error("permission error: {0}")]
    Perms(#[from] PermsError),

    /// Validation error.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Core error.
    #[error("core error: {0}")]
    Core(#[from] CoreError),

    /// CoValue not known to this node.
    #[error("unknown covalue: {0}")]
    UnknownCoValue(CoValueId),

    /// Account header not known to this node, so its agent cannot be resolved.
    #[error("unknown account: {0}")]
    UnknownAccount(AccountId),

    /// The CoValue exists but is not a group or account.
    #[error("not a group: {0}")]
    NotAGroup(CoValueId),

    /// The CoValue exists but is not an owned map.
    #[error("not a map: {0}")]
    NotAMap(CoValueId),

    /// Malformed invite secret.
    #[error("invalid invite secret: {0}")]
    InvalidInvite(String),
}

/// Result type for node operations.
pub type Result<T> = std::result::Result<T, NodeError>;
