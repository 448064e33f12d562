//! Error types for the permissions engine.
//!
//! Local authorship surfaces these synchronously. During replay the same
//! conditions only mark a transaction as inert.

use thiserror::Error;

/// Errors that can occur during permission operations.
#[derive(Debug, Error)]
pub enum PermsError {
    /// The author's resolved role does not allow this entry.
    #[error("insufficient permission: {0}")]
    InsufficientPermission(String),

    /// No resolvable read key to encrypt or decrypt with.
    #[error("no read key available: {0}")]
    NoReadKeyAvailable(String),

    /// Demoting an admin, granting above an invite ceiling, and similar.
    #[error("invalid role transition: {0}")]
    InvalidRoleTransition(String),

    /// Extend-graph traversal went deeper than the configured budget.
    #[error("extend graph traversal exceeded depth {limit}")]
    CycleBudgetExceeded { limit: usize },

    /// The invite has been revoked.
    #[error("invite already consumed or revoked")]
    InviteAlreadyConsumed,

    /// Key and value of a group entry do not belong together.
    #[error("mismatched group entry: {0}")]
    MismatchedEntry(String),

    /// Encryption error.
    #[error("encryption error: {0}")]
    EncryptionError(String),

    /// Decryption error.
    #[error("decryption error: {0}")]
    DecryptionError(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// Core error.
    #[error("core error: {0}")]
    Core(#[from] coledger_core::CoreError),
}

/// Result type for permission operations.
pub type Result<T> = std::result::Result<T, PermsError>;
