//! Error types for coledger core.

use thiserror::Error;

use crate::transaction::SessionId;

/// Core errors that can occur on primitive operations.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("encoding error: {0}")]
    EncodingError(String),

    #[error("decoding error: {0}")]
    DecodingError(String),
}

/// Validation errors for transactions arriving in a session log.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("signature verification failed")]
    SignatureFailed,

    #[error("invalid index in session {session}: expected {expected}, got {got}")]
    InvalidIndex {
        session: SessionId,
        expected: u32,
        got: u32,
    },

    #[error("conflicting transaction at index {index} of session {session}")]
    Conflict { session: SessionId, index: u32 },

    #[error("made_at went backwards in session {session}: {previous} > {got}")]
    ClockRegression {
        session: SessionId,
        previous: i64,
        got: i64,
    },

    #[error("author of session {0} is unknown")]
    UnknownAuthor(SessionId),

    #[error("header does not match CoValue id")]
    HeaderMismatch,
}

impl From<CoreError> for ValidationError {
    fn from(_: CoreError) -> Self {
        ValidationError::SignatureFailed
    }
}
