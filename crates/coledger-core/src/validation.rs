//! Transaction validation: signature, hash chain and per-session clock checks.

use crate::canonical::signed_message;
use crate::crypto::{Blake3Hash, Ed25519PublicKey};
use crate::error::ValidationError;
use crate::transaction::{SignedTransaction, TxId};
use crate::types::CoValueId;

/// The tail of a session that a new transaction must chain onto.
#[derive(Debug, Clone, Copy)]
pub struct SessionTail {
    /// Number of transactions already in the session.
    pub len: u32,
    /// Hash of the last transaction (ZERO for an empty session).
    pub hash: Blake3Hash,
    /// `made_at` of the last transaction.
    pub made_at: i64,
}

impl SessionTail {
    /// Tail of an empty session.
    pub const EMPTY: Self = Self {
        len: 0,
        hash: Blake3Hash::ZERO,
        made_at: i64::MIN,
    };
}

/// Validate a transaction arriving at `tx_id` in `covalue`.
///
/// This performs:
/// - Index contiguity against the session tail
/// - Clock monotonicity within the session
/// - Hash chain verification
/// - Signature verification against the session author's signer
pub fn validate_transaction(
    covalue: &CoValueId,
    tx_id: &TxId,
    tail: &SessionTail,
    signed: &SignedTransaction,
    signer: &Ed25519PublicKey,
) -> Result<(), ValidationError> {
    validate_transaction_structure(tx_id, tail, signed)?;

    let message = signed_message(covalue, tx_id, &tail.hash, &signed.tx);
    if Blake3Hash::hash(&message) != signed.hash {
        return Err(ValidationError::SignatureFailed);
    }

    signer
        .verify(&message, &signed.signature)
        .map_err(|_| ValidationError::SignatureFailed)
}

/// Validate position and clock without signature verification.
///
/// Useful when the transaction comes from trusted local storage.
pub fn validate_transaction_structure(
    tx_id: &TxId,
    tail: &SessionTail,
    signed: &SignedTransaction,
) -> Result<(), ValidationError> {
    if tx_id.index != tail.len {
        return Err(ValidationError::InvalidIndex {
            session: tx_id.session,
            expected: tail.len,
            got: tx_id.index,
        });
    }

    if signed.tx.made_at < tail.made_at {
        return Err(ValidationError::ClockRegression {
            session: tx_id.session,
            previous: tail.made_at,
            got: signed.tx.made_at,
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Ed25519Signature;
    use crate::identity::{AgentSecret, TxAuthor};
    use crate::transaction::{SessionId, Transaction};

    fn setup() -> (AgentSecret, CoValueId, TxId) {
        let agent = AgentSecret::from_seed(&[0x42; 32]);
        let session = SessionId::new(TxAuthor::Agent(agent.agent_id()));
        (agent, CoValueId::from_bytes([1; 32]), TxId { session, index: 0 })
    }

    #[test]
    fn test_valid_first_transaction() {
        let (agent, covalue, tx_id) = setup();
        let signed = Transaction::trusting(1000, b"x".to_vec()).sign(
            &covalue,
            &tx_id,
            &Blake3Hash::ZERO,
            agent.signer(),
        );

        let signer = agent.agent_id().signer;
        assert!(validate_transaction(&covalue, &tx_id, &SessionTail::EMPTY, &signed, &signer).is_ok());
    }

    #[test]
    fn test_tampered_signature() {
        let (agent, covalue, tx_id) = setup();
        let mut signed = Transaction::trusting(1000, b"x".to_vec()).sign(
            &covalue,
            &tx_id,
            &Blake3Hash::ZERO,
            agent.signer(),
        );
        signed.signature = Ed25519Signature::from_bytes([0xff; 64]);

        let signer = agent.agent_id().signer;
        let result = validate_transaction(&covalue, &tx_id, &SessionTail::EMPTY, &signed, &signer);
        assert!(matches!(result, Err(ValidationError::SignatureFailed)));
    }

    #[test]
    fn test_wrong_signer() {
        let (agent, covalue, tx_id) = setup();
        let signed = Transaction::trusting(1000, b"x".to_vec()).sign(
            &covalue,
            &tx_id,
            &Blake3Hash::ZERO,
            agent.signer(),
        );

        let other = AgentSecret::generate().agent_id().signer;
        let result = validate_transaction(&covalue, &tx_id, &SessionTail::EMPTY, &signed, &other);
        assert!(matches!(result, Err(ValidationError::SignatureFailed)));
    }

    #[test]
    fn test_index_gap() {
        let (agent, covalue, mut tx_id) = setup();
        tx_id.index = 2;
        let signed = Transaction::trusting(1000, b"x".to_vec()).sign(
            &covalue,
            &tx_id,
            &Blake3Hash::ZERO,
            agent.signer(),
        );

        let result = validate_transaction_structure(&tx_id, &SessionTail::EMPTY, &signed);
        assert!(matches!(
            result,
            Err(ValidationError::InvalidIndex {
                expected: 0,
                got: 2,
                ..
            })
        ));
    }

    #[test]
    fn test_clock_regression() {
        let (agent, covalue, mut tx_id) = setup();
        tx_id.index = 1;
        let tail = SessionTail {
            len: 1,
            hash: Blake3Hash::hash(b"prev"),
            made_at: 2000,
        };
        let signed = Transaction::trusting(1000, b"x".to_vec()).sign(
            &covalue,
            &tx_id,
            &tail.hash,
            agent.signer(),
        );

        let result = validate_transaction_structure(&tx_id, &tail, &signed);
        assert!(matches!(result, Err(ValidationError::ClockRegression { .. })));
    }
}
