//! The transaction log of a single CoValue.
//!
//! A CoValue's log is a set of sessions, each an append-only, hash-chained
//! list of signed transactions from one author. Replay order across
//! sessions is the total order `(made_at, session, index)`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::crypto::{Ed25519PublicKey, Keypair};
use crate::error::ValidationError;
use crate::header::CoValueHeader;
use crate::transaction::{SessionId, SignedTransaction, Transaction, TxId};
use crate::types::CoValueId;
use crate::validation::{validate_transaction, validate_transaction_structure, SessionTail};

/// A snapshot bound over a log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogBound {
    /// Every known transaction.
    Full,
    /// Transactions with `made_at <= t`.
    AtTime(i64),
    /// Transactions ordered at or before the given transaction.
    ///
    /// If the transaction is not in the log the bound behaves like `Full`.
    AtTx(TxId),
}

/// One transaction in replay order.
#[derive(Debug, Clone, Copy)]
pub struct LogEntry<'a> {
    pub id: TxId,
    pub tx: &'a Transaction,
}

impl LogEntry<'_> {
    fn order_key(&self) -> (i64, SessionId, u32) {
        (self.tx.made_at, self.id.session, self.id.index)
    }
}

/// Result of ingesting a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestResult {
    /// Transaction was new and extends its session.
    Accepted,
    /// Transaction was already present (idempotent).
    Duplicate,
}

/// Header plus sessions of one CoValue.
#[derive(Debug, Clone)]
pub struct CoValueLog {
    id: CoValueId,
    header: CoValueHeader,
    sessions: BTreeMap<SessionId, Vec<SignedTransaction>>,
}

impl CoValueLog {
    /// An empty log for `header`.
    pub fn new(header: CoValueHeader) -> Self {
        Self {
            id: header.id(),
            header,
            sessions: BTreeMap::new(),
        }
    }

    /// The CoValue id.
    pub fn id(&self) -> &CoValueId {
        &self.id
    }

    /// The CoValue header.
    pub fn header(&self) -> &CoValueHeader {
        &self.header
    }

    /// Length, last hash and last `made_at` of `session`.
    pub fn tail(&self, session: &SessionId) -> SessionTail {
        match self.sessions.get(session).and_then(|txs| txs.last()) {
            Some(last) => SessionTail {
                len: self.sessions[session].len() as u32,
                hash: last.hash,
                made_at: last.tx.made_at,
            },
            None => SessionTail::EMPTY,
        }
    }

    /// Sign and append a local transaction to `session`.
    ///
    /// `made_at` is raised to the session's last timestamp if the local
    /// clock went backwards, so the session stays monotonic.
    pub fn append(&mut self, session: SessionId, mut tx: Transaction, keypair: &Keypair) -> TxId {
        let tail = self.tail(&session);
        tx.made_at = tx.made_at.max(tail.made_at);
        let tx_id = TxId {
            session,
            index: tail.len,
        };
        let signed = tx.sign(&self.id, &tx_id, &tail.hash, keypair);
        self.sessions.entry(session).or_default().push(signed);
        tx_id
    }

    /// Ingest a transaction produced elsewhere.
    ///
    /// With `signer = None` only structure is checked (trusted source).
    pub fn ingest(
        &mut self,
        tx_id: TxId,
        signed: SignedTransaction,
        signer: Option<&Ed25519PublicKey>,
    ) -> Result<IngestResult, ValidationError> {
        if let Some(existing) = self.get(&tx_id) {
            return if existing.hash == signed.hash {
                Ok(IngestResult::Duplicate)
            } else {
                Err(ValidationError::Conflict {
                    session: tx_id.session,
                    index: tx_id.index,
                })
            };
        }

        let tail = self.tail(&tx_id.session);
        match signer {
            Some(signer) => validate_transaction(&self.id, &tx_id, &tail, &signed, signer)?,
            None => validate_transaction_structure(&tx_id, &tail, &signed)?,
        }

        self.sessions.entry(tx_id.session).or_default().push(signed);
        Ok(IngestResult::Accepted)
    }

    /// Look up a transaction by id.
    pub fn get(&self, tx_id: &TxId) -> Option<&SignedTransaction> {
        self.sessions
            .get(&tx_id.session)
            .and_then(|txs| txs.get(tx_id.index as usize))
    }

    /// All transactions in replay order.
    pub fn iterate(&self) -> Vec<LogEntry<'_>> {
        let mut entries: Vec<LogEntry<'_>> = self
            .sessions
            .iter()
            .flat_map(|(session, txs)| {
                txs.iter().enumerate().map(move |(index, signed)| LogEntry {
                    id: TxId {
                        session: *session,
                        index: index as u32,
                    },
                    tx: &signed.tx,
                })
            })
            .collect();
        entries.sort_by_key(|e| e.order_key());
        entries
    }

    /// Transactions in replay order, cut at `bound`.
    pub fn entries(&self, bound: &LogBound) -> Vec<LogEntry<'_>> {
        let mut entries = self.iterate();
        match bound {
            LogBound::Full => {}
            LogBound::AtTime(t) => entries.retain(|e| e.tx.made_at <= *t),
            LogBound::AtTx(target) => {
                if let Some(pos) = entries.iter().position(|e| e.id == *target) {
                    entries.truncate(pos + 1);
                }
            }
        }
        entries
    }

    /// `made_at` of a known transaction.
    pub fn made_at(&self, tx_id: &TxId) -> Option<i64> {
        self.get(tx_id).map(|s| s.tx.made_at)
    }

    /// Number of transactions per session.
    pub fn known_state(&self) -> BTreeMap<SessionId, u32> {
        self.sessions
            .iter()
            .map(|(session, txs)| (*session, txs.len() as u32))
            .collect()
    }

    /// Transactions not covered by `known`, in session order.
    pub fn new_since(&self, known: &BTreeMap<SessionId, u32>) -> Vec<(TxId, SignedTransaction)> {
        let mut out = Vec::new();
        for (session, txs) in &self.sessions {
            let have = known.get(session).copied().unwrap_or(0) as usize;
            for (index, signed) in txs.iter().enumerate().skip(have) {
                out.push((
                    TxId {
                        session: *session,
                        index: index as u32,
                    },
                    signed.clone(),
                ));
            }
        }
        out
    }

    /// Total number of transactions.
    pub fn len(&self) -> usize {
        self.sessions.values().map(Vec::len).sum()
    }

    /// Whether the log has no transactions.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
