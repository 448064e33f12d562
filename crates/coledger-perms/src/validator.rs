//! Replay of CoValue logs into validated state.
//!
//! Every transaction is checked against the author's role at the
//! transaction's own time. Rejected transactions are skipped and logged;
//! they never fail the replay.

use tracing::{debug, warn};

use coledger_core::{CoValueId, CoValueLog, LogBound, LogEntry, TxAuthor, TxId, TxPayload};

use crate::entry::GroupOp;
use crate::error::{PermsError, Result};
use crate::role_graph::{GroupSource, RoleGraph};
use crate::state::GroupState;

/// Fold a group's log up to `bound`.
pub fn replay_group<S: GroupSource + ?Sized>(
    graph: &RoleGraph<'_, S>,
    log: &CoValueLog,
    bound: &LogBound,
) -> GroupState {
    let id = *log.id();
    let mut state = GroupState::new(id, log.header().initial_admin(&id));

    for entry in log.entries(bound) {
        match apply_group_tx(graph, &state, &entry) {
            Ok(next) => state = next,
            Err(e) => log_rejection(&id, &entry.id, &e),
        }
    }

    state
}

/// Check one group transaction against `state` and return the state after it.
///
/// Ops are checked in order against the state produced by the ones before
/// them; any failure voids the whole transaction.
pub fn apply_group_tx<S: GroupSource + ?Sized>(
    graph: &RoleGraph<'_, S>,
    state: &GroupState,
    entry: &LogEntry<'_>,
) -> Result<GroupState> {
    let TxPayload::Trusting { changes } = &entry.tx.payload else {
        return Err(PermsError::MismatchedEntry(
            "group transactions must be trusting".to_string(),
        ));
    };
    let ops = GroupOp::decode_all(changes)?;
    let author = entry.id.session.author;
    let made_at = entry.tx.made_at;
    let at = LogBound::AtTime(made_at);

    let mut staged = state.clone();
    for op in &ops {
        graph.check_op(&staged, &author, op, &at)?;
        staged.apply(op, author, entry.id, made_at);
    }
    staged.record_accepted();
    Ok(staged)
}

/// A content transaction that passed validation.
#[derive(Debug, Clone, Copy)]
pub struct AcceptedTx<'a> {
    pub id: TxId,
    pub author: TxAuthor,
    pub made_at: i64,
    pub payload: &'a TxPayload,
}

/// Validate the transactions of an owned CoValue up to `bound`.
///
/// Authors need admin, writer or writeOnly in the owner at the
/// transaction's time. Private transactions must name a key the owner's
/// ledger knows; whether a given reader can decrypt them is decided later.
pub fn replay_owned<'l, S: GroupSource + ?Sized>(
    graph: &RoleGraph<'_, S>,
    log: &'l CoValueLog,
    bound: &LogBound,
) -> Vec<AcceptedTx<'l>> {
    let Some(owner) = log.header().owner() else {
        return Vec::new();
    };

    let mut accepted = Vec::new();
    for entry in log.entries(bound) {
        match check_owned_tx(graph, owner, &entry) {
            Ok(()) => accepted.push(AcceptedTx {
                id: entry.id,
                author: entry.id.session.author,
                made_at: entry.tx.made_at,
                payload: &entry.tx.payload,
            }),
            Err(e) => log_rejection(log.id(), &entry.id, &e),
        }
    }
    accepted
}

/// Check one transaction of a value owned by `owner`.
pub fn check_owned_tx<S: GroupSource + ?Sized>(
    graph: &RoleGraph<'_, S>,
    owner: &CoValueId,
    entry: &LogEntry<'_>,
) -> Result<()> {
    let author = entry.id.session.author;
    let at = LogBound::AtTime(entry.tx.made_at);
    let owner_then = graph.source().group_state(owner, &at).ok_or_else(|| {
        PermsError::InsufficientPermission(format!("owner {} is not available", owner))
    })?;

    let role = graph.role_of(&owner_then, &author.member(), &at)?;
    if !role.is_some_and(|r| r.can_write()) {
        return Err(PermsError::InsufficientPermission(format!(
            "{} cannot write to values owned by {}",
            author, owner
        )));
    }

    if let TxPayload::Private { key_used, .. } = &entry.tx.payload {
        let known = graph
            .source()
            .group_state(owner, &LogBound::Full)
            .is_some_and(|s| s.knows_key(key_used));
        if !known {
            return Err(PermsError::NoReadKeyAvailable(format!(
                "{} is not a key of {}",
                key_used, owner
            )));
        }
    }

    Ok(())
}

fn log_rejection(covalue: &CoValueId, tx: &TxId, error: &PermsError) {
    match error {
        PermsError::CycleBudgetExceeded { .. } => {
            warn!(%covalue, ?tx, %error, "transaction rejected: traversal budget exceeded")
        }
        _ => debug!(%covalue, ?tx, %error, "transaction rejected"),
    }
}
