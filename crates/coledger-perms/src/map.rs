//! Map content of owned CoValues.
//!
//! Each key is a last-writer-wins register in replay order. Every edit is
//! kept so callers can show per-key history.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use coledger_core::{KeyId, TxAuthor, TxId, TxPayload};

use crate::error::{PermsError, Result};
use crate::validator::AcceptedTx;

/// One map edit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum MapOp {
    Set { key: String, value: Value },
    Delete { key: String },
}

impl MapOp {
    pub fn key(&self) -> &str {
        match self {
            MapOp::Set { key, .. } | MapOp::Delete { key } => key,
        }
    }

    /// Encode a transaction's edits.
    pub fn encode_all(ops: &[MapOp]) -> Vec<u8> {
        serde_json::to_vec(ops).expect("JSON serialization failed")
    }

    /// Decode a transaction's edits.
    pub fn decode_all(bytes: &[u8]) -> Result<Vec<MapOp>> {
        serde_json::from_slice(bytes).map_err(|e| PermsError::SerializationError(e.to_string()))
    }
}

/// A single edit of one key.
#[derive(Debug, Clone, PartialEq)]
pub struct MapEdit {
    /// `None` for a delete.
    pub value: Option<Value>,
    pub tx: TxId,
    pub by: TxAuthor,
    pub made_at: i64,
}

/// Folded map content as seen by one reader.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MapContent {
    edits: BTreeMap<String, Vec<MapEdit>>,
}

impl MapContent {
    /// Fold accepted transactions. `open` decrypts private changes and
    /// returns `None` when the reader lacks the key; such edits are absent.
    pub fn fold<'a>(
        accepted: &[AcceptedTx<'a>],
        mut open: impl FnMut(KeyId, &[u8]) -> Option<Vec<u8>>,
    ) -> Self {
        let mut content = Self::default();
        for tx in accepted {
            let plaintext = match tx.payload {
                TxPayload::Trusting { changes } => Some(changes.to_vec()),
                TxPayload::Private {
                    key_used,
                    encrypted_changes,
                } => open(*key_used, &encrypted_changes[..]),
            };
            let Some(plaintext) = plaintext else {
                continue;
            };
            match MapOp::decode_all(&plaintext) {
                Ok(ops) => {
                    for op in ops {
                        content.apply(op, tx.id, tx.author, tx.made_at);
                    }
                }
                Err(e) => debug!(tx = ?tx.id, error = %e, "undecodable map changes"),
            }
        }
        content
    }

    fn apply(&mut self, op: MapOp, tx: TxId, by: TxAuthor, made_at: i64) {
        let (key, value) = match op {
            MapOp::Set { key, value } => (key, Some(value)),
            MapOp::Delete { key } => (key, None),
        };
        self.edits.entry(key).or_default().push(MapEdit {
            value,
            tx,
            by,
            made_at,
        });
    }

    /// Current value of `key`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.last_edit(key).and_then(|e| e.value.as_ref())
    }

    /// Keys with a current value.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.edits
            .iter()
            .filter(|(_, edits)| edits.last().is_some_and(|e| e.value.is_some()))
            .map(|(k, _)| k.as_str())
    }

    /// The edit that determines the current value of `key`.
    pub fn last_edit(&self, key: &str) -> Option<&MapEdit> {
        self.edits.get(key).and_then(|edits| edits.last())
    }

    /// All visible edits of `key`, oldest first.
    pub fn edits(&self, key: &str) -> &[MapEdit] {
        self.edits.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Current content as a JSON object.
    pub fn to_json(&self) -> Value {
        let map = self
            .keys()
            .filter_map(|k| self.get(k).map(|v| (k.to_string(), v.clone())))
            .collect();
        Value::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use coledger_core::{AgentSecret, SessionId};
    use serde_json::json;

    fn tx(index: u32) -> (TxId, TxAuthor) {
        let author = TxAuthor::Agent(AgentSecret::from_seed(&[1; 32]).agent_id());
        let session = SessionId {
            author,
            nonce: [0; 8],
        };
        (TxId { session, index }, author)
    }

    #[test]
    fn test_last_writer_wins_and_delete() {
        let p1 = TxPayload::Trusting {
            changes: Bytes::from(MapOp::encode_all(&[
                MapOp::Set { key: "a".into(), value: json!(1) },
                MapOp::Set { key: "b".into(), value: json!("x") },
            ])),
        };
        let p2 = TxPayload::Trusting {
            changes: Bytes::from(MapOp::encode_all(&[
                MapOp::Set { key: "a".into(), value: json!(2) },
                MapOp::Delete { key: "b".into() },
            ])),
        };
        let (id1, author) = tx(0);
        let (id2, _) = tx(1);
        let accepted = vec![
            AcceptedTx { id: id1, author, made_at: 1, payload: &p1 },
            AcceptedTx { id: id2, author, made_at: 2, payload: &p2 },
        ];

        let content = MapContent::fold(&accepted, |_, _| None);
        assert_eq!(content.get("a"), Some(&json!(2)));
        assert_eq!(content.get("b"), None);
        assert_eq!(content.keys().collect::<Vec<_>>(), vec!["a"]);
        assert_eq!(content.edits("a").len(), 2);
        assert_eq!(content.last_edit("a").unwrap().tx, id2);
        assert_eq!(content.to_json(), json!({"a": 2}));
    }

    #[test]
    fn test_unreadable_private_is_absent() {
        let payload = TxPayload::Private {
            key_used: KeyId::generate(),
            encrypted_changes: Bytes::from_static(b"opaque"),
        };
        let (id, author) = tx(0);
        let accepted = vec![AcceptedTx { id, author, made_at: 1, payload: &payload }];

        let content = MapContent::fold(&accepted, |_, _| None);
        assert_eq!(content.keys().count(), 0);

        let content = MapContent::fold(&accepted, |_, _| {
            Some(MapOp::encode_all(&[MapOp::Set { key: "k".into(), value: json!(true) }]))
        });
        assert_eq!(content.get("k"), Some(&json!(true)));
    }
}
