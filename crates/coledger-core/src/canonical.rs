//! Canonical CBOR encoding for deterministic hashing and signing.
//!
//! This module implements the subset of RFC 8949 Core Deterministic Encoding
//! that headers and signed transaction messages need:
//! - Map keys sorted by encoded byte comparison
//! - Integers use smallest valid encoding
//! - Definite lengths only
//! - No floats (timestamps are i64 milliseconds)
//!
//! The same header must hash to the same CoValue id on every peer, and the
//! same transaction must produce the same signed message.

use ciborium::value::Value;

use crate::crypto::Blake3Hash;
use crate::header::{CoValueHeader, Ruleset};
use crate::identity::TxAuthor;
use crate::transaction::{Transaction, TxId, TxPayload};
use crate::types::CoValueId;

/// Header field keys (integer keys for compact encoding).
mod header_keys {
    pub const RULESET: u64 = 0;
    pub const RULESET_ARG: u64 = 1;
    pub const CREATED_AT: u64 = 2;
    pub const UNIQUENESS: u64 = 3;
}

/// Signed message field keys.
mod tx_keys {
    pub const COVALUE: u64 = 0;
    pub const AUTHOR: u64 = 1;
    pub const SESSION_NONCE: u64 = 2;
    pub const INDEX: u64 = 3;
    pub const PREV_HASH: u64 = 4;
    pub const MADE_AT: u64 = 5;
    pub const PRIVACY: u64 = 6;
    pub const KEY_USED: u64 = 7;
    pub const CHANGES: u64 = 8;
}

/// Domain tag prefixed to every signed message.
pub const SIGN_DOMAIN: &[u8] = b"coledger-tx-v0:";

/// Encode a CoValue header to canonical CBOR bytes.
pub fn canonical_header_bytes(header: &CoValueHeader) -> Vec<u8> {
    let (tag, arg) = match &header.ruleset {
        Ruleset::Group { initial_admin } => (0u64, author_value(initial_admin)),
        Ruleset::Account { agent } => (
            1u64,
            Value::Array(vec![
                Value::Bytes(agent.signer.0.to_vec()),
                Value::Bytes(agent.sealer.0.to_vec()),
            ]),
        ),
        Ruleset::OwnedBy { owner } => (2u64, Value::Bytes(owner.0.to_vec())),
    };

    let value = Value::Map(vec![
        (int(header_keys::RULESET), int(tag)),
        (int(header_keys::RULESET_ARG), arg),
        (
            int(header_keys::CREATED_AT),
            Value::Integer(header.created_at.into()),
        ),
        (
            int(header_keys::UNIQUENESS),
            Value::Bytes(header.uniqueness.to_vec()),
        ),
    ]);
    encode_cbor_value_canonical(&value)
}

/// Construct the signed message for a transaction at a log position.
///
/// Format: SIGN_DOMAIN || canonical map of (covalue, session, index,
/// prev_hash, made_at, privacy, key_used, changes).
pub fn signed_message(
    covalue: &CoValueId,
    tx_id: &TxId,
    prev_hash: &Blake3Hash,
    tx: &Transaction,
) -> Vec<u8> {
    let (privacy, key_used, changes) = match &tx.payload {
        TxPayload::Trusting { changes } => (0u64, Value::Null, changes),
        TxPayload::Private {
            key_used,
            encrypted_changes,
        } => (1u64, Value::Bytes(key_used.0.to_vec()), encrypted_changes),
    };

    let value = Value::Map(vec![
        (int(tx_keys::COVALUE), Value::Bytes(covalue.0.to_vec())),
        (int(tx_keys::AUTHOR), author_value(&tx_id.session.author)),
        (
            int(tx_keys::SESSION_NONCE),
            Value::Bytes(tx_id.session.nonce.to_vec()),
        ),
        (int(tx_keys::INDEX), int(tx_id.index.into())),
        (int(tx_keys::PREV_HASH), Value::Bytes(prev_hash.0.to_vec())),
        (int(tx_keys::MADE_AT), Value::Integer(tx.made_at.into())),
        (int(tx_keys::PRIVACY), int(privacy)),
        (int(tx_keys::KEY_USED), key_used),
        (int(tx_keys::CHANGES), Value::Bytes(changes.to_vec())),
    ]);

    let mut buf = SIGN_DOMAIN.to_vec();
    encode_value_to(&mut buf, &value);
    buf
}

fn int(n: u64) -> Value {
    Value::Integer(n.into())
}

fn author_value(author: &TxAuthor) -> Value {
    match author {
        TxAuthor::Account(id) => Value::Array(vec![int(0), Value::Bytes(id.0 .0.to_vec())]),
        TxAuthor::Agent(agent) => Value::Array(vec![
            int(1),
            Value::Bytes(agent.signer.0.to_vec()),
            Value::Bytes(agent.sealer.0.to_vec()),
        ]),
    }
}

/// Encode a CBOR Value to canonical bytes.
fn encode_cbor_value_canonical(value: &Value) -> Vec<u8> {
    let mut buf = Vec::new();
    encode_value_to(&mut buf, value);
    buf
}

/// Recursively encode a CBOR value.
fn encode_value_to(buf: &mut Vec<u8>, value: &Value) {
    match value {
        Value::Integer(i) => encode_integer(buf, *i),
        Value::Bytes(b) => {
            encode_uint(buf, 2, b.len() as u64);
            buf.extend_from_slice(b);
        }
        Value::Text(s) => {
            encode_uint(buf, 3, s.len() as u64);
            buf.extend_from_slice(s.as_bytes());
        }
        Value::Array(arr) => {
            encode_uint(buf, 4, arr.len() as u64);
            for item in arr {
                encode_value_to(buf, item);
            }
        }
        Value::Map(entries) => encode_map_canonical(buf, entries),
        Value::Bool(b) => buf.push(if *b { 0xf5 } else { 0xf4 }),
        Value::Null => buf.push(0xf6),
        // Only the builders in this module produce values, and they never emit these.
        _ => unreachable!("unsupported CBOR value in canonical encoding"),
    }
}

/// Encode a CBOR integer (major types 0 and 1).
fn encode_integer(buf: &mut Vec<u8>, i: ciborium::value::Integer) {
    let n: i128 = i.into();

    if n >= 0 {
        encode_uint(buf, 0, n as u64);
    } else {
        // CBOR encodes -1 as 0, -2 as 1, etc.
        encode_uint(buf, 1, (-1 - n) as u64);
    }
}

/// Encode an unsigned integer with the given major type.
fn encode_uint(buf: &mut Vec<u8>, major: u8, n: u64) {
    let mt = major << 5;
    if n < 24 {
        buf.push(mt | (n as u8));
    } else if n <= 0xff {
        buf.push(mt | 24);
        buf.push(n as u8);
    } else if n <= 0xffff {
        buf.push(mt | 25);
        buf.extend_from_slice(&(n as u16).to_be_bytes());
    } else if n <= 0xffff_ffff {
        buf.push(mt | 26);
        buf.extend_from_slice(&(n as u32).to_be_bytes());
    } else {
        buf.push(mt | 27);
        buf.extend_from_slice(&n.to_be_bytes());
    }
}

/// Encode a map canonically (major type 5).
///
/// Keys are sorted by their encoded byte comparison.
fn encode_map_canonical(buf: &mut Vec<u8>, entries: &[(Value, Value)]) {
    let mut pairs: Vec<(Vec<u8>, &Value)> = entries
        .iter()
        .map(|(k, v)| {
            let mut key_buf = Vec::new();
            encode_value_to(&mut key_buf, k);
            (key_buf, v)
        })
        .collect();

    pairs.sort_by(|a, b| a.0.cmp(&b.0));

    encode_uint(buf, 5, pairs.len() as u64);
    for (key_bytes, value) in pairs {
        buf.extend_from_slice(&key_bytes);
        encode_value_to(buf, value);
    }
}
