//! Canonical CBOR encoding for deterministic hashing and signing.
//!
//! This module implements RFC 8949 Core Deterministic Encoding over any
//! `serde::Serialize` value:
//! - Map keys sorted by encoded byte comparison
//! - Integers use smallest valid encoding
//! - Definite lengths only
//! - Floats always use the 8-byte form
//!
//! Two structurally equal values produce identical bytes regardless of the
//! field or key order they were built in, which is what manifest hashes and
//! keyed signatures rely on.

use ciborium::value::Value;
use serde::Serialize;

use crate::error::{CoreError, Result};

/// Encode any serializable value to canonical CBOR bytes.
pub fn canonical_bytes<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    let value = Value::serialized(value).map_err(|e| CoreError::EncodingError(e.to_string()))?;
    let mut buf = Vec::new();
    encode_value_to(&mut buf, &value)?;
    Ok(buf)
}

/// Recursively encode a CBOR value.
fn encode_value_to(buf: &mut Vec<u8>, value: &Value) -> Result<()> {
    match value {
        Value::Integer(i) => encode_integer(buf, *i),
        Value::Bytes(b) => encode_bytes(buf, b),
        Value::Text(s) => encode_text(buf, s),
        Value::Array(arr) => encode_array(buf, arr)?,
        Value::Map(entries) => encode_map_canonical(buf, entries)?,
        Value::Bool(b) => buf.push(if *b { 0xf5 } else { 0xf4 }),
        Value::Null => buf.push(0xf6),
        Value::Float(f) => {
            if f.is_nan() {
                return Err(CoreError::EncodingError("NaN is not canonical".into()));
            }
            buf.push(0xfb);
            buf.extend_from_slice(&f.to_be_bytes());
        }
        _ => {
            return Err(CoreError::EncodingError(
                "unsupported CBOR value type".into(),
            ))
        }
    }
    Ok(())
}

/// Encode a CBOR integer (major types 0 and 1).
fn encode_integer(buf: &mut Vec<u8>, i: ciborium::value::Integer) {
    let n: i128 = i.into();
    // Negative n is stored as -1 - n.
    match u64::try_from(n) {
        Ok(n) => encode_uint(buf, 0, n),
        Err(_) => encode_uint(buf, 1, (-1 - n) as u64),
    }
}

/// Head byte plus big-endian argument in the shortest form.
fn encode_uint(buf: &mut Vec<u8>, major: u8, n: u64) {
    let mt = major << 5;
    match n {
        0..=23 => buf.push(mt | n as u8),
        24..=0xff => buf.extend_from_slice(&[mt | 24, n as u8]),
        0x100..=0xffff => {
            buf.push(mt | 25);
            buf.extend_from_slice(&(n as u16).to_be_bytes());
        }
        0x1_0000..=0xffff_ffff => {
            buf.push(mt | 26);
            buf.extend_from_slice(&(n as u32).to_be_bytes());
        }
        _ => {
            buf.push(mt | 27);
            buf.extend_from_slice(&n.to_be_bytes());
        }
    }
}

/// Encode a byte string (major type 2).
fn encode_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    encode_uint(buf, 2, bytes.len() as u64);
    buf.extend_from_slice(bytes);
}

/// Encode a text string (major type 3).
fn encode_text(buf: &mut Vec<u8>, s: &str) {
    encode_uint(buf, 3, s.len() as u64);
    buf.extend_from_slice(s.as_bytes());
}

/// Encode an array (major type 4).
fn encode_array(buf: &mut Vec<u8>, arr: &[Value]) -> Result<()> {
    encode_uint(buf, 4, arr.len() as u64);
    for item in arr {
        encode_value_to(buf, item)?;
    }
    Ok(())
}

/// Encode a map canonically (major type 5).
///
/// Keys are sorted by their encoded byte comparison. Duplicate keys are
/// rejected since they have no canonical form.
fn encode_map_canonical(buf: &mut Vec<u8>, entries: &[(Value, Value)]) -> Result<()> {
    let mut sorted = entries
        .iter()
        .map(|(k, v)| {
            let mut key = Vec::new();
            encode_value_to(&mut key, k).map(|()| (key, v))
        })
        .collect::<Result<Vec<_>>>()?;
    sorted.sort_by(|a, b| a.0.cmp(&b.0));
    if sorted.windows(2).any(|w| w[0].0 == w[1].0) {
        return Err(CoreError::EncodingError("duplicate map key".into()));
    }

    encode_uint(buf, 5, sorted.len() as u64);
    for (key, value) in sorted {
        buf.extend_from_slice(&key);
        encode_value_to(buf, value)?;
    }
    Ok(())
}
