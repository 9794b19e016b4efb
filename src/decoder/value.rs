//! Normalization of decoded chain values.
//!
//! The node hands back the same on-chain value in several shapes: a
//! positional array or a named object for call arguments, a plain integer,
//! a comma-grouped human string or a hex string for balances, a bare id or
//! a `{code}` struct (sometimes JSON-encoded inside a string) for asset
//! ids. Everything past this module only sees normalized Rust types.

use std::str::FromStr;

use num_bigint::BigInt;
use serde_json::Value;

/// Field `index` of a positional array, or the first of `names` present
/// in a named object.
pub fn field<'a>(value: &'a Value, index: usize, names: &[&str]) -> Option<&'a Value> {
    match value {
        Value::Array(items) => items.get(index),
        Value::Object(map) => names.iter().find_map(|name| map.get(*name)),
        _ => None,
    }
}

/// Canonical lowercase asset id.
pub fn asset_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            if s.starts_with('{') {
                let parsed: Value = serde_json::from_str(s).ok()?;
                asset_id(&parsed)
            } else if s.starts_with("0x") {
                Some(s.to_lowercase())
            } else {
                None
            }
        },
        Value::Object(map) => ["code", "assetId", "asset_id"]
            .iter()
            .find_map(|key| map.get(*key))
            .and_then(asset_id),
        _ => None,
    }
}

/// Raw fixed-point balance.
pub fn balance(value: &Value) -> Option<BigInt> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .map(BigInt::from)
            .or_else(|| BigInt::from_str(&n.to_string()).ok()),
        Value::String(s) => {
            let cleaned = s.trim().replace(',', "");
            if let Some(hex) = cleaned.strip_prefix("0x") {
                if hex.is_empty() {
                    return None;
                }
                BigInt::parse_bytes(hex.as_bytes(), 16)
            } else {
                BigInt::from_str(&cleaned).ok()
            }
        },
        _ => None,
    }
}

/// SS58 or hex account, from a bare string or an `{id}` wrapper.
pub fn account(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Object(map) => map.get("id").or_else(|| map.get("Id")).and_then(account),
        _ => None,
    }
}

/// 32-byte hash as lowercase hex.
pub fn h256(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if s.starts_with("0x") => Some(s.to_lowercase()),
        _ => None,
    }
}

/// The two balances of a pool reserves entry, in storage order.
pub fn reserve_pair(value: &Value) -> Option<(BigInt, BigInt)> {
    match value {
        Value::Array(items) if items.len() >= 2 => Some((balance(&items[0])?, balance(&items[1])?)),
        Value::String(s) if s.trim_start().starts_with('[') => {
            let parsed: Value = serde_json::from_str(s).ok()?;
            reserve_pair(&parsed)
        },
        _ => None,
    }
}
