//! JSON value helpers shared across the engine.
//!
//! Selector identity and object data both sit on top of
//! [`serde_json_bytes::Value`]; the extensions here add the two operations
//! the engine needs that the crate does not provide: an order-independent
//! hash (object key insertion order must not affect batching identity) and a
//! deep merge (used when attaching prerequisite data to a parent object).

use std::hash::Hash;
use std::hash::Hasher;

use serde_json_bytes::ByteString;
use serde_json_bytes::Map;
use serde_json_bytes::Value;

/// A JSON object in the engine's value representation.
pub type Object = Map<ByteString, Value>;

pub(crate) trait ValueExt {
    /// Hash this value into `state`, insensitive to object key order.
    ///
    /// `Map` equality ignores insertion order, so any hash fed to a
    /// `HashMap` keyed by values must do the same.
    fn stable_hash<H: Hasher>(&self, state: &mut H);

    /// Deep merge `other` into `self`.
    ///
    /// Objects merge recursively, any other kind of value is replaced.
    fn deep_merge(&mut self, other: Value);
}

impl ValueExt for Value {
    fn stable_hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Value::Null => state.write_u8(0),
            Value::Bool(b) => {
                state.write_u8(1);
                b.hash(state);
            }
            Value::Number(n) => {
                state.write_u8(2);
                n.hash(state);
            }
            Value::String(s) => {
                state.write_u8(3);
                s.as_str().hash(state);
            }
            Value::Array(values) => {
                state.write_u8(4);
                state.write_usize(values.len());
                for value in values {
                    value.stable_hash(state);
                }
            }
            Value::Object(object) => {
                state.write_u8(5);
                object.stable_hash(state);
            }
        }
    }

    fn deep_merge(&mut self, other: Value) {
        match (self, other) {
            (Value::Object(a), Value::Object(b)) => {
                for (key, value) in b {
                    match a.get_mut(&key) {
                        Some(existing) => existing.deep_merge(value),
                        None => {
                            a.insert(key, value);
                        }
                    }
                }
            }
            (a, b) => *a = b,
        }
    }
}

impl ValueExt for Object {
    fn stable_hash<H: Hasher>(&self, state: &mut H) {
        state.write_usize(self.len());
        let mut entries: Vec<(&ByteString, &Value)> = self.iter().collect();
        entries.sort_by_key(|(key, _)| key.as_str());
        for (key, value) in entries {
            key.as_str().hash(state);
            value.stable_hash(state);
        }
    }

    fn deep_merge(&mut self, other: Value) {
        if let Value::Object(b) = other {
            for (key, value) in b {
                match self.get_mut(&key) {
                    Some(existing) => existing.deep_merge(value),
                    None => {
                        self.insert(key, value);
                    }
                }
            }
        }
    }
}
