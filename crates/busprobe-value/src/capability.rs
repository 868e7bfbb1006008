//! Capability maps: the negotiation payload of the authentication handshake.
//!
//! Wire layout:
//! ```text
//! count: u32
//! repeated count times:
//!     key:       u32 length + UTF-8
//!     signature: u32 length + UTF-8
//!     value:     encoding of the value under `signature`
//! ```

use std::io;

use bytes::{BufMut, Bytes, BytesMut};

use crate::codec::{
    check_count, put_len, read_string, read_u32, read_value, write_string, write_value,
    ZeroSizeBudget,
};
use crate::error::{DecodeError, Result};
use crate::signature::Signature;
use crate::value::Value;

/// Identity presented by the client.
pub const USER_KEY: &str = "auth_user";
/// Secret presented by the client.
pub const TOKEN_KEY: &str = "auth_token";
/// Replacement token handed out by the server with a `Continue` status.
pub const NEW_TOKEN_KEY: &str = "auth_newToken";
/// Authentication status set by the server.
pub const STATE_KEY: &str = "__qi_auth_state";
/// Human-readable rejection reason set by the server.
pub const ERROR_REASON_KEY: &str = "__qi_auth_err_reason";

/// Boolean feature-negotiation flags.
pub const CLIENT_SERVER_SOCKET_KEY: &str = "ClientServerSocket";
pub const MESSAGE_FLAGS_KEY: &str = "MessageFlags";
pub const META_OBJECT_CACHE_KEY: &str = "MetaObjectCache";
pub const REMOTE_CANCELABLE_CALLS_KEY: &str = "RemoteCancelableCalls";

/// Minimum encoded entry: empty key, empty signature, zero-size value.
const MIN_ENTRY_SIZE: usize = 8;

/// Ordered map of unique string keys to values.
///
/// Insertion order is preserved on the wire. Inserting an existing key
/// replaces its value in place, so an encoded map never repeats a key.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CapabilityMap {
    entries: Vec<(String, Value)>,
}

impl CapabilityMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map carrying only the two credential strings.
    pub fn with_credentials(user: impl Into<String>, token: impl Into<String>) -> Self {
        let mut map = Self::new();
        map.insert(USER_KEY, Value::String(user.into()));
        map.insert(TOKEN_KEY, Value::String(token.into()));
        map
    }

    /// Insert or replace. Returns the previous value of `key`, if any.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let index = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(index).1)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// String value of `key`, if present and a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn user(&self) -> Option<&str> {
        self.get_str(USER_KEY)
    }

    pub fn token(&self) -> Option<&str> {
        self.get_str(TOKEN_KEY)
    }

    /// Encode into a standalone buffer.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.write_to(&mut buf);
        buf.freeze()
    }

    pub fn write_to<B: BufMut>(&self, dst: &mut B) {
        put_len(dst, self.entries.len());
        for (key, value) in &self.entries {
            write_string(dst, key);
            write_string(dst, &value.signature());
            write_value(value, dst);
        }
    }

    /// Encode into an arbitrary sink. Sink errors propagate unchanged.
    pub fn write<W: io::Write>(&self, sink: &mut W) -> io::Result<()> {
        sink.write_all(&self.encode())
    }

    /// Decode a complete buffer. Bytes after the last entry are an error.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut src = bytes;
        let map = Self::read_from(&mut src)?;
        if !src.is_empty() {
            return Err(DecodeError::TrailingBytes(src.len()));
        }
        Ok(map)
    }

    /// Decode one map from the front of `src`, advancing past it.
    ///
    /// A key that appears twice is rejected with [`DecodeError::DuplicateKey`].
    pub fn read_from(src: &mut &[u8]) -> Result<Self> {
        let count = read_u32(src)? as usize;
        check_count(count, MIN_ENTRY_SIZE, src.len())?;
        let mut map = Self {
            entries: Vec::with_capacity(count),
        };
        let mut budget = ZeroSizeBudget::new();
        for _ in 0..count {
            let key = read_string(src)?;
            let signature = Signature::parse(&read_string(src)?)?;
            let value = read_value(&signature, src, 0, &mut budget)?;
            if map.contains_key(&key) {
                return Err(DecodeError::DuplicateKey(key));
            }
            map.entries.push((key, value));
        }
        Ok(map)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for CapabilityMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (key, value) in iter {
            map.insert(key, value);
        }
        map
    }
}

impl<K: Into<String>, V: Into<Value>> Extend<(K, V)> for CapabilityMap {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (key, value) in iter {
            self.insert(key, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_layout() {
        let map = CapabilityMap::with_credentials("nao", "nao");
        let encoded = map.encode();
        let mut expected = vec![2, 0, 0, 0];
        for key in [USER_KEY, TOKEN_KEY] {
            expected.extend_from_slice(&(key.len() as u32).to_le_bytes());
            expected.extend_from_slice(key.as_bytes());
            expected.extend_from_slice(&[1, 0, 0, 0, b's']);
            expected.extend_from_slice(&[3, 0, 0, 0, b'n', b'a', b'o']);
        }
        assert_eq!(encoded.as_ref(), expected.as_slice());
        assert_eq!(CapabilityMap::decode(&encoded).unwrap(), map);
    }

    #[test]
    fn insert_replaces_in_place() {
        let mut map = CapabilityMap::with_credentials("nao", "nao");
        map.insert(MESSAGE_FLAGS_KEY, true);
        let previous = map.insert(USER_KEY, "alice");
        assert_eq!(previous, Some(Value::from("nao")));
        assert_eq!(
            map.keys().collect::<Vec<_>>(),
            vec![USER_KEY, TOKEN_KEY, MESSAGE_FLAGS_KEY]
        );
        assert_eq!(map.user(), Some("alice"));
    }

    #[test]
    fn duplicate_keys_are_rejected() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&2u32.to_le_bytes());
        for value in [1u8, 2u8] {
            bytes.extend_from_slice(&[1, 0, 0, 0, b'k', 1, 0, 0, 0, b'C', value]);
        }
        assert_eq!(
            CapabilityMap::decode(&bytes).unwrap_err(),
            DecodeError::DuplicateKey("k".into())
        );
    }

    #[test]
    fn bad_signature_is_rejected() {
        let bytes = [1, 0, 0, 0, 1, 0, 0, 0, b'k', 1, 0, 0, 0, b'x'];
        assert!(matches!(
            CapabilityMap::decode(&bytes),
            Err(DecodeError::InvalidSignature { .. })
        ));
    }

    #[test]
    fn value_not_matching_signature_is_rejected() {
        // Declares a u32 but carries a single byte.
        let bytes = [1, 0, 0, 0, 1, 0, 0, 0, b'k', 1, 0, 0, 0, b'I', 7];
        assert!(matches!(
            CapabilityMap::decode(&bytes),
            Err(DecodeError::Truncated { .. })
        ));
    }

    #[test]
    fn huge_count_is_rejected() {
        let bytes = u32::MAX.to_le_bytes();
        assert!(matches!(
            CapabilityMap::decode(&bytes),
            Err(DecodeError::LengthOverflow { .. })
        ));
    }

    fn entry(bytes: &mut Vec<u8>, key: &str, signature: &str) {
        bytes.extend_from_slice(&(key.len() as u32).to_le_bytes());
        bytes.extend_from_slice(key.as_bytes());
        bytes.extend_from_slice(&(signature.len() as u32).to_le_bytes());
        bytes.extend_from_slice(signature.as_bytes());
    }

    #[test]
    fn nested_empty_lists_cannot_blow_up() {
        let mut bytes = vec![1, 0, 0, 0];
        entry(&mut bytes, "k", "[[v]]");
        bytes.extend_from_slice(&64u32.to_le_bytes());
        for _ in 0..64 {
            bytes.extend_from_slice(&65_536u32.to_le_bytes());
        }
        assert!(bytes.len() < 300);
        assert!(matches!(
            CapabilityMap::decode(&bytes),
            Err(DecodeError::LengthOverflow { remaining: 0, .. })
        ));
    }

    #[test]
    fn empty_list_allowance_is_shared_by_entries() {
        let mut bytes = vec![2, 0, 0, 0];
        for key in ["a", "b"] {
            entry(&mut bytes, key, "[v]");
            bytes.extend_from_slice(&40_000u32.to_le_bytes());
        }
        assert!(matches!(
            CapabilityMap::decode(&bytes),
            Err(DecodeError::LengthOverflow {
                declared: 40_000,
                ..
            })
        ));

        let mut bytes = vec![1, 0, 0, 0];
        entry(&mut bytes, "a", "[v]");
        bytes.extend_from_slice(&40_000u32.to_le_bytes());
        let map = CapabilityMap::decode(&bytes).unwrap();
        assert_eq!(map.get("a").map(Value::signature).as_deref(), Some("[v]"));
    }

    #[test]
    fn empty_map() {
        let map = CapabilityMap::new();
        assert_eq!(map.encode().as_ref(), &[0, 0, 0, 0]);
        assert!(CapabilityMap::decode(&[0, 0, 0, 0]).unwrap().is_empty());
    }

    #[test]
    fn collects_from_pairs() {
        let mut map: CapabilityMap = [("a", Value::Uint8(1)), ("b", Value::Bool(false))]
            .into_iter()
            .collect();
        assert_eq!(map.len(), 2);
        assert_eq!(map.get("b"), Some(&Value::Bool(false)));
        assert_eq!(map.remove("a"), Some(Value::Uint8(1)));
        assert!(!map.contains_key("a"));
    }
}
