//! Envelope header codec.
//!
//! Integer headers are fixed-width big-endian (4 bytes for the stage counter,
//! 8 bytes for timestamps); string headers are raw UTF-8. Decoding is lenient:
//! a missing, wrong-length, or non-UTF-8 value reads as `None`, and callers
//! fall back to a stage-appropriate default. A corrupted header degrades the
//! precision of the retry chain, never its liveness.

use std::collections::BTreeMap;

/// Which retry stage the message was published to (4-byte i32).
pub const RETRY_STAGE: &str = "x-retry-stage";

/// Earliest wall-clock instant the message may be processed (8-byte i64, epoch ms).
pub const NOT_BEFORE_EPOCH_MS: &str = "x-not-before-epoch-ms";

/// Topic the message was consumed from when it first failed (UTF-8).
pub const ORIGIN_TOPIC: &str = "x-origin-topic";

/// Most recent failure description (UTF-8, unbounded).
pub const LAST_ERROR: &str = "x-last-error";

/// An immutable-per-hop header map.
///
/// Design intent:
/// - Each routing hop builds a fresh map with the `with_*` builders instead of
///   mutating the inbound one, so an envelope can never alias headers across
///   concurrent hops.
/// - Values are raw bytes; typed access goes through the lenient `get_*`
///   decoders.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: BTreeMap<String, Vec<u8>>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a 4-byte big-endian integer header. Replaces any previous value.
    pub fn with_i32(mut self, key: &str, value: i32) -> Self {
        self.entries.insert(key.to_string(), value.to_be_bytes().to_vec());
        self
    }

    /// Set an 8-byte big-endian integer header. Replaces any previous value.
    pub fn with_i64(mut self, key: &str, value: i64) -> Self {
        self.entries.insert(key.to_string(), value.to_be_bytes().to_vec());
        self
    }

    /// Set a UTF-8 string header. Replaces any previous value.
    pub fn with_str(mut self, key: &str, value: &str) -> Self {
        self.entries.insert(key.to_string(), value.as_bytes().to_vec());
        self
    }

    /// Raw bytes of a header, if present.
    pub fn get(&self, key: &str) -> Option<&[u8]> {
        self.entries.get(key).map(Vec::as_slice)
    }

    /// Decode a 4-byte integer header. Anything but exactly 4 bytes is `None`.
    pub fn get_i32(&self, key: &str) -> Option<i32> {
        let bytes: [u8; 4] = self.get(key)?.try_into().ok()?;
        Some(i32::from_be_bytes(bytes))
    }

    /// Decode an 8-byte integer header. Anything but exactly 8 bytes is `None`.
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        let bytes: [u8; 8] = self.get(key)?.try_into().ok()?;
        Some(i64::from_be_bytes(bytes))
    }

    /// Decode a UTF-8 string header. Invalid UTF-8 is `None`.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        std::str::from_utf8(self.get(key)?).ok()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
