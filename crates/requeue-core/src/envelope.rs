//! Message envelope: the key/payload/headers triple that moves through every
//! stage of the retry chain.

use crate::headers::{Headers, LAST_ERROR, NOT_BEFORE_EPOCH_MS, ORIGIN_TOPIC, RETRY_STAGE};

/// One message as seen by producers and consumers.
///
/// `key` and `payload` are never touched by routing; only the headers change
/// between hops, and each hop gets a freshly built [`Headers`] map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Stable business identifier, used for partitioning downstream.
    pub key: String,

    /// Opaque business body, passed through unmodified across stages.
    pub payload: Vec<u8>,

    pub headers: Headers,
}

impl Envelope {
    /// An intake envelope: no retry metadata yet.
    pub fn new(key: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            key: key.into(),
            payload,
            headers: Headers::new(),
        }
    }

    pub fn with_headers(key: impl Into<String>, payload: Vec<u8>, headers: Headers) -> Self {
        Self {
            key: key.into(),
            payload,
            headers,
        }
    }

    /// Stage counter stamped by the last routing hop. Absent on intake.
    pub fn retry_stage(&self) -> Option<i32> {
        self.headers.get_i32(RETRY_STAGE)
    }

    /// Earliest instant this message may be handed to the store.
    pub fn not_before_epoch_ms(&self) -> Option<i64> {
        self.headers.get_i64(NOT_BEFORE_EPOCH_MS)
    }

    /// Topic where the message first entered the retry chain.
    pub fn origin_topic(&self) -> Option<&str> {
        self.headers.get_str(ORIGIN_TOPIC)
    }

    /// Most recent failure description.
    pub fn last_error(&self) -> Option<&str> {
        self.headers.get_str(LAST_ERROR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intake_envelope_has_no_retry_metadata() {
        let envelope = Envelope::new("3", b"{}".to_vec());
        assert!(envelope.headers.is_empty());
        assert_eq!(envelope.retry_stage(), None);
        assert_eq!(envelope.not_before_epoch_ms(), None);
        assert_eq!(envelope.origin_topic(), None);
        assert_eq!(envelope.last_error(), None);
    }

    #[test]
    fn typed_accessors_read_stamped_headers() {
        let headers = Headers::new()
            .with_i32(RETRY_STAGE, 1)
            .with_i64(NOT_BEFORE_EPOCH_MS, 6_000)
            .with_str(ORIGIN_TOPIC, "main")
            .with_str(LAST_ERROR, "db down");
        let envelope = Envelope::with_headers("3", b"{}".to_vec(), headers);

        assert_eq!(envelope.retry_stage(), Some(1));
        assert_eq!(envelope.not_before_epoch_ms(), Some(6_000));
        assert_eq!(envelope.origin_topic(), Some("main"));
        assert_eq!(envelope.last_error(), Some("db down"));
    }
}
