//! Subscription descriptor: the first frame a client sends.

use serde::Deserialize;

use crate::error::BridgeError;

/// What a client wants bridged: one exchange and any number of topic
/// patterns, in the order the queue should be bound.
///
/// Decoded from the raw bytes of a connection's first inbound frame and
/// immutable thereafter. An absent `topics` field decodes as an empty list;
/// a missing or empty `exchange` is rejected, no default is substituted.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SubscriptionDescriptor {
    pub exchange: String,
    #[serde(default)]
    pub topics: Vec<String>,
}

impl SubscriptionDescriptor {
    /// Decode a descriptor. Pure: no broker state is touched here.
    pub fn parse(raw: &[u8]) -> Result<Self, BridgeError> {
        let descriptor: SubscriptionDescriptor = serde_json::from_slice(raw)
            .map_err(|e| BridgeError::MalformedDescriptor(e.to_string()))?;
        if descriptor.exchange.is_empty() {
            return Err(BridgeError::MalformedDescriptor(
                "exchange must be a non-empty string".to_string(),
            ));
        }
        Ok(descriptor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    // -- well-formed input ---------------------------------------------------

    #[test]
    fn test_parse_full_descriptor() {
        let raw = br#"{"exchange":"events","topics":["orders.*","invoices.#"]}"#;
        let descriptor = SubscriptionDescriptor::parse(raw).unwrap();
        assert_eq!(descriptor.exchange, "events");
        assert_eq!(descriptor.topics, vec!["orders.*", "invoices.#"]);
    }

    #[test]
    fn test_parse_missing_topics_is_empty() {
        let descriptor = SubscriptionDescriptor::parse(br#"{"exchange":"events"}"#).unwrap();
        assert_eq!(descriptor.exchange, "events");
        assert!(descriptor.topics.is_empty());
    }

    #[test]
    fn test_parse_empty_topics_array() {
        let descriptor =
            SubscriptionDescriptor::parse(br#"{"exchange":"events","topics":[]}"#).unwrap();
        assert!(descriptor.topics.is_empty());
    }

    #[test]
    fn test_parse_preserves_topic_order() {
        let raw = br#"{"exchange":"e","topics":["c.*","a.*","b.*"]}"#;
        let descriptor = SubscriptionDescriptor::parse(raw).unwrap();
        assert_eq!(descriptor.topics, vec!["c.*", "a.*", "b.*"]);
    }

    #[test]
    fn test_parse_ignores_unknown_fields() {
        let raw = br#"{"exchange":"events","topics":["a"],"extra":42}"#;
        assert!(SubscriptionDescriptor::parse(raw).is_ok());
    }

    // -- malformed input -----------------------------------------------------

    #[rstest]
    #[case::not_json(b"definitely not json".as_slice())]
    #[case::empty(b"".as_slice())]
    #[case::json_array(br#"["events"]"#.as_slice())]
    #[case::missing_exchange(br#"{"topics":["orders.*"]}"#.as_slice())]
    #[case::empty_exchange(br#"{"exchange":"","topics":["orders.*"]}"#.as_slice())]
    #[case::exchange_wrong_type(br#"{"exchange":42}"#.as_slice())]
    #[case::topics_wrong_type(br#"{"exchange":"e","topics":"orders.*"}"#.as_slice())]
    fn test_parse_rejects_malformed(#[case] raw: &[u8]) {
        let err = SubscriptionDescriptor::parse(raw).unwrap_err();
        assert!(matches!(err, BridgeError::MalformedDescriptor(_)), "{err}");
    }

    #[test]
    fn test_parse_invalid_utf8_is_malformed() {
        let err = SubscriptionDescriptor::parse(&[0xff, 0xfe, 0x00]).unwrap_err();
        assert!(matches!(err, BridgeError::MalformedDescriptor(_)));
    }

    proptest! {
        #[test]
        fn test_parse_never_panics(raw in proptest::collection::vec(any::<u8>(), 0..256)) {
            let _ = SubscriptionDescriptor::parse(&raw);
        }
    }
}
