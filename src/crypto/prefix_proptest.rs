//! Property-based tests for prefix tag parsing

use indexmap::IndexMap;
use proptest::prelude::*;

use super::prefix::{parse, render};

fn tag_name() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_-]{0,8}".prop_filter("reserved names", |name| {
        name != "name" && name != "profiles" && name != "plain"
    })
}

proptest! {
    /// Rendering tags and parsing them back yields the same tags and payload.
    #[test]
    fn render_then_parse_is_identity(
        entries in prop::collection::vec((tag_name(), "[^\u{0}]{0,12}"), 0..4),
        payload in "[^\u{0}]{0,24}",
    ) {
        let mut tags = IndexMap::new();
        for (name, value) in entries {
            tags.entry(name).or_insert(value);
        }
        let parsed = parse(&render(&tags, &payload));
        prop_assert_eq!(parsed.tags, tags);
        prop_assert_eq!(parsed.payload, payload);
    }

    /// Hex ciphertext never starts a tag, so it always parses as payload.
    #[test]
    fn hex_payload_has_no_tags(payload in "[0-9a-f]{0,64}") {
        let parsed = parse(&payload);
        prop_assert!(parsed.tags.is_empty());
        prop_assert_eq!(parsed.payload, payload);
    }

    /// Parsing never panics and never loses characters of the payload.
    #[test]
    fn parse_payload_is_suffix(input in "\\PC{0,40}") {
        let parsed = parse(&input);
        prop_assert!(input.ends_with(&parsed.payload));
    }
}
