//! Property-based tests for path and placeholder helpers.
//!
//! These tests use proptest to generate random inputs and verify that
//! invariants hold for all possible inputs.

#[cfg(test)]
mod proptest_tests {
    use crate::path::{
        decode_label, encode_label, encode_url_path, glob_match, resolve_placeholders,
        workspace_dir_name,
    };
    use proptest::prelude::*;

    // ============================================================================
    // encode_url_path / workspace_dir_name property tests
    // ============================================================================

    proptest! {
        /// Property: encode_url_path never produces filesystem-unsafe characters
        #[test]
        fn encode_url_path_never_produces_unsafe_chars(input in ".*") {
            let result = encode_url_path(&input);
            let unsafe_chars = ['/', '\\', ':', '*', '?', '"', '<', '>', '|'];
            for ch in unsafe_chars {
                prop_assert!(
                    !result.contains(ch),
                    "encode_url_path produced unsafe character '{}' from input '{}'",
                    ch,
                    input
                );
            }
        }

        /// Property: workspace_dir_name is deterministic and a single path component
        #[test]
        fn workspace_dir_name_is_single_component(uri in ".*") {
            let first = workspace_dir_name(&uri);
            let second = workspace_dir_name(&uri);
            prop_assert_eq!(&first, &second);
            prop_assert!(!first.contains('/'));
            prop_assert!(!first.is_empty());
        }
    }

    // ============================================================================
    // route pattern property tests
    // ============================================================================

    proptest! {
        /// Property: "app/*" matches the app under any profile
        #[test]
        fn application_pattern_matches_every_profile(
            app in "[a-z][a-z0-9-]{0,10}",
            profile in "[a-z0-9-]{1,10}",
        ) {
            let pattern = format!("{}/*", app);
            let subject = format!("{}/{}", app, profile);
            prop_assert!(glob_match(&pattern, &subject).unwrap());
        }

        /// Property: "app/*" never matches a different application name
        #[test]
        fn application_pattern_rejects_other_apps(
            app in "[a-z]{1,10}",
            other in "[0-9]{1,10}",
            profile in "[a-z]{1,10}",
        ) {
            let pattern = format!("{}/*", app);
            let subject = format!("{}/{}", other, profile);
            prop_assert!(!glob_match(&pattern, &subject).unwrap());
        }
    }

    // ============================================================================
    // placeholder and label property tests
    // ============================================================================

    proptest! {
        /// Property: a template without placeholders resolves to itself
        #[test]
        fn resolving_plain_template_is_identity(template in "[a-zA-Z0-9:/._-]*") {
            let resolved = resolve_placeholders(&template, Some("app"), Some("dev"), Some("main"));
            prop_assert_eq!(resolved, template);
        }

        /// Property: label encoding round-trips for labels without "(_)"
        #[test]
        fn label_encoding_round_trips(label in "[a-zA-Z0-9/._-]{1,30}") {
            prop_assert_eq!(decode_label(&encode_label(&label)), label);
        }
    }
}
