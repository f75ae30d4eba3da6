//! Property-based tests for wildcard matching and mask specificity.

use proptest::prelude::*;
use slirc_proto::mask::{Specificity, wildcard_match};
use slirc_proto::Casemapping;

// =============================================================================
// STRATEGIES
// =============================================================================

fn nickname_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z\\[\\]\\\\^_`{|}][a-zA-Z0-9\\-\\[\\]\\\\^_`{|}]{0,8}")
        .expect("valid regex")
}

fn username_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z][a-zA-Z0-9]{0,9}").expect("valid regex")
}

fn hostname_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z0-9]+(\\.[a-z0-9]+)*").expect("valid regex")
}

fn hostmask_strategy() -> impl Strategy<Value = String> {
    (nickname_strategy(), username_strategy(), hostname_strategy())
        .prop_map(|(n, u, h)| format!("{n}!{u}@{h}"))
}

// =============================================================================
// PROPERTIES
// =============================================================================

proptest! {
    #[test]
    fn literal_mask_matches_itself(mask in hostmask_strategy()) {
        prop_assert!(wildcard_match(&mask, &mask));
    }

    #[test]
    fn match_is_case_insensitive(mask in hostmask_strategy()) {
        let upper = mask.to_ascii_uppercase();
        prop_assert!(wildcard_match(&mask, &upper));
        prop_assert!(wildcard_match(&upper, &mask));
    }

    #[test]
    fn host_wildcard_matches_any_nick_and_user(
        nick in nickname_strategy(),
        user in username_strategy(),
        host in hostname_strategy(),
    ) {
        let text = format!("{nick}!{user}@{host}");
        let pattern = format!("*!*@{host}");
        prop_assert!(wildcard_match(&pattern, &text));
    }

    #[test]
    fn replacing_a_char_with_question_mark_still_matches(
        mask in hostmask_strategy(),
        idx in any::<prop::sample::Index>(),
    ) {
        let chars: Vec<char> = mask.chars().collect();
        let i = idx.index(chars.len());
        let mut pattern = chars.clone();
        pattern[i] = '?';
        let pattern: String = pattern.into_iter().collect();
        prop_assert!(wildcard_match(&pattern, &mask));
    }

    #[test]
    fn literal_always_more_specific_than_wildcard(mask in hostmask_strategy()) {
        let wild = format!("*{mask}");
        prop_assert!(Specificity::of(&mask) > Specificity::of(&wild));
    }

    #[test]
    fn folding_is_idempotent(s in "[ -~]{0,40}") {
        for map in [Casemapping::Ascii, Casemapping::Rfc1459, Casemapping::StrictRfc1459] {
            let once = map.to_lower(&s);
            prop_assert_eq!(map.to_lower(&once), once.clone());
            prop_assert!(map.equals(&s, &once));
        }
    }
}
