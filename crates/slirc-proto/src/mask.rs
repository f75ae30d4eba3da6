//! Wildcard and hostmask helpers.
//!
//! Matching is case-insensitive under a [`Casemapping`]. `*` matches any run
//! of characters, `?` matches exactly one.

use crate::casemap::Casemapping;
use crate::error::ProtoError;

/// Maximum length of a hostmask we accept in an access list.
pub const MAX_MASK_LEN: usize = 200;

/// Match `text` against a wildcard `pattern` using RFC 1459 casemapping.
///
/// ```
/// use slirc_proto::mask::wildcard_match;
///
/// assert!(wildcard_match("*!*@*.example.com", "nick!user@host.example.com"));
/// assert!(wildcard_match("n?ck!*@*", "NICK!u@h"));
/// assert!(!wildcard_match("*!*@spam.example", "nick!user@ham.example"));
/// ```
pub fn wildcard_match(pattern: &str, text: &str) -> bool {
    wildcard_match_with(Casemapping::Rfc1459, pattern, text)
}

/// Match `text` against `pattern` using the given casemapping.
pub fn wildcard_match_with(casemap: Casemapping, pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().map(|c| casemap.lower_char(c)).collect();
    let text: Vec<char> = text.chars().map(|c| casemap.lower_char(c)).collect();
    match_folded(&pattern, &text)
}

fn match_folded(pattern: &[char], text: &[char]) -> bool {
    let mut p = 0;
    let mut t = 0;
    let mut star_p = None;
    let mut star_t = 0;

    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == text[t]) {
            p += 1;
            t += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            star_p = Some(p);
            star_t = t;
            p += 1;
        } else if let Some(sp) = star_p {
            // backtrack: let the last '*' swallow one more character
            p = sp + 1;
            star_t += 1;
            t = star_t;
        } else {
            return false;
        }
    }

    while p < pattern.len() && pattern[p] == '*' {
        p += 1;
    }

    p == pattern.len()
}

/// Whether the pattern contains no wildcard characters.
pub fn is_literal(pattern: &str) -> bool {
    !pattern.contains(['*', '?'])
}

/// How specific a pattern is, for choosing among several that match.
///
/// Literal patterns beat any wildcard pattern; among wildcard patterns the
/// one with the longest run of non-wildcard characters wins. Compare with
/// `Ord`: greater is more specific.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Specificity {
    literal: bool,
    longest_run: usize,
}

impl Specificity {
    pub fn of(pattern: &str) -> Self {
        let longest_run = pattern
            .split(['*', '?'])
            .map(|run| run.chars().count())
            .max()
            .unwrap_or(0);
        Self {
            literal: is_literal(pattern),
            longest_run,
        }
    }

    pub fn is_literal(&self) -> bool {
        self.literal
    }
}

/// Validate a `nick!user@host` style mask for storage in an access list.
///
/// The mask must have exactly one `!` before exactly one `@`, no spaces or
/// control characters, and non-empty parts.
pub fn validate_hostmask(mask: &str) -> Result<(), ProtoError> {
    let invalid = || ProtoError::InvalidHostmask(mask.to_string());

    if mask.is_empty() || mask.len() > MAX_MASK_LEN {
        return Err(invalid());
    }
    if mask.chars().any(|c| c == ' ' || c == ',' || c.is_control()) {
        return Err(invalid());
    }

    let (nick, rest) = mask.split_once('!').ok_or_else(invalid)?;
    let (user, host) = rest.split_once('@').ok_or_else(invalid)?;
    if nick.is_empty() || user.is_empty() || host.is_empty() {
        return Err(invalid());
    }
    if user.contains('!') || host.contains(['!', '@']) {
        return Err(invalid());
    }
    Ok(())
}

/// Whether a string looks like a hostmask rather than an account name.
pub fn looks_like_hostmask(s: &str) -> bool {
    s.contains('!') || s.contains('@')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wildcard_basics() {
        assert!(wildcard_match("*", "anything"));
        assert!(wildcard_match("*", ""));
        assert!(wildcard_match("a*c", "abbbc"));
        assert!(wildcard_match("a?c", "abc"));
        assert!(!wildcard_match("a?c", "ac"));
        assert!(!wildcard_match("abc", "abd"));
    }

    #[test]
    fn test_wildcard_backtracks() {
        assert!(wildcard_match("*a*b", "xaxxab"));
        assert!(wildcard_match("*!*@*.spam.example", "n!u@a.b.spam.example"));
        assert!(!wildcard_match("*!*@*.spam.example", "n!u@spam.example"));
    }

    #[test]
    fn test_wildcard_casemapped() {
        assert!(wildcard_match("nick[away]!*@*", "NICK{AWAY}!u@h"));
        assert!(!wildcard_match_with(
            Casemapping::Ascii,
            "nick[away]!*@*",
            "NICK{AWAY}!u@h"
        ));
    }

    #[test]
    fn test_specificity_ordering() {
        let literal = Specificity::of("bob!bob@host.example");
        let long = Specificity::of("*!*@host.example");
        let short = Specificity::of("*!*@*.example");
        let star = Specificity::of("*!*@*");

        assert!(literal.is_literal());
        assert!(literal > long);
        assert!(long > short);
        assert!(short > star);
    }

    #[test]
    fn test_validate_hostmask() {
        assert!(validate_hostmask("*!*@spam.example").is_ok());
        assert!(validate_hostmask("nick!user@host").is_ok());
        assert!(validate_hostmask("nick@host").is_err());
        assert!(validate_hostmask("nick!user").is_err());
        assert!(validate_hostmask("!user@host").is_err());
        assert!(validate_hostmask("a!b@c d").is_err());
        assert!(validate_hostmask("a!b@c@d").is_err());
        assert!(validate_hostmask("").is_err());
    }

    #[test]
    fn test_looks_like_hostmask() {
        assert!(looks_like_hostmask("*!*@host"));
        assert!(looks_like_hostmask("user@host"));
        assert!(!looks_like_hostmask("alice"));
        assert!(!looks_like_hostmask("$oper"));
    }
}
