//! IRC case-mapping functions.
//!
//! IRC compares nicknames, channel names and account names case-insensitively
//! with a network-selected mapping. `rfc1459` additionally folds `[]\~` onto
//! `{}|^`; `strict-rfc1459` folds `[]\` but leaves `~` alone; `ascii` only
//! folds letters.

use std::fmt;
use std::str::FromStr;

/// Network casemapping, as advertised in `CASEMAPPING=`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum Casemapping {
    Ascii,
    #[default]
    Rfc1459,
    StrictRfc1459,
}

impl Casemapping {
    /// Fold a single character.
    #[inline]
    pub const fn lower_char(self, c: char) -> char {
        match (self, c) {
            (_, 'A'..='Z') => (c as u8 + 32) as char,
            (Casemapping::Ascii, _) => c,
            (_, '[') => '{',
            (_, ']') => '}',
            (_, '\\') => '|',
            (Casemapping::Rfc1459, '~') => '^',
            _ => c,
        }
    }

    /// Fold a whole string.
    pub fn to_lower(self, s: &str) -> String {
        s.chars().map(|c| self.lower_char(c)).collect()
    }

    /// Compare two strings under this mapping.
    pub fn equals(self, a: &str, b: &str) -> bool {
        if a.len() != b.len() {
            return false;
        }
        a.chars()
            .zip(b.chars())
            .all(|(ca, cb)| self.lower_char(ca) == self.lower_char(cb))
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Casemapping::Ascii => "ascii",
            Casemapping::Rfc1459 => "rfc1459",
            Casemapping::StrictRfc1459 => "strict-rfc1459",
        }
    }
}

impl fmt::Display for Casemapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Casemapping {
    type Err = crate::ProtoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ascii" => Ok(Casemapping::Ascii),
            "rfc1459" => Ok(Casemapping::Rfc1459),
            "strict-rfc1459" => Ok(Casemapping::StrictRfc1459),
            other => Err(crate::ProtoError::UnknownCasemapping(other.to_string())),
        }
    }
}

/// Convert a single character to IRC lowercase using RFC 1459 case mapping.
#[inline]
pub const fn irc_lower_char(c: char) -> char {
    Casemapping::Rfc1459.lower_char(c)
}

/// Convert a string to IRC lowercase using RFC 1459 case mapping.
pub fn irc_to_lower(s: &str) -> String {
    Casemapping::Rfc1459.to_lower(s)
}

/// Compare two strings using RFC 1459 case-insensitive comparison.
pub fn irc_eq(a: &str, b: &str) -> bool {
    Casemapping::Rfc1459.equals(a, b)
}
