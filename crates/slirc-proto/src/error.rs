//! Error types for the protocol support crate.

use thiserror::Error;

/// Errors raised while interpreting protocol-level configuration and text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ProtoError {
    #[error("unknown casemapping: {0}")]
    UnknownCasemapping(String),

    #[error("mode letter {0:?} is defined more than once")]
    DuplicateModeLetter(char),

    #[error("mode letter {0:?} is not a valid mode character")]
    InvalidModeLetter(char),

    #[error("too many simple modes for the mode bitmask ({0})")]
    TooManySimpleModes(usize),

    #[error("invalid hostmask: {0}")]
    InvalidHostmask(String),
}
