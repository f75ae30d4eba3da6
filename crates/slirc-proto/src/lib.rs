//! # slirc-proto
//!
//! Protocol support shared by the slirc services daemon: casemapping,
//! wildcard and hostmask matching, dialect channel-mode tables and the wire
//! limits that bound `MODE` output.
//!
//! ```rust
//! use slirc_proto::{Casemapping, mask::wildcard_match, mode::ModeTable};
//!
//! assert_eq!(Casemapping::Rfc1459.to_lower("#Chan[1]"), "#chan{1}");
//! assert!(wildcard_match("*!*@*.example", "nick!user@host.example"));
//! assert_eq!(ModeTable::rfc1459().max_modes, 4);
//! ```

#![deny(clippy::all)]

pub mod casemap;
pub mod error;
pub mod line;
pub mod mask;
pub mod mode;

pub use self::casemap::{Casemapping, irc_eq, irc_lower_char, irc_to_lower};
pub use self::error::ProtoError;
pub use self::mode::{Direction, ModeClass, ModeTable, SimpleModes};
