//! Channel mode vocabulary, dialect tables and parsing.

mod parse;
mod table;
mod types;

pub use self::parse::{ModeChange, parse_mode_changes};
pub use self::table::{ExtMode, ModeTable, SimpleMode, StatusMode};
pub use self::types::{Direction, ExtValidator, ModeClass, SimpleModes};
