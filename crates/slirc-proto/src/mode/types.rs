//! Channel mode vocabulary shared by the mode table, the parser and the
//! services engine.

use std::fmt;

use bitflags::bitflags;

/// Direction of a mode change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Add,
    Del,
}

impl Direction {
    pub fn as_char(self) -> char {
        match self {
            Direction::Add => '+',
            Direction::Del => '-',
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

bitflags! {
    /// Parameterless (type D) channel modes plus the key and limit bits.
    ///
    /// The named bits are the modes every dialect has. Dialect-specific
    /// letters are assigned the remaining bits by [`ModeTable`](super::ModeTable).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct SimpleModes: u32 {
        const INVITE = 0x1;
        const KEY = 0x2;
        const LIMIT = 0x4;
        const MODERATED = 0x8;
        const NO_EXTERNAL = 0x10;
        const PRIVATE = 0x40;
        const SECRET = 0x80;
        const TOPIC = 0x100;

        const _ = !0;
    }
}

impl SimpleModes {
    /// Key and limit carry parameters and are handled separately from the
    /// plain letter run.
    pub const PARAMETERIZED: SimpleModes = SimpleModes::KEY.union(SimpleModes::LIMIT);

    /// First bit handed out to dialect-specific letters.
    pub const FIRST_DIALECT_BIT: u32 = 0x200;
}

/// Validator applied to the parameter of an extended (type C) mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtValidator {
    /// Any non-empty token.
    Any,
    /// A decimal number within the inclusive range.
    Numeric { min: u32, max: u32 },
    /// `<joins>:<seconds>`, both positive.
    JoinThrottle,
    /// A channel name, e.g. a forward target.
    Channel,
}

impl ExtValidator {
    /// Check a parameter on its own. Callers may apply further context
    /// checks (e.g. that a forward target is registered).
    pub fn accepts(&self, value: &str) -> bool {
        if value.is_empty() || value.contains([' ', ',']) {
            return false;
        }
        match self {
            ExtValidator::Any => true,
            ExtValidator::Numeric { min, max } => value
                .parse::<u32>()
                .map(|n| (*min..=*max).contains(&n))
                .unwrap_or(false),
            ExtValidator::JoinThrottle => match value.split_once(':') {
                Some((joins, secs)) => {
                    matches!(joins.parse::<u32>(), Ok(n) if n > 0)
                        && matches!(secs.parse::<u32>(), Ok(n) if n > 0)
                }
                None => false,
            },
            ExtValidator::Channel => value.starts_with(['#', '&']) && value.len() > 1,
        }
    }
}

/// How a mode letter is handled by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeClass {
    /// Parameterless mode with its bit.
    Simple(SimpleModes),
    /// Channel key (`+k key`, `-k key`).
    Key,
    /// Member limit (`+l n`, `-l`).
    Limit,
    /// Extended mode by slot index; parameter on set only.
    Ext(usize),
    /// List mode (bans, exceptions, ...); parameter both ways.
    List,
    /// Membership status (op, voice, ...); parameter both ways.
    Status,
}

impl ModeClass {
    /// Whether a change of this class consumes a parameter in the given direction.
    pub fn takes_param(self, dir: Direction) -> bool {
        match self {
            ModeClass::Simple(_) => false,
            ModeClass::Key | ModeClass::List | ModeClass::Status => true,
            ModeClass::Limit | ModeClass::Ext(_) => dir == Direction::Add,
        }
    }
}
