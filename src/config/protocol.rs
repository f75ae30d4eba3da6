//! Dialect description.
//!
//! The services engine knows nothing about a particular ircd; everything it
//! needs about channel modes is built from this section.

use serde::Deserialize;
use slirc_proto::mode::ExtValidator;
use slirc_proto::{Casemapping, ModeTable, ProtoError};

use super::defaults::{default_casemapping, default_max_line_len, default_max_modes, default_true};
use crate::acl::AclPolicy;

/// `[protocol]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ProtocolConfig {
    /// `ascii`, `rfc1459` or `strict-rfc1459`.
    #[serde(default = "default_casemapping")]
    pub casemapping: String,
    /// Parameters allowed per MODE line.
    #[serde(default = "default_max_modes")]
    pub max_modes: usize,
    /// Longest line the uplink accepts, including CRLF.
    #[serde(default = "default_max_line_len")]
    pub max_line_len: usize,
    /// Whether the dialect has `+h` (halfop, prefix `%`).
    #[serde(default)]
    pub halfops: bool,
    /// Whether the dialect has `+q` (owner, prefix `~`).
    #[serde(default)]
    pub owner: bool,
    /// Whether the dialect has `+a` (protect, prefix `&`).
    #[serde(default)]
    pub protect: bool,
    /// Parameterless letters beyond `imnpst`, e.g. `"cgrz"`.
    #[serde(default)]
    pub extra_simple_modes: String,
    /// List modes beyond `b`, e.g. `"eI"`.
    #[serde(default)]
    pub list_modes: String,
    /// Parameterised (type C) modes.
    #[serde(default, rename = "ext_mode")]
    pub ext_modes: Vec<ExtModeConfig>,
    /// Extra status modes beyond `o`, `v` and the ones enabled above.
    #[serde(default, rename = "status_mode")]
    pub status_modes: Vec<StatusModeConfig>,
    /// Whether secure-ops checks run on external status changes.
    #[serde(default = "default_true")]
    pub secure_ops: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtValidatorKind {
    Any,
    Numeric,
    JoinThrottle,
    Channel,
}

/// A `[[protocol.ext_mode]]` block.
#[derive(Debug, Clone, Deserialize)]
pub struct ExtModeConfig {
    pub letter: char,
    pub kind: ExtValidatorKind,
    /// Bounds for `numeric`.
    #[serde(default)]
    pub min: u32,
    #[serde(default = "u32_max")]
    pub max: u32,
}

fn u32_max() -> u32 {
    u32::MAX
}

impl ExtModeConfig {
    pub fn validator(&self) -> ExtValidator {
        match self.kind {
            ExtValidatorKind::Any => ExtValidator::Any,
            ExtValidatorKind::Numeric => ExtValidator::Numeric {
                min: self.min,
                max: self.max,
            },
            ExtValidatorKind::JoinThrottle => ExtValidator::JoinThrottle,
            ExtValidatorKind::Channel => ExtValidator::Channel,
        }
    }
}

/// A `[[protocol.status_mode]]` block.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusModeConfig {
    pub letter: char,
    pub prefix: char,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            casemapping: default_casemapping(),
            max_modes: default_max_modes(),
            max_line_len: default_max_line_len(),
            halfops: false,
            owner: false,
            protect: false,
            extra_simple_modes: String::new(),
            list_modes: String::new(),
            ext_modes: Vec::new(),
            status_modes: Vec::new(),
            secure_ops: true,
        }
    }
}

impl ProtocolConfig {
    pub fn casemapping(&self) -> Result<Casemapping, ProtoError> {
        self.casemapping.parse()
    }

    /// Build the dialect mode table.
    pub fn mode_table(&self) -> Result<ModeTable, ProtoError> {
        let mut table = ModeTable::rfc1459();
        table.max_modes = self.max_modes;
        table.max_line_len = self.max_line_len;

        if self.halfops {
            table.add_status('h', '%')?;
        }
        if self.protect {
            table.add_status('a', '&')?;
        }
        if self.owner {
            table.add_status('q', '~')?;
        }
        for status in &self.status_modes {
            table.add_status(status.letter, status.prefix)?;
        }
        for letter in self.list_modes.chars() {
            table.add_list(letter)?;
        }
        for letter in self.extra_simple_modes.chars() {
            table.add_simple(letter)?;
        }
        for ext in &self.ext_modes {
            table.add_ext(ext.letter, ext.validator())?;
        }
        Ok(table)
    }

    pub fn policy(&self) -> AclPolicy {
        AclPolicy::new(self.halfops, self.owner, self.protect)
    }
}
