//! Computed identities reachable through the `$scheme[:param]` syntax.

use std::collections::HashMap;

use slirc_proto::mask::wildcard_match;

use super::EntityContext;
use crate::state::User;

/// `$chanacs` evaluation stops nesting past this depth.
pub const MAX_CHANACS_DEPTH: u8 = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtKind {
    /// `$oper`
    Oper,
    /// `$registered`
    Registered,
    /// `$server:<mask>`
    Server(String),
    /// `$channel:<#chan>`
    Channel(String),
    /// `$chanacs:<#chan>`
    Chanacs(String),
}

/// Builds an [`ExtKind`] from the text after the colon, or rejects it.
pub type ExtConstructor = fn(Option<&str>) -> Option<ExtKind>;

fn oper(_: Option<&str>) -> Option<ExtKind> {
    Some(ExtKind::Oper)
}

fn registered(_: Option<&str>) -> Option<ExtKind> {
    Some(ExtKind::Registered)
}

fn server(param: Option<&str>) -> Option<ExtKind> {
    param
        .filter(|p| !p.is_empty())
        .map(|p| ExtKind::Server(p.to_string()))
}

fn channel(param: Option<&str>) -> Option<ExtKind> {
    param
        .filter(|p| p.starts_with('#') && p.len() > 1)
        .map(|p| ExtKind::Channel(p.to_string()))
}

fn chanacs(param: Option<&str>) -> Option<ExtKind> {
    param
        .filter(|p| !p.is_empty())
        .map(|p| ExtKind::Chanacs(p.to_string()))
}

/// The built-in scheme table.
pub fn default_constructors() -> HashMap<&'static str, ExtConstructor> {
    let mut table: HashMap<&'static str, ExtConstructor> = HashMap::new();
    table.insert("oper", oper);
    table.insert("registered", registered);
    table.insert("server", server);
    table.insert("channel", channel);
    table.insert("chanacs", chanacs);
    table
}

impl ExtKind {
    pub fn scheme(&self) -> &'static str {
        match self {
            Self::Oper => "oper",
            Self::Registered => "registered",
            Self::Server(_) => "server",
            Self::Channel(_) => "channel",
            Self::Chanacs(_) => "chanacs",
        }
    }

    pub fn param(&self) -> Option<&str> {
        match self {
            Self::Oper | Self::Registered => None,
            Self::Server(p) | Self::Channel(p) | Self::Chanacs(p) => Some(p),
        }
    }

    /// Canonical `$scheme[:param]` name.
    pub fn render(&self) -> String {
        match self.param() {
            Some(p) => format!("${}:{}", self.scheme(), p),
            None => format!("${}", self.scheme()),
        }
    }

    pub(super) fn matches_user(&self, user: &User, ctx: &dyn EntityContext, depth: u8) -> bool {
        match self {
            Self::Oper => user.oper,
            Self::Registered => user.account.is_some(),
            Self::Server(mask) => wildcard_match(mask, &user.server),
            Self::Channel(chan) => user.channels.contains(&ctx.fold(chan)),
            Self::Chanacs(chan) => {
                if depth >= MAX_CHANACS_DEPTH {
                    return false;
                }
                let flags = ctx.chanacs_flags(chan, user, depth + 1);
                !flags.is_empty() && !flags.is_akick()
            }
        }
    }
}
