//! Entities: every named identity an access record can point at.
//!
//! - [`Account`]: a registered user.
//! - [`Group`]: a registered collective whose members inherit its access.
//! - [`ExtTarget`]: a computed identity such as `$oper` or `$channel:#foo`.
//!
//! Entities live in the [`EntityRegistry`] arena and are referenced
//! everywhere else by [`EntityId`].

mod exttarget;
mod registry;
mod uid;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::acl::Privileges;
use crate::state::User;

pub use exttarget::{ExtConstructor, ExtKind, MAX_CHANACS_DEPTH, default_constructors};
pub use registry::EntityRegistry;
pub use uid::{EntityId, IdAllocator};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
    pub struct AccountFlags: u32 {
        const HOLD = 0x01;
        const NOBURST = 0x02;
        /// Registered but not yet verified.
        const WAITAUTH = 0x04;
        /// Exempt from the channel quota.
        const REGNOLIMIT = 0x08;
        /// May not become a founder.
        const RESTRICTED = 0x10;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
    pub struct GroupFlags: u32 {
        const REGNOLIMIT = 0x01;
        const ACSNOLIMIT = 0x02;
        const OPEN = 0x04;
        const PUBLIC = 0x08;
    }
}

bitflags! {
    /// What a member may do on behalf of a group.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
    pub struct GroupAccess: u32 {
        const FLAGS = 0x001;
        /// Member inherits the group's channel access.
        const CHANACS = 0x002;
        const MEMOS = 0x004;
        const SET = 0x008;
        const VHOST = 0x010;
        const BAN = 0x020;
        const INVITE = 0x040;
        const ACLVIEW = 0x080;
        const FOUNDER = 0x100;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: EntityId,
    pub name: String,
    pub registered: i64,
    pub last_login: i64,
    #[serde(default)]
    pub flags: AccountFlags,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMember {
    pub entity: EntityId,
    pub flags: GroupAccess,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: EntityId,
    pub name: String,
    pub registered: i64,
    #[serde(default)]
    pub flags: GroupFlags,
    #[serde(default)]
    pub members: Vec<GroupMember>,
}

impl Group {
    pub fn member(&self, entity: EntityId) -> Option<&GroupMember> {
        self.members.iter().find(|m| m.entity == entity)
    }

    /// Whether `entity` inherits this group's channel access.
    pub fn matches_member(&self, entity: EntityId) -> bool {
        self.member(entity)
            .is_some_and(|m| m.flags.contains(GroupAccess::CHANACS))
    }
}

/// A computed identity. Created lazily, never persisted on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtTarget {
    pub id: EntityId,
    pub name: String,
    pub kind: ExtKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entity {
    Account(Account),
    Group(Group),
    ExtTarget(ExtTarget),
}

/// Variant selector for registration and iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityVariant {
    Account,
    Group,
    ExtTarget,
}

impl Entity {
    pub fn id(&self) -> EntityId {
        match self {
            Self::Account(a) => a.id,
            Self::Group(g) => g.id,
            Self::ExtTarget(e) => e.id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Account(a) => &a.name,
            Self::Group(g) => &g.name,
            Self::ExtTarget(e) => &e.name,
        }
    }

    pub fn variant(&self) -> EntityVariant {
        match self {
            Self::Account(_) => EntityVariant::Account,
            Self::Group(_) => EntityVariant::Group,
            Self::ExtTarget(_) => EntityVariant::ExtTarget,
        }
    }

    pub fn as_account(&self) -> Option<&Account> {
        match self {
            Self::Account(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_group(&self) -> Option<&Group> {
        match self {
            Self::Group(g) => Some(g),
            _ => None,
        }
    }

    fn caps(&self) -> &dyn Capabilities {
        match self {
            Self::Account(a) => a,
            Self::Group(g) => g,
            Self::ExtTarget(e) => e,
        }
    }
}

/// What the rest of the engine must answer for capability checks.
pub trait EntityContext {
    /// Casemap a channel name.
    fn fold(&self, name: &str) -> String;

    /// Channels on which `id` currently holds FOUNDER.
    fn founded_channels(&self, id: EntityId) -> usize;

    /// 0 means unlimited.
    fn max_channels_per_account(&self) -> usize;

    /// Combined flags of `user` on `channel`, evaluated at nesting `depth`.
    fn chanacs_flags(&self, channel: &str, user: &User, depth: u8) -> Privileges;
}

/// Per-variant behaviour of an entity.
pub trait Capabilities {
    /// Whether this entity covers a connected user.
    fn matches_user(&self, user: &User, ctx: &dyn EntityContext, depth: u8) -> bool;

    /// Whether this entity covers another entity.
    fn matches_entity(&self, other: EntityId) -> bool;

    fn can_register_channel(&self, ctx: &dyn EntityContext) -> bool;

    fn allow_foundership(&self) -> bool;
}

impl Capabilities for Account {
    fn matches_user(&self, user: &User, _ctx: &dyn EntityContext, _depth: u8) -> bool {
        user.account == Some(self.id)
    }

    fn matches_entity(&self, other: EntityId) -> bool {
        self.id == other
    }

    fn can_register_channel(&self, ctx: &dyn EntityContext) -> bool {
        if self.flags.contains(AccountFlags::REGNOLIMIT) {
            return true;
        }
        let max = ctx.max_channels_per_account();
        max == 0 || ctx.founded_channels(self.id) < max
    }

    fn allow_foundership(&self) -> bool {
        !self.flags.contains(AccountFlags::RESTRICTED)
    }
}

impl Capabilities for Group {
    fn matches_user(&self, user: &User, _ctx: &dyn EntityContext, _depth: u8) -> bool {
        user.account.is_some_and(|acc| self.matches_entity(acc))
    }

    fn matches_entity(&self, other: EntityId) -> bool {
        self.matches_member(other)
    }

    fn can_register_channel(&self, _ctx: &dyn EntityContext) -> bool {
        self.flags.contains(GroupFlags::REGNOLIMIT)
    }

    fn allow_foundership(&self) -> bool {
        true
    }
}

impl Capabilities for ExtTarget {
    fn matches_user(&self, user: &User, ctx: &dyn EntityContext, depth: u8) -> bool {
        self.kind.matches_user(user, ctx, depth)
    }

    fn matches_entity(&self, other: EntityId) -> bool {
        self.id == other
    }

    fn can_register_channel(&self, _ctx: &dyn EntityContext) -> bool {
        false
    }

    fn allow_foundership(&self) -> bool {
        false
    }
}

impl Capabilities for Entity {
    fn matches_user(&self, user: &User, ctx: &dyn EntityContext, depth: u8) -> bool {
        self.caps().matches_user(user, ctx, depth)
    }

    fn matches_entity(&self, other: EntityId) -> bool {
        self.caps().matches_entity(other)
    }

    fn can_register_channel(&self, ctx: &dyn EntityContext) -> bool {
        self.caps().can_register_channel(ctx)
    }

    fn allow_foundership(&self) -> bool {
        self.caps().allow_foundership()
    }
}

/// Account names: no hostmask or sigil characters.
pub fn valid_account_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 32
        && !name.starts_with(['$', '#', '!', '&'])
        && !name.contains(['!', '@', ' ', ',', '*', '?'])
        && name.chars().all(|c| !c.is_control())
}

/// Group names start with `!`.
pub fn valid_group_name(name: &str) -> bool {
    name.len() > 1
        && name.starts_with('!')
        && valid_account_name(&name[1..])
}
