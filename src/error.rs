//! Error types for the services engine.
//!
//! Each concern gets its own enum. The engine-facing ones carry an
//! `error_code()` for metrics labeling.

use thiserror::Error;

// ============================================================================
// Access list errors
// ============================================================================

/// Why an authorization check refused a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Denial {
    #[error("the requested flags exceed what the actor may set")]
    Restricted,

    #[error("the actor lacks the acl-change privilege")]
    NoFlagsPrivilege,

    #[error("founder may only be granted to an entity, not a hostmask")]
    FounderOnHostmask,

    #[error("the target may not become a founder")]
    FoundershipNotAllowed,

    #[error("the target has too many channels registered")]
    TooManyChannels,

    #[error("the actor is on the auto-kick list")]
    ActorBanned,

    #[error("auto-kick entries cannot carry other privileges")]
    AkickWithPrivileges,

    #[error("the actor lacks the {0} privilege")]
    MissingPrivilege(&'static str),
}

/// Access List Engine failures.
///
/// Every variant is raised before any state is mutated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AclError {
    #[error("{0} is not registered")]
    NotRegistered(String),

    #[error("no such entity: {0}")]
    NoSuchEntity(String),

    #[error("access list for {channel} is full ({limit} entries)")]
    TooManyEntries { channel: String, limit: usize },

    #[error("{channel} already has the maximum of {limit} founders")]
    TooManyFounders { channel: String, limit: usize },

    #[error("cannot remove the last founder of {0}")]
    LastFounder(String),

    #[error("not permitted: {0}")]
    NotPermitted(#[from] Denial),

    #[error("target names both an entity and a hostmask")]
    AmbiguousTarget,

    #[error("invalid hostmask: {0}")]
    InvalidMask(String),

    #[error("invalid template name: {0}")]
    InvalidTemplate(String),

    #[error("too many templates on {0}")]
    TooManyTemplates(String),
}

impl AclError {
    /// Get a static error code string for metrics labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotRegistered(_) => "not_registered",
            Self::NoSuchEntity(_) => "no_such_entity",
            Self::TooManyEntries { .. } => "too_many_entries",
            Self::TooManyFounders { .. } => "too_many_founders",
            Self::LastFounder(_) => "last_founder",
            Self::NotPermitted(_) => "not_permitted",
            Self::AmbiguousTarget => "ambiguous_target",
            Self::InvalidMask(_) => "invalid_mask",
            Self::InvalidTemplate(_) => "invalid_template",
            Self::TooManyTemplates(_) => "too_many_templates",
        }
    }
}

// ============================================================================
// Entity registry errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EntityError {
    #[error("name already registered: {0}")]
    DuplicateName(String),

    #[error("invalid entity name: {0}")]
    InvalidName(String),

    #[error("no such entity: {0}")]
    NoSuchEntity(String),

    #[error("{0} is not a group")]
    NotAGroup(String),
}

impl EntityError {
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::DuplicateName(_) => "duplicate_name",
            Self::InvalidName(_) => "invalid_name",
            Self::NoSuchEntity(_) => "no_such_entity",
            Self::NotAGroup(_) => "not_a_group",
        }
    }
}

// ============================================================================
// Channel registration errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("{0} is already registered")]
    AlreadyRegistered(String),

    #[error("{0} is not registered")]
    NotRegistered(String),

    #[error("invalid channel name: {0}")]
    InvalidName(String),

    #[error("{0} may not register more channels")]
    TooManyChannels(String),

    #[error(transparent)]
    Entity(#[from] EntityError),
}

impl ChannelError {
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::AlreadyRegistered(_) => "already_registered",
            Self::NotRegistered(_) => "not_registered",
            Self::InvalidName(_) => "invalid_channel_name",
            Self::TooManyChannels(_) => "too_many_channels",
            Self::Entity(e) => e.error_code(),
        }
    }
}

// ============================================================================
// Mode lock errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModeLockError {
    #[error("mode {0:?} cannot be locked")]
    Unlockable(char),

    #[error("mode {0:?} needs a parameter")]
    MissingParam(char),

    #[error("invalid parameter {param:?} for mode {letter:?}")]
    InvalidParam { letter: char, param: String },

    #[error(transparent)]
    Channel(#[from] ChannelError),
}

impl ModeLockError {
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Unlockable(_) => "unlockable_mode",
            Self::MissingParam(_) => "missing_param",
            Self::InvalidParam { .. } => "invalid_param",
            Self::Channel(e) => e.error_code(),
        }
    }
}

// ============================================================================
// Service operation errors
// ============================================================================

/// Failure of a service-level operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Acl(#[from] AclError),

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error(transparent)]
    Entity(#[from] EntityError),

    #[error(transparent)]
    ModeLock(#[from] ModeLockError),

    #[error("no such user: {0}")]
    NoSuchUser(String),

    #[error("{0} is not logged in")]
    NotLoggedIn(String),

    #[error("invalid duration: {0}")]
    InvalidDuration(String),
}

impl ServiceError {
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Acl(e) => e.error_code(),
            Self::Channel(e) => e.error_code(),
            Self::Entity(e) => e.error_code(),
            Self::ModeLock(e) => e.error_code(),
            Self::NoSuchUser(_) => "no_such_user",
            Self::NotLoggedIn(_) => "not_logged_in",
            Self::InvalidDuration(_) => "invalid_duration",
        }
    }
}

impl From<Denial> for ServiceError {
    fn from(d: Denial) -> Self {
        Self::Acl(d.into())
    }
}
