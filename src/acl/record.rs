//! Access records and their storage hooks.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::flags::apply_flag_string;
use super::privs::{AclPolicy, Privileges};
use crate::entity::{EntityId, EntityRegistry};

/// Who an access record applies to. Never both an entity and a mask.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccessTarget {
    Entity(EntityId),
    Mask(String),
}

impl AccessTarget {
    pub fn entity(&self) -> Option<EntityId> {
        match self {
            Self::Entity(id) => Some(*id),
            Self::Mask(_) => None,
        }
    }

    pub fn mask(&self) -> Option<&str> {
        match self {
            Self::Entity(_) => None,
            Self::Mask(m) => Some(m),
        }
    }

    /// Literal equality: entities by id, masks ASCII case-insensitively.
    pub fn same_as(&self, other: &AccessTarget) -> bool {
        match (self, other) {
            (Self::Entity(a), Self::Entity(b)) => a == b,
            (Self::Mask(a), Self::Mask(b)) => a.eq_ignore_ascii_case(b),
            _ => false,
        }
    }
}

impl fmt::Display for AccessTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Entity(id) => write!(f, "{id}"),
            Self::Mask(m) => f.write_str(m),
        }
    }
}

/// One (channel, target) fact. The channel is the key of the list holding it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessRecord {
    pub target: AccessTarget,
    pub level: Privileges,
    pub modified: i64,
    pub setter: Option<EntityId>,
}

impl AccessRecord {
    pub fn new(target: AccessTarget, now: i64) -> Self {
        Self {
            target,
            level: Privileges::empty(),
            modified: now,
            setter: None,
        }
    }

    pub fn is_akick(&self) -> bool {
        self.level.is_akick()
    }
}

// ============================================================================
// Persistence hooks
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("missing key {0:?}")]
    MissingKey(&'static str),

    #[error("bad value {value:?} for {key:?}")]
    BadValue { key: &'static str, value: String },

    #[error("unknown entity {0:?}")]
    UnknownEntity(String),
}

/// Flatten a record into opaque key/value pairs. Entities are stored by
/// name so ids need not survive a reload.
pub fn serialize_record(
    channel: &str,
    record: &AccessRecord,
    entities: &EntityRegistry,
) -> Vec<(String, String)> {
    let mut pairs = vec![("channel".to_string(), channel.to_string())];
    match &record.target {
        AccessTarget::Entity(id) => {
            let name = entities.name_of(*id).unwrap_or_default();
            pairs.push(("entity".into(), name.to_string()));
        }
        AccessTarget::Mask(mask) => pairs.push(("mask".into(), mask.clone())),
    }
    pairs.push(("flags".into(), record.level.to_flag_string()));
    pairs.push(("modified".into(), record.modified.to_string()));
    if let Some(name) = record.setter.and_then(|id| entities.name_of(id)) {
        pairs.push(("setter".into(), name.to_string()));
    }
    pairs
}

/// Rebuild a record from [`serialize_record`] output. Ext-target names are
/// resolved (and created) through the registry.
pub fn deserialize_record(
    pairs: &[(String, String)],
    entities: &mut EntityRegistry,
) -> Result<(String, AccessRecord), RecordError> {
    let get = |key: &'static str| {
        pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    };

    let channel = get("channel").ok_or(RecordError::MissingKey("channel"))?;
    let target = match (get("entity"), get("mask")) {
        (Some(name), None) => AccessTarget::Entity(
            entities
                .lookup_ext(name)
                .ok_or_else(|| RecordError::UnknownEntity(name.to_string()))?,
        ),
        (None, Some(mask)) => AccessTarget::Mask(mask.to_string()),
        (Some(_), Some(_)) => {
            return Err(RecordError::BadValue {
                key: "mask",
                value: "both entity and mask present".into(),
            });
        }
        (None, None) => return Err(RecordError::MissingKey("entity")),
    };

    let flags = get("flags").ok_or(RecordError::MissingKey("flags"))?;
    if !flags.starts_with('+') {
        return Err(RecordError::BadValue {
            key: "flags",
            value: flags.to_string(),
        });
    }
    let level = apply_flag_string(flags, Privileges::empty(), &AclPolicy::default());

    let modified = match get("modified") {
        Some(v) => v.parse().map_err(|_| RecordError::BadValue {
            key: "modified",
            value: v.to_string(),
        })?,
        None => 0,
    };
    let setter = get("setter").and_then(|name| entities.lookup_id(name));

    Ok((
        channel.to_string(),
        AccessRecord {
            target,
            level,
            modified,
            setter,
        },
    ))
}
