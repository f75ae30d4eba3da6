//! Registered channels.

use std::collections::{BTreeMap, HashMap};

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use slirc_proto::Casemapping;

use super::mlock::ModeLock;
use crate::error::ChannelError;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
    pub struct ChannelFlags: u32 {
        const HOLD = 0x0001;
        const NOOP = 0x0002;
        /// Non-founders may only hand out privileges they fully hold.
        const LIMITFLAGS = 0x0004;
        /// Revert status modes given to users without matching access.
        const SECURE = 0x0008;
        const VERBOSE = 0x0010;
        const RESTRICTED = 0x0020;
        const KEEPTOPIC = 0x0040;
        const VERBOSE_OPS = 0x0080;
        const TOPICLOCK = 0x0100;
        const GUARD = 0x0200;
        const PRIVATE = 0x0400;
        const NOSYNC = 0x0800;
        const ANTIFLOOD = 0x1000;
        const PUBACL = 0x2000;

        /// Transient: a mode-lock check is pending for end of turn.
        const MLOCK_CHECK = 0x8000_0000;
    }
}

impl ChannelFlags {
    /// Flags that are written to storage.
    pub const PERSISTENT: ChannelFlags = ChannelFlags::all().difference(ChannelFlags::MLOCK_CHECK);
}

/// Metadata key for extended mode locks.
pub const MLOCK_EXT_METADATA_KEY: &str = "private:mlockext";

/// A registered channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRecord {
    pub name: String,
    pub registered: i64,
    pub last_used: i64,
    #[serde(default)]
    pub flags: ChannelFlags,
    #[serde(default)]
    pub mlock: ModeLock,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl ChannelRecord {
    pub fn new(name: &str, now: i64) -> Self {
        Self {
            name: name.to_string(),
            registered: now,
            last_used: now,
            flags: ChannelFlags::empty(),
            mlock: ModeLock::default(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    /// Set a metadata value; `None` deletes it.
    pub fn set_metadata(&mut self, key: &str, value: Option<String>) {
        match value {
            Some(v) => {
                self.metadata.insert(key.to_string(), v);
            }
            None => {
                self.metadata.remove(key);
            }
        }
    }

    pub fn ext_mlock(&self) -> Option<&str> {
        self.metadata(MLOCK_EXT_METADATA_KEY)
    }

    pub fn has_flag(&self, flag: ChannelFlags) -> bool {
        self.flags.contains(flag)
    }
}

/// Channel names accepted for registration.
pub fn valid_channel_name(name: &str) -> bool {
    name.len() > 1
        && name.len() <= 50
        && name.starts_with('#')
        && !name.contains([' ', ',', '\x07'])
        && name.chars().all(|c| !c.is_control())
}

/// All registered channels keyed by casemapped name.
#[derive(Debug, Default)]
pub struct ChannelRegistry {
    casemap: Casemapping,
    channels: HashMap<String, ChannelRecord>,
}

impl ChannelRegistry {
    pub fn new(casemap: Casemapping) -> Self {
        Self {
            casemap,
            channels: HashMap::new(),
        }
    }

    pub fn fold(&self, name: &str) -> String {
        self.casemap.to_lower(name)
    }

    pub fn register(&mut self, name: &str, now: i64) -> Result<&mut ChannelRecord, ChannelError> {
        if !valid_channel_name(name) {
            return Err(ChannelError::InvalidName(name.to_string()));
        }
        self.insert(ChannelRecord::new(name, now))
    }

    /// Insert a record loaded from storage.
    pub fn insert(&mut self, record: ChannelRecord) -> Result<&mut ChannelRecord, ChannelError> {
        use std::collections::hash_map::Entry;

        match self.channels.entry(self.casemap.to_lower(&record.name)) {
            Entry::Occupied(_) => Err(ChannelError::AlreadyRegistered(record.name)),
            Entry::Vacant(slot) => Ok(slot.insert(record)),
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<ChannelRecord> {
        let key = self.fold(name);
        self.channels.remove(&key)
    }

    pub fn get(&self, name: &str) -> Option<&ChannelRecord> {
        self.channels.get(&self.fold(name))
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut ChannelRecord> {
        let key = self.fold(name);
        self.channels.get_mut(&key)
    }

    pub fn require(&self, name: &str) -> Result<&ChannelRecord, ChannelError> {
        self.get(name)
            .ok_or_else(|| ChannelError::NotRegistered(name.to_string()))
    }

    pub fn require_mut(&mut self, name: &str) -> Result<&mut ChannelRecord, ChannelError> {
        self.get_mut(name)
            .ok_or_else(|| ChannelError::NotRegistered(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.channels.contains_key(&self.fold(name))
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChannelRecord> {
        self.channels.values()
    }

    /// Channels with a deferred mode-lock check.
    pub fn pending_mlock_checks(&self) -> Vec<String> {
        self.channels
            .values()
            .filter(|c| c.has_flag(ChannelFlags::MLOCK_CHECK))
            .map(|c| c.name.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}
