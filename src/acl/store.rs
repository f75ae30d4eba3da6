//! Storage for access lists.
//!
//! Each registered channel owns an insertion-ordered list of records. An
//! entity index maps every entity to the channels it has records on, so
//! dropping an entity touches only those channels.

use std::collections::{BTreeSet, HashMap};

use slirc_proto::Casemapping;

use super::event::ChanacsChanged;
use super::record::{AccessRecord, AccessTarget};
use crate::entity::EntityId;

#[derive(Debug, Default)]
pub struct AclStore {
    casemap: Casemapping,
    /// Casemapped channel name -> records in insertion order.
    lists: HashMap<String, Vec<AccessRecord>>,
    /// Entity -> casemapped channel names it has a record on.
    by_entity: HashMap<EntityId, BTreeSet<String>>,
    pending: Vec<ChanacsChanged>,
}

impl AclStore {
    pub fn new(casemap: Casemapping) -> Self {
        Self {
            casemap,
            ..Self::default()
        }
    }

    pub fn fold(&self, channel: &str) -> String {
        self.casemap.to_lower(channel)
    }

    /// Records of `channel` in insertion order.
    pub fn list(&self, channel: &str) -> &[AccessRecord] {
        self.lists
            .get(&self.fold(channel))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn position(&self, channel: &str, target: &AccessTarget) -> Option<usize> {
        self.list(channel).iter().position(|r| r.target.same_as(target))
    }

    pub fn get(&self, channel: &str, target: &AccessTarget) -> Option<&AccessRecord> {
        self.list(channel).iter().find(|r| r.target.same_as(target))
    }

    pub(super) fn get_mut(&mut self, channel: &str, target: &AccessTarget) -> Option<&mut AccessRecord> {
        let key = self.fold(channel);
        self.lists
            .get_mut(&key)?
            .iter_mut()
            .find(|r| r.target.same_as(target))
    }

    /// Append a record. The caller guarantees no record for the target exists.
    pub fn insert(&mut self, channel: &str, record: AccessRecord) {
        let key = self.fold(channel);
        if let Some(id) = record.target.entity() {
            self.by_entity.entry(id).or_default().insert(key.clone());
        }
        self.lists.entry(key).or_default().push(record);
    }

    pub fn remove(&mut self, channel: &str, target: &AccessTarget) -> Option<AccessRecord> {
        let key = self.fold(channel);
        let list = self.lists.get_mut(&key)?;
        let idx = list.iter().position(|r| r.target.same_as(target))?;
        let record = list.remove(idx);
        if list.is_empty() {
            self.lists.remove(&key);
        }
        if let Some(id) = record.target.entity() {
            self.unindex(id, &key);
        }
        Some(record)
    }

    fn unindex(&mut self, id: EntityId, key: &str) {
        if let Some(channels) = self.by_entity.get_mut(&id) {
            channels.remove(key);
            if channels.is_empty() {
                self.by_entity.remove(&id);
            }
        }
    }

    /// Remove and return every record of a channel.
    pub fn drop_channel(&mut self, channel: &str) -> Vec<AccessRecord> {
        let key = self.fold(channel);
        let records = self.lists.remove(&key).unwrap_or_default();
        for id in records.iter().filter_map(|r| r.target.entity()) {
            self.unindex(id, &key);
        }
        records
    }

    /// Casemapped names of the channels `id` has a record on.
    pub fn channels_of(&self, id: EntityId) -> Vec<String> {
        self.by_entity
            .get(&id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of records that point at `id`.
    pub fn references(&self, id: EntityId) -> usize {
        self.by_entity.get(&id).map_or(0, BTreeSet::len)
    }

    /// Remove and return every record of `id`, keyed by casemapped channel.
    pub fn drop_entity(&mut self, id: EntityId) -> Vec<(String, AccessRecord)> {
        let target = AccessTarget::Entity(id);
        self.channels_of(id)
            .into_iter()
            .filter_map(|key| {
                let record = self.remove(&key, &target)?;
                Some((key, record))
            })
            .collect()
    }

    /// Casemapped names of all channels with at least one record.
    pub fn channels(&self) -> impl Iterator<Item = &str> {
        self.lists.keys().map(String::as_str)
    }

    pub fn record_count(&self) -> usize {
        self.lists.values().map(Vec::len).sum()
    }

    pub(super) fn push_event(&mut self, event: ChanacsChanged) {
        self.pending.push(event);
    }

    /// Drain queued change events, oldest first.
    pub fn take_events(&mut self) -> Vec<ChanacsChanged> {
        std::mem::take(&mut self.pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acl::Privileges;

    fn record(target: AccessTarget, level: Privileges) -> AccessRecord {
        AccessRecord {
            level,
            ..AccessRecord::new(target, 0)
        }
    }

    #[test]
    fn entity_index_follows_records() {
        let mut store = AclStore::new(Casemapping::Rfc1459);
        let alice = EntityId::from_raw(2);
        store.insert("#A", record(AccessTarget::Entity(alice), Privileges::VOP_DEF));
        store.insert("#b", record(AccessTarget::Entity(alice), Privileges::AOP_DEF));
        store.insert("#b", record(AccessTarget::Mask("*!*@x".into()), Privileges::AKICK));

        assert_eq!(store.references(alice), 2);
        assert_eq!(store.channels_of(alice), vec!["#a".to_string(), "#b".to_string()]);
        assert_eq!(store.list("#B").len(), 2);

        store.remove("#a", &AccessTarget::Entity(alice));
        assert_eq!(store.references(alice), 1);
        assert!(store.list("#a").is_empty());

        let dropped = store.drop_channel("#b");
        assert_eq!(dropped.len(), 2);
        assert_eq!(store.references(alice), 0);
        assert_eq!(store.record_count(), 0);
    }

    #[test]
    fn drop_entity_touches_only_its_channels() {
        let mut store = AclStore::new(Casemapping::Ascii);
        let alice = EntityId::from_raw(2);
        let bob = EntityId::from_raw(3);
        store.insert("#a", record(AccessTarget::Entity(alice), Privileges::VOICE));
        store.insert("#a", record(AccessTarget::Entity(bob), Privileges::VOICE));
        store.insert("#c", record(AccessTarget::Entity(alice), Privileges::OP));

        let dropped = store.drop_entity(alice);
        assert_eq!(dropped.len(), 2);
        assert_eq!(store.list("#a").len(), 1);
        assert!(store.list("#c").is_empty());
        assert_eq!(store.references(bob), 1);
    }

    #[test]
    fn masks_are_matched_case_insensitively() {
        let mut store = AclStore::new(Casemapping::Ascii);
        store.insert("#a", record(AccessTarget::Mask("*!*@Host".into()), Privileges::AKICK));
        assert!(store.get("#a", &AccessTarget::Mask("*!*@host".into())).is_some());
        assert_eq!(store.position("#a", &AccessTarget::Mask("*!*@HOST".into())), Some(0));
    }
}
