//! The entity arena.

use std::collections::HashMap;

use slirc_proto::Casemapping;
use tracing::debug;

use super::exttarget::{ExtConstructor, default_constructors};
use super::{
    Account, AccountFlags, Entity, EntityId, EntityVariant, ExtTarget, Group, GroupAccess,
    GroupFlags, GroupMember, IdAllocator, valid_account_name, valid_group_name,
};
use crate::error::EntityError;

/// Every known entity, keyed by id, with a casemapped name index.
///
/// Ext-targets are kept out of the name index; they are reached through
/// [`EntityRegistry::lookup_ext`] and cached by (scheme, folded param).
pub struct EntityRegistry {
    casemap: Casemapping,
    ids: IdAllocator,
    entities: HashMap<EntityId, Entity>,
    names: HashMap<String, EntityId>,
    ext_cache: HashMap<(String, String), EntityId>,
    constructors: HashMap<&'static str, ExtConstructor>,
}

impl EntityRegistry {
    pub fn new(casemap: Casemapping, sid: &str) -> Self {
        Self {
            casemap,
            ids: IdAllocator::new(sid),
            entities: HashMap::new(),
            names: HashMap::new(),
            ext_cache: HashMap::new(),
            constructors: default_constructors(),
        }
    }

    pub fn casemap(&self) -> Casemapping {
        self.casemap
    }

    pub fn uid(&self, id: EntityId) -> String {
        self.ids.uid(id)
    }

    /// Install or replace an ext-target scheme.
    pub fn register_scheme(&mut self, scheme: &'static str, constructor: ExtConstructor) {
        self.constructors.insert(scheme, constructor);
    }

    // ========================================================================
    // Registration
    // ========================================================================

    pub fn register(
        &mut self,
        name: &str,
        variant: EntityVariant,
        now: i64,
    ) -> Result<EntityId, EntityError> {
        let valid = match variant {
            EntityVariant::Account => valid_account_name(name),
            EntityVariant::Group => valid_group_name(name),
            EntityVariant::ExtTarget => false,
        };
        if !valid {
            return Err(EntityError::InvalidName(name.to_string()));
        }

        let key = self.casemap.to_lower(name);
        if self.names.contains_key(&key) {
            return Err(EntityError::DuplicateName(name.to_string()));
        }

        let id = self.ids.allocate();
        let entity = match variant {
            EntityVariant::Account => Entity::Account(Account {
                id,
                name: name.to_string(),
                registered: now,
                last_login: now,
                flags: AccountFlags::empty(),
            }),
            EntityVariant::Group => Entity::Group(Group {
                id,
                name: name.to_string(),
                registered: now,
                flags: GroupFlags::empty(),
                members: Vec::new(),
            }),
            EntityVariant::ExtTarget => return Err(EntityError::InvalidName(name.to_string())),
        };
        self.names.insert(key, id);
        self.entities.insert(id, entity);
        debug!(name = %name, id = %id, ?variant, "entity registered");
        Ok(id)
    }

    pub fn register_account(&mut self, name: &str, now: i64) -> Result<EntityId, EntityError> {
        self.register(name, EntityVariant::Account, now)
    }

    pub fn register_group(&mut self, name: &str, now: i64) -> Result<EntityId, EntityError> {
        self.register(name, EntityVariant::Group, now)
    }

    /// Re-insert an account or group loaded from storage, keeping its id.
    pub fn restore(&mut self, entity: Entity) -> Result<EntityId, EntityError> {
        if matches!(entity, Entity::ExtTarget(_)) {
            return Err(EntityError::InvalidName(entity.name().to_string()));
        }
        let key = self.casemap.to_lower(entity.name());
        if self.names.contains_key(&key) || self.entities.contains_key(&entity.id()) {
            return Err(EntityError::DuplicateName(entity.name().to_string()));
        }
        let id = entity.id();
        self.ids.observe(id);
        self.names.insert(key, id);
        self.entities.insert(id, entity);
        Ok(id)
    }

    /// Remove an entity. Group memberships naming it are dropped too.
    pub fn remove(&mut self, id: EntityId) -> Option<Entity> {
        let entity = self.entities.remove(&id)?;
        match &entity {
            Entity::ExtTarget(ext) => {
                let key = self.ext_key(ext.kind.scheme(), ext.kind.param());
                self.ext_cache.remove(&key);
            }
            other => {
                self.names.remove(&self.casemap.to_lower(other.name()));
            }
        }
        for e in self.entities.values_mut() {
            if let Entity::Group(g) = e {
                g.members.retain(|m| m.entity != id);
            }
        }
        debug!(name = %entity.name(), id = %id, "entity removed");
        Some(entity)
    }

    /// Forget a cached ext-target. The caller checks that nothing refers to it.
    pub fn release_ext(&mut self, id: EntityId) -> bool {
        if matches!(self.entities.get(&id), Some(Entity::ExtTarget(_))) {
            self.remove(id);
            true
        } else {
            false
        }
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    pub fn lookup(&self, name: &str) -> Option<&Entity> {
        let id = self.names.get(&self.casemap.to_lower(name))?;
        self.entities.get(id)
    }

    pub fn lookup_id(&self, name: &str) -> Option<EntityId> {
        self.names.get(&self.casemap.to_lower(name)).copied()
    }

    /// Like [`lookup_id`](Self::lookup_id), but `$scheme[:param]` names are
    /// built (or fetched from cache) through the scheme table.
    pub fn lookup_ext(&mut self, name: &str) -> Option<EntityId> {
        let Some(spec) = name.strip_prefix('$') else {
            return self.lookup_id(name);
        };
        let (scheme, param) = match spec.split_once(':') {
            Some((s, p)) => (s, Some(p)),
            None => (spec, None),
        };
        let scheme = scheme.to_ascii_lowercase();

        let key = self.ext_key(&scheme, param);
        if let Some(&id) = self.ext_cache.get(&key) {
            return Some(id);
        }

        let constructor = self.constructors.get(scheme.as_str())?;
        let kind = constructor(param)?;
        let id = self.ids.allocate();
        let ext = ExtTarget {
            id,
            name: kind.render(),
            kind,
        };
        debug!(name = %ext.name, id = %id, "ext target created");
        self.entities.insert(id, Entity::ExtTarget(ext));
        self.ext_cache.insert(key, id);
        Some(id)
    }

    fn ext_key(&self, scheme: &str, param: Option<&str>) -> (String, String) {
        (
            scheme.to_string(),
            param.map(|p| self.casemap.to_lower(p)).unwrap_or_default(),
        )
    }

    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(&id)
    }

    pub fn account(&self, id: EntityId) -> Option<&Account> {
        self.get(id).and_then(Entity::as_account)
    }

    pub fn account_mut(&mut self, id: EntityId) -> Option<&mut Account> {
        match self.entities.get_mut(&id) {
            Some(Entity::Account(a)) => Some(a),
            _ => None,
        }
    }

    pub fn name_of(&self, id: EntityId) -> Option<&str> {
        self.get(id).map(Entity::name)
    }

    /// Visit entities of one variant, or all when `filter` is `None`.
    pub fn for_each(&self, filter: Option<EntityVariant>, mut f: impl FnMut(&Entity)) {
        self.entities
            .values()
            .filter(|e| filter.is_none_or(|v| e.variant() == v))
            .for_each(|e| f(e));
    }

    /// Groups `entity` belongs to with channel-access inheritance.
    pub fn groups_of(&self, entity: EntityId) -> impl Iterator<Item = &Group> {
        self.entities.values().filter_map(move |e| match e {
            Entity::Group(g) if g.matches_member(entity) => Some(g),
            _ => None,
        })
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    // ========================================================================
    // Group membership
    // ========================================================================

    pub fn add_member(
        &mut self,
        group: EntityId,
        member: EntityId,
        flags: GroupAccess,
    ) -> Result<(), EntityError> {
        if !self.entities.contains_key(&member) {
            return Err(EntityError::NoSuchEntity(member.to_string()));
        }
        let g = self.group_mut(group)?;
        match g.members.iter_mut().find(|m| m.entity == member) {
            Some(existing) => existing.flags = flags,
            None => g.members.push(GroupMember {
                entity: member,
                flags,
            }),
        }
        Ok(())
    }

    pub fn remove_member(&mut self, group: EntityId, member: EntityId) -> Result<bool, EntityError> {
        let g = self.group_mut(group)?;
        let before = g.members.len();
        g.members.retain(|m| m.entity != member);
        Ok(g.members.len() != before)
    }

    fn group_mut(&mut self, id: EntityId) -> Result<&mut Group, EntityError> {
        match self.entities.get_mut(&id) {
            Some(Entity::Group(g)) => Ok(g),
            Some(other) => Err(EntityError::NotAGroup(other.name().to_string())),
            None => Err(EntityError::NoSuchEntity(id.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> EntityRegistry {
        EntityRegistry::new(Casemapping::Rfc1459, "00A")
    }

    #[test]
    fn register_and_lookup_casemapped() {
        let mut reg = registry();
        let id = reg.register_account("Alice[m]", 10).unwrap();
        assert_eq!(reg.lookup("alice{M}").map(Entity::id), Some(id));
        assert_eq!(reg.uid(id), "00AAAAAAC");
        assert!(matches!(
            reg.register_account("ALICE[m]", 11),
            Err(EntityError::DuplicateName(_))
        ));
        assert!(matches!(
            reg.register("$oper", EntityVariant::ExtTarget, 0),
            Err(EntityError::InvalidName(_))
        ));
    }

    #[test]
    fn ext_targets_are_cached() {
        let mut reg = registry();
        let a = reg.lookup_ext("$channel:#Dev").unwrap();
        let b = reg.lookup_ext("$CHANNEL:#dev").unwrap();
        assert_eq!(a, b);
        assert_eq!(reg.name_of(a), Some("$channel:#Dev"));
        assert_ne!(reg.lookup_ext("$channel:#other"), Some(a));
        assert_eq!(reg.lookup_ext("$nosuch"), None);
        assert_eq!(reg.lookup_ext("$server"), None);
        // ext targets never shadow real names
        assert!(reg.lookup("$channel:#dev").is_none());
    }

    #[test]
    fn lookup_ext_falls_back_to_names() {
        let mut reg = registry();
        let id = reg.register_account("bob", 0).unwrap();
        assert_eq!(reg.lookup_ext("BOB"), Some(id));
    }

    #[test]
    fn release_ext_only_touches_ext_targets() {
        let mut reg = registry();
        let acc = reg.register_account("bob", 0).unwrap();
        let ext = reg.lookup_ext("$oper").unwrap();
        assert!(!reg.release_ext(acc));
        assert!(reg.release_ext(ext));
        assert!(reg.get(ext).is_none());
        // a fresh instance gets a fresh id
        assert_ne!(reg.lookup_ext("$oper"), Some(ext));
    }

    #[test]
    fn membership_and_removal() {
        let mut reg = registry();
        let alice = reg.register_account("alice", 0).unwrap();
        let staff = reg.register_group("!staff", 0).unwrap();
        reg.add_member(staff, alice, GroupAccess::CHANACS).unwrap();
        assert_eq!(reg.groups_of(alice).count(), 1);
        assert!(matches!(
            reg.add_member(alice, staff, GroupAccess::CHANACS),
            Err(EntityError::NotAGroup(_))
        ));

        reg.remove(alice);
        assert!(reg.lookup("alice").is_none());
        let group = reg.get(staff).and_then(Entity::as_group).unwrap();
        assert!(group.members.is_empty());
    }

    #[test]
    fn for_each_filters_by_variant() {
        let mut reg = registry();
        reg.register_account("a", 0).unwrap();
        reg.register_account("b", 0).unwrap();
        reg.register_group("!g", 0).unwrap();
        reg.lookup_ext("$oper");

        let mut accounts = 0;
        reg.for_each(Some(EntityVariant::Account), |_| accounts += 1);
        let mut all = 0;
        reg.for_each(None, |_| all += 1);
        assert_eq!((accounts, all), (2, 4));
    }

    #[test]
    fn restore_keeps_ids_unique() {
        let mut reg = registry();
        let restored = Entity::Account(Account {
            id: EntityId::from_raw(100),
            name: "old".into(),
            registered: 0,
            last_login: 0,
            flags: AccountFlags::HOLD,
        });
        reg.restore(restored).unwrap();
        let fresh = reg.register_account("new", 0).unwrap();
        assert_eq!(fresh.get(), 101);
    }
}
