//! The access list engine.
//!
//! All mutation goes through an [`AccessHandle`] obtained from
//! [`AccessEngine::open`]. The handle validates every change against the
//! authorization rules before touching the record, and prunes the record
//! when it is dropped with an empty level. Read-side queries live on
//! [`AclView`], which borrows everything immutably and doubles as the
//! [`EntityContext`] for capability checks.

use slirc_proto::mask::{Specificity, looks_like_hostmask, validate_hostmask, wildcard_match};
use tracing::{debug, info};

use super::event::ChanacsChanged;
use super::flags::allow_flags;
use super::privs::{AclPolicy, Privileges};
use super::record::{AccessRecord, AccessTarget};
use super::store::AclStore;
use crate::channel::ChannelRegistry;
use crate::entity::{AccountFlags, Capabilities, EntityContext, EntityId, EntityRegistry};
use crate::error::{AclError, Denial};
use crate::state::{Network, User};

/// A login this recent (seconds) makes a succession candidate preferable.
pub const RECENTLY_SEEN: i64 = 7 * 24 * 60 * 60;

/// Size limits on access lists and foundership.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AclLimits {
    /// Records per channel; 0 is unlimited.
    pub max_chanacs: usize,
    /// Founders per channel; 0 is unlimited.
    pub max_founders: usize,
    /// Channels an account may found; 0 is unlimited.
    pub max_channels_per_account: usize,
}

impl Default for AclLimits {
    fn default() -> Self {
        Self {
            max_chanacs: 0,
            max_founders: 4,
            max_channels_per_account: 5,
        }
    }
}

/// Who is making a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    /// Services itself: expiry, succession, registration.
    Services,
    /// An entity acting with `flags` on the channel in question.
    Entity { id: EntityId, flags: Privileges },
}

impl Actor {
    /// Value recorded as the record's setter.
    pub fn setter(self) -> Option<EntityId> {
        match self {
            Self::Services => None,
            Self::Entity { id, .. } => Some(id),
        }
    }
}

/// The delta a modification actually applied after normalization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Realized {
    pub add: Privileges,
    pub remove: Privileges,
}

impl Realized {
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty()
    }
}

/// What `actor_flags` may touch on a record.
///
/// Founders may touch everything. Anyone else is capped by
/// [`allow_flags`]; on their own record they may additionally touch what
/// they already hold. An auto-kicked actor may not edit their own record.
pub fn restrict_for(
    actor_flags: Privileges,
    targeting_self: bool,
    limitflags: bool,
    policy: &AclPolicy,
) -> Result<Privileges, Denial> {
    if actor_flags.contains(Privileges::FOUNDER) {
        return Ok(policy.all);
    }
    if targeting_self && actor_flags.is_akick() {
        return Err(Denial::ActorBanned);
    }
    let allowed = allow_flags(actor_flags, limitflags);
    let restrict = if targeting_self {
        allowed | actor_flags
    } else {
        allowed
    };
    Ok(restrict & policy.all)
}

/// Turn user input into an access target.
///
/// `$scheme[:param]` names an ext-target, anything containing `!` or `@`
/// is a hostmask, and everything else an entity name.
pub fn resolve_target(entities: &mut EntityRegistry, text: &str) -> Result<AccessTarget, AclError> {
    if text.starts_with('$') {
        return entities
            .lookup_ext(text)
            .map(AccessTarget::Entity)
            .ok_or_else(|| AclError::NoSuchEntity(text.to_string()));
    }

    let entity = entities.lookup_id(text);
    if looks_like_hostmask(text) {
        let mask_ok = validate_hostmask(text).is_ok();
        return match (entity, mask_ok) {
            (Some(_), true) => Err(AclError::AmbiguousTarget),
            (Some(id), false) => Ok(AccessTarget::Entity(id)),
            (None, true) => Ok(AccessTarget::Mask(text.to_string())),
            (None, false) => Err(AclError::InvalidMask(text.to_string())),
        };
    }

    entity
        .map(AccessTarget::Entity)
        .ok_or_else(|| AclError::NoSuchEntity(text.to_string()))
}

fn add_auto_flags(mut level: Privileges) -> Privileges {
    if level.contains(Privileges::OP) {
        level |= Privileges::AUTOOP;
    }
    if level.contains(Privileges::HALFOP) {
        level |= Privileges::AUTOHALFOP;
    }
    if level.contains(Privileges::VOICE) {
        level |= Privileges::AUTOVOICE;
    }
    level
}

// ============================================================================
// Read side
// ============================================================================

/// Immutable view over everything access queries need.
#[derive(Clone, Copy)]
pub struct AclView<'a> {
    pub store: &'a AclStore,
    pub entities: &'a EntityRegistry,
    pub channels: &'a ChannelRegistry,
    pub network: &'a Network,
    pub limits: &'a AclLimits,
}

impl<'a> AclView<'a> {
    pub fn list(&self, channel: &str) -> &'a [AccessRecord] {
        self.store.list(channel)
    }

    /// The record for `target` holding at least `min`.
    ///
    /// Entities match their own record first, then any record whose entity
    /// covers them (a group they belong to). Masks match literally.
    pub fn find(&self, channel: &str, target: &AccessTarget, min: Privileges) -> Option<&'a AccessRecord> {
        let list = self.list(channel);
        if let Some(rec) = list
            .iter()
            .find(|r| r.target.same_as(target) && r.level.contains(min))
        {
            return Some(rec);
        }
        let id = target.entity()?;
        list.iter().find(|r| {
            r.level.contains(min)
                && r.target
                    .entity()
                    .and_then(|e| self.entities.get(e))
                    .is_some_and(|e| e.matches_entity(id))
        })
    }

    /// The most specific mask record matching the user's hostmask.
    ///
    /// Literal masks beat wildcards; among wildcards the longest
    /// non-wildcard run wins, and ties go to the older record.
    pub fn find_by_user(&self, channel: &str, user: &User, min: Privileges) -> Option<&'a AccessRecord> {
        let hostmask = user.hostmask();
        let mut best: Option<(Specificity, &'a AccessRecord)> = None;
        for rec in self.list(channel) {
            let Some(mask) = rec.target.mask() else {
                continue;
            };
            if !rec.level.contains(min) || !wildcard_match(mask, &hostmask) {
                continue;
            }
            let spec = Specificity::of(mask);
            if best.is_none_or(|(b, _)| spec > b) {
                best = Some((spec, rec));
            }
        }
        best.map(|(_, rec)| rec)
    }

    /// Flags `id` holds directly or through records that cover it.
    pub fn entity_flags(&self, channel: &str, id: EntityId) -> Privileges {
        self.list(channel)
            .iter()
            .filter(|r| match r.target.entity() {
                Some(e) if e == id => true,
                Some(e) => self.entities.get(e).is_some_and(|ent| ent.matches_entity(id)),
                None => false,
            })
            .fold(Privileges::empty(), |acc, r| acc | r.level)
    }

    /// Effective flags of a connected user.
    ///
    /// Unverified accounts keep only AKICK from entity records; mask
    /// records always apply.
    pub fn user_flags(&self, channel: &str, user: &User) -> Privileges {
        self.user_flags_at(channel, user, 0)
    }

    fn user_flags_at(&self, channel: &str, user: &User, depth: u8) -> Privileges {
        let list = self.list(channel);
        let mut result = user
            .account
            .map(|acc| self.entity_flags(channel, acc))
            .unwrap_or_default();

        for rec in list {
            if let Some(id) = rec.target.entity()
                && let Some(entity) = self.entities.get(id)
                && entity.matches_user(user, self, depth)
            {
                result |= rec.level;
            }
        }

        let unverified = user
            .account
            .and_then(|acc| self.entities.account(acc))
            .is_some_and(|a| a.flags.contains(AccountFlags::WAITAUTH));
        if unverified {
            result &= Privileges::AKICK;
        }

        let hostmask = user.hostmask();
        for rec in list {
            if let Some(mask) = rec.target.mask()
                && wildcard_match(mask, &hostmask)
            {
                result |= rec.level;
            }
        }
        result
    }

    /// Founders among entity records.
    pub fn founder_count(&self, channel: &str) -> usize {
        self.list(channel)
            .iter()
            .filter(|r| r.target.entity().is_some() && r.level.contains(Privileges::FOUNDER))
            .count()
    }

    pub fn founder_names(&self, channel: &str) -> Vec<String> {
        self.list(channel)
            .iter()
            .filter(|r| r.level.contains(Privileges::FOUNDER))
            .filter_map(|r| r.target.entity())
            .filter_map(|id| self.entities.name_of(id))
            .map(str::to_string)
            .collect()
    }

    /// Whether anyone present on the channel has real access.
    pub fn is_used(&self, channel: &str) -> bool {
        self.network
            .channel_users(channel)
            .any(|u| self.user_flags(channel, u).intersects(Privileges::USEDUPDATE))
    }

    /// Channels `id` is a founder of.
    pub fn founded_by(&self, id: EntityId) -> usize {
        let target = AccessTarget::Entity(id);
        self.store
            .channels_of(id)
            .iter()
            .filter(|key| {
                self.store
                    .get(key, &target)
                    .is_some_and(|r| r.level.contains(Privileges::FOUNDER))
            })
            .count()
    }

    /// Pick who inherits a channel from its last founder.
    ///
    /// Minimum levels are tried in order: RECOVER, FLAGS, USEOWNER with
    /// AUTOOP (when the network has owners), OP, then anything.
    pub fn pick_successor(&self, channel: &str, policy: &AclPolicy, now: i64) -> Option<EntityId> {
        let mut tiers = vec![Privileges::RECOVER, Privileges::FLAGS];
        if policy.all.contains(Privileges::USEOWNER) {
            tiers.push(Privileges::USEOWNER | Privileges::AUTOOP);
        }
        tiers.push(Privileges::OP);
        tiers.push(Privileges::empty());

        tiers
            .into_iter()
            .find_map(|min| self.pick_candidate(channel, min, now))
    }

    fn pick_candidate(&self, channel: &str, min: Privileges, now: i64) -> Option<EntityId> {
        let mut best: Option<(EntityId, Privileges, bool)> = None;
        for rec in self.list(channel) {
            if rec.is_akick() || rec.level.contains(Privileges::FOUNDER) || !rec.level.contains(min) {
                continue;
            }
            let Some(id) = rec.target.entity() else {
                continue;
            };
            let Some(account) = self.entities.account(id) else {
                continue;
            };

            let recent = self.network.users_logged_in_as(id).next().is_some()
                || now - account.last_login < RECENTLY_SEEN;
            let level = add_auto_flags(rec.level);

            if let Some((_, best_level, best_recent)) = best {
                if !(best_level - level).is_empty() {
                    continue;
                }
                if best_level == level && (!recent || best_recent) {
                    continue;
                }
            }
            if account.can_register_channel(self) {
                best = Some((id, level, recent));
            }
        }
        best.map(|(id, _, _)| id)
    }
}

impl EntityContext for AclView<'_> {
    fn fold(&self, name: &str) -> String {
        self.channels.fold(name)
    }

    fn founded_channels(&self, id: EntityId) -> usize {
        self.founded_by(id)
    }

    fn max_channels_per_account(&self) -> usize {
        self.limits.max_channels_per_account
    }

    fn chanacs_flags(&self, channel: &str, user: &User, depth: u8) -> Privileges {
        self.user_flags_at(channel, user, depth)
    }
}

// ============================================================================
// Write side
// ============================================================================

/// Mutable access to the lists, with read-only access to everything the
/// rules consult.
pub struct AccessEngine<'a> {
    store: &'a mut AclStore,
    entities: &'a EntityRegistry,
    channels: &'a ChannelRegistry,
    network: &'a Network,
    limits: &'a AclLimits,
    policy: AclPolicy,
    now: i64,
}

impl<'a> AccessEngine<'a> {
    pub fn new(
        store: &'a mut AclStore,
        entities: &'a EntityRegistry,
        channels: &'a ChannelRegistry,
        network: &'a Network,
        limits: &'a AclLimits,
        policy: AclPolicy,
        now: i64,
    ) -> Self {
        Self {
            store,
            entities,
            channels,
            network,
            limits,
            policy,
            now,
        }
    }

    pub fn view(&self) -> AclView<'_> {
        AclView {
            store: &*self.store,
            entities: self.entities,
            channels: self.channels,
            network: self.network,
            limits: self.limits,
        }
    }

    /// Open the record for `target` on `channel`.
    ///
    /// With `create`, a missing record is created empty; otherwise a
    /// missing record yields `Ok(None)`.
    pub fn open<'e>(
        &'e mut self,
        channel: &str,
        target: AccessTarget,
        create: bool,
    ) -> Result<Option<AccessHandle<'e, 'a>>, AclError> {
        let name = self
            .channels
            .get(channel)
            .map(|c| c.name.clone())
            .ok_or_else(|| AclError::NotRegistered(channel.to_string()))?;

        match &target {
            AccessTarget::Mask(mask) => {
                validate_hostmask(mask).map_err(|_| AclError::InvalidMask(mask.clone()))?;
            }
            AccessTarget::Entity(id) => {
                if self.entities.get(*id).is_none() {
                    return Err(AclError::NoSuchEntity(id.to_string()));
                }
            }
        }

        let exists = self.store.get(&name, &target).is_some();
        if !exists {
            if !create {
                return Ok(None);
            }
            let max = self.limits.max_chanacs;
            if max != 0 && self.store.list(&name).len() >= max {
                return Err(AclError::TooManyEntries {
                    channel: name,
                    limit: max,
                });
            }
            self.store
                .insert(&name, AccessRecord::new(target.clone(), self.now));
        }

        Ok(Some(AccessHandle {
            engine: self,
            channel: name,
            target,
            created: !exists,
        }))
    }

    /// Open, modify and close in one step.
    ///
    /// Queues exactly one change event on success, even when the
    /// normalized delta turned out empty.
    pub fn change(
        &mut self,
        channel: &str,
        target: AccessTarget,
        add: Privileges,
        remove: Privileges,
        restrict: Privileges,
        actor: Actor,
    ) -> Result<Realized, AclError> {
        let Some(mut handle) = self.open(channel, target.clone(), true)? else {
            return Err(AclError::NoSuchEntity(target.to_string()));
        };
        let old = handle.level();
        let remove = if handle.created {
            Privileges::empty()
        } else {
            remove
        };
        let realized = handle.apply(add, remove, restrict, actor)?;
        handle.notify(old, actor.setter());
        Ok(realized)
    }

    /// Delete a record outright, bypassing the rules. Used for entity drops
    /// and succession.
    pub fn purge(&mut self, channel: &str, target: &AccessTarget) -> Option<AccessRecord> {
        let name = self.channels.get(channel).map(|c| c.name.clone())?;
        let record = self.store.remove(&name, target)?;
        self.store.push_event(ChanacsChanged {
            channel: name,
            target: record.target.clone(),
            old: record.level,
            new: Privileges::empty(),
            setter: None,
        });
        Some(record)
    }
}

/// The single mutation point for one access record.
///
/// Dropping the handle removes the record if its level is empty.
pub struct AccessHandle<'e, 'a> {
    engine: &'e mut AccessEngine<'a>,
    channel: String,
    target: AccessTarget,
    created: bool,
}

impl AccessHandle<'_, '_> {
    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn target(&self) -> &AccessTarget {
        &self.target
    }

    /// Whether `open` created this record.
    pub fn created(&self) -> bool {
        self.created
    }

    pub fn record(&self) -> Option<&AccessRecord> {
        self.engine.store.get(&self.channel, &self.target)
    }

    pub fn level(&self) -> Privileges {
        self.record().map(|r| r.level).unwrap_or_default()
    }

    /// Apply a delta. Queues a change event when something changed.
    pub fn modify(
        &mut self,
        add: Privileges,
        remove: Privileges,
        restrict: Privileges,
        actor: Actor,
    ) -> Result<Realized, AclError> {
        let old = self.level();
        let realized = self.apply(add, remove, restrict, actor)?;
        if !realized.is_empty() {
            self.notify(old, actor.setter());
        }
        Ok(realized)
    }

    /// Release the handle, pruning an empty record.
    pub fn close(self) {}

    fn apply(
        &mut self,
        add: Privileges,
        remove: Privileges,
        restrict: Privileges,
        actor: Actor,
    ) -> Result<Realized, AclError> {
        let level = self.level();
        let add = add & self.engine.policy.all & !level;
        let remove = remove & level & !add;
        if add.is_empty() && remove.is_empty() {
            return Ok(Realized::default());
        }
        let new = (level | add) - remove;
        let view = self.engine.view();

        let own_record = actor
            .setter()
            .is_some_and(|id| self.target.entity() == Some(id));
        let self_clear = own_record && add.is_empty() && new.is_empty();
        let touched = add | remove | level;

        if !self_clear {
            if let Actor::Entity { flags, .. } = actor
                && !flags.contains(Privileges::FLAGS)
                && !(touched - Privileges::AKICK).is_empty()
            {
                return Err(Denial::NoFlagsPrivilege.into());
            }
            if !(touched - restrict).is_empty() {
                return Err(Denial::Restricted.into());
            }
        }

        if add.contains(Privileges::FOUNDER) {
            let AccessTarget::Entity(id) = self.target else {
                return Err(Denial::FounderOnHostmask.into());
            };
            let max = self.engine.limits.max_founders;
            if max != 0 && view.founder_count(&self.channel) >= max {
                return Err(AclError::TooManyFounders {
                    channel: self.channel.clone(),
                    limit: max,
                });
            }
            let entity = view
                .entities
                .get(id)
                .ok_or_else(|| AclError::NoSuchEntity(id.to_string()))?;
            if !entity.allow_foundership() {
                return Err(Denial::FoundershipNotAllowed.into());
            }
            if !entity.can_register_channel(&view) {
                return Err(Denial::TooManyChannels.into());
            }
        }

        if remove.contains(Privileges::FOUNDER) && view.founder_count(&self.channel) == 1 {
            return Err(AclError::LastFounder(self.channel.clone()));
        }

        if new.is_akick() && new != Privileges::AKICK {
            return Err(Denial::AkickWithPrivileges.into());
        }

        let now = self.engine.now;
        if let Some(rec) = self.engine.store.get_mut(&self.channel, &self.target) {
            rec.level = new;
            rec.modified = now;
            rec.setter = actor.setter();
        }
        debug!(
            channel = %self.channel,
            target = %self.target,
            add = %add.to_flag_string(),
            remove = %remove.to_flag_string(),
            "access record modified"
        );
        Ok(Realized { add, remove })
    }

    fn notify(&mut self, old: Privileges, setter: Option<EntityId>) {
        let new = self.level();
        info!(channel = %self.channel, target = %self.target, old = %old.to_flag_string(), new = %new.to_flag_string(), "chanacs changed");
        self.engine.store.push_event(ChanacsChanged {
            channel: self.channel.clone(),
            target: self.target.clone(),
            old,
            new,
            setter,
        });
    }
}

impl Drop for AccessHandle<'_, '_> {
    fn drop(&mut self) {
        if self.level().is_empty() && self.engine.store.remove(&self.channel, &self.target).is_some() {
            debug!(channel = %self.channel, target = %self.target, "empty access record pruned");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityVariant;
    use slirc_proto::Casemapping;

    struct Fixture {
        store: AclStore,
        entities: EntityRegistry,
        channels: ChannelRegistry,
        network: Network,
        limits: AclLimits,
        policy: AclPolicy,
        now: i64,
    }

    impl Fixture {
        fn new() -> Self {
            let mut channels = ChannelRegistry::new(Casemapping::Rfc1459);
            channels.register("#test", 0).unwrap();
            Self {
                store: AclStore::new(Casemapping::Rfc1459),
                entities: EntityRegistry::new(Casemapping::Rfc1459, "00A"),
                channels,
                network: Network::new(Casemapping::Rfc1459, 0),
                limits: AclLimits::default(),
                policy: AclPolicy::default(),
                now: 1_000_000,
            }
        }

        fn engine(&mut self) -> AccessEngine<'_> {
            AccessEngine::new(
                &mut self.store,
                &self.entities,
                &self.channels,
                &self.network,
                &self.limits,
                self.policy,
                self.now,
            )
        }

        fn view(&self) -> AclView<'_> {
            AclView {
                store: &self.store,
                entities: &self.entities,
                channels: &self.channels,
                network: &self.network,
                limits: &self.limits,
            }
        }

        fn account(&mut self, name: &str) -> EntityId {
            let now = self.now;
            self.entities.register_account(name, now).unwrap()
        }

        fn grant(&mut self, target: AccessTarget, flags: Privileges) {
            self.engine()
                .change("#test", target, flags, Privileges::empty(), Privileges::ALL_ALL, Actor::Services)
                .unwrap();
        }

        fn level(&self, target: &AccessTarget) -> Privileges {
            self.store.get("#test", target).map(|r| r.level).unwrap_or_default()
        }
    }

    fn mask(m: &str) -> AccessTarget {
        AccessTarget::Mask(m.to_string())
    }

    #[test]
    fn open_validates_before_creating() {
        let mut fx = Fixture::new();
        let alice = fx.account("alice");
        let mut engine = fx.engine();
        assert!(matches!(
            engine.open("#nope", AccessTarget::Entity(alice), true),
            Err(AclError::NotRegistered(_))
        ));
        assert!(matches!(
            engine.open("#test", mask("not a mask"), true),
            Err(AclError::InvalidMask(_))
        ));
        assert!(matches!(
            engine.open("#test", AccessTarget::Entity(EntityId::from_raw(999)), true),
            Err(AclError::NoSuchEntity(_))
        ));
        assert!(engine.open("#test", AccessTarget::Entity(alice), false).unwrap().is_none());
        assert_eq!(fx.store.record_count(), 0);
    }

    #[test]
    fn dropped_handle_prunes_empty_record() {
        let mut fx = Fixture::new();
        let alice = fx.account("alice");
        {
            let mut engine = fx.engine();
            let handle = engine.open("#test", AccessTarget::Entity(alice), true).unwrap().unwrap();
            assert!(handle.created());
            assert!(handle.record().is_some());
        }
        assert_eq!(fx.store.record_count(), 0);
    }

    #[test]
    fn list_limit() {
        let mut fx = Fixture::new();
        fx.limits.max_chanacs = 1;
        fx.grant(mask("*!*@a.example"), Privileges::VOICE);
        let err = fx
            .engine()
            .open("#test", mask("*!*@b.example"), true)
            .err()
            .unwrap();
        assert_eq!(
            err,
            AclError::TooManyEntries {
                channel: "#test".into(),
                limit: 1
            }
        );
    }

    #[test]
    fn change_fires_one_event_and_stamps() {
        let mut fx = Fixture::new();
        let alice = fx.account("alice");
        let bob = fx.account("bob");
        fx.grant(AccessTarget::Entity(alice), Privileges::FOUNDER_0);
        fx.store.take_events();

        fx.now += 10;
        let actor = Actor::Entity {
            id: alice,
            flags: Privileges::FOUNDER_0,
        };
        let realized = fx
            .engine()
            .change("#test", AccessTarget::Entity(bob), Privileges::AOP_DEF, Privileges::ALL_ALL, Privileges::ALL_ALL, actor)
            .unwrap();
        assert_eq!(realized.add, Privileges::AOP_DEF);
        assert!(realized.remove.is_empty());

        let rec = fx.store.get("#test", &AccessTarget::Entity(bob)).unwrap();
        assert_eq!(rec.modified, fx.now);
        assert_eq!(rec.setter, Some(alice));

        let events = fx.store.take_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].old, Privileges::empty());
        assert_eq!(events[0].new, Privileges::AOP_DEF);

        // an empty delta still reports, but does not restamp
        fx.now += 10;
        fx.engine()
            .change("#test", AccessTarget::Entity(bob), Privileges::OP, Privileges::empty(), Privileges::ALL_ALL, actor)
            .unwrap();
        assert_eq!(fx.store.take_events().len(), 1);
        assert_eq!(fx.store.get("#test", &AccessTarget::Entity(bob)).unwrap().modified, fx.now - 10);
    }

    #[test]
    fn handle_modify_reports_only_real_changes() {
        let mut fx = Fixture::new();
        let bob = fx.account("bob");
        fx.grant(AccessTarget::Entity(bob), Privileges::VOICE);
        fx.store.take_events();

        let mut engine = fx.engine();
        let mut handle = engine.open("#test", AccessTarget::Entity(bob), false).unwrap().unwrap();
        let r = handle
            .modify(Privileges::VOICE, Privileges::empty(), Privileges::ALL_ALL, Actor::Services)
            .unwrap();
        assert!(r.is_empty());
        handle
            .modify(Privileges::empty(), Privileges::VOICE, Privileges::ALL_ALL, Actor::Services)
            .unwrap();
        handle.close();
        assert_eq!(fx.store.take_events().len(), 1);
        assert_eq!(fx.store.record_count(), 0);
    }

    #[test]
    fn restricted_and_flagless_actors() {
        let mut fx = Fixture::new();
        let bob = fx.account("bob");
        let carol = fx.account("carol");
        fx.grant(AccessTarget::Entity(bob), Privileges::VOP_DEF);

        let voice_only = Actor::Entity {
            id: carol,
            flags: Privileges::VOP_DEF | Privileges::FLAGS,
        };
        let restrict = restrict_for(Privileges::VOP_DEF | Privileges::FLAGS, false, false, &fx.policy).unwrap();
        let err = fx
            .engine()
            .change("#test", AccessTarget::Entity(bob), Privileges::OP, Privileges::empty(), restrict, voice_only)
            .unwrap_err();
        assert_eq!(err, AclError::NotPermitted(Denial::Restricted));

        let flagless = Actor::Entity {
            id: carol,
            flags: Privileges::AOP_DEF,
        };
        let err = fx
            .engine()
            .change("#test", AccessTarget::Entity(bob), Privileges::empty(), Privileges::VOICE, Privileges::ALL_ALL, flagless)
            .unwrap_err();
        assert_eq!(err, AclError::NotPermitted(Denial::NoFlagsPrivilege));
        assert_eq!(fx.level(&AccessTarget::Entity(bob)), Privileges::VOP_DEF);
    }

    #[test]
    fn anyone_may_clear_their_own_record() {
        let mut fx = Fixture::new();
        let bob = fx.account("bob");
        fx.grant(AccessTarget::Entity(bob), Privileges::AOP_DEF);
        let actor = Actor::Entity {
            id: bob,
            flags: Privileges::AOP_DEF,
        };
        fx.engine()
            .change("#test", AccessTarget::Entity(bob), Privileges::empty(), Privileges::ALL_ALL, Privileges::empty(), actor)
            .unwrap();
        assert!(fx.store.get("#test", &AccessTarget::Entity(bob)).is_none());
    }

    #[test]
    fn founder_rules() {
        let mut fx = Fixture::new();
        fx.limits.max_founders = 2;
        let alice = fx.account("alice");
        let bob = fx.account("bob");
        let carol = fx.account("carol");
        fx.grant(AccessTarget::Entity(alice), Privileges::FOUNDER_0);

        let err = fx
            .engine()
            .change("#test", AccessTarget::Entity(alice), Privileges::empty(), Privileges::FOUNDER, Privileges::ALL_ALL, Actor::Services)
            .unwrap_err();
        assert_eq!(err, AclError::LastFounder("#test".into()));

        let err = fx
            .engine()
            .change("#test", mask("*!*@x.example"), Privileges::FOUNDER, Privileges::empty(), Privileges::ALL_ALL, Actor::Services)
            .unwrap_err();
        assert_eq!(err, AclError::NotPermitted(Denial::FounderOnHostmask));

        fx.entities.account_mut(carol).unwrap().flags |= AccountFlags::RESTRICTED;
        let err = fx
            .engine()
            .change("#test", AccessTarget::Entity(carol), Privileges::FOUNDER, Privileges::empty(), Privileges::ALL_ALL, Actor::Services)
            .unwrap_err();
        assert_eq!(err, AclError::NotPermitted(Denial::FoundershipNotAllowed));

        fx.grant(AccessTarget::Entity(bob), Privileges::FOUNDER);
        let dave = fx.account("dave");
        let err = fx
            .engine()
            .change("#test", AccessTarget::Entity(dave), Privileges::FOUNDER, Privileges::empty(), Privileges::ALL_ALL, Actor::Services)
            .unwrap_err();
        assert!(matches!(err, AclError::TooManyFounders { limit: 2, .. }));

        // with two founders one may go
        fx.engine()
            .change("#test", AccessTarget::Entity(bob), Privileges::empty(), Privileges::FOUNDER, Privileges::ALL_ALL, Actor::Services)
            .unwrap();
        assert_eq!(fx.view().founder_names("#test"), vec!["alice".to_string()]);
        // failed attempts leave nothing behind
        assert!(fx.store.get("#test", &AccessTarget::Entity(dave)).is_none());
    }

    #[test]
    fn channel_quota_blocks_foundership() {
        let mut fx = Fixture::new();
        fx.limits.max_channels_per_account = 1;
        fx.channels.register("#other", 0).unwrap();
        let alice = fx.account("alice");
        fx.grant(AccessTarget::Entity(alice), Privileges::FOUNDER_0);
        let err = fx
            .engine()
            .change("#other", AccessTarget::Entity(alice), Privileges::FOUNDER, Privileges::empty(), Privileges::ALL_ALL, Actor::Services)
            .unwrap_err();
        assert_eq!(err, AclError::NotPermitted(Denial::TooManyChannels));
        assert_eq!(fx.view().founded_by(alice), 1);
    }

    #[test]
    fn akick_never_mixes() {
        let mut fx = Fixture::new();
        let bob = fx.account("bob");
        fx.grant(AccessTarget::Entity(bob), Privileges::VOICE);
        let err = fx
            .engine()
            .change("#test", AccessTarget::Entity(bob), Privileges::AKICK, Privileges::empty(), Privileges::ALL_ALL, Actor::Services)
            .unwrap_err();
        assert_eq!(err, AclError::NotPermitted(Denial::AkickWithPrivileges));

        fx.grant(mask("*!*@spam.example"), Privileges::AKICK);
        assert_eq!(fx.level(&mask("*!*@SPAM.example")), Privileges::AKICK);
    }

    #[test]
    fn remove_holder_may_manage_akicks_without_flags() {
        let mut fx = Fixture::new();
        let op = fx.account("op");
        let flags = Privileges::AOP_DEF | Privileges::REMOVE;
        let restrict = restrict_for(flags, false, false, &fx.policy).unwrap();
        let actor = Actor::Entity { id: op, flags };
        fx.engine()
            .change("#test", mask("*!*@spam.example"), Privileges::AKICK, Privileges::empty(), restrict, actor)
            .unwrap();
        assert!(fx.store.get("#test", &mask("*!*@spam.example")).is_some());
    }

    #[test]
    fn find_prefers_literal_then_covering_group() {
        let mut fx = Fixture::new();
        let alice = fx.account("alice");
        let staff = fx.entities.register("!staff", EntityVariant::Group, 0).unwrap();
        fx.entities
            .add_member(staff, alice, crate::entity::GroupAccess::CHANACS)
            .unwrap();
        fx.grant(AccessTarget::Entity(staff), Privileges::AOP_DEF);

        let view = fx.view();
        let found = view
            .find("#test", &AccessTarget::Entity(alice), Privileges::OP)
            .unwrap();
        assert_eq!(found.target, AccessTarget::Entity(staff));
        assert!(view.find("#test", &AccessTarget::Entity(alice), Privileges::FOUNDER).is_none());
        assert_eq!(view.entity_flags("#test", alice), Privileges::AOP_DEF);
    }

    #[test]
    fn find_by_user_picks_most_specific_mask() {
        let mut fx = Fixture::new();
        fx.grant(mask("*!*@*.example"), Privileges::VOICE);
        fx.grant(mask("*!*@host.example"), Privileges::OP);
        fx.grant(mask("*!*@*.other"), Privileges::HALFOP);
        fx.grant(mask("*!*@host.exampl?"), Privileges::TOPIC);
        let user = User::new("nick", "ident", "host.example", "irc.example");

        let view = fx.view();
        let rec = view.find_by_user("#test", &user, Privileges::empty()).unwrap();
        assert_eq!(rec.level, Privileges::OP);
        let rec = view.find_by_user("#test", &user, Privileges::VOICE).unwrap();
        assert_eq!(rec.target, mask("*!*@*.example"));

        fx.grant(mask("nick!ident@host.example"), Privileges::INVITE);
        let rec = fx.view().find_by_user("#test", &user, Privileges::empty()).unwrap();
        assert_eq!(rec.level, Privileges::INVITE);
    }

    #[test]
    fn user_flags_combine_and_mask_unverified() {
        let mut fx = Fixture::new();
        let alice = fx.account("alice");
        fx.grant(AccessTarget::Entity(alice), Privileges::AOP_DEF);
        let oper = fx.entities.lookup_ext("$oper").unwrap();
        fx.grant(AccessTarget::Entity(oper), Privileges::RECOVER);
        fx.grant(mask("*!*@*.example"), Privileges::INVITE);

        let mut user = User::new("alice", "a", "home.example", "irc.example");
        user.account = Some(alice);
        user.oper = true;
        assert_eq!(
            fx.view().user_flags("#test", &user),
            Privileges::AOP_DEF | Privileges::RECOVER | Privileges::INVITE
        );

        fx.entities.account_mut(alice).unwrap().flags |= AccountFlags::WAITAUTH;
        assert_eq!(fx.view().user_flags("#test", &user), Privileges::INVITE);
    }

    #[test]
    fn is_used_needs_a_present_holder() {
        let mut fx = Fixture::new();
        let alice = fx.account("alice");
        fx.grant(AccessTarget::Entity(alice), Privileges::VOICE);
        let mut user = User::new("alice", "a", "h", "irc.example");
        user.account = Some(alice);
        fx.network.user_connect(user);
        assert!(!fx.view().is_used("#test"));
        fx.network.join("#test", "alice", "", 0);
        assert!(fx.view().is_used("#test"));
    }

    #[test]
    fn successor_tiers_and_recency() {
        let mut fx = Fixture::new();
        let founder = fx.account("founder");
        let stale = fx.account("stale");
        let fresh = fx.account("fresh");
        let opper = fx.account("opper");
        fx.grant(AccessTarget::Entity(founder), Privileges::FOUNDER_0);
        fx.grant(AccessTarget::Entity(opper), Privileges::AOP_DEF);
        fx.grant(AccessTarget::Entity(stale), Privileges::RECOVER | Privileges::VOICE);
        fx.grant(AccessTarget::Entity(fresh), Privileges::RECOVER | Privileges::VOICE);
        fx.grant(mask("*!*@x.example"), Privileges::RECOVER);

        let now = fx.now;
        fx.entities.account_mut(stale).unwrap().last_login = now - RECENTLY_SEEN - 1;
        fx.entities.account_mut(fresh).unwrap().last_login = now - 60;
        assert_eq!(fx.view().pick_successor("#test", &fx.policy, now), Some(fresh));

        fx.entities.account_mut(fresh).unwrap().last_login = now - RECENTLY_SEEN - 1;
        assert_eq!(fx.view().pick_successor("#test", &fx.policy, now), Some(stale));

        fx.store.remove("#test", &AccessTarget::Entity(stale));
        fx.store.remove("#test", &AccessTarget::Entity(fresh));
        assert_eq!(fx.view().pick_successor("#test", &fx.policy, now), Some(opper));
    }

    #[test]
    fn restrict_for_rules() {
        let p = AclPolicy::default();
        assert_eq!(restrict_for(Privileges::FOUNDER_0, false, true, &p), Ok(p.all));
        assert_eq!(
            restrict_for(Privileges::AKICK, true, false, &p),
            Err(Denial::ActorBanned)
        );
        let theirs = Privileges::VOICE | Privileges::FLAGS;
        let others = restrict_for(theirs, false, false, &p).unwrap();
        assert!(others.contains(Privileges::AUTOVOICE));
        assert!(!others.contains(Privileges::OP));
        let own = restrict_for(theirs, true, false, &p).unwrap();
        assert!(own.contains(theirs));
    }

    #[test]
    fn resolve_target_classifies_input() {
        let mut reg = EntityRegistry::new(Casemapping::Rfc1459, "00A");
        let alice = reg.register_account("alice", 0).unwrap();
        assert_eq!(resolve_target(&mut reg, "ALICE"), Ok(AccessTarget::Entity(alice)));
        assert_eq!(
            resolve_target(&mut reg, "*!*@host"),
            Ok(AccessTarget::Mask("*!*@host".into()))
        );
        assert!(matches!(resolve_target(&mut reg, "bad@"), Err(AclError::InvalidMask(_))));
        assert!(matches!(resolve_target(&mut reg, "ghost"), Err(AclError::NoSuchEntity(_))));
        assert!(matches!(resolve_target(&mut reg, "$oper"), Ok(AccessTarget::Entity(_))));
        assert!(matches!(resolve_target(&mut reg, "$bogus"), Err(AclError::NoSuchEntity(_))));
    }
}
