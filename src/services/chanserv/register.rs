//! Channel REGISTER and DROP.

use tracing::info;

use crate::acl::{AccessTarget, Actor, Privileges};
use crate::channel::{MLOCK_EXT_METADATA_KEY, ModeLock, valid_channel_name};
use crate::entity::{Capabilities, EntityId};
use crate::error::{ChannelError, EntityError, ServiceError};
use crate::expiry::ExpiryKind;
use crate::services::Services;

impl Services {
    /// Register `name` with `founder` holding the initial founder level.
    ///
    /// The default mode lock is applied at once if the channel exists, and
    /// present users are processed as if they had just joined.
    pub fn register_channel(&mut self, name: &str, founder: EntityId) -> Result<(), ServiceError> {
        if !valid_channel_name(name) {
            return Err(ChannelError::InvalidName(name.to_string()).into());
        }
        let entity = self
            .entities
            .get(founder)
            .ok_or_else(|| EntityError::NoSuchEntity(founder.to_string()))?;
        if !entity.can_register_channel(&self.view()) {
            return Err(ChannelError::TooManyChannels(entity.name().to_string()).into());
        }
        let founder_name = entity.name().to_string();

        let (modes, params) = self.config.chanserv.default_mlock_parts();
        let parsed = ModeLock::parse(&self.table, modes, &params)?;

        let now = self.clock.now();
        let record = self.channels.register(name, now)?;
        record.mlock = parsed.lock.clone();
        record.set_metadata(MLOCK_EXT_METADATA_KEY, parsed.ext_raw());

        let initial = Privileges::INITIAL & self.policy.all;
        let granted = self.engine().change(
            name,
            AccessTarget::Entity(founder),
            initial,
            Privileges::empty(),
            Privileges::ALL_ALL,
            Actor::Services,
        );
        if let Err(e) = granted {
            self.channels.remove(name);
            return Err(e.into());
        }
        info!(channel = %name, founder = %founder_name, "channel registered");

        self.check_modes(name, true);
        let present: Vec<String> = self
            .network
            .channel_users(name)
            .map(|u| u.nick.clone())
            .collect();
        for nick in present {
            self.process_member(name, &nick);
        }
        self.settle();
        Ok(())
    }

    /// Register `channel` for the account `nick` is logged in to.
    pub fn register_channel_for(&mut self, nick: &str, channel: &str) -> Result<(), ServiceError> {
        let account = self
            .network
            .user(nick)
            .ok_or_else(|| ServiceError::NoSuchUser(nick.to_string()))?
            .account
            .ok_or_else(|| ServiceError::NotLoggedIn(nick.to_string()))?;
        self.register_channel(channel, account)
    }

    /// Forget a registered channel: pending modes, expiries, evidence and
    /// every access record. Live bans stay on the network.
    pub fn drop_channel(&mut self, name: &str) -> Result<(), ServiceError> {
        let record = self
            .channels
            .remove(name)
            .ok_or_else(|| ChannelError::NotRegistered(name.to_string()))?;

        self.modestack.forget(name);
        let now = self.clock.now();
        let cancelled = self.expiry.cancel_channel(name, self.timers.as_mut(), now);
        self.evidence.remove(&self.channels.fold(name));

        let records = self.store.drop_channel(name);
        for id in records.iter().filter_map(|r| r.target.entity()) {
            self.release_if_unused(id);
        }
        info!(channel = %record.name, records = records.len(), cancelled, "channel dropped");
        self.settle();
        Ok(())
    }

    /// The kinds of expiry pending on `channel`, oldest first.
    pub fn pending_expiries(&self, channel: &str) -> Vec<(ExpiryKind, String)> {
        self.expiry
            .entries()
            .iter()
            .filter(|e| self.casemap.equals(&e.channel, channel))
            .map(|e| (e.kind, e.target.to_string()))
            .collect()
    }
}
