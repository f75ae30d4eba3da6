//! AKICK ADD / DEL.

use tracing::info;

use crate::acl::{AccessTarget, Privileges, Realized, resolve_target, restrict_for};
use crate::channel::ChannelFlags;
use crate::error::{AclError, ServiceError};
use crate::expiry::{ExpiryEntry, ExpiryKind};
use crate::services::Services;

impl Services {
    /// Put `target` on the auto-kick list, optionally for `duration`
    /// seconds. Present users it covers are banned and kicked.
    pub fn akick_add(
        &mut self,
        nick: &str,
        channel: &str,
        target: &str,
        duration: Option<u64>,
    ) -> Result<Realized, ServiceError> {
        let target = resolve_target(&mut self.entities, target)?;
        let result = self.add_akick(nick, channel, target.clone(), duration);
        self.release_target(&target);
        result
    }

    fn add_akick(
        &mut self,
        nick: &str,
        channel: &str,
        target: AccessTarget,
        duration: Option<u64>,
    ) -> Result<Realized, ServiceError> {
        let (id, flags) = self.actor(nick, channel)?;
        let limitflags = self.channel_flag(channel, ChannelFlags::LIMITFLAGS)?;
        let restrict = restrict_for(flags, target.entity() == Some(id), limitflags, &self.policy)
            .map_err(AclError::from)?;
        let actor = self.entity_actor(nick, channel)?;

        let realized = self.chanacs_change(
            channel,
            target.clone(),
            Privileges::AKICK,
            Privileges::empty(),
            restrict,
            actor,
        )?;

        let now = self.clock.now();
        let name = self
            .channels
            .get(channel)
            .map(|r| r.name.clone())
            .unwrap_or_else(|| channel.to_string());
        // a fresh duration replaces any earlier one
        self.expiry
            .cancel(&name, &target, ExpiryKind::Akick, self.timers.as_mut(), now);
        if let Some(duration) = duration.filter(|d| *d > 0) {
            let expires = now.saturating_add(i64::try_from(duration).unwrap_or(i64::MAX));
            self.expiry.insert(
                ExpiryEntry {
                    expires,
                    channel: name.clone(),
                    target: target.clone(),
                    kind: ExpiryKind::Akick,
                },
                self.timers.as_mut(),
                now,
            );
        }
        info!(channel = %name, target = %target, ?duration, "akick added");
        Ok(realized)
    }

    /// Take `target` off the auto-kick list and lift the bans placed for it.
    pub fn akick_del(&mut self, nick: &str, channel: &str, target: &str) -> Result<Realized, ServiceError> {
        let target = resolve_target(&mut self.entities, target)?;
        let result = self.del_akick(nick, channel, target.clone());
        self.release_target(&target);
        result
    }

    fn del_akick(&mut self, nick: &str, channel: &str, target: AccessTarget) -> Result<Realized, ServiceError> {
        let (id, flags) = self.actor(nick, channel)?;
        let limitflags = self.channel_flag(channel, ChannelFlags::LIMITFLAGS)?;
        let listed = self
            .store
            .get(channel, &target)
            .is_some_and(|r| r.is_akick());
        if !listed {
            return Err(AclError::NoSuchEntity(target.to_string()).into());
        }
        let restrict = restrict_for(flags, target.entity() == Some(id), limitflags, &self.policy)
            .map_err(AclError::from)?;
        let actor = self.entity_actor(nick, channel)?;
        Ok(self.chanacs_change(
            channel,
            target,
            Privileges::empty(),
            Privileges::AKICK,
            restrict,
            actor,
        )?)
    }
}
