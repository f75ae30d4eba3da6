//! ChanServ operations: registration, access lists, AKICK, mode locks and
//! templates.
//!
//! User-issued operations name the acting nick; the actor's rights are the
//! flags their live user holds on the channel.

mod access;
mod akick;
mod modes;
mod register;

use super::Services;
use crate::acl::{Actor, Privileges};
use crate::channel::ChannelFlags;
use crate::entity::EntityId;
use crate::error::{AclError, ServiceError};

impl Services {
    /// Identity and channel flags of the user issuing a command.
    fn actor(&self, nick: &str, channel: &str) -> Result<(EntityId, Privileges), ServiceError> {
        let user = self
            .network
            .user(nick)
            .ok_or_else(|| ServiceError::NoSuchUser(nick.to_string()))?;
        let id = user
            .account
            .ok_or_else(|| ServiceError::NotLoggedIn(nick.to_string()))?;
        Ok((id, self.view().user_flags(channel, user)))
    }

    fn entity_actor(&self, nick: &str, channel: &str) -> Result<Actor, ServiceError> {
        let (id, flags) = self.actor(nick, channel)?;
        Ok(Actor::Entity { id, flags })
    }

    fn channel_flag(&self, channel: &str, flag: ChannelFlags) -> Result<bool, AclError> {
        self.channels
            .get(channel)
            .map(|r| r.has_flag(flag))
            .ok_or_else(|| AclError::NotRegistered(channel.to_string()))
    }
}
