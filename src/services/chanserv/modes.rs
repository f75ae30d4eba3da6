//! SET MLOCK, TEMPLATE and channel option toggles.

use tracing::{info, warn};

use crate::acl::{
    AccessTarget, Actor, Privileges, TEMPLATE_METADATA_KEY, TemplateChange, change_template,
    parse_flag_changes, restrict_for,
};
use crate::channel::{ChannelFlags, MLOCK_EXT_METADATA_KEY, ModeLock};
use crate::error::{AclError, ChannelError, Denial, ServiceError};
use crate::services::Services;

impl Services {
    fn require_privilege(&self, nick: &str, channel: &str, bit: Privileges, name: &'static str) -> Result<Privileges, ServiceError> {
        let (_, flags) = self.actor(nick, channel)?;
        if !self.channels.contains(channel) {
            return Err(ChannelError::NotRegistered(channel.to_string()).into());
        }
        if !flags.contains(bit) {
            return Err(Denial::MissingPrivilege(name).into());
        }
        Ok(flags)
    }

    /// Replace the mode lock and enforce it at once. Returns the lock as
    /// displayed to users.
    pub fn set_mlock<S: AsRef<str>>(
        &mut self,
        nick: &str,
        channel: &str,
        modes: &str,
        params: &[S],
    ) -> Result<String, ServiceError> {
        self.require_privilege(nick, channel, Privileges::SET, "set")?;
        let parsed = ModeLock::parse(&self.table, modes, params)?;

        let record = self.channels.require_mut(channel)?;
        record.set_metadata(MLOCK_EXT_METADATA_KEY, parsed.ext_raw());
        record.mlock = parsed.lock;
        let shown = record.mlock.render(&self.table, record.ext_mlock(), true);
        info!(%channel, mlock = %shown, "mode lock set");

        self.check_modes(channel, true);
        self.settle();
        Ok(shown)
    }

    /// The mode lock as displayed to users, key hidden.
    pub fn mlock_string(&self, channel: &str) -> Option<String> {
        self.channels
            .get(channel)
            .map(|r| r.mlock.render(&self.table, r.ext_mlock(), true))
    }

    /// Create, alter or delete (when no flags remain) a channel template.
    ///
    /// Records whose level equalled the old template follow it to the new
    /// level.
    pub fn set_template(&mut self, nick: &str, channel: &str, name: &str, spec: &str) -> Result<TemplateChange, ServiceError> {
        let flags = self.require_privilege(nick, channel, Privileges::FLAGS, "acl-change")?;
        let limitflags = self.channel_flag(channel, ChannelFlags::LIMITFLAGS)?;
        let restrict = restrict_for(flags, false, limitflags, &self.policy).map_err(AclError::from)?;
        let (add, remove) = parse_flag_changes(spec, &self.policy);

        let raw = self
            .channels
            .get(channel)
            .and_then(|r| r.metadata(TEMPLATE_METADATA_KEY))
            .map(str::to_string);
        let change = change_template(channel, raw.as_deref(), name, add, remove, restrict, &self.policy)?;
        if let Some(record) = self.channels.get_mut(channel) {
            record.set_metadata(TEMPLATE_METADATA_KEY, change.raw.clone());
        }
        info!(
            %channel,
            template = %name,
            old = %change.old.to_flag_string(),
            new = %change.new.to_flag_string(),
            "template changed"
        );

        if !change.old.is_empty() && !change.new.is_empty() && change.old != change.new {
            self.retemplate(channel, &change);
        }
        self.settle();
        Ok(change)
    }

    pub fn remove_template(&mut self, nick: &str, channel: &str, name: &str) -> Result<TemplateChange, ServiceError> {
        self.set_template(nick, channel, name, "-*")
    }

    fn retemplate(&mut self, channel: &str, change: &TemplateChange) {
        let targets: Vec<AccessTarget> = self
            .store
            .list(channel)
            .iter()
            .filter(|r| r.level == change.old)
            .map(|r| r.target.clone())
            .collect();
        for target in targets {
            let result = self.engine().change(
                channel,
                target.clone(),
                change.new - change.old,
                change.old - change.new,
                Privileges::ALL_ALL,
                Actor::Services,
            );
            if let Err(e) = result {
                warn!(%channel, target = %target, error = %e, "template update skipped");
            }
        }
    }

    /// Turn a channel option on or off.
    pub fn set_channel_flag(&mut self, nick: &str, channel: &str, flag: ChannelFlags, on: bool) -> Result<(), ServiceError> {
        self.require_privilege(nick, channel, Privileges::SET, "set")?;
        let flag = flag & ChannelFlags::PERSISTENT;
        let record = self.channels.require_mut(channel)?;
        record.flags.set(flag, on);
        info!(%channel, flag = ?flag, on, "channel option changed");
        Ok(())
    }
}
