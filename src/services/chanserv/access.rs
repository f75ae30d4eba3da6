//! ACCESS / FLAGS: editing access records on behalf of a user.

use crate::acl::{
    AccessTarget, Privileges, Realized, TEMPLATE_METADATA_KEY, parse_flag_changes, resolve_target,
    restrict_for, template_flags,
};
use crate::channel::ChannelFlags;
use crate::error::{AclError, ServiceError};
use crate::services::Services;

impl Services {
    /// Change `target`'s access on `channel` as `nick`.
    ///
    /// `spec` is either a flag change (`+oV-s`, `=v`, `-*`) or a template
    /// name, which sets the level to exactly that template's flags.
    pub fn access(&mut self, nick: &str, channel: &str, target: &str, spec: &str) -> Result<Realized, ServiceError> {
        let target = resolve_target(&mut self.entities, target)?;
        let result = self.apply_access(nick, channel, target.clone(), spec);
        self.release_target(&target);
        result
    }

    fn apply_access(
        &mut self,
        nick: &str,
        channel: &str,
        target: AccessTarget,
        spec: &str,
    ) -> Result<Realized, ServiceError> {
        let (id, flags) = self.actor(nick, channel)?;
        let limitflags = self.channel_flag(channel, ChannelFlags::LIMITFLAGS)?;
        let (add, remove) = self.flag_request(channel, spec)?;

        let targeting_self = target.entity() == Some(id);
        let restrict = restrict_for(flags, targeting_self, limitflags, &self.policy).map_err(AclError::from)?;
        let actor = self.entity_actor(nick, channel)?;
        Ok(self.chanacs_change(channel, target, add, remove, restrict, actor)?)
    }

    fn flag_request(&self, channel: &str, spec: &str) -> Result<(Privileges, Privileges), AclError> {
        if spec.starts_with(['+', '-', '=', '*']) {
            return Ok(parse_flag_changes(spec, &self.policy));
        }
        let raw = self
            .channels
            .get(channel)
            .and_then(|r| r.metadata(TEMPLATE_METADATA_KEY));
        let level = template_flags(raw, &self.templates, spec, &self.policy)
            .ok_or_else(|| AclError::InvalidTemplate(spec.to_string()))?;
        Ok((level, self.policy.all - level))
    }

    /// The record `target` holds on `channel`, by its textual form.
    pub fn access_level(&mut self, channel: &str, target: &str) -> Result<Privileges, ServiceError> {
        let target: AccessTarget = resolve_target(&mut self.entities, target)?;
        let level = self
            .view()
            .find(channel, &target, Privileges::empty())
            .map(|r| r.level)
            .unwrap_or_default();
        self.release_target(&target);
        Ok(level)
    }
}
