//! Live network events reported by the uplink.

use slirc_proto::mode::parse_mode_changes;
use slirc_proto::{Direction, ModeClass, SimpleModes};
use tracing::{debug, info};

use super::Services;
use crate::acl::Privileges;
use crate::channel::needs_check;
use crate::error::{EntityError, ServiceError};
use crate::state::{ListEntry, User};

impl Services {
    pub fn user_connect(&mut self, nick: &str, user: &str, host: &str, server: &str) {
        debug!(%nick, %host, "user connected");
        self.network.user_connect(User::new(nick, user, host, server));
    }

    pub fn user_quit(&mut self, nick: &str) {
        if self.network.user_quit(nick).is_some() {
            debug!(%nick, "user quit");
        }
    }

    pub fn nick_change(&mut self, old: &str, new: &str) {
        self.network.nick_change(old, new);
    }

    pub fn set_oper(&mut self, nick: &str, oper: bool) -> Result<(), ServiceError> {
        self.network
            .user_mut(nick)
            .map(|u| u.oper = oper)
            .ok_or_else(|| ServiceError::NoSuchUser(nick.to_string()))
    }

    /// A user identified to `account`. Their channels are re-evaluated as
    /// if they had just joined.
    pub fn login(&mut self, nick: &str, account: &str) -> Result<(), ServiceError> {
        let id = self
            .entities
            .lookup_id(account)
            .filter(|id| self.entities.account(*id).is_some())
            .ok_or_else(|| EntityError::NoSuchEntity(account.to_string()))?;
        if !self.network.set_account(nick, Some(id)) {
            return Err(ServiceError::NoSuchUser(nick.to_string()));
        }
        let now = self.clock.now();
        if let Some(acc) = self.entities.account_mut(id) {
            acc.last_login = now;
        }
        info!(%nick, %account, "user logged in");

        let channels: Vec<String> = self
            .network
            .user(nick)
            .map(|u| u.channels.iter().cloned().collect())
            .unwrap_or_default();
        for channel in channels {
            if self.channels.contains(&channel) {
                self.process_member(&channel, nick);
            }
        }
        self.settle();
        Ok(())
    }

    pub fn logout(&mut self, nick: &str) -> Result<(), ServiceError> {
        if !self.network.set_account(nick, None) {
            return Err(ServiceError::NoSuchUser(nick.to_string()));
        }
        info!(%nick, "user logged out");
        Ok(())
    }

    /// `nick` joined `channel` with `status` letters.
    ///
    /// A channel created by this join gets its mode lock applied at the end
    /// of the turn. Registered channels then get AKICK enforcement and
    /// automatic status.
    pub fn join(&mut self, channel: &str, nick: &str, status: &str, ts: i64) {
        let created = self.network.join(channel, nick, status, ts);
        if !self.channels.contains(channel) {
            return;
        }
        if created {
            self.defer_mlock_check(channel);
        }
        self.process_member(channel, nick);
        self.settle();
    }

    pub fn part(&mut self, channel: &str, nick: &str) {
        self.network.part(channel, nick);
    }

    pub fn kick(&mut self, channel: &str, nick: &str) {
        self.network.part(channel, nick);
    }

    /// AKICK first, then automatic status and last-used bookkeeping.
    pub(super) fn process_member(&mut self, channel: &str, nick: &str) {
        if self.enforce_user(channel, nick) {
            return;
        }
        let Some(user) = self.network.user(nick) else {
            return;
        };
        let flags = self.view().user_flags(channel, user);
        if flags.intersects(Privileges::USEDUPDATE) {
            let now = self.clock.now();
            if let Some(record) = self.channels.get_mut(channel) {
                record.last_used = now;
            }
        }
        self.auto_status(channel, nick, flags);
    }

    /// A MODE from someone else. Live state is updated, then secure-ops and
    /// the mode lock are applied.
    pub fn channel_mode<S: AsRef<str>>(&mut self, source: &str, channel: &str, modes: &str, params: &[S]) {
        let changes = parse_mode_changes(&self.table, modes, params);
        let now = self.clock.now();
        let nick_keys: Vec<Option<String>> = changes
            .iter()
            .map(|c| c.param.as_deref().map(|p| self.network.fold(p)))
            .collect();

        let Some(live) = self.network.channel_mut(channel) else {
            return;
        };
        let mut changed = SimpleModes::empty();
        let mut ext_changed = false;
        let mut granted = Vec::new();

        for (change, nick_key) in changes.iter().zip(nick_keys) {
            let adding = change.dir == Direction::Add;
            match change.class {
                ModeClass::Simple(bit) => {
                    live.modes.set(bit, adding);
                    changed |= bit;
                }
                ModeClass::Key => {
                    live.key = if adding { change.param.clone() } else { None };
                    changed |= SimpleModes::KEY;
                }
                ModeClass::Limit => {
                    live.limit = match (adding, change.param.as_deref()) {
                        (true, Some(p)) => p.parse().unwrap_or(0),
                        _ => 0,
                    };
                    changed |= SimpleModes::LIMIT;
                }
                ModeClass::Ext(slot) => {
                    if let Some(value) = live.ext.get_mut(slot) {
                        *value = if adding { change.param.clone() } else { None };
                        ext_changed = true;
                    }
                }
                ModeClass::List => {
                    let Some(mask) = change.param.as_deref() else {
                        continue;
                    };
                    if adding {
                        if !live.has_list_entry(change.letter, mask) {
                            live.lists.push(ListEntry {
                                letter: change.letter,
                                mask: mask.to_string(),
                                set_by: source.to_string(),
                                set_at: now,
                            });
                        }
                    } else {
                        live.remove_list_entry(change.letter, mask);
                    }
                }
                ModeClass::Status => {
                    let Some(member) = nick_key.and_then(|k| live.members.get_mut(&k)) else {
                        continue;
                    };
                    if adding {
                        if !member.has_status(change.letter) {
                            member.status.push(change.letter);
                        }
                        granted.push((change.letter, member.nick.clone()));
                    } else {
                        member.status.retain(|c| c != change.letter);
                    }
                }
            }
        }

        if !self.channels.contains(channel) || self.casemap.equals(source, self.source()) {
            return;
        }
        self.secure_ops(channel, &granted);
        let check = self
            .channels
            .get(channel)
            .is_some_and(|record| needs_check(record, changed, ext_changed));
        if check {
            self.check_modes(channel, true);
        }
        self.settle();
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::Harness;
    use crate::acl::{AccessTarget, Actor, Privileges};

    #[test]
    fn login_updates_last_login_and_auto_ops() {
        let mut h = Harness::new();
        let alice = h.account("alice");
        h.services.register_channel("#test", alice).unwrap();
        h.connect("alice", "a.example", None);
        h.services.join("#test", "alice", "", 0);
        h.end_turn();
        h.lines.take();

        h.advance(50);
        h.services.login("alice", "alice").unwrap();
        h.end_turn();
        let account = h.services.entities().account(alice).unwrap();
        assert_eq!(account.last_login, h.services.now());
        assert_eq!(h.lines.take(), vec![":ChanServ MODE #test +o alice"]);
    }

    #[test]
    fn login_to_unknown_account_fails() {
        let mut h = Harness::new();
        h.connect("bob", "b.example", None);
        assert!(h.services.login("bob", "nobody").is_err());
        assert!(h.services.login("ghost", "nobody").is_err());
    }

    #[test]
    fn external_mode_updates_live_state() {
        let mut h = Harness::new();
        h.connect("bob", "b.example", None);
        h.services.join("#open", "bob", "o", 0);
        h.services.channel_mode("bob", "#open", "+mlk-n+b", &["10", "sekrit", "*!*@x"]);
        let live = h.services.network().channel("#open").unwrap();
        assert!(live.modes.contains(slirc_proto::SimpleModes::MODERATED));
        assert_eq!(live.limit, 10);
        assert_eq!(live.key.as_deref(), Some("sekrit"));
        assert!(live.has_list_entry('b', "*!*@x"));
        // unregistered channels are left alone
        assert!(h.lines.take().is_empty());
    }

    #[test]
    fn mode_lock_reasserted_after_external_change() {
        let mut h = Harness::new();
        let alice = h.account("alice");
        h.services.register_channel("#test", alice).unwrap();
        h.connect("bob", "b.example", None);
        h.services.join("#test", "bob", "o", 0);
        h.end_turn();
        h.lines.take();

        h.services.channel_mode("bob", "#test", "-t", &[] as &[&str]);
        h.end_turn();
        assert_eq!(h.lines.take(), vec![":ChanServ MODE #test +t"]);
    }

    #[test]
    fn usage_stamps_last_used() {
        let mut h = Harness::new();
        let alice = h.account("alice");
        let bob = h.account("bob");
        h.services.register_channel("#test", alice).unwrap();
        h.services
            .chanacs_change("#test", AccessTarget::Entity(bob), Privileges::VOICE, Privileges::empty(), Privileges::ALL_ALL, Actor::Services)
            .unwrap();
        h.advance(100);
        h.connect("bob", "b.example", Some("bob"));
        h.services.join("#test", "bob", "", 0);
        assert_eq!(h.services.channels().get("#test").unwrap().last_used, h.services.now());
    }
}
