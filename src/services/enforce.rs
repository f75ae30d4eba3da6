//! Projecting access decisions onto live channels.

use std::collections::BTreeSet;

use slirc_proto::Direction;
use tracing::{info, warn};

use super::{Evidence, Services};
use crate::acl::{AccessTarget, Actor, Privileges};
use crate::channel::{ChannelFlags, reconcile};
use crate::entity::Capabilities;
use crate::expiry::{ExpiryEntry, ExpiryKind};
use crate::modestack::ModeDelta;
use crate::state::ListEntry;

impl Services {
    /// Reconcile `channel` with its mode lock.
    ///
    /// Live state is always updated; the deltas only go out with
    /// `send_now`. Clears the pending-check flag.
    pub fn check_modes(&mut self, channel: &str, send_now: bool) {
        let channels = &self.channels;
        let Some(record) = channels.get(channel) else {
            return;
        };
        let deltas = match self.network.channel_mut(channel) {
            Some(live) => {
                let name = live.name.clone();
                let deltas = reconcile(record, live, &self.table, &|target: &str| channels.contains(target));
                Some((name, deltas))
            }
            None => None,
        };
        if let Some(record) = self.channels.get_mut(channel) {
            record.flags.remove(ChannelFlags::MLOCK_CHECK);
        }

        let Some((name, deltas)) = deltas else {
            return;
        };
        if send_now {
            let source = self.config.services.chanserv_nick.as_str();
            for delta in deltas {
                self.modestack.push(source, &name, delta);
            }
        }
    }

    /// The AKICK record that catches `nick` on `channel` and the ban to
    /// set for it, unless the user is exempt.
    fn akick_for(&self, channel: &str, nick: &str) -> Option<(AccessTarget, String)> {
        let user = self.network.user(nick)?;
        let view = self.view();
        let flags = view.user_flags(channel, user);
        if !flags.contains(Privileges::AKICK) || flags.contains(Privileges::EXEMPT) {
            return None;
        }

        if let Some(record) = view.find_by_user(channel, user, Privileges::AKICK)
            && let Some(mask) = record.target.mask()
        {
            return Some((record.target.clone(), mask.to_string()));
        }
        let record = view.list(channel).iter().filter(|r| r.is_akick()).find(|r| {
            r.target
                .entity()
                .and_then(|id| view.entities.get(id))
                .is_some_and(|e| e.matches_user(user, &view, 0))
        })?;
        Some((record.target.clone(), format!("*!*@{}", user.host)))
    }

    /// Ban and kick `nick` if an AKICK record covers them. Returns whether
    /// they were removed.
    pub(super) fn enforce_user(&mut self, channel: &str, nick: &str) -> bool {
        let Some((target, ban)) = self.akick_for(channel, nick) else {
            return false;
        };
        let Some(name) = self.network.channel(channel).map(|c| c.name.clone()) else {
            return false;
        };

        self.place_ban(&name, &ban, &target, ExpiryKind::Akick);
        // the ban must reach the wire before the kick
        self.modestack.flush(&name);
        self.send_lines();

        let reason = self.config.chanserv.akick_reason.clone();
        let source = self.config.services.chanserv_nick.clone();
        self.transport
            .send_line(&source, &format!("KICK {name} {nick} :{reason}"));
        self.network.part(&name, nick);

        crate::metrics::record_akick_enforcement();
        info!(channel = %name, %nick, %ban, target = %target, "akick enforced");
        true
    }

    /// Enforce AKICK against everyone present on `channel`.
    pub(super) fn enforce_akick(&mut self, channel: &str) {
        let nicks: Vec<String> = self
            .network
            .channel_users(channel)
            .map(|u| u.nick.clone())
            .collect();
        for nick in nicks {
            self.enforce_user(channel, &nick);
        }
    }

    /// Set a ban on the live channel and remember it as evidence.
    ///
    /// A ban too long for a `MODE` line touches nothing and returns false.
    fn place_ban(&mut self, channel: &str, ban: &str, target: &AccessTarget, kind: ExpiryKind) -> bool {
        let now = self.clock.now();
        let source = self.config.services.chanserv_nick.clone();
        let delta = ModeDelta::Param {
            dir: Direction::Add,
            letter: 'b',
            value: ban.to_string(),
        };
        if !self.modestack.admits(&source, channel, &delta) {
            warn!(%channel, %ban, "ban too long for a mode line; not placed");
            return false;
        }
        if let Some(live) = self.network.channel_mut(channel)
            && !live.has_list_entry('b', ban)
        {
            live.lists.push(ListEntry {
                letter: 'b',
                mask: ban.to_string(),
                set_by: source.clone(),
                set_at: now,
            });
            self.modestack
                .mode_param(&source, channel, Direction::Add, 'b', ban);
        }

        let list = self.evidence.entry(self.channels.fold(channel)).or_default();
        match list
            .iter_mut()
            .find(|e| e.kind == kind && e.target.same_as(target))
        {
            Some(existing) => {
                existing.bans.insert(ban.to_string());
            }
            None => list.push(Evidence {
                target: target.clone(),
                kind,
                bans: BTreeSet::from([ban.to_string()]),
            }),
        }
        true
    }

    /// Remove the live bans placed for `target`.
    pub(super) fn lift_evidence(&mut self, channel: &str, target: &AccessTarget, kind: ExpiryKind) {
        let key = self.channels.fold(channel);
        let Some(list) = self.evidence.get_mut(&key) else {
            return;
        };
        let mut bans = BTreeSet::new();
        list.retain(|e| {
            let hit = e.kind == kind && e.target.same_as(target);
            if hit {
                bans.extend(e.bans.iter().cloned());
            }
            !hit
        });
        if list.is_empty() {
            self.evidence.remove(&key);
        }

        let source = self.config.services.chanserv_nick.clone();
        for ban in bans {
            if let Some(live) = self.network.channel_mut(channel)
                && live.remove_list_entry('b', &ban)
            {
                let name = live.name.clone();
                self.modestack
                    .mode_param(&source, &name, Direction::Del, 'b', &ban);
            }
        }
    }

    /// Revert status given by others to members without matching access.
    pub(super) fn secure_ops(&mut self, channel: &str, granted: &[(char, String)]) {
        let secure = self
            .channels
            .get(channel)
            .is_some_and(|r| r.has_flag(ChannelFlags::SECURE));
        if !secure || !self.config.protocol.secure_ops {
            return;
        }

        let mut revert = Vec::new();
        for (letter, nick) in granted {
            let needed = match letter {
                'o' => Privileges::OP | Privileges::AUTOOP,
                'h' => Privileges::HALFOP | Privileges::AUTOHALFOP,
                _ => continue,
            };
            let allowed = self
                .network
                .user(nick)
                .is_some_and(|u| self.view().user_flags(channel, u).intersects(needed));
            if !allowed {
                revert.push((*letter, nick.clone()));
            }
        }

        let source = self.config.services.chanserv_nick.clone();
        for (letter, nick) in revert {
            let nick_key = self.network.fold(&nick);
            let Some(live) = self.network.channel_mut(channel) else {
                return;
            };
            if let Some(member) = live.members.get_mut(&nick_key) {
                member.status.retain(|c| c != letter);
            }
            let name = live.name.clone();
            self.modestack
                .mode_param(&source, &name, Direction::Del, letter, &nick);
            info!(channel = %name, %nick, mode = %letter, "secure: status reverted");
        }
    }

    /// Give a member the status their flags call for.
    pub(super) fn auto_status(&mut self, channel: &str, nick: &str, flags: Privileges) {
        let noop = self
            .channels
            .get(channel)
            .is_some_and(|r| r.has_flag(ChannelFlags::NOOP));
        if noop {
            return;
        }

        let mut letters = Vec::new();
        let autoop = flags.contains(Privileges::AUTOOP);
        if autoop && flags.contains(Privileges::USEOWNER) && self.table.has_status('q') {
            letters.push('q');
        }
        if autoop && flags.contains(Privileges::USEPROTECT) && self.table.has_status('a') {
            letters.push('a');
        }
        if autoop {
            letters.push('o');
        } else if flags.contains(Privileges::AUTOHALFOP) && self.table.has_status('h') {
            letters.push('h');
        } else if flags.contains(Privileges::AUTOVOICE) {
            letters.push('v');
        }

        let nick_key = self.network.fold(nick);
        let source = self.config.services.chanserv_nick.clone();
        let Some(live) = self.network.channel_mut(channel) else {
            return;
        };
        let name = live.name.clone();
        let Some(member) = live.members.get_mut(&nick_key) else {
            return;
        };
        let nick = member.nick.clone();
        for letter in letters {
            if member.has_status(letter) {
                continue;
            }
            member.status.push(letter);
            self.modestack
                .mode_param(&source, &name, Direction::Add, letter, &nick);
        }
    }

    // ========================================================================
    // Expiry
    // ========================================================================

    /// Revert everything due at `now`. Returns how many entries fired.
    pub fn expiry_check(&mut self, now: i64) -> usize {
        let fired = self.expiry.fire(self.timers.as_mut(), now);
        for entry in &fired {
            self.revert(entry);
        }
        self.settle();
        fired.len()
    }

    fn revert(&mut self, entry: &ExpiryEntry) {
        match entry.kind {
            ExpiryKind::Akick => {
                crate::metrics::record_expiry("akick");
                let present = self
                    .store
                    .get(&entry.channel, &entry.target)
                    .is_some_and(|r| r.is_akick());
                if !present {
                    return;
                }
                let result = self.engine().change(
                    &entry.channel,
                    entry.target.clone(),
                    Privileges::empty(),
                    Privileges::AKICK,
                    Privileges::ALL_ALL,
                    Actor::Services,
                );
                match result {
                    Ok(_) => info!(channel = %entry.channel, target = %entry.target, "akick expired"),
                    Err(e) => warn!(channel = %entry.channel, target = %entry.target, error = %e, "akick expiry failed"),
                }
            }
            ExpiryKind::Hold => {
                crate::metrics::record_expiry("hold");
                self.lift_evidence(&entry.channel, &entry.target, ExpiryKind::Hold);
                info!(channel = %entry.channel, target = %entry.target, "hold released");
            }
        }
    }

    /// Ban `mask` on a live channel until `duration` seconds from now.
    pub fn place_hold(&mut self, channel: &str, mask: &str, duration: u64) -> Result<(), crate::error::ServiceError> {
        slirc_proto::mask::validate_hostmask(mask)
            .map_err(|_| crate::error::AclError::InvalidMask(mask.to_string()))?;
        let name = self
            .network
            .channel(channel)
            .map(|c| c.name.clone())
            .ok_or_else(|| crate::error::ChannelError::NotRegistered(channel.to_string()))?;

        let target = AccessTarget::Mask(mask.to_string());
        if !self.place_ban(&name, mask, &target, ExpiryKind::Hold) {
            return Err(crate::error::AclError::InvalidMask(mask.to_string()).into());
        }
        let now = self.clock.now();
        let expires = now.saturating_add(i64::try_from(duration).unwrap_or(i64::MAX));
        self.expiry.insert(
            ExpiryEntry {
                expires,
                channel: name,
                target,
                kind: ExpiryKind::Hold,
            },
            self.timers.as_mut(),
            now,
        );
        self.settle();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::Harness;
    use crate::acl::{AccessTarget, Actor, Privileges};
    use crate::channel::ChannelFlags;
    use crate::clock::TimerEvent;

    fn registered() -> Harness {
        let mut h = Harness::new();
        let alice = h.account("alice");
        h.services.register_channel("#test", alice).unwrap();
        h
    }

    fn grant(h: &mut Harness, target: AccessTarget, level: Privileges) {
        h.services
            .chanacs_change("#test", target, level, Privileges::empty(), Privileges::ALL_ALL, Actor::Services)
            .unwrap();
    }

    #[test]
    fn akick_on_join_bans_then_kicks() {
        let mut h = registered();
        grant(&mut h, AccessTarget::Mask("*!*@spam.example".into()), Privileges::AKICK);
        h.connect("carol", "c.example", None);
        h.connect("spammer", "spam.example", None);
        h.services.join("#test", "carol", "", 0);
        h.end_turn();
        h.lines.take();

        h.services.join("#test", "spammer", "", 0);
        assert_eq!(
            h.lines.take(),
            vec![
                ":ChanServ MODE #test +b *!*@spam.example",
                ":ChanServ KICK #test spammer :User is banned from this channel",
            ]
        );
        assert!(!h.services.network().is_on_channel("spammer", "#test"));
        assert_eq!(h.services.evidence_bans("#TEST"), vec!["*!*@spam.example"]);
    }

    #[test]
    fn akick_added_sweeps_present_users() {
        let mut h = registered();
        let mallory = h.account("mallory");
        h.connect("carol", "c.example", None);
        h.connect("mallory", "m.example", Some("mallory"));
        h.services.join("#test", "carol", "", 0);
        h.services.join("#test", "mallory", "", 0);
        h.end_turn();
        h.lines.take();

        grant(&mut h, AccessTarget::Entity(mallory), Privileges::AKICK);
        let lines = h.lines.take();
        assert_eq!(lines[0], ":ChanServ MODE #test +b *!*@m.example");
        assert!(lines[1].starts_with(":ChanServ KICK #test mallory "));
        assert!(h.services.network().is_on_channel("carol", "#test"));
    }

    #[test]
    fn exempt_users_stay() {
        let mut h = registered();
        let dave = h.account("dave");
        grant(&mut h, AccessTarget::Mask("*!*@*.example".into()), Privileges::AKICK);
        grant(&mut h, AccessTarget::Entity(dave), Privileges::EXEMPT);
        h.connect("dave", "d.example", Some("dave"));
        h.services.join("#test", "dave", "", 0);
        assert!(h.services.network().is_on_channel("dave", "#test"));
    }

    #[test]
    fn voice_grants_do_not_trigger_enforcement() {
        let mut h = registered();
        let bob = h.account("bob");
        h.connect("bob", "b.example", Some("bob"));
        h.services.join("#test", "bob", "", 0);
        h.end_turn();
        h.lines.take();

        grant(&mut h, AccessTarget::Entity(bob), Privileges::VOICE);
        h.end_turn();
        assert!(h.lines.take().is_empty());
    }

    #[test]
    fn auto_status_respects_noop() {
        let mut h = registered();
        let bob = h.account("bob");
        grant(&mut h, AccessTarget::Entity(bob), Privileges::VOICE | Privileges::AUTOVOICE);
        h.connect("alice", "a.example", Some("alice"));
        h.connect("bob", "b.example", Some("bob"));
        h.connect("carol", "c.example", None);
        h.services.join("#test", "carol", "", 0);
        h.end_turn();
        h.lines.take();

        h.services.join("#test", "bob", "", 0);
        h.end_turn();
        assert_eq!(h.lines.take(), vec![":ChanServ MODE #test +v bob"]);

        h.services.part("#test", "bob");
        h.services
            .set_channel_flag("alice", "#test", ChannelFlags::NOOP, true)
            .unwrap();
        h.services.join("#test", "bob", "", 0);
        h.end_turn();
        assert!(h.lines.take().is_empty());
    }

    #[test]
    fn secure_reverts_unauthorized_ops() {
        let mut h = registered();
        h.connect("alice", "a.example", Some("alice"));
        h.services
            .set_channel_flag("alice", "#test", ChannelFlags::SECURE, true)
            .unwrap();
        h.connect("op", "o.example", None);
        h.connect("friend", "f.example", None);
        h.services.join("#test", "op", "o", 0);
        h.services.join("#test", "friend", "", 0);
        h.end_turn();
        h.lines.take();

        h.services.channel_mode("op", "#test", "+o", &["friend"]);
        h.end_turn();
        assert_eq!(h.lines.take(), vec![":ChanServ MODE #test -o friend"]);
        let live = h.services.network().channel("#test").unwrap();
        assert!(!live.members["friend"].has_status('o'));
    }

    #[test]
    fn hold_expires_and_lifts_ban() {
        let mut h = registered();
        h.connect("bob", "b.example", None);
        h.services.join("#test", "bob", "", 0);
        h.end_turn();
        h.lines.take();

        h.services.place_hold("#test", "*!*@evil.example", 60).unwrap();
        h.end_turn();
        assert_eq!(h.lines.take(), vec![":ChanServ MODE #test +b *!*@evil.example"]);
        assert!(
            h.armed
                .0
                .borrow()
                .iter()
                .any(|(_, delay, e)| *e == TimerEvent::ExpiryCheck && delay.as_secs() == 60)
        );

        h.advance(60);
        let now = h.services.now();
        assert_eq!(h.services.expiry_check(now), 1);
        h.end_turn();
        assert_eq!(h.lines.take(), vec![":ChanServ MODE #test -b *!*@evil.example"]);
        assert!(h.services.evidence_bans("#test").is_empty());
    }

    #[test]
    fn hold_needs_a_live_channel() {
        let mut h = registered();
        assert!(h.services.place_hold("#test", "*!*@evil.example", 60).is_err());
        assert!(h.services.place_hold("#test", "not a mask", 60).is_err());
    }

    #[test]
    fn hold_too_long_for_a_mode_line_is_refused() {
        let mut h = Harness::with_config(
            r#"
[services]
name = "services.test"
sid = "00A"

[protocol]
max_line_len = 128
"#,
        );
        let alice = h.account("alice");
        h.services.register_channel("#test", alice).unwrap();
        h.connect("bob", "b.example", None);
        h.services.join("#test", "bob", "", 0);
        h.end_turn();
        h.lines.take();

        let mask = format!("*!*@{}.example", "x".repeat(40));
        assert!(h.services.place_hold("#test", &mask, 60).is_err());
        h.end_turn();
        assert!(h.lines.take().is_empty());
        assert!(h.services.evidence_bans("#test").is_empty());
        assert!(h.services.expiry().is_empty());
        assert!(!h.services.network().channel("#test").unwrap().has_list_entry('b', &mask));

        h.services.place_hold("#test", "*!*@e.example", 60).unwrap();
        h.end_turn();
        assert_eq!(h.lines.take(), vec![":ChanServ MODE #test +b *!*@e.example"]);
    }

    #[test]
    fn timed_akick_expires() {
        let mut h = registered();
        h.connect("alice", "a.example", Some("alice"));
        h.services
            .akick_add("alice", "#test", "*!*@temp.example", Some(30))
            .unwrap();
        assert_eq!(h.services.expiry().len(), 1);

        h.advance(30);
        let now = h.services.now();
        assert_eq!(h.services.expiry_check(now), 1);
        let target = AccessTarget::Mask("*!*@temp.example".into());
        assert!(h.services.view().find("#test", &target, Privileges::AKICK).is_none());
    }

    #[test]
    fn deleted_akick_cancels_its_expiry() {
        let mut h = registered();
        h.connect("alice", "a.example", Some("alice"));
        h.services
            .akick_add("alice", "#test", "*!*@gone.example", Some(30))
            .unwrap();
        h.services.akick_del("alice", "#test", "*!*@gone.example").unwrap();
        assert!(h.services.expiry().is_empty());

        h.advance(30);
        let now = h.services.now();
        assert_eq!(h.services.expiry_check(now), 0);
    }
}
