//! Live network state: connected users and the channels they occupy.
//!
//! This is the services' view of the network as reported by the uplink.
//! Registered-channel data lives in [`crate::channel`]; this module only
//! tracks what is true on the wire right now.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use slirc_proto::{Casemapping, SimpleModes};

use crate::entity::EntityId;

/// A list-mode entry (ban, exception, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    pub letter: char,
    pub mask: String,
    pub set_by: String,
    pub set_at: i64,
}

/// A connected user.
#[derive(Debug, Clone)]
pub struct User {
    pub nick: String,
    pub user: String,
    pub host: String,
    pub server: String,
    /// Account the user is logged in to, if any.
    pub account: Option<EntityId>,
    pub oper: bool,
    /// Channels this user is in (casemapped names).
    pub channels: BTreeSet<String>,
}

impl User {
    pub fn new(nick: &str, user: &str, host: &str, server: &str) -> Self {
        Self {
            nick: nick.to_string(),
            user: user.to_string(),
            host: host.to_string(),
            server: server.to_string(),
            account: None,
            oper: false,
            channels: BTreeSet::new(),
        }
    }

    /// `nick!user@host` as matched against access-list hostmasks.
    pub fn hostmask(&self) -> String {
        format!("{}!{}@{}", self.nick, self.user, self.host)
    }
}

/// A channel member and the status letters it holds (e.g. `"ov"`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub nick: String,
    pub status: String,
}

impl Member {
    pub fn has_status(&self, letter: char) -> bool {
        self.status.contains(letter)
    }
}

/// A channel as it exists on the network.
#[derive(Debug, Clone)]
pub struct Channel {
    pub name: String,
    pub ts: i64,
    pub modes: SimpleModes,
    /// Member limit, 0 when unset.
    pub limit: u32,
    pub key: Option<String>,
    /// Extended mode values by dialect slot.
    pub ext: Vec<Option<String>>,
    /// Members keyed by casemapped nick.
    pub members: BTreeMap<String, Member>,
    pub lists: Vec<ListEntry>,
}

impl Channel {
    pub fn new(name: &str, ts: i64, ext_slots: usize) -> Self {
        Self {
            name: name.to_string(),
            ts,
            modes: SimpleModes::empty(),
            limit: 0,
            key: None,
            ext: vec![None; ext_slots],
            members: BTreeMap::new(),
            lists: Vec::new(),
        }
    }

    pub fn has_list_entry(&self, letter: char, mask: &str) -> bool {
        self.lists
            .iter()
            .any(|e| e.letter == letter && e.mask.eq_ignore_ascii_case(mask))
    }

    /// Remove a list entry; returns whether one was present.
    pub fn remove_list_entry(&mut self, letter: char, mask: &str) -> bool {
        let before = self.lists.len();
        self.lists
            .retain(|e| !(e.letter == letter && e.mask.eq_ignore_ascii_case(mask)));
        self.lists.len() != before
    }
}

/// Connected-user lookup.
pub trait UserDirectory {
    fn find_live_user(&self, nick: &str) -> Option<&User>;
}

/// Users and channels currently on the network.
#[derive(Debug, Default)]
pub struct Network {
    casemap: Casemapping,
    ext_slots: usize,
    users: HashMap<String, User>,
    channels: HashMap<String, Channel>,
}

impl Network {
    pub fn new(casemap: Casemapping, ext_slots: usize) -> Self {
        Self {
            casemap,
            ext_slots,
            users: HashMap::new(),
            channels: HashMap::new(),
        }
    }

    pub fn fold(&self, name: &str) -> String {
        self.casemap.to_lower(name)
    }

    pub fn user_connect(&mut self, user: User) {
        let key = self.fold(&user.nick);
        self.users.insert(key, user);
    }

    /// Remove a user everywhere. Empty channels are destroyed.
    pub fn user_quit(&mut self, nick: &str) -> Option<User> {
        let key = self.fold(nick);
        let user = self.users.remove(&key)?;
        for chan in &user.channels {
            self.remove_member(chan, &key);
        }
        Some(user)
    }

    pub fn nick_change(&mut self, old: &str, new: &str) -> bool {
        let old_key = self.fold(old);
        let new_key = self.fold(new);
        let Some(mut user) = self.users.remove(&old_key) else {
            return false;
        };
        user.nick = new.to_string();
        for chan in &user.channels {
            if let Some(channel) = self.channels.get_mut(chan)
                && let Some(mut member) = channel.members.remove(&old_key)
            {
                member.nick = new.to_string();
                channel.members.insert(new_key.clone(), member);
            }
        }
        self.users.insert(new_key, user);
        true
    }

    pub fn set_account(&mut self, nick: &str, account: Option<EntityId>) -> bool {
        let key = self.fold(nick);
        match self.users.get_mut(&key) {
            Some(user) => {
                user.account = account;
                true
            }
            None => false,
        }
    }

    /// Add `nick` to `channel`, creating the channel if needed. Returns
    /// whether the channel was newly created.
    pub fn join(&mut self, channel: &str, nick: &str, status: &str, ts: i64) -> bool {
        let chan_key = self.fold(channel);
        let nick_key = self.fold(nick);
        let Some(user) = self.users.get_mut(&nick_key) else {
            return false;
        };
        user.channels.insert(chan_key.clone());

        let ext_slots = self.ext_slots;
        let mut created = false;
        let chan = self.channels.entry(chan_key).or_insert_with(|| {
            created = true;
            Channel::new(channel, ts, ext_slots)
        });
        chan.members.insert(
            nick_key,
            Member {
                nick: user.nick.clone(),
                status: status.to_string(),
            },
        );
        created
    }

    /// Remove `nick` from `channel`. Returns whether the channel was destroyed.
    pub fn part(&mut self, channel: &str, nick: &str) -> bool {
        let chan_key = self.fold(channel);
        let nick_key = self.fold(nick);
        if let Some(user) = self.users.get_mut(&nick_key) {
            user.channels.remove(&chan_key);
        }
        self.remove_member(&chan_key, &nick_key)
    }

    fn remove_member(&mut self, chan_key: &str, nick_key: &str) -> bool {
        let Some(chan) = self.channels.get_mut(chan_key) else {
            return false;
        };
        chan.members.remove(nick_key);
        if chan.members.is_empty() {
            self.channels.remove(chan_key);
            return true;
        }
        false
    }

    pub fn user(&self, nick: &str) -> Option<&User> {
        self.users.get(&self.fold(nick))
    }

    pub fn user_mut(&mut self, nick: &str) -> Option<&mut User> {
        let key = self.fold(nick);
        self.users.get_mut(&key)
    }

    pub fn channel(&self, name: &str) -> Option<&Channel> {
        self.channels.get(&self.fold(name))
    }

    pub fn channel_mut(&mut self, name: &str) -> Option<&mut Channel> {
        let key = self.fold(name);
        self.channels.get_mut(&key)
    }

    pub fn is_on_channel(&self, nick: &str, channel: &str) -> bool {
        self.user(nick)
            .is_some_and(|u| u.channels.contains(&self.fold(channel)))
    }

    /// Members of a channel joined to their user records.
    pub fn channel_users<'a>(&'a self, channel: &str) -> impl Iterator<Item = &'a User> + 'a {
        self.channel(channel)
            .into_iter()
            .flat_map(|c| c.members.keys())
            .filter_map(|key| self.users.get(key))
    }

    pub fn users_logged_in_as(&self, account: EntityId) -> impl Iterator<Item = &User> {
        self.users
            .values()
            .filter(move |u| u.account == Some(account))
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}

impl UserDirectory for Network {
    fn find_live_user(&self, nick: &str) -> Option<&User> {
        self.user(nick)
    }
}
