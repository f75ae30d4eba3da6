//! Time-ordered reversions of temporary grants.
//!
//! Entries sit in a `Vec` sorted by expiry time. New entries are placed by
//! walking back from the tail, which is where almost all of them land.
//! Exactly one timer is armed, for the head.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use slirc_proto::Casemapping;
use tracing::debug;

use crate::acl::AccessTarget;
use crate::clock::{TimerEvent, TimerHandle, Timers};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpiryKind {
    /// Remove a timed AKICK record and the ban placed for it.
    Akick,
    /// Lift an enforcement hold ban.
    Hold,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpiryEntry {
    pub expires: i64,
    pub channel: String,
    pub target: AccessTarget,
    pub kind: ExpiryKind,
}

#[derive(Debug, Default)]
pub struct ExpiryScheduler {
    casemap: Casemapping,
    entries: Vec<ExpiryEntry>,
    /// Armed timer and the expiry it was armed for.
    armed: Option<(TimerHandle, i64)>,
}

impl ExpiryScheduler {
    pub fn new(casemap: Casemapping) -> Self {
        Self {
            casemap,
            entries: Vec::new(),
            armed: None,
        }
    }

    /// Insert before the first entry expiring at or after `entry`.
    pub fn insert(&mut self, entry: ExpiryEntry, timers: &mut dyn Timers, now: i64) {
        let mut at = self.entries.len();
        while at > 0 && self.entries[at - 1].expires >= entry.expires {
            at -= 1;
        }
        debug!(channel = %entry.channel, target = %entry.target, expires = entry.expires, "expiry scheduled");
        self.entries.insert(at, entry);
        self.rearm(timers, now);
    }

    fn matches(&self, e: &ExpiryEntry, channel: &str, target: &AccessTarget, kind: ExpiryKind) -> bool {
        e.kind == kind && e.target.same_as(target) && self.casemap.equals(&e.channel, channel)
    }

    /// Drop entries for (channel, target, kind). Returns how many went.
    pub fn cancel(
        &mut self,
        channel: &str,
        target: &AccessTarget,
        kind: ExpiryKind,
        timers: &mut dyn Timers,
        now: i64,
    ) -> usize {
        let before = self.entries.len();
        let keep: Vec<ExpiryEntry> = std::mem::take(&mut self.entries)
            .into_iter()
            .filter(|e| !self.matches(e, channel, target, kind))
            .collect();
        self.entries = keep;
        let removed = before - self.entries.len();
        if removed > 0 {
            self.rearm(timers, now);
        }
        removed
    }

    /// Drop every entry of a channel.
    pub fn cancel_channel(&mut self, channel: &str, timers: &mut dyn Timers, now: i64) -> usize {
        let before = self.entries.len();
        let casemap = self.casemap;
        self.entries.retain(|e| !casemap.equals(&e.channel, channel));
        let removed = before - self.entries.len();
        if removed > 0 {
            self.rearm(timers, now);
        }
        removed
    }

    /// The armed timer was delivered, so its handle is spent.
    pub fn timer_fired(&mut self) {
        self.armed = None;
    }

    /// Pop everything due, in order, and re-arm. Safe to call before the
    /// head is due: an unchanged head keeps its timer.
    pub fn fire(&mut self, timers: &mut dyn Timers, now: i64) -> Vec<ExpiryEntry> {
        let due = self.entries.partition_point(|e| e.expires <= now);
        let fired: Vec<ExpiryEntry> = self.entries.drain(..due).collect();
        self.rearm(timers, now);
        fired
    }

    fn rearm(&mut self, timers: &mut dyn Timers, now: i64) {
        let head = self.entries.first().map(|e| e.expires);
        if self.armed.map(|(_, at)| at) == head {
            return;
        }
        if let Some((handle, _)) = self.armed.take() {
            timers.cancel(handle);
        }
        if let Some(at) = head {
            let delay = Duration::from_secs(at.saturating_sub(now).max(0).unsigned_abs());
            let handle = timers.arm_once(delay, TimerEvent::ExpiryCheck);
            self.armed = Some((handle, at));
        }
    }

    pub fn head(&self) -> Option<&ExpiryEntry> {
        self.entries.first()
    }

    pub fn entries(&self) -> &[ExpiryEntry] {
        &self.entries
    }

    pub fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct CountingTimers {
        next: u64,
        armed: Vec<(TimerHandle, Duration)>,
        cancelled: Vec<TimerHandle>,
    }

    impl CountingTimers {
        fn live(&self) -> usize {
            self.armed
                .iter()
                .filter(|(h, _)| !self.cancelled.contains(h))
                .count()
        }
    }

    impl Timers for CountingTimers {
        fn arm_once(&mut self, delay: Duration, _event: TimerEvent) -> TimerHandle {
            self.next += 1;
            let h = TimerHandle::from_raw(self.next);
            self.armed.push((h, delay));
            h
        }
        fn cancel(&mut self, handle: TimerHandle) {
            self.cancelled.push(handle);
        }
    }

    fn entry(expires: i64, mask: &str) -> ExpiryEntry {
        ExpiryEntry {
            expires,
            channel: "#test".into(),
            target: AccessTarget::Mask(mask.into()),
            kind: ExpiryKind::Akick,
        }
    }

    #[test]
    fn stays_sorted_and_stable() {
        let mut timers = CountingTimers::default();
        let mut s = ExpiryScheduler::new(Casemapping::Rfc1459);
        s.insert(entry(30, "a!*@*"), &mut timers, 0);
        s.insert(entry(10, "b!*@*"), &mut timers, 0);
        s.insert(entry(30, "c!*@*"), &mut timers, 0);
        s.insert(entry(20, "d!*@*"), &mut timers, 0);
        let order: Vec<i64> = s.entries().iter().map(|e| e.expires).collect();
        assert_eq!(order, vec![10, 20, 30, 30]);
        // equal expiry goes in front of the existing one
        assert_eq!(s.entries()[2].target, AccessTarget::Mask("c!*@*".into()));
    }

    #[test]
    fn one_timer_for_the_head() {
        let mut timers = CountingTimers::default();
        let mut s = ExpiryScheduler::new(Casemapping::Rfc1459);
        s.insert(entry(100, "a!*@*"), &mut timers, 40);
        s.insert(entry(200, "b!*@*"), &mut timers, 40);
        assert_eq!(timers.armed.len(), 1);
        assert_eq!(timers.armed[0].1, Duration::from_secs(60));

        s.insert(entry(50, "c!*@*"), &mut timers, 40);
        assert_eq!(timers.armed.len(), 2);
        assert_eq!(timers.cancelled, vec![timers.armed[0].0]);
    }

    #[test]
    fn fire_pops_due_entries_and_rearms() {
        let mut timers = CountingTimers::default();
        let mut s = ExpiryScheduler::new(Casemapping::Rfc1459);
        s.insert(entry(10, "a!*@*"), &mut timers, 0);
        s.insert(entry(10, "b!*@*"), &mut timers, 0);
        s.insert(entry(25, "c!*@*"), &mut timers, 0);

        let fired = s.fire(&mut timers, 12);
        assert_eq!(fired.len(), 2);
        assert_eq!(s.len(), 1);
        assert!(s.is_armed());
        assert_eq!(timers.armed.last().map(|a| a.1), Some(Duration::from_secs(13)));

        assert_eq!(s.fire(&mut timers, 30).len(), 1);
        assert!(!s.is_armed());
        assert!(s.is_empty());
    }

    #[test]
    fn early_checks_keep_a_single_timer() {
        let mut timers = CountingTimers::default();
        let mut s = ExpiryScheduler::new(Casemapping::Rfc1459);
        s.insert(entry(100, "a!*@*"), &mut timers, 0);
        assert!(s.fire(&mut timers, 10).is_empty());
        assert!(s.fire(&mut timers, 20).is_empty());
        assert_eq!(timers.live(), 1);
        assert_eq!(timers.armed.len(), 1);

        // an early check that pops the head moves the timer to the next one
        s.insert(entry(150, "b!*@*"), &mut timers, 20);
        s.insert(entry(30, "c!*@*"), &mut timers, 20);
        assert_eq!(s.fire(&mut timers, 40).len(), 1);
        assert_eq!(timers.live(), 1);
        assert_eq!(timers.armed.last().map(|a| a.1), Some(Duration::from_secs(60)));
    }

    #[test]
    fn delivered_timer_is_replaced_not_cancelled() {
        let mut timers = CountingTimers::default();
        let mut s = ExpiryScheduler::new(Casemapping::Rfc1459);
        s.insert(entry(10, "a!*@*"), &mut timers, 0);
        s.insert(entry(20, "b!*@*"), &mut timers, 0);
        s.timer_fired();
        assert_eq!(s.fire(&mut timers, 10).len(), 1);
        assert!(timers.cancelled.is_empty());
        assert_eq!(timers.armed.len(), 2);
        assert!(s.is_armed());

        // delivered a little ahead of the wall clock: nothing due, re-armed
        s.timer_fired();
        assert!(s.fire(&mut timers, 19).is_empty());
        assert_eq!(timers.armed.last().map(|a| a.1), Some(Duration::from_secs(1)));
    }

    #[test]
    fn cancel_matches_casemapped_channel() {
        let mut timers = CountingTimers::default();
        let mut s = ExpiryScheduler::new(Casemapping::Rfc1459);
        s.insert(entry(10, "a!*@*"), &mut timers, 0);
        s.insert(entry(20, "b!*@*"), &mut timers, 0);
        let removed = s.cancel("#TEST", &AccessTarget::Mask("A!*@*".into()), ExpiryKind::Akick, &mut timers, 0);
        assert_eq!(removed, 1);
        assert_eq!(s.head().map(|e| e.expires), Some(20));
        assert_eq!(s.cancel("#test", &AccessTarget::Mask("b!*@*".into()), ExpiryKind::Hold, &mut timers, 0), 0);
        assert_eq!(s.cancel_channel("#Test", &mut timers, 0), 1);
        assert!(!s.is_armed());
    }

    #[test]
    fn past_due_entries_arm_immediately() {
        let mut timers = CountingTimers::default();
        let mut s = ExpiryScheduler::new(Casemapping::Rfc1459);
        s.insert(entry(5, "a!*@*"), &mut timers, 100);
        assert_eq!(timers.armed[0].1, Duration::ZERO);
    }
}
