//! The services context.
//!
//! [`Services`] owns every piece of engine state together with the host
//! hooks (transport, timers, clock). Each public operation is one turn: it
//! mutates state, then settles, which routes queued access events to the
//! observers and to AKICK enforcement and hands flushed MODE lines to the
//! transport.
//!
//! - [`accounts`]: account registration and drop with founder succession
//! - [`chanserv`]: channel registration, access, AKICK, mode lock, templates
//! - [`enforce`]: mode-lock checks, AKICK bans, secure-ops and expiry
//! - [`events`]: live network state updates from the uplink
//! - [`observers`]: stock [`AclObserver`] implementations
//! - [`persist`]: snapshot capture and restore

mod accounts;
mod chanserv;
mod enforce;
mod events;
mod observers;
mod persist;

pub use observers::{LogObserver, MetricsObserver};

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use slirc_proto::{Casemapping, ModeTable, ProtoError};
use tracing::{debug, warn};

use crate::acl::{
    AccessEngine, AccessTarget, AclLimits, AclObserver, AclPolicy, AclStore, AclView, Actor,
    GlobalTemplates, Privileges, Realized,
};
use crate::channel::ChannelRegistry;
use crate::clock::{Clock, TimerEvent, TimerHandle, Timers};
use crate::config::Config;
use crate::entity::{EntityId, EntityRegistry};
use crate::error::AclError;
use crate::expiry::{ExpiryKind, ExpiryScheduler};
use crate::modestack::ModeStack;
use crate::state::Network;
use crate::transport::Transport;

/// Bans placed on a channel on behalf of one record or hold.
#[derive(Debug, Clone)]
struct Evidence {
    target: AccessTarget,
    kind: ExpiryKind,
    bans: BTreeSet<String>,
}

/// Top-level owner of the channel services state.
pub struct Services {
    config: Config,
    casemap: Casemapping,
    table: ModeTable,
    policy: AclPolicy,
    limits: AclLimits,
    templates: GlobalTemplates,

    entities: EntityRegistry,
    channels: ChannelRegistry,
    store: AclStore,
    network: Network,
    modestack: ModeStack,
    expiry: ExpiryScheduler,

    observers: Vec<Box<dyn AclObserver>>,
    transport: Box<dyn Transport>,
    timers: Box<dyn Timers>,
    clock: Box<dyn Clock>,

    /// Live bans placed as evidence, keyed by casemapped channel.
    evidence: HashMap<String, Vec<Evidence>>,
    /// Armed end-of-turn mode-lock check.
    mlock_timer: Option<TimerHandle>,
}

impl Services {
    /// Build the context from a validated configuration.
    pub fn new(
        config: Config,
        transport: Box<dyn Transport>,
        timers: Box<dyn Timers>,
        clock: Box<dyn Clock>,
    ) -> Result<Self, ProtoError> {
        let casemap = config.protocol.casemapping()?;
        let table = config.protocol.mode_table()?;
        let policy = config.protocol.policy();
        let limits = config.chanserv.limits();
        let templates = config.chanserv.global_templates(&policy);
        let ext_slots = table.ext_slots();

        Ok(Self {
            entities: EntityRegistry::new(casemap, &config.services.sid),
            channels: ChannelRegistry::new(casemap),
            store: AclStore::new(casemap),
            network: Network::new(casemap, ext_slots),
            modestack: ModeStack::new(table.clone(), casemap),
            expiry: ExpiryScheduler::new(casemap),
            config,
            casemap,
            table,
            policy,
            limits,
            templates,
            observers: Vec::new(),
            transport,
            timers,
            clock,
            evidence: HashMap::new(),
            mlock_timer: None,
        })
    }

    pub fn add_observer(&mut self, observer: Box<dyn AclObserver>) {
        self.observers.push(observer);
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn policy(&self) -> &AclPolicy {
        &self.policy
    }

    pub fn templates(&self) -> &GlobalTemplates {
        &self.templates
    }

    pub fn entities(&self) -> &EntityRegistry {
        &self.entities
    }

    pub fn entities_mut(&mut self) -> &mut EntityRegistry {
        &mut self.entities
    }

    pub fn channels(&self) -> &ChannelRegistry {
        &self.channels
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn expiry(&self) -> &ExpiryScheduler {
        &self.expiry
    }

    pub fn now(&self) -> i64 {
        self.clock.now()
    }

    /// Read-only access queries.
    pub fn view(&self) -> AclView<'_> {
        AclView {
            store: &self.store,
            entities: &self.entities,
            channels: &self.channels,
            network: &self.network,
            limits: &self.limits,
        }
    }

    /// Bans currently held as evidence on `channel`.
    pub fn evidence_bans(&self, channel: &str) -> Vec<String> {
        self.evidence
            .get(&self.channels.fold(channel))
            .into_iter()
            .flatten()
            .flat_map(|e| e.bans.iter().cloned())
            .collect()
    }

    fn source(&self) -> &str {
        &self.config.services.chanserv_nick
    }

    fn engine(&mut self) -> AccessEngine<'_> {
        let now = self.clock.now();
        AccessEngine::new(
            &mut self.store,
            &self.entities,
            &self.channels,
            &self.network,
            &self.limits,
            self.policy,
            now,
        )
    }

    // ========================================================================
    // Access list core
    // ========================================================================

    /// Open, modify and close one access record, then settle the turn.
    pub fn chanacs_change(
        &mut self,
        channel: &str,
        target: AccessTarget,
        add: Privileges,
        remove: Privileges,
        restrict: Privileges,
        actor: Actor,
    ) -> Result<Realized, AclError> {
        let result = self
            .engine()
            .change(channel, target, add, remove, restrict, actor);
        match &result {
            Ok(realized) if realized.is_empty() => crate::metrics::record_acl_change("noop"),
            Ok(_) => crate::metrics::record_acl_change("ok"),
            Err(e) => crate::metrics::record_acl_change(e.error_code()),
        }
        self.settle();
        result
    }

    /// Route queued access events and hand finished MODE lines to the
    /// transport.
    fn settle(&mut self) {
        let events = self.store.take_events();
        for event in &events {
            for observer in &mut self.observers {
                observer.chanacs_changed(event);
            }
            if event.akick_added() {
                self.enforce_akick(&event.channel);
            }
            if event.akick_removed() {
                let now = self.clock.now();
                self.expiry.cancel(
                    &event.channel,
                    &event.target,
                    ExpiryKind::Akick,
                    self.timers.as_mut(),
                    now,
                );
                self.lift_evidence(&event.channel, &event.target, ExpiryKind::Akick);
            }
            if let AccessTarget::Entity(id) = event.target
                && event.new.is_empty()
            {
                self.release_if_unused(id);
            }
        }

        self.send_lines();
        if self.modestack.take_arm_request() {
            self.timers.arm_once(Duration::ZERO, TimerEvent::ModeStackFlush);
        }
        crate::metrics::set_sizes(self.channels.len(), self.store.record_count());
    }

    fn send_lines(&mut self) {
        for line in self.modestack.take_lines() {
            self.transport.send_line(&line.source, &line.to_wire());
        }
    }

    /// Release `target` if it is an ext-target nothing references.
    fn release_target(&mut self, target: &AccessTarget) {
        if let Some(id) = target.entity() {
            self.release_if_unused(id);
        }
    }

    /// Forget a cached ext-target once no record points at it.
    fn release_if_unused(&mut self, id: EntityId) {
        if self.store.references(id) == 0 && self.entities.release_ext(id) {
            debug!(id = %id, "ext target released");
        }
    }

    // ========================================================================
    // Timers
    // ========================================================================

    /// Dispatch a fired timer.
    pub fn handle_timer(&mut self, event: TimerEvent) {
        let _span = crate::telemetry::spans::timer(match event {
            TimerEvent::ExpiryCheck => "expiry",
            TimerEvent::ModeStackFlush => "modestack",
            TimerEvent::MlockCheck => "mlock",
        })
        .entered();

        match event {
            TimerEvent::ExpiryCheck => {
                self.expiry.timer_fired();
                let now = self.clock.now();
                self.expiry_check(now);
            }
            TimerEvent::ModeStackFlush => {
                self.modestack.turn_ended();
                self.settle();
            }
            TimerEvent::MlockCheck => {
                self.mlock_timer = None;
                for channel in self.channels.pending_mlock_checks() {
                    self.check_modes(&channel, true);
                }
                self.settle();
            }
        }
    }

    /// Schedule a mode-lock check for the end of the turn.
    fn defer_mlock_check(&mut self, channel: &str) {
        let Some(record) = self.channels.get_mut(channel) else {
            return;
        };
        record.flags |= crate::channel::ChannelFlags::MLOCK_CHECK;
        if self.mlock_timer.is_none() {
            self.mlock_timer = Some(self.timers.arm_once(Duration::ZERO, TimerEvent::MlockCheck));
        }
    }

    /// Flush everything pending; used at shutdown.
    pub fn shutdown(&mut self) {
        if let Some(handle) = self.mlock_timer.take() {
            self.timers.cancel(handle);
        }
        for channel in self.channels.pending_mlock_checks() {
            self.check_modes(&channel, true);
        }
        self.modestack.flush_all();
        self.settle();
        if self.modestack.has_pending() {
            warn!("mode stack still pending at shutdown");
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Fakes shared by the services unit tests.

    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    use super::*;

    #[derive(Clone, Default)]
    pub struct Lines(pub Rc<RefCell<Vec<String>>>);

    impl Lines {
        pub fn take(&self) -> Vec<String> {
            std::mem::take(&mut *self.0.borrow_mut())
        }
    }

    impl Transport for Lines {
        fn send_line(&mut self, source: &str, text: &str) {
            self.0.borrow_mut().push(format!(":{source} {text}"));
        }
    }

    #[derive(Clone, Default)]
    pub struct Armed(pub Rc<RefCell<Vec<(TimerHandle, Duration, TimerEvent)>>>);

    impl Armed {
        pub fn take(&self) -> Vec<(TimerHandle, Duration, TimerEvent)> {
            std::mem::take(&mut *self.0.borrow_mut())
        }
    }

    pub struct FakeTimers {
        next: u64,
        armed: Armed,
    }

    impl Timers for FakeTimers {
        fn arm_once(&mut self, delay: Duration, event: TimerEvent) -> TimerHandle {
            self.next += 1;
            let handle = TimerHandle::from_raw(self.next);
            self.armed.0.borrow_mut().push((handle, delay, event));
            handle
        }

        fn cancel(&mut self, handle: TimerHandle) {
            self.armed.0.borrow_mut().retain(|(h, _, _)| *h != handle);
        }
    }

    #[derive(Clone)]
    pub struct Time(pub Rc<Cell<i64>>);

    impl Clock for Time {
        fn now(&self) -> i64 {
            self.0.get()
        }
    }

    pub struct Harness {
        pub services: Services,
        pub lines: Lines,
        pub armed: Armed,
        pub time: Rc<Cell<i64>>,
    }

    impl Harness {
        pub fn new() -> Self {
            Self::with_config(
                r#"
[services]
name = "services.test"
sid = "00A"
"#,
            )
        }

        pub fn with_config(text: &str) -> Self {
            let config: Config = toml::from_str(text).unwrap();
            let lines = Lines::default();
            let armed = Armed::default();
            let time = Rc::new(Cell::new(1_000_000));
            let services = Services::new(
                config,
                Box::new(lines.clone()),
                Box::new(FakeTimers {
                    next: 0,
                    armed: armed.clone(),
                }),
                Box::new(Time(time.clone())),
            )
            .unwrap();
            Self {
                services,
                lines,
                armed,
                time,
            }
        }

        pub fn advance(&self, secs: i64) {
            self.time.set(self.time.get() + secs);
        }

        /// Fire every armed zero-delay timer, the way the driver would at
        /// the end of a turn.
        pub fn end_turn(&mut self) {
            loop {
                let due: Vec<_> = self
                    .armed
                    .take()
                    .into_iter()
                    .filter_map(|(h, delay, event)| {
                        if delay.is_zero() {
                            Some(event)
                        } else {
                            self.armed.0.borrow_mut().push((h, delay, event));
                            None
                        }
                    })
                    .collect();
                if due.is_empty() {
                    break;
                }
                for event in due {
                    self.services.handle_timer(event);
                }
            }
        }

        /// Connect a user, optionally logged in.
        pub fn connect(&mut self, nick: &str, host: &str, account: Option<&str>) {
            self.services.user_connect(nick, "u", host, "irc.test");
            if let Some(account) = account {
                self.services.login(nick, account).unwrap();
            }
        }

        pub fn account(&mut self, name: &str) -> EntityId {
            self.services.register_account(name).unwrap()
        }
    }
}
