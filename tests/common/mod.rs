//! Integration test common infrastructure.
//!
//! Fakes for the host hooks: a clock moved by hand, timers that fire when
//! the test pumps them, and a transport that records every line.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use slirc_services::clock::{Clock, TimerEvent, TimerHandle, Timers};
use slirc_services::config::Config;
use slirc_services::services::Services;
use slirc_services::transport::Transport;

pub const BASE_CONFIG: &str = r#"
[services]
name = "services.test"
sid = "00A"
"#;

#[derive(Clone)]
pub struct ManualClock(Rc<Cell<i64>>);

impl ManualClock {
    pub fn new(start: i64) -> Self {
        Self(Rc::new(Cell::new(start)))
    }

    pub fn advance(&self, secs: i64) {
        self.0.set(self.0.get() + secs);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> i64 {
        self.0.get()
    }
}

#[derive(Clone, Default)]
pub struct RecordingTransport(Rc<RefCell<Vec<String>>>);

impl RecordingTransport {
    /// Lines sent since the last call.
    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.0.borrow_mut())
    }
}

impl Transport for RecordingTransport {
    fn send_line(&mut self, source: &str, text: &str) {
        self.0.borrow_mut().push(format!(":{source} {text}"));
    }
}

#[derive(Default)]
struct TimerState {
    next: u64,
    armed: Vec<(TimerHandle, i64, TimerEvent)>,
}

/// Timers keyed to a [`ManualClock`]; nothing fires until [`FakeTimers::due`].
#[derive(Clone)]
pub struct FakeTimers {
    clock: ManualClock,
    state: Rc<RefCell<TimerState>>,
}

impl FakeTimers {
    pub fn new(clock: ManualClock) -> Self {
        Self {
            clock,
            state: Rc::default(),
        }
    }

    /// Remove and return the events due at `now`, earliest first.
    pub fn due(&self, now: i64) -> Vec<TimerEvent> {
        let mut state = self.state.borrow_mut();
        let mut due: Vec<_> = state.armed.iter().filter(|(_, at, _)| *at <= now).copied().collect();
        state.armed.retain(|(_, at, _)| *at > now);
        due.sort_by_key(|(handle, at, _)| (*at, *handle));
        due.into_iter().map(|(_, _, event)| event).collect()
    }

    pub fn armed(&self) -> usize {
        self.state.borrow().armed.len()
    }
}

impl Timers for FakeTimers {
    fn arm_once(&mut self, delay: Duration, event: TimerEvent) -> TimerHandle {
        let mut state = self.state.borrow_mut();
        state.next += 1;
        let handle = TimerHandle::from_raw(state.next);
        let at = self.clock.now() + i64::try_from(delay.as_secs()).unwrap_or(i64::MAX);
        state.armed.push((handle, at, event));
        handle
    }

    fn cancel(&mut self, handle: TimerHandle) {
        self.state.borrow_mut().armed.retain(|(h, _, _)| *h != handle);
    }
}

/// A services context wired to the fakes.
pub struct TestServices {
    pub services: Services,
    pub clock: ManualClock,
    pub timers: FakeTimers,
    pub lines: RecordingTransport,
}

impl TestServices {
    pub fn new() -> Self {
        Self::with_config(BASE_CONFIG)
    }

    pub fn with_config(text: &str) -> Self {
        let config: Config = toml::from_str(text).expect("test config parses");
        let clock = ManualClock::new(1_700_000_000);
        let timers = FakeTimers::new(clock.clone());
        let lines = RecordingTransport::default();
        let services = Services::new(
            config,
            Box::new(lines.clone()),
            Box::new(timers.clone()),
            Box::new(clock.clone()),
        )
        .expect("services start");
        Self {
            services,
            clock,
            timers,
            lines,
        }
    }

    /// Run every timer due now, including ones armed while running.
    pub fn pump(&mut self) {
        loop {
            let due = self.timers.due(self.clock.now());
            if due.is_empty() {
                break;
            }
            for event in due {
                self.services.handle_timer(event);
            }
        }
    }

    /// Move the clock forward and run whatever came due.
    pub fn advance(&mut self, secs: i64) {
        self.clock.advance(secs);
        self.pump();
    }

    /// Connect `nick` from `host` and log it into the account of the same name.
    pub fn login(&mut self, nick: &str, host: &str) {
        self.services.user_connect(nick, "u", host, "irc.test");
        self.services.login(nick, nick).expect("login");
    }
}
