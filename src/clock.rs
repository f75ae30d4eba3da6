//! Time sources and one-shot timers.
//!
//! The engine never sleeps. It asks a [`Timers`] implementation to deliver
//! a [`TimerEvent`] later and handles it when the driver feeds it back.

use std::collections::HashMap;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_util::time::{DelayQueue, delay_queue};
use tracing::trace;

/// What a timer means when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerEvent {
    /// The head of the expiry queue is due.
    ExpiryCheck,
    /// End of turn: flush the mode-stack.
    ModeStackFlush,
    /// End of turn: run deferred mode-lock checks.
    MlockCheck,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(u64);

impl TimerHandle {
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

/// Wall-clock seconds.
pub trait Clock {
    fn now(&self) -> i64;
}

/// One-shot timer scheduling.
pub trait Timers {
    fn arm_once(&mut self, delay: Duration, event: TimerEvent) -> TimerHandle;
    fn cancel(&mut self, handle: TimerHandle);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

// ============================================================================
// Tokio-backed timers
// ============================================================================

#[derive(Debug)]
enum TimerCommand {
    Arm {
        handle: TimerHandle,
        delay: Duration,
        event: TimerEvent,
    },
    Cancel(TimerHandle),
}

/// Engine-side half: hands out handles and forwards requests to the
/// [`TimerQueue`] owned by the driver.
#[derive(Debug)]
pub struct TokioTimers {
    tx: mpsc::UnboundedSender<TimerCommand>,
    next: u64,
}

/// Driver-side half: a `DelayQueue` fed by [`TokioTimers`].
#[derive(Debug)]
pub struct TimerQueue {
    rx: mpsc::UnboundedReceiver<TimerCommand>,
    queue: DelayQueue<(TimerHandle, TimerEvent)>,
    keys: HashMap<TimerHandle, delay_queue::Key>,
}

/// Create a connected timer pair.
pub fn tokio_timers() -> (TokioTimers, TimerQueue) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        TokioTimers { tx, next: 1 },
        TimerQueue {
            rx,
            queue: DelayQueue::new(),
            keys: HashMap::new(),
        },
    )
}

impl Timers for TokioTimers {
    fn arm_once(&mut self, delay: Duration, event: TimerEvent) -> TimerHandle {
        let handle = TimerHandle(self.next);
        self.next += 1;
        // the driver owns the receiver for the whole run; a send error only
        // happens during shutdown, when nothing needs to fire anyway
        let _ = self.tx.send(TimerCommand::Arm { handle, delay, event });
        handle
    }

    fn cancel(&mut self, handle: TimerHandle) {
        let _ = self.tx.send(TimerCommand::Cancel(handle));
    }
}

impl TimerQueue {
    fn apply(&mut self, command: TimerCommand) {
        match command {
            TimerCommand::Arm { handle, delay, event } => {
                let key = self.queue.insert((handle, event), delay);
                self.keys.insert(handle, key);
                trace!(?handle, ?event, ?delay, "timer armed");
            }
            TimerCommand::Cancel(handle) => {
                if let Some(key) = self.keys.remove(&handle) {
                    self.queue.try_remove(&key);
                    trace!(?handle, "timer cancelled");
                }
            }
        }
    }

    /// Wait for the next timer to fire. Returns `None` once the engine side
    /// is gone and nothing is pending.
    pub async fn next(&mut self) -> Option<TimerEvent> {
        loop {
            while let Ok(command) = self.rx.try_recv() {
                self.apply(command);
            }
            if self.queue.is_empty() {
                let command = self.rx.recv().await?;
                self.apply(command);
                continue;
            }
            tokio::select! {
                command = self.rx.recv() => {
                    if let Some(command) = command {
                        self.apply(command);
                    }
                }
                expired = self.queue.next() => {
                    if let Some(expired) = expired {
                        let (handle, event) = expired.into_inner();
                        self.keys.remove(&handle);
                        return Some(event);
                    }
                }
            }
        }
    }
}
