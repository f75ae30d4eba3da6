//! The event loop: uplink lines, fired timers and periodic saves, one turn
//! at a time on a single task.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use futures_util::{Stream, StreamExt};
use tracing::{error, info, warn};

use crate::bridge;
use crate::clock::TimerQueue;
use crate::services::Services;
use crate::snapshot::SnapshotStore;

/// Why [`run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    /// The uplink closed or failed.
    UplinkClosed,
    /// The shutdown future completed.
    Shutdown,
}

/// Save the current state, logging instead of failing.
pub fn save(services: &Services, store: &SnapshotStore) {
    let snapshot = services.snapshot();
    match store.save(&snapshot) {
        Ok(()) => info!(
            path = %store.path().display(),
            channels = snapshot.channels.len(),
            records = snapshot.access.len(),
            "snapshot saved"
        ),
        Err(e) => error!(path = %store.path().display(), error = %e, "snapshot save failed"),
    }
}

/// Drive `services` until the uplink ends or `shutdown` completes, then
/// flush pending work and write a final snapshot.
///
/// `save_every` of `None` saves only on the way out.
pub async fn run<S, E, F>(
    services: &mut Services,
    mut lines: S,
    timers: &mut TimerQueue,
    store: Option<&SnapshotStore>,
    save_every: Option<Duration>,
    shutdown: F,
) -> Exit
where
    S: Stream<Item = Result<String, E>> + Unpin,
    E: Display,
    F: Future<Output = ()>,
{
    let mut save_tick = tokio::time::interval(save_every.unwrap_or(Duration::from_secs(3600)));
    save_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // interval fires immediately; the first save is one period in
    save_tick.tick().await;
    tokio::pin!(shutdown);

    let exit = loop {
        tokio::select! {
            line = lines.next() => match line {
                Some(Ok(line)) => {
                    // failures are logged and counted by the bridge
                    if !line.trim().is_empty() {
                        let _ = bridge::dispatch(services, &line);
                    }
                }
                Some(Err(e)) => {
                    warn!(error = %e, "uplink read failed");
                    break Exit::UplinkClosed;
                }
                None => {
                    info!("uplink closed");
                    break Exit::UplinkClosed;
                }
            },
            Some(event) = timers.next() => {
                services.handle_timer(event);
            }
            _ = save_tick.tick(), if save_every.is_some() => {
                if let Some(store) = store {
                    save(services, store);
                }
            }
            () = &mut shutdown => {
                info!("shutdown requested");
                break Exit::Shutdown;
            }
        }
    };

    services.shutdown();
    if let Some(store) = store {
        save(services, store);
    }
    exit
}
