//! Registered channels, their mode-locks and lock enforcement.

mod enforce;
mod mlock;
mod record;

pub use enforce::{needs_check, reconcile};
pub use mlock::{ExtLock, MAX_EXT_MLOCK_LEN, ModeLock, ParsedLock, parse_ext, render_ext};
pub use record::{
    ChannelFlags, ChannelRecord, ChannelRegistry, MLOCK_EXT_METADATA_KEY, valid_channel_name,
};
