//! Live network state.
//!
//! Contains the connected users and channels as reported by the uplink.

mod network;

pub use network::{Channel, ListEntry, Member, Network, User, UserDirectory};
