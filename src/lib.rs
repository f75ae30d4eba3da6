//! slirc-services - channel access control for Straylight IRC services.
//!
//! The engine keeps per-channel access lists of privilege flags, enforces
//! AKICK and mode locks on a live network view, compresses outgoing `MODE`
//! changes and reverts timed grants.
//!
//! - [`acl`]: privilege flags, access records and the access engine
//! - [`entity`]: accounts, groups and computed ext-targets
//! - [`channel`]: registered channels and mode locks
//! - [`state`]: the live network view fed by the uplink
//! - [`modestack`]: the outgoing `MODE` compressor
//! - [`expiry`]: time-ordered reversions
//! - [`services`]: the context tying it all together
//! - [`bridge`], [`driver`], [`snapshot`]: the runtime host

pub mod acl;
pub mod bridge;
pub mod channel;
pub mod clock;
pub mod config;
pub mod driver;
pub mod entity;
pub mod error;
pub mod expiry;
pub mod http;
pub mod metrics;
pub mod modestack;
pub mod services;
pub mod snapshot;
pub mod state;
pub mod telemetry;
pub mod transport;
