//! Configuration loading and management.
//!
//! This module is split into logical submodules:
//! - [`types`]: Core config struct definitions (Config, ServicesConfig, UplinkConfig, DatabaseConfig)
//! - [`chanserv`]: Channel service limits, default mode lock and templates (ChanServConfig)
//! - [`protocol`]: Dialect description used to build the mode table (ProtocolConfig)
//! - [`validation`]: Startup checks that collect every problem at once

mod chanserv;
mod defaults;
mod protocol;
mod types;
mod validation;

pub use chanserv::{ChanServConfig, TemplateConfig};
pub use protocol::{ExtModeConfig, ExtValidatorKind, ProtocolConfig, StatusModeConfig};
pub use types::{Config, ConfigError, DatabaseConfig, LogFormat, ServicesConfig, UplinkConfig};
pub use validation::{ValidationError, validate};
