//! Configuration validation.
//!
//! Validates configuration at startup to catch common errors early.

use super::Config;
use crate::channel::ModeLock;
use crate::error::ModeLockError;
use slirc_proto::ProtoError;
use slirc_proto::line::worst_case_prefix_len;
use std::path::Path;
use thiserror::Error;

/// Shortest usable line: room for a prefix and a one-mode MODE command.
const MIN_LINE_LEN: usize = 128;

/// Validation errors for configuration.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("services.name is required")]
    MissingServicesName,
    #[error("services.sid must be exactly 3 characters, got {0}")]
    InvalidSid(usize),
    #[error("services.sid must match pattern [0-9][A-Z0-9][A-Z0-9], got '{0}'")]
    InvalidSidFormat(String),
    #[error("services.chanserv_nick is required")]
    MissingChanServNick,
    #[error("protocol.max_modes must be at least 1")]
    ZeroMaxModes,
    #[error("protocol.max_line_len {0} is too short for a MODE line")]
    LineTooShort(usize),
    #[error("protocol: {0}")]
    Protocol(#[from] ProtoError),
    #[error("chanserv.default_mlock is invalid: {0}")]
    DefaultMlock(ModeLockError),
    #[error("database.path parent directory does not exist: {0}")]
    DatabasePathInvalid(String),
}

/// Validate a configuration, returning all errors found.
pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    // Required fields
    if config.services.name.is_empty() {
        errors.push(ValidationError::MissingServicesName);
    }
    if config.services.chanserv_nick.is_empty() {
        errors.push(ValidationError::MissingChanServNick);
    }

    // SID validation (TS6 format)
    let sid = &config.services.sid;
    if sid.len() != 3 {
        errors.push(ValidationError::InvalidSid(sid.len()));
    } else {
        let chars: Vec<char> = sid.chars().collect();
        let valid = chars[0].is_ascii_digit()
            && (chars[1].is_ascii_uppercase() || chars[1].is_ascii_digit())
            && (chars[2].is_ascii_uppercase() || chars[2].is_ascii_digit());
        if !valid {
            errors.push(ValidationError::InvalidSidFormat(sid.clone()));
        }
    }

    // Protocol
    let protocol = &config.protocol;
    if protocol.max_modes == 0 {
        errors.push(ValidationError::ZeroMaxModes);
    }
    let floor = MIN_LINE_LEN.max(worst_case_prefix_len(&config.services.chanserv_nick) + 32);
    if protocol.max_line_len < floor {
        errors.push(ValidationError::LineTooShort(protocol.max_line_len));
    }
    if let Err(e) = protocol.casemapping() {
        errors.push(e.into());
    }
    match protocol.mode_table() {
        Ok(table) => {
            let (modes, params) = config.chanserv.default_mlock_parts();
            if let Err(e) = ModeLock::parse(&table, modes, &params) {
                errors.push(ValidationError::DefaultMlock(e));
            }
        }
        Err(e) => errors.push(e.into()),
    }

    // Database path validation
    let db_path = Path::new(&config.database.path);
    if let Some(parent) = db_path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        errors.push(ValidationError::DatabasePathInvalid(config.database.path.clone()));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
