//! Default value functions for configuration.
//!
//! Separated into its own module for clarity and reuse.

/// Returns `true` (for serde defaults).
pub fn default_true() -> bool {
    true
}

// =============================================================================
// Services Defaults
// =============================================================================

pub fn default_chanserv_nick() -> String {
    "ChanServ".to_string()
}

// =============================================================================
// Uplink Defaults
// =============================================================================

pub fn default_uplink_host() -> String {
    "127.0.0.1".to_string()
}

pub fn default_uplink_port() -> u16 {
    7000
}

// =============================================================================
// Database Defaults
// =============================================================================

pub fn default_database_path() -> String {
    "services.json".to_string()
}

pub fn default_save_interval() -> u64 {
    300
}

// =============================================================================
// ChanServ Defaults
// =============================================================================

pub fn default_max_founders() -> usize {
    4
}

pub fn default_max_channels_per_account() -> usize {
    5
}

pub fn default_akick_reason() -> String {
    "User is banned from this channel".to_string()
}

pub fn default_mlock() -> String {
    "+nt".to_string()
}

// =============================================================================
// Protocol Defaults
// =============================================================================

pub fn default_casemapping() -> String {
    "rfc1459".to_string()
}

pub fn default_max_modes() -> usize {
    slirc_proto::line::DEFAULT_MAX_MODES
}

pub fn default_max_line_len() -> usize {
    slirc_proto::line::MAX_LINE_LEN
}
