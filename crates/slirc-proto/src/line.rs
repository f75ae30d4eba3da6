//! Wire line limits.

/// Maximum IRC line length in bytes, including the trailing CRLF.
pub const MAX_LINE_LEN: usize = 512;

/// Maximum length of the username part of a hostmask.
pub const USERLEN: usize = 10;

/// Maximum length of the host part of a hostmask.
pub const HOSTLEN: usize = 63;

/// Parameterized modes per `MODE` line when the dialect does not say otherwise.
pub const DEFAULT_MAX_MODES: usize = 4;

/// Worst-case length of the `:source!user@host ` prefix a server prepends
/// when relaying a line from `source`.
pub fn worst_case_prefix_len(source: &str) -> usize {
    // ':' + source + '!' + user + '@' + host + ' '
    source.len() + USERLEN + HOSTLEN + 4
}
