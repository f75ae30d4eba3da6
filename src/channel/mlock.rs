//! Mode-lock: the steady-state mode configuration of a registered channel.
//!
//! Simple modes, the limit and the key live in [`ModeLock`]. Extended
//! (type C) locks are kept as raw text in the `private:mlockext` metadata,
//! one token per mode: `X<param>` locks `X` on with that parameter, a bare
//! `X` locks it off.

use serde::{Deserialize, Serialize};
use slirc_proto::{ModeClass, ModeTable, SimpleModes};

use crate::error::ModeLockError;

/// Longest `private:mlockext` value honoured.
pub const MAX_EXT_MLOCK_LEN: usize = 450;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeLock {
    /// Modes forced on. Never contains KEY or LIMIT.
    pub on: SimpleModes,
    /// Modes forced off. KEY and LIMIT here mean "no key" and "no limit".
    pub off: SimpleModes,
    /// 0 when no limit is locked.
    pub limit: u32,
    pub key: Option<String>,
}

/// One extended lock token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtLock {
    pub letter: char,
    /// `None` locks the mode off.
    pub param: Option<String>,
}

/// Result of parsing a lock request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedLock {
    pub lock: ModeLock,
    pub ext: Vec<ExtLock>,
}

impl ParsedLock {
    /// Metadata value for the extended locks; `None` when there are none.
    pub fn ext_raw(&self) -> Option<String> {
        (!self.ext.is_empty()).then(|| render_ext(&self.ext))
    }
}

fn valid_key(key: &str) -> bool {
    !key.is_empty() && key.len() <= 23 && !key.contains([' ', ',', ':']) && !key.starts_with('-')
}

impl ModeLock {
    /// Parse `"+ntl-s 10"` style input against the dialect's mode table.
    ///
    /// `-k` and `-l` take no parameter here. List and status modes cannot
    /// be locked.
    pub fn parse<S: AsRef<str>>(
        table: &ModeTable,
        modes: &str,
        params: &[S],
    ) -> Result<ParsedLock, ModeLockError> {
        let mut out = ParsedLock::default();
        let mut params = params.iter().map(AsRef::as_ref);
        let mut adding = true;

        for letter in modes.chars() {
            match letter {
                '+' => {
                    adding = true;
                    continue;
                }
                '-' => {
                    adding = false;
                    continue;
                }
                _ => {}
            }

            let lock = &mut out.lock;
            match table.classify(letter) {
                Some(ModeClass::Simple(bit)) => {
                    if adding {
                        lock.on |= bit;
                        lock.off.remove(bit);
                    } else {
                        lock.off |= bit;
                        lock.on.remove(bit);
                    }
                }
                Some(ModeClass::Limit) => {
                    if adding {
                        let raw = params.next().ok_or(ModeLockError::MissingParam('l'))?;
                        let limit = raw
                            .parse::<u32>()
                            .ok()
                            .filter(|&n| n > 0)
                            .ok_or_else(|| ModeLockError::InvalidParam {
                                letter: 'l',
                                param: raw.to_string(),
                            })?;
                        lock.limit = limit;
                        lock.off.remove(SimpleModes::LIMIT);
                    } else {
                        lock.limit = 0;
                        lock.off |= SimpleModes::LIMIT;
                    }
                }
                Some(ModeClass::Key) => {
                    if adding {
                        let raw = params.next().ok_or(ModeLockError::MissingParam('k'))?;
                        if !valid_key(raw) {
                            return Err(ModeLockError::InvalidParam {
                                letter: 'k',
                                param: raw.to_string(),
                            });
                        }
                        lock.key = Some(raw.to_string());
                        lock.off.remove(SimpleModes::KEY);
                    } else {
                        lock.key = None;
                        lock.off |= SimpleModes::KEY;
                    }
                }
                Some(ModeClass::Ext(slot)) => {
                    let param = if adding {
                        let raw = params.next().ok_or(ModeLockError::MissingParam(letter))?;
                        let accepted = table.ext(slot).is_some_and(|m| m.validator.accepts(raw));
                        if !accepted {
                            return Err(ModeLockError::InvalidParam {
                                letter,
                                param: raw.to_string(),
                            });
                        }
                        Some(raw.to_string())
                    } else {
                        None
                    };
                    out.ext.retain(|e| e.letter != letter);
                    out.ext.push(ExtLock { letter, param });
                }
                Some(ModeClass::List | ModeClass::Status) | None => {
                    return Err(ModeLockError::Unlockable(letter));
                }
            }
        }

        Ok(out)
    }

    /// Render for display, e.g. `+ntlk-s 10 *`.
    ///
    /// With `hide_key` the key parameter is shown as `*`.
    pub fn render(&self, table: &ModeTable, ext_raw: Option<&str>, hide_key: bool) -> String {
        let ext = ext_raw
            .filter(|raw| raw.len() <= MAX_EXT_MLOCK_LEN)
            .map(parse_ext)
            .unwrap_or_default();

        let mut on = table.simple_letters(self.on);
        let mut params: Vec<String> = Vec::new();
        if self.limit > 0 {
            on.push('l');
            params.push(self.limit.to_string());
        }
        if let Some(key) = &self.key {
            on.push('k');
            params.push(if hide_key { "*".into() } else { key.clone() });
        }
        for lock in &ext {
            if let Some(p) = &lock.param {
                on.push(lock.letter);
                params.push(p.clone());
            }
        }

        let mut off = table.simple_letters(self.off);
        if self.off.contains(SimpleModes::LIMIT) {
            off.push('l');
        }
        if self.off.contains(SimpleModes::KEY) {
            off.push('k');
        }
        off.extend(ext.iter().filter(|l| l.param.is_none()).map(|l| l.letter));

        let mut out = String::new();
        if !on.is_empty() {
            out.push('+');
            out.push_str(&on);
        }
        if !off.is_empty() {
            out.push('-');
            out.push_str(&off);
        }
        if out.is_empty() {
            return "+".into();
        }
        for p in params {
            out.push(' ');
            out.push_str(&p);
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.on.is_empty() && self.off.is_empty() && self.limit == 0 && self.key.is_none()
    }
}

/// Split a `private:mlockext` value into tokens.
pub fn parse_ext(raw: &str) -> Vec<ExtLock> {
    raw.split_whitespace()
        .filter_map(|token| {
            let mut chars = token.chars();
            let letter = chars.next()?;
            let rest = chars.as_str();
            Some(ExtLock {
                letter,
                param: (!rest.is_empty()).then(|| rest.to_string()),
            })
        })
        .collect()
}

pub fn render_ext(locks: &[ExtLock]) -> String {
    locks
        .iter()
        .map(|l| match &l.param {
            Some(p) => format!("{}{}", l.letter, p),
            None => l.letter.to_string(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}
