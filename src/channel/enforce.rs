//! Mode-lock enforcement against live channel state.

use slirc_proto::mode::ExtValidator;
use slirc_proto::{Direction, ModeTable, SimpleModes};

use super::mlock::{MAX_EXT_MLOCK_LEN, parse_ext};
use super::record::{ChannelFlags, ChannelRecord};
use crate::modestack::ModeDelta;
use crate::state::Channel;

/// Bring `live` in line with the record's mode-lock.
///
/// The live state is always updated. The returned deltas describe what was
/// changed, in the order they must go out; the caller decides whether to
/// send them. `forward_ok` is asked about channel-valued extended locks
/// (forward targets) before they are applied.
///
/// Running it twice yields no deltas the second time.
pub fn reconcile(
    record: &ChannelRecord,
    live: &mut Channel,
    table: &ModeTable,
    forward_ok: &dyn Fn(&str) -> bool,
) -> Vec<ModeDelta> {
    let lock = &record.mlock;
    let mut deltas = Vec::new();

    let on = (lock.on - live.modes) - SimpleModes::PARAMETERIZED;
    if !on.is_empty() {
        live.modes |= on;
        deltas.push(ModeDelta::Simple {
            dir: Direction::Add,
            modes: on,
        });
    }

    if lock.limit != 0 && lock.limit != live.limit {
        live.limit = lock.limit;
        deltas.push(ModeDelta::Limit {
            dir: Direction::Add,
            limit: lock.limit,
        });
    }

    if let Some(key) = &lock.key {
        if let Some(current) = live.key.take_if(|current| *current != *key) {
            deltas.push(ModeDelta::Param {
                dir: Direction::Del,
                letter: 'k',
                value: current,
            });
        }
        if live.key.is_none() {
            live.key = Some(key.clone());
            deltas.push(ModeDelta::Param {
                dir: Direction::Add,
                letter: 'k',
                value: key.clone(),
            });
        }
    }

    let off = (live.modes & lock.off) - SimpleModes::PARAMETERIZED;
    if !off.is_empty() {
        live.modes.remove(off);
        deltas.push(ModeDelta::Simple {
            dir: Direction::Del,
            modes: off,
        });
    }

    if live.limit != 0 && lock.off.contains(SimpleModes::LIMIT) {
        live.limit = 0;
        deltas.push(ModeDelta::Limit {
            dir: Direction::Del,
            limit: 0,
        });
    }

    if lock.off.contains(SimpleModes::KEY)
        && let Some(current) = live.key.take()
    {
        deltas.push(ModeDelta::Param {
            dir: Direction::Del,
            letter: 'k',
            value: current,
        });
    }

    let ext_locks = record
        .ext_mlock()
        .filter(|raw| raw.len() <= MAX_EXT_MLOCK_LEN)
        .map(parse_ext)
        .unwrap_or_default();

    for ext in ext_locks {
        let Some(slot) = table.ext_slot(ext.letter) else {
            continue;
        };
        let Some(current) = live.ext.get_mut(slot) else {
            continue;
        };
        match ext.param {
            None => {
                if current.take().is_some() {
                    deltas.push(ModeDelta::Ext {
                        dir: Direction::Del,
                        slot,
                        value: None,
                    });
                }
            }
            Some(param) => {
                if current.as_deref() == Some(param.as_str()) {
                    continue;
                }
                let Some(mode) = table.ext(slot) else {
                    continue;
                };
                let accepted = mode.validator.accepts(&param)
                    && (mode.validator != ExtValidator::Channel
                        || (!param.eq_ignore_ascii_case(&live.name) && forward_ok(&param)));
                if !accepted {
                    continue;
                }
                *current = Some(param.clone());
                deltas.push(ModeDelta::Ext {
                    dir: Direction::Add,
                    slot,
                    value: Some(param),
                });
            }
        }
    }

    deltas
}

/// Whether an externally applied change needs a mode-lock check.
pub fn needs_check(record: &ChannelRecord, changed: SimpleModes, ext_changed: bool) -> bool {
    record.has_flag(ChannelFlags::MLOCK_CHECK) || !changed.is_empty() || ext_changed
}
