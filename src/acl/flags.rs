//! Flag strings: `+oV-s`, `=`, `*`, and long names like `+founder`.

use super::privs::{AclPolicy, PRIVILEGE_TABLE, Privileges, lookup_letter, lookup_name};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Sign {
    Add,
    Del,
}

/// Split a flag change request into the bits to add and the bits to remove.
///
/// `=` resets (removes everything, then continues adding), `+*` adds every
/// default-enabled privilege and clears AKICK, `-*` removes everything. A
/// long privilege name may appear once, directly after the sign, in place of
/// letters. The two returned masks never overlap.
pub fn parse_flag_changes(spec: &str, policy: &AclPolicy) -> (Privileges, Privileges) {
    let mut add = Privileges::empty();
    let mut remove = Privileges::empty();
    let mut sign = Sign::Add;
    let mut saw_letter = false;

    for (idx, c) in spec.char_indices() {
        match c {
            '+' => sign = Sign::Add,
            '-' => sign = Sign::Del,
            '=' => {
                add = Privileges::empty();
                remove = Privileges::all();
                sign = Sign::Add;
            }
            '*' => match sign {
                Sign::Add => {
                    add |= policy.all_enable;
                    remove |= Privileges::AKICK;
                    remove.remove(policy.all_enable);
                }
                Sign::Del => {
                    add = Privileges::empty();
                    remove = Privileges::all();
                }
            },
            _ => {
                if !saw_letter && let Some(def) = lookup_name(&spec[idx..]) {
                    apply(&mut add, &mut remove, sign, def.bit);
                    break;
                }
                if let Some(def) = lookup_letter(c) {
                    apply(&mut add, &mut remove, sign, def.bit);
                }
                saw_letter = true;
            }
        }
    }

    (add & policy.all, remove & policy.all)
}

fn apply(add: &mut Privileges, remove: &mut Privileges, sign: Sign, bit: Privileges) {
    match sign {
        Sign::Add => {
            add.insert(bit);
            remove.remove(bit);
        }
        Sign::Del => {
            add.remove(bit);
            remove.insert(bit);
        }
    }
}

/// Apply a flag string to an existing level (used for templates).
///
/// `*` here never grants founder.
pub fn apply_flag_string(spec: &str, base: Privileges, policy: &AclPolicy) -> Privileges {
    let mut level = base;
    let mut sign = Sign::Add;

    for c in spec.chars() {
        match c {
            '+' => sign = Sign::Add,
            '-' => sign = Sign::Del,
            '=' => {
                level = Privileges::empty();
                sign = Sign::Add;
            }
            '*' => match sign {
                Sign::Add => {
                    level |= Privileges::ALLPRIVS & policy.all_enable & !Privileges::FOUNDER
                }
                Sign::Del => level = Privileges::empty(),
            },
            _ => {
                if let Some(def) = lookup_letter(c) {
                    match sign {
                        Sign::Add => level.insert(def.bit),
                        Sign::Del => level.remove(def.bit),
                    }
                }
            }
        }
    }

    level & policy.all
}

impl Privileges {
    /// Render as `+letters` in ASCII letter order, e.g. `+AFORfiorstv`.
    pub fn to_flag_string(self) -> String {
        let mut out = String::from("+");
        out.extend(letters(self));
        out
    }

    /// Comma-separated long names, e.g. `acl-view, op, voice`.
    pub fn to_names(self) -> String {
        PRIVILEGE_TABLE
            .iter()
            .filter(|d| self.contains(d.bit))
            .map(|d| d.name)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

fn letters(level: Privileges) -> impl Iterator<Item = char> {
    PRIVILEGE_TABLE
        .iter()
        .filter(move |d| level.contains(d.bit))
        .map(|d| d.letter)
}

/// Render an add/remove pair as `-rem+add`; either half is omitted when empty.
pub fn flag_delta_string(add: Privileges, remove: Privileges) -> String {
    let mut out = String::new();
    if !remove.is_empty() {
        out.push('-');
        out.extend(letters(remove));
    }
    if !add.is_empty() {
        out.push('+');
        out.extend(letters(add));
    }
    out
}

/// Cap what a non-founder holding `theirs` may grant or revoke.
///
/// Holding REMOVE allows managing AKICK entries; holding op, halfop or
/// voice allows the matching auto- variant. On LIMITFLAGS channels, only
/// holders of all high privileges may hand them out, and without any of
/// SET or RECOVER nothing but AKICK can be managed.
pub fn allow_flags(theirs: Privileges, limitflags: bool) -> Privileges {
    let mut flags = theirs.grants();
    if theirs.contains(Privileges::REMOVE) {
        flags |= Privileges::AKICK;
    }
    if theirs.contains(Privileges::OP) {
        flags |= Privileges::AUTOOP;
    }
    if theirs.contains(Privileges::HALFOP) {
        flags |= Privileges::AUTOHALFOP;
    }
    if theirs.contains(Privileges::VOICE) {
        flags |= Privileges::AUTOVOICE;
    }
    if limitflags {
        if !theirs.intersects(Privileges::HIGHPRIVS & !Privileges::FLAGS) {
            flags &= Privileges::AKICK;
        } else if !theirs.contains(Privileges::HIGHPRIVS) {
            flags.remove(Privileges::HIGHPRIVS);
        }
    }
    flags
}
