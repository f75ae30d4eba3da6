//! Channel access privilege bits.
//!
//! A record's level is a set of independent privileges. AKICK is reserved:
//! a record carrying it is an automatic-kick entry, never a grant.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct Privileges: u32 {
        const VOICE = 0x0000_0001;
        const AUTOVOICE = 0x0000_0002;
        const OP = 0x0000_0004;
        const AUTOOP = 0x0000_0008;
        const TOPIC = 0x0000_0010;
        const SET = 0x0000_0020;
        const REMOVE = 0x0000_0040;
        const INVITE = 0x0000_0080;
        const RECOVER = 0x0000_0100;
        const FLAGS = 0x0000_0200;
        const HALFOP = 0x0000_0400;
        const AUTOHALFOP = 0x0000_0800;
        const ACLVIEW = 0x0000_1000;
        const FOUNDER = 0x0000_2000;
        const USEPROTECT = 0x0000_4000;
        const USEOWNER = 0x0000_8000;
        const EXEMPT = 0x0001_0000;

        const AKICK = 0x8000_0000;
    }
}

impl Privileges {
    pub const VOP_DEF: Privileges = Privileges::VOICE
        .union(Privileges::AUTOVOICE)
        .union(Privileges::ACLVIEW);

    pub const HOP_DEF: Privileges = Privileges::VOICE
        .union(Privileges::HALFOP)
        .union(Privileges::AUTOHALFOP)
        .union(Privileges::TOPIC)
        .union(Privileges::ACLVIEW);

    pub const AOP_DEF: Privileges = Privileges::VOICE
        .union(Privileges::HALFOP)
        .union(Privileges::OP)
        .union(Privileges::AUTOOP)
        .union(Privileges::TOPIC)
        .union(Privileges::ACLVIEW);

    pub const SOP_DEF: Privileges = Privileges::AOP_DEF
        .union(Privileges::SET)
        .union(Privileges::REMOVE)
        .union(Privileges::INVITE)
        .union(Privileges::EXEMPT);

    /// Everything a successor needs except founder itself.
    pub const SUCCESSOR_0: Privileges = Privileges::VOICE
        .union(Privileges::OP)
        .union(Privileges::AUTOOP)
        .union(Privileges::TOPIC)
        .union(Privileges::SET)
        .union(Privileges::REMOVE)
        .union(Privileges::INVITE)
        .union(Privileges::RECOVER)
        .union(Privileges::FLAGS)
        .union(Privileges::HALFOP)
        .union(Privileges::ACLVIEW)
        .union(Privileges::USEPROTECT)
        .union(Privileges::EXEMPT);

    pub const FOUNDER_0: Privileges = Privileges::SUCCESSOR_0
        .union(Privileges::FLAGS)
        .union(Privileges::USEOWNER)
        .union(Privileges::FOUNDER);

    /// Granted to whoever registers a channel.
    pub const INITIAL: Privileges = Privileges::FOUNDER_0.union(Privileges::AUTOOP);

    /// A present user holding any of these keeps a channel "in use".
    pub const USEDUPDATE: Privileges = Privileges::VOICE
        .union(Privileges::OP)
        .union(Privileges::AUTOOP)
        .union(Privileges::SET)
        .union(Privileges::REMOVE)
        .union(Privileges::RECOVER)
        .union(Privileges::FLAGS)
        .union(Privileges::HALFOP)
        .union(Privileges::AUTOHALFOP)
        .union(Privileges::FOUNDER)
        .union(Privileges::USEPROTECT)
        .union(Privileges::USEOWNER);

    /// Privileges a non-founder may only hand out when holding all of them.
    pub const HIGHPRIVS: Privileges = Privileges::SET
        .union(Privileges::RECOVER)
        .union(Privileges::FLAGS);

    /// Every grant bit; AKICK excluded.
    pub const ALLPRIVS: Privileges = Privileges::all().difference(Privileges::AKICK);

    pub const ALL_ALL: Privileges = Privileges::all();

    /// Whether this level marks an automatic-kick entry.
    pub fn is_akick(self) -> bool {
        self.contains(Privileges::AKICK)
    }

    /// Grants carried by this level, AKICK removed.
    pub fn grants(self) -> Privileges {
        self.difference(Privileges::AKICK)
    }
}

/// One row of the privilege vocabulary: letter, bit, long name, and whether
/// `*` enables it.
#[derive(Debug, Clone, Copy)]
pub struct PrivilegeDef {
    pub letter: char,
    pub bit: Privileges,
    pub name: &'static str,
    pub default_enabled: bool,
}

/// The privilege vocabulary in letter (ASCII) order, which is also the order
/// flag strings are rendered in.
pub const PRIVILEGE_TABLE: &[PrivilegeDef] = &[
    PrivilegeDef { letter: 'A', bit: Privileges::ACLVIEW, name: "acl-view", default_enabled: true },
    PrivilegeDef { letter: 'F', bit: Privileges::FOUNDER, name: "founder", default_enabled: false },
    PrivilegeDef { letter: 'H', bit: Privileges::AUTOHALFOP, name: "autohalfop", default_enabled: true },
    PrivilegeDef { letter: 'O', bit: Privileges::AUTOOP, name: "autoop", default_enabled: true },
    PrivilegeDef { letter: 'R', bit: Privileges::RECOVER, name: "recover", default_enabled: true },
    PrivilegeDef { letter: 'V', bit: Privileges::AUTOVOICE, name: "autovoice", default_enabled: true },
    PrivilegeDef { letter: 'a', bit: Privileges::USEPROTECT, name: "protect", default_enabled: true },
    PrivilegeDef { letter: 'b', bit: Privileges::AKICK, name: "banned", default_enabled: false },
    PrivilegeDef { letter: 'e', bit: Privileges::EXEMPT, name: "exempt", default_enabled: true },
    PrivilegeDef { letter: 'f', bit: Privileges::FLAGS, name: "acl-change", default_enabled: true },
    PrivilegeDef { letter: 'h', bit: Privileges::HALFOP, name: "halfop", default_enabled: true },
    PrivilegeDef { letter: 'i', bit: Privileges::INVITE, name: "invite", default_enabled: true },
    PrivilegeDef { letter: 'o', bit: Privileges::OP, name: "op", default_enabled: true },
    PrivilegeDef { letter: 'q', bit: Privileges::USEOWNER, name: "owner", default_enabled: true },
    PrivilegeDef { letter: 'r', bit: Privileges::REMOVE, name: "remove", default_enabled: true },
    PrivilegeDef { letter: 's', bit: Privileges::SET, name: "set", default_enabled: true },
    PrivilegeDef { letter: 't', bit: Privileges::TOPIC, name: "topic", default_enabled: true },
    PrivilegeDef { letter: 'v', bit: Privileges::VOICE, name: "voice", default_enabled: true },
];

pub fn lookup_letter(letter: char) -> Option<&'static PrivilegeDef> {
    PRIVILEGE_TABLE.iter().find(|d| d.letter == letter)
}

pub fn lookup_name(name: &str) -> Option<&'static PrivilegeDef> {
    PRIVILEGE_TABLE
        .iter()
        .find(|d| d.name.eq_ignore_ascii_case(name))
}

/// Which privileges exist on the attached network.
///
/// Dialects without halfops, owner or protect status drop the matching bits
/// so they can neither be granted nor shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AclPolicy {
    /// Every privilege that may appear on a record.
    pub all: Privileges,
    /// What `*` grants.
    pub all_enable: Privileges,
}

impl AclPolicy {
    pub fn new(uses_halfops: bool, uses_owner: bool, uses_protect: bool) -> Self {
        let mut all = Privileges::ALL_ALL;
        let mut all_enable = PRIVILEGE_TABLE
            .iter()
            .filter(|d| d.default_enabled)
            .fold(Privileges::empty(), |acc, d| acc | d.bit);

        if !uses_halfops {
            all.remove(Privileges::HALFOP | Privileges::AUTOHALFOP);
        }
        if !uses_protect {
            all.remove(Privileges::USEPROTECT);
        }
        if !uses_owner {
            all.remove(Privileges::USEOWNER);
        }
        all_enable &= all;

        Self { all, all_enable }
    }
}

impl Default for AclPolicy {
    fn default() -> Self {
        Self::new(true, true, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composites_are_nested() {
        assert!(Privileges::SOP_DEF.contains(Privileges::AOP_DEF));
        assert!(Privileges::FOUNDER_0.contains(Privileges::SUCCESSOR_0));
        assert!(Privileges::INITIAL.contains(Privileges::FOUNDER | Privileges::AUTOOP));
        assert!(!Privileges::ALLPRIVS.contains(Privileges::AKICK));
        assert_eq!(Privileges::ALL_ALL, Privileges::ALLPRIVS | Privileges::AKICK);
    }

    #[test]
    fn table_covers_every_bit_once() {
        let union = PRIVILEGE_TABLE
            .iter()
            .fold(Privileges::empty(), |acc, d| acc | d.bit);
        assert_eq!(union, Privileges::all());
        assert_eq!(PRIVILEGE_TABLE.len(), Privileges::all().iter().count());

        let letters: Vec<char> = PRIVILEGE_TABLE.iter().map(|d| d.letter).collect();
        let mut sorted = letters.clone();
        sorted.sort_unstable();
        assert_eq!(letters, sorted);
    }

    #[test]
    fn policy_drops_unsupported_status() {
        let policy = AclPolicy::new(false, false, true);
        assert!(!policy.all.contains(Privileges::HALFOP));
        assert!(!policy.all.contains(Privileges::USEOWNER));
        assert!(policy.all.contains(Privileges::USEPROTECT));
        assert!(!policy.all_enable.contains(Privileges::AUTOHALFOP));
    }

    #[test]
    fn star_never_enables_founder_or_akick() {
        let policy = AclPolicy::default();
        assert!(!policy.all_enable.contains(Privileges::FOUNDER));
        assert!(!policy.all_enable.contains(Privileges::AKICK));
    }

    #[test]
    fn lookups() {
        assert_eq!(lookup_letter('o').map(|d| d.bit), Some(Privileges::OP));
        assert_eq!(lookup_name("ACL-Change").map(|d| d.bit), Some(Privileges::FLAGS));
        assert!(lookup_letter('z').is_none());
    }
}
