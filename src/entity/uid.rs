//! Entity identifiers.
//!
//! Ids come from a monotonically increasing counter and are never reused,
//! even after the entity is dropped. On the wire an id is rendered as a
//! 9-character UID: SID (3 chars) + 6 base36 chars, e.g. `"00AAAAAAC"`.

use serde::{Deserialize, Serialize};

/// Arena key for an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(u64);

impl EntityId {
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Counter starts at 2: AAAAAA and AAAAAB are the services pseudoclients.
const ID_COUNTER_START: u64 = 2;

/// Hands out entity ids for one services instance.
#[derive(Debug, Clone)]
pub struct IdAllocator {
    sid: String,
    next: u64,
}

impl IdAllocator {
    pub fn new(sid: impl Into<String>) -> Self {
        Self {
            sid: sid.into(),
            next: ID_COUNTER_START,
        }
    }

    pub fn allocate(&mut self) -> EntityId {
        let id = EntityId(self.next);
        self.next += 1;
        id
    }

    /// Note an id restored from storage so it is never handed out again.
    pub fn observe(&mut self, id: EntityId) {
        if id.0 >= self.next {
            self.next = id.0 + 1;
        }
    }

    /// Render `id` as a UID string.
    pub fn uid(&self, id: EntityId) -> String {
        format!("{}{}", self.sid, base36_encode_6(id.0))
    }
}

/// Encode a number as a 6-character base36 string.
fn base36_encode_6(mut n: u64) -> String {
    const CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
    let mut result = [b'A'; 6];

    for slot in result.iter_mut().rev() {
        *slot = CHARS[(n % 36) as usize];
        n /= 36;
    }

    String::from_utf8_lossy(&result).into_owned()
}
