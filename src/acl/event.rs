//! Access-list change notifications.

use super::privs::Privileges;
use super::record::AccessTarget;
use crate::entity::EntityId;

/// Emitted once for every committed access change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChanacsChanged {
    pub channel: String,
    pub target: AccessTarget,
    pub old: Privileges,
    pub new: Privileges,
    /// `None` when services made the change.
    pub setter: Option<EntityId>,
}

impl ChanacsChanged {
    /// Whether this change put the target on the auto-kick list.
    pub fn akick_added(&self) -> bool {
        self.new.is_akick() && !self.old.is_akick()
    }

    pub fn akick_removed(&self) -> bool {
        self.old.is_akick() && !self.new.is_akick()
    }
}

/// Receives access-list changes after they are committed.
pub trait AclObserver {
    fn chanacs_changed(&mut self, event: &ChanacsChanged);
}
