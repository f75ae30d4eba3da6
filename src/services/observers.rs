//! Stock access-change observers.

use tracing::debug;

use crate::acl::{AclObserver, ChanacsChanged, flag_delta_string};

/// Logs every committed access change at debug level.
#[derive(Debug, Default)]
pub struct LogObserver;

impl AclObserver for LogObserver {
    fn chanacs_changed(&mut self, event: &ChanacsChanged) {
        let delta = flag_delta_string(event.new - event.old, event.old - event.new);
        debug!(
            channel = %event.channel,
            target = %event.target,
            delta = %delta,
            setter = ?event.setter,
            "access change observed"
        );
    }
}

/// Counts access changes by what they did to the auto-kick list.
#[derive(Debug, Default)]
pub struct MetricsObserver;

impl AclObserver for MetricsObserver {
    fn chanacs_changed(&mut self, event: &ChanacsChanged) {
        let kind = if event.akick_added() {
            "akick_added"
        } else if event.akick_removed() {
            "akick_removed"
        } else if event.old.is_empty() && !event.new.is_empty() {
            "created"
        } else if event.new.is_empty() {
            "deleted"
        } else {
            "modified"
        };
        crate::metrics::record_acl_event(kind);
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::acl::{AccessTarget, Actor, Privileges};
    use crate::services::testing::Harness;

    struct Recorder(Rc<RefCell<Vec<ChanacsChanged>>>);

    impl AclObserver for Recorder {
        fn chanacs_changed(&mut self, event: &ChanacsChanged) {
            self.0.borrow_mut().push(event.clone());
        }
    }

    #[test]
    fn observers_see_each_change_once() {
        let mut h = Harness::new();
        let alice = h.account("alice");
        h.services.register_channel("#test", alice).unwrap();
        let seen = Rc::new(RefCell::new(Vec::new()));
        h.services.add_observer(Box::new(Recorder(seen.clone())));
        h.services.add_observer(Box::new(LogObserver));
        h.services.add_observer(Box::new(MetricsObserver));

        let target = AccessTarget::Mask("*!*@x.example".into());
        for add in [Privileges::VOICE, Privileges::VOICE] {
            h.services
                .chanacs_change("#test", target.clone(), add, Privileges::empty(), Privileges::ALL_ALL, Actor::Services)
                .unwrap();
        }
        let seen = seen.borrow();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].old, Privileges::empty());
        assert_eq!(seen[0].new, Privileges::VOICE);
        assert_eq!(seen[1].old, seen[1].new);
    }
}
