//! Identity, lifecycle flags and weak observation for document objects.
//!
//! Every object a `Document` owns lives in one generation-checked arena and
//! is addressed by an `ObjectKey`. A stale key never reaches freed memory:
//! the arena reports the slot as vacant, so releasing an object twice is a
//! no-op rather than a corruption.

use bitflags::bitflags;
use slotmap::new_key_type;

new_key_type! {
    /// Arena key shared by every object a document owns.
    pub struct ObjectKey;
}

/// Handle to an entity (camera, geometry, scene node, ...).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityKey(pub(crate) ObjectKey);

/// Handle to an entity instance.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceKey(pub(crate) ObjectKey);

impl From<EntityKey> for ObjectKey {
    fn from(key: EntityKey) -> ObjectKey {
        key.0
    }
}

impl From<InstanceKey> for ObjectKey {
    fn from(key: InstanceKey) -> ObjectKey {
        key.0
    }
}

bitflags! {
    /// Lifecycle flags carried by every tracked object.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct ObjectFlags: u32 {
        /// Modified since the last load or save.
        const DIRTY         = 1 << 0;
        /// Never written out.
        const TRANSIENT     = 1 << 1;
        /// An animated value slot was written.
        const VALUE_CHANGED = 1 << 2;
        /// A child was attached since the flag was last cleared.
        const NEW_CHILD     = 1 << 3;
    }
}

/// Observer bookkeeping for one object.
///
/// Trackers are weak: being listed here never keeps the object alive. When
/// the owning document releases the object it drains this list and tells
/// each observer exactly once.
#[derive(Debug, Default, Clone)]
pub struct Tracked {
    flags: ObjectFlags,
    trackers: Vec<ObjectKey>,
}

impl Tracked {
    pub fn new() -> Tracked {
        Tracked::default()
    }

    pub fn flags(&self) -> ObjectFlags {
        self.flags
    }

    pub fn set_flag(&mut self, flag: ObjectFlags, on: bool) {
        self.flags.set(flag, on);
    }

    pub fn has_flag(&self, flag: ObjectFlags) -> bool {
        self.flags.contains(flag)
    }

    /// Register `observer`. Tracking the same observer twice keeps a single
    /// registration, so it is notified once.
    pub fn track(&mut self, observer: ObjectKey) {
        if !self.trackers.contains(&observer) {
            self.trackers.push(observer);
        }
    }

    /// Remove `observer` without notifying it. Returns whether it was
    /// registered.
    pub fn untrack(&mut self, observer: ObjectKey) -> bool {
        let before = self.trackers.len();
        self.trackers.retain(|&t| t != observer);
        before != self.trackers.len()
    }

    pub fn is_tracked_by(&self, observer: ObjectKey) -> bool {
        self.trackers.contains(&observer)
    }

    pub fn tracker_count(&self) -> usize {
        self.trackers.len()
    }

    pub fn trackers(&self) -> &[ObjectKey] {
        &self.trackers
    }

    /// Drain the observer list ahead of release.
    pub(crate) fn take_trackers(&mut self) -> Vec<ObjectKey> {
        std::mem::take(&mut self.trackers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    #[test]
    fn test_track_is_idempotent() {
        let mut keys: SlotMap<ObjectKey, ()> = SlotMap::with_key();
        let a = keys.insert(());
        let b = keys.insert(());

        let mut tracked = Tracked::new();
        tracked.track(a);
        tracked.track(a);
        tracked.track(b);
        assert_eq!(tracked.tracker_count(), 2);

        assert!(tracked.untrack(a));
        assert!(!tracked.untrack(a));
        assert!(tracked.is_tracked_by(b));

        let drained = tracked.take_trackers();
        assert_eq!(drained, vec![b]);
        assert_eq!(tracked.tracker_count(), 0);
    }

    #[test]
    fn test_flags() {
        let mut tracked = Tracked::new();
        tracked.set_flag(ObjectFlags::DIRTY | ObjectFlags::TRANSIENT, true);
        assert!(tracked.has_flag(ObjectFlags::DIRTY));
        tracked.set_flag(ObjectFlags::DIRTY, false);
        assert_eq!(tracked.flags(), ObjectFlags::TRANSIENT);
    }
}
