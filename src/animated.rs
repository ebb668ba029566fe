//! Animatable scalar storage and the document's animated value table.
//!
//! Any scalar field that an animation may drive is stored in a `ValueSlots`
//! arena and referred to by its `SlotKey`. The `AnimatedValueTable` maps a
//! slot to the `AnimatedValue` that groups it with its sibling channels
//! (the `r`, `g`, `b` of a color, the `x`, `y`, `z` of a translation) and
//! lists the curves driving each channel.

use std::collections::HashMap;

use log::warn;
use slotmap::{new_key_type, SlotMap};

use crate::animation::CurveId;
use crate::tracking::ObjectKey;

new_key_type! {
    /// Stable handle to one animatable scalar.
    pub struct SlotKey;
    /// Handle to a registered `AnimatedValue`.
    pub struct AnimatedKey;
}

pub const XYZ: &[&str] = &[".X", ".Y", ".Z"];
pub const XYZW: &[&str] = &[".X", ".Y", ".Z", ".W"];
pub const RGB: &[&str] = &[".R", ".G", ".B"];
pub const RGBA: &[&str] = &[".R", ".G", ".B", ".A"];
pub const ANGLE_AXIS: &[&str] = &[".X", ".Y", ".Z", ".ANGLE"];

/// Qualifiers for a row-major 4x4 matrix: channel `row * 4 + col` is
/// addressed as `(col)(row)`.
pub fn matrix_qualifiers() -> Vec<String> {
    (0..16)
        .map(|i| format!("({})({})", i % 4, i / 4))
        .collect()
}

/// Arena of animatable scalars.
#[derive(Debug, Default)]
pub struct ValueSlots {
    slots: SlotMap<SlotKey, f32>,
}

impl ValueSlots {
    pub fn new() -> ValueSlots {
        ValueSlots::default()
    }

    pub fn alloc(&mut self, value: f32) -> SlotKey {
        self.slots.insert(value)
    }

    pub fn alloc_all(&mut self, values: &[f32]) -> Vec<SlotKey> {
        values.iter().map(|&v| self.slots.insert(v)).collect()
    }

    pub fn get(&self, slot: SlotKey) -> Option<f32> {
        self.slots.get(slot).copied()
    }

    /// Value of `slot`, or zero for a freed slot.
    pub fn value(&self, slot: SlotKey) -> f32 {
        self.get(slot).unwrap_or(0.0)
    }

    pub fn set(&mut self, slot: SlotKey, value: f32) -> bool {
        match self.slots.get_mut(slot) {
            Some(v) => {
                *v = value;
                true
            }
            None => false,
        }
    }

    pub fn read(&self, slots: &[SlotKey]) -> Vec<f32> {
        slots.iter().map(|&s| self.value(s)).collect()
    }

    pub fn write(&mut self, slots: &[SlotKey], values: &[f32]) {
        for (&slot, &value) in slots.iter().zip(values) {
            self.set(slot, value);
        }
    }

    pub fn free(&mut self, slot: SlotKey) -> Option<f32> {
        self.slots.remove(slot)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// One scalar of an animated value and the curves driving it.
#[derive(Debug, Clone)]
pub struct AnimatedChannel {
    slot: SlotKey,
    qualifier: String,
    curves: Vec<CurveId>,
}

impl AnimatedChannel {
    pub fn slot(&self) -> SlotKey {
        self.slot
    }

    pub fn qualifier(&self) -> &str {
        &self.qualifier
    }

    pub fn curves(&self) -> &[CurveId] {
        &self.curves
    }
}

/// Binding between a group of value slots and the animation curves that
/// drive them.
#[derive(Debug, Clone)]
pub struct AnimatedValue {
    owner: Option<ObjectKey>,
    sid: String,
    pointer: String,
    channels: Vec<AnimatedChannel>,
}

impl AnimatedValue {
    /// Group `slots` under `sid`. Channels without a matching entry in
    /// `qualifiers` are addressed by index, `(i)`.
    pub fn new<S: AsRef<str>>(sid: &str, slots: &[SlotKey], qualifiers: &[S]) -> AnimatedValue {
        let single = slots.len() == 1;
        let channels = slots
            .iter()
            .enumerate()
            .map(|(i, &slot)| AnimatedChannel {
                slot,
                qualifier: match qualifiers.get(i) {
                    Some(q) => q.as_ref().to_string(),
                    None if single => String::new(),
                    None => format!("({})", i),
                },
                curves: Vec::new(),
            })
            .collect();
        AnimatedValue {
            owner: None,
            sid: sid.to_string(),
            pointer: String::new(),
            channels,
        }
    }

    pub(crate) fn with_owner(mut self, owner: ObjectKey) -> AnimatedValue {
        self.owner = Some(owner);
        self
    }

    pub fn owner(&self) -> Option<ObjectKey> {
        self.owner
    }

    pub fn sid(&self) -> &str {
        &self.sid
    }

    /// The `id/sid` target used when writing animation channels. Empty
    /// while the owner has no id.
    pub fn pointer(&self) -> &str {
        &self.pointer
    }

    pub fn set_pointer(&mut self, pointer: impl Into<String>) {
        self.pointer = pointer.into();
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn channels(&self) -> &[AnimatedChannel] {
        &self.channels
    }

    pub fn channel(&self, index: usize) -> Option<&AnimatedChannel> {
        self.channels.get(index)
    }

    pub fn slots(&self) -> Vec<SlotKey> {
        self.channels.iter().map(|c| c.slot).collect()
    }

    /// Index of the channel answering to `qualifier`. Names compare without
    /// case; a bare `(n)` selects channel `n`.
    pub fn channel_index(&self, qualifier: &str) -> Option<usize> {
        if let Some(i) = self
            .channels
            .iter()
            .position(|c| c.qualifier.eq_ignore_ascii_case(qualifier))
        {
            return Some(i);
        }
        let inner = qualifier.strip_prefix('(')?.strip_suffix(')')?;
        let index: usize = inner.parse().ok()?;
        if index < self.channels.len() {
            Some(index)
        } else {
            None
        }
    }

    pub fn add_curve(&mut self, channel: usize, curve: CurveId) -> bool {
        match self.channels.get_mut(channel) {
            Some(c) => {
                if !c.curves.contains(&curve) {
                    c.curves.push(curve);
                }
                true
            }
            None => false,
        }
    }

    pub fn remove_curve(&mut self, curve: CurveId) -> bool {
        let mut removed = false;
        for channel in &mut self.channels {
            let before = channel.curves.len();
            channel.curves.retain(|&c| c != curve);
            removed |= before != channel.curves.len();
        }
        removed
    }

    /// Whether at least one channel has a curve.
    pub fn is_driven(&self) -> bool {
        self.channels.iter().any(|c| !c.curves.is_empty())
    }

    /// Full target string for `channel`, or for the whole value.
    pub fn target_string(&self, channel: Option<usize>) -> String {
        match channel.and_then(|i| self.channels.get(i)) {
            Some(c) => format!("{}{}", self.pointer, c.qualifier),
            None => self.pointer.clone(),
        }
    }
}

/// Split `"node/translate.X"` into `("node/translate", ".X")`. Only the
/// last path segment is searched for the qualifier.
pub fn split_target(target: &str) -> (&str, &str) {
    let tail = target.rfind('/').map(|i| i + 1).unwrap_or(0);
    match target[tail..].find(|c: char| c == '.' || c == '(') {
        Some(i) => target.split_at(tail + i),
        None => (target, ""),
    }
}

/// Document-wide index from value slot to animated value.
#[derive(Debug, Default)]
pub struct AnimatedValueTable {
    values: SlotMap<AnimatedKey, AnimatedValue>,
    by_slot: HashMap<SlotKey, AnimatedKey>,
    order: Vec<AnimatedKey>,
}

impl AnimatedValueTable {
    pub fn new() -> AnimatedValueTable {
        AnimatedValueTable::default()
    }

    /// Register `value` under every one of its slots.
    ///
    /// A value without channels is dropped and `None` returned. So is a
    /// value sharing a slot with one already registered.
    pub fn register(&mut self, value: AnimatedValue) -> Option<AnimatedKey> {
        if value.channels.is_empty() {
            return None;
        }
        if let Some(taken) = value.channels.iter().find(|c| self.by_slot.contains_key(&c.slot)) {
            warn!(
                "value slot {:?} of '{}' is already registered as animated",
                taken.slot, value.sid
            );
            return None;
        }
        let slots = value.slots();
        let key = self.values.insert(value);
        for slot in slots {
            self.by_slot.insert(slot, key);
        }
        self.order.push(key);
        Some(key)
    }

    /// Remove `key` and every slot mapping it owns.
    pub fn unregister(&mut self, key: AnimatedKey) -> Option<AnimatedValue> {
        let value = self.values.remove(key)?;
        for channel in &value.channels {
            self.by_slot.remove(&channel.slot);
        }
        self.order.retain(|&k| k != key);
        Some(value)
    }

    pub fn get(&self, key: AnimatedKey) -> Option<&AnimatedValue> {
        self.values.get(key)
    }

    pub fn get_mut(&mut self, key: AnimatedKey) -> Option<&mut AnimatedValue> {
        self.values.get_mut(key)
    }

    pub fn find_by_slot(&self, slot: SlotKey) -> Option<AnimatedKey> {
        self.by_slot.get(&slot).copied()
    }

    /// Registered and driven by at least one curve.
    pub fn is_animated(&self, slot: SlotKey) -> bool {
        self.find_by_slot(slot)
            .and_then(|key| self.values.get(key))
            .map_or(false, AnimatedValue::is_driven)
    }

    /// Resolve a channel target such as `"light/color.R"`.
    ///
    /// Returns the value and, when the target carries a qualifier, the
    /// channel it names. An unknown qualifier on a known pointer finds
    /// nothing.
    pub fn find_by_target(&self, target: &str) -> Option<(AnimatedKey, Option<usize>)> {
        let (pointer, qualifier) = split_target(target);
        let key = self
            .order
            .iter()
            .copied()
            .find(|&k| !self.values[k].pointer.is_empty() && self.values[k].pointer == pointer)?;
        if qualifier.is_empty() {
            return Some((key, None));
        }
        let channel = self.values[key].channel_index(qualifier)?;
        Some((key, Some(channel)))
    }

    /// The value and channel that `curve` drives.
    pub fn find_by_curve(&self, curve: CurveId) -> Option<(AnimatedKey, usize)> {
        self.order.iter().find_map(|&k| {
            self.values[k]
                .channels
                .iter()
                .position(|c| c.curves.contains(&curve))
                .map(|i| (k, i))
        })
    }

    pub fn detach_curve(&mut self, curve: CurveId) -> bool {
        let mut detached = false;
        for value in self.values.values_mut() {
            detached |= value.remove_curve(curve);
        }
        detached
    }

    pub fn keys_owned_by(&self, owner: ObjectKey) -> Vec<AnimatedKey> {
        self.order
            .iter()
            .copied()
            .filter(|&k| self.values[k].owner == Some(owner))
            .collect()
    }

    /// Rewrite the pointers of every value owned by `owner` after its id
    /// changed. `None` clears them.
    pub fn refresh_pointers(&mut self, owner: ObjectKey, id: Option<&str>) {
        for value in self.values.values_mut().filter(|v| v.owner == Some(owner)) {
            value.pointer = match id {
                Some(id) => format!("{}/{}", id, value.sid),
                None => String::new(),
            };
        }
    }

    /// Values in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (AnimatedKey, &AnimatedValue)> + '_ {
        self.order.iter().map(move |&k| (k, &self.values[k]))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn curve_ids(n: usize) -> Vec<CurveId> {
        let mut map: SlotMap<CurveId, ()> = SlotMap::with_key();
        (0..n).map(|_| map.insert(())).collect()
    }

    #[test]
    fn test_register_covers_every_slot() {
        let mut slots = ValueSlots::new();
        let color = slots.alloc_all(&[1.0, 0.5, 0.25, 1.0]);
        let mut table = AnimatedValueTable::new();

        let key = table.register(AnimatedValue::new("color", &color, RGBA)).unwrap();
        for &slot in &color {
            assert_eq!(table.find_by_slot(slot), Some(key));
        }

        let value = table.unregister(key).unwrap();
        assert_eq!(value.channel_count(), 4);
        for &slot in &color {
            assert_eq!(table.find_by_slot(slot), None);
        }
        assert!(table.is_empty());
    }

    #[test]
    fn test_empty_value_is_discarded() {
        let mut table = AnimatedValueTable::new();
        let empty: [&str; 0] = [];
        assert!(table.register(AnimatedValue::new("nothing", &[], &empty)).is_none());
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn test_shared_slot_is_rejected() {
        let mut slots = ValueSlots::new();
        let a = slots.alloc(1.0);
        let mut table = AnimatedValueTable::new();
        let empty: [&str; 0] = [];
        assert!(table.register(AnimatedValue::new("a", &[a], &empty)).is_some());
        assert!(table.register(AnimatedValue::new("b", &[a], &empty)).is_none());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_registered_is_not_animated_until_driven() {
        let mut slots = ValueSlots::new();
        let fov = slots.alloc(45.0);
        let curve = curve_ids(1)[0];
        let mut table = AnimatedValueTable::new();
        let empty: [&str; 0] = [];
        let key = table.register(AnimatedValue::new("yfov", &[fov], &empty)).unwrap();

        assert!(!table.is_animated(fov));
        assert!(table.get_mut(key).unwrap().add_curve(0, curve));
        assert!(table.is_animated(fov));
        assert_eq!(table.find_by_curve(curve), Some((key, 0)));

        assert!(table.detach_curve(curve));
        assert!(!table.is_animated(fov));
    }

    #[test]
    fn test_find_by_target() {
        let mut slots = ValueSlots::new();
        let translate = slots.alloc_all(&[0.0, 0.0, 0.0]);
        let mut table = AnimatedValueTable::new();
        let key = table
            .register(AnimatedValue::new("translate", &translate, XYZ))
            .unwrap();
        table.get_mut(key).unwrap().set_pointer("node1/translate");

        assert_eq!(table.find_by_target("node1/translate"), Some((key, None)));
        assert_eq!(table.find_by_target("node1/translate.Y"), Some((key, Some(1))));
        assert_eq!(table.find_by_target("node1/translate.z"), Some((key, Some(2))));
        assert_eq!(table.find_by_target("node1/translate(0)"), Some((key, Some(0))));
        assert_eq!(table.find_by_target("node1/translate.W"), None);
        assert_eq!(table.find_by_target("node2/translate"), None);
    }

    #[test]
    fn test_split_target() {
        assert_eq!(split_target("light/color.R"), ("light/color", ".R"));
        assert_eq!(split_target("n.1/matrix(0)(3)"), ("n.1/matrix", "(0)(3)"));
        assert_eq!(split_target("cam/xfov"), ("cam/xfov", ""));
    }

    #[test]
    fn test_matrix_qualifiers() {
        let q = matrix_qualifiers();
        assert_eq!(q[0], "(0)(0)");
        assert_eq!(q[3], "(3)(0)");
        assert_eq!(q[4], "(0)(1)");
    }
}
