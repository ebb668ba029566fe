//! The document: owner of every entity, instance, id and animated value.
//!
//! All objects live in one `SlotMap` keyed by `ObjectKey`. Libraries, scene
//! graph edges, instance bindings and tracker lists only ever hold keys, so
//! releasing an object is a matter of removing its slot and telling whoever
//! still refers to it. See `release_object` for the cascade.

use std::cell::RefCell;
use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use log::{debug, warn};
use slotmap::SlotMap;

use crate::animated::{AnimatedKey, AnimatedValue, AnimatedValueTable, SlotKey, ValueSlots};
use crate::animation::{AnimationChannel, AnimationCurve, CurveId};
use crate::asset::Asset;
use crate::entity::{Entity, EntityBody, EntityType, LibraryKind};
use crate::external::ExternalReferenceManager;
use crate::file_manager::{FileManager, FsFileManager};
use crate::id_registry::UniqueIdRegistry;
use crate::instance::{Binding, EntityInstance, InstanceOwner};
use crate::tracking::{EntityKey, InstanceKey, ObjectFlags, ObjectKey, Tracked};

/// Shared handle to a document, as held by the placeholders of other
/// documents.
pub type DocumentRef = Rc<RefCell<Document>>;

/// Profile of the `<extra><technique>` holding data COLLADA has no element
/// for: time hints, layers and entity notes.
pub(crate) const EXTRA_PROFILE: &str = "collada_document";

static NEXT_DOCUMENT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a document.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentId(u64);

impl DocumentId {
    fn next() -> DocumentId {
        DocumentId(NEXT_DOCUMENT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug)]
pub(crate) enum ObjectKind {
    Entity(Entity),
    Instance(EntityInstance),
}

#[derive(Debug)]
pub(crate) struct DocumentObject {
    pub(crate) tracked: Tracked,
    pub(crate) dae_id: Option<String>,
    pub(crate) kind: ObjectKind,
}

impl DocumentObject {
    fn new(kind: ObjectKind) -> DocumentObject {
        DocumentObject {
            tracked: Tracked::new(),
            dae_id: None,
            kind,
        }
    }
}

/// A named group of entities. Layers do not own their members.
#[derive(Clone, Debug, Default)]
pub struct Layer {
    pub name: String,
    pub entities: Vec<EntityKey>,
}

#[derive(Debug)]
pub struct Document {
    id: DocumentId,
    location: Option<PathBuf>,
    file_manager: Rc<dyn FileManager>,
    pub asset: Asset,
    pub(crate) objects: SlotMap<ObjectKey, DocumentObject>,
    pub(crate) libraries: Vec<Vec<EntityKey>>,
    pub(crate) ids: UniqueIdRegistry,
    pub(crate) values: ValueSlots,
    pub(crate) animated: AnimatedValueTable,
    pub(crate) curves: SlotMap<CurveId, AnimationCurve>,
    pub(crate) externals: ExternalReferenceManager,
    pub(crate) free_instances: Vec<InstanceKey>,
    visual_scene: Option<EntityKey>,
    physics_scene: Option<EntityKey>,
    layers: Vec<Layer>,
    start_time: Option<f32>,
    end_time: Option<f32>,
}

impl Default for Document {
    fn default() -> Document {
        Document::new()
    }
}

impl Document {
    /// An empty document reading from the local filesystem.
    pub fn new() -> Document {
        Document::with_file_manager(Rc::new(FsFileManager))
    }

    pub fn with_file_manager(file_manager: Rc<dyn FileManager>) -> Document {
        Document {
            id: DocumentId::next(),
            location: None,
            file_manager,
            asset: Asset::default(),
            objects: SlotMap::with_key(),
            libraries: vec![Vec::new(); LibraryKind::ALL.len()],
            ids: UniqueIdRegistry::new(),
            values: ValueSlots::new(),
            animated: AnimatedValueTable::new(),
            curves: SlotMap::with_key(),
            externals: ExternalReferenceManager::default(),
            free_instances: Vec::new(),
            visual_scene: None,
            physics_scene: None,
            layers: Vec::new(),
            start_time: None,
            end_time: None,
        }
    }

    pub fn id(&self) -> DocumentId {
        self.id
    }

    /// Where the document was loaded from or last saved to. Relative
    /// external urls resolve against it.
    pub fn location(&self) -> Option<&Path> {
        self.location.as_deref()
    }

    pub fn set_location(&mut self, location: Option<PathBuf>) {
        self.location = location;
    }

    pub fn file_manager(&self) -> &Rc<dyn FileManager> {
        &self.file_manager
    }

    // Tracking

    pub fn contains(&self, key: impl Into<ObjectKey>) -> bool {
        self.objects.contains_key(key.into())
    }

    pub fn tracked(&self, key: impl Into<ObjectKey>) -> Option<&Tracked> {
        self.objects.get(key.into()).map(|o| &o.tracked)
    }

    pub fn flags(&self, key: impl Into<ObjectKey>) -> ObjectFlags {
        self.tracked(key).map(Tracked::flags).unwrap_or_default()
    }

    pub fn set_flag(&mut self, key: impl Into<ObjectKey>, flag: ObjectFlags, on: bool) -> bool {
        match self.objects.get_mut(key.into()) {
            Some(object) => {
                object.tracked.set_flag(flag, on);
                true
            }
            None => false,
        }
    }

    /// Clear `flags` on every object.
    pub fn clear_flags(&mut self, flags: ObjectFlags) {
        for object in self.objects.values_mut() {
            object.tracked.set_flag(flags, false);
        }
    }

    /// Make `observer` hear about the release of `target`.
    pub fn track(&mut self, target: impl Into<ObjectKey>, observer: impl Into<ObjectKey>) -> bool {
        let observer = observer.into();
        if !self.objects.contains_key(observer) {
            return false;
        }
        match self.objects.get_mut(target.into()) {
            Some(object) => {
                object.tracked.track(observer);
                true
            }
            None => false,
        }
    }

    pub fn untrack(&mut self, target: impl Into<ObjectKey>, observer: impl Into<ObjectKey>) -> bool {
        let observer = observer.into();
        self.objects
            .get_mut(target.into())
            .map_or(false, |object| object.tracked.untrack(observer))
    }

    fn mark_dirty(&mut self, key: ObjectKey) {
        if let Some(object) = self.objects.get_mut(key) {
            object.tracked.set_flag(ObjectFlags::DIRTY, true);
        }
    }

    // Entities

    /// Create an entity in `library`.
    pub fn add_entity(&mut self, library: LibraryKind) -> EntityKey {
        let key = self.insert_entity(library.entity_type(), Some(library));
        self.libraries[library.index()].push(key);
        key
    }

    /// Create an entity no library owns: a child node, kept alive by its
    /// parents.
    pub(crate) fn insert_entity(&mut self, entity_type: EntityType, library: Option<LibraryKind>) -> EntityKey {
        let entity = Entity::new(entity_type, library, &mut self.values);
        let key = EntityKey(self.objects.insert(DocumentObject::new(ObjectKind::Entity(entity))));
        self.register_animatables(key);
        self.mark_dirty(key.0);
        key
    }

    pub fn entity(&self, key: EntityKey) -> Option<&Entity> {
        match &self.objects.get(key.0)?.kind {
            ObjectKind::Entity(entity) => Some(entity),
            ObjectKind::Instance(_) => None,
        }
    }

    pub fn entity_mut(&mut self, key: EntityKey) -> Option<&mut Entity> {
        let object = self.objects.get_mut(key.0)?;
        object.tracked.set_flag(ObjectFlags::DIRTY, true);
        match &mut object.kind {
            ObjectKind::Entity(entity) => Some(entity),
            ObjectKind::Instance(_) => None,
        }
    }

    pub fn library(&self, kind: LibraryKind) -> &[EntityKey] {
        &self.libraries[kind.index()]
    }

    /// Every live entity, library members first.
    pub fn entities(&self) -> impl Iterator<Item = (EntityKey, &Entity)> + '_ {
        self.objects.iter().filter_map(|(key, object)| match &object.kind {
            ObjectKind::Entity(entity) => Some((EntityKey(key), entity)),
            ObjectKind::Instance(_) => None,
        })
    }

    pub fn find_entity(&self, id: &str) -> Option<EntityKey> {
        let key = self.ids.get(id)?;
        match self.objects.get(key)?.kind {
            ObjectKind::Entity(_) => Some(EntityKey(key)),
            ObjectKind::Instance(_) => None,
        }
    }

    pub fn release_entity(&mut self, key: EntityKey) -> bool {
        self.release_object(key.0)
    }

    // Ids

    pub fn dae_id(&self, key: impl Into<ObjectKey>) -> Option<&str> {
        self.objects.get(key.into())?.dae_id.as_deref()
    }

    /// The object's id, generated and registered on first request from the
    /// entity's name or its type.
    pub fn ensure_dae_id(&mut self, key: impl Into<ObjectKey>) -> Option<String> {
        let key = key.into();
        let object = self.objects.get(key)?;
        if let Some(id) = &object.dae_id {
            return Some(id.clone());
        }
        let requested = match &object.kind {
            ObjectKind::Entity(entity) if !entity.name.is_empty() => entity.name.clone(),
            ObjectKind::Entity(entity) => entity.entity_type.id_prefix().to_string(),
            ObjectKind::Instance(_) => "instance".to_string(),
        };
        self.set_dae_id(key, &requested)
    }

    /// Give the object `requested` as id, or a mangled variant when another
    /// object holds it. Returns the id actually stored.
    pub fn set_dae_id(&mut self, key: impl Into<ObjectKey>, requested: &str) -> Option<String> {
        let key = key.into();
        let old = self.objects.get_mut(key)?.dae_id.take();
        if let Some(old) = old {
            self.ids.remove(&old);
        }
        let id = self.ids.insert_unique(requested, key);
        if let Some(object) = self.objects.get_mut(key) {
            object.dae_id = Some(id.clone());
            object.tracked.set_flag(ObjectFlags::DIRTY, true);
        }
        self.animated.refresh_pointers(key, Some(&id));
        Some(id)
    }

    pub fn remove_dae_id(&mut self, key: impl Into<ObjectKey>) -> bool {
        let key = key.into();
        let old = match self.objects.get_mut(key) {
            Some(object) => object.dae_id.take(),
            None => return false,
        };
        match old {
            Some(id) => {
                self.ids.remove(&id);
                self.animated.refresh_pointers(key, None);
                true
            }
            None => false,
        }
    }

    // Values

    pub fn values(&self) -> &ValueSlots {
        &self.values
    }

    pub fn value(&self, slot: SlotKey) -> Option<f32> {
        self.values.get(slot)
    }

    /// Write an animatable field. The owner of a registered slot is marked
    /// as changed.
    pub fn set_value(&mut self, slot: SlotKey, value: f32) -> bool {
        if !self.values.set(slot, value) {
            return false;
        }
        let owner = self
            .animated
            .find_by_slot(slot)
            .and_then(|key| self.animated.get(key))
            .and_then(AnimatedValue::owner);
        if let Some(owner) = owner {
            self.set_flag(owner, ObjectFlags::VALUE_CHANGED | ObjectFlags::DIRTY, true);
        }
        true
    }

    pub fn animated_values(&self) -> &AnimatedValueTable {
        &self.animated
    }

    pub fn is_animated(&self, slot: SlotKey) -> bool {
        self.animated.is_animated(slot)
    }

    /// Register the animatable fields of `key`'s content under its id.
    /// Values it registered before are replaced.
    /// Scene nodes register their transforms one by one instead.
    pub(crate) fn register_animatables(&mut self, key: EntityKey) {
        let (animatables, id) = match self.objects.get(key.0) {
            Some(DocumentObject {
                kind: ObjectKind::Entity(entity),
                dae_id,
                ..
            }) => match entity.body.content() {
                Some(content) => (content.animatables(), dae_id.clone()),
                None => return,
            },
            _ => return,
        };
        for old in self.animated.keys_owned_by(key.0) {
            self.animated.unregister(old);
        }
        for animatable in animatables {
            let value = AnimatedValue::new(&animatable.sid, &animatable.slots, &animatable.qualifiers[..]).with_owner(key.0);
            self.register_animated(value, id.as_deref());
        }
    }

    pub(crate) fn register_animated(&mut self, mut value: AnimatedValue, owner_id: Option<&str>) -> Option<AnimatedKey> {
        if let Some(id) = owner_id {
            let pointer = format!("{}/{}", id, value.sid());
            value.set_pointer(pointer);
        }
        self.animated.register(value)
    }

    // Animation

    pub fn curve(&self, id: CurveId) -> Option<&AnimationCurve> {
        self.curves.get(id)
    }

    /// Add `curve` to `animation` on the channel for `target`, and bind it
    /// to the animated value the target names when there is one.
    pub fn add_animation_curve(&mut self, animation: EntityKey, target: &str, curve: AnimationCurve) -> Option<CurveId> {
        self.entity(animation)?.animation()?;
        let id = self.curves.insert(curve);
        if let Some(a) = self.entity_mut(animation).and_then(Entity::animation_mut) {
            match a.channels.iter_mut().find(|c| c.target == target) {
                Some(channel) => channel.curves.push(id),
                None => a.channels.push(AnimationChannel {
                    target: target.to_string(),
                    curves: vec![id],
                }),
            }
        }
        if !self.link_curves(target, &[id]) {
            debug!("curve for '{}' left unbound", target);
        }
        Some(id)
    }

    /// Bind every animation channel to the animated value its target names.
    /// Returns the number of channels whose target was not found.
    pub fn link_animations(&mut self) -> usize {
        let mut pending = Vec::new();
        for key in self.library(LibraryKind::Animations).to_vec() {
            if let Some(animation) = self.entity(key).and_then(Entity::animation) {
                for channel in &animation.channels {
                    pending.push((channel.target.clone(), channel.curves.clone()));
                }
            }
        }
        let mut unresolved = 0;
        for (target, curves) in pending {
            if !self.link_curves(&target, &curves) {
                warn!("animation target '{}' not found", target);
                unresolved += 1;
            }
        }
        unresolved
    }

    fn link_curves(&mut self, target: &str, curves: &[CurveId]) -> bool {
        let (key, channel) = match self.animated.find_by_target(target) {
            Some(found) => found,
            None => return false,
        };
        let value = match self.animated.get_mut(key) {
            Some(value) => value,
            None => return false,
        };
        match channel {
            Some(channel) => {
                for &curve in curves {
                    value.add_curve(channel, curve);
                }
            }
            None if curves.len() == 1 && value.channel_count() > 1 => {
                warn!("single curve for the {} channels of '{}'", value.channel_count(), target);
                value.add_curve(0, curves[0]);
            }
            None => {
                for (i, &curve) in curves.iter().enumerate() {
                    value.add_curve(i, curve);
                }
            }
        }
        true
    }

    /// Sample every driven value at `time` and store the result in its
    /// slots.
    pub fn evaluate(&mut self, time: f32) {
        for (_, value) in self.animated.iter() {
            for channel in value.channels() {
                if let Some(curve) = channel.curves().last().and_then(|&c| self.curves.get(c)) {
                    self.values.set(channel.slot(), curve.evaluate(time));
                }
            }
        }
    }

    // Scenes, layers and time

    pub fn visual_scene(&self) -> Option<EntityKey> {
        self.visual_scene
    }

    /// Make `scene`, a member of the visual scene library, the active one.
    pub fn set_visual_scene(&mut self, scene: Option<EntityKey>) -> bool {
        if let Some(key) = scene {
            if !self.library(LibraryKind::VisualScenes).contains(&key) {
                return false;
            }
        }
        self.visual_scene = scene;
        true
    }

    pub fn physics_scene(&self) -> Option<EntityKey> {
        self.physics_scene
    }

    pub fn set_physics_scene(&mut self, scene: Option<EntityKey>) -> bool {
        if let Some(key) = scene {
            if !self.library(LibraryKind::PhysicsScenes).contains(&key) {
                return false;
            }
        }
        self.physics_scene = scene;
        true
    }

    pub fn add_layer(&mut self, name: &str) -> usize {
        self.layers.push(Layer {
            name: name.to_string(),
            entities: Vec::new(),
        });
        self.layers.len() - 1
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn layer_mut(&mut self, index: usize) -> Option<&mut Layer> {
        self.layers.get_mut(index)
    }

    pub fn find_layer(&self, name: &str) -> Option<usize> {
        self.layers.iter().position(|l| l.name == name)
    }

    pub fn set_start_time(&mut self, time: Option<f32>) {
        self.start_time = time;
    }

    pub fn set_end_time(&mut self, time: Option<f32>) {
        self.end_time = time;
    }

    /// Start of the animated range: the stored hint, or the first key of any
    /// curve.
    pub fn start_time(&self) -> f32 {
        self.start_time
            .or_else(|| self.curve_extent().map(|(start, _)| start))
            .unwrap_or(0.0)
    }

    pub fn end_time(&self) -> f32 {
        self.end_time
            .or_else(|| self.curve_extent().map(|(_, end)| end))
            .unwrap_or(0.0)
    }

    pub(crate) fn time_hints(&self) -> (Option<f32>, Option<f32>) {
        (self.start_time, self.end_time)
    }

    fn curve_extent(&self) -> Option<(f32, f32)> {
        self.curves
            .values()
            .filter_map(AnimationCurve::extent)
            .fold(None, |acc, (start, end)| match acc {
                None => Some((start, end)),
                Some((s, e)) => Some((s.min(start), e.max(end))),
            })
    }

    // Release

    /// Release `key` and everything that depended on it alone.
    ///
    /// The id goes first, then every tracker hears about the release, then
    /// the slot is freed and the object's own edges are undone. Instances
    /// bound to a released entity release themselves. Children of a
    /// released node that no library reaches any more go with it, along
    /// with their own unreachable descendants. Releasing a stale key does
    /// nothing and returns false.
    pub fn release_object(&mut self, key: ObjectKey) -> bool {
        if !self.objects.contains_key(key) {
            return false;
        }
        let mut queue = VecDeque::new();
        queue.push_back(key);
        let mut former_children = self.release_queue(queue);
        while !former_children.is_empty() {
            let reachable = self.reachable_nodes();
            let mut orphans = VecDeque::new();
            let mut seen = HashSet::new();
            while let Some(child) = former_children.pop() {
                if reachable.contains(&child) || !seen.insert(child) {
                    continue;
                }
                if let Some(node) = self.entity(child).and_then(Entity::scene_node) {
                    former_children.extend(node.children.iter().copied());
                    orphans.push_back(child.0);
                }
            }
            if orphans.is_empty() {
                break;
            }
            debug!("releasing {} orphaned scene nodes", orphans.len());
            former_children = self.release_queue(orphans);
        }
        true
    }

    /// Every scene node a node or visual-scene library member reaches
    /// through child edges.
    fn reachable_nodes(&self) -> HashSet<EntityKey> {
        let mut reachable = HashSet::new();
        let mut frontier: Vec<EntityKey> = self
            .library(LibraryKind::Nodes)
            .iter()
            .chain(self.library(LibraryKind::VisualScenes))
            .copied()
            .collect();
        while let Some(key) = frontier.pop() {
            if !reachable.insert(key) {
                continue;
            }
            if let Some(node) = self.entity(key).and_then(Entity::scene_node) {
                frontier.extend(node.children.iter().copied());
            }
        }
        reachable
    }

    /// Release every scene node that no library member reaches through
    /// child edges, detached ones included. Returns how many were released.
    pub fn collect_orphans(&mut self) -> usize {
        let reachable = self.reachable_nodes();
        let orphans: VecDeque<ObjectKey> = self
            .entities()
            .filter(|(key, entity)| entity.scene_node().is_some() && !reachable.contains(key))
            .map(|(key, _)| key.0)
            .collect();
        let count = orphans.len();
        if count > 0 {
            debug!("releasing {} orphaned scene nodes", count);
            self.release_queue(orphans);
        }
        count
    }

    /// Returns the children of the scene nodes released on the way.
    fn release_queue(&mut self, mut queue: VecDeque<ObjectKey>) -> Vec<EntityKey> {
        let mut former_children = Vec::new();
        while let Some(key) = queue.pop_front() {
            let object = match self.objects.get_mut(key) {
                Some(object) => object,
                None => continue,
            };
            if let Some(id) = object.dae_id.take() {
                self.ids.remove(&id);
            }
            let trackers = object.tracked.take_trackers();
            for observer in trackers {
                self.on_released(observer, key, &mut queue);
            }
            match self.objects.remove(key).map(|o| o.kind) {
                Some(ObjectKind::Entity(entity)) => {
                    if let Some(node) = entity.scene_node() {
                        former_children.extend(node.children.iter().copied());
                    }
                    self.teardown_entity(EntityKey(key), entity, &mut queue);
                }
                Some(ObjectKind::Instance(instance)) => self.teardown_instance(InstanceKey(key), instance),
                None => {}
            }
        }
        former_children
    }

    /// `observer` was tracking `released`, which is going away.
    fn on_released(&mut self, observer: ObjectKey, released: ObjectKey, queue: &mut VecDeque<ObjectKey>) {
        if let Some(instance) = self.instance_mut_internal(InstanceKey(observer)) {
            if matches!(instance.binding, Binding::Local(e) if e.0 == released) {
                instance.binding = Binding::Unbound;
                if instance.external.is_none() {
                    debug!("instance {:?} lost its entity, releasing it", observer);
                    queue.push_back(observer);
                }
            }
        }
    }

    fn teardown_entity(&mut self, key: EntityKey, entity: Entity, queue: &mut VecDeque<ObjectKey>) {
        if let Some(library) = entity.library {
            self.libraries[library.index()].retain(|&k| k != key);
        }
        for layer in &mut self.layers {
            layer.entities.retain(|&k| k != key);
        }
        if self.visual_scene == Some(key) {
            self.visual_scene = None;
        }
        if self.physics_scene == Some(key) {
            self.physics_scene = None;
        }
        for animated in self.animated.keys_owned_by(key.0) {
            self.animated.unregister(animated);
        }
        for slot in entity.body.slots() {
            self.values.free(slot);
        }

        match entity.body {
            EntityBody::SceneNode(node) => {
                queue.extend(node.instances.iter().map(|&i| i.0));
                for child in node.children {
                    if let Some(c) = self.entity_mut(child).and_then(Entity::scene_node_mut) {
                        c.parents.retain(|&p| p != key);
                    }
                }
                for parent in node.parents {
                    if let Some(p) = self.entity_mut(parent).and_then(Entity::scene_node_mut) {
                        p.children.retain(|&c| c != key);
                    }
                }
            }
            EntityBody::Material(material) => queue.extend(material.effect.map(|i| i.0)),
            EntityBody::AnimationClip(clip) => queue.extend(clip.animations.iter().map(|&i| i.0)),
            EntityBody::PhysicsScene(scene) => queue.extend(scene.models.iter().map(|&i| i.0)),
            EntityBody::Animation(animation) => {
                for curve in animation.curves() {
                    self.animated.detach_curve(curve);
                    self.curves.remove(curve);
                }
            }
            _ => {}
        }
    }

    fn teardown_instance(&mut self, key: InstanceKey, instance: EntityInstance) {
        self.detach_instance(key, instance.owner);
        if let Binding::Local(entity) = instance.binding {
            self.untrack(entity, key);
        }
        if let Some(reference) = instance.external {
            self.externals.remove_reference(reference);
        }
    }

    /// Remove `key` from the list its owner keeps.
    pub(crate) fn detach_instance(&mut self, key: InstanceKey, owner: InstanceOwner) {
        match owner {
            InstanceOwner::Document => self.free_instances.retain(|&i| i != key),
            InstanceOwner::Node(node) => {
                if let Some(n) = self.entity_mut(node).and_then(Entity::scene_node_mut) {
                    n.instances.retain(|&i| i != key);
                }
            }
            InstanceOwner::Entity(owner) => match self.entity_mut(owner).map(Entity::body_mut) {
                Some(EntityBody::Material(material)) if material.effect == Some(key) => material.effect = None,
                Some(EntityBody::AnimationClip(clip)) => clip.animations.retain(|&i| i != key),
                Some(EntityBody::PhysicsScene(scene)) => scene.models.retain(|&i| i != key),
                _ => {}
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::{Interpolation, Keyframe};
    use crate::transform::TransformKind;

    #[test]
    fn test_document_ids_are_unique() {
        assert_ne!(Document::new().id(), Document::new().id());
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let mut doc = Document::new();
        let a = doc.add_entity(LibraryKind::Cameras);
        let b = doc.add_entity(LibraryKind::Cameras);
        let id_a = doc.ensure_dae_id(a).unwrap();
        let id_b = doc.ensure_dae_id(b).unwrap();
        assert_ne!(id_a, id_b);
        assert_eq!(doc.ensure_dae_id(a).unwrap(), id_a);
        assert_eq!(doc.find_entity(&id_b), Some(b));
    }

    #[test]
    fn test_set_dae_id_mangles_collisions() {
        let mut doc = Document::new();
        let a = doc.add_entity(LibraryKind::Lights);
        let b = doc.add_entity(LibraryKind::Lights);
        assert_eq!(doc.set_dae_id(a, "sun").unwrap(), "sun");
        let mangled = doc.set_dae_id(b, "sun").unwrap();
        assert_ne!(mangled, "sun");
        assert_eq!(doc.find_entity("sun"), Some(a));
        assert_eq!(doc.find_entity(&mangled), Some(b));

        assert!(doc.remove_dae_id(a));
        assert_eq!(doc.find_entity("sun"), None);
        assert_eq!(doc.set_dae_id(b, "sun").unwrap(), "sun");
        assert_eq!(doc.find_entity(&mangled), None);
    }

    #[test]
    fn test_release_frees_id_and_slots() {
        let mut doc = Document::new();
        let camera = doc.add_entity(LibraryKind::Cameras);
        doc.set_dae_id(camera, "cam");
        let yfov = doc.entity(camera).and_then(Entity::camera).unwrap().vertical();
        assert!(doc.animated_values().find_by_slot(yfov).is_some());

        assert!(doc.release_entity(camera));
        assert!(!doc.release_entity(camera));
        assert_eq!(doc.find_entity("cam"), None);
        assert!(doc.library(LibraryKind::Cameras).is_empty());
        assert_eq!(doc.value(yfov), None);
        assert!(doc.animated_values().is_empty());
    }

    #[test]
    fn test_animatables_follow_id() {
        let mut doc = Document::new();
        let light = doc.add_entity(LibraryKind::Lights);
        let color = doc.entity(light).and_then(Entity::light).unwrap().color();
        let key = doc.animated_values().find_by_slot(color[1]).unwrap();
        assert_eq!(doc.animated_values().get(key).unwrap().pointer(), "");

        doc.set_dae_id(light, "lamp");
        assert_eq!(doc.animated_values().find_by_target("lamp/color.G"), Some((key, Some(1))));
        doc.set_dae_id(light, "bulb");
        assert_eq!(doc.animated_values().find_by_target("lamp/color"), None);
        assert!(doc.animated_values().find_by_target("bulb/color").is_some());
    }

    #[test]
    fn test_set_value_marks_owner() {
        let mut doc = Document::new();
        let camera = doc.add_entity(LibraryKind::Cameras);
        doc.clear_flags(ObjectFlags::all());
        let znear = doc.entity(camera).and_then(Entity::camera).unwrap().znear();
        assert!(doc.set_value(znear, 0.5));
        assert_eq!(doc.value(znear), Some(0.5));
        assert!(doc.flags(camera).contains(ObjectFlags::VALUE_CHANGED));
    }

    #[test]
    fn test_curve_drives_transform() {
        let mut doc = Document::new();
        let node = doc.add_entity(LibraryKind::Nodes);
        doc.set_dae_id(node, "box");
        doc.add_transform(node, TransformKind::Translate, Some("location"), &[0.0, 0.0, 0.0]);
        let slot = doc.entity(node).and_then(Entity::scene_node).unwrap().transforms()[0].slots()[1];

        let animation = doc.add_entity(LibraryKind::Animations);
        let curve = AnimationCurve::new(vec![
            Keyframe::new(0.0, 0.0, Interpolation::Linear),
            Keyframe::new(2.0, 4.0, Interpolation::Linear),
        ]);
        let id = doc.add_animation_curve(animation, "box/location.Y", curve).unwrap();
        assert!(doc.is_animated(slot));
        assert_eq!(doc.start_time(), 0.0);
        assert_eq!(doc.end_time(), 2.0);

        doc.evaluate(1.0);
        assert_eq!(doc.value(slot), Some(2.0));

        assert!(doc.release_entity(animation));
        assert!(doc.curve(id).is_none());
        assert!(!doc.is_animated(slot));
    }

    #[test]
    fn test_layers_forget_released_entities() {
        let mut doc = Document::new();
        let light = doc.add_entity(LibraryKind::Lights);
        let layer = doc.add_layer("lights");
        doc.layer_mut(layer).unwrap().entities.push(light);
        doc.release_entity(light);
        assert!(doc.layers()[0].entities.is_empty());
        assert_eq!(doc.find_layer("lights"), Some(0));
    }

    #[test]
    fn test_active_scene_must_be_a_visual_scene() {
        let mut doc = Document::new();
        let node = doc.add_entity(LibraryKind::Nodes);
        let scene = doc.add_entity(LibraryKind::VisualScenes);
        assert!(!doc.set_visual_scene(Some(node)));
        assert!(doc.set_visual_scene(Some(scene)));
        doc.release_entity(scene);
        assert_eq!(doc.visual_scene(), None);
    }
}
