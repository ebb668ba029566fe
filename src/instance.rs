//! Entity instances: per-use references to entities.
//!
//! An instance has a fixed entity type and at most one live target. The
//! target is a local entity, which the instance tracks so that it hears of
//! its release, or an entity of another document reached through an
//! external reference.

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::{Rc, Weak};

use log::{debug, warn};

use crate::document::{Document, DocumentObject, DocumentRef, ObjectKind};
use crate::entity::{Entity, EntityBody, EntityType};
use crate::external::ExternalReferenceKey;
use crate::tracking::{EntityKey, InstanceKey, ObjectFlags};

/// What keeps an instance in the document.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InstanceOwner {
    /// Created loose through `Document::create_instance`.
    Document,
    /// Attached to a scene node.
    Node(EntityKey),
    /// Owned by a material, an animation clip or a physics scene.
    Entity(EntityKey),
}

/// Binds a material symbol of a geometry to a material.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MaterialBinding {
    pub symbol: String,
    /// Url of the material, `#id` for a local one.
    pub target: String,
}

#[derive(Clone, Debug)]
pub(crate) struct ForeignEntity {
    pub(crate) document: Weak<RefCell<Document>>,
    pub(crate) entity: EntityKey,
}

#[derive(Clone, Debug)]
pub(crate) enum Binding {
    Unbound,
    Local(EntityKey),
    Foreign(ForeignEntity),
}

/// Entity an instance currently resolves to.
#[derive(Clone, Debug)]
pub enum EntityTarget {
    Local(EntityKey),
    Foreign { document: DocumentRef, entity: EntityKey },
}

impl EntityTarget {
    pub fn local(&self) -> Option<EntityKey> {
        match self {
            EntityTarget::Local(key) => Some(*key),
            EntityTarget::Foreign { .. } => None,
        }
    }
}

#[derive(Debug)]
pub struct EntityInstance {
    pub(crate) entity_type: EntityType,
    pub(crate) binding: Binding,
    pub(crate) external: Option<ExternalReferenceKey>,
    pub(crate) owner: InstanceOwner,
    pub name: String,
    pub material_bindings: Vec<MaterialBinding>,
    /// Skeleton root urls of a controller instance.
    pub skeletons: Vec<String>,
}

impl EntityInstance {
    pub(crate) fn new(entity_type: EntityType, owner: InstanceOwner) -> EntityInstance {
        EntityInstance {
            entity_type,
            binding: Binding::Unbound,
            external: None,
            owner,
            name: String::new(),
            material_bindings: Vec::new(),
            skeletons: Vec::new(),
        }
    }

    /// Type of the entities this instance accepts. Never changes.
    pub fn entity_type(&self) -> EntityType {
        self.entity_type
    }

    pub fn owner(&self) -> InstanceOwner {
        self.owner
    }

    pub fn is_bound(&self) -> bool {
        !matches!(self.binding, Binding::Unbound)
    }

    pub fn external_reference(&self) -> Option<ExternalReferenceKey> {
        self.external
    }
}

impl Document {
    /// Create an instance owned by the document itself.
    pub fn create_instance(&mut self, entity_type: EntityType) -> InstanceKey {
        self.insert_instance(entity_type, InstanceOwner::Document)
    }

    pub(crate) fn insert_instance(&mut self, entity_type: EntityType, owner: InstanceOwner) -> InstanceKey {
        if let InstanceOwner::Entity(material) = owner {
            let previous = self
                .entity(material)
                .and_then(Entity::material)
                .and_then(|m| m.effect);
            if let Some(previous) = previous {
                self.release_instance(previous);
            }
        }
        let object = DocumentObject {
            tracked: Default::default(),
            dae_id: None,
            kind: ObjectKind::Instance(EntityInstance::new(entity_type, owner)),
        };
        let key = InstanceKey(self.objects.insert(object));
        self.set_flag(key, ObjectFlags::DIRTY, true);
        match owner {
            InstanceOwner::Document => self.free_instances.push(key),
            InstanceOwner::Node(node) => {
                if let Some(n) = self.entity_mut(node).and_then(Entity::scene_node_mut) {
                    n.instances.push(key);
                }
                self.set_flag(node, ObjectFlags::NEW_CHILD, true);
            }
            InstanceOwner::Entity(owner) => match self.entity_mut(owner).map(Entity::body_mut) {
                Some(EntityBody::Material(material)) => material.effect = Some(key),
                Some(EntityBody::AnimationClip(clip)) => clip.animations.push(key),
                Some(EntityBody::PhysicsScene(scene)) => scene.models.push(key),
                _ => {}
            },
        }
        key
    }

    /// Instantiate `entity` under `owner`.
    ///
    /// A scene node accepts any entity, a material its effect, an animation
    /// clip animations and a physics scene physics models. A material holds
    /// a single effect instance, so instantiating a second effect releases
    /// the first.
    pub fn instantiate(&mut self, owner: EntityKey, entity: EntityKey) -> Option<InstanceKey> {
        let entity_type = self.entity(entity)?.entity_type;
        let owner_type = self.entity(owner)?.entity_type;
        let accepted = match owner_type {
            EntityType::SceneNode => true,
            EntityType::Material => entity_type == EntityType::Effect,
            EntityType::AnimationClip => entity_type == EntityType::Animation,
            EntityType::PhysicsScene => entity_type == EntityType::PhysicsModel,
            _ => false,
        };
        if !accepted {
            warn!("a {:?} cannot instantiate a {:?}", owner_type, entity_type);
            return None;
        }
        let owner = self.instance_owner_for(owner, owner_type);
        let instance = self.insert_instance(entity_type, owner);
        self.set_instance_entity(instance, Some(entity));
        Some(instance)
    }

    pub(crate) fn instance_owner_for(&self, owner: EntityKey, owner_type: EntityType) -> InstanceOwner {
        match owner_type {
            EntityType::SceneNode => InstanceOwner::Node(owner),
            _ => InstanceOwner::Entity(owner),
        }
    }

    pub fn instance(&self, key: InstanceKey) -> Option<&EntityInstance> {
        match &self.objects.get(key.0)?.kind {
            ObjectKind::Instance(instance) => Some(instance),
            ObjectKind::Entity(_) => None,
        }
    }

    pub fn instance_mut(&mut self, key: InstanceKey) -> Option<&mut EntityInstance> {
        self.set_flag(key, ObjectFlags::DIRTY, true);
        self.instance_mut_internal(key)
    }

    pub(crate) fn instance_mut_internal(&mut self, key: InstanceKey) -> Option<&mut EntityInstance> {
        match &mut self.objects.get_mut(key.0)?.kind {
            ObjectKind::Instance(instance) => Some(instance),
            ObjectKind::Entity(_) => None,
        }
    }

    /// Instances the document owns directly.
    pub fn document_instances(&self) -> &[InstanceKey] {
        &self.free_instances
    }

    /// Bind `instance` to the local `entity`, or unbind it with `None`.
    ///
    /// The previous binding is dropped first, external reference included.
    /// An entity of the wrong type is refused and the binding left as it
    /// was.
    pub fn set_instance_entity(&mut self, instance: InstanceKey, entity: Option<EntityKey>) -> bool {
        let instance_type = match self.instance(instance) {
            Some(i) => i.entity_type,
            None => return false,
        };
        if let Some(key) = entity {
            match self.entity(key) {
                Some(e) if e.entity_type == instance_type => {}
                Some(e) => {
                    warn!("cannot bind a {:?} instance to a {:?}", instance_type, e.entity_type);
                    return false;
                }
                None => return false,
            }
        }
        self.clear_binding(instance);
        if let Some(key) = entity {
            self.track(key, instance);
            if let Some(i) = self.instance_mut(instance) {
                i.binding = Binding::Local(key);
            }
        }
        true
    }

    /// Bind `instance` to `entity` of another, already loaded document.
    /// An external reference to that document is created on the way.
    pub fn set_instance_foreign_entity(&mut self, instance: InstanceKey, document: &DocumentRef, entity: EntityKey) -> bool {
        let instance_type = match self.instance(instance) {
            Some(i) => i.entity_type,
            None => return false,
        };
        let (location, entity_id) = {
            let mut foreign = match document.try_borrow_mut() {
                Ok(foreign) => foreign,
                Err(_) => {
                    warn!("cannot bind to a document that is being edited");
                    return false;
                }
            };
            match foreign.entity(entity) {
                Some(e) if e.entity_type == instance_type => {}
                _ => {
                    warn!("foreign entity is missing or not a {:?}", instance_type);
                    return false;
                }
            }
            let entity_id = match foreign.ensure_dae_id(entity) {
                Some(id) => id,
                None => return false,
            };
            let location = foreign
                .location()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(format!("document{}.dae", foreign.id())));
            (location, entity_id)
        };

        let held_elsewhere = self
            .externals
            .find_placeholder(&location)
            .and_then(|key| self.externals.placeholder(key))
            .and_then(|p| p.target.as_ref())
            .map_or(false, |loaded| !Rc::ptr_eq(loaded, document));
        if held_elsewhere {
            warn!("{} is already loaded as another document", location.display());
            return false;
        }

        self.clear_binding(instance);
        let uri = self.file_manager().make_relative(self.location(), &location);
        let placeholder = self.externals.find_or_add_placeholder(&uri, location);
        if let Some(p) = self.externals.placeholder_mut(placeholder) {
            if p.target.is_none() {
                p.target = Some(Rc::clone(document));
            }
        }
        let reference = self.externals.add_reference(placeholder, &entity_id, instance);
        if let Some(i) = self.instance_mut(instance) {
            i.external = Some(reference);
            i.binding = Binding::Foreign(ForeignEntity {
                document: Rc::downgrade(document),
                entity,
            });
        }
        true
    }

    /// Point `instance` at entity `entity_id` of the document at `uri`,
    /// relative to this document's location. Binds at once when that
    /// document is loaded, and stays unbound until it is otherwise.
    pub fn set_instance_external(&mut self, instance: InstanceKey, uri: &str, entity_id: &str) -> bool {
        if self.instance(instance).is_none() {
            return false;
        }
        self.clear_binding(instance);
        let location = self.file_manager().resolve(self.location(), uri);
        let placeholder = self.externals.find_or_add_placeholder(uri, location);
        let reference = self.externals.add_reference(placeholder, entity_id, instance);
        if let Some(i) = self.instance_mut(instance) {
            i.external = Some(reference);
        }
        let loaded = self.externals.placeholder(placeholder).and_then(|p| p.target.clone());
        if let Some(document) = loaded {
            self.bind_external(instance, &document, entity_id);
        }
        true
    }

    /// Resolve `entity_id` in the loaded `document` for `instance`. A
    /// missing or mistyped entity leaves the instance unbound.
    pub(crate) fn bind_external(&mut self, instance: InstanceKey, document: &DocumentRef, entity_id: &str) -> bool {
        let instance_type = match self.instance(instance) {
            Some(i) => i.entity_type,
            None => return false,
        };
        let found = match document.try_borrow() {
            Ok(foreign) => foreign
                .find_entity(entity_id)
                .filter(|&e| foreign.entity(e).map(Entity::entity_type) == Some(instance_type)),
            Err(_) => None,
        };
        let binding = match found {
            Some(entity) => Binding::Foreign(ForeignEntity {
                document: Rc::downgrade(document),
                entity,
            }),
            None => {
                warn!("external entity '{}' not found or not a {:?}", entity_id, instance_type);
                Binding::Unbound
            }
        };
        let bound = !matches!(binding, Binding::Unbound);
        if let Some(i) = self.instance_mut_internal(instance) {
            i.binding = binding;
        }
        bound
    }

    /// Drop the binding of `instance`, untracking a local entity and
    /// removing its external reference.
    fn clear_binding(&mut self, instance: InstanceKey) {
        let (binding, external) = match self.instance_mut_internal(instance) {
            Some(i) => (std::mem::replace(&mut i.binding, Binding::Unbound), i.external.take()),
            None => return,
        };
        if let Binding::Local(entity) = binding {
            self.untrack(entity, instance);
        }
        if let Some(reference) = external {
            self.externals.remove_reference(reference);
        }
    }

    /// The entity `instance` resolves to right now. A foreign entity whose
    /// document was unloaded, or which was released, resolves to nothing.
    pub fn instance_entity(&self, instance: InstanceKey) -> Option<EntityTarget> {
        match &self.instance(instance)?.binding {
            Binding::Unbound => None,
            Binding::Local(entity) => Some(EntityTarget::Local(*entity)),
            Binding::Foreign(foreign) => {
                let document = foreign.document.upgrade()?;
                if let Ok(doc) = document.try_borrow() {
                    doc.entity(foreign.entity)?;
                }
                Some(EntityTarget::Foreign {
                    document,
                    entity: foreign.entity,
                })
            }
        }
    }

    /// Drop the foreign binding of every instance referring through
    /// `references`, keeping the references themselves.
    pub(crate) fn unbind_references(&mut self, references: &[ExternalReferenceKey]) {
        for &reference in references {
            let instance = match self.externals.reference(reference) {
                Some(r) => r.instance,
                None => continue,
            };
            if let Some(i) = self.instance_mut_internal(instance) {
                i.binding = Binding::Unbound;
            }
        }
    }

    pub fn release_instance(&mut self, instance: InstanceKey) -> bool {
        debug!("releasing instance {:?}", instance);
        self.release_object(instance.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::LibraryKind;

    #[test]
    fn test_type_mismatch_is_refused() {
        let mut doc = Document::new();
        let camera = doc.add_entity(LibraryKind::Cameras);
        let light = doc.add_entity(LibraryKind::Lights);
        let node = doc.add_entity(LibraryKind::Nodes);
        let instance = doc.instantiate(node, camera).unwrap();

        assert!(!doc.set_instance_entity(instance, Some(light)));
        assert_eq!(doc.instance_entity(instance).and_then(|t| t.local()), Some(camera));
        assert_eq!(doc.instance(instance).unwrap().entity_type(), EntityType::Camera);
    }

    #[test]
    fn test_instance_tracks_its_entity() {
        let mut doc = Document::new();
        let camera = doc.add_entity(LibraryKind::Cameras);
        let other = doc.add_entity(LibraryKind::Cameras);
        let instance = doc.create_instance(EntityType::Camera);

        assert!(doc.set_instance_entity(instance, Some(camera)));
        assert!(doc.tracked(camera).unwrap().is_tracked_by(instance.0));
        assert!(doc.set_instance_entity(instance, Some(other)));
        assert!(!doc.tracked(camera).unwrap().is_tracked_by(instance.0));
        assert!(doc.tracked(other).unwrap().is_tracked_by(instance.0));

        assert!(doc.set_instance_entity(instance, None));
        assert!(!doc.instance(instance).unwrap().is_bound());
        assert_eq!(doc.tracked(other).unwrap().tracker_count(), 0);
    }

    #[test]
    fn test_material_keeps_one_effect_instance() {
        let mut doc = Document::new();
        let material = doc.add_entity(LibraryKind::Materials);
        let first = doc.add_entity(LibraryKind::Effects);
        let second = doc.add_entity(LibraryKind::Effects);

        let a = doc.instantiate(material, first).unwrap();
        let b = doc.instantiate(material, second).unwrap();
        assert!(doc.instance(a).is_none());
        assert_eq!(doc.entity(material).and_then(Entity::material).unwrap().effect_instance(), Some(b));
        let camera = doc.add_entity(LibraryKind::Cameras);
        assert!(doc.instantiate(material, camera).is_none());
    }

    #[test]
    fn test_pending_external_is_unbound() {
        let mut doc = Document::new();
        let node = doc.add_entity(LibraryKind::Nodes);
        let instance = doc.insert_instance(EntityType::Camera, InstanceOwner::Node(node));
        assert!(doc.set_instance_external(instance, "other.dae", "cam1"));
        assert!(doc.instance_entity(instance).is_none());
        assert!(doc.instance(instance).unwrap().external_reference().is_some());
    }
}
