//! Entities: the reusable, identifiable content of a document.

use xml::Element;

use crate::animated::{SlotKey, ValueSlots};
use crate::animation::{Animation, AnimationClip};
use crate::asset::Asset;
use crate::camera::Camera;
use crate::controller::Controller;
use crate::geometry::Geometry;
use crate::light::Light;
use crate::material::{Effect, Image, Material};
use crate::physics::{PhysicsMaterial, PhysicsModel, PhysicsScene};
use crate::scene::SceneNode;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntityType {
    Animation,
    AnimationClip,
    Camera,
    Controller,
    Effect,
    Geometry,
    Image,
    Light,
    Material,
    PhysicsMaterial,
    PhysicsModel,
    PhysicsScene,
    SceneNode,
}

impl EntityType {
    /// Element used to instantiate an entity of this type.
    pub fn instance_element(self) -> &'static str {
        match self {
            EntityType::Animation => "instance_animation",
            EntityType::AnimationClip => "instance_animation_clip",
            EntityType::Camera => "instance_camera",
            EntityType::Controller => "instance_controller",
            EntityType::Effect => "instance_effect",
            EntityType::Geometry => "instance_geometry",
            EntityType::Image => "instance_image",
            EntityType::Light => "instance_light",
            EntityType::Material => "instance_material",
            EntityType::PhysicsMaterial => "instance_physics_material",
            EntityType::PhysicsModel => "instance_physics_model",
            EntityType::PhysicsScene => "instance_physics_scene",
            EntityType::SceneNode => "instance_node",
        }
    }

    pub fn from_instance_element(name: &str) -> Option<EntityType> {
        match name {
            "instance_camera" => Some(EntityType::Camera),
            "instance_controller" => Some(EntityType::Controller),
            "instance_geometry" => Some(EntityType::Geometry),
            "instance_light" => Some(EntityType::Light),
            "instance_node" => Some(EntityType::SceneNode),
            _ => None,
        }
    }

    /// Prefix for generated ids.
    pub fn id_prefix(self) -> &'static str {
        match self {
            EntityType::Animation => "animation",
            EntityType::AnimationClip => "clip",
            EntityType::Camera => "camera",
            EntityType::Controller => "controller",
            EntityType::Effect => "effect",
            EntityType::Geometry => "geometry",
            EntityType::Image => "image",
            EntityType::Light => "light",
            EntityType::Material => "material",
            EntityType::PhysicsMaterial => "physics_material",
            EntityType::PhysicsModel => "physics_model",
            EntityType::PhysicsScene => "physics_scene",
            EntityType::SceneNode => "node",
        }
    }
}

/// The typed collections of a document, in the order they are written.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LibraryKind {
    Images,
    Effects,
    Materials,
    Cameras,
    Lights,
    Geometries,
    Controllers,
    Animations,
    AnimationClips,
    PhysicsMaterials,
    PhysicsModels,
    PhysicsScenes,
    Nodes,
    VisualScenes,
}

impl LibraryKind {
    pub const ALL: [LibraryKind; 14] = [
        LibraryKind::Images,
        LibraryKind::Effects,
        LibraryKind::Materials,
        LibraryKind::Cameras,
        LibraryKind::Lights,
        LibraryKind::Geometries,
        LibraryKind::Controllers,
        LibraryKind::Animations,
        LibraryKind::AnimationClips,
        LibraryKind::PhysicsMaterials,
        LibraryKind::PhysicsModels,
        LibraryKind::PhysicsScenes,
        LibraryKind::Nodes,
        LibraryKind::VisualScenes,
    ];

    pub fn index(self) -> usize {
        LibraryKind::ALL.iter().position(|&k| k == self).unwrap_or(0)
    }

    pub fn entity_type(self) -> EntityType {
        match self {
            LibraryKind::Images => EntityType::Image,
            LibraryKind::Effects => EntityType::Effect,
            LibraryKind::Materials => EntityType::Material,
            LibraryKind::Cameras => EntityType::Camera,
            LibraryKind::Lights => EntityType::Light,
            LibraryKind::Geometries => EntityType::Geometry,
            LibraryKind::Controllers => EntityType::Controller,
            LibraryKind::Animations => EntityType::Animation,
            LibraryKind::AnimationClips => EntityType::AnimationClip,
            LibraryKind::PhysicsMaterials => EntityType::PhysicsMaterial,
            LibraryKind::PhysicsModels => EntityType::PhysicsModel,
            LibraryKind::PhysicsScenes => EntityType::PhysicsScene,
            LibraryKind::Nodes | LibraryKind::VisualScenes => EntityType::SceneNode,
        }
    }

    /// Library holding entities of `entity_type`. Scene nodes go to the
    /// node library; visual scenes are requested explicitly.
    pub fn for_type(entity_type: EntityType) -> LibraryKind {
        match entity_type {
            EntityType::Image => LibraryKind::Images,
            EntityType::Effect => LibraryKind::Effects,
            EntityType::Material => LibraryKind::Materials,
            EntityType::Camera => LibraryKind::Cameras,
            EntityType::Light => LibraryKind::Lights,
            EntityType::Geometry => LibraryKind::Geometries,
            EntityType::Controller => LibraryKind::Controllers,
            EntityType::Animation => LibraryKind::Animations,
            EntityType::AnimationClip => LibraryKind::AnimationClips,
            EntityType::PhysicsMaterial => LibraryKind::PhysicsMaterials,
            EntityType::PhysicsModel => LibraryKind::PhysicsModels,
            EntityType::PhysicsScene => LibraryKind::PhysicsScenes,
            EntityType::SceneNode => LibraryKind::Nodes,
        }
    }

    pub fn element_name(self) -> &'static str {
        match self {
            LibraryKind::Images => "library_images",
            LibraryKind::Effects => "library_effects",
            LibraryKind::Materials => "library_materials",
            LibraryKind::Cameras => "library_cameras",
            LibraryKind::Lights => "library_lights",
            LibraryKind::Geometries => "library_geometries",
            LibraryKind::Controllers => "library_controllers",
            LibraryKind::Animations => "library_animations",
            LibraryKind::AnimationClips => "library_animation_clips",
            LibraryKind::PhysicsMaterials => "library_physics_materials",
            LibraryKind::PhysicsModels => "library_physics_models",
            LibraryKind::PhysicsScenes => "library_physics_scenes",
            LibraryKind::Nodes => "library_nodes",
            LibraryKind::VisualScenes => "library_visual_scenes",
        }
    }

    /// Element name of one entry of the library.
    pub fn entity_element(self) -> &'static str {
        match self {
            LibraryKind::Images => "image",
            LibraryKind::Effects => "effect",
            LibraryKind::Materials => "material",
            LibraryKind::Cameras => "camera",
            LibraryKind::Lights => "light",
            LibraryKind::Geometries => "geometry",
            LibraryKind::Controllers => "controller",
            LibraryKind::Animations => "animation",
            LibraryKind::AnimationClips => "animation_clip",
            LibraryKind::PhysicsMaterials => "physics_material",
            LibraryKind::PhysicsModels => "physics_model",
            LibraryKind::PhysicsScenes => "physics_scene",
            LibraryKind::Nodes => "node",
            LibraryKind::VisualScenes => "visual_scene",
        }
    }
}

/// A group of value slots an animation may address as `id/sid`.
#[derive(Clone, Debug)]
pub struct Animatable {
    pub sid: String,
    pub slots: Vec<SlotKey>,
    pub qualifiers: Vec<String>,
}

impl Animatable {
    pub fn scalar(sid: &str, slot: SlotKey) -> Animatable {
        Animatable {
            sid: sid.to_string(),
            slots: vec![slot],
            qualifiers: Vec::new(),
        }
    }

    pub fn vector(sid: &str, slots: &[SlotKey], qualifiers: &[&str]) -> Animatable {
        Animatable {
            sid: sid.to_string(),
            slots: slots.to_vec(),
            qualifiers: qualifiers.iter().map(|q| q.to_string()).collect(),
        }
    }
}

/// Content of an entity that loads and writes itself without help from the
/// document. The document writes the enclosing element's `id` and `name`.
pub trait EntityContent {
    /// Animatable fields, registered in the animated value table.
    fn animatables(&self) -> Vec<Animatable> {
        Vec::new()
    }

    /// Read the content of `element`, the entity's own element.
    fn load_from_node(&mut self, element: &Element, slots: &mut ValueSlots) -> bool;

    /// Append the content to `element`, the entity's own element.
    fn write_to_node(&self, element: &mut Element, slots: &ValueSlots);
}

#[derive(Clone, Debug)]
pub enum EntityBody {
    Animation(Animation),
    AnimationClip(AnimationClip),
    Camera(Camera),
    Controller(Controller),
    Effect(Effect),
    Geometry(Geometry),
    Image(Image),
    Light(Light),
    Material(Material),
    PhysicsMaterial(PhysicsMaterial),
    PhysicsModel(PhysicsModel),
    PhysicsScene(PhysicsScene),
    SceneNode(SceneNode),
}

impl EntityBody {
    pub fn new(entity_type: EntityType, slots: &mut ValueSlots) -> EntityBody {
        match entity_type {
            EntityType::Animation => EntityBody::Animation(Animation::default()),
            EntityType::AnimationClip => EntityBody::AnimationClip(AnimationClip::default()),
            EntityType::Camera => EntityBody::Camera(Camera::new(slots)),
            EntityType::Controller => EntityBody::Controller(Controller::default()),
            EntityType::Effect => EntityBody::Effect(Effect::new(slots)),
            EntityType::Geometry => EntityBody::Geometry(Geometry::default()),
            EntityType::Image => EntityBody::Image(Image::default()),
            EntityType::Light => EntityBody::Light(Light::new(slots)),
            EntityType::Material => EntityBody::Material(Material::default()),
            EntityType::PhysicsMaterial => EntityBody::PhysicsMaterial(PhysicsMaterial::default()),
            EntityType::PhysicsModel => EntityBody::PhysicsModel(PhysicsModel::default()),
            EntityType::PhysicsScene => EntityBody::PhysicsScene(PhysicsScene::default()),
            EntityType::SceneNode => EntityBody::SceneNode(SceneNode::default()),
        }
    }

    /// The body as self-contained content, when it is one.
    pub fn content(&self) -> Option<&dyn EntityContent> {
        match self {
            EntityBody::Camera(c) => Some(c),
            EntityBody::Controller(c) => Some(c),
            EntityBody::Effect(e) => Some(e),
            EntityBody::Geometry(g) => Some(g),
            EntityBody::Image(i) => Some(i),
            EntityBody::Light(l) => Some(l),
            EntityBody::PhysicsMaterial(m) => Some(m),
            EntityBody::PhysicsModel(m) => Some(m),
            _ => None,
        }
    }

    pub fn content_mut(&mut self) -> Option<&mut dyn EntityContent> {
        match self {
            EntityBody::Camera(c) => Some(c),
            EntityBody::Controller(c) => Some(c),
            EntityBody::Effect(e) => Some(e),
            EntityBody::Geometry(g) => Some(g),
            EntityBody::Image(i) => Some(i),
            EntityBody::Light(l) => Some(l),
            EntityBody::PhysicsMaterial(m) => Some(m),
            EntityBody::PhysicsModel(m) => Some(m),
            _ => None,
        }
    }

    /// Every value slot the body owns, animatable or not.
    pub(crate) fn slots(&self) -> Vec<SlotKey> {
        match self {
            EntityBody::SceneNode(node) => node
                .transforms
                .iter()
                .flat_map(|t| t.slots.iter().copied())
                .collect(),
            other => other
                .content()
                .map(|c| c.animatables().into_iter().flat_map(|a| a.slots).collect())
                .unwrap_or_default(),
        }
    }
}

macro_rules! body_accessors {
    ($($get:ident, $get_mut:ident => $variant:ident($ty:ty);)*) => {
        $(
            pub fn $get(&self) -> Option<&$ty> {
                match &self.body {
                    EntityBody::$variant(b) => Some(b),
                    _ => None,
                }
            }

            pub fn $get_mut(&mut self) -> Option<&mut $ty> {
                match &mut self.body {
                    EntityBody::$variant(b) => Some(b),
                    _ => None,
                }
            }
        )*
    };
}

/// A named, possibly identified document object.
#[derive(Clone, Debug)]
pub struct Entity {
    pub(crate) entity_type: EntityType,
    pub(crate) library: Option<LibraryKind>,
    pub name: String,
    pub note: String,
    pub asset: Option<Asset>,
    pub(crate) body: EntityBody,
}

impl Entity {
    pub(crate) fn new(entity_type: EntityType, library: Option<LibraryKind>, slots: &mut ValueSlots) -> Entity {
        Entity {
            entity_type,
            library,
            name: String::new(),
            note: String::new(),
            asset: None,
            body: EntityBody::new(entity_type, slots),
        }
    }

    pub fn entity_type(&self) -> EntityType {
        self.entity_type
    }

    /// The library owning this entity. `None` for scene nodes owned by their
    /// parents.
    pub fn library(&self) -> Option<LibraryKind> {
        self.library
    }

    pub fn body(&self) -> &EntityBody {
        &self.body
    }

    pub fn body_mut(&mut self) -> &mut EntityBody {
        &mut self.body
    }

    body_accessors! {
        animation, animation_mut => Animation(Animation);
        animation_clip, animation_clip_mut => AnimationClip(AnimationClip);
        camera, camera_mut => Camera(Camera);
        controller, controller_mut => Controller(Controller);
        effect, effect_mut => Effect(Effect);
        geometry, geometry_mut => Geometry(Geometry);
        image, image_mut => Image(Image);
        light, light_mut => Light(Light);
        material, material_mut => Material(Material);
        physics_material, physics_material_mut => PhysicsMaterial(PhysicsMaterial);
        physics_model, physics_model_mut => PhysicsModel(PhysicsModel);
        physics_scene, physics_scene_mut => PhysicsScene(PhysicsScene);
        scene_node, scene_node_mut => SceneNode(SceneNode);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_kinds_are_consistent() {
        for (i, kind) in LibraryKind::ALL.iter().enumerate() {
            assert_eq!(kind.index(), i);
            if *kind != LibraryKind::VisualScenes {
                assert_eq!(LibraryKind::for_type(kind.entity_type()), *kind);
            }
        }
    }

    #[test]
    fn test_body_matches_type() {
        let mut slots = ValueSlots::new();
        let camera = Entity::new(EntityType::Camera, Some(LibraryKind::Cameras), &mut slots);
        assert!(camera.camera().is_some());
        assert!(camera.light().is_none());
        assert_eq!(camera.body().slots().len(), 5);
        assert_eq!(slots.len(), 5);

        let node = Entity::new(EntityType::SceneNode, None, &mut slots);
        assert!(node.scene_node().is_some());
        assert!(node.body().content().is_none());
    }
}
