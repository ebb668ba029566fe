//! An editable COLLADA document model.
//!
//! A [`Document`] owns its entities and instances in one arena. Objects
//! refer to each other by key, and releasing an object releases everything
//! that depended on it alone. Instances may point into other documents
//! through external references, which load their target lazily.

extern crate xml;

pub mod animated;
pub mod animation;
pub mod asset;
pub mod camera;
pub mod controller;
pub mod document;
pub mod entity;
pub mod error;
pub mod external;
pub mod file_manager;
pub mod geometry;
pub mod id_registry;
pub mod instance;
pub mod light;
pub mod material;
pub mod physics;
mod reader;
pub mod scene;
pub mod tracking;
pub mod transform;
pub mod utils;
pub mod writer;

pub use animated::{AnimatedKey, AnimatedValue, AnimatedValueTable, SlotKey, ValueSlots};
pub use animation::{Animation, AnimationChannel, AnimationClip, AnimationCurve, CurveId, Interpolation, Keyframe};
pub use asset::{Asset, UpAxis};
pub use camera::{Camera, Projection};
pub use controller::{Controller, JointWeight, Skin};
pub use document::{Document, DocumentId, DocumentRef, Layer};
pub use entity::{Animatable, Entity, EntityBody, EntityContent, EntityType, LibraryKind};
pub use error::{Error, Result};
pub use external::{ExternalReference, ExternalReferenceKey, PlaceHolder, PlaceHolderKey};
pub use file_manager::{FileManager, FsFileManager, MemoryFileManager};
pub use geometry::Geometry;
pub use instance::{EntityInstance, EntityTarget, InstanceOwner, MaterialBinding};
pub use light::{Light, LightKind};
pub use material::{Effect, Image, Material, ShadingModel};
pub use physics::{PhysicsMaterial, PhysicsModel, PhysicsScene, RigidBody};
pub use scene::SceneNode;
pub use tracking::{EntityKey, InstanceKey, ObjectFlags, ObjectKey, Tracked};
pub use transform::{Transform, TransformKind};
