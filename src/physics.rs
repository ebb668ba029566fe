//! Physics materials, models and scenes.

use log::warn;
use xml::Element;

use crate::animated::ValueSlots;
use crate::entity::EntityContent;
use crate::tracking::InstanceKey;
use crate::utils::{
    child_named, children_named, get_float, get_text, new_element, push_child, push_text_child,
    set_attribute,
};

/// The `<physics_material>` entity.
#[derive(Clone, Debug, PartialEq)]
pub struct PhysicsMaterial {
    pub static_friction: f32,
    pub dynamic_friction: f32,
    pub restitution: f32,
}

impl Default for PhysicsMaterial {
    fn default() -> PhysicsMaterial {
        PhysicsMaterial {
            static_friction: 0.0,
            dynamic_friction: 0.0,
            restitution: 0.0,
        }
    }
}

impl EntityContent for PhysicsMaterial {
    fn load_from_node(&mut self, element: &Element, _slots: &mut ValueSlots) -> bool {
        let technique = match child_named(element, "technique_common") {
            Some(t) => t,
            None => {
                warn!("physics material without <technique_common>");
                return false;
            }
        };
        let read = |name: &str| child_named(technique, name).and_then(get_float).unwrap_or(0.0);
        self.static_friction = read("static_friction");
        self.dynamic_friction = read("dynamic_friction");
        self.restitution = read("restitution");
        true
    }

    fn write_to_node(&self, element: &mut Element, _slots: &ValueSlots) {
        let mut technique = new_element("technique_common");
        push_text_child(&mut technique, "dynamic_friction", self.dynamic_friction.to_string());
        push_text_child(&mut technique, "restitution", self.restitution.to_string());
        push_text_child(&mut technique, "static_friction", self.static_friction.to_string());
        push_child(element, technique);
    }
}

/// A `<rigid_body>` of a physics model.
#[derive(Clone, Debug, PartialEq)]
pub struct RigidBody {
    pub sid: String,
    pub dynamic: bool,
    pub mass: f32,
}

/// The `<physics_model>` entity.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PhysicsModel {
    pub rigid_bodies: Vec<RigidBody>,
}

impl PhysicsModel {
    pub fn total_mass(&self) -> f32 {
        self.rigid_bodies.iter().filter(|b| b.dynamic).map(|b| b.mass).sum()
    }
}

impl EntityContent for PhysicsModel {
    fn load_from_node(&mut self, element: &Element, _slots: &mut ValueSlots) -> bool {
        self.rigid_bodies.clear();
        for body in children_named(element, "rigid_body") {
            let sid = match body.get_attribute("sid", None) {
                Some(sid) => sid.to_string(),
                None => {
                    warn!("rigid body without sid");
                    return false;
                }
            };
            let technique = child_named(body, "technique_common");
            let dynamic = technique
                .and_then(|t| child_named(t, "dynamic"))
                .map_or(true, |d| get_text(d) != "false");
            let mass = technique
                .and_then(|t| child_named(t, "mass"))
                .and_then(get_float)
                .unwrap_or(1.0);
            self.rigid_bodies.push(RigidBody { sid, dynamic, mass });
        }
        true
    }

    fn write_to_node(&self, element: &mut Element, _slots: &ValueSlots) {
        for body in &self.rigid_bodies {
            let mut technique = new_element("technique_common");
            push_text_child(&mut technique, "dynamic", body.dynamic.to_string());
            push_text_child(&mut technique, "mass", body.mass.to_string());
            let mut rigid_body = new_element("rigid_body");
            set_attribute(&mut rigid_body, "sid", body.sid.as_str());
            push_child(&mut rigid_body, technique);
            push_child(element, rigid_body);
        }
    }
}

/// The `<physics_scene>` entity. Its models are reached through owned
/// instances.
#[derive(Clone, Debug)]
pub struct PhysicsScene {
    pub gravity: [f32; 3],
    pub timestep: f32,
    pub(crate) models: Vec<InstanceKey>,
}

impl Default for PhysicsScene {
    fn default() -> PhysicsScene {
        PhysicsScene {
            gravity: [0.0, -9.8, 0.0],
            timestep: 1.0 / 60.0,
            models: Vec::new(),
        }
    }
}

impl PhysicsScene {
    pub fn models(&self) -> &[InstanceKey] {
        &self.models
    }
}
