//! Images, effects and materials.

use log::warn;
use xml::Element;

use crate::animated::{SlotKey, ValueSlots, RGBA};
use crate::entity::{Animatable, EntityContent};
use crate::tracking::InstanceKey;
use crate::utils::{
    child_elements, child_named, get_array_content, get_float, get_text, join_values, new_element,
    push_child, push_text_child, set_attribute, set_text,
};

/// The `<image>` entity.
#[derive(Clone, Debug, Default)]
pub struct Image {
    pub init_from: String,
}

impl EntityContent for Image {
    fn load_from_node(&mut self, element: &Element, _slots: &mut ValueSlots) -> bool {
        match child_named(element, "init_from") {
            Some(init_from) => {
                self.init_from = get_text(init_from);
                true
            }
            None => {
                warn!("image without <init_from>");
                false
            }
        }
    }

    fn write_to_node(&self, element: &mut Element, _slots: &ValueSlots) {
        push_text_child(element, "init_from", self.init_from.as_str());
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShadingModel {
    Constant,
    Lambert,
    Phong,
    Blinn,
}

impl ShadingModel {
    pub fn element_name(self) -> &'static str {
        match self {
            ShadingModel::Constant => "constant",
            ShadingModel::Lambert => "lambert",
            ShadingModel::Phong => "phong",
            ShadingModel::Blinn => "blinn",
        }
    }

    fn from_element_name(name: &str) -> Option<ShadingModel> {
        match name {
            "constant" => Some(ShadingModel::Constant),
            "lambert" => Some(ShadingModel::Lambert),
            "phong" => Some(ShadingModel::Phong),
            "blinn" => Some(ShadingModel::Blinn),
            _ => None,
        }
    }
}

/// The `<effect>` entity, reduced to its common profile.
#[derive(Clone, Debug)]
pub struct Effect {
    pub shading: ShadingModel,
    pub(crate) emission: [SlotKey; 4],
    pub(crate) ambient: [SlotKey; 4],
    pub(crate) diffuse: [SlotKey; 4],
    pub(crate) specular: [SlotKey; 4],
    pub(crate) shininess: SlotKey,
    pub(crate) transparency: SlotKey,
}

fn alloc_color(slots: &mut ValueSlots, value: [f32; 4]) -> [SlotKey; 4] {
    [
        slots.alloc(value[0]),
        slots.alloc(value[1]),
        slots.alloc(value[2]),
        slots.alloc(value[3]),
    ]
}

impl Effect {
    pub fn new(slots: &mut ValueSlots) -> Effect {
        Effect {
            shading: ShadingModel::Lambert,
            emission: alloc_color(slots, [0.0, 0.0, 0.0, 1.0]),
            ambient: alloc_color(slots, [0.0, 0.0, 0.0, 1.0]),
            diffuse: alloc_color(slots, [0.8, 0.8, 0.8, 1.0]),
            specular: alloc_color(slots, [0.0, 0.0, 0.0, 1.0]),
            shininess: slots.alloc(20.0),
            transparency: slots.alloc(1.0),
        }
    }

    pub fn emission(&self) -> [SlotKey; 4] {
        self.emission
    }

    pub fn ambient(&self) -> [SlotKey; 4] {
        self.ambient
    }

    pub fn diffuse(&self) -> [SlotKey; 4] {
        self.diffuse
    }

    pub fn specular(&self) -> [SlotKey; 4] {
        self.specular
    }

    pub fn shininess(&self) -> SlotKey {
        self.shininess
    }

    pub fn transparency(&self) -> SlotKey {
        self.transparency
    }

    fn colors(&self) -> [(&'static str, [SlotKey; 4]); 4] {
        [
            ("emission", self.emission),
            ("ambient", self.ambient),
            ("diffuse", self.diffuse),
            ("specular", self.specular),
        ]
    }

    fn scalars(&self) -> [(&'static str, SlotKey); 2] {
        [("shininess", self.shininess), ("transparency", self.transparency)]
    }
}

impl EntityContent for Effect {
    fn animatables(&self) -> Vec<Animatable> {
        let mut animatables: Vec<Animatable> = self
            .colors()
            .iter()
            .map(|(sid, slots)| Animatable::vector(sid, slots, RGBA))
            .collect();
        animatables.extend(self.scalars().iter().map(|&(sid, slot)| Animatable::scalar(sid, slot)));
        animatables
    }

    fn load_from_node(&mut self, element: &Element, slots: &mut ValueSlots) -> bool {
        let technique = match child_named(element, "profile_COMMON").and_then(|p| child_named(p, "technique")) {
            Some(t) => t,
            None => {
                warn!("effect without <profile_COMMON><technique>");
                return false;
            }
        };
        let (shading, shader) = match child_elements(technique)
            .find_map(|e| ShadingModel::from_element_name(&e.name).map(|s| (s, e)))
        {
            Some(found) => found,
            None => {
                warn!("effect without a known shading model");
                return false;
            }
        };
        self.shading = shading;

        for (name, color_slots) in self.colors().iter() {
            let color = child_named(shader, name)
                .and_then(|p| child_named(p, "color"))
                .and_then(get_array_content::<f32>);
            if let Some(color) = color {
                if color.len() >= 4 {
                    slots.write(color_slots, &color[..4]);
                }
            }
        }
        for (name, slot) in self.scalars().iter() {
            let value = child_named(shader, name)
                .and_then(|p| child_named(p, "float"))
                .and_then(get_float);
            if let Some(value) = value {
                slots.set(*slot, value);
            }
        }
        true
    }

    fn write_to_node(&self, element: &mut Element, slots: &ValueSlots) {
        let mut shader = new_element(self.shading.element_name());
        for (name, color_slots) in self.colors().iter() {
            if self.shading == ShadingModel::Constant && *name != "emission" {
                continue;
            }
            if self.shading != ShadingModel::Phong && self.shading != ShadingModel::Blinn && *name == "specular" {
                continue;
            }
            let mut color = new_element("color");
            set_attribute(&mut color, "sid", *name);
            set_text(&mut color, join_values(&slots.read(color_slots)));
            let mut param = new_element(name);
            push_child(&mut param, color);
            push_child(&mut shader, param);
        }
        for (name, slot) in self.scalars().iter() {
            if *name == "shininess" && self.shading != ShadingModel::Phong && self.shading != ShadingModel::Blinn {
                continue;
            }
            let mut float = new_element("float");
            set_attribute(&mut float, "sid", *name);
            set_text(&mut float, slots.value(*slot).to_string());
            let mut param = new_element(name);
            push_child(&mut param, float);
            push_child(&mut shader, param);
        }

        let mut technique = new_element("technique");
        set_attribute(&mut technique, "sid", "common");
        push_child(&mut technique, shader);
        let mut profile = new_element("profile_COMMON");
        push_child(&mut profile, technique);
        push_child(element, profile);
    }
}

/// The `<material>` entity. Its effect is reached through an owned
/// instance, so releasing the effect unbinds and releases that instance.
#[derive(Clone, Debug, Default)]
pub struct Material {
    pub(crate) effect: Option<InstanceKey>,
}

impl Material {
    pub fn effect_instance(&self) -> Option<InstanceKey> {
        self.effect
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_phong() {
        let mut slots = ValueSlots::new();
        let mut effect = Effect::new(&mut slots);
        let element: Element = "<effect><profile_COMMON><technique sid=\"common\"><phong>\
            <diffuse><color>1 0 0 1</color></diffuse>\
            <shininess><float>50</float></shininess>\
            </phong></technique></profile_COMMON></effect>"
            .parse()
            .unwrap();
        assert!(effect.load_from_node(&element, &mut slots));
        assert_eq!(effect.shading, ShadingModel::Phong);
        assert_eq!(slots.read(&effect.diffuse()), vec![1.0, 0.0, 0.0, 1.0]);
        assert_eq!(slots.value(effect.shininess()), 50.0);
    }

    #[test]
    fn test_lambert_skips_specular() {
        let mut slots = ValueSlots::new();
        let effect = Effect::new(&mut slots);
        let mut element = new_element("effect");
        effect.write_to_node(&mut element, &slots);
        let lambert = child_named(&element, "profile_COMMON")
            .and_then(|p| child_named(p, "technique"))
            .and_then(|t| child_named(t, "lambert"))
            .unwrap();
        assert!(child_named(lambert, "diffuse").is_some());
        assert!(child_named(lambert, "specular").is_none());
        assert!(child_named(lambert, "shininess").is_none());
    }

    #[test]
    fn test_image() {
        let mut slots = ValueSlots::new();
        let mut image = Image::default();
        let element: Element = "<image><init_from>tex/wood.png</init_from></image>".parse().unwrap();
        assert!(image.load_from_node(&element, &mut slots));
        assert_eq!(image.init_from, "tex/wood.png");
    }
}
