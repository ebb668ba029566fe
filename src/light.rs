use log::warn;
use xml::Element;

use crate::animated::{SlotKey, ValueSlots, RGB};
use crate::entity::{Animatable, EntityContent};
use crate::utils::{
    child_elements, child_named, get_array_content, get_float, join_values, new_element, push_child,
    set_attribute, set_text,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LightKind {
    Ambient,
    Directional,
    Point,
    Spot,
}

impl LightKind {
    pub fn element_name(self) -> &'static str {
        match self {
            LightKind::Ambient => "ambient",
            LightKind::Directional => "directional",
            LightKind::Point => "point",
            LightKind::Spot => "spot",
        }
    }

    fn from_element_name(name: &str) -> Option<LightKind> {
        match name {
            "ambient" => Some(LightKind::Ambient),
            "directional" => Some(LightKind::Directional),
            "point" => Some(LightKind::Point),
            "spot" => Some(LightKind::Spot),
            _ => None,
        }
    }

    fn has_attenuation(self) -> bool {
        matches!(self, LightKind::Point | LightKind::Spot)
    }
}

/// The `<light>` entity.
#[derive(Clone, Debug)]
pub struct Light {
    pub kind: LightKind,
    pub(crate) color: [SlotKey; 3],
    pub(crate) constant_attenuation: SlotKey,
    pub(crate) linear_attenuation: SlotKey,
    pub(crate) quadratic_attenuation: SlotKey,
    pub(crate) falloff_angle: SlotKey,
    pub(crate) falloff_exponent: SlotKey,
}

impl Light {
    pub fn new(slots: &mut ValueSlots) -> Light {
        Light {
            kind: LightKind::Point,
            color: [slots.alloc(1.0), slots.alloc(1.0), slots.alloc(1.0)],
            constant_attenuation: slots.alloc(1.0),
            linear_attenuation: slots.alloc(0.0),
            quadratic_attenuation: slots.alloc(0.0),
            falloff_angle: slots.alloc(180.0),
            falloff_exponent: slots.alloc(0.0),
        }
    }

    pub fn color(&self) -> [SlotKey; 3] {
        self.color
    }

    pub fn constant_attenuation(&self) -> SlotKey {
        self.constant_attenuation
    }

    pub fn linear_attenuation(&self) -> SlotKey {
        self.linear_attenuation
    }

    pub fn quadratic_attenuation(&self) -> SlotKey {
        self.quadratic_attenuation
    }

    pub fn falloff_angle(&self) -> SlotKey {
        self.falloff_angle
    }

    pub fn falloff_exponent(&self) -> SlotKey {
        self.falloff_exponent
    }
}

impl EntityContent for Light {
    fn animatables(&self) -> Vec<Animatable> {
        vec![
            Animatable::vector("color", &self.color, RGB),
            Animatable::scalar("constant_attenuation", self.constant_attenuation),
            Animatable::scalar("linear_attenuation", self.linear_attenuation),
            Animatable::scalar("quadratic_attenuation", self.quadratic_attenuation),
            Animatable::scalar("falloff_angle", self.falloff_angle),
            Animatable::scalar("falloff_exponent", self.falloff_exponent),
        ]
    }

    fn load_from_node(&mut self, element: &Element, slots: &mut ValueSlots) -> bool {
        let technique = match child_named(element, "technique_common") {
            Some(t) => t,
            None => {
                warn!("light without <technique_common>");
                return false;
            }
        };
        let (kind, kind_element) = match child_elements(technique)
            .find_map(|e| LightKind::from_element_name(&e.name).map(|k| (k, e)))
        {
            Some(found) => found,
            None => {
                warn!("light without a known light type");
                return false;
            }
        };
        self.kind = kind;

        if let Some(color) = child_named(kind_element, "color").and_then(get_array_content::<f32>) {
            if color.len() >= 3 {
                slots.write(&self.color, &color[..3]);
            }
        }
        let scalars = [
            ("constant_attenuation", self.constant_attenuation),
            ("linear_attenuation", self.linear_attenuation),
            ("quadratic_attenuation", self.quadratic_attenuation),
            ("falloff_angle", self.falloff_angle),
            ("falloff_exponent", self.falloff_exponent),
        ];
        for (name, slot) in scalars.iter() {
            if let Some(value) = child_named(kind_element, name).and_then(get_float) {
                slots.set(*slot, value);
            }
        }
        true
    }

    fn write_to_node(&self, element: &mut Element, slots: &ValueSlots) {
        let mut kind_element = new_element(self.kind.element_name());
        let mut color = new_element("color");
        set_attribute(&mut color, "sid", "color");
        set_text(&mut color, join_values(&slots.read(&self.color)));
        push_child(&mut kind_element, color);

        let mut scalars = Vec::new();
        if self.kind.has_attenuation() {
            scalars.push(("constant_attenuation", self.constant_attenuation));
            scalars.push(("linear_attenuation", self.linear_attenuation));
            scalars.push(("quadratic_attenuation", self.quadratic_attenuation));
        }
        if self.kind == LightKind::Spot {
            scalars.push(("falloff_angle", self.falloff_angle));
            scalars.push(("falloff_exponent", self.falloff_exponent));
        }
        for (name, slot) in scalars {
            let mut e = new_element(name);
            set_attribute(&mut e, "sid", name);
            set_text(&mut e, slots.value(slot).to_string());
            push_child(&mut kind_element, e);
        }

        let mut technique = new_element("technique_common");
        push_child(&mut technique, kind_element);
        push_child(element, technique);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_spot() {
        let mut slots = ValueSlots::new();
        let mut light = Light::new(&mut slots);
        let element: Element = "<light><technique_common><spot>\
            <color>0.5 0.25 1</color><falloff_angle>30</falloff_angle>\
            </spot></technique_common></light>"
            .parse()
            .unwrap();
        assert!(light.load_from_node(&element, &mut slots));
        assert_eq!(light.kind, LightKind::Spot);
        assert_eq!(slots.read(&light.color()), vec![0.5, 0.25, 1.0]);
        assert_eq!(slots.value(light.falloff_angle()), 30.0);
        assert_eq!(slots.value(light.constant_attenuation()), 1.0);
    }

    #[test]
    fn test_directional_writes_no_attenuation() {
        let mut slots = ValueSlots::new();
        let mut light = Light::new(&mut slots);
        light.kind = LightKind::Directional;
        let mut element = new_element("light");
        light.write_to_node(&mut element, &slots);
        let directional = child_named(&element, "technique_common")
            .and_then(|t| child_named(t, "directional"))
            .unwrap();
        assert!(child_named(directional, "color").is_some());
        assert!(child_named(directional, "constant_attenuation").is_none());
    }

    #[test]
    fn test_animatables_cover_all_slots() {
        let mut slots = ValueSlots::new();
        let light = Light::new(&mut slots);
        let covered: usize = light.animatables().iter().map(|a| a.slots.len()).sum();
        assert_eq!(covered, slots.len());
    }
}
