use log::warn;
use xml::Element;

use crate::animated::{SlotKey, ValueSlots};
use crate::entity::{Animatable, EntityContent};
use crate::utils::{child_named, get_float, new_element, push_child, set_attribute, set_text};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Projection {
    Perspective,
    Orthographic,
}

/// The `<camera>` entity.
///
/// `horizontal` and `vertical` hold the field of view in degrees for a
/// perspective camera and the magnification for an orthographic one.
#[derive(Clone, Debug)]
pub struct Camera {
    pub projection: Projection,
    pub has_horizontal: bool,
    pub has_vertical: bool,
    pub has_aspect_ratio: bool,
    pub(crate) horizontal: SlotKey,
    pub(crate) vertical: SlotKey,
    pub(crate) aspect_ratio: SlotKey,
    pub(crate) znear: SlotKey,
    pub(crate) zfar: SlotKey,
}

impl Camera {
    pub fn new(slots: &mut ValueSlots) -> Camera {
        Camera {
            projection: Projection::Perspective,
            has_horizontal: false,
            has_vertical: true,
            has_aspect_ratio: true,
            horizontal: slots.alloc(60.0),
            vertical: slots.alloc(60.0),
            aspect_ratio: slots.alloc(1.0),
            znear: slots.alloc(1.0),
            zfar: slots.alloc(1000.0),
        }
    }

    pub fn horizontal(&self) -> SlotKey {
        self.horizontal
    }

    pub fn vertical(&self) -> SlotKey {
        self.vertical
    }

    pub fn aspect_ratio(&self) -> SlotKey {
        self.aspect_ratio
    }

    pub fn znear(&self) -> SlotKey {
        self.znear
    }

    pub fn zfar(&self) -> SlotKey {
        self.zfar
    }

    fn names(&self) -> (&'static str, &'static str, &'static str) {
        match self.projection {
            Projection::Perspective => ("perspective", "xfov", "yfov"),
            Projection::Orthographic => ("orthographic", "xmag", "ymag"),
        }
    }
}

impl EntityContent for Camera {
    fn animatables(&self) -> Vec<Animatable> {
        let (_, h, v) = self.names();
        vec![
            Animatable::scalar(h, self.horizontal),
            Animatable::scalar(v, self.vertical),
            Animatable::scalar("aspect_ratio", self.aspect_ratio),
            Animatable::scalar("znear", self.znear),
            Animatable::scalar("zfar", self.zfar),
        ]
    }

    fn load_from_node(&mut self, element: &Element, slots: &mut ValueSlots) -> bool {
        let technique = match child_named(element, "optics").and_then(|o| child_named(o, "technique_common")) {
            Some(t) => t,
            None => {
                warn!("camera without <optics><technique_common>");
                return false;
            }
        };
        let projection = if let Some(p) = child_named(technique, "perspective") {
            self.projection = Projection::Perspective;
            p
        } else if let Some(o) = child_named(technique, "orthographic") {
            self.projection = Projection::Orthographic;
            o
        } else {
            warn!("camera without a projection");
            return false;
        };

        let (_, h, v) = self.names();
        let mut read = |name: &str, slot: SlotKey| -> bool {
            match child_named(projection, name).and_then(get_float) {
                Some(value) => slots.set(slot, value),
                None => false,
            }
        };
        self.has_horizontal = read(h, self.horizontal);
        self.has_vertical = read(v, self.vertical);
        self.has_aspect_ratio = read("aspect_ratio", self.aspect_ratio);
        read("znear", self.znear);
        read("zfar", self.zfar);
        true
    }

    fn write_to_node(&self, element: &mut Element, slots: &ValueSlots) {
        let (projection_name, h, v) = self.names();
        let mut projection = new_element(projection_name);
        let mut write = |name: &str, slot: SlotKey| {
            let mut e = new_element(name);
            set_attribute(&mut e, "sid", name);
            set_text(&mut e, slots.value(slot).to_string());
            push_child(&mut projection, e);
        };
        if self.has_horizontal || !self.has_vertical {
            write(h, self.horizontal);
        }
        if self.has_vertical {
            write(v, self.vertical);
        }
        if self.has_aspect_ratio {
            write("aspect_ratio", self.aspect_ratio);
        }
        write("znear", self.znear);
        write("zfar", self.zfar);

        let mut technique = new_element("technique_common");
        push_child(&mut technique, projection);
        let mut optics = new_element("optics");
        push_child(&mut optics, technique);
        push_child(element, optics);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_orthographic() {
        let mut slots = ValueSlots::new();
        let mut camera = Camera::new(&mut slots);
        let element: Element = "<camera><optics><technique_common><orthographic>\
            <xmag>2</xmag><znear>0.5</znear><zfar>50</zfar>\
            </orthographic></technique_common></optics></camera>"
            .parse()
            .unwrap();
        assert!(camera.load_from_node(&element, &mut slots));
        assert_eq!(camera.projection, Projection::Orthographic);
        assert!(camera.has_horizontal);
        assert!(!camera.has_vertical);
        assert_eq!(slots.value(camera.horizontal()), 2.0);
        assert_eq!(slots.value(camera.znear()), 0.5);
        assert_eq!(camera.animatables()[0].sid, "xmag");
    }

    #[test]
    fn test_write_perspective() {
        let mut slots = ValueSlots::new();
        let camera = Camera::new(&mut slots);
        slots.set(camera.vertical(), 45.0);
        let mut element = new_element("camera");
        camera.write_to_node(&mut element, &slots);

        let perspective = child_named(&element, "optics")
            .and_then(|o| child_named(o, "technique_common"))
            .and_then(|t| child_named(t, "perspective"))
            .unwrap();
        assert!(child_named(perspective, "xfov").is_none());
        assert_eq!(child_named(perspective, "yfov").and_then(get_float), Some(45.0));
    }

    #[test]
    fn test_missing_projection_fails() {
        let mut slots = ValueSlots::new();
        let mut camera = Camera::new(&mut slots);
        let element: Element = "<camera><optics><technique_common/></optics></camera>".parse().unwrap();
        assert!(!camera.load_from_node(&element, &mut slots));
    }
}
