//! Loading a document from COLLADA text.
//!
//! Loading runs in two passes. The first creates every entity of every
//! library, with instances left unbound and their urls noted. The second
//! resolves those urls, once every local id is known, and then binds the
//! animation channels to the values they target.

use std::path::Path;

use log::{debug, error, warn};
use xml::Element;

use crate::animation::{AnimationChannel, AnimationCurve, CurveId, Interpolation, Keyframe};
use crate::asset::Asset;
use crate::document::{Document, DocumentObject, ObjectKind, EXTRA_PROFILE};
use crate::entity::{Entity, EntityType, LibraryKind};
use crate::error::{Error, Result};
use crate::geometry::get_input;
use crate::instance::{InstanceOwner, MaterialBinding};
use crate::tracking::{EntityKey, InstanceKey, ObjectFlags};
use crate::transform::TransformKind;
use crate::utils::{
    child_elements, child_named, children_named, get_accessor_stride, get_array_content,
    get_extra_technique, get_float, get_float_array, get_input_source, get_name_array, get_text,
    has_attribute_with_value, split_url,
};

/// Urls collected by the first pass.
#[derive(Default)]
struct PendingLinks {
    instances: Vec<(InstanceKey, String)>,
    /// `<instance_node>` pointing inside the document: a plain child edge.
    children: Vec<(EntityKey, String)>,
}

fn required_attribute<'a>(element: &'a Element, attribute: &'static str) -> Result<&'a str> {
    element
        .get_attribute(attribute, None)
        .ok_or_else(|| Error::MissingAttribute {
            element: element.name.clone(),
            attribute,
        })
}

impl Document {
    /// Read and load the document at `path`, which becomes its location.
    pub fn load_from_location(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let text = self
            .file_manager()
            .read_to_string(path)
            .map_err(|e| Error::io(path, e))?;
        self.set_location(Some(path.to_path_buf()));
        self.load_from_str(&text)
    }

    pub fn load_from_str(&mut self, text: &str) -> Result<()> {
        let root: Element = text.parse().map_err(|e| Error::Xml(format!("{:?}", e)))?;
        self.load_from_element(&root)
    }

    /// Load the content of a parsed `<COLLADA>` element.
    ///
    /// On error the document holds whatever was loaded before the failure
    /// and should be discarded.
    pub fn load_from_element(&mut self, root: &Element) -> Result<()> {
        if root.name != "COLLADA" {
            error!("not a COLLADA document: <{}>", root.name);
            return Err(Error::NotCollada(root.name.clone()));
        }
        if let Some(asset) = child_named(root, "asset") {
            self.asset = Asset::load_from_node(asset);
        }

        let mut pending = PendingLinks::default();
        for kind in LibraryKind::ALL.iter().copied() {
            for library in children_named(root, kind.element_name()) {
                for element in children_named(library, kind.entity_element()) {
                    self.load_entity(kind, element, &mut pending)?;
                }
            }
        }
        self.resolve_links(pending);

        if let Some(scene) = child_named(root, "scene") {
            self.load_scene(scene)?;
        }
        if let Some(technique) = get_extra_technique(root, EXTRA_PROFILE) {
            self.load_document_extra(technique);
        }

        let unresolved = self.link_animations();
        if unresolved > 0 {
            warn!("{} animation channels target nothing", unresolved);
        }
        self.clear_flags(ObjectFlags::DIRTY | ObjectFlags::NEW_CHILD | ObjectFlags::VALUE_CHANGED);
        debug!("loaded document {} from {:?}", self.id(), self.location());
        Ok(())
    }

    fn load_entity(&mut self, kind: LibraryKind, element: &Element, pending: &mut PendingLinks) -> Result<()> {
        let key = self.add_entity(kind);
        self.load_entity_header(key, element);
        let loaded = match kind.entity_type() {
            EntityType::SceneNode => {
                self.load_node(key, element, pending)?;
                true
            }
            EntityType::Animation => self.load_animation(key, element)?,
            EntityType::AnimationClip => self.load_animation_clip(key, element, pending)?,
            EntityType::Material => {
                for effect in children_named(element, "instance_effect") {
                    self.load_owned_instance(key, EntityType::Effect, effect, pending)?;
                }
                true
            }
            EntityType::PhysicsScene => self.load_physics_scene(key, element, pending)?,
            _ => self.load_content(key, element),
        };
        if !loaded {
            warn!("skipping <{}> {:?}", element.name, element.get_attribute("id", None));
            self.release_entity(key);
        }
        Ok(())
    }

    fn load_entity_header(&mut self, key: EntityKey, element: &Element) {
        if let Some(id) = element.get_attribute("id", None) {
            if let Some(stored) = self.set_dae_id(key, id) {
                if stored != id {
                    warn!("duplicate id '{}' renamed to '{}'", id, stored);
                }
            }
        }
        if let Some(entity) = self.entity_mut(key) {
            if let Some(name) = element.get_attribute("name", None) {
                entity.name = name.to_string();
            }
            entity.asset = child_named(element, "asset").map(Asset::load_from_node);
            if let Some(note) = get_extra_technique(element, EXTRA_PROFILE).and_then(|t| child_named(t, "note")) {
                entity.note = get_text(note);
            }
        }
    }

    /// Let self-contained content read itself, then register what it made
    /// animatable.
    fn load_content(&mut self, key: EntityKey, element: &Element) -> bool {
        let loaded = match self.objects.get_mut(key.0) {
            Some(DocumentObject {
                kind: ObjectKind::Entity(entity),
                ..
            }) => match entity.body.content_mut() {
                Some(content) => content.load_from_node(element, &mut self.values),
                None => false,
            },
            _ => false,
        };
        if loaded {
            self.register_animatables(key);
        }
        loaded
    }

    fn load_node(&mut self, key: EntityKey, element: &Element, pending: &mut PendingLinks) -> Result<()> {
        let is_joint = has_attribute_with_value(element, "type", "JOINT");
        if let Some(node) = self.entity_mut(key).and_then(Entity::scene_node_mut) {
            node.is_joint = is_joint;
        }
        for child in child_elements(element) {
            if let Some(kind) = TransformKind::from_element_name(&child.name) {
                match get_array_content::<f32>(child) {
                    Some(values) => {
                        self.add_transform(key, kind, child.get_attribute("sid", None), &values);
                    }
                    None => warn!("unreadable <{}> in node {:?}", child.name, self.dae_id(key)),
                }
            } else if child.name == "node" {
                if let Some(child_key) = self.add_child_node(key) {
                    self.load_entity_header(child_key, child);
                    self.load_node(child_key, child, pending)?;
                }
            } else if child.name == "instance_node" {
                let url = required_attribute(child, "url")?;
                match split_url(url) {
                    (None, id) => pending.children.push((key, id.to_string())),
                    (Some(_), _) => {
                        let instance = self.insert_instance(EntityType::SceneNode, InstanceOwner::Node(key));
                        pending.instances.push((instance, url.to_string()));
                    }
                }
            } else if let Some(entity_type) = EntityType::from_instance_element(&child.name) {
                let url = required_attribute(child, "url")?;
                let instance = self.insert_instance(entity_type, InstanceOwner::Node(key));
                self.load_instance_details(instance, child);
                pending.instances.push((instance, url.to_string()));
            }
        }
        Ok(())
    }

    fn load_instance_details(&mut self, instance: InstanceKey, element: &Element) {
        let name = element.get_attribute("name", None).map(str::to_string);
        let skeletons: Vec<String> = children_named(element, "skeleton").map(get_text).collect();
        let bindings: Vec<MaterialBinding> = child_named(element, "bind_material")
            .and_then(|b| child_named(b, "technique_common"))
            .map(|t| {
                children_named(t, "instance_material")
                    .filter_map(|m| {
                        Some(MaterialBinding {
                            symbol: m.get_attribute("symbol", None)?.to_string(),
                            target: m.get_attribute("target", None)?.to_string(),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();
        if let Some(i) = self.instance_mut(instance) {
            i.name = name.unwrap_or_default();
            i.skeletons = skeletons;
            i.material_bindings = bindings;
        }
    }

    fn load_owned_instance(&mut self, owner: EntityKey, entity_type: EntityType, element: &Element, pending: &mut PendingLinks) -> Result<()> {
        let url = required_attribute(element, "url")?;
        let instance = self.insert_instance(entity_type, InstanceOwner::Entity(owner));
        self.load_instance_details(instance, element);
        pending.instances.push((instance, url.to_string()));
        Ok(())
    }

    fn load_animation_clip(&mut self, key: EntityKey, element: &Element, pending: &mut PendingLinks) -> Result<bool> {
        let parse = |name: &str| element.get_attribute(name, None).and_then(|v| v.parse::<f32>().ok());
        let start = parse("start").unwrap_or(0.0);
        let end = parse("end");
        if let Some(clip) = self.entity_mut(key).and_then(Entity::animation_clip_mut) {
            clip.start = start;
            clip.end = end.unwrap_or(start);
        }
        for animation in children_named(element, "instance_animation") {
            self.load_owned_instance(key, EntityType::Animation, animation, pending)?;
        }
        Ok(true)
    }

    fn load_physics_scene(&mut self, key: EntityKey, element: &Element, pending: &mut PendingLinks) -> Result<bool> {
        if let Some(technique) = child_named(element, "technique_common") {
            let gravity = child_named(technique, "gravity").and_then(get_array_content::<f32>);
            let timestep = child_named(technique, "time_step").and_then(get_float);
            if let Some(scene) = self.entity_mut(key).and_then(Entity::physics_scene_mut) {
                if let Some(g) = gravity.filter(|g| g.len() == 3) {
                    scene.gravity = [g[0], g[1], g[2]];
                }
                if let Some(t) = timestep {
                    scene.timestep = t;
                }
            }
        }
        for model in children_named(element, "instance_physics_model") {
            self.load_owned_instance(key, EntityType::PhysicsModel, model, pending)?;
        }
        Ok(true)
    }

    fn load_animation(&mut self, key: EntityKey, element: &Element) -> Result<bool> {
        let mut channels = Vec::new();
        self.load_animation_channels(element, &mut channels)?;
        if let Some(animation) = self.entity_mut(key).and_then(Entity::animation_mut) {
            animation.channels = channels;
        }
        Ok(true)
    }

    /// Collect the channels of `element` and of every animation nested in
    /// it.
    fn load_animation_channels(&mut self, element: &Element, channels: &mut Vec<AnimationChannel>) -> Result<()> {
        for channel in children_named(element, "channel") {
            let source = required_attribute(channel, "source")?;
            let target = required_attribute(channel, "target")?;
            let (_, sampler_id) = split_url(source);
            let sampler = children_named(element, "sampler")
                .find(|s| has_attribute_with_value(s, "id", sampler_id))
                .ok_or_else(|| Error::malformed("channel", format!("no sampler '{}'", sampler_id)))?;
            let curves = self.load_sampler(element, sampler)?;
            channels.push(AnimationChannel {
                target: target.to_string(),
                curves,
            });
        }
        for nested in children_named(element, "animation") {
            self.load_animation_channels(nested, channels)?;
        }
        Ok(())
    }

    /// One curve per component of the sampler's output.
    fn load_sampler(&mut self, animation: &Element, sampler: &Element) -> Result<Vec<CurveId>> {
        let floats = |semantic: &str| get_input(sampler, semantic).and_then(|i| get_float_array(animation, i));
        let times = floats("INPUT").ok_or_else(|| Error::malformed("sampler", "unreadable INPUT"))?;
        let values = floats("OUTPUT").ok_or_else(|| Error::malformed("sampler", "unreadable OUTPUT"))?;
        let stride = get_input(sampler, "OUTPUT")
            .and_then(|i| get_input_source(animation, i))
            .map_or(1, get_accessor_stride)
            .max(1);
        if values.len() < times.len() * stride {
            return Err(Error::malformed(
                "sampler",
                format!("{} keys but {} output values", times.len(), values.len()),
            ));
        }
        let interpolations: Vec<Interpolation> = get_input(sampler, "INTERPOLATION")
            .and_then(|i| get_name_array(animation, i))
            .map(|names| names.iter().map(|n| Interpolation::from_name(n)).collect())
            .unwrap_or_default();
        let in_tangents = floats("IN_TANGENT");
        let out_tangents = floats("OUT_TANGENT");
        let tangent = |tangents: &Option<Vec<f32>>, key: usize, component: usize| -> Option<[f32; 2]> {
            let t = tangents.as_ref()?;
            let i = (key * stride + component) * 2;
            Some([*t.get(i)?, *t.get(i + 1)?])
        };

        let mut curves = Vec::with_capacity(stride);
        for component in 0..stride {
            let keys = times
                .iter()
                .enumerate()
                .map(|(k, &time)| {
                    let interpolation = interpolations.get(k).copied().unwrap_or(Interpolation::Linear);
                    let mut key = Keyframe::new(time, values[k * stride + component], interpolation);
                    key.in_tangent = tangent(&in_tangents, k, component);
                    key.out_tangent = tangent(&out_tangents, k, component);
                    key
                })
                .collect();
            curves.push(self.curves.insert(AnimationCurve::new(keys)));
        }
        Ok(curves)
    }

    fn resolve_links(&mut self, pending: PendingLinks) {
        for (parent, id) in pending.children {
            match self.find_entity(&id).filter(|&c| self.entity(c).and_then(Entity::scene_node).is_some()) {
                Some(child) => {
                    if !self.add_child(parent, child) {
                        warn!("<instance_node url=\"#{}\"> would make a cycle", id);
                    }
                }
                None => warn!("<instance_node> target '{}' not found", id),
            }
        }
        for (instance, url) in pending.instances {
            match split_url(&url) {
                (None, id) => match self.find_entity(id) {
                    Some(entity) => {
                        self.set_instance_entity(instance, Some(entity));
                    }
                    None => warn!("instance target '{}' not found", url),
                },
                (Some(uri), id) => {
                    self.set_instance_external(instance, uri, id);
                }
            }
        }
    }

    fn load_scene(&mut self, scene: &Element) -> Result<()> {
        let lookups = [
            ("instance_visual_scene", LibraryKind::VisualScenes),
            ("instance_physics_scene", LibraryKind::PhysicsScenes),
        ];
        for (element_name, library) in lookups.iter() {
            if let Some(instance) = child_named(scene, element_name) {
                let (_, id) = split_url(required_attribute(instance, "url")?);
                let found = self.find_entity(id).filter(|k| self.library(*library).contains(k));
                let set = match library {
                    LibraryKind::VisualScenes => self.set_visual_scene(found),
                    _ => self.set_physics_scene(found),
                };
                if found.is_none() || !set {
                    warn!("<{}> target '{}' not found", element_name, id);
                }
            }
        }
        Ok(())
    }

    fn load_document_extra(&mut self, technique: &Element) {
        self.set_start_time(child_named(technique, "start_time").and_then(get_float));
        self.set_end_time(child_named(technique, "end_time").and_then(get_float));
        for layer in children_named(technique, "layer") {
            let index = self.add_layer(layer.get_attribute("name", None).unwrap_or(""));
            let members: Vec<EntityKey> = get_text(layer)
                .split_whitespace()
                .filter_map(|id| self.find_entity(id))
                .collect();
            if let Some(l) = self.layer_mut(index) {
                l.entities = members;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::Projection;

    const SCENE: &str = r##"<?xml version="1.0" encoding="utf-8"?>
<COLLADA xmlns="http://www.collada.org/2005/11/COLLADASchema" version="1.4.1">
  <asset><unit name="centimeter" meter="0.01"/><up_axis>Z_UP</up_axis></asset>
  <library_cameras>
    <camera id="cam" name="Camera">
      <optics><technique_common><orthographic>
        <xmag>2</xmag><aspect_ratio>1.5</aspect_ratio><znear>0.1</znear><zfar>100</zfar>
      </orthographic></technique_common></optics>
    </camera>
  </library_cameras>
  <library_animations>
    <animation id="move">
      <animation id="move-x">
        <source id="move-x-input"><float_array count="2">0 2</float_array></source>
        <source id="move-x-output">
          <float_array count="6">0 0 0 4 2 0</float_array>
          <technique_common><accessor count="2" stride="3"/></technique_common>
        </source>
        <source id="move-x-interp"><Name_array count="2">LINEAR STEP</Name_array></source>
        <sampler id="move-x-sampler">
          <input semantic="INPUT" source="#move-x-input"/>
          <input semantic="OUTPUT" source="#move-x-output"/>
          <input semantic="INTERPOLATION" source="#move-x-interp"/>
        </sampler>
        <channel source="#move-x-sampler" target="root/location"/>
      </animation>
    </animation>
  </library_animations>
  <library_nodes>
    <node id="prop"><instance_camera url="#cam"/></node>
  </library_nodes>
  <library_visual_scenes>
    <visual_scene id="scene">
      <node id="root" type="JOINT">
        <translate sid="location">0 0 0</translate>
        <node id="leaf"><instance_node url="#prop"/></node>
      </node>
    </visual_scene>
  </library_visual_scenes>
  <scene><instance_visual_scene url="#scene"/></scene>
  <extra><technique profile="collada_document">
    <start_time>0.5</start_time>
    <layer name="props">prop cam</layer>
  </technique></extra>
</COLLADA>"##;

    fn load() -> Document {
        let mut doc = Document::new();
        doc.load_from_str(SCENE).unwrap();
        doc
    }

    #[test]
    fn test_load_scene_graph() {
        let doc = load();
        let scene = doc.find_entity("scene").unwrap();
        assert_eq!(doc.visual_scene(), Some(scene));
        let root = doc.find_entity("root").unwrap();
        let leaf = doc.find_entity("leaf").unwrap();
        let prop = doc.find_entity("prop").unwrap();

        let root_node = doc.entity(root).and_then(Entity::scene_node).unwrap();
        assert!(root_node.is_joint);
        assert_eq!(root_node.parents(), &[scene]);
        assert_eq!(root_node.children(), &[leaf]);
        assert_eq!(doc.entity(leaf).and_then(Entity::scene_node).unwrap().children(), &[prop]);
        assert_eq!(doc.entity(root).unwrap().library(), None);

        let instance = doc.entity(prop).and_then(Entity::scene_node).unwrap().instances()[0];
        let cam = doc.find_entity("cam").unwrap();
        assert_eq!(doc.instance_entity(instance).and_then(|t| t.local()), Some(cam));
    }

    #[test]
    fn test_load_camera_and_asset() {
        let doc = load();
        assert_eq!(doc.asset.unit_meter, 0.01);
        let cam = doc.find_entity("cam").unwrap();
        let camera = doc.entity(cam).and_then(Entity::camera).unwrap();
        assert_eq!(camera.projection, Projection::Orthographic);
        assert_eq!(doc.value(camera.horizontal()), Some(2.0));
        assert!(doc.animated_values().find_by_target("cam/xmag").is_some());
        assert!(doc.animated_values().find_by_target("cam/xfov").is_none());
        assert_eq!(doc.entity(cam).unwrap().name, "Camera");
    }

    #[test]
    fn test_nested_animation_is_linked() {
        let mut doc = load();
        let root = doc.find_entity("root").unwrap();
        let slots = doc.entity(root).and_then(Entity::scene_node).unwrap().transforms()[0].slots().to_vec();
        assert!(slots.iter().all(|&s| doc.is_animated(s)));

        let animation = doc.find_entity("move").unwrap();
        assert_eq!(doc.entity(animation).and_then(Entity::animation).unwrap().channels.len(), 1);

        doc.evaluate(1.0);
        assert_eq!(doc.value(slots[0]), Some(2.0));
        assert_eq!(doc.value(slots[1]), Some(1.0));
        doc.evaluate(2.0);
        assert_eq!(doc.value(slots[0]), Some(4.0));
    }

    #[test]
    fn test_time_hints_and_layers() {
        let doc = load();
        assert_eq!(doc.start_time(), 0.5);
        assert_eq!(doc.end_time(), 2.0);
        let layer = &doc.layers()[0];
        assert_eq!(layer.name, "props");
        assert_eq!(layer.entities.len(), 2);
    }

    #[test]
    fn test_load_errors() {
        let mut doc = Document::new();
        assert!(matches!(doc.load_from_str("<COLLADA>"), Err(Error::Xml(_))));
        assert!(matches!(doc.load_from_str("<scene/>"), Err(Error::NotCollada(_))));
        assert!(matches!(
            doc.load_from_str("<COLLADA><library_nodes><node><instance_geometry/></node></library_nodes></COLLADA>"),
            Err(Error::MissingAttribute { attribute: "url", .. })
        ));
    }

    #[test]
    fn test_unreadable_entity_is_skipped() {
        let mut doc = Document::new();
        doc.load_from_str("<COLLADA><library_lights><light id=\"l\"/></library_lights></COLLADA>")
            .unwrap();
        assert!(doc.library(LibraryKind::Lights).is_empty());
        assert_eq!(doc.find_entity("l"), None);
    }
}
