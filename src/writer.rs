//! Writing a document out as COLLADA 1.4.1 text.

use std::path::{Path, PathBuf};

use log::{debug, warn};
use xml::Element;

use crate::animation::{Animation, AnimationClip, CurveId};
use crate::document::{Document, EXTRA_PROFILE};
use crate::entity::{EntityBody, LibraryKind};
use crate::error::{Error, Result};
use crate::geometry::{write_input, write_source};
use crate::instance::Binding;
use crate::physics::PhysicsScene;
use crate::scene::SceneNode;
use crate::tracking::{EntityKey, InstanceKey, ObjectFlags};
use crate::utils::{join_values, new_element, push_child, push_text_child, set_attribute, set_text};

pub const COLLADA_NAMESPACE: &str = "http://www.collada.org/2005/11/COLLADASchema";

const XML_DECLARATION: &str = "<?xml version=\"1.0\" encoding=\"utf-8\"?>";

fn extra_technique() -> Element {
    let mut technique = new_element("technique");
    set_attribute(&mut technique, "profile", EXTRA_PROFILE);
    technique
}

fn wrap_extra(technique: Element) -> Element {
    let mut extra = new_element("extra");
    push_child(&mut extra, technique);
    extra
}

/// A `<source>` holding a `Name_array`.
fn write_name_source(id: &str, names: &[&str], param: &str) -> Element {
    let array_id = format!("{}-array", id);
    let mut array = new_element("Name_array");
    set_attribute(&mut array, "id", array_id.as_str());
    set_attribute(&mut array, "count", names.len().to_string());
    set_text(&mut array, names.join(" "));

    let mut accessor = new_element("accessor");
    set_attribute(&mut accessor, "source", format!("#{}", array_id));
    set_attribute(&mut accessor, "count", names.len().to_string());
    set_attribute(&mut accessor, "stride", "1");
    let mut p = new_element("param");
    set_attribute(&mut p, "name", param);
    set_attribute(&mut p, "type", "name");
    push_child(&mut accessor, p);
    let mut technique = new_element("technique_common");
    push_child(&mut technique, accessor);

    let mut source = new_element("source");
    set_attribute(&mut source, "id", id);
    push_child(&mut source, array);
    push_child(&mut source, technique);
    source
}

impl Document {
    /// The document as text, with external urls relative to its current
    /// location.
    pub fn write_to_string(&mut self) -> String {
        let base = self.location().map(Path::to_path_buf);
        let root = self.write_to_element(base.as_deref());
        format!("{}\n{}", XML_DECLARATION, root)
    }

    /// Write the document to `path` through its file manager. On success
    /// `path` becomes the document's location and nothing is dirty any
    /// more.
    pub fn write_to_location(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let root = self.write_to_element(Some(path));
        let text = format!("{}\n{}", XML_DECLARATION, root);
        self.file_manager()
            .write(path, &text)
            .map_err(|e| Error::io(path, e))?;
        self.set_location(Some(PathBuf::from(path)));
        self.clear_flags(ObjectFlags::DIRTY);
        debug!("wrote document {} to {}", self.id(), path.display());
        Ok(())
    }

    /// Build the `<COLLADA>` element. Every entity gets an id first, so
    /// that references between them can be written. `base` is the location
    /// external urls are made relative to.
    pub fn write_to_element(&mut self, base: Option<&Path>) -> Element {
        self.prepare_ids();

        let mut root = new_element("COLLADA");
        set_attribute(&mut root, "xmlns", COLLADA_NAMESPACE);
        set_attribute(&mut root, "version", "1.4.1");
        self.asset.write_to_node(&mut root);

        for kind in LibraryKind::ALL.iter().copied() {
            let entries: Vec<Element> = self
                .library(kind)
                .iter()
                .filter(|&&key| !self.flags(key).contains(ObjectFlags::TRANSIENT))
                .filter_map(|&key| self.write_entity(key, base))
                .collect();
            if entries.is_empty() {
                continue;
            }
            let mut library = new_element(kind.element_name());
            for entry in entries {
                push_child(&mut library, entry);
            }
            push_child(&mut root, library);
        }

        let mut scene = new_element("scene");
        let active = [
            ("instance_physics_scene", self.physics_scene()),
            ("instance_visual_scene", self.visual_scene()),
        ];
        for (name, key) in active.iter() {
            if let Some(id) = key.and_then(|k| self.dae_id(k)) {
                let mut instance = new_element(name);
                set_attribute(&mut instance, "url", format!("#{}", id));
                push_child(&mut scene, instance);
            }
        }
        if !scene.children.is_empty() {
            push_child(&mut root, scene);
        }

        if let Some(technique) = self.write_document_extra() {
            push_child(&mut root, wrap_extra(technique));
        }
        root
    }

    fn prepare_ids(&mut self) {
        let keys: Vec<EntityKey> = self.entities().map(|(key, _)| key).collect();
        for key in keys {
            self.ensure_dae_id(key);
        }
    }

    fn write_document_extra(&self) -> Option<Element> {
        let (start, end) = self.time_hints();
        if start.is_none() && end.is_none() && self.layers().is_empty() {
            return None;
        }
        let mut technique = extra_technique();
        if let Some(start) = start {
            push_text_child(&mut technique, "start_time", start.to_string());
        }
        if let Some(end) = end {
            push_text_child(&mut technique, "end_time", end.to_string());
        }
        for layer in self.layers() {
            let ids: Vec<&str> = layer.entities.iter().filter_map(|&k| self.dae_id(k)).collect();
            let mut element = new_element("layer");
            set_attribute(&mut element, "name", layer.name.as_str());
            set_text(&mut element, ids.join(" "));
            push_child(&mut technique, element);
        }
        Some(technique)
    }

    fn write_entity(&self, key: EntityKey, base: Option<&Path>) -> Option<Element> {
        let entity = self.entity(key)?;
        let element_name = entity.library.map_or("node", LibraryKind::entity_element);
        let mut element = new_element(element_name);
        let id = self.dae_id(key).unwrap_or_default();
        if !id.is_empty() {
            set_attribute(&mut element, "id", id);
        }
        if !entity.name.is_empty() {
            set_attribute(&mut element, "name", entity.name.as_str());
        }
        if let Some(asset) = &entity.asset {
            asset.write_to_node(&mut element);
        }

        match &entity.body {
            EntityBody::SceneNode(node) => self.write_node(key, node, &mut element, base),
            EntityBody::Animation(animation) => self.write_animation(id, animation, &mut element),
            EntityBody::AnimationClip(clip) => self.write_animation_clip(clip, &mut element, base),
            EntityBody::Material(material) => {
                if let Some(effect) = material.effect.and_then(|i| self.write_instance(i, base)) {
                    push_child(&mut element, effect);
                }
            }
            EntityBody::PhysicsScene(scene) => self.write_physics_scene(scene, &mut element, base),
            body => {
                if let Some(content) = body.content() {
                    content.write_to_node(&mut element, &self.values);
                }
            }
        }

        if !entity.note.is_empty() {
            let mut technique = extra_technique();
            push_text_child(&mut technique, "note", entity.note.as_str());
            push_child(&mut element, wrap_extra(technique));
        }
        Some(element)
    }

    /// A child is written inline below its first parent when no library
    /// owns it, and as an `<instance_node>` everywhere else.
    fn write_node(&self, key: EntityKey, node: &SceneNode, element: &mut Element, base: Option<&Path>) {
        if node.is_joint {
            set_attribute(element, "type", "JOINT");
        }
        for transform in &node.transforms {
            let mut t = new_element(transform.kind.element_name());
            if let Some(sid) = transform.sid() {
                set_attribute(&mut t, "sid", sid);
            }
            set_text(&mut t, join_values(&transform.values(&self.values)));
            push_child(element, t);
        }
        for &instance in &node.instances {
            if let Some(e) = self.write_instance(instance, base) {
                push_child(element, e);
            }
        }

        let mut inline = Vec::new();
        for &child in &node.children {
            let owned_here = self.entity(child).map_or(false, |c| {
                c.library.is_none() && c.scene_node().and_then(|n| n.parents.first()) == Some(&key)
            });
            if owned_here {
                inline.extend(self.write_entity(child, base));
            } else if let Some(id) = self.dae_id(child) {
                let mut instance = new_element("instance_node");
                set_attribute(&mut instance, "url", format!("#{}", id));
                push_child(element, instance);
            }
        }
        for child in inline {
            push_child(element, child);
        }
    }

    /// The url an instance is written with: `#id` for a local entity and
    /// `uri#id` for an entity of another document, with `uri` relative to
    /// `base` when one is given.
    pub fn instance_url(&self, instance: InstanceKey, base: Option<&Path>) -> Option<String> {
        let i = self.instance(instance)?;
        if let Some(reference) = i.external.and_then(|r| self.externals.reference(r)) {
            let placeholder = self.externals.placeholder(reference.placeholder)?;
            let uri = match base {
                Some(_) => self.file_manager().make_relative(base, placeholder.location()),
                None => placeholder.uri().to_string(),
            };
            return Some(format!("{}#{}", uri, reference.entity_id));
        }
        match i.binding {
            Binding::Local(entity) => self.dae_id(entity).map(|id| format!("#{}", id)),
            _ => None,
        }
    }

    fn write_instance(&self, key: InstanceKey, base: Option<&Path>) -> Option<Element> {
        let instance = self.instance(key)?;
        let url = match self.instance_url(key, base) {
            Some(url) => url,
            None => {
                warn!("dropping unbound {:?} instance", instance.entity_type);
                return None;
            }
        };
        let mut element = new_element(instance.entity_type.instance_element());
        set_attribute(&mut element, "url", url);
        if !instance.name.is_empty() {
            set_attribute(&mut element, "name", instance.name.as_str());
        }
        for skeleton in &instance.skeletons {
            push_text_child(&mut element, "skeleton", skeleton.as_str());
        }
        if !instance.material_bindings.is_empty() {
            let mut technique = new_element("technique_common");
            for binding in &instance.material_bindings {
                let mut m = new_element("instance_material");
                set_attribute(&mut m, "symbol", binding.symbol.as_str());
                set_attribute(&mut m, "target", binding.target.as_str());
                push_child(&mut technique, m);
            }
            let mut bind = new_element("bind_material");
            push_child(&mut bind, technique);
            push_child(&mut element, bind);
        }
        Some(element)
    }

    /// Each curve is written with its own sampler and a channel targeting
    /// the single component it drives.
    fn write_animation(&self, id: &str, animation: &Animation, element: &mut Element) {
        let mut sources = Vec::new();
        let mut samplers = Vec::new();
        let mut channels = Vec::new();
        let mut n = 0;
        for channel in &animation.channels {
            for (index, &curve_id) in channel.curves.iter().enumerate() {
                let curve = match self.curves.get(curve_id) {
                    Some(curve) => curve,
                    None => continue,
                };
                let prefix = format!("{}-{}", id, n);
                n += 1;
                let keys = curve.keys();
                let inputs: Vec<f32> = keys.iter().map(|k| k.input).collect();
                let outputs: Vec<f32> = keys.iter().map(|k| k.output).collect();
                let interpolations: Vec<&str> = keys.iter().map(|k| k.interpolation.name()).collect();

                let mut sampler = new_element("sampler");
                set_attribute(&mut sampler, "id", format!("{}-sampler", prefix));
                let mut add_source = |semantic: &str, suffix: &str, source: Element| {
                    sources.push(source);
                    push_child(&mut sampler, write_input(semantic, &format!("{}-{}", prefix, suffix), None));
                };
                add_source("INPUT", "input", write_source(&format!("{}-input", prefix), &inputs, &["TIME"]));
                add_source("OUTPUT", "output", write_source(&format!("{}-output", prefix), &outputs, &["VALUE"]));
                add_source(
                    "INTERPOLATION",
                    "interpolation",
                    write_name_source(&format!("{}-interpolation", prefix), &interpolations, "INTERPOLATION"),
                );
                if keys.iter().any(|k| k.in_tangent.is_some() || k.out_tangent.is_some()) {
                    let in_tangents: Vec<f32> = keys
                        .iter()
                        .flat_map(|k| k.in_tangent.unwrap_or([k.input, k.output]).to_vec())
                        .collect();
                    let out_tangents: Vec<f32> = keys
                        .iter()
                        .flat_map(|k| k.out_tangent.unwrap_or([k.input, k.output]).to_vec())
                        .collect();
                    add_source("IN_TANGENT", "in_tangent", write_source(&format!("{}-in_tangent", prefix), &in_tangents, &["X", "Y"]));
                    add_source("OUT_TANGENT", "out_tangent", write_source(&format!("{}-out_tangent", prefix), &out_tangents, &["X", "Y"]));
                }
                samplers.push(sampler);

                let mut c = new_element("channel");
                set_attribute(&mut c, "source", format!("#{}-sampler", prefix));
                set_attribute(&mut c, "target", self.channel_target(curve_id, &channel.target, index, channel.curves.len()));
                channels.push(c);
            }
        }
        for e in sources.into_iter().chain(samplers).chain(channels) {
            push_child(element, e);
        }
    }

    /// Target of one curve: the address of the component it drives, or the
    /// loaded target when it drives nothing in this document.
    fn channel_target(&self, curve: CurveId, target: &str, index: usize, count: usize) -> String {
        let bound = self
            .animated
            .find_by_curve(curve)
            .and_then(|(key, channel)| Some((self.animated.get(key)?, channel)));
        match bound {
            Some((value, channel)) if !value.pointer().is_empty() => value.target_string(Some(channel)),
            _ if count > 1 => format!("{}({})", target, index),
            _ => target.to_string(),
        }
    }

    fn write_animation_clip(&self, clip: &AnimationClip, element: &mut Element, base: Option<&Path>) {
        set_attribute(element, "start", clip.start.to_string());
        set_attribute(element, "end", clip.end.to_string());
        for &instance in &clip.animations {
            if let Some(e) = self.write_instance(instance, base) {
                push_child(element, e);
            }
        }
    }

    fn write_physics_scene(&self, scene: &PhysicsScene, element: &mut Element, base: Option<&Path>) {
        for &model in &scene.models {
            if let Some(e) = self.write_instance(model, base) {
                push_child(element, e);
            }
        }
        let mut technique = new_element("technique_common");
        push_text_child(&mut technique, "gravity", join_values(&scene.gravity));
        push_text_child(&mut technique, "time_step", scene.timestep.to_string());
        push_child(element, technique);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::{AnimationCurve, Interpolation, Keyframe};
    use crate::entity::{Entity, EntityType};
    use crate::file_manager::MemoryFileManager;
    use crate::transform::TransformKind;
    use crate::utils::{child_named, children_named};
    use std::rc::Rc;

    fn sample_document() -> Document {
        let mut doc = Document::new();
        let scene = doc.add_entity(LibraryKind::VisualScenes);
        doc.set_dae_id(scene, "scene");
        assert!(doc.set_visual_scene(Some(scene)));
        let node = doc.add_child_node(scene).unwrap();
        doc.set_dae_id(node, "box");
        doc.add_transform(node, TransformKind::Translate, Some("location"), &[1.0, 2.0, 3.0]);
        let camera = doc.add_entity(LibraryKind::Cameras);
        doc.set_dae_id(camera, "cam");
        doc.node_instantiate(node, camera).unwrap();

        let animation = doc.add_entity(LibraryKind::Animations);
        let curve = AnimationCurve::new(vec![
            Keyframe::new(0.0, 0.0, Interpolation::Linear),
            Keyframe::new(2.0, 4.0, Interpolation::Linear),
        ]);
        doc.add_animation_curve(animation, "box/location.Y", curve).unwrap();

        let layer = doc.add_layer("cameras");
        doc.layer_mut(layer).unwrap().entities.push(camera);
        doc.entity_mut(camera).unwrap().note = "main view".to_string();
        doc
    }

    #[test]
    fn test_write_then_load() {
        let mut doc = sample_document();
        let text = doc.write_to_string();

        let mut copy = Document::new();
        copy.load_from_str(&text).unwrap();
        let scene = copy.find_entity("scene").unwrap();
        assert_eq!(copy.visual_scene(), Some(scene));
        let node = copy.find_entity("box").unwrap();
        let cam = copy.find_entity("cam").unwrap();

        let n = copy.entity(node).and_then(Entity::scene_node).unwrap();
        assert_eq!(n.parents(), &[scene]);
        assert_eq!(n.transforms()[0].sid(), Some("location"));
        assert_eq!(n.transforms()[0].values(copy.values()), vec![1.0, 2.0, 3.0]);
        assert_eq!(copy.instance_entity(n.instances()[0]).and_then(|t| t.local()), Some(cam));
        let y = n.transforms()[0].slots()[1];

        assert_eq!(copy.layers()[0].entities, vec![cam]);
        assert_eq!(copy.entity(cam).unwrap().note, "main view");
        assert_eq!(copy.end_time(), 2.0);
        copy.evaluate(1.0);
        assert_eq!(copy.value(y), Some(2.0));
    }

    #[test]
    fn test_shared_child_is_written_once() {
        let mut doc = Document::new();
        let scene = doc.add_entity(LibraryKind::VisualScenes);
        let left = doc.add_child_node(scene).unwrap();
        let right = doc.add_child_node(scene).unwrap();
        let wheel = doc.add_child_node(left).unwrap();
        assert!(doc.add_child(right, wheel));
        doc.set_dae_id(wheel, "wheel");

        let root = doc.write_to_element(None);
        let library = child_named(&root, "library_visual_scenes").unwrap();
        let nodes: Vec<&Element> = children_named(child_named(library, "visual_scene").unwrap(), "node").collect();
        assert_eq!(nodes.len(), 2);
        assert_eq!(children_named(nodes[0], "node").count(), 1);
        let instance = child_named(nodes[1], "instance_node").unwrap();
        assert_eq!(instance.get_attribute("url", None), Some("#wheel"));
    }

    #[test]
    fn test_transient_entities_are_skipped() {
        let mut doc = Document::new();
        let light = doc.add_entity(LibraryKind::Lights);
        doc.set_flag(light, ObjectFlags::TRANSIENT, true);
        let root = doc.write_to_element(None);
        assert!(child_named(&root, "library_lights").is_none());
        assert_eq!(root.get_attribute("version", None), Some("1.4.1"));
    }

    #[test]
    fn test_external_url_follows_location() {
        let mut doc = Document::new();
        doc.set_location(Some(PathBuf::from("/scenes/a.dae")));
        let instance = doc.create_instance(EntityType::Camera);
        doc.set_instance_external(instance, "props/b.dae", "cam1");

        assert_eq!(doc.instance_url(instance, None).as_deref(), Some("props/b.dae#cam1"));
        assert_eq!(
            doc.instance_url(instance, Some(Path::new("/scenes/a.dae"))).as_deref(),
            Some("props/b.dae#cam1")
        );
        assert_eq!(
            doc.instance_url(instance, Some(Path::new("/elsewhere/a.dae"))).as_deref(),
            Some("/scenes/props/b.dae#cam1")
        );
    }

    #[test]
    fn test_write_to_location() {
        let files = Rc::new(MemoryFileManager::new());
        let mut doc = Document::with_file_manager(files.clone());
        let light = doc.add_entity(LibraryKind::Lights);
        assert!(doc.flags(light).contains(ObjectFlags::DIRTY));

        doc.write_to_location("/out/scene.dae").unwrap();
        assert_eq!(doc.location(), Some(Path::new("/out/scene.dae")));
        assert!(!doc.flags(light).contains(ObjectFlags::DIRTY));
        let text = files.contents("/out/scene.dae").unwrap();
        assert!(text.starts_with(XML_DECLARATION));
        assert!(text.contains("library_lights"));
    }
}
