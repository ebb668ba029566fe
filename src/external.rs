//! References into other documents and the placeholders that load them.
//!
//! A referring document keeps one `PlaceHolder` per foreign location. Every
//! instance pointing into that location holds an `ExternalReference` to the
//! shared placeholder. Loading is lazy and happens at most once per
//! placeholder until it is unloaded again.

use std::path::{Path, PathBuf};
use std::rc::Rc;

use log::{debug, warn};
use slotmap::{new_key_type, SlotMap};

use crate::document::{Document, DocumentRef};
use crate::tracking::InstanceKey;

new_key_type! {
    pub struct PlaceHolderKey;
    pub struct ExternalReferenceKey;
}

/// Handle on a foreign document, loaded or not.
#[derive(Debug)]
pub struct PlaceHolder {
    pub(crate) uri: String,
    pub(crate) location: PathBuf,
    pub(crate) target: Option<DocumentRef>,
    pub(crate) references: Vec<ExternalReferenceKey>,
}

impl PlaceHolder {
    /// The url as first written in the referring document.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Resolved location. Never changes once the placeholder exists.
    pub fn location(&self) -> &Path {
        &self.location
    }

    pub fn is_loaded(&self) -> bool {
        self.target.is_some()
    }

    pub fn references(&self) -> &[ExternalReferenceKey] {
        &self.references
    }
}

/// One instance's pointer into a foreign document.
#[derive(Debug, Clone)]
pub struct ExternalReference {
    pub(crate) placeholder: PlaceHolderKey,
    pub(crate) entity_id: String,
    pub(crate) instance: InstanceKey,
}

impl ExternalReference {
    pub fn placeholder(&self) -> PlaceHolderKey {
        self.placeholder
    }

    /// Id of the target entity inside the foreign document.
    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    pub fn instance(&self) -> InstanceKey {
        self.instance
    }
}

#[derive(Debug, Default)]
pub struct ExternalReferenceManager {
    placeholders: SlotMap<PlaceHolderKey, PlaceHolder>,
    references: SlotMap<ExternalReferenceKey, ExternalReference>,
}

impl ExternalReferenceManager {
    pub fn find_placeholder(&self, location: &Path) -> Option<PlaceHolderKey> {
        self.placeholders
            .iter()
            .find(|(_, p)| p.location == location)
            .map(|(key, _)| key)
    }

    pub(crate) fn find_or_add_placeholder(&mut self, uri: &str, location: PathBuf) -> PlaceHolderKey {
        if let Some(key) = self.find_placeholder(&location) {
            return key;
        }
        debug!("new placeholder for {}", location.display());
        self.placeholders.insert(PlaceHolder {
            uri: uri.to_string(),
            location,
            target: None,
            references: Vec::new(),
        })
    }

    pub fn placeholder(&self, key: PlaceHolderKey) -> Option<&PlaceHolder> {
        self.placeholders.get(key)
    }

    pub(crate) fn placeholder_mut(&mut self, key: PlaceHolderKey) -> Option<&mut PlaceHolder> {
        self.placeholders.get_mut(key)
    }

    pub fn placeholders(&self) -> impl Iterator<Item = (PlaceHolderKey, &PlaceHolder)> + '_ {
        self.placeholders.iter()
    }

    pub fn reference(&self, key: ExternalReferenceKey) -> Option<&ExternalReference> {
        self.references.get(key)
    }

    pub(crate) fn add_reference(&mut self, placeholder: PlaceHolderKey, entity_id: &str, instance: InstanceKey) -> ExternalReferenceKey {
        let key = self.references.insert(ExternalReference {
            placeholder,
            entity_id: entity_id.to_string(),
            instance,
        });
        if let Some(p) = self.placeholders.get_mut(placeholder) {
            p.references.push(key);
        }
        key
    }

    /// Remove `key` from its placeholder. The placeholder itself stays,
    /// even without references, until `remove_unused` runs.
    pub(crate) fn remove_reference(&mut self, key: ExternalReferenceKey) -> Option<ExternalReference> {
        let reference = self.references.remove(key)?;
        if let Some(p) = self.placeholders.get_mut(reference.placeholder) {
            p.references.retain(|&r| r != key);
        }
        Some(reference)
    }

    fn remove_unused(&mut self) -> usize {
        let before = self.placeholders.len();
        self.placeholders.retain(|_, p| !p.references.is_empty());
        before - self.placeholders.len()
    }
}

impl Document {
    pub fn externals(&self) -> &ExternalReferenceManager {
        &self.externals
    }

    pub fn placeholders(&self) -> impl Iterator<Item = (PlaceHolderKey, &PlaceHolder)> + '_ {
        self.externals.placeholders()
    }

    /// The foreign document behind `placeholder`.
    ///
    /// A loaded document is returned as is. Otherwise, with
    /// `load_if_missing`, the document is read through this document's file
    /// manager, kept by the placeholder, and every reference waiting on it
    /// is bound. A failed load returns `None` and leaves everything pending,
    /// so the call may be retried.
    pub fn placeholder_target(&mut self, placeholder: PlaceHolderKey, load_if_missing: bool) -> Option<DocumentRef> {
        let location = {
            let p = self.externals.placeholder(placeholder)?;
            if let Some(target) = &p.target {
                return Some(Rc::clone(target));
            }
            p.location.clone()
        };
        if !load_if_missing {
            return None;
        }

        let mut foreign = Document::with_file_manager(Rc::clone(self.file_manager()));
        if let Err(e) = foreign.load_from_location(&location) {
            warn!("could not load external document {}: {}", location.display(), e);
            return None;
        }
        debug!("loaded external document {}", location.display());
        let document = Rc::new(std::cell::RefCell::new(foreign));

        let references = match self.externals.placeholder_mut(placeholder) {
            Some(p) => {
                p.target = Some(Rc::clone(&document));
                p.references.clone()
            }
            None => return None,
        };
        for reference in references {
            let (instance, entity_id) = match self.externals.reference(reference) {
                Some(r) => (r.instance, r.entity_id.clone()),
                None => continue,
            };
            self.bind_external(instance, &document, &entity_id);
        }
        Some(document)
    }

    /// Drop the placeholder's foreign document, keeping its location and
    /// references so that a later `placeholder_target` can load it again.
    ///
    /// Refused while someone else still holds the document. Returns whether
    /// the document was released.
    pub fn unload_placeholder(&mut self, placeholder: PlaceHolderKey) -> bool {
        let p = match self.externals.placeholder_mut(placeholder) {
            Some(p) => p,
            None => return false,
        };
        let holders = match &p.target {
            Some(target) => Rc::strong_count(target),
            None => return false,
        };
        if holders > 1 {
            warn!("{} is still in use, not unloading it", p.location.display());
            return false;
        }
        p.target = None;
        let references = p.references.clone();
        self.unbind_references(&references);
        true
    }

    /// Forget placeholders no instance refers to any more. Returns how many
    /// were removed.
    pub fn remove_unused_placeholders(&mut self) -> usize {
        self.externals.remove_unused()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityType;
    use crate::file_manager::MemoryFileManager;

    #[test]
    fn test_one_placeholder_per_location() {
        let mut doc = Document::new();
        doc.set_location(Some(PathBuf::from("/scenes/a.dae")));
        let first = doc.create_instance(EntityType::Light);
        let second = doc.create_instance(EntityType::Camera);
        doc.set_instance_external(first, "b.dae", "sun");
        doc.set_instance_external(second, "./b.dae", "cam");

        let placeholders: Vec<_> = doc.placeholders().collect();
        assert_eq!(placeholders.len(), 1);
        assert_eq!(placeholders[0].1.location(), Path::new("/scenes/b.dae"));
        assert_eq!(placeholders[0].1.references().len(), 2);
    }

    #[test]
    fn test_failed_load_can_be_retried() {
        let files = Rc::new(MemoryFileManager::new());
        let mut doc = Document::with_file_manager(files.clone());
        let instance = doc.create_instance(EntityType::Light);
        doc.set_instance_external(instance, "/lights.dae", "sun");
        let (placeholder, _) = doc.placeholders().next().unwrap();

        assert!(doc.placeholder_target(placeholder, false).is_none());
        assert!(doc.placeholder_target(placeholder, true).is_none());
        assert!(doc.instance_entity(instance).is_none());

        files.insert(
            "/lights.dae",
            r#"<COLLADA><library_lights><light id="sun"><technique_common>
            <directional><color>1 1 1</color></directional>
            </technique_common></light></library_lights></COLLADA>"#,
        );
        assert!(doc.placeholder_target(placeholder, true).is_some());
        assert!(doc.instance_entity(instance).is_some());
        assert_eq!(files.read_count(), 2);
    }

    #[test]
    fn test_unused_placeholders_are_removed() {
        let mut doc = Document::new();
        let instance = doc.create_instance(EntityType::Light);
        doc.set_instance_external(instance, "/lights.dae", "sun");
        assert_eq!(doc.remove_unused_placeholders(), 0);

        doc.release_instance(instance);
        assert_eq!(doc.placeholders().count(), 1);
        assert_eq!(doc.remove_unused_placeholders(), 1);
        assert_eq!(doc.placeholders().count(), 0);
    }
}
