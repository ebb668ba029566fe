//! Per-document registry of `id` attributes.

use std::collections::HashMap;

use crate::tracking::ObjectKey;

/// Make `id` a valid xs:ID: letters, digits, `_`, `-` and `.` only, never
/// starting with a digit, `-` or `.`. An empty id becomes `"id"`.
pub fn clean_id(id: &str) -> String {
    let id = id.trim_start_matches('#');
    let mut out: String = id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();
    match out.chars().next() {
        None => out.push_str("id"),
        Some(c) if c.is_ascii_digit() || c == '-' || c == '.' => out.insert(0, '_'),
        Some(_) => {}
    }
    out
}

/// Maps every live id of one document to the object carrying it.
///
/// Collisions are never reported: a taken request is mangled by appending
/// an increasing number until the registry has no match.
#[derive(Debug, Default)]
pub struct UniqueIdRegistry {
    ids: HashMap<String, ObjectKey>,
}

impl UniqueIdRegistry {
    pub fn new() -> UniqueIdRegistry {
        UniqueIdRegistry::default()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<ObjectKey> {
        self.ids.get(clean_id(id).as_str()).copied()
    }

    /// Register `owner` under the cleaned form of `requested`, or under a
    /// mangled variant of it when taken. Returns the id actually stored.
    pub fn insert_unique(&mut self, requested: &str, owner: ObjectKey) -> String {
        let cleaned = clean_id(requested);
        let id = if self.ids.contains_key(&cleaned) {
            self.mangle(&cleaned)
        } else {
            cleaned
        };
        self.ids.insert(id.clone(), owner);
        id
    }

    pub fn remove(&mut self, id: &str) -> Option<ObjectKey> {
        self.ids.remove(id)
    }

    fn mangle(&self, id: &str) -> String {
        let stem = id.trim_end_matches(|c: char| c.is_ascii_digit());
        let stem = if stem.is_empty() { id } else { stem };
        (1u64..)
            .map(|n| format!("{}{}", stem, n))
            .find(|candidate| !self.ids.contains_key(candidate))
            .unwrap_or_else(|| format!("{}_", id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    fn keys(n: usize) -> Vec<ObjectKey> {
        let mut map: SlotMap<ObjectKey, ()> = SlotMap::with_key();
        (0..n).map(|_| map.insert(())).collect()
    }

    #[test]
    fn test_clean_id() {
        assert_eq!(clean_id("#cam1"), "cam1");
        assert_eq!(clean_id("my camera"), "my_camera");
        assert_eq!(clean_id("1box"), "_1box");
        assert_eq!(clean_id(""), "id");
    }

    #[test]
    fn test_collisions_are_mangled() {
        let k = keys(4);
        let mut registry = UniqueIdRegistry::new();
        assert_eq!(registry.insert_unique("cam", k[0]), "cam");
        assert_eq!(registry.insert_unique("cam", k[1]), "cam1");
        assert_eq!(registry.insert_unique("cam1", k[2]), "cam2");
        assert_eq!(registry.insert_unique("cam", k[3]), "cam3");
        assert_eq!(registry.len(), 4);
        assert_eq!(registry.get("#cam2"), Some(k[2]));
    }

    #[test]
    fn test_remove_frees_the_id() {
        let k = keys(2);
        let mut registry = UniqueIdRegistry::new();
        registry.insert_unique("geo", k[0]);
        assert_eq!(registry.remove("geo"), Some(k[0]));
        assert_eq!(registry.insert_unique("geo", k[1]), "geo");
    }
}
