//! File-keyed resource caches.
//!
//! Each cache is a slot map of values plus an index from path key (CRC of the
//! normalized, lowercased filename) to slot. A handle stays valid for the
//! lifetime of the cached file: reverting swaps the backing value and bumps a
//! generation counter instead of handing out a new handle.

use std::collections::HashMap;

use slotmap::{Key, SlotMap};

use crate::hash::path_key;

slotmap::new_key_type! {
    /// Handle to a cached [`TagDefinition`](crate::TagDefinition).
    pub struct TagDefId;
    /// Handle to a cached [`ControllerDef`](crate::ControllerDef).
    pub struct ControllerDefId;
    /// Handle to a cached [`AnimationDatabase`](crate::AnimationDatabase).
    pub struct DatabaseId;
}

/// A value that knows which file it was loaded from.
pub trait FileResource {
    fn filename(&self) -> &str;
}

#[derive(Debug)]
struct Slot<V> {
    value: V,
    generation: u32,
}

/// Slot-map backed cache keyed by file identity.
#[derive(Debug)]
pub struct ResourceCache<K: Key, V> {
    slots: SlotMap<K, Slot<V>>,
    by_path: HashMap<u32, K>,
}

impl<K: Key, V> Default for ResourceCache<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Key, V> ResourceCache<K, V> {
    pub fn new() -> Self {
        Self {
            slots: SlotMap::with_key(),
            by_path: HashMap::new(),
        }
    }

    #[inline]
    pub fn get(&self, key: K) -> Option<&V> {
        self.slots.get(key).map(|slot| &slot.value)
    }

    #[inline]
    pub fn get_mut(&mut self, key: K) -> Option<&mut V> {
        self.slots.get_mut(key).map(|slot| &mut slot.value)
    }

    #[inline]
    pub fn contains(&self, key: K) -> bool {
        self.slots.contains_key(key)
    }

    /// Look up by path, ignoring separator style and case.
    #[inline]
    pub fn find(&self, path: &str) -> Option<K> {
        self.find_by_key(path_key(path))
    }

    #[inline]
    pub fn find_by_key(&self, key: u32) -> Option<K> {
        self.by_path.get(&key).copied()
    }

    /// Number of times the value behind `key` has been replaced.
    #[inline]
    pub fn generation(&self, key: K) -> Option<u32> {
        self.slots.get(key).map(|slot| slot.generation)
    }

    /// Swap the backing value while keeping the handle, bumping the generation.
    ///
    /// Returns the previous value.
    pub fn replace(&mut self, key: K, value: V) -> Option<V> {
        let slot = self.slots.get_mut(key)?;
        slot.generation = slot.generation.wrapping_add(1);
        Some(std::mem::replace(&mut slot.value, value))
    }

    /// Bump the generation after an in-place edit.
    pub fn touch(&mut self, key: K) {
        if let Some(slot) = self.slots.get_mut(key) {
            slot.generation = slot.generation.wrapping_add(1);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (K, &V)> {
        self.slots.iter().map(|(k, slot)| (k, &slot.value))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (K, &mut V)> {
        self.slots.iter_mut().map(|(k, slot)| (k, &mut slot.value))
    }

    /// All handles, in slot order. Handy when the loop body needs `&mut self`.
    pub fn keys(&self) -> Vec<K> {
        self.slots.keys().collect()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.by_path.clear();
    }
}

impl<K: Key, V: FileResource> ResourceCache<K, V> {
    /// Publish a value under its own filename.
    ///
    /// If the file is already cached the existing handle is reused and the
    /// value swapped in, so outstanding handles see the new data.
    pub fn insert(&mut self, value: V) -> K {
        let key = path_key(value.filename());
        if let Some(existing) = self.by_path.get(&key).copied()
            && self.slots.contains_key(existing)
        {
            self.replace(existing, value);
            return existing;
        }
        let handle = self.slots.insert(Slot {
            value,
            generation: 0,
        });
        self.by_path.insert(key, handle);
        handle
    }

    pub fn remove(&mut self, key: K) -> Option<V> {
        let slot = self.slots.remove(key)?;
        self.by_path.remove(&path_key(slot.value.filename()));
        Some(slot.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Doc {
        name: String,
        body: u32,
    }

    impl FileResource for Doc {
        fn filename(&self) -> &str {
            &self.name
        }
    }

    fn doc(name: &str, body: u32) -> Doc {
        Doc {
            name: name.into(),
            body,
        }
    }

    #[test]
    fn find_is_separator_and_case_insensitive() {
        let mut cache: ResourceCache<DatabaseId, Doc> = ResourceCache::new();
        let id = cache.insert(doc("ADB/Player.adb", 1));

        assert_eq!(cache.find("adb\\player.ADB"), Some(id));
        assert_eq!(cache.find("adb/other.adb"), None);
        assert_eq!(cache.get(id).map(|d| d.body), Some(1));
    }

    #[test]
    fn reinsert_keeps_handle_and_bumps_generation() {
        let mut cache: ResourceCache<TagDefId, Doc> = ResourceCache::new();
        let id = cache.insert(doc("tags.xml", 1));
        assert_eq!(cache.generation(id), Some(0));

        let again = cache.insert(doc("TAGS.xml", 2));
        assert_eq!(again, id);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.generation(id), Some(1));
        assert_eq!(cache.get(id).map(|d| d.body), Some(2));
    }

    #[test]
    fn replace_returns_previous_value() {
        let mut cache: ResourceCache<ControllerDefId, Doc> = ResourceCache::new();
        let id = cache.insert(doc("def.xml", 1));
        let old = cache.replace(id, doc("def.xml", 5)).unwrap();
        assert_eq!(old.body, 1);
        assert_eq!(cache.get(id).map(|d| d.body), Some(5));
        assert_eq!(cache.generation(id), Some(1));
    }

    #[test]
    fn remove_and_clear_drop_path_index() {
        let mut cache: ResourceCache<DatabaseId, Doc> = ResourceCache::new();
        let a = cache.insert(doc("a.adb", 1));
        cache.insert(doc("b.adb", 2));

        assert!(cache.remove(a).is_some());
        assert_eq!(cache.find("a.adb"), None);
        assert!(!cache.contains(a));

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.find("b.adb"), None);
    }
}
