//! Animation databases: fragment entries, blends and the SubADB tree.

use std::cmp::Reverse;
use std::collections::BTreeMap;

use tracing::warn;

use crate::cache::{FileResource, ResourceCache, TagDefId};
use crate::fragment::{BlendUid, Fragment, FragmentBlend};
use crate::hash::same_path;
use crate::tag_definition::{FragTagState, TagDefinition, TagState};

/// Position of a fragment in its fragment-id vocabulary.
pub type FragmentId = usize;

pub type TagDefCache = ResourceCache<TagDefId, TagDefinition>;

// =============================================================================
// Entries
// =============================================================================

/// Options stored for one tag state of a fragment.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TagSet {
    pub tags: FragTagState,
    pub options: Vec<Fragment>,
}

/// All tag sets of a fragment, most specific first.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FragmentEntry {
    tag_sets: Vec<TagSet>,
}

impl FragmentEntry {
    #[inline]
    pub fn tag_sets(&self) -> &[TagSet] {
        &self.tag_sets
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tag_sets.is_empty()
    }

    pub fn find(&self, tags: &FragTagState) -> Option<usize> {
        self.tag_sets.iter().position(|set| set.tags == *tags)
    }

    pub fn options(&self, tags: &FragTagState) -> Option<&[Fragment]> {
        self.find(tags).map(|i| self.tag_sets[i].options.as_slice())
    }

    /// Options across every tag set.
    pub fn option_count(&self) -> usize {
        self.tag_sets.iter().map(|set| set.options.len()).sum()
    }
}

// =============================================================================
// Blends
// =============================================================================

/// Fragment pair a blend applies to. `None` means "any fragment".
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FragmentBlendKey {
    pub from: Option<FragmentId>,
    pub to: Option<FragmentId>,
}

impl FragmentBlendKey {
    pub const ANY_TO_ANY: FragmentBlendKey = FragmentBlendKey::new(None, None);

    #[inline]
    pub const fn new(from: Option<FragmentId>, to: Option<FragmentId>) -> Self {
        Self { from, to }
    }

    #[inline]
    pub const fn is_any_to_any(&self) -> bool {
        self.from.is_none() && self.to.is_none()
    }

    #[inline]
    pub fn references(&self, id: FragmentId) -> bool {
        self.from == Some(id) || self.to == Some(id)
    }
}

/// Blends for one (from tags, to tags) pair, ordered by select time.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BlendVariant {
    pub tags_from: FragTagState,
    pub tags_to: FragTagState,
    pub blends: Vec<FragmentBlend>,
}

impl BlendVariant {
    pub fn find_blend(&self, uid: BlendUid) -> Option<&FragmentBlend> {
        self.blends.iter().find(|b| b.uid == uid)
    }

    fn sort_blends(&mut self) {
        self.blends
            .sort_by(|a, b| a.select_time.total_cmp(&b.select_time));
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct BlendEntry {
    pub variants: Vec<BlendVariant>,
}

impl BlendEntry {
    fn variant_index(&self, tags_from: &FragTagState, tags_to: &FragTagState) -> Option<usize> {
        self.variants
            .iter()
            .position(|v| v.tags_from == *tags_from && v.tags_to == *tags_to)
    }
}

// =============================================================================
// SubADB
// =============================================================================

/// A file-backed filter view over its owning database.
///
/// `frag_ids` are ids in the sub's own `frag_def` vocabulary.
#[derive(Clone, Debug, PartialEq)]
pub struct SubAdb {
    pub filename: String,
    pub tags: TagState,
    pub comparison_mask: TagState,
    pub known_tags: TagState,
    pub tag_def: TagDefId,
    pub frag_def: TagDefId,
    pub frag_ids: Vec<FragmentId>,
    pub sub_adbs: Vec<SubAdb>,
}

impl SubAdb {
    /// An unfiltered sub sharing the given vocabularies.
    pub fn new(filename: impl Into<String>, tag_def: TagDefId, frag_def: TagDefId) -> Self {
        Self {
            filename: filename.into(),
            tags: TagState::EMPTY,
            comparison_mask: TagState::EMPTY,
            known_tags: TagState::FULL,
            tag_def,
            frag_def,
            frag_ids: Vec::new(),
            sub_adbs: Vec::new(),
        }
    }

    #[inline]
    pub fn is_named(&self, filename: &str) -> bool {
        same_path(&self.filename, filename)
    }

    /// True if this sub or any descendant is backed by `filename`.
    pub fn has_file(&self, filename: &str) -> bool {
        self.is_named(filename) || self.sub_adbs.iter().any(|s| s.has_file(filename))
    }

    pub fn find(&self, filename: &str) -> Option<&SubAdb> {
        if self.is_named(filename) {
            return Some(self);
        }
        self.sub_adbs.iter().find_map(|s| s.find(filename))
    }

    pub fn find_mut(&mut self, filename: &str) -> Option<&mut SubAdb> {
        if self.is_named(filename) {
            return Some(self);
        }
        self.sub_adbs.iter_mut().find_map(|s| s.find_mut(filename))
    }

    fn adjust_after_fragment_id_deletion(&mut self, id: FragmentId, vocabulary: TagDefId) {
        if self.frag_def == vocabulary {
            self.frag_ids.retain(|f| *f != id);
            for f in &mut self.frag_ids {
                if *f > id {
                    *f -= 1;
                }
            }
        }
        for sub in &mut self.sub_adbs {
            sub.adjust_after_fragment_id_deletion(id, vocabulary);
        }
    }
}

fn find_sub_adb_in<'a>(subs: &'a [SubAdb], filename: &str) -> Option<&'a SubAdb> {
    subs.iter().find_map(|s| s.find(filename))
}

fn find_sub_adb_in_mut<'a>(subs: &'a mut [SubAdb], filename: &str) -> Option<&'a mut SubAdb> {
    subs.iter_mut().find_map(|s| s.find_mut(filename))
}

/// Remove the sub named `filename` from wherever it sits in the tree.
fn remove_sub_adb_from(subs: &mut Vec<SubAdb>, filename: &str) -> Option<SubAdb> {
    if let Some(index) = subs.iter().position(|s| s.is_named(filename)) {
        return Some(subs.remove(index));
    }
    subs.iter_mut()
        .find_map(|s| remove_sub_adb_from(&mut s.sub_adbs, filename))
}

fn move_sub_adb_in(subs: &mut [SubAdb], filename: &str, up: bool) -> bool {
    if let Some(index) = subs.iter().position(|s| s.is_named(filename)) {
        if up && index > 0 {
            subs.swap(index, index - 1);
        } else if !up && index + 1 < subs.len() {
            subs.swap(index, index + 1);
        }
        return true;
    }
    subs.iter_mut()
        .any(|s| move_sub_adb_in(&mut s.sub_adbs, filename, up))
}

// =============================================================================
// Ranking
// =============================================================================

/// Rates tag states against a database's vocabularies.
struct Ranker<'a> {
    tags: Option<&'a TagDefinition>,
    frags: Option<&'a TagDefinition>,
    cache: &'a TagDefCache,
}

impl<'a> Ranker<'a> {
    fn new(db: &AnimationDatabase, cache: &'a TagDefCache) -> Self {
        Self {
            tags: cache.get(db.tag_def),
            frags: cache.get(db.frag_def),
            cache,
        }
    }

    fn fragment_tag_def(&self, frag: Option<FragmentId>) -> Option<&'a TagDefinition> {
        let sub = self.frags?.sub_tag_def(frag?)?;
        self.cache.get(sub)
    }

    fn rate(&self, frag: Option<FragmentId>, state: &FragTagState) -> u32 {
        let global = self.tags.map_or(0, |t| t.rate_tag_state(state.global_tags));
        let local = self
            .fragment_tag_def(frag)
            .map_or(0, |t| t.rate_tag_state(state.fragment_tags));
        global.saturating_add(local)
    }

    /// True if every tag of `pattern` is set in `query`.
    fn matches(&self, frag: FragmentId, query: &FragTagState, pattern: &FragTagState) -> bool {
        let global_ok = match self.tags {
            Some(t) => t.contains_tags(query.global_tags, pattern.global_tags),
            None => pattern.global_tags.is_empty(),
        };
        let local_ok = match self.fragment_tag_def(Some(frag)) {
            Some(t) => t.contains_tags(query.fragment_tags, pattern.fragment_tags),
            None => pattern.fragment_tags.is_empty(),
        };
        global_ok && local_ok
    }
}

// =============================================================================
// AnimationDatabase
// =============================================================================

/// Fragment data of one `.adb` file and everything its SubADBs contributed.
#[derive(Clone, Debug, PartialEq)]
pub struct AnimationDatabase {
    filename: String,
    tag_def: TagDefId,
    frag_def: TagDefId,
    fragments: Vec<FragmentEntry>,
    blends: BTreeMap<FragmentBlendKey, BlendEntry>,
    sub_adbs: Vec<SubAdb>,
}

impl FileResource for AnimationDatabase {
    fn filename(&self) -> &str {
        &self.filename
    }
}

impl AnimationDatabase {
    pub fn new(
        filename: impl Into<String>,
        tag_def: TagDefId,
        frag_def: TagDefId,
        fragment_count: usize,
    ) -> Self {
        Self {
            filename: filename.into(),
            tag_def,
            frag_def,
            fragments: vec![FragmentEntry::default(); fragment_count],
            blends: BTreeMap::new(),
            sub_adbs: Vec::new(),
        }
    }

    #[inline]
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Global tag vocabulary.
    #[inline]
    pub fn tag_def(&self) -> TagDefId {
        self.tag_def
    }

    /// Fragment-id vocabulary.
    #[inline]
    pub fn frag_def(&self) -> TagDefId {
        self.frag_def
    }

    #[inline]
    pub fn fragment_count(&self) -> usize {
        self.fragments.len()
    }

    pub fn entry(&self, id: FragmentId) -> Option<&FragmentEntry> {
        self.fragments.get(id)
    }

    pub fn entries(&self) -> impl Iterator<Item = (FragmentId, &FragmentEntry)> {
        self.fragments.iter().enumerate()
    }

    /// Number of stored fragment options across all entries.
    pub fn option_count(&self) -> usize {
        self.fragments.iter().map(FragmentEntry::option_count).sum()
    }

    pub(crate) fn resize_fragments(&mut self, count: usize) {
        self.fragments.resize_with(count, FragmentEntry::default);
    }

    /// Append an empty entry for a newly created fragment id.
    pub(crate) fn push_fragment_entry(&mut self) -> FragmentId {
        self.fragments.push(FragmentEntry::default());
        self.fragments.len() - 1
    }

    /// Drop all entries and blends. SubADB declarations are kept.
    pub(crate) fn clear_data(&mut self) {
        let count = self.fragments.len();
        self.fragments.clear();
        self.resize_fragments(count);
        self.blends.clear();
    }

    /// Drop everything, including the SubADB tree.
    pub(crate) fn clear(&mut self) {
        self.fragments.clear();
        self.blends.clear();
        self.sub_adbs.clear();
    }

    // -------------------------------------------------------------------------
    // Entry editing
    // -------------------------------------------------------------------------

    /// Append an option; returns its index within the tag set.
    ///
    /// A newly created tag set triggers a re-sort of the entry.
    pub fn add_entry(
        &mut self,
        id: FragmentId,
        tags: FragTagState,
        fragment: Fragment,
        cache: &TagDefCache,
    ) -> Option<usize> {
        if id >= self.fragments.len() {
            warn!(database = %self.filename, fragment = id, "invalid fragment id");
            return None;
        }
        let entry = &mut self.fragments[id];
        let (index, created) = match entry.find(&tags) {
            Some(set) => {
                entry.tag_sets[set].options.push(fragment);
                (entry.tag_sets[set].options.len() - 1, false)
            }
            None => {
                entry.tag_sets.push(TagSet {
                    tags,
                    options: vec![fragment],
                });
                (0, true)
            }
        };
        if created {
            self.sort_entry(id, cache);
        }
        Some(index)
    }

    /// Overwrite an option, or add the entry when the tag set is new.
    pub fn set_entry(
        &mut self,
        id: FragmentId,
        tags: FragTagState,
        option: usize,
        fragment: Fragment,
        cache: &TagDefCache,
    ) -> bool {
        let Some(entry) = self.fragments.get_mut(id) else {
            return false;
        };
        match entry.find(&tags) {
            Some(set) => match entry.tag_sets[set].options.get_mut(option) {
                Some(slot) => {
                    *slot = fragment;
                    true
                }
                None => false,
            },
            None => self.add_entry(id, tags, fragment, cache).is_some(),
        }
    }

    /// Remove options by index; an emptied tag set is erased.
    pub fn delete_entries(&mut self, id: FragmentId, tags: &FragTagState, options: &[usize]) -> bool {
        let Some(entry) = self.fragments.get_mut(id) else {
            warn!(database = %self.filename, fragment = id, "invalid fragment id");
            return false;
        };
        let Some(set) = entry.find(tags) else {
            warn!(database = %self.filename, fragment = id, "no entry with the given tags");
            return false;
        };
        let mut index = 0;
        entry.tag_sets[set].options.retain(|_| {
            let keep = !options.contains(&index);
            index += 1;
            keep
        });
        if entry.tag_sets[set].options.is_empty() {
            entry.tag_sets.remove(set);
        }
        true
    }

    #[inline]
    pub fn delete_entry(&mut self, id: FragmentId, tags: &FragTagState, option: usize) -> bool {
        self.delete_entries(id, tags, &[option])
    }

    /// Most specific tag set whose tags are all present in `query`.
    pub fn find_best_match(
        &self,
        id: FragmentId,
        query: &FragTagState,
        cache: &TagDefCache,
    ) -> Option<&TagSet> {
        let ranker = Ranker::new(self, cache);
        self.fragments
            .get(id)?
            .tag_sets
            .iter()
            .find(|set| ranker.matches(id, query, &set.tags))
    }

    /// Keep only the tag sets for which `keep(fragment, tags)` holds.
    pub(crate) fn retain_tag_sets(&mut self, mut keep: impl FnMut(FragmentId, &FragTagState) -> bool) {
        for (id, entry) in self.fragments.iter_mut().enumerate() {
            entry.tag_sets.retain(|set| keep(id, &set.tags));
        }
    }

    // -------------------------------------------------------------------------
    // Sorting
    // -------------------------------------------------------------------------

    fn sort_entry(&mut self, id: FragmentId, cache: &TagDefCache) {
        let ranker = Ranker::new(self, cache);
        let mut entry = std::mem::take(&mut self.fragments[id]);
        entry
            .tag_sets
            .sort_by_key(|set| Reverse(ranker.rate(Some(id), &set.tags)));
        self.fragments[id] = entry;
    }

    fn sort_variants(&mut self, key: FragmentBlendKey, cache: &TagDefCache) {
        let ranker = Ranker::new(self, cache);
        let Some(mut entry) = self.blends.remove(&key) else {
            return;
        };
        entry.variants.sort_by_key(|v| {
            Reverse(
                ranker
                    .rate(key.from, &v.tags_from)
                    .saturating_add(ranker.rate(key.to, &v.tags_to)),
            )
        });
        self.blends.insert(key, entry);
    }

    /// Order every tag set and blend variant most specific first.
    pub fn sort(&mut self, cache: &TagDefCache) {
        for id in 0..self.fragments.len() {
            self.sort_entry(id, cache);
        }
        let keys: Vec<FragmentBlendKey> = self.blends.keys().copied().collect();
        for key in keys {
            self.sort_variants(key, cache);
        }
    }

    // -------------------------------------------------------------------------
    // Blends
    // -------------------------------------------------------------------------

    pub fn add_blend(
        &mut self,
        key: FragmentBlendKey,
        tags_from: FragTagState,
        tags_to: FragTagState,
        blend: FragmentBlend,
        cache: &TagDefCache,
    ) -> BlendUid {
        let uid = blend.uid;
        let entry = self.blends.entry(key).or_default();
        let created = match entry.variant_index(&tags_from, &tags_to) {
            Some(index) => {
                let variant = &mut entry.variants[index];
                variant.blends.push(blend);
                variant.sort_blends();
                false
            }
            None => {
                entry.variants.push(BlendVariant {
                    tags_from,
                    tags_to,
                    blends: vec![blend],
                });
                true
            }
        };
        if created {
            self.sort_variants(key, cache);
        }
        uid
    }

    /// Replace the blend with `uid`. The stored blend keeps its uid.
    pub fn set_blend(
        &mut self,
        key: FragmentBlendKey,
        tags_from: &FragTagState,
        tags_to: &FragTagState,
        uid: BlendUid,
        blend: FragmentBlend,
    ) -> bool {
        let Some(variant) = self.variant_mut(key, tags_from, tags_to) else {
            return false;
        };
        let Some(slot) = variant.blends.iter_mut().find(|b| b.uid == uid) else {
            return false;
        };
        let resort = slot.select_time != blend.select_time;
        *slot = FragmentBlend { uid, ..blend };
        if resort {
            variant.sort_blends();
        }
        true
    }

    /// Remove a blend; emptied variants and entries are dropped.
    pub fn delete_blend(
        &mut self,
        key: FragmentBlendKey,
        tags_from: &FragTagState,
        tags_to: &FragTagState,
        uid: BlendUid,
    ) -> bool {
        let Some(entry) = self.blends.get_mut(&key) else {
            return false;
        };
        let Some(index) = entry.variant_index(tags_from, tags_to) else {
            return false;
        };
        let variant = &mut entry.variants[index];
        let before = variant.blends.len();
        variant.blends.retain(|b| b.uid != uid);
        let removed = variant.blends.len() != before;
        if variant.blends.is_empty() {
            entry.variants.remove(index);
        }
        if entry.variants.is_empty() {
            self.blends.remove(&key);
        }
        removed
    }

    pub fn blends(&self) -> impl Iterator<Item = (&FragmentBlendKey, &BlendEntry)> {
        self.blends.iter()
    }

    pub fn blend_keys(&self) -> Vec<FragmentBlendKey> {
        self.blends.keys().copied().collect()
    }

    pub fn blend_variants(&self, key: FragmentBlendKey) -> &[BlendVariant] {
        self.blends
            .get(&key)
            .map(|entry| entry.variants.as_slice())
            .unwrap_or(&[])
    }

    pub fn variant(
        &self,
        key: FragmentBlendKey,
        tags_from: &FragTagState,
        tags_to: &FragTagState,
    ) -> Option<&BlendVariant> {
        let entry = self.blends.get(&key)?;
        entry
            .variant_index(tags_from, tags_to)
            .map(|i| &entry.variants[i])
    }

    fn variant_mut(
        &mut self,
        key: FragmentBlendKey,
        tags_from: &FragTagState,
        tags_to: &FragTagState,
    ) -> Option<&mut BlendVariant> {
        let entry = self.blends.get_mut(&key)?;
        let index = entry.variant_index(tags_from, tags_to)?;
        Some(&mut entry.variants[index])
    }

    pub fn blend(
        &self,
        key: FragmentBlendKey,
        tags_from: &FragTagState,
        tags_to: &FragTagState,
        uid: BlendUid,
    ) -> Option<&FragmentBlend> {
        self.variant(key, tags_from, tags_to)?.find_blend(uid)
    }

    /// Keep only the variants for which `keep(key, variant)` holds.
    pub(crate) fn retain_blend_variants(
        &mut self,
        mut keep: impl FnMut(FragmentBlendKey, &BlendVariant) -> bool,
    ) {
        for (key, entry) in self.blends.iter_mut() {
            entry.variants.retain(|v| keep(*key, v));
        }
        self.blends.retain(|_, entry| !entry.variants.is_empty());
    }

    /// Number of blends stored across all variants.
    pub fn blend_count(&self) -> usize {
        self.blends
            .values()
            .flat_map(|e| e.variants.iter())
            .map(|v| v.blends.len())
            .sum()
    }

    // -------------------------------------------------------------------------
    // Fragment id deletion
    // -------------------------------------------------------------------------

    /// Erase fragment `id`, dropping blends that reference it and shifting
    /// every higher id down by one.
    pub(crate) fn delete_fragment_id(&mut self, id: FragmentId) {
        if id < self.fragments.len() {
            self.fragments.remove(id);
        }
        let shift = |f: Option<FragmentId>| f.map(|f| if f > id { f - 1 } else { f });
        let blends = std::mem::take(&mut self.blends);
        self.blends = blends
            .into_iter()
            .filter(|(key, _)| !key.references(id))
            .map(|(key, entry)| (FragmentBlendKey::new(shift(key.from), shift(key.to)), entry))
            .collect();
        let vocabulary = self.frag_def;
        self.adjust_sub_adbs_after_fragment_id_deletion(id, vocabulary);
    }

    /// Shift SubADB fragment filters that use `vocabulary` after `id` was deleted.
    pub(crate) fn adjust_sub_adbs_after_fragment_id_deletion(
        &mut self,
        id: FragmentId,
        vocabulary: TagDefId,
    ) {
        for sub in &mut self.sub_adbs {
            sub.adjust_after_fragment_id_deletion(id, vocabulary);
        }
    }

    // -------------------------------------------------------------------------
    // SubADBs
    // -------------------------------------------------------------------------

    #[inline]
    pub fn sub_adbs(&self) -> &[SubAdb] {
        &self.sub_adbs
    }

    pub(crate) fn sub_adbs_mut(&mut self) -> &mut Vec<SubAdb> {
        &mut self.sub_adbs
    }

    /// True if this database or any of its SubADBs is backed by `filename`.
    pub fn has_file(&self, filename: &str) -> bool {
        same_path(&self.filename, filename) || self.sub_adbs.iter().any(|s| s.has_file(filename))
    }

    pub fn find_sub_adb(&self, filename: &str) -> Option<&SubAdb> {
        find_sub_adb_in(&self.sub_adbs, filename)
    }

    pub fn find_sub_adb_mut(&mut self, filename: &str) -> Option<&mut SubAdb> {
        find_sub_adb_in_mut(&mut self.sub_adbs, filename)
    }

    /// First file declaring `id` in its fragment filter, or this database.
    pub fn find_sub_adb_filename_for_id(&self, id: FragmentId) -> &str {
        fn search(subs: &[SubAdb], id: FragmentId) -> Option<&str> {
            subs.iter().find_map(|s| {
                if s.frag_ids.contains(&id) {
                    Some(s.filename.as_str())
                } else {
                    search(&s.sub_adbs, id)
                }
            })
        }
        search(&self.sub_adbs, id).unwrap_or(&self.filename)
    }

    /// Add `id` to the fragment filter of `filename`.
    ///
    /// Returns `false` if no such SubADB existed and one was created at the
    /// root level. Adding to the database's own file is a no-op.
    pub fn add_sub_adb_fragment_filter(&mut self, filename: &str, id: FragmentId) -> bool {
        if same_path(&self.filename, filename) {
            return true;
        }
        if let Some(sub) = self.find_sub_adb_mut(filename) {
            if !sub.frag_ids.contains(&id) {
                sub.frag_ids.push(id);
            }
            return true;
        }
        let mut sub = SubAdb::new(filename, self.tag_def, self.frag_def);
        sub.frag_ids.push(id);
        self.sub_adbs.push(sub);
        false
    }

    /// Remove `id` from the fragment filters of the SubADB `filename`.
    pub fn remove_sub_adb_fragment_filter(&mut self, filename: &str, id: FragmentId) -> bool {
        let Some(sub) = self.find_sub_adb_mut(filename) else {
            return false;
        };
        let before = sub.frag_ids.len();
        sub.frag_ids.retain(|f| *f != id);
        sub.frag_ids.len() != before
    }

    pub fn sub_adb_fragment_filters(&self, filename: &str) -> &[FragmentId] {
        self.find_sub_adb(filename)
            .map(|sub| sub.frag_ids.as_slice())
            .unwrap_or(&[])
    }

    pub fn sub_adb_tag_filter(&self, filename: &str) -> Option<TagState> {
        self.find_sub_adb(filename).map(|sub| sub.tags)
    }

    /// Set the tag filter of `filename`, creating a root-level SubADB if
    /// needed. Returns `false` when a SubADB had to be created.
    pub fn set_sub_adb_tag_filter(&mut self, filename: &str, tags: TagState, tag_def: &TagDefinition) -> bool {
        if same_path(&self.filename, filename) {
            return true;
        }
        let mask = tag_def.generate_mask(tags);
        if let Some(sub) = self.find_sub_adb_mut(filename) {
            sub.tags = tags;
            sub.comparison_mask = mask;
            return true;
        }
        let mut sub = SubAdb::new(filename, self.tag_def, self.frag_def);
        sub.tags = tags;
        sub.comparison_mask = mask;
        self.sub_adbs.push(sub);
        false
    }

    /// Remove the SubADB `filename` (and its subtree) from the tree.
    pub fn delete_sub_adb(&mut self, filename: &str) -> Option<SubAdb> {
        remove_sub_adb_from(&mut self.sub_adbs, filename)
    }

    /// Swap the SubADB with its previous (`up`) or next sibling.
    pub fn move_sub_adb(&mut self, filename: &str, up: bool) -> bool {
        move_sub_adb_in(&mut self.sub_adbs, filename, up)
    }

    /// Clear both filters of the SubADB `filename`.
    pub fn clear_sub_adb_filter(&mut self, filename: &str) -> bool {
        let Some(sub) = self.find_sub_adb_mut(filename) else {
            return false;
        };
        sub.tags = TagState::EMPTY;
        sub.comparison_mask = TagState::EMPTY;
        sub.frag_ids.clear();
        true
    }
}
