//! Tag vocabularies and tag-state bit algebra.
//!
//! A [`TagDefinition`] is an ordered list of named tags, optionally sorted
//! into mutually exclusive groups. After [`TagDefinition::assign_bits`] each
//! tag owns a mask inside a [`TagState`]:
//!
//! ```text
//! group "Stance" {Crouch, Prone, Swim}  → 2 bits holding index+1 (01, 10, 11)
//! ungrouped "Armed"                     → 1 bit
//! ```
//!
//! Grouped tags therefore exclude each other by construction: setting `Prone`
//! overwrites whatever stance was stored before.

use std::ops::{BitAnd, BitAndAssign, BitOr, BitOrAssign, Not};

use crate::cache::{FileResource, TagDefId};
use crate::hash::crc32_lowercase;

/// Position of a tag in its definition. Positional, not content-addressed.
pub type TagId = usize;

/// Position of a group in its definition.
pub type GroupId = usize;

// =============================================================================
// TagState
// =============================================================================

/// Bitset over a tag vocabulary.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TagState(u128);

impl TagState {
    pub const EMPTY: TagState = TagState(0);
    pub const FULL: TagState = TagState(u128::MAX);
    pub const MAX_BITS: u32 = u128::BITS;

    #[inline]
    pub const fn from_bits(bits: u128) -> Self {
        Self(bits)
    }

    #[inline]
    pub const fn bits(self) -> u128 {
        self.0
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn any_set(self, mask: TagState) -> bool {
        self.0 & mask.0 != 0
    }

    /// `(self & mask) == (pattern & mask)`
    #[inline]
    pub const fn contains(self, pattern: TagState, mask: TagState) -> bool {
        (self.0 & mask.0) == (pattern.0 & mask.0)
    }
}

impl BitAnd for TagState {
    type Output = TagState;
    fn bitand(self, rhs: TagState) -> TagState {
        TagState(self.0 & rhs.0)
    }
}

impl BitOr for TagState {
    type Output = TagState;
    fn bitor(self, rhs: TagState) -> TagState {
        TagState(self.0 | rhs.0)
    }
}

impl Not for TagState {
    type Output = TagState;
    fn not(self) -> TagState {
        TagState(!self.0)
    }
}

impl BitAndAssign for TagState {
    fn bitand_assign(&mut self, rhs: TagState) {
        self.0 &= rhs.0;
    }
}

impl BitOrAssign for TagState {
    fn bitor_assign(&mut self, rhs: TagState) {
        self.0 |= rhs.0;
    }
}

/// Global tags plus the fragment's own sub-vocabulary tags.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FragTagState {
    pub global_tags: TagState,
    pub fragment_tags: TagState,
}

impl FragTagState {
    pub const EMPTY: FragTagState = FragTagState::new(TagState::EMPTY, TagState::EMPTY);

    #[inline]
    pub const fn new(global_tags: TagState, fragment_tags: TagState) -> Self {
        Self {
            global_tags,
            fragment_tags,
        }
    }

    #[inline]
    pub const fn global(global_tags: TagState) -> Self {
        Self::new(global_tags, TagState::EMPTY)
    }
}

/// Result of parsing a tag list: the state of every known token plus the
/// tokens that were not found. The state is meaningful even when incomplete.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ParsedTags {
    pub state: TagState,
    pub unknown: Vec<String>,
}

impl ParsedTags {
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.unknown.is_empty()
    }
}

// =============================================================================
// TagDefinition
// =============================================================================

#[derive(Clone, Debug, PartialEq)]
struct Tag {
    name: String,
    crc: u32,
    group: Option<GroupId>,
    priority: u32,
    sub_tag_def: Option<TagDefId>,
}

#[derive(Clone, Debug, PartialEq)]
struct Group {
    name: String,
    crc: u32,
}

#[derive(Clone, Debug, Default, PartialEq)]
struct BitLayout {
    tag_masks: Vec<u128>,
    group_masks: Vec<u128>,
    num_bits: u32,
}

/// A named, ordered bit-flag vocabulary.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TagDefinition {
    filename: String,
    tags: Vec<Tag>,
    groups: Vec<Group>,
    layout: BitLayout,
    /// Sorted ascending by priority: (priority, number of tags with it).
    priority_tallies: Vec<(u32, u32)>,
}

impl FileResource for TagDefinition {
    fn filename(&self) -> &str {
        &self.filename
    }
}

impl TagDefinition {
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            ..Self::default()
        }
    }

    #[inline]
    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn set_filename(&mut self, filename: impl Into<String>) {
        self.filename = filename.into();
    }

    /// Number of tags.
    #[inline]
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    #[inline]
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    #[inline]
    pub fn is_valid_tag(&self, id: TagId) -> bool {
        id < self.tags.len()
    }

    /// Remove every tag and group.
    pub fn clear(&mut self) {
        self.tags.clear();
        self.groups.clear();
        self.layout = BitLayout::default();
        self.priority_tallies.clear();
    }

    // -------------------------------------------------------------------------
    // Building
    // -------------------------------------------------------------------------

    /// Append a tag. Returns `None` if the name is already present.
    ///
    /// Bits are not reassigned; call [`assign_bits`](Self::assign_bits) once
    /// the bulk of additions is done.
    pub fn add_tag(&mut self, name: &str, group: Option<&str>, priority: u32) -> Option<TagId> {
        if self.find(name).is_some() {
            return None;
        }
        let group = group.map(|g| self.add_group(g));
        self.tags.push(Tag {
            name: name.to_string(),
            crc: crc32_lowercase(name),
            group,
            priority,
            sub_tag_def: None,
        });
        Some(self.tags.len() - 1)
    }

    /// Find or create a group.
    pub fn add_group(&mut self, name: &str) -> GroupId {
        if let Some(id) = self.find_group(name) {
            return id;
        }
        self.groups.push(Group {
            name: name.to_string(),
            crc: crc32_lowercase(name),
        });
        self.groups.len() - 1
    }

    /// Remove a tag; every later tag id shifts down by one.
    ///
    /// The remaining tags keep their bits.
    pub fn remove_tag(&mut self, id: TagId) -> bool {
        if !self.is_valid_tag(id) {
            return false;
        }
        self.tags.remove(id);
        if id < self.layout.tag_masks.len() {
            self.layout.tag_masks.remove(id);
        }
        self.calculate_priority_tallies();
        true
    }

    /// Remove a group; its tags become ungrouped. Call `assign_bits` afterwards.
    pub fn remove_group(&mut self, group: GroupId) -> bool {
        if group >= self.groups.len() {
            return false;
        }
        self.groups.remove(group);
        for tag in &mut self.tags {
            match tag.group {
                Some(g) if g == group => tag.group = None,
                Some(g) if g > group => tag.group = Some(g - 1),
                _ => {}
            }
        }
        if group < self.layout.group_masks.len() {
            self.layout.group_masks.remove(group);
        }
        true
    }

    /// Assign bit masks to every tag and group.
    ///
    /// Groups are laid out first, each taking enough bits to store
    /// `index + 1` of its members, followed by one bit per ungrouped tag.
    /// Returns `false` if the vocabulary needs more than
    /// [`TagState::MAX_BITS`]; tags that did not fit get an empty mask.
    pub fn assign_bits(&mut self) -> bool {
        let mut layout = BitLayout {
            tag_masks: vec![0; self.tags.len()],
            group_masks: vec![0; self.groups.len()],
            num_bits: 0,
        };
        let mut all_fit = true;

        for (group_id, group_mask) in layout.group_masks.iter_mut().enumerate() {
            let members: Vec<TagId> = self
                .tags
                .iter()
                .enumerate()
                .filter(|(_, t)| t.group == Some(group_id))
                .map(|(i, _)| i)
                .collect();
            if members.is_empty() {
                continue;
            }
            let width = usize::BITS - members.len().leading_zeros();
            if layout.num_bits + width > TagState::MAX_BITS {
                all_fit = false;
                continue;
            }
            let shift = layout.num_bits;
            *group_mask = ((1u128 << width) - 1) << shift;
            for (index, tag) in members.into_iter().enumerate() {
                layout.tag_masks[tag] = ((index as u128) + 1) << shift;
            }
            layout.num_bits += width;
        }

        for (tag, mask) in self.tags.iter().zip(layout.tag_masks.iter_mut()) {
            if tag.group.is_some() {
                continue;
            }
            if layout.num_bits >= TagState::MAX_BITS {
                all_fit = false;
                continue;
            }
            *mask = 1u128 << layout.num_bits;
            layout.num_bits += 1;
        }

        self.layout = layout;
        self.calculate_priority_tallies();
        all_fit
    }

    /// True once every tag has a mask.
    pub fn has_masks(&self) -> bool {
        self.layout.tag_masks.len() == self.tags.len()
    }

    #[inline]
    pub fn num_bits(&self) -> u32 {
        self.layout.num_bits
    }

    fn calculate_priority_tallies(&mut self) {
        let mut tallies: Vec<(u32, u32)> = Vec::new();
        for tag in &self.tags {
            match tallies.iter_mut().find(|(p, _)| *p == tag.priority) {
                Some((_, count)) => *count += 1,
                None => tallies.push((tag.priority, 1)),
            }
        }
        tallies.sort_by_key(|(p, _)| *p);
        self.priority_tallies = tallies;
    }

    // -------------------------------------------------------------------------
    // Lookup
    // -------------------------------------------------------------------------

    /// Case-insensitive lookup by name.
    #[inline]
    pub fn find(&self, name: &str) -> Option<TagId> {
        self.find_crc(crc32_lowercase(name))
    }

    pub fn find_crc(&self, crc: u32) -> Option<TagId> {
        self.tags.iter().position(|t| t.crc == crc)
    }

    #[inline]
    pub fn find_group(&self, name: &str) -> Option<GroupId> {
        self.find_group_crc(crc32_lowercase(name))
    }

    pub fn find_group_crc(&self, crc: u32) -> Option<GroupId> {
        self.groups.iter().position(|g| g.crc == crc)
    }

    pub fn tag_name(&self, id: TagId) -> Option<&str> {
        self.tags.get(id).map(|t| t.name.as_str())
    }

    pub fn tag_crc(&self, id: TagId) -> Option<u32> {
        self.tags.get(id).map(|t| t.crc)
    }

    pub fn tag_group(&self, id: TagId) -> Option<GroupId> {
        self.tags.get(id).and_then(|t| t.group)
    }

    pub fn set_tag_group(&mut self, id: TagId, group: Option<GroupId>) {
        if let Some(tag) = self.tags.get_mut(id) {
            tag.group = group.filter(|g| *g < self.groups.len());
        }
    }

    pub fn group_name(&self, group: GroupId) -> Option<&str> {
        self.groups.get(group).map(|g| g.name.as_str())
    }

    pub fn group_crc(&self, group: GroupId) -> Option<u32> {
        self.groups.get(group).map(|g| g.crc)
    }

    pub fn priority(&self, id: TagId) -> u32 {
        self.tags.get(id).map_or(0, |t| t.priority)
    }

    pub fn set_priority(&mut self, id: TagId, priority: u32) {
        if let Some(tag) = self.tags.get_mut(id) {
            tag.priority = priority;
            self.calculate_priority_tallies();
        }
    }

    /// Per-tag sub-vocabulary (used by fragment-id definitions).
    pub fn sub_tag_def(&self, id: TagId) -> Option<TagDefId> {
        self.tags.get(id).and_then(|t| t.sub_tag_def)
    }

    pub fn set_sub_tag_def(&mut self, id: TagId, sub: Option<TagDefId>) {
        if let Some(tag) = self.tags.get_mut(id) {
            tag.sub_tag_def = sub;
        }
    }

    /// Tag names in declaration order.
    pub fn tag_names(&self) -> impl Iterator<Item = &str> {
        self.tags.iter().map(|t| t.name.as_str())
    }

    /// Rename a tag in place. Bit and position are unchanged.
    ///
    /// Returns false if `id` is invalid or another tag already has the name.
    pub fn set_tag_name(&mut self, id: TagId, name: &str) -> bool {
        let crc = crc32_lowercase(name);
        if self.find_crc(crc).is_some_and(|existing| existing != id) {
            return false;
        }
        let Some(tag) = self.tags.get_mut(id) else {
            return false;
        };
        tag.name = name.to_string();
        tag.crc = crc;
        true
    }

    /// Returns false if `group` is invalid or another group already has the name.
    pub fn set_group_name(&mut self, group: GroupId, name: &str) -> bool {
        let crc = crc32_lowercase(name);
        if self.find_group_crc(crc).is_some_and(|existing| existing != group) {
            return false;
        }
        let Some(g) = self.groups.get_mut(group) else {
            return false;
        };
        g.name = name.to_string();
        g.crc = crc;
        true
    }

    // -------------------------------------------------------------------------
    // State algebra
    // -------------------------------------------------------------------------

    pub fn tag_mask(&self, id: TagId) -> TagState {
        TagState(self.layout.tag_masks.get(id).copied().unwrap_or(0))
    }

    pub fn group_mask(&self, group: GroupId) -> TagState {
        TagState(self.layout.group_masks.get(group).copied().unwrap_or(0))
    }

    pub fn is_set(&self, state: TagState, id: TagId) -> bool {
        let mask = self.tag_mask(id);
        if mask.is_empty() {
            return false;
        }
        match self.tag_group(id) {
            Some(group) => state & self.group_mask(group) == mask,
            None => state & mask == mask,
        }
    }

    pub fn set(&self, state: &mut TagState, id: TagId, on: bool) {
        let mask = self.tag_mask(id);
        if mask.is_empty() {
            return;
        }
        match self.tag_group(id) {
            Some(group) => {
                let group_mask = self.group_mask(group);
                if on {
                    *state = (*state & !group_mask) | mask;
                } else if *state & group_mask == mask {
                    *state &= !group_mask;
                }
            }
            None if on => *state |= mask,
            None => *state &= !mask,
        }
    }

    pub fn is_group_set(&self, state: TagState, group: GroupId) -> bool {
        state.any_set(self.group_mask(group))
    }

    /// Comparison mask for `state`: every group touched by `state` is fully
    /// masked, ungrouped bits are masked where set.
    pub fn generate_mask(&self, state: TagState) -> TagState {
        let mut mask = state;
        for &group_mask in &self.layout.group_masks {
            if group_mask == 0 {
                continue;
            }
            let group_mask = TagState(group_mask);
            if state.any_set(group_mask) {
                mask |= group_mask;
            } else {
                mask &= !group_mask;
            }
        }
        mask
    }

    /// Union of `a` and `b`; where both set a tag in the same group, `b` wins.
    pub fn union(&self, a: TagState, b: TagState) -> TagState {
        let mut ret = a;
        for &group_mask in &self.layout.group_masks {
            let group_mask = TagState(group_mask);
            if a.any_set(group_mask) && b.any_set(group_mask) {
                ret &= !group_mask;
            }
        }
        ret | b
    }

    /// Tags set identically in both `a` and `b`.
    pub fn intersection(&self, a: TagState, b: TagState) -> TagState {
        let mut ret = a;
        for &group_mask in &self.layout.group_masks {
            let group_mask = TagState(group_mask);
            if a & group_mask != b & group_mask {
                ret &= !group_mask;
            }
        }
        ret & b
    }

    /// `(candidate & mask) == (pattern & mask)`
    #[inline]
    pub fn contains(&self, candidate: TagState, pattern: TagState, mask: TagState) -> bool {
        candidate.contains(pattern, mask)
    }

    /// True if every tag of `pattern` is set in `candidate`.
    pub fn contains_tags(&self, candidate: TagState, pattern: TagState) -> bool {
        candidate.contains(pattern, self.generate_mask(pattern))
    }

    /// Bits of every group and ungrouped tag of `self` that `other` also
    /// declares (matched by name).
    pub fn shared_tags(&self, other: &TagDefinition) -> TagState {
        let mut ret = TagState::EMPTY;
        for (group_id, group) in self.groups.iter().enumerate() {
            if other.find_group_crc(group.crc).is_some() {
                ret |= self.group_mask(group_id);
            }
        }
        for (id, tag) in self.tags.iter().enumerate() {
            if tag.group.is_none() && other.find_crc(tag.crc).is_some() {
                ret |= self.tag_mask(id);
            }
        }
        ret
    }

    /// Specificity score of a state; higher-priority tags outweigh any
    /// combination of lower-priority ones.
    pub fn rate_tag_state(&self, state: TagState) -> u32 {
        let mut score = 0u32;
        for (id, tag) in self.tags.iter().enumerate() {
            if !self.is_set(state, id) {
                continue;
            }
            let mut tally = 1u32;
            for &(priority, count) in &self.priority_tallies {
                if tag.priority > priority {
                    tally = tally.saturating_mul(count + 1);
                } else {
                    break;
                }
            }
            score = score.saturating_add(tally);
        }
        score
    }

    /// Parse a `+`, `,` or whitespace separated list of tag names.
    ///
    /// Unknown names do not stop parsing; they are collected in
    /// [`ParsedTags::unknown`] and the known tags are still set.
    pub fn tag_list_to_flags(&self, list: &str) -> ParsedTags {
        let mut parsed = ParsedTags::default();
        for token in list
            .split(|c: char| c == '+' || c == ',' || c.is_whitespace())
            .filter(|t| !t.is_empty())
        {
            match self.find(token) {
                Some(id) => self.set(&mut parsed.state, id, true),
                None => parsed.unknown.push(token.to_string()),
            }
        }
        parsed
    }

    /// Inverse of [`tag_list_to_flags`](Self::tag_list_to_flags), in
    /// declaration order, joined with `+`.
    pub fn flags_to_tag_list(&self, state: TagState) -> String {
        let mut out = String::new();
        for (id, tag) in self.tags.iter().enumerate() {
            if self.is_set(state, id) {
                if !out.is_empty() {
                    out.push('+');
                }
                out.push_str(&tag.name);
            }
        }
        out
    }

    /// Re-express `original` (a state over `self`) in `modified` by matching
    /// tag names. `None` if any set tag has no counterpart.
    pub fn map_tag_state(&self, original: TagState, modified: &TagDefinition) -> Option<TagState> {
        let mut mapped = TagState::EMPTY;
        for (id, tag) in self.tags.iter().enumerate() {
            if !self.is_set(original, id) {
                continue;
            }
            let target = modified.find_crc(tag.crc)?;
            modified.set(&mut mapped, target, true);
        }
        Some(mapped)
    }
}

// =============================================================================
// Tests
// =============================================================================
