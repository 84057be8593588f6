//! Controller definitions: the schema an animation database is authored
//! against.
//!
//! A controller definition references two shared vocabularies (global tags and
//! fragment ids) and owns three small private ones (scopes, scope contexts and
//! sub-contexts). Every fragment id has a [`FragmentDef`] at the same index.

use std::cmp::Reverse;

use crate::cache::{ControllerDefId, FileResource, TagDefId};
use crate::database::{FragmentId, TagDefCache};
use crate::tag_definition::{FragTagState, TagDefinition, TagId, TagState};

/// Bitmask over scope ids; scope `i` is bit `1 << i`.
pub type ActionScopes = u64;

pub const ACTION_SCOPES_NONE: ActionScopes = 0;
pub const ACTION_SCOPES_ALL: ActionScopes = ActionScopes::MAX;

// =============================================================================
// Scope masks
// =============================================================================

/// Scope mask per tag state, with a default used when no override matches.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScopeMaskList {
    default: ActionScopes,
    overrides: Vec<(FragTagState, ActionScopes)>,
}

impl Default for ScopeMaskList {
    fn default() -> Self {
        Self::new(ACTION_SCOPES_ALL)
    }
}

impl ScopeMaskList {
    pub fn new(default: ActionScopes) -> Self {
        Self {
            default,
            overrides: Vec::new(),
        }
    }

    #[inline]
    pub fn default_scopes(&self) -> ActionScopes {
        self.default
    }

    #[inline]
    pub fn set_default(&mut self, scopes: ActionScopes) {
        self.default = scopes;
    }

    /// Overrides, most specific first once [`sort`](Self::sort) ran.
    #[inline]
    pub fn overrides(&self) -> &[(FragTagState, ActionScopes)] {
        &self.overrides
    }

    /// Set the scopes for `tags`. An empty state replaces the default.
    pub fn insert(&mut self, tags: FragTagState, scopes: ActionScopes) {
        if tags == FragTagState::EMPTY {
            self.default = scopes;
            return;
        }
        match self.overrides.iter_mut().find(|(t, _)| *t == tags) {
            Some(slot) => slot.1 = scopes,
            None => self.overrides.push((tags, scopes)),
        }
    }

    /// Order overrides by descending specificity; ties keep insertion order.
    pub fn sort(&mut self, tags: &TagDefinition, frag_tags: Option<&TagDefinition>) {
        self.overrides.sort_by_key(|(state, _)| {
            let local = frag_tags.map_or(0, |def| def.rate_tag_state(state.fragment_tags));
            Reverse(tags.rate_tag_state(state.global_tags).saturating_add(local))
        });
    }

    /// Scopes of the first override whose tags are all set in `query`.
    pub fn find_best(
        &self,
        query: &FragTagState,
        tags: &TagDefinition,
        frag_tags: Option<&TagDefinition>,
    ) -> ActionScopes {
        self.overrides
            .iter()
            .find(|(state, _)| {
                let global = tags.contains_tags(query.global_tags, state.global_tags);
                let local = match frag_tags {
                    Some(def) => def.contains_tags(query.fragment_tags, state.fragment_tags),
                    None => state.fragment_tags.is_empty(),
                };
                global && local
            })
            .map_or(self.default, |(_, scopes)| *scopes)
    }
}

// =============================================================================
// Definitions
// =============================================================================

/// Per-fragment scope masks and [`FRAGMENT_DEF_FLAGS`](crate::fragment::FRAGMENT_DEF_FLAGS).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FragmentDef {
    pub flags: u8,
    pub scope_masks: ScopeMaskList,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScopeDef {
    pub layer: u32,
    pub num_layers: u32,
    /// Index into the scope-context vocabulary.
    pub context: TagId,
    pub scope_alias: String,
    pub additional_tags: TagState,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScopeContextDef {
    pub additional_tags: TagState,
    pub shared_tags: TagState,
}

impl Default for ScopeContextDef {
    fn default() -> Self {
        Self {
            additional_tags: TagState::EMPTY,
            shared_tags: TagState::FULL,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SubContext {
    pub scopes: ActionScopes,
    pub additional_tags: TagState,
}

// =============================================================================
// ControllerDef
// =============================================================================

#[derive(Clone, Debug, PartialEq)]
pub struct ControllerDef {
    filename: String,
    tags: TagDefId,
    fragment_ids: TagDefId,
    pub scope_ids: TagDefinition,
    pub scope_contexts: TagDefinition,
    pub sub_context_ids: TagDefinition,
    pub fragment_defs: Vec<FragmentDef>,
    pub scope_defs: Vec<ScopeDef>,
    pub scope_context_defs: Vec<ScopeContextDef>,
    pub sub_contexts: Vec<SubContext>,
}

impl FileResource for ControllerDef {
    fn filename(&self) -> &str {
        &self.filename
    }
}

pub type ControllerDefCache = crate::cache::ResourceCache<ControllerDefId, ControllerDef>;

impl ControllerDef {
    /// An empty definition with one default [`FragmentDef`] per fragment id.
    pub fn new(
        filename: impl Into<String>,
        tags: TagDefId,
        fragment_ids: TagDefId,
        fragment_count: usize,
    ) -> Self {
        Self {
            filename: filename.into(),
            tags,
            fragment_ids,
            scope_ids: TagDefinition::new(""),
            scope_contexts: TagDefinition::new(""),
            sub_context_ids: TagDefinition::new(""),
            fragment_defs: vec![FragmentDef::default(); fragment_count],
            scope_defs: Vec::new(),
            scope_context_defs: Vec::new(),
            sub_contexts: Vec::new(),
        }
    }

    #[inline]
    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub(crate) fn set_filename(&mut self, filename: impl Into<String>) {
        self.filename = filename.into();
    }

    /// Global tag vocabulary.
    #[inline]
    pub fn tags(&self) -> TagDefId {
        self.tags
    }

    /// Fragment-id vocabulary.
    #[inline]
    pub fn fragment_ids(&self) -> TagDefId {
        self.fragment_ids
    }

    pub fn fragment_def(&self, id: FragmentId) -> Option<&FragmentDef> {
        self.fragment_defs.get(id)
    }

    /// Scopes a fragment occupies under `tags`, widened by `sub_context`.
    pub fn scope_mask(
        &self,
        id: FragmentId,
        tags: &FragTagState,
        sub_context: Option<TagId>,
        cache: &TagDefCache,
    ) -> ActionScopes {
        let (Some(def), Some(global), Some(frags)) = (
            self.fragment_defs.get(id),
            cache.get(self.tags),
            cache.get(self.fragment_ids),
        ) else {
            return ACTION_SCOPES_NONE;
        };
        let frag_tags = frags.sub_tag_def(id).and_then(|sub| cache.get(sub));
        let mut scopes = def.scope_masks.find_best(tags, global, frag_tags);
        if let Some(sub) = sub_context.and_then(|i| self.sub_contexts.get(i)) {
            scopes |= sub.scopes;
        }
        scopes
    }

    // -------------------------------------------------------------------------
    // Scope lists
    // -------------------------------------------------------------------------

    /// Names of the scopes in `scopes`, joined with `+`.
    pub fn scopes_to_list(&self, scopes: ActionScopes) -> String {
        (0..self.scope_ids.len())
            .filter(|&i| i < ActionScopes::BITS as usize && scopes & (1 << i) != 0)
            .filter_map(|i| self.scope_ids.tag_name(i))
            .collect::<Vec<_>>()
            .join("+")
    }

    /// Parse a scope list; unknown names are reported, known ones still set.
    pub fn parse_scopes(&self, list: &str) -> (ActionScopes, Vec<String>) {
        let mut scopes = ACTION_SCOPES_NONE;
        let mut unknown = Vec::new();
        for token in list
            .split(|c: char| c == '+' || c == ',' || c.is_whitespace())
            .filter(|t| !t.is_empty())
        {
            match self.scope_ids.find(token) {
                Some(id) if id < ActionScopes::BITS as usize => scopes |= 1 << id,
                _ => unknown.push(token.to_string()),
            }
        }
        (scopes, unknown)
    }

    // -------------------------------------------------------------------------
    // Structural edits
    // -------------------------------------------------------------------------

    pub(crate) fn push_fragment_def(&mut self) {
        self.fragment_defs.push(FragmentDef::default());
    }

    pub(crate) fn remove_fragment_def(&mut self, id: FragmentId) {
        if id < self.fragment_defs.len() {
            self.fragment_defs.remove(id);
        }
    }

    /// Re-sort every scope mask list after tag priorities changed.
    pub fn sort_scope_masks(&mut self, cache: &TagDefCache) {
        let (Some(global), Some(frags)) = (cache.get(self.tags), cache.get(self.fragment_ids)) else {
            return;
        };
        for (id, def) in self.fragment_defs.iter_mut().enumerate() {
            let frag_tags = frags.sub_tag_def(id).and_then(|sub| cache.get(sub));
            def.scope_masks.sort(global, frag_tags);
        }
    }
}
