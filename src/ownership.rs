//! Which file of a database's SubADB tree owns each piece of data.
//!
//! A database and its SubADBs form a tree of files. Every tag set and every
//! blend variant is written to exactly one of them:
//!
//! ```text
//! Player.adb                  owns whatever no child claims
//! ├── Player_Crouch.adb       Tags=Crouch
//! │   └── Crouch_Move.adb     FragmentID=Move
//! └── Player_Swim.adb         Tags=Swim
//! ```
//!
//! A node claims data if it matches and none of its immediate children does.
//! Among several claiming nodes, the pre-order first wins unless a later one
//! matched by tags. Any-to-any blends always stay in the root file.

use std::collections::{BTreeMap, HashSet};

use tracing::debug;

use crate::database::{AnimationDatabase, FragmentBlendKey, FragmentId, SubAdb, TagDefCache};
use crate::hash::same_path;
use crate::tag_definition::{FragTagState, TagDefinition, TagState};

/// A node of the SubADB tree. `None` is the database's own file.
pub type SaveNode<'a> = Option<&'a SubAdb>;

/// The file a piece of data is written to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SaveTarget {
    pub filename: String,
    /// The owning SubADB matched on its tag filter.
    pub by_tags: bool,
}

/// Result of a node test: whether it matched and whether that was by tags.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct Match {
    matched: bool,
    by_tags: bool,
}

// =============================================================================
// SavePlan
// =============================================================================

/// Owner of every tag set and blend variant of one database.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SavePlan {
    fragments: Vec<Vec<Option<SaveTarget>>>,
    blends: BTreeMap<FragmentBlendKey, Vec<Option<SaveTarget>>>,
}

impl SavePlan {
    /// Owner of tag set `set` of fragment `id`.
    pub fn fragment_target(&self, id: FragmentId, set: usize) -> Option<&SaveTarget> {
        self.fragments.get(id)?.get(set)?.as_ref()
    }

    /// Owner of variant `variant` of the blend entry `key`.
    pub fn blend_target(&self, key: FragmentBlendKey, variant: usize) -> Option<&SaveTarget> {
        self.blends.get(&key)?.get(variant)?.as_ref()
    }

    /// True if tag set `set` of fragment `id` is written to `filename`.
    pub fn saves_fragment_to(&self, id: FragmentId, set: usize, filename: &str) -> bool {
        self.fragment_target(id, set)
            .is_some_and(|t| same_path(&t.filename, filename))
    }

    pub fn saves_blend_to(&self, key: FragmentBlendKey, variant: usize, filename: &str) -> bool {
        self.blend_target(key, variant)
            .is_some_and(|t| same_path(&t.filename, filename))
    }

    fn fragment_slot(&mut self, id: FragmentId, set: usize) -> &mut Option<SaveTarget> {
        if self.fragments.len() <= id {
            self.fragments.resize_with(id + 1, Vec::new);
        }
        let sets = &mut self.fragments[id];
        if sets.len() <= set {
            sets.resize(set + 1, None);
        }
        &mut sets[set]
    }

    fn blend_slot(&mut self, key: FragmentBlendKey, variant: usize) -> &mut Option<SaveTarget> {
        let variants = self.blends.entry(key).or_default();
        if variants.len() <= variant {
            variants.resize(variant + 1, None);
        }
        &mut variants[variant]
    }
}

// =============================================================================
// Ownership
// =============================================================================

/// Ownership queries over one database and the vocabularies it references.
pub struct Ownership<'a> {
    db: &'a AnimationDatabase,
    cache: &'a TagDefCache,
    tags: &'a TagDefinition,
    frags: &'a TagDefinition,
}

impl<'a> Ownership<'a> {
    /// `None` if the database's tag or fragment vocabulary is not cached.
    pub fn new(db: &'a AnimationDatabase, cache: &'a TagDefCache) -> Option<Self> {
        Some(Self {
            db,
            cache,
            tags: cache.get(db.tag_def())?,
            frags: cache.get(db.frag_def())?,
        })
    }

    // -------------------------------------------------------------------------
    // Tree helpers
    // -------------------------------------------------------------------------

    pub fn node_filename(&self, node: SaveNode<'a>) -> &'a str {
        match node {
            Some(sub) => &sub.filename,
            None => self.db.filename(),
        }
    }

    fn children(&self, node: SaveNode<'a>) -> &'a [SubAdb] {
        match node {
            Some(sub) => &sub.sub_adbs,
            None => self.db.sub_adbs(),
        }
    }

    /// Every node of the tree, pre-order, root first.
    pub fn nodes(&self) -> Vec<SaveNode<'a>> {
        let mut out = Vec::new();
        let mut stack: Vec<SaveNode<'a>> = vec![None];
        while let Some(node) = stack.pop() {
            out.push(node);
            stack.extend(self.children(node).iter().rev().map(Some));
        }
        out
    }

    /// The node backed by `filename`, if any.
    pub fn node_for(&self, filename: &str) -> Option<SaveNode<'a>> {
        self.nodes()
            .into_iter()
            .find(|node| same_path(self.node_filename(*node), filename))
    }

    // -------------------------------------------------------------------------
    // Vocabulary lookups
    // -------------------------------------------------------------------------

    /// Name hash of a fragment id in the database vocabulary; 0 for "any".
    fn fragment_crc(&self, id: Option<FragmentId>) -> u32 {
        id.and_then(|id| self.frags.tag_crc(id)).unwrap_or(0)
    }

    fn sub_frags(&self, sub: &SubAdb) -> Option<&'a TagDefinition> {
        self.cache.get(sub.frag_def)
    }

    fn sub_knows_fragment(&self, sub: &SubAdb, crc: u32) -> bool {
        self.sub_frags(sub)
            .is_some_and(|frags| frags.find_crc(crc).is_some())
    }

    fn sub_filters_fragment(&self, sub: &SubAdb, crc: u32) -> bool {
        let Some(frags) = self.sub_frags(sub) else {
            return false;
        };
        sub.frag_ids
            .iter()
            .any(|&id| frags.tag_crc(id) == Some(crc))
    }

    /// False if `node` uses its own fragment vocabulary and does not know `id`.
    pub fn can_save_fragment_id(&self, id: Option<FragmentId>, node: SaveNode<'a>) -> bool {
        let (Some(sub), Some(id)) = (node, id) else {
            return true;
        };
        if sub.frag_def == self.db.frag_def() {
            return true;
        }
        let Some(name) = self.frags.tag_name(id) else {
            return false;
        };
        self.sub_frags(sub)
            .is_some_and(|frags| frags.find(name).is_some())
    }

    pub fn can_save_blend(&self, key: FragmentBlendKey, node: SaveNode<'a>) -> bool {
        self.can_save_fragment_id(key.from, node) && self.can_save_fragment_id(key.to, node)
    }

    // -------------------------------------------------------------------------
    // Fragments
    // -------------------------------------------------------------------------

    fn fragment_matches(&self, crc: u32, tags: TagState, sub: &SubAdb) -> Match {
        if crc != 0 && !self.sub_knows_fragment(sub, crc) {
            return Match::default();
        }

        let by_tags = !sub.tags.is_empty()
            && tags.contains(sub.tags, sub.comparison_mask)
            && self.sub_knows_fragment(sub, crc)
            && (sub.known_tags & tags) == tags;
        let by_fragment = self.sub_filters_fragment(sub, crc);

        Match {
            matched: (sub.tags.is_empty() || by_tags) && (sub.frag_ids.is_empty() || by_fragment),
            by_tags,
        }
    }

    fn should_save_fragment_crc(&self, crc: u32, tags: TagState, node: SaveNode<'a>) -> Match {
        let own = match node {
            Some(sub) => self.fragment_matches(crc, tags, sub),
            None => Match {
                matched: true,
                by_tags: false,
            },
        };
        if !own.matched {
            return own;
        }
        let claimed_below = self
            .children(node)
            .iter()
            .any(|child| self.fragment_matches(crc, tags, child).matched);
        Match {
            matched: !claimed_below,
            by_tags: own.by_tags,
        }
    }

    /// True if a tag set of fragment `id` with global tags `tags` belongs in
    /// `node` rather than in any of its children.
    pub fn should_save_fragment(&self, id: FragmentId, tags: TagState, node: SaveNode<'a>) -> bool {
        self.should_save_fragment_crc(self.fragment_crc(Some(id)), tags, node)
            .matched
    }

    /// File that owns fragment `id` under `tags`.
    ///
    /// Subtrees whose vocabulary cannot express `id` are skipped entirely.
    pub fn find_root_sub_adb(&self, id: FragmentId, tags: TagState) -> Option<&'a str> {
        let crc = self.fragment_crc(Some(id));
        let mut owner: Option<&'a str> = None;
        let mut stack: Vec<SaveNode<'a>> = vec![None];
        while let Some(node) = stack.pop() {
            if !self.can_save_fragment_id(Some(id), node) {
                continue;
            }
            let hit = self.should_save_fragment_crc(crc, tags, node);
            if hit.matched && (hit.by_tags || owner.is_none()) {
                owner = Some(self.node_filename(node));
            }
            stack.extend(self.children(node).iter().rev().map(Some));
        }
        owner
    }

    // -------------------------------------------------------------------------
    // Transitions
    // -------------------------------------------------------------------------

    fn transition_matches(
        &self,
        crc_from: u32,
        crc_to: u32,
        tags_from: TagState,
        tags_to: TagState,
        sub: &SubAdb,
    ) -> Match {
        let total = self.tags.union(tags_from, tags_to);
        if (sub.known_tags & total) != total
            || (crc_from != 0 && !self.sub_knows_fragment(sub, crc_from))
            || (crc_to != 0 && !self.sub_knows_fragment(sub, crc_to))
        {
            return Match::default();
        }

        let common = self.tags.intersection(tags_from, tags_to);
        let by_tags = sub.tags.is_empty() || common.contains(sub.tags, sub.comparison_mask);

        let by_fragment = if !sub.frag_ids.is_empty() && (crc_from != 0 || crc_to != 0) {
            (crc_from == 0 || self.sub_filters_fragment(sub, crc_from))
                && (crc_to == 0 || self.sub_filters_fragment(sub, crc_to))
        } else {
            false
        };

        Match {
            matched: by_tags && (sub.frag_ids.is_empty() || by_fragment),
            by_tags,
        }
    }

    fn should_save_transition_match(
        &self,
        key: FragmentBlendKey,
        variant_tags: (TagState, TagState),
        node: SaveNode<'a>,
    ) -> Match {
        if key.is_any_to_any() {
            return Match {
                matched: node.is_none(),
                by_tags: false,
            };
        }
        let crc_from = self.fragment_crc(key.from);
        let crc_to = self.fragment_crc(key.to);
        let (tags_from, tags_to) = variant_tags;

        let own = match node {
            Some(sub) => self.transition_matches(crc_from, crc_to, tags_from, tags_to, sub),
            None => Match {
                matched: true,
                by_tags: false,
            },
        };
        if !own.matched {
            return own;
        }
        let claimed_below = self.children(node).iter().any(|child| {
            self.transition_matches(crc_from, crc_to, tags_from, tags_to, child)
                .matched
        });
        Match {
            matched: !claimed_below,
            by_tags: own.by_tags,
        }
    }

    /// True if a blend variant of `key` belongs in `node` rather than in any
    /// of its children.
    pub fn should_save_transition(
        &self,
        key: FragmentBlendKey,
        tags_from: TagState,
        tags_to: TagState,
        node: SaveNode<'a>,
    ) -> bool {
        self.should_save_transition_match(key, (tags_from, tags_to), node)
            .matched
    }

    // -------------------------------------------------------------------------
    // Save planning
    // -------------------------------------------------------------------------

    /// Assign every tag set and blend variant to exactly one file.
    pub fn prepare_save(&self) -> SavePlan {
        let mut plan = SavePlan::default();
        for node in self.nodes() {
            let filename = self.node_filename(node);

            for (id, entry) in self.db.entries() {
                if !self.can_save_fragment_id(Some(id), node) {
                    continue;
                }
                let crc = self.fragment_crc(Some(id));
                for (set, tag_set) in entry.tag_sets().iter().enumerate() {
                    let hit = self.should_save_fragment_crc(crc, tag_set.tags.global_tags, node);
                    if !hit.matched {
                        continue;
                    }
                    let slot = plan.fragment_slot(id, set);
                    if slot.is_none() {
                        *slot = Some(SaveTarget {
                            filename: filename.to_string(),
                            by_tags: hit.by_tags,
                        });
                    }
                }
            }

            for (key, entry) in self.db.blends() {
                if !self.can_save_blend(*key, node) {
                    continue;
                }
                for (index, variant) in entry.variants.iter().enumerate() {
                    let hit = self.should_save_transition_match(
                        *key,
                        (variant.tags_from.global_tags, variant.tags_to.global_tags),
                        node,
                    );
                    if !hit.matched {
                        continue;
                    }
                    let slot = plan.blend_slot(*key, index);
                    if slot.is_none() || hit.by_tags {
                        *slot = Some(SaveTarget {
                            filename: filename.to_string(),
                            by_tags: hit.by_tags,
                        });
                    }
                }
            }
        }
        plan
    }

    // -------------------------------------------------------------------------
    // Removal
    // -------------------------------------------------------------------------

    /// Tag sets and blend variants that `node` would write itself.
    fn owned_by(&self, node: SaveNode<'a>) -> OwnedData {
        let mut owned = OwnedData::default();
        for (id, entry) in self.db.entries() {
            if !self.can_save_fragment_id(Some(id), node) {
                continue;
            }
            for set in entry.tag_sets() {
                if self.should_save_fragment(id, set.tags.global_tags, node) {
                    owned.tag_sets.insert((id, set.tags));
                }
            }
        }
        for (key, entry) in self.db.blends() {
            if !self.can_save_blend(*key, node) {
                continue;
            }
            for variant in &entry.variants {
                let tags = (variant.tags_from.global_tags, variant.tags_to.global_tags);
                if self.should_save_transition_match(*key, tags, node).matched {
                    owned.variants.insert((*key, variant.tags_from, variant.tags_to));
                }
            }
        }
        owned
    }
}

#[derive(Default)]
struct OwnedData {
    tag_sets: HashSet<(FragmentId, FragTagState)>,
    variants: HashSet<(FragmentBlendKey, FragTagState, FragTagState)>,
}

/// Erase from `db` the data that the file `node_filename` owns, so that file
/// can be reloaded on its own. `None` targets the database's own file.
///
/// Returns `false` if the vocabularies are missing or the file is not part of
/// the tree.
pub fn remove_data_from_parent(
    db: &mut AnimationDatabase,
    node_filename: Option<&str>,
    cache: &TagDefCache,
) -> bool {
    let owned = {
        let Some(ownership) = Ownership::new(db, cache) else {
            return false;
        };
        let node = match node_filename {
            Some(filename) => match db.find_sub_adb(filename) {
                Some(sub) => Some(sub),
                None => return false,
            },
            None => None,
        };
        ownership.owned_by(node)
    };

    debug!(
        database = %db.filename(),
        file = node_filename.unwrap_or(db.filename()),
        tag_sets = owned.tag_sets.len(),
        variants = owned.variants.len(),
        "removing file data from parent"
    );

    db.retain_tag_sets(|id, tags| !owned.tag_sets.contains(&(id, *tags)));
    db.retain_blend_variants(|key, variant| {
        !owned
            .variants
            .contains(&(key, variant.tags_from, variant.tags_to))
    });
    true
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::TagDefId;
    use crate::fragment::{Fragment, FragmentBlend};

    struct Fixture {
        cache: TagDefCache,
        tags: TagDefId,
        frags: TagDefId,
    }

    fn fixture() -> Fixture {
        let mut cache = TagDefCache::new();
        let mut tags = TagDefinition::new("tags.xml");
        tags.add_tag("Crouch", None, 0);
        tags.add_tag("Armed", None, 0);
        tags.add_tag("Swim", None, 0);
        tags.assign_bits();
        let mut frags = TagDefinition::new("frags.xml");
        for name in ["Idle", "Move", "Jump"] {
            frags.add_tag(name, None, 0);
        }
        frags.assign_bits();
        let tags = cache.insert(tags);
        let frags = cache.insert(frags);
        Fixture { cache, tags, frags }
    }

    fn tag_state(fx: &Fixture, list: &str) -> TagState {
        fx.cache.get(fx.tags).unwrap().tag_list_to_flags(list).state
    }

    fn tagged_sub(fx: &Fixture, filename: &str, list: &str) -> SubAdb {
        let mut sub = SubAdb::new(filename, fx.tags, fx.frags);
        sub.tags = tag_state(fx, list);
        sub.comparison_mask = fx.cache.get(fx.tags).unwrap().generate_mask(sub.tags);
        sub
    }

    /// root.adb
    /// ├── move.adb     FragmentID=Move
    /// └── crouch.adb   Tags=Crouch
    ///     └── crouch_move.adb  FragmentID=Move
    fn tree(fx: &Fixture) -> AnimationDatabase {
        let mut db = AnimationDatabase::new("root.adb", fx.tags, fx.frags, 3);
        let mut moves = SubAdb::new("move.adb", fx.tags, fx.frags);
        moves.frag_ids.push(1);
        let mut crouch = tagged_sub(fx, "crouch.adb", "Crouch");
        let mut crouch_move = SubAdb::new("crouch_move.adb", fx.tags, fx.frags);
        crouch_move.frag_ids.push(1);
        crouch.sub_adbs.push(crouch_move);
        db.sub_adbs_mut().push(moves);
        db.sub_adbs_mut().push(crouch);
        db
    }

    #[test]
    fn nodes_are_preorder() {
        let fx = fixture();
        let db = tree(&fx);
        let ownership = Ownership::new(&db, &fx.cache).unwrap();
        let names: Vec<&str> = ownership
            .nodes()
            .into_iter()
            .map(|n| ownership.node_filename(n))
            .collect();
        assert_eq!(names, ["root.adb", "move.adb", "crouch.adb", "crouch_move.adb"]);
    }

    #[test]
    fn owner_is_deepest_matching_file() {
        let fx = fixture();
        let db = tree(&fx);
        let ownership = Ownership::new(&db, &fx.cache).unwrap();

        assert_eq!(ownership.find_root_sub_adb(0, TagState::EMPTY), Some("root.adb"));
        assert_eq!(ownership.find_root_sub_adb(0, tag_state(&fx, "Crouch")), Some("crouch.adb"));
        assert_eq!(ownership.find_root_sub_adb(2, tag_state(&fx, "Crouch+Armed")), Some("crouch.adb"));
        // first fragment-filter match in pre-order wins
        assert_eq!(ownership.find_root_sub_adb(1, TagState::EMPTY), Some("move.adb"));
    }

    #[test]
    fn tag_match_overrides_earlier_owner() {
        let fx = fixture();
        let mut db = AnimationDatabase::new("root.adb", fx.tags, fx.frags, 3);
        let mut moves = SubAdb::new("move.adb", fx.tags, fx.frags);
        moves.frag_ids.push(1);
        db.sub_adbs_mut().push(moves);
        db.sub_adbs_mut().push(tagged_sub(&fx, "armed.adb", "Armed"));

        let ownership = Ownership::new(&db, &fx.cache).unwrap();
        assert_eq!(ownership.find_root_sub_adb(1, tag_state(&fx, "Armed")), Some("armed.adb"));
        assert_eq!(ownership.find_root_sub_adb(1, TagState::EMPTY), Some("move.adb"));
    }

    #[test]
    fn every_tag_set_has_exactly_one_owner() {
        let fx = fixture();
        let mut db = tree(&fx);
        for list in ["", "Crouch", "Armed", "Crouch+Armed", "Swim"] {
            let tags = FragTagState::global(tag_state(&fx, list));
            for id in 0..3 {
                db.add_entry(id, tags, Fragment::single("clip"), &fx.cache);
            }
        }

        let ownership = Ownership::new(&db, &fx.cache).unwrap();
        let plan = ownership.prepare_save();
        let nodes = ownership.nodes();
        for (id, entry) in db.entries() {
            for set in 0..entry.tag_sets().len() {
                let owners = nodes
                    .iter()
                    .filter(|n| plan.saves_fragment_to(id, set, ownership.node_filename(**n)))
                    .count();
                assert_eq!(owners, 1, "fragment {id} set {set}");
            }
        }
    }

    #[test]
    fn any_to_any_blends_stay_in_root() {
        let fx = fixture();
        let mut db = tree(&fx);
        let crouch = FragTagState::global(tag_state(&fx, "Crouch"));
        db.add_blend(FragmentBlendKey::ANY_TO_ANY, crouch, crouch, FragmentBlend::default(), &fx.cache);
        db.add_blend(FragmentBlendKey::new(None, Some(0)), crouch, crouch, FragmentBlend::default(), &fx.cache);

        let ownership = Ownership::new(&db, &fx.cache).unwrap();
        let plan = ownership.prepare_save();
        assert!(plan.saves_blend_to(FragmentBlendKey::ANY_TO_ANY, 0, "root.adb"));
        assert!(plan.saves_blend_to(FragmentBlendKey::new(None, Some(0)), 0, "crouch.adb"));

        let crouch_node = ownership.node_for("crouch.adb").unwrap();
        assert!(!ownership.should_save_transition(
            FragmentBlendKey::ANY_TO_ANY,
            crouch.global_tags,
            crouch.global_tags,
            crouch_node
        ));
    }

    #[test]
    fn subtree_with_foreign_vocabulary_is_skipped() {
        let mut fx = fixture();
        let mut other = TagDefinition::new("other_frags.xml");
        other.add_tag("Idle", None, 0);
        other.assign_bits();
        let other = fx.cache.insert(other);

        let mut db = AnimationDatabase::new("root.adb", fx.tags, fx.frags, 3);
        db.sub_adbs_mut().push(SubAdb::new("other.adb", fx.tags, other));

        let ownership = Ownership::new(&db, &fx.cache).unwrap();
        let node = ownership.node_for("other.adb").unwrap();
        assert!(ownership.can_save_fragment_id(Some(0), node));
        assert!(!ownership.can_save_fragment_id(Some(2), node));
        assert_eq!(ownership.find_root_sub_adb(0, TagState::EMPTY), Some("other.adb"));
        assert_eq!(ownership.find_root_sub_adb(2, TagState::EMPTY), Some("root.adb"));
    }

    #[test]
    fn unknown_tags_are_not_claimed() {
        let fx = fixture();
        let mut db = AnimationDatabase::new("root.adb", fx.tags, fx.frags, 3);
        let mut sub = tagged_sub(&fx, "crouch.adb", "Crouch");
        sub.known_tags = tag_state(&fx, "Crouch+Armed");
        db.sub_adbs_mut().push(sub);

        let ownership = Ownership::new(&db, &fx.cache).unwrap();
        assert_eq!(ownership.find_root_sub_adb(0, tag_state(&fx, "Crouch+Armed")), Some("crouch.adb"));
        assert_eq!(ownership.find_root_sub_adb(0, tag_state(&fx, "Crouch+Swim")), Some("root.adb"));
    }

    #[test]
    fn remove_data_from_parent_only_drops_owned_sets() {
        let fx = fixture();
        let mut db = tree(&fx);
        let crouch = FragTagState::global(tag_state(&fx, "Crouch"));
        db.add_entry(0, FragTagState::EMPTY, Fragment::single("idle"), &fx.cache);
        db.add_entry(0, crouch, Fragment::single("crouch_idle"), &fx.cache);
        db.add_entry(1, crouch, Fragment::single("crouch_move"), &fx.cache);

        assert!(remove_data_from_parent(&mut db, Some("crouch.adb"), &fx.cache));
        assert_eq!(db.entry(0).unwrap().tag_sets().len(), 1);
        assert_eq!(db.entry(0).unwrap().tag_sets()[0].tags, FragTagState::EMPTY);
        // owned by crouch_move.adb, not crouch.adb
        assert_eq!(db.entry(1).unwrap().tag_sets().len(), 1);

        assert!(!remove_data_from_parent(&mut db, Some("missing.adb"), &fx.cache));
    }
}
