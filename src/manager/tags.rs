//! Tag renames and tag-definition replacement.
//!
//! A tag declared in an imported file is visible in every cached definition
//! whose import tree contains that file, so renames are applied to all of
//! them.

use tracing::{debug, info, warn};

use super::AnimationDatabaseManager;
use crate::cache::{ControllerDefId, DatabaseId, TagDefId};
use crate::controller_def::ControllerDef;
use crate::error::{RenameTagError, SaveError};
use crate::hash::{crc32_lowercase, is_valid_name_identifier, normalize_path, same_path};
use crate::ownership::remove_data_from_parent;
use crate::tag_definition::{GroupId, TagDefinition, TagId, TagState};

/// A stored tag set that uses a queried tag.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AffectedFragment {
    pub database: DatabaseId,
    pub fragment: String,
    /// The tag set, as a tag list.
    pub tags: String,
}

impl AnimationDatabaseManager {
    /// Cached definitions that see the file `root`: every file in the import
    /// tree of each cached definition importing `root`.
    fn tag_defs_sharing_file(&self, root: &str) -> Vec<TagDefId> {
        let mut shared = Vec::new();
        for (_, def) in self.tag_defs.iter() {
            let Some(info) = self.imports.get(def.filename()) else {
                if same_path(def.filename(), root)
                    && let Some(id) = self.tag_defs.find(def.filename())
                    && !shared.contains(&id)
                {
                    shared.push(id);
                }
                continue;
            };
            if !info.contains_file(root) {
                continue;
            }
            for node in info.flatten() {
                if let Some(id) = self.tag_defs.find(node.filename())
                    && !shared.contains(&id)
                {
                    shared.push(id);
                }
            }
        }
        shared
    }

    /// File of the import tree of `tag_def` that declared `tag`.
    fn declaring_file(&self, tag_def: &TagDefinition, tag: TagId) -> String {
        self.imports
            .get(tag_def.filename())
            .map(|info| info.find(tag).filename().to_string())
            .unwrap_or_else(|| tag_def.filename().to_string())
    }

    /// Rename the tag with name CRC `crc` in `tag_def` and in every cached
    /// definition sharing the file that declares it.
    ///
    /// The name is checked against every affected definition before any of
    /// them changes. Returns the definitions that were renamed.
    pub fn rename_tag(
        &mut self,
        tag_def: TagDefId,
        crc: u32,
        new_name: &str,
    ) -> Result<Vec<TagDefId>, RenameTagError> {
        self.rename_shared(tag_def, crc, new_name, Renamed::Tag)
    }

    /// Group counterpart of [`rename_tag`](Self::rename_tag). A group is
    /// attributed to the file declaring its first tag.
    pub fn rename_tag_group(
        &mut self,
        tag_def: TagDefId,
        crc: u32,
        new_name: &str,
    ) -> Result<Vec<TagDefId>, RenameTagError> {
        self.rename_shared(tag_def, crc, new_name, Renamed::Group)
    }

    fn rename_shared(
        &mut self,
        tag_def: TagDefId,
        crc: u32,
        new_name: &str,
        kind: Renamed,
    ) -> Result<Vec<TagDefId>, RenameTagError> {
        let def = self
            .tag_defs
            .get(tag_def)
            .ok_or(RenameTagError::UnknownTagDefinition)?;
        let root = match kind {
            Renamed::Tag => {
                let tag = def.find_crc(crc).ok_or(RenameTagError::NotFound(crc))?;
                self.declaring_file(def, tag)
            }
            Renamed::Group => {
                let group = def.find_group_crc(crc).ok_or(RenameTagError::NotFound(crc))?;
                match first_tag_of(def, group) {
                    Some(tag) => self.declaring_file(def, tag),
                    None => def.filename().to_string(),
                }
            }
        };
        if !is_valid_name_identifier(new_name) {
            return Err(RenameTagError::InvalidNameIdentifier);
        }

        let shared = self.tag_defs_sharing_file(&root);
        let new_crc = crc32_lowercase(new_name);
        for &id in &shared {
            let Some(def) = self.tag_defs.get(id) else {
                continue;
            };
            if kind.find(def, new_crc).is_some_and(|taken| Some(taken) != kind.find(def, crc)) {
                warn!(tag_def = %def.filename(), name = %new_name, "rename target already declared");
                return Err(RenameTagError::DuplicateName {
                    definition: def.filename().to_string(),
                    name: new_name.to_string(),
                });
            }
        }

        let mut renamed = Vec::new();
        for id in shared {
            if let Some(def) = self.tag_defs.get_mut(id)
                && let Some(local) = kind.find(def, crc)
                && kind.set_name(def, local, new_name)
            {
                renamed.push(id);
            }
        }
        debug!(root = %root, name = %new_name, ?kind, definitions = renamed.len(), "renamed");
        for &id in &renamed {
            self.notify_tag_def_invalidated(id);
        }
        Ok(renamed)
    }

    /// Replace the cached definition `original` with `modified`.
    ///
    /// Root-level SubADB tag filters of databases using `original` as their
    /// tag vocabulary are re-expressed by tag name; a SubADB whose filter no
    /// longer maps is removed together with the data it owned. The result is
    /// written to disk and listeners are notified.
    pub fn apply_tag_def_changes(
        &mut self,
        original: TagDefId,
        mut modified: TagDefinition,
    ) -> Result<(), SaveError> {
        let before = self
            .tag_defs
            .get(original)
            .cloned()
            .ok_or(SaveError::DanglingHandle)?;
        modified.set_filename(before.filename());

        for db_id in self.databases.keys() {
            let Some(db) = self.databases.get_mut(db_id) else {
                continue;
            };
            if db.tag_def() != original {
                continue;
            }
            for index in (0..db.sub_adbs().len()).rev() {
                let sub = &db.sub_adbs()[index];
                match before.map_tag_state(sub.tags, &modified) {
                    Some(tags) => {
                        let known_tags = if sub.tag_def == original {
                            TagState::FULL
                        } else {
                            self.tag_defs
                                .get(sub.tag_def)
                                .map(|other| modified.shared_tags(other))
                                .unwrap_or(TagState::EMPTY)
                        };
                        let sub = &mut db.sub_adbs_mut()[index];
                        sub.tags = tags;
                        sub.comparison_mask = modified.generate_mask(tags);
                        sub.known_tags = known_tags;
                    }
                    None => {
                        let filename = sub.filename.clone();
                        warn!(database = %db.filename(), sub_adb = %filename, "SubADB filter no longer maps, removed");
                        remove_data_from_parent(db, Some(&filename), &self.tag_defs);
                        db.sub_adbs_mut().remove(index);
                    }
                }
            }
        }

        if let Some(info) = self.imports.get_mut(before.filename()) {
            info.map_tags(&before, &modified);
        }
        self.tag_defs.replace(original, modified);
        self.resize_fragment_dependents(original);
        let saved = self.save_tag_definition(original);
        self.notify_tag_def_invalidated(original);
        info!(tag_def = %before.filename(), "applied tag definition changes");
        saved
    }

    /// Tag sets, per cached database, whose state uses `tag` of `tag_def`,
    /// either as a global tag or as a fragment tag.
    pub fn affected_fragments(&self, tag_def: TagDefId, tag: TagId) -> Vec<AffectedFragment> {
        let Some(query) = self.tag_defs.get(tag_def) else {
            return Vec::new();
        };
        let mut affected = Vec::new();
        for (db_id, db) in self.databases.iter() {
            let Some(frags) = self.tag_defs.get(db.frag_def()) else {
                continue;
            };
            let is_global = db.tag_def() == tag_def;
            for (fragment, entry) in db.entries() {
                let is_fragment_tag = frags.sub_tag_def(fragment) == Some(tag_def);
                if !is_global && !is_fragment_tag {
                    continue;
                }
                for set in entry.tag_sets() {
                    let state = if is_global {
                        set.tags.global_tags
                    } else {
                        set.tags.fragment_tags
                    };
                    if query.is_set(state, tag) {
                        affected.push(AffectedFragment {
                            database: db_id,
                            fragment: frags.tag_name(fragment).unwrap_or_default().to_string(),
                            tags: query.flags_to_tag_list(state),
                        });
                    }
                }
            }
        }
        debug!(tag_def = %query.filename(), tag, fragments = affected.len(), "affected fragments");
        affected
    }

    /// Other cached definitions appearing in the import tree of `tag_def`.
    pub fn included_tag_defs(&self, tag_def: TagDefId) -> Vec<TagDefId> {
        let Some(info) = self
            .tag_defs
            .get(tag_def)
            .and_then(|def| self.imports.get(def.filename()))
        else {
            return Vec::new();
        };
        info.flatten()
            .into_iter()
            .filter_map(|node| self.tag_defs.find(node.filename()))
            .filter(|id| *id != tag_def)
            .collect()
    }

    /// True if `filename` belongs to the tag definition `tag_def`, itself or
    /// through its imports.
    fn is_file_used_by_tag_def(&self, filename: &str, tag_def: TagDefId) -> bool {
        let Some(def) = self.tag_defs.get(tag_def) else {
            return false;
        };
        same_path(def.filename(), filename)
            || self
                .imports
                .get(def.filename())
                .is_some_and(|info| info.contains_file(filename))
    }

    /// True if the controller definition reads `filename`, directly or via
    /// one of its vocabularies.
    pub fn is_file_used_by_controller_def(&self, controller_def: ControllerDefId, filename: &str) -> bool {
        let Some(def) = self.controller_defs.get(controller_def) else {
            return false;
        };
        let filename = normalize_path(filename);
        same_path(def.filename(), &filename)
            || self.is_file_used_by_tag_def(&filename, def.tags())
            || self.is_file_used_by_tag_def(&filename, def.fragment_ids())
            || self.fragment_tag_defs(def).any(|sub| self.is_file_used_by_tag_def(&filename, sub))
    }

    fn fragment_tag_defs<'a>(&'a self, def: &ControllerDef) -> impl Iterator<Item = TagDefId> + 'a {
        let frags = self.tag_defs.get(def.fragment_ids());
        let count = def.fragment_defs.len();
        (0..count).filter_map(move |id| frags.and_then(|f| f.sub_tag_def(id)))
    }
}

fn first_tag_of(def: &TagDefinition, group: GroupId) -> Option<TagId> {
    (0..def.len()).find(|&id| def.tag_group(id) == Some(group))
}

#[derive(Clone, Copy, Debug)]
enum Renamed {
    Tag,
    Group,
}

impl Renamed {
    fn find(self, def: &TagDefinition, crc: u32) -> Option<usize> {
        match self {
            Renamed::Tag => def.find_crc(crc),
            Renamed::Group => def.find_group_crc(crc),
        }
    }

    fn set_name(self, def: &mut TagDefinition, id: usize, name: &str) -> bool {
        match self {
            Renamed::Tag => def.set_tag_name(id, name),
            Renamed::Group => def.set_group_name(id, name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ManagerConfig;
    use crate::fragment::Fragment;
    use crate::hash::crc32_lowercase;
    use crate::tag_definition::FragTagState;
    use std::fs;
    use tempfile::TempDir;

    fn manager_with(files: &[(&str, &str)]) -> (TempDir, AnimationDatabaseManager) {
        let dir = TempDir::new().unwrap();
        for (name, content) in files {
            fs::write(dir.path().join(name), content).unwrap();
        }
        let manager = AnimationDatabaseManager::new(ManagerConfig::default().with_root_dir(dir.path()));
        (dir, manager)
    }

    const BASE: &str = r#"<TagDefinition><Tag name="Crouch"/><Group name="Weapon"><Tag name="Rifle"/><Tag name="Pistol"/></Group></TagDefinition>"#;
    const SUB: &str = r#"<TagDefinition><Imports><Import filename="Base.xml"/></Imports><Tag name="Swim"/></TagDefinition>"#;
    const OTHER: &str = r#"<TagDefinition><Tag name="Crouch"/></TagDefinition>"#;

    #[test]
    fn rename_in_an_import_reaches_every_definition_sharing_it() {
        let (_dir, mut manager) = manager_with(&[("Base.xml", BASE), ("Sub.xml", SUB), ("Other.xml", OTHER)]);
        let base = manager.load_tag_def("Base.xml").unwrap();
        let sub = manager.load_tag_def("Sub.xml").unwrap();
        let other = manager.load_tag_def("Other.xml").unwrap();

        let mut renamed = manager.rename_tag(sub, crc32_lowercase("Crouch"), "Kneel").unwrap();
        renamed.sort();
        let mut expected = vec![base, sub];
        expected.sort();
        assert_eq!(renamed, expected);

        assert!(manager.tag_def(base).unwrap().find("Kneel").is_some());
        assert!(manager.tag_def(sub).unwrap().find("Kneel").is_some());
        assert!(manager.tag_def(other).unwrap().find("Crouch").is_some());
    }

    #[test]
    fn rename_of_a_local_tag_stays_local() {
        let (_dir, mut manager) = manager_with(&[("Base.xml", BASE), ("Sub.xml", SUB)]);
        let base = manager.load_tag_def("Base.xml").unwrap();
        let sub = manager.load_tag_def("Sub.xml").unwrap();
        assert_eq!(manager.rename_tag(sub, crc32_lowercase("Swim"), "Dive"), Ok(vec![sub]));
        assert!(manager.tag_def(base).unwrap().find("Dive").is_none());
    }

    #[test]
    fn group_rename_follows_the_declaring_file() {
        let (_dir, mut manager) = manager_with(&[("Base.xml", BASE), ("Sub.xml", SUB)]);
        let base = manager.load_tag_def("Base.xml").unwrap();
        let sub = manager.load_tag_def("Sub.xml").unwrap();
        let renamed = manager.rename_tag_group(sub, crc32_lowercase("Weapon"), "Gun").unwrap();
        assert_eq!(renamed.len(), 2);
        assert!(manager.tag_def(base).unwrap().find_group("Gun").is_some());
    }

    #[test]
    fn rename_to_a_name_visible_in_a_sharing_definition_is_refused() {
        let (_dir, mut manager) = manager_with(&[("Base.xml", BASE), ("Sub.xml", SUB)]);
        let base = manager.load_tag_def("Base.xml").unwrap();
        let sub = manager.load_tag_def("Sub.xml").unwrap();

        assert_eq!(
            manager.rename_tag(sub, crc32_lowercase("Swim"), "crouch"),
            Err(RenameTagError::DuplicateName {
                definition: "Sub.xml".into(),
                name: "crouch".into(),
            })
        );
        // Base itself has no Swim, but Sub sees both files.
        assert_eq!(
            manager.rename_tag(base, crc32_lowercase("Crouch"), "Swim"),
            Err(RenameTagError::DuplicateName {
                definition: "Sub.xml".into(),
                name: "Swim".into(),
            })
        );
        assert!(manager.tag_def(base).unwrap().find("Crouch").is_some());
        let names: Vec<&str> = manager.tag_def(sub).unwrap().tag_names().collect();
        assert_eq!(names.iter().filter(|n| n.eq_ignore_ascii_case("crouch")).count(), 1);
        assert_eq!(names.iter().filter(|n| n.eq_ignore_ascii_case("swim")).count(), 1);

        // A case change of the same tag is fine.
        assert_eq!(manager.rename_tag(sub, crc32_lowercase("Swim"), "SWIM"), Ok(vec![sub]));
    }

    #[test]
    fn rename_to_an_invalid_identifier_is_refused() {
        let (_dir, mut manager) = manager_with(&[("Base.xml", BASE), ("Sub.xml", SUB)]);
        let base = manager.load_tag_def("Base.xml").unwrap();
        let sub = manager.load_tag_def("Sub.xml").unwrap();

        for bad in ["12 bad+x", "Two Words", "Crouch+Swim", ""] {
            assert_eq!(
                manager.rename_tag(sub, crc32_lowercase("Swim"), bad),
                Err(RenameTagError::InvalidNameIdentifier),
                "{bad:?}"
            );
        }
        assert_eq!(
            manager.rename_tag_group(sub, crc32_lowercase("Weapon"), "Side Arm"),
            Err(RenameTagError::InvalidNameIdentifier)
        );
        assert_eq!(
            manager.rename_tag(sub, crc32_lowercase("Missing"), "Fine"),
            Err(RenameTagError::NotFound(crc32_lowercase("Missing")))
        );
        assert!(manager.tag_def(sub).unwrap().find("Swim").is_some());
        assert!(manager.tag_def(base).unwrap().find_group("Weapon").is_some());
    }

    #[test]
    fn included_tag_defs_lists_cached_imports() {
        let (_dir, mut manager) = manager_with(&[("Base.xml", BASE), ("Sub.xml", SUB)]);
        let sub = manager.load_tag_def("Sub.xml").unwrap();
        assert!(manager.included_tag_defs(sub).is_empty());
        let base = manager.load_tag_def("Base.xml").unwrap();
        assert_eq!(manager.included_tag_defs(sub), vec![base]);
    }

    const FRAGS: &str = r#"<TagDefinition><Tag name="Idle"/><Tag name="Move"/></TagDefinition>"#;
    const DEF: &str = r#"<ControllerDef><Tags filename="Sub.xml"/><Fragments filename="frags.xml"/></ControllerDef>"#;

    #[test]
    fn controller_def_uses_its_vocabularies_and_their_imports() {
        let (_dir, mut manager) =
            manager_with(&[("Base.xml", BASE), ("Sub.xml", SUB), ("frags.xml", FRAGS), ("def.xml", DEF)]);
        let def = manager.load_controller_def("def.xml").unwrap();
        assert!(manager.is_file_used_by_controller_def(def, "DEF.xml"));
        assert!(manager.is_file_used_by_controller_def(def, "Base.xml"));
        assert!(manager.is_file_used_by_controller_def(def, "frags.xml"));
        assert!(!manager.is_file_used_by_controller_def(def, "unrelated.xml"));
    }

    #[test]
    fn affected_fragments_reports_tag_sets_using_the_tag() {
        let (_dir, mut manager) = manager_with(&[
            ("Base.xml", BASE),
            ("frags.xml", FRAGS),
            ("a.adb", r#"<AnimDB FragDef="frags.xml" TagDef="Base.xml"/>"#),
        ]);
        let db = manager.load("a.adb").unwrap();
        let tags = manager.find_tag_def("Base.xml").unwrap();
        let crouch = manager.tag_def(tags).unwrap().tag_list_to_flags("Crouch+Rifle").state;
        manager
            .add_fragment_entry(db, 1, FragTagState::global(crouch), Fragment::single("crouch_move"))
            .unwrap();

        let affected = manager.affected_fragments(tags, 0);
        assert_eq!(
            affected,
            vec![AffectedFragment {
                database: db,
                fragment: "Move".into(),
                tags: "Crouch+Rifle".into(),
            }]
        );
        assert!(manager.affected_fragments(tags, 2).is_empty());
    }

    #[test]
    fn applied_changes_remap_or_drop_sub_adb_filters() {
        let (dir, mut manager) = manager_with(&[
            ("tags.xml", r#"<TagDefinition><Tag name="Crouch"/><Tag name="Swim"/></TagDefinition>"#),
            ("frags.xml", FRAGS),
            (
                "a.adb",
                r#"<AnimDB FragDef="frags.xml" TagDef="tags.xml">
                     <SubADBs>
                       <SubADB Tags="Swim" File="swim.adb"/>
                       <SubADB Tags="Crouch" File="crouch.adb"/>
                     </SubADBs>
                   </AnimDB>"#,
            ),
            ("swim.adb", r#"<AnimDB FragDef="frags.xml" TagDef="tags.xml"/>"#),
            ("crouch.adb", r#"<AnimDB FragDef="frags.xml" TagDef="tags.xml"/>"#),
        ]);
        let db = manager.load("a.adb").unwrap();
        let tags = manager.find_tag_def("tags.xml").unwrap();

        // Drop "Crouch", keep "Swim" which moves to bit 0.
        let mut modified = TagDefinition::new("scratch");
        modified.add_tag("Swim", None, 0);
        modified.assign_bits();
        manager.apply_tag_def_changes(tags, modified).unwrap();

        let db = manager.database(db).unwrap();
        assert_eq!(db.sub_adbs().len(), 1);
        let swim = &db.sub_adbs()[0];
        assert_eq!(swim.filename, "swim.adb");
        let def = manager.tag_def(tags).unwrap();
        assert_eq!(def.filename(), "tags.xml");
        assert_eq!(def.flags_to_tag_list(swim.tags), "Swim");

        let written = fs::read_to_string(dir.path().join("tags.xml")).unwrap();
        assert!(!written.contains("Crouch"));
    }
}
