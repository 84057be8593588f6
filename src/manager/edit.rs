//! Fragment entry and blend edits.
//!
//! An entry lives in exactly one file of a SubADB tree, but that file may be
//! part of several cached databases (a SubADB file can also be loaded on its
//! own). Entry edits are mirrored into every cached database containing the
//! owning file, translating fragment ids and tag states by name.

use tracing::warn;

use super::AnimationDatabaseManager;
use crate::cache::DatabaseId;
use crate::database::{AnimationDatabase, BlendVariant, FragmentBlendKey, FragmentId};
use crate::error::EditError;
use crate::fragment::{BlendUid, Fragment, FragmentBlend};
use crate::ownership::Ownership;
use crate::tag_definition::{FragTagState, TagState};

impl AnimationDatabaseManager {
    fn working_database(&self, id: DatabaseId) -> Result<&AnimationDatabase, EditError> {
        self.databases.get(id).ok_or(EditError::UnknownDatabase)
    }

    fn working_database_mut(&mut self, id: DatabaseId) -> Result<&mut AnimationDatabase, EditError> {
        self.databases.get_mut(id).ok_or(EditError::UnknownDatabase)
    }

    /// Every cached database containing the file that owns fragment `id`
    /// under `tags` in `working`, `working` first.
    ///
    /// Falls back to `working` alone when no owner can be determined.
    pub fn find_impacted_databases(
        &self,
        working: DatabaseId,
        id: FragmentId,
        tags: TagState,
    ) -> Vec<DatabaseId> {
        let Some(db) = self.databases.get(working) else {
            return Vec::new();
        };
        let owner = Ownership::new(db, &self.tag_defs).and_then(|o| o.find_root_sub_adb(id, tags));
        let Some(owner) = owner else {
            warn!(database = %db.filename(), fragment = id, "no owning file found, editing the working database only");
            return vec![working];
        };

        let mut impacted = vec![working];
        impacted.extend(
            self.databases
                .iter()
                .filter(|(other, candidate)| *other != working && candidate.has_file(owner))
                .map(|(other, _)| other),
        );
        if !db.has_file(owner) {
            warn!(database = %db.filename(), owner = %owner, "owning file outside the working database");
        }
        impacted
    }

    /// Express fragment `id` and `tags` of `from` in the vocabularies of `to`.
    fn translate(
        &self,
        from: &AnimationDatabase,
        to: &AnimationDatabase,
        id: FragmentId,
        tags: &FragTagState,
    ) -> Option<(FragmentId, FragTagState)> {
        if from.tag_def() == to.tag_def() && from.frag_def() == to.frag_def() {
            return Some((id, *tags));
        }
        let cache = &self.tag_defs;
        let (src_frags, dst_frags) = (cache.get(from.frag_def())?, cache.get(to.frag_def())?);
        let target = dst_frags.find_crc(src_frags.tag_crc(id)?)?;

        let (src_tags, dst_tags) = (cache.get(from.tag_def())?, cache.get(to.tag_def())?);
        let global_tags = src_tags.map_tag_state(tags.global_tags, dst_tags)?;
        let fragment_tags = if tags.fragment_tags.is_empty() {
            TagState::EMPTY
        } else {
            let src_sub = cache.get(src_frags.sub_tag_def(id)?)?;
            let dst_sub = cache.get(dst_frags.sub_tag_def(target)?)?;
            src_sub.map_tag_state(tags.fragment_tags, dst_sub)?
        };
        Some((target, FragTagState::new(global_tags, fragment_tags)))
    }

    /// Targets of a mirrored entry edit: `(database, fragment id, tags)`,
    /// the working database first.
    fn entry_targets(
        &self,
        working: DatabaseId,
        id: FragmentId,
        tags: &FragTagState,
    ) -> Result<Vec<(DatabaseId, FragmentId, FragTagState)>, EditError> {
        let db = self.working_database(working)?;
        if id >= db.fragment_count() {
            return Err(EditError::InvalidFragmentId(id));
        }
        let mut targets = Vec::new();
        for other in self.find_impacted_databases(working, id, tags.global_tags) {
            if other == working {
                targets.push((working, id, *tags));
                continue;
            }
            let Some(other_db) = self.databases.get(other) else {
                continue;
            };
            match self.translate(db, other_db, id, tags) {
                Some((other_id, other_tags)) => targets.push((other, other_id, other_tags)),
                None => warn!(
                    database = %other_db.filename(),
                    fragment = id,
                    "entry cannot be expressed in this database, not mirrored"
                ),
            }
        }
        Ok(targets)
    }

    fn mismatch(&self, db: DatabaseId, expected: usize, actual: usize) -> EditError {
        EditError::IndexMismatch {
            database: self
                .databases
                .get(db)
                .map(|d| d.filename().to_string())
                .unwrap_or_default(),
            expected,
            actual,
        }
    }

    // =========================================================================
    // Entries
    // =========================================================================

    /// Append an option; returns its index in the working database.
    ///
    /// Every mirrored copy must land at the same index, otherwise
    /// [`EditError::IndexMismatch`] is returned after all copies were applied.
    pub fn add_fragment_entry(
        &mut self,
        working: DatabaseId,
        id: FragmentId,
        tags: FragTagState,
        fragment: Fragment,
    ) -> Result<usize, EditError> {
        let targets = self.entry_targets(working, id, &tags)?;
        let mut primary = None;
        let mut mismatch = None;
        for (db_id, target_id, target_tags) in targets {
            let Some(db) = self.databases.get_mut(db_id) else {
                continue;
            };
            let Some(index) = db.add_entry(target_id, target_tags, fragment.clone(), &self.tag_defs) else {
                if db_id == working {
                    return Err(EditError::InvalidFragmentId(id));
                }
                continue;
            };
            match primary {
                None => primary = Some(index),
                Some(expected) if expected != index && mismatch.is_none() => {
                    mismatch = Some(self.mismatch(db_id, expected, index));
                }
                Some(_) => {}
            }
        }
        if let Some(err) = mismatch {
            return Err(err);
        }
        primary.ok_or(EditError::InvalidFragmentId(id))
    }

    /// Overwrite option `option` of the tag set `tags`, creating the tag set
    /// when needed, in every impacted database.
    pub fn set_fragment_entry(
        &mut self,
        working: DatabaseId,
        id: FragmentId,
        tags: FragTagState,
        option: usize,
        fragment: Fragment,
    ) -> Result<(), EditError> {
        let targets = self.entry_targets(working, id, &tags)?;
        for (db_id, target_id, target_tags) in targets {
            let Some(db) = self.databases.get_mut(db_id) else {
                continue;
            };
            let done = db.set_entry(target_id, target_tags, option, fragment.clone(), &self.tag_defs);
            if !done && db_id == working {
                return Err(EditError::InvalidFragmentId(id));
            }
        }
        Ok(())
    }

    /// Remove options of the tag set `tags` in every impacted database.
    ///
    /// Returns whether the working database had the tag set.
    pub fn delete_fragment_entries(
        &mut self,
        working: DatabaseId,
        id: FragmentId,
        tags: FragTagState,
        options: &[usize],
    ) -> Result<bool, EditError> {
        let targets = self.entry_targets(working, id, &tags)?;
        let mut deleted = false;
        for (db_id, target_id, target_tags) in targets {
            if let Some(db) = self.databases.get_mut(db_id) {
                let done = db.delete_entries(target_id, &target_tags, options);
                if db_id == working {
                    deleted = done;
                }
            }
        }
        Ok(deleted)
    }

    pub fn delete_fragment_entry(
        &mut self,
        working: DatabaseId,
        id: FragmentId,
        tags: FragTagState,
        option: usize,
    ) -> Result<bool, EditError> {
        self.delete_fragment_entries(working, id, tags, &[option])
    }

    // =========================================================================
    // Blends
    // =========================================================================

    pub fn add_blend(
        &mut self,
        db: DatabaseId,
        key: FragmentBlendKey,
        tags_from: FragTagState,
        tags_to: FragTagState,
        blend: FragmentBlend,
    ) -> Result<BlendUid, EditError> {
        let count = self.working_database(db)?.fragment_count();
        for id in [key.from, key.to].into_iter().flatten() {
            if id >= count {
                return Err(EditError::InvalidFragmentId(id));
            }
        }
        let Some(database) = self.databases.get_mut(db) else {
            return Err(EditError::UnknownDatabase);
        };
        Ok(database.add_blend(key, tags_from, tags_to, blend, &self.tag_defs))
    }

    /// Replace the blend `uid`. Returns false if it does not exist.
    pub fn set_blend(
        &mut self,
        db: DatabaseId,
        key: FragmentBlendKey,
        tags_from: &FragTagState,
        tags_to: &FragTagState,
        uid: BlendUid,
        blend: FragmentBlend,
    ) -> Result<bool, EditError> {
        Ok(self
            .working_database_mut(db)?
            .set_blend(key, tags_from, tags_to, uid, blend))
    }

    pub fn delete_blend(
        &mut self,
        db: DatabaseId,
        key: FragmentBlendKey,
        tags_from: &FragTagState,
        tags_to: &FragTagState,
        uid: BlendUid,
    ) -> Result<bool, EditError> {
        Ok(self
            .working_database_mut(db)?
            .delete_blend(key, tags_from, tags_to, uid))
    }

    /// Fragment pairs that have blends in `db`.
    pub fn fragment_blends(&self, db: DatabaseId) -> Result<Vec<FragmentBlendKey>, EditError> {
        Ok(self.working_database(db)?.blend_keys())
    }

    pub fn fragment_blend_variants(
        &self,
        db: DatabaseId,
        key: FragmentBlendKey,
    ) -> Result<&[BlendVariant], EditError> {
        Ok(self.working_database(db)?.blend_variants(key))
    }

    pub fn fragment_blend(
        &self,
        db: DatabaseId,
        key: FragmentBlendKey,
        tags_from: &FragTagState,
        tags_to: &FragTagState,
        uid: BlendUid,
    ) -> Result<Option<&FragmentBlend>, EditError> {
        Ok(self
            .working_database(db)?
            .blend(key, tags_from, tags_to, uid))
    }
}
