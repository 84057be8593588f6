//! SubADB filter edits.
//!
//! A SubADB file may be part of several cached databases. Filter edits are
//! applied to each of them, then every cached database loaded from a SubADB
//! file of the edited database is rebuilt from what the edited database
//! would now write to that file.

use mannequin_xml::XmlNode;
use tracing::{debug, warn};

use super::AnimationDatabaseManager;
use crate::cache::DatabaseId;
use crate::codec;
use crate::database::{FragmentId, SubAdb};
use crate::error::EditError;
use crate::hash::normalize_path;
use crate::ownership::Ownership;
use crate::tag_definition::TagState;

impl AnimationDatabaseManager {
    /// Run `edit` on the SubADB `filename` of every cached database holding
    /// it. Returns how many were edited.
    fn edit_sub_adb_everywhere(&mut self, filename: &str, mut edit: impl FnMut(&mut SubAdb)) -> usize {
        let mut edited = 0;
        for (_, db) in self.databases.iter_mut() {
            if let Some(sub) = db.find_sub_adb_mut(filename) {
                edit(sub);
                edited += 1;
            }
        }
        edited
    }

    /// Add fragment `id` to the fragment filter of the SubADB `filename`.
    ///
    /// The working database gains a root-level SubADB when it has none by
    /// that name.
    pub fn add_sub_adb_fragment_filter(
        &mut self,
        working: DatabaseId,
        filename: &str,
        id: FragmentId,
    ) -> Result<(), EditError> {
        let filename = normalize_path(filename);
        let db = self.databases.get_mut(working).ok_or(EditError::UnknownDatabase)?;
        if id >= db.fragment_count() {
            return Err(EditError::InvalidFragmentId(id));
        }
        if !db.add_sub_adb_fragment_filter(&filename, id) {
            debug!(database = %db.filename(), sub_adb = %filename, "created SubADB");
        }
        self.edit_sub_adb_everywhere(&filename, |sub| {
            if !sub.frag_ids.contains(&id) {
                sub.frag_ids.push(id);
            }
        });
        self.reconcile_sub_databases(working);
        Ok(())
    }

    pub fn remove_sub_adb_fragment_filter(
        &mut self,
        working: DatabaseId,
        filename: &str,
        id: FragmentId,
    ) -> Result<(), EditError> {
        let filename = normalize_path(filename);
        self.working_sub_adb(working, &filename)?;
        self.edit_sub_adb_everywhere(&filename, |sub| sub.frag_ids.retain(|f| *f != id));
        self.reconcile_sub_databases(working);
        Ok(())
    }

    /// Set the tag filter of the SubADB `filename`. The comparison mask is
    /// derived from the SubADB's own tag vocabulary.
    pub fn set_sub_adb_tag_filter(
        &mut self,
        working: DatabaseId,
        filename: &str,
        tags: TagState,
    ) -> Result<(), EditError> {
        let filename = normalize_path(filename);
        let db = self.databases.get_mut(working).ok_or(EditError::UnknownDatabase)?;
        if db.find_sub_adb(&filename).is_none() {
            let Some(tag_def) = self.tag_defs.get(db.tag_def()) else {
                return Err(EditError::DanglingHandle);
            };
            db.set_sub_adb_tag_filter(&filename, tags, tag_def);
            debug!(database = %db.filename(), sub_adb = %filename, "created SubADB");
        }
        let tag_defs = &self.tag_defs;
        for (_, db) in self.databases.iter_mut() {
            if let Some(sub) = db.find_sub_adb_mut(&filename) {
                sub.tags = tags;
                sub.comparison_mask = tag_defs
                    .get(sub.tag_def)
                    .map_or(TagState::EMPTY, |def| def.generate_mask(tags));
            }
        }
        self.reconcile_sub_databases(working);
        Ok(())
    }

    /// Drop both filters of the SubADB `filename`.
    pub fn clear_sub_adb_filter(&mut self, working: DatabaseId, filename: &str) -> Result<(), EditError> {
        let filename = normalize_path(filename);
        self.working_sub_adb(working, &filename)?;
        self.edit_sub_adb_everywhere(&filename, |sub| {
            sub.tags = TagState::EMPTY;
            sub.comparison_mask = TagState::EMPTY;
            sub.frag_ids.clear();
        });
        self.reconcile_sub_databases(working);
        Ok(())
    }

    /// Remove the SubADB `filename` from every cached database. Its data
    /// stays in the databases and is owned by the parent file from now on.
    pub fn delete_sub_adb(&mut self, working: DatabaseId, filename: &str) -> Result<(), EditError> {
        let filename = normalize_path(filename);
        self.working_sub_adb(working, &filename)?;
        for (_, db) in self.databases.iter_mut() {
            db.delete_sub_adb(&filename);
        }
        self.reconcile_sub_databases(working);
        Ok(())
    }

    /// Swap the SubADB `filename` with its previous (`up`) or next sibling.
    /// Earlier siblings win ownership ties.
    pub fn move_sub_adb(&mut self, working: DatabaseId, filename: &str, up: bool) -> Result<bool, EditError> {
        let filename = normalize_path(filename);
        self.working_sub_adb(working, &filename)?;
        let mut moved = false;
        for (id, db) in self.databases.iter_mut() {
            let done = db.move_sub_adb(&filename, up);
            if id == working {
                moved = done;
            }
        }
        if moved {
            self.reconcile_sub_databases(working);
        }
        Ok(moved)
    }

    pub fn sub_adb_fragment_filters(&self, db: DatabaseId, filename: &str) -> Result<&[FragmentId], EditError> {
        let db = self.databases.get(db).ok_or(EditError::UnknownDatabase)?;
        Ok(db.sub_adb_fragment_filters(filename))
    }

    pub fn sub_adb_tag_filter(&self, db: DatabaseId, filename: &str) -> Result<Option<TagState>, EditError> {
        let db = self.databases.get(db).ok_or(EditError::UnknownDatabase)?;
        Ok(db.sub_adb_tag_filter(filename))
    }

    fn working_sub_adb(&self, working: DatabaseId, filename: &str) -> Result<&SubAdb, EditError> {
        let db = self.databases.get(working).ok_or(EditError::UnknownDatabase)?;
        db.find_sub_adb(filename).ok_or_else(|| {
            warn!(database = %db.filename(), sub_adb = %filename, "no such SubADB");
            EditError::UnknownSubAdb(filename.to_string())
        })
    }

    // =========================================================================
    // Reconciliation
    // =========================================================================

    /// Rebuild every cached database loaded from a SubADB file of `source`
    /// from the document `source` would write for that file.
    pub(super) fn reconcile_sub_databases(&mut self, source: DatabaseId) {
        let Some(source_db) = self.databases.get(source) else {
            return;
        };
        let mut rebuilt: Vec<(DatabaseId, String, XmlNode)> = Vec::new();
        {
            let Some(ownership) = Ownership::new(source_db, &self.tag_defs) else {
                warn!(database = %source_db.filename(), "vocabularies not loaded, SubADBs not reconciled");
                return;
            };
            let plan = ownership.prepare_save();
            for (target, db) in self.databases.iter() {
                if target == source {
                    continue;
                }
                let Some(node) = ownership.node_for(db.filename()) else {
                    continue;
                };
                if node.is_none() {
                    continue;
                }
                if let Some(xml) =
                    codec::database::save(&ownership, source_db, node, &plan, &self.tag_defs, false)
                {
                    rebuilt.push((target, db.filename().to_string(), xml));
                }
            }
        }

        for (target, filename, xml) in rebuilt {
            match codec::database::load(&xml, &filename, self) {
                Ok(db) => {
                    debug!(database = %filename, "reconciled SubADB database");
                    self.databases.replace(target, db);
                }
                Err(err) => {
                    warn!(database = %filename, error = %err, "failed to reconcile SubADB database");
                    if let Some(db) = self.databases.get_mut(target) {
                        db.clear();
                    }
                }
            }
        }
    }
}
