//! Fragment-id vocabulary edits.
//!
//! A fragment vocabulary is shared by every controller definition and
//! database that references its file. Creating or deleting an id changes the
//! length of `fragment_defs` and of the fragment lists of all of them, so
//! every dependent is checked before anything is mutated.

use tracing::{debug, warn};

use super::{AnimationDatabaseManager, Dependents};
use crate::cache::{ControllerDefId, TagDefId};
use crate::controller_def::FragmentDef;
use crate::database::FragmentId;
use crate::error::ModifyFragmentIdError;
use crate::hash::is_valid_name_identifier;

impl AnimationDatabaseManager {
    /// Every dependent must hold exactly one slot per fragment id.
    fn check_dependents(
        &self,
        dependents: &Dependents,
        expected: usize,
    ) -> Result<(), ModifyFragmentIdError> {
        for &id in &dependents.controller_defs {
            if let Some(def) = self.controller_defs.get(id)
                && def.fragment_defs.len() != expected
            {
                return Err(ModifyFragmentIdError::Inconsistent(format!(
                    "{} has {} fragment definitions, expected {expected}",
                    def.filename(),
                    def.fragment_defs.len()
                )));
            }
        }
        for &id in &dependents.databases {
            if let Some(db) = self.databases.get(id)
                && db.fragment_count() != expected
            {
                return Err(ModifyFragmentIdError::Inconsistent(format!(
                    "{} has {} fragment entries, expected {expected}",
                    db.filename(),
                    db.fragment_count()
                )));
            }
        }
        Ok(())
    }

    /// Append a fragment id named `name` to `frag_def`.
    ///
    /// Every controller definition sharing the vocabulary gains a default
    /// [`FragmentDef`] and every database an empty entry, all at the new id.
    pub fn create_fragment_id(
        &mut self,
        frag_def: TagDefId,
        name: &str,
    ) -> Result<FragmentId, ModifyFragmentIdError> {
        let vocabulary = self
            .tag_defs
            .get(frag_def)
            .ok_or(ModifyFragmentIdError::UnknownInputTagDefinition)?;
        if !is_valid_name_identifier(name) {
            return Err(ModifyFragmentIdError::InvalidNameIdentifier);
        }
        if vocabulary.find(name).is_some() {
            return Err(ModifyFragmentIdError::DuplicateName);
        }
        let dependents = self.fragment_dependents(frag_def);
        self.check_dependents(&dependents, vocabulary.len())?;

        let Some(vocabulary) = self.tag_defs.get_mut(frag_def) else {
            return Err(ModifyFragmentIdError::UnknownInputTagDefinition);
        };
        let id = vocabulary
            .add_tag(name, None, 0)
            .ok_or(ModifyFragmentIdError::DuplicateName)?;
        vocabulary.assign_bits();
        let filename = vocabulary.filename().to_string();
        self.imports.entry(&filename).add_tag(id);

        for def_id in dependents.controller_defs {
            if let Some(def) = self.controller_defs.get_mut(def_id) {
                def.push_fragment_def();
            }
        }
        for db_id in dependents.databases {
            if let Some(db) = self.databases.get_mut(db_id) {
                let index = db.push_fragment_entry();
                debug_assert_eq!(index, id, "fragment entry index must match the new id");
            }
        }

        debug!(frag_def = %filename, fragment = %name, id, "created fragment id");
        self.notify_tag_def_invalidated(frag_def);
        Ok(id)
    }

    /// Rename a fragment id. Nothing else changes structurally.
    pub fn rename_fragment_id(
        &mut self,
        frag_def: TagDefId,
        id: FragmentId,
        name: &str,
    ) -> Result<(), ModifyFragmentIdError> {
        let vocabulary = self
            .tag_defs
            .get(frag_def)
            .ok_or(ModifyFragmentIdError::UnknownInputTagDefinition)?;
        if !vocabulary.is_valid_tag(id) {
            return Err(ModifyFragmentIdError::InvalidFragmentId);
        }
        if !is_valid_name_identifier(name) {
            return Err(ModifyFragmentIdError::InvalidNameIdentifier);
        }
        if vocabulary.find(name).is_some_and(|existing| existing != id) {
            return Err(ModifyFragmentIdError::DuplicateName);
        }

        if let Some(vocabulary) = self.tag_defs.get_mut(frag_def) {
            vocabulary.set_tag_name(id, name);
        }
        debug!(fragment = %name, id, "renamed fragment id");
        self.notify_tag_def_invalidated(frag_def);
        Ok(())
    }

    /// Remove fragment id `id`; later ids shift down by one everywhere.
    ///
    /// Every collection is edited with the numbering from before the removal.
    pub fn delete_fragment_id(
        &mut self,
        frag_def: TagDefId,
        id: FragmentId,
    ) -> Result<(), ModifyFragmentIdError> {
        let vocabulary = self
            .tag_defs
            .get(frag_def)
            .ok_or(ModifyFragmentIdError::UnknownInputTagDefinition)?;
        if !vocabulary.is_valid_tag(id) {
            return Err(ModifyFragmentIdError::InvalidFragmentId);
        }
        let dependents = self.fragment_dependents(frag_def);
        self.check_dependents(&dependents, vocabulary.len())?;

        let Some(vocabulary) = self.tag_defs.get_mut(frag_def) else {
            return Err(ModifyFragmentIdError::UnknownInputTagDefinition);
        };
        let name = vocabulary.tag_name(id).unwrap_or_default().to_string();
        vocabulary.remove_tag(id);
        let filename = vocabulary.filename().to_string();
        if let Some(info) = self.imports.get_mut(&filename) {
            info.remove_tag(id);
        }

        for def_id in &dependents.controller_defs {
            if let Some(def) = self.controller_defs.get_mut(*def_id) {
                def.remove_fragment_def(id);
            }
        }
        for db_id in self.databases.keys() {
            let Some(db) = self.databases.get_mut(db_id) else {
                continue;
            };
            if dependents.databases.contains(&db_id) {
                db.delete_fragment_id(id);
            } else {
                // SubADB filters may still use this vocabulary.
                db.adjust_sub_adbs_after_fragment_id_deletion(id, frag_def);
            }
        }

        debug!(frag_def = %filename, fragment = %name, id, "deleted fragment id");
        self.notify_tag_def_invalidated(frag_def);
        Ok(())
    }

    /// Give fragment `id` its own fragment-tag vocabulary, or remove it.
    pub fn set_fragment_tag_def(
        &mut self,
        frag_def: TagDefId,
        id: FragmentId,
        sub_tag_def: Option<TagDefId>,
    ) -> Result<(), ModifyFragmentIdError> {
        if sub_tag_def.is_some_and(|sub| !self.tag_defs.contains(sub)) {
            return Err(ModifyFragmentIdError::UnknownInputTagDefinition);
        }
        let vocabulary = self
            .tag_defs
            .get_mut(frag_def)
            .ok_or(ModifyFragmentIdError::UnknownInputTagDefinition)?;
        if !vocabulary.is_valid_tag(id) {
            return Err(ModifyFragmentIdError::InvalidFragmentId);
        }
        vocabulary.set_sub_tag_def(id, sub_tag_def);

        for def_id in self.fragment_dependents(frag_def).controller_defs {
            if let Some(def) = self.controller_defs.get_mut(def_id) {
                def.sort_scope_masks(&self.tag_defs);
            }
        }
        self.notify_tag_def_invalidated(frag_def);
        Ok(())
    }

    /// Replace the definition of fragment `id` in one controller definition.
    pub fn set_fragment_def(
        &mut self,
        controller_def: ControllerDefId,
        id: FragmentId,
        fragment_def: FragmentDef,
    ) -> Result<(), ModifyFragmentIdError> {
        let Some(def) = self.controller_defs.get_mut(controller_def) else {
            warn!(controller_def = ?controller_def, "unknown controller definition");
            return Err(ModifyFragmentIdError::UnknownInputTagDefinition);
        };
        let Some(slot) = def.fragment_defs.get_mut(id) else {
            return Err(ModifyFragmentIdError::InvalidFragmentId);
        };
        *slot = fragment_def;
        def.sort_scope_masks(&self.tag_defs);
        Ok(())
    }
}
