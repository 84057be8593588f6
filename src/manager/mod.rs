//! The animation database manager.
//!
//! Owns the three resource caches and is the only place that mutates them:
//!
//! ```text
//! tag definitions   ◄── controller definitions ◄── animation databases
//! (+ imports trees)      (tags, fragment ids)       (tag_def, frag_def, SubADBs)
//! ```
//!
//! Resources refer to each other through cache handles. A handle stays valid
//! until [`unload_all`](AnimationDatabaseManager::unload_all); reverting a
//! resource swaps its data behind the same handle and bumps its generation.
//!
//! Operations are grouped by concern:
//!
//! - `load`: loading, creation, revert, snapshots
//! - `fragment_ids`: fragment-id vocabulary edits and their propagation
//! - `edit`: fragment entry and blend edits mirrored across databases
//! - `tags`: tag renames and tag-definition replacement
//! - `sub_adb`: SubADB filter edits
//! - `save`: writing resources back out

mod edit;
mod fragment_ids;
mod load;
mod save;
mod sub_adb;
mod tags;

pub use load::Snapshot;
pub use save::{FileWriter, MannequinWriter};
pub use tags::AffectedFragment;

use std::sync::Arc;

use mannequin_xml::XmlNode;

use crate::cache::{ControllerDefId, DatabaseId, ResourceCache, TagDefId};
use crate::codec::ResourceSource;
use crate::config::ManagerConfig;
use crate::controller_def::{ControllerDef, ControllerDefCache};
use crate::database::{AnimationDatabase, TagDefCache};
use crate::error::LoadError;
use crate::hash::same_path;
use crate::imports::{ImportsInfo, ImportsRegistry};
use crate::listener::{ListenerId, Listeners, MannequinListener};
use crate::tag_definition::TagDefinition;

pub type DatabaseCache = ResourceCache<DatabaseId, AnimationDatabase>;

/// Controller definitions and databases sharing one fragment vocabulary.
#[derive(Debug, Default)]
struct Dependents {
    controller_defs: Vec<ControllerDefId>,
    databases: Vec<DatabaseId>,
}

/// Loads, caches, edits and saves Mannequin resources.
#[derive(Debug, Default)]
pub struct AnimationDatabaseManager {
    config: ManagerConfig,
    tag_defs: TagDefCache,
    imports: ImportsRegistry,
    controller_defs: ControllerDefCache,
    databases: DatabaseCache,
    listeners: Listeners,
    /// Tag definitions and controller definitions currently being loaded.
    loading: Vec<String>,
}

impl AnimationDatabaseManager {
    pub fn new(config: ManagerConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    #[inline]
    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    // -------------------------------------------------------------------------
    // Lookups
    // -------------------------------------------------------------------------

    pub fn find_database(&self, filename: &str) -> Option<DatabaseId> {
        self.databases.find(filename)
    }

    pub fn find_controller_def(&self, filename: &str) -> Option<ControllerDefId> {
        self.controller_defs.find(filename)
    }

    pub fn find_tag_def(&self, filename: &str) -> Option<TagDefId> {
        self.tag_defs.find(filename)
    }

    #[inline]
    pub fn database(&self, id: DatabaseId) -> Option<&AnimationDatabase> {
        self.databases.get(id)
    }

    #[inline]
    pub fn controller_def(&self, id: ControllerDefId) -> Option<&ControllerDef> {
        self.controller_defs.get(id)
    }

    #[inline]
    pub fn tag_def(&self, id: TagDefId) -> Option<&TagDefinition> {
        self.tag_defs.get(id)
    }

    /// Import tree of a cached tag definition.
    pub fn imports_info(&self, id: TagDefId) -> Option<&ImportsInfo> {
        self.imports.get(self.tag_defs.get(id)?.filename())
    }

    /// The tag-definition cache, for codecs and ownership queries.
    #[inline]
    pub fn tag_defs(&self) -> &TagDefCache {
        &self.tag_defs
    }

    pub fn loaded_databases(&self) -> Vec<DatabaseId> {
        self.databases.keys()
    }

    pub fn loaded_controller_defs(&self) -> Vec<ControllerDefId> {
        self.controller_defs.keys()
    }

    pub fn loaded_tag_defs(&self) -> Vec<TagDefId> {
        self.tag_defs.keys()
    }

    /// Number of times the database was reloaded or replaced in place.
    pub fn database_generation(&self, id: DatabaseId) -> Option<u32> {
        self.databases.generation(id)
    }

    pub fn controller_def_generation(&self, id: ControllerDefId) -> Option<u32> {
        self.controller_defs.generation(id)
    }

    pub fn tag_def_generation(&self, id: TagDefId) -> Option<u32> {
        self.tag_defs.generation(id)
    }

    /// Controller definitions and databases whose fragment vocabulary is
    /// `frag_def`'s file.
    fn fragment_dependents(&self, frag_def: TagDefId) -> Dependents {
        let Some(filename) = self.tag_defs.get(frag_def).map(TagDefinition::filename) else {
            return Dependents::default();
        };
        let shares = |vocabulary: TagDefId| {
            self.tag_defs
                .get(vocabulary)
                .is_some_and(|f| same_path(f.filename(), filename))
        };
        Dependents {
            controller_defs: self
                .controller_defs
                .iter()
                .filter(|(_, def)| shares(def.fragment_ids()))
                .map(|(id, _)| id)
                .collect(),
            databases: self
                .databases
                .iter()
                .filter(|(_, db)| shares(db.frag_def()))
                .map(|(id, _)| id)
                .collect(),
        }
    }

    // -------------------------------------------------------------------------
    // Listeners
    // -------------------------------------------------------------------------

    pub fn register_listener(&mut self, listener: Arc<dyn MannequinListener>) -> ListenerId {
        self.listeners.register(listener)
    }

    /// Safe to call from inside a notification.
    pub fn unregister_listener(&mut self, id: ListenerId) -> bool {
        self.listeners.unregister(id)
    }

    fn notify_tag_def_invalidated(&self, id: TagDefId) {
        if let Some(def) = self.tag_defs.get(id) {
            self.listeners.notify(id, def);
        }
    }
}

// =============================================================================
// ResourceSource
// =============================================================================

impl ResourceSource for AnimationDatabaseManager {
    fn read_xml(&self, filename: &str) -> Result<XmlNode, LoadError> {
        Ok(mannequin_xml::read_file(self.config.resolve(filename))?)
    }

    fn tag_defs(&self) -> &TagDefCache {
        &self.tag_defs
    }

    fn load_tag_def(&mut self, filename: &str) -> Result<TagDefId, LoadError> {
        AnimationDatabaseManager::load_tag_def(self, filename)
    }

    fn load_controller_vocabularies(
        &mut self,
        filename: &str,
    ) -> Result<(TagDefId, TagDefId), LoadError> {
        let id = self.load_controller_def(filename)?;
        let def = self
            .controller_defs
            .get(id)
            .ok_or_else(|| LoadError::NotLoaded(filename.to_string()))?;
        Ok((def.tags(), def.fragment_ids()))
    }

    fn log_unknown_tags(&self) -> bool {
        self.config.log_unknown_tags
    }
}
