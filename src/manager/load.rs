//! Loading, creation, revert and snapshots.

use mannequin_xml::XmlNode;
use tracing::{debug, error, info, warn};

use super::AnimationDatabaseManager;
use crate::cache::{ControllerDefId, DatabaseId, TagDefId};
use crate::codec::{self, ResourceSource};
use crate::config::DuplicatePolicy;
use crate::controller_def::FragmentDef;
use crate::database::AnimationDatabase;
use crate::error::LoadError;
use crate::hash::{normalize_path, same_path};
use crate::imports::ImportsInfo;
use crate::ownership::remove_data_from_parent;
use crate::tag_definition::{TagDefinition, TagState};

/// In-memory copy of every cached database and controller definition.
///
/// Databases are stored flattened: one document holding the data of the
/// whole SubADB tree.
#[derive(Clone, Debug, Default)]
pub struct Snapshot {
    databases: Vec<(DatabaseId, XmlNode)>,
    controller_defs: Vec<(ControllerDefId, XmlNode)>,
}

impl Snapshot {
    pub fn databases(&self) -> &[(DatabaseId, XmlNode)] {
        &self.databases
    }

    pub fn controller_defs(&self) -> &[(ControllerDefId, XmlNode)] {
        &self.controller_defs
    }
}

impl AnimationDatabaseManager {
    fn begin_loading(&mut self, filename: &str) -> Result<(), LoadError> {
        if self.loading.iter().any(|f| same_path(f, filename)) {
            return Err(LoadError::Cycle(filename.to_string()));
        }
        self.loading.push(filename.to_string());
        Ok(())
    }

    fn end_loading(&mut self, filename: &str) {
        self.loading.retain(|f| !same_path(f, filename));
    }

    // =========================================================================
    // Tag definitions
    // =========================================================================

    /// Cached handle for `filename`, loading it and its imports on a miss.
    pub fn load_tag_def(&mut self, filename: &str) -> Result<TagDefId, LoadError> {
        let filename = normalize_path(filename);
        if let Some(id) = self.tag_defs.find(&filename) {
            return Ok(id);
        }
        let (def, info) = self.read_tag_def(&filename)?;
        debug!(tag_def = %filename, tags = def.len(), "loaded tag definition");
        self.imports.insert(info);
        Ok(self.tag_defs.insert(def))
    }

    fn read_tag_def(&mut self, filename: &str) -> Result<(TagDefinition, ImportsInfo), LoadError> {
        self.begin_loading(filename)?;
        let result = codec::tag_def::load(filename, self);
        self.end_loading(filename);
        result
    }

    /// Create an empty tag definition.
    ///
    /// An already cached file is refused or overwritten in place depending on
    /// [`ManagerConfig::on_duplicate_create`](crate::ManagerConfig).
    pub fn create_tag_definition(&mut self, filename: &str) -> Result<TagDefId, LoadError> {
        let filename = normalize_path(filename);
        let existing = self.tag_defs.find(&filename);
        if existing.is_some() && self.config.on_duplicate_create == DuplicatePolicy::Reject {
            warn!(tag_def = %filename, "tag definition already loaded, not created");
            return Err(LoadError::AlreadyLoaded(filename));
        }

        self.imports.insert(ImportsInfo::new(filename.as_str()));
        let id = self.tag_defs.insert(TagDefinition::new(filename.as_str()));
        if existing.is_some() {
            self.resize_fragment_dependents(id);
            self.notify_tag_def_invalidated(id);
        }
        if self.config.save_on_create
            && let Err(err) = self.save_tag_definition(id)
        {
            error!(tag_def = %filename, error = %err, "failed to save new tag definition");
        }
        info!(tag_def = %filename, "created tag definition");
        Ok(id)
    }

    /// Reload a cached tag definition from disk behind the same handle.
    pub fn revert_tag_def(&mut self, filename: &str) -> Result<TagDefId, LoadError> {
        let filename = normalize_path(filename);
        let id = self
            .tag_defs
            .find(&filename)
            .ok_or_else(|| LoadError::NotLoaded(filename.clone()))?;
        let (def, info) = self.read_tag_def(&filename)?;
        self.imports.insert(info);
        self.tag_defs.replace(id, def);
        self.resize_fragment_dependents(id);
        self.notify_tag_def_invalidated(id);
        debug!(tag_def = %filename, "reverted tag definition");
        Ok(id)
    }

    /// Keep every dependent fragment list as long as the vocabulary `id`,
    /// after it was replaced wholesale.
    pub(super) fn resize_fragment_dependents(&mut self, id: TagDefId) {
        let Some(count) = self.tag_defs.get(id).map(TagDefinition::len) else {
            return;
        };
        let dependents = self.fragment_dependents(id);
        for def_id in dependents.controller_defs {
            if let Some(def) = self.controller_defs.get_mut(def_id) {
                def.fragment_defs.resize_with(count, FragmentDef::default);
            }
        }
        for db_id in dependents.databases {
            if let Some(db) = self.databases.get_mut(db_id) {
                db.resize_fragments(count);
            }
        }
    }

    // =========================================================================
    // Controller definitions
    // =========================================================================

    /// Cached handle for `filename`, loading it and its vocabularies on a miss.
    pub fn load_controller_def(&mut self, filename: &str) -> Result<ControllerDefId, LoadError> {
        let filename = normalize_path(filename);
        if let Some(id) = self.controller_defs.find(&filename) {
            return Ok(id);
        }
        let def = self.read_controller_def(&filename)?;
        debug!(controller_def = %filename, fragments = def.fragment_defs.len(), "loaded controller definition");
        Ok(self.controller_defs.insert(def))
    }

    fn read_controller_def(
        &mut self,
        filename: &str,
    ) -> Result<crate::controller_def::ControllerDef, LoadError> {
        let root = self.read_xml(filename)?;
        self.begin_loading(filename)?;
        let result = codec::controller_def::load(&root, filename, self);
        self.end_loading(filename);
        result
    }

    /// Reload a cached controller definition from disk behind the same handle.
    pub fn revert_controller_def(&mut self, filename: &str) -> Result<ControllerDefId, LoadError> {
        let filename = normalize_path(filename);
        let id = self
            .controller_defs
            .find(&filename)
            .ok_or_else(|| LoadError::NotLoaded(filename.clone()))?;
        let def = self.read_controller_def(&filename)?;
        self.controller_defs.replace(id, def);
        debug!(controller_def = %filename, "reverted controller definition");
        Ok(id)
    }

    // =========================================================================
    // Databases
    // =========================================================================

    /// Cached handle for `filename`, loading the database and its SubADB files
    /// on a miss.
    pub fn load(&mut self, filename: &str) -> Result<DatabaseId, LoadError> {
        let filename = normalize_path(filename);
        if let Some(id) = self.databases.find(&filename) {
            return Ok(id);
        }
        let root = self.read_xml(&filename)?;
        let db = codec::database::load(&root, &filename, self)?;
        info!(
            database = %db.filename(),
            options = db.option_count(),
            blends = db.blend_count(),
            "loaded animation database"
        );
        Ok(self.databases.insert(db))
    }

    /// Create an empty database using the vocabularies of `def_filename`.
    ///
    /// Duplicates follow [`ManagerConfig::on_duplicate_create`](crate::ManagerConfig).
    pub fn create(&mut self, filename: &str, def_filename: &str) -> Result<DatabaseId, LoadError> {
        let filename = normalize_path(filename);
        if self.databases.find(&filename).is_some()
            && self.config.on_duplicate_create == DuplicatePolicy::Reject
        {
            warn!(database = %filename, "database already loaded, not created");
            return Err(LoadError::AlreadyLoaded(filename));
        }

        let def_id = self.load_controller_def(def_filename)?;
        let (tags, frags) = self
            .controller_defs
            .get(def_id)
            .map(|def| (def.tags(), def.fragment_ids()))
            .ok_or_else(|| LoadError::NotLoaded(def_filename.to_string()))?;
        let count = self
            .tag_defs
            .get(frags)
            .map(TagDefinition::len)
            .ok_or_else(|| LoadError::NotLoaded(def_filename.to_string()))?;

        let id = self
            .databases
            .insert(AnimationDatabase::new(filename.as_str(), tags, frags, count));
        if self.config.save_on_create
            && let Err(err) = self.save_database(id)
        {
            error!(database = %filename, error = %err, "failed to save new database");
        }
        info!(database = %filename, controller_def = %def_filename, "created animation database");
        Ok(id)
    }

    /// Reload `filename` from disk in every cached database that contains it.
    ///
    /// For a SubADB file only the data that file owns is replaced; for a
    /// database's own file only the data the root file owns. Handles are
    /// preserved. Returns the databases that were touched.
    pub fn revert_database(&mut self, filename: &str) -> Result<Vec<DatabaseId>, LoadError> {
        let filename = normalize_path(filename);
        let mut touched = Vec::new();
        for id in self.databases.keys() {
            let Some(db) = self.databases.get(id) else {
                continue;
            };
            let is_root = same_path(db.filename(), &filename);
            if !is_root && db.find_sub_adb(&filename).is_none() {
                continue;
            }
            let xml = self.read_xml(&filename)?;
            let Some(mut db) = self.databases.get(id).cloned() else {
                continue;
            };

            let (node, filter) = if is_root {
                (None, TagState::EMPTY)
            } else {
                let filter = db.find_sub_adb(&filename).map_or(TagState::EMPTY, |s| s.tags);
                (Some(filename.as_str()), filter)
            };
            if !remove_data_from_parent(&mut db, node, &self.tag_defs) {
                warn!(database = %db.filename(), file = %filename, "could not isolate file data");
            }
            let mut chain = vec![db.filename().to_string()];
            if !is_root {
                chain.push(filename.clone());
            }
            codec::database::load_data(&mut db, &xml, filter, false, &mut chain, self);
            db.sort(&self.tag_defs);

            self.databases.replace(id, db);
            touched.push(id);
        }
        if touched.is_empty() {
            return Err(LoadError::NotLoaded(filename));
        }
        debug!(file = %filename, databases = touched.len(), "reverted database file");
        Ok(touched)
    }

    /// Rebuild a cached database from its file and every SubADB file.
    pub fn reload_database(&mut self, id: DatabaseId) -> Result<(), LoadError> {
        let filename = self
            .databases
            .get(id)
            .map(|db| db.filename().to_string())
            .ok_or_else(|| LoadError::NotLoaded(format!("{id:?}")))?;
        let root = self.read_xml(&filename)?;
        let db = codec::database::load(&root, &filename, self)?;
        self.databases.replace(id, db);
        Ok(())
    }

    /// Revert every tag definition, then every controller definition, then
    /// every database. Returns the files that failed to reload.
    pub fn reload_all(&mut self) -> Vec<String> {
        let mut failed = Vec::new();

        let tag_defs: Vec<String> = self
            .tag_defs
            .iter()
            .map(|(_, def)| def.filename().to_string())
            .collect();
        for filename in tag_defs {
            if let Err(err) = self.revert_tag_def(&filename) {
                warn!(tag_def = %filename, error = %err, "reload failed");
                failed.push(filename);
            }
        }

        let controller_defs: Vec<String> = self
            .controller_defs
            .iter()
            .map(|(_, def)| def.filename().to_string())
            .collect();
        for filename in controller_defs {
            if let Err(err) = self.revert_controller_def(&filename) {
                warn!(controller_def = %filename, error = %err, "reload failed");
                failed.push(filename);
            }
        }

        for id in self.databases.keys() {
            if let Err(err) = self.reload_database(id) {
                let filename = self
                    .databases
                    .get(id)
                    .map(|db| db.filename().to_string())
                    .unwrap_or_default();
                warn!(database = %filename, error = %err, "reload failed");
                failed.push(filename);
            }
        }
        failed
    }

    /// Drop every cached resource. All handles become dangling.
    pub fn unload_all(&mut self) {
        info!(
            databases = self.databases.len(),
            controller_defs = self.controller_defs.len(),
            tag_defs = self.tag_defs.len(),
            "unloading all mannequin resources"
        );
        self.databases.clear();
        self.controller_defs.clear();
        self.tag_defs.clear();
        self.imports.clear();
    }

    // =========================================================================
    // Snapshots
    // =========================================================================

    pub fn save_databases_snapshot(&self) -> Snapshot {
        let mut snapshot = Snapshot::default();
        for (id, db) in self.databases.iter() {
            match codec::database::save_flat(db, &self.tag_defs) {
                Some(xml) => snapshot.databases.push((id, xml)),
                None => warn!(database = %db.filename(), "vocabularies missing, not in snapshot"),
            }
        }
        for (id, def) in self.controller_defs.iter() {
            let vocabularies = (self.tag_defs.get(def.tags()), self.tag_defs.get(def.fragment_ids()));
            if let (Some(tags), Some(frags)) = vocabularies {
                let xml = codec::controller_def::save(def, tags, frags, &self.tag_defs);
                snapshot.controller_defs.push((id, xml));
            }
        }
        snapshot
    }

    /// Restore the data captured by [`save_databases_snapshot`](Self::save_databases_snapshot).
    ///
    /// SubADB declarations currently in the databases are kept.
    pub fn load_databases_snapshot(&mut self, snapshot: &Snapshot) {
        for (id, xml) in &snapshot.databases {
            let Some(mut db) = self.databases.get(*id).cloned() else {
                warn!(database = ?id, "snapshot refers to an unloaded database");
                continue;
            };
            db.clear_data();
            let mut chain = vec![db.filename().to_string()];
            codec::database::load_data(&mut db, xml, TagState::EMPTY, false, &mut chain, self);
            db.sort(&self.tag_defs);
            self.databases.replace(*id, db);
        }

        for (id, xml) in &snapshot.controller_defs {
            let Some(filename) = self.controller_defs.get(*id).map(|d| d.filename().to_string()) else {
                continue;
            };
            match codec::controller_def::load(xml, &filename, self) {
                Ok(mut def) => {
                    def.set_filename(filename);
                    self.controller_defs.replace(*id, def);
                }
                Err(err) => warn!(controller_def = %filename, error = %err, "snapshot not restored"),
            }
        }
    }
}
