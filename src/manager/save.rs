//! Writing cached resources back out.

use std::path::PathBuf;

use mannequin_xml::{XmlError, XmlNode};
use tracing::{debug, error, info};

use super::AnimationDatabaseManager;
use crate::cache::{ControllerDefId, DatabaseId, TagDefId};
use crate::codec;
use crate::config::{ManagerConfig, resolve_path};
use crate::error::SaveError;
use crate::hash::same_path;

/// Destination for serialized documents, keyed by logical filename.
pub trait MannequinWriter {
    fn write(&mut self, filename: &str, xml: &XmlNode) -> Result<(), XmlError>;
}

/// Writes documents to disk below an optional root directory.
#[derive(Clone, Debug, Default)]
pub struct FileWriter {
    root_dir: Option<PathBuf>,
}

impl FileWriter {
    pub fn new(root_dir: Option<PathBuf>) -> Self {
        Self { root_dir }
    }

    pub fn from_config(config: &ManagerConfig) -> Self {
        Self::new(config.root_dir.clone())
    }
}

impl MannequinWriter for FileWriter {
    fn write(&mut self, filename: &str, xml: &XmlNode) -> Result<(), XmlError> {
        xml.save_to_file(resolve_path(self.root_dir.as_deref(), filename))
    }
}

impl AnimationDatabaseManager {
    /// Write one tag definition, one document per import file.
    pub fn write_tag_definition(
        &self,
        id: TagDefId,
        writer: &mut dyn MannequinWriter,
    ) -> Result<Vec<String>, SaveError> {
        let def = self.tag_defs.get(id).ok_or(SaveError::DanglingHandle)?;
        let files = codec::tag_def::save(def, self.imports.get(def.filename()), &self.tag_defs);
        let mut written = Vec::with_capacity(files.len());
        for (filename, xml) in files {
            writer.write(&filename, &xml)?;
            written.push(filename);
        }
        Ok(written)
    }

    pub fn write_controller_def(
        &self,
        id: ControllerDefId,
        writer: &mut dyn MannequinWriter,
    ) -> Result<(), SaveError> {
        let def = self.controller_defs.get(id).ok_or(SaveError::DanglingHandle)?;
        let (Some(tags), Some(frags)) = (
            self.tag_defs.get(def.tags()),
            self.tag_defs.get(def.fragment_ids()),
        ) else {
            return Err(SaveError::MissingDefinition(def.filename().to_string()));
        };
        let xml = codec::controller_def::save(def, tags, frags, &self.tag_defs);
        writer.write(def.filename(), &xml)?;
        Ok(())
    }

    /// Write a database as one document per file of its SubADB tree.
    pub fn write_database(
        &self,
        id: DatabaseId,
        writer: &mut dyn MannequinWriter,
    ) -> Result<Vec<String>, SaveError> {
        let db = self.databases.get(id).ok_or(SaveError::DanglingHandle)?;
        let files = codec::database::save_tree(db, &self.tag_defs)
            .ok_or_else(|| SaveError::MissingDefinition(db.filename().to_string()))?;
        let mut written = Vec::with_capacity(files.len());
        for (filename, xml) in files {
            writer.write(&filename, &xml)?;
            written.push(filename);
        }
        debug!(database = %db.filename(), files = written.len(), "saved animation database");
        Ok(written)
    }

    pub fn save_tag_definition(&self, id: TagDefId) -> Result<(), SaveError> {
        self.write_tag_definition(id, &mut FileWriter::from_config(&self.config))
            .map(|_| ())
    }

    pub fn save_controller_def(&self, id: ControllerDefId) -> Result<(), SaveError> {
        self.write_controller_def(id, &mut FileWriter::from_config(&self.config))
    }

    pub fn save_database(&self, id: DatabaseId) -> Result<(), SaveError> {
        self.write_database(id, &mut FileWriter::from_config(&self.config))
            .map(|_| ())
    }

    /// Write every cached resource through `writer`.
    ///
    /// A tag-definition file shared through imports is written once. Failures
    /// are logged and the remaining resources are still written; the failed
    /// filenames are returned.
    pub fn save_all(&self, writer: &mut dyn MannequinWriter) -> Vec<String> {
        let mut failed = Vec::new();
        let mut written: Vec<String> = Vec::new();

        for (id, def) in self.tag_defs.iter() {
            if written.iter().any(|f| same_path(f, def.filename())) {
                continue;
            }
            match self.write_tag_definition(id, writer) {
                Ok(files) => written.extend(files),
                Err(err) => {
                    error!(tag_def = %def.filename(), error = %err, "failed to save tag definition");
                    failed.push(def.filename().to_string());
                }
            }
        }
        for (id, def) in self.controller_defs.iter() {
            if let Err(err) = self.write_controller_def(id, writer) {
                error!(controller_def = %def.filename(), error = %err, "failed to save controller definition");
                failed.push(def.filename().to_string());
            }
        }
        for (id, db) in self.databases.iter() {
            if let Err(err) = self.write_database(id, writer) {
                error!(database = %db.filename(), error = %err, "failed to save animation database");
                failed.push(db.filename().to_string());
            }
        }

        info!(
            tag_defs = self.tag_defs.len(),
            controller_defs = self.controller_defs.len(),
            databases = self.databases.len(),
            failed = failed.len(),
            "saved all resources"
        );
        failed
    }
}
