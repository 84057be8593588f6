//! Error types returned by the manager and its codecs.

use std::path::PathBuf;

use mannequin_xml::XmlError;
use thiserror::Error;

use crate::database::FragmentId;

/// A file could not be turned into a cached resource.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error(transparent)]
    Xml(#[from] XmlError),

    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{filename}: expected root <{expected}>, found <{found}>")]
    WrongRoot {
        filename: String,
        expected: &'static str,
        found: String,
    },

    #[error("{filename}: missing required {what}")]
    MissingAttribute { filename: String, what: &'static str },

    #[error("{filename}: referenced definition {referenced} could not be loaded")]
    MissingDefinition { filename: String, referenced: String },

    #[error("{0} is already loaded")]
    AlreadyLoaded(String),

    #[error("{0} imports itself")]
    Cycle(String),

    #[error("{0} is not loaded")]
    NotLoaded(String),
}

/// Outcome of a fragment-id edit that was refused. Nothing was modified.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ModifyFragmentIdError {
    #[error("a fragment with that name already exists")]
    DuplicateName,

    #[error("fragment names must start with a letter or '_' and contain only letters, digits and '_'")]
    InvalidNameIdentifier,

    #[error("the fragment vocabulary is not loaded")]
    UnknownInputTagDefinition,

    #[error("fragment id out of range")]
    InvalidFragmentId,

    #[error("dependent structure out of sync: {0}")]
    Inconsistent(String),
}

/// A tag or group rename that was refused. Nothing was modified.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum RenameTagError {
    #[error("the tag definition is not loaded")]
    UnknownTagDefinition,

    #[error("no tag or group with name CRC {0:#010x}")]
    NotFound(u32),

    #[error("tag names must start with a letter or '_' and contain only letters, digits and '_'")]
    InvalidNameIdentifier,

    #[error("{definition} already declares {name}")]
    DuplicateName { definition: String, name: String },
}

/// A propagated edit could not be applied.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum EditError {
    #[error("unknown database handle")]
    UnknownDatabase,

    #[error("fragment id {0} is not valid in this database")]
    InvalidFragmentId(FragmentId),

    #[error("{database}: edit landed at index {actual}, expected {expected}")]
    IndexMismatch {
        database: String,
        expected: usize,
        actual: usize,
    },

    #[error("handle refers to an unloaded resource")]
    DanglingHandle,

    #[error("no SubADB named {0}")]
    UnknownSubAdb(String),
}

/// A cached resource could not be written out.
#[derive(Debug, Error)]
pub enum SaveError {
    #[error(transparent)]
    Xml(#[from] XmlError),

    #[error("handle refers to an unloaded resource")]
    DanglingHandle,

    #[error("{0}: referenced definitions are not loaded")]
    MissingDefinition(String),
}

/// Errors while loading a [`ManagerConfig`](crate::ManagerConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("{0}")]
    Validation(String),
}
