//! # Mannequin animation database manager (mannequin-adb)
//!
//! Loads, caches, edits and saves the data files of a tag-driven animation
//! selection system: tag vocabularies, controller definitions and animation
//! databases (ADBs).
//!
//! ## Model
//!
//! ```text
//! TagDefinition        named tags packed into a 128-bit TagState
//!   └ imports          provenance of each tag across imported files
//! ControllerDef        global tags + fragment ids + scopes
//! AnimationDatabase    fragment id × FragTagState → options, plus blends
//!   └ SubADBs          filter views that own part of the data on disk
//! ```
//!
//! An ADB and its SubADB files load into one in-memory database. On save,
//! every tag set and blend variant is written to exactly one file: the
//! deepest SubADB whose filter claims it, else the parent.
//!
//! ## Usage
//!
//! ```ignore
//! use mannequin_adb::{AnimationDatabaseManager, FragTagState, Fragment, ManagerConfig};
//!
//! let mut manager = AnimationDatabaseManager::new(
//!     ManagerConfig::default().with_root_dir("assets/animations"),
//! );
//! let db = manager.load("player.adb")?;
//! let tags = manager.tag_def(manager.database(db).unwrap().tag_def()).unwrap();
//! let crouch = FragTagState::global(tags.tag_list_to_flags("Crouch").state);
//! manager.add_fragment_entry(db, 0, crouch, Fragment::single("crouch_idle"))?;
//! manager.save_database(db)?;
//! ```

pub mod cache;
pub mod codec;
pub mod config;
pub mod controller_def;
pub mod database;
pub mod error;
pub mod fragment;
pub mod hash;
pub mod imports;
pub mod listener;
pub mod manager;
pub mod ownership;
pub mod tag_definition;

#[cfg(feature = "bevy")]
pub mod bevy;

pub use cache::{ControllerDefId, DatabaseId, ResourceCache, TagDefId};
pub use config::{DuplicatePolicy, ManagerConfig};
pub use controller_def::{ControllerDef, FragmentDef, ScopeMaskList};
pub use database::{
    AnimationDatabase, BlendVariant, FragmentBlendKey, FragmentEntry, FragmentId, SubAdb, TagSet,
};
pub use error::{
    ConfigError, EditError, LoadError, ModifyFragmentIdError, RenameTagError, SaveError,
};
pub use fragment::{BlendUid, Fragment, FragmentBlend};
pub use imports::ImportsInfo;
pub use listener::{ListenerId, MannequinListener};
pub use manager::{
    AffectedFragment, AnimationDatabaseManager, FileWriter, MannequinWriter, Snapshot,
};
pub use ownership::{Ownership, SavePlan};
pub use tag_definition::{FragTagState, TagDefinition, TagId, TagState};
