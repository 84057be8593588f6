//! Bevy integration.
//!
//! Provides:
//! - `MannequinPlugin`: builder-pattern plugin that inserts the
//!   [`AnimationDatabaseManager`] as a Resource
//! - `DatabaseHandle`: component pointing an entity at a cached database
//!
//! # Example
//!
//! ```ignore
//! use bevy::prelude::*;
//! use mannequin_adb::bevy::*;
//! use mannequin_adb::{AnimationDatabaseManager, ManagerConfig};
//!
//! fn main() {
//!     App::new()
//!         .add_plugins(
//!             MannequinPlugin::new()
//!                 .with_config(ManagerConfig::default().with_root_dir("assets/animations"))
//!                 .preload(["player.adb"]),
//!         )
//!         .add_systems(Startup, spawn_player)
//!         .run();
//! }
//!
//! fn spawn_player(mut commands: Commands, manager: Res<AnimationDatabaseManager>) {
//!     if let Some(db) = manager.find_database("player.adb") {
//!         commands.spawn(DatabaseHandle(db));
//!     }
//! }
//! ```

use bevy::prelude::*;
use tracing::{error, info};

use crate::cache::DatabaseId;
use crate::config::ManagerConfig;
use crate::manager::AnimationDatabaseManager;

// =============================================================================
// Plugin
// =============================================================================

/// Bevy plugin for the animation database manager.
///
/// ```ignore
/// App::new()
///     .add_plugins(MannequinPlugin::new().preload(["player.adb"]))
/// ```
#[derive(Default)]
pub struct MannequinPlugin {
    config: ManagerConfig,
    preload: Vec<String>,
}

impl MannequinPlugin {
    /// A plugin with the default configuration and nothing preloaded.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: ManagerConfig) -> Self {
        self.config = config;
        self
    }

    /// Databases loaded while the plugin is built. A database that fails to
    /// load is logged and skipped.
    pub fn preload<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.preload.extend(paths.into_iter().map(Into::into));
        self
    }
}

impl Plugin for MannequinPlugin {
    fn build(&self, app: &mut App) {
        let mut manager = AnimationDatabaseManager::new(self.config.clone());
        let mut loaded = 0;
        for path in &self.preload {
            match manager.load(path) {
                Ok(_) => loaded += 1,
                Err(err) => error!(database = %path, error = %err, "failed to preload animation database"),
            }
        }
        if !self.preload.is_empty() {
            info!(loaded, requested = self.preload.len(), "preloaded animation databases");
        }
        app.insert_resource(manager);
    }
}

// =============================================================================
// DatabaseHandle Component
// =============================================================================

/// The animation database an entity plays its fragments from.
#[derive(Component, Clone, Copy, Debug, PartialEq, Eq)]
pub struct DatabaseHandle(pub DatabaseId);

// =============================================================================
// Resource impl for AnimationDatabaseManager
// =============================================================================

impl Resource for AnimationDatabaseManager {}

// =============================================================================
// Tests
// =============================================================================
