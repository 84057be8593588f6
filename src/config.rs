//! Manager configuration, read from TOML.
//!
//! ```toml
//! root_dir = "assets/animations"
//! on_duplicate_create = "reject"   # or "overwrite"
//! save_on_create = true
//! log_unknown_tags = true
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::ConfigError;

/// What `create` does when the target file is already cached.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// Refuse and leave the cached resource untouched.
    #[default]
    Reject,
    /// Replace the cached resource in place, keeping its handle.
    Overwrite,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ManagerConfig {
    /// Directory relative asset paths are resolved against for disk access.
    pub root_dir: Option<PathBuf>,
    pub on_duplicate_create: DuplicatePolicy,
    /// Write newly created resources to disk immediately.
    pub save_on_create: bool,
    /// Warn about every unknown token in tag lists.
    pub log_unknown_tags: bool,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            root_dir: None,
            on_duplicate_create: DuplicatePolicy::Reject,
            save_on_create: true,
            log_unknown_tags: true,
        }
    }
}

/// Raw TOML structure.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawManagerConfig {
    root_dir: Option<PathBuf>,
    on_duplicate_create: Option<DuplicatePolicy>,
    save_on_create: Option<bool>,
    log_unknown_tags: Option<bool>,
}

impl ManagerConfig {
    /// Parse from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_str(&content)
    }

    /// Parse from a TOML string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let raw: RawManagerConfig = toml::from_str(content)?;
        let defaults = Self::default();

        if let Some(dir) = &raw.root_dir
            && dir.as_os_str().is_empty()
        {
            return Err(ConfigError::Validation("root_dir must not be empty".into()));
        }

        Ok(Self {
            root_dir: raw.root_dir,
            on_duplicate_create: raw.on_duplicate_create.unwrap_or(defaults.on_duplicate_create),
            save_on_create: raw.save_on_create.unwrap_or(defaults.save_on_create),
            log_unknown_tags: raw.log_unknown_tags.unwrap_or(defaults.log_unknown_tags),
        })
    }

    pub fn with_root_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.root_dir = Some(dir.into());
        self
    }

    pub fn with_duplicate_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.on_duplicate_create = policy;
        self
    }

    /// Disk location of a logical asset path.
    pub fn resolve(&self, logical: &str) -> PathBuf {
        resolve_path(self.root_dir.as_deref(), logical)
    }
}

/// `logical` below `root_dir`, or as given without one. Reads and writes both
/// go through here.
pub fn resolve_path(root_dir: Option<&Path>, logical: &str) -> PathBuf {
    match root_dir {
        Some(root) => root.join(logical),
        None => PathBuf::from(logical),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = ManagerConfig::from_str("").unwrap();
        assert_eq!(config, ManagerConfig::default());
        assert_eq!(config.on_duplicate_create, DuplicatePolicy::Reject);
        assert!(config.save_on_create);
    }

    #[test]
    fn parses_all_fields() {
        let config = ManagerConfig::from_str(
            r#"
            root_dir = "assets"
            on_duplicate_create = "overwrite"
            save_on_create = false
            log_unknown_tags = false
            "#,
        )
        .unwrap();
        assert_eq!(config.root_dir, Some(PathBuf::from("assets")));
        assert_eq!(config.on_duplicate_create, DuplicatePolicy::Overwrite);
        assert!(!config.save_on_create);
        assert!(!config.log_unknown_tags);
        assert_eq!(config.resolve("a/b.adb"), Path::new("assets").join("a/b.adb"));
    }

    #[test]
    fn invalid_policy_is_rejected() {
        let err = ManagerConfig::from_str(r#"on_duplicate_create = "merge""#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().contains("merge"));
        // Variant names are lowercase only.
        assert!(ManagerConfig::from_str(r#"on_duplicate_create = "Overwrite""#).is_err());
    }

    #[test]
    fn unknown_field_is_a_parse_error() {
        let err = ManagerConfig::from_str("colour = 3").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ManagerConfig::from_file(dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
