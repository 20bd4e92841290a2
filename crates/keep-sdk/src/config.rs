use std::path::{Path, PathBuf};

use keep_history::HistoryConfig;
use serde::{Deserialize, Serialize};

use crate::error::{SdkError, SdkResult};

/// Workspace settings, usually read from a `keep.toml`.
///
/// ```toml
/// root = "/home/me/projects"
/// metadata_dir = ".keep"
///
/// [history]
/// blob_shards = 64
///
/// [history.policy]
/// max_states = 20
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// Directory backing the workspace root.
    pub root: PathBuf,
    /// Name of the metadata directory inside `root`. It is never
    /// synchronized as a project.
    pub metadata_dir: String,
    /// History store settings. A relative `location` is taken to be
    /// inside the metadata directory.
    pub history: HistoryConfig,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            metadata_dir: ".keep".into(),
            history: HistoryConfig::default(),
        }
    }
}

impl WorkspaceConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    pub fn from_toml_str(s: &str) -> SdkResult<Self> {
        toml::from_str(s).map_err(|e| SdkError::Config(e.to_string()))
    }

    /// Read a config file. A relative `root` is resolved against the
    /// file's directory.
    pub fn load(path: &Path) -> SdkResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| SdkError::Config(format!("cannot read {}: {e}", path.display())))?;
        let mut config = Self::from_toml_str(&text)?;
        if config.root.is_relative() {
            if let Some(dir) = path.parent() {
                config.root = dir.join(&config.root);
            }
        }
        Ok(config)
    }

    pub fn validate(&self) -> SdkResult<()> {
        let name = self.metadata_dir.as_str();
        if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
            return Err(SdkError::Config(format!(
                "metadata_dir must be a single directory name, got {name:?}"
            )));
        }
        self.history
            .validate()
            .map_err(|e| SdkError::Config(e.to_string()))
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.root.join(&self.metadata_dir)
    }

    pub fn history_location(&self) -> PathBuf {
        if self.history.location.is_absolute() {
            self.history.location.clone()
        } else {
            self.metadata_path().join(&self.history.location)
        }
    }

    pub fn properties_location(&self) -> PathBuf {
        self.metadata_path().join("properties")
    }

    pub fn resources_location(&self) -> PathBuf {
        self.metadata_path().join("resources")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let c = WorkspaceConfig::default();
        assert_eq!(c.metadata_dir, ".keep");
        assert_eq!(c.history.blob_shards, 256);
        assert_eq!(c.history_location(), PathBuf::from("./.keep/history"));
        c.validate().unwrap();
    }

    #[test]
    fn toml_overrides_and_defaults() {
        let c = WorkspaceConfig::from_toml_str(
            r#"
            root = "/work"

            [history]
            blob_shards = 64
            journal_sync = "os_default"

            [history.policy]
            max_states = 5
            "#,
        )
        .unwrap();
        assert_eq!(c.root, PathBuf::from("/work"));
        assert_eq!(c.metadata_dir, ".keep");
        assert_eq!(c.history.blob_shards, 64);
        assert_eq!(c.history.policy.max_states, 5);
        assert_eq!(c.history.policy.max_state_size, 1024 * 1024);
        assert_eq!(c.history_location(), PathBuf::from("/work/.keep/history"));
    }

    #[test]
    fn bad_toml_is_config_error() {
        let err = WorkspaceConfig::from_toml_str("root = [").unwrap_err();
        assert!(matches!(err, SdkError::Config(_)));
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut c = WorkspaceConfig::new("/work");
        c.metadata_dir = "a/b".into();
        assert!(matches!(c.validate(), Err(SdkError::Config(_))));

        let mut c = WorkspaceConfig::new("/work");
        c.history.blob_shards = 100;
        assert!(matches!(c.validate(), Err(SdkError::Config(_))));

        let mut c = WorkspaceConfig::new("/work");
        c.history.policy.max_states = 0;
        assert!(matches!(c.validate(), Err(SdkError::Config(_))));
    }

    #[test]
    fn load_resolves_relative_root() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("keep.toml");
        std::fs::write(&file, "root = \"ws\"\n").unwrap();
        let c = WorkspaceConfig::load(&file).unwrap();
        assert_eq!(c.root, dir.path().join("ws"));

        let missing = WorkspaceConfig::load(&dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(missing, SdkError::Config(_)));
    }
}
