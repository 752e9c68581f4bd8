//! Persisted installed-components manifest
//!
//! The manifest records, per installed component, its version and the
//! operations performed during its installation. It is read at startup to
//! seed the `installed` flags and replayed in reverse to uninstall a
//! component after the in-memory objects from the original run are gone.
//!
//! Stored as JSON under `<target>/.instack/manifest.json`; the engine only
//! sees the [`ManifestStore`] trait.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, file_read_failed, file_write_failed};
use crate::operation::RecordedOperation;

/// Per-component installation record
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstalledEntry {
    pub version: String,
    #[serde(default)]
    pub operations: Vec<RecordedOperation>,
}

/// The full persisted state of one target installation directory
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManifestSnapshot {
    /// Keyed by component name; BTreeMap keeps the file diff-stable
    #[serde(default)]
    pub components: BTreeMap<String, InstalledEntry>,
}

impl ManifestSnapshot {
    pub fn is_installed(&self, component: &str) -> bool {
        self.components.contains_key(component)
    }

    pub fn entry(&self, component: &str) -> Option<&InstalledEntry> {
        self.components.get(component)
    }
}

/// Reads and writes the installed-components manifest
pub trait ManifestStore: Send {
    fn load(&self) -> Result<ManifestSnapshot>;
    fn save(&self, snapshot: &ManifestSnapshot) -> Result<()>;
}

/// JSON file store scoped to one target directory
pub struct FileManifest {
    path: PathBuf,
}

impl FileManifest {
    pub fn for_target(target_dir: &Path) -> Self {
        Self {
            path: target_dir.join(".instack").join("manifest.json"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ManifestStore for FileManifest {
    fn load(&self) -> Result<ManifestSnapshot> {
        if !self.path.exists() {
            return Ok(ManifestSnapshot::default());
        }
        let contents = std::fs::read_to_string(&self.path)
            .map_err(|e| file_read_failed(self.path.display().to_string(), e.to_string()))?;
        let snapshot = serde_json::from_str(&contents)
            .map_err(|e| file_read_failed(self.path.display().to_string(), e.to_string()))?;
        Ok(snapshot)
    }

    fn save(&self, snapshot: &ManifestSnapshot) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| file_write_failed(parent.display().to_string(), e.to_string()))?;
        }
        let json = serde_json::to_string_pretty(snapshot)?;
        std::fs::write(&self.path, json)
            .map_err(|e| file_write_failed(self.path.display().to_string(), e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_missing_manifest_is_empty() {
        let temp = TempDir::new().unwrap();
        let store = FileManifest::for_target(temp.path());
        let snapshot = store.load().unwrap();
        assert!(snapshot.components.is_empty());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let temp = TempDir::new().unwrap();
        let store = FileManifest::for_target(temp.path());

        let mut snapshot = ManifestSnapshot::default();
        snapshot.components.insert(
            "app.core".to_string(),
            InstalledEntry {
                version: "1.0.0".to_string(),
                operations: vec![RecordedOperation {
                    kind: "Mkdir".to_string(),
                    arguments: vec!["/opt/app".to_string()],
                    values: Default::default(),
                    elevated: false,
                    backup: serde_json::Value::Null,
                }],
            },
        );
        store.save(&snapshot).unwrap();

        let loaded = store.load().unwrap();
        assert!(loaded.is_installed("app.core"));
        let entry = loaded.entry("app.core").unwrap();
        assert_eq!(entry.version, "1.0.0");
        assert_eq!(entry.operations.len(), 1);
        assert_eq!(entry.operations[0].kind, "Mkdir");
    }

    #[test]
    fn test_corrupt_manifest_is_read_error() {
        let temp = TempDir::new().unwrap();
        let store = FileManifest::for_target(temp.path());
        std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        std::fs::write(store.path(), "not json").unwrap();

        assert!(store.load().is_err());
    }
}
