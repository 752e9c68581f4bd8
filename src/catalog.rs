//! Component catalog loading
//!
//! The catalog is the materialized data model of what can be installed: a
//! YAML list of component descriptions with their tree placement,
//! dependencies, archives and variables. Loading builds a
//! [`ComponentGraph`] and seeds the installed flags from the manifest.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::component::{ArchiveEntry, Component, ComponentGraph};
use crate::error::{Result, config_invalid, config_not_found, config_parse_failed};
use crate::manifest::ManifestSnapshot;

/// An archive reference in the catalog: a bare name, or a mapping that
/// also carries verification metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CatalogArchive {
    Name(String),
    Detailed {
        name: String,
        #[serde(default)]
        size: Option<u64>,
        #[serde(default)]
        checksum: Option<String>,
    },
}

impl CatalogArchive {
    fn to_entry(&self) -> ArchiveEntry {
        match self {
            CatalogArchive::Name(name) => ArchiveEntry::new(name.clone()),
            CatalogArchive::Detailed {
                name,
                size,
                checksum,
            } => ArchiveEntry {
                name: name.clone(),
                size: *size,
                checksum: checksum.clone(),
            },
        }
    }
}

/// One component description as written in the catalog file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogComponent {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub display_name: Option<String>,
    /// Name of the tree parent for UI grouping; independent of dependencies
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub archives: Vec<CatalogArchive>,
    /// Loosely-typed behavior flags (`virtual`, `installPriority`, ...)
    #[serde(default)]
    pub variables: std::collections::HashMap<String, String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Processes that must not run while this component's operations execute
    #[serde(default)]
    pub stop_processes: Vec<String>,
}

fn default_enabled() -> bool {
    true
}

/// The parsed catalog file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub components: Vec<CatalogComponent>,
}

impl Catalog {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(config_not_found(path.display().to_string()));
        }
        let contents = std::fs::read_to_string(path)
            .map_err(|e| config_parse_failed(path.display().to_string(), e.to_string()))?;
        Self::parse(&contents)
            .map_err(|e| config_parse_failed(path.display().to_string(), e.to_string()))
    }

    pub fn parse(contents: &str) -> std::result::Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(contents)
    }

    /// Build the component graph, seeding installed flags and dependency
    /// edges; names must be unique and parents must exist
    pub fn into_graph(self, manifest: &ManifestSnapshot) -> Result<ComponentGraph> {
        let mut graph = ComponentGraph::new();

        for description in &self.components {
            if graph.id_of(&description.name).is_some() {
                return Err(config_invalid(format!(
                    "duplicate component name '{}'",
                    description.name
                )));
            }
            let mut component = Component::new(&description.name, &description.version);
            if let Some(display_name) = &description.display_name {
                component.set_display_name(display_name);
            }
            for dependency in &description.dependencies {
                component.add_dependency(dependency);
            }
            for archive in &description.archives {
                component.add_archive(archive.to_entry());
            }
            for (key, value) in &description.variables {
                component.set_variable(key, value);
            }
            for process in &description.stop_processes {
                component.add_stop_process_request(process);
            }
            component.set_enabled(description.enabled);
            component.set_installed(manifest.is_installed(&description.name));
            graph.add(component);
        }

        for description in &self.components {
            let Some(parent_name) = &description.parent else {
                continue;
            };
            let parent = graph.id_of(parent_name).ok_or_else(|| {
                config_invalid(format!(
                    "component '{}' names unknown parent '{}'",
                    description.name, parent_name
                ))
            })?;
            let child = graph.id_of(&description.name).ok_or_else(|| {
                config_invalid(format!("component '{}' missing from graph", description.name))
            })?;
            graph.set_parent(child, parent);
        }

        Ok(graph)
    }
}
