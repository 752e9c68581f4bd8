//! Component data model
//!
//! A [`Component`] is a named, versioned installable unit. Its loosely-typed
//! behavior (virtual flag, priorities, automatic operation generation) lives
//! in a string key/value `variables` bag with documented parse-on-read,
//! mirroring how catalogs describe components. Relationships to other
//! components (tree grouping, dependency edges) are kept outside the
//! component itself, in [`graph::ComponentGraph`].

pub mod graph;
pub mod resolver;

pub use graph::{ComponentGraph, ComponentId};
pub use resolver::Resolver;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Tri-state selection of a component
///
/// `PartiallyChecked` is UI-facing only: it appears on tree parents whose
/// children are mixed and is never set directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckState {
    Unchecked,
    PartiallyChecked,
    Checked,
}

/// One `(kind, args, elevated)` tuple a component wants executed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedOperation {
    pub kind: String,
    pub arguments: Vec<String>,
    pub elevated: bool,
}

impl PlannedOperation {
    pub fn new(kind: impl Into<String>, arguments: Vec<String>) -> Self {
        Self {
            kind: kind.into(),
            arguments,
            elevated: false,
        }
    }

    pub fn elevated(mut self) -> Self {
        self.elevated = true;
        self
    }
}

/// Produces the ordered operation list for a component
///
/// Implemented by the built-in default (extract archives into the target
/// directory) or by an embedded evaluator; the engine never assumes which.
/// Must be idempotent: repeated calls with identical component state return
/// identical lists, so planning and execution see the same operations.
pub trait OperationProvider: Send + Sync {
    fn operations(&self, component: &Component, target_dir: &Path) -> Vec<PlannedOperation>;
}

/// A downloadable archive with its optional verification metadata
///
/// Size and checksum come from the catalog; when present, the download
/// subsystem verifies the fetched file against them before it counts as
/// resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub name: String,
    pub size: Option<u64>,
    pub checksum: Option<String>,
}

impl ArchiveEntry {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size: None,
            checksum: None,
        }
    }
}

/// A path a component wants removed when it is uninstalled
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UninstallPath {
    pub path: PathBuf,
    /// Remove the path and its contents even if not empty
    pub wipe: bool,
}

/// A named, versioned installable unit
#[derive(Clone)]
pub struct Component {
    name: String,
    display_name: String,
    version: String,
    variables: HashMap<String, String>,
    dependencies: Vec<String>,
    archives: Vec<ArchiveEntry>,
    enabled: bool,
    installed: bool,
    was_installed: bool,
    check_state: CheckState,
    stop_process_requests: Vec<String>,
    uninstall_paths: Vec<UninstallPath>,
    provider: Option<Arc<dyn OperationProvider>>,
}

impl std::fmt::Debug for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Component")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("enabled", &self.enabled)
            .field("installed", &self.installed)
            .field("check_state", &self.check_state)
            .field("dependencies", &self.dependencies)
            .finish_non_exhaustive()
    }
}

impl Component {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            display_name: name.clone(),
            name,
            version: version.into(),
            variables: HashMap::new(),
            dependencies: Vec::new(),
            archives: Vec::new(),
            enabled: true,
            installed: false,
            was_installed: false,
            check_state: CheckState::Unchecked,
            stop_process_requests: Vec::new(),
            uninstall_paths: Vec::new(),
            provider: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn set_display_name(&mut self, display_name: impl Into<String>) {
        self.display_name = display_name.into();
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    // --- variables bag -----------------------------------------------------

    pub fn variable(&self, key: &str) -> Option<&str> {
        self.variables.get(key).map(String::as_str)
    }

    pub fn set_variable(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.variables.insert(key.into(), value.into());
    }

    /// Parse-on-read boolean: `"true"` is true, anything else false
    pub fn bool_variable(&self, key: &str) -> bool {
        self.variable(key)
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    }

    fn int_variable(&self, key: &str, default: i64) -> i64 {
        self.variable(key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    /// Virtual components are never directly selectable; their state follows
    /// the OR of their dependees
    pub fn is_virtual(&self) -> bool {
        self.bool_variable("virtual")
    }

    /// Whether the default operation provider should generate extract
    /// operations for the component's archives (defaults to true)
    pub fn auto_create_operations(&self) -> bool {
        self.variable("autoCreateOperations")
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(true)
    }

    /// Execution order across components, lower runs first
    pub fn install_priority(&self) -> i64 {
        self.int_variable("installPriority", 0)
    }

    /// Display order, independent of install order
    pub fn sorting_priority(&self) -> i64 {
        self.int_variable("sortingPriority", 0)
    }

    // --- relationships and payload ----------------------------------------

    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    pub fn add_dependency(&mut self, name: impl Into<String>) {
        self.dependencies.push(name.into());
    }

    pub fn archives(&self) -> &[ArchiveEntry] {
        &self.archives
    }

    pub fn add_downloadable_archive(&mut self, name: impl Into<String>) {
        self.archives.push(ArchiveEntry::new(name));
    }

    /// Add an archive carrying verification metadata from the catalog
    pub fn add_archive(&mut self, archive: ArchiveEntry) {
        self.archives.push(archive);
    }

    pub fn remove_downloadable_archive(&mut self, name: &str) {
        self.archives.retain(|a| a.name != name);
    }

    // --- state -------------------------------------------------------------

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_installed(&self) -> bool {
        self.installed
    }

    pub fn set_installed(&mut self, installed: bool) {
        self.installed = installed;
    }

    /// Whether this run performed the component's installation
    pub fn was_installed(&self) -> bool {
        self.was_installed
    }

    /// Called by the orchestrator after the component's operations succeeded
    pub fn mark_as_performed_installation(&mut self) {
        self.installed = true;
        self.was_installed = true;
    }

    pub fn check_state(&self) -> CheckState {
        self.check_state
    }

    pub(crate) fn set_check_state(&mut self, state: CheckState) {
        self.check_state = state;
    }

    pub fn is_checked(&self) -> bool {
        self.check_state == CheckState::Checked
    }

    // --- update hygiene ----------------------------------------------------

    /// Processes that must not be running while this component's operations
    /// execute
    pub fn stop_process_requests(&self) -> &[String] {
        &self.stop_process_requests
    }

    pub fn add_stop_process_request(&mut self, process_name: impl Into<String>) {
        self.stop_process_requests.push(process_name.into());
    }

    pub fn uninstall_paths(&self) -> &[UninstallPath] {
        &self.uninstall_paths
    }

    pub fn register_path_for_uninstallation(&mut self, path: impl Into<PathBuf>, wipe: bool) {
        self.uninstall_paths.push(UninstallPath {
            path: path.into(),
            wipe,
        });
    }

    // --- operation generation ----------------------------------------------

    pub fn set_operation_provider(&mut self, provider: Arc<dyn OperationProvider>) {
        self.provider = Some(provider);
    }

    /// Planned operations for this component, in execution order
    ///
    /// Falls back to [`DefaultOperationProvider`] when no provider is set.
    pub fn planned_operations(&self, target_dir: &Path) -> Vec<PlannedOperation> {
        match &self.provider {
            Some(provider) => provider.operations(self, target_dir),
            None => DefaultOperationProvider.operations(self, target_dir),
        }
    }
}

/// Built-in provider: extract every archive into the target directory
///
/// The archive reference is resolved to a local cache path by the
/// orchestrator before execution; here it stays a bare name.
pub struct DefaultOperationProvider;

impl OperationProvider for DefaultOperationProvider {
    fn operations(&self, component: &Component, target_dir: &Path) -> Vec<PlannedOperation> {
        if !component.auto_create_operations() {
            return Vec::new();
        }
        component
            .archives()
            .iter()
            .map(|archive| {
                PlannedOperation::new(
                    "Extract",
                    vec![archive.name.clone(), target_dir.display().to_string()],
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variables_parse_on_read() {
        let mut component = Component::new("app.core", "1.0.0");
        assert!(!component.is_virtual());
        assert!(component.auto_create_operations());
        assert_eq!(component.install_priority(), 0);

        component.set_variable("virtual", "true");
        component.set_variable("autoCreateOperations", "false");
        component.set_variable("installPriority", "50");
        component.set_variable("sortingPriority", "not-a-number");

        assert!(component.is_virtual());
        assert!(!component.auto_create_operations());
        assert_eq!(component.install_priority(), 50);
        assert_eq!(component.sorting_priority(), 0);
    }

    #[test]
    fn test_default_provider_extracts_archives() {
        let mut component = Component::new("app.core", "1.0.0");
        component.add_downloadable_archive("core-1.0.zip");
        component.add_downloadable_archive("docs-1.0.zip");

        let ops = component.planned_operations(Path::new("/opt/app"));
        assert_eq!(ops.len(), 2);
        assert_eq!(ops[0].kind, "Extract");
        assert_eq!(ops[0].arguments, ["core-1.0.zip", "/opt/app"]);
        assert!(!ops[0].elevated);
    }

    #[test]
    fn test_default_provider_respects_auto_create() {
        let mut component = Component::new("app.core", "1.0.0");
        component.add_downloadable_archive("core-1.0.zip");
        component.set_variable("autoCreateOperations", "false");
        assert!(component.planned_operations(Path::new("/opt/app")).is_empty());
    }

    #[test]
    fn test_remove_downloadable_archive() {
        let mut component = Component::new("app.core", "1.0.0");
        component.add_downloadable_archive("a.zip");
        component.add_downloadable_archive("b.zip");
        component.remove_downloadable_archive("a.zip");
        assert_eq!(component.archives().len(), 1);
        assert_eq!(component.archives()[0].name, "b.zip");
    }

    #[test]
    fn test_archive_entry_carries_verification_metadata() {
        let mut component = Component::new("app.core", "1.0.0");
        component.add_archive(ArchiveEntry {
            name: "core-1.0.zip".to_string(),
            size: Some(1024),
            checksum: Some("blake3:abc".to_string()),
        });
        component.add_downloadable_archive("docs-1.0.zip");

        assert_eq!(component.archives()[0].size, Some(1024));
        assert_eq!(
            component.archives()[0].checksum.as_deref(),
            Some("blake3:abc")
        );
        // Plain names carry no metadata.
        assert_eq!(component.archives()[1].size, None);
    }

    #[test]
    fn test_mark_as_performed_installation() {
        let mut component = Component::new("app.core", "1.0.0");
        assert!(!component.was_installed());
        component.mark_as_performed_installation();
        assert!(component.is_installed());
        assert!(component.was_installed());
    }

    #[test]
    fn test_uninstall_path_registration() {
        let mut component = Component::new("app.core", "1.0.0");
        component.register_path_for_uninstallation("/opt/app/cache", true);
        assert_eq!(component.uninstall_paths().len(), 1);
        assert!(component.uninstall_paths()[0].wipe);
    }
}
