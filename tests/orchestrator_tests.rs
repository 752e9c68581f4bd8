//! Orchestrator execution and rollback tests
//!
//! This module tests:
//! - The three-operation failure scenario: first operation undone exactly
//!   once, third never attempted, terminal outcome FailedRolledBack
//! - Rollback downgrading to FailedRollbackIncomplete when an undo fails
//! - ElevationDenied ending the batch after rollback
//! - Cancellation producing the Canceled outcome
//! - Install-then-uninstall round trips through the manifest

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use instack::component::{
    ArchiveEntry, Component, ComponentGraph, OperationProvider, PlannedOperation, Resolver,
};
use instack::download::{
    Authenticator, DirectProxyFactory, DownloadManager, FetchError, Fetcher, FileTaskItem,
    ProxyConfig, Repository, RepositoryCategory,
};
use instack::elevation::{ElevatedExecutor, ElevationRequest, ElevationResponse, LocalExecutor};
use instack::error::{elevation_denied, InstackError};
use instack::manifest::{FileManifest, ManifestStore};
use instack::orchestrator::{Orchestrator, RunOutcome};
use instack::settings::Settings;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// Provider returning a fixed operation list
struct Scripted(Vec<PlannedOperation>);

impl OperationProvider for Scripted {
    fn operations(&self, _component: &Component, _target_dir: &Path) -> Vec<PlannedOperation> {
        self.0.clone()
    }
}

struct Denier;

impl ElevatedExecutor for Denier {
    fn execute(&mut self, _request: &ElevationRequest) -> instack::Result<ElevationResponse> {
        Err(elevation_denied())
    }
}

fn orchestrator(temp: &TempDir) -> Orchestrator {
    let settings = Settings::new(temp.path().join("target"));
    Orchestrator::new(settings)
        .unwrap()
        .with_executor(Box::new(LocalExecutor::default()))
}

fn single_component_graph(ops: Vec<PlannedOperation>) -> ComponentGraph {
    let mut graph = ComponentGraph::new();
    let mut component = Component::new("app", "1.0.0");
    component.set_operation_provider(Arc::new(Scripted(ops)));
    graph.add(component);
    Resolver::initialize(&mut graph).unwrap();
    Resolver::set_checked(&mut graph, "app", true).unwrap();
    graph
}

#[test]
fn test_second_operation_failure_rolls_back_first_and_skips_third() {
    let temp = TempDir::new().unwrap();
    let dir1 = temp.path().join("work/first");
    let missing_source = temp.path().join("does-not-exist.txt");
    let copy_dest = temp.path().join("work/copy.txt");
    let dir3 = temp.path().join("work/third");

    let mut graph = single_component_graph(vec![
        PlannedOperation::new("Mkdir", vec![dir1.display().to_string()]),
        PlannedOperation::new(
            "Copy",
            vec![
                missing_source.display().to_string(),
                copy_dest.display().to_string(),
            ],
        ),
        PlannedOperation::new("Mkdir", vec![dir3.display().to_string()]),
    ]);

    let mut orchestrator = orchestrator(&temp);
    let outcome = orchestrator.run(&mut graph).unwrap();

    let RunOutcome::FailedRolledBack(report) = outcome else {
        panic!("expected FailedRolledBack, got {outcome:?}");
    };

    // The first operation was undone exactly once.
    assert_eq!(report.undone.len(), 1);
    assert!(report.undone[0].starts_with("Mkdir"), "{:?}", report.undone);
    assert!(!dir1.exists());

    // The third operation was never attempted.
    assert!(!dir3.exists());

    // The failure names the copy operation.
    let (failed, _) = report.failed_operation.as_ref().unwrap();
    assert!(failed.starts_with("Copy"), "{failed}");
    assert!(report.undo_failures.is_empty());

    // Nothing was committed.
    assert!(!graph.by_name("app").unwrap().is_installed());
    let manifest = FileManifest::for_target(&temp.path().join("target"));
    assert!(manifest.load().unwrap().components.is_empty());
}

#[test]
fn test_undo_failure_during_rollback_is_reported_incomplete() {
    let temp = TempDir::new().unwrap();
    let blocked = temp.path().join("work/blocked");
    let missing_source = temp.path().join("does-not-exist.txt");
    let copy_dest = temp.path().join("work/copy.txt");

    // After Mkdir performs, an Execute operation plants a file inside the
    // new directory, then the Copy failure triggers rollback. The Execute
    // undo is a no-op, but the Mkdir undo finds its directory non-empty.
    std::fs::write(temp.path().join("seed.txt"), "seed").unwrap();
    let plant = format!(
        "cp {} {}",
        temp.path().join("seed.txt").display(),
        blocked.join("seed.txt").display()
    );
    let plant_args: Vec<String> = vec!["sh".into(), "-c".into(), plant];

    let mut graph = single_component_graph(vec![
        PlannedOperation::new("Mkdir", vec![blocked.display().to_string()]),
        PlannedOperation::new("Execute", plant_args),
        PlannedOperation::new(
            "Copy",
            vec![
                missing_source.display().to_string(),
                copy_dest.display().to_string(),
            ],
        ),
    ]);

    let mut orchestrator = orchestrator(&temp);
    let outcome = orchestrator.run(&mut graph).unwrap();

    let RunOutcome::FailedRollbackIncomplete(report) = outcome else {
        panic!("expected FailedRollbackIncomplete, got {outcome:?}");
    };

    // The Execute undo (a no-op) succeeded; the Mkdir undo failed because
    // the directory is no longer empty.
    assert_eq!(report.undo_failures.len(), 1);
    assert!(report.undo_failures[0].0.starts_with("Mkdir"));
    assert!(blocked.exists());
}

#[test]
fn test_elevation_denied_rolls_back_and_reports() {
    let temp = TempDir::new().unwrap();
    let dir1 = temp.path().join("work/plain");
    let dir2 = temp.path().join("work/privileged");

    let mut graph = single_component_graph(vec![
        PlannedOperation::new("Mkdir", vec![dir1.display().to_string()]),
        PlannedOperation::new("Mkdir", vec![dir2.display().to_string()]).elevated(),
    ]);

    let settings = Settings::new(temp.path().join("target"));
    let mut orchestrator = Orchestrator::new(settings)
        .unwrap()
        .with_executor(Box::new(Denier));

    let outcome = orchestrator.run(&mut graph).unwrap();
    assert!(matches!(outcome, RunOutcome::ElevationDenied), "{outcome:?}");

    // The plain operation was rolled back before reporting.
    assert!(!dir1.exists());
    assert!(!dir2.exists());
}

#[test]
fn test_cancel_before_execution_yields_canceled() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join("work/dir");

    let mut graph =
        single_component_graph(vec![PlannedOperation::new(
            "Mkdir",
            vec![dir.display().to_string()],
        )]);

    let mut orchestrator = orchestrator(&temp);
    orchestrator.cancel_handle().cancel();

    let outcome = orchestrator.run(&mut graph).unwrap();
    assert!(matches!(outcome, RunOutcome::Canceled), "{outcome:?}");
    assert!(!dir.exists());
}

#[test]
fn test_successful_install_commits_manifest_and_uninstall_reverses_it() {
    let temp = TempDir::new().unwrap();
    let target = temp.path().join("target");
    let dir = target.join("app-data");

    let mut graph =
        single_component_graph(vec![PlannedOperation::new(
            "Mkdir",
            vec![dir.display().to_string()],
        )]);

    let mut install_orchestrator = orchestrator(&temp);
    let outcome = install_orchestrator.run(&mut graph).unwrap();
    assert!(matches!(outcome, RunOutcome::Success), "{outcome:?}");
    assert!(dir.is_dir());
    assert!(graph.by_name("app").unwrap().is_installed());
    assert!(graph.by_name("app").unwrap().was_installed());

    let manifest = FileManifest::for_target(&target);
    let snapshot = manifest.load().unwrap();
    assert!(snapshot.is_installed("app"));
    assert_eq!(snapshot.entry("app").unwrap().operations.len(), 1);

    // A later run unchecks the component; its recorded operations replay
    // in reverse as undos.
    Resolver::set_checked(&mut graph, "app", false).unwrap();
    let mut uninstall_orchestrator = orchestrator(&temp);
    let outcome = uninstall_orchestrator.run(&mut graph).unwrap();
    assert!(matches!(outcome, RunOutcome::Success), "{outcome:?}");

    assert!(!dir.exists());
    assert!(!graph.by_name("app").unwrap().is_installed());
    assert!(!manifest.load().unwrap().is_installed("app"));
}

#[test]
fn test_dependency_installs_with_dependee() {
    let temp = TempDir::new().unwrap();
    let target = temp.path().join("target");
    let base_dir = target.join("base");
    let app_dir = target.join("app");

    let mut graph = ComponentGraph::new();
    let mut base = Component::new("base", "1.0.0");
    base.set_operation_provider(Arc::new(Scripted(vec![PlannedOperation::new(
        "Mkdir",
        vec![base_dir.display().to_string()],
    )])));
    graph.add(base);
    let mut app = Component::new("app", "1.0.0");
    app.add_dependency("base");
    app.set_operation_provider(Arc::new(Scripted(vec![PlannedOperation::new(
        "Mkdir",
        vec![app_dir.display().to_string()],
    )])));
    graph.add(app);
    Resolver::initialize(&mut graph).unwrap();
    Resolver::set_checked(&mut graph, "app", true).unwrap();

    let mut orchestrator = orchestrator(&temp);
    let outcome = orchestrator.run(&mut graph).unwrap();
    assert!(matches!(outcome, RunOutcome::Success), "{outcome:?}");
    assert!(base_dir.is_dir());
    assert!(app_dir.is_dir());

    let snapshot = FileManifest::for_target(&target).load().unwrap();
    assert!(snapshot.is_installed("base"));
    assert!(snapshot.is_installed("app"));
}

/// Fetcher that writes a fixed payload to the target path
struct FixedPayload;

impl FixedPayload {
    const BODY: &'static [u8] = b"archive payload";
}

#[async_trait]
impl Fetcher for FixedPayload {
    async fn fetch(
        &self,
        item: &FileTaskItem,
        _authenticator: Option<&Authenticator>,
        _proxy: &ProxyConfig,
        _cancel: &CancellationToken,
    ) -> Result<u64, FetchError> {
        if let Some(parent) = item.target.parent() {
            std::fs::create_dir_all(parent).map_err(|e| FetchError::Failed(e.to_string()))?;
        }
        std::fs::write(&item.target, Self::BODY).map_err(|e| FetchError::Failed(e.to_string()))?;
        Ok(Self::BODY.len() as u64)
    }
}

fn archive_graph(archive: ArchiveEntry, ops: Vec<PlannedOperation>) -> ComponentGraph {
    let mut graph = ComponentGraph::new();
    let mut component = Component::new("app", "1.0.0");
    component.add_archive(archive);
    component.set_operation_provider(Arc::new(Scripted(ops)));
    graph.add(component);
    Resolver::initialize(&mut graph).unwrap();
    Resolver::set_checked(&mut graph, "app", true).unwrap();
    graph
}

fn orchestrator_with_fetcher(temp: &TempDir) -> Orchestrator {
    let mut settings = Settings::new(temp.path().join("target"));
    settings.add_repository(Repository::new(
        "https://repo.example/stable",
        RepositoryCategory::UserDefined,
    ));
    let downloads =
        DownloadManager::with_parts(Arc::new(FixedPayload), Arc::new(DirectProxyFactory), 2, 1)
            .unwrap();
    Orchestrator::new(settings)
        .unwrap()
        .with_executor(Box::new(LocalExecutor::default()))
        .with_download_manager(downloads)
}

#[test]
fn test_archive_checksum_mismatch_fails_before_any_operation() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join("target/dir");

    let mut archive = ArchiveEntry::new("app.zip");
    archive.checksum = Some(format!("blake3:{}", blake3::hash(b"other bytes").to_hex()));
    let mut graph = archive_graph(
        archive,
        vec![PlannedOperation::new("Mkdir", vec![dir.display().to_string()])],
    );

    let mut orchestrator = orchestrator_with_fetcher(&temp);
    let result = orchestrator.run(&mut graph);
    assert!(matches!(result, Err(InstackError::ContentMismatch { .. })));
    assert!(!dir.exists());

    // The mismatching payload was removed from the cache.
    let cached = temp
        .path()
        .join("target/.instack/cache/app/app.zip");
    assert!(!cached.exists());
}

#[test]
fn test_archive_metadata_match_allows_install() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join("target/dir");

    let mut archive = ArchiveEntry::new("app.zip");
    archive.size = Some(FixedPayload::BODY.len() as u64);
    archive.checksum = Some(format!(
        "blake3:{}",
        blake3::hash(FixedPayload::BODY).to_hex()
    ));
    let mut graph = archive_graph(
        archive,
        vec![PlannedOperation::new("Mkdir", vec![dir.display().to_string()])],
    );

    let mut orchestrator = orchestrator_with_fetcher(&temp);
    let outcome = orchestrator.run(&mut graph).unwrap();
    assert!(matches!(outcome, RunOutcome::Success), "{outcome:?}");
    assert!(dir.is_dir());
}

#[test]
fn test_missing_repository_fails_before_any_operation() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join("target/dir");

    let mut graph = ComponentGraph::new();
    let mut component = Component::new("app", "1.0.0");
    component.add_downloadable_archive("payload.zip");
    component.set_operation_provider(Arc::new(Scripted(vec![PlannedOperation::new(
        "Mkdir",
        vec![dir.display().to_string()],
    )])));
    graph.add(component);
    Resolver::initialize(&mut graph).unwrap();
    Resolver::set_checked(&mut graph, "app", true).unwrap();

    let mut orchestrator = orchestrator(&temp);
    let result = orchestrator.run(&mut graph);
    assert!(matches!(result, Err(InstackError::DownloadError { .. })));
    // Fail fast: the operation never ran.
    assert!(!dir.exists());
}
