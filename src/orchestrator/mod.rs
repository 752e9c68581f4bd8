//! Installation orchestrator
//!
//! Given a resolved component selection, builds the ordered operation plan
//! (uninstalls replayed in reverse from the manifest, then installs ordered
//! by `installPriority`), resolves every archive through the download
//! subsystem before any operation runs, and executes the plan strictly in
//! order: `test -> backup -> perform`, with elevated operations routed
//! through the single serialized helper channel.
//!
//! On the first failure forward execution stops and every already-performed
//! operation is undone in reverse order. Rollback is best-effort: an undo
//! failure is recorded and does not stop the remaining undos, but downgrades
//! the terminal outcome to `FailedRollbackIncomplete` so the operator knows
//! manual cleanup is required.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::component::{ComponentGraph, ComponentId, Resolver};
use crate::download::{DownloadManager, DownloadTask, FileTaskItem};
use crate::elevation::{ElevatedAction, ElevatedExecutor, ElevationRequest, ProcessChannel};
use crate::error::{InstackError, Result, download_failed, process_running};
use crate::manifest::{FileManifest, InstalledEntry, ManifestStore};
use crate::operation::{
    Operation, OperationError, OperationErrorKind, OperationRegistry, OperationState,
    RecordedOperation,
};
use crate::progress::ProgressDisplay;
use crate::settings::Settings;
use crate::sysinfo::{OsInspector, UnixInspector};

/// What happened to a batch, reported after rollback where applicable
#[derive(Debug)]
pub enum RunOutcome {
    Success,
    /// The batch failed and every performed operation was undone
    FailedRolledBack(FailureReport),
    /// The batch failed and at least one undo also failed
    FailedRollbackIncomplete(FailureReport),
    /// Operator-requested abort; treated like a failure for rollback
    Canceled,
    /// The privilege escalation was rejected or unavailable
    ElevationDenied,
}

/// Which operations were undone and which could not be, so the operator
/// knows what manual cleanup remains
#[derive(Debug, Default)]
pub struct FailureReport {
    /// Description and captured error of the operation that failed
    pub failed_operation: Option<(String, OperationError)>,
    /// Operations undone during rollback, in undo order
    pub undone: Vec<String>,
    /// Operations whose undo failed, with the captured error
    pub undo_failures: Vec<(String, OperationError)>,
}

enum PlanAction {
    /// Normal forward execution for an install-set component
    Perform,
    /// Reverse replay of a recorded operation for an uninstall-set component
    Undo,
}

struct PlanEntry {
    component: String,
    action: PlanAction,
    op: Box<dyn Operation>,
}

impl PlanEntry {
    fn describe(&self) -> String {
        format!("{}({})", self.op.kind(), self.op.arguments().join(", "))
    }
}

enum StepFailure {
    Operation(OperationError),
    Elevation,
}

/// Drives one installation run end to end
pub struct Orchestrator {
    settings: Settings,
    registry: OperationRegistry,
    executor: Box<dyn ElevatedExecutor>,
    inspector: Arc<dyn OsInspector>,
    manifest: Box<dyn ManifestStore>,
    downloads: DownloadManager,
    cancel: CancellationToken,
    /// Attempt to stop processes named by stop-process-for-update requests
    /// instead of failing immediately
    pub stop_blocking_processes: bool,
}

impl Orchestrator {
    pub fn new(settings: Settings) -> Result<Self> {
        let downloads = DownloadManager::new(
            settings.pool_size,
            settings.attempt_timeout(),
            settings.auth_retry_limit,
        )?;
        let executor = Box::new(ProcessChannel::new(settings.helper_command.clone()));
        let manifest = Box::new(FileManifest::for_target(&settings.target_dir));
        Ok(Self {
            settings,
            registry: OperationRegistry::default(),
            executor,
            inspector: Arc::new(UnixInspector),
            manifest,
            downloads,
            cancel: CancellationToken::new(),
            stop_blocking_processes: false,
        })
    }

    pub fn with_executor(mut self, executor: Box<dyn ElevatedExecutor>) -> Self {
        self.executor = executor;
        self
    }

    pub fn with_inspector(mut self, inspector: Arc<dyn OsInspector>) -> Self {
        self.inspector = inspector;
        self
    }

    pub fn with_manifest(mut self, manifest: Box<dyn ManifestStore>) -> Self {
        self.manifest = manifest;
        self
    }

    pub fn with_download_manager(mut self, downloads: DownloadManager) -> Self {
        self.downloads = downloads;
        self
    }

    pub fn with_registry(mut self, registry: OperationRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Handle for requesting a cooperative abort; the in-flight operation
    /// finishes before the batch enters rollback
    pub fn cancel_handle(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Execute the change implied by the current selection
    ///
    /// Planning errors (unknown operation kinds, unresolvable archives,
    /// blocking processes) surface as `Err` before anything has run;
    /// execution failures roll back and surface as a [`RunOutcome`].
    pub fn run(&mut self, graph: &mut ComponentGraph) -> Result<RunOutcome> {
        let mut install = Resolver::install_set(graph);
        let uninstall = Resolver::uninstall_set(graph);
        if install.is_empty() && uninstall.is_empty() {
            tracing::info!("nothing to do");
            return Ok(RunOutcome::Success);
        }

        // Catalog order breaks ties; the sort is stable.
        install.sort_by_key(|&id| graph.get(id).install_priority());

        self.check_stop_processes(graph, install.iter().chain(&uninstall))?;

        if !self.inspector.is_path_on_local_device(&self.settings.target_dir) {
            tracing::warn!(
                target = %self.settings.target_dir.display(),
                "target directory is on a network file system"
            );
        }

        let snapshot = self.manifest.load()?;

        let archive_paths = match self.fetch_archives(graph, &install) {
            Ok(paths) => paths,
            Err(InstackError::Canceled) => return Ok(RunOutcome::Canceled),
            Err(e) => return Err(e),
        };

        let mut plan = Vec::new();
        self.plan_uninstalls(graph, &uninstall, &snapshot, &mut plan)?;
        self.plan_installs(graph, &install, &archive_paths, &mut plan)?;

        tracing::info!(
            operations = plan.len(),
            installing = install.len(),
            uninstalling = uninstall.len(),
            "executing operation batch"
        );

        let outcome = self.execute(&mut plan);
        if let RunOutcome::Success = outcome {
            self.commit(graph, &install, &uninstall, snapshot, &plan)?;
        }
        Ok(outcome)
    }

    /// Fail fast if a process named by a stop-process-for-update request is
    /// running, optionally stopping it first
    fn check_stop_processes<'a>(
        &self,
        graph: &ComponentGraph,
        components: impl Iterator<Item = &'a ComponentId>,
    ) -> Result<()> {
        let mut requested: Vec<&str> = Vec::new();
        for &id in components {
            for name in graph.get(id).stop_process_requests() {
                if !requested.contains(&name.as_str()) {
                    requested.push(name);
                }
            }
        }
        if requested.is_empty() {
            return Ok(());
        }

        let running = self.inspector.running_processes();
        for name in requested {
            let Some(process) = running.iter().find(|p| p.name == name) else {
                continue;
            };
            if self.stop_blocking_processes {
                tracing::info!(process = %name, pid = process.pid, "stopping blocking process");
                if self.inspector.kill_process(process, Duration::from_secs(10)) {
                    continue;
                }
            }
            return Err(process_running(name));
        }
        Ok(())
    }

    /// Resolve every archive of the install set through the download
    /// subsystem; nothing executes until all payloads are present and
    /// verified
    fn fetch_archives(
        &self,
        graph: &ComponentGraph,
        install: &[ComponentId],
    ) -> Result<HashMap<String, PathBuf>> {
        let mut task = DownloadTask::new();
        let mut paths = HashMap::new();

        for &id in install {
            let component = graph.get(id);
            for archive in component.archives() {
                // First enabled repository wins; see `Settings::repositories`.
                let repository = self
                    .settings
                    .enabled_repositories()
                    .next()
                    .ok_or_else(|| {
                        download_failed(archive.name.clone(), "no enabled repository configured")
                    })?;
                let url = repository.archive_url(&archive.name);
                let file_name = archive.name.rsplit('/').next().unwrap_or(&archive.name);
                let target = self
                    .settings
                    .cache_dir()
                    .join(component.name())
                    .join(file_name);

                if let Some(authenticator) = &repository.authenticator {
                    task.set_authenticator(authenticator.clone());
                }
                let mut item = FileTaskItem::new(url, target.clone());
                item.expected_size = archive.size;
                item.checksum = archive.checksum.clone();
                task.add_item(item);
                paths.insert(archive.name.clone(), target);
            }
        }

        if task.items().is_empty() {
            return Ok(paths);
        }

        let mut progress = ProgressDisplay::new(0);
        progress.init_download_progress(task.items().len() as u64);
        task.link_cancel(&self.cancel);

        let results = self.downloads.run(&mut task)?;
        for result in &results {
            progress.update_download(&result.source);
        }
        progress.finish_downloads();
        Ok(paths)
    }

    fn plan_uninstalls(
        &self,
        graph: &ComponentGraph,
        uninstall: &[ComponentId],
        snapshot: &crate::manifest::ManifestSnapshot,
        plan: &mut Vec<PlanEntry>,
    ) -> Result<()> {
        // Reverse catalog order, and reverse recorded order within each
        // component: last performed is first undone.
        for &id in uninstall.iter().rev() {
            let component = graph.get(id);
            let Some(entry) = snapshot.entry(component.name()) else {
                tracing::warn!(
                    component = %component.name(),
                    "marked installed but missing from the manifest"
                );
                continue;
            };
            for recorded in entry.operations.iter().rev() {
                let mut op = self.registry.restore(recorded)?;
                // Restored operations were performed by the original run.
                op.core_mut().set_state(OperationState::Performed);
                plan.push(PlanEntry {
                    component: component.name().to_string(),
                    action: PlanAction::Undo,
                    op,
                });
            }
        }
        Ok(())
    }

    fn plan_installs(
        &self,
        graph: &ComponentGraph,
        install: &[ComponentId],
        archive_paths: &HashMap<String, PathBuf>,
        plan: &mut Vec<PlanEntry>,
    ) -> Result<()> {
        for &id in install {
            let component = graph.get(id);
            for planned in component.planned_operations(&self.settings.target_dir) {
                let arguments = planned
                    .arguments
                    .into_iter()
                    .map(|arg| match archive_paths.get(&arg) {
                        Some(path) => path.display().to_string(),
                        None => arg,
                    })
                    .collect();
                let mut op = self.registry.create(&planned.kind, arguments)?;
                op.core_mut().set_elevated(planned.elevated);
                plan.push(PlanEntry {
                    component: component.name().to_string(),
                    action: PlanAction::Perform,
                    op,
                });
            }
        }
        Ok(())
    }

    fn execute(&mut self, plan: &mut [PlanEntry]) -> RunOutcome {
        let progress = ProgressDisplay::new(plan.len() as u64);
        let total = plan.len();
        let mut performed: Vec<usize> = Vec::new();
        let mut report = FailureReport::default();
        let mut failure: Option<StepFailure> = None;
        let mut canceled = false;

        for index in 0..plan.len() {
            if self.cancel.is_cancelled() {
                canceled = true;
                break;
            }
            let entry = &mut plan[index];
            progress.update_operation(&entry.describe(), index + 1, total);

            let result = match entry.action {
                PlanAction::Perform => {
                    let result = Self::perform_entry(self.executor.as_mut(), entry);
                    if result.is_ok() {
                        performed.push(index);
                    }
                    result
                }
                PlanAction::Undo => Self::undo_entry(self.executor.as_mut(), entry)
                    .map_err(StepFailure::Operation),
            };

            match result {
                Ok(()) => progress.inc_operation(),
                Err(step) => {
                    if let StepFailure::Operation(error) = &step {
                        tracing::error!(
                            operation = %entry.describe(),
                            component = %entry.component,
                            error = %error.message,
                            "operation failed, rolling back"
                        );
                        report.failed_operation = Some((entry.describe(), error.clone()));
                    }
                    failure = Some(step);
                    break;
                }
            }
        }

        if failure.is_none() && !canceled {
            progress.finish();
            return RunOutcome::Success;
        }
        progress.abandon();

        self.rollback(plan, &performed, &mut report);

        match failure {
            Some(StepFailure::Elevation) => RunOutcome::ElevationDenied,
            _ if canceled => RunOutcome::Canceled,
            _ if report.undo_failures.is_empty() => RunOutcome::FailedRolledBack(report),
            _ => RunOutcome::FailedRollbackIncomplete(report),
        }
    }

    /// Undo every performed operation in reverse order, best-effort
    fn rollback(&mut self, plan: &mut [PlanEntry], performed: &[usize], report: &mut FailureReport) {
        for &index in performed.iter().rev() {
            let entry = &mut plan[index];
            match Self::undo_entry(self.executor.as_mut(), entry) {
                Ok(()) => report.undone.push(entry.describe()),
                Err(error) => {
                    tracing::error!(
                        operation = %entry.describe(),
                        error = %error.message,
                        "undo failed during rollback, manual cleanup required"
                    );
                    report.undo_failures.push((entry.describe(), error));
                }
            }
        }
    }

    fn perform_entry(
        executor: &mut dyn ElevatedExecutor,
        entry: &mut PlanEntry,
    ) -> std::result::Result<(), StepFailure> {
        if !entry.op.test_operation() {
            let error = captured_error(
                entry.op.as_ref(),
                OperationErrorKind::PreconditionFailed,
                "precondition failed",
            );
            entry.op.core_mut().set_state(OperationState::Failed);
            return Err(StepFailure::Operation(error));
        }

        entry.op.backup();
        entry.op.core_mut().set_state(OperationState::BackedUp);

        if entry.op.is_elevated() {
            let request = ElevationRequest {
                action: ElevatedAction::Perform,
                operation: RecordedOperation::from_operation(entry.op.as_ref()),
            };
            match executor.execute(&request) {
                Ok(response) if response.success => {
                    // Carry the helper's output state so undo still works
                    // from this process.
                    entry.op.restore_backup_state(response.output);
                    entry.op.core_mut().set_state(OperationState::Performed);
                    Ok(())
                }
                Ok(response) => {
                    let error = response.error.unwrap_or(OperationError {
                        kind: OperationErrorKind::PerformFailed,
                        message: "elevated perform failed".to_string(),
                    });
                    entry
                        .op
                        .core_mut()
                        .fail(error.kind, error.message.clone());
                    entry.op.core_mut().set_state(OperationState::Failed);
                    Err(StepFailure::Operation(error))
                }
                Err(
                    InstackError::ElevationDenied | InstackError::ElevationUnavailable { .. },
                ) => Err(StepFailure::Elevation),
                Err(e) => {
                    entry
                        .op
                        .core_mut()
                        .fail(OperationErrorKind::PerformFailed, e.to_string());
                    entry.op.core_mut().set_state(OperationState::Failed);
                    Err(StepFailure::Operation(captured_error(
                        entry.op.as_ref(),
                        OperationErrorKind::PerformFailed,
                        "elevated channel error",
                    )))
                }
            }
        } else if entry.op.perform_operation() {
            entry.op.core_mut().set_state(OperationState::Performed);
            Ok(())
        } else {
            let error = captured_error(
                entry.op.as_ref(),
                OperationErrorKind::PerformFailed,
                "perform failed",
            );
            entry.op.core_mut().set_state(OperationState::Failed);
            Err(StepFailure::Operation(error))
        }
    }

    fn undo_entry(
        executor: &mut dyn ElevatedExecutor,
        entry: &mut PlanEntry,
    ) -> std::result::Result<(), OperationError> {
        if entry.op.is_elevated() {
            let request = ElevationRequest {
                action: ElevatedAction::Undo,
                operation: RecordedOperation::from_operation(entry.op.as_ref()),
            };
            match executor.execute(&request) {
                Ok(response) if response.success => {
                    entry.op.core_mut().set_state(OperationState::Done);
                    Ok(())
                }
                Ok(response) => {
                    entry.op.core_mut().set_state(OperationState::UndoFailed);
                    Err(response.error.unwrap_or(OperationError {
                        kind: OperationErrorKind::UndoFailed,
                        message: "elevated undo failed".to_string(),
                    }))
                }
                Err(e) => {
                    entry.op.core_mut().set_state(OperationState::UndoFailed);
                    Err(OperationError {
                        kind: OperationErrorKind::UndoFailed,
                        message: e.to_string(),
                    })
                }
            }
        } else if entry.op.undo_operation() {
            entry.op.core_mut().set_state(OperationState::Done);
            Ok(())
        } else {
            entry.op.core_mut().set_state(OperationState::UndoFailed);
            Err(captured_error(
                entry.op.as_ref(),
                OperationErrorKind::UndoFailed,
                "undo failed",
            ))
        }
    }

    /// After full success: update installed flags, wipe registered
    /// uninstall paths, and persist the manifest
    fn commit(
        &mut self,
        graph: &mut ComponentGraph,
        install: &[ComponentId],
        uninstall: &[ComponentId],
        mut snapshot: crate::manifest::ManifestSnapshot,
        plan: &[PlanEntry],
    ) -> Result<()> {
        for &id in uninstall {
            let component = graph.get_mut(id);
            for registered in component.uninstall_paths().to_vec() {
                let result = if registered.wipe {
                    std::fs::remove_dir_all(&registered.path)
                } else {
                    std::fs::remove_dir(&registered.path)
                };
                if let Err(e) = result {
                    tracing::warn!(
                        path = %registered.path.display(),
                        error = %e,
                        "could not remove registered uninstall path"
                    );
                }
            }
            snapshot.components.remove(component.name());
            component.set_installed(false);
        }

        for &id in install {
            let component = graph.get_mut(id);
            component.mark_as_performed_installation();
            let operations = plan
                .iter()
                .filter(|entry| {
                    matches!(entry.action, PlanAction::Perform)
                        && entry.component == component.name()
                })
                .map(|entry| RecordedOperation::from_operation(entry.op.as_ref()))
                .collect();
            snapshot.components.insert(
                component.name().to_string(),
                InstalledEntry {
                    version: component.version().to_string(),
                    operations,
                },
            );
        }

        self.manifest.save(&snapshot)?;
        tracing::info!("installation committed");
        Ok(())
    }
}

fn captured_error(
    op: &dyn Operation,
    fallback_kind: OperationErrorKind,
    fallback_message: &str,
) -> OperationError {
    op.error().cloned().unwrap_or(OperationError {
        kind: fallback_kind,
        message: fallback_message.to_string(),
    })
}
