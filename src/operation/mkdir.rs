//! Mkdir operation: create a directory and all missing parents
//!
//! Undo removes only the path segments this operation created, and only
//! while they are still empty. Setting the `forceremoval` value removes the
//! created tree unconditionally, contents included; that escape hatch is an
//! intentional part of the contract.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::{Operation, OperationCore, OperationErrorKind};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct MkdirBackup {
    /// Deepest ancestor of the target that existed before perform
    existing_ancestor: Option<PathBuf>,
}

/// Creates all missing segments of a directory path
#[derive(Debug)]
pub struct MkdirOperation {
    core: OperationCore,
    backup: Option<MkdirBackup>,
}

impl MkdirOperation {
    pub fn new() -> Self {
        Self {
            core: OperationCore::new("Mkdir"),
            backup: None,
        }
    }

    pub fn with_arguments(arguments: Vec<String>) -> Self {
        let mut op = Self::new();
        op.core.set_arguments(arguments);
        op
    }

    /// Path segments this operation created, deepest first
    fn created_segments(&self) -> Vec<PathBuf> {
        let Some(target) = self.core.arguments().first() else {
            return Vec::new();
        };
        let target = Path::new(target);
        let existing = self
            .backup
            .as_ref()
            .and_then(|b| b.existing_ancestor.as_deref());

        target
            .ancestors()
            .take_while(|p| Some(*p) != existing && !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .collect()
    }
}

impl Default for MkdirOperation {
    fn default() -> Self {
        Self::new()
    }
}

impl Operation for MkdirOperation {
    fn core(&self) -> &OperationCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut OperationCore {
        &mut self.core
    }

    fn test_operation(&mut self) -> bool {
        // Argument validation happens in perform; creating directories has
        // no further preconditions.
        true
    }

    fn backup(&mut self) {
        let existing_ancestor = self
            .core
            .arguments()
            .first()
            .map(Path::new)
            .and_then(|target| {
                target
                    .ancestors()
                    .find(|p| p.exists())
                    .map(Path::to_path_buf)
            });
        self.backup = Some(MkdirBackup { existing_ancestor });
    }

    fn perform_operation(&mut self) -> bool {
        if !self.core.check_argument_count(1) {
            return false;
        }

        let dir = self.core.arguments()[0].clone();
        match std::fs::create_dir_all(&dir) {
            Ok(()) => true,
            Err(e) => self.core.fail(
                OperationErrorKind::PerformFailed,
                format!("Could not create directory \"{}\": {}", dir, e),
            ),
        }
    }

    fn undo_operation(&mut self) -> bool {
        let segments = self.created_segments();
        if segments.is_empty() {
            return true;
        }

        if self.core.bool_value("forceremoval") {
            // Topmost created segment is the child of the pre-existing
            // ancestor; removing it takes the whole created tree with it.
            let topmost = &segments[segments.len() - 1];
            return match std::fs::remove_dir_all(topmost) {
                Ok(()) => true,
                Err(e) => self.core.fail(
                    OperationErrorKind::UndoFailed,
                    format!("Could not remove directory \"{}\": {}", topmost.display(), e),
                ),
            };
        }

        for dir in &segments {
            if !dir.exists() {
                continue;
            }
            let is_empty = std::fs::read_dir(dir)
                .map(|mut entries| entries.next().is_none())
                .unwrap_or(false);
            if !is_empty {
                return self.core.fail(
                    OperationErrorKind::UndoFailed,
                    format!(
                        "Could not remove directory \"{}\": directory is not empty.",
                        dir.display()
                    ),
                );
            }
            if let Err(e) = std::fs::remove_dir(dir) {
                return self.core.fail(
                    OperationErrorKind::UndoFailed,
                    format!("Could not remove directory \"{}\": {}", dir.display(), e),
                );
            }
        }
        true
    }

    fn backup_state(&self) -> serde_json::Value {
        self.backup
            .as_ref()
            .and_then(|b| serde_json::to_value(b).ok())
            .unwrap_or(serde_json::Value::Null)
    }

    fn restore_backup_state(&mut self, state: serde_json::Value) {
        self.backup = serde_json::from_value(state).ok();
    }
}
