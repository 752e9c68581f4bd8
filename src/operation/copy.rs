//! Copy operation: copy a single file over a target path
//!
//! Backup captures the previous target contents (if any) so undo can restore
//! the file byte-exactly, or remove it when it did not exist before.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::{Operation, OperationCore, OperationErrorKind};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct CopyBackup {
    target_existed: bool,
    #[serde(default)]
    previous_contents: Vec<u8>,
}

/// Copies a file from source to target, replacing any existing target
#[derive(Debug)]
pub struct CopyOperation {
    core: OperationCore,
    backup: Option<CopyBackup>,
}

impl CopyOperation {
    pub fn new() -> Self {
        Self {
            core: OperationCore::new("Copy"),
            backup: None,
        }
    }

    pub fn with_arguments(arguments: Vec<String>) -> Self {
        let mut op = Self::new();
        op.core.set_arguments(arguments);
        op
    }
}

impl Default for CopyOperation {
    fn default() -> Self {
        Self::new()
    }
}

impl Operation for CopyOperation {
    fn core(&self) -> &OperationCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut OperationCore {
        &mut self.core
    }

    fn test_operation(&mut self) -> bool {
        if !self.core.check_argument_count(2) {
            return false;
        }
        let source = Path::new(&self.core.arguments()[0]);
        if !source.is_file() {
            return self.core.fail(
                OperationErrorKind::PreconditionFailed,
                format!("Source file \"{}\" does not exist.", source.display()),
            );
        }
        true
    }

    fn backup(&mut self) {
        let backup = self
            .core
            .arguments()
            .get(1)
            .map(Path::new)
            .map(|target| match std::fs::read(target) {
                Ok(contents) => CopyBackup {
                    target_existed: true,
                    previous_contents: contents,
                },
                Err(_) => CopyBackup::default(),
            })
            .unwrap_or_default();
        self.backup = Some(backup);
    }

    fn perform_operation(&mut self) -> bool {
        if !self.core.check_argument_count(2) {
            return false;
        }
        let source = self.core.arguments()[0].clone();
        let target = self.core.arguments()[1].clone();

        if let Some(parent) = Path::new(&target).parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                return self.core.fail(
                    OperationErrorKind::PerformFailed,
                    format!(
                        "Could not create directory \"{}\": {}",
                        parent.display(),
                        e
                    ),
                );
            }
        }

        match std::fs::copy(&source, &target) {
            Ok(_) => true,
            Err(e) => self.core.fail(
                OperationErrorKind::PerformFailed,
                format!("Could not copy \"{}\" to \"{}\": {}", source, target, e),
            ),
        }
    }

    fn undo_operation(&mut self) -> bool {
        let Some(target) = self.core.arguments().get(1).cloned() else {
            return true;
        };
        let backup = self.backup.clone().unwrap_or_default();

        let result = if backup.target_existed {
            std::fs::write(&target, &backup.previous_contents)
        } else {
            std::fs::remove_file(&target)
        };
        match result {
            Ok(()) => true,
            Err(e) => self.core.fail(
                OperationErrorKind::UndoFailed,
                format!("Could not restore \"{}\": {}", target, e),
            ),
        }
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

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_argument_count() {
        let mut op = CopyOperation::new();
        assert!(!op.test_operation());
        let err = op.error().unwrap();
        assert_eq!(err.kind, OperationErrorKind::InvalidArguments);
        assert_eq!(
            err.message,
            "Invalid arguments: 0 arguments given, 2 expected."
        );
    }

    #[test]
    fn test_missing_source_fails_precondition() {
        let temp = TempDir::new().unwrap();
        let mut op = CopyOperation::with_arguments(vec![
            temp.path().join("missing.txt").display().to_string(),
            temp.path().join("target.txt").display().to_string(),
        ]);
        assert!(!op.test_operation());
        assert_eq!(
            op.error().unwrap().kind,
            OperationErrorKind::PreconditionFailed
        );
    }

    #[test]
    fn test_copy_then_undo_removes_new_target() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("source.txt");
        let target = temp.path().join("sub/target.txt");
        std::fs::write(&source, "payload").unwrap();

        let mut op = CopyOperation::with_arguments(vec![
            source.display().to_string(),
            target.display().to_string(),
        ]);
        assert!(op.test_operation());
        op.backup();
        assert!(op.perform_operation(), "{:?}", op.error());
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "payload");

        assert!(op.undo_operation(), "{:?}", op.error());
        assert!(!target.exists());
    }

    #[test]
    fn test_copy_then_undo_restores_previous_contents() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("source.txt");
        let target = temp.path().join("target.txt");
        std::fs::write(&source, "new").unwrap();
        std::fs::write(&target, "old").unwrap();

        let mut op = CopyOperation::with_arguments(vec![
            source.display().to_string(),
            target.display().to_string(),
        ]);
        op.backup();
        assert!(op.perform_operation(), "{:?}", op.error());
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "new");

        assert!(op.undo_operation(), "{:?}", op.error());
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "old");
    }
}
