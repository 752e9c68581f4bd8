//! AppendFile operation: append text to a configuration file
//!
//! Backup stores the original bytes, so undo restores the file exactly as it
//! was, or removes it when the append created it.

use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::{Operation, OperationCore, OperationErrorKind};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct AppendBackup {
    file_existed: bool,
    #[serde(default)]
    previous_contents: Vec<u8>,
}

/// Appends text to a file, creating it when missing
#[derive(Debug)]
pub struct AppendFileOperation {
    core: OperationCore,
    backup: Option<AppendBackup>,
}

impl AppendFileOperation {
    pub fn new() -> Self {
        Self {
            core: OperationCore::new("AppendFile"),
            backup: None,
        }
    }

    pub fn with_arguments(arguments: Vec<String>) -> Self {
        let mut op = Self::new();
        op.core.set_arguments(arguments);
        op
    }
}

impl Default for AppendFileOperation {
    fn default() -> Self {
        Self::new()
    }
}

impl Operation for AppendFileOperation {
    fn core(&self) -> &OperationCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut OperationCore {
        &mut self.core
    }

    fn test_operation(&mut self) -> bool {
        self.core.check_argument_count(2)
    }

    fn backup(&mut self) {
        let backup = self
            .core
            .arguments()
            .first()
            .map(Path::new)
            .map(|path| match std::fs::read(path) {
                Ok(contents) => AppendBackup {
                    file_existed: true,
                    previous_contents: contents,
                },
                Err(_) => AppendBackup::default(),
            })
            .unwrap_or_default();
        self.backup = Some(backup);
    }

    fn perform_operation(&mut self) -> bool {
        if !self.core.check_argument_count(2) {
            return false;
        }
        let path = self.core.arguments()[0].clone();
        let text = self.core.arguments()[1].clone();

        let result = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .and_then(|mut file| file.write_all(text.as_bytes()));

        match result {
            Ok(()) => true,
            Err(e) => self.core.fail(
                OperationErrorKind::PerformFailed,
                format!("Could not append to \"{}\": {}", path, e),
            ),
        }
    }

    fn undo_operation(&mut self) -> bool {
        let Some(path) = self.core.arguments().first().cloned() else {
            return true;
        };
        let backup = self.backup.clone().unwrap_or_default();

        let result = if backup.file_existed {
            std::fs::write(&path, &backup.previous_contents)
        } else {
            std::fs::remove_file(&path)
        };
        match result {
            Ok(()) => true,
            Err(e) => self.core.fail(
                OperationErrorKind::UndoFailed,
                format!("Could not restore \"{}\": {}", path, e),
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
