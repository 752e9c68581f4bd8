//! Extract operation: unpack a zip archive into a target directory
//!
//! The entry log built during perform doubles as the operation's backup
//! state, so undo works even when it runs in a different process (the
//! elevated helper) or a later uninstall run.

use std::io::Read;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::{Operation, OperationCore, OperationErrorKind};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ExtractLog {
    /// Files written by this operation
    files: Vec<PathBuf>,
    /// Directories created by this operation, in creation order
    dirs: Vec<PathBuf>,
}

/// Extracts a zip archive into a target directory
#[derive(Debug)]
pub struct ExtractOperation {
    core: OperationCore,
    log: ExtractLog,
}

impl ExtractOperation {
    pub fn new() -> Self {
        Self {
            core: OperationCore::new("Extract"),
            log: ExtractLog::default(),
        }
    }

    pub fn with_arguments(arguments: Vec<String>) -> Self {
        let mut op = Self::new();
        op.core.set_arguments(arguments);
        op
    }

    fn extract_all(&mut self, archive_path: &str, target_dir: &str) -> std::io::Result<()> {
        let file = std::fs::File::open(archive_path)?;
        let mut archive = zip::ZipArchive::new(file)
            .map_err(|e| std::io::Error::other(e.to_string()))?;

        for i in 0..archive.len() {
            let mut entry = archive
                .by_index(i)
                .map_err(|e| std::io::Error::other(e.to_string()))?;
            let Some(relative) = entry.enclosed_name() else {
                // Entries escaping the target directory are skipped.
                continue;
            };
            let out_path = Path::new(target_dir).join(relative);

            if entry.is_dir() {
                if !out_path.exists() {
                    std::fs::create_dir_all(&out_path)?;
                    self.log.dirs.push(out_path);
                }
                continue;
            }

            if let Some(parent) = out_path.parent() {
                if !parent.exists() {
                    std::fs::create_dir_all(parent)?;
                    self.log.dirs.push(parent.to_path_buf());
                }
            }
            let mut contents = Vec::new();
            entry.read_to_end(&mut contents)?;
            std::fs::write(&out_path, contents)?;
            self.log.files.push(out_path);
        }
        Ok(())
    }
}

impl Default for ExtractOperation {
    fn default() -> Self {
        Self::new()
    }
}

impl Operation for ExtractOperation {
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
        let archive = Path::new(&self.core.arguments()[0]);
        if !archive.is_file() {
            return self.core.fail(
                OperationErrorKind::PreconditionFailed,
                format!("Archive \"{}\" does not exist.", archive.display()),
            );
        }
        true
    }

    fn backup(&mut self) {
        // Nothing to capture up front; the entry log written during perform
        // is the backup state.
    }

    fn perform_operation(&mut self) -> bool {
        if !self.core.check_argument_count(2) {
            return false;
        }
        let archive = self.core.arguments()[0].clone();
        let target = self.core.arguments()[1].clone();

        match self.extract_all(&archive, &target) {
            Ok(()) => true,
            Err(e) => self.core.fail(
                OperationErrorKind::PerformFailed,
                format!("Could not extract \"{}\" to \"{}\": {}", archive, target, e),
            ),
        }
    }

    fn undo_operation(&mut self) -> bool {
        let mut first_error: Option<String> = None;

        for file in self.log.files.iter().rev() {
            if let Err(e) = std::fs::remove_file(file) {
                if file.exists() && first_error.is_none() {
                    first_error = Some(format!(
                        "Could not remove \"{}\": {}",
                        file.display(),
                        e
                    ));
                }
            }
        }

        // Deepest directories first so parents empty out before removal.
        let mut dirs = self.log.dirs.clone();
        dirs.sort_by_key(|d| std::cmp::Reverse(d.components().count()));
        for dir in dirs {
            let is_empty = std::fs::read_dir(&dir)
                .map(|mut entries| entries.next().is_none())
                .unwrap_or(false);
            if is_empty {
                let _ = std::fs::remove_dir(&dir);
            }
        }

        match first_error {
            None => true,
            Some(message) => self.core.fail(OperationErrorKind::UndoFailed, message),
        }
    }

    fn backup_state(&self) -> serde_json::Value {
        serde_json::to_value(&self.log).unwrap_or(serde_json::Value::Null)
    }

    fn restore_backup_state(&mut self, state: serde_json::Value) {
        self.log = serde_json::from_value(state).unwrap_or_default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_test_archive(path: &Path) {
        let file = std::fs::File::create(path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default();
        writer.add_directory("docs/", options).unwrap();
        writer.start_file("docs/readme.txt", options).unwrap();
        writer.write_all(b"hello").unwrap();
        writer.start_file("bin/tool", options).unwrap();
        writer.write_all(b"#!/bin/sh\n").unwrap();
        writer.finish().unwrap();
    }

    #[test]
    fn test_argument_count() {
        let mut op = ExtractOperation::new();
        assert!(!op.perform_operation());
        assert_eq!(
            op.error().unwrap().message,
            "Invalid arguments: 0 arguments given, 2 expected."
        );
    }

    #[test]
    fn test_extract_and_undo() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("payload.zip");
        let target = temp.path().join("install");
        write_test_archive(&archive);

        let mut op = ExtractOperation::with_arguments(vec![
            archive.display().to_string(),
            target.display().to_string(),
        ]);
        assert!(op.test_operation(), "{:?}", op.error());
        op.backup();
        assert!(op.perform_operation(), "{:?}", op.error());
        assert_eq!(
            std::fs::read_to_string(target.join("docs/readme.txt")).unwrap(),
            "hello"
        );
        assert!(target.join("bin/tool").is_file());

        assert!(op.undo_operation(), "{:?}", op.error());
        assert!(!target.join("docs").exists());
        assert!(!target.join("bin").exists());
    }

    #[test]
    fn test_undo_after_restore_in_fresh_process() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("payload.zip");
        let target = temp.path().join("install");
        write_test_archive(&archive);

        let mut op = ExtractOperation::with_arguments(vec![
            archive.display().to_string(),
            target.display().to_string(),
        ]);
        op.backup();
        assert!(op.perform_operation(), "{:?}", op.error());
        let state = op.backup_state();

        // Simulate undo from a different process using only recorded state.
        let mut restored = ExtractOperation::with_arguments(vec![
            archive.display().to_string(),
            target.display().to_string(),
        ]);
        restored.restore_backup_state(state);
        assert!(restored.undo_operation(), "{:?}", restored.error());
        assert!(!target.join("docs/readme.txt").exists());
    }
}
