//! Execute operation: run an external executable
//!
//! Arguments are the program followed by its arguments. An optional
//! `UNDOEXECUTE` marker splits the list into a perform command and an undo
//! command; without it, undo is a no-op.

use std::process::Command;

use super::{Operation, OperationCore, OperationErrorKind};

/// Marker argument separating the perform command from the undo command
pub const UNDO_MARKER: &str = "UNDOEXECUTE";

/// Runs an executable; success means exit status zero
#[derive(Debug)]
pub struct ExecuteOperation {
    core: OperationCore,
}

impl ExecuteOperation {
    pub fn new() -> Self {
        Self {
            core: OperationCore::new("Execute"),
        }
    }

    pub fn with_arguments(arguments: Vec<String>) -> Self {
        let mut op = Self::new();
        op.core.set_arguments(arguments);
        op
    }

    fn split_commands(&self) -> (Vec<String>, Vec<String>) {
        let args = self.core.arguments();
        match args.iter().position(|a| a == UNDO_MARKER) {
            Some(pos) => (args[..pos].to_vec(), args[pos + 1..].to_vec()),
            None => (args.to_vec(), Vec::new()),
        }
    }

    fn run(&mut self, command: &[String], failure_kind: OperationErrorKind) -> bool {
        let (program, args) = match command.split_first() {
            Some(split) => split,
            None => return true,
        };
        match Command::new(program).args(args).status() {
            Ok(status) if status.success() => true,
            Ok(status) => self.core.fail(
                failure_kind,
                format!("Program \"{}\" exited with {}.", program, status),
            ),
            Err(e) => self.core.fail(
                failure_kind,
                format!("Could not start program \"{}\": {}", program, e),
            ),
        }
    }
}

impl Default for ExecuteOperation {
    fn default() -> Self {
        Self::new()
    }
}

impl Operation for ExecuteOperation {
    fn core(&self) -> &OperationCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut OperationCore {
        &mut self.core
    }

    fn test_operation(&mut self) -> bool {
        if self.core.arguments().is_empty() {
            return self.core.fail(
                OperationErrorKind::InvalidArguments,
                "Invalid arguments: 0 arguments given, at least 1 expected.".to_string(),
            );
        }
        true
    }

    fn backup(&mut self) {
        // Running a program captures no reversible filesystem state.
    }

    fn perform_operation(&mut self) -> bool {
        if !self.test_operation() {
            return false;
        }
        let (perform, _) = self.split_commands();
        self.run(&perform, OperationErrorKind::PerformFailed)
    }

    fn undo_operation(&mut self) -> bool {
        let (_, undo) = self.split_commands();
        self.run(&undo, OperationErrorKind::UndoFailed)
    }
}
