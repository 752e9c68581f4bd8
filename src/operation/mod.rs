//! Reversible operation contract and built-in operation kinds
//!
//! Every unit of system change the engine performs is an [`Operation`]:
//! a kind tag plus a fixed positional argument list, with a
//! `test -> backup -> perform -> undo` lifecycle. Operations capture enough
//! backup state before performing to reverse themselves, and report failures
//! as an `(OperationErrorKind, message)` pair on the operation instead of
//! returning errors across the engine boundary.
//!
//! ## State machine
//!
//! ```text
//! Created -> (tested) -> BackedUp -> Performed -> Done
//!                                 \-> Failed          (perform failed)
//!                        Performed -> UndoFailed      (undo failed)
//! ```
//!
//! `undo_operation` is only valid from `Performed` and is called at most once
//! per successful perform.

mod append_file;
mod copy;
mod execute;
mod extract;
mod mkdir;

pub use append_file::AppendFileOperation;
pub use copy::CopyOperation;
pub use execute::ExecuteOperation;
pub use extract::ExtractOperation;
pub use mkdir::MkdirOperation;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, unknown_operation_kind};

/// Lifecycle state of an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationState {
    Created,
    BackedUp,
    Performed,
    Done,
    Failed,
    UndoFailed,
}

/// Error classification for in-operation failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationErrorKind {
    InvalidArguments,
    PreconditionFailed,
    PerformFailed,
    UndoFailed,
}

/// Error captured on an operation after a failed lifecycle call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationError {
    pub kind: OperationErrorKind,
    pub message: String,
}

/// Shared state every operation kind embeds
///
/// Holds the kind tag, the positional arguments, the loose key/value bag
/// (e.g. `forceremoval`), the elevated flag and the captured error.
#[derive(Debug, Clone)]
pub struct OperationCore {
    kind: String,
    arguments: Vec<String>,
    values: HashMap<String, String>,
    elevated: bool,
    state: OperationState,
    error: Option<OperationError>,
}

impl OperationCore {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            arguments: Vec::new(),
            values: HashMap::new(),
            elevated: false,
            state: OperationState::Created,
            error: None,
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn arguments(&self) -> &[String] {
        &self.arguments
    }

    pub fn set_arguments(&mut self, arguments: Vec<String>) {
        self.arguments = arguments;
    }

    pub fn values(&self) -> &HashMap<String, String> {
        &self.values
    }

    pub fn set_value(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn value(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Parse-on-read boolean lookup: `"true"` is true, anything else false
    pub fn bool_value(&self, key: &str) -> bool {
        self.value(key)
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    }

    pub fn is_elevated(&self) -> bool {
        self.elevated
    }

    pub fn set_elevated(&mut self, elevated: bool) {
        self.elevated = elevated;
    }

    pub fn state(&self) -> OperationState {
        self.state
    }

    pub fn set_state(&mut self, state: OperationState) {
        self.state = state;
    }

    pub fn error(&self) -> Option<&OperationError> {
        self.error.as_ref()
    }

    pub fn clear_error(&mut self) {
        self.error = None;
    }

    /// Capture an error on the operation and return `false` for convenience
    pub fn fail(&mut self, kind: OperationErrorKind, message: impl Into<String>) -> bool {
        self.error = Some(OperationError {
            kind,
            message: message.into(),
        });
        false
    }

    /// Enforce the fixed positional argument count contract
    ///
    /// The message format is a stable, testable part of the contract.
    pub fn check_argument_count(&mut self, expected: usize) -> bool {
        let given = self.arguments.len();
        if given == expected {
            return true;
        }
        self.fail(
            OperationErrorKind::InvalidArguments,
            format!(
                "Invalid arguments: {} arguments given, {} expected.",
                given, expected
            ),
        )
    }
}

/// A single reversible unit of system change
///
/// Implementations must be deterministic given the same arguments and
/// backed-up state. `undo_operation` is safe to call at most once per
/// successful `perform_operation`.
pub trait Operation: Send {
    fn core(&self) -> &OperationCore;
    fn core_mut(&mut self) -> &mut OperationCore;

    /// Validate arguments and preconditions without side effects
    fn test_operation(&mut self) -> bool;

    /// Capture enough state to reverse the action; called before perform
    fn backup(&mut self);

    /// Apply the change; on failure the error is retrievable via `error()`
    fn perform_operation(&mut self) -> bool;

    /// Reverse a performed change
    fn undo_operation(&mut self) -> bool;

    /// Kind-specific backup/output state for the manifest and the elevated
    /// helper protocol. After a successful perform this includes any paths
    /// the operation wrote, so a later process can still undo it.
    fn backup_state(&self) -> serde_json::Value {
        serde_json::Value::Null
    }

    /// Restore state previously captured with `backup_state`
    fn restore_backup_state(&mut self, _state: serde_json::Value) {}

    fn kind(&self) -> &str {
        self.core().kind()
    }

    fn arguments(&self) -> &[String] {
        self.core().arguments()
    }

    fn is_elevated(&self) -> bool {
        self.core().is_elevated()
    }

    fn state(&self) -> OperationState {
        self.core().state()
    }

    fn error(&self) -> Option<&OperationError> {
        self.core().error()
    }
}

/// Serialized form of an operation, used for the installed-components
/// manifest and the elevated helper protocol
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordedOperation {
    pub kind: String,
    pub arguments: Vec<String>,
    #[serde(default)]
    pub values: HashMap<String, String>,
    #[serde(default)]
    pub elevated: bool,
    #[serde(default)]
    pub backup: serde_json::Value,
}

impl RecordedOperation {
    /// Snapshot an operation including its current backup state
    pub fn from_operation(op: &dyn Operation) -> Self {
        Self {
            kind: op.kind().to_string(),
            arguments: op.arguments().to_vec(),
            values: op.core().values().clone(),
            elevated: op.is_elevated(),
            backup: op.backup_state(),
        }
    }
}

/// Factory function for an operation kind
pub type OperationFactory = fn() -> Box<dyn Operation>;

/// Registry of pluggable operation kinds
///
/// `default()` registers the built-in kinds; embedders may add their own.
pub struct OperationRegistry {
    factories: HashMap<String, OperationFactory>,
}

impl Default for OperationRegistry {
    fn default() -> Self {
        let mut registry = Self {
            factories: HashMap::new(),
        };
        registry.register("Mkdir", || Box::new(MkdirOperation::new()));
        registry.register("Copy", || Box::new(CopyOperation::new()));
        registry.register("Extract", || Box::new(ExtractOperation::new()));
        registry.register("AppendFile", || Box::new(AppendFileOperation::new()));
        registry.register("Execute", || Box::new(ExecuteOperation::new()));
        registry
    }
}

impl OperationRegistry {
    pub fn register(&mut self, kind: impl Into<String>, factory: OperationFactory) {
        self.factories.insert(kind.into(), factory);
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    /// Create a fresh operation of the given kind with arguments
    pub fn create(&self, kind: &str, arguments: Vec<String>) -> Result<Box<dyn Operation>> {
        let factory = self
            .factories
            .get(kind)
            .ok_or_else(|| unknown_operation_kind(kind))?;
        let mut op = factory();
        op.core_mut().set_arguments(arguments);
        Ok(op)
    }

    /// Reconstruct an operation from its recorded form, including backup state
    pub fn restore(&self, recorded: &RecordedOperation) -> Result<Box<dyn Operation>> {
        let mut op = self.create(&recorded.kind, recorded.arguments.clone())?;
        for (key, value) in &recorded.values {
            op.core_mut().set_value(key.clone(), value.clone());
        }
        op.core_mut().set_elevated(recorded.elevated);
        if !recorded.backup.is_null() {
            op.restore_backup_state(recorded.backup.clone());
        }
        Ok(op)
    }
}
