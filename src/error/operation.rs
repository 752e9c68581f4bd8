//! Operation planning errors
//!
//! Runtime failures of an operation never surface here; see
//! `operation::OperationErrorKind` for the in-operation error contract.

use super::InstackError;

/// Creates an unknown-operation-kind error
pub fn unknown_kind(kind: impl Into<String>) -> InstackError {
    InstackError::UnknownOperationKind { kind: kind.into() }
}

/// Creates a process-still-running error
pub fn process_running(name: impl Into<String>) -> InstackError {
    InstackError::ProcessStillRunning { name: name.into() }
}
