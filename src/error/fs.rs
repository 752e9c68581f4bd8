//! File system errors

use super::InstackError;

/// Creates a file-not-found error
pub fn not_found(path: impl Into<String>) -> InstackError {
    InstackError::FileNotFound { path: path.into() }
}

/// Creates a file read error
pub fn read_failed(path: impl Into<String>, reason: impl Into<String>) -> InstackError {
    InstackError::FileReadFailed {
        path: path.into(),
        reason: reason.into(),
    }
}

/// Creates a file write error
pub fn write_failed(path: impl Into<String>, reason: impl Into<String>) -> InstackError {
    InstackError::FileWriteFailed {
        path: path.into(),
        reason: reason.into(),
    }
}

/// Creates an IO error
pub fn io_error(message: impl Into<String>) -> InstackError {
    InstackError::IoError {
        message: message.into(),
    }
}
