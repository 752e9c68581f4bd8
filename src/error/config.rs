//! Catalog and settings errors

use super::InstackError;

/// Creates a configuration-not-found error
pub fn not_found(path: impl Into<String>) -> InstackError {
    InstackError::ConfigNotFound { path: path.into() }
}

/// Creates a configuration parse error
pub fn parse_failed(path: impl Into<String>, reason: impl Into<String>) -> InstackError {
    InstackError::ConfigParseFailed {
        path: path.into(),
        reason: reason.into(),
    }
}

/// Creates an invalid-configuration error
pub fn invalid(message: impl Into<String>) -> InstackError {
    InstackError::ConfigInvalid {
        message: message.into(),
    }
}
