//! Elevated execution channel errors

use super::InstackError;

/// Creates an elevation-denied error
pub fn denied() -> InstackError {
    InstackError::ElevationDenied
}

/// Creates an elevation-unavailable error
pub fn unavailable(reason: impl Into<String>) -> InstackError {
    InstackError::ElevationUnavailable {
        reason: reason.into(),
    }
}

/// Creates a helper protocol error
pub fn protocol(reason: impl Into<String>) -> InstackError {
    InstackError::ElevationProtocol {
        reason: reason.into(),
    }
}
