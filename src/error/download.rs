//! Download task errors

use super::{ChallengeOrigin, InstackError};

/// Creates a terminal download error
pub fn failed(url: impl Into<String>, reason: impl Into<String>) -> InstackError {
    InstackError::DownloadError {
        url: url.into(),
        reason: reason.into(),
    }
}

/// Creates an authentication-required error carrying the challenge origin
pub fn authentication_required(origin: ChallengeOrigin, url: impl Into<String>) -> InstackError {
    InstackError::AuthenticationRequired {
        origin,
        url: url.into(),
    }
}

/// Creates a download timeout error
pub fn timed_out(url: impl Into<String>) -> InstackError {
    InstackError::Timeout { url: url.into() }
}

/// Creates a content verification error
pub fn content_mismatch(path: impl Into<String>, reason: impl Into<String>) -> InstackError {
    InstackError::ContentMismatch {
        path: path.into(),
        reason: reason.into(),
    }
}
