//! Error types and handling for instack
//!
//! Uses `thiserror` for error definitions and `miette` for pretty diagnostics.
//!
//! This module is organized into sub-modules by error domain:
//! - [`component`]: Component graph and selection errors
//! - [`operation`]: Operation planning errors
//! - [`download`]: Download task errors
//! - [`elevation`]: Elevated execution channel errors
//! - [`config`]: Catalog and settings errors
//! - [`fs`]: File system errors
//!
//! Failures inside a running operation are deliberately *not* represented
//! here: they are captured as an `(OperationErrorKind, message)` pair on the
//! operation itself and drive the orchestrator into rollback. Only errors
//! that cross the engine boundary become an [`InstackError`].

pub mod component;
pub mod config;
pub mod download;
pub mod elevation;
pub mod fs;
pub mod operation;

#[allow(unused_imports)]
pub use component::{
    circular as circular_dependency, not_found as component_not_found,
    not_selectable as component_not_selectable, unresolved as unresolved_dependency,
};
#[allow(unused_imports)]
pub use config::{
    invalid as config_invalid, not_found as config_not_found, parse_failed as config_parse_failed,
};
#[allow(unused_imports)]
pub use download::{
    authentication_required, content_mismatch, failed as download_failed,
    timed_out as download_timed_out,
};
#[allow(unused_imports)]
pub use elevation::{denied as elevation_denied, unavailable as elevation_unavailable};
#[allow(unused_imports)]
pub use fs::{
    io_error, not_found as file_not_found, read_failed as file_read_failed,
    write_failed as file_write_failed,
};
#[allow(unused_imports)]
pub use operation::{process_running, unknown_kind as unknown_operation_kind};

use miette::Diagnostic;
use thiserror::Error;

/// Whether an authentication challenge came from a proxy or the server itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeOrigin {
    Proxy,
    Server,
}

impl std::fmt::Display for ChallengeOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChallengeOrigin::Proxy => write!(f, "proxy"),
            ChallengeOrigin::Server => write!(f, "server"),
        }
    }
}

/// Main error type for instack operations
#[derive(Error, Diagnostic, Debug)]
pub enum InstackError {
    // Component errors
    #[error("Component '{name}' not found")]
    #[diagnostic(
        code(instack::component::not_found),
        help("Check that the component name matches the catalog")
    )]
    ComponentNotFound { name: String },

    #[error("Component '{name}' cannot be selected directly")]
    #[diagnostic(
        code(instack::component::not_selectable),
        help("Virtual and disabled components follow their dependees; select a dependee instead")
    )]
    ComponentNotSelectable { name: String },

    #[error("Unresolved dependency '{dependency}' required by component '{component}'")]
    #[diagnostic(
        code(instack::component::unresolved_dependency),
        help("The dependency is missing from the catalog or disabled; '{component}' cannot be selected")
    )]
    UnresolvedDependency { component: String, dependency: String },

    #[error("Circular dependency detected: {chain}")]
    #[diagnostic(
        code(instack::component::circular),
        help("Remove the dependency cycle from the component catalog")
    )]
    CircularDependency { chain: String },

    // Operation errors
    #[error("Unknown operation kind '{kind}'")]
    #[diagnostic(
        code(instack::operation::unknown_kind),
        help("Register the operation kind before planning, or fix the catalog")
    )]
    UnknownOperationKind { kind: String },

    #[error("Process '{name}' must be stopped before installation can continue")]
    #[diagnostic(
        code(instack::operation::process_running),
        help("Close the named process, or allow instack to stop it")
    )]
    ProcessStillRunning { name: String },

    // Download errors
    #[error("Download failed for '{url}': {reason}")]
    #[diagnostic(code(instack::download::failed))]
    DownloadError { url: String, reason: String },

    #[error("Authentication required by {origin} for '{url}'")]
    #[diagnostic(
        code(instack::download::authentication_required),
        help("Supply credentials for the repository and retry")
    )]
    AuthenticationRequired { origin: ChallengeOrigin, url: String },

    #[error("Download of '{url}' timed out")]
    #[diagnostic(code(instack::download::timed_out))]
    Timeout { url: String },

    #[error("Content verification failed for '{path}': {reason}")]
    #[diagnostic(
        code(instack::download::content_mismatch),
        help("The archive differs from its catalog metadata; the repository may be stale")
    )]
    ContentMismatch { path: String, reason: String },

    // Elevation errors
    #[error("Elevated execution was denied")]
    #[diagnostic(
        code(instack::elevation::denied),
        help("The privilege prompt was rejected; rerun and accept it")
    )]
    ElevationDenied,

    #[error("Elevated execution channel could not be established: {reason}")]
    #[diagnostic(
        code(instack::elevation::unavailable),
        help("Check that the instack-helper binary is installed and runnable")
    )]
    ElevationUnavailable { reason: String },

    #[error("Elevated helper protocol error: {reason}")]
    #[diagnostic(code(instack::elevation::protocol))]
    ElevationProtocol { reason: String },

    // Cancellation
    #[error("Operation was canceled")]
    #[diagnostic(code(instack::canceled))]
    Canceled,

    // Configuration errors
    #[error("Configuration file not found: {path}")]
    #[diagnostic(code(instack::config::not_found))]
    ConfigNotFound { path: String },

    #[error("Failed to parse configuration file: {path}")]
    #[diagnostic(code(instack::config::parse_failed))]
    ConfigParseFailed { path: String, reason: String },

    #[error("Invalid configuration: {message}")]
    #[diagnostic(code(instack::config::invalid))]
    ConfigInvalid { message: String },

    // File system errors
    #[error("File not found: {path}")]
    #[diagnostic(code(instack::fs::not_found))]
    FileNotFound { path: String },

    #[error("Failed to read file: {path}")]
    #[diagnostic(code(instack::fs::read_failed))]
    FileReadFailed { path: String, reason: String },

    #[error("Failed to write file: {path}")]
    #[diagnostic(code(instack::fs::write_failed))]
    FileWriteFailed { path: String, reason: String },

    #[error("IO error: {message}")]
    #[diagnostic(code(instack::fs::io_error))]
    IoError { message: String },
}

impl From<std::io::Error> for InstackError {
    fn from(err: std::io::Error) -> Self {
        InstackError::IoError {
            message: err.to_string(),
        }
    }
}

impl From<serde_yaml::Error> for InstackError {
    fn from(err: serde_yaml::Error) -> Self {
        InstackError::ConfigParseFailed {
            path: "unknown".to_string(),
            reason: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for InstackError {
    fn from(err: serde_json::Error) -> Self {
        InstackError::ConfigParseFailed {
            path: "unknown".to_string(),
            reason: err.to_string(),
        }
    }
}

/// Result type alias using miette for error handling
pub type Result<T> = miette::Result<T, InstackError>;
