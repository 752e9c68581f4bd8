//! Instack - transactional component installer engine
//!
//! Given a catalog of installable components with inter-dependencies,
//! instack computes what must change on a target directory, fetches the
//! required archives from remote repositories (concurrently, cancelably),
//! and applies the change as a sequence of reversible operations. Elevated
//! operations run in a separate privileged helper process; the first
//! failure rolls the batch back in reverse order.
//!
//! The three core subsystems:
//!
//! - [`component`]: the component graph and tri-state selection resolver
//! - [`operation`] + [`orchestrator`]: reversible operations and their
//!   transactional execution, with [`elevation`] for privileged kinds
//! - [`download`]: the concurrent download-task subsystem

pub mod catalog;
pub mod cli;
pub mod component;
pub mod download;
pub mod elevation;
pub mod error;
pub mod hash;
pub mod manifest;
pub mod operation;
pub mod orchestrator;
pub mod progress;
pub mod settings;
pub mod sysinfo;

pub use component::{CheckState, Component, ComponentGraph, Resolver};
pub use error::{InstackError, Result};
pub use orchestrator::{Orchestrator, RunOutcome};
pub use settings::Settings;
