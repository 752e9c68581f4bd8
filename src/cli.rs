//! CLI definitions using clap derive API

use clap::builder::{Styles, styling::AnsiColor};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Instack - transactional component installer
///
/// Installs, updates and removes components described by a catalog, with
/// reversible operations and automatic rollback on failure.
#[derive(Parser, Debug)]
#[command(
    name = "instack",
    author,
    version,
    color = clap::ColorChoice::Always,
    styles = Styles::styled()
        .header(AnsiColor::Green.on_default().bold())
        .usage(AnsiColor::Green.on_default().bold())
        .literal(AnsiColor::Cyan.on_default().bold())
        .placeholder(AnsiColor::Cyan.on_default()),
    about = "Transactional component installer engine",
    long_about = "Instack computes what must change on a target directory from a component \
                  catalog, fetches the required archives from remote repositories, and applies \
                  the change as a sequence of reversible operations. If any step fails, the \
                  already-performed operations are undone in reverse order.",
    after_help = "\x1b[1m\x1b[32mExamples:\x1b[0m\n    \
                  instack install app.core app.docs\n    \
                  instack uninstall app.docs\n    \
                  instack status\n"
)]
pub struct Cli {
    /// Settings file (YAML); overrides --target
    #[arg(long, short = 's', global = true)]
    pub settings: Option<PathBuf>,

    /// Component catalog file (YAML)
    #[arg(long, short = 'c', global = true, default_value = "catalog.yaml")]
    pub catalog: PathBuf,

    /// Installation target directory
    #[arg(long, short = 't', global = true)]
    pub target: Option<PathBuf>,

    /// Enable verbose output
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Install components and their dependencies
    Install(InstallArgs),

    /// Remove installed components
    Uninstall(UninstallArgs),

    /// Show component and selection status
    Status,
}

/// Arguments for the install command
#[derive(Parser, Debug)]
#[command(after_help = "EXAMPLES:\n  \
                  Install one component:\n    instack install app.core\n\n\
                  Install several components:\n    instack install app.core app.docs\n\n\
                  Stop processes that block the update:\n    instack install app.core --stop-processes")]
pub struct InstallArgs {
    /// Component names to install
    #[arg(required = true)]
    pub components: Vec<String>,

    /// Stop processes named by stop-process-for-update requests instead of
    /// failing
    #[arg(long)]
    pub stop_processes: bool,
}

/// Arguments for the uninstall command
#[derive(Parser, Debug)]
pub struct UninstallArgs {
    /// Component names to uninstall
    #[arg(required = true)]
    pub components: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_install() {
        let cli = Cli::try_parse_from(["instack", "install", "app.core", "app.docs"]).unwrap();
        match cli.command {
            Commands::Install(args) => {
                assert_eq!(args.components, ["app.core", "app.docs"]);
                assert!(!args.stop_processes);
            }
            other => panic!("expected install, got {other:?}"),
        }
    }

    #[test]
    fn test_cli_requires_component_names() {
        assert!(Cli::try_parse_from(["instack", "install"]).is_err());
    }

    #[test]
    fn test_cli_global_target() {
        let cli =
            Cli::try_parse_from(["instack", "status", "--target", "/opt/app"]).unwrap();
        assert_eq!(cli.target.as_deref(), Some(std::path::Path::new("/opt/app")));
    }
}
