//! Instack - transactional component installer
//!
//! CLI entry point: loads the settings and catalog, applies the requested
//! selection changes, and hands the resolved graph to the orchestrator.

use clap::Parser;
use console::Style;

use instack::catalog::Catalog;
use instack::cli::{Cli, Commands};
use instack::component::{CheckState, ComponentGraph, Resolver};
use instack::manifest::{FileManifest, ManifestStore};
use instack::orchestrator::{FailureReport, Orchestrator, RunOutcome};
use instack::settings::Settings;
use instack::Result;

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let default_filter = if verbose { "instack=debug" } else { "instack=warn" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_settings(cli: &Cli) -> Result<Settings> {
    if let Some(path) = &cli.settings {
        return Settings::load(path);
    }
    let target = cli
        .target
        .clone()
        .unwrap_or_else(|| std::path::PathBuf::from("."));
    Ok(Settings::new(target))
}

fn load_graph(cli: &Cli, settings: &Settings) -> Result<ComponentGraph> {
    let manifest = FileManifest::for_target(&settings.target_dir);
    let snapshot = manifest.load()?;
    let catalog = Catalog::load(&cli.catalog)?;
    let mut graph = catalog.into_graph(&snapshot)?;
    Resolver::initialize(&mut graph)?;
    Ok(graph)
}

fn print_report(report: &FailureReport) {
    if let Some((operation, error)) = &report.failed_operation {
        eprintln!(
            "{} {}: {}",
            Style::new().bold().red().apply_to("Failed operation:"),
            operation,
            error.message
        );
    }
    for operation in &report.undone {
        eprintln!("  {} {}", Style::new().green().apply_to("undone"), operation);
    }
    for (operation, error) in &report.undo_failures {
        eprintln!(
            "  {} {}: {}",
            Style::new().bold().red().apply_to("NOT undone"),
            operation,
            error.message
        );
    }
}

fn report_outcome(outcome: &RunOutcome) -> i32 {
    match outcome {
        RunOutcome::Success => {
            println!("{}", Style::new().bold().green().apply_to("Done."));
            0
        }
        RunOutcome::FailedRolledBack(report) => {
            print_report(report);
            eprintln!(
                "{}",
                Style::new()
                    .bold()
                    .apply_to("The change was rolled back; nothing was left behind.")
            );
            1
        }
        RunOutcome::FailedRollbackIncomplete(report) => {
            print_report(report);
            eprintln!(
                "{}",
                Style::new().bold().red().apply_to(
                    "Rollback incomplete: the operations marked above require manual cleanup."
                )
            );
            2
        }
        RunOutcome::Canceled => {
            eprintln!("{}", Style::new().bold().apply_to("Canceled."));
            130
        }
        RunOutcome::ElevationDenied => {
            eprintln!(
                "{}",
                Style::new()
                    .bold()
                    .red()
                    .apply_to("Elevated execution was denied; the change was rolled back.")
            );
            3
        }
    }
}

fn print_status(graph: &ComponentGraph) {
    for id in graph.ids() {
        let component = graph.get(id);
        let state = match component.check_state() {
            CheckState::Checked => "[x]",
            CheckState::PartiallyChecked => "[~]",
            CheckState::Unchecked => "[ ]",
        };
        let mut notes = Vec::new();
        if component.is_installed() {
            notes.push("installed");
        }
        if component.is_virtual() {
            notes.push("virtual");
        }
        if !component.is_enabled() {
            notes.push("disabled");
        }
        let notes = if notes.is_empty() {
            String::new()
        } else {
            format!(" ({})", notes.join(", "))
        };
        println!(
            "{} {} {}{}",
            state,
            Style::new().bold().yellow().apply_to(component.name()),
            component.version(),
            notes
        );
    }
}

fn run(cli: Cli) -> Result<i32> {
    let settings = load_settings(&cli)?;
    let mut graph = load_graph(&cli, &settings)?;

    match cli.command {
        Commands::Install(args) => {
            for name in &args.components {
                Resolver::set_checked(&mut graph, name, true)?;
            }
            let mut orchestrator = Orchestrator::new(settings)?;
            orchestrator.stop_blocking_processes = args.stop_processes;
            let outcome = orchestrator.run(&mut graph)?;
            Ok(report_outcome(&outcome))
        }
        Commands::Uninstall(args) => {
            for name in &args.components {
                Resolver::set_checked(&mut graph, name, false)?;
            }
            let mut orchestrator = Orchestrator::new(settings)?;
            let outcome = orchestrator.run(&mut graph)?;
            Ok(report_outcome(&outcome))
        }
        Commands::Status => {
            print_status(&graph);
            Ok(0)
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
