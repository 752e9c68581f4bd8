//! Privileged helper binary for the elevated execution channel
//!
//! Spawned (typically via sudo or a platform equivalent) by the main
//! installer process; speaks the JSON-lines protocol on stdio until EOF.

use instack::elevation::helper;
use instack::operation::OperationRegistry;

fn main() {
    let registry = OperationRegistry::default();
    let stdin = std::io::stdin();
    let stdout = std::io::stdout();

    if let Err(e) = helper::serve(&registry, stdin.lock(), stdout.lock()) {
        eprintln!("instack-helper: {}", e);
        std::process::exit(1);
    }
}
