//! devbackup CLI entry point
//!
//! main.rs only parses arguments, dispatches to the CLI command layer
//! and exits with the resulting stable exit code. It never calls
//! subsystems directly.

use std::process;

use devbackup::cli::{run, Cli};

fn main() {
    let cli = Cli::parse_args();
    process::exit(run(cli));
}
