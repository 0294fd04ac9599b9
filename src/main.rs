//! ase - Command-line tool for inspecting and converting .aseprite files

use std::process::ExitCode;

use asefmt::cli;

fn main() -> ExitCode {
    cli::run()
}
