//! `dbkit` command-line entry point.
//!
//! # Responsibility
//! - Parse arguments and dispatch `demo-publish` / `template-generate`.
//! - Map every outcome to exit code 0 (success) or 1 (failure).

mod cli;
mod demo;
mod output;
mod scaffold;

use clap::Parser;
use cli::Cli;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            // Help and version go to stdout and are not failures.
            return if err.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    if let Err(err) = dbkit_core::init_console_logging(&cli.log_level) {
        output::error(&err);
        return ExitCode::FAILURE;
    }
    log::debug!(
        "event=cli_start module=cli status=ok version={}",
        dbkit_core::core_version()
    );

    match cli::execute(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(_) => ExitCode::FAILURE,
    }
}
