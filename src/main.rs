//! Entry point for the `rackshare` CLI. Parses arguments, dispatches to the
//! command handler and maps errors to exit codes.

use rackshare::cli::Cli;
use rackshare::{commands, logging};
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse_args();
    logging::init(cli.verbose);

    match commands::dispatch(cli) {
        Ok(code) => ExitCode::from(code as u8),
        Err(err) => {
            eprintln!("Error: {}", err);
            ExitCode::from(err.exit_code() as u8)
        }
    }
}

