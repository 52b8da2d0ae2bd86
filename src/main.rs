//! Main entry point for the attrsnap CLI app

use std::process::ExitCode;

fn main() -> ExitCode {
    match attrsnap::cli_runner::run_cli_app() {
        Ok(()) => ExitCode::from(attrsnap::error::SUCCESS),
        Err(attrsnap::AttrError::Interrupted) => {
            eprintln!("Shutdown requested...");
            ExitCode::from(attrsnap::error::USER_INTERRUPTED)
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(e.exit_code())
        }
    }
}
