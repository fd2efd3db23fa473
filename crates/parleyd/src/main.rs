//! Entry point for the Parley chat relay daemon.

use std::io::{self, Write};
use std::process::ExitCode;

fn main() -> ExitCode {
    match parleyd::run_server(&parleyd::SystemConfigLoader) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            let mut stderr = io::stderr().lock();
            writeln!(stderr, "parleyd: {error}").ok();
            ExitCode::FAILURE
        }
    }
}
