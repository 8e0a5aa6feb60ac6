//! Entry point: parse the command line and dispatch.
//!
//! - `-h` / `-V` print help or version
//! - `-k <verb>` controls a running instance and exits with the verb's status
//! - anything else starts the daemon, detached unless `-f` is given
//!
//! Argument errors print the usage to standard error and exit with status 1.

use weatherboard::args::{self, CliAction};
use weatherboard::common::constants::{EXIT_FAILURE, EXIT_SUCCESS};
use weatherboard::io::instance::DaemonIdentity;
use weatherboard::logger::Log;
use weatherboard::{commands, daemon, log_end, log_error, log_error_exit};

fn main() {
    let argv: Vec<String> = std::env::args().collect();

    let code = match args::parse(&argv) {
        Ok(CliAction::ShowHelp) => {
            args::display_help();
            EXIT_SUCCESS
        }
        Ok(CliAction::ShowVersion) => {
            args::display_version_info();
            EXIT_SUCCESS
        }
        Ok(CliAction::Control {
            verb,
            ident,
            verbosity,
        }) => {
            Log::set_verbosity(verbosity);
            let result = DaemonIdentity::resolve(&ident)
                .and_then(|identity| commands::dispatch(verb, &identity));
            finish(result)
        }
        Ok(CliAction::Run(run)) => finish(daemon::launch(run, &argv)),
        Err(e) => {
            log_error!("{e}");
            args::display_help();
            EXIT_FAILURE
        }
    };

    std::process::exit(code);
}

fn finish(result: anyhow::Result<i32>) -> i32 {
    match result {
        Ok(code) => code,
        Err(e) => {
            log_error_exit!("{e:#}");
            log_end!();
            EXIT_FAILURE
        }
    }
}
