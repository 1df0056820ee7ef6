use ncclfetch_core::logging;
use ncclfetch_core::AcquireError;

mod cli;

use crate::cli::CliCommand;

fn main() {
    // Initialize logging as early as possible; stdout stays reserved for results.
    if logging::init_logging().is_err() {
        logging::init_logging_stderr();
    }

    // Parse CLI and dispatch.
    if let Err(err) = CliCommand::run_from_args() {
        let (phase, code) = match err.downcast_ref::<AcquireError>() {
            Some(e) => (e.phase(), e.exit_code()),
            None => ("setup", 1),
        };
        tracing::error!(phase, "{:#}", err);
        eprintln!("ncclfetch error [{}]: {:#}", phase, err);
        std::process::exit(code);
    }
}
