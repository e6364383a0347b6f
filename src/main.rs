//! pcc-server: printable character counting server.
//!
//! Usage: `pcc-server <PORT>` (see `--help` for the rest).
//!
//! Serves clients until SIGINT/SIGTERM, then prints the per-character
//! totals and the number of served clients to standard output.

use pcc::config::Config;
use pcc::runtime::{self, Server};
use std::io;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    // Load configuration
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    // Initialize logging. Standard output is reserved for the report.
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    info!(listen = %config.listen, "Starting pcc server");

    match run(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Server failed");
            ExitCode::FAILURE
        }
    }
}

fn run(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let mut server = Server::bind(config)?;
    runtime::install_signal_handler(server.shutdown_handle())
        .map_err(runtime::StartupError::from)?;

    server.run()?;

    let stdout = io::stdout();
    server.aggregator().write_report(&mut stdout.lock())?;
    Ok(())
}
