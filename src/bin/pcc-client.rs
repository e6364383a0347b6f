//! pcc-client: send a file to a pcc server and print the printable count.
//!
//! Usage: `pcc-client <IP> <PORT> <PATH>`

use clap::Parser;
use pcc::client;
use std::fs::File;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Command-line arguments for the counting client
#[derive(Parser, Debug)]
#[command(name = "pcc-client")]
#[command(version)]
#[command(about = "Sends a file to a pcc server and prints its printable character count", long_about = None)]
struct Args {
    /// Server IP address
    ip: IpAddr,

    /// Server port
    port: u16,

    /// File whose contents are sent
    path: PathBuf,
}

fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => match e.kind() {
            clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => {
                e.exit()
            }
            _ => {
                let _ = e.print();
                return ExitCode::FAILURE;
            }
        },
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match run(&args) {
        Ok(count) => {
            println!("# of printable characters: {count}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("pcc-client: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<u32, Box<dyn std::error::Error>> {
    let mut file = File::open(&args.path)
        .map_err(|e| format!("cannot open {}: {e}", args.path.display()))?;
    let len = file.metadata()?.len();
    let addr = SocketAddr::new(args.ip, args.port);
    Ok(client::submit_reader(addr, &mut file, len)?)
}
