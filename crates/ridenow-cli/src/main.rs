//! RideNow CLI - rent scooters from the terminal.
//!
//! Thin front end over `ridenow-core`: every command restores the stored
//! session, runs one or two API calls through a `RequestSlot`, and prints
//! the result.

mod args;
mod commands;

use std::io;

use anyhow::Result;
use tracing::{debug, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use args::Args;

/// Directory for the optional daily log file
const ENV_LOG_DIR: &str = "RIDENOW_LOG_DIR";

const USAGE: &str = "\
Usage: ridenow <command> [args]

Account:
  login [email]                       Log in (prompts for the password)
  logout                              Forget the stored session
  register <email>                    Create an account
  verify-otp <email> <otp>            Confirm the emailed one-time password
  whoami                              Show the logged-in user
  profile [--name N] [--phone P] [--dob YYYY-MM-DD] [--photo FILE]
  documents                           Show identity document status
  documents files                     Show submitted document files
  documents upload <aadhar|dl> <pdf>  Submit a document for verification

Rentals:
  search <city> <pickup> <drop>       Find available vehicles
  vehicle <id>                        Show vehicle details
  price <id> <pickup> <drop>          Estimate the rental price
  book <id> <pickup> <drop>           Book a vehicle
  bookings                            List your bookings
  end-booking <id>                    End an active booking

Settings:
  config [--api-url URL] [--timeout SECS]

Times are YYYY-MM-DD HH:MM (quote them) or RFC 3339.";

/// Initialize the tracing subscriber for logging.
/// The returned guard must live until exit so the file log is flushed.
fn init_tracing() -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=ridenow_core=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match std::env::var(ENV_LOG_DIR) {
        Ok(dir) if !dir.trim().is_empty() => {
            let appender = tracing_appender::rolling::daily(dir, "ridenow.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        _ => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();
    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();
    let _guard = init_tracing();

    let mut args = Args::from_env();
    let Some(command) = args.next_positional() else {
        println!("{}", USAGE);
        return Ok(());
    };
    if command == "help" || command == "--help" || command == "-h" {
        println!("{}", USAGE);
        return Ok(());
    }

    info!(command = %command, "RideNow CLI starting");
    let result = commands::run(&command, args).await;
    if let Err(ref e) = result {
        debug!(error = ?e, "Command failed");
    }
    result
}
