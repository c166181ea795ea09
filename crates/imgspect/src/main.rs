//! imgspect CLI - Inspect container images in a registry
//!
//! This is the main entry point for the imgspect command-line interface.
//! Inspection output goes to stdout; logs and errors go to stderr.

mod cli;
mod commands;

use clap::Parser;
use imgspect_image::InspectError;
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::Cli;

/// Exit code for failures outside the inspection error taxonomy
const GENERIC_FAILURE: u8 = 1;

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize rustls crypto provider (required for rustls 0.23+)
    // This must be done before any TLS operations
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    // Parse CLI args
    let cli = Cli::parse();

    // Initialize tracing
    init_tracing(cli.verbose, cli.quiet);

    match commands::inspect::run(cli.inspect, cli.config.as_deref()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let inspect_error = err.downcast_ref::<InspectError>();
            let kind = inspect_error.map_or("RuntimeError", InspectError::kind);
            error!(kind, "{:#}", err);
            ExitCode::from(inspect_error.map_or(GENERIC_FAILURE, InspectError::exit_code))
        }
    }
}

/// Initialize tracing with appropriate verbosity
fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            // Only warnings by default so stderr stays quiet on success
            0 => EnvFilter::new("warn"),
            1 => EnvFilter::new("info"),
            2 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}
