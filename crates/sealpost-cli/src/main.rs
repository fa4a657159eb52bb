//! Sealpost binary.
//!
//! Exit status: 0 success, 1 other failure, 2 handshake incomplete,
//! 3 corrupt state, 4 persistence failure (session discarded),
//! 5 output failure.

use std::{io::Write, process::ExitCode};

use clap::Parser;
use sealpost_cli::Cli;
use sealpost_core::EXIT_FAILURE;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // Usage errors must not collide with the handshake-incomplete status
            let _ = e.print();
            return if e.use_stderr() { ExitCode::from(EXIT_FAILURE) } else { ExitCode::SUCCESS };
        },
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::registry().with(fmt::layer().with_writer(std::io::stderr)).with(filter).init();

    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    let mut input = stdin.lock();
    let mut output = stdout.lock();

    let result = sealpost_cli::run(&cli, &mut input, &mut output);
    let _ = output.flush();

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::from(e.exit_code())
        },
    }
}
