// uart-loopback -- verify a UART loopback from the command line.
//
// Usage:
//   uart-loopback -o /dev/ttyAMA1 -i /dev/ttyAMA3 -s 32 -r
//   uart-loopback -o /dev/ttyS1 -i /dev/ttyS1 -s 64 -a -b -n -r
//   uart-loopback -s 1024 --read-timeout 2000 -v
//
// Exit status is 0 when every byte came back intact and 1 otherwise.

mod cli;

use std::io::{self, Write};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use uartloop::SessionReport;

use crate::cli::{Cli, parse_exit_code};

fn init_tracing(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .compact()
        .init();
}

/// Print the outcome the way `--results` and `--verbose` ask for.
fn print_results(cli: &Cli, report: &SessionReport) {
    if cli.verbose {
        let v = &report.verification;
        println!(
            "Transfers: {} written, {} skipped ({} bytes, {} write errors)",
            report.transfers, report.skipped, report.bytes_written, report.write_failures
        );
        println!(
            "Read {} of {} bytes, {} mismatched{}",
            v.bytes_read,
            v.expected_bytes,
            v.mismatches,
            if v.complete() { "" } else { " (incomplete)" }
        );
        if let Some(fault) = &v.first_fault {
            println!("First error: {fault}");
        }
    }

    if report.passed() {
        if cli.results {
            print!(".");
            let _ = io::stdout().flush();
        }
    } else if cli.results {
        eprintln!("Test Complete with Errors");
    }
}

async fn run(cli: &Cli) -> Result<bool> {
    if cli.verbose {
        println!(
            "output_device: {}\ninput_device: {}\ntransfer_size: {}",
            cli.output, cli.input, cli.size
        );
    }

    let cancel = CancellationToken::new();
    let session = cli
        .builder()
        .cancellation_token(cancel.clone())
        .build()
        .context("invalid loopback configuration")?;

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping loopback session");
            cancel.cancel();
        }
    });

    let report = session.run().await.context("loopback session aborted")?;
    print_results(cli, &report);
    Ok(report.passed())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return ExitCode::from(parse_exit_code(e.kind()));
        }
    };

    init_tracing(cli.log_filter());

    match run(&cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
