mod cli;
mod commands;
mod error;

use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tracing::{Level, error};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use crate::cli::{Args, Commands};
use crate::commands::{CommandExecutor, DownloadArgs};

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            error!("Application error: {e:#}");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> anyhow::Result<ExitCode> {
    let executor = CommandExecutor::new(args.proxy, args.user_agent);

    match args.command {
        Commands::Resolve {
            reference,
            site,
            timeout,
        } => {
            executor
                .resolve(&reference, &site, Duration::from_secs(timeout))
                .await
        }
        Commands::Download {
            source,
            output,
            site,
            concurrency,
            retries,
            timeout,
            headers,
            resumable,
            quality,
            offload_decryption,
        } => {
            executor
                .download(DownloadArgs {
                    source,
                    output,
                    site,
                    concurrency,
                    retries,
                    timeout,
                    headers,
                    resumable,
                    quality,
                    offload_decryption,
                })
                .await
        }
    }
}

/// Logs go to stderr; stdout carries the JSON report.
fn init_logging(verbose: bool, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_level(verbose)
                .with_writer(std::io::stderr),
        )
        .init();
}
