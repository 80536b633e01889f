//! cohortctl (cohort) - CLI for the cohort placement engine
//!
//! Lists candidates and resources, runs batch assignments and shows
//! assignment history against a placement API.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod backend;
mod client;
mod commands;
mod config;
mod error;
mod output;

use commands::Cli;

/// Default filter when neither `RUST_LOG` nor `COHORT_LOG_LEVEL` is set.
const DEFAULT_LOG_LEVEL: &str = "warn";

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.log_json());

    if let Err(e) = cli.run().await {
        error::print_error(&e);
        std::process::exit(1);
    }

    Ok(())
}

/// Logs go to stderr so stdout stays clean for table/JSON output.
fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(
            std::env::var("COHORT_LOG_LEVEL").unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string()),
        )
    });

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}
