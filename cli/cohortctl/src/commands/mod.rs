//! CLI commands.

mod assign;
mod auth;
mod candidates;
mod history;
mod resources;

use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::backend::HttpBackend;
use crate::client::ApiClient;
use crate::config::{Config, Credentials};
use crate::error::CliError;
use crate::output::OutputFormat;

/// cohort - Assign candidates to schemes, stations, inductions and interview panels.
#[derive(Debug, Parser)]
#[command(name = "cohort")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Output format (table or json).
    #[arg(long, global = true, default_value = "table")]
    format: String,

    /// Placement API endpoint.
    #[arg(long, global = true, env = "COHORT_API_URL")]
    api_url: Option<String>,

    /// Use the server's batch assignment endpoint.
    #[arg(long, global = true)]
    batch_endpoint: bool,

    /// Emit logs as JSON on stderr.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Authenticate with the placement API.
    Auth(auth::AuthCommand),

    /// List candidates and their eligibility.
    Candidates(candidates::CandidatesCommand),

    /// List resources and remaining capacity.
    Resources(resources::ResourcesCommand),

    /// Assign one or more candidates to a resource.
    Assign(assign::AssignCommand),

    /// Show a candidate's assignment history.
    History(history::HistoryCommand),

    /// Show CLI version.
    Version,
}

impl Cli {
    pub fn log_json(&self) -> bool {
        self.log_json
    }

    /// Run the CLI command.
    pub async fn run(self) -> Result<()> {
        let mut config = Config::load()?;
        if let Some(api_url) = self.api_url {
            config.api_url = api_url;
        }
        if self.batch_endpoint {
            config.batch_endpoint = true;
        }

        let ctx = CommandContext {
            config,
            credentials: Credentials::load()?,
            format: OutputFormat::parse(&self.format),
        };

        match self.command {
            Commands::Auth(cmd) => cmd.run(ctx).await,
            Commands::Candidates(cmd) => cmd.run(ctx).await,
            Commands::Resources(cmd) => cmd.run(ctx).await,
            Commands::Assign(cmd) => cmd.run(ctx).await,
            Commands::History(cmd) => cmd.run(ctx).await,
            Commands::Version => {
                println!("cohort {}", env!("CARGO_PKG_VERSION"));
                Ok(())
            }
        }
    }
}

/// Shared command context.
pub struct CommandContext {
    pub config: Config,
    pub credentials: Option<Credentials>,
    pub format: OutputFormat,
}

impl CommandContext {
    pub fn client(&self) -> Result<ApiClient> {
        ApiClient::new(&self.config, self.credentials.as_ref())
    }

    /// HTTP backend for engine operations; requires a login.
    pub fn backend(&self) -> Result<Arc<HttpBackend>> {
        if self.credentials.is_none() {
            return Err(CliError::NotAuthenticated.into());
        }
        Ok(Arc::new(HttpBackend::new(
            self.client()?,
            self.config.batch_endpoint,
        )))
    }
}
