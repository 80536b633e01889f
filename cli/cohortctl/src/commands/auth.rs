//! Login, logout and session status.

use anyhow::Result;
use clap::{Args, Subcommand};
use colored::Colorize;
use serde::Deserialize;

use crate::client::ApiClient;
use crate::config::Credentials;
use crate::output::{print_success, print_warning};

use super::CommandContext;

/// Manage the stored API token.
#[derive(Debug, Args)]
pub struct AuthCommand {
    #[command(subcommand)]
    command: AuthSubcommand,
}

#[derive(Debug, Subcommand)]
enum AuthSubcommand {
    /// Verify a token with the server and store it.
    Login {
        /// API token issued by the placement service.
        #[arg(long, env = "COHORT_TOKEN", hide_env_values = true)]
        token: String,
    },

    /// Forget the stored token.
    Logout,

    /// Show who the stored token belongs to.
    Status,
}

/// Identity returned by the server for a bearer token.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Identity {
    #[serde(alias = "_id", alias = "id")]
    subject_id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    expires_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl AuthCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        match self.command {
            AuthSubcommand::Login { token } => {
                let mut creds = Credentials::new(token);
                let identity: Identity = ApiClient::new(&ctx.config, Some(&creds))?
                    .get(&["v1", "auth", "whoami"])
                    .await?;
                creds.user_id = Some(identity.subject_id);
                creds.email = identity.email;
                creds.expires_at = identity.expires_at;
                creds.save()?;

                let who = creds.email.as_deref().or(creds.user_id.as_deref());
                print_success(&format!("Logged in as {}.", who.unwrap_or("unknown user")));
            }
            AuthSubcommand::Logout => {
                Credentials::delete()?;
                print_success("Stored token removed.");
            }
            AuthSubcommand::Status => print_status(&ctx),
        }
        Ok(())
    }
}

fn print_status(ctx: &CommandContext) {
    let Some(creds) = &ctx.credentials else {
        println!("{} no stored token", "Session:".red().bold());
        println!("Log in with {}.", "cohort auth login --token <TOKEN>".cyan());
        return;
    };

    println!("{} {}", "Session:".green().bold(), ctx.config.api_url());
    for (label, value) in [
        ("Email", creds.email.as_deref()),
        ("Subject", creds.user_id.as_deref()),
    ] {
        if let Some(value) = value {
            println!("  {label}: {value}");
        }
    }

    match creds.expires_at {
        Some(_) if creds.is_expired() => {
            print_warning("Token has expired. Run `cohort auth login` again.")
        }
        Some(at) => println!("  Expires: {}", at.to_rfc3339()),
        None => {}
    }
}
