//! Error handling and display for the CLI.

use colored::Colorize;
use thiserror::Error;

/// CLI-specific errors.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("No stored token. Run `cohort auth login` first.")]
    NotAuthenticated,

    #[error("API error ({status}): {message}")]
    Api {
        status: u16,
        code: Option<String>,
        message: String,
        request_id: Option<String>,
    },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    /// A batch finished with at least one failed candidate.
    #[error("{summary}")]
    Incomplete {
        summary: String,
        reauthenticate: bool,
    },

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl CliError {
    pub fn api(
        status: u16,
        code: Option<String>,
        message: impl Into<String>,
        request_id: Option<String>,
    ) -> Self {
        Self::Api {
            status,
            code,
            message: message.into(),
            request_id,
        }
    }

    /// What the user can do about this error, if anything.
    fn hint(&self) -> Option<String> {
        let hint = match self {
            Self::NotAuthenticated | Self::Api { status: 401, .. } => {
                "Run `cohort auth login --token <TOKEN>`."
            }
            Self::Incomplete {
                reauthenticate: true,
                ..
            } => "The session expired mid-batch. Log in again, then retry the failed candidates.",
            Self::Incomplete { .. } => {
                "Check `cohort resources list` before retrying the failed candidates."
            }
            Self::Api { status: 403, .. } => "This token lacks permission for the operation.",
            Self::Api {
                request_id: Some(id),
                ..
            } => return Some(format!("Quote request ID {id} when reporting this.")),
            Self::Network(_) => "Is the API reachable? Check COHORT_API_URL or `api_url` in the config file.",
            _ => return None,
        };
        Some(hint.to_string())
    }
}

/// Print an error, plus a hint when the error is one of ours.
pub fn print_error(err: &anyhow::Error) {
    eprintln!("{} {}", "Error:".red().bold(), err);

    let hint = err.downcast_ref::<CliError>().and_then(CliError::hint);
    if let Some(hint) = hint {
        eprintln!("\n{} {}", "Hint:".yellow().bold(), hint);
    }
}
