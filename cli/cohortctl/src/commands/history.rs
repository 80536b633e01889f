//! Assignment history command.

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::Args;
use cohort_engine::{classify_history, ClassifiedWindow};
use cohort_id::CandidateId;
use serde::Serialize;
use tabled::Tabled;

use crate::output::{or_dash, print_output, print_single, OutputFormat};

use super::CommandContext;

/// Show a candidate's assignments with upcoming/current/completed status.
#[derive(Debug, Args)]
pub struct HistoryCommand {
    /// Candidate ID.
    candidate: CandidateId,

    /// Reference time for classification (RFC 3339). Defaults to now.
    #[arg(long)]
    now: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Tabled)]
struct HistoryRow {
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Start")]
    start: String,
    #[tabled(rename = "End")]
    end: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Current")]
    current: &'static str,
}

impl From<&ClassifiedWindow> for HistoryRow {
    fn from(c: &ClassifiedWindow) -> Self {
        let w = &c.window;
        Self {
            resource: w.resource_id.to_string(),
            kind: w
                .resource_kind
                .map(|k| k.to_string())
                .unwrap_or_else(|| "-".to_string()),
            start: or_dash(w.start_date.as_deref()),
            end: or_dash(w.end_date.as_deref()),
            status: c.status.to_string(),
            current: if w.is_current { "yes" } else { "" },
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HistoryView<'a> {
    candidate_id: &'a CandidateId,
    name: Option<&'a str>,
    as_of: DateTime<Utc>,
    assignments: &'a [ClassifiedWindow],
}

impl HistoryCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let backend = ctx.backend()?;
        let candidate = backend.fetch_candidate(&self.candidate).await?;

        let now = self.now.unwrap_or_else(Utc::now);
        let history = classify_history(&candidate.assignments, now);

        match ctx.format {
            OutputFormat::Json => print_single(&HistoryView {
                candidate_id: &candidate.id,
                name: candidate.name.as_deref(),
                as_of: now,
                assignments: &history,
            }),
            OutputFormat::Table => {
                let stage = candidate
                    .stage
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "unknown".to_string());
                println!("{} ({}), stage {}", candidate.display_name(), candidate.id, stage);
                let rows: Vec<HistoryRow> = history.iter().map(HistoryRow::from).collect();
                print_output(&rows, OutputFormat::Table);
            }
        }

        Ok(())
    }
}
