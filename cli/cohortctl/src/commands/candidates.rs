//! Candidate listing commands.

use anyhow::Result;
use clap::{Args, Subcommand};
use cohort_engine::{Candidate, PipelineStage, PipelineStatusGate, PlacementBackend, Transition};
use serde::Serialize;
use tabled::Tabled;

use crate::output::{or_dash, print_output, OutputFormat};

use super::CommandContext;

/// Candidate commands.
#[derive(Debug, Args)]
pub struct CandidatesCommand {
    #[command(subcommand)]
    command: CandidatesSubcommand,
}

#[derive(Debug, Subcommand)]
enum CandidatesSubcommand {
    /// List candidates, optionally at one pipeline stage.
    List {
        /// Pipeline stage (e.g. interview-passed).
        #[arg(long, value_parser = parse_stage)]
        stage: Option<PipelineStage>,
    },

    /// List candidates eligible for a transition.
    Eligible {
        /// Transition (schedule-interview, assign-induction, assign-scheme, assign-station).
        #[arg(value_parser = parse_transition)]
        transition: Transition,
    },
}

pub(super) fn parse_stage(s: &str) -> Result<PipelineStage, String> {
    PipelineStage::parse(s).ok_or_else(|| {
        let known: Vec<&str> = PipelineStage::ORDER.iter().map(|s| s.as_str()).collect();
        format!("unknown stage '{s}' (expected one of: {})", known.join(", "))
    })
}

pub(super) fn parse_transition(s: &str) -> Result<Transition, String> {
    Transition::parse(s).ok_or_else(|| {
        let known: Vec<&str> = Transition::ALL.iter().map(|t| t.as_str()).collect();
        format!(
            "unknown transition '{s}' (expected one of: {})",
            known.join(", ")
        )
    })
}

#[derive(Debug, Serialize, Tabled)]
struct CandidateRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Stage")]
    stage: String,
}

impl From<&Candidate> for CandidateRow {
    fn from(c: &Candidate) -> Self {
        Self {
            id: c.id.to_string(),
            name: or_dash(c.name.as_deref()),
            stage: c
                .stage
                .map(|s| s.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
        }
    }
}

impl CandidatesCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let backend = ctx.backend()?;

        match self.command {
            CandidatesSubcommand::List { stage } => {
                let mut candidates = backend.list_candidates(stage).await?;
                candidates.sort_by(|a, b| a.id.cmp(&b.id));
                print_rows(&candidates, ctx.format);
            }
            CandidatesSubcommand::Eligible { transition } => {
                let mut gate = PipelineStatusGate::new(backend, transition);
                let candidates = gate.refresh().await?;
                if ctx.format == OutputFormat::Table {
                    println!(
                        "Eligible for {} (stage {}):",
                        transition,
                        transition.predecessor()
                    );
                }
                print_rows(candidates, ctx.format);
            }
        }

        Ok(())
    }
}

fn print_rows(candidates: &[Candidate], format: OutputFormat) {
    let rows: Vec<CandidateRow> = candidates.iter().map(CandidateRow::from).collect();
    print_output(&rows, format);
}
