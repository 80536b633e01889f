//! Assignment command.

use std::collections::{BTreeMap, BTreeSet};

use anyhow::{bail, Result};
use clap::Args;
use cohort_engine::{
    AssignmentWorkflow, BatchOutcome, BatchReport, ManagerRole, ResourceSelection, Transition,
};
use cohort_id::{CandidateId, ResourceId};
use serde::Serialize;
use tabled::Tabled;

use crate::error::CliError;
use crate::output::{
    print_info, print_output, print_single, print_success, print_warning, OutputFormat,
};

use super::candidates::parse_transition;
use super::CommandContext;

/// Assign one or more candidates to a resource.
#[derive(Debug, Args)]
pub struct AssignCommand {
    /// Transition (schedule-interview, assign-induction, assign-scheme, assign-station).
    #[arg(value_parser = parse_transition)]
    transition: Transition,

    /// Resource to assign to.
    #[arg(long)]
    resource: ResourceId,

    /// Manager slot (primary, secondary, mentor), for resources that have them.
    #[arg(long, value_parser = parse_role)]
    slot: Option<ManagerRole>,

    /// Window start (YYYY-MM-DD or RFC 3339).
    #[arg(long)]
    start: Option<String>,

    /// Window end (YYYY-MM-DD or RFC 3339). A bare date covers the whole day.
    #[arg(long)]
    end: Option<String>,

    /// Program record shared by every candidate; supplies the window when
    /// --start/--end are omitted.
    #[arg(long)]
    program: Option<ResourceId>,

    /// Extra field sent with each assignment (key=value, repeatable).
    /// Values that parse as JSON are sent as JSON, anything else as text.
    #[arg(long = "aux", value_parser = parse_aux)]
    aux: Vec<(String, serde_json::Value)>,

    /// Candidates to assign.
    #[arg(required = true, num_args = 1..)]
    candidates: Vec<CandidateId>,
}

fn parse_role(s: &str) -> Result<ManagerRole, String> {
    ManagerRole::parse(s).ok_or_else(|| {
        let known: Vec<&str> = ManagerRole::ALL.iter().map(|r| r.as_str()).collect();
        format!("unknown manager role '{s}' (expected one of: {})", known.join(", "))
    })
}

fn parse_aux(s: &str) -> Result<(String, serde_json::Value), String> {
    let (key, raw) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{s}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in '{s}'"));
    }
    let value = serde_json::from_str(raw)
        .unwrap_or_else(|_| serde_json::Value::String(raw.to_string()));
    Ok((key.to_string(), value))
}

#[derive(Debug, Serialize, Tabled)]
struct OutcomeRow {
    #[tabled(rename = "Candidate")]
    candidate: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Result")]
    result: &'static str,
    #[tabled(rename = "Detail")]
    detail: String,
}

impl OutcomeRow {
    fn new(outcome: &BatchOutcome, names: &BTreeMap<CandidateId, String>) -> Self {
        let (result, detail) = match &outcome.result {
            Ok(ack) => (
                "assigned",
                ack.assignment_id
                    .as_ref()
                    .map(|id| id.to_string())
                    .or_else(|| ack.message.clone())
                    .unwrap_or_else(|| "-".to_string()),
            ),
            Err(err) => ("failed", err.to_string()),
        };

        Self {
            candidate: outcome.candidate_id.to_string(),
            name: names
                .get(&outcome.candidate_id)
                .cloned()
                .unwrap_or_else(|| "-".to_string()),
            result,
            detail,
        }
    }
}

impl AssignCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let backend = ctx.backend()?;
        let mut workflow = AssignmentWorkflow::new(backend, self.transition);
        workflow.load().await?;

        let resource = workflow.catalog().get(&self.resource).ok_or_else(|| {
            CliError::NotFound(format!(
                "{} {} is not listed",
                self.transition.resource_kind(),
                self.resource
            ))
        })?;

        let mut selection = ResourceSelection::new();
        selection.select_resource(resource)?;
        match self.slot {
            Some(role) => selection.select_slot(role)?,
            None => {
                if let (true, Some(slot)) = (selection.slot_auto_selected(), selection.slot()) {
                    if ctx.format == OutputFormat::Table {
                        print_info(&format!(
                            "Using {} manager slot ({}), the only one with allocation left.",
                            slot.role, slot.name
                        ));
                    }
                }
            }
        }

        let eligible = workflow.eligible_candidates();
        let eligible_ids: BTreeSet<&CandidateId> = eligible.iter().map(|c| &c.id).collect();
        let ineligible: Vec<String> = self
            .candidates
            .iter()
            .filter(|id| !eligible_ids.contains(id))
            .map(|id| id.to_string())
            .collect();
        if !ineligible.is_empty() {
            bail!(
                "not eligible for {} (must be at stage {}): {}",
                self.transition,
                self.transition.predecessor(),
                ineligible.join(", ")
            );
        }
        let names: BTreeMap<CandidateId, String> = eligible
            .iter()
            .map(|c| (c.id.clone(), c.display_name().to_string()))
            .collect();

        let mut builder = workflow
            .builder()
            .candidates(self.candidates)
            .selection(selection);
        if let Some(start) = self.start {
            builder = builder.start(start);
        }
        if let Some(end) = self.end {
            builder = builder.end(end);
        }
        if let Some(program) = self.program {
            builder = builder.shared_program(program);
        }
        for (key, value) in self.aux {
            builder = builder.aux(key, value);
        }

        let round = workflow.submit(builder).await?;

        match ctx.format {
            OutputFormat::Json => print_single(&round.report),
            OutputFormat::Table => print_report(&round.report, &names),
        }

        if let Some(err) = &round.refresh_error {
            if ctx.format == OutputFormat::Table {
                print_warning(&format!("Lists could not be refreshed: {err}"));
            }
        }

        check_report(&round.report)
    }
}

fn print_report(report: &BatchReport, names: &BTreeMap<CandidateId, String>) {
    // A lone failure is reported as the command's error instead.
    if report.total() == 1 && !report.all_succeeded() {
        return;
    }

    let rows: Vec<OutcomeRow> = report
        .outcomes()
        .iter()
        .map(|o| OutcomeRow::new(o, names))
        .collect();
    print_output(&rows, OutputFormat::Table);

    if report.all_succeeded() {
        print_success(&report.summary());
    } else {
        print_warning(&report.summary());
    }
}

fn check_report(report: &BatchReport) -> Result<()> {
    if report.all_succeeded() {
        return Ok(());
    }

    let summary = match report.outcomes() {
        [only] => match only.error() {
            Some(err) => format!("{}: {}", only.candidate_id, err),
            None => report.summary(),
        },
        _ => report.summary(),
    };

    Err(CliError::Incomplete {
        summary,
        reauthenticate: report.requires_reauthentication(),
    }
    .into())
}
