//! Resource listing commands.

use anyhow::Result;
use clap::{Args, Subcommand};
use cohort_engine::{Capacity, Resource, ResourceCatalog, ResourceKind};
use serde::Serialize;
use tabled::Tabled;

use crate::output::print_output;

use super::CommandContext;

/// Resource commands.
#[derive(Debug, Args)]
pub struct ResourcesCommand {
    #[command(subcommand)]
    command: ResourcesSubcommand,
}

#[derive(Debug, Subcommand)]
enum ResourcesSubcommand {
    /// List resources of one kind that can take another candidate.
    List {
        /// Resource kind (scheme, station, induction, interview-panel).
        #[arg(value_parser = parse_kind)]
        kind: ResourceKind,

        /// Include resources with no remaining capacity.
        #[arg(long)]
        all: bool,
    },
}

fn parse_kind(s: &str) -> Result<ResourceKind, String> {
    ResourceKind::parse(s).ok_or_else(|| {
        let known: Vec<&str> = ResourceKind::ALL.iter().map(|k| k.as_str()).collect();
        format!("unknown resource kind '{s}' (expected one of: {})", known.join(", "))
    })
}

#[derive(Debug, Serialize, Tabled)]
struct ResourceRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Remaining")]
    remaining: u64,
    #[tabled(rename = "Managers")]
    managers: String,
    #[tabled(rename = "Status")]
    status: &'static str,
}

impl From<&Resource> for ResourceRow {
    fn from(r: &Resource) -> Self {
        let managers = if r.has_slots() {
            r.manager_slots
                .iter()
                .map(|s| format!("{} {} ({})", s.role, s.name, s.remaining_capacity()))
                .collect::<Vec<_>>()
                .join(", ")
        } else {
            "-".to_string()
        };

        Self {
            id: r.id.to_string(),
            name: r.name.clone(),
            remaining: r.remaining_capacity(),
            managers,
            status: if r.is_selectable() { "open" } else { "full" },
        }
    }
}

impl ResourcesCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let backend = ctx.backend()?;

        match self.command {
            ResourcesSubcommand::List { kind, all } => {
                let mut catalog = ResourceCatalog::new(backend, kind);
                catalog.refresh().await?;

                let rows: Vec<ResourceRow> = if all {
                    catalog.all().iter().map(ResourceRow::from).collect()
                } else {
                    catalog
                        .selectable()
                        .into_iter()
                        .map(ResourceRow::from)
                        .collect()
                };
                print_output(&rows, ctx.format);
            }
        }

        Ok(())
    }
}
