//! Output formatting for CLI commands.

use colored::Colorize;
use serde::Serialize;
use tabled::{Table, Tabled};

const CLI_SCHEMA_VERSION: &str = "cohort.cli.v1";

/// Output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable table format.
    #[default]
    Table,
    /// JSON format.
    Json,
}

impl OutputFormat {
    pub fn parse(s: &str) -> Self {
        match s {
            "json" => Self::Json,
            _ => Self::Table,
        }
    }
}

/// Print rows in the specified format.
pub fn print_output<T: Serialize + Tabled>(data: &[T], format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            if data.is_empty() {
                println!("{}", "(nothing to show)".dimmed());
                return;
            }
            println!("{}", Table::new(data));
        }
        OutputFormat::Json => println!("{}", format_json(data, "[]")),
    }
}

/// Print a single item as JSON (both formats).
pub fn print_single<T: Serialize>(data: &T) {
    println!("{}", format_json(data, "{}"));
}

fn print_tagged(tag: colored::ColoredString, message: &str) {
    println!("{} {message}", tag.bold());
}

pub fn print_success(message: &str) {
    print_tagged("ok".green(), message);
}

pub fn print_info(message: &str) {
    print_tagged("note".blue(), message);
}

pub fn print_warning(message: &str) {
    print_tagged("warning".yellow(), message);
}

/// JSON envelope shared by every command.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Envelope {
    schema_version: &'static str,
    data: serde_json::Value,
}

fn format_json<T: Serialize + ?Sized>(data: &T, fallback: &str) -> String {
    let envelope = Envelope {
        schema_version: CLI_SCHEMA_VERSION,
        data: serde_json::to_value(data).map_or(serde_json::Value::Null, sorted),
    };
    serde_json::to_string_pretty(&envelope).unwrap_or_else(|_| fallback.to_string())
}

/// Rebuild objects with keys in order, so output is stable whatever map
/// type produced them.
fn sorted(value: serde_json::Value) -> serde_json::Value {
    use serde_json::Value;

    match value {
        Value::Array(items) => Value::Array(items.into_iter().map(sorted).collect()),
        Value::Object(entries) => {
            let ordered: std::collections::BTreeMap<_, _> = entries
                .into_iter()
                .map(|(key, value)| (key, sorted(value)))
                .collect();
            Value::Object(ordered.into_iter().collect())
        }
        other => other,
    }
}

/// Render an optional value for a table cell.
pub fn or_dash(value: Option<&str>) -> String {
    value.unwrap_or("-").to_string()
}
