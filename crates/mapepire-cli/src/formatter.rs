//! Output formatters for server responses.

use clap::ValueEnum;
use comfy_table::{Cell, Table};
use mapepire_client::PingResult;
use mapepire_proto::{OperationKind, Response};
use serde_json::Value;

/// Output format for results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// ASCII table format
    Table,
    /// Pretty-printed JSON
    Json,
    /// Response body exactly as received
    Raw,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Table => write!(f, "table"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Raw => write!(f, "raw"),
        }
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            "raw" => Ok(OutputFormat::Raw),
            other => Err(format!("Unknown format '{}'. Use: table, json, raw", other)),
        }
    }
}

/// Trait for formatting output.
pub trait Formatter: Send + Sync {
    /// Format the body of a SQL response.
    fn format_query(&self, body: &str) -> String;

    /// Format the body of a CL command response.
    fn format_command(&self, body: &str) -> String;

    /// Format a ping outcome.
    fn format_ping(&self, ping: &PingResult) -> String;
}

/// Create a formatter for the given output format.
pub fn create_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Table => Box::new(TableFormatter),
        OutputFormat::Json => Box::new(JsonFormatter),
        OutputFormat::Raw => Box::new(RawFormatter),
    }
}

/// Table formatter using comfy-table.
pub struct TableFormatter;

impl Formatter for TableFormatter {
    fn format_query(&self, body: &str) -> String {
        let response = match Response::decode(body, OperationKind::Sql) {
            Ok(response) => response,
            Err(_) => return body.to_string(),
        };

        if let Some(table) = format_rows_as_table(&response) {
            return table;
        }

        match response.update_count {
            Some(count) if count >= 0 => format!("{} row(s) affected", count),
            _ => "Statement executed".to_string(),
        }
    }

    fn format_command(&self, body: &str) -> String {
        let response = match Response::decode(body, OperationKind::Cl) {
            Ok(response) => response,
            Err(_) => return body.to_string(),
        };

        format_rows_as_table(&response).unwrap_or_else(|| "Command completed".to_string())
    }

    fn format_ping(&self, ping: &PingResult) -> String {
        let mut table = Table::new();
        table.set_header(vec!["Server", "Database"]);
        table.add_row(vec![yes_no(ping.alive), yes_no(ping.db_alive)]);
        table.to_string()
    }
}

/// JSON formatter.
pub struct JsonFormatter;

impl Formatter for JsonFormatter {
    fn format_query(&self, body: &str) -> String {
        pretty_json(body)
    }

    fn format_command(&self, body: &str) -> String {
        pretty_json(body)
    }

    fn format_ping(&self, ping: &PingResult) -> String {
        pretty_json(&ping.body)
    }
}

/// Raw formatter.
pub struct RawFormatter;

impl Formatter for RawFormatter {
    fn format_query(&self, body: &str) -> String {
        body.to_string()
    }

    fn format_command(&self, body: &str) -> String {
        body.to_string()
    }

    fn format_ping(&self, ping: &PingResult) -> String {
        ping.body.clone()
    }
}

/// Render the response rows, or `None` when there are none.
fn format_rows_as_table(response: &Response) -> Option<String> {
    let rows = response.data.as_ref().filter(|rows| !rows.is_empty())?;

    let mut columns = response.column_names();
    if columns.is_empty() {
        // Rows sent as arrays without metadata: number the columns.
        let width = match rows.first() {
            Some(Value::Array(cells)) => cells.len(),
            _ => 1,
        };
        columns = (1..=width).map(|i| i.to_string()).collect();
    }

    let mut table = Table::new();
    table.set_header(columns.iter().map(Cell::new).collect::<Vec<_>>());

    for row in rows {
        let cells: Vec<Cell> = match row {
            Value::Object(fields) => columns
                .iter()
                .map(|name| Cell::new(fields.get(name).map(format_value).unwrap_or_default()))
                .collect(),
            Value::Array(values) => values.iter().map(|v| Cell::new(format_value(v))).collect(),
            other => vec![Cell::new(format_value(other))],
        };
        table.add_row(cells);
    }

    let mut output = format!("{}\n{} row(s)", table, rows.len());
    if response.is_done == Some(false) {
        output.push_str(" (more rows available)");
    }
    Some(output)
}

/// Format a JSON value as a display string.
fn format_value(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

fn pretty_json(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| serde_json::to_string_pretty(&value).ok())
        .unwrap_or_else(|| body.to_string())
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "alive"
    } else {
        "down"
    }
}
