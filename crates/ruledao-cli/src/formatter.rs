//! Output formatters for command results.

use clap::ValueEnum;
use comfy_table::{Cell, Table};
use ruledao_core::constraint::display;
use ruledao_core::QueryOutput;
use ruledao_lang::ExpressionModel;
use serde_json::{json, Value as JsonValue};

/// Output format for results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// ASCII table format
    Table,
    /// JSON format
    Json,
    /// CSV format
    Csv,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Table => write!(f, "table"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Csv => write!(f, "csv"),
        }
    }
}

/// A resolved template with, when a record was given, the evaluated value
/// of each parameter in order.
pub struct Resolution<'a> {
    pub model: &'a ExpressionModel,
    pub values: Vec<Option<String>>,
}

impl Resolution<'_> {
    fn rows(&self) -> impl Iterator<Item = (&str, &str, Option<&str>)> {
        self.model
            .parameters()
            .iter()
            .zip(self.values.iter().chain(std::iter::repeat(&None)))
            .map(|(p, v)| (p.name.as_str(), p.expression.as_str(), v.as_deref()))
    }
}

/// Trait for formatting output.
pub trait Formatter: Send + Sync {
    /// Format a query output.
    fn format_output(&self, output: &QueryOutput) -> String;

    /// Format a resolved template.
    fn format_resolution(&self, resolution: &Resolution<'_>) -> String;

    /// Format the result of removing records of an entity type.
    fn format_mutation_result(&self, removed: usize, entity: &str) -> String;

    /// Format an error message.
    fn format_error(&self, error: &str) -> String;

    /// Format a simple message.
    fn format_message(&self, message: &str) -> String;

    /// Format the list of stored entity types.
    fn format_entities(&self, entities: &[String]) -> String;
}

/// Create a formatter for the given output format.
pub fn create_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Table => Box::new(TableFormatter),
        OutputFormat::Json => Box::new(JsonFormatter),
        OutputFormat::Csv => Box::new(CsvFormatter),
    }
}

/// Table formatter using comfy-table.
pub struct TableFormatter;

impl Formatter for TableFormatter {
    fn format_output(&self, output: &QueryOutput) -> String {
        let rows = match output {
            QueryOutput::Count(n) => return format!("{} matching record(s)", n),
            QueryOutput::Rows(rows) => rows,
        };
        if rows.is_empty() {
            return "No results".to_string();
        }

        let headers = columns(rows);
        let mut table = Table::new();
        table.set_header(headers.iter().map(Cell::new).collect::<Vec<_>>());
        for row in rows {
            table.add_row(
                headers
                    .iter()
                    .map(|h| Cell::new(format_cell(row.get(h))))
                    .collect::<Vec<_>>(),
            );
        }

        format!("{}\n{} row(s)", table, rows.len())
    }

    fn format_resolution(&self, resolution: &Resolution<'_>) -> String {
        let mut output = resolution.model.computed().to_string();
        if resolution.model.is_constant() {
            return output;
        }

        let mut table = Table::new();
        table.set_header(vec!["Parameter", "Expression", "Value"]);
        for (name, expression, value) in resolution.rows() {
            table.add_row(vec![name, expression, value.unwrap_or("")]);
        }
        output.push('\n');
        output.push_str(&table.to_string());
        output
    }

    fn format_mutation_result(&self, removed: usize, entity: &str) -> String {
        format!("{} record(s) removed from {}", removed, entity)
    }

    fn format_error(&self, error: &str) -> String {
        format!("Error: {}", error)
    }

    fn format_message(&self, message: &str) -> String {
        message.to_string()
    }

    fn format_entities(&self, entities: &[String]) -> String {
        let mut table = Table::new();
        table.set_header(vec!["Entity"]);

        for entity in entities {
            table.add_row(vec![entity]);
        }

        table.to_string()
    }
}

/// JSON formatter.
pub struct JsonFormatter;

impl Formatter for JsonFormatter {
    fn format_output(&self, output: &QueryOutput) -> String {
        let value = match output {
            QueryOutput::Count(n) => json!({ "count": n }),
            QueryOutput::Rows(rows) => JsonValue::Array(rows.clone()),
        };
        pretty(&value)
    }

    fn format_resolution(&self, resolution: &Resolution<'_>) -> String {
        let parameters: Vec<JsonValue> = resolution
            .rows()
            .map(|(name, expression, value)| {
                json!({ "name": name, "expression": expression, "value": value })
            })
            .collect();
        pretty(&json!({
            "original": resolution.model.original(),
            "computed": resolution.model.computed(),
            "parameters": parameters,
        }))
    }

    fn format_mutation_result(&self, removed: usize, entity: &str) -> String {
        json!({ "removed": removed, "entity": entity }).to_string()
    }

    fn format_error(&self, error: &str) -> String {
        json!({ "error": error }).to_string()
    }

    fn format_message(&self, message: &str) -> String {
        json!({ "message": message }).to_string()
    }

    fn format_entities(&self, entities: &[String]) -> String {
        serde_json::to_string_pretty(entities).unwrap_or_else(|_| "[]".to_string())
    }
}

/// CSV formatter.
pub struct CsvFormatter;

impl Formatter for CsvFormatter {
    fn format_output(&self, output: &QueryOutput) -> String {
        let rows = match output {
            QueryOutput::Count(n) => return format!("count\n{}\n", n),
            QueryOutput::Rows(rows) => rows,
        };

        let headers = columns(rows);
        let mut output = headers.join(",");
        output.push('\n');
        for row in rows {
            let cells: Vec<String> = headers.iter().map(|h| format_cell_csv(row.get(h))).collect();
            output.push_str(&cells.join(","));
            output.push('\n');
        }
        output
    }

    fn format_resolution(&self, resolution: &Resolution<'_>) -> String {
        let mut output = String::from("parameter,expression,value\n");
        for (name, expression, value) in resolution.rows() {
            output.push_str(&format!(
                "{},\"{}\",\"{}\"\n",
                name,
                escape_csv(expression),
                escape_csv(value.unwrap_or(""))
            ));
        }
        output
    }

    fn format_mutation_result(&self, removed: usize, entity: &str) -> String {
        format!("removed,entity\n{},\"{}\"", removed, escape_csv(entity))
    }

    fn format_error(&self, error: &str) -> String {
        format!("error\n\"{}\"", escape_csv(error))
    }

    fn format_message(&self, message: &str) -> String {
        message.to_string()
    }

    fn format_entities(&self, entities: &[String]) -> String {
        let mut output = String::from("entity\n");
        for entity in entities {
            output.push_str(&format!("{}\n", entity));
        }
        output
    }
}

/// Union of the top-level keys of every row, in first-seen order.
fn columns(rows: &[JsonValue]) -> Vec<String> {
    let mut headers: Vec<String> = Vec::new();
    for key in rows.iter().filter_map(JsonValue::as_object).flat_map(|o| o.keys()) {
        if !headers.iter().any(|h| h == key) {
            headers.push(key.clone());
        }
    }
    headers
}

fn format_cell(value: Option<&JsonValue>) -> String {
    match value {
        None | Some(JsonValue::Null) => "NULL".to_string(),
        Some(v @ (JsonValue::Array(_) | JsonValue::Object(_))) => v.to_string(),
        Some(v) => display(v),
    }
}

fn format_cell_csv(value: Option<&JsonValue>) -> String {
    match value {
        None | Some(JsonValue::Null) => String::new(),
        Some(JsonValue::String(s)) => format!("\"{}\"", escape_csv(s)),
        Some(v @ (JsonValue::Array(_) | JsonValue::Object(_))) => {
            format!("\"{}\"", escape_csv(&v.to_string()))
        }
        Some(v) => display(v),
    }
}

fn pretty(value: &JsonValue) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

/// Escape a string for CSV.
fn escape_csv(s: &str) -> String {
    s.replace('"', "\"\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows() -> QueryOutput {
        QueryOutput::Rows(vec![
            json!({"id": 1, "code": "FR", "zone": {"id": 7}}),
            json!({"id": 2, "code": "say \"hi\"", "extra": null}),
        ])
    }

    #[test]
    fn test_columns_in_first_seen_order() {
        let QueryOutput::Rows(rows) = rows() else { unreachable!() };
        assert_eq!(columns(&rows), vec!["id", "code", "zone", "extra"]);
    }

    #[test]
    fn test_table_output() {
        let out = TableFormatter.format_output(&rows());
        assert!(out.contains("FR"));
        assert!(out.contains("NULL"));
        assert!(out.ends_with("2 row(s)"));
        assert_eq!(TableFormatter.format_output(&QueryOutput::Rows(vec![])), "No results");
        assert_eq!(
            TableFormatter.format_output(&QueryOutput::Count(3)),
            "3 matching record(s)"
        );
    }

    #[test]
    fn test_csv_output() {
        let out = CsvFormatter.format_output(&rows());
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "id,code,zone,extra");
        assert_eq!(lines[1], "1,\"FR\",\"{\"\"id\"\":7}\",");
        assert_eq!(lines[2], "2,\"say \"\"hi\"\"\",,");
    }

    #[test]
    fn test_resolution_output() {
        let model = ruledao_lang::resolve("find Country where code = ${code}")
            .unwrap()
            .unwrap();
        let resolution = Resolution {
            model: &model,
            values: vec![],
        };

        let table = TableFormatter.format_resolution(&resolution);
        assert!(table.starts_with("find Country where code = :var0"));
        assert!(table.contains("${code}"));

        let csv = CsvFormatter.format_resolution(&resolution);
        assert_eq!(csv, "parameter,expression,value\nvar0,\"${code}\",\"\"\n");
    }

    #[test]
    fn test_escape_csv() {
        assert_eq!(escape_csv("hello"), "hello");
        assert_eq!(escape_csv("hello, world"), "hello, world");
        assert_eq!(escape_csv("say \"hi\""), "say \"\"hi\"\"");
    }
}
