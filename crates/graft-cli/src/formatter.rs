//! Output formatting for command results.
//!
//! Every command produces a list of named properties, shown either as a
//! two-column table or as a flat JSON object.

use comfy_table::{Cell, ContentArrangement, Table};
use serde_json::{Map, Value as JsonValue};

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Formatted table output.
    Table,
    /// JSON output.
    Json,
}

/// A named value in command output.
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub name: &'static str,
    pub value: JsonValue,
}

impl Property {
    pub fn new(name: &'static str, value: impl Into<JsonValue>) -> Self {
        Self {
            name,
            value: value.into(),
        }
    }
}

/// Formats properties according to the specified format.
pub fn format_properties(properties: &[Property], format: OutputFormat) -> String {
    match format {
        OutputFormat::Table => format_table(properties),
        OutputFormat::Json => format_json(properties),
    }
}

fn format_table(properties: &[Property]) -> String {
    let mut table = Table::new();
    table
        .set_content_arrangement(ContentArrangement::Dynamic)
        .load_preset(comfy_table::presets::UTF8_FULL)
        .apply_modifier(comfy_table::modifiers::UTF8_ROUND_CORNERS)
        .set_header(vec![Cell::new("property"), Cell::new("value")]);

    for property in properties {
        let value = match &property.value {
            JsonValue::String(s) => s.clone(),
            other => other.to_string(),
        };
        table.add_row(vec![Cell::new(property.name), Cell::new(value)]);
    }
    table.to_string()
}

fn format_json(properties: &[Property]) -> String {
    let object: Map<String, JsonValue> = properties
        .iter()
        .map(|p| (p.name.to_string(), p.value.clone()))
        .collect();
    serde_json::to_string_pretty(&JsonValue::Object(object)).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<Property> {
        vec![
            Property::new("uri", "table:t"),
            Property::new("entries", 4u64),
        ]
    }

    #[test]
    fn test_json_output() {
        let out = format_properties(&sample(), OutputFormat::Json);
        let parsed: JsonValue = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed["uri"], "table:t");
        assert_eq!(parsed["entries"], 4);
    }

    #[test]
    fn test_table_output() {
        let out = format_properties(&sample(), OutputFormat::Table);
        assert!(out.contains("table:t"));
        assert!(out.contains("entries"));
    }
}
