//! Output formatters for command results.

use std::collections::BTreeSet;

use clap::ValueEnum;
use comfy_table::{Cell, Table};
use dcgen_core::{Definition, PasteResult, PersistEvent, Record, TreeNode};
use serde_json::json;

/// Output format for results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// ASCII table format
    Table,
    /// JSON format
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Table => write!(f, "table"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Trait for formatting output.
pub trait Formatter {
    /// Summary of a validated definition and the record types found in storage.
    fn format_definition(&self, definition: &Definition, stored: &[String]) -> String;

    /// A list of records, one row each.
    fn format_records(&self, records: &[Record]) -> String;

    /// A collected tree.
    fn format_tree(&self, nodes: &[TreeNode]) -> String;

    /// Outcome of a paste.
    fn format_paste(&self, result: &PasteResult) -> String;

    /// Recorded persist notifications.
    fn format_events(&self, events: &[PersistEvent]) -> String;
}

/// Create a formatter for the given output format.
pub fn create_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Table => Box::new(TableFormatter),
        OutputFormat::Json => Box::new(JsonFormatter),
    }
}

fn record_label(record: &Record) -> String {
    record
        .record_id()
        .map(|id| id.to_serialized())
        .unwrap_or_else(|| format!("{}::<new>", record.record_type()))
}

fn mode_name(definition: &Definition) -> String {
    format!("{:?}", definition.mode).to_lowercase()
}

/// Table formatter using comfy-table.
pub struct TableFormatter;

impl Formatter for TableFormatter {
    fn format_definition(&self, definition: &Definition, stored: &[String]) -> String {
        let mut table = Table::new();
        table.set_header(vec!["Setting", "Value"]);
        table.add_row(vec!["name".to_string(), definition.name.clone()]);
        table.add_row(vec!["mode".to_string(), mode_name(definition)]);
        table.add_row(vec!["root type".to_string(), definition.root_type.clone()]);
        if let Some(parent_type) = &definition.parent_type {
            table.add_row(vec!["parent type".to_string(), parent_type.clone()]);
        }
        if let Some(sorting) = &definition.manual_sorting {
            table.add_row(vec!["manual sorting".to_string(), sorting.clone()]);
        }
        if let Some(grouping) = &definition.grouping {
            table.add_row(vec!["grouping".to_string(), grouping.clone()]);
        }
        for condition in &definition.conditions {
            table.add_row(vec![
                "condition".to_string(),
                format!("{} -> {}", condition.parent_type, condition.child_type),
            ]);
        }
        table.add_row(vec!["stored types".to_string(), stored.join(", ")]);
        table.to_string()
    }

    fn format_records(&self, records: &[Record]) -> String {
        if records.is_empty() {
            return "No records".to_string();
        }

        let columns: BTreeSet<&str> = records
            .iter()
            .flat_map(|r| r.properties().keys().map(String::as_str))
            .collect();

        let mut table = Table::new();
        let mut headers = vec![Cell::new("id")];
        headers.extend(columns.iter().map(Cell::new));
        table.set_header(headers);

        for record in records {
            let mut row = vec![Cell::new(record_label(record))];
            for column in &columns {
                let value = record.get(column).map(|v| v.to_string()).unwrap_or_default();
                row.push(Cell::new(value));
            }
            table.add_row(row);
        }

        table.to_string()
    }

    fn format_tree(&self, nodes: &[TreeNode]) -> String {
        if nodes.is_empty() {
            return "No records".to_string();
        }

        let mut lines = Vec::new();
        for record in nodes.iter().flat_map(TreeNode::flatten) {
            let marker = match (record.meta.is_expanded, record.meta.has_children) {
                (true, true) => "-",
                (false, true) => "+",
                _ => " ",
            };
            lines.push(format!(
                "{}{} {}",
                "  ".repeat(record.meta.tree_level),
                marker,
                record_label(record)
            ));
        }
        lines.join("\n")
    }

    fn format_paste(&self, result: &PasteResult) -> String {
        let mut table = Table::new();
        table.set_header(vec!["Record", "Role"]);
        for id in &result.pasted {
            table.add_row(vec![id.to_serialized(), "pasted".to_string()]);
        }
        for id in result.saved.iter().filter(|id| !result.pasted.contains(id)) {
            table.add_row(vec![id.to_serialized(), "saved".to_string()]);
        }
        for (origin, copy) in &result.copies {
            table.add_row(vec![
                copy.to_serialized(),
                format!("copy of {}", origin.to_serialized()),
            ]);
        }

        format!(
            "{}\n{} record(s) saved, deep copy depth {}",
            table,
            result.saved.len(),
            result.depth
        )
    }

    fn format_events(&self, events: &[PersistEvent]) -> String {
        let mut table = Table::new();
        table.set_header(vec!["Phase", "Type", "Id", "Update"]);
        for event in events {
            table.add_row(vec![
                format!("{:?}", event.phase).to_lowercase(),
                event.record_type.clone(),
                event.id.as_ref().map(|id| id.to_string()).unwrap_or_default(),
                event.had_original.to_string(),
            ]);
        }
        table.to_string()
    }
}

/// JSON formatter.
pub struct JsonFormatter;

fn record_json(record: &Record) -> serde_json::Value {
    json!({
        "id": record.record_id().map(|id| id.to_serialized()),
        "properties": record.properties(),
    })
}

fn node_json(node: &TreeNode) -> serde_json::Value {
    json!({
        "id": node.record.record_id().map(|id| id.to_serialized()),
        "level": node.record.meta.tree_level,
        "expanded": node.record.meta.is_expanded,
        "has_children": node.record.meta.has_children,
        "properties": node.record.properties(),
        "children": node.children.iter().map(node_json).collect::<Vec<_>>(),
    })
}

fn pretty(value: &serde_json::Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "null".to_string())
}

impl Formatter for JsonFormatter {
    fn format_definition(&self, definition: &Definition, stored: &[String]) -> String {
        pretty(&json!({
            "definition": definition,
            "stored_types": stored,
        }))
    }

    fn format_records(&self, records: &[Record]) -> String {
        pretty(&serde_json::Value::Array(records.iter().map(record_json).collect()))
    }

    fn format_tree(&self, nodes: &[TreeNode]) -> String {
        pretty(&serde_json::Value::Array(nodes.iter().map(node_json).collect()))
    }

    fn format_paste(&self, result: &PasteResult) -> String {
        pretty(&json!({
            "pasted": result.pasted.iter().map(|id| id.to_serialized()).collect::<Vec<_>>(),
            "saved": result.saved.iter().map(|id| id.to_serialized()).collect::<Vec<_>>(),
            "copies": result
                .copies
                .iter()
                .map(|(origin, copy)| json!({"origin": origin.to_serialized(), "copy": copy.to_serialized()}))
                .collect::<Vec<_>>(),
            "depth": result.depth,
        }))
    }

    fn format_events(&self, events: &[PersistEvent]) -> String {
        pretty(&serde_json::Value::Array(
            events
                .iter()
                .map(|event| {
                    json!({
                        "phase": format!("{:?}", event.phase).to_lowercase(),
                        "record_type": event.record_type,
                        "id": event.id.as_ref().map(|id| id.to_json()),
                        "update": event.had_original,
                    })
                })
                .collect(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dcgen_proto::RecordId;

    fn node(id: i64, level: usize, expanded: bool, children: Vec<TreeNode>) -> TreeNode {
        let mut record = Record::new("tl_page").with_id(id).with("title", format!("p{}", id));
        record.meta.tree_level = level;
        record.meta.is_expanded = expanded;
        record.meta.has_children = !children.is_empty() || !expanded;
        TreeNode { record, children }
    }

    #[test]
    fn test_tree_indentation() {
        let tree = vec![node(1, 0, true, vec![node(2, 1, false, vec![])])];
        let output = TableFormatter.format_tree(&tree);
        assert_eq!(output, "- tl_page::1\n  + tl_page::2");
    }

    #[test]
    fn test_records_table_has_property_columns() {
        let records = vec![
            Record::new("tl_page").with_id(1).with("sorting", 128),
            Record::new("tl_page").with_id(2).with("title", "About"),
        ];
        let output = TableFormatter.format_records(&records);
        assert!(output.contains("sorting"));
        assert!(output.contains("title"));
        assert!(output.contains("About"));
        assert_eq!(TableFormatter.format_records(&[]), "No records");
    }

    #[test]
    fn test_paste_json() {
        let result = PasteResult {
            pasted: vec![RecordId::new("tl_page", 5)],
            saved: vec![RecordId::new("tl_page", 5), RecordId::new("tl_page", 2)],
            copies: vec![(RecordId::new("tl_page", 1), RecordId::new("tl_page", 5))],
            depth: 0,
        };
        let value: serde_json::Value = serde_json::from_str(&JsonFormatter.format_paste(&result)).unwrap();
        assert_eq!(value["pasted"][0], "tl_page::5");
        assert_eq!(value["copies"][0]["origin"], "tl_page::1");
        assert_eq!(value["saved"].as_array().map(Vec::len), Some(2));
    }
}
