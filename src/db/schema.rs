//! Structural schema snapshot.
//!
//! A snapshot describes tables and columns only; it never holds row data.

use serde::Serialize;
use std::collections::BTreeMap;

/// One column of a base table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    pub nullable: bool,
    pub max_length: Option<i32>,
}

impl ColumnDescriptor {
    /// Creates a column descriptor.
    pub fn new(
        name: impl Into<String>,
        data_type: impl Into<String>,
        nullable: bool,
        max_length: Option<i32>,
    ) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable,
            max_length,
        }
    }
}

/// Tables keyed by name, each with its columns in ordinal order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchemaSnapshot {
    tables: BTreeMap<String, Vec<ColumnDescriptor>>,
}

impl SchemaSnapshot {
    /// Creates an empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, for fixtures and mocks.
    pub fn with_table(mut self, name: impl Into<String>, columns: Vec<ColumnDescriptor>) -> Self {
        self.insert(name, columns);
        self
    }

    /// Adds or replaces a table.
    pub fn insert(&mut self, name: impl Into<String>, columns: Vec<ColumnDescriptor>) {
        self.tables.insert(name.into(), columns);
    }

    /// Columns of a table, if present.
    pub fn table(&self, name: &str) -> Option<&[ColumnDescriptor]> {
        self.tables.get(name).map(Vec::as_slice)
    }

    /// Table names in order.
    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    /// Tables in name order.
    pub fn tables(&self) -> impl Iterator<Item = (&str, &[ColumnDescriptor])> {
        self.tables
            .iter()
            .map(|(name, columns)| (name.as_str(), columns.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Total number of columns across all tables.
    pub fn column_count(&self) -> usize {
        self.tables.values().map(Vec::len).sum()
    }

    /// Formats the schema for inclusion in a model prompt.
    ///
    /// Each table is rendered as a compact header naming the descriptor
    /// fields, followed by one indented line per column:
    ///
    /// ```text
    /// EDC_BRAND[2]{name, type, nullable, max_length}:
    ///   BR_CODE, int, false, null
    ///   BR_DESC, varchar, true, 100
    /// ```
    ///
    /// With a `budget`, whole trailing tables are dropped so the text stays
    /// within that many characters, and a closing line reports how many were
    /// left out. A single table larger than the budget is still included.
    pub fn format_for_llm(&self, budget: Option<usize>) -> String {
        let blocks: Vec<String> = self
            .tables()
            .map(|(name, columns)| format_table(name, columns))
            .collect();

        let Some(budget) = budget else {
            return blocks.join("\n\n");
        };

        let mut text = String::new();
        let mut included = 0;
        for block in &blocks {
            let separator = if text.is_empty() { 0 } else { 2 };
            if included > 0 && text.len() + separator + block.len() > budget {
                break;
            }
            if separator > 0 {
                text.push_str("\n\n");
            }
            text.push_str(block);
            included += 1;
        }

        let omitted = blocks.len() - included;
        if omitted > 0 {
            text.push_str(&format!("\n\n({omitted} more tables omitted)"));
        }
        text
    }
}

fn format_table(name: &str, columns: &[ColumnDescriptor]) -> String {
    let mut block = format!(
        "{name}[{}]{{name, type, nullable, max_length}}:",
        columns.len()
    );
    for column in columns {
        let max_length = column
            .max_length
            .map(|len| len.to_string())
            .unwrap_or_else(|| "null".to_string());
        block.push_str(&format!(
            "\n  {}, {}, {}, {}",
            column.name, column.data_type, column.nullable, max_length
        ));
    }
    block
}
