//! Patient-scoped table extracts and their deterministic text form.

use crate::collaborators::ResultSet;
use serde_json::Value;
use summary_types::Identifier;

/// The rows of one table that belong to one patient.
///
/// Columns keep the order the warehouse declared them in and rows keep extraction order, so
/// serialising an extract twice always yields the same text.
#[derive(Clone, Debug, PartialEq)]
pub struct TableExtract {
    pub database: Identifier,
    pub table: Identifier,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl TableExtract {
    pub fn from_result_set(database: Identifier, table: Identifier, set: ResultSet) -> Self {
        Self {
            database,
            table,
            columns: set.columns,
            rows: set.rows,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Render row `index` as a single line: `- col_a: value; col_b: value`.
    ///
    /// Null cells are left out. Strings are written without quotes, other values in compact
    /// JSON.
    pub fn serialize_row(&self, index: usize) -> Option<String> {
        let row = self.rows.get(index)?;
        let cells: Vec<String> = self
            .columns
            .iter()
            .zip(row.iter())
            .filter(|(_, value)| !value.is_null())
            .map(|(column, value)| format!("{column}: {}", render_value(value)))
            .collect();
        Some(format!("- {}", cells.join("; ")))
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.replace('\n', " "),
        other => other.to_string(),
    }
}
