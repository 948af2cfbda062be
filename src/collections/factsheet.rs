//! Factsheets: shared source lists that cards are drawn from
//!
//! Content is YAML with a `columns` list and a `rows` list (or a mapping
//! whose values are rows). A row is identified by the URL-safe base64 of
//! its first cell, so renaming other cells keeps the card attached.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::BTreeMap;

use super::SourceCollection;
use crate::error::{CardboxError, Result};
use crate::types::RowId;

/// Field values of one row, keyed by column name
pub type Row = BTreeMap<String, String>;

/// A parsed factsheet
#[derive(Debug, Clone, PartialEq)]
pub struct Factsheet {
    pub name: String,
    pub modified: DateTime<Utc>,
    columns: Vec<String>,
    rows: BTreeMap<RowId, Row>,
    order: Vec<RowId>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RawContent {
    #[serde(default)]
    columns: Vec<String>,
    #[serde(default)]
    rows: Value,
}

/// Row id of a row whose first cell is `first_cell`
pub fn row_id_for(first_cell: &str) -> RowId {
    RowId(URL_SAFE_NO_PAD.encode(first_cell.as_bytes()))
}

impl Factsheet {
    /// An empty factsheet
    pub fn empty(name: impl Into<String>, modified: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            modified,
            columns: Vec::new(),
            rows: BTreeMap::new(),
            order: Vec::new(),
        }
    }

    /// Parse YAML content
    pub fn parse(name: impl Into<String>, content: &str, modified: DateTime<Utc>) -> Result<Self> {
        let name = name.into();
        if content.trim().is_empty() {
            return Ok(Self::empty(name, modified));
        }

        let raw: RawContent = serde_yaml::from_str(content)?;
        let rows = match raw.rows {
            Value::Null => Vec::new(),
            Value::Sequence(rows) => rows,
            Value::Mapping(rows) => rows.into_iter().map(|(_, row)| row).collect(),
            other => {
                return Err(CardboxError::InvalidCollection(format!(
                    "rows of '{}' must be a list, got {:?}",
                    name, other
                )))
            }
        };

        let mut cells = Vec::with_capacity(rows.len());
        for row in rows {
            let Value::Sequence(row) = row else {
                return Err(CardboxError::InvalidCollection(format!(
                    "incorrect row format in '{}'",
                    name
                )));
            };
            cells.push(row);
        }

        Self::build(name, raw.columns, cells, modified)
    }

    /// Build from already split text cells
    pub fn from_rows(
        name: impl Into<String>,
        columns: Vec<String>,
        rows: Vec<Vec<String>>,
        modified: DateTime<Utc>,
    ) -> Result<Self> {
        let rows = rows
            .into_iter()
            .map(|row| row.into_iter().map(Value::String).collect())
            .collect();
        Self::build(name.into(), columns, rows, modified)
    }

    fn build(
        name: String,
        columns: Vec<String>,
        rows: Vec<Vec<Value>>,
        modified: DateTime<Utc>,
    ) -> Result<Self> {
        let mut parsed = Self::empty(name, modified);

        for row in rows {
            let first = match row.first() {
                Some(Value::String(first)) => first.clone(),
                _ => {
                    return Err(CardboxError::InvalidCollection(format!(
                        "first cell of every row in '{}' must be text",
                        parsed.name
                    )))
                }
            };
            if row.len() != columns.len() {
                return Err(CardboxError::InvalidCollection(format!(
                    "row '{}' has {} cells, expected {}",
                    first,
                    row.len(),
                    columns.len()
                )));
            }

            let row_id = row_id_for(&first);
            if parsed.rows.contains_key(&row_id) {
                return Err(CardboxError::InvalidCollection(format!(
                    "row '{}' has the same first cell as an earlier row",
                    first
                )));
            }

            let values = columns
                .iter()
                .cloned()
                .zip(row.iter().map(cell_text))
                .collect();
            parsed.order.push(row_id.clone());
            parsed.rows.insert(row_id, values);
        }

        parsed.columns = columns;
        Ok(parsed)
    }

    /// Serialize back to the YAML content format
    pub fn to_yaml(&self) -> Result<String> {
        let rows: Vec<Vec<String>> = self
            .order
            .iter()
            .filter_map(|id| self.rows.get(id))
            .map(|row| {
                self.columns
                    .iter()
                    .map(|column| row.get(column).cloned().unwrap_or_default())
                    .collect()
            })
            .collect();

        let content = serde_yaml::to_string(&serde_json::json!({
            "columns": self.columns,
            "rows": rows,
        }))?;
        Ok(content)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl SourceCollection for Factsheet {
    fn row_ids(&self) -> Vec<RowId> {
        self.order.clone()
    }

    fn row(&self, id: &RowId) -> Option<&Row> {
        self.rows.get(id)
    }
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_default(),
    }
}
