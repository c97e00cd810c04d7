//! Board, column and item shapes as they come off the wire, plus the
//! enriched `Task` the rest of the crate works with.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Column type reported when an item's column id has no schema entry.
pub const UNKNOWN_COLUMN_TYPE: &str = "unknown";

/// Board lifecycle state. Anything unrecognised lands in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoardState {
    Active,
    AllUsers,
    Archived,
    Deleted,
    #[serde(other)]
    Other,
}

impl BoardState {
    /// Only these boards take part in aggregation.
    pub fn is_active(&self) -> bool {
        matches!(self, BoardState::Active | BoardState::AllUsers)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub column_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Board {
    pub id: String,
    pub name: String,
    pub state: BoardState,
    #[serde(default)]
    pub board_kind: Option<String>,
    #[serde(default)]
    pub columns: Vec<ColumnDef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawColumnValue {
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    /// JSON-encoded payload, e.g. `{"date":"2026-03-01"}` for date columns.
    #[serde(default)]
    pub value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawItem {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub column_values: Vec<RawColumnValue>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

/// A board's schema and a page of its items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardWithItems {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub columns: Vec<ColumnDef>,
    #[serde(default)]
    pub items: Vec<RawItem>,
}

impl BoardWithItems {
    /// Flatten items into tasks, enriching each column value against this
    /// board's own schema.
    pub fn into_tasks(self) -> Vec<Task> {
        let BoardWithItems {
            id,
            name,
            columns,
            items,
        } = self;
        items
            .into_iter()
            .map(|item| Task {
                column_values: enrich_column_values(&columns, item.column_values),
                id: item.id,
                name: item.name,
                state: item.state,
                board_id: id.clone(),
                board_name: name.clone(),
                created_at: item.created_at,
                updated_at: item.updated_at,
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedColumnValue {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub text: Option<String>,
    pub value: Option<String>,
    pub title: String,
    pub column_type: String,
}

impl EnrichedColumnValue {
    /// Upstream value type, falling back to the schema type.
    pub fn type_name(&self) -> &str {
        self.kind.as_deref().unwrap_or(&self.column_type)
    }

    /// Trimmed text, `None` when missing or blank.
    pub fn non_empty_text(&self) -> Option<&str> {
        self.text
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}

/// An item flattened out of its board, with enriched column values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub state: Option<String>,
    pub board_id: String,
    pub board_name: String,
    pub column_values: Vec<EnrichedColumnValue>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatedItem {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemUpdate {
    pub id: String,
    #[serde(default)]
    pub body: Option<String>,
}

/// Join raw column values with the board schema by column id.
///
/// Never fails: a value with no matching column keeps its id as the title and
/// gets `"unknown"` as its column type.
pub fn enrich_column_values(
    columns: &[ColumnDef],
    values: Vec<RawColumnValue>,
) -> Vec<EnrichedColumnValue> {
    let by_id: HashMap<&str, &ColumnDef> =
        columns.iter().map(|c| (c.id.as_str(), c)).collect();

    values
        .into_iter()
        .map(|raw| {
            let (title, column_type) = match by_id.get(raw.id.as_str()) {
                Some(col) => (col.title.clone(), col.column_type.clone()),
                None => (raw.id.clone(), UNKNOWN_COLUMN_TYPE.to_string()),
            };
            EnrichedColumnValue {
                id: raw.id,
                kind: raw.kind,
                text: raw.text,
                value: raw.value,
                title,
                column_type,
            }
        })
        .collect()
}
