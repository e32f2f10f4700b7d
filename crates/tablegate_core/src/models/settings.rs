//! Table display settings supplied by the caller.

use serde::{Deserialize, Serialize};

/// Sort direction for the ordering field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderDirection {
    /// Ascending
    Asc,
    /// Descending
    Desc,
}

impl OrderDirection {
    /// SQL keyword for this direction.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Per-table display settings. Read-only to the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableSettings {
    /// Columns to show in listings (empty = all columns)
    pub list_fields: Vec<String>,
    /// Columns never shown
    pub excluded_fields: Vec<String>,
    /// Columns matched by free-text search
    pub search_fields: Vec<String>,
    /// Column to order listings by
    pub ordering_field: Option<String>,
    /// Direction for `ordering_field`
    pub ordering: Option<OrderDirection>,
    /// Page size used when the caller gives none
    pub list_per_page: Option<u32>,
}

impl TableSettings {
    /// Whether no setting is present at all.
    pub fn is_empty(&self) -> bool {
        self.list_fields.is_empty()
            && self.excluded_fields.is_empty()
            && self.search_fields.is_empty()
            && self.ordering_field.is_none()
            && self.ordering.is_none()
            && self.list_per_page.is_none()
    }

    /// Ordering column and direction, when both are configured.
    pub fn order_by(&self) -> Option<(&str, OrderDirection)> {
        match (&self.ordering_field, self.ordering) {
            (Some(field), Some(direction)) if !field.is_empty() => {
                Some((field.as_str(), direction))
            }
            _ => None,
        }
    }
}
