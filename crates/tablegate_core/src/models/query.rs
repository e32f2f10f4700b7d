//! Request and result models for row reads.

use serde::{Deserialize, Serialize, Serializer};
use std::str::FromStr;

use crate::error::TableGateError;

/// One row: column name to JSON value.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Autocomplete value meaning "no filtering".
pub const MATCH_ALL: &str = "*";

/// Comparison operator of a filter entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterCriterion {
    /// `field = value`
    Eq,
    /// `field LIKE 'value%'`
    StartsWith,
    /// `field LIKE '%value'`
    EndsWith,
    /// `field > value`
    Gt,
    /// `field < value`
    Lt,
    /// `field <= value`
    Lte,
    /// `field >= value`
    Gte,
    /// `field LIKE '%value%'`
    Contains,
    /// `field NOT LIKE '%value%'`
    IContains,
}

impl FilterCriterion {
    /// Wire name of the criterion.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::StartsWith => "startswith",
            Self::EndsWith => "endswith",
            Self::Gt => "gt",
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::Gte => "gte",
            Self::Contains => "contains",
            Self::IContains => "icontains",
        }
    }
}

impl FromStr for FilterCriterion {
    type Err = TableGateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "eq" => Ok(Self::Eq),
            "startswith" => Ok(Self::StartsWith),
            "endswith" => Ok(Self::EndsWith),
            "gt" => Ok(Self::Gt),
            "lt" => Ok(Self::Lt),
            "lte" => Ok(Self::Lte),
            "gte" => Ok(Self::Gte),
            "contains" => Ok(Self::Contains),
            "icontains" => Ok(Self::IContains),
            other => {
                Err(TableGateError::invalid_request(format!("Unknown filter criterion: {other}")))
            }
        }
    }
}

/// One filter condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterEntry {
    /// Column to compare.
    pub field: String,
    /// Comparison operator.
    pub criterion: FilterCriterion,
    /// Value to compare against.
    pub value: serde_json::Value,
}

impl FilterEntry {
    /// Create a filter entry.
    pub fn new(
        field: impl Into<String>,
        criterion: FilterCriterion,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        Self { field: field.into(), criterion, value: value.into() }
    }
}

/// Prefix search across a set of fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutocompleteSpec {
    /// Fields matched by prefix.
    pub fields: Vec<String>,
    /// Prefix to match, or `"*"` for everything.
    pub value: String,
}

impl AutocompleteSpec {
    /// Create an autocomplete request.
    pub fn new(fields: Vec<String>, value: impl Into<String>) -> Self {
        Self { fields, value: value.into() }
    }

    /// Whether the request selects autocomplete mode.
    pub fn is_active(&self) -> bool {
        !self.fields.is_empty() && !self.value.is_empty()
    }

    /// Whether the request asks for unfiltered rows.
    pub fn matches_all(&self) -> bool {
        self.value == MATCH_ALL
    }
}

/// Parameters of a row listing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowsQuery {
    /// 1-based page number.
    pub page: Option<i64>,
    /// Explicit page size override.
    pub per_page: Option<i64>,
    /// Free-text search term.
    pub search: Option<String>,
    /// AND-combined filters.
    pub filters: Vec<FilterEntry>,
    /// Autocomplete request (overrides everything else when active).
    pub autocomplete: Option<AutocompleteSpec>,
}

impl RowsQuery {
    /// Create an empty listing request.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the page number.
    pub fn page(mut self, page: i64) -> Self {
        self.page = Some(page);
        self
    }

    /// Set the page size.
    pub fn per_page(mut self, per_page: i64) -> Self {
        self.per_page = Some(per_page);
        self
    }

    /// Set the search term.
    pub fn search(mut self, term: impl Into<String>) -> Self {
        self.search = Some(term.into());
        self
    }

    /// Add a filter.
    pub fn filter(mut self, entry: FilterEntry) -> Self {
        self.filters.push(entry);
        self
    }

    /// Set the autocomplete request.
    pub fn autocomplete(mut self, spec: AutocompleteSpec) -> Self {
        self.autocomplete = Some(spec);
        self
    }
}

/// Pagination metadata of a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    /// Rows matching the filters.
    pub total: u64,
    /// Last page number.
    pub last_page: u64,
    /// Page size used.
    pub per_page: u64,
    /// Page returned.
    pub current_page: u64,
}

impl Pagination {
    /// Compute pagination for `total` rows.
    pub fn new(total: u64, per_page: u64, current_page: u64) -> Self {
        let last_page = if per_page == 0 { 0 } else { total.div_ceil(per_page) };
        Self { total, last_page, per_page, current_page }
    }
}

/// Rows returned by a listing.
///
/// Autocomplete results carry no pagination and serialize it as `{}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowsResult {
    /// Returned rows.
    pub data: Vec<Row>,
    /// Pagination metadata.
    #[serde(serialize_with = "serialize_pagination")]
    pub pagination: Option<Pagination>,
}

fn serialize_pagination<S: Serializer>(
    pagination: &Option<Pagination>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match pagination {
        Some(pagination) => pagination.serialize(serializer),
        None => Row::new().serialize(serializer),
    }
}
