//! Translation of declarative listing requests into SQL.
//!
//! Filters, search terms and autocomplete requests compile into a
//! [`Predicate`] tree. A [`SelectPlan`] attaches that tree to a projected,
//! ordered and limited `SELECT` and renders it with `?` placeholders, so
//! values never enter the SQL text.

use serde_json::Value;

use crate::helpers::{quote_identifier, value_as_text};
use crate::models::{
    AutocompleteSpec, ColumnInfo, FilterCriterion, FilterEntry, OrderDirection, TableSettings,
};

/// Binary comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Gt,
    Lt,
    Gte,
    Lte,
}

impl Comparison {
    fn as_sql(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Gt => ">",
            Self::Lt => "<",
            Self::Gte => ">=",
            Self::Lte => "<=",
        }
    }
}

/// A WHERE-clause fragment.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// `field <op> ?`
    Compare { field: String, op: Comparison, value: Value },
    /// `field [NOT] LIKE ?`
    Like { field: String, pattern: String, negated: bool },
    /// `CAST(field AS CHAR(255)) = ?`
    TextEquals { field: String, term: String },
    /// `field IN (?, ...)`
    In { field: String, values: Vec<Value> },
    /// Conjunction.
    And(Vec<Predicate>),
    /// Disjunction.
    Or(Vec<Predicate>),
}

impl Predicate {
    /// Predicate for one filter entry.
    ///
    /// `icontains` compiles to `NOT LIKE '%v%'`.
    pub fn from_filter(entry: &FilterEntry) -> Self {
        let field = entry.field.clone();
        let compare = |op| Self::Compare { field: field.clone(), op, value: entry.value.clone() };
        let like = |pattern: String, negated| Self::Like { field: field.clone(), pattern, negated };
        let text = value_as_text(&entry.value);

        match entry.criterion {
            FilterCriterion::Eq => compare(Comparison::Eq),
            FilterCriterion::Gt => compare(Comparison::Gt),
            FilterCriterion::Lt => compare(Comparison::Lt),
            FilterCriterion::Gte => compare(Comparison::Gte),
            FilterCriterion::Lte => compare(Comparison::Lte),
            FilterCriterion::StartsWith => like(format!("{text}%"), false),
            FilterCriterion::EndsWith => like(format!("%{text}"), false),
            FilterCriterion::Contains => like(format!("%{text}%"), false),
            FilterCriterion::IContains => like(format!("%{text}%"), true),
        }
    }

    /// Combine with AND. Empty input gives `None`, one item is returned as is.
    pub fn all(mut predicates: Vec<Predicate>) -> Option<Self> {
        match predicates.len() {
            0 => None,
            1 => predicates.pop(),
            _ => Some(Self::And(predicates)),
        }
    }

    /// Combine with OR. Empty input gives `None`, one item is returned as is.
    pub fn any(mut predicates: Vec<Predicate>) -> Option<Self> {
        match predicates.len() {
            0 => None,
            1 => predicates.pop(),
            _ => Some(Self::Or(predicates)),
        }
    }

    /// Append the SQL for this predicate and collect its parameters.
    pub fn render(&self, sql: &mut String, params: &mut Vec<Value>) {
        match self {
            Self::Compare { field, op, value } => {
                sql.push_str(&format!("{} {} ?", quote_identifier(field), op.as_sql()));
                params.push(value.clone());
            }
            Self::Like { field, pattern, negated } => {
                let op = if *negated { "NOT LIKE" } else { "LIKE" };
                sql.push_str(&format!("{} {op} ?", quote_identifier(field)));
                params.push(Value::from(pattern.as_str()));
            }
            Self::TextEquals { field, term } => {
                sql.push_str(&format!("CAST({} AS CHAR(255)) = ?", quote_identifier(field)));
                params.push(Value::from(term.as_str()));
            }
            Self::In { field, values } => {
                if values.is_empty() {
                    sql.push_str("1 = 0");
                    return;
                }
                let placeholders = vec!["?"; values.len()].join(", ");
                sql.push_str(&format!("{} IN ({placeholders})", quote_identifier(field)));
                params.extend(values.iter().cloned());
            }
            Self::And(items) => render_group(items, " AND ", "1 = 1", sql, params),
            Self::Or(items) => render_group(items, " OR ", "1 = 0", sql, params),
        }
    }
}

fn render_group(
    items: &[Predicate],
    separator: &str,
    empty: &str,
    sql: &mut String,
    params: &mut Vec<Value>,
) {
    if items.is_empty() {
        sql.push_str(empty);
        return;
    }
    sql.push('(');
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            sql.push_str(separator);
        }
        item.render(sql, params);
    }
    sql.push(')');
}

/// A single-table SELECT ready to render.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectPlan {
    pub table: String,
    /// Projected columns; empty selects `*`.
    pub fields: Vec<String>,
    pub predicate: Option<Predicate>,
    pub order_by: Option<(String, OrderDirection)>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl SelectPlan {
    /// Select `fields` from `table` with no conditions.
    pub fn new(table: impl Into<String>, fields: Vec<String>) -> Self {
        Self {
            table: table.into(),
            fields,
            predicate: None,
            order_by: None,
            limit: None,
            offset: None,
        }
    }

    pub fn with_predicate(mut self, predicate: Option<Predicate>) -> Self {
        self.predicate = predicate;
        self
    }

    pub fn with_order_by(mut self, field: impl Into<String>, direction: OrderDirection) -> Self {
        self.order_by = Some((field.into(), direction));
        self
    }

    /// Apply LIMIT/OFFSET.
    pub fn paginate(mut self, limit: u64, offset: u64) -> Self {
        self.limit = Some(limit);
        self.offset = Some(offset);
        self
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Render the row query.
    pub fn to_sql(&self) -> (String, Vec<Value>) {
        let projection = if self.fields.is_empty() {
            "*".to_string()
        } else {
            self.fields.iter().map(|f| quote_identifier(f)).collect::<Vec<_>>().join(", ")
        };

        let mut sql = format!("SELECT {projection} FROM {}", quote_identifier(&self.table));
        let mut params = Vec::new();
        self.render_where(&mut sql, &mut params);

        if let Some((field, direction)) = &self.order_by {
            sql.push_str(&format!(" ORDER BY {} {}", quote_identifier(field), direction.as_sql()));
        }
        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        if let Some(offset) = self.offset {
            sql.push_str(&format!(" OFFSET {offset}"));
        }

        (sql, params)
    }

    /// Render `SELECT COUNT(*)` under the same predicate, ignoring projection,
    /// ordering and pagination.
    pub fn to_count_sql(&self) -> (String, Vec<Value>) {
        let mut sql = format!("SELECT COUNT(*) AS count FROM {}", quote_identifier(&self.table));
        let mut params = Vec::new();
        self.render_where(&mut sql, &mut params);
        (sql, params)
    }

    fn render_where(&self, sql: &mut String, params: &mut Vec<Value>) {
        if let Some(predicate) = &self.predicate {
            sql.push_str(" WHERE ");
            predicate.render(sql, params);
        }
    }
}

/// Compiles listing requests against table settings.
#[derive(Debug, Clone, Copy)]
pub struct CriteriaCompiler {
    autocomplete_limit: u64,
}

impl CriteriaCompiler {
    /// Create a compiler that caps autocomplete results at `autocomplete_limit`.
    pub fn new(autocomplete_limit: u64) -> Self {
        Self { autocomplete_limit }
    }

    /// Columns to project for a listing.
    ///
    /// Starts from `list_fields` (or every column when empty) and drops every
    /// excluded field, keeping the base order.
    pub fn resolve_projection(
        settings: Option<&TableSettings>,
        columns: &[ColumnInfo],
    ) -> Vec<String> {
        let all_columns = || columns.iter().map(|c| c.column_name.clone()).collect::<Vec<_>>();

        let Some(settings) = settings.filter(|s| !s.is_empty()) else {
            return all_columns();
        };

        let base = if settings.list_fields.is_empty() {
            all_columns()
        } else {
            settings.list_fields.clone()
        };

        base.into_iter().filter(|field| !settings.excluded_fields.contains(field)).collect()
    }

    /// AND of every filter entry.
    pub fn filter_predicate(filters: &[FilterEntry]) -> Option<Predicate> {
        Predicate::all(filters.iter().map(Predicate::from_filter).collect())
    }

    /// OR of exact text matches across the configured search fields.
    pub fn search_predicate(settings: &TableSettings, term: Option<&str>) -> Option<Predicate> {
        let term = term.filter(|t| !t.is_empty())?;
        Predicate::any(
            settings
                .search_fields
                .iter()
                .map(|field| Predicate::TextEquals { field: field.clone(), term: term.to_string() })
                .collect(),
        )
    }

    /// Filters AND-ed with the search group.
    pub fn listing_predicate(
        settings: &TableSettings,
        filters: &[FilterEntry],
        search: Option<&str>,
    ) -> Option<Predicate> {
        let mut clauses = Vec::new();
        if let Some(filters) = Self::filter_predicate(filters) {
            match filters {
                Predicate::And(items) => clauses.extend(items),
                single => clauses.push(single),
            }
        }
        clauses.extend(Self::search_predicate(settings, search));
        Predicate::all(clauses)
    }

    /// OR of prefix matches across the autocomplete fields. `"*"` matches all.
    pub fn autocomplete_predicate(spec: &AutocompleteSpec) -> Option<Predicate> {
        if spec.matches_all() {
            return None;
        }
        Predicate::any(
            spec.fields
                .iter()
                .map(|field| Predicate::Like {
                    field: field.clone(),
                    pattern: format!("{}%", spec.value),
                    negated: false,
                })
                .collect(),
        )
    }

    /// Unpaginated listing plan; the reader applies LIMIT/OFFSET.
    pub fn compile_listing(
        &self,
        table: &str,
        projection: Vec<String>,
        settings: &TableSettings,
        filters: &[FilterEntry],
        search: Option<&str>,
    ) -> SelectPlan {
        let plan = SelectPlan::new(table, projection)
            .with_predicate(Self::listing_predicate(settings, filters, search));

        match settings.order_by() {
            Some((field, direction)) => plan.with_order_by(field, direction),
            None => plan,
        }
    }

    /// Autocomplete plan projecting the autocomplete fields, capped.
    pub fn compile_autocomplete(&self, table: &str, spec: &AutocompleteSpec) -> SelectPlan {
        SelectPlan::new(table, spec.fields.clone())
            .with_predicate(Self::autocomplete_predicate(spec))
            .with_limit(self.autocomplete_limit)
    }
}
