//! Row listing, counting and key lookups.

use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;

use crate::config::EngineConfig;
use crate::error::{Result, TableGateError};
use crate::helpers::quote_identifier;
use crate::models::{FilterEntry, Pagination, Row, RowsQuery, RowsResult, TableSettings};
use crate::services::criteria::{Comparison, CriteriaCompiler, Predicate, SelectPlan};
use crate::services::driver::Driver;
use crate::services::schema::SchemaIntrospector;

/// Reads rows from one table through a driver.
pub struct RowReader {
    driver: Arc<dyn Driver>,
    schema: SchemaIntrospector,
    compiler: CriteriaCompiler,
    config: EngineConfig,
}

impl RowReader {
    pub fn new(
        driver: Arc<dyn Driver>,
        database: impl Into<String>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            schema: SchemaIntrospector::new(Arc::clone(&driver), database),
            driver,
            compiler: CriteriaCompiler::new(config.autocomplete_row_limit),
            config: config.clone(),
        }
    }

    /// List rows with pagination, or run an autocomplete lookup.
    ///
    /// An active autocomplete request short-circuits everything else and the
    /// result carries no pagination.
    pub async fn get_rows(
        &self,
        table: &str,
        settings: &TableSettings,
        query: &RowsQuery,
    ) -> Result<RowsResult> {
        let start = Instant::now();

        if let Some(spec) = query.autocomplete.as_ref().filter(|spec| spec.is_active()) {
            let (sql, params) = self.compiler.compile_autocomplete(table, spec).to_sql();
            let data = self.driver.query(&sql, &params).await?;
            tracing::debug!(
                table,
                row_count = data.len(),
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Autocomplete rows loaded"
            );
            return Ok(RowsResult { data, pagination: None });
        }

        let (page, per_page) = self.resolve_page(settings, query);

        let structure = self.schema.get_structure(table).await?;
        let projection = CriteriaCompiler::resolve_projection(Some(settings), &structure);
        let plan = self.compiler.compile_listing(
            table,
            projection,
            settings,
            &query.filters,
            query.search.as_deref(),
        );

        let total = self.count(&plan).await?;
        let pagination = Pagination::new(total, per_page, page);

        let (sql, params) = plan.paginate(per_page, page_offset(page, per_page)).to_sql();
        let data = self.driver.query(&sql, &params).await?;

        tracing::debug!(
            table,
            page,
            per_page,
            total,
            row_count = data.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Rows loaded"
        );

        Ok(RowsResult { data, pagination: Some(pagination) })
    }

    /// Count rows matching the filters and search term.
    pub async fn count_rows(
        &self,
        table: &str,
        settings: &TableSettings,
        search: Option<&str>,
        filters: &[FilterEntry],
    ) -> Result<u64> {
        let plan = SelectPlan::new(table, Vec::new())
            .with_predicate(CriteriaCompiler::listing_predicate(settings, filters, search));
        self.count(&plan).await
    }

    /// Rows whose primary-key columns equal every supplied value.
    pub async fn get_row_by_primary_key(
        &self,
        table: &str,
        primary_key: &Row,
        settings: Option<&TableSettings>,
    ) -> Result<Vec<Row>> {
        let predicate = key_predicate(primary_key)?;

        let structure = self.schema.get_structure(table).await?;
        let projection = CriteriaCompiler::resolve_projection(settings, &structure);

        let (sql, params) =
            SelectPlan::new(table, projection).with_predicate(Some(predicate)).to_sql();
        self.driver.query(&sql, &params).await
    }

    /// Referenced and identity column values for rows whose
    /// `referenced_column` is one of `values`.
    pub async fn get_identity_columns(
        &self,
        table: &str,
        referenced_column: &str,
        identity_column: Option<&str>,
        values: &[Value],
    ) -> Result<Vec<Row>> {
        if values.is_empty() {
            return Ok(Vec::new());
        }

        let mut fields = vec![referenced_column.to_string()];
        if let Some(identity) = identity_column.filter(|c| *c != referenced_column) {
            fields.push(identity.to_string());
        }

        let predicate =
            Predicate::In { field: referenced_column.to_string(), values: values.to_vec() };
        let (sql, params) = SelectPlan::new(table, fields).with_predicate(Some(predicate)).to_sql();
        self.driver.query(&sql, &params).await
    }

    /// Page and page size after defaults.
    ///
    /// A missing or non-positive page resets to the default page. An explicit
    /// positive page size wins, then `list_per_page`, then the default.
    pub fn resolve_page(&self, settings: &TableSettings, query: &RowsQuery) -> (u64, u64) {
        let page = query
            .page
            .filter(|p| *p > 0)
            .map_or(self.config.default_page, |p| p as u64);

        let per_page = query
            .per_page
            .filter(|p| *p > 0)
            .map(|p| p as u64)
            .or_else(|| settings.list_per_page.filter(|p| *p > 0).map(u64::from))
            .unwrap_or(self.config.default_per_page);

        (page, per_page)
    }

    async fn count(&self, plan: &SelectPlan) -> Result<u64> {
        let (sql, params) = plan.to_count_sql();
        let rows = self.driver.query(&sql, &params).await?;

        let value = rows.first().and_then(|row| row.get("count")).ok_or_else(|| {
            TableGateError::internal(format!(
                "Count query on {} returned no value",
                quote_identifier(&plan.table)
            ))
        })?;

        let count = match value {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        };
        count.ok_or_else(|| {
            TableGateError::internal(format!("Unexpected row count value: {value}"))
        })
    }
}

/// Rows skipped before `page`. Pages past the addressable range clamp to
/// the largest offset and return no rows.
fn page_offset(page: u64, per_page: u64) -> u64 {
    page.saturating_sub(1).checked_mul(per_page).unwrap_or(u64::MAX)
}

/// AND of exact matches over every key column. Empty keys are rejected.
pub(crate) fn key_predicate(primary_key: &Row) -> Result<Predicate> {
    let predicates = primary_key
        .iter()
        .map(|(field, value)| Predicate::Compare {
            field: field.clone(),
            op: Comparison::Eq,
            value: value.clone(),
        })
        .collect();

    Predicate::all(predicates)
        .ok_or_else(|| TableGateError::invalid_request("Primary key values are required"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AutocompleteSpec, FilterCriterion, OrderDirection};
    use crate::services::schema::COLUMNS_QUERY;
    use crate::test_support::{catalog_column, row, MockDriver};
    use serde_json::json;

    fn users_driver() -> MockDriver {
        let driver = MockDriver::new();
        driver.respond(
            COLUMNS_QUERY,
            vec![
                catalog_column("id", "int", "int", false, "auto_increment"),
                catalog_column("name", "varchar", "varchar(45)", false, ""),
                catalog_column("password", "varchar", "varchar(64)", false, ""),
            ],
        );
        driver
    }

    fn reader(driver: &MockDriver) -> RowReader {
        RowReader::new(Arc::new(driver.clone()), "shop", &EngineConfig::default())
    }

    #[test]
    fn page_defaults() {
        let driver = MockDriver::new();
        let reader = reader(&driver);
        let settings = TableSettings { list_per_page: Some(50), ..Default::default() };

        assert_eq!(reader.resolve_page(&TableSettings::default(), &RowsQuery::new()), (1, 20));
        assert_eq!(reader.resolve_page(&settings, &RowsQuery::new().page(0)), (1, 50));
        assert_eq!(reader.resolve_page(&settings, &RowsQuery::new().page(-3)), (1, 50));
        assert_eq!(reader.resolve_page(&settings, &RowsQuery::new().page(2).per_page(10)), (2, 10));
        assert_eq!(reader.resolve_page(&settings, &RowsQuery::new().per_page(0)), (1, 50));

        let zero = TableSettings { list_per_page: Some(0), ..Default::default() };
        assert_eq!(reader.resolve_page(&zero, &RowsQuery::new()), (1, 20));
    }

    #[tokio::test]
    async fn page_far_past_the_end_returns_no_rows() {
        let driver = users_driver();
        driver.respond("COUNT(*)", vec![row(json!({"count": 25}))]);

        let query = RowsQuery::new().page(i64::MAX).per_page(10);
        let result =
            reader(&driver).get_rows("users", &TableSettings::default(), &query).await.unwrap();

        assert!(result.data.is_empty());
        assert_eq!(result.pagination.unwrap().current_page, i64::MAX as u64);
        let select = &driver.calls_matching("LIMIT")[0];
        assert!(select.sql.ends_with(&format!("LIMIT 10 OFFSET {}", u64::MAX)));
    }

    #[test]
    fn offset_clamps_instead_of_overflowing() {
        assert_eq!(page_offset(1, 20), 0);
        assert_eq!(page_offset(3, 10), 20);
        assert_eq!(page_offset(i64::MAX as u64, 10), u64::MAX);
    }

    #[tokio::test]
    async fn listing_counts_then_selects_page() {
        let driver = users_driver();
        driver.respond("COUNT(*)", vec![row(json!({"count": 25}))]);
        driver.respond("SELECT `id`, `name`", vec![row(json!({"id": 21, "name": "u21"}))]);

        let settings = TableSettings {
            excluded_fields: vec!["password".into()],
            search_fields: vec!["name".into()],
            ordering_field: Some("id".into()),
            ordering: Some(OrderDirection::Asc),
            ..Default::default()
        };
        let query = RowsQuery::new()
            .page(3)
            .per_page(10)
            .search("u21")
            .filter(FilterEntry::new("id", FilterCriterion::Gt, 0));

        let result = reader(&driver).get_rows("users", &settings, &query).await.unwrap();

        assert_eq!(result.pagination, Some(Pagination::new(25, 10, 3)));
        assert_eq!(result.pagination.unwrap().last_page, 3);
        assert_eq!(result.data.len(), 1);

        let count = &driver.calls_matching("COUNT(*)")[0];
        assert_eq!(
            count.sql,
            "SELECT COUNT(*) AS count FROM `users` WHERE (`id` > ? AND CAST(`name` AS CHAR(255)) = ?)"
        );
        let select = &driver.calls_matching("SELECT `id`, `name`")[0];
        assert!(select.sql.ends_with("ORDER BY `id` ASC LIMIT 10 OFFSET 20"));
        assert_eq!(select.params, vec![json!(0), json!("u21")]);
    }

    #[tokio::test]
    async fn autocomplete_skips_count_and_pagination() {
        let driver = users_driver();
        driver.respond("LIKE", vec![row(json!({"name": "ann"}))]);

        let query = RowsQuery::new()
            .page(4)
            .autocomplete(AutocompleteSpec::new(vec!["name".into()], "an"));
        let result =
            reader(&driver).get_rows("users", &TableSettings::default(), &query).await.unwrap();

        assert_eq!(result.pagination, None);
        assert_eq!(result.data.len(), 1);
        assert!(driver.calls_matching("COUNT(*)").is_empty());
        assert!(driver.calls_matching("information_schema").is_empty());
    }

    #[tokio::test]
    async fn count_rows_accepts_string_counts() {
        let driver = MockDriver::new();
        driver.respond("COUNT(*)", vec![row(json!({"count": "7"}))]);

        let total = reader(&driver)
            .count_rows("users", &TableSettings::default(), None, &[])
            .await
            .unwrap();
        assert_eq!(total, 7);
    }

    #[tokio::test]
    async fn count_without_value_is_internal_error() {
        let driver = MockDriver::new();
        let err = reader(&driver)
            .count_rows("users", &TableSettings::default(), None, &[])
            .await
            .unwrap_err();
        assert!(matches!(err, TableGateError::Internal { .. }));
    }

    #[tokio::test]
    async fn primary_key_lookup_matches_every_key() {
        let driver = users_driver();
        let key = row(json!({"id": 5}));

        reader(&driver).get_row_by_primary_key("users", &key, None).await.unwrap();

        let call = &driver.calls_matching("FROM `users`")[0];
        assert_eq!(call.sql, "SELECT `id`, `name`, `password` FROM `users` WHERE `id` = ?");
        assert_eq!(call.params, vec![json!(5)]);
    }

    #[tokio::test]
    async fn empty_primary_key_is_rejected() {
        let driver = users_driver();
        let err = reader(&driver)
            .get_row_by_primary_key("users", &Row::new(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, TableGateError::InvalidRequest { .. }));
        assert!(driver.calls().is_empty());
    }

    #[tokio::test]
    async fn identity_columns() {
        let driver = MockDriver::new();
        let reader = reader(&driver);

        let rows = reader.get_identity_columns("users", "id", Some("name"), &[]).await.unwrap();
        assert!(rows.is_empty());
        assert!(driver.calls().is_empty());

        reader
            .get_identity_columns("users", "id", Some("name"), &[json!(1), json!(2)])
            .await
            .unwrap();
        let call = &driver.calls()[0];
        assert_eq!(call.sql, "SELECT `id`, `name` FROM `users` WHERE `id` IN (?, ?)");
        assert_eq!(call.params, vec![json!(1), json!(2)]);
    }
}
