//! Cross-checks of table settings against the live structure.

use crate::models::{ColumnInfo, TableSettings};

/// Reports every way `settings` disagrees with `structure`.
pub trait SettingsValidator: Send + Sync {
    /// Return one human-readable violation per problem; empty means valid.
    fn validate(&self, structure: &[ColumnInfo], settings: &TableSettings) -> Vec<String>;
}

/// Checks that every field named by the settings exists in the table.
#[derive(Debug, Default, Clone, Copy)]
pub struct FieldSettingsValidator;

impl SettingsValidator for FieldSettingsValidator {
    fn validate(&self, structure: &[ColumnInfo], settings: &TableSettings) -> Vec<String> {
        let exists = |field: &str| structure.iter().any(|c| c.column_name == field);

        let named = [
            ("list_fields", &settings.list_fields),
            ("excluded_fields", &settings.excluded_fields),
            ("search_fields", &settings.search_fields),
        ];

        let mut violations: Vec<String> = named
            .iter()
            .flat_map(|(setting, fields)| fields.iter().map(move |field| (*setting, field)))
            .filter(|(_, field)| !exists(field))
            .map(|(setting, field)| format!("There is no field \"{field}\" in {setting}"))
            .collect();

        if let Some(field) = settings.ordering_field.as_deref() {
            if !exists(field) {
                violations.push(format!("There is no field \"{field}\" in ordering_field"));
            }
        }

        if settings.list_per_page == Some(0) {
            violations.push("list_per_page must be greater than zero".to_string());
        }

        violations
    }
}
