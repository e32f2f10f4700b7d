//! Small row and string normalization helpers used by catalog parsing.

use crate::models::{Row, AUTO_INCREMENT};

/// Lower-case every key of a row. Later duplicates win.
pub fn lowercase_keys(row: Row) -> Row {
    row.into_iter().map(|(key, value)| (key.to_lowercase(), value)).collect()
}

/// Move the value under `from` to `to`. No-op when `from` is absent.
pub fn rename_key(row: &mut Row, from: &str, to: &str) {
    if let Some(value) = row.remove(from) {
        row.insert(to.to_string(), value);
    }
}

/// First run of ASCII digits in `s`, e.g. `varchar(45)` gives 45.
pub fn first_number(s: &str) -> Option<u64> {
    let start = s.find(|c: char| c.is_ascii_digit())?;
    let digits: String = s[start..].chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

/// Whether a catalog `EXTRA` value or column default marks a generated key.
pub fn is_auto_increment(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case(AUTO_INCREMENT)
}

/// Quote a MySQL identifier with backticks.
pub fn quote_identifier(identifier: &str) -> String {
    format!("`{}`", identifier.replace('`', "``"))
}

/// Render a JSON value as text for LIKE patterns and string comparison.
pub fn value_as_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}
