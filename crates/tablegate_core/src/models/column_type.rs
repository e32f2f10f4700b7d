//! Parser for MySQL `enum(...)` and `set(...)` column type strings.
//!
//! Grammar:
//!
//! ```text
//! column_type := ("enum(" | "set(") literal ("," literal)* ")"
//! literal     := "'" (char | "''")* "'"
//! ```
//!
//! The catalog doubles embedded single quotes, so `''` inside a literal is
//! read back as one quote.

/// Which list-valued type a column declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListKind {
    /// `enum('a','b')`
    Enum,
    /// `set('a','b')`
    Set,
}

impl ListKind {
    /// Map a declared type keyword to a list kind.
    pub fn from_data_type(data_type: &str) -> Option<Self> {
        match data_type.to_ascii_lowercase().as_str() {
            "enum" => Some(Self::Enum),
            "set" => Some(Self::Set),
            _ => None,
        }
    }

    fn prefix(&self) -> &'static str {
        match self {
            Self::Enum => "enum(",
            Self::Set => "set(",
        }
    }
}

/// Extract the literal values from an enum or set column type.
///
/// Returns `None` when the string does not follow the grammar.
pub fn parse_list_values(kind: ListKind, column_type: &str) -> Option<Vec<String>> {
    let prefix = kind.prefix();
    if !column_type.get(..prefix.len())?.eq_ignore_ascii_case(prefix) {
        return None;
    }

    let mut chars = column_type[prefix.len()..].chars().peekable();
    let mut values = Vec::new();

    loop {
        if chars.next()? != '\'' {
            return None;
        }

        let mut literal = String::new();
        loop {
            match chars.next()? {
                '\'' if chars.peek() == Some(&'\'') => {
                    chars.next();
                    literal.push('\'');
                }
                '\'' => break,
                c => literal.push(c),
            }
        }
        values.push(literal);

        match chars.next()? {
            ',' => continue,
            ')' => break,
            _ => return None,
        }
    }

    if chars.next().is_some() {
        return None;
    }
    Some(values)
}
