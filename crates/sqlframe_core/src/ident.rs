//! Quoting for identifiers, literals and function bodies.
//!
//! Every identifier that ends up in generated SQL goes through
//! [`quote_ident`], regardless of whether it would need quoting. This keeps
//! mixed case names and names colliding with reserved words intact.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Quote an identifier, doubling any embedded double quotes.
pub fn quote_ident(ident: &str) -> String {
    let mut s = String::with_capacity(ident.len() + 2);
    s.push('"');
    for c in ident.chars() {
        if c == '"' {
            s.push('"');
        }
        s.push(c);
    }
    s.push('"');
    s
}

/// Quote a string literal, doubling any embedded single quotes.
///
/// Only used where the backend doesn't accept bound parameters (DDL).
pub fn quote_literal(value: &str) -> String {
    let mut s = String::with_capacity(value.len() + 2);
    if value.contains('\\') {
        // Escape string syntax so backslashes are literal regardless of
        // `standard_conforming_strings`.
        s.push('E');
        s.push('\'');
        for c in value.chars() {
            match c {
                '\'' => s.push_str("''"),
                '\\' => s.push_str("\\\\"),
                c => s.push(c),
            }
        }
    } else {
        s.push('\'');
        for c in value.chars() {
            if c == '\'' {
                s.push('\'');
            }
            s.push(c);
        }
    }
    s.push('\'');
    s
}

/// Dollar quote a function body using a tag that doesn't occur in the body.
pub fn dollar_quote(body: &str) -> String {
    let mut tag = "$sqlframe$".to_string();
    let mut n = 0;
    while body.contains(&tag) {
        n += 1;
        tag = format!("$sqlframe_{n}$");
    }
    format!("{tag}{body}{tag}")
}

/// A possibly schema qualified relation, function or type name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QualifiedName {
    pub schema: Option<String>,
    pub name: String,
}

impl QualifiedName {
    pub fn new(schema: Option<impl Into<String>>, name: impl Into<String>) -> Self {
        QualifiedName {
            schema: schema.map(|s| s.into()),
            name: name.into(),
        }
    }

    pub fn bare(name: impl Into<String>) -> Self {
        QualifiedName {
            schema: None,
            name: name.into(),
        }
    }

    /// Returns this name with `schema` filled in if it had none.
    pub fn with_default_schema(&self, schema: &str) -> Self {
        QualifiedName {
            schema: Some(self.schema.clone().unwrap_or_else(|| schema.to_string())),
            name: self.name.clone(),
        }
    }
}

impl From<&str> for QualifiedName {
    fn from(value: &str) -> Self {
        QualifiedName::bare(value)
    }
}

impl From<String> for QualifiedName {
    fn from(value: String) -> Self {
        QualifiedName::bare(value)
    }
}

/// Displays the quoted form.
impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(schema) = &self.schema {
            write!(f, "{}.", quote_ident(schema))?;
        }
        write!(f, "{}", quote_ident(&self.name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_ident_cases() {
        assert_eq!("\"id\"", quote_ident("id"));
        assert_eq!("\"Select\"", quote_ident("Select"));
        assert_eq!("\"a\"\"b\"", quote_ident("a\"b"));
        assert_eq!("\"\"", quote_ident(""));
    }

    #[test]
    fn quote_literal_cases() {
        assert_eq!("'abc'", quote_literal("abc"));
        assert_eq!("'it''s'", quote_literal("it's"));
        assert_eq!("E'a\\\\b'", quote_literal("a\\b"));
    }

    #[test]
    fn dollar_quote_avoids_tag_in_body() {
        assert_eq!("$sqlframe$SELECT 1$sqlframe$", dollar_quote("SELECT 1"));

        let body = "SELECT '$sqlframe$'";
        let quoted = dollar_quote(body);
        assert_eq!("$sqlframe_1$SELECT '$sqlframe$'$sqlframe_1$", quoted);
    }

    #[test]
    fn qualified_name_display() {
        let name = QualifiedName::new(Some("pg_temp"), "fn_1");
        assert_eq!("\"pg_temp\".\"fn_1\"", name.to_string());
        assert_eq!("\"t\"", QualifiedName::bare("t").to_string());

        let filled = QualifiedName::bare("t").with_default_schema("public");
        assert_eq!("\"public\".\"t\"", filled.to_string());
    }
}
