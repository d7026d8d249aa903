//! Backend execution environments for remote procedures.
//!
//! The client never ships compiled code. A function body is source text in
//! some language the backend can execute, and the environment decides how
//! that text is turned into a `CREATE FUNCTION` body.

use std::fmt::Debug;

use sqlframe_error::{DbError, Result};

use super::remote::Parameter;

pub trait ProcedureEnvironment: Debug + Sync + Send {
    /// Language name used in `LANGUAGE <name>`.
    fn language(&self) -> &str;

    /// Turn user provided source into the function body stored by the
    /// backend.
    fn prepare_body(&self, source: &str, params: &[Parameter]) -> Result<String>;
}

fn check_not_empty(source: &str) -> Result<()> {
    if source.trim().is_empty() {
        return Err(DbError::invalid_argument("Function body cannot be empty"));
    }
    Ok(())
}

/// Plain SQL functions.
///
/// Parameters are referenced by name in the body.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlEnvironment;

impl ProcedureEnvironment for SqlEnvironment {
    fn language(&self) -> &str {
        "sql"
    }

    fn prepare_body(&self, source: &str, _params: &[Parameter]) -> Result<String> {
        check_not_empty(source)?;
        Ok(source.trim().to_string())
    }
}

/// PL/pgSQL functions.
///
/// Bodies that don't start with a `DECLARE` or `BEGIN` block are wrapped in
/// one.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlPgSqlEnvironment;

impl ProcedureEnvironment for PlPgSqlEnvironment {
    fn language(&self) -> &str {
        "plpgsql"
    }

    fn prepare_body(&self, source: &str, _params: &[Parameter]) -> Result<String> {
        check_not_empty(source)?;
        let source = source.trim();
        let upper = source.to_ascii_uppercase();
        if upper.starts_with("DECLARE") || upper.starts_with("BEGIN") {
            return Ok(source.to_string());
        }

        let mut body = String::from("BEGIN\n");
        for line in textwrap::dedent(source).lines() {
            body.push_str("  ");
            body.push_str(line);
            body.push('\n');
        }
        if !source.ends_with(';') {
            // Last statement needs a terminator inside the block.
            body.pop();
            body.push_str(";\n");
        }
        body.push_str("END;");
        Ok(body)
    }
}

/// Any embedded language handler installed in the backend, e.g.
/// `plpython3u`.
///
/// Source is dedented so indented snippets keep valid block structure.
#[derive(Debug, Clone)]
pub struct ScriptEnvironment {
    language: String,
}

impl ScriptEnvironment {
    pub fn new(language: impl Into<String>) -> Self {
        ScriptEnvironment {
            language: language.into(),
        }
    }

    pub fn python() -> Self {
        Self::new("plpython3u")
    }
}

impl ProcedureEnvironment for ScriptEnvironment {
    fn language(&self) -> &str {
        &self.language
    }

    fn prepare_body(&self, source: &str, _params: &[Parameter]) -> Result<String> {
        check_not_empty(source)?;
        let dedented = textwrap::dedent(source);
        Ok(dedented.trim_matches('\n').to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sql_body_trimmed() {
        let body = SqlEnvironment.prepare_body("  SELECT x * 2 \n", &[]).unwrap();
        assert_eq!("SELECT x * 2", body);
    }

    #[test]
    fn plpgsql_wraps_statements() {
        let body = PlPgSqlEnvironment
            .prepare_body("RETURN x * 2", &[])
            .unwrap();
        assert_eq!("BEGIN\n  RETURN x * 2;\nEND;", body);

        let block = "BEGIN RETURN 1; END;";
        assert_eq!(block, PlPgSqlEnvironment.prepare_body(block, &[]).unwrap());
    }

    #[test]
    fn script_dedents() {
        let source = "
            if x > 1:
                return x
            return 0
        ";
        let body = ScriptEnvironment::python().prepare_body(source, &[]).unwrap();
        assert_eq!("if x > 1:\n    return x\nreturn 0", body.trim_end());
    }

    #[test]
    fn empty_body_rejected() {
        assert!(SqlEnvironment.prepare_body("  ", &[]).is_err());
    }
}
