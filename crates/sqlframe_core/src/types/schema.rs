use serde::{Deserialize, Serialize};
use sqlframe_error::{DbError, Result};

use super::DataType;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub datatype: DataType,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, datatype: DataType) -> Self {
        ColumnDef {
            name: name.into(),
            datatype,
        }
    }
}

/// Ordered list of uniquely named columns.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ColumnSchema {
    columns: Vec<ColumnDef>,
}

impl ColumnSchema {
    /// Create a schema, erroring if a name appears more than once.
    pub fn try_new(columns: impl IntoIterator<Item = ColumnDef>) -> Result<Self> {
        let columns: Vec<_> = columns.into_iter().collect();
        for (idx, col) in columns.iter().enumerate() {
            if columns[..idx].iter().any(|c| c.name == col.name) {
                return Err(DbError::ambiguous_column(format!(
                    "Column '{}' appears more than once",
                    col.name
                )));
            }
        }
        Ok(ColumnSchema { columns })
    }

    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Get a column, erroring with a suggestion if it doesn't exist.
    pub fn try_get(&self, name: &str) -> Result<&ColumnDef> {
        match self.get(name) {
            Some(col) => Ok(col),
            None => Err(self.missing_column(name)),
        }
    }

    fn missing_column(&self, name: &str) -> DbError {
        const SIMILARITY_THRESHOLD: f64 = 0.7;

        let mut best: Option<(f64, &str)> = None;
        for col in &self.columns {
            let score = strsim::jaro(&col.name, name);
            if score > SIMILARITY_THRESHOLD && best.is_none_or(|(s, _)| score > s) {
                best = Some((score, &col.name));
            }
        }

        let mut err = DbError::unresolved_column(format!("Missing column '{name}'"));
        if let Some((_, similar)) = best {
            err = err.with_field("did you mean", similar.to_string());
        }
        err
    }
}
