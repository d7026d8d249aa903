use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use sqlframe_error::{DbError, Result};
use textwrap::core::display_width;

use crate::types::ScalarValue;
use crate::types::schema::ColumnSchema;

/// A single materialized row.
///
/// Values are keyed by column name in the order of the query's select list.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    values: IndexMap<String, ScalarValue>,
}

impl Row {
    pub fn new(values: impl IntoIterator<Item = (String, ScalarValue)>) -> Self {
        Row {
            values: values.into_iter().collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ScalarValue> {
        self.values.get(name)
    }

    pub fn try_get(&self, name: &str) -> Result<&ScalarValue> {
        self.values.get(name).ok_or_else(|| {
            DbError::unresolved_column(format!("Row has no column '{name}'"))
                .with_field("columns", self.names().collect::<Vec<_>>().join(", "))
        })
    }

    /// Get a value by position.
    pub fn value(&self, idx: usize) -> Option<&ScalarValue> {
        self.values.get_index(idx).map(|(_, v)| v)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(|k| k.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &ScalarValue> {
        self.values.values()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ScalarValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Rows returned by a single query.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RowSet {
    schema: ColumnSchema,
    rows: Vec<Row>,
}

impl RowSet {
    /// Build a row set from positional values.
    ///
    /// Every row must have one value per column.
    pub fn try_new(schema: ColumnSchema, rows: impl IntoIterator<Item = Vec<ScalarValue>>) -> Result<Self> {
        let rows = rows
            .into_iter()
            .enumerate()
            .map(|(idx, values)| {
                if values.len() != schema.len() {
                    return Err(DbError::new(format!(
                        "Row {idx} has {} values, expected {}",
                        values.len(),
                        schema.len()
                    )));
                }
                Ok(Row::new(
                    schema.names().map(|n| n.to_string()).zip(values),
                ))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(RowSet { schema, rows })
    }

    pub fn empty(schema: ColumnSchema) -> Self {
        RowSet {
            schema,
            rows: Vec::new(),
        }
    }

    pub fn schema(&self) -> &ColumnSchema {
        &self.schema
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn row(&self, idx: usize) -> Option<&Row> {
        self.rows.get(idx)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Values of a single column.
    pub fn column(&self, name: &str) -> Result<Vec<&ScalarValue>> {
        let idx = self
            .schema
            .position(name)
            .ok_or_else(|| DbError::unresolved_column(format!("Result has no column '{name}'")))?;
        Ok(self.rows.iter().filter_map(|r| r.value(idx)).collect())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Row> {
        self.rows.iter()
    }
}

impl<'a> IntoIterator for &'a RowSet {
    type Item = &'a Row;
    type IntoIter = std::slice::Iter<'a, Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

/// Owning iterator over a shared row set.
#[derive(Debug, Clone)]
pub struct RowSetIter {
    rows: Arc<RowSet>,
    idx: usize,
}

impl RowSetIter {
    pub fn new(rows: Arc<RowSet>) -> Self {
        RowSetIter { rows, idx: 0 }
    }
}

impl Iterator for RowSetIter {
    type Item = Row;

    fn next(&mut self) -> Option<Self::Item> {
        let row = self.rows.row(self.idx)?.clone();
        self.idx += 1;
        Some(row)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.rows.len().saturating_sub(self.idx);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for RowSetIter {}

impl fmt::Display for RowSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let headers: Vec<_> = self.schema.names().collect();
        let cells: Vec<Vec<String>> = self
            .rows
            .iter()
            .map(|row| row.values().map(|v| v.to_string()).collect())
            .collect();

        let mut widths: Vec<_> = headers.iter().map(|h| display_width(h)).collect();
        for row in &cells {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(display_width(cell));
            }
        }

        let write_line = |f: &mut fmt::Formatter<'_>, values: &[&str]| -> fmt::Result {
            for (idx, (value, width)) in values.iter().zip(&widths).enumerate() {
                if idx > 0 {
                    write!(f, " | ")?;
                }
                write!(f, "{value}{}", " ".repeat(width - display_width(value)))?;
            }
            writeln!(f)
        };

        write_line(f, &headers)?;
        let sep: Vec<_> = widths.iter().map(|w| "-".repeat(*w)).collect();
        writeln!(f, "{}", sep.join("-+-"))?;
        for row in &cells {
            let values: Vec<_> = row.iter().map(|s| s.as_str()).collect();
            write_line(f, &values)?;
        }

        let n = self.rows.len();
        write!(f, "({n} {})", if n == 1 { "row" } else { "rows" })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DataType;
    use crate::types::schema::ColumnDef;

    fn rowset() -> RowSet {
        let schema = ColumnSchema::try_new([
            ColumnDef::new("id", DataType::Int64),
            ColumnDef::new("name", DataType::Text),
        ])
        .unwrap();
        RowSet::try_new(
            schema,
            [
                vec![1_i64.into(), "alice".into()],
                vec![2_i64.into(), ScalarValue::Null],
            ],
        )
        .unwrap()
    }

    #[test]
    fn keyed_and_positional_access() {
        let rows = rowset();
        let row = rows.row(0).unwrap();
        assert_eq!(&ScalarValue::from("alice"), row.get("name").unwrap());
        assert_eq!(&ScalarValue::Int64(1), row.value(0).unwrap());
        assert_eq!(vec!["id", "name"], row.names().collect::<Vec<_>>());
        assert!(row.try_get("missing").is_err());
    }

    #[test]
    fn wrong_row_width() {
        let schema = ColumnSchema::try_new([ColumnDef::new("id", DataType::Int64)]).unwrap();
        assert!(RowSet::try_new(schema, [vec![1_i64.into(), 2_i64.into()]]).is_err());
    }

    #[test]
    fn owned_iteration() {
        let iter = RowSetIter::new(Arc::new(rowset()));
        assert_eq!(2, iter.len());
        let ids: Vec<_> = iter.map(|r| r.get("id").cloned().unwrap()).collect();
        assert_eq!(vec![ScalarValue::Int64(1), ScalarValue::Int64(2)], ids);
    }

    #[test]
    fn display_aligned() {
        let expected = [
            "id | name ",
            "---+------",
            "1  | alice",
            "2  | NULL ",
            "(2 rows)",
        ]
        .join("\n");
        assert_eq!(expected, rowset().to_string());
    }
}
