use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use sqlframe_error::{DbError, Result};

use super::datatype::{DataType, RecordField, RecordType};

/// An array value with its element type.
#[derive(Debug, Clone, PartialEq)]
pub struct ListValue {
    pub datatype: DataType,
    pub values: Vec<ScalarValue>,
}

/// A composite value as returned by the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordValue {
    pub type_name: String,
    pub fields: Vec<(String, ScalarValue)>,
}

impl RecordValue {
    pub fn get(&self, name: &str) -> Option<&ScalarValue> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }
}

/// A single value, either bound as a parameter or read back from a row.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarValue {
    Null,
    Boolean(bool),
    Int32(i32),
    Int64(i64),
    Float64(f64),
    Text(String),
    Binary(Vec<u8>),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
    List(ListValue),
    Record(RecordValue),
}

impl ScalarValue {
    pub fn list(datatype: DataType, values: impl IntoIterator<Item = ScalarValue>) -> Self {
        ScalarValue::List(ListValue {
            datatype,
            values: values.into_iter().collect(),
        })
    }

    pub fn datatype(&self) -> DataType {
        match self {
            ScalarValue::Null => DataType::Null,
            ScalarValue::Boolean(_) => DataType::Boolean,
            ScalarValue::Int32(_) => DataType::Int32,
            ScalarValue::Int64(_) => DataType::Int64,
            ScalarValue::Float64(_) => DataType::Float64,
            ScalarValue::Text(_) => DataType::Text,
            ScalarValue::Binary(_) => DataType::Binary,
            ScalarValue::Date(_) => DataType::Date,
            ScalarValue::Timestamp(_) => DataType::Timestamp,
            ScalarValue::List(list) => DataType::list(list.datatype.clone()),
            ScalarValue::Record(record) => DataType::Record(RecordType {
                schema: None,
                name: record.type_name.clone(),
                fields: record
                    .fields
                    .iter()
                    .map(|(name, v)| RecordField::new(name.clone(), v.datatype()))
                    .collect(),
            }),
        }
    }

    pub const fn is_null(&self) -> bool {
        matches!(self, ScalarValue::Null)
    }

    pub fn try_as_bool(&self) -> Result<bool> {
        match self {
            Self::Boolean(b) => Ok(*b),
            other => Err(DbError::invalid_argument(format!(
                "Expected a boolean value, got {other:?}"
            ))),
        }
    }

    pub fn try_as_i64(&self) -> Result<i64> {
        match self {
            Self::Int32(v) => Ok(*v as i64),
            Self::Int64(v) => Ok(*v),
            other => Err(DbError::invalid_argument(format!(
                "Expected an integer value, got {other:?}"
            ))),
        }
    }

    pub fn try_as_f64(&self) -> Result<f64> {
        match self {
            Self::Int32(v) => Ok(*v as f64),
            Self::Int64(v) => Ok(*v as f64),
            Self::Float64(v) => Ok(*v),
            other => Err(DbError::invalid_argument(format!(
                "Expected a numeric value, got {other:?}"
            ))),
        }
    }

    pub fn try_as_str(&self) -> Result<&str> {
        match self {
            Self::Text(s) => Ok(s.as_str()),
            other => Err(DbError::invalid_argument(format!(
                "Expected a text value, got {other:?}"
            ))),
        }
    }

    pub fn try_into_string(self) -> Result<String> {
        match self {
            Self::Text(s) => Ok(s),
            other => Err(DbError::invalid_argument(format!(
                "Expected a text value, got {other:?}"
            ))),
        }
    }
}

impl ScalarValue {
    /// Text the backend's input function parses back into this value.
    ///
    /// Used where values can't be bound, e.g. an aggregate's `INITCOND`.
    /// Array and record elements are always quoted so separators, quotes and
    /// empty strings survive.
    pub fn to_input_literal(&self) -> String {
        let mut out = String::new();
        self.write_input_literal(&mut out);
        out
    }

    fn write_input_literal(&self, out: &mut String) {
        match self {
            Self::List(list) => {
                out.push('{');
                for (idx, v) in list.values.iter().enumerate() {
                    if idx > 0 {
                        out.push(',');
                    }
                    match v {
                        Self::Null => out.push_str("NULL"),
                        // Nested arrays are written as bare sub-arrays.
                        Self::List(_) => v.write_input_literal(out),
                        v => push_quoted_element(&v.to_input_literal(), out),
                    }
                }
                out.push('}');
            }
            Self::Record(record) => {
                out.push('(');
                for (idx, (_, v)) in record.fields.iter().enumerate() {
                    if idx > 0 {
                        out.push(',');
                    }
                    // An empty field is NULL.
                    if !v.is_null() {
                        push_quoted_element(&v.to_input_literal(), out);
                    }
                }
                out.push(')');
            }
            other => out.push_str(&other.to_string()),
        }
    }
}

fn push_quoted_element(element: &str, out: &mut String) {
    out.push('"');
    for c in element.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Boolean(v) => write!(f, "{v}"),
            Self::Int32(v) => write!(f, "{v}"),
            Self::Int64(v) => write!(f, "{v}"),
            Self::Float64(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "{v}"),
            Self::Binary(v) => {
                write!(f, "\\x")?;
                for b in v {
                    write!(f, "{b:02x}")?;
                }
                Ok(())
            }
            Self::Date(v) => write!(f, "{}", v.format("%Y-%m-%d")),
            Self::Timestamp(v) => write!(f, "{}", v.format("%Y-%m-%d %H:%M:%S%.f")),
            Self::List(list) => {
                write!(f, "{{")?;
                for (idx, v) in list.values.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, "}}")
            }
            Self::Record(record) => {
                write!(f, "(")?;
                for (idx, (_, v)) in record.fields.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, ")")
            }
        }
    }
}

impl From<bool> for ScalarValue {
    fn from(value: bool) -> Self {
        ScalarValue::Boolean(value)
    }
}

impl From<i32> for ScalarValue {
    fn from(value: i32) -> Self {
        ScalarValue::Int32(value)
    }
}

impl From<i64> for ScalarValue {
    fn from(value: i64) -> Self {
        ScalarValue::Int64(value)
    }
}

impl From<f64> for ScalarValue {
    fn from(value: f64) -> Self {
        ScalarValue::Float64(value)
    }
}

impl From<&str> for ScalarValue {
    fn from(value: &str) -> Self {
        ScalarValue::Text(value.to_string())
    }
}

impl From<String> for ScalarValue {
    fn from(value: String) -> Self {
        ScalarValue::Text(value)
    }
}

impl From<&[u8]> for ScalarValue {
    fn from(value: &[u8]) -> Self {
        ScalarValue::Binary(value.to_vec())
    }
}

impl From<Vec<u8>> for ScalarValue {
    fn from(value: Vec<u8>) -> Self {
        ScalarValue::Binary(value)
    }
}

impl From<NaiveDate> for ScalarValue {
    fn from(value: NaiveDate) -> Self {
        ScalarValue::Date(value)
    }
}

impl From<NaiveDateTime> for ScalarValue {
    fn from(value: NaiveDateTime) -> Self {
        ScalarValue::Timestamp(value)
    }
}

impl<T: Into<ScalarValue>> From<Option<T>> for ScalarValue {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(value) => value.into(),
            None => ScalarValue::Null,
        }
    }
}
