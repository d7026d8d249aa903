use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ident::{QualifiedName, quote_ident};

/// A named field of a composite type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordField {
    pub name: String,
    pub datatype: DataType,
}

impl RecordField {
    pub fn new(name: impl Into<String>, datatype: DataType) -> Self {
        RecordField {
            name: name.into(),
            datatype,
        }
    }
}

/// A composite type.
///
/// Record types can be deployed to the backend with `CREATE TYPE`, and are
/// deployed automatically before any function whose signature references
/// them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordType {
    pub schema: Option<String>,
    pub name: String,
    pub fields: Vec<RecordField>,
}

impl RecordType {
    pub fn new(name: impl Into<String>, fields: impl IntoIterator<Item = RecordField>) -> Self {
        RecordType {
            schema: None,
            name: name.into(),
            fields: fields.into_iter().collect(),
        }
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn qualified_name(&self) -> QualifiedName {
        QualifiedName {
            schema: self.schema.clone(),
            name: self.name.clone(),
        }
    }

    pub fn field(&self, name: &str) -> Option<&RecordField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Generate the `CREATE TYPE` statement for this record, creating it in
    /// `default_schema` if the record doesn't specify one.
    pub fn create_sql(&self, default_schema: &str) -> String {
        let name = self.qualified_name().with_default_schema(default_schema);
        let fields = self
            .fields
            .iter()
            .map(|f| format!("{} {}", quote_ident(&f.name), f.datatype.sql_name()))
            .collect::<Vec<_>>()
            .join(", ");
        format!("CREATE TYPE {name} AS ({fields})")
    }
}

/// Column types understood by the client.
///
/// Anything the client doesn't model natively is carried as `Custom` with
/// the backend's type name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    /// Type of an untyped NULL literal.
    Null,
    /// Type of a column of a relation whose schema hasn't been described.
    ///
    /// Type checking is deferred to the backend for these.
    Unknown,
    Boolean,
    Int32,
    Int64,
    /// Arbitrary precision decimal.
    Numeric,
    Float64,
    Text,
    Binary,
    Date,
    Timestamp,
    /// Array of values of the same type.
    List(Box<DataType>),
    Record(RecordType),
    Custom {
        schema: Option<String>,
        name: String,
        modifier: Option<String>,
    },
}

impl DataType {
    pub fn list(element: DataType) -> Self {
        DataType::List(Box::new(element))
    }

    pub fn custom(name: impl Into<String>) -> Self {
        DataType::Custom {
            schema: None,
            name: name.into(),
            modifier: None,
        }
    }

    pub const fn is_null(&self) -> bool {
        matches!(self, DataType::Null)
    }

    pub const fn is_unknown(&self) -> bool {
        matches!(self, DataType::Unknown)
    }

    /// The type name used in casts and column definitions.
    pub fn sql_name(&self) -> String {
        match self {
            // Untyped columns are created as text.
            DataType::Null | DataType::Unknown => "text".to_string(),
            DataType::Boolean => "bool".to_string(),
            DataType::Int32 => "int4".to_string(),
            DataType::Int64 => "int8".to_string(),
            DataType::Numeric => "numeric".to_string(),
            DataType::Float64 => "float8".to_string(),
            DataType::Text => "text".to_string(),
            DataType::Binary => "bytea".to_string(),
            DataType::Date => "date".to_string(),
            DataType::Timestamp => "timestamp".to_string(),
            DataType::List(inner) => format!("{}[]", inner.sql_name()),
            DataType::Record(record) => record.qualified_name().to_string(),
            DataType::Custom {
                schema,
                name,
                modifier,
            } => {
                let mut s = match schema {
                    Some(schema) => format!("{}.{}", quote_ident(schema), quote_ident(name)),
                    None => quote_ident(name),
                };
                if let Some(modifier) = modifier {
                    s.push('(');
                    s.push_str(modifier);
                    s.push(')');
                }
                s
            }
        }
    }

    /// Parse a type name as produced by the backend's `format_type`.
    ///
    /// Names that aren't recognized produce `Custom` types.
    pub fn from_sql_name(name: &str) -> DataType {
        let name = name.trim();
        if let Some(elem) = name.strip_suffix("[]") {
            return DataType::list(Self::from_sql_name(elem));
        }

        let (base, modifier) = match name.find('(') {
            Some(idx) if name.ends_with(')') => (
                name[..idx].trim(),
                Some(name[idx + 1..name.len() - 1].to_string()),
            ),
            _ => (name, None),
        };
        // Modifiers may trail the type name, e.g. "timestamp(3) without time zone".
        let base_lower = base.to_ascii_lowercase();

        match base_lower.as_str() {
            "bool" | "boolean" => DataType::Boolean,
            "int2" | "smallint" | "int4" | "integer" | "int" => DataType::Int32,
            "int8" | "bigint" => DataType::Int64,
            "numeric" | "decimal" => DataType::Numeric,
            "float4" | "real" | "float8" | "double precision" => DataType::Float64,
            "text" | "varchar" | "character varying" | "char" | "character" | "bpchar"
            | "name" | "json" | "jsonb" | "uuid" => DataType::Text,
            "bytea" => DataType::Binary,
            "date" => DataType::Date,
            "timestamp" | "timestamp without time zone" | "timestamptz"
            | "timestamp with time zone" => DataType::Timestamp,
            _ if base_lower.starts_with("timestamp") => DataType::Timestamp,
            _ => {
                let (schema, name) = split_qualified(base);
                DataType::Custom {
                    schema,
                    name,
                    modifier,
                }
            }
        }
    }
}

fn unquote(s: &str) -> String {
    match s.strip_prefix('"').and_then(|s| s.strip_suffix('"')) {
        Some(inner) => inner.replace("\"\"", "\""),
        None => s.to_string(),
    }
}

/// Split "schema.name" respecting quoted identifiers.
fn split_qualified(s: &str) -> (Option<String>, String) {
    let mut in_quotes = false;
    for (idx, c) in s.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            '.' if !in_quotes => {
                return (Some(unquote(&s[..idx])), unquote(&s[idx + 1..]));
            }
            _ => (),
        }
    }
    (None, unquote(s))
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Null => write!(f, "Null"),
            DataType::Unknown => write!(f, "Unknown"),
            DataType::Boolean => write!(f, "Boolean"),
            DataType::Int32 => write!(f, "Int32"),
            DataType::Int64 => write!(f, "Int64"),
            DataType::Numeric => write!(f, "Numeric"),
            DataType::Float64 => write!(f, "Float64"),
            DataType::Text => write!(f, "Text"),
            DataType::Binary => write!(f, "Binary"),
            DataType::Date => write!(f, "Date"),
            DataType::Timestamp => write!(f, "Timestamp"),
            DataType::List(inner) => write!(f, "List[{inner}]"),
            DataType::Record(record) => {
                write!(f, "Record {}(", record.name)?;
                for (idx, field) in record.fields.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", field.name, field.datatype)?;
                }
                write!(f, ")")
            }
            DataType::Custom { .. } => write!(f, "{}", self.sql_name()),
        }
    }
}
