use std::collections::HashMap;
use std::fmt;

use sqlframe_error::{DbError, Result};

use crate::ident::QualifiedName;
use crate::types::{DataType, RecordType};

/// SQLSTATE for "function already exists".
pub const DUPLICATE_FUNCTION: &str = "42723";
/// SQLSTATE for "object already exists", raised for types and aggregates.
pub const DUPLICATE_OBJECT: &str = "42710";

/// Digest of the statements deploying an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint(pub [u8; 16]);

impl Fingerprint {
    pub fn of_statements<'a>(statements: impl IntoIterator<Item = &'a str>) -> Self {
        let mut ctx = md5::Context::new();
        for stmt in statements {
            ctx.consume(stmt.as_bytes());
            ctx.consume(b";\n");
        }
        Fingerprint(ctx.compute().0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeploymentKind {
    Function,
    Type(RecordType),
}

/// What the backend must already store for an object that it reports as
/// existing, for the existing object to be reused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExistingDefinition {
    Function {
        /// Exact signature, e.g. `"pg_temp"."f"(int8)`.
        signature: String,
        body: String,
        result: String,
        language: String,
    },
    Aggregate {
        signature: String,
        /// Signature of the transition function.
        transition: String,
        state_type: String,
        initial_state: Option<String>,
        /// Signature of the final function.
        finalize: Option<String>,
    },
    Type(RecordType),
}

/// One DDL statement of a deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployStatement {
    pub sql: String,
    /// Object created by the statement.
    pub object: QualifiedName,
    /// Used to tell an identical existing definition apart from a
    /// conflicting one.
    pub existing: ExistingDefinition,
}

/// Everything needed to create a function or type in the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deployment {
    pub name: QualifiedName,
    pub kind: DeploymentKind,
    pub statements: Vec<DeployStatement>,
    pub fingerprint: Fingerprint,
}

impl Deployment {
    pub fn for_record(record: &RecordType, default_schema: &str) -> Self {
        let name = record.qualified_name().with_default_schema(default_schema);
        let sql = record.create_sql(default_schema);
        let fingerprint = Fingerprint::of_statements([sql.as_str()]);
        Deployment {
            name: name.clone(),
            kind: DeploymentKind::Type(record.clone()),
            statements: vec![DeployStatement {
                sql,
                object: name,
                existing: ExistingDefinition::Type(record.clone()),
            }],
            fingerprint,
        }
    }
}

/// Objects deployed through one database handle.
#[derive(Debug, Default)]
pub struct DeploymentRegistry {
    deployed: HashMap<QualifiedName, Fingerprint>,
}

impl DeploymentRegistry {
    /// Check a deployment against what's already deployed.
    ///
    /// Returns true if an identical definition is deployed, errors if a
    /// different definition is deployed under the same name.
    pub fn check(&self, deployment: &Deployment) -> Result<bool> {
        match self.deployed.get(&deployment.name) {
            Some(fingerprint) if *fingerprint == deployment.fingerprint => Ok(true),
            Some(fingerprint) => Err(DbError::definition_conflict(format!(
                "'{}' is already deployed with a different definition",
                deployment.name
            ))
            .with_field("deployed", *fingerprint)
            .with_field("requested", deployment.fingerprint)),
            None => Ok(false),
        }
    }

    pub fn record(&mut self, deployment: &Deployment) {
        self.deployed
            .insert(deployment.name.clone(), deployment.fingerprint);
    }

    pub fn remove(&mut self, name: &QualifiedName) -> bool {
        self.deployed.remove(name).is_some()
    }

    pub fn contains(&self, name: &QualifiedName) -> bool {
        self.deployed.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.deployed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deployed.is_empty()
    }
}

/// Check if an error is the backend reporting that an object exists.
pub fn is_duplicate_error(err: &DbError) -> bool {
    matches!(err.sqlstate(), Some(DUPLICATE_FUNCTION) | Some(DUPLICATE_OBJECT))
}

/// Compare a stored function body against the expected body.
pub fn bodies_match(expected: &str, stored: &str) -> bool {
    stored.trim() == expected.trim()
}

/// Normalize a type name to the backend's internal spelling, e.g. `bigint`
/// to `int8`.
///
/// Composite and other custom types compare by name only, temporary schemas
/// are spelled differently per session.
pub fn canonical_type_name(name: &str) -> String {
    let name = name.trim();
    if let Some(inner) = name.strip_prefix("SETOF ") {
        return format!("SETOF {}", canonical_type_name(inner));
    }
    if let Some(elem) = name.strip_suffix("[]") {
        return format!("{}[]", canonical_type_name(elem));
    }
    let lower = name.to_ascii_lowercase();
    let canonical = match lower.as_str() {
        "boolean" => "bool",
        "smallint" => "int2",
        "integer" | "int" => "int4",
        "bigint" => "int8",
        "real" => "float4",
        "double precision" => "float8",
        "character varying" => "varchar",
        "character" => "bpchar",
        "timestamp without time zone" => "timestamp",
        "timestamp with time zone" => "timestamptz",
        "bool" | "int2" | "int4" | "int8" | "float4" | "float8" | "numeric" | "text"
        | "varchar" | "bpchar" | "bytea" | "date" | "timestamp" | "timestamptz" | "json"
        | "jsonb" | "uuid" | "record" | "void" => return lower,
        _ => {
            return match DataType::from_sql_name(name) {
                DataType::Custom { name, .. } => name,
                other => other.sql_name(),
            };
        }
    };
    canonical.to_string()
}

/// Compare a stored result type against the declared one.
pub fn result_types_match(expected: &str, stored: &str) -> bool {
    canonical_type_name(expected) == canonical_type_name(stored)
}

/// Compare the stored attributes of a composite type against a record.
pub fn fields_match(record: &RecordType, stored: &[(String, String)]) -> bool {
    if record.fields.len() != stored.len() {
        return false;
    }
    record.fields.iter().zip(stored).all(|(field, (name, typ))| {
        field.name == *name
            && DataType::from_sql_name(&field.datatype.sql_name()) == DataType::from_sql_name(typ)
    })
}
