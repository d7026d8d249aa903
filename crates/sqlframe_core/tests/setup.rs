#![allow(dead_code)]

use sqlframe_core::testutil::ScriptedExecutor;
use sqlframe_core::types::{ColumnDef, ColumnSchema};
use sqlframe_core::{DataFrame, DataType, Database, RowSet, ScalarValue};

/// A database backed by a scripted executor, along with a handle to the
/// executor for inspecting executed statements.
pub fn database() -> (Database, ScriptedExecutor) {
    logutil::init_test();
    let executor = ScriptedExecutor::new();
    (Database::new(executor.clone()), executor)
}

pub fn employees(db: &Database) -> DataFrame {
    db.table_with_schema(
        "employees",
        [
            ColumnDef::new("id", DataType::Int64),
            ColumnDef::new("dept", DataType::Text),
            ColumnDef::new("salary", DataType::Int64),
        ],
    )
    .unwrap()
}

pub fn departments(db: &Database) -> DataFrame {
    db.table_with_schema(
        "departments",
        [
            ColumnDef::new("dept_name", DataType::Text),
            ColumnDef::new("budget", DataType::Int64),
        ],
    )
    .unwrap()
}

pub fn managers(db: &Database) -> DataFrame {
    db.table_with_schema(
        "managers",
        [
            ColumnDef::new("dept", DataType::Text),
            ColumnDef::new("manager", DataType::Text),
        ],
    )
    .unwrap()
}

/// Build a row set from (name, type) columns and rows of values.
pub fn rows(columns: &[(&str, DataType)], rows: Vec<Vec<ScalarValue>>) -> RowSet {
    let schema = ColumnSchema::try_new(
        columns
            .iter()
            .map(|(name, datatype)| ColumnDef::new(*name, datatype.clone())),
    )
    .unwrap();
    RowSet::try_new(schema, rows).unwrap()
}
