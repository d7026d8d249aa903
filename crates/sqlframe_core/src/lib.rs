//! Lazily evaluated dataframes compiled to SQL.
//!
//! A [`Database`] wraps a connection to a backend. Dataframes created from it
//! record relational operations without touching the backend, and compile to
//! a single statement when rows are requested. Client defined functions are
//! deployed to the backend on first use.

pub mod compile;
pub mod config;
pub mod dataframe;
pub mod expr;
pub mod functions;
pub mod group;
pub mod ident;
pub mod order;
pub mod row;
pub mod session;
pub mod testutil;
pub mod types;

pub use dataframe::{ApplyOptions, ColumnSelection, DataFrame, JoinKind, SaveOptions};
pub use expr::{Expression, lit, null};
pub use functions::{FunctionBuilder, RemoteFunction};
pub use group::GroupedFrame;
pub use ident::QualifiedName;
pub use order::OrderByExpr;
pub use row::{Row, RowSet};
pub use session::Database;
pub use session::executor::SqlExecutor;
pub use types::{DataType, RecordField, RecordType, ScalarValue};
