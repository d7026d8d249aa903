#![allow(dead_code)]

use sqlframe_core::Database;
use sqlframe_postgres::PostgresExecutor;

pub const POSTGRES_URL_VAR: &str = "SQLFRAME_POSTGRES_URL";

/// Connect to the server named by `SQLFRAME_POSTGRES_URL`.
///
/// Returns None when the variable isn't set so tests can skip.
pub fn connect() -> Option<Database> {
    logutil::init_test();
    let url = std::env::var(POSTGRES_URL_VAR).ok()?;
    let executor = PostgresExecutor::connect(&url).expect("Failed to connect to postgres");
    Some(Database::new(executor))
}
