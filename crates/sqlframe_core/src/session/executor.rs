use std::fmt::Debug;

use sqlframe_error::Result;

use crate::row::RowSet;
use crate::types::ScalarValue;

/// Connection to the backend statements are executed on.
///
/// Implementations block until the backend responds. A database handle owns
/// exactly one executor and issues statements to it one at a time.
pub trait SqlExecutor: Debug + Send + Sync {
    /// Execute a statement with positional parameters bound to `$1..$n`.
    ///
    /// Returns the rows for statements producing a result set, and None for
    /// statements that don't (DDL, inserts).
    ///
    /// Errors reported by the backend should be execution errors carrying
    /// the backend's message and SQLSTATE.
    fn execute(&mut self, sql: &str, params: &[ScalarValue]) -> Result<Option<RowSet>>;
}

impl<E: SqlExecutor + ?Sized> SqlExecutor for Box<E> {
    fn execute(&mut self, sql: &str, params: &[ScalarValue]) -> Result<Option<RowSet>> {
        self.as_mut().execute(sql, params)
    }
}
