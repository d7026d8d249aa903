//! Utilities for testing without a backend.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use sqlframe_error::Result;

use crate::row::RowSet;
use crate::session::executor::SqlExecutor;
use crate::types::{ColumnSchema, ScalarValue};

/// A statement received by a [`ScriptedExecutor`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedStatement {
    pub sql: String,
    pub params: Vec<ScalarValue>,
}

#[derive(Debug, Default)]
struct ScriptState {
    statements: Vec<RecordedStatement>,
    responses: VecDeque<Result<Option<RowSet>>>,
}

/// Executor replaying queued responses and recording every statement.
///
/// Clones share state, keep one to inspect what a database executed. When
/// the queue is empty, queries (`SELECT`, `WITH`, `EXPLAIN`) return no rows
/// and other statements return nothing.
#[derive(Debug, Clone, Default)]
pub struct ScriptedExecutor {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue rows for the next statement.
    pub fn push_rows(&self, rows: RowSet) {
        self.state.lock().responses.push_back(Ok(Some(rows)));
    }

    /// Queue a response without a result set.
    pub fn push_empty(&self) {
        self.state.lock().responses.push_back(Ok(None));
    }

    /// Queue an error for the next statement.
    pub fn push_error(&self, err: sqlframe_error::DbError) {
        self.state.lock().responses.push_back(Err(err));
    }

    pub fn statements(&self) -> Vec<RecordedStatement> {
        self.state.lock().statements.clone()
    }

    /// SQL of every statement, in execution order.
    pub fn sql(&self) -> Vec<String> {
        self.state
            .lock()
            .statements
            .iter()
            .map(|s| s.sql.clone())
            .collect()
    }

    pub fn clear(&self) {
        self.state.lock().statements.clear();
    }
}

impl SqlExecutor for ScriptedExecutor {
    fn execute(&mut self, sql: &str, params: &[ScalarValue]) -> Result<Option<RowSet>> {
        let mut state = self.state.lock();
        state.statements.push(RecordedStatement {
            sql: sql.to_string(),
            params: params.to_vec(),
        });

        if let Some(response) = state.responses.pop_front() {
            return response;
        }

        let upper = sql.trim_start().to_ascii_uppercase();
        if upper.starts_with("SELECT") || upper.starts_with("WITH") || upper.starts_with("EXPLAIN")
        {
            Ok(Some(RowSet::empty(ColumnSchema::default())))
        } else {
            Ok(None)
        }
    }
}
