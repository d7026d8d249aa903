//! Postgres backend for sqlframe.
//!
//! [`PostgresExecutor`] owns a single connection and a private current
//! thread runtime that the connection is driven on. Every call blocks until
//! the backend responds.
pub mod convert;
pub mod errors;

use std::fmt;

use convert::{PgParam, PgValue, datatype_for};
use errors::{PostgresError, Result as PostgresResult};
use sqlframe_core::SqlExecutor;
use sqlframe_core::row::RowSet;
use sqlframe_core::types::{ColumnDef, ColumnSchema, ScalarValue};
use sqlframe_error::{DbError, Result};
use tokio::runtime::Runtime;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, Column, NoTls, Row, Statement};
use tracing::{debug, trace};

pub struct PostgresExecutor {
    client: Client,
    runtime: Runtime,
}

impl PostgresExecutor {
    /// Connect using a libpq style connection string or URL.
    pub fn connect(conn_str: &str) -> Result<Self> {
        Ok(Self::connect_inner(conn_str)?)
    }

    fn connect_inner(conn_str: &str) -> PostgresResult<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        let (client, connection) = runtime
            .block_on(tokio_postgres::connect(conn_str, NoTls))
            .map_err(PostgresError::Connect)?;

        // Only polled while a call is blocking on the runtime.
        runtime.spawn(async move {
            if let Err(e) = connection.await {
                debug!(%e, "postgres connection errored");
            }
        });

        debug!("connected to postgres");

        Ok(PostgresExecutor { client, runtime })
    }

    async fn run(
        client: &Client,
        sql: &str,
        params: &[ScalarValue],
    ) -> PostgresResult<Option<(Statement, Vec<Row>)>> {
        if client.is_closed() {
            return Err(PostgresError::Closed);
        }

        let statement = client.prepare(sql).await?;
        let params: Vec<PgParam> = params.iter().map(PgParam).collect();
        let refs: Vec<&(dyn ToSql + Sync)> = params.iter().map(|p| p as _).collect();

        if statement.columns().is_empty() {
            let affected = client.execute(&statement, &refs).await?;
            trace!(%affected, "executed statement");
            return Ok(None);
        }

        let rows = client.query(&statement, &refs).await?;
        Ok(Some((statement, rows)))
    }
}

impl SqlExecutor for PostgresExecutor {
    fn execute(&mut self, sql: &str, params: &[ScalarValue]) -> Result<Option<RowSet>> {
        let result = self
            .runtime
            .block_on(Self::run(&self.client, sql, params))
            .map_err(|e| DbError::from(e).with_sql(sql))?;

        let (statement, rows) = match result {
            Some(result) => result,
            None => return Ok(None),
        };

        let rows = decode_rows(statement.columns(), &rows).map_err(|e| e.with_sql(sql))?;
        debug!(rows = rows.len(), "fetched rows");

        Ok(Some(rows))
    }
}

impl fmt::Debug for PostgresExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresExecutor")
            .field("closed", &self.client.is_closed())
            .finish_non_exhaustive()
    }
}

fn decode_rows(columns: &[Column], rows: &[Row]) -> Result<RowSet> {
    let schema = ColumnSchema::try_new(
        columns
            .iter()
            .map(|c| ColumnDef::new(c.name(), datatype_for(c.type_()))),
    )?;

    let mut values = Vec::with_capacity(rows.len());
    for row in rows {
        let mut decoded = Vec::with_capacity(columns.len());
        for (idx, column) in columns.iter().enumerate() {
            let value: PgValue = row.try_get(idx).map_err(|e| PostgresError::Decode {
                column: column.name().to_string(),
                source: e,
            })?;
            decoded.push(value.0);
        }
        values.push(decoded);
    }

    RowSet::try_new(schema, values)
}
