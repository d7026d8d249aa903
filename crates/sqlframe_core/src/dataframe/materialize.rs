//! Operations that run a dataframe's query against the backend.

use std::sync::Arc;

use sqlframe_error::{DbError, DbErrorKind, Result, ResultExt};
use tracing::{debug, info, warn};

use super::DataFrame;
use super::node::{MaterializationState, Node, NodeKind, OutputSchema};
use crate::compile::CompiledQuery;
use crate::ident::{QualifiedName, quote_ident, quote_literal};
use crate::row::{Row, RowSet, RowSetIter};
use crate::types::{ColumnDef, ColumnSchema, DataType};

/// Options for [`DataFrame::save_as`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveOptions {
    pub temporary: bool,
    /// `WITH (key = value)` storage parameters.
    pub storage_params: Vec<(String, String)>,
    pub schema: Option<String>,
    /// Rename the output columns, one name per column.
    pub column_names: Option<Vec<String>>,
    /// Drop the relation first if it exists.
    pub replace: bool,
}

impl SaveOptions {
    pub fn temporary() -> Self {
        SaveOptions {
            temporary: true,
            ..Default::default()
        }
    }

    pub fn with_replace(mut self, replace: bool) -> Self {
        self.replace = replace;
        self
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn with_storage_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.storage_params.push((key.into(), value.into()));
        self
    }

    pub fn with_column_names<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.column_names = Some(names.into_iter().map(Into::into).collect());
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExplainFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExplainOutput {
    Text(String),
    Json(serde_json::Value),
}

/// Options for [`DataFrame::create_index`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexOptions {
    /// Index method, e.g. `btree` or `gin`. Backend default if not set.
    pub method: Option<String>,
    /// Index name. Generated by the backend if not set.
    pub name: Option<String>,
}

impl DataFrame {
    /// The compiled statement for this dataframe.
    ///
    /// Compiled once, then cached on the node.
    pub fn compiled(&self) -> Result<Arc<CompiledQuery>> {
        let node = self.db.node(self.node)?;
        let mut cell = node.cell.lock();
        self.compiled_locked(&mut cell)
    }

    fn compiled_locked(&self, cell: &mut MaterializationState) -> Result<Arc<CompiledQuery>> {
        if let Some(query) = cell.query() {
            return Ok(query.clone());
        }
        let query = Arc::new(self.db.compile(self.node)?);
        *cell = MaterializationState::Compiled(query.clone());
        Ok(query)
    }

    /// SQL this dataframe compiles to.
    pub fn sql(&self) -> Result<String> {
        Ok(self.compiled()?.sql.clone())
    }

    /// Run the query and return its rows.
    ///
    /// Rows are cached on the node. Reading cached rows after a relation
    /// they came from was written through this database handle errors, call
    /// [`DataFrame::refresh`] to fetch again.
    pub fn fetch(&self) -> Result<Arc<RowSet>> {
        let node = self.db.node(self.node)?;
        let mut cell = node.cell.lock();

        if let MaterializationState::Materialized { rows, versions, .. } = &*cell {
            self.db.check_versions(versions)?;
            return Ok(rows.clone());
        }

        let query = self.compiled_locked(&mut cell)?;
        let versions = self.db.relation_versions(&query.relations);
        let rows = Arc::new(self.db.run_query(&query)?);
        debug!(node = %self.node, rows = rows.len(), "materialized");

        *cell = MaterializationState::Materialized {
            query,
            rows: rows.clone(),
            versions,
        };
        Ok(rows)
    }

    pub fn iter(&self) -> Result<RowSetIter> {
        Ok(RowSetIter::new(self.fetch()?))
    }

    /// Get a row by position.
    pub fn row(&self, idx: usize) -> Result<Row> {
        let rows = self.fetch()?;
        rows.row(idx).cloned().ok_or_else(|| {
            DbError::invalid_argument(format!(
                "Row index {idx} out of range for {} rows",
                rows.len()
            ))
        })
    }

    /// Number of rows. Fetches the rows if they haven't been fetched.
    pub fn len(&self) -> Result<usize> {
        Ok(self.fetch()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.fetch()?.is_empty())
    }

    /// Fetch the first `n` rows.
    pub fn head(&self, n: u64) -> Result<Arc<RowSet>> {
        self.limit(n)?.fetch()
    }

    /// Drop cached rows so the next read runs the query again.
    pub fn refresh(&self) -> Result<()> {
        let node = self.db.node(self.node)?;
        let mut cell = node.cell.lock();
        if let MaterializationState::Materialized { query, .. } = &*cell {
            *cell = MaterializationState::Compiled(query.clone());
        }
        Ok(())
    }

    pub fn is_materialized(&self) -> Result<bool> {
        Ok(self.db.node(self.node)?.cell.lock().is_materialized())
    }

    /// Store this dataframe's rows in a new relation.
    ///
    /// Column types come from the dataframe's schema. If any are unknown, the
    /// query is run with `LIMIT 0` to learn them from the backend.
    pub fn save_as(&self, name: impl Into<String>, options: SaveOptions) -> Result<DataFrame> {
        let name = QualifiedName::new(options.schema.clone(), name);
        let query = self.compiled()?;

        let mut columns = match self.output_schema()? {
            OutputSchema::Resolved(schema)
                if schema.columns().iter().all(|c| is_known(&c.datatype)) =>
            {
                schema.columns().to_vec()
            }
            _ => self.query_columns(&query)?,
        };

        if let Some(names) = &options.column_names {
            if names.len() != columns.len() {
                return Err(DbError::invalid_argument(format!(
                    "Got {} column names for {} columns",
                    names.len(),
                    columns.len()
                )));
            }
            for (col, name) in columns.iter_mut().zip(names) {
                col.name = name.clone();
            }
        }
        let schema = ColumnSchema::try_new(columns)?;

        let mut create = String::from("CREATE ");
        if options.temporary {
            create.push_str("TEMP ");
        }
        let defs: Vec<_> = schema
            .columns()
            .iter()
            .map(|c| format!("{} {}", quote_ident(&c.name), c.datatype.sql_name()))
            .collect();
        create.push_str(&format!("TABLE {name} ({})", defs.join(", ")));
        if !options.storage_params.is_empty() {
            let mut params = Vec::with_capacity(options.storage_params.len());
            for (key, value) in &options.storage_params {
                if key.is_empty()
                    || !key
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
                {
                    return Err(DbError::invalid_argument(format!(
                        "Invalid storage parameter name '{key}'"
                    )));
                }
                params.push(format!("{key} = {}", quote_literal(value)));
            }
            create.push_str(&format!(" WITH ({})", params.join(", ")));
        }

        let names: Vec<_> = schema.names().map(quote_ident).collect();
        let insert = format!("INSERT INTO {name} ({}) {}", names.join(", "), query.sql);

        for function in &query.functions {
            self.db.deploy_function(function)?;
        }
        if options.replace {
            self.db
                .execute(&format!("DROP TABLE IF EXISTS {name}"), &[])?;
            self.db.bump_version(&name);
        }
        self.db.execute(&create, &[])?;
        if let Err(e) = self.db.execute(&insert, &query.params) {
            // Don't leave an empty relation behind, a retry would fail to
            // create it.
            if let Err(drop_err) = self.db.execute(&format!("DROP TABLE IF EXISTS {name}"), &[]) {
                warn!(%name, %drop_err, "failed to drop relation after failed insert");
            }
            self.db.bump_version(&name);
            return Err(e);
        }
        self.db.bump_version(&name);
        info!(%name, columns = schema.len(), "saved dataframe");

        Ok(self.db.push_node(Node::new(
            NodeKind::Saved {
                name,
                temporary: options.temporary,
            },
            OutputSchema::Resolved(schema),
        )))
    }

    /// Learn the output columns by running the query without returning rows.
    fn query_columns(&self, query: &CompiledQuery) -> Result<Vec<ColumnDef>> {
        for function in &query.functions {
            self.db.deploy_function(function)?;
        }
        let sql = format!("SELECT * FROM ({}) AS \"t\" LIMIT 0", query.sql);
        let rows = self.db.query(&sql, &query.params)?;
        Ok(rows.schema().columns().to_vec())
    }

    /// Get the backend's plan for this dataframe's query.
    pub fn explain(&self, format: ExplainFormat) -> Result<ExplainOutput> {
        let query = self.compiled()?;
        for function in &query.functions {
            self.db.deploy_function(function)?;
        }

        let format_name = match format {
            ExplainFormat::Text => "TEXT",
            ExplainFormat::Json => "JSON",
        };
        let sql = format!("EXPLAIN (FORMAT {format_name}) {}", query.sql);
        let rows = self.db.query(&sql, &query.params)?;

        match format {
            ExplainFormat::Text => {
                let mut lines = Vec::with_capacity(rows.len());
                for row in rows.iter() {
                    if let Some(value) = row.value(0) {
                        lines.push(value.try_as_str()?.to_string());
                    }
                }
                Ok(ExplainOutput::Text(lines.join("\n")))
            }
            ExplainFormat::Json => {
                let plan = rows.row(0).and_then(|row| row.value(0)).ok_or_else(|| {
                    DbError::with_kind(DbErrorKind::Execution, "EXPLAIN returned no plan")
                })?;
                let value =
                    serde_json::from_str(plan.try_as_str()?).context("Failed to parse plan")?;
                Ok(ExplainOutput::Json(value))
            }
        }
    }

    /// Create an index on a base or saved relation.
    pub fn create_index<S: AsRef<str>>(&self, columns: &[S], options: IndexOptions) -> Result<()> {
        let node = self.db.node(self.node)?;
        let relation = node.kind.relation_name().ok_or_else(|| {
            DbError::invalid_argument(format!(
                "Indexes can only be created on tables, not on a {} node",
                node.kind.variant_name()
            ))
        })?;
        if columns.is_empty() {
            return Err(DbError::invalid_argument("Index requires at least one column"));
        }
        for name in columns {
            self.col(name.as_ref())?;
        }

        let mut sql = String::from("CREATE INDEX ");
        if let Some(name) = &options.name {
            sql.push_str(&quote_ident(name));
            sql.push(' ');
        }
        sql.push_str(&format!("ON {relation}"));
        if let Some(method) = &options.method {
            if method.is_empty() || !method.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return Err(DbError::invalid_argument(format!(
                    "Invalid index method '{method}'"
                )));
            }
            sql.push_str(&format!(" USING {method}"));
        }
        let cols: Vec<_> = columns.iter().map(|c| quote_ident(c.as_ref())).collect();
        sql.push_str(&format!(" ({})", cols.join(", ")));

        self.db.execute(&sql, &[])?;
        Ok(())
    }
}

fn is_known(datatype: &DataType) -> bool {
    match datatype {
        DataType::Unknown | DataType::Null => false,
        DataType::List(inner) => is_known(inner),
        _ => true,
    }
}
