pub mod executor;

use std::collections::HashMap;
use std::sync::Arc;

use executor::SqlExecutor;
use parking_lot::{Mutex, RwLock};
use sqlframe_error::{DbError, DbErrorKind, OptionExt, Result};
use tracing::{debug, info, trace};

use crate::compile::{CompiledQuery, QueryCompiler};
use crate::config::{self, ECHO_TARGET, SessionConfig};
use crate::dataframe::arena::{NodeArena, NodeRef};
use crate::dataframe::node::{Node, NodeKind, OutputSchema};
use crate::dataframe::{ApplyOptions, DataFrame};
use crate::expr::{Expression, Scope};
use crate::functions::registry::{
    Deployment,
    DeploymentRegistry,
    DeployStatement,
    ExistingDefinition,
    bodies_match,
    fields_match,
    is_duplicate_error,
    result_types_match,
};
use crate::functions::remote::RemoteFunction;
use crate::ident::QualifiedName;
use crate::row::RowSet;
use crate::types::coerce::unify;
use crate::types::{ColumnDef, ColumnSchema, DataType, RecordType, ScalarValue};

const SET_CONFIG_QUERY: &str = "SELECT pg_catalog.set_config($1::text, $2::text, false)";

const STORED_FUNCTION_QUERY: &str = "SELECT p.prosrc, pg_catalog.pg_get_function_result(p.oid), l.lanname \
    FROM pg_catalog.pg_proc p \
    JOIN pg_catalog.pg_language l ON l.oid = p.prolang \
    WHERE p.oid = pg_catalog.to_regprocedure($1::text)";

const STORED_AGGREGATE_QUERY: &str = "SELECT \
    a.aggtransfn::oid = pg_catalog.to_regprocedure($2::text)::oid, \
    a.aggtranstype = pg_catalog.to_regtype($3::text)::oid, \
    a.agginitval, \
    a.aggfinalfn::oid = COALESCE(pg_catalog.to_regprocedure($4::text)::oid, 0) \
    FROM pg_catalog.pg_aggregate a \
    WHERE a.aggfnoid = pg_catalog.to_regprocedure($1::text)::oid";

const STORED_TYPE_FIELDS_QUERY: &str = "SELECT a.attname, format_type(a.atttypid, a.atttypmod) \
    FROM pg_catalog.pg_type t \
    JOIN pg_catalog.pg_namespace n ON n.oid = t.typnamespace \
    JOIN pg_catalog.pg_attribute a ON a.attrelid = t.typrelid \
    WHERE t.typname = $1::text \
    AND (n.nspname = $2::text OR ($2::text = 'pg_temp' AND n.oid = pg_my_temp_schema())) \
    AND a.attnum > 0 AND NOT a.attisdropped \
    ORDER BY a.attnum";

const DESCRIBE_TABLE_QUERY: &str = "SELECT a.attname, format_type(a.atttypid, a.atttypmod) \
    FROM pg_catalog.pg_attribute a \
    WHERE a.attrelid = $1::text::regclass \
    AND a.attnum > 0 AND NOT a.attisdropped \
    ORDER BY a.attnum";

/// Handle to a single backend session.
///
/// Cloning the handle is cheap and clones share the session. Statements
/// issued through a handle run one at a time in the order they're issued.
/// Use separate handles (separate connections) for concurrent queries.
#[derive(Debug, Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
}

#[derive(Debug)]
struct DatabaseInner {
    arena: RwLock<NodeArena>,
    executor: Mutex<Box<dyn SqlExecutor>>,
    config: RwLock<SessionConfig>,
    registry: Mutex<DeploymentRegistry>,
    /// Number of times each relation was written through this handle.
    versions: Mutex<HashMap<QualifiedName, u64>>,
}

impl Database {
    pub fn new(executor: impl SqlExecutor + 'static) -> Self {
        Database {
            inner: Arc::new(DatabaseInner {
                arena: RwLock::new(NodeArena::default()),
                executor: Mutex::new(Box::new(executor)),
                config: RwLock::new(SessionConfig::default()),
                registry: Mutex::new(DeploymentRegistry::default()),
                versions: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Change a setting. Settings backed by a run-time parameter are sent to
    /// the backend, and the setting is left unchanged if that fails.
    pub fn set_setting(&self, name: &str, value: impl Into<ScalarValue>) -> Result<()> {
        let mut config = self.inner.config.write();
        let mut updated = config.clone();
        updated.set_from_scalar(name, value.into())?;
        self.sync_backend_parameter(&updated, name)?;
        *config = updated;
        Ok(())
    }

    pub fn get_setting(&self, name: &str) -> Result<ScalarValue> {
        self.inner.config.read().get_as_scalar(name)
    }

    pub fn reset_setting(&self, name: &str) -> Result<()> {
        let mut config = self.inner.config.write();
        let mut updated = config.clone();
        updated.reset(name)?;
        self.sync_backend_parameter(&updated, name)?;
        *config = updated;
        Ok(())
    }

    fn sync_backend_parameter(&self, config: &SessionConfig, name: &str) -> Result<()> {
        if let Some(parameter) = SessionConfig::backend_parameter(name)? {
            let value = config.get_as_scalar(name)?;
            self.query(SET_CONFIG_QUERY, &[ScalarValue::from(parameter), value])?;
            debug!(%parameter, "set backend parameter");
        }
        Ok(())
    }

    pub fn function_schema(&self) -> String {
        self.inner.config.read().function_schema.clone()
    }

    pub(crate) fn push_node(&self, node: Node) -> DataFrame {
        let node = self.inner.arena.write().push(node);
        DataFrame::new(self.clone(), node)
    }

    pub(crate) fn node(&self, node: NodeRef) -> Result<Arc<Node>> {
        self.inner.arena.read().get(node).cloned()
    }

    /// Check if two handles share the same session.
    pub fn same_session(&self, other: &Database) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn compile(&self, node: NodeRef) -> Result<CompiledQuery> {
        let function_schema = self.function_schema();
        let arena = self.inner.arena.read();
        QueryCompiler::new(&arena, &function_schema).compile(node)
    }

    /// A base relation by name. Its columns are looked up by the backend
    /// when the query runs.
    pub fn table(&self, name: impl Into<QualifiedName>) -> DataFrame {
        self.push_node(Node::new(
            NodeKind::Table { name: name.into() },
            OutputSchema::Unresolved,
        ))
    }

    pub fn table_in(&self, schema: impl Into<String>, name: impl Into<String>) -> DataFrame {
        self.table(QualifiedName::new(Some(schema), name))
    }

    /// A base relation with known columns.
    pub fn table_with_schema(
        &self,
        name: impl Into<QualifiedName>,
        columns: impl IntoIterator<Item = ColumnDef>,
    ) -> Result<DataFrame> {
        let schema = ColumnSchema::try_new(columns)?;
        Ok(self.push_node(Node::new(
            NodeKind::Table { name: name.into() },
            OutputSchema::Resolved(schema),
        )))
    }

    /// A base relation with columns looked up from the catalog.
    pub fn describe_table(&self, name: impl Into<QualifiedName>) -> Result<DataFrame> {
        let name = name.into();
        let rows = self.query(DESCRIBE_TABLE_QUERY, &[ScalarValue::Text(name.to_string())])?;
        if rows.is_empty() {
            return Err(DbError::unresolved_column(format!(
                "Relation {name} has no columns"
            )));
        }
        let columns = rows
            .iter()
            .map(|row| {
                let col = row.value(0).required("column name")?.try_as_str()?;
                let typ = row.value(1).required("column type")?.try_as_str()?;
                Ok(ColumnDef::new(col, DataType::from_sql_name(typ)))
            })
            .collect::<Result<Vec<_>>>()?;
        self.table_with_schema(name, columns)
    }

    /// Rows provided by the client. Column types are inferred from the
    /// values.
    pub fn from_rows<S: AsRef<str>>(
        &self,
        columns: &[S],
        rows: impl IntoIterator<Item = Vec<ScalarValue>>,
    ) -> Result<DataFrame> {
        let rows: Vec<_> = rows.into_iter().collect();
        check_row_widths(columns.len(), &rows)?;

        let mut defs = Vec::with_capacity(columns.len());
        for (idx, name) in columns.iter().enumerate() {
            let mut datatype = DataType::Null;
            for row in &rows {
                let value_type = row[idx].datatype();
                datatype = unify(&datatype, &value_type).ok_or_else(|| {
                    DbError::type_mismatch(format!(
                        "Column '{}' mixes values of type {datatype} and {value_type}",
                        name.as_ref()
                    ))
                })?;
            }
            if datatype.is_null() {
                datatype = DataType::Text;
            }
            defs.push(ColumnDef::new(name.as_ref(), datatype));
        }

        self.from_rows_with_schema(ColumnSchema::try_new(defs)?, rows)
    }

    /// Rows provided by the client with explicit column types.
    pub fn from_rows_with_schema(
        &self,
        schema: ColumnSchema,
        rows: impl IntoIterator<Item = Vec<ScalarValue>>,
    ) -> Result<DataFrame> {
        let rows: Vec<_> = rows.into_iter().collect();
        check_row_widths(schema.len(), &rows)?;
        if schema.is_empty() {
            return Err(DbError::invalid_argument("Rows require at least one column"));
        }
        Ok(self.push_node(Node::new(
            NodeKind::Values { rows },
            OutputSchema::Resolved(schema),
        )))
    }

    /// Rows provided column by column.
    pub fn from_columns(
        &self,
        columns: impl IntoIterator<Item = (String, Vec<ScalarValue>)>,
    ) -> Result<DataFrame> {
        let (names, values): (Vec<_>, Vec<_>) = columns.into_iter().unzip();
        let num_rows = values.first().map(|v| v.len()).unwrap_or(0);
        if let Some((idx, _)) = values.iter().enumerate().find(|(_, v)| v.len() != num_rows) {
            return Err(DbError::invalid_argument(format!(
                "Column '{}' has {} values, expected {num_rows}",
                names[idx],
                values[idx].len()
            )));
        }

        let mut rows = vec![Vec::with_capacity(names.len()); num_rows];
        for column in values {
            for (row, value) in rows.iter_mut().zip(column) {
                row.push(value);
            }
        }
        self.from_rows(&names[..], rows)
    }

    /// Select constants and function calls without a source dataframe.
    pub fn select<I, E>(&self, exprs: I) -> Result<DataFrame>
    where
        I: IntoIterator<Item = E>,
        E: Into<Expression>,
    {
        let mut columns = Vec::new();
        for expr in exprs {
            let expr = expr.into();
            if expr.scope() != Scope::None {
                return Err(DbError::schema_mismatch(
                    "Select without a dataframe can't reference columns",
                ));
            }
            let name = expr.output_name().ok_or_else(|| {
                DbError::invalid_argument("Selected expression requires a name, use rename")
            })?;
            columns.push((name, expr));
        }
        DataFrame::project_exprs(self, None, columns)
    }

    /// Call a function without a source dataframe.
    pub fn apply(&self, call: Expression, options: ApplyOptions) -> Result<DataFrame> {
        if call.scope() != Scope::None {
            return Err(DbError::schema_mismatch(
                "Function applied without a dataframe can't reference columns",
            ));
        }
        DataFrame::apply_call(self, None, call, options)
    }

    /// Execute a raw statement.
    pub fn execute(&self, sql: &str, params: &[ScalarValue]) -> Result<Option<RowSet>> {
        if config::echo_sql() {
            info!(target: ECHO_TARGET, params = params.len(), "{sql}");
        }
        trace!(%sql, params = params.len(), "executing statement");

        let mut executor = self.inner.executor.lock();
        executor
            .execute(sql, params)
            .map_err(|err| err.with_sql(sql))
    }

    /// Execute a statement that must return rows.
    pub(crate) fn query(&self, sql: &str, params: &[ScalarValue]) -> Result<RowSet> {
        self.execute(sql, params)?.ok_or_else(|| {
            DbError::with_kind(
                DbErrorKind::Execution,
                "Statement didn't return a result set",
            )
            .with_sql(sql)
        })
    }

    /// Deploy a query's functions, then run it.
    pub(crate) fn run_query(&self, query: &CompiledQuery) -> Result<RowSet> {
        for function in &query.functions {
            self.deploy_function(function)?;
        }
        self.query(&query.sql, &query.params)
    }

    /// Drop a relation and invalidate rows cached from it.
    pub fn drop_table(&self, name: impl Into<QualifiedName>) -> Result<()> {
        let name = name.into();
        self.execute(&format!("DROP TABLE IF EXISTS {name}"), &[])?;
        self.bump_version(&name);
        Ok(())
    }

    pub(crate) fn bump_version(&self, name: &QualifiedName) {
        let mut versions = self.inner.versions.lock();
        *versions.entry(name.clone()).or_insert(0) += 1;
    }

    pub(crate) fn relation_versions(&self, names: &[QualifiedName]) -> HashMap<QualifiedName, u64> {
        let versions = self.inner.versions.lock();
        names
            .iter()
            .map(|name| (name.clone(), versions.get(name).copied().unwrap_or(0)))
            .collect()
    }

    /// Error if any relation was written through this handle since
    /// `seen` was captured.
    pub(crate) fn check_versions(&self, seen: &HashMap<QualifiedName, u64>) -> Result<()> {
        let versions = self.inner.versions.lock();
        for (name, version) in seen {
            let current = versions.get(name).copied().unwrap_or(0);
            if current != *version {
                return Err(DbError::stale_state(format!(
                    "Relation {name} was modified after its rows were fetched, call refresh()"
                )));
            }
        }
        Ok(())
    }

    /// Deploy a function, along with any record types it references.
    ///
    /// Deploying an identical definition again is a no-op.
    pub fn deploy_function(&self, function: &Arc<RemoteFunction>) -> Result<()> {
        if function.is_builtin() {
            return Ok(());
        }
        let schema = self.function_schema();
        for record in function.referenced_records() {
            self.deploy(Deployment::for_record(&record, &schema))?;
        }
        self.deploy(function.deployment(&schema)?)
    }

    /// Deploy a composite type.
    pub fn deploy_type(&self, record: &RecordType) -> Result<()> {
        let schema = self.function_schema();
        for field in &record.fields {
            if let DataType::Record(inner) = &field.datatype {
                self.deploy_type(inner)?;
            }
        }
        self.deploy(Deployment::for_record(record, &schema))
    }

    /// Drop a deployed function and its helpers.
    pub fn drop_function(&self, function: &Arc<RemoteFunction>) -> Result<()> {
        let schema = self.function_schema();
        let mut registry = self.inner.registry.lock();
        for stmt in function.drop_statements(&schema) {
            self.execute(&stmt, &[])?;
        }
        registry.remove(&function.qualified_name(&schema));
        Ok(())
    }

    fn deploy(&self, deployment: Deployment) -> Result<()> {
        let mut registry = self.inner.registry.lock();
        if registry.check(&deployment)? {
            trace!(name = %deployment.name, "already deployed");
            return Ok(());
        }

        for stmt in &deployment.statements {
            match self.execute(&stmt.sql, &[]) {
                Ok(_) => (),
                Err(err) if is_duplicate_error(&err) => {
                    self.verify_existing(stmt)?;
                }
                Err(err) => return Err(err),
            }
        }

        registry.record(&deployment);
        debug!(name = %deployment.name, fingerprint = %deployment.fingerprint, "deployed");
        Ok(())
    }

    /// Check that an object the backend reported as existing matches the
    /// definition being deployed.
    fn verify_existing(&self, stmt: &DeployStatement) -> Result<()> {
        let object = &stmt.object;

        let matches = match &stmt.existing {
            ExistingDefinition::Function {
                signature,
                body,
                result,
                language,
            } => {
                let rows = self.query(STORED_FUNCTION_QUERY, &[ScalarValue::Text(signature.clone())])?;
                match rows.row(0) {
                    Some(row) => {
                        let stored_body = row.value(0).required("function body")?.try_as_str()?;
                        let stored_result = row.value(1).required("function result")?.try_as_str()?;
                        let stored_language = row.value(2).required("function language")?.try_as_str()?;
                        bodies_match(body, stored_body)
                            && result_types_match(result, stored_result)
                            && language == stored_language
                    }
                    // Same name, other overloads only.
                    None => false,
                }
            }
            ExistingDefinition::Aggregate {
                signature,
                transition,
                state_type,
                initial_state,
                finalize,
            } => {
                let params = [
                    ScalarValue::Text(signature.clone()),
                    ScalarValue::Text(transition.clone()),
                    ScalarValue::Text(state_type.clone()),
                    finalize.clone().map(ScalarValue::Text).unwrap_or(ScalarValue::Null),
                ];
                let rows = self.query(STORED_AGGREGATE_QUERY, &params)?;
                match rows.row(0) {
                    Some(row) => {
                        // Comparisons are NULL when a referenced helper or type doesn't exist.
                        let is_true = |idx| matches!(row.value(idx), Some(ScalarValue::Boolean(true)));
                        let stored_initial = match row.value(2).required("initial state")? {
                            ScalarValue::Null => None,
                            v => Some(v.try_as_str()?),
                        };
                        is_true(0) && is_true(1) && is_true(3) && stored_initial == initial_state.as_deref()
                    }
                    None => false,
                }
            }
            ExistingDefinition::Type(record) => {
                let schema = object.schema.clone().unwrap_or_default();
                let params = [
                    ScalarValue::Text(object.name.clone()),
                    ScalarValue::Text(schema),
                ];
                let rows = self.query(STORED_TYPE_FIELDS_QUERY, &params)?;
                let stored = rows
                    .iter()
                    .map(|row| {
                        let name = row.value(0).required("attribute name")?.try_as_str()?;
                        let typ = row.value(1).required("attribute type")?.try_as_str()?;
                        Ok((name.to_string(), typ.to_string()))
                    })
                    .collect::<Result<Vec<_>>>()?;
                fields_match(record, &stored)
            }
        };

        if !matches {
            return Err(DbError::definition_conflict(format!(
                "{object} already exists with a different definition"
            ))
            .with_sql(stmt.sql.clone()));
        }
        debug!(%object, "reusing existing definition");
        Ok(())
    }
}

fn check_row_widths(width: usize, rows: &[Vec<ScalarValue>]) -> Result<()> {
    for (idx, row) in rows.iter().enumerate() {
        if row.len() != width {
            return Err(DbError::invalid_argument(format!(
                "Row {idx} has {} values, expected {width}",
                row.len()
            )));
        }
    }
    Ok(())
}

