use std::fmt;
use std::sync::Arc;

use sqlframe_error::{DbError, Result};

use super::environment::ProcedureEnvironment;
use super::registry::{DeployStatement, Deployment, DeploymentKind, ExistingDefinition, Fingerprint};
use crate::ident::{QualifiedName, dollar_quote, quote_ident, quote_literal};
use crate::types::{DataType, RecordType, ScalarValue};

/// How a function consumes rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallingConvention {
    /// One row of arguments in, one value out.
    Scalar,
    /// Aggregated parameters receive an array holding the column's values
    /// for the whole group.
    Array,
    /// Transition function folded over the rows of a group.
    Aggregate,
}

impl fmt::Display for CallingConvention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar => write!(f, "scalar"),
            Self::Array => write!(f, "array"),
            Self::Aggregate => write!(f, "aggregate"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Parameter {
    pub name: String,
    /// For aggregated parameters, the type of a single element.
    pub datatype: DataType,
    /// Receives the group's values as an array (array convention only).
    pub aggregated: bool,
}

impl Parameter {
    pub fn new(name: impl Into<String>, datatype: DataType) -> Self {
        Parameter {
            name: name.into(),
            datatype,
            aggregated: false,
        }
    }

    pub fn aggregated(name: impl Into<String>, datatype: DataType) -> Self {
        Parameter {
            name: name.into(),
            datatype,
            aggregated: true,
        }
    }

    /// The type the deployed function declares for this parameter.
    pub fn declared_type(&self) -> DataType {
        if self.aggregated {
            DataType::list(self.datatype.clone())
        } else {
            self.datatype.clone()
        }
    }
}

/// Resolves argument types to a return type for builtins with overloads.
pub type ResolveFn = fn(&[DataType]) -> Result<DataType>;

#[derive(Debug, Clone)]
pub enum Signature {
    Exact(Vec<Parameter>),
    /// Builtins with backend overloads. `resolve` checks the argument types
    /// and computes the return type.
    Variadic {
        min: usize,
        max: Option<usize>,
        resolve: ResolveFn,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ReturnShape {
    Value(DataType),
    /// Same type as the parameter at this index.
    SameAsArgument(usize),
    /// A composite value.
    Record(RecordType),
    /// Zero or more values per call.
    Set(DataType),
}

/// Source for a function body together with the environment executing it.
#[derive(Debug, Clone)]
pub struct FunctionBody {
    pub environment: Arc<dyn ProcedureEnvironment>,
    pub source: String,
}

impl FunctionBody {
    pub fn new(environment: impl ProcedureEnvironment + 'static, source: impl Into<String>) -> Self {
        FunctionBody {
            environment: Arc::new(environment),
            source: source.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AggregateParts {
    /// Name of the state parameter in the transition and final bodies.
    pub state_name: String,
    pub state_type: DataType,
    /// Body over `(state, args...)` returning the new state.
    pub transition: FunctionBody,
    pub initial_state: Option<ScalarValue>,
    /// Body over `(state)` and its return type.
    pub finalize: Option<(FunctionBody, DataType)>,
}

#[derive(Debug, Clone)]
pub enum Definition {
    /// Exists in the backend already.
    Builtin,
    Body(FunctionBody),
    Aggregate(AggregateParts),
}

/// A function invoked from generated SQL.
///
/// Functions with a definition are deployed before the first statement
/// referencing them executes. Deployment is idempotent per database handle.
#[derive(Debug, Clone)]
pub struct RemoteFunction {
    pub(crate) name: String,
    pub(crate) schema: Option<String>,
    pub(crate) signature: Signature,
    pub(crate) returns: ReturnShape,
    pub(crate) convention: CallingConvention,
    pub(crate) definition: Definition,
}

impl RemoteFunction {
    pub fn scalar() -> FunctionBuilder {
        FunctionBuilder::new(CallingConvention::Scalar)
    }

    pub fn array() -> FunctionBuilder {
        FunctionBuilder::new(CallingConvention::Array)
    }

    pub fn aggregate() -> FunctionBuilder {
        FunctionBuilder::new(CallingConvention::Aggregate)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    pub fn convention(&self) -> CallingConvention {
        self.convention
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn returns(&self) -> &ReturnShape {
        &self.returns
    }

    pub fn definition(&self) -> &Definition {
        &self.definition
    }

    pub fn is_builtin(&self) -> bool {
        matches!(self.definition, Definition::Builtin)
    }

    pub fn returns_set(&self) -> bool {
        matches!(self.returns, ReturnShape::Set(_))
    }

    pub fn parameters(&self) -> &[Parameter] {
        match &self.signature {
            Signature::Exact(params) => params,
            Signature::Variadic { .. } => &[],
        }
    }

    /// Name used at call sites. Builtins are never qualified.
    pub fn qualified_name(&self, default_schema: &str) -> QualifiedName {
        if self.is_builtin() {
            return QualifiedName {
                schema: self.schema.clone(),
                name: self.name.clone(),
            };
        }
        QualifiedName {
            schema: Some(
                self.schema
                    .clone()
                    .unwrap_or_else(|| default_schema.to_string()),
            ),
            name: self.name.clone(),
        }
    }

    /// Record types that need to exist before this function can be
    /// deployed.
    pub fn referenced_records(&self) -> Vec<RecordType> {
        fn collect(datatype: &DataType, out: &mut Vec<RecordType>) {
            match datatype {
                DataType::Record(record) => {
                    for field in &record.fields {
                        collect(&field.datatype, out);
                    }
                    if !out.contains(record) {
                        out.push(record.clone());
                    }
                }
                DataType::List(inner) => collect(inner, out),
                _ => (),
            }
        }

        let mut out = Vec::new();
        for param in self.parameters() {
            collect(&param.datatype, &mut out);
        }
        match &self.returns {
            ReturnShape::Value(dt) | ReturnShape::Set(dt) => collect(dt, &mut out),
            ReturnShape::Record(record) => collect(&DataType::Record(record.clone()), &mut out),
            ReturnShape::SameAsArgument(_) => (),
        }
        if let Definition::Aggregate(parts) = &self.definition {
            collect(&parts.state_type, &mut out);
            if let Some((_, dt)) = &parts.finalize {
                collect(dt, &mut out);
            }
        }
        out
    }

    /// Compute the return type for a call with the given argument types.
    pub fn return_type(&self, arg_types: &[DataType]) -> Result<DataType> {
        if let Signature::Variadic { resolve, .. } = &self.signature {
            return resolve(arg_types);
        }
        Ok(match &self.returns {
            ReturnShape::Value(dt) | ReturnShape::Set(dt) => dt.clone(),
            ReturnShape::Record(record) => DataType::Record(record.clone()),
            ReturnShape::SameAsArgument(idx) => self
                .parameters()
                .get(*idx)
                .map(|p| p.datatype.clone())
                .ok_or_else(|| DbError::new("Return shape references a missing parameter"))?,
        })
    }

    fn declared_arg_types(&self) -> String {
        self.parameters()
            .iter()
            .map(|p| p.declared_type().sql_name())
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn declared_params(&self) -> String {
        self.parameters()
            .iter()
            .map(|p| format!("{} {}", quote_ident(&p.name), p.declared_type().sql_name()))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn declared_return(&self) -> Result<String> {
        Ok(match &self.returns {
            ReturnShape::Value(dt) => dt.sql_name(),
            ReturnShape::Set(dt) => format!("SETOF {}", dt.sql_name()),
            ReturnShape::Record(record) => DataType::Record(record.clone()).sql_name(),
            ReturnShape::SameAsArgument(_) => self.return_type(&[])?.sql_name(),
        })
    }

    fn helper_name(&self, default_schema: &str, suffix: &str) -> QualifiedName {
        let mut name = self.qualified_name(default_schema);
        name.name = format!("{}__{suffix}", name.name);
        name
    }

    /// Build the statements deploying this function.
    pub fn deployment(&self, default_schema: &str) -> Result<Deployment> {
        let name = self.qualified_name(default_schema);
        let statements = match &self.definition {
            Definition::Builtin => {
                return Err(DbError::invalid_argument(format!(
                    "Builtin function '{}' can't be deployed",
                    self.name
                )));
            }
            Definition::Body(body) => {
                let prepared = body
                    .environment
                    .prepare_body(&body.source, self.parameters())?;
                let result = self.declared_return()?;
                let sql = format!(
                    "CREATE FUNCTION {name}({}) RETURNS {result} AS {} LANGUAGE {}",
                    self.declared_params(),
                    dollar_quote(&prepared),
                    quote_ident(body.environment.language()),
                );
                vec![DeployStatement {
                    sql,
                    object: name.clone(),
                    existing: ExistingDefinition::Function {
                        signature: format!("{name}({})", self.declared_arg_types()),
                        body: prepared,
                        result,
                        language: body.environment.language().to_string(),
                    },
                }]
            }
            Definition::Aggregate(parts) => {
                let mut statements = Vec::with_capacity(3);
                let state_type = parts.state_type.sql_name();

                let sfunc = self.helper_name(default_schema, "sfunc");
                let mut state_params = vec![Parameter::new(&parts.state_name, parts.state_type.clone())];
                state_params.extend(self.parameters().iter().cloned());
                let transition = parts
                    .transition
                    .environment
                    .prepare_body(&parts.transition.source, &state_params)?;
                let sfunc_params = state_params
                    .iter()
                    .map(|p| format!("{} {}", quote_ident(&p.name), p.declared_type().sql_name()))
                    .collect::<Vec<_>>()
                    .join(", ");
                let sfunc_signature = format!(
                    "{sfunc}({})",
                    state_params
                        .iter()
                        .map(|p| p.declared_type().sql_name())
                        .collect::<Vec<_>>()
                        .join(", ")
                );
                statements.push(DeployStatement {
                    sql: format!(
                        "CREATE FUNCTION {sfunc}({sfunc_params}) RETURNS {state_type} AS {} LANGUAGE {}",
                        dollar_quote(&transition),
                        quote_ident(parts.transition.environment.language()),
                    ),
                    object: sfunc.clone(),
                    existing: ExistingDefinition::Function {
                        signature: sfunc_signature.clone(),
                        body: transition,
                        result: state_type.clone(),
                        language: parts.transition.environment.language().to_string(),
                    },
                });

                let mut aggregate_options = vec![
                    format!("SFUNC = {sfunc}"),
                    format!("STYPE = {state_type}"),
                ];

                let mut ffunc_signature = None;
                if let Some((body, return_type)) = &parts.finalize {
                    let ffunc = self.helper_name(default_schema, "ffunc");
                    let state_param = [Parameter::new(&parts.state_name, parts.state_type.clone())];
                    let prepared = body.environment.prepare_body(&body.source, &state_param)?;
                    let signature = format!("{ffunc}({state_type})");
                    statements.push(DeployStatement {
                        sql: format!(
                            "CREATE FUNCTION {ffunc}({} {state_type}) RETURNS {} AS {} LANGUAGE {}",
                            quote_ident(&parts.state_name),
                            return_type.sql_name(),
                            dollar_quote(&prepared),
                            quote_ident(body.environment.language()),
                        ),
                        object: ffunc.clone(),
                        existing: ExistingDefinition::Function {
                            signature: signature.clone(),
                            body: prepared,
                            result: return_type.sql_name(),
                            language: body.environment.language().to_string(),
                        },
                    });
                    aggregate_options.push(format!("FINALFUNC = {ffunc}"));
                    ffunc_signature = Some(signature);
                }

                let initial_state = parts
                    .initial_state
                    .as_ref()
                    .filter(|v| !v.is_null())
                    .map(|v| v.to_input_literal());
                if let Some(initial) = &initial_state {
                    // DDL can't take bound parameters.
                    aggregate_options.push(format!("INITCOND = {}", quote_literal(initial)));
                }

                let arg_types = self.declared_arg_types();
                statements.push(DeployStatement {
                    sql: format!(
                        "CREATE AGGREGATE {name}({arg_types}) ({})",
                        aggregate_options.join(", ")
                    ),
                    object: name.clone(),
                    existing: ExistingDefinition::Aggregate {
                        signature: format!("{name}({arg_types})"),
                        transition: sfunc_signature,
                        state_type,
                        initial_state,
                        finalize: ffunc_signature,
                    },
                });

                statements
            }
        };

        let fingerprint = Fingerprint::of_statements(statements.iter().map(|s| s.sql.as_str()));

        Ok(Deployment {
            name,
            kind: DeploymentKind::Function,
            statements,
            fingerprint,
        })
    }

    /// Statements removing this function and any helpers.
    pub fn drop_statements(&self, default_schema: &str) -> Vec<String> {
        let name = self.qualified_name(default_schema);
        let arg_types = self.declared_arg_types();
        match &self.definition {
            Definition::Builtin => Vec::new(),
            Definition::Body(_) => vec![format!("DROP FUNCTION IF EXISTS {name}({arg_types})")],
            Definition::Aggregate(parts) => {
                let state_type = parts.state_type.sql_name();
                let sfunc_args = if arg_types.is_empty() {
                    state_type.clone()
                } else {
                    format!("{state_type}, {arg_types}")
                };
                let mut stmts = vec![
                    format!("DROP AGGREGATE IF EXISTS {name}({arg_types})"),
                    format!(
                        "DROP FUNCTION IF EXISTS {}({sfunc_args})",
                        self.helper_name(default_schema, "sfunc")
                    ),
                ];
                if parts.finalize.is_some() {
                    stmts.push(format!(
                        "DROP FUNCTION IF EXISTS {}({state_type})",
                        self.helper_name(default_schema, "ffunc")
                    ));
                }
                stmts
            }
        }
    }
}

/// Builder for user defined remote functions.
#[derive(Debug)]
pub struct FunctionBuilder {
    convention: CallingConvention,
    name: Option<String>,
    schema: Option<String>,
    params: Vec<Parameter>,
    returns: Option<ReturnShape>,
    body: Option<FunctionBody>,
    state: Option<(String, DataType)>,
    initial_state: Option<ScalarValue>,
    finalize: Option<(FunctionBody, DataType)>,
}

impl FunctionBuilder {
    fn new(convention: CallingConvention) -> Self {
        FunctionBuilder {
            convention,
            name: None,
            schema: None,
            params: Vec::new(),
            returns: None,
            body: None,
            state: None,
            initial_state: None,
            finalize: None,
        }
    }

    /// Name of the deployed function.
    ///
    /// Defaults to a name derived from the definition, so identical
    /// definitions share a name and different ones never collide.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Schema to deploy into. Defaults to the session's `function_schema`.
    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn param(mut self, name: impl Into<String>, datatype: DataType) -> Self {
        self.params.push(Parameter::new(name, datatype));
        self
    }

    /// A parameter receiving all of a group's values as an array.
    pub fn aggregated_param(mut self, name: impl Into<String>, datatype: DataType) -> Self {
        self.params.push(Parameter::aggregated(name, datatype));
        self
    }

    pub fn returns(mut self, shape: ReturnShape) -> Self {
        self.returns = Some(shape);
        self
    }

    pub fn body(mut self, environment: impl ProcedureEnvironment + 'static, source: impl Into<String>) -> Self {
        self.body = Some(FunctionBody::new(environment, source));
        self
    }

    /// State of an aggregate, named `name` in the transition and final
    /// bodies.
    pub fn state(mut self, name: impl Into<String>, datatype: DataType) -> Self {
        self.state = Some((name.into(), datatype));
        self
    }

    /// Transition body of an aggregate, same as `body`.
    pub fn transition(self, environment: impl ProcedureEnvironment + 'static, source: impl Into<String>) -> Self {
        self.body(environment, source)
    }

    pub fn initial_state(mut self, value: impl Into<ScalarValue>) -> Self {
        self.initial_state = Some(value.into());
        self
    }

    pub fn finalize(
        mut self,
        environment: impl ProcedureEnvironment + 'static,
        source: impl Into<String>,
        returns: DataType,
    ) -> Self {
        self.finalize = Some((FunctionBody::new(environment, source), returns));
        self
    }

    pub fn build(self) -> Result<Arc<RemoteFunction>> {
        let body = self.body.ok_or_else(|| {
            DbError::invalid_argument(format!("A {} function requires a body", self.convention))
        })?;

        if self.convention != CallingConvention::Array && self.params.iter().any(|p| p.aggregated) {
            return Err(DbError::invalid_argument(
                "Aggregated parameters are only allowed for array functions",
            ));
        }

        for (idx, param) in self.params.iter().enumerate() {
            if self.params[..idx].iter().any(|p| p.name == param.name) {
                return Err(DbError::invalid_argument(format!(
                    "Duplicate parameter name '{}'",
                    param.name
                )));
            }
        }

        let (returns, definition) = match self.convention {
            CallingConvention::Scalar | CallingConvention::Array => {
                let returns = self.returns.ok_or_else(|| {
                    DbError::invalid_argument("Function requires a return shape")
                })?;
                (returns, Definition::Body(body))
            }
            CallingConvention::Aggregate => {
                let (state_name, state_type) = self.state.ok_or_else(|| {
                    DbError::invalid_argument("Aggregate requires a state type")
                })?;
                if self.params.iter().any(|p| p.name == state_name) {
                    return Err(DbError::invalid_argument(format!(
                        "Aggregate state name '{state_name}' collides with a parameter"
                    )));
                }
                let output = match &self.finalize {
                    Some((_, dt)) => dt.clone(),
                    None => state_type.clone(),
                };
                if let Some(returns) = &self.returns {
                    if returns != &ReturnShape::Value(output.clone()) {
                        return Err(DbError::invalid_argument(
                            "Aggregate return shape must match its final type",
                        ));
                    }
                }
                (
                    ReturnShape::Value(output),
                    Definition::Aggregate(AggregateParts {
                        state_name,
                        state_type,
                        transition: body,
                        initial_state: self.initial_state,
                        finalize: self.finalize,
                    }),
                )
            }
        };

        match &returns {
            ReturnShape::SameAsArgument(idx) if *idx >= self.params.len() => {
                return Err(DbError::invalid_argument(format!(
                    "Return shape references parameter {idx}, function has {} parameters",
                    self.params.len()
                )));
            }
            ReturnShape::Set(_) if self.convention != CallingConvention::Scalar => {
                return Err(DbError::invalid_argument(
                    "Only scalar functions can return sets",
                ));
            }
            _ => (),
        }

        let mut function = RemoteFunction {
            name: String::new(),
            schema: self.schema,
            signature: Signature::Exact(self.params),
            returns,
            convention: self.convention,
            definition,
        };

        function.name = match self.name {
            Some(name) if name.is_empty() => {
                return Err(DbError::invalid_argument("Function name cannot be empty"));
            }
            Some(name) => name,
            None => default_name(&function),
        };

        Ok(Arc::new(function))
    }
}

/// Derive a name from everything that defines the function.
fn default_name(function: &RemoteFunction) -> String {
    let mut content = format!(
        "{}|{:?}|{:?}",
        function.convention,
        function.parameters(),
        function.returns
    );
    match &function.definition {
        Definition::Builtin => (),
        Definition::Body(body) => {
            content.push_str(body.environment.language());
            content.push_str(&body.source);
        }
        Definition::Aggregate(parts) => {
            content.push_str(&format!("{}|{:?}", parts.state_name, parts.state_type));
            content.push_str(parts.transition.environment.language());
            content.push_str(&parts.transition.source);
            if let Some(initial) = &parts.initial_state {
                content.push_str(&initial.to_input_literal());
            }
            if let Some((body, dt)) = &parts.finalize {
                content.push_str(&format!("{dt:?}"));
                content.push_str(&body.source);
            }
        }
    }
    let digest = md5::compute(content.as_bytes());
    let hex = format!("{digest:x}");
    format!("fn_{}", &hex[..16])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::environment::{PlPgSqlEnvironment, SqlEnvironment};

    fn double() -> Arc<RemoteFunction> {
        RemoteFunction::scalar()
            .name("double")
            .param("x", DataType::Int64)
            .returns(ReturnShape::Value(DataType::Int64))
            .body(SqlEnvironment, "SELECT x * 2")
            .build()
            .unwrap()
    }

    #[test]
    fn scalar_deployment_sql() {
        let deployment = double().deployment("pg_temp").unwrap();
        assert_eq!(1, deployment.statements.len());
        assert_eq!(
            "CREATE FUNCTION \"pg_temp\".\"double\"(\"x\" int8) RETURNS int8 AS $sqlframe$SELECT x * 2$sqlframe$ LANGUAGE \"sql\"",
            deployment.statements[0].sql
        );
        assert_eq!(
            ExistingDefinition::Function {
                signature: "\"pg_temp\".\"double\"(int8)".to_string(),
                body: "SELECT x * 2".to_string(),
                result: "int8".to_string(),
                language: "sql".to_string(),
            },
            deployment.statements[0].existing
        );
    }

    #[test]
    fn default_name_is_deterministic() {
        let build = |src: &str| {
            RemoteFunction::scalar()
                .param("x", DataType::Int64)
                .returns(ReturnShape::Value(DataType::Int64))
                .body(SqlEnvironment, src)
                .build()
                .unwrap()
        };
        let a = build("SELECT x");
        let b = build("SELECT x");
        let c = build("SELECT x + 1");
        assert_eq!(a.name(), b.name());
        assert_ne!(a.name(), c.name());
        assert!(a.name().starts_with("fn_"));
        assert_eq!(19, a.name().len());
    }

    #[test]
    fn array_params_declared_as_arrays() {
        let func = RemoteFunction::array()
            .name("med")
            .aggregated_param("v", DataType::Float64)
            .returns(ReturnShape::Value(DataType::Float64))
            .body(PlPgSqlEnvironment, "RETURN v[1]")
            .build()
            .unwrap();
        let deployment = func.deployment("pg_temp").unwrap();
        assert!(
            deployment.statements[0]
                .sql
                .starts_with("CREATE FUNCTION \"pg_temp\".\"med\"(\"v\" float8[]) RETURNS float8"),
            "{}",
            deployment.statements[0].sql
        );
    }

    #[test]
    fn aggregate_deployment() {
        let func = RemoteFunction::aggregate()
            .name("my_sum")
            .param("x", DataType::Int64)
            .state("acc", DataType::Int64)
            .transition(SqlEnvironment, "SELECT acc + x")
            .initial_state(0_i64)
            .build()
            .unwrap();
        assert_eq!(&ReturnShape::Value(DataType::Int64), func.returns());

        let deployment = func.deployment("pg_temp").unwrap();
        let sql: Vec<_> = deployment.statements.iter().map(|s| s.sql.as_str()).collect();
        assert_eq!(2, sql.len());
        assert!(sql[0].starts_with(
            "CREATE FUNCTION \"pg_temp\".\"my_sum__sfunc\"(\"acc\" int8, \"x\" int8) RETURNS int8"
        ));
        assert_eq!(
            "CREATE AGGREGATE \"pg_temp\".\"my_sum\"(int8) (SFUNC = \"pg_temp\".\"my_sum__sfunc\", STYPE = int8, INITCOND = '0')",
            sql[1]
        );

        let drops = func.drop_statements("pg_temp");
        assert_eq!(
            vec![
                "DROP AGGREGATE IF EXISTS \"pg_temp\".\"my_sum\"(int8)".to_string(),
                "DROP FUNCTION IF EXISTS \"pg_temp\".\"my_sum__sfunc\"(int8, int8)".to_string(),
            ],
            drops
        );
    }

    #[test]
    fn aggregate_with_finalize() {
        let func = RemoteFunction::aggregate()
            .name("avg_len")
            .param("s", DataType::Text)
            .state("st", DataType::list(DataType::Int64))
            .transition(SqlEnvironment, "SELECT array[st[1] + length(s), st[2] + 1]")
            .initial_state(ScalarValue::list(
                DataType::Int64,
                [0_i64.into(), 0_i64.into()],
            ))
            .finalize(SqlEnvironment, "SELECT st[1]::float8 / st[2]", DataType::Float64)
            .build()
            .unwrap();
        let deployment = func.deployment("pg_temp").unwrap();
        assert_eq!(3, deployment.statements.len());
        assert!(
            deployment.statements[2]
                .sql
                .contains("FINALFUNC = \"pg_temp\".\"avg_len__ffunc\", INITCOND = '{\"0\",\"0\"}'")
        );
        assert_eq!(
            DataType::Float64,
            func.return_type(&[DataType::Text]).unwrap()
        );
    }

    #[test]
    fn initial_state_elements_quoted() {
        let func = RemoteFunction::aggregate()
            .name("collect")
            .param("s", DataType::Text)
            .state("acc", DataType::list(DataType::Text))
            .transition(SqlEnvironment, "SELECT acc || s")
            .initial_state(ScalarValue::list(DataType::Text, ["a,b".into(), "".into()]))
            .build()
            .unwrap();
        let deployment = func.deployment("pg_temp").unwrap();
        let create = &deployment.statements[1];
        assert!(
            create.sql.ends_with("INITCOND = '{\"a,b\",\"\"}')"),
            "{}",
            create.sql
        );
        assert_eq!(
            ExistingDefinition::Aggregate {
                signature: "\"pg_temp\".\"collect\"(text)".to_string(),
                transition: "\"pg_temp\".\"collect__sfunc\"(text[], text)".to_string(),
                state_type: "text[]".to_string(),
                initial_state: Some("{\"a,b\",\"\"}".to_string()),
                finalize: None,
            },
            create.existing
        );
    }

    #[test]
    fn null_initial_state_omitted() {
        let func = RemoteFunction::aggregate()
            .name("my_max")
            .param("x", DataType::Int64)
            .state("acc", DataType::Int64)
            .transition(SqlEnvironment, "SELECT greatest(acc, x)")
            .initial_state(ScalarValue::Null)
            .build()
            .unwrap();
        let deployment = func.deployment("pg_temp").unwrap();
        assert!(!deployment.statements[1].sql.contains("INITCOND"));
    }

    #[test]
    fn aggregated_params_only_for_array_functions() {
        let err = RemoteFunction::scalar()
            .aggregated_param("x", DataType::Int64)
            .returns(ReturnShape::Value(DataType::Int64))
            .body(SqlEnvironment, "SELECT 1")
            .build()
            .unwrap_err();
        assert!(err.is_construction());
    }

    #[test]
    fn missing_body() {
        assert!(
            RemoteFunction::scalar()
                .returns(ReturnShape::Value(DataType::Int64))
                .build()
                .is_err()
        );
    }

    #[test]
    fn same_as_argument_bounds() {
        let err = RemoteFunction::scalar()
            .param("x", DataType::Int64)
            .returns(ReturnShape::SameAsArgument(1))
            .body(SqlEnvironment, "SELECT x")
            .build()
            .unwrap_err();
        assert!(err.is_construction());
    }
}
