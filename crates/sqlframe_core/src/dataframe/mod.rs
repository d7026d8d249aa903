//! Lazily evaluated relational operations.
//!
//! A [`DataFrame`] is a handle to a node in its database's node arena. Every
//! operation pushes a new node referencing its inputs, so lineage forms a DAG
//! and nothing touches the backend until rows are requested.

pub mod arena;
pub mod join;
pub mod materialize;
pub mod node;

use std::fmt;

use arena::NodeRef;
use node::{Node, NodeKind, OutputSchema, Projection, RESULT_COLUMN};
use sqlframe_error::{DbError, Result};

use crate::expr::column_expr::ColumnExpr;
use crate::expr::{ExprKind, Expression};
use crate::group::{GroupedFrame, GroupingSets, check_grouped};
use crate::order::OrderByExpr;
use crate::session::Database;
use crate::types::coerce::satisfies;
use crate::types::{ColumnDef, ColumnSchema, DataType};

pub use join::{ColumnSelection, JoinBuilder, JoinInput};
pub use materialize::{ExplainFormat, ExplainOutput, IndexOptions, SaveOptions};
pub use node::JoinKind;

/// Options for applying a function to a dataframe.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyOptions {
    /// Name of the output column. Defaults to the expression's alias, then
    /// the function's name.
    pub column_name: Option<String>,
    /// Expand a composite result into one column per field.
    pub expand: bool,
}

impl ApplyOptions {
    pub fn named(name: impl Into<String>) -> Self {
        ApplyOptions {
            column_name: Some(name.into()),
            expand: false,
        }
    }

    pub fn expanded() -> Self {
        ApplyOptions {
            column_name: None,
            expand: true,
        }
    }
}

#[derive(Clone)]
pub struct DataFrame {
    db: Database,
    node: NodeRef,
}

impl fmt::Debug for DataFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataFrame").field("node", &self.node).finish()
    }
}

impl DataFrame {
    pub(crate) fn new(db: Database, node: NodeRef) -> Self {
        DataFrame { db, node }
    }

    pub fn node_ref(&self) -> NodeRef {
        self.node
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn output_schema(&self) -> Result<OutputSchema> {
        Ok(self.db.node(self.node)?.schema.clone())
    }

    /// Output columns, None if the dataframe reads an unresolved relation.
    pub fn columns(&self) -> Result<Option<ColumnSchema>> {
        Ok(self.output_schema()?.resolved().cloned())
    }

    /// Reference a column of this dataframe.
    pub fn col(&self, name: &str) -> Result<Expression> {
        let datatype = self.db.node(self.node)?.schema.column_type(name)?;
        Ok(Expression::new(ExprKind::Column(ColumnExpr {
            name: name.to_string(),
            relation: self.node,
            join: None,
            datatype,
        })))
    }

    fn derive(&self, kind: NodeKind, schema: OutputSchema) -> DataFrame {
        self.db.push_node(Node::new(kind, schema))
    }

    fn check_same_database(&self, other: &DataFrame) -> Result<()> {
        if !self.db.same_session(&other.db) {
            return Err(DbError::schema_mismatch(
                "Dataframes belong to different databases",
            ));
        }
        Ok(())
    }

    /// Check an expression evaluated once per row of this dataframe.
    fn check_row_wise(&self, expr: &Expression, context: &str) -> Result<()> {
        expr.scope().check_frame(self.node)?;
        if expr.contains_aggregate() {
            return Err(DbError::invalid_argument(format!(
                "Aggregate and array functions can't be used in {context}, use group_by or apply"
            )));
        }
        Ok(())
    }

    /// Keep rows matching a predicate.
    ///
    /// Filtering a filtered dataframe fuses both predicates into one.
    #[doc(alias = "where")]
    pub fn filter(&self, predicate: Expression) -> Result<DataFrame> {
        self.check_row_wise(&predicate, "a filter")?;
        if predicate.contains_set_returning() {
            return Err(DbError::invalid_argument(
                "Set returning functions can't be used in a filter",
            ));
        }
        let datatype = predicate.datatype();
        if !satisfies(&datatype, |dt| matches!(dt, DataType::Boolean)) {
            return Err(DbError::type_mismatch(format!(
                "Filter predicate must be a boolean, got {datatype}"
            )));
        }

        let node = self.db.node(self.node)?;
        let (input, predicate) = match &node.kind {
            NodeKind::Filter {
                input,
                predicate: existing,
            } => (*input, existing.and(predicate.rebind(self.node, *input))?),
            _ => (self.node, predicate),
        };

        Ok(self.derive(NodeKind::Filter { input, predicate }, node.schema.clone()))
    }

    /// Keep only the named columns, in the given order.
    pub fn select<S: AsRef<str>>(&self, columns: &[S]) -> Result<DataFrame> {
        let exprs = columns
            .iter()
            .map(|name| Ok((name.as_ref().to_string(), self.col(name.as_ref())?)))
            .collect::<Result<Vec<_>>>()?;
        Self::project_exprs(&self.db, Some(self.node), exprs)
    }

    /// Project named expressions over this dataframe.
    pub fn select_exprs<I, E>(&self, exprs: I) -> Result<DataFrame>
    where
        I: IntoIterator<Item = E>,
        E: Into<Expression>,
    {
        let mut columns = Vec::new();
        for expr in exprs {
            let expr = expr.into();
            self.check_row_wise(&expr, "a projection")?;
            let name = expr.output_name().ok_or_else(|| {
                DbError::invalid_argument("Selected expression requires a name, use rename")
            })?;
            columns.push((name, expr));
        }
        Self::project_exprs(&self.db, Some(self.node), columns)
    }

    /// Add or replace columns.
    ///
    /// Replaced columns keep their position, new columns are appended.
    pub fn assign<I, S>(&self, columns: I) -> Result<DataFrame>
    where
        I: IntoIterator<Item = (S, Expression)>,
        S: Into<String>,
    {
        let schema = match self.output_schema()? {
            OutputSchema::Resolved(schema) => schema,
            OutputSchema::Unresolved => {
                return Err(DbError::ambiguous_column(
                    "Can't assign to a dataframe with unknown columns, describe the table or select columns first",
                ));
            }
        };

        let mut assigned: Vec<(String, Expression)> = Vec::new();
        for (name, expr) in columns {
            let name = name.into();
            self.check_row_wise(&expr, "assign")?;
            if assigned.iter().any(|(n, _)| *n == name) {
                return Err(DbError::ambiguous_column(format!(
                    "Column '{name}' assigned more than once"
                )));
            }
            assigned.push((name, expr));
        }

        let mut exprs = Vec::with_capacity(schema.len() + assigned.len());
        for col in schema.columns() {
            let expr = match assigned.iter().position(|(n, _)| *n == col.name) {
                Some(idx) => assigned.remove(idx).1,
                None => self.col(&col.name)?,
            };
            exprs.push((col.name.clone(), expr));
        }
        exprs.extend(assigned);

        Self::project_exprs(&self.db, Some(self.node), exprs)
    }

    /// Apply a function call to this dataframe.
    ///
    /// Aggregate and array calls produce a single row, scalar calls produce
    /// one row per input row.
    pub fn apply(&self, call: Expression, options: ApplyOptions) -> Result<DataFrame> {
        call.scope().check_frame(self.node)?;
        Self::apply_call(&self.db, Some(self.node), call, options)
    }

    pub(crate) fn project_exprs(
        db: &Database,
        input: Option<NodeRef>,
        exprs: Vec<(String, Expression)>,
    ) -> Result<DataFrame> {
        let schema = ColumnSchema::try_new(
            exprs
                .iter()
                .map(|(name, expr)| ColumnDef::new(name.clone(), expr.datatype())),
        )?;
        Ok(db.push_node(Node::new(
            NodeKind::Project {
                input,
                projection: Projection::Exprs(exprs),
            },
            OutputSchema::Resolved(schema),
        )))
    }

    pub(crate) fn apply_call(
        db: &Database,
        input: Option<NodeRef>,
        call: Expression,
        options: ApplyOptions,
    ) -> Result<DataFrame> {
        let name = if options.expand {
            RESULT_COLUMN.to_string()
        } else {
            options
                .column_name
                .or_else(|| call.output_name())
                .ok_or_else(|| {
                    DbError::invalid_argument("Applied expression requires a column name")
                })?
        };

        let applied = match input {
            Some(input) if call.contains_aggregate() => {
                check_grouped(&call, &[])?;
                let datatype = call.datatype();
                db.push_node(Node::new(
                    NodeKind::Aggregate {
                        input,
                        grouping: GroupingSets::empty(),
                        outputs: vec![(name.clone(), call)],
                    },
                    OutputSchema::Resolved(ColumnSchema::try_new([ColumnDef::new(
                        name, datatype,
                    )])?),
                ))
            }
            _ => Self::project_exprs(db, input, vec![(name, call)])?,
        };

        if options.expand {
            applied.expand_result(&[])
        } else {
            Ok(applied)
        }
    }

    /// Expand the composite result column into its fields, keeping `keep`.
    pub(crate) fn expand_result(&self, keep: &[String]) -> Result<DataFrame> {
        let schema = self
            .columns()?
            .ok_or_else(|| DbError::new("Expanding a result requires resolved columns"))?;
        let record = match &schema.try_get(RESULT_COLUMN)?.datatype {
            DataType::Record(record) => record.clone(),
            other => {
                return Err(DbError::invalid_argument(format!(
                    "Only composite results can be expanded, got {other}"
                )));
            }
        };

        let mut columns = Vec::with_capacity(keep.len() + record.fields.len());
        for name in keep {
            columns.push(schema.try_get(name)?.clone());
        }
        for field in &record.fields {
            columns.push(ColumnDef::new(field.name.clone(), field.datatype.clone()));
        }

        Ok(self.derive(
            NodeKind::Expand {
                input: self.node,
                keep: keep.to_vec(),
                fields: record.fields.iter().map(|f| f.name.clone()).collect(),
            },
            OutputSchema::Resolved(ColumnSchema::try_new(columns)?),
        ))
    }

    /// Start building a join with another dataframe.
    pub fn join(&self, other: &DataFrame) -> JoinBuilder {
        JoinBuilder::new(self, other)
    }

    /// Join on pairs of (this column, other column) equalities.
    pub fn inner_join<I, L, R>(&self, other: &DataFrame, on: I) -> Result<DataFrame>
    where
        I: IntoIterator<Item = (L, R)>,
        L: Into<String>,
        R: Into<String>,
    {
        self.join(other).kind(JoinKind::Inner).on_columns(on).build()
    }

    pub fn left_join<I, L, R>(&self, other: &DataFrame, on: I) -> Result<DataFrame>
    where
        I: IntoIterator<Item = (L, R)>,
        L: Into<String>,
        R: Into<String>,
    {
        self.join(other).kind(JoinKind::Left).on_columns(on).build()
    }

    pub fn right_join<I, L, R>(&self, other: &DataFrame, on: I) -> Result<DataFrame>
    where
        I: IntoIterator<Item = (L, R)>,
        L: Into<String>,
        R: Into<String>,
    {
        self.join(other).kind(JoinKind::Right).on_columns(on).build()
    }

    pub fn full_join<I, L, R>(&self, other: &DataFrame, on: I) -> Result<DataFrame>
    where
        I: IntoIterator<Item = (L, R)>,
        L: Into<String>,
        R: Into<String>,
    {
        self.join(other).kind(JoinKind::Full).on_columns(on).build()
    }

    /// Cartesian product.
    pub fn cross_join(&self, other: &DataFrame) -> Result<DataFrame> {
        self.join(other).kind(JoinKind::Cross).build()
    }

    /// Group rows by the given columns.
    pub fn group_by<S: AsRef<str>>(&self, columns: &[S]) -> Result<GroupedFrame> {
        let mut keys = Vec::with_capacity(columns.len());
        for name in columns {
            // Check it exists.
            self.col(name.as_ref())?;
            if keys.iter().any(|k: &String| k == name.as_ref()) {
                return Err(DbError::ambiguous_column(format!(
                    "Column '{}' appears more than once in grouping",
                    name.as_ref()
                )));
            }
            keys.push(name.as_ref().to_string());
        }
        Ok(GroupedFrame::new(self.clone(), GroupingSets::single(keys)))
    }

    /// Order rows when fetched.
    ///
    /// Ordering an ordered dataframe appends the new keys as tie breakers.
    pub fn order_by<I, O>(&self, orderings: I) -> Result<DataFrame>
    where
        I: IntoIterator<Item = O>,
        O: Into<OrderByExpr>,
    {
        let mut new = Vec::new();
        for ordering in orderings {
            let ordering = ordering.into();
            ordering.validate()?;
            ordering.expr.scope().check_frame(self.node)?;
            new.push(ordering);
        }
        if new.is_empty() {
            return Err(DbError::invalid_argument("order_by requires at least one key"));
        }

        let node = self.db.node(self.node)?;
        let (input, orderings) = match &node.kind {
            NodeKind::Order { input, orderings } => {
                let mut combined = orderings.clone();
                combined.extend(new.into_iter().map(|mut o| {
                    o.expr = o.expr.rebind(self.node, *input);
                    o
                }));
                (*input, combined)
            }
            _ => (self.node, new),
        };

        Ok(self.derive(NodeKind::Order { input, orderings }, node.schema.clone()))
    }

    /// Keep one row per distinct combination of the given columns.
    ///
    /// Which row is kept is up to the backend unless the dataframe is
    /// ordered. With no columns, duplicate rows are removed.
    pub fn distinct_on<S: AsRef<str>>(&self, columns: &[S]) -> Result<DataFrame> {
        let mut on = Vec::with_capacity(columns.len());
        for name in columns {
            self.col(name.as_ref())?;
            on.push(name.as_ref().to_string());
        }
        let schema = self.output_schema()?;
        Ok(self.derive(
            NodeKind::Distinct {
                input: self.node,
                on,
            },
            schema,
        ))
    }

    pub fn limit(&self, limit: u64) -> Result<DataFrame> {
        self.slice(0, Some(limit))
    }

    pub fn offset(&self, offset: u64) -> Result<DataFrame> {
        self.slice(offset, None)
    }

    /// Skip `offset` rows then keep at most `limit` rows.
    pub fn slice(&self, offset: u64, limit: Option<u64>) -> Result<DataFrame> {
        let node = self.db.node(self.node)?;
        let (input, limit, offset) = match &node.kind {
            NodeKind::Limit {
                input,
                limit: inner_limit,
                offset: inner_offset,
            } => {
                let remaining = inner_limit.map(|l| l.saturating_sub(offset));
                let limit = match (remaining, limit) {
                    (Some(a), Some(b)) => Some(a.min(b)),
                    (a, b) => a.or(b),
                };
                (*input, limit, inner_offset.saturating_add(offset))
            }
            _ => (self.node, limit, offset),
        };

        Ok(self.derive(
            NodeKind::Limit {
                input,
                limit,
                offset,
            },
            node.schema.clone(),
        ))
    }
}
