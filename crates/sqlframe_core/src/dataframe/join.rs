use sqlframe_error::{DbError, Result};

use super::DataFrame;
use super::arena::NodeRef;
use super::node::{JoinKind, JoinOutput, Node, NodeKind, OutputSchema, Projection};
use crate::expr::column_expr::ColumnExpr;
use crate::expr::{ExprKind, Expression, Scope};
use crate::functions::builtin;
use crate::types::coerce::satisfies;
use crate::types::{ColumnDef, ColumnSchema, DataType};

/// Columns one side of a join contributes to the output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ColumnSelection {
    /// Every column under its own name.
    #[default]
    All,
    /// (source column, output name) pairs.
    Named(Vec<(String, String)>),
    None,
}

impl ColumnSelection {
    /// Select columns keeping their names.
    pub fn named<S: AsRef<str>>(columns: &[S]) -> Self {
        ColumnSelection::Named(
            columns
                .iter()
                .map(|c| (c.as_ref().to_string(), c.as_ref().to_string()))
                .collect(),
        )
    }

    /// Select columns under new names.
    pub fn renamed<I, S, O>(columns: I) -> Self
    where
        I: IntoIterator<Item = (S, O)>,
        S: Into<String>,
        O: Into<String>,
    {
        ColumnSelection::Named(
            columns
                .into_iter()
                .map(|(s, o)| (s.into(), o.into()))
                .collect(),
        )
    }

    fn contributes(&self) -> bool {
        match self {
            Self::All => true,
            Self::Named(cols) => !cols.is_empty(),
            Self::None => false,
        }
    }
}

/// One input of a join under construction.
///
/// Columns taken from a join input may be combined with columns of the
/// other input, which isn't allowed for columns of plain dataframes.
#[derive(Debug, Clone)]
pub struct JoinInput {
    node: NodeRef,
    schema: OutputSchema,
    left: NodeRef,
    right: NodeRef,
}

impl JoinInput {
    pub fn col(&self, name: &str) -> Result<Expression> {
        Ok(Expression::new(ExprKind::Column(ColumnExpr {
            name: name.to_string(),
            relation: self.node,
            join: Some((self.left, self.right)),
            datatype: self.schema.column_type(name)?,
        })))
    }
}

type ConditionFn = Box<dyn FnOnce(&JoinInput, &JoinInput) -> Result<Expression>>;

/// Builder for joining two dataframes.
pub struct JoinBuilder {
    left: DataFrame,
    right: DataFrame,
    kind: JoinKind,
    keys: Vec<(String, String)>,
    condition: Option<ConditionFn>,
    self_columns: ColumnSelection,
    other_columns: ColumnSelection,
}

impl std::fmt::Debug for JoinBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JoinBuilder")
            .field("left", &self.left)
            .field("right", &self.right)
            .field("kind", &self.kind)
            .field("keys", &self.keys)
            .field("self_columns", &self.self_columns)
            .field("other_columns", &self.other_columns)
            .finish_non_exhaustive()
    }
}

impl JoinBuilder {
    pub(crate) fn new(left: &DataFrame, right: &DataFrame) -> Self {
        JoinBuilder {
            left: left.clone(),
            right: right.clone(),
            kind: JoinKind::Inner,
            keys: Vec::new(),
            condition: None,
            self_columns: ColumnSelection::All,
            other_columns: ColumnSelection::All,
        }
    }

    pub fn kind(mut self, kind: JoinKind) -> Self {
        self.kind = kind;
        self
    }

    /// Join on equality of (this column, other column) pairs.
    pub fn on_columns<I, L, R>(mut self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (L, R)>,
        L: Into<String>,
        R: Into<String>,
    {
        self.keys
            .extend(pairs.into_iter().map(|(l, r)| (l.into(), r.into())));
        self
    }

    /// Join on a predicate built from both inputs.
    ///
    /// Combined with column pairs using AND.
    pub fn on<F>(mut self, condition: F) -> Self
    where
        F: FnOnce(&JoinInput, &JoinInput) -> Result<Expression> + 'static,
    {
        self.condition = Some(Box::new(condition));
        self
    }

    pub fn self_columns(mut self, selection: ColumnSelection) -> Self {
        self.self_columns = selection;
        self
    }

    pub fn other_columns(mut self, selection: ColumnSelection) -> Self {
        self.other_columns = selection;
        self
    }

    pub fn build(mut self) -> Result<DataFrame> {
        self.left.check_same_database(&self.right)?;
        let db = self.left.db.clone();

        let left_node = db.node(self.left.node)?;
        let right_df = if self.left.node == self.right.node {
            // Self join, give the other side its own identity.
            db.push_node(Node::new(
                NodeKind::Project {
                    input: Some(self.right.node),
                    projection: Projection::Wildcard,
                },
                left_node.schema.clone(),
            ))
        } else {
            self.right.clone()
        };
        let right_node = db.node(right_df.node)?;

        let left = JoinInput {
            node: self.left.node,
            schema: left_node.schema.clone(),
            left: self.left.node,
            right: right_df.node,
        };
        let right = JoinInput {
            node: right_df.node,
            schema: right_node.schema.clone(),
            left: self.left.node,
            right: right_df.node,
        };

        let mut condition: Option<Expression> = None;
        for (l, r) in &self.keys {
            let eq = left.col(l)?.eq(right.col(r)?)?;
            condition = Some(match condition {
                Some(c) => c.and(eq)?,
                None => eq,
            });
        }
        if let Some(build_condition) = self.condition.take() {
            let expr = build_condition(&left, &right)?;
            match expr.scope() {
                Scope::None => (),
                Scope::Join { left: l, right: r } if l == left.left && r == left.right => (),
                other => {
                    return Err(DbError::schema_mismatch(format!(
                        "Join condition must be built from the join inputs, got {other:?}"
                    )));
                }
            }
            let datatype = expr.datatype();
            if !satisfies(&datatype, |dt| matches!(dt, DataType::Boolean)) {
                return Err(DbError::type_mismatch(format!(
                    "Join condition must be a boolean, got {datatype}"
                )));
            }
            condition = Some(match condition {
                Some(c) => c.and(expr)?,
                None => expr,
            });
        }

        match (self.kind, &condition) {
            (JoinKind::Cross, Some(_)) => {
                return Err(DbError::invalid_argument("Cross join doesn't take a condition"));
            }
            (kind, None) if kind != JoinKind::Cross => {
                return Err(DbError::invalid_argument(format!(
                    "{} requires a condition or column pairs",
                    kind.as_sql()
                )));
            }
            _ => (),
        }

        // Pairs joining same-named columns produce a single output column.
        let merged: Vec<&str> = self
            .keys
            .iter()
            .filter(|(l, r)| l == r)
            .map(|(l, _)| l.as_str())
            .collect();

        let mut outputs = Vec::new();
        self.side_outputs(
            &left,
            &right,
            &self.self_columns,
            self.other_columns.contributes(),
            &merged,
            true,
            &mut outputs,
        )?;
        self.side_outputs(
            &right,
            &left,
            &self.other_columns,
            self.self_columns.contributes(),
            &merged,
            false,
            &mut outputs,
        )?;

        if outputs.is_empty() {
            return Err(DbError::invalid_argument("Join must output at least one column"));
        }

        let schema = if outputs
            .iter()
            .any(|o| matches!(o, JoinOutput::Wildcard(_)))
        {
            OutputSchema::Unresolved
        } else {
            let mut defs: Vec<ColumnDef> = Vec::with_capacity(outputs.len());
            for output in &outputs {
                if let JoinOutput::Column { name, expr } = output {
                    if defs.iter().any(|d| d.name == *name) {
                        return Err(DbError::ambiguous_column(format!(
                            "Column '{name}' exists on both sides of the join, use self_columns or other_columns to rename it"
                        )));
                    }
                    defs.push(ColumnDef::new(name.clone(), expr.datatype()));
                }
            }
            OutputSchema::Resolved(ColumnSchema::try_new(defs)?)
        };

        Ok(db.push_node(Node::new(
            NodeKind::Join {
                left: self.left.node,
                right: right_df.node,
                kind: self.kind,
                condition,
                outputs,
            },
            schema,
        )))
    }

    #[allow(clippy::too_many_arguments)]
    fn side_outputs(
        &self,
        side: &JoinInput,
        other: &JoinInput,
        selection: &ColumnSelection,
        other_contributes: bool,
        merged: &[&str],
        is_left: bool,
        outputs: &mut Vec<JoinOutput>,
    ) -> Result<()> {
        match selection {
            ColumnSelection::None => Ok(()),
            ColumnSelection::Named(cols) => {
                for (source, name) in cols {
                    outputs.push(JoinOutput::Column {
                        name: name.clone(),
                        expr: side.col(source)?,
                    });
                }
                Ok(())
            }
            ColumnSelection::All => {
                let schema = match &side.schema {
                    OutputSchema::Resolved(schema) => schema,
                    OutputSchema::Unresolved => {
                        if other_contributes {
                            return Err(DbError::ambiguous_column(
                                "Can't select all columns of a relation with unknown columns alongside columns of the other side, name the columns to keep",
                            ));
                        }
                        outputs.push(JoinOutput::Wildcard(side.node));
                        return Ok(());
                    }
                };

                for col in schema.columns() {
                    if !merged.contains(&col.name.as_str()) {
                        outputs.push(JoinOutput::Column {
                            name: col.name.clone(),
                            expr: side.col(&col.name)?,
                        });
                        continue;
                    }
                    // Merged keys are output once, from the left side's
                    // selection when it includes them.
                    if !is_left {
                        if self.self_columns == ColumnSelection::All {
                            continue;
                        }
                        outputs.push(JoinOutput::Column {
                            name: col.name.clone(),
                            expr: side.col(&col.name)?,
                        });
                        continue;
                    }
                    let expr = match self.kind {
                        JoinKind::Right => other.col(&col.name)?,
                        JoinKind::Full => {
                            builtin::coalesce([side.col(&col.name)?, other.col(&col.name)?])?
                        }
                        _ => side.col(&col.name)?,
                    };
                    outputs.push(JoinOutput::Column {
                        name: col.name.clone(),
                        expr,
                    });
                }
                Ok(())
            }
        }
    }
}
