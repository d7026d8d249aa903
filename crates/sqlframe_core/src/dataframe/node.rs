use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use sqlframe_error::Result;

use super::arena::NodeRef;
use crate::compile::CompiledQuery;
use crate::expr::Expression;
use crate::group::GroupingSets;
use crate::ident::QualifiedName;
use crate::order::OrderByExpr;
use crate::row::RowSet;
use crate::types::{ColumnSchema, DataType, ScalarValue};

/// Column holding the composite result of a function before it's expanded
/// into its fields.
pub const RESULT_COLUMN: &str = "__rv";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Full,
    Cross,
}

impl JoinKind {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Inner => "INNER JOIN",
            Self::Left => "LEFT JOIN",
            Self::Right => "RIGHT JOIN",
            Self::Full => "FULL JOIN",
            Self::Cross => "CROSS JOIN",
        }
    }
}

#[derive(Debug, Clone)]
pub enum Projection {
    /// Every column of the input, unchanged.
    Wildcard,
    /// Named expressions over the input.
    Exprs(Vec<(String, Expression)>),
}

#[derive(Debug, Clone)]
pub enum JoinOutput {
    Column { name: String, expr: Expression },
    /// All columns of one side, used when that side's columns aren't known.
    Wildcard(NodeRef),
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    /// Existing relation in the backend.
    Table { name: QualifiedName },
    /// Relation created by `save_as`.
    Saved { name: QualifiedName, temporary: bool },
    /// Rows provided by the client.
    Values { rows: Vec<Vec<ScalarValue>> },
    Filter {
        input: NodeRef,
        predicate: Expression,
    },
    /// Projection. No input for frame-less selects of constants or function
    /// calls.
    Project {
        input: Option<NodeRef>,
        projection: Projection,
    },
    Join {
        left: NodeRef,
        right: NodeRef,
        kind: JoinKind,
        condition: Option<Expression>,
        outputs: Vec<JoinOutput>,
    },
    Aggregate {
        input: NodeRef,
        grouping: GroupingSets,
        outputs: Vec<(String, Expression)>,
    },
    /// Expand the composite result column into its fields.
    Expand {
        input: NodeRef,
        keep: Vec<String>,
        fields: Vec<String>,
    },
    Order {
        input: NodeRef,
        orderings: Vec<OrderByExpr>,
    },
    Distinct {
        input: NodeRef,
        on: Vec<String>,
    },
    Limit {
        input: NodeRef,
        limit: Option<u64>,
        offset: u64,
    },
}

impl NodeKind {
    /// Nodes this node reads from, excluding subqueries in expressions.
    pub fn inputs(&self) -> Vec<NodeRef> {
        match self {
            Self::Table { .. } | Self::Saved { .. } | Self::Values { .. } => Vec::new(),
            Self::Project { input, .. } => input.iter().copied().collect(),
            Self::Join { left, right, .. } => vec![*left, *right],
            Self::Filter { input, .. }
            | Self::Aggregate { input, .. }
            | Self::Expand { input, .. }
            | Self::Order { input, .. }
            | Self::Distinct { input, .. }
            | Self::Limit { input, .. } => vec![*input],
        }
    }

    /// Check if this node is a relation that exists in the backend.
    pub fn is_relation(&self) -> bool {
        matches!(self, Self::Table { .. } | Self::Saved { .. })
    }

    pub fn relation_name(&self) -> Option<&QualifiedName> {
        match self {
            Self::Table { name } | Self::Saved { name, .. } => Some(name),
            _ => None,
        }
    }

    pub fn variant_name(&self) -> &'static str {
        match self {
            Self::Table { .. } => "Table",
            Self::Saved { .. } => "Saved",
            Self::Values { .. } => "Values",
            Self::Filter { .. } => "Filter",
            Self::Project { .. } => "Project",
            Self::Join { .. } => "Join",
            Self::Aggregate { .. } => "Aggregate",
            Self::Expand { .. } => "Expand",
            Self::Order { .. } => "Order",
            Self::Distinct { .. } => "Distinct",
            Self::Limit { .. } => "Limit",
        }
    }
}

/// Output columns of a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputSchema {
    Resolved(ColumnSchema),
    /// Base relation opened by name without looking up its columns.
    Unresolved,
}

impl OutputSchema {
    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved(_))
    }

    pub fn resolved(&self) -> Option<&ColumnSchema> {
        match self {
            Self::Resolved(schema) => Some(schema),
            Self::Unresolved => None,
        }
    }

    /// Type of a column. Columns of unresolved relations are `Unknown`.
    pub fn column_type(&self, name: &str) -> Result<DataType> {
        match self {
            Self::Resolved(schema) => Ok(schema.try_get(name)?.datatype.clone()),
            Self::Unresolved => Ok(DataType::Unknown),
        }
    }
}

/// Materialization progress of a node.
///
/// Only moves forward, except for `refresh` which drops cached rows.
#[derive(Debug, Clone, Default)]
pub enum MaterializationState {
    #[default]
    Unmaterialized,
    Compiled(Arc<CompiledQuery>),
    Materialized {
        query: Arc<CompiledQuery>,
        rows: Arc<RowSet>,
        /// Versions of the relations read, as seen when the rows were
        /// fetched.
        versions: HashMap<QualifiedName, u64>,
    },
}

impl MaterializationState {
    pub fn query(&self) -> Option<&Arc<CompiledQuery>> {
        match self {
            Self::Unmaterialized => None,
            Self::Compiled(query) | Self::Materialized { query, .. } => Some(query),
        }
    }

    pub fn is_materialized(&self) -> bool {
        matches!(self, Self::Materialized { .. })
    }
}

#[derive(Debug)]
pub struct Node {
    pub kind: NodeKind,
    pub schema: OutputSchema,
    pub(crate) cell: Mutex<MaterializationState>,
}

impl Node {
    pub fn new(kind: NodeKind, schema: OutputSchema) -> Self {
        Node {
            kind,
            schema,
            cell: Mutex::new(MaterializationState::Unmaterialized),
        }
    }

    pub fn state(&self) -> MaterializationState {
        self.cell.lock().clone()
    }
}
