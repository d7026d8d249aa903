pub mod binary_expr;
pub mod cast_expr;
pub mod column_expr;
pub mod field_expr;
pub mod function_expr;
pub mod in_expr;
pub mod literal_expr;
pub mod unary_expr;

use std::sync::Arc;

use binary_expr::{BinaryExpr, BinaryOperator};
use cast_expr::CastExpr;
use column_expr::ColumnExpr;
use field_expr::FieldExpr;
use function_expr::FunctionExpr;
use in_expr::InExpr;
use literal_expr::LiteralExpr;
use sqlframe_error::{DbError, Result};
use unary_expr::{UnaryExpr, UnaryOperator};

use crate::dataframe::arena::NodeRef;
use crate::functions::remote::CallingConvention;
use crate::order::OrderByExpr;
use crate::types::{DataType, ScalarValue};

/// Which relations an expression may be evaluated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Constant, valid anywhere.
    None,
    /// Columns of a single dataframe.
    Frame(NodeRef),
    /// Columns of both inputs of a join being built.
    Join { left: NodeRef, right: NodeRef },
}

impl Scope {
    /// Combine the scopes of two operands.
    pub fn merge(self, other: Scope) -> Result<Scope> {
        match (self, other) {
            (Scope::None, other) | (other, Scope::None) => Ok(other),
            (a, b) if a == b => Ok(a),
            (a, b) => Err(DbError::schema_mismatch(
                "Expression combines columns from unrelated dataframes",
            )
            .with_field("left", format!("{a:?}"))
            .with_field("right", format!("{b:?}"))),
        }
    }

    /// Check that this scope can be evaluated against a single frame.
    pub fn check_frame(self, frame: NodeRef) -> Result<()> {
        match self {
            Scope::None => Ok(()),
            Scope::Frame(f) if f == frame => Ok(()),
            other => Err(DbError::schema_mismatch(format!(
                "Expression references columns outside of the dataframe it's applied to ({other:?})"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    Column(ColumnExpr),
    Literal(LiteralExpr),
    Unary(UnaryExpr),
    Binary(BinaryExpr),
    Function(FunctionExpr),
    Cast(CastExpr),
    In(InExpr),
    Field(FieldExpr),
}

/// An immutable scalar expression.
///
/// Cloning is cheap, the expression tree is shared. Every combinator returns a
/// new expression and never modifies its operands.
#[derive(Debug, Clone)]
pub struct Expression {
    kind: Arc<ExprKind>,
    alias: Option<String>,
}

/// Create a constant expression.
pub fn lit(value: impl Into<ScalarValue>) -> Expression {
    Expression::new(ExprKind::Literal(LiteralExpr {
        value: value.into(),
    }))
}

/// An untyped NULL.
pub fn null() -> Expression {
    lit(ScalarValue::Null)
}

impl Expression {
    pub fn new(kind: ExprKind) -> Self {
        Expression {
            kind: Arc::new(kind),
            alias: None,
        }
    }

    pub fn kind(&self) -> &ExprKind {
        &self.kind
    }

    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    /// Returns a copy of this expression with a different output name.
    pub fn rename(&self, name: impl Into<String>) -> Self {
        Expression {
            kind: self.kind.clone(),
            alias: Some(name.into()),
        }
    }

    /// Name the expression would be given in a projection if not otherwise
    /// specified.
    pub fn output_name(&self) -> Option<String> {
        if let Some(alias) = &self.alias {
            return Some(alias.clone());
        }
        match self.kind.as_ref() {
            ExprKind::Column(col) => Some(col.name.clone()),
            ExprKind::Function(func) => Some(func.function.name().to_string()),
            ExprKind::Field(field) => Some(field.field.clone()),
            _ => None,
        }
    }

    pub fn datatype(&self) -> DataType {
        match self.kind.as_ref() {
            ExprKind::Column(col) => col.datatype.clone(),
            ExprKind::Literal(lit) => lit.value.datatype(),
            ExprKind::Unary(unary) => unary.datatype(),
            ExprKind::Binary(binary) => binary.datatype.clone(),
            ExprKind::Function(func) => func.datatype.clone(),
            ExprKind::Cast(cast) => cast.to.clone(),
            ExprKind::In(_) => DataType::Boolean,
            ExprKind::Field(field) => field.datatype.clone(),
        }
    }

    pub fn scope(&self) -> Scope {
        match self.kind.as_ref() {
            ExprKind::Column(col) => col.scope(),
            ExprKind::Literal(_) => Scope::None,
            ExprKind::Unary(unary) => unary.expr.scope(),
            ExprKind::Binary(binary) => binary.scope,
            ExprKind::Function(func) => func.scope,
            ExprKind::Cast(cast) => cast.expr.scope(),
            // The subquery side of IN is compiled separately.
            ExprKind::In(in_expr) => in_expr.expr.scope(),
            ExprKind::Field(field) => field.expr.scope(),
        }
    }

    /// Direct children of this expression.
    pub fn children(&self) -> Vec<&Expression> {
        match self.kind.as_ref() {
            ExprKind::Column(_) | ExprKind::Literal(_) => Vec::new(),
            ExprKind::Unary(unary) => vec![&unary.expr],
            ExprKind::Binary(binary) => vec![&binary.left, &binary.right],
            ExprKind::Function(func) => func.args.iter().collect(),
            ExprKind::Cast(cast) => vec![&cast.expr],
            ExprKind::In(in_expr) => vec![&in_expr.expr],
            ExprKind::Field(field) => vec![&field.expr],
        }
    }

    /// Check if this expression calls an aggregate or an array function.
    ///
    /// These collapse many rows into one and can't be used in row-wise
    /// contexts.
    pub fn contains_aggregate(&self) -> bool {
        if let ExprKind::Function(func) = self.kind.as_ref() {
            if func.function.convention() != CallingConvention::Scalar {
                return true;
            }
        }
        self.children().into_iter().any(|c| c.contains_aggregate())
    }

    /// Check if this expression calls a set returning function.
    pub fn contains_set_returning(&self) -> bool {
        if let ExprKind::Function(func) = self.kind.as_ref() {
            if func.function.returns_set() {
                return true;
            }
        }
        self.children().into_iter().any(|c| c.contains_set_returning())
    }

    /// Walk every column reference that isn't nested inside an aggregate or
    /// array function call.
    pub fn for_each_row_column(&self, f: &mut impl FnMut(&ColumnExpr) -> Result<()>) -> Result<()> {
        match self.kind.as_ref() {
            ExprKind::Column(col) => f(col),
            ExprKind::Function(func) if func.function.convention() != CallingConvention::Scalar => {
                Ok(())
            }
            _ => {
                for child in self.children() {
                    child.for_each_row_column(f)?;
                }
                Ok(())
            }
        }
    }

    /// Rewrite column references, keeping everything else.
    ///
    /// `f` returns the replacement for a column, or None to keep it.
    pub fn transform_columns(&self, f: &mut impl FnMut(&ColumnExpr) -> Option<Expression>) -> Self {
        let kind = match self.kind.as_ref() {
            ExprKind::Column(col) => match f(col) {
                Some(replacement) => {
                    return Expression {
                        kind: replacement.kind,
                        alias: self.alias.clone().or(replacement.alias),
                    };
                }
                None => return self.clone(),
            },
            ExprKind::Literal(_) => return self.clone(),
            ExprKind::Unary(unary) => ExprKind::Unary(UnaryExpr {
                op: unary.op,
                expr: unary.expr.transform_columns(f),
            }),
            ExprKind::Binary(binary) => {
                let left = binary.left.transform_columns(f);
                let right = binary.right.transform_columns(f);
                let scope = left.scope().merge(right.scope()).unwrap_or(binary.scope);
                ExprKind::Binary(BinaryExpr {
                    op: binary.op,
                    left,
                    right,
                    datatype: binary.datatype.clone(),
                    scope,
                })
            }
            ExprKind::Function(func) => {
                let args: Vec<_> = func.args.iter().map(|a| a.transform_columns(f)).collect();
                let scope = args
                    .iter()
                    .try_fold(Scope::None, |acc, a| acc.merge(a.scope()))
                    .unwrap_or(func.scope);
                ExprKind::Function(FunctionExpr {
                    function: func.function.clone(),
                    args,
                    distinct: func.distinct,
                    star: func.star,
                    datatype: func.datatype.clone(),
                    scope,
                })
            }
            ExprKind::Cast(cast) => ExprKind::Cast(CastExpr {
                expr: cast.expr.transform_columns(f),
                to: cast.to.clone(),
            }),
            ExprKind::In(in_expr) => ExprKind::In(InExpr {
                expr: in_expr.expr.transform_columns(f),
                list: in_expr.list.clone(),
            }),
            ExprKind::Field(field) => ExprKind::Field(FieldExpr {
                expr: field.expr.transform_columns(f),
                field: field.field.clone(),
                datatype: field.datatype.clone(),
            }),
        };

        Expression {
            kind: Arc::new(kind),
            alias: self.alias.clone(),
        }
    }

    /// Point columns of `from` at `to`.
    ///
    /// Used when a node is fused into its input and both expose the same
    /// columns.
    pub fn rebind(&self, from: NodeRef, to: NodeRef) -> Self {
        self.transform_columns(&mut |col| {
            if col.relation == from && col.join.is_none() {
                Some(Expression::new(ExprKind::Column(ColumnExpr {
                    name: col.name.clone(),
                    relation: to,
                    join: None,
                    datatype: col.datatype.clone(),
                })))
            } else {
                None
            }
        })
    }

    fn binary(&self, op: BinaryOperator, right: impl Into<Expression>) -> Result<Self> {
        let right = right.into();
        let scope = self.scope().merge(right.scope())?;
        let datatype = op.return_type(&self.datatype(), &right.datatype())?;
        Ok(Expression::new(ExprKind::Binary(BinaryExpr {
            op,
            left: self.clone(),
            right,
            datatype,
            scope,
        })))
    }

    fn unary(&self, op: UnaryOperator) -> Result<Self> {
        op.check_input(&self.datatype())?;
        Ok(Expression::new(ExprKind::Unary(UnaryExpr {
            op,
            expr: self.clone(),
        })))
    }

    pub fn and(&self, right: impl Into<Expression>) -> Result<Self> {
        self.binary(BinaryOperator::And, right)
    }

    pub fn or(&self, right: impl Into<Expression>) -> Result<Self> {
        self.binary(BinaryOperator::Or, right)
    }

    pub fn not(&self) -> Result<Self> {
        self.unary(UnaryOperator::Not)
    }

    pub fn eq(&self, right: impl Into<Expression>) -> Result<Self> {
        self.binary(BinaryOperator::Eq, right)
    }

    pub fn not_eq(&self, right: impl Into<Expression>) -> Result<Self> {
        self.binary(BinaryOperator::NotEq, right)
    }

    pub fn lt(&self, right: impl Into<Expression>) -> Result<Self> {
        self.binary(BinaryOperator::Lt, right)
    }

    pub fn lt_eq(&self, right: impl Into<Expression>) -> Result<Self> {
        self.binary(BinaryOperator::LtEq, right)
    }

    pub fn gt(&self, right: impl Into<Expression>) -> Result<Self> {
        self.binary(BinaryOperator::Gt, right)
    }

    pub fn gt_eq(&self, right: impl Into<Expression>) -> Result<Self> {
        self.binary(BinaryOperator::GtEq, right)
    }

    pub fn add(&self, right: impl Into<Expression>) -> Result<Self> {
        self.binary(BinaryOperator::Add, right)
    }

    pub fn sub(&self, right: impl Into<Expression>) -> Result<Self> {
        self.binary(BinaryOperator::Sub, right)
    }

    pub fn mul(&self, right: impl Into<Expression>) -> Result<Self> {
        self.binary(BinaryOperator::Mul, right)
    }

    pub fn div(&self, right: impl Into<Expression>) -> Result<Self> {
        self.binary(BinaryOperator::Div, right)
    }

    pub fn rem(&self, right: impl Into<Expression>) -> Result<Self> {
        self.binary(BinaryOperator::Mod, right)
    }

    /// Pattern match using `LIKE`.
    pub fn like(&self, pattern: impl Into<Expression>) -> Result<Self> {
        self.binary(BinaryOperator::Like, pattern)
    }

    pub fn neg(&self) -> Result<Self> {
        self.unary(UnaryOperator::Negate)
    }

    pub fn abs(&self) -> Result<Self> {
        self.unary(UnaryOperator::Abs)
    }

    pub fn is_null(&self) -> Result<Self> {
        self.unary(UnaryOperator::IsNull)
    }

    pub fn is_not_null(&self) -> Result<Self> {
        self.unary(UnaryOperator::IsNotNull)
    }

    /// Membership in a list of constants.
    ///
    /// The list is bound as a single array parameter.
    pub fn is_in<V>(&self, values: impl IntoIterator<Item = V>) -> Result<Self>
    where
        V: Into<ScalarValue>,
    {
        let in_expr = InExpr::try_new_values(self.clone(), values.into_iter().map(Into::into))?;
        Ok(Expression::new(ExprKind::In(in_expr)))
    }

    /// Membership in a column of another dataframe.
    pub fn is_in_frame(&self, column: &Expression) -> Result<Self> {
        let in_expr = InExpr::try_new_frame(self.clone(), column)?;
        Ok(Expression::new(ExprKind::In(in_expr)))
    }

    /// Access a field of a composite value.
    pub fn field(&self, name: impl Into<String>) -> Result<Self> {
        let field = FieldExpr::try_new(self.clone(), name.into())?;
        Ok(Expression::new(ExprKind::Field(field)))
    }

    /// Explicit cast. Never fails, an invalid cast surfaces at execution.
    pub fn cast(&self, to: DataType) -> Self {
        Expression::new(ExprKind::Cast(CastExpr {
            expr: self.clone(),
            to,
        }))
    }

    pub fn asc(&self) -> OrderByExpr {
        OrderByExpr::new(self.clone(), true)
    }

    pub fn desc(&self) -> OrderByExpr {
        OrderByExpr::new(self.clone(), false)
    }
}

impl From<&Expression> for Expression {
    fn from(value: &Expression) -> Self {
        value.clone()
    }
}

impl From<ScalarValue> for Expression {
    fn from(value: ScalarValue) -> Self {
        lit(value)
    }
}

macro_rules! impl_from_literal {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Expression {
                fn from(value: $t) -> Self {
                    lit(value)
                }
            }
        )*
    };
}

impl_from_literal!(bool, i32, i64, f64, &str, String);
