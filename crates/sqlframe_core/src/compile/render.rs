use sqlframe_error::{DbError, Result};

use super::QueryCompiler;
use crate::dataframe::arena::NodeRef;
use crate::expr::binary_expr::BinaryExpr;
use crate::expr::function_expr::FunctionExpr;
use crate::expr::in_expr::InList;
use crate::expr::unary_expr::UnaryOperator;
use crate::expr::{ExprKind, Expression};
use crate::functions::remote::CallingConvention;
use crate::ident::quote_ident;
use crate::types::{DataType, ScalarValue};

/// Aliases the nodes visible to an expression are known by in the current
/// select.
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    aliases: Vec<(NodeRef, String)>,
}

impl Bindings {
    pub fn single(node: NodeRef, alias: String) -> Self {
        Bindings {
            aliases: vec![(node, alias)],
        }
    }

    pub fn join(left: NodeRef, left_alias: String, right: NodeRef, right_alias: String) -> Self {
        Bindings {
            aliases: vec![(left, left_alias), (right, right_alias)],
        }
    }

    pub fn alias_of(&self, node: NodeRef) -> Result<&str> {
        self.aliases
            .iter()
            .find(|(n, _)| *n == node)
            .map(|(_, alias)| alias.as_str())
            .ok_or_else(|| {
                DbError::schema_mismatch(format!(
                    "Column references {node} which isn't an input of this query"
                ))
            })
    }
}

impl QueryCompiler<'_> {
    pub(crate) fn render_expr(&mut self, expr: &Expression, bindings: &Bindings) -> Result<String> {
        Ok(match expr.kind() {
            ExprKind::Column(col) => {
                format!("{}.{}", bindings.alias_of(col.relation)?, quote_ident(&col.name))
            }
            ExprKind::Literal(lit) => match &lit.value {
                ScalarValue::Null => "NULL".to_string(),
                value => self.push_param(value.clone(), &value.datatype()),
            },
            ExprKind::Unary(unary) => {
                let inner = self.render_expr(&unary.expr, bindings)?;
                match unary.op {
                    UnaryOperator::Not => format!("(NOT {inner})"),
                    UnaryOperator::Negate => format!("(- {inner})"),
                    UnaryOperator::Abs => format!("abs({inner})"),
                    UnaryOperator::IsNull => format!("({inner} IS NULL)"),
                    UnaryOperator::IsNotNull => format!("({inner} IS NOT NULL)"),
                }
            }
            ExprKind::Binary(BinaryExpr {
                op, left, right, ..
            }) => {
                let left = self.render_expr(left, bindings)?;
                let right = self.render_expr(right, bindings)?;
                format!("({left} {op} {right})")
            }
            ExprKind::Function(func) => self.render_function(func, bindings)?,
            ExprKind::Cast(cast) => {
                let inner = self.render_expr(&cast.expr, bindings)?;
                format!("CAST({inner} AS {})", cast.to.sql_name())
            }
            ExprKind::In(in_expr) => {
                let inner = self.render_expr(&in_expr.expr, bindings)?;
                match &in_expr.list {
                    InList::Values(list) => {
                        let datatype = DataType::list(list.datatype.clone());
                        let param = self.push_param(ScalarValue::List(list.clone()), &datatype);
                        format!("({inner} = ANY({param}))")
                    }
                    InList::Frame { node, column } => {
                        let source = self.source(*node)?;
                        let alias = self.next_alias();
                        format!(
                            "({inner} IN (SELECT {alias}.{} FROM {source} AS {alias}))",
                            quote_ident(column)
                        )
                    }
                }
            }
            ExprKind::Field(field) => {
                let inner = self.render_expr(&field.expr, bindings)?;
                format!("({inner}).{}", quote_ident(&field.field))
            }
        })
    }

    fn render_function(&mut self, func: &FunctionExpr, bindings: &Bindings) -> Result<String> {
        self.add_function(&func.function);
        let name = func.function.qualified_name(self.function_schema);

        if func.star {
            return Ok(format!("{name}(*)"));
        }

        let params = func.function.parameters();
        let mut args = Vec::with_capacity(func.args.len());
        for (idx, arg) in func.args.iter().enumerate() {
            let rendered = self.render_expr(arg, bindings)?;
            let aggregated = func.function.convention() == CallingConvention::Array
                && params.get(idx).is_some_and(|p| p.aggregated);
            if aggregated {
                args.push(format!("array_agg({rendered})"));
            } else {
                args.push(rendered);
            }
        }

        let distinct = if func.distinct { "DISTINCT " } else { "" };
        Ok(format!("{name}({distinct}{})", args.join(", ")))
    }
}
