use sqlframe_error::{DbError, Result};

use super::{ExprKind, Expression};
use crate::dataframe::arena::NodeRef;
use crate::types::coerce::unify;
use crate::types::{DataType, ListValue, ScalarValue};

#[derive(Debug, Clone, PartialEq)]
pub enum InList {
    /// Constants, bound as one array parameter.
    Values(ListValue),
    /// A column of another dataframe, compiled as a subquery.
    Frame { node: NodeRef, column: String },
}

#[derive(Debug, Clone)]
pub struct InExpr {
    pub expr: Expression,
    pub list: InList,
}

impl InExpr {
    pub fn try_new_values(expr: Expression, values: impl Iterator<Item = ScalarValue>) -> Result<Self> {
        let values: Vec<_> = values.collect();

        let mut element = DataType::Null;
        for value in &values {
            element = unify(&element, &value.datatype()).ok_or_else(|| {
                DbError::type_mismatch(format!(
                    "Values in IN list have incompatible types: {element} and {}",
                    value.datatype()
                ))
            })?;
        }

        let datatype = expr.datatype();
        let element = unify(&datatype, &element).ok_or_else(|| {
            DbError::type_mismatch(format!(
                "Cannot compare {datatype} with values of type {element}"
            ))
        })?;
        let element = match element {
            // Nothing to go off of, let the backend coerce.
            DataType::Null | DataType::Unknown => values
                .iter()
                .map(|v| v.datatype())
                .find(|dt| !dt.is_null())
                .unwrap_or(DataType::Text),
            other => other,
        };

        let values = values
            .into_iter()
            .map(|v| widen_value(v, &element))
            .collect();

        Ok(InExpr {
            expr,
            list: InList::Values(ListValue {
                datatype: element,
                values,
            }),
        })
    }

    pub fn try_new_frame(expr: Expression, column: &Expression) -> Result<Self> {
        let col = match column.kind() {
            ExprKind::Column(col) if col.join.is_none() => col,
            _ => {
                return Err(DbError::invalid_argument(
                    "IN subquery requires a column of a dataframe",
                ));
            }
        };

        let datatype = expr.datatype();
        if unify(&datatype, &col.datatype).is_none() {
            return Err(DbError::type_mismatch(format!(
                "Cannot compare {datatype} with column '{}' of type {}",
                col.name, col.datatype
            )));
        }

        Ok(InExpr {
            expr,
            list: InList::Frame {
                node: col.relation,
                column: col.name.clone(),
            },
        })
    }
}

/// Widen a numeric value to the list's element type so every element binds
/// with the same type.
fn widen_value(value: ScalarValue, element: &DataType) -> ScalarValue {
    match (value, element) {
        (ScalarValue::Int32(v), DataType::Int64) => ScalarValue::Int64(v as i64),
        (ScalarValue::Int32(v), DataType::Float64) => ScalarValue::Float64(v as f64),
        (ScalarValue::Int64(v), DataType::Float64) => ScalarValue::Float64(v as f64),
        (value, _) => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::column_expr::ColumnExpr;
    use crate::expr::lit;

    fn col(datatype: DataType) -> Expression {
        Expression::new(ExprKind::Column(ColumnExpr {
            name: "a".to_string(),
            relation: NodeRef { node_idx: 0 },
            join: None,
            datatype,
        }))
    }

    #[test]
    fn values_are_widened() {
        let expr = InExpr::try_new_values(
            col(DataType::Int64),
            [ScalarValue::Int32(1), ScalarValue::Int64(2)].into_iter(),
        )
        .unwrap();
        match expr.list {
            InList::Values(list) => {
                assert_eq!(DataType::Int64, list.datatype);
                assert_eq!(
                    vec![ScalarValue::Int64(1), ScalarValue::Int64(2)],
                    list.values
                );
            }
            other => panic!("unexpected list: {other:?}"),
        }
    }

    #[test]
    fn mismatched_values() {
        let err = InExpr::try_new_values(
            col(DataType::Int64),
            [ScalarValue::from("a")].into_iter(),
        )
        .unwrap_err();
        assert!(err.is_construction());
    }

    #[test]
    fn frame_requires_column() {
        let err = InExpr::try_new_frame(col(DataType::Int64), &lit(1_i64)).unwrap_err();
        assert!(err.is_construction());
    }
}
