use std::fmt;

use sqlframe_error::{DbError, Result};

use super::{Expression, Scope};
use crate::types::DataType;
use crate::types::coerce::{is_integer, is_numeric, satisfies, unify};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOperator {
    And,
    Or,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Like,
}

impl BinaryOperator {
    pub const fn is_comparison(&self) -> bool {
        matches!(
            self,
            Self::Eq | Self::NotEq | Self::Lt | Self::LtEq | Self::Gt | Self::GtEq
        )
    }

    /// Compute the return type of applying this operator to the given
    /// operand types, erroring if the operand types aren't allowed.
    pub fn return_type(&self, left: &DataType, right: &DataType) -> Result<DataType> {
        let datatype = match self {
            Self::And | Self::Or => {
                let is_bool = |dt: &DataType| matches!(dt, DataType::Boolean);
                if satisfies(left, is_bool) && satisfies(right, is_bool) {
                    Some(DataType::Boolean)
                } else {
                    None
                }
            }
            op if op.is_comparison() => unify(left, right).map(|_| DataType::Boolean),
            Self::Add | Self::Sub | Self::Mul | Self::Div => {
                if satisfies(left, is_numeric) && satisfies(right, is_numeric) {
                    unify(left, right)
                } else {
                    None
                }
            }
            Self::Mod => {
                if satisfies(left, is_integer) && satisfies(right, is_integer) {
                    unify(left, right)
                } else {
                    None
                }
            }
            Self::Like => {
                let is_text = |dt: &DataType| matches!(dt, DataType::Text);
                if satisfies(left, is_text) && satisfies(right, is_text) {
                    Some(DataType::Boolean)
                } else {
                    None
                }
            }
            _ => None,
        };

        datatype.ok_or_else(|| {
            DbError::type_mismatch(format!(
                "Cannot apply '{self}' to {left} and {right}, use an explicit cast"
            ))
        })
    }
}

impl fmt::Display for BinaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::And => write!(f, "AND"),
            Self::Or => write!(f, "OR"),
            Self::Eq => write!(f, "="),
            Self::NotEq => write!(f, "<>"),
            Self::Lt => write!(f, "<"),
            Self::LtEq => write!(f, "<="),
            Self::Gt => write!(f, ">"),
            Self::GtEq => write!(f, ">="),
            Self::Add => write!(f, "+"),
            Self::Sub => write!(f, "-"),
            Self::Mul => write!(f, "*"),
            Self::Div => write!(f, "/"),
            Self::Mod => write!(f, "%"),
            Self::Like => write!(f, "LIKE"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BinaryExpr {
    pub op: BinaryOperator,
    pub left: Expression,
    pub right: Expression,
    pub datatype: DataType,
    pub scope: Scope,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comparison_of_promotable_types() {
        assert_eq!(
            DataType::Boolean,
            BinaryOperator::Lt
                .return_type(&DataType::Int32, &DataType::Float64)
                .unwrap()
        );
        assert!(
            BinaryOperator::Eq
                .return_type(&DataType::Date, &DataType::Text)
                .is_err()
        );
    }

    #[test]
    fn like_on_text_only() {
        assert!(
            BinaryOperator::Like
                .return_type(&DataType::Text, &DataType::Text)
                .is_ok()
        );
        assert!(
            BinaryOperator::Like
                .return_type(&DataType::Int64, &DataType::Text)
                .is_err()
        );
    }

    #[test]
    fn null_operand() {
        assert_eq!(
            DataType::Int64,
            BinaryOperator::Add
                .return_type(&DataType::Int64, &DataType::Null)
                .unwrap()
        );
    }
}
