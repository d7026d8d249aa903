use sqlframe_error::{DbError, Result};

use super::Expression;
use crate::types::DataType;
use crate::types::coerce::{is_numeric, satisfies};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOperator {
    Not,
    Negate,
    Abs,
    IsNull,
    IsNotNull,
}

impl UnaryOperator {
    pub fn check_input(&self, datatype: &DataType) -> Result<()> {
        let ok = match self {
            Self::Not => satisfies(datatype, |dt| matches!(dt, DataType::Boolean)),
            Self::Negate | Self::Abs => satisfies(datatype, is_numeric),
            Self::IsNull | Self::IsNotNull => true,
        };
        if !ok {
            return Err(DbError::type_mismatch(format!(
                "Cannot apply {self:?} to {datatype}"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct UnaryExpr {
    pub op: UnaryOperator,
    pub expr: Expression,
}

impl UnaryExpr {
    pub fn datatype(&self) -> DataType {
        match self.op {
            UnaryOperator::Not | UnaryOperator::IsNull | UnaryOperator::IsNotNull => {
                DataType::Boolean
            }
            UnaryOperator::Negate | UnaryOperator::Abs => self.expr.datatype(),
        }
    }
}
