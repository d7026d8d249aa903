use super::Expression;
use crate::types::DataType;

#[derive(Debug, Clone)]
pub struct CastExpr {
    pub expr: Expression,
    pub to: DataType,
}
