use sqlframe_error::{DbError, Result};

use super::Expression;
use crate::types::DataType;

/// Access to a field of a composite value, `(expr)."field"`.
#[derive(Debug, Clone)]
pub struct FieldExpr {
    pub expr: Expression,
    pub field: String,
    pub datatype: DataType,
}

impl FieldExpr {
    pub fn try_new(expr: Expression, field: String) -> Result<Self> {
        let datatype = match expr.datatype() {
            DataType::Record(record) => match record.field(&field) {
                Some(f) => f.datatype.clone(),
                None => {
                    return Err(DbError::unresolved_column(format!(
                        "Record type '{}' has no field '{field}'",
                        record.name
                    )));
                }
            },
            DataType::Unknown | DataType::Custom { .. } => DataType::Unknown,
            other => {
                return Err(DbError::type_mismatch(format!(
                    "Cannot access field '{field}' of non-composite type {other}"
                )));
            }
        };

        Ok(FieldExpr {
            expr,
            field,
            datatype,
        })
    }
}
