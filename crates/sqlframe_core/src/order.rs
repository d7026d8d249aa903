use sqlframe_error::{DbError, Result};

use crate::expr::Expression;

/// A single sort key.
#[derive(Debug, Clone)]
pub struct OrderByExpr {
    pub expr: Expression,
    pub ascending: bool,
    /// Unspecified uses the backend's default (nulls last for ascending).
    pub nulls_first: Option<bool>,
    /// Ordering operator, `ORDER BY expr USING <op>`.
    pub using: Option<String>,
}

impl OrderByExpr {
    pub fn new(expr: Expression, ascending: bool) -> Self {
        OrderByExpr {
            expr,
            ascending,
            nulls_first: None,
            using: None,
        }
    }

    pub fn nulls_first(mut self) -> Self {
        self.nulls_first = Some(true);
        self
    }

    pub fn nulls_last(mut self) -> Self {
        self.nulls_first = Some(false);
        self
    }

    /// Order using a specific operator (e.g. `<` or `>`).
    pub fn using(mut self, operator: impl Into<String>) -> Self {
        self.using = Some(operator.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.expr.contains_aggregate() {
            return Err(DbError::invalid_argument(
                "Aggregate calls can't be used as sort keys",
            ));
        }

        if let Some(op) = &self.using {
            if !self.ascending {
                return Err(DbError::invalid_argument(
                    "Ordering operator can't be combined with descending order",
                ));
            }
            const OPERATOR_CHARS: &str = "+-*/<>=~!@#%^&|`?";
            if op.is_empty() || !op.chars().all(|c| OPERATOR_CHARS.contains(c)) {
                return Err(DbError::invalid_argument(format!(
                    "Invalid ordering operator: '{op}'"
                )));
            }
        }

        Ok(())
    }
}

impl From<Expression> for OrderByExpr {
    fn from(value: Expression) -> Self {
        OrderByExpr::new(value, true)
    }
}

impl From<&Expression> for OrderByExpr {
    fn from(value: &Expression) -> Self {
        OrderByExpr::new(value.clone(), true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::lit;

    #[test]
    fn using_with_descending_rejected() {
        let order = lit(1_i64).desc().using(">");
        assert!(order.validate().is_err());
        assert!(lit(1_i64).asc().using(">").validate().is_ok());
    }

    #[test]
    fn operator_chars_only() {
        assert!(lit(1_i64).asc().using("; DROP").validate().is_err());
    }
}
