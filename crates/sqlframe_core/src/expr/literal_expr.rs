use crate::types::ScalarValue;

/// A constant.
///
/// Compiled to a bound parameter with an explicit cast, or `NULL` for
/// untyped nulls.
#[derive(Debug, Clone, PartialEq)]
pub struct LiteralExpr {
    pub value: ScalarValue,
}
