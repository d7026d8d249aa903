use std::sync::Arc;

use super::{Expression, Scope};
use crate::functions::remote::RemoteFunction;
use crate::types::DataType;

/// A call to a remote or builtin function.
///
/// Built through [`RemoteFunction::call`], which checks arity and argument
/// types.
#[derive(Debug, Clone)]
pub struct FunctionExpr {
    pub function: Arc<RemoteFunction>,
    pub args: Vec<Expression>,
    /// `agg(DISTINCT ...)`, aggregates only.
    pub distinct: bool,
    /// `count(*)`
    pub star: bool,
    pub datatype: DataType,
    pub scope: Scope,
}
