//! Call-site construction for remote functions.

use std::sync::Arc;

use sqlframe_error::{DbError, Result};

use super::remote::{CallingConvention, RemoteFunction, Signature};
use crate::expr::function_expr::FunctionExpr;
use crate::expr::{ExprKind, Expression, Scope};
use crate::types::coerce::can_implicit_cast;

impl RemoteFunction {
    /// Build a call expression.
    ///
    /// Arity and argument types are checked against the signature, and all
    /// arguments must come from the same dataframe.
    pub fn call<I, E>(self: &Arc<Self>, args: I) -> Result<Expression>
    where
        I: IntoIterator<Item = E>,
        E: Into<Expression>,
    {
        self.build_call(args.into_iter().map(Into::into).collect(), false)
    }

    /// Build an aggregate call that deduplicates its inputs before folding.
    pub fn call_distinct<I, E>(self: &Arc<Self>, args: I) -> Result<Expression>
    where
        I: IntoIterator<Item = E>,
        E: Into<Expression>,
    {
        if self.convention != CallingConvention::Aggregate {
            return Err(DbError::invalid_argument(format!(
                "DISTINCT is only valid for aggregates, '{}' is a {} function",
                self.name, self.convention
            )));
        }
        self.build_call(args.into_iter().map(Into::into).collect(), true)
    }

    fn build_call(self: &Arc<Self>, args: Vec<Expression>, distinct: bool) -> Result<Expression> {
        self.check_arity(args.len())?;

        let arg_types: Vec<_> = args.iter().map(|a| a.datatype()).collect();
        if let Signature::Exact(params) = &self.signature {
            for (idx, (param, datatype)) in params.iter().zip(&arg_types).enumerate() {
                if !can_implicit_cast(datatype, &param.datatype) {
                    return Err(DbError::type_mismatch(format!(
                        "Argument {} of '{}' expects {}, got {datatype}",
                        idx + 1,
                        self.name,
                        param.datatype
                    ))
                    .with_field("parameter", param.name.clone()));
                }
            }
        }
        let datatype = self.return_type(&arg_types)?;

        let mut scope = Scope::None;
        for arg in &args {
            scope = scope.merge(arg.scope())?;
        }

        Ok(Expression::new(ExprKind::Function(FunctionExpr {
            function: self.clone(),
            args,
            distinct,
            star: false,
            datatype,
            scope,
        })))
    }

    fn check_arity(&self, got: usize) -> Result<()> {
        let (min, max) = match &self.signature {
            Signature::Exact(params) => (params.len(), Some(params.len())),
            Signature::Variadic { min, max, .. } => (*min, *max),
        };
        if got < min || max.is_some_and(|max| got > max) {
            let expected = match max {
                Some(max) if max == min => format!("{min}"),
                Some(max) => format!("{min} to {max}"),
                None => format!("at least {min}"),
            };
            return Err(DbError::arity_mismatch(format!(
                "Function '{}' expects {expected} arguments, got {got}",
                self.name
            )));
        }
        Ok(())
    }
}
