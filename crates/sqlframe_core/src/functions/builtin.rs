//! Functions that already exist in the backend.

use std::sync::{Arc, LazyLock};

use sqlframe_error::{DbError, Result};

use super::remote::{
    CallingConvention,
    Definition,
    Parameter,
    RemoteFunction,
    ResolveFn,
    ReturnShape,
    Signature,
};
use crate::expr::function_expr::FunctionExpr;
use crate::expr::{ExprKind, Expression, Scope};
use crate::types::DataType;
use crate::types::coerce::{is_numeric, unify};

fn builtin(
    name: &str,
    convention: CallingConvention,
    signature: Signature,
    returns: ReturnShape,
) -> Arc<RemoteFunction> {
    Arc::new(RemoteFunction {
        name: name.to_string(),
        schema: None,
        signature,
        returns,
        convention,
        definition: Definition::Builtin,
    })
}

fn unary(resolve: ResolveFn) -> Signature {
    Signature::Variadic {
        min: 1,
        max: Some(1),
        resolve,
    }
}

fn first_type(args: &[DataType]) -> DataType {
    args.first().cloned().unwrap_or(DataType::Unknown)
}

fn resolve_sum(args: &[DataType]) -> Result<DataType> {
    match first_type(args) {
        DataType::Int32 => Ok(DataType::Int64),
        DataType::Int64 | DataType::Numeric => Ok(DataType::Numeric),
        DataType::Float64 => Ok(DataType::Float64),
        DataType::Null | DataType::Unknown => Ok(DataType::Unknown),
        other => Err(DbError::type_mismatch(format!("Cannot sum values of type {other}"))),
    }
}

fn resolve_avg(args: &[DataType]) -> Result<DataType> {
    match first_type(args) {
        DataType::Int32 | DataType::Int64 | DataType::Numeric => Ok(DataType::Numeric),
        DataType::Float64 => Ok(DataType::Float64),
        DataType::Null | DataType::Unknown => Ok(DataType::Unknown),
        other => Err(DbError::type_mismatch(format!(
            "Cannot average values of type {other}"
        ))),
    }
}

fn resolve_same(args: &[DataType]) -> Result<DataType> {
    Ok(first_type(args))
}

fn resolve_numeric_same(args: &[DataType]) -> Result<DataType> {
    match first_type(args) {
        dt if is_numeric(&dt) || dt.is_null() || dt.is_unknown() => Ok(dt),
        other => Err(DbError::type_mismatch(format!(
            "Expected a numeric argument, got {other}"
        ))),
    }
}

fn resolve_count(_args: &[DataType]) -> Result<DataType> {
    Ok(DataType::Int64)
}

fn resolve_array_agg(args: &[DataType]) -> Result<DataType> {
    Ok(DataType::list(first_type(args)))
}

fn resolve_coalesce(args: &[DataType]) -> Result<DataType> {
    let mut out = DataType::Null;
    for arg in args {
        out = unify(&out, arg).ok_or_else(|| {
            DbError::type_mismatch(format!("COALESCE arguments {out} and {arg} don't match"))
        })?;
    }
    Ok(out)
}

static COUNT: LazyLock<Arc<RemoteFunction>> = LazyLock::new(|| {
    builtin(
        "count",
        CallingConvention::Aggregate,
        unary(resolve_count),
        ReturnShape::Value(DataType::Int64),
    )
});

static SUM: LazyLock<Arc<RemoteFunction>> = LazyLock::new(|| {
    builtin(
        "sum",
        CallingConvention::Aggregate,
        unary(resolve_sum),
        ReturnShape::SameAsArgument(0),
    )
});

static MIN: LazyLock<Arc<RemoteFunction>> = LazyLock::new(|| {
    builtin(
        "min",
        CallingConvention::Aggregate,
        unary(resolve_same),
        ReturnShape::SameAsArgument(0),
    )
});

static MAX: LazyLock<Arc<RemoteFunction>> = LazyLock::new(|| {
    builtin(
        "max",
        CallingConvention::Aggregate,
        unary(resolve_same),
        ReturnShape::SameAsArgument(0),
    )
});

static AVG: LazyLock<Arc<RemoteFunction>> = LazyLock::new(|| {
    builtin(
        "avg",
        CallingConvention::Aggregate,
        unary(resolve_avg),
        ReturnShape::Value(DataType::Numeric),
    )
});

static ARRAY_AGG: LazyLock<Arc<RemoteFunction>> = LazyLock::new(|| {
    builtin(
        "array_agg",
        CallingConvention::Aggregate,
        unary(resolve_array_agg),
        ReturnShape::SameAsArgument(0),
    )
});

static ABS: LazyLock<Arc<RemoteFunction>> = LazyLock::new(|| {
    builtin(
        "abs",
        CallingConvention::Scalar,
        unary(resolve_numeric_same),
        ReturnShape::SameAsArgument(0),
    )
});

static COALESCE: LazyLock<Arc<RemoteFunction>> = LazyLock::new(|| {
    builtin(
        "coalesce",
        CallingConvention::Scalar,
        Signature::Variadic {
            min: 1,
            max: None,
            resolve: resolve_coalesce,
        },
        ReturnShape::SameAsArgument(0),
    )
});

static GENERATE_SERIES: LazyLock<Arc<RemoteFunction>> = LazyLock::new(|| {
    builtin(
        "generate_series",
        CallingConvention::Scalar,
        Signature::Exact(vec![
            Parameter::new("start", DataType::Int64),
            Parameter::new("stop", DataType::Int64),
        ]),
        ReturnShape::Set(DataType::Int64),
    )
});

static VERSION: LazyLock<Arc<RemoteFunction>> = LazyLock::new(|| {
    builtin(
        "version",
        CallingConvention::Scalar,
        Signature::Exact(Vec::new()),
        ReturnShape::Value(DataType::Text),
    )
});

/// Number of non-null values.
pub fn count(expr: impl Into<Expression>) -> Result<Expression> {
    COUNT.call([expr])
}

/// Number of distinct non-null values.
pub fn count_distinct(expr: impl Into<Expression>) -> Result<Expression> {
    COUNT.call_distinct([expr])
}

/// Number of rows, `count(*)`.
pub fn count_all() -> Expression {
    Expression::new(ExprKind::Function(FunctionExpr {
        function: COUNT.clone(),
        args: Vec::new(),
        distinct: false,
        star: true,
        datatype: DataType::Int64,
        scope: Scope::None,
    }))
}

pub fn sum(expr: impl Into<Expression>) -> Result<Expression> {
    SUM.call([expr])
}

pub fn min(expr: impl Into<Expression>) -> Result<Expression> {
    MIN.call([expr])
}

pub fn max(expr: impl Into<Expression>) -> Result<Expression> {
    MAX.call([expr])
}

pub fn avg(expr: impl Into<Expression>) -> Result<Expression> {
    AVG.call([expr])
}

/// Collect a group's values into an array.
pub fn array_agg(expr: impl Into<Expression>) -> Result<Expression> {
    ARRAY_AGG.call([expr])
}

pub fn abs(expr: impl Into<Expression>) -> Result<Expression> {
    ABS.call([expr])
}

/// First non-null argument.
pub fn coalesce<I, E>(exprs: I) -> Result<Expression>
where
    I: IntoIterator<Item = E>,
    E: Into<Expression>,
{
    COALESCE.call(exprs)
}

/// Set returning series of integers from `start` to `stop` inclusive.
pub fn generate_series(
    start: impl Into<Expression>,
    stop: impl Into<Expression>,
) -> Result<Expression> {
    GENERATE_SERIES.call([start.into(), stop.into()])
}

/// The backend's version string.
pub fn version() -> Result<Expression> {
    VERSION.call(Vec::<Expression>::new())
}

#[cfg(test)]
mod tests {
    use sqlframe_error::ConstructionKind;

    use super::*;
    use crate::expr::lit;

    #[test]
    fn sum_types() {
        assert_eq!(DataType::Int64, sum(lit(1_i32)).unwrap().datatype());
        assert_eq!(DataType::Numeric, sum(lit(1_i64)).unwrap().datatype());
        let err = sum(lit("a")).unwrap_err();
        assert_eq!(Some(ConstructionKind::TypeMismatch), err.construction_kind());
    }

    #[test]
    fn aggregates_are_flagged() {
        assert!(count(lit(1_i64)).unwrap().contains_aggregate());
        assert!(count_all().contains_aggregate());
        assert!(!abs(lit(1_i64)).unwrap().contains_aggregate());
    }

    #[test]
    fn coalesce_unifies() {
        let expr = coalesce([lit(1_i32), lit(2.5)]).unwrap();
        assert_eq!(DataType::Float64, expr.datatype());
        assert!(coalesce([lit(1_i32), lit("a")]).is_err());
    }

    #[test]
    fn generate_series_returns_set() {
        let expr = generate_series(1_i64, 3_i64).unwrap();
        assert!(expr.contains_set_returning());
        assert_eq!(DataType::Int64, expr.datatype());
        assert_eq!(Some("generate_series".to_string()), expr.output_name());
    }

    #[test]
    fn count_arity() {
        let err = COUNT.call([lit(1_i64), lit(2_i64)]).unwrap_err();
        assert_eq!(Some(ConstructionKind::ArityMismatch), err.construction_kind());
    }
}
