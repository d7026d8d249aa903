//! Implicit type promotion.
//!
//! Only numeric widening is implicit: `Int32 -> Int64 -> Numeric -> Float64`.
//! `Null` unifies with anything, `Unknown` unifies with anything and stays
//! unknown. Every other mix of types needs an explicit cast.

use super::datatype::DataType;

const fn numeric_rank(datatype: &DataType) -> Option<u8> {
    match datatype {
        DataType::Int32 => Some(0),
        DataType::Int64 => Some(1),
        DataType::Numeric => Some(2),
        DataType::Float64 => Some(3),
        _ => None,
    }
}

pub const fn is_numeric(datatype: &DataType) -> bool {
    numeric_rank(datatype).is_some()
}

pub const fn is_integer(datatype: &DataType) -> bool {
    matches!(datatype, DataType::Int32 | DataType::Int64)
}

/// Find the common type two operands promote to.
pub fn unify(a: &DataType, b: &DataType) -> Option<DataType> {
    if a == b {
        return Some(a.clone());
    }

    match (a, b) {
        (DataType::Unknown, _) | (_, DataType::Unknown) => Some(DataType::Unknown),
        (DataType::Null, other) | (other, DataType::Null) => Some(other.clone()),
        (DataType::List(a), DataType::List(b)) => unify(a, b).map(DataType::list),
        (a, b) => {
            let ra = numeric_rank(a)?;
            let rb = numeric_rank(b)?;
            Some(if ra >= rb { a.clone() } else { b.clone() })
        }
    }
}

/// Check if a value of type `from` can be passed where `to` is expected
/// without an explicit cast.
pub fn can_implicit_cast(from: &DataType, to: &DataType) -> bool {
    if from == to {
        return true;
    }

    match (from, to) {
        (DataType::Null | DataType::Unknown, _) | (_, DataType::Unknown) => true,
        (DataType::List(from), DataType::List(to)) => can_implicit_cast(from, to),
        (from, to) => match (numeric_rank(from), numeric_rank(to)) {
            (Some(a), Some(b)) => a <= b,
            _ => false,
        },
    }
}

/// Check if a type satisfies a predicate, treating deferred types as
/// satisfying everything.
pub fn satisfies(datatype: &DataType, pred: impl Fn(&DataType) -> bool) -> bool {
    matches!(datatype, DataType::Null | DataType::Unknown) || pred(datatype)
}
