//! Grouped dataframes.

use sqlframe_error::{DbError, Result};

use crate::dataframe::node::{Node, NodeKind, OutputSchema, RESULT_COLUMN};
use crate::dataframe::{ApplyOptions, DataFrame};
use crate::expr::{ExprKind, Expression};
use crate::functions::remote::CallingConvention;
use crate::ident::quote_ident;
use crate::types::{ColumnDef, ColumnSchema};

/// Grouping keys of an aggregation.
///
/// A single set groups by its keys. Several sets aggregate every set
/// separately, key columns outside the current set are NULL in its rows.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GroupingSets {
    sets: Vec<Vec<String>>,
}

impl GroupingSets {
    pub fn single(keys: Vec<String>) -> Self {
        GroupingSets { sets: vec![keys] }
    }

    /// Aggregate the whole input as one group.
    pub fn empty() -> Self {
        Self::single(Vec::new())
    }

    pub fn sets(&self) -> &[Vec<String>] {
        &self.sets
    }

    /// Every key across all sets, in order of first appearance.
    pub fn flatten(&self) -> Vec<String> {
        let mut keys: Vec<String> = Vec::new();
        for key in self.sets.iter().flatten() {
            if !keys.contains(key) {
                keys.push(key.clone());
            }
        }
        keys
    }

    pub fn union(&self, other: &GroupingSets) -> Self {
        let mut sets = self.sets.clone();
        sets.extend(other.sets.iter().cloned());
        GroupingSets { sets }
    }

    /// The GROUP BY clause for columns of `alias`, None when aggregating
    /// everything into a single group.
    pub fn to_sql(&self, alias: &str) -> Option<String> {
        let render = |set: &[String]| {
            set.iter()
                .map(|k| format!("{alias}.{}", quote_ident(k)))
                .collect::<Vec<_>>()
                .join(", ")
        };

        match self.sets.as_slice() {
            [] => None,
            [set] if set.is_empty() => None,
            [set] => Some(format!("GROUP BY {}", render(set))),
            sets => {
                let sets: Vec<_> = sets.iter().map(|s| format!("({})", render(s))).collect();
                Some(format!("GROUP BY GROUPING SETS ({})", sets.join(", ")))
            }
        }
    }
}

/// A dataframe grouped by key columns, created by [`DataFrame::group_by`].
#[derive(Debug, Clone)]
pub struct GroupedFrame {
    df: DataFrame,
    sets: GroupingSets,
}

impl GroupedFrame {
    pub(crate) fn new(df: DataFrame, sets: GroupingSets) -> Self {
        GroupedFrame { df, sets }
    }

    pub fn keys(&self) -> Vec<String> {
        self.sets.flatten()
    }

    pub fn grouping_sets(&self) -> &GroupingSets {
        &self.sets
    }

    /// Combine two groupings of the same dataframe into grouping sets.
    pub fn union(&self, other: &GroupedFrame) -> Result<GroupedFrame> {
        if !self.df.database().same_session(other.df.database())
            || self.df.node_ref() != other.df.node_ref()
        {
            return Err(DbError::incompatible_grouping(
                "Only groupings of the same dataframe can be combined",
            ));
        }
        for key in other.keys() {
            if self.keys().contains(&key)
                && self.df.col(&key)?.datatype() != other.df.col(&key)?.datatype()
            {
                return Err(DbError::incompatible_grouping(format!(
                    "Key '{key}' has different types in the combined groupings"
                )));
            }
        }
        Ok(GroupedFrame {
            df: self.df.clone(),
            sets: self.sets.union(&other.sets),
        })
    }

    /// Apply an aggregate or array function to every group.
    ///
    /// The output has the key columns followed by the result.
    pub fn apply(&self, call: Expression, options: ApplyOptions) -> Result<DataFrame> {
        let name = if options.expand {
            RESULT_COLUMN.to_string()
        } else {
            options
                .column_name
                .or_else(|| call.output_name())
                .ok_or_else(|| {
                    DbError::invalid_argument("Applied expression requires a column name")
                })?
        };

        let keys = self.keys();
        let applied = self.aggregate(vec![(name, call)])?;
        if options.expand {
            applied.expand_result(&keys)
        } else {
            Ok(applied)
        }
    }

    /// Compute named outputs for every group.
    pub fn assign<I, S>(&self, columns: I) -> Result<DataFrame>
    where
        I: IntoIterator<Item = (S, Expression)>,
        S: Into<String>,
    {
        let outputs: Vec<_> = columns
            .into_iter()
            .map(|(name, expr)| (name.into(), expr))
            .collect();
        if outputs.is_empty() {
            return Err(DbError::invalid_argument("assign requires at least one column"));
        }
        self.aggregate(outputs)
    }

    fn aggregate(&self, outputs: Vec<(String, Expression)>) -> Result<DataFrame> {
        let keys = self.keys();
        let mut columns = Vec::with_capacity(keys.len() + outputs.len());
        for key in &keys {
            columns.push(ColumnDef::new(key.clone(), self.df.col(key)?.datatype()));
        }

        for (name, expr) in &outputs {
            expr.scope().check_frame(self.df.node_ref())?;
            check_grouped(expr, &keys)?;
            if columns.iter().any(|c| c.name == *name) {
                return Err(DbError::ambiguous_column(format!(
                    "Output column '{name}' conflicts with another column of the grouped output"
                )));
            }
            columns.push(ColumnDef::new(name.clone(), expr.datatype()));
        }

        Ok(self.df.database().push_node(Node::new(
            NodeKind::Aggregate {
                input: self.df.node_ref(),
                grouping: self.sets.clone(),
                outputs,
            },
            OutputSchema::Resolved(ColumnSchema::try_new(columns)?),
        )))
    }
}

/// Check that every column an aggregated expression reads outside of
/// aggregate and array calls is a grouping key.
pub(crate) fn check_grouped(expr: &Expression, keys: &[String]) -> Result<()> {
    match expr.kind() {
        ExprKind::Column(col) => {
            if keys.contains(&col.name) {
                Ok(())
            } else {
                Err(DbError::unresolved_column(format!(
                    "Column '{}' must be a grouping key or used inside an aggregate",
                    col.name
                ))
                .with_field("keys", keys.join(", ")))
            }
        }
        ExprKind::Function(func) => match func.function.convention() {
            CallingConvention::Aggregate => Ok(()),
            CallingConvention::Array => {
                let params = func.function.parameters();
                for (idx, arg) in func.args.iter().enumerate() {
                    if params.get(idx).is_some_and(|p| p.aggregated) {
                        continue;
                    }
                    check_grouped(arg, keys)?;
                }
                Ok(())
            }
            CallingConvention::Scalar => {
                for arg in &func.args {
                    check_grouped(arg, keys)?;
                }
                Ok(())
            }
        },
        _ => {
            for child in expr.children() {
                check_grouped(child, keys)?;
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grouping_sets_sql() {
        assert_eq!(None, GroupingSets::empty().to_sql("\"t_0\""));
        assert_eq!(
            Some("GROUP BY \"t_0\".\"a\", \"t_0\".\"b\"".to_string()),
            GroupingSets::single(vec!["a".to_string(), "b".to_string()]).to_sql("\"t_0\"")
        );

        let sets = GroupingSets::single(vec!["a".to_string()])
            .union(&GroupingSets::single(vec!["b".to_string()]));
        assert_eq!(
            Some("GROUP BY GROUPING SETS ((\"t_0\".\"a\"), (\"t_0\".\"b\"))".to_string()),
            sets.to_sql("\"t_0\"")
        );
    }

    #[test]
    fn flatten_keeps_first_appearance() {
        let sets = GroupingSets::single(vec!["b".to_string(), "a".to_string()])
            .union(&GroupingSets::single(vec!["a".to_string(), "c".to_string()]));
        assert_eq!(vec!["b", "a", "c"], sets.flatten());
    }

    #[test]
    fn grouping_sets_with_empty_set() {
        let sets = GroupingSets::single(vec!["a".to_string()]).union(&GroupingSets::empty());
        assert_eq!(
            Some("GROUP BY GROUPING SETS ((\"t_0\".\"a\"), ())".to_string()),
            sets.to_sql("\"t_0\"")
        );
    }
}
