use super::Scope;
use crate::dataframe::arena::NodeRef;
use crate::types::DataType;

/// Reference to a column of a dataframe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnExpr {
    pub name: String,
    /// Dataframe the column belongs to.
    pub relation: NodeRef,
    /// Set for columns obtained while building a join condition, holds the
    /// (left, right) inputs of the join.
    pub join: Option<(NodeRef, NodeRef)>,
    pub datatype: DataType,
}

impl ColumnExpr {
    pub fn scope(&self) -> Scope {
        match self.join {
            Some((left, right)) => Scope::Join { left, right },
            None => Scope::Frame(self.relation),
        }
    }
}
