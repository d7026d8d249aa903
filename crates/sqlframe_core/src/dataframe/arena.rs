use std::fmt;
use std::sync::Arc;

use sqlframe_error::{DbError, Result};

use super::node::Node;

/// Reference to a node in a database's node arena.
///
/// Node identity is the reference, not the node's structure. Two nodes
/// built by the same sequence of operations are distinct nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeRef {
    pub node_idx: usize,
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NODE_{}", self.node_idx)
    }
}

/// Append-only storage for dataframe nodes.
///
/// Nodes only ever reference nodes pushed before them, so lineage can't form
/// a cycle.
#[derive(Debug, Default)]
pub struct NodeArena {
    nodes: Vec<Arc<Node>>,
}

impl NodeArena {
    pub fn push(&mut self, node: Node) -> NodeRef {
        let idx = self.nodes.len();
        self.nodes.push(Arc::new(node));
        NodeRef { node_idx: idx }
    }

    pub fn get(&self, node: NodeRef) -> Result<&Arc<Node>> {
        self.nodes
            .get(node.node_idx)
            .ok_or_else(|| DbError::new(format!("Missing node for reference: {node}")))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
